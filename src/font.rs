//! Font collaborator contracts and the cache-backed resolution engine.
//!
//! Two font objects exist per text run: the interpreter-side font (the
//! [`SourceFont`], which knows the encoding and metrics of the document
//! font) and the resolved device font (the [`DeviceFont`], which carries
//! a drawable face). Resolution is expensive, so the engine keeps handles
//! in a bounded cache keyed by font identity.

use std::rc::Rc;

use log::debug;
use smallvec::SmallVec;

use crate::cache::BoundedCache;

/// Default number of resolved fonts kept alive per document.
const FONT_CACHE_SIZE: usize = 16;

/// Identity of an interpreter font object, used as the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontId(pub u64);

/// Text advance direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritingMode {
    #[default]
    Horizontal,
    Vertical,
}

/// One decoded character unit from a text string.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Character code in the font's encoding.
    pub code: u32,
    /// Unicode fallback sequence for the code (possibly empty).
    pub unicode: SmallVec<[u32; 4]>,
    /// Advance in glyph space.
    pub advance: (f64, f64),
    /// Glyph origin in glyph space.
    pub origin: (f64, f64),
    /// Bytes consumed from the input; at least 1 for non-empty input.
    pub consumed: usize,
}

/// The interpreter-side font object attached to the text state.
pub trait SourceFont {
    /// Identity for cache lookups. Equal ids must denote the same font.
    fn id(&self) -> FontId;

    fn writing_mode(&self) -> WritingMode {
        WritingMode::Horizontal
    }

    /// Decode one character unit from the head of `bytes`.
    fn next_char(&self, bytes: &[u8]) -> Decoded;
}

/// Receiver for glyph outline segments, in font units.
pub trait OutlineSink {
    fn move_to(&mut self, x: f32, y: f32);
    fn line_to(&mut self, x: f32, y: f32);
    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32);
    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32);
    fn close(&mut self);
}

/// A drawable font face: everything a surface needs to rasterize glyphs.
pub trait GlyphFace {
    /// Emit the outline of `glyph` into `sink`. Returns false if the
    /// glyph has no outline.
    fn outline(&self, glyph: u32, sink: &mut dyn OutlineSink) -> bool;

    /// Font units per em square.
    fn units_per_em(&self) -> u16;
}

/// A resolved font handle returned by the engine.
///
/// The handle stays owned by the cache; callers hold shared references
/// for the duration of a text operation.
pub trait DeviceFont {
    /// The drawable face backing this font.
    fn face(&self) -> Rc<dyn GlyphFace>;

    /// Map a character code (with its Unicode fallback) to a glyph index.
    fn glyph(&self, code: u32, unicode: &[u32]) -> u32;

    /// Width correction factor when this face substitutes for a document
    /// font with different metrics.
    fn substitution_correction(&self, _source: &dyn SourceFont) -> f64 {
        1.0
    }
}

/// Builds device fonts from interpreter fonts; the external half of font
/// resolution. A loader that cannot produce a usable face returns `None`.
pub trait FontLoader {
    fn load(&mut self, source: &dyn SourceFont) -> Option<Rc<dyn DeviceFont>>;
}

/// Cache-backed font resolution.
///
/// Recreated wholesale at document boundaries; resolved handles never
/// outlive the document that produced them.
pub struct FontEngine {
    loader: Box<dyn FontLoader>,
    cache: BoundedCache<FontId, Rc<dyn DeviceFont>>,
}

impl FontEngine {
    pub fn new(loader: Box<dyn FontLoader>) -> Self {
        Self::with_capacity(loader, FONT_CACHE_SIZE)
    }

    pub fn with_capacity(loader: Box<dyn FontLoader>, capacity: usize) -> Self {
        FontEngine {
            loader,
            cache: BoundedCache::new(capacity),
        }
    }

    /// Resolve the device font for `source`, reusing a cached handle when
    /// one exists.
    pub fn font_for(&mut self, source: &dyn SourceFont) -> Option<Rc<dyn DeviceFont>> {
        let id = source.id();
        if let Some(font) = self.cache.lookup(&id) {
            return Some(Rc::clone(font));
        }
        debug!("resolving font {:?}", id);
        let font = self.loader.load(source)?;
        self.cache.put(id, Rc::clone(&font));
        Some(font)
    }
}
