//! Bundled font loader backed by ttf-parser.
//!
//! Turns raw TrueType/OpenType bytes into a resolved device font. Where
//! the bytes come from (embedded font programs, a system fallback) is the
//! caller's concern; the loader is constructed around a fetch closure.

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;
use rustc_hash::FxHashMap;
use ttf_parser::{Face, GlyphId};

use crate::font::{DeviceFont, FontLoader, GlyphFace, OutlineSink, SourceFont};

struct TtfFaceData {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    glyph_count: u16,
    /// code -> glyph index memo; cmap walks are the hot path of text runs.
    memo: RefCell<FxHashMap<u32, u16>>,
}

impl TtfFaceData {
    // ttf-parser faces borrow their backing bytes, so the face is
    // re-parsed per use instead of stored self-referentially. Parsing is
    // table-directory work only; outlines dominate the cost.
    fn with_face<R>(&self, f: impl FnOnce(&Face) -> R) -> Option<R> {
        Face::parse(&self.data, self.index).ok().map(|face| f(&face))
    }
}

struct SinkBridge<'a>(&'a mut dyn OutlineSink);

impl ttf_parser::OutlineBuilder for SinkBridge<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.0.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.0.curve_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.0.close();
    }
}

impl GlyphFace for TtfFaceData {
    fn outline(&self, glyph: u32, sink: &mut dyn OutlineSink) -> bool {
        let Ok(glyph) = u16::try_from(glyph) else {
            return false;
        };
        self.with_face(|face| {
            face.outline_glyph(GlyphId(glyph), &mut SinkBridge(sink))
                .is_some()
        })
        .unwrap_or(false)
    }

    fn units_per_em(&self) -> u16 {
        self.units_per_em
    }
}

/// A resolved font over owned TrueType/OpenType bytes.
pub struct TtfFont {
    face: Rc<TtfFaceData>,
}

impl TtfFont {
    /// Parse `data` (face `index` for collections). Returns `None` when
    /// the bytes do not form a usable face.
    pub fn parse(data: Vec<u8>, index: u32) -> Option<Self> {
        let (units_per_em, glyph_count) = {
            let face = Face::parse(&data, index).ok()?;
            (face.units_per_em(), face.number_of_glyphs())
        };
        Some(TtfFont {
            face: Rc::new(TtfFaceData {
                data,
                index,
                units_per_em,
                glyph_count,
                memo: RefCell::new(FxHashMap::default()),
            }),
        })
    }
}

impl DeviceFont for TtfFont {
    fn face(&self) -> Rc<dyn GlyphFace> {
        Rc::clone(&self.face) as Rc<dyn GlyphFace>
    }

    fn glyph(&self, code: u32, unicode: &[u32]) -> u32 {
        if let Some(&gid) = self.face.memo.borrow().get(&code) {
            return gid as u32;
        }
        let mapped = self
            .face
            .with_face(|face| {
                unicode
                    .iter()
                    .chain(std::iter::once(&code))
                    .find_map(|&u| char::from_u32(u).and_then(|c| face.glyph_index(c)))
                    .map(|gid| gid.0)
            })
            .flatten();
        // Fall back to treating the code as a raw glyph index, which is
        // how CID-keyed data addresses the face.
        let gid = mapped.unwrap_or(if code < self.face.glyph_count as u32 {
            code as u16
        } else {
            0
        });
        self.face.memo.borrow_mut().insert(code, gid);
        gid as u32
    }
}

/// Font loader over a fetch closure that supplies font bytes per source
/// font.
pub struct TtfLoader<F> {
    fetch: F,
}

impl<F> TtfLoader<F>
where
    F: FnMut(&dyn SourceFont) -> Option<Vec<u8>>,
{
    pub fn new(fetch: F) -> Self {
        TtfLoader { fetch }
    }
}

impl<F> FontLoader for TtfLoader<F>
where
    F: FnMut(&dyn SourceFont) -> Option<Vec<u8>>,
{
    fn load(&mut self, source: &dyn SourceFont) -> Option<Rc<dyn DeviceFont>> {
        let data = (self.fetch)(source)?;
        match TtfFont::parse(data, 0) {
            Some(font) => Some(Rc::new(font) as Rc<dyn DeviceFont>),
            None => {
                warn!("unparseable font data for {:?}", source.id());
                None
            }
        }
    }
}
