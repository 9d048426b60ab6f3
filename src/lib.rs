//! # PDF-X Render: the drawing backend for interpreted PDF content
//!
//! This crate sits between a content-stream interpreter and a 2D
//! vector-drawing surface. The interpreter decodes document structure and
//! drives a [`RenderingContext`] operator by operator; the context tracks
//! graphics state, converts path geometry and text runs into device
//! space, decodes image data into surface pixel formats, and issues the
//! corresponding surface calls.
//!
//! ## Architecture
//!
//! - [`context::RenderingContext`]: the pipeline driven by the
//!   interpreter (state updates, fill/stroke/clip, text, and images).
//! - [`device::Surface`]: the drawing-surface contract; backends plug in
//!   here. A [`device::TestSurface`] records calls for testing, and the
//!   `rendering` feature provides a tiny-skia rasterizer.
//! - [`font`]: the font-resolution seam. Interpreter-side fonts come in
//!   as [`font::SourceFont`], resolved faces go out as
//!   [`font::DeviceFont`], with a bounded cache in between.
//! - [`state::GraphicsState`]: the interpreter-maintained state passed
//!   into every operation, with the user-to-device transform helpers.
//! - [`image`]: pixel-format conversion for sampled images and 1-bit
//!   masks, including color-key transparency.
//! - [`cache::BoundedCache`]: the generic move-to-front cache backing
//!   font resolution.
//!
//! ## Quick start
//!
//! ```rust
//! use pdf_x_render::{GraphicsState, RenderingContext, TestSurface};
//!
//! let mut context = RenderingContext::new(TestSurface::new());
//! let mut state = GraphicsState::new();
//!
//! state.path.move_to(10.0, 10.0);
//! state.path.line_to(100.0, 10.0);
//! state.path.line_to(100.0, 100.0);
//! state.path.close();
//! context.fill(&state);
//! ```

pub mod cache;
pub mod context;
pub mod device;
pub mod error;
pub mod font;
pub mod image;
pub mod path;
pub mod state;

#[cfg(feature = "rendering")]
pub mod skia;

#[cfg(feature = "rendering")]
pub mod ttf;

pub use cache::BoundedCache;
pub use context::{Link, LinkHandler, RenderingContext, Type3Handler};
pub use device::{FillRule, Glyph, ImageFormat, ImageView, Surface, SurfaceOp, TestSurface};
pub use error::{RenderError, RenderResult};
pub use font::{
    Decoded, DeviceFont, FontEngine, FontId, FontLoader, GlyphFace, OutlineSink, SourceFont,
    WritingMode,
};
pub use image::{ColorMap, ComponentRange, ImageBuffer, PackedSampleReader, SampleReader};
pub use path::{Path, PathPoint, Subpath};
pub use state::{DashPattern, GraphicsState, LineCap, LineJoin, Matrix, Rgb};

#[cfg(feature = "rendering")]
pub use skia::SkiaSurface;

#[cfg(feature = "rendering")]
pub use ttf::{TtfFont, TtfLoader};
