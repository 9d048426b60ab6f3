//! Surface trait: the seam between the rendering pipeline and the 2D
//! vector-drawing backend.
//!
//! The trait is shaped after stateful vector canvases: the surface holds
//! a current path, a current source color, an installed font, and a clip
//! region, all scoped by its own save/restore stack. Coordinates arriving
//! here are device-space; the pipeline has already applied the CTM.

use std::rc::Rc;

use crate::error::RenderResult;
use crate::font::GlyphFace;
use crate::state::{LineCap, LineJoin, Matrix, Rgb};

/// Fill rule for fill and clip operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    Winding,
    EvenOdd,
}

/// One positioned glyph of a run, in device space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub index: u32,
    pub x: f64,
    pub y: f64,
}

/// Pixel layout of an [`ImageView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// 4 bytes per pixel, packed B,G,R,A.
    Bgra32,
    /// 1 byte per pixel, alpha only.
    Alpha8,
}

/// A borrowed view of decoded pixel data.
///
/// The buffer stays owned by the caller and is only valid for the
/// duration of one paint call.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub width: usize,
    pub height: usize,
    /// Bytes per row, including padding.
    pub stride: usize,
    pub format: ImageFormat,
    pub data: &'a [u8],
}

/// A 2D vector-drawing surface.
///
/// Path-building calls accumulate into the surface's current path;
/// `fill` and `stroke` consume it, `clip` intersects without consuming
/// (callers reset explicitly via `clear_path`). `save_state`/
/// `restore_state` scope the source color, style attributes, installed
/// font, and clip region.
pub trait Surface {
    // Path construction.
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);
    fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64);
    fn close_path(&mut self);
    fn clear_path(&mut self);

    // Painting.
    fn set_source_rgb(&mut self, color: Rgb);
    fn fill(&mut self, rule: FillRule);
    fn stroke(&mut self);
    /// Intersect the clip region with the current path.
    fn clip(&mut self, rule: FillRule);

    // State.
    fn save_state(&mut self);
    fn restore_state(&mut self);
    fn reset_clip(&mut self);

    // Style attributes, in device units.
    fn set_line_dash(&mut self, lengths: &[f64], phase: f64);
    fn set_line_cap(&mut self, cap: LineCap);
    fn set_line_join(&mut self, join: LineJoin);
    fn set_line_width(&mut self, width: f64);
    fn set_miter_limit(&mut self, limit: f64);
    fn set_tolerance(&mut self, tolerance: f64);

    // Text.
    /// Install the face and the font-space-to-device-space matrix used by
    /// the glyph calls below.
    fn set_font(&mut self, face: Rc<dyn GlyphFace>, matrix: Matrix);
    /// Fill a glyph run with the current source color.
    fn show_glyphs(&mut self, glyphs: &[Glyph]);
    /// Append glyph outlines to the current path.
    fn glyph_path(&mut self, glyphs: &[Glyph]);

    // Images. `matrix` maps device space to image pixel space (the
    // pattern transform); the buffer is borrowed for this call only.
    /// Paint a color image over the current clip region with
    /// highest-quality filtering.
    fn paint_image(&mut self, image: ImageView<'_>, matrix: Matrix) -> RenderResult<()>;
    /// Paint the current source color through a stencil.
    fn mask_image(&mut self, stencil: ImageView<'_>, matrix: Matrix) -> RenderResult<()>;
}

/// Everything a [`TestSurface`] records.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    MoveTo(f64, f64),
    LineTo(f64, f64),
    CurveTo(f64, f64, f64, f64, f64, f64),
    ClosePath,
    ClearPath,
    SetSourceRgb(Rgb),
    Fill(FillRule),
    Stroke,
    Clip(FillRule),
    SaveState,
    RestoreState,
    ResetClip,
    SetLineDash(Vec<f64>, f64),
    SetLineCap(LineCap),
    SetLineJoin(LineJoin),
    SetLineWidth(f64),
    SetMiterLimit(f64),
    SetTolerance(f64),
    SetFont(Matrix),
    ShowGlyphs(Vec<Glyph>),
    GlyphPath(Vec<Glyph>),
    PaintImage {
        width: usize,
        height: usize,
        stride: usize,
        format: ImageFormat,
        data: Vec<u8>,
        matrix: Matrix,
    },
    MaskImage {
        width: usize,
        height: usize,
        stride: usize,
        data: Vec<u8>,
        matrix: Matrix,
    },
}

/// Recording surface for tests: stores every call in order.
#[derive(Debug, Default)]
pub struct TestSurface {
    ops: Vec<SurfaceOp>,
}

impl TestSurface {
    pub fn new() -> Self {
        TestSurface::default()
    }

    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Number of recorded ops matching a predicate.
    pub fn count(&self, pred: impl Fn(&SurfaceOp) -> bool) -> usize {
        self.ops.iter().filter(|op| pred(op)).count()
    }
}

impl Surface for TestSurface {
    fn move_to(&mut self, x: f64, y: f64) {
        self.ops.push(SurfaceOp::MoveTo(x, y));
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.ops.push(SurfaceOp::LineTo(x, y));
    }

    fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) {
        self.ops.push(SurfaceOp::CurveTo(x1, y1, x2, y2, x3, y3));
    }

    fn close_path(&mut self) {
        self.ops.push(SurfaceOp::ClosePath);
    }

    fn clear_path(&mut self) {
        self.ops.push(SurfaceOp::ClearPath);
    }

    fn set_source_rgb(&mut self, color: Rgb) {
        self.ops.push(SurfaceOp::SetSourceRgb(color));
    }

    fn fill(&mut self, rule: FillRule) {
        self.ops.push(SurfaceOp::Fill(rule));
    }

    fn stroke(&mut self) {
        self.ops.push(SurfaceOp::Stroke);
    }

    fn clip(&mut self, rule: FillRule) {
        self.ops.push(SurfaceOp::Clip(rule));
    }

    fn save_state(&mut self) {
        self.ops.push(SurfaceOp::SaveState);
    }

    fn restore_state(&mut self) {
        self.ops.push(SurfaceOp::RestoreState);
    }

    fn reset_clip(&mut self) {
        self.ops.push(SurfaceOp::ResetClip);
    }

    fn set_line_dash(&mut self, lengths: &[f64], phase: f64) {
        self.ops.push(SurfaceOp::SetLineDash(lengths.to_vec(), phase));
    }

    fn set_line_cap(&mut self, cap: LineCap) {
        self.ops.push(SurfaceOp::SetLineCap(cap));
    }

    fn set_line_join(&mut self, join: LineJoin) {
        self.ops.push(SurfaceOp::SetLineJoin(join));
    }

    fn set_line_width(&mut self, width: f64) {
        self.ops.push(SurfaceOp::SetLineWidth(width));
    }

    fn set_miter_limit(&mut self, limit: f64) {
        self.ops.push(SurfaceOp::SetMiterLimit(limit));
    }

    fn set_tolerance(&mut self, tolerance: f64) {
        self.ops.push(SurfaceOp::SetTolerance(tolerance));
    }

    fn set_font(&mut self, _face: Rc<dyn GlyphFace>, matrix: Matrix) {
        self.ops.push(SurfaceOp::SetFont(matrix));
    }

    fn show_glyphs(&mut self, glyphs: &[Glyph]) {
        self.ops.push(SurfaceOp::ShowGlyphs(glyphs.to_vec()));
    }

    fn glyph_path(&mut self, glyphs: &[Glyph]) {
        self.ops.push(SurfaceOp::GlyphPath(glyphs.to_vec()));
    }

    fn paint_image(&mut self, image: ImageView<'_>, matrix: Matrix) -> RenderResult<()> {
        self.ops.push(SurfaceOp::PaintImage {
            width: image.width,
            height: image.height,
            stride: image.stride,
            format: image.format,
            data: image.data.to_vec(),
            matrix,
        });
        Ok(())
    }

    fn mask_image(&mut self, stencil: ImageView<'_>, matrix: Matrix) -> RenderResult<()> {
        self.ops.push(SurfaceOp::MaskImage {
            width: stencil.width,
            height: stencil.height,
            stride: stencil.stride,
            data: stencil.data.to_vec(),
            matrix,
        });
        Ok(())
    }
}
