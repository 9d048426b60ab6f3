//! A tiny-skia backed drawing surface.

use std::rc::Rc;

use log::warn;
use tiny_skia::{
    Color, FillRule as SkFillRule, FilterQuality, LineCap as SkLineCap, LineJoin as SkLineJoin,
    Mask, Paint, PathBuilder, Pattern, Pixmap, SpreadMode, Stroke, StrokeDash, Transform,
};

use crate::device::{FillRule, Glyph, ImageFormat, ImageView, Surface};
use crate::error::{RenderError, RenderResult};
use crate::font::{GlyphFace, OutlineSink};
use crate::state::{invert_matrix, LineCap, LineJoin, Matrix, Rgb};

fn to_sk_color(color: Rgb) -> Color {
    Color::from_rgba(
        color.r.clamp(0.0, 1.0) as f32,
        color.g.clamp(0.0, 1.0) as f32,
        color.b.clamp(0.0, 1.0) as f32,
        1.0,
    )
    .unwrap_or_else(|| Color::BLACK)
}

fn to_sk_fill_rule(rule: FillRule) -> SkFillRule {
    match rule {
        FillRule::Winding => SkFillRule::Winding,
        FillRule::EvenOdd => SkFillRule::EvenOdd,
    }
}

fn to_sk_transform(m: &Matrix) -> Transform {
    Transform::from_row(
        m[0] as f32,
        m[1] as f32,
        m[2] as f32,
        m[3] as f32,
        m[4] as f32,
        m[5] as f32,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PathSeg {
    MoveTo(f64, f64),
    LineTo(f64, f64),
    CurveTo(f64, f64, f64, f64, f64, f64),
    Close,
}

#[derive(Clone)]
struct SkiaState {
    source: Rgb,
    line_width: f32,
    miter_limit: f32,
    line_cap: SkLineCap,
    line_join: SkLineJoin,
    dash_lengths: Vec<f32>,
    dash_phase: f32,
    font: Option<(Rc<dyn GlyphFace>, Matrix)>,
    clip: Option<Mask>,
}

impl Default for SkiaState {
    fn default() -> Self {
        SkiaState {
            source: Rgb::BLACK,
            line_width: 1.0,
            miter_limit: 10.0,
            line_cap: SkLineCap::Butt,
            line_join: SkLineJoin::Miter,
            dash_lengths: Vec::new(),
            dash_phase: 0.0,
            font: None,
            clip: None,
        }
    }
}

/// Rasterizing surface over an owned pixmap.
pub struct SkiaSurface {
    pixmap: Pixmap,
    states: Vec<SkiaState>,
    path: Vec<PathSeg>,
}

impl SkiaSurface {
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            RenderError::Surface(format!("cannot allocate a {}x{} pixmap", width, height))
        })?;
        Ok(SkiaSurface {
            pixmap,
            states: vec![SkiaState::default()],
            path: Vec::new(),
        })
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    fn state(&self) -> &SkiaState {
        self.states.last().unwrap()
    }

    fn state_mut(&mut self) -> &mut SkiaState {
        self.states.last_mut().unwrap()
    }

    fn build_path(segs: &[PathSeg]) -> Option<tiny_skia::Path> {
        let mut builder = PathBuilder::new();
        for seg in segs {
            match *seg {
                PathSeg::MoveTo(x, y) => builder.move_to(x as f32, y as f32),
                PathSeg::LineTo(x, y) => builder.line_to(x as f32, y as f32),
                PathSeg::CurveTo(x1, y1, x2, y2, x3, y3) => builder.cubic_to(
                    x1 as f32, y1 as f32, x2 as f32, y2 as f32, x3 as f32, y3 as f32,
                ),
                PathSeg::Close => builder.close(),
            }
        }
        builder.finish()
    }

    fn solid_paint(&self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color(to_sk_color(self.state().source));
        paint.anti_alias = true;
        paint
    }

    fn stroke_params(&self) -> Stroke {
        let state = self.state();
        let dash = if state.dash_lengths.is_empty() {
            None
        } else {
            // Odd-length dash arrays repeat to an even cycle.
            let mut lengths = state.dash_lengths.clone();
            if lengths.len() % 2 != 0 {
                lengths.extend_from_within(..);
            }
            StrokeDash::new(lengths, state.dash_phase)
        };
        Stroke {
            width: if state.line_width > 0.0 {
                state.line_width
            } else {
                // Zero-width strokes render as thin hairlines.
                1.0
            },
            miter_limit: state.miter_limit,
            line_cap: state.line_cap,
            line_join: state.line_join,
            dash,
        }
    }

    /// Outline a glyph run into path segments, positioned in device
    /// space through the installed font matrix.
    fn glyph_segments(&self, glyphs: &[Glyph]) -> Vec<PathSeg> {
        let Some((face, matrix)) = self.state().font.clone() else {
            warn!("glyph run with no font installed");
            return Vec::new();
        };
        let upem = face.units_per_em();
        let scale = if upem > 0 { 1.0 / upem as f64 } else { 1e-3 };
        let [a, b, c, d, _, _] = matrix;

        let mut segs = Vec::new();
        for glyph in glyphs {
            let transform = [a * scale, b * scale, c * scale, d * scale, glyph.x, glyph.y];
            let mut sink = TransformSink {
                transform,
                segs: &mut segs,
            };
            face.outline(glyph.index, &mut sink);
        }
        segs
    }

    /// Build the pattern source and paint it across its device-space
    /// footprint, honoring the clip.
    fn pattern_fill(&mut self, pattern: Pixmap, matrix: Matrix) -> RenderResult<()> {
        // `matrix` maps device space to image space; the shader and the
        // footprint quad need the image-to-device direction.
        let Some(forward) = invert_matrix(&matrix) else {
            warn!("non-invertible pattern transform; image skipped");
            return Ok(());
        };
        let w = pattern.width() as f64;
        let h = pattern.height() as f64;
        let apply = |x: f64, y: f64| {
            (
                forward[0] * x + forward[2] * y + forward[4],
                forward[1] * x + forward[3] * y + forward[5],
            )
        };
        let corners = [
            apply(0.0, 0.0),
            apply(w, 0.0),
            apply(w, h),
            apply(0.0, h),
        ];
        let mut builder = PathBuilder::new();
        builder.move_to(corners[0].0 as f32, corners[0].1 as f32);
        for &(x, y) in &corners[1..] {
            builder.line_to(x as f32, y as f32);
        }
        builder.close();
        let Some(quad) = builder.finish() else {
            return Ok(());
        };

        let mut paint = Paint::default();
        paint.shader = Pattern::new(
            pattern.as_ref(),
            SpreadMode::Pad,
            FilterQuality::Bicubic,
            1.0,
            to_sk_transform(&forward),
        );
        paint.anti_alias = true;

        let clip = self.states.last().and_then(|s| s.clip.as_ref());
        self.pixmap
            .fill_path(&quad, &paint, SkFillRule::Winding, Transform::identity(), clip);
        Ok(())
    }
}

struct TransformSink<'a> {
    transform: Matrix,
    segs: &'a mut Vec<PathSeg>,
}

impl TransformSink<'_> {
    fn map(&self, x: f32, y: f32) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.transform;
        let (x, y) = (x as f64, y as f64);
        (a * x + c * y + e, b * x + d * y + f)
    }
}

impl OutlineSink for TransformSink<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.segs.push(PathSeg::MoveTo(x, y));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.segs.push(PathSeg::LineTo(x, y));
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        // Degree-elevate quadratics; the path model carries cubics only.
        let (last_x, last_y) = match self.segs.last() {
            Some(
                PathSeg::MoveTo(x, y) | PathSeg::LineTo(x, y) | PathSeg::CurveTo(.., x, y),
            ) => (*x, *y),
            _ => self.map(x1, y1),
        };
        let (cx, cy) = self.map(x1, y1);
        let (ex, ey) = self.map(x, y);
        let c1 = (
            last_x + 2.0 / 3.0 * (cx - last_x),
            last_y + 2.0 / 3.0 * (cy - last_y),
        );
        let c2 = (ex + 2.0 / 3.0 * (cx - ex), ey + 2.0 / 3.0 * (cy - ey));
        self.segs.push(PathSeg::CurveTo(c1.0, c1.1, c2.0, c2.1, ex, ey));
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.segs.push(PathSeg::CurveTo(x1, y1, x2, y2, x, y));
    }

    fn close(&mut self) {
        self.segs.push(PathSeg::Close);
    }
}

impl Surface for SkiaSurface {
    fn move_to(&mut self, x: f64, y: f64) {
        self.path.push(PathSeg::MoveTo(x, y));
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.path.push(PathSeg::LineTo(x, y));
    }

    fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) {
        self.path.push(PathSeg::CurveTo(x1, y1, x2, y2, x3, y3));
    }

    fn close_path(&mut self) {
        self.path.push(PathSeg::Close);
    }

    fn clear_path(&mut self) {
        self.path.clear();
    }

    fn set_source_rgb(&mut self, color: Rgb) {
        self.state_mut().source = color;
    }

    fn fill(&mut self, rule: FillRule) {
        let segs = std::mem::take(&mut self.path);
        let Some(path) = Self::build_path(&segs) else {
            return;
        };
        let paint = self.solid_paint();
        let clip = self.states.last().and_then(|s| s.clip.as_ref());
        self.pixmap
            .fill_path(&path, &paint, to_sk_fill_rule(rule), Transform::identity(), clip);
    }

    fn stroke(&mut self) {
        let segs = std::mem::take(&mut self.path);
        let Some(path) = Self::build_path(&segs) else {
            return;
        };
        let paint = self.solid_paint();
        let stroke = self.stroke_params();
        let clip = self.states.last().and_then(|s| s.clip.as_ref());
        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), clip);
    }

    fn clip(&mut self, rule: FillRule) {
        let Some(path) = Self::build_path(&self.path) else {
            // Clipping against an empty path leaves nothing paintable.
            let (w, h) = (self.pixmap.width(), self.pixmap.height());
            self.state_mut().clip = Mask::new(w, h);
            return;
        };
        let sk_rule = to_sk_fill_rule(rule);
        let (w, h) = (self.pixmap.width(), self.pixmap.height());
        let clip = match self.state_mut().clip.take() {
            Some(mut mask) => {
                mask.intersect_path(&path, sk_rule, true, Transform::identity());
                Some(mask)
            }
            None => Mask::new(w, h).map(|mut mask| {
                mask.fill_path(&path, sk_rule, true, Transform::identity());
                mask
            }),
        };
        self.state_mut().clip = clip;
    }

    fn save_state(&mut self) {
        let current = self.state().clone();
        self.states.push(current);
    }

    fn restore_state(&mut self) {
        if self.states.len() > 1 {
            self.states.pop();
        }
    }

    fn reset_clip(&mut self) {
        self.state_mut().clip = None;
    }

    fn set_line_dash(&mut self, lengths: &[f64], phase: f64) {
        let state = self.state_mut();
        state.dash_lengths = lengths.iter().map(|&l| l as f32).collect();
        state.dash_phase = phase as f32;
    }

    fn set_line_cap(&mut self, cap: LineCap) {
        self.state_mut().line_cap = match cap {
            LineCap::Butt => SkLineCap::Butt,
            LineCap::Round => SkLineCap::Round,
            LineCap::ProjectingSquare => SkLineCap::Square,
        };
    }

    fn set_line_join(&mut self, join: LineJoin) {
        self.state_mut().line_join = match join {
            LineJoin::Miter => SkLineJoin::Miter,
            LineJoin::Round => SkLineJoin::Round,
            LineJoin::Bevel => SkLineJoin::Bevel,
        };
    }

    fn set_line_width(&mut self, width: f64) {
        self.state_mut().line_width = width as f32;
    }

    fn set_miter_limit(&mut self, limit: f64) {
        self.state_mut().miter_limit = limit as f32;
    }

    fn set_tolerance(&mut self, _tolerance: f64) {
        // The rasterizer chooses its own flattening tolerance.
    }

    fn set_font(&mut self, face: Rc<dyn GlyphFace>, matrix: Matrix) {
        self.state_mut().font = Some((face, matrix));
    }

    fn show_glyphs(&mut self, glyphs: &[Glyph]) {
        let segs = self.glyph_segments(glyphs);
        let Some(path) = Self::build_path(&segs) else {
            return;
        };
        let paint = self.solid_paint();
        let clip = self.states.last().and_then(|s| s.clip.as_ref());
        self.pixmap
            .fill_path(&path, &paint, SkFillRule::Winding, Transform::identity(), clip);
    }

    fn glyph_path(&mut self, glyphs: &[Glyph]) {
        let mut segs = self.glyph_segments(glyphs);
        self.path.append(&mut segs);
    }

    fn paint_image(&mut self, image: ImageView<'_>, matrix: Matrix) -> RenderResult<()> {
        debug_assert_eq!(image.format, ImageFormat::Bgra32);
        let pattern = pixmap_from_bgra(&image)?;
        self.pattern_fill(pattern, matrix)
    }

    fn mask_image(&mut self, stencil: ImageView<'_>, matrix: Matrix) -> RenderResult<()> {
        debug_assert_eq!(stencil.format, ImageFormat::Alpha8);
        let pattern = pixmap_from_stencil(&stencil, self.state().source)?;
        self.pattern_fill(pattern, matrix)
    }
}

fn new_pattern_pixmap(width: usize, height: usize) -> RenderResult<Pixmap> {
    let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
        return Err(RenderError::ImageTooLarge { width, height });
    };
    Pixmap::new(w, h)
        .ok_or_else(|| RenderError::Surface(format!("cannot allocate a {}x{} pattern", w, h)))
}

/// Convert packed B,G,R,A bytes into a premultiplied pattern pixmap.
fn pixmap_from_bgra(image: &ImageView<'_>) -> RenderResult<Pixmap> {
    let mut pixmap = new_pattern_pixmap(image.width, image.height)?;
    let width = image.width;
    for (y, dest_row) in pixmap.pixels_mut().chunks_mut(width).enumerate() {
        let src_row = &image.data[y * image.stride..];
        for (x, dest) in dest_row.iter_mut().enumerate() {
            let px = &src_row[x * 4..x * 4 + 4];
            let (b, g, r, a) = (px[0], px[1], px[2], px[3]);
            *dest = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
        }
    }
    Ok(pixmap)
}

/// Expand an alpha stencil into a pattern pixmap carrying the source
/// color at each opaque pixel.
fn pixmap_from_stencil(stencil: &ImageView<'_>, source: Rgb) -> RenderResult<Pixmap> {
    let mut pixmap = new_pattern_pixmap(stencil.width, stencil.height)?;
    let width = stencil.width;
    let r = (255.0 * source.r.clamp(0.0, 1.0) + 0.5) as u8;
    let g = (255.0 * source.g.clamp(0.0, 1.0) + 0.5) as u8;
    let b = (255.0 * source.b.clamp(0.0, 1.0) + 0.5) as u8;
    for (y, dest_row) in pixmap.pixels_mut().chunks_mut(width).enumerate() {
        let src_row = &stencil.data[y * stencil.stride..];
        for (x, dest) in dest_row.iter_mut().enumerate() {
            let a = src_row[x];
            *dest = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
        }
    }
    Ok(pixmap)
}
