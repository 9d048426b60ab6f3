//! The rendering pipeline: translates interpreted drawing operations
//! into surface calls.
//!
//! The content-stream interpreter drives a [`RenderingContext`]
//! synchronously, operator by operator, passing the live graphics state
//! into each call. The context mirrors the state attributes the surface
//! needs (colors, styles, the resolved font) and performs the user-to-device
//! coordinate work: path emission, glyph positioning, and image placement.

use std::rc::Rc;

use log::{error, trace, warn};

use crate::device::{FillRule, Glyph, Surface};
use crate::error::RenderResult;
use crate::font::{DeviceFont, FontEngine, FontLoader, WritingMode};
use crate::image::{
    decode_color, decode_stencil, image_pattern_matrix, ColorMap, ComponentRange, SampleReader,
};
use crate::path::Path;
use crate::state::{GraphicsState, Rgb};

/// A link annotation: plain positioning data, rendered (if at all) by an
/// external handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Bounding rectangle in user space: x1, y1, x2, y2.
    pub rect: [f64; 4],
    pub target: Option<String>,
}

/// Optional collaborator for Type 3 glyph rendering.
///
/// The default implementation declines every character, which makes the
/// whole lifecycle a no-op.
pub trait Type3Handler {
    /// Called before a Type 3 character is drawn. Returning true claims
    /// the character; returning false leaves it to the interpreter.
    fn begin_char(
        &mut self,
        _state: &GraphicsState,
        _x: f64,
        _y: f64,
        _dx: f64,
        _dy: f64,
        _code: u32,
        _unicode: &[u32],
    ) -> bool {
        false
    }

    fn end_char(&mut self, _state: &GraphicsState) {}

    /// `d0`: glyph advance.
    fn set_width(&mut self, _state: &GraphicsState, _wx: f64, _wy: f64) {}

    /// `d1`: glyph advance and bounding box.
    fn set_width_and_bbox(
        &mut self,
        _state: &GraphicsState,
        _wx: f64,
        _wy: f64,
        _llx: f64,
        _lly: f64,
        _urx: f64,
        _ury: f64,
    ) {
    }
}

/// Optional collaborator for link-annotation rendering.
pub trait LinkHandler {
    fn draw_link(&mut self, _link: &Link) {}
}

/// The rendering backend driven by the interpreter.
///
/// Owns the drawing surface for the current page and the font engine for
/// the current document. All other state arrives by reference with each
/// operation.
pub struct RenderingContext<S: Surface> {
    surface: S,
    font_engine: Option<FontEngine>,
    fill_color: Rgb,
    stroke_color: Rgb,
    current_font: Option<Rc<dyn DeviceFont>>,
    /// Set whenever the device font matrix may be stale; cleared only by
    /// a successful font resolution.
    need_font_update: bool,
    type3: Option<Box<dyn Type3Handler>>,
    links: Option<Box<dyn LinkHandler>>,
}

impl<S: Surface> RenderingContext<S> {
    pub fn new(surface: S) -> Self {
        RenderingContext {
            surface,
            font_engine: None,
            fill_color: Rgb::BLACK,
            stroke_color: Rgb::BLACK,
            current_font: None,
            need_font_update: true,
            type3: None,
            links: None,
        }
    }

    /// Access the surface (for inspection or pixel readback).
    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn set_type3_handler(&mut self, handler: Box<dyn Type3Handler>) {
        self.type3 = Some(handler);
    }

    pub fn set_link_handler(&mut self, handler: Box<dyn LinkHandler>) {
        self.links = Some(handler);
    }

    // === Document and page lifecycle ===

    /// Begin a document: rebuild the font engine around the given loader,
    /// discarding every cached font.
    pub fn start_doc(&mut self, loader: Box<dyn FontLoader>) {
        self.font_engine = Some(FontEngine::new(loader));
        self.current_font = None;
        self.need_font_update = true;
    }

    /// Begin a page: replace the surface wholesale and apply the default
    /// drawing attributes.
    pub fn start_page(&mut self, page_num: u32, surface: S, _state: &GraphicsState) {
        trace!("start page {}", page_num);
        self.surface = surface;
        self.surface.reset_clip();
        self.surface.set_source_rgb(Rgb::BLACK);
        self.surface.set_line_cap(Default::default());
        self.surface.set_line_join(Default::default());
        self.surface.set_line_dash(&[], 0.0);
        self.surface.set_miter_limit(10.0);
        self.surface.set_tolerance(1.0);
        self.fill_color = Rgb::BLACK;
        self.stroke_color = Rgb::BLACK;
        self.need_font_update = true;
    }

    pub fn end_page(&mut self) {}

    // === Graphics state tracking ===

    /// Push a surface state level. Pairing with `restore_state` is the
    /// caller's responsibility.
    pub fn save_state(&mut self, _state: &GraphicsState) {
        trace!("save");
        self.surface.save_state();
    }

    /// Pop a surface state level. Device fonts are scoped to a state
    /// level, so the font is re-resolved before the next text operation.
    pub fn restore_state(&mut self, _state: &GraphicsState) {
        trace!("restore");
        self.surface.restore_state();
        self.need_font_update = true;
    }

    /// Re-apply every style attribute, for when the surface's own state
    /// cannot be assumed current.
    pub fn update_all(&mut self, state: &GraphicsState) {
        self.update_line_dash(state);
        self.update_line_join(state);
        self.update_line_cap(state);
        self.update_line_width(state);
        self.update_flatness(state);
        self.update_miter_limit(state);
        self.update_fill_color(state);
        self.update_stroke_color(state);
        self.need_font_update = true;
    }

    /// Re-derive the transform-dependent attributes after a CTM change:
    /// dash lengths and line widths are user-space values that must be
    /// rescaled into device units.
    pub fn update_ctm(&mut self, state: &GraphicsState) {
        self.update_line_dash(state);
        self.update_line_join(state);
        self.update_line_cap(state);
        self.update_line_width(state);
    }

    /// Push the dash pattern, each length transformed individually so
    /// anisotropic scaling is honored.
    pub fn update_line_dash(&mut self, state: &GraphicsState) {
        let transformed: Vec<f64> = state
            .dash
            .lengths
            .iter()
            .map(|&len| state.transform_width(len))
            .collect();
        let phase = state.transform_width(state.dash.phase);
        self.surface.set_line_dash(&transformed, phase);
    }

    pub fn update_flatness(&mut self, state: &GraphicsState) {
        self.surface.set_tolerance(state.flatness);
    }

    pub fn update_line_join(&mut self, state: &GraphicsState) {
        self.surface.set_line_join(state.line_join);
    }

    pub fn update_line_cap(&mut self, state: &GraphicsState) {
        self.surface.set_line_cap(state.line_cap);
    }

    pub fn update_miter_limit(&mut self, state: &GraphicsState) {
        self.surface.set_miter_limit(state.miter_limit);
    }

    pub fn update_line_width(&mut self, state: &GraphicsState) {
        trace!("line width: {}", state.transformed_line_width());
        self.surface.set_line_width(state.transformed_line_width());
    }

    pub fn update_fill_color(&mut self, state: &GraphicsState) {
        self.fill_color = state.fill_color;
        trace!("fill color: {:?}", self.fill_color);
    }

    pub fn update_stroke_color(&mut self, state: &GraphicsState) {
        self.stroke_color = state.stroke_color;
        trace!("stroke color: {:?}", self.stroke_color);
    }

    /// Resolve the current font and install face and matrix on the
    /// surface. The dirty flag stays set when resolution fails, so the
    /// next text operation retries.
    pub fn update_font(&mut self, state: &GraphicsState) {
        let Some(source) = state.font.as_ref() else {
            self.current_font = None;
            return;
        };
        let Some(engine) = self.font_engine.as_mut() else {
            warn!("text before document start; no font engine");
            self.current_font = None;
            return;
        };
        let Some(font) = engine.font_for(source.as_ref()) else {
            warn!("no usable font for {:?}", source.id());
            self.current_font = None;
            return;
        };

        let [mut a, mut b, c, d] = state.font_transform();
        a *= state.horiz_scaling;
        b *= state.horiz_scaling;
        // Font space is y-up; the surface draws glyphs y-down. The
        // substitution correction rescales widths when the resolved face
        // stands in for a font with different metrics.
        let w = font.substitution_correction(source.as_ref());
        let matrix = [a, -b * w, c, -d * w, 0.0, 0.0];
        trace!("font matrix: {:?}", matrix);

        self.surface.set_font(font.face(), matrix);
        self.current_font = Some(font);
        self.need_font_update = false;
    }

    // === Path painting ===

    /// Emit a path to the surface in device space.
    ///
    /// With `snap_to_grid`, every emitted coordinate is rounded to the
    /// nearest integer after its own transform, curve control points
    /// included.
    fn emit_path(&mut self, state: &GraphicsState, path: &Path, snap_to_grid: bool) {
        let device_point = |x: f64, y: f64| {
            let (dx, dy) = state.transform(x, y);
            if snap_to_grid {
                (dx.round(), dy.round())
            } else {
                (dx, dy)
            }
        };

        for subpath in path.subpaths() {
            let points = subpath.points();
            let Some((first, rest)) = points.split_first() else {
                continue;
            };
            let (x, y) = device_point(first.x, first.y);
            self.surface.move_to(x, y);
            trace!("move_to {}, {}", x, y);

            let mut i = 0;
            while i < rest.len() {
                if rest[i].curve && i + 2 < rest.len() {
                    let (x1, y1) = device_point(rest[i].x, rest[i].y);
                    let (x2, y2) = device_point(rest[i + 1].x, rest[i + 1].y);
                    let (x3, y3) = device_point(rest[i + 2].x, rest[i + 2].y);
                    self.surface.curve_to(x1, y1, x2, y2, x3, y3);
                    trace!("curve_to {}, {}  {}, {}  {}, {}", x1, y1, x2, y2, x3, y3);
                    i += 3;
                } else {
                    // A curve tag without its two trailing points is
                    // degenerate input; treat the point as a line vertex.
                    let (x, y) = device_point(rest[i].x, rest[i].y);
                    self.surface.line_to(x, y);
                    trace!("line_to {}, {}", x, y);
                    i += 1;
                }
            }
            if subpath.is_closed() {
                trace!("close");
                self.surface.close_path();
            }
        }
    }

    /// Stroke the current path with the stroke color and the style
    /// attributes already pushed to the surface.
    pub fn stroke(&mut self, state: &GraphicsState) {
        self.emit_path(state, &state.path, false);
        self.surface.set_source_rgb(self.stroke_color);
        trace!("stroke");
        self.surface.stroke();
    }

    /// Fill the current path with the winding rule.
    pub fn fill(&mut self, state: &GraphicsState) {
        self.emit_path(state, &state.path, false);
        self.surface.set_source_rgb(self.fill_color);
        trace!("fill");
        self.surface.fill(FillRule::Winding);
    }

    /// Fill the current path with the even-odd rule.
    pub fn eo_fill(&mut self, state: &GraphicsState) {
        self.emit_path(state, &state.path, false);
        self.surface.set_source_rgb(self.fill_color);
        trace!("fill-eo");
        self.surface.fill(FillRule::EvenOdd);
    }

    /// Intersect the clip region with the current path (winding rule),
    /// consuming the path: the buffer is left empty for the next path
    /// operator.
    pub fn clip(&mut self, state: &mut GraphicsState, snap_to_grid: bool) {
        let path = std::mem::take(&mut state.path);
        self.emit_path(state, &path, snap_to_grid);
        self.surface.clip(FillRule::Winding);
        self.surface.clear_path();
        trace!("clip");
    }

    /// Intersect the clip region with the current path (even-odd rule),
    /// consuming the path. Grid snapping is never applied here.
    pub fn eo_clip(&mut self, state: &mut GraphicsState) {
        let path = std::mem::take(&mut state.path);
        self.emit_path(state, &path, false);
        self.surface.clip(FillRule::EvenOdd);
        self.surface.clear_path();
        trace!("clip-eo");
    }

    // === Text ===

    /// Lay out and draw one string.
    ///
    /// Decodes the string one character unit at a time, computes each
    /// glyph's device position from the pen, rise, and glyph origin, and
    /// dispatches the accumulated run according to the render mode. The
    /// draw is skipped entirely when no renderable font is available or
    /// the render mode is invisible.
    pub fn draw_string(&mut self, state: &GraphicsState, bytes: &[u8]) {
        let Some(source) = state.font.as_ref().map(Rc::clone) else {
            warn!("text operation without a font");
            return;
        };
        let wmode = source.writing_mode();

        if self.need_font_update {
            self.update_font(state);
        }
        let Some(font) = self.current_font.clone() else {
            return;
        };

        // Invisible text still updates the pen on the interpreter side;
        // nothing is drawn here.
        if state.render_mode == 3 {
            return;
        }
        if bytes.is_empty() {
            return;
        }

        let (rise_x, rise_y) = state.text_transform_delta(0.0, state.rise);
        let mut cur_x = state.cur_x;
        let mut cur_y = state.cur_y;
        let mut glyphs = Vec::with_capacity(bytes.len());

        let mut input = bytes;
        while !input.is_empty() {
            let decoded = source.next_char(input);
            let n = decoded.consumed.clamp(1, input.len());

            let (mut dx, mut dy) = decoded.advance;
            if wmode == WritingMode::Vertical {
                dx *= state.font_size;
                dy = dy * state.font_size + state.char_space;
                if n == 1 && input[0] == b' ' {
                    dy += state.word_space;
                }
            } else {
                dx = dx * state.font_size + state.char_space;
                if n == 1 && input[0] == b' ' {
                    dx += state.word_space;
                }
                dx *= state.horiz_scaling;
                dy *= state.font_size;
            }
            let origin_x = decoded.origin.0 * state.font_size;
            let origin_y = decoded.origin.1 * state.font_size;

            let (tdx, tdy) = state.text_transform_delta(dx, dy);
            let (tox, toy) = state.text_transform_delta(origin_x, origin_y);
            let x = cur_x + rise_x - tox;
            let y = cur_y + rise_y - toy;
            let (device_x, device_y) = state.transform(x, y);

            glyphs.push(Glyph {
                index: font.glyph(decoded.code, &decoded.unicode),
                x: device_x,
                y: device_y,
            });
            cur_x += tdx;
            cur_y += tdy;
            input = &input[n..];
        }

        let mode = state.render_mode;
        if mode & 1 == 0 {
            trace!("fill string, {} glyphs", glyphs.len());
            self.surface.set_source_rgb(self.fill_color);
            self.surface.show_glyphs(&glyphs);
        }
        if matches!(mode & 3, 1 | 2) {
            trace!("stroke string, {} glyphs", glyphs.len());
            self.surface.set_source_rgb(self.stroke_color);
            self.surface.glyph_path(&glyphs);
            self.surface.stroke();
        }
        if mode & 4 != 0 {
            // Only this string's glyphs join the clip; a text object with
            // several clip-mode strings will not union them.
            trace!("clip string, {} glyphs", glyphs.len());
            self.surface.glyph_path(&glyphs);
            self.surface.clip(FillRule::Winding);
            self.surface.clear_path();
        }
    }

    pub fn end_text_object(&mut self, _state: &GraphicsState) {}

    // === Type 3 glyphs ===

    pub fn begin_type3_char(
        &mut self,
        state: &GraphicsState,
        x: f64,
        y: f64,
        dx: f64,
        dy: f64,
        code: u32,
        unicode: &[u32],
    ) -> bool {
        match self.type3.as_mut() {
            Some(handler) => handler.begin_char(state, x, y, dx, dy, code, unicode),
            None => false,
        }
    }

    pub fn end_type3_char(&mut self, state: &GraphicsState) {
        if let Some(handler) = self.type3.as_mut() {
            handler.end_char(state);
        }
    }

    pub fn type3_d0(&mut self, state: &GraphicsState, wx: f64, wy: f64) {
        if let Some(handler) = self.type3.as_mut() {
            handler.set_width(state, wx, wy);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn type3_d1(
        &mut self,
        state: &GraphicsState,
        wx: f64,
        wy: f64,
        llx: f64,
        lly: f64,
        urx: f64,
        ury: f64,
    ) {
        if let Some(handler) = self.type3.as_mut() {
            handler.set_width_and_bbox(state, wx, wy, llx, lly, urx, ury);
        }
    }

    // === Annotations ===

    pub fn draw_link(&mut self, link: &Link) {
        if let Some(handler) = self.links.as_mut() {
            handler.draw_link(link);
        }
    }

    // === Images ===

    /// Draw a 1-bit image mask: painted pixels carry the fill color.
    ///
    /// A failed buffer allocation is reported and abandons the draw with
    /// no surface mutation.
    pub fn draw_image_mask(
        &mut self,
        state: &GraphicsState,
        reader: &mut dyn SampleReader,
        width: usize,
        height: usize,
        invert: bool,
        _inline: bool,
    ) {
        if let Err(err) = self.draw_image_mask_inner(state, reader, width, height, invert) {
            error!("image mask draw failed: {}", err);
        }
    }

    fn draw_image_mask_inner(
        &mut self,
        state: &GraphicsState,
        reader: &mut dyn SampleReader,
        width: usize,
        height: usize,
        invert: bool,
    ) -> RenderResult<()> {
        trace!("draw_image_mask {}x{}, ctm {:?}", width, height, state.ctm);
        let buffer = decode_stencil(reader, width, height, invert)?;
        let Some(matrix) = image_pattern_matrix(&state.ctm, width, height) else {
            warn!("degenerate transform for {}x{} mask; skipped", width, height);
            return Ok(());
        };
        self.surface.set_source_rgb(self.fill_color);
        self.surface.mask_image(buffer.view(), matrix)
    }

    /// Draw a sampled color image through the supplied color map.
    ///
    /// `transparent` carries the color-key ranges: a pixel is transparent
    /// only when every component falls inside its range.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image(
        &mut self,
        state: &GraphicsState,
        reader: &mut dyn SampleReader,
        width: usize,
        height: usize,
        color_map: &dyn ColorMap,
        transparent: Option<&[ComponentRange]>,
        _inline: bool,
    ) {
        if let Err(err) =
            self.draw_image_inner(state, reader, width, height, color_map, transparent)
        {
            error!("image draw failed: {}", err);
        }
    }

    fn draw_image_inner(
        &mut self,
        state: &GraphicsState,
        reader: &mut dyn SampleReader,
        width: usize,
        height: usize,
        color_map: &dyn ColorMap,
        transparent: Option<&[ComponentRange]>,
    ) -> RenderResult<()> {
        trace!("draw_image {}x{}, ctm {:?}", width, height, state.ctm);
        let buffer = decode_color(reader, width, height, color_map, transparent)?;
        let Some(matrix) = image_pattern_matrix(&state.ctm, width, height) else {
            warn!("degenerate transform for {}x{} image; skipped", width, height);
            return Ok(());
        };
        self.surface.paint_image(buffer.view(), matrix)
    }
}
