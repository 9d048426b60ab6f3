//! Graphics state mirrored from the content-stream interpreter.
//!
//! The interpreter owns one [`GraphicsState`] per nested save level and
//! passes the live instance into every drawing operation. Transform
//! helpers live here because every downstream component (path emission,
//! text layout, image placement) needs user-to-device mapping through the
//! current matrix.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::font::SourceFont;
use crate::path::Path;

/// Matrix coefficients `[a b c d e f]` for the affine transform:
/// ```text
/// | a c e |
/// | b d f |
/// | 0 0 1 |
/// ```
pub type Matrix = [f64; 6];

/// The identity transform.
pub const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Multiply two transforms: the result applies `m` first, then `n`.
pub fn concat_matrix(n: &Matrix, m: &Matrix) -> Matrix {
    let [a, b, c, d, e, f] = *m;
    let [na, nb, nc, nd, ne, nf] = *n;
    [
        na * a + nc * b,
        nb * a + nd * b,
        na * c + nc * d,
        nb * c + nd * d,
        na * e + nc * f + ne,
        nb * e + nd * f + nf,
    ]
}

/// Invert a transform, or `None` if it is singular.
pub fn invert_matrix(m: &Matrix) -> Option<Matrix> {
    let [a, b, c, d, e, f] = *m;
    let det = a * d - b * c;
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    Some([
        d / det,
        -b / det,
        -c / det,
        a / det,
        (c * f - d * e) / det,
        (b * e - a * f) / det,
    ])
}

/// RGB color with components in the unit range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Rgb { r, g, b }
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::BLACK
    }
}

/// Line cap style, with the PDF integer encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt = 0,
    Round = 1,
    ProjectingSquare = 2,
}

/// Line join style, with the PDF integer encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter = 0,
    Round = 1,
    Bevel = 2,
}

/// Dash pattern in user-space units.
///
/// An empty `lengths` sequence means solid lines. Lengths are rescaled
/// into device units each time the transform changes, so they are kept in
/// user space here.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashPattern {
    pub lengths: SmallVec<[f64; 8]>,
    pub phase: f64,
}

impl DashPattern {
    pub fn new(lengths: impl IntoIterator<Item = f64>, phase: f64) -> Self {
        DashPattern {
            lengths: lengths.into_iter().collect(),
            phase,
        }
    }

    pub fn is_solid(&self) -> bool {
        self.lengths.is_empty()
    }
}

/// The graphics state carried through every drawing operation.
///
/// One live instance exists per nested save level; the interpreter pushes
/// a copy on save and pops back to the prior copy on restore. Coordinates
/// and lengths are user-space unless stated otherwise.
#[derive(Clone)]
pub struct GraphicsState {
    /// Current transform matrix, user space to device space.
    pub ctm: Matrix,
    pub fill_color: Rgb,
    pub stroke_color: Rgb,
    pub line_width: f64,
    pub dash: DashPattern,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    pub miter_limit: f64,
    /// Curve flattening tolerance.
    pub flatness: f64,
    /// Path under construction by the interpreter's path operators.
    pub path: Path,

    // Text state.
    pub font: Option<Rc<dyn SourceFont>>,
    pub font_size: f64,
    pub char_space: f64,
    pub word_space: f64,
    /// Horizontal scaling as a fraction (1.0 = 100%).
    pub horiz_scaling: f64,
    pub rise: f64,
    /// Render mode 0–7: two low bits select fill/stroke, bit 2 adds clip.
    pub render_mode: u8,
    /// Text matrix, text space to user space.
    pub text_matrix: Matrix,
    /// Pen position in user space.
    pub cur_x: f64,
    pub cur_y: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            ctm: IDENTITY,
            fill_color: Rgb::BLACK,
            stroke_color: Rgb::BLACK,
            line_width: 1.0,
            dash: DashPattern::default(),
            line_cap: LineCap::default(),
            line_join: LineJoin::default(),
            miter_limit: 10.0,
            flatness: 1.0,
            path: Path::new(),
            font: None,
            font_size: 0.0,
            char_space: 0.0,
            word_space: 0.0,
            horiz_scaling: 1.0,
            rise: 0.0,
            render_mode: 0,
            text_matrix: IDENTITY,
            cur_x: 0.0,
            cur_y: 0.0,
        }
    }
}

impl GraphicsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform a user-space point into device space.
    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.ctm;
        (a * x + c * y + e, b * x + d * y + f)
    }

    /// Transform a user-space distance into device space (no translation).
    pub fn transform_delta(&self, dx: f64, dy: f64) -> (f64, f64) {
        let [a, b, c, d, _, _] = self.ctm;
        (a * dx + c * dy, b * dx + d * dy)
    }

    /// Transform a scalar width into device units.
    ///
    /// Averages the two axis images of the transform so anisotropic
    /// scaling still yields a usable device length for dash segments and
    /// line widths.
    pub fn transform_width(&self, w: f64) -> f64 {
        let [a, b, c, d, _, _] = self.ctm;
        let x = a + c;
        let y = b + d;
        w * (0.5 * (x * x + y * y)).sqrt()
    }

    /// The line width in device units.
    pub fn transformed_line_width(&self) -> f64 {
        self.transform_width(self.line_width)
    }

    /// Transform a text-space distance into user space (direction only).
    pub fn text_transform_delta(&self, dx: f64, dy: f64) -> (f64, f64) {
        let [a, b, c, d, _, _] = self.text_matrix;
        (a * dx + c * dy, b * dx + d * dy)
    }

    /// The linear text-matrix coefficients scaled by the font size:
    /// the text-space font transform `[a b c d]`.
    pub fn font_transform(&self) -> [f64; 4] {
        let [a, b, c, d, _, _] = self.text_matrix;
        [
            a * self.font_size,
            b * self.font_size,
            c * self.font_size,
            d * self.font_size,
        ]
    }

    /// Concatenate a matrix onto the CTM.
    pub fn concat_ctm(&mut self, m: &Matrix) {
        self.ctm = concat_matrix(&self.ctm, m);
    }

    pub fn set_ctm(&mut self, m: Matrix) {
        self.ctm = m;
    }

    /// Set the text matrix and move the pen to its translation.
    pub fn set_text_matrix(&mut self, m: Matrix) {
        self.text_matrix = m;
        self.cur_x = m[4];
        self.cur_y = m[5];
    }

    /// Advance the pen by a user-space delta.
    pub fn shift_text(&mut self, dx: f64, dy: f64) {
        self.cur_x += dx;
        self.cur_y += dy;
    }
}
