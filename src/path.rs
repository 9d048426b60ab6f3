//! Path geometry supplied by the interpreter's path operators.
//!
//! A path is an ordered list of subpaths; each subpath is a chain of
//! points tagged either as line vertices or as the start of a cubic curve
//! run. Curve runs are exactly three points: two control points followed
//! by the endpoint.

/// One vertex of a subpath.
///
/// `curve` marks the first control point of a cubic run; the two points
/// that follow it complete the run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPoint {
    pub x: f64,
    pub y: f64,
    pub curve: bool,
}

/// A single open-or-closed chain of lines and cubic curves.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subpath {
    points: Vec<PathPoint>,
    closed: bool,
}

impl Subpath {
    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A path under construction.
///
/// Mirrors the content-stream path operators: `move_to` opens a subpath,
/// `line_to`/`curve_to` extend it, `close` seals it. A subpath with zero
/// points is a no-op for every consumer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    subpaths: Vec<Subpath>,
}

impl Path {
    pub fn new() -> Self {
        Path::default()
    }

    pub fn subpaths(&self) -> &[Subpath] {
        &self.subpaths
    }

    /// Start a new subpath at (x, y).
    pub fn move_to(&mut self, x: f64, y: f64) {
        self.subpaths.push(Subpath {
            points: vec![PathPoint { x, y, curve: false }],
            closed: false,
        });
    }

    /// Append a line segment to the current subpath.
    ///
    /// Without an open subpath this degenerates to an implicit move.
    pub fn line_to(&mut self, x: f64, y: f64) {
        match self.subpaths.last_mut() {
            Some(sp) if !sp.closed => sp.points.push(PathPoint { x, y, curve: false }),
            _ => self.move_to(x, y),
        }
    }

    /// Append a cubic curve: two control points and an endpoint.
    pub fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) {
        if !matches!(self.subpaths.last(), Some(sp) if !sp.closed) {
            self.move_to(x1, y1);
        }
        let sp = self.subpaths.last_mut().unwrap();
        sp.points.push(PathPoint { x: x1, y: y1, curve: true });
        sp.points.push(PathPoint { x: x2, y: y2, curve: false });
        sp.points.push(PathPoint { x: x3, y: y3, curve: false });
    }

    /// Mark the current subpath as closed.
    pub fn close(&mut self) {
        if let Some(sp) = self.subpaths.last_mut() {
            sp.closed = true;
        }
    }

    /// Append an axis-aligned rectangle as its own closed subpath.
    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.move_to(x, y);
        self.line_to(x + width, y);
        self.line_to(x + width, y + height);
        self.line_to(x, y + height);
        self.close();
    }

    /// The endpoint of the current subpath, if any.
    pub fn current_point(&self) -> Option<(f64, f64)> {
        let sp = self.subpaths.last()?;
        if sp.closed {
            // A closed subpath leaves the pen at its starting point.
            sp.points.first().map(|p| (p.x, p.y))
        } else {
            sp.points.last().map(|p| (p.x, p.y))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.iter().all(|sp| sp.points.is_empty())
    }

    /// Discard all subpaths.
    pub fn clear(&mut self) {
        self.subpaths.clear();
    }
}
