//! Stroke data model: polylines, categorized stroke sets, and command lines.

use crate::error::PipelineError;
use crate::geometry::Point;
use serde::{Deserialize, Serialize};

/// The category of a stroke. Each category carries its own pen-depth and
/// decimation policy in [`crate::MachineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrokeKind {
    /// Closed outline of a detected shape boundary.
    Contour,
    /// Open shading stroke.
    Hatch,
    /// Glyph stroke from text rendering.
    Text,
}

impl StrokeKind {
    /// All categories, in the order they are drawn.
    pub const ALL: [StrokeKind; 3] = [StrokeKind::Contour, StrokeKind::Hatch, StrokeKind::Text];
}

/// An ordered sequence of points describing one continuous pen stroke.
///
/// Construction requires at least one point; degenerate strokes are filtered
/// by upstream collaborators before they reach the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Point>,
    closed: bool,
}

impl Polyline {
    /// Create a polyline. Fails on an empty point list.
    pub fn new(points: Vec<Point>, closed: bool) -> Result<Self, PipelineError> {
        if points.is_empty() {
            return Err(PipelineError::EmptyPolyline);
        }
        Ok(Self { points, closed })
    }

    /// Create an open polyline.
    pub fn open(points: Vec<Point>) -> Result<Self, PipelineError> {
        Self::new(points, false)
    }

    /// Create a closed polyline (a contour).
    pub fn closed(points: Vec<Point>) -> Result<Self, PipelineError> {
        Self::new(points, true)
    }

    /// The ordered points of the stroke.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the stroke has no points. Cannot happen for a polyline
    /// built through [`Polyline::new`]; kept total for deserialized data.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether the stroke closes back on itself.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// First point of the stroke.
    pub fn start(&self) -> Point {
        self.points.first().copied().unwrap_or_default()
    }

    /// Last point of the stroke.
    pub fn end(&self) -> Point {
        self.points.last().copied().unwrap_or_default()
    }
}

/// The full set of polylines for one job, partitioned by category, plus the
/// source-space dimensions the coordinate mapper needs for the vertical flip.
///
/// Insertion order within a category is the default drawing order before
/// optimization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrokeSet {
    contours: Vec<Polyline>,
    hatches: Vec<Polyline>,
    text: Vec<Polyline>,
    source_width: f64,
    source_height: f64,
}

impl StrokeSet {
    /// Create an empty stroke set for a source image of the given size.
    pub fn new(source_width: f64, source_height: f64) -> Self {
        Self {
            contours: Vec::new(),
            hatches: Vec::new(),
            text: Vec::new(),
            source_width,
            source_height,
        }
    }

    /// Append a stroke to a category.
    pub fn push(&mut self, kind: StrokeKind, stroke: Polyline) {
        self.category_mut(kind).push(stroke);
    }

    /// The strokes of a category, in insertion order.
    pub fn category(&self, kind: StrokeKind) -> &[Polyline] {
        match kind {
            StrokeKind::Contour => &self.contours,
            StrokeKind::Hatch => &self.hatches,
            StrokeKind::Text => &self.text,
        }
    }

    fn category_mut(&mut self, kind: StrokeKind) -> &mut Vec<Polyline> {
        match kind {
            StrokeKind::Contour => &mut self.contours,
            StrokeKind::Hatch => &mut self.hatches,
            StrokeKind::Text => &mut self.text,
        }
    }

    /// Replace a category with a reordered stroke list.
    pub fn set_category(&mut self, kind: StrokeKind, strokes: Vec<Polyline>) {
        *self.category_mut(kind) = strokes;
    }

    /// Total number of strokes across all categories.
    pub fn len(&self) -> usize {
        self.contours.len() + self.hatches.len() + self.text.len()
    }

    /// True when no category has any strokes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source-space width in pixels.
    pub fn source_width(&self) -> f64 {
        self.source_width
    }

    /// Source-space height in pixels.
    pub fn source_height(&self) -> f64 {
        self.source_height
    }
}

/// One textual motion command plus an optional trailing comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    command: String,
    comment: Option<String>,
}

impl CommandLine {
    /// A bare command with no comment.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            comment: None,
        }
    }

    /// A command with a trailing comment.
    pub fn with_comment(command: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            comment: Some(comment.into()),
        }
    }

    /// A comment-only line.
    pub fn comment_only(comment: impl Into<String>) -> Self {
        Self {
            command: String::new(),
            comment: Some(comment.into()),
        }
    }

    /// The command text without the comment.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The trailing comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.command.is_empty(), &self.comment) {
            (true, Some(comment)) => write!(f, "; {}", comment),
            (false, Some(comment)) => write!(f, "{} ; {}", self.command, comment),
            _ => write!(f, "{}", self.command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polyline_rejects_empty() {
        assert!(matches!(
            Polyline::open(vec![]),
            Err(PipelineError::EmptyPolyline)
        ));
    }

    #[test]
    fn test_polyline_endpoints() {
        let line = Polyline::open(vec![
            Point::new(1.0, 2.0),
            Point::new(3.0, 4.0),
            Point::new(5.0, 6.0),
        ])
        .unwrap();
        assert_eq!(line.start(), Point::new(1.0, 2.0));
        assert_eq!(line.end(), Point::new(5.0, 6.0));
        assert!(!line.is_closed());
    }

    #[test]
    fn test_stroke_set_categories() {
        let mut set = StrokeSet::new(100.0, 80.0);
        assert!(set.is_empty());

        let contour = Polyline::closed(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]).unwrap();
        let hatch = Polyline::open(vec![Point::new(0.0, 1.0), Point::new(1.0, 1.0)]).unwrap();
        set.push(StrokeKind::Contour, contour);
        set.push(StrokeKind::Hatch, hatch);

        assert_eq!(set.len(), 2);
        assert_eq!(set.category(StrokeKind::Contour).len(), 1);
        assert_eq!(set.category(StrokeKind::Hatch).len(), 1);
        assert_eq!(set.category(StrokeKind::Text).len(), 0);
        assert_eq!(set.source_height(), 80.0);
    }

    #[test]
    fn test_command_line_display() {
        assert_eq!(CommandLine::new("G21").to_string(), "G21");
        assert_eq!(
            CommandLine::with_comment("G0 X0 Y0", "home").to_string(),
            "G0 X0 Y0 ; home"
        );
        assert_eq!(
            CommandLine::comment_only("pen drawing").to_string(),
            "; pen drawing"
        );
    }
}
