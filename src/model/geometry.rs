use serde::{Deserialize, Serialize};

/// Geometric descriptor handed to components by the geometry kernel.
///
/// The transaction core never computes with these; it stores, compares and
/// serializes them. The `gt` tag is the geometry-object-type discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gt", rename_all = "snake_case")]
pub enum Geometry {
    Point {
        at: [f64; 3],
    },
    LineSegment {
        start: [f64; 3],
        end: [f64; 3],
    },
    Arc {
        center: [f64; 3],
        radius: f64,
        start_angle: f64,
        end_angle: f64,
        #[serde(default)]
        clockwise: bool,
    },
    Circle {
        center: [f64; 3],
        radius: f64,
    },
    PolyCurve {
        segments: Vec<Geometry>,
    },
}

impl Geometry {
    pub fn point(x: f64, y: f64, z: f64) -> Self {
        Geometry::Point { at: [x, y, z] }
    }

    pub fn segment(start: [f64; 3], end: [f64; 3]) -> Self {
        Geometry::LineSegment { start, end }
    }

    /// Return the serde tag string for this variant.
    pub fn type_str(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "point",
            Geometry::LineSegment { .. } => "line_segment",
            Geometry::Arc { .. } => "arc",
            Geometry::Circle { .. } => "circle",
            Geometry::PolyCurve { .. } => "poly_curve",
        }
    }
}
