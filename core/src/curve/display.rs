/// Width of the editor's curve box in display units.
pub const DISPLAY_WIDTH: f64 = 400.0;
/// Height of the editor's curve box in display units.
pub const DISPLAY_HEIGHT: f64 = 80.0;

/// A control point position inside the editor box; `y` grows downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
}

/// Mapping between (radius, weight) and editor coordinates.
///
/// Radius is laid out on a square-root axis so the crowded inner region
/// gets most of the width; weight runs from the bottom edge (zero) to the
/// top edge (`max_weight`). Fixed for the life of an editor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    pub max_radius: f64,
    pub max_weight: f64,
    pub width: f64,
    pub height: f64,
}

fn usable(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}

impl DisplayTransform {
    pub fn new(max_radius: f64, max_weight: f64) -> Self {
        Self {
            max_radius: usable(max_radius),
            max_weight: usable(max_weight),
            width: DISPLAY_WIDTH,
            height: DISPLAY_HEIGHT,
        }
    }

    pub fn to_display(&self, radius: f64, weight: f64) -> DisplayPoint {
        DisplayPoint {
            x: (radius / self.max_radius).sqrt() * self.width,
            y: self.height - weight / self.max_weight * self.height,
        }
    }

    pub fn radius_at(&self, x: f64) -> f64 {
        let t = x / self.width;
        t * t * self.max_radius
    }

    pub fn weight_at(&self, y: f64) -> f64 {
        (self.height - y) / self.height * self.max_weight
    }

    pub fn to_curve(&self, point: DisplayPoint) -> (f64, f64) {
        (self.radius_at(point.x), self.weight_at(point.y))
    }
}
