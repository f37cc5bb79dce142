use crate::io::CropRegion;
use crate::prelude::Image;
use serde::{Deserialize, Serialize};

/// Image centre in pixel coordinates, `[x, y]` on disk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Centre {
    pub x: f64,
    pub y: f64,
}

impl Centre {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The same sky position expressed in the coordinates of a cropped image.
    pub fn cropped(&self, region: &CropRegion) -> Self {
        Self {
            x: self.x - region.x0 as f64,
            y: self.y - region.y0 as f64,
        }
    }
}

impl From<[f64; 2]> for Centre {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Centre> for [f64; 2] {
    fn from(centre: Centre) -> Self {
        [centre.x, centre.y]
    }
}

/// Distance of every pixel from `centre`.
pub fn radial_field(shape: (usize, usize), centre: Centre) -> Image {
    Image::from_shape_fn(shape, |(y, x)| {
        let dx = x as f64 - centre.x;
        let dy = y as f64 - centre.y;
        (dx * dx + dy * dy).sqrt()
    })
}
