pub mod fits;

pub use fits::{read_image, write_image, AxisWcs, CropRegion, FitsImage, ImageHeader};
