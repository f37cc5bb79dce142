pub mod combine;
pub mod gaussian;
pub mod gradient;
pub mod radial;
pub mod regions;

pub use combine::{CombineInput, Combiner};
pub use gaussian::{gaussian_gradient_magnitude, GaussianGradientStage};
pub use gradient::{gradient_magnitude, GradientOptions, GradientStage};
pub use radial::{radial_field, Centre};
pub use regions::{parse_regions, read_regions, PhysicalTransform, Region, RegionHider};
