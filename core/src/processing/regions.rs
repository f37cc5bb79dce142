//! Hiding point sources by refilling regions with nearby pixel values.
//!
//! Each region is compared against a copy of itself grown by one physical
//! pixel. Pixels of the input image lying in the ring between the two form
//! a pool, and every pixel inside the region is replaced by a random pick
//! from that pool. Pools are always drawn from the unmodified input, so the
//! order of regions does not matter except where they overlap.

use crate::math::StatsHelper;
use crate::prelude::{
    GgmError, GgmResult, Image, ProcessingStage, StageInput, StageMetadata, StageOutput,
};
use crate::telemetry::log::LogManager;
use fitsio::FitsFile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Growth applied to every radius to build the sampling ring.
pub const ENLARGE_BY: f64 = 1.0;

/// A region in physical coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    Circle {
        x: f64,
        y: f64,
        radius: f64,
    },
    /// `angle` is in degrees, counter-clockwise from the x axis to `radius_x`.
    Ellipse {
        x: f64,
        y: f64,
        radius_x: f64,
        radius_y: f64,
        angle: f64,
    },
}

impl Region {
    pub fn enlarged(&self, by: f64) -> Self {
        match *self {
            Region::Circle { x, y, radius } => Region::Circle {
                x,
                y,
                radius: radius + by,
            },
            Region::Ellipse {
                x,
                y,
                radius_x,
                radius_y,
                angle,
            } => Region::Ellipse {
                x,
                y,
                radius_x: radius_x + by,
                radius_y: radius_y + by,
                angle,
            },
        }
    }

    fn min_radius(&self) -> f64 {
        match *self {
            Region::Circle { radius, .. } => radius,
            Region::Ellipse {
                radius_x, radius_y, ..
            } => radius_x.min(radius_y),
        }
    }

    /// Boundary points count as inside.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        match *self {
            Region::Circle { x, y, radius } => {
                let (dx, dy) = (px - x, py - y);
                dx * dx + dy * dy <= radius * radius
            }
            Region::Ellipse {
                x,
                y,
                radius_x,
                radius_y,
                angle,
            } => {
                let (sin, cos) = angle.to_radians().sin_cos();
                let (dx, dy) = (px - x, py - y);
                let u = (dx * cos + dy * sin) / radius_x;
                let v = (dy * cos - dx * sin) / radius_y;
                u * u + v * v <= 1.0
            }
        }
    }
}

impl FromStr for Region {
    type Err = GgmError;

    /// Parses `circle(x,y,r)` or `ellipse(x,y,rx,ry,angle)`.
    fn from_str(line: &str) -> GgmResult<Self> {
        let invalid = || GgmError::InvalidRegion(line.trim().to_string());
        let (name, rest) = line.trim().split_once('(').ok_or_else(invalid)?;
        let args = rest.trim_end().strip_suffix(')').ok_or_else(invalid)?;
        let values = args
            .split(',')
            .map(|value| value.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(invalid());
        }

        let region = match (name.trim().to_ascii_lowercase().as_str(), values.as_slice()) {
            ("circle", &[x, y, radius]) => Region::Circle { x, y, radius },
            ("ellipse", &[x, y, radius_x, radius_y, angle]) => Region::Ellipse {
                x,
                y,
                radius_x,
                radius_y,
                angle,
            },
            _ => return Err(invalid()),
        };
        if region.min_radius() <= 0.0 {
            return Err(invalid());
        }
        Ok(region)
    }
}

/// Regions listed one per line; lines starting with `#` and blank lines
/// are skipped.
pub fn parse_regions(text: &str) -> GgmResult<Vec<Region>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Region::from_str)
        .collect()
}

pub fn read_regions<P: AsRef<Path>>(path: P) -> GgmResult<Vec<Region>> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_regions(&text)
}

/// Linear map from zero-based array indices to physical coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalTransform {
    pub crpix: [f64; 2],
    pub crval: [f64; 2],
    pub cdelt: [f64; 2],
}

impl Default for PhysicalTransform {
    /// Physical coordinates equal one-based image coordinates.
    fn default() -> Self {
        Self {
            crpix: [0.0; 2],
            crval: [0.0; 2],
            cdelt: [1.0; 2],
        }
    }
}

impl PhysicalTransform {
    /// Reads the physical axis keys (`CRPIX1P`, `CRVAL1P`, `CDELT1P` and the
    /// axis 2 equivalents) of the primary HDU. An axis missing any of them
    /// falls back to one-based image coordinates.
    pub fn read<P: AsRef<Path>>(path: P) -> GgmResult<Self> {
        let mut fptr = FitsFile::open(path.as_ref())?;
        let hdu = fptr.primary_hdu()?;
        let mut transform = Self::default();
        for axis in 0..2 {
            let n = axis + 1;
            let keys = (
                hdu.read_key::<f64>(&mut fptr, &format!("CRPIX{n}P")),
                hdu.read_key::<f64>(&mut fptr, &format!("CRVAL{n}P")),
                hdu.read_key::<f64>(&mut fptr, &format!("CDELT{n}P")),
            );
            if let (Ok(crpix), Ok(crval), Ok(cdelt)) = keys {
                transform.crpix[axis] = crpix;
                transform.crval[axis] = crval;
                transform.cdelt[axis] = cdelt;
            }
        }
        Ok(transform)
    }

    pub fn to_physical(&self, x: usize, y: usize) -> (f64, f64) {
        (self.axis(0, x), self.axis(1, y))
    }

    fn axis(&self, axis: usize, index: usize) -> f64 {
        (index as f64 + 1.0 - self.crpix[axis]) * self.cdelt[axis] + self.crval[axis]
    }
}

/// Outcome of refilling one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionFill {
    /// Pixels of the ring the replacements were drawn from.
    pub pool: usize,
    pub filled: usize,
}

pub struct RegionHider {
    regions: Vec<Region>,
    transform: PhysicalTransform,
    rng: StdRng,
    logger: LogManager,
}

impl RegionHider {
    /// Without a seed the generator is seeded from the operating system.
    pub fn new(regions: Vec<Region>, transform: PhysicalTransform, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            regions,
            transform,
            rng,
            logger: LogManager::new("regions"),
        }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Copy of `image` with every region refilled.
    pub fn hide(&mut self, image: &Image) -> (Image, Vec<RegionFill>) {
        let mut output = image.clone();
        let regions = self.regions.clone();
        let fills = regions
            .iter()
            .map(|region| {
                let fill = self.fill(image, &mut output, region);
                if fill.pool == 0 {
                    self.logger
                        .caution(&format!("{:?}: no pixels around region, left as is", region));
                } else {
                    self.logger.record(&format!(
                        "{:?}: {} pixels from a ring of {}",
                        region, fill.filled, fill.pool
                    ));
                }
                fill
            })
            .collect();
        (output, fills)
    }

    fn fill(&mut self, source: &Image, output: &mut Image, region: &Region) -> RegionFill {
        let ring = region.enlarged(ENLARGE_BY);
        let mut pool = Vec::new();
        let mut bounds: Option<[usize; 4]> = None;
        for ((y, x), &value) in source.indexed_iter() {
            let (px, py) = self.transform.to_physical(x, y);
            if ring.contains(px, py) && !region.contains(px, py) {
                pool.push(value);
                bounds = Some(match bounds {
                    None => [x, y, x, y],
                    Some([x0, y0, x1, y1]) => [x0.min(x), y0.min(y), x1.max(x), y1.max(y)],
                });
            }
        }

        let Some([x0, y0, x1, y1]) = bounds else {
            return RegionFill::default();
        };
        let mut filled = 0;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (px, py) = self.transform.to_physical(x, y);
                if region.contains(px, py) {
                    output[[y, x]] = pool[self.rng.gen_range(0..pool.len())];
                    filled += 1;
                }
            }
        }
        RegionFill {
            pool: pool.len(),
            filled,
        }
    }
}

impl ProcessingStage for RegionHider {
    fn name(&self) -> &'static str {
        "hide-regions"
    }

    fn execute(&mut self, input: StageInput) -> GgmResult<StageOutput> {
        let (image, fills) = self.hide(&input.image);
        let filled: usize = fills.iter().map(|fill| fill.filled).sum();
        let skipped = fills.iter().filter(|fill| fill.pool == 0).count();
        let non_finite = StatsHelper::count_non_finite(image.view());

        Ok(StageOutput {
            image,
            header: input.header,
            metadata: StageMetadata {
                non_finite,
                notes: vec![
                    format!("{} regions", fills.len()),
                    format!("{} pixels refilled", filled),
                    format!("{} regions without surrounding pixels", skipped),
                ],
            },
        })
    }
}
