//! FITS image reading and writing for the pipeline and the combiner.
//!
//! Only the primary HDU is used. Data is kept in file order: row `y` of the
//! array is the `y`-th FITS row, with NAXIS1 running along `x`.
//!
//! Header cards that are not parsed into typed fields travel with the image
//! as raw records, so an output written from an input keeps keys such as
//! `EXPOSURE`, `CD1_1` or `LTV1`.

use crate::prelude::{GgmError, GgmResult, Image};
use fitsio::errors::check_status;
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::{sys, FitsFile};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

/// Keys describing the data layout, rewritten by cfitsio for every output.
const STRUCTURAL_KEYS: &[&str] = &[
    "SIMPLE", "BITPIX", "EXTEND", "BSCALE", "BZERO", "BLANK", "PCOUNT", "GCOUNT", "XTENSION",
    "CHECKSUM", "DATASUM", "END",
];

/// Fragments of the reference comment cfitsio adds to every primary header.
const CFITSIO_BANNER: &[&str] = &["Flexible Image Transport System", "2001A&A...376..359H"];

/// FLEN_CARD: 80 characters plus the terminating NUL.
const CARD_LEN: usize = 81;

const AXIS_KEYS: [&str; 4] = ["CTYPE", "CRVAL", "CDELT", "CRPIX"];

/// World-coordinate description of a single image axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisWcs {
    pub ctype: String,
    pub crval: f64,
    pub cdelt: f64,
    pub crpix: f64,
}

/// Header keys carried alongside an image.
///
/// `cards` holds every other record of the source header verbatim, minus the
/// structural keys and the keys already represented by `object` and `axes`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageHeader {
    pub object: Option<String>,
    pub axes: [Option<AxisWcs>; 2],
    pub cards: Vec<String>,
}

impl ImageHeader {
    /// Header of a sub-image whose origin sits at `(x0, y0)` of this one.
    pub fn shifted(&self, x0: usize, y0: usize) -> Self {
        let mut header = self.clone();
        if let Some(axis) = header.axes[0].as_mut() {
            axis.crpix -= x0 as f64;
        }
        if let Some(axis) = header.axes[1].as_mut() {
            axis.crpix -= y0 as f64;
        }
        header
    }

    /// Raw card whose keyword is `keyword`, if the header carries one.
    pub fn card(&self, keyword: &str) -> Option<&str> {
        self.cards
            .iter()
            .map(String::as_str)
            .find(|card| card_keyword(card) == keyword)
    }

    /// True for records rebuilt from typed fields or by cfitsio itself.
    fn is_managed(&self, card: &str) -> bool {
        let keyword = card_keyword(card);
        if STRUCTURAL_KEYS.contains(&keyword) || keyword.starts_with("NAXIS") {
            return true;
        }
        if keyword == "COMMENT" && CFITSIO_BANNER.iter().any(|part| card.contains(part)) {
            return true;
        }
        if keyword == "OBJECT" {
            return self.object.is_some();
        }
        self.axes.iter().enumerate().any(|(idx, axis)| {
            axis.is_some()
                && AXIS_KEYS
                    .iter()
                    .any(|prefix| keyword == format!("{prefix}{}", idx + 1))
        })
    }

    fn read(hdu: &FitsHdu, fptr: &mut FitsFile) -> GgmResult<Self> {
        let object = hdu.read_key::<String>(fptr, "OBJECT").ok();
        let axes = [read_axis(hdu, fptr, 1), read_axis(hdu, fptr, 2)];
        let mut header = Self {
            object,
            axes,
            cards: Vec::new(),
        };
        let cards = read_cards(fptr)?
            .into_iter()
            .filter(|card| !header.is_managed(card))
            .collect();
        header.cards = cards;
        Ok(header)
    }

    fn write(&self, hdu: &FitsHdu, fptr: &mut FitsFile) -> GgmResult<()> {
        for card in self.cards.iter().filter(|card| !self.is_managed(card)) {
            write_card(fptr, card)?;
        }
        if let Some(object) = &self.object {
            hdu.write_key(fptr, "OBJECT", object.clone())?;
        }
        for (idx, axis) in self.axes.iter().enumerate() {
            let Some(axis) = axis else { continue };
            let n = idx + 1;
            hdu.write_key(fptr, &format!("CTYPE{n}"), axis.ctype.clone())?;
            hdu.write_key(fptr, &format!("CRVAL{n}"), axis.crval)?;
            hdu.write_key(fptr, &format!("CDELT{n}"), axis.cdelt)?;
            hdu.write_key(fptr, &format!("CRPIX{n}"), axis.crpix)?;
        }
        Ok(())
    }
}

fn read_axis(hdu: &FitsHdu, fptr: &mut FitsFile, n: usize) -> Option<AxisWcs> {
    Some(AxisWcs {
        ctype: hdu.read_key::<String>(fptr, &format!("CTYPE{n}")).ok()?,
        crval: hdu.read_key::<f64>(fptr, &format!("CRVAL{n}")).ok()?,
        cdelt: hdu.read_key::<f64>(fptr, &format!("CDELT{n}")).ok()?,
        crpix: hdu.read_key::<f64>(fptr, &format!("CRPIX{n}")).ok()?,
    })
}

fn card_keyword(card: &str) -> &str {
    card.get(..8).unwrap_or(card).trim_end()
}

/// Every record of the current HDU, in file order.
fn read_cards(fptr: &mut FitsFile) -> GgmResult<Vec<String>> {
    let mut status = 0;
    let mut count = 0;
    let mut more = 0;
    // SAFETY: the pointer comes from an open `FitsFile` that outlives this
    // call, and each buffer is FLEN_CARD bytes as cfitsio requires.
    unsafe {
        let raw = fptr.as_raw();
        sys::ffghsp(raw, &mut count, &mut more, &mut status);
        check_status(status)?;
        let mut cards = Vec::with_capacity(count.max(0) as usize);
        for n in 1..=count {
            let mut buffer: [c_char; CARD_LEN] = [0; CARD_LEN];
            sys::ffgrec(raw, n, buffer.as_mut_ptr(), &mut status);
            check_status(status)?;
            let card = CStr::from_ptr(buffer.as_ptr()).to_string_lossy();
            cards.push(card.trim_end().to_string());
        }
        Ok(cards)
    }
}

fn write_card(fptr: &mut FitsFile, card: &str) -> GgmResult<()> {
    let record = CString::new(card)
        .map_err(|_| GgmError::InvalidInput(format!("header card {card:?} contains NUL")))?;
    let mut status = 0;
    // SAFETY: same pointer contract as `read_cards`; `record` is NUL-terminated.
    unsafe {
        sys::ffprec(fptr.as_raw(), record.as_ptr(), &mut status);
    }
    check_status(status)?;
    Ok(())
}

/// Rectangular region `[x0, x1) x [y0, y1)` in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[usize; 4]", into = "[usize; 4]")]
pub struct CropRegion {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl From<[usize; 4]> for CropRegion {
    fn from([x0, y0, x1, y1]: [usize; 4]) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

impl From<CropRegion> for [usize; 4] {
    fn from(region: CropRegion) -> Self {
        [region.x0, region.y0, region.x1, region.y1]
    }
}

/// An image loaded from disk together with its header.
#[derive(Debug, Clone)]
pub struct FitsImage {
    pub path: PathBuf,
    pub data: Image,
    pub header: ImageHeader,
}

impl FitsImage {
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Restricts the image to `region`, keeping the header consistent.
    pub fn crop(self, region: &CropRegion) -> GgmResult<Self> {
        let (height, width) = self.data.dim();
        if region.x0 >= region.x1 || region.y0 >= region.y1 {
            return Err(GgmError::InvalidInput(format!(
                "empty crop region {:?}",
                <[usize; 4]>::from(*region)
            )));
        }
        if region.x1 > width || region.y1 > height {
            return Err(GgmError::InvalidInput(format!(
                "crop region {:?} exceeds {}x{} image {}",
                <[usize; 4]>::from(*region),
                width,
                height,
                self.path.display()
            )));
        }
        let data = self
            .data
            .slice(s![region.y0..region.y1, region.x0..region.x1])
            .to_owned();
        Ok(Self {
            header: self.header.shifted(region.x0, region.y0),
            path: self.path,
            data,
        })
    }
}

/// Read the primary HDU of a FITS file as a 2-D `f64` image.
pub fn read_image<P: AsRef<Path>>(path: P) -> GgmResult<FitsImage> {
    let path = path.as_ref();
    let mut fptr = FitsFile::open(path)?;
    let hdu = fptr.primary_hdu()?;

    let (height, width) = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if shape.len() == 2 => (shape[0], shape[1]),
        HduInfo::ImageInfo { shape, .. } => {
            return Err(GgmError::InvalidInput(format!(
                "{} has {} axes, expected a 2-D image",
                path.display(),
                shape.len()
            )))
        }
        _ => {
            return Err(GgmError::InvalidInput(format!(
                "primary HDU of {} is not an image",
                path.display()
            )))
        }
    };

    let pixels: Vec<f64> = hdu.read_image(&mut fptr)?;
    let data = Array2::from_shape_vec((height, width), pixels).map_err(|_| {
        GgmError::InvalidInput(format!(
            "cannot reshape pixel data of {} to {}x{}",
            path.display(),
            width,
            height
        ))
    })?;
    let header = ImageHeader::read(&hdu, &mut fptr)?;

    Ok(FitsImage {
        path: path.to_path_buf(),
        data,
        header,
    })
}

/// Write `data` as a double-precision primary HDU, replacing any existing file.
pub fn write_image<P: AsRef<Path>>(
    path: P,
    data: &Image,
    header: Option<&ImageHeader>,
) -> GgmResult<()> {
    let (height, width) = data.dim();
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[height, width],
    };
    let mut fptr = FitsFile::create(path.as_ref())
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;

    let flat: Vec<f64> = data.iter().copied().collect();
    hdu.write_image(&mut fptr, &flat)?;
    if let Some(header) = header {
        header.write(&hdu, &mut fptr)?;
    }
    Ok(())
}
