//! YAML parameter file for radial-weighted combination.
//!
//! Keys this module does not know about are kept in `extra` maps and
//! written back unchanged.

use crate::curve::WeightCurve;
use crate::io::CropRegion;
use crate::prelude::{GgmError, GgmResult};
use crate::processing::radial::Centre;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationParameters {
    pub data: Vec<ImageEntry>,
    pub image: ImageSettings,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One input image and its stored weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub filename: PathBuf,
    pub weightrad: Vec<f64>,
    /// Curve weights already multiplied by the image's scale.
    pub weightvals: Vec<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    pub centre: Centre,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chop: Option<ChopSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outfilename: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChopSettings {
    pub enable: bool,
    pub range: CropRegion,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

impl ImageEntry {
    /// Split the stored values into a unit-peak curve and its scale.
    ///
    /// The scale is the largest stored value rounded to two decimals. When
    /// no stored value is positive, as after a sign flip, the value with the
    /// largest magnitude is used instead so the negative scale reloads as
    /// written.
    pub fn curve_and_scale(&self) -> GgmResult<(WeightCurve, f64)> {
        let values = self.weightvals.iter().copied();
        let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
        let peak = if max > 0.0 {
            max
        } else {
            values.fold(f64::INFINITY, f64::min)
        };
        let scale = round_to_hundredths(peak);
        if !scale.is_finite() || scale == 0.0 {
            return Err(GgmError::InvalidParameters(format!(
                "{}: weight values {:?} give an unusable scale",
                self.filename.display(),
                self.weightvals
            )));
        }
        let weights = self.weightvals.iter().map(|v| v / scale).collect();
        let curve = WeightCurve::new(self.weightrad.clone(), weights)?;
        Ok((curve, scale))
    }

    pub fn store(&mut self, curve: &WeightCurve, scale: f64) {
        self.weightrad = curve.radii().to_vec();
        self.weightvals = curve.weights().iter().map(|w| w * scale).collect();
    }
}

impl CombinationParameters {
    pub fn load<P: AsRef<Path>>(path: P) -> GgmResult<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let params = Self::from_yaml(&contents)?;
        Ok(params)
    }

    pub fn from_yaml(contents: &str) -> GgmResult<Self> {
        let params: Self = serde_yaml::from_str(contents)?;
        if params.data.is_empty() {
            return Err(GgmError::InvalidParameters("no images listed".into()));
        }
        Ok(params)
    }

    pub fn to_yaml(&self) -> GgmResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Replace the file at `path` with the current parameters.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> GgmResult<()> {
        fs::write(path.as_ref(), self.to_yaml()?)?;
        Ok(())
    }

    pub fn crop_region(&self) -> Option<CropRegion> {
        self.image
            .chop
            .as_ref()
            .filter(|chop| chop.enable)
            .map(|chop| chop.range)
    }

    /// Centre in the coordinates of the (possibly cropped) images.
    pub fn image_centre(&self) -> Centre {
        match self.crop_region() {
            Some(region) => self.image.centre.cropped(&region),
            None => self.image.centre,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
data:
  - filename: soft.fits
    weightrad: [0.0, 40.0, 160.0]
    weightvals: [2.0, 1.0, 0.5]
    label: soft band
  - filename: hard.fits
    weightrad: [0.0, 160.0]
    weightvals: [-0.5, -0.25]
image:
  centre: [512.0, 480.0]
  chop:
    enable: true
    range: [100, 80, 900, 880]
  outfilename: combined.fits
  smoothing: 3
comment: made by hand
"#;

    #[test]
    fn load_splits_scale_from_curve() {
        let params = CombinationParameters::from_yaml(SAMPLE).unwrap();
        let (curve, scale) = params.data[0].curve_and_scale().unwrap();
        assert_eq!(scale, 2.0);
        assert_eq!(curve.weights(), &[1.0, 0.5, 0.25]);

        let (curve, scale) = params.data[1].curve_and_scale().unwrap();
        assert_eq!(scale, -0.5);
        assert_eq!(curve.weights(), &[1.0, 0.5]);
    }

    #[test]
    fn negative_scale_survives_store_and_reload() {
        let curve = WeightCurve::new(vec![0.0, 5.0, 10.0], vec![1.0, 0.5, 0.25]).unwrap();
        let mut entry = ImageEntry {
            filename: PathBuf::from("x.fits"),
            weightrad: Vec::new(),
            weightvals: Vec::new(),
            extra: BTreeMap::new(),
        };
        entry.store(&curve, -2.0);
        assert_eq!(entry.weightvals, vec![-2.0, -1.0, -0.5]);

        let (reloaded, scale) = entry.curve_and_scale().unwrap();
        assert_eq!(scale, -2.0);
        assert_eq!(reloaded.weights(), curve.weights());
    }

    #[test]
    fn flipped_curve_ending_at_zero_reloads() {
        let entry = ImageEntry {
            filename: PathBuf::from("x.fits"),
            weightrad: vec![0.0, 5.0, 10.0],
            weightvals: vec![-1.0, -0.5, -0.0],
            extra: BTreeMap::new(),
        };
        let (curve, scale) = entry.curve_and_scale().unwrap();
        assert_eq!(scale, -1.0);
        assert_eq!(curve.weights(), &[1.0, 0.5, 0.0]);
    }

    #[test]
    fn scale_is_rounded_to_two_decimals() {
        let entry = ImageEntry {
            filename: PathBuf::from("x.fits"),
            weightrad: vec![0.0, 1.0],
            weightvals: vec![0.123456, 0.0],
            extra: BTreeMap::new(),
        };
        let (_, scale) = entry.curve_and_scale().unwrap();
        assert_eq!(scale, 0.12);
    }

    #[test]
    fn zero_weights_are_rejected() {
        let entry = ImageEntry {
            filename: PathBuf::from("x.fits"),
            weightrad: vec![0.0, 1.0],
            weightvals: vec![0.001, 0.0],
            extra: BTreeMap::new(),
        };
        assert!(matches!(
            entry.curve_and_scale(),
            Err(GgmError::InvalidParameters(_))
        ));
    }

    #[test]
    fn crop_adjusts_centre() {
        let params = CombinationParameters::from_yaml(SAMPLE).unwrap();
        assert_eq!(params.crop_region(), Some(CropRegion::from([100, 80, 900, 880])));
        assert_eq!(params.image_centre(), Centre::new(412.0, 400.0));
    }

    #[test]
    fn disabled_chop_is_ignored() {
        let yaml = SAMPLE.replace("enable: true", "enable: false");
        let params = CombinationParameters::from_yaml(&yaml).unwrap();
        assert_eq!(params.crop_region(), None);
        assert_eq!(params.image_centre(), Centre::new(512.0, 480.0));
    }

    #[test]
    fn untouched_save_preserves_every_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out-pars.yml");
        let mut params = CombinationParameters::from_yaml(SAMPLE).unwrap();
        let before = params.clone();

        for entry in params.data.iter_mut() {
            let (curve, scale) = entry.curve_and_scale().unwrap();
            entry.store(&curve, scale);
        }
        params.save(&path).unwrap();
        let reloaded = CombinationParameters::load(&path).unwrap();

        assert_eq!(reloaded, before);
        assert_eq!(
            reloaded.extra.get("comment"),
            Some(&Value::String("made by hand".into()))
        );
        assert_eq!(
            reloaded.data[0].extra.get("label"),
            Some(&Value::String("soft band".into()))
        );
    }

    #[test]
    fn empty_image_list_is_rejected() {
        let yaml = "data: []\nimage:\n  centre: [1.0, 1.0]\n";
        assert!(CombinationParameters::from_yaml(yaml).is_err());
    }
}
