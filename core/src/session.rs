//! Interactive combination session.
//!
//! A session owns the loaded images, their weight curves and scales, and
//! the parameter set they came from. Every accepted edit recombines the
//! images, pushes the result to the viewer and rewrites the output
//! parameter file. A rejected edit leaves the session as it was.

use crate::curve::{CurveSnapshot, DisplayTransform, WeightCurve};
use crate::io::{read_image, write_image, FitsImage, ImageHeader};
use crate::params::CombinationParameters;
use crate::prelude::{GgmError, GgmResult, Image};
use crate::processing::combine::{CombineInput, Combiner};
use crate::processing::radial::radial_field;
use crate::telemetry::{LogManager, Metrics, MetricsRecorder};
use crate::viewer::ImageViewer;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_PARAMETERS: &str = "out-pars.yml";

/// A change to one image's weighting, addressed by image index.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Curve {
        index: usize,
        snapshot: CurveSnapshot,
    },
    Scale { index: usize, value: f64 },
    ToggleSign { index: usize },
}

impl Edit {
    pub fn index(&self) -> usize {
        match self {
            Edit::Curve { index, .. } | Edit::Scale { index, .. } | Edit::ToggleSign { index } => {
                *index
            }
        }
    }
}

/// One image of the session with its current weighting.
#[derive(Debug, Clone)]
pub struct ImageSlot {
    filename: PathBuf,
    data: Image,
    curve: WeightCurve,
    scale: f64,
    transform: DisplayTransform,
}

impl ImageSlot {
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn data(&self) -> &Image {
        &self.data
    }

    pub fn curve(&self) -> &WeightCurve {
        &self.curve
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn enabled(&self) -> bool {
        self.scale > 0.0
    }

    /// Editor mapping fixed when the image was loaded.
    pub fn transform(&self) -> &DisplayTransform {
        &self.transform
    }
}

fn check_shapes(images: &[FitsImage]) -> GgmResult<()> {
    let Some(first) = images.first() else {
        return Err(GgmError::InvalidParameters("no images listed".into()));
    };
    let expected = first.shape();
    for (index, image) in images.iter().enumerate().skip(1) {
        let found = image.shape();
        if found != expected {
            return Err(GgmError::ShapeMismatch {
                index,
                expected,
                found,
            });
        }
    }
    Ok(())
}

/// Read every listed image, cropped to the enabled chop region.
pub fn load_images(params: &CombinationParameters) -> GgmResult<Vec<FitsImage>> {
    let logger = LogManager::new("session");
    let region = params.crop_region();
    let mut images = Vec::with_capacity(params.data.len());
    for entry in &params.data {
        logger.record(&format!("loading {}", entry.filename.display()));
        let image = read_image(&entry.filename)?;
        let image = match &region {
            Some(region) => image.crop(region)?,
            None => image,
        };
        images.push(image);
    }
    check_shapes(&images)?;
    Ok(images)
}

pub struct CombineSession<V: ImageViewer> {
    params: CombinationParameters,
    slots: Vec<ImageSlot>,
    header: Option<ImageHeader>,
    combiner: Combiner,
    viewer: V,
    out_pars: PathBuf,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl<V: ImageViewer> CombineSession<V> {
    /// Load the images named in `params` and prepare their curves.
    pub fn open(
        params: CombinationParameters,
        viewer: V,
        out_pars: impl Into<PathBuf>,
    ) -> GgmResult<Self> {
        let images = load_images(&params)?;
        Self::from_images(params, images, viewer, out_pars)
    }

    /// Build a session from images already in memory, in parameter order.
    pub fn from_images(
        params: CombinationParameters,
        images: Vec<FitsImage>,
        viewer: V,
        out_pars: impl Into<PathBuf>,
    ) -> GgmResult<Self> {
        if images.len() != params.data.len() {
            return Err(GgmError::InvalidParameters(format!(
                "{} images for {} parameter entries",
                images.len(),
                params.data.len()
            )));
        }
        check_shapes(&images)?;

        let header = images.first().map(|image| image.header.clone());
        let shape = images[0].shape();
        let combiner = Combiner::new(radial_field(shape, params.image_centre()));

        let mut slots = Vec::with_capacity(images.len());
        for (entry, image) in params.data.iter().zip(images) {
            let (curve, scale) = entry.curve_and_scale()?;
            let transform = DisplayTransform::new(curve.max_radius(), curve.max_weight());
            slots.push(ImageSlot {
                filename: entry.filename.clone(),
                data: image.data,
                curve,
                scale,
                transform,
            });
        }

        Ok(Self {
            params,
            slots,
            header,
            combiner,
            viewer,
            out_pars: out_pars.into(),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new("session"),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[ImageSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&ImageSlot> {
        self.slots.get(index)
    }

    pub fn params(&self) -> &CombinationParameters {
        &self.params
    }

    pub fn header(&self) -> Option<&ImageHeader> {
        self.header.as_ref()
    }

    pub fn out_pars(&self) -> &Path {
        &self.out_pars
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    /// Apply `edit` and redraw. On failure the session is restored and
    /// the error returned.
    pub fn apply(&mut self, edit: Edit) -> GgmResult<()> {
        self.apply_all(vec![edit])
    }

    /// Apply `edits` in order followed by a single redraw. Either all of
    /// them take effect or none do.
    pub fn apply_all(&mut self, edits: Vec<Edit>) -> GgmResult<()> {
        let len = self.slots.len();
        if let Some(edit) = edits.iter().find(|edit| edit.index() >= len) {
            self.metrics.record_rejected();
            return Err(GgmError::IndexOutOfRange {
                index: edit.index(),
                len,
            });
        }

        let previous: Vec<(WeightCurve, f64)> = self
            .slots
            .iter()
            .map(|slot| (slot.curve.clone(), slot.scale))
            .collect();
        let previous_entries = self.params.data.clone();
        let result = edits
            .into_iter()
            .try_for_each(|edit| self.edit_slot(edit))
            .and_then(|_| self.redraw());
        if let Err(err) = result {
            for (slot, (curve, scale)) in self.slots.iter_mut().zip(previous) {
                slot.curve = curve;
                slot.scale = scale;
            }
            self.params.data = previous_entries;
            self.metrics.record_rejected();
            self.logger.caution(&format!("edit rejected: {}", err));
            return Err(err);
        }
        Ok(())
    }

    fn edit_slot(&mut self, edit: Edit) -> GgmResult<()> {
        match edit {
            Edit::Curve { index, snapshot } => {
                self.slots[index].curve = WeightCurve::from_snapshot(snapshot)?;
            }
            Edit::Scale { index, value } => {
                if !value.is_finite() || value == 0.0 {
                    return Err(GgmError::InvalidParameters(format!(
                        "scale {} cannot be stored",
                        value
                    )));
                }
                self.slots[index].scale = value;
            }
            Edit::ToggleSign { index } => {
                let slot = &mut self.slots[index];
                slot.scale = -slot.scale;
            }
        }
        Ok(())
    }

    /// Recombine, write the output image, update the viewer and rewrite
    /// the output parameter file.
    pub fn redraw(&mut self) -> GgmResult<()> {
        let inputs: Vec<CombineInput<'_>> = self
            .slots
            .iter()
            .map(|slot| CombineInput {
                image: &slot.data,
                curve: &slot.curve,
                scale: slot.scale,
            })
            .collect();
        let combined = self.combiner.combine(&inputs)?;

        if let Some(path) = &self.params.image.outfilename {
            write_image(path, &combined, self.header.as_ref())?;
        }
        if let Err(err) = self.viewer.display(&combined, self.header.as_ref()) {
            self.logger.caution(&format!("viewer update failed: {}", err));
        }

        for (entry, slot) in self.params.data.iter_mut().zip(&self.slots) {
            entry.store(&slot.curve, slot.scale);
        }
        self.params.save(&self.out_pars)?;

        self.metrics.record_redraw();
        self.logger.record(&format!(
            "redraw {} written to {}",
            self.metrics.snapshot().redraws,
            self.out_pars.display()
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::AxisWcs;
    use crate::viewer::NullViewer;
    use ndarray::Array2;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingViewer {
        shown: RefCell<Vec<Image>>,
    }

    impl ImageViewer for RecordingViewer {
        fn display(&self, image: &Image, _header: Option<&ImageHeader>) -> GgmResult<()> {
            self.shown.borrow_mut().push(image.clone());
            Ok(())
        }
    }

    struct BrokenViewer;

    impl ImageViewer for BrokenViewer {
        fn display(&self, _image: &Image, _header: Option<&ImageHeader>) -> GgmResult<()> {
            Err(GgmError::InvalidInput("viewer offline".into()))
        }
    }

    const PARAMS: &str = r#"
data:
  - filename: soft.fits
    weightrad: [0.0, 10.0]
    weightvals: [2.0, 1.0]
  - filename: hard.fits
    weightrad: [0.0, 10.0]
    weightvals: [1.0, 1.0]
image:
  centre: [2.0, 2.0]
"#;

    fn memory_image(name: &str, value: f64) -> FitsImage {
        FitsImage {
            path: PathBuf::from(name),
            data: Array2::from_elem((4, 4), value),
            header: ImageHeader::default(),
        }
    }

    fn memory_session<V: ImageViewer>(viewer: V, out_pars: &Path) -> CombineSession<V> {
        let params = CombinationParameters::from_yaml(PARAMS).unwrap();
        let images = vec![memory_image("soft.fits", 1.0), memory_image("hard.fits", 3.0)];
        CombineSession::from_images(params, images, viewer, out_pars).unwrap()
    }

    #[test]
    fn redraw_pushes_image_and_persists_parameters() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out-pars.yml");
        let mut session = memory_session(RecordingViewer::default(), &out);

        session.redraw().unwrap();

        assert_eq!(session.viewer.shown.borrow().len(), 1);
        let saved = CombinationParameters::load(&out).unwrap();
        assert_eq!(saved, *session.params());
        assert_eq!(session.metrics().redraws, 1);
    }

    #[test]
    fn curve_edit_is_stored_with_scale() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out-pars.yml");
        let mut session = memory_session(NullViewer, &out);

        let snapshot = CurveSnapshot {
            radii: vec![0.0, 5.0, 10.0],
            weights: vec![1.0, 0.75, 0.25],
        };
        session.apply(Edit::Curve { index: 0, snapshot }).unwrap();

        let saved = CombinationParameters::load(&out).unwrap();
        assert_eq!(saved.data[0].weightrad, vec![0.0, 5.0, 10.0]);
        assert_eq!(saved.data[0].weightvals, vec![2.0, 1.5, 0.5]);
        assert_eq!(saved.data[1].weightvals, vec![1.0, 1.0]);
    }

    #[test]
    fn rejected_edit_restores_previous_state() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out-pars.yml");
        let mut session = memory_session(NullViewer, &out);

        session.apply(Edit::ToggleSign { index: 1 }).unwrap();
        let written = fs::read_to_string(&out).unwrap();
        assert_eq!(session.slot(1).unwrap().scale(), -1.0);

        let err = session.apply(Edit::ToggleSign { index: 0 }).unwrap_err();
        assert!(matches!(err, GgmError::InvalidCombination(_)));
        assert_eq!(session.slot(0).unwrap().scale(), 2.0);
        assert_eq!(session.slot(1).unwrap().scale(), -1.0);
        assert_eq!(fs::read_to_string(&out).unwrap(), written);
        assert_eq!(
            session.metrics(),
            Metrics {
                redraws: 1,
                rejected: 1,
            }
        );
    }

    #[test]
    fn flipped_sign_reopens_and_flips_back() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out-pars.yml");
        let yaml = PARAMS.replace(
            "weightrad: [0.0, 10.0]\n    weightvals: [2.0, 1.0]",
            "weightrad: [0.0, 5.0, 10.0]\n    weightvals: [1.0, 0.5, 0.0]",
        );
        let images = || vec![memory_image("soft.fits", 1.0), memory_image("hard.fits", 3.0)];
        let params = CombinationParameters::from_yaml(&yaml).unwrap();
        let mut session = CombineSession::from_images(params, images(), NullViewer, &out).unwrap();

        session.apply(Edit::ToggleSign { index: 0 }).unwrap();
        let flipped = CombinationParameters::load(&out).unwrap();
        assert_eq!(flipped.data[0].weightvals, vec![-1.0, -0.5, 0.0]);

        let again = dir.path().join("again.yml");
        let mut reopened =
            CombineSession::from_images(flipped, images(), NullViewer, &again).unwrap();
        let slot = reopened.slot(0).unwrap();
        assert_eq!(slot.scale(), -1.0);
        assert_eq!(slot.curve().weights(), &[1.0, 0.5, 0.0]);
        assert!(!slot.enabled());

        reopened.apply(Edit::ToggleSign { index: 0 }).unwrap();
        let restored = CombinationParameters::load(&again).unwrap();
        assert_eq!(restored.data[0].weightvals, vec![1.0, 0.5, 0.0]);
        assert_eq!(reopened.slot(0).unwrap().scale(), 1.0);
    }

    #[test]
    fn invalid_scale_and_index_are_rejected() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out-pars.yml");
        let mut session = memory_session(NullViewer, &out);

        for value in [f64::NAN, 0.0] {
            assert!(session.apply(Edit::Scale { index: 0, value }).is_err());
        }
        assert!(matches!(
            session.apply(Edit::ToggleSign { index: 7 }),
            Err(GgmError::IndexOutOfRange { index: 7, len: 2 })
        ));
        assert_eq!(session.slot(0).unwrap().scale(), 2.0);
        assert!(!out.exists());

        let halved = Edit::Scale {
            index: 0,
            value: 0.5,
        };
        session.apply(halved).unwrap();
        assert_eq!(session.slot(0).unwrap().scale(), 0.5);
    }

    #[test]
    fn viewer_failure_does_not_abort_redraw() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out-pars.yml");
        let mut session = memory_session(BrokenViewer, &out);
        session.redraw().unwrap();
        assert!(out.exists());
    }

    #[test]
    fn open_crops_files_and_writes_combined_image() {
        let dir = tempdir().unwrap();
        let header = ImageHeader {
            object: Some("A2199".into()),
            axes: [
                Some(AxisWcs {
                    ctype: "RA---TAN".into(),
                    crval: 247.15,
                    cdelt: -0.000136,
                    crpix: 4.0,
                }),
                None,
            ],
            cards: vec!["EXPOSURE=              48213.7 / [s]".into()],
        };
        let soft = dir.path().join("soft.fits");
        let hard = dir.path().join("hard.fits");
        write_image(&soft, &Array2::from_elem((6, 6), 1.0), Some(&header)).unwrap();
        write_image(&hard, &Array2::from_elem((6, 6), 2.0), None).unwrap();
        let combined = dir.path().join("combined.fits");

        let yaml = format!(
            "data:\n  - filename: {}\n    weightrad: [0.0, 5.0]\n    weightvals: [1.0, 1.0]\n  - filename: {}\n    weightrad: [0.0, 5.0]\n    weightvals: [1.0, 1.0]\nimage:\n  centre: [3.0, 3.0]\n  chop:\n    enable: true\n    range: [1, 1, 5, 4]\n  outfilename: {}\n",
            soft.display(),
            hard.display(),
            combined.display()
        );
        let params = CombinationParameters::from_yaml(&yaml).unwrap();
        let out = dir.path().join("out-pars.yml");
        let mut session = CombineSession::open(params, NullViewer, &out).unwrap();

        assert_eq!(session.slot(0).unwrap().data().dim(), (3, 4));
        assert_eq!(session.header().unwrap().axes[0].as_ref().unwrap().crpix, 3.0);

        session.redraw().unwrap();
        let written = read_image(&combined).unwrap();
        assert_eq!(written.shape(), (3, 4));
        assert!(written.data.iter().all(|&v| v == 1.0));
        assert_eq!(written.header.object.as_deref(), Some("A2199"));
        assert!(written.header.card("EXPOSURE").is_some());
    }

    #[test]
    fn mismatched_images_fail_to_load() {
        let params = CombinationParameters::from_yaml(PARAMS).unwrap();
        let mut hard = memory_image("hard.fits", 1.0);
        hard.data = Array2::zeros((4, 5));
        let result = CombineSession::from_images(
            params,
            vec![memory_image("soft.fits", 1.0), hard],
            NullViewer,
            "unused.yml",
        );
        assert!(matches!(
            result,
            Err(GgmError::ShapeMismatch {
                index: 1,
                expected: (4, 4),
                found: (4, 5),
            })
        ));
    }

    #[test]
    fn batched_edits_redraw_once() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out-pars.yml");
        let mut session = memory_session(NullViewer, &out);

        session
            .apply_all(vec![
                Edit::ToggleSign { index: 0 },
                Edit::ToggleSign { index: 1 },
                Edit::ToggleSign { index: 0 },
            ])
            .unwrap();
        assert_eq!(session.metrics().redraws, 1);
        assert_eq!(session.slot(0).unwrap().scale(), 2.0);
        assert_eq!(session.slot(1).unwrap().scale(), -1.0);

        let saved = CombinationParameters::load(&out).unwrap();
        assert_eq!(saved.data[1].weightvals, vec![-1.0, -1.0]);
    }
}
