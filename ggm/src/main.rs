use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use ggmcore::params::CombinationParameters;
use ggmcore::session::{CombineSession, Edit, DEFAULT_OUTPUT_PARAMETERS};
use ggmcore::viewer::{Ds9Viewer, ImageViewer, NullViewer};
use std::path::PathBuf;
use workflow::config::PipelineSettings;
use workflow::runner::{run_gaussian, run_hide_regions, Runner};

mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Gradient-magnitude maps and radial-weighted image combination")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Adaptive Gaussian gradient magnitude of a counts image
    Adaptive(AdaptiveArgs),
    /// Gaussian gradient magnitude at a single smoothing scale
    Gaussian {
        input: PathBuf,
        output: PathBuf,
        /// Gaussian sigma in pixels
        sigma: f64,
    },
    /// Combine images with the weights stored in a parameter file
    Combine(CombineArgs),
    /// Replace circle and ellipse regions with pixels drawn from around them
    HideRegions {
        input: PathBuf,
        /// Region file, one circle(...) or ellipse(...) per line
        regions: PathBuf,
        output: PathBuf,
        /// Seed for the pixel picks; random when omitted
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(ClapArgs)]
struct AdaptiveArgs {
    /// Counts image used to build the scale map
    counts: PathBuf,
    /// Image to smooth instead of the counts image
    #[arg(long)]
    image: Option<PathBuf>,
    /// Smoothing signal-to-noise ratio [default: 32]
    #[arg(long)]
    sn: Option<f64>,
    /// Take log10 of the smoothed image before differencing [default: true]
    #[arg(long)]
    log: Option<bool>,
    #[arg(long)]
    mask: Option<PathBuf>,
    /// Intermediate scale map [default: scale.fits]
    #[arg(long)]
    scale: Option<PathBuf>,
    /// Intermediate smoothed image [default: smoothed.fits]
    #[arg(long)]
    smimage: Option<PathBuf>,
    /// Threads used by the smoothing program [default: 4]
    #[arg(long)]
    threads: Option<usize>,
    /// Directory holding accumulate_counts
    #[arg(long)]
    contbin_dir: Option<PathBuf>,
    /// YAML file with defaults for the options above
    #[arg(long)]
    config: Option<PathBuf>,
    /// Warn instead of failing when log meets non-positive samples
    #[arg(long, default_value_t = false)]
    allow_nonpositive: bool,
    /// Output gradient image
    output: PathBuf,
}

impl AdaptiveArgs {
    fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            sn: self.sn,
            log: self.log,
            mask: self.mask.clone(),
            scale: self.scale.clone(),
            smimage: self.smimage.clone(),
            threads: self.threads,
            contbin_dir: self.contbin_dir.clone(),
            allow_nonpositive: self.allow_nonpositive.then_some(true),
        }
    }
}

#[derive(ClapArgs)]
struct CombineArgs {
    /// Combination parameter file
    params: PathBuf,
    /// Where the updated parameters are written
    #[arg(long, default_value = DEFAULT_OUTPUT_PARAMETERS)]
    out_pars: PathBuf,
    /// Flip the sign of the scale of image IDX before combining
    #[arg(long = "disable", value_name = "IDX")]
    disable: Vec<usize>,
    /// Do not send the result to DS9
    #[arg(long, default_value_t = false)]
    no_viewer: bool,
    /// XPA target of the DS9 instance
    #[arg(long, default_value = "ds9")]
    viewer_target: String,
}

fn run_adaptive(args: AdaptiveArgs) -> anyhow::Result<()> {
    let file_settings = match &args.config {
        Some(path) => PipelineSettings::load(path)?,
        None => PipelineSettings::default(),
    };
    let config = args.settings().merge(file_settings).resolve(
        args.counts,
        args.image,
        args.output,
    );

    let result = Runner::new(config.clone()).execute()?;
    println!(
        "Gradient {}x{} -> {} ({} non-finite, {})",
        result.shape.1,
        result.shape.0,
        config.output.display(),
        result.non_finite,
        result.notes.join(", ")
    );
    Ok(())
}

fn run_combine(args: CombineArgs) -> anyhow::Result<()> {
    let params = CombinationParameters::load(&args.params)
        .with_context(|| format!("loading parameters {}", args.params.display()))?;
    let viewer: Box<dyn ImageViewer> = if args.no_viewer {
        Box::new(NullViewer)
    } else {
        Box::new(Ds9Viewer::new(args.viewer_target))
    };
    let mut session = CombineSession::open(params, viewer, &args.out_pars)
        .context("opening combination session")?;

    let toggles = args
        .disable
        .iter()
        .map(|&index| Edit::ToggleSign { index })
        .collect();
    session
        .apply_all(toggles)
        .with_context(|| format!("combining images (sign flips {:?})", args.disable))?;

    let metrics = session.metrics();
    println!(
        "Combined {} images ({} redraws) -> {}",
        session.len(),
        metrics.redraws,
        session.out_pars().display()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Adaptive(adaptive) => run_adaptive(adaptive)?,
        Command::Gaussian {
            input,
            output,
            sigma,
        } => {
            let result = run_gaussian(&input, &output, sigma)?;
            println!(
                "Gradient {}x{} -> {} ({})",
                result.shape.1,
                result.shape.0,
                output.display(),
                result.notes.join(", ")
            );
        }
        Command::Combine(combine) => run_combine(combine)?,
        Command::HideRegions {
            input,
            regions,
            output,
            seed,
        } => {
            let result = run_hide_regions(&input, &regions, &output, seed)?;
            println!(
                "Hid regions of {} -> {} ({})",
                input.display(),
                output.display(),
                result.notes.join(", ")
            );
        }
    }

    Ok(())
}
