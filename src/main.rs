use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use face_stack::config::{self, ConfigFormat};
use face_stack::logging::init_logging;
use face_stack::pipeline::LogProgress;
use face_stack::tilt::TiltClassifier;
use face_stack::utils::{collect_inputs, sort_by_date, DatePattern, OutputWriter, SortOrder};
use face_stack::{AlignmentEngine, BatchOrchestrator, Config, ImageInput, LandmarkExtractor, ManifestExtractor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "face-stack")]
#[command(about = "Align face photographs onto a common reference frame")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Align a batch of images onto one reference layout
    Align {
        /// Image files or directories of images
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// JSON manifest of precomputed landmarks
        #[arg(short, long)]
        landmarks: Option<PathBuf>,

        /// Use this image's landmarks as the reference layout
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Eye distance of the synthesized reference, percent of width
        #[arg(long)]
        eye_distance: Option<f64>,

        /// Maximum accepted eye-line roll in degrees
        #[arg(long)]
        tilt_threshold: Option<f64>,

        /// Keep tilted images instead of skipping them
        #[arg(long)]
        no_tilt_filter: bool,

        /// Crop to the reference output size instead of keeping the background
        #[arg(long)]
        crop: bool,

        /// Do not adopt the reference image's size for outputs
        #[arg(long)]
        no_force_reference_size: bool,

        /// Also write copies with landmark markers drawn
        #[arg(long)]
        debug: bool,

        /// Process images on all cores
        #[arg(long)]
        parallel: bool,

        /// Order inputs by a date in their file names, e.g. YYYY-MM-DD
        #[arg(long)]
        sort_by_date: Option<DatePattern>,

        /// Newest first when sorting by date
        #[arg(long)]
        descending: bool,
    },

    /// Report the eye-line angle of each image without aligning
    Tilt {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// JSON manifest of precomputed landmarks
        #[arg(short, long)]
        landmarks: Option<PathBuf>,

        /// Maximum accepted roll in degrees
        #[arg(short, long, default_value = "5.0")]
        threshold: f64,
    },

    /// Write the default configuration to a file
    InitConfig {
        path: PathBuf,

        /// Write JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Align {
            inputs,
            landmarks,
            reference,
            config: config_path,
            output,
            eye_distance,
            tilt_threshold,
            no_tilt_filter,
            crop,
            no_force_reference_size,
            debug,
            parallel,
            sort_by_date,
            descending,
        } => {
            let mut config = config::load_config(config_path.as_deref())?;
            config.logging = config.logging.with_verbosity(cli.verbose);
            if let Some(dir) = output {
                config.output.directory = dir;
            }
            if let Some(percent) = eye_distance {
                config.engine.eye_distance_percent = percent;
            }
            if let Some(degrees) = tilt_threshold {
                config.engine.tilt_threshold_degrees = degrees;
            }
            if no_tilt_filter {
                config.engine.filter_tilted = false;
            }
            if crop {
                config.engine.preserve_background = false;
            }
            if no_force_reference_size {
                config.engine.force_reference_size = false;
            }
            if debug {
                config.engine.debug_mode = true;
            }
            if sort_by_date.is_some() {
                config.ordering.sort_by_date = sort_by_date;
            }
            if descending {
                config.ordering.order = SortOrder::Descending;
            }

            handle_align(config, inputs, landmarks, reference, parallel)?;
        }
        Commands::Tilt {
            inputs,
            landmarks,
            threshold,
        } => {
            let logging = face_stack::logging::LoggingConfig::default().with_verbosity(cli.verbose);
            let _guard = init_logging(&logging)?;
            handle_tilt(inputs, landmarks, threshold)?;
        }
        Commands::InitConfig { path, json } => {
            let format = if json { ConfigFormat::Json } else { ConfigFormat::Toml };
            Config::default().save_to_file(&path, format)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

fn load_extractor(manifest: Option<&Path>) -> anyhow::Result<ManifestExtractor> {
    let extractor = match manifest {
        Some(path) => ManifestExtractor::from_file(path)?,
        None => ManifestExtractor::new(),
    };
    Ok(extractor.with_sidecars(true))
}

fn handle_align(
    config: Config,
    inputs: Vec<PathBuf>,
    landmarks: Option<PathBuf>,
    reference: Option<PathBuf>,
    parallel: bool,
) -> anyhow::Result<()> {
    if let Err(errors) = config.validate() {
        bail!("Invalid configuration:\n  {}", errors.join("\n  "));
    }
    let _guard = init_logging(&config.logging)?;

    let extractor = load_extractor(landmarks.as_deref())?;
    let mut inputs = collect_inputs(&inputs).context("Failed to collect inputs")?;
    if let Some(pattern) = config.ordering.sort_by_date {
        inputs = sort_by_date(inputs, pattern, config.ordering.order);
    }
    if inputs.is_empty() {
        bail!("No input images found");
    }

    let mut engine = AlignmentEngine::new(&config, Arc::new(extractor))?;
    let orchestrator = BatchOrchestrator::new().with_progress(Arc::new(LogProgress));
    let reference = reference.map(ImageInput::from_path);

    let report = if parallel {
        orchestrator.run_parallel(&mut engine, &inputs, reference.as_ref())?
    } else {
        orchestrator.run(&mut engine, &inputs, reference.as_ref())?
    };

    let writer = OutputWriter::new(config.output.clone());
    let written = writer.write_batch(&report)?;

    println!("{}", report.summary());
    println!("Wrote {} images to {}", written.len(), writer.directory().display());
    for skip in report.skips() {
        println!("  skipped {}: {}", skip.id, skip.message());
    }

    Ok(())
}

fn handle_tilt(inputs: Vec<PathBuf>, landmarks: Option<PathBuf>, threshold: f64) -> anyhow::Result<()> {
    let extractor = load_extractor(landmarks.as_deref())?;
    let classifier = TiltClassifier::new(threshold)?;

    for input in collect_inputs(&inputs)? {
        let image = match input.load() {
            Ok(image) => image,
            Err(e) => {
                println!("{}: {}", input.id(), e);
                continue;
            }
        };
        let verdict = match extractor.extract(&image) {
            Some(landmarks) => classifier.classify(&landmarks),
            None => {
                println!("{}: no landmarks", image.id);
                continue;
            }
        };
        let status = if verdict.acceptable { "ok" } else { "tilted" };
        println!("{}: {} ({})", image.id, status, verdict.reason);
    }

    Ok(())
}
