use clap::Parser;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use stepanizerizer::config::{self, RunConfig, RunOptions};
use stepanizerizer::context::{CancelFlag, ConsoleSink, RunContext};
use stepanizerizer::export::{self, VERSION};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "stepanizerizer")]
#[command(about = "Prepare tomographic slice stacks for STEPanizer")]
#[command(long_about = "\
Prepare tomographic slice stacks for STEPanizer

Selects a systematic uniform random sample of reconstructed slices, stamps a
calibrated scale bar into the bottom right corner, optionally shrinks them and
writes them as sequentially numbered JPEGs.

Expected layout:

  SampleA/
  └── rec/
      ├── SampleA_rec.log              # Scan log with the pixel size
      ├── SampleA_rec00000000.png
      └── ...

Output (never overwritten):

  SampleA/STEPanizer_n10_pixelsize11um_scalebar1000um/
  ├── SampleA_1.jpg ... SampleA_10.jpg
  ├── STEPanizerizer.log
  └── selection.json

Run 'stepanizerizer --gen-config' to print a documented settings file.")]
#[command(version = VERSION)]
struct Cli {
    /// Sample folder containing the rec subfolder
    #[arg(short = 'f', long = "folder", required_unless_present = "gen_config")]
    folder: Option<PathBuf>,

    /// Number of slices to select
    #[arg(short = 'n', long = "number-of-files")]
    number_of_files: Option<u32>,

    /// Distance between selected slices in um
    #[arg(short = 's', long = "slice-distance")]
    slice_distance: Option<f64>,

    /// Pixel size in um, overrides the scan log
    #[arg(short = 'p', long = "pixel-size")]
    pixel_size: Option<f64>,

    /// Disector thickness in um (not implemented)
    #[arg(short = 'd', long = "disector-thickness")]
    disector_thickness: Option<f64>,

    /// Scale bar length in um, 0 disables the bar
    #[arg(short = 'b', long = "scalebar", default_value_t = config::DEFAULT_SCALEBAR_UM)]
    scalebar: u32,

    /// Resize the longest image side to this many px
    #[arg(short = 'r', long = "resize")]
    resize: Option<u32>,

    /// Verbose diagnostics
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Export slices on this many threads
    #[arg(short = 'j', long = "jobs")]
    jobs: Option<usize>,

    /// Settings file (TOML), overrides stock defaults
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Print a stock settings file with all options documented
    #[arg(long = "gen-config")]
    gen_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.gen_config {
        print!("{}", config::stock_settings_toml());
        return ExitCode::SUCCESS;
    }

    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e} ({})", e.category());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), export::ExportError> {
    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(jobs) = cli.jobs {
        settings.processing.max_threads = jobs;
        settings.validate()?;
    }

    let run_config = RunConfig::from_options(RunOptions {
        sample_folder: cli.folder,
        file_count: cli.number_of_files,
        slice_distance_um: cli.slice_distance,
        pixel_size_um: cli.pixel_size,
        disector_thickness_um: cli.disector_thickness,
        scalebar_um: Some(cli.scalebar),
        resize_longest_side_px: cli.resize,
        verbose: cli.verbose,
    })?;

    let cancel = CancelFlag::new();
    signal_hook::flag::register(signal_hook::consts::signal::SIGINT, cancel.as_atomic())?;

    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let mut ctx = RunContext::new(Box::new(SmallRng::from_os_rng()), Arc::new(ConsoleSink))
        .with_cancel(cancel)
        .with_command_line(command_line);

    let summary = export::run(&run_config, &settings, &mut ctx)?;
    println!(
        "Wrote {} images to {}",
        summary.records.len(),
        summary.output_dir.display()
    );
    Ok(())
}

/// Diagnostics go to stderr; `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "stepanizerizer=debug"
    } else {
        "stepanizerizer=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
