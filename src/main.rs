use clap::Parser;
use image_optim::{output, Config, ImageOptim};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "image-optim")]
#[command(about = "Losslessly reduce image file sizes using external optimizer binaries")]
#[command(long_about = "\
Losslessly reduce image file sizes using external optimizer binaries.

Each image is run through every applicable tool (jpegoptim, jpegtran,
pngquant, oxipng, optipng, pngcrush, advpng, gifsicle, svgo, cwebp) and
replaced in place only when the result is strictly smaller. Tools that are
not installed are skipped with a warning.

Configuration is read from .image_optim.toml in the working directory when
present; command-line flags override it. Example:

  [workers]
  pngcrush = false

  [workers.jpegoptim]
  allow_lossy = true
  max_quality = 85

Exit status is 0 when every requested image was processed, including
images that could not be made smaller; nonzero on configuration errors or
unexpected IO failures.")]
#[command(version)]
struct Cli {
    /// Image files to optimize
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// How many images to process in parallel (default: CPU count)
    #[arg(long)]
    threads: Option<usize>,

    /// Report possible savings without touching the input files
    #[arg(long)]
    no_replace: bool,

    /// Wall-clock budget per tool invocation, in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Explicit config file (default: ./.image_optim.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(clean) => {
            if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("image-optim: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool, image_optim::Error> {
    let file_layer = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::load(Path::new("."))?,
    };
    let inline = Config {
        threads: cli.threads,
        timeout: cli.timeout,
        ..Config::default()
    };
    let config = Config::compose([file_layer, inline]);

    let engine = ImageOptim::new(&config)?;
    let results = if cli.no_replace {
        engine.optimize_many(cli.paths)
    } else {
        engine.optimize_many_replace(cli.paths)
    };

    output::print_report(&results);

    // In report-only mode the optimized bytes live in temp files nobody
    // will consume; release them now that the sizes are printed.
    if cli.no_replace {
        for (_, result) in &results {
            if let Ok(Some(optimized)) = result {
                let _ = std::fs::remove_file(&optimized.path);
            }
        }
    }

    Ok(results.iter().all(|(_, result)| result.is_ok()))
}
