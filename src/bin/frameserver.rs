//! Frameserver child process: attaches to the page a display server created
//! under `key` and pumps one producer through it until the parent goes away.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use frameshm::cell::{RasterProducer, SolidRenderer};
use frameshm::testpattern::TestPattern;
use frameshm::{Content, FrameSkip, FsrvError, Producer, PumpOptions, Result, Termination};

#[derive(Parser, Debug)]
#[command(name = "frameserver", about = "Run a producer against a shared frame page.")]
struct Args {
    /// Page key the parent created
    key: String,

    /// Producer to run (testpattern, raster)
    #[arg(long, default_value = "testpattern")]
    mode: String,

    /// Content handed to the producer's load step
    #[arg(long, value_name = "PATH")]
    content: Option<PathBuf>,

    /// Wait bound in milliseconds before the parent is presumed gone; negative blocks forever
    #[arg(
        long,
        env = "FRAMESERVER_TIMEOUT_MS",
        default_value_t = 5000,
        allow_negative_numbers = true
    )]
    timeout_ms: i64,

    /// Frame skipping when the parent refreshes slower than the producer runs
    #[arg(long, env = "FRAMESERVER_FRAMESKIP", default_value = "off")]
    frameskip: FrameSkip,
}

fn producer_for(mode: &str) -> Result<Box<dyn Producer>> {
    match mode {
        "testpattern" => Ok(Box::new(TestPattern::new())),
        "raster" => Ok(Box::new(RasterProducer::new(SolidRenderer::default()))),
        other => Err(FsrvError::MissingProducer(other.to_owned())),
    }
}

fn run(args: &Args) -> Result<Termination> {
    let producer = producer_for(&args.mode)?;
    let content = match &args.content {
        Some(path) => Content::from_path(path)?,
        None => Content::default(),
    };
    let timeout = u64::try_from(args.timeout_ms).ok().map(Duration::from_millis);
    let options = PumpOptions {
        wait_timeout: timeout,
        handshake_timeout: timeout,
        frame_skip: args.frameskip,
    };
    frameshm::serve(producer, &args.key, &content, options)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(reason) => {
            tracing::info!(?reason, "frameserver exiting");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(key = %args.key, mode = %args.mode, "frameserver failed: {err}");
            ExitCode::FAILURE
        }
    }
}
