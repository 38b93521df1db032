//! Exportador: command-line interface for the invitation capture pipeline
//!
//! ## Usage
//!
//! ```bash
//! exportador still https://host/invite/rose/abc123
//! exportador gif https://host/invite/rose/abc123 --duration 8 --encode
//! exportador video https://host/invite/rose/abc123 --duration 12
//! ```

mod error;

use clap::{Args, Parser, Subcommand};
use console::style;
use error::{CliError, CliResult};
use exportar::{
    CancelFlag, ExportOutput, ExportPipeline, FrameSequencer, ProgressObserver, RendererRuntime,
    RenderTarget, DEFAULT_GIF_DURATION_SECS, DEFAULT_VIDEO_DURATION_SECS,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "exportador", version, about = "Capture invitation pages as stills, GIFs and frame sequences")]
struct Cli {
    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Capture a single settled frame as a PNG
    Still(TargetArgs),
    /// Capture a GIF-rate (10 fps) sequence
    Gif(SequenceArgs),
    /// Capture a video-rate (30 fps) sequence
    Video(SequenceArgs),
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// URL of the rendered invitation page
    url: String,

    /// Output path (defaults to the suggested filename)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SequenceArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Capture duration in seconds
    #[arg(short, long)]
    duration: Option<u32>,

    /// Encode the full sequence as an animated GIF (GIF mode only)
    #[arg(long)]
    encode: bool,
}

struct BarObserver(ProgressBar);

impl ProgressObserver for BarObserver {
    fn on_progress(&self, captured: u32, total: u32) {
        self.0.set_length(u64::from(total));
        self.0.set_position(u64::from(captured));
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(execute(cli))
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

async fn execute(cli: Cli) -> CliResult<()> {
    let cancel = CancelFlag::new();
    spawn_ctrl_c_handler(cancel.clone());

    let (output, path) = match cli.command {
        Commands::Still(args) => {
            let pipeline = build_pipeline(cli.quiet);
            let target = RenderTarget::new(&args.url);
            let output = pipeline.export_still(&target).await?;
            (output, args.output)
        }
        Commands::Gif(args) => {
            let mut pipeline = build_pipeline(cli.quiet);
            if args.encode {
                pipeline = pipeline.with_gif_encoder();
            }
            let target = RenderTarget::new(&args.target.url);
            let duration = args.duration.unwrap_or(DEFAULT_GIF_DURATION_SECS);
            let output = pipeline.export_gif_with(&target, duration, &cancel).await?;
            (output, args.target.output)
        }
        Commands::Video(args) => {
            if args.encode {
                return Err(CliError::InvalidArgument {
                    message: "--encode applies to GIF exports only".to_string(),
                });
            }
            let pipeline = build_pipeline(cli.quiet);
            let target = RenderTarget::new(&args.target.url);
            let duration = args.duration.unwrap_or(DEFAULT_VIDEO_DURATION_SECS);
            let output = pipeline
                .export_video_with(&target, duration, &cancel)
                .await?;
            (output, args.target.output)
        }
    };

    write_output(&output, path)
}

fn build_pipeline(quiet: bool) -> ExportPipeline {
    let pipeline = ExportPipeline::new(RendererRuntime::new());
    if quiet {
        return pipeline.with_sequencer(FrameSequencer::silent());
    }

    let bar = ProgressBar::new(0).with_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} frames")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pipeline.with_sequencer(FrameSequencer::with_observer(Box::new(BarObserver(bar))))
}

fn spawn_ctrl_c_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling export");
            cancel.cancel();
        }
    });
}

fn write_output(output: &ExportOutput, path: Option<PathBuf>) -> CliResult<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(&output.suggested_filename));
    std::fs::write(&path, &output.data)?;
    println!(
        "{} {} ({}, {} bytes)",
        style("wrote").green().bold(),
        path.display(),
        output.mime_type,
        output.data.len()
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["exportador", "gif", "https://x/invite/a", "--duration", "4"]);
        match cli.command {
            Commands::Gif(args) => {
                assert_eq!(args.duration, Some(4));
                assert!(!args.encode);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test(start_paused = true)]
    async fn test_still_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");

        let pipeline = ExportPipeline::new(RendererRuntime::with_executable("/usr/bin/chromium"))
            .with_sequencer(FrameSequencer::silent());
        let output = pipeline
            .export_still(&RenderTarget::new("https://x/invite/abc"))
            .await
            .unwrap();

        write_output(&output, Some(path.clone())).unwrap();
        assert!(path.exists());
    }
}
