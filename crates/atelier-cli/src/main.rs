use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use atelier_contracts::config::{clamped_duration, AppConfig};
use atelier_contracts::payloads::{GenerateForm, VideoSubmitForm};
use atelier_engine::Studio;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "atelier-rs", version, about = "Styled image and video generation studio")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate an image from a prompt and a style.
    Generate(GenerateArgs),
    /// Submit and track image-to-video tasks.
    #[command(subcommand)]
    Video(VideoCommand),
    /// Turn a document or image into a generation-ready description.
    Analyze(AnalyzeArgs),
    /// List image styles, or video styles with --video.
    Styles(StylesArgs),
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    style: String,
    /// auto, openrouter, segmind, gpt_image1, gemini, or fallback.
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    reference: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum VideoCommand {
    Submit(VideoSubmitArgs),
    Status(TaskArgs),
    Wait(VideoWaitArgs),
}

#[derive(Debug, Args)]
struct VideoSubmitArgs {
    #[arg(long)]
    image_url: String,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    video_style: Option<String>,
    #[arg(long)]
    resolution: Option<String>,
    #[arg(long)]
    duration: Option<u32>,
    #[arg(long)]
    camera_fixed: Option<bool>,
    #[arg(long)]
    watermark: Option<bool>,
}

#[derive(Debug, Args)]
struct TaskArgs {
    task_id: String,
}

#[derive(Debug, Args)]
struct VideoWaitArgs {
    task_id: String,
    #[arg(long)]
    max_wait: Option<f64>,
    #[arg(long)]
    interval: Option<f64>,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    path: PathBuf,
}

#[derive(Debug, Args)]
struct StylesArgs {
    #[arg(long)]
    video: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("atelier-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let studio = Studio::from_config(AppConfig::from_env())?;
    tracing::debug!(command = ?cli.command, "dispatching");

    match cli.command {
        Command::Generate(args) => {
            let response = studio.generate(&GenerateForm {
                prompt: args.prompt,
                style: args.style,
                model: args.model,
                reference_image: args.reference,
            });
            emit(&response, response.success)
        }
        Command::Video(VideoCommand::Submit(args)) => {
            let response = studio.submit_video(&VideoSubmitForm {
                image_url: args.image_url,
                prompt: args.prompt,
                video_style: args.video_style,
                resolution: args.resolution,
                duration: args.duration,
                camera_fixed: args.camera_fixed,
                watermark: args.watermark,
            });
            emit(&response, response.success)
        }
        Command::Video(VideoCommand::Status(args)) => {
            let response = studio.video_status(&args.task_id);
            emit(&response, response.success)
        }
        Command::Video(VideoCommand::Wait(args)) => {
            let response = studio.await_video(
                &args.task_id,
                seconds(args.max_wait),
                seconds(args.interval),
            );
            emit(&response, response.success)
        }
        Command::Analyze(args) => {
            let response = studio.analyze(&args.path);
            emit(&response, response.success)
        }
        Command::Styles(args) if args.video => emit(&studio.video_styles(), true),
        Command::Styles(_) => emit(&studio.styles(), true),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn seconds(value: Option<f64>) -> Option<Duration> {
    value.and_then(clamped_duration)
}

fn emit<T: Serialize>(payload: &T, success: bool) -> Result<i32> {
    let rendered =
        serde_json::to_string_pretty(payload).context("failed to render response payload")?;
    println!("{rendered}");
    Ok(if success { 0 } else { 1 })
}
