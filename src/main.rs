//! `veo-drive` command line entry point

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use veo_drive::{
    Config, GeminiGenerator, Pipeline, Result, StaticCredentials, run_until_interrupted,
};

/// Generate a video from a prompt and upload it to Google Drive.
///
/// Drive and Cloud Storage access tokens are read from
/// `GOOGLE_DRIVE_ACCESS_TOKEN` and `GOOGLE_STORAGE_ACCESS_TOKEN`.
#[derive(Parser)]
#[command(name = "veo-drive")]
#[command(version)]
struct Cli {
    /// Text prompt describing the video
    prompt: String,

    /// Drive file name; an extension is added from the content type when missing
    #[arg(short = 'o', long = "output_filename")]
    output_filename: Option<String>,

    /// Drive folder ID to upload into
    #[arg(short = 'f', long = "folder_id")]
    folder_id: Option<String>,

    /// JSON configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// API key for the generation service
    #[arg(long, env = "GOOGLE_GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(
                code = error.error_code(),
                error = %error,
                "run failed"
            );
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.generation.model,
        chunk_size = config.upload.chunk_size,
        "starting veo-drive"
    );

    let generator = GeminiGenerator::new(config.generation.clone(), cli.api_key)?;
    let pipeline = Pipeline::new(
        config,
        Arc::new(generator),
        Arc::new(StaticCredentials::from_env()),
    )?;

    let stored = run_until_interrupted(pipeline.run(
        &cli.prompt,
        cli.output_filename.as_deref(),
        cli.folder_id.as_deref(),
    ))
    .await?;

    match &stored.web_view_link {
        Some(link) => println!("{} {}", stored.object_id, link),
        None => println!("{}", stored.object_id),
    }
    Ok(())
}

/// Initializes tracing with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
