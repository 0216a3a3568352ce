use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use albumdl::api::DEFAULT_BASE_URL;
use albumdl::{DownloadConfig, download_album_http, list_album_http};

#[derive(Parser)]
#[command(name = "albumdl")]
#[command(about = "Download every audio track of an album")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Download {
        #[arg(short, long, help = "album id")]
        album: u64,
        #[arg(short, long, help = "concurrent downloads", default_value_t = 3)]
        concurrency: usize,
        #[arg(long, help = "pause after each download, in milliseconds", default_value_t = 4000)]
        pacing_ms: u64,
        #[arg(long, help = "tracks per listing page", default_value_t = 10)]
        page_size: u32,
        #[arg(short, long, help = "output directory", default_value = ".")]
        output: PathBuf,
        #[arg(long, help = "api base url")]
        base_url: Option<String>,
        #[arg(long, help = "per-request timeout in seconds")]
        timeout_secs: Option<u64>,
        #[arg(long, help = "print the summary as json")]
        json: bool,
    },
    List {
        #[arg(short, long, help = "album id")]
        album: u64,
        #[arg(long, help = "tracks per listing page", default_value_t = 10)]
        page_size: u32,
        #[arg(long, help = "api base url")]
        base_url: Option<String>,
        #[arg(long, help = "print the track list as json")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Download {
            album,
            concurrency,
            pacing_ms,
            page_size,
            output,
            base_url,
            timeout_secs,
            json,
        }) => {
            let config = DownloadConfig {
                base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                page_size,
                worker_count: concurrency,
                pacing_delay: Duration::from_millis(pacing_ms),
                output_dir: output,
                request_timeout: timeout_secs.map(Duration::from_secs),
                ..DownloadConfig::default()
            };

            let summary = download_album_http(album, &config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary);
            }
        }

        Some(Commands::List {
            album,
            page_size,
            base_url,
            json,
        }) => {
            let config = DownloadConfig {
                base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                page_size,
                ..DownloadConfig::default()
            };

            let tracks = list_album_http(album, &config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tracks)?);
            } else {
                for (index, track) in tracks.iter().enumerate() {
                    println!("{}. {} ({})", index + 1, track.title, track.track_id);
                }
            }
        }

        None => {
            println!("Use --help for available commands");
        }
    }

    Ok(())
}
