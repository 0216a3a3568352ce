//! Bulk downloader for the audio tracks of a remote album.
//!
//! The album listing is assembled page by page, then every track is resolved
//! and downloaded on a [`TaskScheduler`] that runs a fixed number of workers
//! and pauses each worker between tasks.

pub mod api;
pub mod config;
pub mod downloader;
pub mod error;
pub mod utils;

pub use api::TrackDescriptor;
pub use config::DownloadConfig;
pub use downloader::{Summary, download_album, download_album_http, list_album_http};
pub use error::Error;
pub use utils::paced_scheduler::{SchedulerConfig, TaskScheduler};
