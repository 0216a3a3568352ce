pub mod listing;
pub mod pipeline;
pub mod transfer;

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::api::{AlbumApi, Lister, Resolver, TrackDescriptor};
use crate::config::DownloadConfig;
use crate::error::{Error, ListingError};
use crate::utils::paced_scheduler::{SchedulerConfig, TaskScheduler};
use listing::ListingAssembler;
use pipeline::{ErrorList, build_tasks};
use transfer::{Downloader, HttpDownloader};

/// Outcome of one album run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub failed_items: Vec<TrackDescriptor>,
}

impl Summary {
    fn new(total: usize, failed_items: Vec<TrackDescriptor>) -> Self {
        Summary {
            succeeded: total.saturating_sub(failed_items.len()),
            failed: failed_items.len(),
            failed_items,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "download task done, success download {} file, {} error!",
            self.succeeded, self.failed
        )?;
        for item in &self.failed_items {
            write!(f, "\n  failed: {} (track {})", item.title, item.track_id)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub page_size: u32,
    pub scheduler: SchedulerConfig,
}

/// Lists the album, downloads every track on the paced scheduler and reports
/// which ones failed. Only a listing failure makes this return an error; in
/// that case nothing is scheduled.
pub async fn download_album<L, R, D>(
    album_id: u64,
    lister: L,
    resolver: Arc<R>,
    downloader: Arc<D>,
    options: RunOptions,
) -> Result<Summary, ListingError>
where
    L: Lister,
    R: Resolver + ?Sized + 'static,
    D: Downloader + ?Sized + 'static,
{
    let descriptors = ListingAssembler::new(lister, options.page_size)
        .assemble(album_id)
        .await?;

    let errors = ErrorList::new();
    let tasks = build_tasks(&descriptors, &resolver, &downloader, &errors);
    let total = tasks.len();

    let (tx, rx) = oneshot::channel();
    let on_done = {
        let errors = errors.clone();
        move || {
            let summary = Summary::new(total, errors.snapshot());
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                "download task done"
            );
            let _ = tx.send(summary);
        }
    };

    let report = TaskScheduler::new(options.scheduler)
        .run_with_completion(tasks, on_done)
        .await;
    info!(
        album_id,
        tasks = report.tasks,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "scheduler run finished"
    );
    if report.panicked > 0 {
        warn!(
            album_id,
            panicked = report.panicked,
            "tasks panicked outside the download pipeline"
        );
    }

    Ok(rx
        .await
        .unwrap_or_else(|_| Summary::new(total, errors.snapshot())))
}

pub async fn download_album_http(album_id: u64, config: &DownloadConfig) -> Result<Summary, Error> {
    config.validate()?;
    let client = config.http_client()?;
    let api = Arc::new(AlbumApi::new(client.clone(), config.base_url.as_str()));
    let downloader = Arc::new(HttpDownloader::new(client, config.output_dir.clone()));
    let options = RunOptions {
        page_size: config.page_size,
        scheduler: config.scheduler()?,
    };

    Ok(download_album(album_id, Arc::clone(&api), api, downloader, options).await?)
}

/// Assembles the listing only.
pub async fn list_album_http(
    album_id: u64,
    config: &DownloadConfig,
) -> Result<Vec<TrackDescriptor>, Error> {
    config.validate()?;
    let api = AlbumApi::new(config.http_client()?, config.base_url.as_str());
    Ok(ListingAssembler::new(api, config.page_size)
        .assemble(album_id)
        .await?)
}
