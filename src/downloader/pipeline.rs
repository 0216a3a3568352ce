use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::api::{Resolver, TrackDescriptor};
use crate::downloader::transfer::Downloader;
use crate::error::TrackError;
use crate::utils::paced_scheduler::{Task, task};

/// Tracks whose download failed. Cheap to clone; all clones share one list.
#[derive(Debug, Clone, Default)]
pub struct ErrorList {
    items: Arc<Mutex<Vec<TrackDescriptor>>>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, descriptor: TrackDescriptor) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<TrackDescriptor> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn download_track<R, D>(
    descriptor: &TrackDescriptor,
    resolver: &R,
    downloader: &D,
) -> Result<PathBuf, TrackError>
where
    R: Resolver + ?Sized,
    D: Downloader + ?Sized,
{
    let url = resolver.resolve(descriptor.track_id).await?;
    let path = downloader
        .fetch_and_persist(&url, &descriptor.title)
        .await?;
    Ok(path)
}

/// Builds the task that downloads one track. A failure, panics included, is
/// recorded in `errors` and never escapes the task.
pub fn build_task<R, D>(
    descriptor: TrackDescriptor,
    resolver: Arc<R>,
    downloader: Arc<D>,
    errors: ErrorList,
) -> Task
where
    R: Resolver + ?Sized + 'static,
    D: Downloader + ?Sized + 'static,
{
    task(move || async move {
        info!(title = %descriptor.title, track_id = descriptor.track_id, "start download");
        let outcome = AssertUnwindSafe(download_track(
            &descriptor,
            resolver.as_ref(),
            downloader.as_ref(),
        ))
        .catch_unwind()
        .await;
        match outcome {
            Ok(Ok(path)) => {
                info!(title = %descriptor.title, path = %path.display(), "download success");
            }
            Ok(Err(err)) => {
                warn!(title = %descriptor.title, track_id = descriptor.track_id, "download error: {}", err);
                errors.push(descriptor);
            }
            Err(_) => {
                warn!(title = %descriptor.title, track_id = descriptor.track_id, "download panicked");
                errors.push(descriptor);
            }
        }
    })
}

pub fn build_tasks<R, D>(
    descriptors: &[TrackDescriptor],
    resolver: &Arc<R>,
    downloader: &Arc<D>,
    errors: &ErrorList,
) -> Vec<Task>
where
    R: Resolver + ?Sized + 'static,
    D: Downloader + ?Sized + 'static,
{
    descriptors
        .iter()
        .map(|descriptor| {
            build_task(
                descriptor.clone(),
                Arc::clone(resolver),
                Arc::clone(downloader),
                errors.clone(),
            )
        })
        .collect()
}
