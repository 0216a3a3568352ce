use std::path::PathBuf;
use thiserror::Error;

/// Failure while assembling an album listing. Fatal for the whole run.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("page size must be at least 1")]
    InvalidPageSize,

    #[error("listing request for page {page} failed: {source}")]
    Request {
        page: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("listing page {page} returned HTTP {status}")]
    Status { page: u32, status: u16 },

    #[error("listing page {page} could not be decoded: {source}")]
    Decode {
        page: u32,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure while resolving a track id to its source url.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("resolve request for track {track_id} failed: {source}")]
    Request {
        track_id: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("resolve for track {track_id} returned HTTP {status}")]
    Status { track_id: u64, status: u16 },

    #[error("resolve response for track {track_id} could not be decoded: {source}")]
    Decode {
        track_id: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("track {track_id} has no playable source")]
    MissingSource { track_id: u64 },
}

/// Failure while fetching a source url or persisting its bytes.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transfer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("transfer returned HTTP {status}")]
    Status { status: u16 },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single track did not make it to disk.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("invalid base url {url:?}")]
    InvalidBaseUrl { url: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listing error: {0}")]
    Listing(#[from] ListingError),

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}
