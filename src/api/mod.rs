mod client;

pub use client::{AlbumApi, DEFAULT_BASE_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ListingError, ResolutionError};

/// The minimal record identifying one track of an album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub title: String,
    pub track_id: u64,
}

/// One page of an album listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackPage {
    pub total_count: u64,
    pub items: Vec<TrackDescriptor>,
}

/// Paginated access to an album's track list.
#[async_trait]
pub trait Lister: Send + Sync {
    /// `page_num` is 1-based.
    async fn fetch_page(
        &self,
        album_id: u64,
        page_size: u32,
        page_num: u32,
    ) -> Result<TrackPage, ListingError>;
}

/// Turns a track id into a url its audio can be fetched from.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, track_id: u64) -> Result<String, ResolutionError>;
}

#[async_trait]
impl<T: Lister + ?Sized> Lister for Arc<T> {
    async fn fetch_page(
        &self,
        album_id: u64,
        page_size: u32,
        page_num: u32,
    ) -> Result<TrackPage, ListingError> {
        (**self).fetch_page(album_id, page_size, page_num).await
    }
}

#[async_trait]
impl<T: Resolver + ?Sized> Resolver for Arc<T> {
    async fn resolve(&self, track_id: u64) -> Result<String, ResolutionError> {
        (**self).resolve(track_id).await
    }
}
