use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{Lister, Resolver, TrackDescriptor, TrackPage};
use crate::error::{ListingError, ResolutionError};

pub const DEFAULT_BASE_URL: &str = "https://www.ximalaya.com";

const TRACKS_LIST_PATH: &str = "/revision/album/v1/getTracksList";
const AUDIO_PATH: &str = "/revision/play/v1/audio";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracksListData {
    track_total_count: u64,
    #[serde(default)]
    tracks: Vec<TrackEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackEntry {
    title: String,
    track_id: u64,
}

#[derive(Debug, Deserialize)]
struct AudioData {
    #[serde(default)]
    src: Option<String>,
}

/// HTTP client for the album listing and audio resolution endpoints.
#[derive(Debug, Clone)]
pub struct AlbumApi {
    client: reqwest::Client,
    base_url: String,
}

impl AlbumApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Lister for AlbumApi {
    async fn fetch_page(
        &self,
        album_id: u64,
        page_size: u32,
        page_num: u32,
    ) -> Result<TrackPage, ListingError> {
        let url = format!("{}{}", self.base_url, TRACKS_LIST_PATH);
        debug!(album_id, page_size, page_num, "fetching listing page");

        let response = self
            .client
            .get(url)
            .query(&[
                ("albumId", album_id.to_string()),
                ("pageSize", page_size.to_string()),
                ("pageNum", page_num.to_string()),
            ])
            .send()
            .await
            .map_err(|source| ListingError::Request {
                page: page_num,
                source,
            })?;

        if !response.status().is_success() {
            return Err(ListingError::Status {
                page: page_num,
                status: response.status().as_u16(),
            });
        }

        let envelope = response
            .json::<Envelope<TracksListData>>()
            .await
            .map_err(|source| ListingError::Decode {
                page: page_num,
                source,
            })?;

        Ok(TrackPage {
            total_count: envelope.data.track_total_count,
            items: envelope
                .data
                .tracks
                .into_iter()
                .map(|entry| TrackDescriptor {
                    title: entry.title,
                    track_id: entry.track_id,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl Resolver for AlbumApi {
    async fn resolve(&self, track_id: u64) -> Result<String, ResolutionError> {
        let url = format!("{}{}", self.base_url, AUDIO_PATH);

        let response = self
            .client
            .get(url)
            .query(&[("ptype", "1".to_string()), ("id", track_id.to_string())])
            .send()
            .await
            .map_err(|source| ResolutionError::Request { track_id, source })?;

        if !response.status().is_success() {
            return Err(ResolutionError::Status {
                track_id,
                status: response.status().as_u16(),
            });
        }

        let envelope = response
            .json::<Envelope<AudioData>>()
            .await
            .map_err(|source| ResolutionError::Decode { track_id, source })?;

        match envelope.data.src {
            Some(src) if !src.trim().is_empty() => Ok(src),
            _ => Err(ResolutionError::MissingSource { track_id }),
        }
    }
}
