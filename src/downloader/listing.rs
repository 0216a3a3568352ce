use tracing::{debug, info};

use crate::api::{Lister, TrackDescriptor};
use crate::error::ListingError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Collects an album's full track list from a paginated [`Lister`].
pub struct ListingAssembler<L> {
    lister: L,
    page_size: u32,
}

impl<L: Lister> ListingAssembler<L> {
    pub fn new(lister: L, page_size: u32) -> Self {
        ListingAssembler { lister, page_size }
    }

    /// Fetches every page in order and concatenates their items. The first
    /// page both reports the total and contributes its items. Any page
    /// failure fails the whole listing.
    pub async fn assemble(&self, album_id: u64) -> Result<Vec<TrackDescriptor>, ListingError> {
        if self.page_size == 0 {
            return Err(ListingError::InvalidPageSize);
        }

        let first = self.lister.fetch_page(album_id, self.page_size, 1).await?;
        let total_pages = total_pages(first.total_count, self.page_size);
        debug!(
            album_id,
            total_count = first.total_count,
            total_pages,
            "fetched first listing page"
        );

        if total_pages == 0 {
            info!(album_id, "album listing is empty");
            return Ok(Vec::new());
        }

        let mut result = first.items;
        for page_num in 2..=total_pages {
            let page = self
                .lister
                .fetch_page(album_id, self.page_size, page_num)
                .await?;
            debug!(album_id, page_num, items = page.items.len(), "fetched listing page");
            result.extend(page.items);
        }

        info!(album_id, tracks = result.len(), "assembled album listing");
        Ok(result)
    }
}

fn total_pages(total_count: u64, page_size: u32) -> u32 {
    let pages = total_count.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}
