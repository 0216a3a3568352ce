use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::DEFAULT_BASE_URL;
use crate::downloader::listing::DEFAULT_PAGE_SIZE;
use crate::error::{ConfigError, Error};
use crate::utils::paced_scheduler::SchedulerConfig;

pub const DEFAULT_WORKER_COUNT: usize = 3;
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(4000);
pub const DEFAULT_USER_AGENT: &str = concat!("albumdl/", env!("CARGO_PKG_VERSION"));

/// Everything needed to download one album over HTTP.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub base_url: String,
    pub page_size: u32,
    pub worker_count: usize,
    /// Wait inserted after each task a worker finishes.
    pub pacing_delay: Duration,
    pub output_dir: PathBuf,
    pub user_agent: String,
    /// `None` lets a request hang for as long as the server keeps it open.
    pub request_timeout: Option<Duration>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            pacing_delay: DEFAULT_PACING_DELAY,
            output_dir: PathBuf::from("."),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: None,
        }
    }
}

impl DownloadConfig {
    pub fn scheduler(&self) -> Result<SchedulerConfig, ConfigError> {
        SchedulerConfig::new(self.worker_count, self.pacing_delay)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler()?;
        match Url::parse(&self.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
            _ => Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
            }),
        }
    }

    pub fn http_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder().user_agent(self.user_agent.as_str());
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}
