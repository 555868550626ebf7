//! Core functionality for fetching and sorting Google Takeout photo exports.
//!
//! This library provides the three stages of the pipeline:
//! - Download: click every archive part on the Takeout page, one at a time, with resume
//! - Extract: unpack the downloaded ZIPs on a worker pool
//! - Organize: move photos into `YYYY/MM/DD` folders by EXIF, sidecar JSON or mtime
//!
//! plus progress events, session reports and the ambient config/logging pieces.

// -- External Dependencies --
use log::{info, warn};

// -- Standard Library --
use std::path::Path;

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use config::*;
pub use error::{Error, Result};
pub use types::*;

// -- Public Modules --
pub mod config;
pub mod discovery;
pub mod download;
pub mod extract;
pub mod logging;
pub mod organize;
pub mod progress;
pub mod report;
pub mod safety;
pub mod types;
pub mod update;
pub mod utils;

use download::{DownloadStats, TakeoutPage, WebDriverPage};
use extract::ExtractStats;
use organize::OrganizeStats;
use progress::{CancelToken, ProgressSink};

/// Main entry point for the download / extract / organize pipeline
pub struct Takeout {
    config: Config,
    safety_manager: safety::SafetyManager,
    cancel: CancelToken,
}

impl Takeout {
    /// Create a new pipeline with the provided configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            safety_manager: safety::SafetyManager::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that pauses every stage when cancelled
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Download all archive parts using a Chrome session over WebDriver
    pub async fn download(&self, url: &str, sink: &dyn ProgressSink) -> Result<DownloadStats> {
        let mut page = WebDriverPage::connect(
            &self.config.webdriver_url,
            &self.config.download_dir,
            self.config.chrome_profile_dir.as_deref(),
        )
        .await?;
        self.download_with(&mut page, url, sink).await
    }

    /// Download all archive parts through an already opened page, closing it afterwards
    pub async fn download_with<P: TakeoutPage + ?Sized>(
        &self,
        page: &mut P,
        url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadStats> {
        let result = download::download_all(
            page,
            url,
            &self.config.download_dir,
            &self.config,
            &self.cancel,
            sink,
        )
        .await;

        if let Err(e) = page.close().await {
            warn!("Failed to close the browser session: {}", e);
        }
        result
    }

    /// Extract every archive from the download directory into the extract directory
    pub fn extract(&self, sink: &dyn ProgressSink) -> Result<ExtractStats> {
        extract::extract_all(
            &self.config.download_dir,
            &self.config.extract_dir,
            &self.config,
            &self.safety_manager,
            &self.cancel,
            sink,
        )
    }

    /// Organize photos from `source_dir` into the destination tree
    pub fn organize(&self, source_dir: &Path, sink: &dyn ProgressSink) -> Result<OrganizeStats> {
        organize::organize_photos(source_dir, &self.config.dest_dir, &self.config, &self.cancel, sink)
    }

    /// Run extract then organize (from the extract directory)
    pub fn extract_and_organize(&self, sink: &dyn ProgressSink) -> Result<(ExtractStats, OrganizeStats)> {
        info!("Extracting archives...");
        let extracted = self.extract(sink)?;
        if self.cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }

        info!("Organizing photos...");
        let organized = self.organize(&self.config.extract_dir, sink)?;
        Ok((extracted, organized))
    }
}
