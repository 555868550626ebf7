//! Sequential click-and-wait download of every Takeout archive part, with resume.

mod page;
mod state;
mod webdriver;

pub use page::{dedupe_targets, DownloadTarget, Selector, TakeoutPage};
pub use state::{DownloadState, STATE_FILE};
pub use webdriver::WebDriverPage;

use log::{debug, info, warn};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::log_fs_modification;
use crate::progress::{CancelToken, ProgressSink};
use crate::types::{EventKind, Phase, ProgressEvent};

/// Opening the page is retried this many times if the window is closed during sign-in
const MAX_OPEN_ATTEMPTS: usize = 3;

/// Suffixes browsers use for downloads still in flight
const PARTIAL_SUFFIXES: [&str; 4] = [".crdownload", ".part", ".tmp", ".download"];

/// Outcome counts of a download run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub targets: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

fn is_partial(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// `takeout-001 (1).zip` -> `takeout-001.zip`
pub fn browser_duplicate_of(filename: &str) -> Option<String> {
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (filename, None),
    };
    let inner = stem.strip_suffix(')')?;
    let (base, counter) = inner.rsplit_once(" (")?;
    if base.is_empty() || counter.is_empty() || !counter.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(match ext {
        Some(ext) => format!("{}.{}", base, ext),
        None => base.to_string(),
    })
}

fn snapshot(dir: &Path) -> Result<HashSet<OsString>> {
    Ok(fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name())
        .collect())
}

/// Wait for a new, finished file to appear in `dir` that wasn't in `before`
///
/// A file counts as finished once no partial download is pending and its size
/// is unchanged across two polls.
pub async fn wait_for_download(
    dir: &Path,
    before: &HashSet<OsString>,
    timeout: Duration,
    poll: Duration,
) -> Result<PathBuf> {
    let deadline = Instant::now() + timeout;
    let mut last_seen: Option<(PathBuf, u64)> = None;

    loop {
        let mut pending = false;
        let mut finished: Option<(PathBuf, u64)> = None;

        for entry in fs::read_dir(dir)?.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            if before.contains(&name) {
                continue;
            }
            let name_str = name.to_string_lossy();
            if name_str == STATE_FILE || name_str.starts_with(STATE_FILE) {
                continue;
            }
            if is_partial(&name_str) {
                pending = true;
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if meta.is_file() && finished.is_none() {
                    finished = Some((entry.path(), meta.len()));
                }
            }
        }

        match finished {
            Some(current) if !pending && last_seen.as_ref() == Some(&current) => {
                return Ok(current.0);
            }
            other => last_seen = other,
        }

        if Instant::now() >= deadline {
            return Err(Error::Timeout(format!(
                "no finished download appeared in {} after {:?}",
                dir.display(),
                timeout
            )));
        }
        sleep(poll).await;
    }
}

/// Open `url` and poll until download targets show up (the user may have to sign in first)
async fn wait_for_targets<P: TakeoutPage + ?Sized>(
    page: &mut P,
    url: &str,
    config: &Config,
    cancel: &CancelToken,
) -> Result<Vec<DownloadTarget>> {
    page.open(url).await?;
    info!("If prompted, please sign in to Google in the opened browser window.");

    let deadline = Instant::now() + config.login_timeout();
    loop {
        let targets = match page.collect_targets().await {
            Ok(targets) => dedupe_targets(targets),
            Err(e @ Error::PageClosed(_)) => return Err(e),
            Err(e) => {
                debug!("Page not ready yet: {}", e);
                Vec::new()
            }
        };
        if !targets.is_empty() || cancel.is_cancelled() || Instant::now() >= deadline {
            return Ok(targets);
        }
        sleep(config.poll_interval()).await;
    }
}

/// Download every archive part linked from `url` into `download_dir`, one at a time
///
/// Parts recorded in the progress record are skipped when `config.resume` is set.
/// The page is left open; closing it is up to the caller.
pub async fn download_all<P: TakeoutPage + ?Sized>(
    page: &mut P,
    url: &str,
    download_dir: &Path,
    config: &Config,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
) -> Result<DownloadStats> {
    fs::create_dir_all(download_dir)?;

    let mut state = DownloadState::load(download_dir.join(STATE_FILE));
    state.seed_from_disk(download_dir)?;
    state.save()?;

    let mut attempts = 0;
    let targets = loop {
        attempts += 1;
        match wait_for_targets(page, url, config, cancel).await {
            Ok(targets) => break targets,
            Err(Error::PageClosed(reason)) if attempts < MAX_OPEN_ATTEMPTS => {
                warn!(
                    "Browser page closed while waiting ({}), retrying ({}/{})",
                    reason, attempts, MAX_OPEN_ATTEMPTS
                );
            }
            Err(e) => return Err(e),
        }
    };

    let total = targets.len();
    let already_done = targets
        .iter()
        .filter(|t| config.resume && state.is_key_completed(&t.key()))
        .count();
    sink.emit(
        ProgressEvent::new(Phase::Download, EventKind::Start)
            .files(Some(already_done), total)
            .bytes(state.completed_bytes(download_dir), None),
    );

    let mut stats = DownloadStats {
        targets: total,
        ..Default::default()
    };

    if targets.is_empty() {
        warn!("No download links found after waiting. Check the URL or sign-in status, then try again.");
        sink.emit(ProgressEvent::new(Phase::Download, EventKind::End));
        return Ok(stats);
    }

    info!("Downloading {} archive parts into {}", total, download_dir.display());
    let mut completed = 0;

    for target in &targets {
        if cancel.is_cancelled() {
            warn!("Download paused by user; re-run to resume");
            break;
        }

        let key = target.key();
        if config.resume && state.is_key_completed(&key) {
            completed += 1;
            stats.skipped += 1;
            sink.emit(
                ProgressEvent::new(Phase::Download, EventKind::FileSkipped)
                    .key(key)
                    .files(Some(completed), total),
            );
            continue;
        }

        match download_one(page, target, download_dir, config, &mut state).await {
            Ok(filename) => {
                completed += 1;
                stats.downloaded += 1;
                info!("Downloaded {} ({}/{})", filename, completed, total);
                sink.emit(
                    ProgressEvent::new(Phase::Download, EventKind::FileComplete)
                        .filename(filename)
                        .key(key)
                        .files(Some(completed), total)
                        .bytes(state.completed_bytes(download_dir), None),
                );
            }
            Err(e) => {
                stats.failed += 1;
                warn!("Failed to download for target {}: {}", key, e);
                sink.emit(
                    ProgressEvent::new(Phase::Download, EventKind::FileError)
                        .key(key)
                        .error(&e),
                );
            }
        }
        tokio::task::yield_now().await;
    }

    info!(
        "Download session finished: {} downloaded, {} skipped, {} failed",
        stats.downloaded, stats.skipped, stats.failed
    );
    sink.emit(ProgressEvent::new(Phase::Download, EventKind::End));
    Ok(stats)
}

/// Click one target, wait for its file and record it; returns the archive's file name
async fn download_one<P: TakeoutPage + ?Sized>(
    page: &mut P,
    target: &DownloadTarget,
    download_dir: &Path,
    config: &Config,
    state: &mut DownloadState,
) -> Result<String> {
    let before = snapshot(download_dir)?;
    page.click(target).await?;
    let path = wait_for_download(
        download_dir,
        &before,
        config.download_timeout(),
        config.poll_interval(),
    )
    .await?;

    let mut filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(original) = browser_duplicate_of(&filename) {
        if config.resume && state.is_file_completed(&original) {
            fs::remove_file(&path)?;
            log_fs_modification("remove", &path, Some(&format!("duplicate of {}", original)));
            filename = original;
        }
    }

    state.mark_completed(Some(&target.key()), Some(&filename))?;
    Ok(filename)
}
