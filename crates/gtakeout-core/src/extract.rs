//! Unpacks every Takeout ZIP from the download directory into the extract directory.

use log::{info, warn};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::Config;
use crate::discovery::discover_archives;
use crate::error::Result;
use crate::logging::log_file_error;
use crate::progress::{CancelToken, ProgressSink};
use crate::safety::{contained_join, SafetyManager};
use crate::types::{ArchiveFile, EventKind, Phase, ProgressEvent};
use crate::utils::format_bytes;

/// Outcome counts of an extraction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub archives: usize,
    pub extracted: usize,
    pub failed: usize,
    pub bytes: u64,
}

/// Extract every `*.zip` under `download_dir` into `extract_dir` on a worker pool
pub fn extract_all(
    download_dir: &Path,
    extract_dir: &Path,
    config: &Config,
    safety: &SafetyManager,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
) -> Result<ExtractStats> {
    fs::create_dir_all(extract_dir)?;

    let archives = discover_archives(download_dir)?;
    sink.emit(ProgressEvent::new(Phase::Extract, EventKind::Start).files(None, archives.len()));

    if archives.is_empty() {
        warn!("No ZIP files found to extract in {}", download_dir.display());
        sink.emit(ProgressEvent::new(Phase::Extract, EventKind::End));
        return Ok(ExtractStats::default());
    }

    let total_bytes = total_uncompressed(&archives);
    info!(
        "Extracting {} archives ({}) into {}",
        archives.len(),
        format_bytes(total_bytes),
        extract_dir.display()
    );

    if let Err(e) = safety.check_free_space(extract_dir, total_bytes) {
        sink.emit(ProgressEvent::new(Phase::Extract, EventKind::End).error(&e));
        return Err(e);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.extract_threads())
        .build()?;

    let done_bytes = AtomicU64::new(0);

    let results: Vec<Option<Result<u64>>> = pool.install(|| {
        archives
            .par_iter()
            .map(|archive| {
                if cancel.is_cancelled() {
                    return None;
                }
                let name = archive_name(archive);
                let result = extract_archive(&archive.path, extract_dir);
                match &result {
                    Ok(bytes) => {
                        let global = done_bytes
                            .fetch_add(*bytes, Ordering::Relaxed)
                            .saturating_add(*bytes);
                        sink.emit(
                            ProgressEvent::new(Phase::Extract, EventKind::FileProgress)
                                .archive(name.clone())
                                .bytes(global, Some(total_bytes)),
                        );
                        sink.emit(ProgressEvent::new(Phase::Extract, EventKind::FileComplete).archive(name));
                    }
                    Err(e) => {
                        log_file_error(&archive.path, "extract", e);
                        sink.emit(
                            ProgressEvent::new(Phase::Extract, EventKind::FileError)
                                .archive(name)
                                .error(e),
                        );
                    }
                }
                Some(result)
            })
            .collect()
    });

    let mut stats = ExtractStats {
        archives: archives.len(),
        ..Default::default()
    };
    for result in results.into_iter().flatten() {
        match result {
            Ok(bytes) => {
                stats.extracted += 1;
                stats.bytes = stats.bytes.saturating_add(bytes);
            }
            Err(_) => stats.failed += 1,
        }
    }

    if cancel.is_cancelled() {
        warn!("Extraction paused; re-run to finish the remaining archives");
    }
    info!(
        "Extraction complete: {} ok, {} failed, {}",
        stats.extracted,
        stats.failed,
        format_bytes(stats.bytes)
    );
    sink.emit(ProgressEvent::new(Phase::Extract, EventKind::End));
    Ok(stats)
}

/// Extract one archive, returning the number of uncompressed bytes written
pub fn extract_archive(archive_path: &Path, extract_dir: &Path) -> Result<u64> {
    let mut archive = zip::ZipArchive::new(File::open(archive_path)?)?;
    let mut bytes_done = 0u64;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        let Some(target) = entry
            .enclosed_name()
            .and_then(|relative| contained_join(extract_dir, &relative))
        else {
            warn!(
                "Skipping unsafe entry '{}' in {}",
                entry.name(),
                archive_path.display()
            );
            continue;
        };

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&target)?);
        bytes_done = bytes_done.saturating_add(io::copy(&mut entry, &mut out)?);
        out.flush()?;
    }

    Ok(bytes_done)
}

/// Sum of the archives' declared sizes, saturating on bogus headers
fn total_uncompressed(archives: &[ArchiveFile]) -> u64 {
    archives
        .iter()
        .fold(0u64, |acc, a| acc.saturating_add(a.uncompressed_size))
}

fn archive_name(archive: &ArchiveFile) -> String {
    archive
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive.path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use std::path::PathBuf;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_total_uncompressed_saturates() {
        let archive = |size| ArchiveFile {
            path: PathBuf::from("takeout.zip"),
            uncompressed_size: size,
        };
        assert_eq!(total_uncompressed(&[archive(3), archive(4)]), 7);
        assert_eq!(total_uncompressed(&[archive(u64::MAX), archive(10)]), u64::MAX);
    }

    #[test]
    fn test_extract_archive_writes_nested_entries() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("takeout-001.zip");
        write_zip(
            &zip_path,
            &[
                ("Takeout/Google Photos/Trip/a.jpg", b"aaaa"),
                ("Takeout/Google Photos/Trip/a.jpg.json", b"{}"),
            ],
        );

        let out = dir.path().join("out");
        let bytes = extract_archive(&zip_path, &out).unwrap();

        assert_eq!(bytes, 6);
        assert_eq!(
            fs::read(out.join("Takeout/Google Photos/Trip/a.jpg")).unwrap(),
            b"aaaa"
        );
        assert!(out.join("Takeout/Google Photos/Trip/a.jpg.json").exists());
    }

    #[test]
    fn test_extract_archive_skips_escaping_entries() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("evil.zip");
        write_zip(&zip_path, &[("../escaped.txt", b"nope"), ("ok.txt", b"ok")]);

        let out = dir.path().join("out");
        extract_archive(&zip_path, &out).unwrap();

        assert!(out.join("ok.txt").exists());
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_extract_all_counts_failures_and_continues() {
        let dir = tempdir().unwrap();
        let downloads = dir.path().join("zips");
        fs::create_dir_all(&downloads).unwrap();
        write_zip(&downloads.join("takeout-001.zip"), &[("one.jpg", b"1")]);
        write_zip(&downloads.join("takeout-002.zip"), &[("two.jpg", b"22")]);
        fs::write(downloads.join("takeout-003.zip"), b"not a zip").unwrap();

        let out = dir.path().join("out");
        let stats = extract_all(
            &downloads,
            &out,
            &Config::default(),
            &SafetyManager::new(0),
            &CancelToken::new(),
            &NullSink,
        )
        .unwrap();

        assert_eq!(stats.archives, 3);
        assert_eq!(stats.extracted, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.bytes, 3);
        assert!(out.join("one.jpg").exists());
        assert!(out.join("two.jpg").exists());
    }

    #[test]
    fn test_extract_all_with_no_archives() {
        let dir = tempdir().unwrap();
        let stats = extract_all(
            dir.path(),
            &dir.path().join("out"),
            &Config::default(),
            &SafetyManager::new(0),
            &CancelToken::new(),
            &NullSink,
        )
        .unwrap();
        assert_eq!(stats, ExtractStats::default());
    }
}
