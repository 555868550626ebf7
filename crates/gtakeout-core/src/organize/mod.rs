//! Moves photos into `YYYY/MM/DD` folders keyed by their capture date.

mod dates;
mod fingerprint;

pub use dates::{best_date, exif_date, parse_exif_datetime, sidecar_candidates, sidecar_date, sidecar_timestamp};
pub use fingerprint::{content_hash, same_content};

use chrono::{Datelike, Local, TimeZone};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use crate::config::Config;
use crate::discovery::discover_photos;
use crate::error::Result;
use crate::logging::{log_file_error, log_fs_modification};
use crate::progress::{CancelToken, ProgressSink};
use crate::types::{CaptureDate, DateSource, EventKind, Phase, PhotoFile, ProgressEvent};

/// Outcome counts of an organize run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrganizeStats {
    pub found: usize,
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// What happened to a single photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Moved (or, in a dry run, would be moved) to the given path
    Moved { target: PathBuf, bytes: u64 },
    /// Already sitting at its destination
    AlreadyInPlace,
    /// An identical copy already exists at the given path; the source was left alone
    Duplicate { existing: PathBuf },
}

/// Where a candidate name led
enum Slot {
    Free(PathBuf),
    Same,
    Duplicate(PathBuf),
}

/// Targets planned in one day folder but not on disk yet (dry runs), target -> source
type Planned = HashMap<PathBuf, PathBuf>;

/// One lock per day folder; resolving a name and moving into it happen under that lock
#[derive(Default)]
struct Claims {
    folders: Mutex<HashMap<PathBuf, Arc<Mutex<Planned>>>>,
}

impl Claims {
    fn folder(&self, dir: &Path) -> Arc<Mutex<Planned>> {
        let mut folders = self.folders.lock().unwrap_or_else(PoisonError::into_inner);
        folders.entry(dir.to_path_buf()).or_default().clone()
    }
}

/// Day folder for a capture date: `dest/YYYY/MM/DD`
pub fn day_folder(dest_dir: &Path, date: &CaptureDate) -> PathBuf {
    dest_dir
        .join(format!("{:04}", date.when.year()))
        .join(format!("{:02}", date.when.month()))
        .join(format!("{:02}", date.when.day()))
}

/// `name`, `stem-2.ext`, `stem-3.ext`, ...
fn candidate_name(filename: &str, attempt: usize) -> String {
    if attempt < 2 {
        return filename.to_string();
    }
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, attempt, ext.to_string_lossy()),
        None => format!("{}-{}", stem, attempt),
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// First usable name for `source` inside `dir`
fn resolve_slot(dir: &Path, filename: &str, source: &Path, planned: &Planned) -> Result<Slot> {
    let mut attempt = 1;
    loop {
        let candidate = dir.join(candidate_name(filename, attempt));
        attempt += 1;

        if candidate.exists() {
            if is_same_file(&candidate, source) {
                return Ok(Slot::Same);
            }
            if same_content(&candidate, source)? {
                return Ok(Slot::Duplicate(candidate));
            }
            continue;
        }
        match planned.get(&candidate) {
            Some(other) if same_content(other, source)? => return Ok(Slot::Duplicate(candidate)),
            Some(_) => continue,
            None => return Ok(Slot::Free(candidate)),
        }
    }
}

/// Rename, falling back to copy + remove across file systems
fn move_file(source: &Path, target: &Path) -> Result<()> {
    if let Err(e) = fs::rename(source, target) {
        debug!(
            "rename {} -> {} failed ({}), copying instead",
            source.display(),
            target.display(),
            e
        );
        fs::copy(source, target)?;
        fs::remove_file(source)?;
    }
    Ok(())
}

/// Set the moved file's mtime to its capture date
///
/// Sidecars stay behind in the source tree; the mtime must still resolve to the same day folder.
fn stamp_capture_time(target: &Path, date: &CaptureDate) {
    if date.source == DateSource::ModifiedTime {
        return;
    }
    let Some(when) = Local.from_local_datetime(&date.when).earliest() else {
        return;
    };
    let result = fs::File::options()
        .write(true)
        .open(target)
        .and_then(|file| file.set_modified(SystemTime::from(when)));
    if let Err(e) = result {
        warn!("Could not set modification time of {}: {}", target.display(), e);
    }
}

fn place_with_claims(photo: &PhotoFile, dest_dir: &Path, dry_run: bool, claims: &Claims) -> Result<Placement> {
    let date = best_date(&photo.path, photo.last_modified);
    let folder = day_folder(dest_dir, &date);
    let filename = photo
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !dry_run {
        fs::create_dir_all(&folder)?;
    }

    let folder_lock = claims.folder(&folder);
    let mut planned = folder_lock.lock().unwrap_or_else(PoisonError::into_inner);

    match resolve_slot(&folder, &filename, &photo.path, &planned)? {
        Slot::Same => Ok(Placement::AlreadyInPlace),
        Slot::Duplicate(existing) => {
            debug!(
                "{} already present as {}",
                photo.path.display(),
                existing.display()
            );
            Ok(Placement::Duplicate { existing })
        }
        Slot::Free(target) => {
            if dry_run {
                info!(
                    "[dry run] {} -> {} ({:?} date)",
                    photo.path.display(),
                    target.display(),
                    date.source
                );
                planned.insert(target.clone(), photo.path.clone());
            } else {
                move_file(&photo.path, &target)?;
                stamp_capture_time(&target, &date);
                log_fs_modification(
                    "move",
                    &photo.path,
                    Some(&format!("to {} ({:?} date)", target.display(), date.source)),
                );
            }
            Ok(Placement::Moved {
                target,
                bytes: photo.size,
            })
        }
    }
}

/// Move one photo into its day folder under `dest_dir`
pub fn place_photo(photo: &PhotoFile, dest_dir: &Path, dry_run: bool) -> Result<Placement> {
    place_with_claims(photo, dest_dir, dry_run, &Claims::default())
}

/// Organize every photo under `source_dir` into `dest_dir/YYYY/MM/DD`
pub fn organize_photos(
    source_dir: &Path,
    dest_dir: &Path,
    config: &Config,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
) -> Result<OrganizeStats> {
    fs::create_dir_all(dest_dir)?;

    let photos = discover_photos(source_dir)?;
    let total = photos.len();
    sink.emit(ProgressEvent::new(Phase::Organize, EventKind::Start).files(None, total));

    if photos.is_empty() {
        warn!("No photos found to organize in {}", source_dir.display());
        sink.emit(ProgressEvent::new(Phase::Organize, EventKind::End));
        return Ok(OrganizeStats::default());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.organize_threads())
        .build()?;

    let claims = Claims::default();
    let done = AtomicUsize::new(0);
    let moved = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    pool.install(|| {
        photos.par_iter().for_each(|photo| {
            if cancel.is_cancelled() {
                return;
            }
            let name = photo
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            match place_with_claims(photo, dest_dir, config.dry_run, &claims) {
                Ok(Placement::Moved { target, bytes }) => {
                    moved.fetch_add(1, Ordering::Relaxed);
                    let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
                    let target_name = target
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or(name);
                    sink.emit(
                        ProgressEvent::new(Phase::Organize, EventKind::FileComplete)
                            .filename(target_name)
                            .bytes(bytes, None)
                            .files(Some(completed), total),
                    );
                }
                Ok(Placement::AlreadyInPlace) | Ok(Placement::Duplicate { .. }) => {
                    skipped.fetch_add(1, Ordering::Relaxed);
                    let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
                    sink.emit(
                        ProgressEvent::new(Phase::Organize, EventKind::FileSkipped)
                            .filename(name)
                            .files(Some(completed), total),
                    );
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    log_file_error(&photo.path, "organize", &e);
                    sink.emit(
                        ProgressEvent::new(Phase::Organize, EventKind::FileError)
                            .filename(name)
                            .error(&e),
                    );
                }
            }
        });
    });

    let stats = OrganizeStats {
        found: total,
        moved: moved.into_inner(),
        skipped: skipped.into_inner(),
        failed: failed.into_inner(),
    };

    if cancel.is_cancelled() {
        warn!("Organize paused; re-run to sort the remaining photos");
    }
    info!(
        "Organized {} photos into {} ({} skipped, {} failed)",
        stats.moved,
        dest_dir.display(),
        stats.skipped,
        stats.failed
    );
    sink.emit(ProgressEvent::new(Phase::Organize, EventKind::End));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use crate::types::DateSource;
    use chrono::NaiveDate;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn capture(y: i32, m: u32, d: u32) -> CaptureDate {
        CaptureDate {
            when: NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            source: DateSource::Exif,
        }
    }

    fn write_with_sidecar(dir: &Path, name: &str, contents: &[u8], timestamp: i64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        fs::write(
            dir.join(format!("{}.json", name)),
            format!(r#"{{"photoTakenTime": {{"timestamp": "{}"}}}}"#, timestamp),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_day_folder_is_zero_padded() {
        let folder = day_folder(Path::new("/photos"), &capture(2019, 4, 3));
        assert_eq!(folder, PathBuf::from("/photos/2019/04/03"));
    }

    #[test]
    fn test_candidate_name() {
        assert_eq!(candidate_name("IMG_1.jpg", 1), "IMG_1.jpg");
        assert_eq!(candidate_name("IMG_1.jpg", 2), "IMG_1-2.jpg");
        assert_eq!(candidate_name("IMG_1.jpg", 3), "IMG_1-3.jpg");
        assert_eq!(candidate_name("README", 2), "README-2");
    }

    #[test]
    fn test_name_clash_gets_numbered_suffix() {
        let dir = tempdir().unwrap();
        let src_a = dir.path().join("a");
        let src_b = dir.path().join("b");
        fs::create_dir_all(&src_a).unwrap();
        fs::create_dir_all(&src_b).unwrap();
        write_with_sidecar(&src_a, "IMG_1.jpg", b"first", 1_554_321_234);
        write_with_sidecar(&src_b, "IMG_1.jpg", b"second", 1_554_321_234);

        let dest = dir.path().join("sorted");
        let stats = organize_photos(
            dir.path(),
            &dest,
            &Config::default(),
            &CancelToken::new(),
            &NullSink,
        )
        .unwrap();

        assert_eq!(stats.moved, 2);
        let date = CaptureDate {
            when: best_date_for_timestamp(1_554_321_234),
            source: DateSource::Sidecar,
        };
        let folder = day_folder(&dest, &date);
        let mut contents = vec![
            fs::read(folder.join("IMG_1.jpg")).unwrap(),
            fs::read(folder.join("IMG_1-2.jpg")).unwrap(),
        ];
        contents.sort();
        assert_eq!(contents, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn test_identical_copy_is_not_duplicated() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("sorted");
        let folder = day_folder(&dest, &capture(2020, 1, 2));
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("IMG_9.png"), b"same").unwrap();

        let source = dir.path().join("IMG_9.png");
        fs::write(&source, b"same").unwrap();

        let slot = resolve_slot(&folder, "IMG_9.png", &source, &Planned::new()).unwrap();
        assert!(matches!(slot, Slot::Duplicate(p) if p == folder.join("IMG_9.png")));
    }

    #[test]
    fn test_dry_run_leaves_files_alone() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();
        let photo = source.join("IMG_3.gif");
        fs::write(&photo, b"gif").unwrap();
        let file = fs::File::options().write(true).open(&photo).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000))
            .unwrap();

        let dest = dir.path().join("sorted");
        let config = Config {
            dry_run: true,
            ..Default::default()
        };
        let stats = organize_photos(&source, &dest, &config, &CancelToken::new(), &NullSink).unwrap();

        assert_eq!(stats.moved, 1);
        assert!(photo.exists());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_cancelled_run_moves_nothing() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.jpg"), b"a").unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let stats = organize_photos(
            &source,
            &dir.path().join("sorted"),
            &Config::default(),
            &cancel,
            &NullSink,
        )
        .unwrap();

        assert_eq!(stats.found, 1);
        assert_eq!(stats.moved, 0);
        assert!(source.join("a.jpg").exists());
    }

    #[test]
    fn test_sidecar_dated_photo_stays_put_on_second_run() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();
        write_with_sidecar(&source, "IMG_5.jpg", b"no exif here", 1_577_880_000);

        let dest = dir.path().join("sorted");
        let config = Config::default();
        let first = organize_photos(&source, &dest, &config, &CancelToken::new(), &NullSink).unwrap();
        assert_eq!(first.moved, 1);

        let folder = day_folder(
            &dest,
            &CaptureDate {
                when: best_date_for_timestamp(1_577_880_000),
                source: DateSource::Sidecar,
            },
        );
        let moved = folder.join("IMG_5.jpg");
        assert!(moved.exists());

        // No sidecar next to it any more; the date now comes from the mtime
        let date = best_date(&moved, fs::metadata(&moved).unwrap().modified().unwrap());
        assert_eq!(date.source, DateSource::ModifiedTime);
        assert_eq!(day_folder(&dest, &date), folder);

        let second = organize_photos(&dest, &dest, &config, &CancelToken::new(), &NullSink).unwrap();
        assert_eq!(second.moved, 0);
        assert_eq!(second.skipped, 1);
        assert!(moved.exists());
    }

    #[test]
    fn test_concurrent_identical_copies_are_not_duplicated() {
        for round in 0..10 {
            let dir = tempdir().unwrap();
            let src_a = dir.path().join("src/a");
            let src_b = dir.path().join("src/b");
            fs::create_dir_all(&src_a).unwrap();
            fs::create_dir_all(&src_b).unwrap();
            for i in 0..40 {
                let name = format!("IMG_{}.jpg", i);
                let contents = format!("photo {} of round {}", i, round);
                write_with_sidecar(&src_a, &name, contents.as_bytes(), 1_554_321_234);
                write_with_sidecar(&src_b, &name, contents.as_bytes(), 1_554_321_234);
            }

            let dest = dir.path().join("sorted");
            let config = Config {
                organize_workers: 8,
                ..Default::default()
            };
            let stats = organize_photos(
                &dir.path().join("src"),
                &dest,
                &config,
                &CancelToken::new(),
                &NullSink,
            )
            .unwrap();

            assert_eq!(stats.moved, 40);
            assert_eq!(stats.skipped, 40);
            let folder = day_folder(
                &dest,
                &CaptureDate {
                    when: best_date_for_timestamp(1_554_321_234),
                    source: DateSource::Sidecar,
                },
            );
            assert_eq!(fs::read_dir(&folder).unwrap().count(), 40);
        }
    }

    #[test]
    fn test_dry_run_plans_identical_copies_once() {
        let dir = tempdir().unwrap();
        let src_a = dir.path().join("src/a");
        let src_b = dir.path().join("src/b");
        fs::create_dir_all(&src_a).unwrap();
        fs::create_dir_all(&src_b).unwrap();
        write_with_sidecar(&src_a, "IMG_7.jpg", b"same", 1_554_321_234);
        write_with_sidecar(&src_b, "IMG_7.jpg", b"same", 1_554_321_234);
        write_with_sidecar(&src_b, "IMG_8.jpg", b"other", 1_554_321_234);

        let config = Config {
            dry_run: true,
            ..Default::default()
        };
        let stats = organize_photos(
            &dir.path().join("src"),
            &dir.path().join("sorted"),
            &config,
            &CancelToken::new(),
            &NullSink,
        )
        .unwrap();

        assert_eq!(stats.moved, 2);
        assert_eq!(stats.skipped, 1);
    }

    fn best_date_for_timestamp(secs: i64) -> chrono::NaiveDateTime {
        use chrono::{Local, TimeZone};
        Local.timestamp_opt(secs, 0).unwrap().naive_local()
    }
}
