use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::logging::log_file_error;
use crate::types::{ArchiveFile, ImageFormat, PhotoFile};

/// Extensions (lower-case, without the dot) the organizer treats as photos
pub static IMAGE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["jpg", "jpeg", "png", "heic", "webp", "tif", "tiff", "gif"]
        .into_iter()
        .collect()
});

/// Discover photos below `directory`, recursively
pub fn discover_photos(directory: &Path) -> Result<Vec<PhotoFile>> {
    if !directory.is_dir() {
        return Err(Error::FileNotFound(directory.to_path_buf()));
    }

    let mut photos = Vec::new();

    for entry in WalkDir::new(directory)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();

        if !is_image_path(path) {
            continue;
        }

        match get_file_metadata(path) {
            Ok((size, last_modified)) => photos.push(PhotoFile {
                path: path.to_path_buf(),
                size,
                last_modified,
                format: get_image_format(path).unwrap_or(ImageFormat::Other(String::new())),
            }),
            // Log error but continue with other files
            Err(e) => log_file_error(path, "metadata", &e),
        }
    }

    Ok(photos)
}

/// Discover `*.zip` archives below `directory`, recursively, with their uncompressed sizes
pub fn discover_archives(directory: &Path) -> Result<Vec<ArchiveFile>> {
    if !directory.is_dir() {
        return Err(Error::FileNotFound(directory.to_path_buf()));
    }

    let archives = WalkDir::new(directory)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_zip_path(e.path()))
        .map(|e| ArchiveFile {
            uncompressed_size: uncompressed_size(e.path()),
            path: e.into_path(),
        })
        .collect();

    Ok(archives)
}

/// Total size of all entries in a ZIP, or 0 if it can't be read
pub fn uncompressed_size(path: &Path) -> u64 {
    let read = || -> Result<u64> {
        let mut archive = zip::ZipArchive::new(fs::File::open(path)?)?;
        let mut total = 0u64;
        for i in 0..archive.len() {
            total = total.saturating_add(archive.by_index_raw(i)?.size());
        }
        Ok(total)
    };

    match read() {
        Ok(total) => total,
        Err(e) => {
            log::warn!("Could not size archive {}: {}", path.display(), e);
            0
        }
    }
}

/// Get image format from file extension
fn get_image_format(path: &Path) -> Option<ImageFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(ImageFormat::from_extension)
}

fn get_file_metadata(path: &Path) -> io::Result<(u64, std::time::SystemTime)> {
    let metadata = fs::metadata(path)?;
    Ok((metadata.len(), metadata.modified()?))
}

/// Returns if the given path has a photo extension
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Returns if the given path has a `.zip` extension
pub fn is_zip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

// -- Tests --
