#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;

/// Smallest JPEG kamadak-exif accepts: SOI, one APP1 with an IFD0 `DateTime`, EOI
pub fn jpeg_with_exif_date(date: &str) -> Vec<u8> {
    let mut tiff = tiff_header();
    push_ifd_entries(&mut tiff, &[(0x0132, 2, 20, 26)]); // DateTime
    push_exif_ascii(&mut tiff, date);
    wrap_app1(tiff)
}

/// IFD0 `DateTime` plus an Exif sub-IFD carrying `DateTimeOriginal`
pub fn jpeg_with_exif_dates(original: &str, modified: &str) -> Vec<u8> {
    // IFD0 at 8 (2 entries, ends at 38), DateTime at 38, Exif IFD at 58 (ends at 76),
    // DateTimeOriginal at 76
    let mut tiff = tiff_header();
    push_ifd_entries(
        &mut tiff,
        &[
            (0x0132, 2, 20, 38), // DateTime
            (0x8769, 4, 1, 58),  // Exif IFD pointer
        ],
    );
    push_exif_ascii(&mut tiff, modified);
    push_ifd_entries(&mut tiff, &[(0x9003, 2, 20, 76)]); // DateTimeOriginal
    push_exif_ascii(&mut tiff, original);
    assert_eq!(tiff.len(), 96);
    wrap_app1(tiff)
}

fn tiff_header() -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes()); // IFD0 offset
    tiff
}

/// One IFD of `(tag, type, count, value_or_offset)` entries with no next IFD
fn push_ifd_entries(tiff: &mut Vec<u8>, entries: &[(u16, u16, u32, u32)]) {
    tiff.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, kind, count, value) in entries {
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&kind.to_le_bytes());
        tiff.extend_from_slice(&count.to_le_bytes());
        tiff.extend_from_slice(&value.to_le_bytes());
    }
    tiff.extend_from_slice(&0u32.to_le_bytes());
}

fn push_exif_ascii(tiff: &mut Vec<u8>, date: &str) {
    assert_eq!(date.len(), 19, "expected YYYY:MM:DD HH:MM:SS");
    tiff.extend_from_slice(date.as_bytes());
    tiff.push(0);
}

fn wrap_app1(tiff: Vec<u8>) -> Vec<u8> {
    let mut app1 = b"Exif\0\0".to_vec();
    app1.extend_from_slice(&tiff);

    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
    jpeg.extend_from_slice(&((app1.len() + 2) as u16).to_be_bytes());
    jpeg.extend_from_slice(&app1);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

/// Stand-in photo bytes with no metadata at all
pub fn plain_jpeg(seed: u8) -> Vec<u8> {
    vec![0xFF, 0xD8, seed, seed, seed, 0xFF, 0xD9]
}

/// Takeout-style sidecar carrying `photoTakenTime`
pub fn sidecar_json(timestamp: i64) -> Vec<u8> {
    format!(
        r#"{{"title": "photo", "photoTakenTime": {{"timestamp": "{}", "formatted": ""}}}}"#,
        timestamp
    )
    .into_bytes()
}

pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Every file under `dir`, relative and sorted
pub fn files_under(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(dir)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}
