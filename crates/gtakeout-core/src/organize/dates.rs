//! Capture date lookup: EXIF, then the Takeout JSON sidecar, then mtime.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use exif::{In, Reader, Tag};
use log::{debug, trace};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;
use crate::types::{CaptureDate, DateSource};

/// EXIF tags consulted, most specific first
const EXIF_DATE_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Best available capture date for `path`
pub fn best_date(path: &Path, modified: SystemTime) -> CaptureDate {
    if let Some(when) = exif_date(path) {
        return CaptureDate {
            when,
            source: DateSource::Exif,
        };
    }
    if let Some(when) = sidecar_date(path) {
        return CaptureDate {
            when,
            source: DateSource::Sidecar,
        };
    }
    CaptureDate {
        when: DateTime::<Local>::from(modified).naive_local(),
        source: DateSource::ModifiedTime,
    }
}

/// Date from the EXIF block, if the file has one with a parseable date
pub fn exif_date(path: &Path) -> Option<NaiveDateTime> {
    match read_exif_date(path) {
        Ok(date) => date,
        Err(e) => {
            trace!("No EXIF date for {}: {}", path.display(), e);
            None
        }
    }
}

fn read_exif_date(path: &Path) -> Result<Option<NaiveDateTime>> {
    let mut reader = BufReader::new(File::open(path)?);
    let exif = Reader::new().read_from_container(&mut reader)?;

    for tag in EXIF_DATE_TAGS {
        let Some(field) = exif.get_field(tag, In::PRIMARY) else {
            continue;
        };
        if let exif::Value::Ascii(ref values) = field.value {
            let parsed = values
                .iter()
                .filter_map(|raw| std::str::from_utf8(raw).ok())
                .find_map(parse_exif_datetime);
            if parsed.is_some() {
                return Ok(parsed);
            }
        }
    }
    Ok(None)
}

/// Parse `YYYY:MM:DD HH:MM:SS`
pub fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim_end_matches('\0').trim(), EXIF_DATE_FORMAT).ok()
}

/// Sidecar files Takeout may have written next to `photo`
pub fn sidecar_candidates(photo: &Path) -> Vec<PathBuf> {
    let Some(name) = photo.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Vec::new();
    };
    vec![
        photo.with_file_name(format!("{}.json", name)),
        photo.with_extension("json"),
        photo.with_file_name(format!("{}.supplemental-metadata.json", name)),
    ]
}

/// Date from the first sidecar that carries a usable timestamp
pub fn sidecar_date(photo: &Path) -> Option<NaiveDateTime> {
    for candidate in sidecar_candidates(photo) {
        if !candidate.is_file() {
            continue;
        }
        let parsed = std::fs::read_to_string(&candidate)
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok());
        let Some(json) = parsed else {
            debug!("Unreadable sidecar {}", candidate.display());
            continue;
        };
        if let Some(when) = sidecar_timestamp(&json).and_then(timestamp_to_local) {
            return Some(when);
        }
    }
    None
}

/// Seconds since the epoch from a Takeout metadata document
pub fn sidecar_timestamp(json: &Value) -> Option<i64> {
    let ts = match json {
        Value::Object(map) => {
            if let Some(taken @ Value::Object(_)) = map.get("photoTakenTime") {
                time_field(taken)
            } else if let Some(created @ Value::Object(_)) = map.get("creationTime") {
                time_field(created)
            } else {
                None
            }
        }
        Value::Array(items) => match items.first() {
            Some(first @ Value::Object(_)) => first.get("photoTakenTime").and_then(|t| as_seconds(t.get("timestamp")?)),
            _ => None,
        },
        _ => None,
    };
    ts.filter(|secs| *secs != 0)
}

/// `timestamp`, falling back to `seconds`
fn time_field(obj: &Value) -> Option<i64> {
    obj.get("timestamp")
        .and_then(as_seconds)
        .filter(|s| *s != 0)
        .or_else(|| obj.get("seconds").and_then(as_seconds))
}

/// Takeout writes timestamps as strings; accept numbers too
fn as_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn timestamp_to_local(secs: i64) -> Option<NaiveDateTime> {
    Local
        .timestamp_opt(secs, 0)
        .earliest()
        .map(|dt| dt.naive_local())
}
