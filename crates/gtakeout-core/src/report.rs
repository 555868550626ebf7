//! Session report: every progress event of a run, exportable as CSV or HTML.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::fmt::Write;
use upon::{fmt as upon_fmt, Engine, Value};

use crate::error::Result;
use crate::types::{EventKind, Phase, ProgressEvent};

const CSV_HEADER: [&str; 9] = [
    "timestamp",
    "phase",
    "event",
    "filename",
    "archive",
    "key",
    "bytes_done",
    "bytes_total",
    "error",
];

const HTML_TEMPLATE: &str = r#"<!doctype html><html><head><meta charset='utf-8'><title>Session Report</title><style>table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:4px 8px;font-family:system-ui,Segoe UI,Arial}</style></head><body><h2>Session Report</h2><table><thead><tr><th>Timestamp</th><th>Phase</th><th>Event</th><th>Filename</th><th>Archive</th><th>Key</th><th>Bytes Done</th><th>Bytes Total</th><th>Error</th></tr></thead><tbody>{% for row in rows %}<tr><td>{{ row.timestamp }}</td><td>{{ row.phase }}</td><td>{{ row.event }}</td><td>{{ row.filename }}</td><td>{{ row.archive }}</td><td>{{ row.key }}</td><td>{{ row.bytes_done }}</td><td>{{ row.bytes_total }}</td><td>{{ row.error }}</td></tr>{% endfor %}</tbody></table></body></html>"#;

/// A progress event stamped with the local time it was recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEvent {
    pub timestamp: NaiveDateTime,
    pub event: ProgressEvent,
}

impl ReportEvent {
    /// The event as the nine export columns, empty strings for missing values
    fn columns(&self) -> ReportRow {
        let e = &self.event;
        ReportRow {
            timestamp: self.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            phase: e.phase.to_string(),
            event: e.kind.to_string(),
            filename: e.filename.clone().unwrap_or_default(),
            archive: e.archive.clone().unwrap_or_default(),
            key: e.key.clone().unwrap_or_default(),
            bytes_done: e.bytes_done.map(|b| b.to_string()).unwrap_or_default(),
            bytes_total: e.bytes_total.map(|b| b.to_string()).unwrap_or_default(),
            error: e.error.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportRow {
    timestamp: String,
    phase: String,
    event: String,
    filename: String,
    archive: String,
    key: String,
    bytes_done: String,
    bytes_total: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct ReportContext {
    rows: Vec<ReportRow>,
}

impl ReportRow {
    fn as_record(&self) -> [&str; 9] {
        [
            &self.timestamp,
            &self.phase,
            &self.event,
            &self.filename,
            &self.archive,
            &self.key,
            &self.bytes_done,
            &self.bytes_total,
            &self.error,
        ]
    }
}

/// Per-phase outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub download_completed: usize,
    pub download_skipped: usize,
    pub download_errors: usize,
    pub extract_completed: usize,
    pub extract_errors: usize,
    pub organize_completed: usize,
    pub organize_skipped: usize,
    pub organize_errors: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    events: Vec<ReportEvent>,
}

impl SessionReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event at the current local time
    pub fn add_event(&mut self, event: ProgressEvent) {
        self.add_event_at(event, Local::now().naive_local());
    }

    pub fn add_event_at(&mut self, event: ProgressEvent, timestamp: NaiveDateTime) {
        self.events.push(ReportEvent { timestamp, event });
    }

    pub fn events(&self) -> &[ReportEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn summarize(&self) -> Summary {
        let mut summary = Summary::default();
        for e in self.events.iter().map(|r| &r.event) {
            let counter = match (e.phase, e.kind) {
                (Phase::Download, EventKind::FileComplete) => &mut summary.download_completed,
                (Phase::Download, EventKind::FileSkipped) => &mut summary.download_skipped,
                (Phase::Download, EventKind::FileError) => &mut summary.download_errors,
                (Phase::Extract, EventKind::FileComplete) => &mut summary.extract_completed,
                (Phase::Extract, EventKind::FileError) => &mut summary.extract_errors,
                (Phase::Organize, EventKind::FileComplete) => &mut summary.organize_completed,
                (Phase::Organize, EventKind::FileSkipped) => &mut summary.organize_skipped,
                (Phase::Organize, EventKind::FileError) => &mut summary.organize_errors,
                _ => continue,
            };
            *counter += 1;
        }
        summary
    }

    pub fn export_csv(&self, path: &Path) -> Result<()> {
        create_parent(path)?;
        let mut writer = csv::Writer::from_path(path)?;
        self.write_csv(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write the header and one record per event
    pub fn write_csv<W: std::io::Write>(&self, writer: &mut csv::Writer<W>) -> Result<()> {
        writer.write_record(CSV_HEADER)?;
        for event in &self.events {
            writer.write_record(event.columns().as_record())?;
        }
        Ok(())
    }

    pub fn export_html(&self, path: &Path) -> Result<()> {
        create_parent(path)?;
        fs::write(path, self.to_html()?)?;
        Ok(())
    }

    /// Render the report as a standalone HTML page, values escaped
    pub fn to_html(&self) -> Result<String> {
        let mut engine = Engine::new();
        engine.set_default_formatter(&escape_html);
        let template = engine.compile(HTML_TEMPLATE)?;

        let context = ReportContext {
            rows: self.events.iter().map(ReportEvent::columns).collect(),
        };
        let html = template.render(&engine, &context).to_string()?;
        Ok(html)
    }
}

/// Default formatter for the HTML report: strings are escaped, everything else printed as usual
fn escape_html(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
    match value {
        Value::String(s) => {
            for c in s.chars() {
                match c {
                    '&' => f.write_str("&amp;")?,
                    '<' => f.write_str("&lt;")?,
                    '>' => f.write_str("&gt;")?,
                    '"' => f.write_str("&quot;")?,
                    '\'' => f.write_str("&#39;")?,
                    c => f.write_char(c)?,
                }
            }
        }
        v => upon_fmt::default(f, v)?,
    };
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
