use crossbeam::channel::{unbounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::report::SessionReport;
use crate::types::{EventKind, Phase, ProgressEvent};
use crate::utils::{estimate_eta_from_bytes, estimate_eta_from_counts, format_bytes, format_duration};

/// Receives progress notifications from the pipeline stages
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

impl ProgressSink for Sender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // The receiver only goes away at shutdown
        let _ = self.send(event);
    }
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn emit(&self, event: ProgressEvent) {
        (**self).emit(event)
    }
}

/// Shared flag used to pause (stop cleanly) a running stage
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token on Ctrl-C
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if token.is_cancelled() {
                // Second Ctrl-C: give up immediately
                std::process::exit(130);
            }
            warn!("Pause requested, finishing the current item. Press Ctrl-C again to abort.");
            eprintln!("\nPausing after the current item... (re-run to resume)");
            token.cancel();
        })
    }
}

/// Dedicated thread that drives a progress bar and records the session report
pub struct ProgressReporter {
    tx: Sender<ProgressEvent>,
    handle: JoinHandle<SessionReport>,
}

impl ProgressReporter {
    /// Start the reporter; `show_bar` false keeps the console untouched
    pub fn start(show_bar: bool) -> std::io::Result<Self> {
        let (tx, rx) = unbounded();
        let handle = std::thread::Builder::new()
            .name("progress-updater".to_string())
            .spawn(move || run_reporter(rx, show_bar))?;
        Ok(Self { tx, handle })
    }

    /// A sink feeding this reporter
    pub fn sink(&self) -> Sender<ProgressEvent> {
        self.tx.clone()
    }

    /// Stop the reporter and return everything it recorded
    pub fn finish(self) -> SessionReport {
        drop(self.tx);
        self.handle.join().unwrap_or_else(|_| {
            warn!("Progress reporter thread panicked, report is empty");
            SessionReport::new()
        })
    }
}

fn run_reporter(rx: Receiver<ProgressEvent>, show_bar: bool) -> SessionReport {
    let mut report = SessionReport::new();
    let mut bar: Option<ProgressBar> = None;
    let mut started = Instant::now();

    // Ends once every sender is dropped
    for event in rx.iter() {
        debug!("{:?}", event);
        match event.kind {
            EventKind::Start => {
                let total = event.total_files.unwrap_or(0) as u64;
                let pb = new_bar(total, event.phase, show_bar);
                if let Some(done) = event.completed_files {
                    pb.set_position(done as u64);
                }
                bar = Some(pb);
                started = Instant::now();
                info!("{} started ({} items)", event.phase, total);
            }
            EventKind::FileComplete | EventKind::FileSkipped | EventKind::FileError => {
                if let Some(pb) = &bar {
                    match event.completed_files {
                        Some(done) => pb.set_position(done as u64),
                        None => pb.inc(1),
                    }
                    let done = pb.position() as usize;
                    let total = pb.length().unwrap_or(0) as usize;
                    let eta = estimate_eta_from_counts(done, total, started.elapsed())
                        .map(format_duration)
                        .unwrap_or_else(|| "-".to_string());
                    pb.set_message(format!("ETA {}", eta));
                    if let Some(err) = &event.error {
                        pb.println(format!("{} error: {}", event.phase, err));
                    }
                }
            }
            EventKind::FileProgress => {
                if let (Some(pb), Some(done), Some(total)) = (&bar, event.bytes_done, event.bytes_total) {
                    let eta = estimate_eta_from_bytes(done, total, started.elapsed())
                        .map(format_duration)
                        .unwrap_or_else(|| "-".to_string());
                    pb.set_message(format!(
                        "{} / {} | ETA {}",
                        format_bytes(done),
                        format_bytes(total),
                        eta
                    ));
                }
            }
            EventKind::End => {
                if let Some(pb) = bar.take() {
                    pb.finish_with_message(format!(
                        "done in {}",
                        format_duration(started.elapsed())
                    ));
                }
                info!("{} finished", event.phase);
            }
        }
        report.add_event(event);
    }

    if let Some(pb) = bar.take() {
        pb.abandon();
    }
    report
}

fn new_bar(total: u64, phase: Phase, visible: bool) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if !visible {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    let label = match phase {
        Phase::Download => "Downloading",
        Phase::Extract => "Extracting",
        Phase::Organize => "Organizing",
    };
    let style = ProgressStyle::default_bar()
        .template("{prefix:>12} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_prefix(label);
    pb
}
