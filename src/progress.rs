//! Progress line and performance summary shared by the worker threads.

use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use colored::*;
use terminal_size::{terminal_size, Width};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
const FALLBACK_WIDTH: usize = 80;

struct ProgressSink {
    writer: Box<dyn Write + Send>,
    last_update: Option<Instant>,
    last_len: usize,
}

pub struct ScanProgress {
    files_left: AtomicUsize,
    files_processed: AtomicU64,
    lines_processed: AtomicU64,
    start_time: Instant,
    sink: Mutex<ProgressSink>,
    progress_enabled: bool,
}

/// Truncates to `max_len` characters keeping the tail, prefixed with "...".
pub fn truncate_start(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        ".".repeat(max_len)
    } else {
        let skip_count = char_count - (max_len - 3);
        let truncated: String = s.chars().skip(skip_count).collect();
        format!("...{}", truncated)
    }
}

fn safe_rate(value: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= f64::EPSILON {
        0.0
    } else {
        value as f64 / elapsed_secs
    }
}

fn line_width() -> usize {
    terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(FALLBACK_WIDTH)
        .saturating_sub(1)
}

impl ScanProgress {
    pub fn new(total_files: usize) -> Self {
        ScanProgress::with_writer(total_files, Box::new(io::stdout()), true)
    }

    pub fn with_writer(
        total_files: usize,
        writer: Box<dyn Write + Send>,
        progress_enabled: bool,
    ) -> Self {
        ScanProgress {
            files_left: AtomicUsize::new(total_files),
            files_processed: AtomicU64::new(0),
            lines_processed: AtomicU64::new(0),
            start_time: Instant::now(),
            sink: Mutex::new(ProgressSink {
                writer,
                last_update: None,
                last_len: 0,
            }),
            progress_enabled,
        }
    }

    /// A sink that records counters but never prints.
    pub fn silent(total_files: usize) -> Self {
        ScanProgress::with_writer(total_files, Box::new(io::sink()), false)
    }

    #[cfg(test)]
    pub fn files_left(&self) -> usize {
        self.files_left.load(Ordering::Relaxed)
    }

    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    pub fn lines_processed(&self) -> u64 {
        self.lines_processed.load(Ordering::Relaxed)
    }

    /// Called by a worker once a file has been fully processed.
    pub fn file_done(&self, path: &Path, lines: u64) {
        let left = self
            .files_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .map(|prev| prev.saturating_sub(1))
            .unwrap_or(0);
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.lines_processed.fetch_add(lines, Ordering::Relaxed);

        if !self.progress_enabled {
            return;
        }
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        let now = Instant::now();
        let due = sink
            .last_update
            .map_or(true, |last| now.duration_since(last) >= PROGRESS_INTERVAL);
        if !due && left > 0 {
            return;
        }
        sink.last_update = Some(now);
        let text = truncate_start(
            &format!(
                "File processing (files left - {}): {}.",
                left,
                path.display()
            ),
            line_width(),
        );
        print_in_line(&mut sink, &text);
    }

    /// Ends the in-place status line with a final message.
    pub fn finish(&self, message: &str) {
        if !self.progress_enabled {
            return;
        }
        if let Ok(mut sink) = self.sink.lock() {
            print_in_line(&mut sink, message);
            let _ = writeln!(sink.writer);
            sink.last_len = 0;
        }
    }

    pub fn print_final_stats(&self, writer: &mut dyn Write) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let files = self.files_processed();
        let lines = self.lines_processed();

        let _ = writeln!(writer, "\n{}", "Performance Summary:".blue().bold());
        let _ = writeln!(
            writer,
            "Total time: {} seconds",
            format!("{:.2}", elapsed).bright_yellow()
        );
        let _ = writeln!(
            writer,
            "Files processed: {} ({})",
            files.to_string().bright_yellow(),
            format!("{:.1} files/sec", safe_rate(files, elapsed)).bright_yellow()
        );
        let _ = writeln!(
            writer,
            "Lines processed: {} ({})",
            lines.to_string().bright_yellow(),
            format!("{:.1} lines/sec", safe_rate(lines, elapsed)).bright_yellow()
        );
    }
}

/// Overwrites the current terminal line, padding over leftovers of a longer one.
fn print_in_line(sink: &mut ProgressSink, text: &str) {
    let len = text.chars().count();
    let padding = sink.last_len.saturating_sub(len);
    let _ = write!(sink.writer, "\r{}{}", text, " ".repeat(padding));
    let _ = sink.writer.flush();
    sink.last_len = len;
}
