//! Per-file processing: read, tokenize, and build a local delta.

use std::fmt;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::table::OccurrenceTable;
use crate::tokenizer::{LineScanner, ScanEvent};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A file that could not be read or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub file_path: PathBuf,
}

impl ErrorRecord {
    pub fn new(file_path: &Path, message: impl Into<String>) -> Self {
        ErrorRecord {
            timestamp: Utc::now(),
            message: message.into(),
            file_path: file_path.to_path_buf(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -- {} in file: {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.message,
            self.file_path.display()
        )
    }
}

/// Outcome of one file. Every queued file yields exactly one of these.
#[derive(Debug, Default, Clone)]
pub struct ProcessingResult {
    pub delta: OccurrenceTable,
    pub error: Option<ErrorRecord>,
    pub lines_scanned: u64,
}

impl ProcessingResult {
    pub fn failed(error: ErrorRecord) -> Self {
        ProcessingResult {
            delta: OccurrenceTable::new(),
            error: Some(error),
            lines_scanned: 0,
        }
    }
}

/// Reads lines as strict UTF-8; invalid bytes surface as `InvalidData`.
/// `\n`, `\r\n` and a bare `\r` all end a line.
pub struct Utf8LineReader {
    reader: BufReader<Box<dyn Read + Send>>,
    buffer: Vec<u8>,
    // Previous line ended in `\r`; a leading `\n` belongs to it.
    skip_lf: bool,
}

impl Utf8LineReader {
    fn new(file: fs::File) -> Self {
        Self::from_reader(Box::new(file))
    }

    fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::with_capacity(8 * 1024),
            skip_lf: false,
        }
    }

    #[cfg(test)]
    fn with_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::from_reader(Box::new(reader))
    }

    /// Reads the next raw line into `buffer`, without its terminator.
    /// Returns false at end of input.
    fn read_line_bytes(&mut self) -> io::Result<bool> {
        self.buffer.clear();
        if self.skip_lf {
            self.skip_lf = false;
            if fill_buf(&mut self.reader)?.first() == Some(&b'\n') {
                self.reader.consume(1);
            }
        }
        loop {
            let available = fill_buf(&mut self.reader)?;
            if available.is_empty() {
                return Ok(!self.buffer.is_empty());
            }
            match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(pos) => {
                    let ends_in_cr = available[pos] == b'\r';
                    self.buffer.extend_from_slice(&available[..pos]);
                    self.reader.consume(pos + 1);
                    self.skip_lf = ends_in_cr;
                    return Ok(true);
                }
                None => {
                    let len = available.len();
                    self.buffer.extend_from_slice(available);
                    self.reader.consume(len);
                }
            }
        }
    }
}

/// `BufRead::fill_buf`, retrying on `Interrupted`.
fn fill_buf<R: BufRead>(reader: &mut R) -> io::Result<&[u8]> {
    loop {
        match reader.fill_buf() {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
            Ok(_) => break,
        }
    }
    reader.fill_buf()
}

impl Iterator for Utf8LineReader {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_line_bytes() {
            Ok(false) => None,
            Ok(true) => {
                let bytes = std::mem::take(&mut self.buffer);
                Some(
                    String::from_utf8(bytes)
                        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)),
                )
            }
            Err(err) => Some(Err(err)),
        }
    }
}

fn open_lines(file_path: &Path) -> io::Result<Utf8LineReader> {
    let file = fs::File::open(file_path)?;
    Ok(Utf8LineReader::new(file))
}

/// Description stored for a function defined at the top level of `file_path`.
pub fn definition_site(file_path: &Path, line: usize) -> String {
    format!(
        "core function - defined in {} on line {}",
        file_path.display(),
        line
    )
}

fn scan_lines<I>(file_path: &Path, lines: I) -> io::Result<(OccurrenceTable, u64)>
where
    I: IntoIterator<Item = io::Result<String>>,
{
    let mut scanner = LineScanner::new();
    let mut delta = OccurrenceTable::new();
    let mut events = Vec::new();
    let mut total_lines = 0u64;
    for (idx, line_result) in lines.into_iter().enumerate() {
        let line = line_result?;
        total_lines += 1;
        scanner.scan_line(&line, idx + 1, &mut events);
        for event in events.drain(..) {
            match event {
                ScanEvent::Call(name) => delta.record_call(&name),
                ScanEvent::Definition { name, line } => {
                    delta.record_definition(&name, definition_site(file_path, line))
                }
            }
        }
    }
    Ok((delta, total_lines))
}

/// Scans one file into a fresh delta. Never panics on bad input; any read or
/// decode failure discards the partial delta and is reported as an [`ErrorRecord`].
pub fn process_file(file_path: &Path) -> ProcessingResult {
    let outcome = open_lines(file_path).and_then(|lines| scan_lines(file_path, lines));
    match outcome {
        Ok((delta, lines_scanned)) => {
            debug!(
                path = %file_path.display(),
                functions = delta.len(),
                lines = lines_scanned,
                "scanned file"
            );
            ProcessingResult {
                delta,
                error: None,
                lines_scanned,
            }
        }
        Err(err) => {
            warn!(path = %file_path.display(), error = %err, "failed to scan file");
            ProcessingResult::failed(ErrorRecord::new(file_path, err.to_string()))
        }
    }
}
