//! Sorting, formatting and writing of the final report and the error log.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::processor::ErrorRecord;
use crate::table::{FunctionRecord, OccurrenceTable};

pub const REPORT_EXTENSION: &str = ".pfr";
pub const ERROR_LOG_FILE: &str = "pfrate.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    Functions,
    Occurs,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Terminal,
    Infile,
    Both,
}

impl OutputMode {
    pub fn to_terminal(self) -> bool {
        matches!(self, OutputMode::Terminal | OutputMode::Both)
    }

    pub fn to_file(self) -> bool {
        matches!(self, OutputMode::Infile | OutputMode::Both)
    }
}

pub fn plural<'a>(count: usize, plural: &'a str, singular: &'a str) -> &'a str {
    if count == 1 {
        singular
    } else {
        plural
    }
}

fn digits(value: u64) -> usize {
    value.to_string().len()
}

/// Renders one line per function, ordered by `sort`.
pub fn format_report(table: &OccurrenceTable, sort: SortOrder) -> Vec<String> {
    let index_width = digits(table.len() as u64);
    let name_width = table.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let occur_width = digits(
        table
            .iter()
            .map(|(_, record)| record.occurrences)
            .max()
            .unwrap_or(0),
    );

    let mut rows: Vec<(usize, &str, &FunctionRecord)> = table
        .iter()
        .enumerate()
        .map(|(idx, (key, record))| (idx + 1, key, record))
        .collect();
    match sort {
        SortOrder::Functions => rows.sort_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(&b.0))),
        SortOrder::Occurs => {
            rows.sort_by(|a, b| a.2.occurrences.cmp(&b.2.occurrences).then(a.0.cmp(&b.0)))
        }
        SortOrder::Index => {}
    }

    rows.into_iter()
        .map(|(index, key, record)| {
            let line = format!(
                "{:>iw$} {:<nw$} occurs {:>ow$} - {}",
                index,
                key,
                record.occurrences,
                record.definition_site.as_deref().unwrap_or(""),
                iw = index_width,
                nw = name_width,
                ow = occur_width
            );
            line.trim_end().to_string()
        })
        .collect()
}

/// `<first argument>.pfr`, without doubling an existing suffix.
pub fn report_path(first_arg: &Path) -> PathBuf {
    let raw = first_arg.to_string_lossy();
    let trimmed = raw.trim_end_matches(['/', '\\']);
    let base = if trimmed.is_empty() { raw.as_ref() } else { trimmed };
    if base.ends_with(REPORT_EXTENSION) {
        PathBuf::from(base)
    } else {
        PathBuf::from(format!("{}{}", base, REPORT_EXTENSION))
    }
}

pub fn write_lines(path: &Path, lines: &[String]) -> io::Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for line in lines {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()
}

pub fn write_error_log(path: &Path, errors: &[ErrorRecord]) -> io::Result<()> {
    let lines: Vec<String> = errors.iter().map(ErrorRecord::to_string).collect();
    write_lines(path, &lines)
}
