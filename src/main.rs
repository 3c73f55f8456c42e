//! PHP function usage ranking tool
//!
//! Scans PHP sources in parallel, counts how often every function name appears
//! in call position, and marks functions defined at the top level of one of the
//! scanned files as core functions together with where they were defined.

mod aggregate;
mod discovery;
mod error;
mod pool;
mod processor;
mod progress;
mod report;
mod table;
mod tokenizer;

use clap::{ArgAction, Parser};
use std::env;
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::*;
use tracing_subscriber::EnvFilter;

#[cfg(test)]
use std::sync::OnceLock;

use crate::aggregate::ScanOutcome;
use crate::discovery::{collect_files, parse_extensions, DiscoveryOptions};
use crate::pool::{scan_files, ScanConfig};
use crate::progress::ScanProgress;
use crate::report::{
    format_report, plural, report_path, write_error_log, write_lines, OutputMode, SortOrder,
    ERROR_LOG_FILE,
};

const LOG_ENV_VAR: &str = "PFRATE_LOG";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Ranks PHP functions by how often they are called",
    long_about = "Processes files with PHP code, extracts the functions they call and counts \
                  their occurrences. A function defined at the top level of one of the processed \
                  files is reported as a core function together with where it was defined. \
                  Paths only make sense together with --recurse."
)]
struct Args {
    /// Files or directories to scan
    paths: Vec<PathBuf>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    recurse: bool,

    /// Allowed extensions separated by slashes, e.g. .inc/.module/.tpl (.php is always included)
    #[arg(short, long, default_value = ".php")]
    extensions: String,

    /// Number of worker threads (1..20)
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Order of the reported functions
    #[arg(short, long, value_enum, default_value_t = SortOrder::Functions)]
    sort: SortOrder,

    /// Where to write the report
    #[arg(short, long, value_enum, default_value_t = OutputMode::Infile)]
    output: OutputMode,

    /// Directory names to skip while recursing
    #[arg(short, long, action = ArgAction::Append)]
    ignore: Vec<String>,

    #[arg(short = 'd', long, default_value = "100")]
    max_depth: usize,

    /// Glob applied to file names or paths relative to the scanned directory
    #[arg(short = 'f', long)]
    filespec: Option<String>,

    /// File receiving one line per file that could not be processed
    #[arg(long, default_value = ERROR_LOG_FILE)]
    error_log: PathBuf,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            recurse: self.recurse,
            extensions: parse_extensions(&self.extensions),
            ignore: self.ignore.clone(),
            max_depth: self.max_depth,
            filespec: self.filespec.clone(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn format_execution_time(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs > 60 {
        format!("{:02} m. {:02} s.", secs / 60, secs % 60)
    } else {
        format!("{:.3} s.", elapsed.as_secs_f64())
    }
}

fn output_functions(outcome: &ScanOutcome, args: &Args) {
    if outcome.table.is_empty() {
        println!("There are no functions at all!");
        return;
    }

    let lines = format_report(&outcome.table, args.sort);
    if args.output.to_terminal() {
        for line in &lines {
            println!("{}", line);
        }
    }
    if args.output.to_file() {
        let Some(first) = args.paths.first() else {
            return;
        };
        let target = report_path(first);
        match write_lines(&target, &lines) {
            Ok(()) => println!(
                "Saved {} {} to {}",
                lines.len(),
                plural(lines.len(), "functions", "function"),
                target.display()
            ),
            Err(err) => eprintln!(
                "{}: failed to save {}: {}",
                "Error".red().bold(),
                target.display(),
                err
            ),
        }
    }
}

fn output_errors(outcome: &ScanOutcome, log_path: &Path) {
    if outcome.errors.is_empty() {
        return;
    }
    let errors = outcome.errors.len();
    let files = outcome.files_processed as usize;
    println!(
        "{} There was {} {} while processing {} {}. See file {}.",
        "Warning:".red().bold(),
        errors,
        plural(errors, "errors", "error"),
        files,
        plural(files, "files", "file"),
        log_path.display()
    );
    if let Err(err) = write_error_log(log_path, &outcome.errors) {
        eprintln!(
            "{}: failed to save {}: {}",
            "Error".red().bold(),
            log_path.display(),
            err
        );
    }
}

fn main() {
    if let Err(err) = run_with_args(current_args()) {
        eprintln!("{}: {}", "Error".red().bold(), err);
        std::process::exit(1);
    }
}

#[cfg(test)]
fn current_args() -> Vec<OsString> {
    take_override_args().unwrap_or_else(|| env::args_os().collect())
}

#[cfg(not(test))]
fn current_args() -> Vec<OsString> {
    env::args_os().collect()
}

fn run_with_args<I, T>(args: I) -> io::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::parse_from(args);
    init_logging(args.verbose);
    run_cli(args).map(|_| ())
}

#[cfg(test)]
static TEST_ARGS_OVERRIDE: OnceLock<std::sync::Mutex<Option<Vec<OsString>>>> = OnceLock::new();

#[cfg(test)]
fn take_override_args() -> Option<Vec<OsString>> {
    TEST_ARGS_OVERRIDE
        .get_or_init(|| std::sync::Mutex::new(None))
        .lock()
        .ok()
        .and_then(|mut guard| guard.take())
}

#[cfg(test)]
fn set_override_args(args: Vec<OsString>) {
    let mutex = TEST_ARGS_OVERRIDE.get_or_init(|| std::sync::Mutex::new(None));
    if let Ok(mut guard) = mutex.lock() {
        *guard = Some(args);
    }
}

fn run_cli(args: Args) -> io::Result<ScanOutcome> {
    let started = Instant::now();
    println!(
        "{} {}",
        env!("CARGO_PKG_NAME").bright_cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_yellow()
    );

    // Rejected before any file is touched.
    let config = ScanConfig::new(args.threads)?;

    let discovered = collect_files(&args.paths, &args.discovery_options())?;
    let total = discovered.files.len();
    println!(
        "Getting files: {} {} to process.",
        total.to_string().bright_yellow(),
        plural(total, "files", "file")
    );

    let progress = Arc::new(if io::stdout().is_terminal() {
        ScanProgress::new(total)
    } else {
        ScanProgress::silent(total)
    });
    let outcome = scan_files(discovered.files, &config, Arc::clone(&progress))?;
    progress.finish("End processing.");

    output_functions(&outcome, &args);
    output_errors(&outcome, &args.error_log);
    if discovered.walk_errors > 0 {
        println!(
            "{} {} {} skipped while collecting files",
            "Warning:".red().bold(),
            discovered.walk_errors.to_string().bright_yellow(),
            plural(discovered.walk_errors, "paths", "path")
        );
    }

    progress.print_final_stats(&mut io::stdout());
    println!(
        "Execution time: {}",
        format_execution_time(started.elapsed()).bright_yellow()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_args(paths: Vec<PathBuf>, error_log: PathBuf) -> Args {
        Args {
            paths,
            recurse: false,
            extensions: String::from(".php"),
            threads: 1,
            sort: SortOrder::Functions,
            output: OutputMode::Infile,
            ignore: Vec::new(),
            max_depth: 100,
            filespec: None,
            error_log,
            verbose: false,
        }
    }

    fn create_test_file(dir: &Path, name: &str, content: &str) -> io::Result<PathBuf> {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    #[test]
    fn test_core_function_example() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let a = create_test_file(temp_dir.path(), "a.php", "bar(); bar();\n")?;
        let b = create_test_file(temp_dir.path(), "b.php", "function bar() {}\n")?;
        let log = temp_dir.path().join("errors.log");

        let outcome = run_cli(test_args(vec![a.clone(), b.clone()], log.clone()))?;
        assert_eq!(outcome.table.len(), 1);
        let bar = outcome.table.get("bar()").expect("bar() recorded");
        assert_eq!(bar.occurrences, 2);
        assert_eq!(
            bar.definition_site,
            Some(format!("core function - defined in {} on line 1", b.display()))
        );

        let report = fs::read_to_string(report_path(&a))?;
        assert_eq!(
            report,
            format!(
                "1 bar() occurs 2 - core function - defined in {} on line 1\n",
                b.display()
            )
        );
        assert!(!log.exists(), "no error log expected");
        Ok(())
    }

    #[test]
    fn test_recursive_run_with_many_threads() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        for idx in 0..30 {
            create_test_file(
                temp_dir.path(),
                &format!("pkg{}/file{}.php", idx % 3, idx),
                "<?php\nlog_it('x');\n// log_it('comment');\nlog_it('y');\n",
            )?;
        }
        let mut args = test_args(
            vec![temp_dir.path().to_path_buf()],
            temp_dir.path().join("errors.log"),
        );
        args.recurse = true;
        args.threads = 20;
        args.output = OutputMode::Terminal;

        let outcome = run_cli(args)?;
        assert_eq!(outcome.files_processed, 30);
        assert_eq!(outcome.table.get("log_it()").map(|r| r.occurrences), Some(60));
        Ok(())
    }

    #[test]
    fn test_invalid_thread_count_is_rejected() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let a = create_test_file(temp_dir.path(), "a.php", "x();\n")?;
        let mut args = test_args(vec![a.clone()], temp_dir.path().join("errors.log"));
        args.threads = 21;
        let err = run_cli(args).expect_err("21 threads must be rejected");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(
            !report_path(&a).exists(),
            "no report should be written for a rejected run"
        );
        Ok(())
    }

    #[test]
    fn test_error_log_written_for_undecodable_file() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let good = create_test_file(temp_dir.path(), "good.php", "ok();\n")?;
        let bad = temp_dir.path().join("bad.php");
        fs::write(&bad, b"ok();\n\xff\xfe();\n")?;
        let log = temp_dir.path().join("errors.log");

        let outcome = run_cli(test_args(vec![good, bad.clone()], log.clone()))?;
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.table.get("ok()").map(|r| r.occurrences), Some(1));
        let text = fs::read_to_string(&log)?;
        assert!(
            text.trim_end()
                .ends_with(&format!("in file: {}", bad.display())),
            "unexpected log: {text}"
        );
        Ok(())
    }

    #[test]
    fn test_execution_time_format() {
        assert_eq!(format_execution_time(Duration::from_millis(1500)), "1.500 s.");
        assert_eq!(format_execution_time(Duration::from_secs(125)), "02 m. 05 s.");
    }

    #[test]
    fn test_args_parse_extensions_and_modes() {
        let args = Args::parse_from([
            "pfrate", "-r", "-e", ".inc/.module", "-t", "4", "-s", "occurs", "-o", "both", "src",
        ]);
        assert!(args.recurse);
        assert_eq!(args.threads, 4);
        assert_eq!(args.sort, SortOrder::Occurs);
        assert_eq!(args.output, OutputMode::Both);
        assert_eq!(
            args.discovery_options().extensions,
            vec![".inc", ".module", ".php"]
        );
        assert_eq!(args.error_log, PathBuf::from(ERROR_LOG_FILE));
    }

    #[test]
    fn test_main_uses_override_args() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let a = create_test_file(temp_dir.path(), "main_case.php", "hello();\n")?;
        let log = temp_dir.path().join("errors.log");
        set_override_args(vec![
            OsString::from("pfrate"),
            a.clone().into_os_string(),
            OsString::from("--error-log"),
            log.into_os_string(),
        ]);
        run_with_args(current_args())?;
        let report = fs::read_to_string(report_path(&a))?;
        assert!(report.contains("hello() occurs 1"), "unexpected report: {report}");
        Ok(())
    }
}
