use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn pfrate_bin() -> &'static str {
    env!("CARGO_BIN_EXE_pfrate")
}

fn write_file(path: &Path, contents: &str) {
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    fs::write(path, contents).expect("failed to write test file");
}

fn run_pfrate<I, S>(cwd: &Path, args: I) -> (std::process::ExitStatus, String, String)
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let output = Command::new(pfrate_bin())
        .current_dir(cwd)
        .args(args)
        .output()
        .expect("failed to execute pfrate");
    (
        output.status,
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

#[test]
fn cli_reports_core_function_in_file() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();
    write_file(&root.join("a.php"), "bar(); bar();\n");
    write_file(&root.join("b.php"), "function bar() {}\n");

    let (status, stdout, stderr) = run_pfrate(root, ["a.php", "b.php"]);
    assert!(status.success(), "expected success, stderr: {stderr}");
    assert!(
        stdout.contains("Saved 1 function to a.php.pfr"),
        "stdout missing save message: {stdout}"
    );
    assert!(
        stdout.contains("Performance Summary"),
        "stdout missing summary: {stdout}"
    );

    let report = fs::read_to_string(root.join("a.php.pfr")).expect("report written");
    assert_eq!(
        report,
        "1 bar() occurs 2 - core function - defined in b.php on line 1\n"
    );
    assert!(
        !root.join("pfrate.log").exists(),
        "no error log expected for a clean run"
    );
}

#[test]
fn cli_terminal_output_sorted_by_occurrences() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();
    write_file(
        &root.join("src/index.php"),
        "<?php\nrender(); render(); render();\nboot();\n",
    );
    write_file(&root.join("src/lib/helpers.php"), "<?php\nboot();\nrender();\n");

    let (status, stdout, stderr) = run_pfrate(
        root,
        ["-r", "-t", "4", "-s", "occurs", "-o", "terminal", "src"],
    );
    assert!(status.success(), "expected success, stderr: {stderr}");

    let boot = stdout.find("boot()   occurs 2").expect("boot() line");
    let render = stdout.find("render() occurs 4").expect("render() line");
    assert!(boot < render, "expected ascending occurrences: {stdout}");
    assert!(
        !root.join("src.pfr").exists(),
        "terminal output must not write a report file"
    );
}

#[test]
fn cli_extra_extensions_are_scanned() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();
    write_file(&root.join("code/module.inc"), "function setup() {}\n");
    write_file(&root.join("code/page.php"), "setup();\n");
    write_file(&root.join("code/notes.txt"), "setup();\n");

    let (status, stdout, stderr) =
        run_pfrate(root, ["-r", "-e", ".inc", "-o", "both", "code"]);
    assert!(status.success(), "expected success, stderr: {stderr}");
    let expected_site = Path::new("code").join("module.inc");
    assert!(
        stdout.contains(&format!(
            "setup() occurs 1 - core function - defined in {} on line 1",
            expected_site.display()
        )),
        "stdout missing setup() line: {stdout}"
    );
    assert!(root.join("code.pfr").exists(), "report file expected");
}

#[test]
fn cli_empty_scan_reports_no_functions() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();
    write_file(&root.join("empty.php"), "<?php\n// nothing here();\n");

    let (status, stdout, _stderr) = run_pfrate(root, ["empty.php"]);
    assert!(status.success());
    assert!(
        stdout.contains("There are no functions at all!"),
        "stdout: {stdout}"
    );
}
