use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn pfrate_bin() -> &'static str {
    env!("CARGO_BIN_EXE_pfrate")
}

fn write_file(path: &Path, contents: &str) {
    fs::write(path, contents).expect("failed to write test file");
}

fn report_for(root: &Path, files: &[&str], extra: &[&str]) -> String {
    let output = Command::new(pfrate_bin())
        .current_dir(root)
        .args(["-o", "terminal"])
        .args(extra)
        .args(files)
        .output()
        .expect("failed to execute pfrate");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn cli_class_methods_are_not_core_functions() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();
    write_file(
        &root.join("widget.php"),
        r#"<?php
class Widget {
    public function render($x) {
        return format($x);
    }
}
function format($x) { return trim($x); }
"#,
    );

    let stdout = report_for(root, &["widget.php"], &[]);
    assert!(
        stdout.contains("format() occurs 1 - core function - defined in widget.php on line 7"),
        "format() should be a core function: {stdout}"
    );
    assert!(
        stdout.contains("render() occurs 1 -\n") || stdout.contains("render() occurs 1 -\r\n"),
        "render() should be counted but not defined: {stdout}"
    );
    assert!(!stdout.contains("trim() occurs"), "definition line body must not be scanned: {stdout}");
}

#[test]
fn cli_comment_lines_never_count() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();
    write_file(
        &root.join("comments.php"),
        "<?php\n/**\n * hidden();\n */\n// hidden();\n/* hidden(); */\nvisible();\n",
    );

    let stdout = report_for(root, &["comments.php"], &[]);
    assert!(stdout.contains("visible() occurs 1"), "stdout: {stdout}");
    assert!(!stdout.contains("hidden()"), "comment text leaked: {stdout}");
}

#[test]
fn cli_counts_match_across_thread_counts() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();
    let mut files = Vec::new();
    for idx in 0..12 {
        let name = format!("f{idx}.php");
        write_file(&root.join(&name), "<?php\nemit(); emit(); emit();\n");
        files.push(name);
    }
    let names: Vec<&str> = files.iter().map(String::as_str).collect();

    let single = report_for(root, &names, &["-t", "1"]);
    let many = report_for(root, &names, &["-t", "20"]);
    assert!(single.contains("emit() occurs 36"), "stdout: {single}");
    assert!(many.contains("emit() occurs 36"), "stdout: {many}");
}
