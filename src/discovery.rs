//! Collects the files to scan from the command-line paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, warn};

use crate::error::DiscoveryError;

pub const DEFAULT_EXTENSION: &str = ".php";

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub recurse: bool,
    pub extensions: Vec<String>,
    pub ignore: Vec<String>,
    pub max_depth: usize,
    pub filespec: Option<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        DiscoveryOptions {
            recurse: false,
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            ignore: Vec::new(),
            max_depth: 100,
            filespec: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DiscoveredFiles {
    pub files: Vec<PathBuf>,
    pub walk_errors: usize,
}

/// Splits a slash-separated extension list; `.php` is always allowed.
pub fn parse_extensions(spec: &str) -> Vec<String> {
    let mut extensions: Vec<String> = spec
        .split('/')
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if ext.starts_with('.') {
                ext.to_string()
            } else {
                format!(".{}", ext)
            }
        })
        .collect();
    if !extensions.iter().any(|ext| ext == DEFAULT_EXTENSION) {
        extensions.push(DEFAULT_EXTENSION.to_string());
    }
    extensions
}

fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| extensions.iter().any(|ext| name.ends_with(ext.as_str())))
        .unwrap_or(false)
}

fn is_ignored_dir(path: &Path, extra: &[String]) -> bool {
    let dir_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ignored = [".git", ".svn", ".hg", "node_modules"];
    ignored.contains(&dir_name) || extra.iter().any(|d| path.ends_with(Path::new(d)))
}

fn filespec_matches(pattern: &Pattern, root_path: &Path, file_path: &Path) -> bool {
    if file_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| pattern.matches(name))
        .unwrap_or(false)
    {
        return true;
    }

    let relative = match file_path.strip_prefix(root_path) {
        Ok(rel) => rel,
        Err(_) => return false,
    };

    match relative.to_str() {
        Some(s) => pattern.matches(&s.replace('\\', "/")),
        None => false,
    }
}

/// Rejects argument sets that cannot work without `--recurse`.
pub fn validate_arguments(
    paths: &[PathBuf],
    options: &DiscoveryOptions,
) -> Result<(), DiscoveryError> {
    if paths.is_empty() {
        return Err(DiscoveryError::NoPaths);
    }
    if options.recurse {
        return Ok(());
    }
    if !paths.iter().any(|path| path.is_file()) {
        return Err(DiscoveryError::NoFiles);
    }
    let invalid: Vec<PathBuf> = paths
        .iter()
        .filter(|path| path.is_file() && !has_allowed_extension(path, &options.extensions))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        return Err(DiscoveryError::DisallowedExtension(invalid));
    }
    Ok(())
}

struct Walker<'a> {
    options: &'a DiscoveryOptions,
    filespec: Option<Pattern>,
    found: DiscoveredFiles,
}

impl Walker<'_> {
    fn accept(&mut self, root: &Path, path: &Path) {
        if !has_allowed_extension(path, &self.options.extensions) {
            return;
        }
        let matches = self
            .filespec
            .as_ref()
            .map(|pattern| filespec_matches(pattern, root, path))
            .unwrap_or(true);
        if matches {
            self.found.files.push(path.to_path_buf());
        }
    }

    fn walk(&mut self, root: &Path, dir: &Path, depth: usize) {
        if depth > self.options.max_depth {
            warn!(
                path = %dir.display(),
                max_depth = self.options.max_depth,
                "maximum directory depth reached"
            );
            self.found.walk_errors += 1;
            return;
        }
        if depth > 0 && is_ignored_dir(dir, &self.options.ignore) {
            debug!(path = %dir.display(), "skipping ignored directory");
            return;
        }

        let entries = match read_dir_sorted(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "failed to read directory");
                self.found.walk_errors += 1;
                return;
            }
        };
        for entry in entries {
            let entry_path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(err) => {
                    warn!(path = %entry_path.display(), error = %err, "failed to read entry type");
                    self.found.walk_errors += 1;
                    continue;
                }
            };
            if file_type.is_dir() {
                self.walk(root, &entry_path, depth + 1);
            } else if file_type.is_file() {
                self.accept(root, &entry_path);
            } else if file_type.is_symlink()
                && fs::metadata(&entry_path)
                    .map(|meta| meta.is_file())
                    .unwrap_or(false)
            {
                self.accept(root, &entry_path);
            }
        }
    }
}

fn read_dir_sorted(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    Ok(entries)
}

/// Expands the arguments into the ordered list of files to scan.
pub fn collect_files(
    paths: &[PathBuf],
    options: &DiscoveryOptions,
) -> Result<DiscoveredFiles, DiscoveryError> {
    validate_arguments(paths, options)?;
    let filespec = match options.filespec.as_deref() {
        Some(spec) => Some(Pattern::new(spec).map_err(|source| {
            DiscoveryError::InvalidFilespec {
                pattern: spec.to_string(),
                source,
            }
        })?),
        None => None,
    };

    let mut walker = Walker {
        options,
        filespec,
        found: DiscoveredFiles::default(),
    };
    for path in paths {
        if path.is_file() {
            let root = path.parent().unwrap_or_else(|| Path::new(""));
            walker.accept(root, path);
        } else if options.recurse && path.is_dir() {
            walker.walk(path, path, 0);
        } else if !path.exists() {
            warn!(path = %path.display(), "path does not exist");
            walker.found.walk_errors += 1;
        }
    }
    debug!(files = walker.found.files.len(), "collected input files");
    Ok(walker.found)
}
