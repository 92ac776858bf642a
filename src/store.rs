//! File store for reading, diffing and rewriting repository files.
//!
//! The store never returns I/O errors: unreadable files come back as `None`
//! and failed writes as [`WriteOutcome::Failed`], both logged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crossterm::style::Stylize;
use path_clean::PathClean;
use similar::TextDiff;
use walkdir::{DirEntry, WalkDir};

/// Lines of context around each diff hunk.
const DIFF_CONTEXT_LINES: usize = 3;

/// Extension of files collected by [`FileStore::list_source_files`].
const SOURCE_EXTENSION: &str = "py";

/// Directories never descended into when listing sources.
const SKIPPED_DIRS: &[&str] = &[".git", "__pycache__", ".venv", "venv", "node_modules"];

/// Result of a write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// New content matched the file; nothing was written.
    Unchanged,
    /// The file was written.
    Written,
    /// The write failed and was logged.
    Failed,
}

/// Reads and writes text files relative to a repository root.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Repository root, used for diff headers.
    root: PathBuf,
    /// Extra directory names skipped when listing sources.
    skip_dirs: Vec<String>,
}

impl FileStore {
    /// Creates a store for the repository at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: absolute_path(&root.into()),
            skip_dirs: Vec::new(),
        }
    }

    /// Skips a directory name (such as the sandbox) when listing sources.
    pub fn with_skipped_dir(mut self, name: impl Into<String>) -> Self {
        self.skip_dirs.push(name.into());
        self
    }

    /// Returns the repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads a file, returning `None` if it cannot be read.
    pub fn read(&self, path: &Path) -> Option<String> {
        match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!(error = %e, path = ?path, "error reading file");
                None
            }
        }
    }

    /// Writes `content` to `path`, printing a diff of the change.
    ///
    /// Identical content is a no-op: no diff is printed and the file is not
    /// touched.
    pub fn write(&self, path: &Path, content: &str) -> WriteOutcome {
        let original = if path.exists() {
            self.read(path).unwrap_or_default()
        } else {
            String::new()
        };

        if path.exists() && original == content {
            tracing::info!(path = ?path, "content unchanged, skipping write");
            return WriteOutcome::Unchanged;
        }

        let relative = self.display_path(path);
        println!("--- BEGIN DIFF ---");
        println!("{}", colorize_diff(&render_diff(&original, content, &relative)));
        println!("--- END DIFF ---");

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(error = %e, path = ?path, "error creating parent directory");
                return WriteOutcome::Failed;
            }
        }

        match std::fs::write(path, content) {
            Ok(()) => {
                tracing::info!(path = ?path, bytes = content.len(), "wrote file");
                WriteOutcome::Written
            }
            Err(e) => {
                tracing::error!(error = %e, path = ?path, "error writing file");
                WriteOutcome::Failed
            }
        }
    }

    /// Returns every source file under `root`, keyed by its path relative to
    /// `root` (with `/` separators).
    ///
    /// Files that cannot be read are skipped silently.
    pub fn list_source_files(&self, root: &Path) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();

        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| !self.is_skipped(entry));

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(key, content);
        }

        files
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        let name: &str = &name;
        SKIPPED_DIRS.contains(&name) || self.skip_dirs.iter().any(|d| d == name)
    }

    fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

/// Returns `path` made absolute against the current directory and lexically
/// cleaned. Falls back to the cleaned input if the current directory is
/// unavailable.
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .clean()
}

/// Concatenates source files into a single prompt-ready document.
pub fn concatenate_sources(files: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (path, content) in files {
        out.push_str(&format!("--- FILE: {} ---\n", path));
        out.push_str(content);
        if !content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("--- END FILE: {} ---\n\n", path));
    }
    out
}

/// Renders a plain unified diff between two texts.
pub fn render_diff(old: &str, new: &str, relative_path: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let rendered = diff
        .unified_diff()
        .context_radius(DIFF_CONTEXT_LINES)
        .header(&format!("a/{}", relative_path), &format!("b/{}", relative_path))
        .to_string();
    rendered
}

/// Colors a unified diff: additions green, deletions red, hunk headers cyan.
fn colorize_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            let owned = line.to_string();
            if line.starts_with("+++") || line.starts_with("---") {
                owned.bold().to_string()
            } else if line.starts_with('+') {
                owned.green().to_string()
            } else if line.starts_with('-') {
                owned.red().to_string()
            } else if line.starts_with("@@") {
                owned.cyan().to_string()
            } else {
                owned
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
