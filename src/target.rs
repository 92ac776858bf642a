//! Resolution of the heal target: a directory or a tar archive.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::{Error, Result};

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Plain `.tar`.
    Tar,
    /// Gzip-compressed `.tar.gz` or `.tgz`.
    TarGz,
}

impl ArchiveKind {
    /// Detects the archive kind from a file name.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else {
            None
        }
    }
}

/// A repository root ready for healing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Repository root.
    pub root: PathBuf,
    /// Whether the root was extracted from an archive.
    pub extracted: bool,
}

/// Resolves `path` to a repository root, extracting archives under the
/// system temp directory.
pub fn resolve_target(path: &Path) -> Result<ResolvedTarget> {
    resolve_target_in(path, &std::env::temp_dir())
}

/// Resolves `path`, extracting archives into a fresh directory under `scratch`.
pub fn resolve_target_in(path: &Path, scratch: &Path) -> Result<ResolvedTarget> {
    if path.is_dir() {
        let root = path.canonicalize()?;
        return Ok(ResolvedTarget {
            root,
            extracted: false,
        });
    }

    let kind = match ArchiveKind::detect(path) {
        Some(kind) if path.is_file() => kind,
        _ => return Err(Error::InvalidPath(path.to_path_buf())),
    };

    let dest = scratch.join(format!("codehealer-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dest)?;

    tracing::info!(archive = ?path, dest = ?dest, "extracting archive");
    if let Err(e) = extract(path, kind, &dest) {
        if let Err(cleanup) = std::fs::remove_dir_all(&dest) {
            tracing::warn!(error = %cleanup, path = ?dest, "failed to remove partial extraction");
        }
        return Err(e);
    }

    let root = single_top_level_dir(&dest).unwrap_or(dest);
    Ok(ResolvedTarget {
        root,
        extracted: true,
    })
}

fn extract(path: &Path, kind: ArchiveKind, dest: &Path) -> Result<()> {
    let file = File::open(path).map_err(|e| archive_error(path, e))?;
    let reader: Box<dyn Read> = match kind {
        ArchiveKind::Tar => Box::new(file),
        ArchiveKind::TarGz => Box::new(GzDecoder::new(file)),
    };

    // `unpack` refuses entries that would land outside `dest`.
    Archive::new(reader)
        .unpack(dest)
        .map_err(|e| archive_error(path, e))
}

fn archive_error(path: &Path, e: std::io::Error) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Returns the only entry of `dir` if it is a directory.
fn single_top_level_dir(dir: &Path) -> Option<PathBuf> {
    let mut entries = std::fs::read_dir(dir).ok()?.filter_map(|e| e.ok());
    let first = entries.next()?;
    if entries.next().is_some() {
        return None;
    }
    let path = first.path();
    path.is_dir().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn append_file<W: std::io::Write>(builder: &mut tar::Builder<W>, path: &str, content: &str) {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, content.as_bytes()).unwrap();
    }

    fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, content) in files {
            append_file(&mut builder, name, content);
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_tar(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, content) in files {
            append_file(&mut builder, name, content);
        }
        builder.finish().unwrap();
    }

    #[test]
    fn detect_archive_kinds() {
        assert_eq!(ArchiveKind::detect(Path::new("repo.tar")), Some(ArchiveKind::Tar));
        assert_eq!(ArchiveKind::detect(Path::new("repo.tar.gz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("REPO.TGZ")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("repo.zip")), None);
        assert_eq!(ArchiveKind::detect(Path::new("repo")), None);
    }

    #[test]
    fn directory_resolves_to_itself() {
        let repo = TempDir::new().unwrap();
        let resolved = resolve_target(repo.path()).unwrap();

        assert_eq!(resolved.root, repo.path().canonicalize().unwrap());
        assert!(!resolved.extracted);
    }

    #[test]
    fn missing_path_is_invalid() {
        let scratch = TempDir::new().unwrap();
        let missing = scratch.path().join("nope");

        assert!(matches!(
            resolve_target_in(&missing, scratch.path()),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn unsupported_file_is_invalid() {
        let scratch = TempDir::new().unwrap();
        let file = scratch.path().join("repo.zip");
        std::fs::write(&file, "not a tar").unwrap();

        assert!(matches!(
            resolve_target_in(&file, scratch.path()),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn tar_gz_with_single_directory_uses_it_as_root() {
        let scratch = TempDir::new().unwrap();
        let archive = scratch.path().join("project.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("project/main.py", "print('hi')\n"),
                ("project/requirements.txt", "flask\n"),
            ],
        );

        let resolved = resolve_target_in(&archive, scratch.path()).unwrap();

        assert!(resolved.extracted);
        assert_eq!(resolved.root.file_name().unwrap(), "project");
        assert_eq!(
            std::fs::read_to_string(resolved.root.join("main.py")).unwrap(),
            "print('hi')\n"
        );
    }

    #[test]
    fn flat_tar_uses_extraction_dir_as_root() {
        let scratch = TempDir::new().unwrap();
        let archive = scratch.path().join("flat.tar");
        write_tar(&archive, &[("main.py", "x = 1\n"), ("util.py", "y = 2\n")]);

        let resolved = resolve_target_in(&archive, scratch.path()).unwrap();

        assert!(resolved.extracted);
        assert!(resolved
            .root
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("codehealer-"));
        assert!(resolved.root.join("main.py").is_file());
        assert!(resolved.root.join("util.py").is_file());
    }

    #[test]
    fn corrupt_archive_is_archive_error_and_leaves_nothing() {
        let scratch = TempDir::new().unwrap();
        let archive = scratch.path().join("broken.tgz");
        std::fs::write(&archive, "definitely not gzip").unwrap();

        let result = resolve_target_in(&archive, scratch.path());
        assert!(matches!(result, Err(Error::Archive { .. })));

        let leftovers = std::fs::read_dir(scratch.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("codehealer-"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
