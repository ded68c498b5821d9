//! Path and file status helpers
//!
//! Used to locate the decoder program and to check track arguments before
//! they are handed to the decoder.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// What a path points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Missing,
    Directory,
    Regular,
    Other,
}

/// Classify `path`, following symlinks.
pub fn classify(path: &Path) -> FileKind {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => FileKind::Directory,
        Ok(meta) if meta.is_file() => FileKind::Regular,
        Ok(_) => FileKind::Other,
        Err(_) => FileKind::Missing,
    }
}

/// Whether `path` is a regular file the current user may execute.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Locate `program`. Names containing a path separator are checked as
/// given; bare names are searched on `PATH`.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    resolve_in(program, env::var_os("PATH").as_deref())
}

fn resolve_in(program: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return executable_variant(candidate);
    }
    env::split_paths(search_path?).find_map(|dir| executable_variant(&dir.join(program)))
}

fn executable_variant(path: &Path) -> Option<PathBuf> {
    if is_executable(path) {
        return Some(path.to_path_buf());
    }
    #[cfg(windows)]
    {
        let exe = path.with_extension("exe");
        if exe.is_file() {
            return Some(exe);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_classify() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("track.mp3");
        fs::write(&file, b"ID3").unwrap();

        assert_eq!(classify(dir.path()), FileKind::Directory);
        assert_eq!(classify(&file), FileKind::Regular);
        assert_eq!(classify(&dir.path().join("absent.mp3")), FileKind::Missing);
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("decoder");
        fs::write(&script, b"#!/bin/sh\n").unwrap();
        assert!(!is_executable(&script));

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&script));
        assert!(!is_executable(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_searches_path() {
        use std::os::unix::fs::PermissionsExt;

        let empty = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let decoder = bin.path().join("fakedec");
        fs::write(&decoder, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&decoder, fs::Permissions::from_mode(0o755)).unwrap();

        let search: OsString = env::join_paths([empty.path(), bin.path()]).unwrap();
        assert_eq!(resolve_in("fakedec", Some(search.as_os_str())), Some(decoder.clone()));
        assert_eq!(resolve_in("missingdec", Some(search.as_os_str())), None);
        assert_eq!(resolve_in("fakedec", None), None);

        let explicit = decoder.to_string_lossy().into_owned();
        assert_eq!(resolve_in(&explicit, None), Some(decoder));
    }

    #[test]
    fn test_resolve_rejects_empty() {
        assert_eq!(resolve_in("", Some(OsStr::new("/usr/bin"))), None);
    }
}
