use std::collections::HashMap;
use std::ffi::CString;
use std::fs;
use std::io::ErrorKind;
use std::ops::Deref;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::unistd;

/// Creates `path` and any missing ancestors with the given mode. Succeeds if
/// the path already exists and is a directory.
pub fn ensure_directory<P: AsRef<Path>>(path: P, mode: u32) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        bail!("cannot create directory from empty path");
    }

    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => bail!("{} exists but is not a directory", path.display()),
        Err(_) => {}
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && parent != path {
            ensure_directory(parent, mode)?;
        }
    }

    match fs::DirBuilder::new().mode(mode).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to create directory {}", path.display())),
    }
}

/// Creates an empty regular file at `path` (and its parent directory) with the
/// given mode. Succeeds if the path already exists and is a regular file.
pub fn ensure_file<P: AsRef<Path>>(path: P, mode: u32) -> Result<()> {
    let path = path.as_ref();
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => return Ok(()),
        Ok(_) => bail!("{} exists but is not a regular file", path.display()),
        Err(_) => {}
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent, 0o755)?;
        }
    }

    fs::OpenOptions::new()
        .create(true)
        .write(true)
        .mode(mode)
        .open(path)
        .with_context(|| format!("failed to create file {}", path.display()))?;
    Ok(())
}

pub fn write_file<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, contents).with_context(|| format!("failed to write to {}", path.display()))?;
    Ok(())
}

/// Splits `KEY=VALUE` entries into a map, ignoring entries with an empty key.
pub fn parse_env(envs: &[String]) -> HashMap<String, String> {
    envs.iter()
        .filter_map(|e| {
            e.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

pub fn do_exec(path: &str, args: &[String]) -> Result<()> {
    let p = CString::new(path.to_string()).context("invalid executable path")?;
    let a: Vec<CString> = args
        .iter()
        .map(|s| CString::new(s.to_string()).unwrap_or_default())
        .collect();

    unistd::execvp(&p, &a).with_context(|| format!("failed to exec {}", path))?;
    Ok(())
}

pub struct TempDir {
    path: Option<PathBuf>,
}

impl TempDir {
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        ensure_directory(&path, 0o755)?;
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> &Path {
        self.path
            .as_ref()
            .expect("temp dir is only None after drop")
    }

    fn remove(&mut self) {
        if let Some(p) = &self.path {
            let _ = fs::remove_dir_all(p);
            self.path = None;
        }
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        self.remove();
    }
}

impl Deref for TempDir {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.path()
    }
}

impl AsRef<Path> for TempDir {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

pub fn create_temp_dir(test_name: &str) -> Result<TempDir> {
    TempDir::new(std::env::temp_dir().join(format!("runway-{}-{}", test_name, std::process::id())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_directory_idempotent() -> Result<()> {
        let tmp = create_temp_dir("ensure_directory_idempotent")?;
        let nested = tmp.join("a/b/c");
        ensure_directory(&nested, 0o755)?;
        assert!(nested.is_dir());
        ensure_directory(&nested, 0o755)?;
        Ok(())
    }

    #[test]
    fn test_ensure_directory_rejects_file() -> Result<()> {
        let tmp = create_temp_dir("ensure_directory_rejects_file")?;
        let file = tmp.join("occupied");
        fs::write(&file, b"")?;
        assert!(ensure_directory(&file, 0o755).is_err());
        Ok(())
    }

    #[test]
    fn test_ensure_file_idempotent() -> Result<()> {
        let tmp = create_temp_dir("ensure_file_idempotent")?;
        let file = tmp.join("sub/file");
        ensure_file(&file, 0o644)?;
        assert!(file.is_file());
        ensure_file(&file, 0o644)?;
        Ok(())
    }

    #[test]
    fn test_ensure_file_rejects_directory() -> Result<()> {
        let tmp = create_temp_dir("ensure_file_rejects_directory")?;
        let dir = tmp.join("already-a-dir");
        fs::create_dir(&dir)?;
        assert!(ensure_file(&dir, 0o644).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_env() {
        let entries = vec![
            "PATH=/usr/bin".to_string(),
            "=no-key".to_string(),
            "EMPTY=".to_string(),
            "not-an-assignment".to_string(),
        ];
        let parsed = parse_env(&entries);
        assert_eq!(parsed.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert_eq!(parsed.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(parsed.len(), 2);
    }
}
