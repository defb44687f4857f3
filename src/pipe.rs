//! The per-container sync FIFO. The container init process blocks on the read
//! end until `start` writes a single byte; the FIFO exists only between
//! `create` and the first `start`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, mkfifo, read, write};

pub const SYNC_FIFO: &str = "sync_fifo";

pub fn fifo_path(root: &Path, id: &str) -> PathBuf {
    root.join(id).join(SYNC_FIFO)
}

pub fn create(path: &Path) -> Result<()> {
    match mkfifo(path, Mode::from_bits_truncate(0o622)) {
        Ok(()) | Err(Errno::EEXIST) => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to create fifo {}", path.display()))
        }
    }
}

/// Blocks until the start byte arrives. Opening the read end already waits for
/// a writer; an EOF without data means the writer vanished.
pub fn await_start(path: &Path) -> Result<()> {
    let fd = open(path, OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
        .with_context(|| format!("failed to open fifo {} for reading", path.display()))?;
    let mut buf = [0u8; 1];
    let n = read(fd, &mut buf);
    let _ = close(fd);
    match n {
        Ok(0) => bail!("sync fifo closed without a start signal"),
        Ok(_) => Ok(()),
        Err(err) => Err(err).context("failed to read from sync fifo"),
    }
}

pub fn signal_start(path: &Path) -> Result<()> {
    let fd = open(path, OFlag::O_WRONLY | OFlag::O_CLOEXEC, Mode::empty())
        .with_context(|| format!("failed to open fifo {} for writing", path.display()))?;
    let res = write(fd, b"1");
    let _ = close(fd);
    res.context("failed to write start signal")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::create_temp_dir;

    #[test]
    fn test_create_is_idempotent() -> Result<()> {
        let tmp = create_temp_dir("fifo_create")?;
        let path = tmp.join("sync_fifo");
        create(&path)?;
        create(&path)?;
        Ok(())
    }

    #[test]
    fn test_signal_then_await() -> Result<()> {
        let tmp = create_temp_dir("fifo_signal")?;
        let path = tmp.join("sync_fifo");
        create(&path)?;

        let reader_path = path.clone();
        let reader = std::thread::spawn(move || await_start(&reader_path));
        signal_start(&path)?;
        reader.join().expect("reader thread panicked")?;
        Ok(())
    }
}
