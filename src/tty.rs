//! Pseudo-terminal provisioning. The runtime allocates the pair, hands the
//! master to the caller over a unix socket and wires the slave into the
//! container's stdio before exec.

use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::Path;

use anyhow::{bail, Context, Result};
use nix::fcntl::{open, OFlag};
use nix::pty;
use nix::sys::socket::{self, AddressFamily, MsgFlags, SockAddr, SockFlag, SockType, UnixAddr};
use nix::sys::stat::Mode;
use nix::sys::uio::IoVec;
use nix::unistd::{close, dup2, setsid};

// sockaddr_un.sun_path is 108 bytes including the terminator
const UNIX_PATH_MAX: usize = 108;

#[derive(Debug)]
pub struct ConsolePair {
    pub master: RawFd,
    pub slave: RawFd,
    pub slave_name: String,
}

impl ConsolePair {
    pub fn close_master(&mut self) {
        if self.master >= 0 {
            let _ = close(self.master);
            self.master = -1;
        }
    }

    pub fn close_slave(&mut self) {
        if self.slave >= 0 {
            let _ = close(self.slave);
            self.slave = -1;
        }
    }

    pub fn close(&mut self) {
        self.close_master();
        self.close_slave();
    }
}

/// Opens a PTY master/slave pair, both O_CLOEXEC. Nothing stays open when any
/// step fails.
pub fn allocate_console_pair() -> Result<ConsolePair> {
    let master = pty::posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_CLOEXEC)
        .context("posix_openpt failed")?;
    pty::grantpt(&master).context("grantpt failed")?;
    pty::unlockpt(&master).context("unlockpt failed")?;
    let slave_name = pty::ptsname_r(&master).context("ptsname failed")?;

    let slave = open(
        Path::new(&slave_name),
        OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_CLOEXEC,
        Mode::empty(),
    )
    .with_context(|| format!("failed to open pty slave {}", slave_name))?;

    Ok(ConsolePair {
        master: master.into_raw_fd(),
        slave,
        slave_name,
    })
}

/// Connects to the caller's console socket and sends the master fd in a
/// single SCM_RIGHTS message whose payload is the slave's device name.
pub fn send_console_fd(pair: &ConsolePair, socket_path: &Path) -> Result<()> {
    if socket_path.as_os_str().len() >= UNIX_PATH_MAX {
        bail!("console socket path too long: {}", socket_path.display());
    }

    let sock = socket::socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        None,
    )
    .context("failed to create console socket")?;

    let addr = UnixAddr::new(socket_path)
        .with_context(|| format!("invalid console socket path {}", socket_path.display()))?;
    if let Err(err) = socket::connect(sock, &SockAddr::Unix(addr)) {
        let _ = close(sock);
        return Err(err).with_context(|| {
            format!("failed to connect to console socket {}", socket_path.display())
        });
    }

    let payload = if pair.slave_name.is_empty() {
        "console"
    } else {
        pair.slave_name.as_str()
    };
    let iov = [IoVec::from_slice(payload.as_bytes())];
    let fds = [pair.master];
    let cmsg = socket::ControlMessage::ScmRights(&fds);
    let res = socket::sendmsg(sock, &iov, &[cmsg], MsgFlags::empty(), None);
    let _ = close(sock);
    res.context("failed to send pty master")?;
    Ok(())
}

/// Makes the slave the controlling terminal and routes stdio through it.
/// Runs in the container process right before exec.
pub fn setup_console(slave: RawFd) -> Result<()> {
    setsid().context("failed to create a new session")?;
    if unsafe { libc::ioctl(slave, libc::TIOCSCTTY, 0) } < 0 {
        bail!("failed to set the controlling terminal");
    }

    dup2(slave, 0).context("failed to dup tty to stdin")?;
    dup2(slave, 1).context("failed to dup tty to stdout")?;
    dup2(slave, 2).context("failed to dup tty to stderr")?;
    if slave > 2 {
        close(slave).context("failed to close the original slave fd")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::socket::{recvmsg, ControlMessageOwned};
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixListener;

    use crate::utils::create_temp_dir;

    #[test]
    fn test_allocate_console_pair() -> Result<()> {
        let mut pair = allocate_console_pair()?;
        assert!(pair.master >= 0);
        assert!(pair.slave >= 0);
        assert!(pair.slave_name.starts_with("/dev/pts/"));
        pair.close();
        assert_eq!(pair.master, -1);
        Ok(())
    }

    #[test]
    fn test_send_console_fd_delivers_master() -> Result<()> {
        let tmp = create_temp_dir("console_send")?;
        let socket_path = tmp.join("console.sock");
        let listener = UnixListener::bind(&socket_path)?;

        let mut pair = allocate_console_pair()?;
        send_console_fd(&pair, &socket_path)?;

        let (stream, _) = listener.accept()?;
        let mut buf = [0u8; 128];
        let iov = [IoVec::from_mut_slice(&mut buf)];
        let mut cmsg_space = nix::cmsg_space!([RawFd; 1]);
        let msg = recvmsg(
            stream.as_raw_fd(),
            &iov,
            Some(&mut cmsg_space),
            MsgFlags::empty(),
        )?;

        let name = std::str::from_utf8(&buf[..msg.bytes]).unwrap();
        assert_eq!(name, pair.slave_name);

        let mut received = None;
        for cmsg in msg.cmsgs() {
            if let ControlMessageOwned::ScmRights(fds) = cmsg {
                received = fds.first().copied();
            }
        }
        let fd = received.expect("no fd passed");
        assert!(fd >= 0);
        let _ = close(fd);
        pair.close();
        Ok(())
    }

    #[test]
    fn test_send_console_fd_rejects_long_path() -> Result<()> {
        let mut pair = allocate_console_pair()?;
        let long = format!("/tmp/{}", "x".repeat(200));
        assert!(send_console_fd(&pair, Path::new(&long)).is_err());
        pair.close();
        Ok(())
    }

    #[test]
    fn test_send_console_fd_connect_failure() -> Result<()> {
        let mut pair = allocate_console_pair()?;
        let missing = Path::new("/tmp/runway-no-such-console.sock");
        assert!(send_console_fd(&pair, missing).is_err());
        pair.close();
        Ok(())
    }
}
