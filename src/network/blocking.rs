use std::io;
use std::os::unix::io::RawFd;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tracing::warn;

/// Puts a descriptor into non-blocking mode until restored.
///
/// The saved flags are written back by [`NonBlocking::restore`], or on drop
/// if the guard goes out of scope first.
pub struct NonBlocking {
    fd: RawFd,
    saved: Option<OFlag>,
}

impl NonBlocking {
    /// Saves the current status flags and sets `O_NONBLOCK`
    pub fn enable(fd: RawFd) -> io::Result<Self> {
        let saved = status_flags(fd)?;
        set_status_flags(fd, saved | OFlag::O_NONBLOCK)?;
        Ok(NonBlocking {
            fd,
            saved: Some(saved),
        })
    }

    /// Writes the saved flags back, reporting failure
    pub fn restore(mut self) -> io::Result<()> {
        match self.saved.take() {
            Some(flags) => set_status_flags(self.fd, flags),
            None => Ok(()),
        }
    }
}

impl Drop for NonBlocking {
    fn drop(&mut self) {
        if let Some(flags) = self.saved.take() {
            if let Err(e) = set_status_flags(self.fd, flags) {
                warn!("unable to restore blocking mode on fd {}: {}", self.fd, e);
            }
        }
    }
}

/// Whether `O_NONBLOCK` is set on the descriptor
pub fn is_nonblocking(fd: RawFd) -> io::Result<bool> {
    Ok(status_flags(fd)?.contains(OFlag::O_NONBLOCK))
}

fn status_flags(fd: RawFd) -> io::Result<OFlag> {
    let bits = fcntl(fd, FcntlArg::F_GETFL)?;
    Ok(OFlag::from_bits_truncate(bits))
}

fn set_status_flags(fd: RawFd, flags: OFlag) -> io::Result<()> {
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    Ok(())
}
