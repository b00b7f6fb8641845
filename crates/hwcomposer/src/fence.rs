//! Sync fences
//!
//! A fence is a kernel sync object handed around as a file descriptor. It
//! becomes readable once the GPU or display work it tracks has completed.
//! [`Fence`] owns exactly one descriptor and closes it on drop, so every fence
//! has a single owner at any point in time.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::time::Duration;

use rustix::event::{poll, PollFd, PollFlags};
use rustix::io::Errno;

/// An owned sync fence descriptor
#[derive(Debug)]
pub struct Fence {
    fd: OwnedFd,
}

impl Fence {
    /// Wrap an owned descriptor
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Take ownership of a raw descriptor handed out by a HAL
    ///
    /// Negative values are the HAL's "no fence" marker and yield `None`.
    ///
    /// # Safety
    /// A non-negative `fd` must be an open descriptor that nothing else will
    /// close.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Option<Self> {
        if fd < 0 {
            None
        } else {
            Some(Self {
                fd: OwnedFd::from_raw_fd(fd),
            })
        }
    }

    /// Release ownership, returning the raw descriptor
    pub fn into_raw_fd(self) -> RawFd {
        self.fd.into_raw_fd()
    }

    /// Duplicate the descriptor; both copies refer to the same sync object
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            fd: self.fd.try_clone()?,
        })
    }

    /// Block until the fence signals
    ///
    /// There is no software timeout: an unresponsive driver stalls the caller.
    pub fn wait(&self) -> io::Result<()> {
        self.poll_signalled(-1).map(|_| ())
    }

    /// Wait at most `timeout`, returning whether the fence signalled
    pub fn wait_timeout(&self, timeout: Duration) -> io::Result<bool> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        self.poll_signalled(millis)
    }

    /// Whether the fence has already signalled
    pub fn is_signalled(&self) -> io::Result<bool> {
        self.poll_signalled(0)
    }

    fn poll_signalled(&self, timeout_ms: i32) -> io::Result<bool> {
        loop {
            let mut fds = [PollFd::new(&self.fd, PollFlags::IN)];
            match poll(&mut fds, timeout_ms) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    let revents = fds[0].revents();
                    if revents.intersects(PollFlags::ERR | PollFlags::NVAL) {
                        return Err(io::Error::new(
                            io::ErrorKind::Other,
                            format!("fence poll failed: {revents:?}"),
                        ));
                    }
                    return Ok(true);
                }
                Err(Errno::INTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl AsFd for Fence {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Fence {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl From<OwnedFd> for Fence {
    fn from(fd: OwnedFd) -> Self {
        Self::new(fd)
    }
}
