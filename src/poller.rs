//! Readiness registry: a thin owner of one epoll instance, plus the eventfd
//! waker used to break a blocked `wait` from another thread.
//!
//! There is deliberately no unregister call. Closing a descriptor removes it
//! from the epoll interest list, so descriptor ownership (drop = close) is the
//! whole lifecycle story; see `reactor::Connection`.

use std::io;
use std::os::unix::io::RawFd;

use crate::config::MAX_EVENTS;

/// One ready descriptor out of a wait batch: the token it was registered
/// under, and the raw epoll flags.
#[derive(Clone, Copy, Debug)]
pub struct Event {
    pub token: u64,
    flags: u32,
}

impl Event {
    /// Kernel flagged an error condition on the descriptor.
    pub fn is_error(&self) -> bool {
        self.flags & libc::EPOLLERR as u32 != 0
    }

    pub fn is_readable(&self) -> bool {
        self.flags & libc::EPOLLIN as u32 != 0
    }
}

/// Handle to the kernel readiness facility. Registered descriptors are armed
/// edge-triggered for read-readiness only; error events arrive regardless.
pub struct Poller {
    epfd: RawFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epfd })
    }

    /// Arm `fd` for edge-triggered read-readiness, carrying `token` back in
    /// every event for it. A descriptor is registered at most once.
    pub fn register(&self, fd: RawFd, token: u64) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events: (libc::EPOLLIN | libc::EPOLLET) as u32,
            u64: token,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, fd, &mut ev) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Block until at least one registered descriptor is ready, then refill
    /// `out` with the whole batch. No timeout; the only ways out are readiness
    /// and a real error. Interrupted waits are retried.
    pub fn wait(&self, out: &mut Vec<Event>) -> io::Result<()> {
        let mut raw = [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
        let n = loop {
            let n = unsafe { libc::epoll_wait(self.epfd, raw.as_mut_ptr(), MAX_EVENTS as i32, -1) };
            if n >= 0 {
                break n as usize;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        };
        out.clear();
        out.extend(raw[..n].iter().map(|ev| Event {
            token: ev.u64,
            flags: ev.events,
        }));
        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}

/// Eventfd wake-up for a poller. Register its descriptor under a reserved
/// token; a `wake` from any thread then surfaces as a normal ready event.
pub struct Waker {
    fd: RawFd,
}

impl Waker {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Duplicate the handle so one side can live inside the reactor (and be
    /// registered) while the other is carried off to whoever stops it.
    pub fn try_clone(&self) -> io::Result<Self> {
        let fd = unsafe { libc::fcntl(self.fd, libc::F_DUPFD_CLOEXEC, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Bump the eventfd counter. A failed write means the receiving side is
    /// already gone, which is indistinguishable from "wake delivered".
    pub fn wake(&self) {
        let val: u64 = 1;
        unsafe {
            libc::write(self.fd, &val as *const u64 as *const libc::c_void, 8);
        }
    }

    /// Consume the pending counter so the edge re-arms.
    pub fn drain(&self) {
        let mut buf: u64 = 0;
        loop {
            let n = unsafe { libc::read(self.fd, &mut buf as *mut u64 as *mut libc::c_void, 8) };
            if n <= 0 {
                break;
            }
        }
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
