//! Readiness sources: where "the descriptor became readable" comes from.
//!
//! The production source pairs the event loop's edge-triggered readiness
//! with an immediate zero-timeout `poll(2)` probe. The probe is what makes
//! the watch behave level-triggered: stale cached readiness is cleared
//! instead of surfacing a spurious notification, and bytes buffered before
//! registration are still reported.

use std::{
	io,
	os::fd::{AsRawFd, RawFd},
};

use async_trait::async_trait;
use tokio::io::{unix::AsyncFd, Interest};

/// Borrowed descriptor handle.
///
/// The watcher never owns the descriptor, so dropping this must not close it.
#[derive(Debug, Clone, Copy)]
struct SharedFd(RawFd);

impl AsRawFd for SharedFd {
	fn as_raw_fd(&self) -> RawFd {
		self.0
	}
}

/// A single descriptor's readiness, seen two ways: awaiting the event loop's
/// edge notification, and probing directly with a zero timeout.
#[async_trait]
pub(crate) trait ReadinessSource: Send + 'static {
	/// Waits until the descriptor has bytes to read.
	async fn wait_readable(&mut self) -> io::Result<()>;

	/// Immediate readiness check against the descriptor, bypassing the
	/// event loop.
	fn probe(&mut self) -> io::Result<bool>;
}

pub(crate) struct FdSource {
	inner: AsyncFd<SharedFd>,
}

impl FdSource {
	/// Registers `fd` with the event loop for readable interest. Must be
	/// called from within the runtime that will drive the watcher.
	pub(crate) fn new(fd: RawFd) -> io::Result<Self> {
		AsyncFd::with_interest(SharedFd(fd), Interest::READABLE).map(|inner| Self { inner })
	}
}

#[async_trait]
impl ReadinessSource for FdSource {
	async fn wait_readable(&mut self) -> io::Result<()> {
		loop {
			let mut guard = self.inner.readable().await?;

			if probe_fd(self.inner.get_ref().0)? {
				return Ok(());
			}

			// Readiness was stale; wait for the next edge.
			guard.clear_ready();
		}
	}

	fn probe(&mut self) -> io::Result<bool> {
		probe_fd(self.inner.get_ref().0)
	}
}

/// Zero-timeout `poll(2)` for readable bytes.
fn probe_fd(fd: RawFd) -> io::Result<bool> {
	let mut pfd = libc::pollfd {
		fd,
		events: libc::POLLIN,
		revents: 0,
	};

	loop {
		// SAFETY: `pfd` is a valid pollfd and the count is 1; a zero
		// timeout means the call returns immediately.
		match unsafe { libc::poll(&mut pfd, 1, 0) } {
			-1 => {
				let e = io::Error::last_os_error();
				if e.kind() != io::ErrorKind::Interrupted {
					return Err(e);
				}
			}
			0 => return Ok(false),
			_ => return Ok((pfd.revents & libc::POLLIN) != 0),
		}
	}
}
