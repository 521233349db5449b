use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),
	#[error("no logger callback registered")]
	NotReady,
	#[error("failed to register descriptor with the event loop: {0}")]
	Resource(#[source] io::Error),
	#[error("watcher is closed")]
	Closed,
}

/// Error status reported by the event loop while watching the descriptor.
///
/// Handed to the data callback instead of being thrown back into the loop;
/// the watcher itself stays valid (stopped) afterwards.
#[derive(Debug, Error)]
#[error("Error {source} on polling")]
pub struct PollError {
	source: io::Error,
}

impl From<io::Error> for PollError {
	fn from(source: io::Error) -> Self {
		Self { source }
	}
}

impl PollError {
	pub fn raw_os_error(&self) -> Option<i32> {
		self.source.raw_os_error()
	}
}
