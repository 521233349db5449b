//! Observer traits for readiness notifications and diagnostics.

use super::error::PollError;

/// Receives the outcome of a readiness detection.
///
/// Invoked at most once per arm cycle: after a notification the watcher
/// stays stopped until [`ReadinessWatcher::start`](crate::ReadinessWatcher::start)
/// is called again, so the observer is free to read from the descriptor
/// without racing the watcher.
///
/// Any `FnMut(Result<(), PollError>) + Send + 'static` closure qualifies.
pub trait DataHandler: Send + 'static {
	fn handle_ready(&mut self, outcome: Result<(), PollError>);
}

impl<F> DataHandler for F
where
	F: FnMut(Result<(), PollError>) + Send + 'static,
{
	fn handle_ready(&mut self, outcome: Result<(), PollError>) {
		self(outcome);
	}
}

/// Receives a human-readable message for every watcher state transition.
///
/// Any `FnMut(&str) + Send + 'static` closure qualifies.
pub trait LogHandler: Send + 'static {
	fn log(&mut self, message: &str);
}

impl<F> LogHandler for F
where
	F: FnMut(&str) + Send + 'static,
{
	fn log(&mut self, message: &str) {
		self(message);
	}
}
