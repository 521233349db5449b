use std::{io, os::fd::RawFd, time::Duration};

use async_channel as chan;
use futures_concurrency::future::Race;
use tokio::{
	spawn,
	sync::oneshot,
	time::{sleep_until, Instant},
};
use tracing::{trace, warn};

use super::{
	error::{Error, PollError},
	handler::{DataHandler, LogHandler},
	message::WatcherMessage,
	source::{FdSource, ReadinessSource},
};

/// Fallback probe period. Some serial drivers deliver the first readable
/// notification and then go silent; the timer re-checks readiness at this
/// fixed interval so a stuck watch can never stall the reader forever.
const POLL_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Watches a single descriptor for readable bytes.
///
/// Two watchers are armed together: an edge-triggered readable watch
/// registered with the event loop, and a one-shot fallback timer that probes
/// the descriptor directly when it fires. Whichever detects readiness first
/// disarms both and notifies the data callback exactly once; re-arming is
/// the observer's job, via [`start`](Self::start). The only exception is the
/// fallback timer finding no data: it re-arms itself without notifying.
///
/// The descriptor is borrowed, never owned: the watcher registers it with
/// the event loop but closing it remains the caller's responsibility, and
/// must happen only after the watcher is gone.
///
/// Construction arms the watchers immediately. [`close`](Self::close)
/// consumes the handle, so a closed watcher cannot be restarted; dropping
/// the handle tears the watcher down the same way.
pub struct ReadinessWatcher {
	fd: RawFd,
	msgs_tx: chan::Sender<WatcherMessage>,
}

impl ReadinessWatcher {
	/// Creates the watcher and immediately arms both the readable watch and
	/// the fallback timer.
	///
	/// Must be called from within a tokio runtime, which becomes the event
	/// loop driving the watcher.
	///
	/// Fails with [`Error::InvalidArgument`] if `fd` is not an open
	/// descriptor, and with [`Error::Resource`] if the event loop refuses
	/// the registration for any other reason.
	pub fn create(fd: RawFd, data_handler: impl DataHandler) -> Result<Self, Error> {
		if fd < 0 {
			return Err(Error::InvalidArgument("first argument must be an fd"));
		}

		let source = FdSource::new(fd).map_err(|e| {
			if e.raw_os_error() == Some(libc::EBADF) {
				Error::InvalidArgument("first argument must be an fd")
			} else {
				Error::Resource(e)
			}
		})?;

		Ok(Self::spawn_with_source(
			fd,
			Box::new(source),
			Box::new(data_handler),
		))
	}

	fn spawn_with_source(
		fd: RawFd,
		source: Box<dyn ReadinessSource>,
		data_handler: Box<dyn DataHandler>,
	) -> Self {
		let (msgs_tx, msgs_rx) = chan::bounded(8);

		spawn(run(fd, source, data_handler, msgs_rx));

		Self { fd, msgs_tx }
	}

	/// The watched descriptor, for the observer to read from once notified.
	#[must_use]
	pub fn descriptor(&self) -> RawFd {
		self.fd
	}

	/// Registers the diagnostic observer. Every state transition from here
	/// on emits a descriptive message through it.
	///
	/// Single registration; there is no unregister operation. Call this
	/// immediately after [`create`](Self::create): [`start`](Self::start)
	/// refuses to run without it.
	pub async fn set_logger_callback(&self, logger: impl LogHandler) -> Result<(), Error> {
		let (tx, rx) = oneshot::channel();

		self.msgs_tx
			.send(WatcherMessage::SetLogger {
				logger: Box::new(logger),
				ack: tx,
			})
			.await
			.map_err(|_| Error::Closed)?;

		rx.await.map_err(|_| Error::Closed)
	}

	/// Arms the readable watch and restarts the fallback timer from zero.
	///
	/// Idempotent: starting an armed watcher just resets the timer. Fails
	/// with [`Error::NotReady`] until a logger callback is registered.
	pub async fn start(&self) -> Result<(), Error> {
		let (tx, rx) = oneshot::channel();

		self.msgs_tx
			.send(WatcherMessage::Start { ack: tx })
			.await
			.map_err(|_| Error::Closed)?;

		rx.await.map_err(|_| Error::Closed)?
	}

	/// Disarms both watchers without releasing them; a later
	/// [`start`](Self::start) re-arms. Safe to call when already stopped.
	pub async fn stop(&self) -> Result<(), Error> {
		let (tx, rx) = oneshot::channel();

		self.msgs_tx
			.send(WatcherMessage::Stop { ack: tx })
			.await
			.map_err(|_| Error::Closed)?;

		rx.await.map_err(|_| Error::Closed)
	}

	/// Final stop, then releases the event loop registration. Consumes the
	/// handle: a closed watcher cannot be started again.
	pub async fn close(self) -> Result<(), Error> {
		let (tx, rx) = oneshot::channel();

		self.msgs_tx
			.send(WatcherMessage::Close { ack: tx })
			.await
			.map_err(|_| Error::Closed)?;

		rx.await.map_err(|_| Error::Closed)
	}
}

/// Both watchers are always in the same position: `Armed` holds the live
/// fallback deadline next to the readable watch, `Stopped` holds neither.
/// There is no state with exactly one of them active.
enum State {
	Armed { deadline: Instant },
	Stopped,
}

async fn run(
	fd: RawFd,
	mut source: Box<dyn ReadinessSource>,
	mut data_handler: Box<dyn DataHandler>,
	msgs_rx: chan::Receiver<WatcherMessage>,
) {
	let mut logger: Option<Box<dyn LogHandler>> = None;

	// Construction itself arms the watchers, silently: transitions are only
	// logged once the caller starts driving the watcher.
	let mut state = State::Armed {
		deadline: Instant::now() + POLL_TIMEOUT,
	};

	enum RaceOutput {
		Command(Option<WatcherMessage>),
		Readable(io::Result<()>),
		Timeout,
	}

	loop {
		let output = match state {
			// While armed, readiness and the fallback deadline race the
			// command channel; while stopped, neither exists to fire, which
			// is what makes every notification path mutually exclusive.
			State::Armed { deadline } => (
				async { RaceOutput::Command(msgs_rx.recv().await.ok()) },
				async { RaceOutput::Readable(source.wait_readable().await) },
				async {
					sleep_until(deadline).await;
					RaceOutput::Timeout
				},
			)
				.race()
				.await,
			State::Stopped => RaceOutput::Command(msgs_rx.recv().await.ok()),
		};

		match output {
			RaceOutput::Command(Some(WatcherMessage::Start { ack })) => {
				let res = if logger.is_some() {
					state = do_start(fd, &mut logger);
					Ok(())
				} else {
					Err(Error::NotReady)
				};

				if ack.send(res).is_err() {
					warn!("Start ack channel closed before receiving response");
				}
			}

			RaceOutput::Command(Some(WatcherMessage::Stop { ack })) => {
				state = do_stop(fd, &mut logger);

				if ack.send(()).is_err() {
					warn!("Stop ack channel closed before receiving response");
				}
			}

			RaceOutput::Command(Some(WatcherMessage::SetLogger {
				logger: new_logger,
				ack,
			})) => {
				logger = Some(new_logger);

				if ack.send(()).is_err() {
					warn!("Logger ack channel closed before receiving response");
				}
			}

			RaceOutput::Command(Some(WatcherMessage::Close { ack })) => {
				do_stop(fd, &mut logger);

				if ack.send(()).is_err() {
					warn!("Close ack channel closed before receiving response");
				}

				// Dropping the source releases the event loop registration.
				return;
			}

			RaceOutput::Command(None) => {
				// Handle dropped without an explicit close; tear down the
				// same way.
				do_stop(fd, &mut logger);

				return;
			}

			RaceOutput::Readable(res) => {
				state = do_stop(fd, &mut logger);

				emit(
					&mut logger,
					&format!("Got some bytes to read from fd {fd}"),
				);

				data_handler.handle_ready(res.map_err(PollError::from));
			}

			RaceOutput::Timeout => {
				state = do_stop(fd, &mut logger);

				match source.probe() {
					Ok(true) => {
						emit(
							&mut logger,
							&format!("Got some bytes to read from fd {fd} by timeout"),
						);

						data_handler.handle_ready(Ok(()));
					}

					Ok(false) => {
						emit(
							&mut logger,
							&format!("Proceed with polling fd {fd} after timeout"),
						);

						state = do_start(fd, &mut logger);
					}

					Err(e) => {
						warn!("Readiness probe failed on fd {fd}: {e}");

						state = do_start(fd, &mut logger);
					}
				}
			}
		}
	}
}

fn do_start(fd: RawFd, logger: &mut Option<Box<dyn LogHandler>>) -> State {
	emit(logger, &format!("Start polling serial port fd {fd}"));

	State::Armed {
		deadline: Instant::now() + POLL_TIMEOUT,
	}
}

fn do_stop(fd: RawFd, logger: &mut Option<Box<dyn LogHandler>>) -> State {
	emit(logger, &format!("Stop polling serial port fd {fd}"));

	State::Stopped
}

fn emit(logger: &mut Option<Box<dyn LogHandler>>, message: &str) {
	trace!("{message}");

	if let Some(logger) = logger {
		logger.log(message);
	}
}
