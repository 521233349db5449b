//!
//! # Serial Port Readiness Watcher
//!
//! Watches one already-open descriptor (typically a serial device, but any
//! pollable descriptor works) for "ready to read", combining two mechanisms
//! that are always armed and disarmed together:
//!
//! - an edge-triggered readable watch registered with the event loop;
//! - a fixed 15-second fallback timer that probes the descriptor directly,
//!   catching drivers whose readiness notifications silently stop arriving.
//!
//! Whichever path detects readiness first disarms both and notifies the
//! data callback exactly once; the observer reads the bytes and re-arms with
//! [`ReadinessWatcher::start`]. When the fallback probe finds no data, the
//! watcher re-arms itself instead of notifying.
//!
//! ## Basic example
//!
//! ```no_run
//! use sp_watcher::{PollError, ReadinessWatcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sp_watcher::Error> {
//!     let fd = 7; // an already-open, readable, non-blocking descriptor
//!
//!     let watcher = ReadinessWatcher::create(fd, |outcome: Result<(), PollError>| {
//!         match outcome {
//!             Ok(()) => println!("bytes waiting on the port"),
//!             Err(e) => eprintln!("{e}"),
//!         }
//!     })?;
//!
//!     watcher
//!         .set_logger_callback(|message: &str| println!("{message}"))
//!         .await?;
//!
//!     // ... read from the descriptor on each notification, then re-arm:
//!     watcher.start().await?;
//!
//!     watcher.close().await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
#![cfg(unix)]

mod error;
mod handler;
mod message;
mod source;
mod watcher;

pub use error::{Error, PollError};
pub use handler::{DataHandler, LogHandler};
pub use watcher::ReadinessWatcher;
