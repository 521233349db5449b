use std::{
	fs::{File, OpenOptions},
	io::Read,
	os::{fd::AsRawFd, unix::fs::OpenOptionsExt},
	path::PathBuf,
};

use anyhow::Context;
use clap::Parser;
use sp_watcher::{PollError, ReadinessWatcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Tails a serial device (or any pollable file) and prints whatever arrives.
///
/// Stands in for the reader that normally sits on top of the watcher: drains
/// the descriptor on each notification, then re-arms.
#[derive(Parser)]
#[command(name = "sp-monitor")]
struct Args {
	/// Device to watch, e.g. /dev/ttyUSB0
	device: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let args = Args::parse();

	let mut device = OpenOptions::new()
		.read(true)
		.custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
		.open(&args.device)
		.with_context(|| format!("failed to open {}", args.device.display()))?;

	let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();

	let watcher = ReadinessWatcher::create(
		device.as_raw_fd(),
		move |outcome: Result<(), PollError>| {
			ready_tx.send(outcome).ok();
		},
	)
	.context("failed to create readiness watcher")?;

	watcher
		.set_logger_callback(|message: &str| debug!("{message}"))
		.await
		.context("failed to register logger callback")?;

	info!(
		"Watching {} (fd {})",
		args.device.display(),
		watcher.descriptor()
	);

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => break,
			Some(outcome) = ready_rx.recv() => {
				match outcome {
					Ok(()) => drain(&mut device)?,
					Err(e) => warn!("{e}"),
				}

				watcher.start().await.context("failed to re-arm watcher")?;
			}
		}
	}

	watcher.close().await.context("failed to close watcher")?;

	Ok(())
}

/// Reads everything currently buffered on the descriptor. The descriptor is
/// non-blocking, so this never stalls the loop.
fn drain(device: &mut File) -> anyhow::Result<()> {
	let mut buf = [0u8; 4096];

	loop {
		match device.read(&mut buf) {
			Ok(0) => return Ok(()),
			Ok(n) => info!("{}", String::from_utf8_lossy(&buf[..n]).trim_end()),
			Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
			Err(e) => return Err(e).context("read from device failed"),
		}
	}
}
