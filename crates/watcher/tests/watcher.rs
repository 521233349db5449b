use std::{
	fs::File,
	io::{Read, Write},
	os::fd::{AsRawFd, FromRawFd, OwnedFd},
	sync::{Arc, Mutex},
	time::Duration,
};

use sp_watcher::{Error, PollError, ReadinessWatcher};
use tokio::{sync::mpsc, time::timeout};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

fn nonblocking_pipe() -> (File, File) {
	let mut fds = [0; 2];

	// SAFETY: `fds` is a valid out-buffer for two descriptors.
	assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0, "pipe(2) failed");

	for fd in fds {
		// SAFETY: `fd` was just returned by pipe(2).
		let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
		assert!(flags >= 0, "fcntl(F_GETFL) failed");
		assert!(
			// SAFETY: same descriptor, adding a flag to the ones we read.
			unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } >= 0,
			"fcntl(F_SETFL) failed"
		);
	}

	// SAFETY: both descriptors are open and owned by nothing else yet.
	let (read_end, write_end) = unsafe {
		(
			OwnedFd::from_raw_fd(fds[0]),
			OwnedFd::from_raw_fd(fds[1]),
		)
	};

	(File::from(read_end), File::from(write_end))
}

#[derive(Clone, Default)]
struct Logs(Arc<Mutex<Vec<String>>>);

impl Logs {
	fn handler(&self) -> impl FnMut(&str) + Send + 'static {
		let inner = Arc::clone(&self.0);
		move |message: &str| {
			inner
				.lock()
				.expect("log sink lock poisoned")
				.push(message.to_owned());
		}
	}

	fn contains(&self, line: &str) -> bool {
		self.0
			.lock()
			.expect("log sink lock poisoned")
			.iter()
			.any(|l| l == line)
	}
}

type ReadyReceiver = mpsc::UnboundedReceiver<Result<(), PollError>>;

fn watch(reader: &File) -> (ReadinessWatcher, ReadyReceiver) {
	let (ready_tx, ready_rx) = mpsc::unbounded_channel();

	let watcher = ReadinessWatcher::create(
		reader.as_raw_fd(),
		move |outcome: Result<(), PollError>| {
			ready_tx.send(outcome).ok();
		},
	)
	.expect("failed to create watcher");

	(watcher, ready_rx)
}

async fn expect_notification(ready_rx: &mut ReadyReceiver) -> Result<(), PollError> {
	timeout(NOTIFY_TIMEOUT, ready_rx.recv())
		.await
		.expect("no readiness notification within timeout")
		.expect("watcher dropped the notification channel")
}

#[tokio::test(flavor = "multi_thread")]
async fn notifies_when_bytes_arrive_and_rearms() {
	let (mut reader, mut writer) = nonblocking_pipe();
	let (watcher, mut ready_rx) = watch(&reader);
	let fd = watcher.descriptor();

	let logs = Logs::default();
	watcher
		.set_logger_callback(logs.handler())
		.await
		.expect("failed to register logger");

	writer.write_all(b"ahoy").expect("pipe write failed");

	expect_notification(&mut ready_rx)
		.await
		.expect("readiness should carry no error");

	assert!(logs.contains(&format!("Stop polling serial port fd {fd}")));
	assert!(logs.contains(&format!("Got some bytes to read from fd {fd}")));

	// Observer contract: drain the descriptor, then re-arm for more.
	let mut buf = [0u8; 16];
	let n = reader.read(&mut buf).expect("pipe read failed");
	assert_eq!(&buf[..n], b"ahoy");

	watcher.start().await.expect("failed to re-arm");
	assert!(logs.contains(&format!("Start polling serial port fd {fd}")));

	writer.write_all(b"more").expect("pipe write failed");

	expect_notification(&mut ready_rx)
		.await
		.expect("readiness should carry no error");

	watcher.close().await.expect("failed to close watcher");
}

#[tokio::test(flavor = "multi_thread")]
async fn notifies_for_bytes_buffered_before_creation() {
	let (reader, mut writer) = nonblocking_pipe();

	// The bytes land before the watcher ever registers with the event loop.
	writer.write_all(b"early").expect("pipe write failed");

	let (watcher, mut ready_rx) = watch(&reader);

	expect_notification(&mut ready_rx)
		.await
		.expect("readiness should carry no error");

	watcher.close().await.expect("failed to close watcher");
}

#[tokio::test(flavor = "multi_thread")]
async fn stopped_watcher_stays_silent_until_restarted() {
	let (reader, mut writer) = nonblocking_pipe();
	let (watcher, mut ready_rx) = watch(&reader);

	let logs = Logs::default();
	watcher
		.set_logger_callback(logs.handler())
		.await
		.expect("failed to register logger");

	watcher.stop().await.expect("stop failed");

	writer.write_all(b"unseen").expect("pipe write failed");

	assert!(
		timeout(Duration::from_millis(500), ready_rx.recv())
			.await
			.is_err(),
		"a stopped watcher must not notify"
	);

	watcher.start().await.expect("start failed");

	expect_notification(&mut ready_rx)
		.await
		.expect("readiness should carry no error");

	watcher.close().await.expect("failed to close watcher");
}

#[tokio::test]
async fn negative_descriptor_is_rejected() {
	assert!(matches!(
		ReadinessWatcher::create(-1, |_outcome: Result<(), PollError>| {}),
		Err(Error::InvalidArgument(_))
	));
}
