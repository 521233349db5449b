use tokio::sync::oneshot;

use super::{error::Error, handler::LogHandler};

pub(crate) enum WatcherMessage {
	Start {
		ack: oneshot::Sender<Result<(), Error>>,
	},
	Stop {
		ack: oneshot::Sender<()>,
	},
	SetLogger {
		logger: Box<dyn LogHandler>,
		ack: oneshot::Sender<()>,
	},
	Close {
		ack: oneshot::Sender<()>,
	},
}
