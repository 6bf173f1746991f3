use cfgsrc_core::{Event, Handler};
use tokio::sync::mpsc;
use tracing::trace;

/// Handler forwarding every event into an unbounded channel. Never blocks the source.
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<Event>,
}

/// Create a handler and the receiving end of its channel.
pub fn channel() -> (ChannelHandler, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelHandler { tx }, rx)
}

impl Handler for ChannelHandler {
    fn handle(&self, event: &Event) {
        if self.tx.send(event.clone()).is_err() {
            trace!(kind = event.kind().as_str(), "event receiver dropped");
        }
    }
}
