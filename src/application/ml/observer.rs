use crate::domain::ml::EpochEvent;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Receives per-epoch progress from the trainer.
///
/// Called on the training thread, so implementations must not block for long.
pub trait TrainingObserver: Send + Sync {
    fn on_epoch_end(&self, event: &EpochEvent);
}

/// Writes every epoch to the debug log
pub struct LoggingObserver;

impl TrainingObserver for LoggingObserver {
    fn on_epoch_end(&self, event: &EpochEvent) {
        match event.val_loss {
            Some(val_loss) => debug!(
                "Epoch {}/{}: loss = {:.6}, val_loss = {:.6}",
                event.epoch, event.total_epochs, event.loss, val_loss
            ),
            None => debug!(
                "Epoch {}/{}: loss = {:.6}",
                event.epoch, event.total_epochs, event.loss
            ),
        }
    }
}

pub struct NullObserver;

impl TrainingObserver for NullObserver {
    fn on_epoch_end(&self, _event: &EpochEvent) {}
}

/// Forwards epochs into an unbounded channel; see [`progress_channel`].
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<EpochEvent>,
}

impl TrainingObserver for ChannelObserver {
    fn on_epoch_end(&self, event: &EpochEvent) {
        // Receiver gone means nobody is watching anymore
        let _ = self.tx.send(*event);
    }
}

/// An observer paired with the stream of events it publishes.
///
/// The stream ends once the observer (and every clone of the request holding it) is dropped.
pub fn progress_channel() -> (ChannelObserver, BoxStream<'static, EpochEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .boxed();
    (ChannelObserver { tx }, events)
}

/// Shared stop request, checked by the trainer between epochs
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
