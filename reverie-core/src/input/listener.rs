//! Background listener thread shared by the channel-driven producers.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::warn;

/// A named thread that runs until its stop channel fires or its body returns.
pub(crate) struct Listener {
    name: String,
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Listener {
    /// Spawn `body` with the stop receiver it must select on.
    pub(crate) fn spawn<F>(name: impl Into<String>, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, stop_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(stop_rx))?;
        Ok(Self {
            name,
            stop_tx,
            handle,
        })
    }

    /// Signal stop and wait for the thread to exit.
    pub(crate) fn stop(self) {
        // The body may already have returned and dropped the receiver.
        let _ = self.stop_tx.try_send(());
        if self.handle.join().is_err() {
            warn!(listener = self.name.as_str(), "listener thread panicked");
        }
    }
}
