//! Release handshake between a linked source and its resolution procedure.
//!
//! The resolution body parks on a [`ReleaseWait`] once it has handed the
//! inner cursor over; the source fires the matching [`ReleaseHandle`] after
//! the cursor is drained (or abandoned). Dropping the handle unparks the body
//! too, so a resolution never outlives its consumer.

use futures::channel::oneshot;
use ilorm_core::{ProtocolError, ProtocolErrorKind};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Create a connected release pair.
pub(crate) fn release_pair() -> (ReleaseHandle, ReleaseWait) {
    let (tx, rx) = oneshot::channel();
    (ReleaseHandle { tx: Some(tx) }, ReleaseWait { rx })
}

/// Consumer side: fires the release signal at most once.
#[derive(Debug)]
pub(crate) struct ReleaseHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ReleaseHandle {
    /// Fire the release signal.
    ///
    /// A second call has no effect and reports `DoubleRelease`.
    pub(crate) fn release(&mut self) -> Result<(), ProtocolError> {
        match self.tx.take() {
            Some(tx) => {
                // The body may already be gone; nothing is waiting then.
                let _ = tx.send(());
                Ok(())
            }
            None => Err(ProtocolError::new(
                ProtocolErrorKind::DoubleRelease,
                "resolution procedure already released",
            )),
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.tx.is_none()
    }
}

/// Resolution side: completes on release or when the handle is dropped.
#[derive(Debug)]
pub(crate) struct ReleaseWait {
    rx: oneshot::Receiver<()>,
}

impl Future for ReleaseWait {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}
