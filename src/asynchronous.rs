//! Wakes async tasks from the receive interrupt.

use crate::endpoint::{Endpoint, ReceiveHandler, RxSnapshot};
use core::future::poll_fn;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll};
use embassy_sync::waitqueue::AtomicWaker;

/// Receive handler that wakes one waiting task per endpoint.
///
/// ```ignore
/// static TELEMETRY_RX: RxNotifier = RxNotifier::new();
///
/// let handle = bus.register(EndpointConfig::new("telemetry", 0x200, 0x1FF).set_handler(&TELEMETRY_RX))?;
/// loop {
///     let frame = TELEMETRY_RX.receive(&handle).await;
/// }
/// ```
pub struct RxNotifier {
    waker: AtomicWaker,
    pending: AtomicBool,
}

impl RxNotifier {
    pub const fn new() -> Self {
        Self {
            waker: AtomicWaker::new(),
            pending: AtomicBool::new(false),
        }
    }

    /// Ready once a frame arrived since the last time this returned ready.
    pub fn poll_wait(&self, cx: &mut Context<'_>) -> Poll<()> {
        self.waker.register(cx.waker());
        if self.pending.swap(false, Ordering::AcqRel) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    /// Waits for the next frame.
    pub async fn wait(&self) {
        poll_fn(|cx| self.poll_wait(cx)).await
    }

    /// Waits for the next frame of `endpoint` and returns it.
    pub async fn receive(&self, endpoint: &Endpoint) -> RxSnapshot {
        loop {
            self.wait().await;
            if let Some(snapshot) = endpoint.rx_snapshot() {
                return snapshot;
            }
        }
    }
}

impl Default for RxNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveHandler for RxNotifier {
    fn on_receive(&self, _endpoint: &Endpoint) {
        self.pending.store(true, Ordering::Release);
        self.waker.wake();
    }
}
