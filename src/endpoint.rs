use crate::MAX_PAYLOAD;
use crate::bus::Bus;
use crate::config::RxFifo;
use crate::error::TransmitError;
use crate::hal::{CanHal, TxHeader};
use crate::time::{Clock, Duration};
use core::ops::Deref;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU8, AtomicU32, Ordering, fence};
use embedded_can::Id;

/// Callback invoked from the receive interrupt when a frame for an endpoint arrived.
///
/// Runs in interrupt context: it must not block, must finish in bounded time and must not
/// call [`Bus::register`] or a waiting [`Bus::transmit`].
pub trait ReceiveHandler: Sync {
    fn on_receive(&self, endpoint: &Endpoint);
}

impl<F> ReceiveHandler for F
where
    F: Fn(&Endpoint) + Sync,
{
    #[inline]
    fn on_receive(&self, endpoint: &Endpoint) {
        self(endpoint)
    }
}

/// Opaque reference to the module that owns an endpoint.
///
/// Stored and handed back unchanged; the multiplexer never dereferences it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Owner(NonNull<()>);

impl Owner {
    pub fn new<T>(owner: &'static T) -> Self {
        Owner(NonNull::from(owner).cast())
    }

    /// `None` for a null pointer.
    pub fn from_ptr<T>(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr.cast()).map(Owner)
    }

    pub fn as_ptr(&self) -> *mut () {
        self.0.as_ptr()
    }
}

// Never dereferenced by this crate.
unsafe impl Send for Owner {}
unsafe impl Sync for Owner {}

/// What a module passes to [`Bus::register`]
#[derive(Clone, Copy)]
pub struct EndpointConfig {
    /// Name used in log lines
    pub topic: &'static str,
    /// Raw identifier of outgoing frames
    pub tx_id: u32,
    /// Raw identifier of frames delivered to this endpoint
    pub rx_id: u32,
    pub handler: Option<&'static dyn ReceiveHandler>,
    pub owner: Option<Owner>,
}

impl EndpointConfig {
    pub const fn new(topic: &'static str, tx_id: u32, rx_id: u32) -> Self {
        Self {
            topic,
            tx_id,
            rx_id,
            handler: None,
            owner: None,
        }
    }

    /// Sets the receive callback
    #[inline]
    pub const fn set_handler(mut self, handler: &'static dyn ReceiveHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Sets the owner back-reference
    #[inline]
    pub const fn set_owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Last frame received by an endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxSnapshot {
    pub len: u8,
    pub data: [u8; MAX_PAYLOAD],
    /// Number of frames received so far, this one included
    pub sequence: u32,
}

impl RxSnapshot {
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }
}

const SNAPSHOT_READ_ATTEMPTS: usize = 8;

/// Inbound buffer of an endpoint.
///
/// Sequence lock over atomics: the dispatcher is the only writer and makes the sequence odd
/// while it stores; readers retry until they see the same even sequence before and after
/// copying.
pub(crate) struct RxBuffer {
    seq: AtomicU32,
    len: AtomicU8,
    words: [AtomicU32; 2],
}

impl RxBuffer {
    const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            len: AtomicU8::new(0),
            words: [AtomicU32::new(0), AtomicU32::new(0)],
        }
    }

    /// `data` is at most [`MAX_PAYLOAD`] bytes.
    fn store(&self, data: &[u8]) {
        let mut bytes = [0u8; MAX_PAYLOAD];
        bytes[..data.len()].copy_from_slice(data);

        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.len.store(data.len() as u8, Ordering::Relaxed);
        for (word, chunk) in self.words.iter().zip(bytes.chunks_exact(4)) {
            word.store(
                u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                Ordering::Relaxed,
            );
        }

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    fn load(&self) -> Option<RxSnapshot> {
        for _ in 0..SNAPSHOT_READ_ATTEMPTS {
            let before = self.seq.load(Ordering::Acquire);
            if before == 0 {
                return None;
            }
            if before & 1 == 1 {
                core::hint::spin_loop();
                continue;
            }

            let len = self.len.load(Ordering::Relaxed);
            let mut data = [0u8; MAX_PAYLOAD];
            for (chunk, word) in data.chunks_exact_mut(4).zip(self.words.iter()) {
                chunk.copy_from_slice(&word.load(Ordering::Relaxed).to_le_bytes());
            }

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return Some(RxSnapshot {
                    len,
                    data,
                    sequence: before / 2,
                });
            }
        }
        None
    }
}

/// One logical sender/receiver sharing a physical bus.
///
/// Everything except the inbound buffer is fixed at registration.
pub struct Endpoint {
    topic: &'static str,
    owner: Option<Owner>,
    tx_header: TxHeader,
    rx_id: Id,
    rx_fifo: RxFifo,
    handler: Option<&'static dyn ReceiveHandler>,
    rx: RxBuffer,
}

impl Endpoint {
    pub(crate) const fn new(
        config: &EndpointConfig,
        tx_header: TxHeader,
        rx_id: Id,
        rx_fifo: RxFifo,
    ) -> Self {
        Self {
            topic: config.topic,
            owner: config.owner,
            tx_header,
            rx_id,
            rx_fifo,
            handler: config.handler,
            rx: RxBuffer::new(),
        }
    }

    #[inline]
    pub fn topic(&self) -> &'static str {
        self.topic
    }

    #[inline]
    pub fn owner(&self) -> Option<Owner> {
        self.owner
    }

    #[inline]
    pub fn tx_id(&self) -> Id {
        self.tx_header.id
    }

    #[inline]
    pub fn rx_id(&self) -> Id {
        self.rx_id
    }

    #[inline]
    pub fn rx_fifo(&self) -> RxFifo {
        self.rx_fifo
    }

    /// Header template every transmitted frame starts from.
    #[inline]
    pub fn tx_header(&self) -> &TxHeader {
        &self.tx_header
    }

    /// Last received frame, `None` before the first one.
    ///
    /// Also `None` if the dispatcher kept overwriting the buffer while it was copied, which
    /// only happens when frames arrive faster than this call can run.
    #[inline]
    pub fn rx_snapshot(&self) -> Option<RxSnapshot> {
        self.rx.load()
    }

    /// Stores a frame and runs the handler. Dispatcher only.
    pub(crate) fn deliver(&self, data: &[u8]) {
        self.rx.store(data);
        if let Some(handler) = self.handler {
            handler.on_receive(self);
        }
    }
}

/// Registered endpoint together with the bus it lives on
pub struct EndpointHandle<'a, H, C, const N: usize> {
    bus: &'a Bus<H, C, N>,
    index: usize,
}

impl<'a, H, C, const N: usize> EndpointHandle<'a, H, C, N> {
    pub(crate) fn new(bus: &'a Bus<H, C, N>, index: usize) -> Self {
        Self { bus, index }
    }

    /// Position in registration order
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn bus(&self) -> &'a Bus<H, C, N> {
        self.bus
    }

    #[inline]
    pub fn endpoint(&self) -> &'a Endpoint {
        &self.bus.endpoints()[self.index]
    }
}

impl<H: CanHal, C: Clock, const N: usize> EndpointHandle<'_, H, C, N> {
    /// See [`Bus::transmit`]
    #[inline]
    pub fn transmit(&self, payload: &[u8], timeout: Duration) -> Result<(), TransmitError> {
        self.bus.transmit(self.endpoint(), payload, timeout)
    }
}

impl<H, C, const N: usize> Deref for EndpointHandle<'_, H, C, N> {
    type Target = Endpoint;

    fn deref(&self) -> &Endpoint {
        self.endpoint()
    }
}

impl<H, C, const N: usize> Clone for EndpointHandle<'_, H, C, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H, C, const N: usize> Copy for EndpointHandle<'_, H, C, N> {}
