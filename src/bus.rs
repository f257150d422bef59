use crate::config::{BusConfig, GlobalFilter, IdWidth, RxFifo};
use crate::diagnostics::Diagnostics;
use crate::endpoint::{Endpoint, EndpointConfig, EndpointHandle};
use crate::error::{BringUpError, RegistryError};
use crate::hal::{CanHal, MaskFilter, Notification, TxHeader};
use crate::time::{Clock, LogThrottle};
use crate::util::{make_id, raw_id, retry};
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Endpoints per bus unless the bus type says otherwise.
pub const DEFAULT_CAPACITY: usize = 16;

const NOT_STARTED: u8 = 0;
const CONFIGURING: u8 = 1;
const READY: u8 = 2;
const FAILED: u8 = 0x10;

const UNSET: u8 = 0xFF;

/// Bring-up progress of a bus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    NotStarted,
    Configuring,
    Ready,
    Failed(BringUpError),
}

impl BusState {
    const fn from_bits(value: u8) -> Self {
        match value {
            NOT_STARTED => BusState::NotStarted,
            CONFIGURING => BusState::Configuring,
            READY => BusState::Ready,
            v => BusState::Failed(BringUpError::from_bits(v.wrapping_sub(FAILED))),
        }
    }
}

/// Releases the registration guard on every exit path.
struct WriterGuard<'a>(&'a AtomicBool);

impl<'a> WriterGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| WriterGuard(flag))
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One physical CAN controller shared by up to `N` endpoints.
///
/// Endpoints are appended by [`Bus::register`] from task context and read by the dispatcher
/// from interrupt context. Slots below the published length are never written again, so
/// readers need no lock.
pub struct Bus<H, C, const N: usize = DEFAULT_CAPACITY> {
    pub(crate) hal: H,
    pub(crate) clock: C,
    pub(crate) config: BusConfig,
    state: AtomicU8,
    id_width: AtomicU8,
    rx_fifo: AtomicU8,
    endpoints: [UnsafeCell<MaybeUninit<Endpoint>>; N],
    len: AtomicUsize,
    registering: AtomicBool,
    pub(crate) tx_throttle: LogThrottle,
    pub(crate) diagnostics: Diagnostics,
}

// Endpoint slots are written once by the guarded writer before `len` is released past them.
unsafe impl<H: Sync, C: Sync, const N: usize> Sync for Bus<H, C, N> {}

impl<H, C, const N: usize> Bus<H, C, N> {
    pub const fn new(hal: H, clock: C, config: BusConfig) -> Self {
        Self {
            hal,
            clock,
            config,
            state: AtomicU8::new(NOT_STARTED),
            id_width: AtomicU8::new(UNSET),
            rx_fifo: AtomicU8::new(UNSET),
            endpoints: [const { UnsafeCell::new(MaybeUninit::uninit()) }; N],
            len: AtomicUsize::new(0),
            registering: AtomicBool::new(false),
            tx_throttle: LogThrottle::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    #[inline]
    pub fn hal(&self) -> &H {
        &self.hal
    }

    #[inline]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[inline]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> BusState {
        BusState::from_bits(self.state.load(Ordering::Acquire))
    }

    /// Identifier width, known once bring-up got past its first step.
    #[inline]
    pub fn id_width(&self) -> Option<IdWidth> {
        IdWidth::from_bits(self.id_width.load(Ordering::Acquire))
    }

    /// Receive FIFO every endpoint of this bus listens on, known once selected.
    #[inline]
    pub fn rx_fifo(&self) -> Option<RxFifo> {
        RxFifo::from_bits(self.rx_fifo.load(Ordering::Acquire))
    }

    /// Registered endpoints in registration order.
    pub fn endpoints(&self) -> &[Endpoint] {
        let len = self.len.load(Ordering::Acquire);
        // SAFETY: slots `0..len` were initialised before `len` was released and are never
        // written again. `UnsafeCell<MaybeUninit<Endpoint>>` has the layout of `Endpoint`.
        unsafe { core::slice::from_raw_parts(self.endpoints.as_ptr().cast::<Endpoint>(), len) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

impl<H: CanHal, C: Clock, const N: usize> Bus<H, C, N> {
    /// Configures and starts the controller. Runs at most once per bus.
    ///
    /// Returns `Ok` on a bus that is already up, the stored cause on a bus whose bring-up
    /// failed, and [`BringUpError::BusUnavailable`] while another context is configuring it.
    pub fn bring_up(&self) -> Result<(), BringUpError> {
        if let Err(current) = self.state.compare_exchange(
            NOT_STARTED,
            CONFIGURING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match BusState::from_bits(current) {
                BusState::Ready => Ok(()),
                BusState::Failed(e) => Err(e),
                _ => Err(BringUpError::BusUnavailable),
            };
        }

        match self.configure() {
            Ok(()) => {
                self.state.store(READY, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                error!("bus bring-up failed: {}", e);
                self.state.store(FAILED + e.into_bits(), Ordering::Release);
                Err(e)
            }
        }
    }

    fn configure(&self) -> Result<(), BringUpError> {
        let width = IdWidth::for_frame_transmission(self.hal.frame_transmission());
        self.id_width.store(width.into_bits(), Ordering::Release);

        let fifo = self.select_fifo()?;
        self.rx_fifo.store(fifo.into_bits(), Ordering::Release);

        let policy = self.config.retry;
        let filter = MaskFilter::accept_all(self.config.filter_index, width, fifo);
        retry(&self.clock, policy, "filter config", || {
            self.hal.config_filter(&filter)
        })
        .map_err(|_| BringUpError::FilterConfigError)?;
        retry(&self.clock, policy, "global filter config", || {
            self.hal.config_global_filter(GlobalFilter::reject_all())
        })
        .map_err(|_| BringUpError::FilterConfigError)?;
        retry(&self.clock, policy, "fifo watermark config", || {
            self.hal.config_fifo_watermark(fifo, 1)
        })
        .map_err(|_| BringUpError::FilterConfigError)?;

        retry(&self.clock, policy, "controller start", || self.hal.start())
            .map_err(|_| BringUpError::BusStartError)?;
        if let Err(e) = self.activate_notifications(fifo) {
            if self.hal.stop().is_err() {
                warn!("controller stop after failed activation failed");
            }
            return Err(e);
        }

        info!(
            "bus up: {} ids, {}, filter #{}",
            width,
            fifo,
            self.config.filter_index
        );
        Ok(())
    }

    fn select_fifo(&self) -> Result<RxFifo, BringUpError> {
        if self.hal.rx_fifo_elements(RxFifo::Fifo0) != 0 {
            Ok(RxFifo::Fifo0)
        } else if self.hal.rx_fifo_elements(RxFifo::Fifo1) != 0 {
            Ok(RxFifo::Fifo1)
        } else {
            Err(BringUpError::NoFifoAvailable)
        }
    }

    fn activate_notifications(&self, fifo: RxFifo) -> Result<(), BringUpError> {
        let policy = self.config.retry;
        retry(&self.clock, policy, "new message notification", || {
            self.hal
                .activate_notification(Notification::NewMessage(fifo))
        })
        .map_err(|_| BringUpError::BusStartError)?;
        if self.config.error_notifications {
            retry(&self.clock, policy, "error status notification", || {
                self.hal.activate_notification(Notification::ErrorStatus)
            })
            .map_err(|_| BringUpError::BusStartError)?;
        }
        Ok(())
    }

    /// Adds an endpoint, bringing the bus up first if nobody did yet.
    ///
    /// Task context only. Registration is expected to finish before traffic for the new
    /// endpoint starts; frames arriving earlier are dropped as unmatched.
    ///
    /// If this call runs a bring-up that fails, the cause is returned (`NoFifoAvailable`,
    /// `FilterConfigError` or `BusStartError`). Every later call returns `BusUnavailable`.
    pub fn register(
        &self,
        config: EndpointConfig,
    ) -> Result<EndpointHandle<'_, H, C, N>, RegistryError> {
        let _guard =
            WriterGuard::acquire(&self.registering).ok_or(RegistryError::RegistrationInProgress)?;

        // The call that ran the failing bring-up reports its cause, later ones only see a dead bus.
        if let BusState::Failed(cause) = self.state() {
            warn!("cannot register `{}`: bus failed earlier: {}", config.topic, cause);
            return Err(RegistryError::BusUnavailable);
        }
        if let Err(cause) = self.bring_up() {
            warn!("cannot register `{}`: {}", config.topic, cause);
            return Err(cause.into());
        }
        let width = self.id_width().ok_or(RegistryError::BusUnavailable)?;
        let fifo = self.rx_fifo().ok_or(RegistryError::BusUnavailable)?;

        let (Some(tx_id), Some(rx_id)) = (make_id(config.tx_id, width), make_id(config.rx_id, width))
        else {
            warn!(
                "`{}`: ids {:#x}/{:#x} do not fit {} width",
                config.topic,
                config.tx_id,
                config.rx_id,
                width
            );
            return Err(RegistryError::InvalidConfig);
        };

        let len = self.len.load(Ordering::Relaxed);
        if len >= N {
            warn!("`{}`: bus full ({} endpoints)", config.topic, N);
            return Err(RegistryError::RegistryFull);
        }

        if let Some(first) = self.endpoints().iter().find(|e| e.rx_id() == rx_id) {
            warn!(
                "`{}`: rx id {:#x} already used by `{}`, frames go to the first one",
                config.topic,
                config.rx_id,
                first.topic()
            );
        }

        let endpoint = Endpoint::new(&config, TxHeader::classic_data(tx_id), rx_id, fifo);
        // SAFETY: the guard makes this the only writer and slot `len` is not yet published.
        unsafe { (*self.endpoints[len].get()).write(endpoint) };
        self.len.store(len + 1, Ordering::Release);

        info!(
            "registered `{}` #{}: tx {:#x}, rx {:#x}",
            config.topic,
            len,
            raw_id(tx_id),
            raw_id(rx_id)
        );
        Ok(EndpointHandle::new(self, len))
    }
}
