use crate::bus::{Bus, DEFAULT_CAPACITY};
use crate::error::SlotTaken;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use static_cell::StaticCell;

/// `static` home for a [`Bus`], reachable from interrupt vectors and tasks alike.
///
/// ```ignore
/// static CAN1: BusSlot<Fdcan1Hal, DwtClock> = BusSlot::new();
///
/// let bus = CAN1.init(Bus::new(hal, clock, BusConfig::default()))?;
/// // in the interrupt vector
/// if let Some(bus) = CAN1.get() {
///     bus.on_rx_interrupt();
/// }
/// ```
pub struct BusSlot<H, C, const N: usize = DEFAULT_CAPACITY> {
    cell: StaticCell<Bus<H, C, N>>,
    bus: AtomicPtr<Bus<H, C, N>>,
}

impl<H, C, const N: usize> BusSlot<H, C, N> {
    pub const fn new() -> Self {
        Self {
            cell: StaticCell::new(),
            bus: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<H: Send + Sync, C: Send + Sync, const N: usize> BusSlot<H, C, N> {
    /// Moves `bus` into the slot. Can be called only once, otherwise [`SlotTaken`] is returned.
    pub fn init(&'static self, bus: Bus<H, C, N>) -> Result<&'static Bus<H, C, N>, SlotTaken> {
        let bus: &'static Bus<H, C, N> = self.cell.try_init(bus).ok_or(SlotTaken)?;
        self.bus
            .store(ptr::from_ref(bus).cast_mut(), Ordering::Release);
        Ok(bus)
    }

    /// The bus, once [`init`](Self::init) has run.
    #[inline]
    pub fn get(&'static self) -> Option<&'static Bus<H, C, N>> {
        let bus = self.bus.load(Ordering::Acquire);
        // SAFETY: only ever set to the shared `'static` reference handed out by `init`.
        unsafe { bus.as_ref() }
    }
}

impl<H, C, const N: usize> Default for BusSlot<H, C, N> {
    fn default() -> Self {
        Self::new()
    }
}
