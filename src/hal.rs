//! Boundary to the vendor register-level driver.
//!
//! The multiplexer never touches controller registers itself. Everything it needs from the
//! peripheral goes through [`CanHal`], which board support code implements on top of whatever
//! driver the chip comes with.

use crate::config::{FrameTransmissionConfig, GlobalFilter, IdWidth, RxFifo};
use crate::regs::ErrorCounters;
use core::fmt;
use embedded_can::Id;

/// Largest payload a controller may hand back from its receive FIFO.
pub const MAX_FD_PAYLOAD: usize = 64;

/// Failure reported by the underlying driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    Error,
    Busy,
    Timeout,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::Error => f.write_str("driver error"),
            HalError::Busy => f.write_str("driver busy"),
            HalError::Timeout => f.write_str("driver timeout"),
        }
    }
}

impl core::error::Error for HalError {}

/// Frame format of a transmitted frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameFormat {
    Classic,
    Fd,
}

/// Error state indicator of a transmitted frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorStateIndicator {
    /// ESI follows the node's error-passive flag
    ErrorActive,
    /// ESI transmitted recessive
    ErrorPassive,
}

/// Whether the controller records a TX event for a transmitted frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxEventControl {
    DontStoreTxEvents,
    StoreTxEvents,
}

/// Header handed to [`CanHal::add_to_tx_fifo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxHeader {
    pub id: Id,
    /// Data length in bytes, 0 to 8
    pub len: u8,
    pub frame_format: FrameFormat,
    pub error_state: ErrorStateIndicator,
    pub bit_rate_switching: bool,
    pub event_control: TxEventControl,
    pub message_marker: u8,
}

impl TxHeader {
    /// Classic data frame with 8 data bytes, error active, no BRS and no TX events.
    pub const fn classic_data(id: Id) -> Self {
        Self {
            id,
            len: 8,
            frame_format: FrameFormat::Classic,
            error_state: ErrorStateIndicator::ErrorActive,
            bit_rate_switching: false,
            event_control: TxEventControl::DontStoreTxEvents,
            message_marker: 0,
        }
    }

    /// Same header with a different data length.
    #[inline]
    pub const fn with_len(mut self, len: u8) -> Self {
        self.len = len;
        self
    }
}

/// Header of a frame read from a receive FIFO.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RxHeader {
    pub id: Id,
    /// Data length in bytes as reported by the controller. May exceed 8 for FD frames.
    pub len: u8,
}

/// Classic ID/mask filter element
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MaskFilter {
    /// Position in the controller's filter list
    pub index: u8,
    pub id_width: IdWidth,
    pub id: u32,
    pub mask: u32,
    /// FIFO receiving matching frames
    pub fifo: RxFifo,
}

impl MaskFilter {
    /// ID and mask both zero: every frame of `id_width` matches.
    pub const fn accept_all(index: u8, id_width: IdWidth, fifo: RxFifo) -> Self {
        Self {
            index,
            id_width,
            id: 0,
            mask: 0,
            fifo,
        }
    }
}

/// Interrupt sources the multiplexer enables on the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notification {
    /// A new frame was stored in the given FIFO
    NewMessage(RxFifo),
    /// Bus-off, error-passive and error-warning status changes
    ErrorStatus,
}

/// Operations the multiplexer consumes from the vendor driver of one controller.
///
/// All methods take `&self`: the same driver is used from task context (bring-up, transmit)
/// and from interrupt context (dispatch, recovery), so implementations must synchronise
/// their own register access where the hardware requires it.
pub trait CanHal {
    /// Frame format the controller was initialised with.
    fn frame_transmission(&self) -> FrameTransmissionConfig;

    /// Number of elements allocated to `fifo` in message RAM.
    fn rx_fifo_elements(&self, fifo: RxFifo) -> u8;

    fn config_filter(&self, filter: &MaskFilter) -> Result<(), HalError>;

    fn config_global_filter(&self, filter: GlobalFilter) -> Result<(), HalError>;

    fn config_fifo_watermark(&self, fifo: RxFifo, watermark: u8) -> Result<(), HalError>;

    /// Leaves initialisation mode and joins the bus.
    fn start(&self) -> Result<(), HalError>;

    fn stop(&self) -> Result<(), HalError>;

    fn activate_notification(&self, notification: Notification) -> Result<(), HalError>;

    /// Free elements in the transmit FIFO.
    fn tx_fifo_free_level(&self) -> u8;

    /// Queues one frame. `data` holds exactly `header.len` bytes.
    fn add_to_tx_fifo(&self, header: &TxHeader, data: &[u8]) -> Result<(), HalError>;

    /// Frames waiting in `fifo`.
    fn rx_fifo_fill_level(&self, fifo: RxFifo) -> u8;

    /// Pops the oldest frame of `fifo`, copying its data into `data`.
    fn read_rx_fifo(
        &self,
        fifo: RxFifo,
        data: &mut [u8; MAX_FD_PAYLOAD],
    ) -> Result<RxHeader, HalError>;

    fn error_counters(&self) -> ErrorCounters;

    /// Clears CCCR.INIT so a bus-off controller starts its recovery sequence.
    fn clear_init(&self);
}
