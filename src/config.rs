use crate::time::Duration;
use core::fmt;

/// Frame formats the controller was configured for by the vendor init code.
///
/// The multiplexer only ever transmits classic frames; this setting decides the
/// identifier width the bus is brought up with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameTransmissionConfig {
    /// Only allow Classic CAN message Frames
    ClassicCanOnly,
    /// Allow (non-brs) FdCAN Message Frames
    AllowFdCan,
    /// Allow FdCAN Message Frames and allow Bit Rate Switching
    AllowFdCanAndBRS,
}

/// Identifier width used for filtering, registration checks and transmission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdWidth {
    /// 11-bit identifiers
    Standard,
    /// 29-bit identifiers
    Extended,
}

impl IdWidth {
    /// Classic framing implies standard identifiers, every FD mode implies extended ones.
    pub const fn for_frame_transmission(fts: FrameTransmissionConfig) -> Self {
        match fts {
            FrameTransmissionConfig::ClassicCanOnly => IdWidth::Standard,
            FrameTransmissionConfig::AllowFdCan | FrameTransmissionConfig::AllowFdCanAndBRS => {
                IdWidth::Extended
            }
        }
    }

    /// Largest raw identifier representable in this width.
    pub const fn max_raw(self) -> u32 {
        match self {
            IdWidth::Standard => 0x7FF,
            IdWidth::Extended => 0x1FFF_FFFF,
        }
    }

    pub(crate) const fn into_bits(self) -> u8 {
        match self {
            IdWidth::Standard => 0,
            IdWidth::Extended => 1,
        }
    }

    pub(crate) const fn from_bits(value: u8) -> Option<Self> {
        match value {
            0 => Some(IdWidth::Standard),
            1 => Some(IdWidth::Extended),
            _ => None,
        }
    }
}

impl fmt::Display for IdWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdWidth::Standard => f.write_str("standard"),
            IdWidth::Extended => f.write_str("extended"),
        }
    }
}

/// Receive FIFO of a controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxFifo {
    Fifo0,
    Fifo1,
}

impl RxFifo {
    pub(crate) const fn into_bits(self) -> u8 {
        match self {
            RxFifo::Fifo0 => 0,
            RxFifo::Fifo1 => 1,
        }
    }

    pub(crate) const fn from_bits(value: u8) -> Option<Self> {
        match value {
            0 => Some(RxFifo::Fifo0),
            1 => Some(RxFifo::Fifo1),
            _ => None,
        }
    }
}

impl fmt::Display for RxFifo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RxFifo::Fifo0 => f.write_str("FIFO0"),
            RxFifo::Fifo1 => f.write_str("FIFO1"),
        }
    }
}

/// How to handle frames in the global filter
///
/// Discriminants are the GFC `ANFS`/`ANFE` field encodings; [`CanHal`](crate::hal::CanHal)
/// implementations program them as-is. The bus itself only ever asks for [`Reject`](Self::Reject).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NonMatchingFilter {
    /// Frames will go to Fifo0 when they do no match any specific filter
    IntoRxFifo0 = 0b00,
    /// Frames will go to Fifo1 when they do no match any specific filter
    IntoRxFifo1 = 0b01,
    /// Frames will be rejected when they do not match any specific filter
    Reject = 0b11,
}

/// How to handle frames which do not match a specific filter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GlobalFilter {
    /// How to handle non-matching standard frames
    pub handle_standard_frames: NonMatchingFilter,

    /// How to handle non-matching extended frames
    pub handle_extended_frames: NonMatchingFilter,

    /// How to handle remote standard frames
    pub reject_remote_standard_frames: bool,

    /// How to handle remote extended frames
    pub reject_remote_extended_frames: bool,
}

impl GlobalFilter {
    /// Reject all non-matching and remote frames
    pub const fn reject_all() -> Self {
        Self {
            handle_standard_frames: NonMatchingFilter::Reject,
            handle_extended_frames: NonMatchingFilter::Reject,
            reject_remote_standard_frames: true,
            reject_remote_extended_frames: true,
        }
    }
}

/// Bounded retry applied to every hardware call made during bring-up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero is treated as one.
    pub attempts: u8,
    /// Spin delay between two attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Try exactly once.
    pub const fn no_retry() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::from_ticks(0),
        }
    }

    #[inline]
    pub(crate) const fn max_attempts(&self) -> u8 {
        if self.attempts == 0 { 1 } else { self.attempts }
    }
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::millis(1),
        }
    }
}

/// Per-bus configuration
#[derive(Clone, Copy, Debug)]
pub struct BusConfig {
    /// Index of the accept-all mask filter in the controller's filter list.
    ///
    /// Controllers sharing one filter RAM need distinct indices (bus number is a good choice).
    pub filter_index: u8,
    /// Retry policy for bring-up hardware calls.
    pub retry: RetryPolicy,
    /// Minimum spacing between two transmit warnings of the same bus.
    pub warn_interval: Duration,
    /// Maximum number of frames drained by a single receive interrupt. Zero is treated as one.
    pub rx_drain_limit: u16,
    /// Also activate bus-off, error-passive and warning notifications during bring-up.
    pub error_notifications: bool,
}

impl BusConfig {
    /// Configuration used by [`Default`].
    pub const fn new() -> Self {
        Self {
            filter_index: 0,
            retry: RetryPolicy {
                attempts: 3,
                backoff: Duration::millis(1),
            },
            warn_interval: Duration::millis(100),
            rx_drain_limit: 32,
            error_notifications: true,
        }
    }

    /// Sets the filter element index
    #[inline]
    pub const fn set_filter_index(mut self, index: u8) -> Self {
        self.filter_index = index;
        self
    }

    /// Sets the bring-up retry policy
    #[inline]
    pub const fn set_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the minimum interval between transmit warnings
    #[inline]
    pub const fn set_warn_interval(mut self, interval: Duration) -> Self {
        self.warn_interval = interval;
        self
    }

    /// Sets how many frames one receive interrupt may drain
    #[inline]
    pub const fn set_rx_drain_limit(mut self, limit: u16) -> Self {
        self.rx_drain_limit = limit;
        self
    }

    /// Enables or disables error-status notifications
    #[inline]
    pub const fn set_error_notifications(mut self, enabled: bool) -> Self {
        self.error_notifications = enabled;
        self
    }
}

impl Default for BusConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
