//! Views of the M_CAN status registers the error path looks at.

use bitfield_struct::bitfield;

/// Error-status bits of the interrupt register (IR)
///
/// Only the bits routed to the error-status notification are named, the rest is padding.
#[bitfield(u32, order = Lsb, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct ErrorStatusEvents {
    #[bits(22)]
    _interrupts: u32,

    /// Error Logging Overflow
    pub error_logging_overflow: bool,

    /// Error Passive
    pub error_passive: bool,

    /// Warning Status: an error counter reached the warning limit of 96
    pub warning_status: bool,

    /// Bus_Off Status
    pub bus_off: bool,

    #[bits(6)]
    _reserved: u8,
}

impl ErrorStatusEvents {
    /// None of the named bits is set.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        !(self.error_logging_overflow()
            || self.error_passive()
            || self.warning_status()
            || self.bus_off())
    }
}

/// Error counter register (ECR)
#[bitfield(u32, order = Lsb, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct ErrorCounters {
    /// Transmit Error Counter
    pub tec: u8,

    /// Receive Error Counter
    #[bits(7)]
    pub rec: u8,

    /// Receive Error Passive
    pub receive_passive: bool,

    /// CAN Error Logging
    pub cel: u8,

    #[bits(8)]
    _reserved: u8,
}
