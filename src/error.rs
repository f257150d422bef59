use core::fmt;

/// Reasons bring-up of a bus can fail. Once returned, the bus stays failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BringUpError {
    /// Neither receive FIFO has elements allocated
    NoFifoAvailable,
    /// Filter, global filter or watermark setup kept failing
    FilterConfigError,
    /// The controller could not be started or its notifications enabled
    BusStartError,
    /// Another context is bringing the bus up right now
    BusUnavailable,
}

impl BringUpError {
    pub(crate) const fn into_bits(self) -> u8 {
        match self {
            BringUpError::NoFifoAvailable => 0,
            BringUpError::FilterConfigError => 1,
            BringUpError::BusStartError => 2,
            BringUpError::BusUnavailable => 3,
        }
    }

    pub(crate) const fn from_bits(value: u8) -> Self {
        match value {
            0 => BringUpError::NoFifoAvailable,
            1 => BringUpError::FilterConfigError,
            2 => BringUpError::BusStartError,
            _ => BringUpError::BusUnavailable,
        }
    }
}

impl fmt::Display for BringUpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BringUpError::NoFifoAvailable => f.write_str("no receive FIFO available"),
            BringUpError::FilterConfigError => f.write_str("filter configuration failed"),
            BringUpError::BusStartError => f.write_str("controller start failed"),
            BringUpError::BusUnavailable => f.write_str("bus unavailable"),
        }
    }
}

impl core::error::Error for BringUpError {}

/// Errors returned by endpoint registration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// Bus or configuration missing, or an identifier does not fit the bus's width
    InvalidConfig,
    /// The bus already holds its maximum number of endpoints
    RegistryFull,
    /// Another registration on the same bus has not finished
    RegistrationInProgress,
    /// Bring-up run by this registration found no receive FIFO
    NoFifoAvailable,
    /// Bring-up run by this registration could not configure the filters
    FilterConfigError,
    /// Bring-up run by this registration could not start the controller
    BusStartError,
    /// Bring-up failed earlier or is running elsewhere; see [`Bus::state`](crate::Bus::state)
    BusUnavailable,
}

impl From<BringUpError> for RegistryError {
    fn from(e: BringUpError) -> Self {
        match e {
            BringUpError::NoFifoAvailable => RegistryError::NoFifoAvailable,
            BringUpError::FilterConfigError => RegistryError::FilterConfigError,
            BringUpError::BusStartError => RegistryError::BusStartError,
            BringUpError::BusUnavailable => RegistryError::BusUnavailable,
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidConfig => f.write_str("invalid endpoint configuration"),
            RegistryError::RegistryFull => f.write_str("endpoint registry full"),
            RegistryError::RegistrationInProgress => {
                f.write_str("concurrent registration on the same bus")
            }
            RegistryError::NoFifoAvailable => f.write_str("no receive FIFO available"),
            RegistryError::FilterConfigError => f.write_str("filter configuration failed"),
            RegistryError::BusStartError => f.write_str("controller start failed"),
            RegistryError::BusUnavailable => f.write_str("bus unavailable"),
        }
    }
}

impl core::error::Error for RegistryError {}

/// Errors returned by a transmit request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitError {
    /// The transmit FIFO stayed full for the whole timeout
    TimedOut,
    /// The driver rejected the frame
    Busy,
    /// More than 8 data bytes
    PayloadTooLong,
    /// The bus is not brought up
    BusUnavailable,
}

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmitError::TimedOut => f.write_str("transmit timed out"),
            TransmitError::Busy => f.write_str("transmit FIFO busy"),
            TransmitError::PayloadTooLong => f.write_str("payload longer than 8 bytes"),
            TransmitError::BusUnavailable => f.write_str("bus unavailable"),
        }
    }
}

impl core::error::Error for TransmitError {}

/// A [`BusSlot`](crate::BusSlot) was initialised twice
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotTaken;

impl fmt::Display for SlotTaken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("bus slot already initialised")
    }
}

impl core::error::Error for SlotTaken {}
