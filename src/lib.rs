//! Shares FDCAN/CAN controllers between independent software modules.
//!
//! Each physical controller is a [`Bus`]. Modules [`register`](Bus::register) logical
//! endpoints on it, each with its own transmit and receive identifier. The first registration
//! (or an explicit [`Bus::bring_up`]) configures the controller: identifier width, receive
//! FIFO, an accept-all filter and a reject-everything-else global filter. Inbound frames are
//! dispatched from the receive interrupt to the first endpoint registered for their
//! identifier; outbound frames wait a bounded time for space in the transmit FIFO.
//!
//! Register access is left to the chip's own driver behind [`hal::CanHal`].
#![cfg_attr(not(test), no_std)]

// This must go FIRST so that all the other modules see its macros.
mod fmt;

#[cfg(feature = "asynchronous")]
pub mod asynchronous;
mod bus;
pub mod config;
mod diagnostics;
mod endpoint;
mod error;
pub mod hal;
mod recovery;
pub mod regs;
mod slot;
pub mod time;
mod tx_rx;
mod util;

pub use bus::{Bus, BusState, DEFAULT_CAPACITY};
pub use config::{BusConfig, RetryPolicy};
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use endpoint::{Endpoint, EndpointConfig, EndpointHandle, Owner, ReceiveHandler, RxSnapshot};
pub use error::{BringUpError, RegistryError, SlotTaken, TransmitError};
pub use recovery::RecoveryAction;
pub use slot::BusSlot;
pub use time::{Clock, DwtClock, Duration, Instant};

/// Largest payload of a transmitted or delivered frame.
pub const MAX_PAYLOAD: usize = 8;

/// Registers an endpoint on `bus`.
///
/// A missing bus or configuration is rejected with [`RegistryError::InvalidConfig`] before
/// anything else happens. Otherwise identical to [`Bus::register`].
pub fn register<'a, H, C, const N: usize>(
    bus: Option<&'a Bus<H, C, N>>,
    config: Option<EndpointConfig>,
) -> Result<EndpointHandle<'a, H, C, N>, RegistryError>
where
    H: hal::CanHal,
    C: Clock,
{
    let (Some(bus), Some(config)) = (bus, config) else {
        warn!("register called without bus or configuration");
        return Err(RegistryError::InvalidConfig);
    };
    bus.register(config)
}
