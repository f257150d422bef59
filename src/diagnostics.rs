//! Per-bus traffic and fault counters.
//!
//! Interrupt paths never report errors to a caller; whatever they drop or recover from shows
//! up here instead. All counters are relaxed atomics that wrap on overflow.

use core::sync::atomic::{AtomicU32, Ordering};

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident,)*) => {
        paste::paste! {
            /// Live counters of one bus
            pub struct Diagnostics {
                $($name: AtomicU32,)*
            }

            impl Diagnostics {
                pub const fn new() -> Self {
                    Self {
                        $($name: AtomicU32::new(0),)*
                    }
                }

                $(
                    #[inline]
                    pub(crate) fn [<count_ $name>](&self) {
                        self.$name.fetch_add(1, Ordering::Relaxed);
                    }
                )*

                /// Copies every counter. Counters are read one by one, not as a single atomic unit.
                pub fn snapshot(&self) -> DiagnosticsSnapshot {
                    DiagnosticsSnapshot {
                        $($name: self.$name.load(Ordering::Relaxed),)*
                    }
                }

                pub fn reset(&self) {
                    $(self.$name.store(0, Ordering::Relaxed);)*
                }
            }

            /// Point-in-time copy of [`Diagnostics`]
            #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
            #[cfg_attr(feature = "defmt", derive(defmt::Format))]
            pub struct DiagnosticsSnapshot {
                $($(#[$doc])* pub $name: u32,)*
            }
        }
    };
}

counters! {
    /// Frames delivered to an endpoint
    rx_dispatched,
    /// Frames no endpoint of the drained FIFO was registered for
    rx_unmatched,
    /// Receive interrupts that found a frame before any endpoint was registered
    rx_no_endpoints,
    /// Failed FIFO reads
    rx_read_errors,
    /// Receive interrupts that left frames behind because of the drain limit
    rx_drain_limit_hits,
    /// Frames accepted by the driver
    tx_submitted,
    /// Frames the driver rejected
    tx_busy,
    /// Transmit requests that gave up waiting for FIFO space
    tx_timeouts,
    tx_warnings_logged,
    tx_warnings_suppressed,
    /// Bus-off events answered by clearing INIT
    bus_off_recoveries,
    error_passive_events,
    error_warning_events,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}
