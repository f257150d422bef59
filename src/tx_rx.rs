use crate::MAX_PAYLOAD;
use crate::bus::{Bus, BusState};
use crate::config::RxFifo;
use crate::endpoint::Endpoint;
use crate::error::TransmitError;
use crate::hal::{CanHal, MAX_FD_PAYLOAD};
use crate::time::{Clock, Duration};
use crate::util::raw_id;

macro_rules! rx_fifo_interrupts {
    ($($n:literal => $fifo:ident),*) => {
        paste::paste! {
            $(
                #[doc = concat!("Entry point for the RX FIFO", stringify!($n), " new-message interrupt.")]
                ///
                /// Returns the number of frames delivered.
                #[inline]
                pub fn [<on_rx_fifo $n _interrupt>](&self) -> usize {
                    self.dispatch(RxFifo::$fifo)
                }
            )*
        }
    };
}

impl<H: CanHal, C: Clock, const N: usize> Bus<H, C, N> {
    /// Queues one frame for `endpoint`, waiting up to `timeout` for space in the transmit FIFO.
    ///
    /// The frame uses the endpoint's transmit header with the length of `payload`. Busy-polls;
    /// call from task context only.
    pub fn transmit(
        &self,
        endpoint: &Endpoint,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<(), TransmitError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(TransmitError::PayloadTooLong);
        }
        if self.state() != BusState::Ready {
            return Err(TransmitError::BusUnavailable);
        }

        let start = self.clock.now();
        while self.hal.tx_fifo_free_level() == 0 {
            let elapsed = self.clock.elapsed_since(start);
            if elapsed >= timeout {
                self.diagnostics.count_tx_timeouts();
                self.diagnostics.count_tx_warnings_logged();
                let suppressed = self.tx_throttle.force(self.clock.now());
                warn!(
                    "`{}`: tx fifo still full after {} ms, giving up ({} lines suppressed)",
                    endpoint.topic(),
                    elapsed.to_millis(),
                    suppressed
                );
                return Err(TransmitError::TimedOut);
            }
            if let Some(suppressed) = self.tx_warning() {
                warn!(
                    "`{}`: tx fifo full, waited {} ms ({} lines suppressed)",
                    endpoint.topic(),
                    elapsed.to_millis(),
                    suppressed
                );
            }
        }

        let header = endpoint.tx_header().with_len(payload.len() as u8);
        if let Err(e) = self.hal.add_to_tx_fifo(&header, payload) {
            self.diagnostics.count_tx_busy();
            if let Some(suppressed) = self.tx_warning() {
                warn!(
                    "`{}`: frame {:#x} rejected: {} ({} lines suppressed)",
                    endpoint.topic(),
                    raw_id(header.id),
                    e,
                    suppressed
                );
            }
            return Err(TransmitError::Busy);
        }

        self.diagnostics.count_tx_submitted();
        Ok(())
    }

    /// Asks the throttle whether a transmit warning may be logged now.
    fn tx_warning(&self) -> Option<u32> {
        let verdict = self
            .tx_throttle
            .check(self.clock.now(), self.config.warn_interval);
        match verdict {
            Some(_) => self.diagnostics.count_tx_warnings_logged(),
            None => self.diagnostics.count_tx_warnings_suppressed(),
        }
        verdict
    }

    /// Drains `fifo`, handing each frame to the first endpoint registered for its identifier.
    ///
    /// Stops after [`BusConfig::rx_drain_limit`](crate::config::BusConfig::rx_drain_limit)
    /// frames (at least one), on a read error, or when no endpoint is registered at all. Returns the number
    /// of frames delivered.
    pub fn dispatch(&self, fifo: RxFifo) -> usize {
        let mut budget = self.config.rx_drain_limit.max(1);
        let mut delivered = 0;
        let mut data = [0u8; MAX_FD_PAYLOAD];

        while self.hal.rx_fifo_fill_level(fifo) > 0 {
            if budget == 0 {
                self.diagnostics.count_rx_drain_limit_hits();
                debug!("{}: drain limit reached", fifo);
                break;
            }
            budget -= 1;

            let header = match self.hal.read_rx_fifo(fifo, &mut data) {
                Ok(header) => header,
                Err(e) => {
                    self.diagnostics.count_rx_read_errors();
                    debug!("{}: read failed: {}", fifo, e);
                    break;
                }
            };

            let endpoints = self.endpoints();
            if endpoints.is_empty() {
                self.diagnostics.count_rx_no_endpoints();
                break;
            }

            let len = usize::from(header.len).min(MAX_PAYLOAD);
            match endpoints
                .iter()
                .find(|e| e.rx_fifo() == fifo && e.rx_id() == header.id)
            {
                Some(endpoint) => {
                    endpoint.deliver(&data[..len]);
                    self.diagnostics.count_rx_dispatched();
                    delivered += 1;
                }
                None => {
                    self.diagnostics.count_rx_unmatched();
                    trace!("{}: no endpoint for {:#x}", fifo, raw_id(header.id));
                }
            }
        }
        delivered
    }

    rx_fifo_interrupts!(0 => Fifo0, 1 => Fifo1);

    /// Entry point for a new-message interrupt shared by both FIFOs. Drains the FIFO selected
    /// at bring-up; does nothing before that.
    pub fn on_rx_interrupt(&self) -> usize {
        match self.rx_fifo() {
            Some(fifo) => self.dispatch(fifo),
            None => 0,
        }
    }
}
