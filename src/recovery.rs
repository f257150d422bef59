use crate::bus::Bus;
use crate::hal::CanHal;
use crate::regs::ErrorStatusEvents;
use crate::time::Clock;

/// What the error-status handler did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecoveryAction {
    /// No error-status bit was set
    Nothing,
    /// Error-passive or warning state seen; counted and logged only
    Observed,
    /// Bus-off seen; INIT was cleared so the controller runs its recovery sequence
    BusOffRecovery,
}

impl<H: CanHal, C: Clock, const N: usize> Bus<H, C, N> {
    /// Entry point for the error-status interrupt.
    ///
    /// Never blocks. Registered endpoints and the bus state survive a bus-off, so traffic
    /// resumes once the controller has seen 128 occurrences of 11 recessive bits.
    pub fn on_error_status_interrupt(&self, events: ErrorStatusEvents) -> RecoveryAction {
        let mut action = RecoveryAction::Nothing;

        if events.error_passive() {
            self.diagnostics.count_error_passive_events();
            action = RecoveryAction::Observed;
        }
        if events.warning_status() {
            self.diagnostics.count_error_warning_events();
            action = RecoveryAction::Observed;
        }

        if events.bus_off() {
            self.hal.clear_init();
            self.diagnostics.count_bus_off_recoveries();
            action = RecoveryAction::BusOffRecovery;
        }

        if action != RecoveryAction::Nothing {
            let counters = self.hal.error_counters();
            warn!(
                "error status: bus-off {}, passive {}, warning {} (tec {}, rec {})",
                events.bus_off(),
                events.error_passive(),
                events.warning_status(),
                counters.tec(),
                counters.rec()
            );
        }
        action
    }
}
