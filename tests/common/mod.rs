#![allow(dead_code)]

use canmux::config::{FrameTransmissionConfig, GlobalFilter, RxFifo};
use canmux::hal::{CanHal, HalError, MAX_FD_PAYLOAD, MaskFilter, Notification, RxHeader, TxHeader};
use canmux::regs::ErrorCounters;
use canmux::{Bus, BusConfig, Clock, Endpoint, Instant, ReceiveHandler};
use embedded_can::{ExtendedId, Id, StandardId};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Configuration call observed by the mock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    Filter(MaskFilter),
    GlobalFilter(GlobalFilter),
    Watermark(RxFifo, u8),
    Start,
    Stop,
    Activate(Notification),
}

/// Remaining injected failures per configuration step
#[derive(Default)]
pub struct Failures {
    pub filter: AtomicU32,
    pub global_filter: AtomicU32,
    pub watermark: AtomicU32,
    pub start: AtomicU32,
    pub activate: AtomicU32,
}

fn take_failure(remaining: &AtomicU32) -> Result<(), HalError> {
    remaining
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .map(|_| Err(HalError::Error))
        .unwrap_or(Ok(()))
}

pub struct MockHal {
    pub frame_transmission: FrameTransmissionConfig,
    pub fifo_elements: [u8; 2],
    pub calls: Mutex<Vec<Call>>,
    pub fail: Failures,
    pub tx_free: AtomicU8,
    pub reject_tx: AtomicBool,
    pub sent: Mutex<Vec<(TxHeader, Vec<u8>)>>,
    pub rx: [Mutex<VecDeque<(RxHeader, Vec<u8>)>>; 2],
    pub fail_reads: AtomicBool,
    pub clear_init_calls: AtomicUsize,
    pub ecr: AtomicU32,
    /// While set, `start` spins after recording itself and raising `in_start`
    pub hold_start: AtomicBool,
    pub in_start: AtomicBool,
}

impl MockHal {
    pub fn new(frame_transmission: FrameTransmissionConfig, fifo_elements: [u8; 2]) -> Self {
        Self {
            frame_transmission,
            fifo_elements,
            calls: Mutex::new(Vec::new()),
            fail: Failures::default(),
            tx_free: AtomicU8::new(3),
            reject_tx: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            rx: [Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new())],
            fail_reads: AtomicBool::new(false),
            clear_init_calls: AtomicUsize::new(0),
            ecr: AtomicU32::new(0),
            hold_start: AtomicBool::new(false),
            in_start: AtomicBool::new(false),
        }
    }

    /// Classic CAN controller with elements in FIFO0 only
    pub fn classic() -> Self {
        Self::new(FrameTransmissionConfig::ClassicCanOnly, [8, 0])
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn sent(&self) -> Vec<(TxHeader, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn push_rx(&self, fifo: RxFifo, id: Id, data: &[u8]) {
        let header = RxHeader {
            id,
            len: data.len() as u8,
        };
        self.push_rx_raw(fifo, header, data);
    }

    pub fn push_rx_raw(&self, fifo: RxFifo, header: RxHeader, data: &[u8]) {
        self.rx[fifo_index(fifo)]
            .lock()
            .unwrap()
            .push_back((header, data.to_vec()));
    }

    pub fn rx_pending(&self, fifo: RxFifo) -> usize {
        self.rx[fifo_index(fifo)].lock().unwrap().len()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn fifo_index(fifo: RxFifo) -> usize {
    match fifo {
        RxFifo::Fifo0 => 0,
        RxFifo::Fifo1 => 1,
    }
}

impl CanHal for MockHal {
    fn frame_transmission(&self) -> FrameTransmissionConfig {
        self.frame_transmission
    }

    fn rx_fifo_elements(&self, fifo: RxFifo) -> u8 {
        self.fifo_elements[fifo_index(fifo)]
    }

    fn config_filter(&self, filter: &MaskFilter) -> Result<(), HalError> {
        self.record(Call::Filter(*filter));
        take_failure(&self.fail.filter)
    }

    fn config_global_filter(&self, filter: GlobalFilter) -> Result<(), HalError> {
        self.record(Call::GlobalFilter(filter));
        take_failure(&self.fail.global_filter)
    }

    fn config_fifo_watermark(&self, fifo: RxFifo, watermark: u8) -> Result<(), HalError> {
        self.record(Call::Watermark(fifo, watermark));
        take_failure(&self.fail.watermark)
    }

    fn start(&self) -> Result<(), HalError> {
        self.record(Call::Start);
        self.in_start.store(true, Ordering::SeqCst);
        while self.hold_start.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        take_failure(&self.fail.start)
    }

    fn stop(&self) -> Result<(), HalError> {
        self.record(Call::Stop);
        Ok(())
    }

    fn activate_notification(&self, notification: Notification) -> Result<(), HalError> {
        self.record(Call::Activate(notification));
        take_failure(&self.fail.activate)
    }

    fn tx_fifo_free_level(&self) -> u8 {
        self.tx_free.load(Ordering::Relaxed)
    }

    fn add_to_tx_fifo(&self, header: &TxHeader, data: &[u8]) -> Result<(), HalError> {
        if self.reject_tx.load(Ordering::Relaxed) {
            return Err(HalError::Busy);
        }
        self.sent.lock().unwrap().push((*header, data.to_vec()));
        Ok(())
    }

    fn rx_fifo_fill_level(&self, fifo: RxFifo) -> u8 {
        self.rx_pending(fifo) as u8
    }

    fn read_rx_fifo(
        &self,
        fifo: RxFifo,
        data: &mut [u8; MAX_FD_PAYLOAD],
    ) -> Result<RxHeader, HalError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(HalError::Error);
        }
        let (header, payload) = self.rx[fifo_index(fifo)]
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(HalError::Error)?;
        data[..payload.len()].copy_from_slice(&payload);
        Ok(header)
    }

    fn error_counters(&self) -> ErrorCounters {
        ErrorCounters::from_bits(self.ecr.load(Ordering::Relaxed))
    }

    fn clear_init(&self) {
        self.clear_init_calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// Clock that moves forward by `step_us` every time it is read
pub struct MockClock {
    now_us: AtomicU64,
    step_us: u64,
}

impl MockClock {
    pub fn new(step_us: u64) -> Self {
        Self {
            now_us: AtomicU64::new(0),
            step_us,
        }
    }

    /// Current time without advancing.
    pub fn peek(&self) -> Instant {
        Instant::from_ticks(self.now_us.load(Ordering::Relaxed))
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.now_us.fetch_add(self.step_us, Ordering::Relaxed))
    }
}

pub type TestBus = Bus<MockHal, MockClock>;

/// Classic bus whose clock advances 1 ms per read
pub fn classic_bus() -> TestBus {
    Bus::new(MockHal::classic(), MockClock::new(1_000), BusConfig::default())
}

pub fn bus_with(hal: MockHal, config: BusConfig) -> TestBus {
    Bus::new(hal, MockClock::new(1_000), config)
}

pub fn sid(raw: u16) -> Id {
    Id::Standard(StandardId::new(raw).unwrap())
}

pub fn eid(raw: u32) -> Id {
    Id::Extended(ExtendedId::new(raw).unwrap())
}

/// Handler counting its invocations
pub struct Counter(pub AtomicUsize);

impl Counter {
    pub fn leak() -> &'static Counter {
        Box::leak(Box::new(Counter(AtomicUsize::new(0))))
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl ReceiveHandler for Counter {
    fn on_receive(&self, _endpoint: &Endpoint) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}
