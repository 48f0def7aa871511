//! Fakes shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, Operation};

use crate::battery::Health;
use crate::charger::{AdapterSource, Adapters, ChargerBackend, InterruptSummary};
use crate::host::{Host, SupplyType, UsbSupply};
use crate::sampling::SamplingSource;
use crate::Error;

/// A delay that yields once and records what was asked for.
#[derive(Clone, Default)]
pub struct RecordingDelay {
    total_ns: Rc<Cell<u64>>,
    waits_ms: Rc<RefCell<Vec<u32>>>,
}

impl RecordingDelay {
    pub fn total_ns(&self) -> u64 {
        self.total_ns.get()
    }

    pub fn waits_ms(&self) -> Vec<u32> {
        self.waits_ms.borrow().clone()
    }
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ns.set(self.total_ns.get() + ns as u64);
        embassy_futures::yield_now().await;
    }

    async fn delay_us(&mut self, us: u32) {
        self.total_ns.set(self.total_ns.get() + us as u64 * 1000);
        embassy_futures::yield_now().await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.total_ns.set(self.total_ns.get() + ms as u64 * 1_000_000);
        self.waits_ms.borrow_mut().push(ms);
        embassy_futures::yield_now().await;
    }
}

#[derive(Default)]
struct SamplerScript {
    voltage_uv: Cell<i32>,
    ntc_uv: Cell<i32>,
    voltage_reads: Cell<usize>,
    temperature_reads: Cell<usize>,
    voltage_fail_after: Cell<Option<usize>>,
    temperature_fail_after: Cell<Option<usize>>,
}

/// A sampling source returning fixed readings, with optional failures.
#[derive(Clone, Default)]
pub struct ScriptedSampler(Rc<SamplerScript>);

impl ScriptedSampler {
    pub fn new(voltage_uv: i32, ntc_uv: i32) -> Self {
        let sampler = ScriptedSampler::default();
        sampler.0.voltage_uv.set(voltage_uv);
        sampler.0.ntc_uv.set(ntc_uv);
        sampler
    }

    pub fn fail_voltage_after(&self, reads: usize) {
        self.0.voltage_fail_after.set(Some(reads));
    }

    pub fn fail_temperature_after(&self, reads: usize) {
        self.0.temperature_fail_after.set(Some(reads));
    }

    pub fn voltage_reads(&self) -> usize {
        self.0.voltage_reads.get()
    }
}

impl SamplingSource for ScriptedSampler {
    async fn read_voltage(&mut self) -> Result<i32, Error> {
        let n = self.0.voltage_reads.get();
        if self.0.voltage_fail_after.get().is_some_and(|limit| n >= limit) {
            return Err(Error::Hardware);
        }
        self.0.voltage_reads.set(n + 1);
        Ok(self.0.voltage_uv.get())
    }

    async fn read_temperature(&mut self) -> Result<i32, Error> {
        let n = self.0.temperature_reads.get();
        if self.0.temperature_fail_after.get().is_some_and(|limit| n >= limit) {
            return Err(Error::Hardware);
        }
        self.0.temperature_reads.set(n + 1);
        Ok(self.0.ntc_uv.get())
    }
}

/// A platform host that records every call.
#[derive(Default)]
pub struct RecordingHost {
    registered: RefCell<Vec<String>>,
    unregistered: RefCell<Vec<String>>,
    changed: Cell<usize>,
    awake: Cell<bool>,
    awake_calls: Cell<usize>,
    relax_calls: Cell<usize>,
    reject: Cell<bool>,
}

impl RecordingHost {
    pub fn reject_registration(&self) {
        self.reject.set(true);
    }

    pub fn registered(&self) -> Vec<String> {
        self.registered.borrow().clone()
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.unregistered.borrow().clone()
    }

    pub fn changed_count(&self) -> usize {
        self.changed.get()
    }

    pub fn is_awake(&self) -> bool {
        self.awake.get()
    }

    pub fn awake_calls(&self) -> usize {
        self.awake_calls.get()
    }

    pub fn relax_calls(&self) -> usize {
        self.relax_calls.get()
    }
}

impl Host for RecordingHost {
    fn register_power_supply(&self, name: &str) -> Result<(), Error> {
        if self.reject.get() {
            return Err(Error::RegistrationFailed);
        }
        self.registered.borrow_mut().push(name.into());
        Ok(())
    }

    fn unregister_power_supply(&self, name: &str) {
        self.unregistered.borrow_mut().push(name.into());
    }

    fn power_supply_changed(&self, _name: &str) {
        self.changed.set(self.changed.get() + 1);
    }

    fn stay_awake(&self, _name: &str) {
        self.awake.set(true);
        self.awake_calls.set(self.awake_calls.get() + 1);
    }

    fn relax(&self, _name: &str) {
        self.awake.set(false);
        self.relax_calls.set(self.relax_calls.get() + 1);
    }
}

/// A charger backend with fixed inputs that records what it was told.
#[derive(Default)]
pub struct FakeBackend {
    sources: RefCell<Vec<u32>>,
    enables: RefCell<Vec<bool>>,
    programmed: RefCell<Vec<u32>>,
    fail_limit: Cell<bool>,
    interrupts: RefCell<VecDeque<InterruptSummary>>,
}

impl FakeBackend {
    pub fn with_sources(sources: &[u32]) -> Self {
        let backend = FakeBackend::default();
        *backend.sources.borrow_mut() = sources.to_vec();
        backend
    }

    pub fn enables(&self) -> Vec<bool> {
        self.enables.borrow().clone()
    }

    pub fn programmed(&self) -> Vec<u32> {
        self.programmed.borrow().clone()
    }

    pub fn fail_current_limit(&self, fail: bool) {
        self.fail_limit.set(fail);
    }

    pub fn queue_interrupt(&self, summary: InterruptSummary) {
        self.interrupts.borrow_mut().push_back(summary);
    }
}

impl ChargerBackend for FakeBackend {
    async fn enable_charging(&self, enable: bool) -> Result<(), Error> {
        self.enables.borrow_mut().push(enable);
        Ok(())
    }

    async fn set_current_limit(&self, ma: u32) -> Result<(), Error> {
        if self.fail_limit.get() {
            return Err(Error::Hardware);
        }
        self.programmed.borrow_mut().push(ma);
        Ok(())
    }

    async fn adapters(&self) -> Adapters {
        let mut adapters: Adapters = [None; 4];
        for (slot, &max_ma) in adapters.iter_mut().zip(self.sources.borrow().iter()) {
            *slot = Some(AdapterSource { name: "fake", max_ma });
        }
        adapters
    }

    async fn handle_interrupt(&self) -> InterruptSummary {
        self.interrupts.borrow_mut().pop_front().unwrap_or_default()
    }
}

/// An I2C device backed by a 256-byte register file.
///
/// A single-byte write sets the register pointer, longer writes store data from it, and
/// reads return data from it.
#[derive(Clone)]
pub struct FakeRegisters {
    regs: Rc<RefCell<[u8; 256]>>,
    writes: Rc<RefCell<Vec<(u8, u8)>>>,
    failures: Rc<Cell<usize>>,
    transactions: Rc<Cell<usize>>,
}

impl Default for FakeRegisters {
    fn default() -> Self {
        FakeRegisters {
            regs: Rc::new(RefCell::new([0; 256])),
            writes: Rc::default(),
            failures: Rc::default(),
            transactions: Rc::default(),
        }
    }
}

impl FakeRegisters {
    pub fn get(&self, reg: u8) -> u8 {
        self.regs.borrow()[reg as usize]
    }

    pub fn set(&self, reg: u8, val: u8) {
        self.regs.borrow_mut()[reg as usize] = val;
    }

    /// Values written to `reg`, oldest first.
    pub fn writes_to(&self, reg: u8) -> Vec<u8> {
        self.writes
            .borrow()
            .iter()
            .filter(|(r, _)| *r == reg)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    /// Fail the next `count` transactions.
    pub fn fail_next(&self, count: usize) {
        self.failures.set(count);
    }

    pub fn transactions(&self) -> usize {
        self.transactions.get()
    }
}

impl ErrorType for FakeRegisters {
    type Error = ErrorKind;
}

impl I2c for FakeRegisters {
    async fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.transactions.set(self.transactions.get() + 1);
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(ErrorKind::Other);
        }

        let mut regs = self.regs.borrow_mut();
        let mut pointer = 0usize;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    if let Some((&reg, data)) = bytes.split_first() {
                        pointer = reg as usize;
                        for (i, &b) in data.iter().enumerate() {
                            regs[(pointer + i) & 0xff] = b;
                            self.writes.borrow_mut().push(((pointer + i) as u8, b));
                        }
                    }
                }
                Operation::Read(buf) => {
                    for (i, b) in buf.iter_mut().enumerate() {
                        *b = regs[(pointer + i) & 0xff];
                    }
                }
            }
        }
        Ok(())
    }
}

/// An upstream USB supply that records what the charger reports.
#[derive(Default)]
pub struct FakeUsb {
    pub supply_type: Cell<SupplyType>,
    pub present: Cell<bool>,
    pub otg: Cell<bool>,
    pub health: Cell<Health>,
    pub current_max_ma: Cell<u32>,
}

impl UsbSupply for FakeUsb {
    fn supply_type(&self) -> SupplyType {
        self.supply_type.get()
    }

    fn set_supply_type(&self, supply_type: SupplyType) {
        self.supply_type.set(supply_type);
    }

    fn set_present(&self, present: bool) {
        self.present.set(present);
    }

    fn set_usb_otg(&self, otg: bool) {
        self.otg.set(otg);
    }

    fn set_health(&self, health: Health) {
        self.health.set(health);
    }

    fn current_max_ma(&self) -> u32 {
        self.current_max_ma.get()
    }
}
