//! Battery monitor.
//!
//! A [`BatteryMonitor`] periodically samples battery voltage and thermistor, derives
//! capacity, temperature and health, and asks its charger for a charge current whenever
//! external power changes. Drive it by spawning [`BatteryMonitor::run`] and call
//! [`BatteryMonitor::external_power_changed`] when the charger reports an input change.

use core::cell::Cell;

use defmt_or_log::{debug, error, info, trace, warn};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;

use crate::calibration::{
    capacity_for, temperature_for, CapacityBand, NtcPoint, ReferenceCalibration, CAPACITY_TABLE,
    DEFAULT_TEMPERATURE, NTC_TABLE,
};
use crate::charger::{ChargerBackend, ChargerCore, ChargerInfo, ChargerRegistry};
use crate::host::Host;
use crate::sampling::{read_averaged, Channel, SamplingSource};
use crate::Error;

mod attr;
mod state;

pub use attr::Attribute;
pub use state::{BatteryConfig, Health, Property, Snapshot, Status, UNMATCHED_CAPACITY};

use state::BatteryState;

/// Delay before the first sampling pass, ms.
pub const FIRST_PASS_DELAY_MS: u32 = 250;

/// Identity and calibration of one battery.
#[derive(Debug, Copy, Clone)]
pub struct BatteryDescriptor {
    /// Power-supply name, also used to find the charger
    pub name: &'static str,
    /// Voltage to capacity bands
    pub capacity_table: &'static [CapacityBand],
    /// Thermistor table; `None` reports a fixed 25 °C
    pub ntc_table: Option<&'static [NtcPoint]>,
    /// ADC reference calibration
    pub reference: ReferenceCalibration,
}

impl BatteryDescriptor {
    /// A battery using the built-in tables.
    pub fn new(name: &'static str) -> Self {
        BatteryDescriptor {
            name,
            capacity_table: &CAPACITY_TABLE,
            ntc_table: Some(&NTC_TABLE),
            reference: ReferenceCalibration::default(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Lifecycle {
    Registered,
    Running,
    Unregistered,
}

/// A monitored battery.
pub struct BatteryMonitor<'a, M: RawMutex, S, H, B> {
    name: &'static str,
    capacity_table: &'static [CapacityBand],
    ntc_table: Option<&'static [NtcPoint]>,
    state: Mutex<M, BatteryState>,
    sampler: Mutex<M, S>,
    host: H,
    chargers: &'a ChargerRegistry<'a, M, B>,
    charger: BlockingMutex<M, Cell<Option<&'a ChargerCore<M, B>>>>,
    lifecycle: BlockingMutex<M, Cell<Lifecycle>>,
    stop: Signal<M, ()>,
    stopped: Signal<M, ()>,
}

impl<'a, M, S, H, B> BatteryMonitor<'a, M, S, H, B>
where
    M: RawMutex,
    S: SamplingSource,
    H: Host,
    B: ChargerBackend,
{
    /// Register a battery with the platform and request an initial charge current.
    pub async fn register(
        desc: BatteryDescriptor,
        sampler: S,
        host: H,
        chargers: &'a ChargerRegistry<'a, M, B>,
    ) -> Result<Self, Error> {
        if desc.name.is_empty() {
            error!("battery registration without a name");
            return Err(Error::InvalidArgument);
        }

        let monitor = BatteryMonitor {
            name: desc.name,
            capacity_table: desc.capacity_table,
            ntc_table: desc.ntc_table,
            state: Mutex::new(BatteryState::new(desc.reference)),
            sampler: Mutex::new(sampler),
            host,
            chargers,
            charger: BlockingMutex::new(Cell::new(chargers.lookup_by_name(desc.name))),
            lifecycle: BlockingMutex::new(Cell::new(Lifecycle::Registered)),
            stop: Signal::new(),
            stopped: Signal::new(),
        };

        if monitor.host.register_power_supply(monitor.name).is_err() {
            error!("failed to register power supply {}", monitor.name);
            return Err(Error::RegistrationFailed);
        }

        monitor.external_power_changed().await;
        info!("battery {} registered", monitor.name);
        Ok(monitor)
    }

    /// Battery name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the monitor task and withdraw the power supply.
    ///
    /// Waits for a running sampling pass to finish. Calling it again does nothing.
    pub async fn unregister(&self) {
        let prev = self.lifecycle.lock(|l| l.replace(Lifecycle::Unregistered));
        match prev {
            Lifecycle::Unregistered => return,
            Lifecycle::Running => {
                self.stop.signal(());
                self.stopped.wait().await;
            }
            Lifecycle::Registered => {}
        }
        self.host.unregister_power_supply(self.name);
        self.relax().await;
        info!("battery {} unregistered", self.name);
    }

    /// The monitor task. Returns once [`unregister`](Self::unregister) is called.
    pub async fn run<D: DelayNs>(&self, mut delay: D) {
        let started = self.lifecycle.lock(|l| {
            if l.get() == Lifecycle::Registered {
                l.set(Lifecycle::Running);
                true
            } else {
                false
            }
        });
        if !started {
            warn!("battery {} monitor already running or unregistered", self.name);
            return;
        }

        let mut period_ms = FIRST_PASS_DELAY_MS;
        loop {
            match select(self.stop.wait(), delay.delay_ms(period_ms)).await {
                Either::First(()) => break,
                Either::Second(()) => {}
            }
            self.monitor_pass(&mut delay).await;
            period_ms = self.state.lock().await.monitor_period_ms();
        }
        self.stopped.signal(());
    }

    /// One sampling pass: temperature, voltage, then the status decision.
    pub async fn monitor_pass<D: DelayNs>(&self, delay: &mut D) {
        self.stay_awake().await;

        let mut sampler = self.sampler.lock().await;
        if sampler.has_temperature() {
            match read_averaged(&mut *sampler, delay, Channel::Temperature).await {
                Ok(raw) => self.commit_temperature(raw).await,
                Err(e) => error!("failed to measure battery temperature: {:?}", e),
            }
        }

        self.resolve_charger();

        if sampler.has_voltage() {
            match read_averaged(&mut *sampler, delay, Channel::Voltage).await {
                Ok(uv) => self.commit_voltage(uv).await,
                Err(e) => error!("failed to measure battery voltage: {:?}", e),
            }
        }
        drop(sampler);

        let next = self.state.lock().await.decide_status();
        trace!("battery {} next status {:?}", self.name, next);
        if next.hands_over() {
            self.external_power_changed().await;
        }

        self.relax().await;
    }

    async fn commit_temperature(&self, raw_uv: i32) {
        let mut state = self.state.lock().await;
        let temperature = match self.ntc_table {
            Some(table) => {
                let uv = state.reference.rescale(raw_uv);
                temperature_for(table, uv).unwrap_or(state.temperature)
            }
            None => {
                error!("battery {} has no NTC table", self.name);
                DEFAULT_TEMPERATURE
            }
        };
        let temperature = state.pinned_temperature.unwrap_or(temperature);
        state.temperature = temperature;
        state.health = Health::classify(temperature, &state.config);
        if state.config.debug_mode {
            info!("battery {}: {} uV -> {} C", self.name, raw_uv, temperature);
        }
    }

    async fn commit_voltage(&self, sampled_uv: i32) {
        let mut state = self.state.lock().await;
        let uv = state.pinned_voltage_uv.unwrap_or(sampled_uv);
        let capacity = capacity_for(self.capacity_table, uv / 1000).unwrap_or(UNMATCHED_CAPACITY);
        state.voltage_now_uv = uv;
        state.voltage_avg_uv = uv;
        state.capacity = capacity;
        if state.config.debug_mode {
            info!("battery {}: {} uV -> {}%", self.name, uv, capacity);
        }
    }

    /// Re-arbitrate the charge current after an input change.
    pub async fn external_power_changed(&self) {
        let requested_ma = {
            let state = self.state.lock().await;
            if state.config.disable_charging {
                0
            } else {
                state.current_max_ua / 1000
            }
        };

        let info = match self.resolve_charger() {
            Some(charger) => {
                if let Err(e) = charger.set_charging_current(requested_ma).await {
                    warn!("battery {}: charge current request failed: {:?}", self.name, e);
                }
                charger.charger_info().await
            }
            None => ChargerInfo::default(),
        };

        {
            let mut state = self.state.lock().await;
            state.current_now_ua = (info.current_now_ma as i32).saturating_mul(1000);
            state.status = if state.current_now_ua > 0 {
                Status::Charging
            } else if info.adapter_connected {
                Status::NotCharging
            } else {
                Status::Discharging
            };
            debug!(
                "battery {}: {} uA, status {:?}",
                self.name, state.current_now_ua, state.status
            );
        }
        self.host.power_supply_changed(self.name);
    }

    /// Alarm hook: keep the system awake until the next pass ends.
    pub async fn wakeup(&self) {
        self.stay_awake().await;
    }

    /// Read one property.
    pub async fn get_property(&self, property: Property) -> i32 {
        self.state.lock().await.property(property)
    }

    /// Write one property.
    ///
    /// `Status` is always writable. `Present`, `VoltageNow` and `Temperature` need test
    /// mode. Anything else is rejected.
    pub async fn set_property(&self, property: Property, value: i32) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if property == Property::Status {
            state.status = Status::from_code(value)?;
            return Ok(());
        }
        if !property.is_writeable() {
            return Err(Error::InvalidProperty);
        }
        if !state.config.test_mode {
            return Err(Error::PermissionDenied);
        }
        match property {
            Property::Present => state.present = value != 0,
            Property::VoltageNow => {
                state.voltage_now_uv = value;
                state.pinned_voltage_uv = Some(value);
            }
            Property::Temperature => {
                state.temperature = value;
                state.pinned_temperature = Some(value);
            }
            _ => return Err(Error::InvalidProperty),
        }
        Ok(())
    }

    /// Can the platform write `property`?
    pub fn is_writeable(&self, property: Property) -> bool {
        property.is_writeable()
    }

    /// Every reported property at once
    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.snapshot()
    }

    /// Current configuration
    pub async fn config(&self) -> BatteryConfig {
        self.state.lock().await.config
    }

    fn resolve_charger(&self) -> Option<&'a ChargerCore<M, B>> {
        self.charger.lock(|c| {
            if c.get().is_none() {
                c.set(self.chargers.lookup_by_name(self.name));
            }
            c.get()
        })
    }

    async fn stay_awake(&self) {
        let mut state = self.state.lock().await;
        if !state.awake {
            state.awake = true;
            self.host.stay_awake(self.name);
        }
    }

    async fn relax(&self) {
        let mut state = self.state.lock().await;
        if state.awake {
            state.awake = false;
            self.host.relax(self.name);
        }
    }
}
