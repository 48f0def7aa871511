use crate::calibration::{ReferenceCalibration, DEFAULT_TEMPERATURE};
use crate::Error;

/// Charge status, numbered like the power-supply class.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    /// Unknown
    #[default]
    Unknown = 0,
    /// Current flows into the battery
    Charging = 1,
    /// Running from the battery
    Discharging = 2,
    /// A source is attached but the battery is not charging
    NotCharging = 3,
    /// Charge terminated
    Full = 4,
}

impl Status {
    /// Numeric power-supply code
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Parse a power-supply status code.
    pub fn from_code(code: i32) -> Result<Self, Error> {
        match code {
            0 => Ok(Status::Unknown),
            1 => Ok(Status::Charging),
            2 => Ok(Status::Discharging),
            3 => Ok(Status::NotCharging),
            4 => Ok(Status::Full),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Statuses past `NotCharging` leave the monitor's own state machine and hand charge
    /// control back to the charger arbiter.
    pub fn hands_over(self) -> bool {
        self.code() > Status::NotCharging.code()
    }
}

/// Battery health, numbered like the power-supply class.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Health {
    /// Not classified yet
    #[default]
    Unknown = 0,
    /// Within every limit
    Good = 1,
    /// Too hot to charge
    Overheat = 2,
    /// Outside the power-off envelope
    Dead = 3,
    /// Input or battery over-voltage
    OverVoltage = 4,
    /// Too cold to charge
    Cold = 6,
}

impl Health {
    /// Numeric power-supply code
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Classify a battery temperature against the configured limits.
    pub fn classify(temperature: i32, config: &BatteryConfig) -> Health {
        if temperature > config.temp_high_poweroff || temperature < config.temp_low_poweroff {
            Health::Dead
        } else if temperature > config.temp_high_disable_charge {
            Health::Overheat
        } else if temperature < config.temp_low_disable_charge {
            Health::Cold
        } else {
            Health::Good
        }
    }
}

/// Properties reported to the platform.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Property {
    /// [`Status`] code
    Status,
    /// [`Health`] code
    Health,
    /// 1 if a battery is present
    Present,
    /// Design maximum voltage, µV
    VoltageMax,
    /// Last voltage reading, µV
    VoltageNow,
    /// Averaged voltage, µV
    VoltageAvg,
    /// Maximum charge current, µA
    CurrentMax,
    /// Charge current in effect, µA
    CurrentNow,
    /// State of charge, percent
    Capacity,
    /// Battery temperature, °C
    Temperature,
}

impl Property {
    /// Every property, in reporting order.
    pub const ALL: [Property; 10] = [
        Property::Status,
        Property::Present,
        Property::Temperature,
        Property::Health,
        Property::VoltageNow,
        Property::VoltageAvg,
        Property::Capacity,
        Property::VoltageMax,
        Property::CurrentMax,
        Property::CurrentNow,
    ];

    /// Parse a raw property index as listed in [`Property::ALL`].
    pub fn from_index(index: usize) -> Result<Self, Error> {
        Property::ALL.get(index).copied().ok_or(Error::InvalidProperty)
    }

    /// Can the platform write this property? Writes still require test mode.
    pub fn is_writeable(self) -> bool {
        matches!(self, Property::Present | Property::VoltageNow | Property::Temperature)
    }
}

/// Thresholds, periods and switches of one battery.
///
/// Voltages are in mV and temperatures in °C.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct BatteryConfig {
    /// Below this the charger pre-charges
    pub precharge_voltage: i32,
    /// Shut down below this
    pub poweroff_voltage: i32,
    /// Low-battery warning level
    pub low_voltage: i32,
    /// Restart charging below this
    pub recharge_voltage: i32,
    /// Charge termination voltage
    pub charge_done_voltage: i32,
    /// Over-voltage limit
    pub high_voltage: i32,
    /// Shut down below this
    pub temp_low_poweroff: i32,
    /// No charging below this
    pub temp_low_disable_charge: i32,
    /// No charging above this
    pub temp_high_disable_charge: i32,
    /// Shut down above this
    pub temp_high_poweroff: i32,
    /// Tolerance applied by the platform to temperature limits
    pub temp_error_margin: i32,
    /// Monitor period while charging
    pub charging_period_ms: u32,
    /// Monitor period otherwise
    pub discharging_period_ms: u32,
    /// Capacity change worth reporting, percent
    pub capacity_changed_margin: i32,
    /// Allow the platform to fake readings
    pub test_mode: bool,
    /// Administratively disable charging
    pub disable_charging: bool,
    /// Verbose logging
    pub debug_mode: bool,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        BatteryConfig {
            precharge_voltage: 3000,
            poweroff_voltage: 3064,
            low_voltage: 3600,
            recharge_voltage: 4200,
            charge_done_voltage: 4350,
            high_voltage: 4450,
            temp_low_poweroff: -20,
            temp_low_disable_charge: -5,
            temp_high_disable_charge: 55,
            temp_high_poweroff: 65,
            temp_error_margin: 2,
            charging_period_ms: 20_000,
            discharging_period_ms: 25_000,
            capacity_changed_margin: 10,
            test_mode: false,
            disable_charging: false,
            debug_mode: false,
        }
    }
}

/// Copy of every reported property.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Snapshot {
    /// Charge status
    pub status: Status,
    /// Battery health
    pub health: Health,
    /// Battery present
    pub present: bool,
    /// Design maximum voltage, µV
    pub voltage_max_uv: i32,
    /// Last voltage reading, µV
    pub voltage_now_uv: i32,
    /// Averaged voltage, µV
    pub voltage_avg_uv: i32,
    /// Maximum charge current, µA
    pub current_max_ua: i32,
    /// Charge current in effect, µA
    pub current_now_ua: i32,
    /// State of charge, percent
    pub capacity: u8,
    /// Temperature, °C
    pub temperature: i32,
}

/// Capacity reported when a voltage reading falls outside every band.
pub const UNMATCHED_CAPACITY: u8 = 99;

pub(crate) struct BatteryState {
    pub status: Status,
    pub pending_status: Status,
    pub health: Health,
    pub present: bool,
    pub voltage_max_uv: i32,
    pub voltage_now_uv: i32,
    pub voltage_avg_uv: i32,
    pub current_max_ua: i32,
    pub current_now_ua: i32,
    pub capacity: u8,
    pub temperature: i32,
    pub pinned_temperature: Option<i32>,
    pub pinned_voltage_uv: Option<i32>,
    pub reference: ReferenceCalibration,
    pub config: BatteryConfig,
    pub awake: bool,
}

impl BatteryState {
    pub fn new(reference: ReferenceCalibration) -> Self {
        BatteryState {
            status: Status::Discharging,
            pending_status: Status::Unknown,
            health: Health::Unknown,
            present: false,
            voltage_max_uv: 4_350_000,
            voltage_now_uv: 0,
            voltage_avg_uv: 0,
            current_max_ua: 1_000_000,
            current_now_ua: 0,
            capacity: 80,
            temperature: DEFAULT_TEMPERATURE,
            pinned_temperature: None,
            pinned_voltage_uv: None,
            reference,
            config: BatteryConfig::default(),
            awake: false,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            health: self.health,
            present: self.present,
            voltage_max_uv: self.voltage_max_uv,
            voltage_now_uv: self.voltage_now_uv,
            voltage_avg_uv: self.voltage_avg_uv,
            current_max_ua: self.current_max_ua,
            current_now_ua: self.current_now_ua,
            capacity: self.capacity,
            temperature: self.temperature,
        }
    }

    pub fn property(&self, property: Property) -> i32 {
        match property {
            Property::Status => self.status.code(),
            Property::Health => self.health.code(),
            Property::Present => self.present as i32,
            Property::VoltageMax => self.voltage_max_uv,
            Property::VoltageNow => self.voltage_now_uv,
            Property::VoltageAvg => self.voltage_avg_uv,
            Property::CurrentMax => self.current_max_ua,
            Property::CurrentNow => self.current_now_ua,
            Property::Capacity => self.capacity as i32,
            Property::Temperature => self.temperature,
        }
    }

    /// Next status from the prior one and the last voltage, updating the pending status.
    pub fn decide_status(&mut self) -> Status {
        let volt = self.voltage_now_uv / 1000;
        let cfg = &self.config;
        match self.status {
            Status::Discharging => {
                if volt < cfg.poweroff_voltage {
                    self.pending_status = Status::Charging;
                    Status::Charging
                } else if volt >= cfg.low_voltage {
                    Status::Unknown
                } else {
                    let next = if self.pending_status == Status::Discharging {
                        Status::Unknown
                    } else {
                        Status::Discharging
                    };
                    self.pending_status = next;
                    next
                }
            }
            Status::NotCharging => {
                if !self.present || self.health != Health::Good {
                    Status::Unknown
                } else if volt < cfg.recharge_voltage {
                    self.pending_status = Status::NotCharging;
                    Status::NotCharging
                } else {
                    Status::Unknown
                }
            }
            Status::Charging => {
                self.pending_status = Status::Unknown;
                Status::Unknown
            }
            _ => Status::Unknown,
        }
    }

    pub fn monitor_period_ms(&self) -> u32 {
        if self.status == Status::Charging {
            self.config.charging_period_ms
        } else {
            self.config.discharging_period_ms
        }
    }
}
