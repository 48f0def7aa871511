//! Named configuration attributes.

use core::fmt::Write;

use defmt_or_log::debug;
use embassy_sync::blocking_mutex::raw::RawMutex;

use super::state::BatteryConfig;
use super::BatteryMonitor;
use crate::charger::ChargerBackend;
use crate::host::Host;
use crate::sampling::SamplingSource;
use crate::Error;

/// A configuration attribute of a battery.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Attribute {
    /// Capacity table dump
    Capacity,
    /// NTC table dump with reference calibration
    Ntc,
    /// mV
    PrechargeVoltage,
    /// mV
    PoweroffVoltage,
    /// mV
    LowVoltage,
    /// mV
    RechargeVoltage,
    /// mV
    ChargeDoneVoltage,
    /// °C
    TempLowPoweroff,
    /// °C
    TempLowDisableCharge,
    /// °C
    TempHighDisableCharge,
    /// °C
    TempHighPoweroff,
    /// °C
    TempErrorMargin,
    /// ms
    ChargingMonitorPeriod,
    /// ms
    DischargingMonitorPeriod,
    /// Maximum battery voltage, mV
    VbatMax,
    /// Maximum charge current, mA
    IbatMax,
    /// 0 or 1
    TestMode,
    /// 0 or 1
    DisableCharging,
    /// mV
    HighVoltage,
    /// percent
    CapacityChangedMargin,
    /// 0 or 1
    DebugMode,
}

impl Attribute {
    /// Every attribute with its name.
    pub const ALL: [(Attribute, &'static str); 21] = [
        (Attribute::Capacity, "capacity"),
        (Attribute::Ntc, "ntc"),
        (Attribute::PrechargeVoltage, "precharge_voltage"),
        (Attribute::PoweroffVoltage, "poweroff_voltage"),
        (Attribute::LowVoltage, "low_voltage"),
        (Attribute::RechargeVoltage, "recharge_voltage"),
        (Attribute::ChargeDoneVoltage, "charge_done_voltage"),
        (Attribute::TempLowPoweroff, "temp_low_poweroff"),
        (Attribute::TempLowDisableCharge, "temp_low_disable_charge"),
        (Attribute::TempHighDisableCharge, "temp_high_disable_charge"),
        (Attribute::TempHighPoweroff, "temp_high_poweroff"),
        (Attribute::TempErrorMargin, "temp_error_margin"),
        (Attribute::ChargingMonitorPeriod, "charging_monitor_period_ms"),
        (Attribute::DischargingMonitorPeriod, "discharging_monitor_period_ms"),
        (Attribute::VbatMax, "vbat_max"),
        (Attribute::IbatMax, "ibat_max"),
        (Attribute::TestMode, "test_mode"),
        (Attribute::DisableCharging, "disable_charging"),
        (Attribute::HighVoltage, "high_voltage"),
        (Attribute::CapacityChangedMargin, "capacity_changed_margin"),
        (Attribute::DebugMode, "debug_mode"),
    ];

    /// Look an attribute up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Attribute::ALL
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(attr, _)| *attr)
    }

    /// Attribute name
    pub fn name(self) -> &'static str {
        Attribute::ALL
            .iter()
            .find(|(attr, _)| *attr == self)
            .map(|(_, n)| *n)
            .unwrap_or("")
    }

    fn config_field(self, cfg: &mut BatteryConfig) -> Option<&mut i32> {
        Some(match self {
            Attribute::PrechargeVoltage => &mut cfg.precharge_voltage,
            Attribute::PoweroffVoltage => &mut cfg.poweroff_voltage,
            Attribute::LowVoltage => &mut cfg.low_voltage,
            Attribute::RechargeVoltage => &mut cfg.recharge_voltage,
            Attribute::ChargeDoneVoltage => &mut cfg.charge_done_voltage,
            Attribute::TempLowPoweroff => &mut cfg.temp_low_poweroff,
            Attribute::TempLowDisableCharge => &mut cfg.temp_low_disable_charge,
            Attribute::TempHighDisableCharge => &mut cfg.temp_high_disable_charge,
            Attribute::TempHighPoweroff => &mut cfg.temp_high_poweroff,
            Attribute::TempErrorMargin => &mut cfg.temp_error_margin,
            Attribute::HighVoltage => &mut cfg.high_voltage,
            Attribute::CapacityChangedMargin => &mut cfg.capacity_changed_margin,
            _ => return None,
        })
    }
}

fn parse_int(value: &str) -> Result<i32, Error> {
    value.trim().parse::<i32>().map_err(|_| Error::Parse)
}

impl<'a, M, S, H, B> BatteryMonitor<'a, M, S, H, B>
where
    M: RawMutex,
    S: SamplingSource,
    H: Host,
    B: ChargerBackend,
{
    /// Format an attribute into `out`.
    pub async fn show_attribute<W: Write>(&self, name: &str, out: &mut W) -> Result<(), Error> {
        let attr = Attribute::from_name(name).ok_or(Error::InvalidProperty)?;
        let mut state = self.state.lock().await;
        let res = match attr {
            Attribute::Capacity => self.capacity_table.iter().try_for_each(|band| {
                writeln!(
                    out,
                    "{} {} {} {} {}",
                    band.percent, band.vmin_mv, band.vmax_mv, band.offset, band.hysteresis
                )
            }),
            Attribute::Ntc => {
                writeln!(out, "{} {}", state.reference.measured_uv, state.reference.nominal_uv).and_then(|()| {
                    self.ntc_table.unwrap_or(&[]).iter().try_for_each(|point| {
                        writeln!(out, "{} {}", point.temperature, point.voltage_uv)
                    })
                })
            }
            Attribute::ChargingMonitorPeriod => writeln!(out, "{}", state.config.charging_period_ms),
            Attribute::DischargingMonitorPeriod => {
                writeln!(out, "{}", state.config.discharging_period_ms)
            }
            Attribute::VbatMax => writeln!(out, "{}", state.voltage_max_uv / 1000),
            Attribute::IbatMax => writeln!(out, "{}", state.current_max_ua / 1000),
            Attribute::TestMode => writeln!(out, "{}", state.config.test_mode as i32),
            Attribute::DisableCharging => writeln!(out, "{}", state.config.disable_charging as i32),
            Attribute::DebugMode => writeln!(out, "{}", state.config.debug_mode as i32),
            _ => match attr.config_field(&mut state.config) {
                Some(field) => writeln!(out, "{}", *field),
                None => return Err(Error::InvalidProperty),
            },
        };
        res.map_err(|_| Error::OutOfMemory)
    }

    /// Parse and store an attribute.
    ///
    /// Malformed input leaves the configuration untouched. The table attributes accept and
    /// ignore any value.
    pub async fn store_attribute(&self, name: &str, value: &str) -> Result<(), Error> {
        let attr = Attribute::from_name(name).ok_or(Error::InvalidProperty)?;
        if matches!(attr, Attribute::Capacity | Attribute::Ntc) {
            return Ok(());
        }
        let value = parse_int(value)?;

        let mut state = self.state.lock().await;
        match attr {
            Attribute::ChargingMonitorPeriod => {
                state.config.charging_period_ms = u32::try_from(value).map_err(|_| Error::InvalidArgument)?
            }
            Attribute::DischargingMonitorPeriod => {
                state.config.discharging_period_ms =
                    u32::try_from(value).map_err(|_| Error::InvalidArgument)?
            }
            Attribute::VbatMax => state.voltage_max_uv = value.saturating_mul(1000),
            Attribute::IbatMax => state.current_max_ua = value.saturating_mul(1000),
            Attribute::TestMode => {
                state.config.test_mode = value != 0;
                if !state.config.test_mode {
                    state.pinned_temperature = None;
                    state.pinned_voltage_uv = None;
                }
            }
            Attribute::DisableCharging => state.config.disable_charging = value != 0,
            Attribute::DebugMode => state.config.debug_mode = value != 0,
            _ => match attr.config_field(&mut state.config) {
                Some(field) => *field = value,
                None => return Err(Error::InvalidProperty),
            },
        }
        debug!("battery {}: {} = {}", self.name, attr.name(), value);
        Ok(())
    }
}
