//! Chip identification, current tables and register field encoders.

use defmt_or_log::error;

use super::regs::*;
use crate::host::SupplyType;
use crate::Error;

/// Member of the SMB135x family.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ChipVersion {
    /// SMB1356
    Smb1356,
    /// SMB1357
    Smb1357,
    /// SMB1358
    Smb1358,
    /// SMB1359
    Smb1359,
}

impl ChipVersion {
    /// Decode the two-bit version field of VERSION1 or VERSION2.
    pub fn from_field(field: u8) -> Result<Self, Error> {
        match field {
            0x01 => Ok(ChipVersion::Smb1357),
            0x02 => Ok(ChipVersion::Smb1358),
            0x00 => Ok(ChipVersion::Smb1359),
            _ => Err(Error::DeviceNotFound),
        }
    }

    /// Input current steps of the USB path, mA, ascending. The index is the register value.
    pub fn usb_current_table(self) -> &'static [u32] {
        match self {
            ChipVersion::Smb1356 => &USB_CURRENT_SMB1356,
            ChipVersion::Smb1357 | ChipVersion::Smb1358 => &USB_CURRENT_SMB1357_SMB1358,
            ChipVersion::Smb1359 => &USB_CURRENT_SMB1359,
        }
    }

    /// Input current steps of the DC path, mA, ascending.
    pub fn dc_current_table(self) -> &'static [u32] {
        match self {
            ChipVersion::Smb1356 => &DC_CURRENT_SMB1356,
            _ => &DC_CURRENT,
        }
    }
}

/// Silicon revision from STATUS_9.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Revision {
    /// 1.0
    Rev1_0,
    /// 1.1
    Rev1_1,
    /// 2.0
    Rev2_0,
    /// 2.1
    Rev2_1,
}

impl Revision {
    pub fn from_status9(reg: u8) -> Result<Self, Error> {
        match reg & REV_MASK {
            1 => Ok(Revision::Rev1_0),
            2 => Ok(Revision::Rev1_1),
            3 => Ok(Revision::Rev2_0),
            5 => Ok(Revision::Rev2_1),
            _ => Err(Error::DeviceNotFound),
        }
    }

    /// Charger type detection is unreliable on these parts.
    pub fn apsd_broken(self) -> bool {
        self <= Revision::Rev1_1
    }
}

static USB_CURRENT_SMB1356: [u32; 32] = [
    180, 240, 270, 285, 300, 330, 360, 390, 420, 540, 570, 600, 660, 720, 840, 900, 960, 1080,
    1110, 1128, 1146, 1170, 1182, 1200, 1230, 1260, 1380, 1440, 1560, 1620, 1680, 1800,
];

static USB_CURRENT_SMB1357_SMB1358: [u32; 32] = [
    300, 400, 450, 475, 500, 550, 600, 650, 700, 900, 950, 1000, 1100, 1200, 1400, 1450, 1500,
    1600, 1800, 1850, 1880, 1910, 1930, 1950, 1970, 2000, 2050, 2100, 2300, 2400, 2500, 3000,
];

static USB_CURRENT_SMB1359: [u32; 31] = [
    300, 400, 450, 475, 500, 550, 600, 650, 700, 900, 950, 1000, 1100, 1200, 1400, 1450, 1500,
    1600, 1800, 1850, 1880, 1910, 1930, 1950, 1970, 2000, 2050, 2100, 2300, 2400, 2500,
];

static DC_CURRENT_SMB1356: [u32; 26] = [
    180, 240, 270, 285, 300, 330, 360, 390, 420, 540, 570, 600, 660, 720, 840, 870, 900, 960,
    1080, 1110, 1128, 1146, 1158, 1170, 1182, 1200,
];

static DC_CURRENT: [u32; 26] = [
    300, 400, 450, 475, 500, 550, 600, 650, 700, 900, 950, 1000, 1100, 1200, 1400, 1450, 1500,
    1600, 1800, 1850, 1880, 1910, 1930, 1950, 1970, 2000,
];

/// Safety timer settings, minutes.
pub const CHG_TIME_MINUTES: [u32; 4] = [192, 384, 768, 1536];

/// Index of the largest entry not above `ma`, or 0 when every entry is larger.
pub fn current_index(table: &[u32], ma: u32) -> u8 {
    table.iter().rposition(|&step| ma >= step).unwrap_or(0) as u8
}

/// VFLOAT code for a float voltage in mV.
pub fn float_voltage_code(mv: u32) -> Result<u8, Error> {
    const MID_MIN_MV: u32 = 3600;
    const HIGH_MIN_MV: u32 = 4340;
    const VHIGH_MIN_MV: u32 = 4400;
    const MAX_MV: u32 = 4500;

    let code = match mv {
        MID_MIN_MV..=HIGH_MIN_MV => 0x05 + (mv - MID_MIN_MV) / 20,
        _ if mv > HIGH_MIN_MV && mv <= VHIGH_MIN_MV => 0x2A + (mv - HIGH_MIN_MV) / 10,
        _ if mv > VHIGH_MIN_MV && mv <= MAX_MV => 0x2E + (mv - VHIGH_MIN_MV) / 20,
        _ => {
            error!("bad float voltage {} mV", mv);
            return Err(Error::InvalidArgument);
        }
    };
    Ok(code as u8)
}

/// CFG_3 termination current field for `ma`.
pub fn iterm_code(ma: u32) -> u8 {
    match ma {
        0..=50 => 0x08,
        51..=100 => 0x10,
        101..=150 => 0x18,
        151..=200 => 0x20,
        201..=250 => 0x28,
        251..=300 => 0x00,
        301..=500 => 0x30,
        _ => 0x38,
    }
}

/// CFG_16 safety timer field, the enable bit included.
pub fn safety_time_code(minutes: u32) -> Result<u8, Error> {
    let Some(idx) = CHG_TIME_MINUTES.iter().position(|&t| minutes <= t) else {
        error!("safety time {} min out of range", minutes);
        return Err(Error::InvalidArgument);
    };
    Ok(SAFETY_TIME_EN | ((idx as u8) << SAFETY_TIME_MINUTES_SHIFT))
}

/// CFG_4 inhibit field and CFG_5 recharge bit for a resume threshold in mV.
pub fn resume_delta_codes(mv: u32) -> (u8, u8) {
    let inhibit = match mv {
        0..=99 => CHG_INHIBIT_50MV,
        100..=199 => CHG_INHIBIT_100MV,
        200..=299 => CHG_INHIBIT_200MV,
        _ => CHG_INHIBIT_300MV,
    };
    let recharge = if mv < 200 { 0 } else { RECHARGE_200MV };
    (inhibit, recharge)
}

/// Supply type reported by charger detection in STATUS_5.
pub fn usb_supply_type(status5: u8) -> SupplyType {
    match status5.trailing_zeros() {
        0..=3 => SupplyType::UsbAca,
        4 => SupplyType::Usb,
        6 => SupplyType::UsbDcp,
        7 => SupplyType::UsbCdp,
        _ => SupplyType::Unknown,
    }
}
