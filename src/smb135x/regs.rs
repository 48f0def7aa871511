//! SMB135x register map.
#![allow(dead_code)]

use modular_bitfield::{bitfield, specifiers::B2};

/// 7-bit bus address of the charger
pub const ADDR: u8 = 0x1c;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Reg(pub u8);

impl Reg {
    pub const CFG_3: Reg = Reg(0x03);
    pub const CFG_4: Reg = Reg(0x04);
    pub const CFG_5: Reg = Reg(0x05);
    pub const IRQ_CFG: Reg = Reg(0x07);
    pub const IRQ2_CFG: Reg = Reg(0x08);
    pub const IRQ3_CFG: Reg = Reg(0x09);
    pub const CFG_C: Reg = Reg(0x0C);
    pub const CFG_E: Reg = Reg(0x0E);
    pub const CFG_10: Reg = Reg(0x11);
    pub const USBIN_DCIN_CFG: Reg = Reg(0x12);
    pub const CFG_14: Reg = Reg(0x14);
    pub const CFG_16: Reg = Reg(0x16);
    pub const CFG_17: Reg = Reg(0x17);
    pub const CFG_19: Reg = Reg(0x19);
    pub const CFG_1A: Reg = Reg(0x1A);
    pub const VFLOAT: Reg = Reg(0x1E);
    pub const TRIM_23: Reg = Reg(0x23);
    pub const VERSION1: Reg = Reg(0x2A);
    pub const VERSION2: Reg = Reg(0x32);
    pub const VERSION3: Reg = Reg(0x34);
    pub const CMD_I2C: Reg = Reg(0x40);
    pub const CMD_INPUT_LIMIT: Reg = Reg(0x41);
    pub const CMD_CHG: Reg = Reg(0x42);
    pub const STATUS_4: Reg = Reg(0x4A);
    pub const STATUS_5: Reg = Reg(0x4B);
    pub const STATUS_6: Reg = Reg(0x4C);
    pub const STATUS_9: Reg = Reg(0x4F);
    pub const IRQ_A: Reg = Reg(0x50);
    pub const IRQ_B: Reg = Reg(0x51);
    pub const IRQ_C: Reg = Reg(0x52);
    pub const IRQ_D: Reg = Reg(0x53);
    pub const IRQ_E: Reg = Reg(0x54);
    pub const IRQ_F: Reg = Reg(0x55);
    pub const IRQ_G: Reg = Reg(0x56);

    pub const fn new(val: u8) -> Self {
        Reg(val)
    }

    pub const fn to_u8(self) -> u8 {
        self.0
    }

    /// The register `n` addresses above this one.
    pub const fn offset(self, n: u8) -> Self {
        Reg(self.0 + n)
    }
}

// CFG_3
pub const ITERM_MASK: u8 = 0x38;

// CFG_4
pub const CHG_INHIBIT_MASK: u8 = 0xC0;
pub const CHG_INHIBIT_50MV: u8 = 0x00;
pub const CHG_INHIBIT_100MV: u8 = 0x40;
pub const CHG_INHIBIT_200MV: u8 = 0x80;
pub const CHG_INHIBIT_300MV: u8 = 0xC0;

// CFG_5
pub const RECHARGE_200MV: u8 = 1 << 2;
pub const USB_2_3: u8 = 1 << 5;

// CFG_C / CFG_10
pub const USBIN_INPUT_MASK: u8 = 0x1F;
pub const DCIN_INPUT_MASK: u8 = 0x1F;

// CFG_E
pub const POLARITY_100_500: u8 = 1 << 2;
pub const USB_CTRL_BY_PIN: u8 = 1 << 1;

// USBIN_DCIN_CFG
pub const USBIN_SUSPEND_VIA_COMMAND: u8 = 1 << 6;

// CFG_14
pub const CHG_EN_BY_PIN: u8 = 1 << 7;
pub const CHG_EN_ACTIVE_LOW: u8 = 1 << 6;
pub const PRE_TO_FAST_REQ_CMD: u8 = 1 << 5;
pub const DISABLE_CURRENT_TERM: u8 = 1 << 3;
pub const DISABLE_AUTO_RECHARGE: u8 = 1 << 2;
pub const EN_CHG_INHIBIT: u8 = 1 << 0;

// CFG_16
pub const SAFETY_TIME_EN: u8 = 1 << 4;
pub const SAFETY_TIME_MINUTES_MASK: u8 = 0x0C;
pub const SAFETY_TIME_MINUTES_SHIFT: u8 = 2;

// CFG_17
pub const CHG_STAT_DISABLE: u8 = 1 << 0;
pub const CHG_STAT_ACTIVE_HIGH: u8 = 1 << 1;
pub const CHG_STAT_IRQ_ONLY: u8 = 1 << 4;

// CFG_19
pub const BATT_MISSING_ALGO: u8 = 1 << 2;
pub const BATT_MISSING_THERM: u8 = 1 << 1;

// CFG_1A
pub const HOT_SOFT_VFLOAT_COMP_EN: u8 = 1 << 3;
pub const COLD_SOFT_VFLOAT_COMP_EN: u8 = 1 << 2;

// IRQ_CFG
pub const IRQ_HOT_COLD_HARD: u8 = 1 << 7;
pub const IRQ_HOT_COLD_SOFT: u8 = 1 << 6;
pub const IRQ_USBIN_UV: u8 = 1 << 2;
pub const IRQ_INTERNAL_TEMP: u8 = 1 << 0;

// IRQ2_CFG
pub const IRQ2_SAFETY_TIMER: u8 = 1 << 7;
pub const IRQ2_CHG_ERR: u8 = 1 << 6;
pub const IRQ2_CHG_PHASE_CHANGE: u8 = 1 << 4;
pub const IRQ2_CHG_INHIBIT: u8 = 1 << 3;
pub const IRQ2_POWER_OK: u8 = 1 << 2;
pub const IRQ2_BATT_MISSING: u8 = 1 << 1;
pub const IRQ2_VBAT_LOW: u8 = 1 << 0;

// IRQ3_CFG
pub const IRQ3_RID_DETECT: u8 = 1 << 4;
pub const IRQ3_SRC_DETECT: u8 = 1 << 2;
pub const IRQ3_DCIN_UV: u8 = 1 << 0;

// TRIM_23
pub const CHECK_USB100_GOOD: u8 = 1 << 1;

// VERSION1..3
pub const VERSION1_MASK: u8 = 0xC0;
pub const VERSION1_SHIFT: u8 = 6;
pub const VERSION2_MASK: u8 = 0x03;
pub const SMB1356_VERSION3: u8 = 1 << 7;

// CMD_I2C
pub const ALLOW_VOLATILE: u8 = 1 << 6;

// CMD_INPUT_LIMIT
pub const USB_SHUTDOWN: u8 = 1 << 6;
pub const DC_SHUTDOWN: u8 = 1 << 5;
pub const USE_REGISTER_FOR_CURRENT: u8 = 1 << 2;
pub const USB_100_500_AC_MASK: u8 = 0x03;
pub const USB_100_VAL: u8 = 0x02;
pub const USB_500_VAL: u8 = 0x00;
pub const USB_AC_VAL: u8 = 0x01;

// CMD_CHG
pub const CMD_CHG_EN: u8 = 1 << 1;

// STATUS_6
pub const RID_MASK: u8 = 0x0F;

// STATUS_9
pub const REV_MASK: u8 = 0x0F;

// IRQ_A
pub const IRQ_A_HOT_HARD: u8 = 1 << 6;
pub const IRQ_A_COLD_HARD: u8 = 1 << 4;
pub const IRQ_A_HOT_SOFT: u8 = 1 << 2;
pub const IRQ_A_COLD_SOFT: u8 = 1 << 0;

// IRQ_B
pub const IRQ_B_BATT_TERMINAL: u8 = 1 << 6;
pub const IRQ_B_BATT_MISSING: u8 = 1 << 4;

// IRQ_C
pub const IRQ_C_TERM: u8 = 1 << 0;

// IRQ_E
pub const IRQ_E_DC_OV: u8 = 1 << 6;
pub const IRQ_E_DC_UV: u8 = 1 << 4;
pub const IRQ_E_USB_OV: u8 = 1 << 2;
pub const IRQ_E_USB_UV: u8 = 1 << 0;

/// Status and latch bit of one interrupt source
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct IrqBit {
    /// Real-time status
    pub status: bool,
    /// The source fired since the last read
    pub latched: bool,
}

#[bitfield(bits = 8)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
/// One IRQ status register: four sources, each a status bit followed by its latch bit
pub struct IrqStatus {
    pub status0: bool,
    pub latched0: bool,
    pub status1: bool,
    pub latched1: bool,
    pub status2: bool,
    pub latched2: bool,
    pub status3: bool,
    pub latched3: bool,
}

impl IrqStatus {
    /// Status and latch of source `slot` (0..4)
    pub fn slot(&self, slot: usize) -> IrqBit {
        match slot {
            0 => IrqBit { status: self.status0(), latched: self.latched0() },
            1 => IrqBit { status: self.status1(), latched: self.latched1() },
            2 => IrqBit { status: self.status2(), latched: self.latched2() },
            _ => IrqBit { status: self.status3(), latched: self.latched3() },
        }
    }
}

#[bitfield(bits = 8)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
/// Charger status
pub struct Status4 {
    pub charging_enabled: bool,
    pub charge_type: B2,
    pub hold_off: bool,
    pub battery_below_2v: bool,
    #[skip]
    __: B2,
    pub net_charging: bool,
}
