//! Interrupt sources of the SMB135x and their transition bookkeeping.

use heapless::Vec;

use super::regs::{IrqStatus, Reg};

/// IRQ status registers
pub const IRQ_ROWS: usize = 7;

/// Sources per IRQ status register
pub const IRQ_SLOTS: usize = 4;

/// Reaction to a source changing state. The argument passed along is the real-time status bit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum IrqHandler {
    /// Battery below the soft cold threshold
    ColdSoft,
    /// Battery above the soft hot threshold
    HotSoft,
    /// Battery below the hard cold threshold
    ColdHard,
    /// Battery above the hard hot threshold
    HotHard,
    /// Charger die too hot
    ChargerHot,
    /// Battery voltage low
    VbatLow,
    /// Battery removed or terminal open
    BatteryMissing,
    /// Charge terminated
    ChargeTerm,
    /// Taper charging
    Taper,
    /// Recharge threshold crossed
    Recharge,
    /// Fast charging
    FastCharge,
    /// Safety timer expired
    SafetyTimeout,
    /// USB input under-voltage
    UsbinUv,
    /// USB input over-voltage
    UsbinOv,
    /// DC input under-voltage
    DcinUv,
    /// DC input over-voltage
    DcinOv,
    /// Input power good
    PowerOk,
    /// ID pin resistance changed
    Rid,
    /// Charging inhibited because the battery is already high
    ChargeInhibit,
    /// USB source detection finished
    SrcDetect,
}

/// One interrupt source
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IrqSlot {
    /// Source name
    pub name: &'static str,
    /// What to do on a transition, if anything
    pub handler: Option<IrqHandler>,
}

/// One IRQ status register and its four sources
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IrqRow {
    pub(crate) reg: Reg,
    /// Sources, lowest bit pair first
    pub slots: [IrqSlot; IRQ_SLOTS],
}

const fn slot(name: &'static str, handler: IrqHandler) -> IrqSlot {
    IrqSlot { name, handler: Some(handler) }
}

const fn unhandled(name: &'static str) -> IrqSlot {
    IrqSlot { name, handler: None }
}

/// Every interrupt source of the chip, by status register.
pub static IRQ_TABLE: [IrqRow; IRQ_ROWS] = [
    IrqRow {
        reg: Reg::IRQ_A,
        slots: [
            slot("cold_soft", IrqHandler::ColdSoft),
            slot("hot_soft", IrqHandler::HotSoft),
            slot("cold_hard", IrqHandler::ColdHard),
            slot("hot_hard", IrqHandler::HotHard),
        ],
    },
    IrqRow {
        reg: Reg::IRQ_B,
        slots: [
            slot("chg_hot", IrqHandler::ChargerHot),
            slot("vbat_low", IrqHandler::VbatLow),
            slot("battery_missing", IrqHandler::BatteryMissing),
            slot("battery_missing", IrqHandler::BatteryMissing),
        ],
    },
    IrqRow {
        reg: Reg::IRQ_C,
        slots: [
            slot("chg_term", IrqHandler::ChargeTerm),
            slot("taper", IrqHandler::Taper),
            slot("recharge", IrqHandler::Recharge),
            slot("fast_chg", IrqHandler::FastCharge),
        ],
    },
    IrqRow {
        reg: Reg::IRQ_D,
        slots: [
            unhandled("prechg_timeout"),
            slot("safety_timeout", IrqHandler::SafetyTimeout),
            unhandled("aicl_done"),
            unhandled("battery_ov"),
        ],
    },
    IrqRow {
        reg: Reg::IRQ_E,
        slots: [
            slot("usbin_uv", IrqHandler::UsbinUv),
            slot("usbin_ov", IrqHandler::UsbinOv),
            slot("dcin_uv", IrqHandler::DcinUv),
            slot("dcin_ov", IrqHandler::DcinOv),
        ],
    },
    IrqRow {
        reg: Reg::IRQ_F,
        slots: [
            slot("power_ok", IrqHandler::PowerOk),
            slot("rid", IrqHandler::Rid),
            unhandled("otg_fail"),
            unhandled("otg_oc"),
        ],
    },
    IrqRow {
        reg: Reg::IRQ_G,
        slots: [
            slot("chg_inhibit", IrqHandler::ChargeInhibit),
            unhandled("chg_error"),
            unhandled("wd_timeout"),
            slot("src_detect", IrqHandler::SrcDetect),
        ],
    },
];

/// Transitions seen on one source since init
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct IrqCount {
    /// Events with the status bit set
    pub high: u32,
    /// Events with the status bit clear
    pub low: u32,
}

/// Counters of every source, indexed like [`IRQ_TABLE`].
pub type IrqCounts = [[IrqCount; IRQ_SLOTS]; IRQ_ROWS];

/// Handlers due after one read of the status registers, with their status bit.
pub type DueHandlers = Vec<(IrqHandler, bool), { IRQ_ROWS * IRQ_SLOTS }>;

#[derive(Default)]
pub(crate) struct IrqTracker {
    prev: [u8; IRQ_ROWS],
    counts: IrqCounts,
}

impl IrqTracker {
    /// Compare a fresh read of the status registers with the previous one.
    ///
    /// A source is due when its latch is set or its status bit flipped.
    pub fn update(&mut self, vals: &[u8; IRQ_ROWS]) -> DueHandlers {
        let mut due = DueHandlers::new();
        for (i, row) in IRQ_TABLE.iter().enumerate() {
            let now = IrqStatus::from_bytes([vals[i]]);
            let before = IrqStatus::from_bytes([self.prev[i]]);
            for (j, irq) in row.slots.iter().enumerate() {
                let bit = now.slot(j);
                let changed = bit.status != before.slot(j).status;
                if !(bit.latched || changed) {
                    continue;
                }
                let count = &mut self.counts[i][j];
                if bit.status {
                    count.high += 1;
                } else {
                    count.low += 1;
                }
                if let Some(handler) = irq.handler {
                    // one entry per slot at most, and the capacity is the slot count
                    let pushed = due.push((handler, bit.status));
                    debug_assert!(pushed.is_ok());
                }
            }
            self.prev[i] = vals[i];
        }
        due
    }

    pub fn counts(&self) -> IrqCounts {
        self.counts
    }
}

/// Total transitions recorded for the source called `name`.
pub fn count_for(counts: &IrqCounts, name: &str) -> u32 {
    IRQ_TABLE
        .iter()
        .zip(counts.iter())
        .flat_map(|(row, counts)| row.slots.iter().zip(counts.iter()))
        .filter(|(slot, _)| slot.name == name)
        .map(|(_, c)| c.high + c.low)
        .sum()
}
