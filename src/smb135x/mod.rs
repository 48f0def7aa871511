//! Driver for the SMB1356/7/8/9 switch-mode battery chargers.
//!
//! [`Smb135x`] programs the chip at [`init`](Smb135x::init), tracks its interrupt sources
//! and implements [`ChargerBackend`] so a [`ChargerCore`](crate::charger::ChargerCore) can
//! drive it. The USB input reports into an optional [`UsbSupply`]; a DC input (wall
//! adapter or wireless pad) is described by [`Config::dc`].
//!
//! Each input path can be suspended for several reasons at once (see [`REASON_USER`],
//! [`REASON_THERMAL`] and [`REASON_CURRENT`]). The hardware is only touched when a path
//! goes from no reason to some reason or back.

use defmt_or_log::{debug, error, info, warn};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use heapless::Vec;

use crate::battery::Health;
use crate::charger::{AdapterSource, Adapters, ChargerBackend, InterruptSummary, MAX_ADAPTERS};
use crate::host::{SupplyType, UsbSupply};
use crate::Error;

mod bus;
mod irq;
mod regs;
mod variant;

pub use bus::{RegisterBus, RETRY_SLEEP_MS};
pub use irq::{
    count_for, DueHandlers, IrqCount, IrqCounts, IrqHandler, IrqRow, IrqSlot, IRQ_ROWS, IRQ_SLOTS,
    IRQ_TABLE,
};
pub use regs::ADDR;
pub use variant::{ChipVersion, Revision};

use irq::IrqTracker;
use regs::*;
use variant::*;

/// Fixed USB input modes, mA
pub const CURRENT_100_MA: u32 = 100;
#[allow(missing_docs)]
pub const CURRENT_150_MA: u32 = 150;
#[allow(missing_docs)]
pub const CURRENT_500_MA: u32 = 500;
#[allow(missing_docs)]
pub const CURRENT_900_MA: u32 = 900;

/// A USB request of this many mA parks the USB path instead of programming a limit.
pub const SUSPEND_CURRENT_MA: u32 = 2;

/// Accepted DC input current, mA
pub const DC_MIN_MA: u32 = 300;
#[allow(missing_docs)]
pub const DC_MAX_MA: u32 = 2000;

/// Delay between a wireless pad appearing and its input being enabled.
pub const DCIN_UNSUSPEND_DELAY_MS: u32 = 1000;

/// Thermal mitigation levels a [`Config`] can hold.
pub const MAX_THERMAL_LEVELS: usize = 8;

/// Suspended on request of the charger core
pub const REASON_USER: u8 = 1 << 0;
/// Suspended by the highest thermal mitigation level
pub const REASON_THERMAL: u8 = 1 << 1;
/// Suspended by a current request or a pending wireless input
pub const REASON_CURRENT: u8 = 1 << 2;

/// The DC input of the board.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct DcInput {
    /// What feeds it, usually [`SupplyType::Mains`] or [`SupplyType::Wireless`]
    pub supply_type: SupplyType,
    /// Input current limit, mA
    pub max_ma: u32,
}

impl DcInput {
    fn is_wireless(&self) -> bool {
        self.supply_type == SupplyType::Wireless
    }
}

/// Board configuration of the charger.
#[derive(Debug, Clone)]
pub struct Config {
    /// Float voltage, mV. Left as is when `None`.
    pub vfloat_mv: Option<u32>,
    /// Termination current, mA
    pub iterm_ma: Option<u32>,
    /// Disable current termination. Conflicts with `iterm_ma`.
    pub iterm_disabled: bool,
    /// Safety timer, minutes. Zero disables it.
    pub safety_time_min: Option<u32>,
    /// Drop below float voltage that restarts charging, mV
    pub resume_delta_mv: Option<u32>,
    /// Keep charging off after init
    pub charging_disabled: bool,
    /// Detect a missing battery through the thermistor instead of the algorithm
    pub bmd_algo_disabled: bool,
    /// Disable float voltage compensation in the soft hot and cold zones
    pub soft_vfloat_comp_disabled: bool,
    /// DC input, if wired
    pub dc: Option<DcInput>,
    /// USB current ceiling per thermal level, mA. The last level suspends both inputs.
    pub thermal_mitigation: Vec<u32, MAX_THERMAL_LEVELS>,
    /// The interrupt line is wired
    pub irq_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            vfloat_mv: None,
            iterm_ma: None,
            iterm_disabled: false,
            safety_time_min: None,
            resume_delta_mv: None,
            charging_disabled: false,
            bmd_algo_disabled: false,
            soft_vfloat_comp_disabled: false,
            dc: None,
            thermal_mitigation: Vec::new(),
            irq_enabled: true,
        }
    }
}

/// What the driver knows about the chip and its inputs.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ChipStatus {
    /// Chip variant, once identified
    pub version: Option<ChipVersion>,
    /// Silicon revision, once identified
    pub revision: Option<Revision>,
    /// Battery detected
    pub battery_present: bool,
    /// Above the hard hot limit
    pub battery_hot: bool,
    /// Below the hard cold limit
    pub battery_cold: bool,
    /// Above the soft hot limit
    pub battery_warm: bool,
    /// Below the soft cold limit
    pub battery_cool: bool,
    /// Charge terminated or inhibited
    pub charge_done: bool,
    /// USB input powered
    pub usb_present: bool,
    /// An OTG device hangs off the USB port
    pub usb_slave_present: bool,
    /// DC input powered
    pub dc_present: bool,
    /// DC input over-voltage
    pub dc_over_voltage: bool,
    /// Charging enabled by command
    pub charging_enabled: bool,
    /// Reasons the USB path is suspended
    pub usb_suspended: u8,
    /// Reasons the DC path is suspended
    pub dc_suspended: u8,
    /// Selected thermal mitigation level
    pub thermal_level: usize,
}

impl ChipStatus {
    /// Battery health as seen by the charger's temperature comparators.
    pub fn battery_health(&self) -> Health {
        if !self.battery_present {
            Health::Unknown
        } else if self.battery_hot {
            Health::Overheat
        } else if self.battery_cold {
            Health::Cold
        } else {
            Health::Good
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
enum Path {
    Usb,
    Dc,
}

#[derive(Default, Debug, Copy, Clone)]
struct PathSuspend {
    usb: u8,
    dc: u8,
}

impl PathSuspend {
    fn get(&self, path: Path) -> u8 {
        match path {
            Path::Usb => self.usb,
            Path::Dc => self.dc,
        }
    }

    fn set(&mut self, path: Path, reasons: u8) {
        match path {
            Path::Usb => self.usb = reasons,
            Path::Dc => self.dc = reasons,
        }
    }
}

#[derive(Default, Debug, Copy, Clone)]
struct Workarounds {
    usb100: bool,
    apsd_fail: bool,
}

#[derive(Default)]
struct ChipState {
    status: ChipStatus,
    workarounds: Workarounds,
    usb_request_ma: Option<u32>,
    dc_unsuspend_pending: bool,
}

#[derive(Default)]
struct IrqState {
    tracker: IrqTracker,
    waiting: bool,
    resume_completed: bool,
    saved_cfg: [u8; 3],
}

/// An SMB135x charger.
///
/// Locks are always taken in the order interrupt, state, path suspension, bus.
pub struct Smb135x<M: RawMutex, I, D, U> {
    bus: Mutex<M, RegisterBus<I, D>>,
    paths: Mutex<M, PathSuspend>,
    state: Mutex<M, ChipState>,
    irq: Mutex<M, IrqState>,
    usb: Option<U>,
    config: Config,
}

impl<M: RawMutex, I: I2c, D: DelayNs, U: UsbSupply> Smb135x<M, I, D, U> {
    /// Create a driver. Nothing is sent to the chip before [`init`](Self::init).
    pub fn new(bus: RegisterBus<I, D>, usb: Option<U>, config: Config) -> Self {
        Smb135x {
            bus: Mutex::new(bus),
            paths: Mutex::new(PathSuspend::default()),
            state: Mutex::new(ChipState::default()),
            irq: Mutex::new(IrqState::default()),
            usb,
            config,
        }
    }

    /// Board configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Find the chip, program it from the configuration and read the input state.
    ///
    /// Interrupts are serviced only after this succeeds.
    pub async fn init(&self) -> Result<(), Error> {
        if let Some(dc) = &self.config.dc {
            if !(DC_MIN_MA..=DC_MAX_MA).contains(&dc.max_ma) {
                error!("bad dc current {} mA", dc.max_ma);
                return Err(Error::InvalidArgument);
            }
        }

        if self.read(Reg::CFG_4).await.is_err() {
            error!("no SMB135x found");
            return Err(Error::DeviceNotFound);
        }

        let (version, revision) = self.identify().await?;
        let usb100 = (self.read(Reg::TRIM_23).await? & CHECK_USB100_GOOD) != 0;
        {
            let mut state = self.state.lock().await;
            state.status.version = Some(version);
            state.status.revision = Some(revision);
            state.workarounds = Workarounds {
                usb100,
                apsd_fail: revision.apsd_broken(),
            };
        }
        info!("SMB135x {:?} revision {:?}", version, revision);

        self.hw_init(version, usb100).await?;
        self.determine_initial_status().await?;
        self.irq.lock().await.resume_completed = true;
        Ok(())
    }

    async fn identify(&self) -> Result<(ChipVersion, Revision), Error> {
        let revision = Revision::from_status9(self.read(Reg::STATUS_9).await?).map_err(|e| {
            error!("unknown revision");
            e
        })?;

        if (self.read(Reg::VERSION3).await? & SMB1356_VERSION3) != 0 {
            return Ok((ChipVersion::Smb1356, revision));
        }
        let field = if revision <= Revision::Rev1_1 {
            (self.read(Reg::VERSION1).await? & VERSION1_MASK) >> VERSION1_SHIFT
        } else {
            self.read(Reg::VERSION2).await? & VERSION2_MASK
        };
        let version = ChipVersion::from_field(field).map_err(|e| {
            error!("unknown version {:#x}", field);
            e
        })?;
        Ok((version, revision))
    }

    async fn hw_init(&self, version: ChipVersion, usb100: bool) -> Result<(), Error> {
        let cfg = &self.config;

        self.masked_write(Reg::CMD_I2C, ALLOW_VOLATILE, ALLOW_VOLATILE).await?;

        // with the USB100 erratum the APSD ratings stay in charge of the input current
        let use_register = if usb100 { 0 } else { USE_REGISTER_FOR_CURRENT };
        self.masked_write(Reg::CMD_INPUT_LIMIT, USE_REGISTER_FOR_CURRENT, use_register)
            .await?;
        self.masked_write(Reg::CFG_E, POLARITY_100_500 | USB_CTRL_BY_PIN, POLARITY_100_500)
            .await?;
        self.masked_write(
            Reg::CFG_14,
            CHG_EN_BY_PIN | CHG_EN_ACTIVE_LOW | PRE_TO_FAST_REQ_CMD | DISABLE_AUTO_RECHARGE | EN_CHG_INHIBIT,
            EN_CHG_INHIBIT,
        )
        .await?;
        self.masked_write(Reg::USBIN_DCIN_CFG, USBIN_SUSPEND_VIA_COMMAND, USBIN_SUSPEND_VIA_COMMAND)
            .await?;

        if let Some(mv) = cfg.vfloat_mv {
            self.write(Reg::VFLOAT, float_voltage_code(mv)?).await?;
        }

        match (cfg.iterm_ma, cfg.iterm_disabled) {
            (Some(_), true) => {
                error!("termination current set while termination is disabled");
                return Err(Error::InvalidArgument);
            }
            (Some(ma), false) => {
                self.masked_write(Reg::CFG_3, ITERM_MASK, iterm_code(ma)).await?;
                self.masked_write(Reg::CFG_14, DISABLE_CURRENT_TERM, 0).await?;
            }
            (None, true) => {
                self.masked_write(Reg::CFG_14, DISABLE_CURRENT_TERM, DISABLE_CURRENT_TERM)
                    .await?;
            }
            (None, false) => {}
        }

        match cfg.safety_time_min {
            Some(0) => self.masked_write(Reg::CFG_16, SAFETY_TIME_EN, 0).await?,
            Some(minutes) => {
                let code = safety_time_code(minutes)?;
                self.masked_write(Reg::CFG_16, SAFETY_TIME_EN | SAFETY_TIME_MINUTES_MASK, code)
                    .await?
            }
            None => {}
        }

        let bmd = if cfg.bmd_algo_disabled {
            BATT_MISSING_THERM
        } else {
            BATT_MISSING_ALGO
        };
        self.masked_write(Reg::CFG_19, BATT_MISSING_ALGO | BATT_MISSING_THERM, bmd)
            .await?;

        self.charging(!cfg.charging_disabled).await?;

        if cfg.irq_enabled {
            self.masked_write(
                Reg::CFG_17,
                CHG_STAT_IRQ_ONLY | CHG_STAT_ACTIVE_HIGH | CHG_STAT_DISABLE,
                CHG_STAT_IRQ_ONLY,
            )
            .await?;
            self.write(
                Reg::IRQ_CFG,
                IRQ_HOT_COLD_HARD | IRQ_HOT_COLD_SOFT | IRQ_INTERNAL_TEMP | IRQ_USBIN_UV,
            )
            .await?;
            self.write(
                Reg::IRQ2_CFG,
                IRQ2_SAFETY_TIMER
                    | IRQ2_CHG_ERR
                    | IRQ2_CHG_PHASE_CHANGE
                    | IRQ2_POWER_OK
                    | IRQ2_BATT_MISSING
                    | IRQ2_VBAT_LOW,
            )
            .await?;
            self.write(Reg::IRQ3_CFG, IRQ3_SRC_DETECT | IRQ3_DCIN_UV | IRQ3_RID_DETECT)
                .await?;
        }

        if let Some(mv) = cfg.resume_delta_mv {
            let (inhibit, recharge) = resume_delta_codes(mv);
            self.masked_write(Reg::CFG_4, CHG_INHIBIT_MASK, inhibit).await?;
            self.masked_write(Reg::CFG_5, RECHARGE_200MV, recharge).await?;
        }

        if let Some(dc) = &cfg.dc {
            self.program_dc_current(version, dc.max_ma).await?;
        }

        // externally powered batteries would push the chip into reverse boost
        if cfg.soft_vfloat_comp_disabled {
            self.masked_write(Reg::CFG_1A, HOT_SOFT_VFLOAT_COMP_EN | COLD_SOFT_VFLOAT_COMP_EN, 0)
                .await?;
        }
        Ok(())
    }

    async fn determine_initial_status(&self) -> Result<(), Error> {
        let irq_b = self.read(Reg::IRQ_B).await?;
        let status4 = Status4::from_bytes([self.read(Reg::STATUS_4).await?]);
        let irq_a = self.read(Reg::IRQ_A).await?;
        let irq_c = self.read(Reg::IRQ_C).await?;
        let irq_e = self.read(Reg::IRQ_E).await?;

        let mut state = self.state.lock().await;
        let status = &mut state.status;
        status.battery_present = (irq_b & (IRQ_B_BATT_TERMINAL | IRQ_B_BATT_MISSING)) == 0
            && !status4.battery_below_2v();
        status.battery_hot = (irq_a & IRQ_A_HOT_HARD) != 0;
        status.battery_cold = (irq_a & IRQ_A_COLD_HARD) != 0;
        status.battery_warm = (irq_a & IRQ_A_HOT_SOFT) != 0;
        status.battery_cool = (irq_a & IRQ_A_COLD_SOFT) != 0;
        status.charge_done = (irq_c & IRQ_C_TERM) != 0;
        status.usb_present = (irq_e & (IRQ_E_USB_OV | IRQ_E_USB_UV)) == 0;
        status.dc_present = (irq_e & (IRQ_E_DC_OV | IRQ_E_DC_UV)) == 0;

        if state.status.usb_present {
            self.usb_insertion(&state).await?;
        } else {
            self.usb_removal(&state);
        }

        if self.config.dc.is_some_and(|dc| dc.is_wireless()) {
            self.path_suspend(Path::Dc, REASON_CURRENT, !state.status.dc_present)
                .await?;
        }

        state.status.usb_slave_present = self.usb_slave_present().await;
        if let Some(usb) = &self.usb {
            usb.set_usb_otg(state.status.usb_slave_present);
        }
        Ok(())
    }

    /// Turn charging on or off. Off also suspends both inputs on behalf of the user.
    pub async fn charging(&self, enable: bool) -> Result<(), Error> {
        let val = if enable { CMD_CHG_EN } else { 0 };
        self.masked_write(Reg::CMD_CHG, CMD_CHG_EN, val).await?;
        self.state.lock().await.status.charging_enabled = enable;
        self.path_suspend(Path::Dc, REASON_USER, !enable).await?;
        self.path_suspend(Path::Usb, REASON_USER, !enable).await
    }

    /// Apply a USB current request, capped by the thermal mitigation level.
    ///
    /// Fails with [`Error::InvalidState`] when no USB supply is known or its type is not
    /// detected yet, and with [`Error::PermissionDenied`] when the battery is absent.
    pub async fn set_usb_current(&self, ma: u32) -> Result<(), Error> {
        let Some(usb) = &self.usb else {
            warn!("no usb supply, ignoring {} mA", ma);
            return Err(Error::InvalidState);
        };
        if usb.supply_type() == SupplyType::Unknown {
            debug!("usb type not detected, ignoring {} mA", ma);
            return Err(Error::InvalidState);
        }

        let mut state = self.state.lock().await;
        state.usb_request_ma = Some(ma);
        if !self.battery_present(&state).await {
            info!("battery absent, ignoring {} mA", ma);
            return Err(Error::PermissionDenied);
        }

        let target = self.thermal_ceiling(state.status.thermal_level, ma).min(ma);
        debug!("usb current request {} mA, programming {} mA", ma, target);
        self.program_usb_current(&state, target).await
    }

    /// Select a thermal mitigation level.
    ///
    /// The highest level suspends both inputs. Leaving it resumes them.
    pub async fn set_thermal_level(&self, level: usize) -> Result<(), Error> {
        let levels = self.config.thermal_mitigation.len();
        if level >= levels {
            error!("thermal level {} out of {}", level, levels);
            return Err(Error::InvalidArgument);
        }

        let mut state = self.state.lock().await;
        let prev = state.status.thermal_level;
        if level == prev {
            return Ok(());
        }
        info!("thermal level {} -> {}", prev, level);

        let top = levels - 1;
        if level == top {
            self.path_suspend(Path::Dc, REASON_THERMAL, true).await?;
            self.path_suspend(Path::Usb, REASON_THERMAL, true).await?;
            state.status.thermal_level = level;
            return Ok(());
        }

        if state.status.usb_present {
            if let Some(requested) = state.usb_request_ma {
                let target = self.thermal_ceiling(level, requested).min(requested);
                self.program_usb_current(&state, target).await?;
            }
        }
        if let (Some(dc), Some(version)) = (&self.config.dc, state.status.version) {
            let target = self.thermal_ceiling(level, dc.max_ma).min(dc.max_ma);
            self.program_dc_current(version, target).await?;
        }

        if prev == top {
            self.path_suspend(Path::Dc, REASON_THERMAL, false).await?;
            self.path_suspend(Path::Usb, REASON_THERMAL, false).await?;
        }
        // only a fully applied level is recorded
        state.status.thermal_level = level;
        Ok(())
    }

    fn thermal_ceiling(&self, level: usize, path_ma: u32) -> u32 {
        let table = &self.config.thermal_mitigation;
        if level > 0 && level + 1 < table.len() {
            table[level]
        } else {
            path_ma
        }
    }

    async fn battery_present(&self, state: &ChipState) -> bool {
        match self.read(Reg::STATUS_4).await {
            Ok(val) => state.status.battery_present && !Status4::from_bytes([val]).battery_below_2v(),
            Err(_) => false,
        }
    }

    async fn program_usb_current(&self, state: &ChipState, ma: u32) -> Result<(), Error> {
        if ma == SUSPEND_CURRENT_MA {
            return self.path_suspend(Path::Usb, REASON_CURRENT, true).await;
        }

        let mut ma = if ma == 0 { CURRENT_100_MA } else { ma };
        if state.workarounds.usb100 && ma < CURRENT_500_MA {
            info!("usb100 erratum, using {} mA instead of {} mA", CURRENT_500_MA, ma);
            ma = CURRENT_500_MA;
        }
        let table = state.status.version.ok_or(Error::InvalidState)?.usb_current_table();

        {
            let mut bus = self.bus.lock().await;
            let mode = match ma {
                _ if ma < CURRENT_150_MA => {
                    bus.masked_write(Reg::CFG_5, USB_2_3, 0).await?;
                    USB_100_VAL
                }
                CURRENT_150_MA => {
                    bus.masked_write(Reg::CFG_5, USB_2_3, USB_2_3).await?;
                    USB_100_VAL
                }
                CURRENT_500_MA => {
                    bus.masked_write(Reg::CFG_5, USB_2_3, 0).await?;
                    USB_500_VAL
                }
                CURRENT_900_MA => {
                    bus.masked_write(Reg::CFG_5, USB_2_3, USB_2_3).await?;
                    USB_500_VAL
                }
                _ => {
                    let idx = current_index(table, ma) & USBIN_INPUT_MASK;
                    bus.masked_write(Reg::CFG_C, USBIN_INPUT_MASK, idx).await?;
                    USB_AC_VAL
                }
            };
            bus.masked_write(Reg::CMD_INPUT_LIMIT, USB_100_500_AC_MASK, mode).await?;
        }

        self.path_suspend(Path::Usb, REASON_CURRENT, false).await
    }

    async fn program_dc_current(&self, version: ChipVersion, ma: u32) -> Result<(), Error> {
        let idx = current_index(version.dc_current_table(), ma) & DCIN_INPUT_MASK;
        self.masked_write(Reg::CFG_10, DCIN_INPUT_MASK, idx).await
    }

    async fn path_suspend(&self, path: Path, reason: u8, suspend: bool) -> Result<(), Error> {
        let mut paths = self.paths.lock().await;
        let current = paths.get(path);
        let next = if suspend {
            current | reason
        } else {
            current & !reason
        };

        if (current == 0) != (next == 0) {
            let bit = match path {
                Path::Usb => USB_SHUTDOWN,
                Path::Dc => DC_SHUTDOWN,
            };
            let val = if next != 0 { bit } else { 0 };
            if let Err(e) = self.masked_write(Reg::CMD_INPUT_LIMIT, bit, val).await {
                error!("couldn't change {:?} suspension: {}", path, e);
                return Err(e);
            }
        }
        paths.set(path, next);
        Ok(())
    }

    /// Enable a wireless input that appeared earlier.
    ///
    /// Waits [`DCIN_UNSUSPEND_DELAY_MS`] first. Does nothing if no insertion is pending or
    /// the pad went away while waiting.
    pub async fn finish_dc_insertion<T: DelayNs>(&self, mut delay: T) -> Result<(), Error> {
        if !self.state.lock().await.dc_unsuspend_pending {
            return Ok(());
        }
        delay.delay_ms(DCIN_UNSUSPEND_DELAY_MS).await;

        let mut state = self.state.lock().await;
        if !state.dc_unsuspend_pending {
            debug!("dc removed before unsuspend");
            return Ok(());
        }
        state.dc_unsuspend_pending = false;
        self.path_suspend(Path::Dc, REASON_CURRENT, false).await
    }

    /// Read every IRQ status register and run the handlers of sources that fired.
    ///
    /// Before [`init`](Self::init) or between [`suspend`](Self::suspend) and
    /// [`resume`](Self::resume) the interrupt is only remembered.
    pub async fn service_irq(&self) -> InterruptSummary {
        let mut irq = self.irq.lock().await;
        irq.waiting = true;
        if !irq.resume_completed {
            debug!("irq before resume, deferred");
            return InterruptSummary::default();
        }
        irq.waiting = false;

        let vals = self.read_irq_status().await;
        let due = irq.tracker.update(&vals);

        let mut summary = InterruptSummary::default();
        let mut state = self.state.lock().await;
        for (handler, high) in due {
            summary.handled += 1;
            if let Err(e) = self.dispatch(&mut state, handler, high, &mut summary).await {
                error!("irq {:?} failed: {}", handler, e);
            }
        }
        debug!("{} irq handlers ran", summary.handled);
        summary
    }

    async fn read_irq_status(&self) -> [u8; IRQ_ROWS] {
        let paths = self.paths.lock().await;
        let mut bus = self.bus.lock().await;

        // a suspended DC input keeps its status latched
        let dc_suspended = paths.dc != 0;
        if dc_suspended && bus.masked_write(Reg::CMD_INPUT_LIMIT, DC_SHUTDOWN, 0).await.is_err() {
            error!("couldn't unsuspend dc for irq read");
        }

        let mut vals = [0u8; IRQ_ROWS];
        for (val, row) in vals.iter_mut().zip(IRQ_TABLE.iter()) {
            *val = bus.read(row.reg).await.unwrap_or(0);
        }

        if dc_suspended
            && bus
                .masked_write(Reg::CMD_INPUT_LIMIT, DC_SHUTDOWN, DC_SHUTDOWN)
                .await
                .is_err()
        {
            error!("couldn't restore dc suspension");
        }
        vals
    }

    async fn dispatch(
        &self,
        state: &mut ChipState,
        handler: IrqHandler,
        high: bool,
        summary: &mut InterruptSummary,
    ) -> Result<(), Error> {
        debug!("irq {:?} status {}", handler, high);
        match handler {
            IrqHandler::ColdSoft => state.status.battery_cool = high,
            IrqHandler::HotSoft => state.status.battery_warm = high,
            IrqHandler::ColdHard => state.status.battery_cold = high,
            IrqHandler::HotHard => state.status.battery_hot = high,
            IrqHandler::ChargerHot => warn!("charger hot"),
            IrqHandler::VbatLow => warn!("battery voltage low"),
            IrqHandler::SafetyTimeout => warn!("safety timer expired"),
            IrqHandler::BatteryMissing => state.status.battery_present = !high,
            IrqHandler::ChargeTerm | IrqHandler::ChargeInhibit => {
                state.status.charge_done = high;
                summary.charge_complete |= high;
            }
            IrqHandler::Taper | IrqHandler::Recharge | IrqHandler::FastCharge | IrqHandler::PowerOk => {}
            IrqHandler::UsbinUv | IrqHandler::UsbinOv => {
                if state.status.usb_present && high {
                    state.status.usb_present = false;
                    self.usb_removal(state);
                    summary.source_changed = true;
                }
                if handler == IrqHandler::UsbinOv {
                    if let Some(usb) = &self.usb {
                        usb.set_health(if high { Health::OverVoltage } else { Health::Good });
                    }
                }
            }
            IrqHandler::DcinUv | IrqHandler::DcinOv => {
                if handler == IrqHandler::DcinOv {
                    state.status.dc_over_voltage = high;
                }
                let present = !high;
                if state.status.dc_present != present {
                    state.status.dc_present = present;
                    summary.source_changed = true;
                    if present {
                        self.dc_insertion(state, summary);
                    } else {
                        self.dc_removal(state).await?;
                    }
                }
            }
            IrqHandler::SrcDetect => {
                if !state.status.usb_present && high {
                    state.status.usb_present = true;
                    summary.source_changed = true;
                    self.usb_insertion(state).await?;
                }
            }
            IrqHandler::Rid => {
                let slave = self.usb_slave_present().await;
                if slave != state.status.usb_slave_present {
                    state.status.usb_slave_present = slave;
                    if let Some(usb) = &self.usb {
                        usb.set_usb_otg(slave);
                    }
                }
            }
        }
        Ok(())
    }

    async fn usb_insertion(&self, state: &ChipState) -> Result<(), Error> {
        let mut stat5 = self.read(Reg::STATUS_5).await?;
        // a zero status lets the USB stack run its own detection
        if state.workarounds.apsd_fail {
            stat5 = 0;
        }
        let supply_type = usb_supply_type(stat5);
        info!("usb inserted: {:?} (status 5 {:#x})", supply_type, stat5);
        if let Some(usb) = &self.usb {
            usb.set_supply_type(supply_type);
            usb.set_present(state.status.usb_present);
        }
        Ok(())
    }

    fn usb_removal(&self, state: &ChipState) {
        info!("usb removed");
        if let Some(usb) = &self.usb {
            usb.set_supply_type(SupplyType::Unknown);
            usb.set_present(state.status.usb_present);
        }
    }

    fn dc_insertion(&self, state: &mut ChipState, summary: &mut InterruptSummary) {
        info!("dc inserted");
        if self.config.dc.is_some_and(|dc| dc.is_wireless()) {
            state.dc_unsuspend_pending = true;
            summary.dc_unsuspend_pending = true;
        }
    }

    async fn dc_removal(&self, state: &mut ChipState) -> Result<(), Error> {
        info!("dc removed");
        if self.config.dc.is_some_and(|dc| dc.is_wireless()) {
            state.dc_unsuspend_pending = false;
            self.path_suspend(Path::Dc, REASON_CURRENT, true).await?;
        }
        Ok(())
    }

    async fn usb_slave_present(&self) -> bool {
        match self.read(Reg::STATUS_6).await {
            Ok(val) => (val & RID_MASK) == 0,
            Err(_) => false,
        }
    }

    /// Prepare for system sleep: save the IRQ configuration and keep only wake-worthy sources.
    pub async fn suspend(&self) {
        let mut irq = self.irq.lock().await;
        let mut bus = self.bus.lock().await;

        for (i, saved) in irq.saved_cfg.iter_mut().enumerate() {
            match bus.read(Reg::IRQ_CFG.offset(i as u8)).await {
                Ok(val) => *saved = val,
                Err(e) => error!("couldn't save irq config: {}", e),
            }
        }

        let wake_sources = [
            IRQ_USBIN_UV,
            IRQ2_BATT_MISSING | IRQ2_VBAT_LOW | IRQ2_POWER_OK,
            IRQ3_SRC_DETECT | IRQ3_DCIN_UV | IRQ3_RID_DETECT,
        ];
        for (i, val) in wake_sources.into_iter().enumerate() {
            if let Err(e) = bus.write(Reg::IRQ_CFG.offset(i as u8), val).await {
                error!("couldn't set wake irqs: {}", e);
            }
        }
        irq.resume_completed = false;
    }

    /// Last suspend step. Fails if an interrupt arrived since [`suspend`](Self::suspend).
    pub async fn suspend_noirq(&self) -> Result<(), Error> {
        if self.irq.lock().await.waiting {
            warn!("aborting suspend, an interrupt is pending");
            return Err(Error::InvalidState);
        }
        Ok(())
    }

    /// Restore the IRQ configuration and service an interrupt that arrived while asleep.
    pub async fn resume(&self) -> InterruptSummary {
        let waiting = {
            let mut irq = self.irq.lock().await;
            let mut bus = self.bus.lock().await;
            for (i, val) in irq.saved_cfg.into_iter().enumerate() {
                if let Err(e) = bus.write(Reg::IRQ_CFG.offset(i as u8), val).await {
                    error!("couldn't restore irq config: {}", e);
                }
            }
            irq.resume_completed = true;
            irq.waiting
        };

        if waiting {
            self.service_irq().await
        } else {
            InterruptSummary::default()
        }
    }

    /// Copy of the chip and input state
    pub async fn status(&self) -> ChipStatus {
        let mut status = self.state.lock().await.status;
        let paths = *self.paths.lock().await;
        status.usb_suspended = paths.usb;
        status.dc_suspended = paths.dc;
        status
    }

    /// Transitions seen per interrupt source, indexed like [`IRQ_TABLE`]
    pub async fn irq_counts(&self) -> IrqCounts {
        self.irq.lock().await.tracker.counts()
    }

    async fn read(&self, reg: Reg) -> Result<u8, Error> {
        self.bus.lock().await.read(reg).await
    }

    async fn write(&self, reg: Reg, val: u8) -> Result<(), Error> {
        self.bus.lock().await.write(reg, val).await
    }

    async fn masked_write(&self, reg: Reg, mask: u8, val: u8) -> Result<(), Error> {
        self.bus.lock().await.masked_write(reg, mask, val).await
    }
}

impl<M: RawMutex, I: I2c, D: DelayNs, U: UsbSupply> ChargerBackend for Smb135x<M, I, D, U> {
    async fn enable_charging(&self, enable: bool) -> Result<(), Error> {
        self.charging(enable).await
    }

    async fn set_current_limit(&self, ma: u32) -> Result<(), Error> {
        self.set_usb_current(ma).await
    }

    async fn adapters(&self) -> Adapters {
        let state = self.state.lock().await;
        let paths = *self.paths.lock().await;
        let level = state.status.thermal_level;
        let mut adapters: Adapters = [None; MAX_ADAPTERS];

        let usb_ma = match &self.usb {
            Some(usb) if state.status.usb_present && (paths.usb & REASON_THERMAL) == 0 => {
                match usb.current_max_ma() {
                    0 => usb.supply_type().current_limit(),
                    negotiated => negotiated,
                }
            }
            _ => 0,
        };
        adapters[0] = Some(AdapterSource {
            name: "usb",
            max_ma: self.thermal_ceiling(level, usb_ma).min(usb_ma),
        });

        if let Some(dc) = &self.config.dc {
            let blocked = paths.dc & (REASON_THERMAL | REASON_CURRENT);
            let dc_ma = if state.status.dc_present && blocked == 0 {
                dc.max_ma
            } else {
                0
            };
            adapters[1] = Some(AdapterSource {
                name: "dc",
                max_ma: self.thermal_ceiling(level, dc_ma).min(dc_ma),
            });
        }
        adapters
    }

    async fn handle_interrupt(&self) -> InterruptSummary {
        self.service_irq().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charger::ChargerCore;
    use crate::testing::{FakeRegisters, FakeUsb, RecordingDelay};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    type Chip<'a> = Smb135x<NoopRawMutex, FakeRegisters, RecordingDelay, &'a FakeUsb>;

    const CMD_INPUT: u8 = 0x41;

    fn chip<'a>(regs: &FakeRegisters, usb: &'a FakeUsb, config: Config) -> Chip<'a> {
        let bus = RegisterBus::new(regs.clone(), RecordingDelay::default());
        Smb135x::new(bus, Some(usb), config)
    }

    /// An SMB1358 rev 2.0 with a battery, a standard USB port and no OTG device.
    fn smb1358() -> FakeRegisters {
        let regs = FakeRegisters::default();
        regs.set(0x4F, 0x03);
        regs.set(0x32, 0x02);
        regs.set(0x4B, 0x10);
        regs.set(0x4C, 0x01);
        // DC input absent
        regs.set(0x54, IRQ_E_DC_UV);
        regs
    }

    fn usb_attached(usb: &FakeUsb) {
        usb.supply_type.set(SupplyType::Usb);
    }

    #[test]
    fn init_identifies_and_programs_the_chip() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let config = Config {
            vfloat_mv: Some(4200),
            iterm_ma: Some(100),
            safety_time_min: Some(500),
            resume_delta_mv: Some(150),
            ..Default::default()
        };
        let chip = chip(&regs, &usb, config);
        block_on(chip.init()).unwrap();

        let status = block_on(chip.status());
        assert_eq!(status.version, Some(ChipVersion::Smb1358));
        assert_eq!(status.revision, Some(Revision::Rev2_0));
        assert!(status.battery_present);
        assert!(status.charging_enabled);
        assert_eq!(status.battery_health(), Health::Good);

        assert_eq!(regs.get(0x1E), 0x23);
        assert_eq!(regs.get(0x03) & ITERM_MASK, 0x10);
        assert_eq!(regs.get(0x16), 0x18);
        assert_eq!(regs.get(0x04) & CHG_INHIBIT_MASK, CHG_INHIBIT_100MV);
        assert_eq!(regs.get(0x42) & CMD_CHG_EN, CMD_CHG_EN);
        assert_eq!(regs.get(CMD_INPUT) & USE_REGISTER_FOR_CURRENT, USE_REGISTER_FOR_CURRENT);
        assert_eq!(regs.get(0x07), 0xC5);
        assert_eq!(regs.get(0x08), 0xD7);
        assert_eq!(regs.get(0x09), 0x15);

        assert!(usb.present.get());
        assert_eq!(usb.supply_type.get(), SupplyType::Usb);
        assert!(!usb.otg.get());
    }

    #[test]
    fn early_revisions_use_version1_and_skip_source_typing() {
        let regs = smb1358();
        regs.set(0x4F, 0x02);
        regs.set(0x2A, 0x40);
        regs.set(0x23, CHECK_USB100_GOOD);
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();

        let status = block_on(chip.status());
        assert_eq!(status.version, Some(ChipVersion::Smb1357));
        assert_eq!(status.revision, Some(Revision::Rev1_1));
        assert_eq!(usb.supply_type.get(), SupplyType::Unknown);
        assert_eq!(regs.get(CMD_INPUT) & USE_REGISTER_FOR_CURRENT, 0);
    }

    #[test]
    fn smb1356_is_flagged_in_version3() {
        let regs = smb1358();
        regs.set(0x34, SMB1356_VERSION3);
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();
        assert_eq!(block_on(chip.status()).version, Some(ChipVersion::Smb1356));
    }

    #[test]
    fn silent_bus_means_no_device() {
        let regs = smb1358();
        regs.fail_next(6);
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        assert_eq!(block_on(chip.init()), Err(Error::DeviceNotFound));
    }

    #[test]
    fn conflicting_or_out_of_range_config_is_rejected() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let config = Config {
            iterm_ma: Some(100),
            iterm_disabled: true,
            ..Default::default()
        };
        assert_eq!(block_on(chip(&regs, &usb, config).init()), Err(Error::InvalidArgument));

        let config = Config {
            dc: Some(DcInput { supply_type: SupplyType::Mains, max_ma: 2500 }),
            ..Default::default()
        };
        assert_eq!(block_on(chip(&regs, &usb, config).init()), Err(Error::InvalidArgument));
    }

    #[test]
    fn initial_status_reads_battery_flags() {
        let regs = smb1358();
        regs.set(0x51, IRQ_B_BATT_MISSING);
        regs.set(0x50, IRQ_A_HOT_HARD | IRQ_A_COLD_SOFT);
        regs.set(0x52, IRQ_C_TERM);
        regs.set(0x54, IRQ_E_USB_UV | IRQ_E_DC_UV);
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();

        let status = block_on(chip.status());
        assert!(!status.battery_present);
        assert!(status.battery_hot);
        assert!(status.battery_cool);
        assert!(!status.battery_warm);
        assert!(status.charge_done);
        assert!(!status.usb_present);
        assert!(!usb.present.get());
        assert_eq!(status.battery_health(), Health::Unknown);
    }

    #[test]
    fn usb_current_modes() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();
        usb_attached(&usb);

        let mode = |regs: &FakeRegisters| regs.get(CMD_INPUT) & USB_100_500_AC_MASK;
        let usb_2_3 = |regs: &FakeRegisters| regs.get(0x05) & USB_2_3 != 0;

        block_on(chip.set_usb_current(500)).unwrap();
        assert_eq!((mode(&regs), usb_2_3(&regs)), (USB_500_VAL, false));
        block_on(chip.set_usb_current(900)).unwrap();
        assert_eq!((mode(&regs), usb_2_3(&regs)), (USB_500_VAL, true));
        block_on(chip.set_usb_current(150)).unwrap();
        assert_eq!((mode(&regs), usb_2_3(&regs)), (USB_100_VAL, true));
        block_on(chip.set_usb_current(0)).unwrap();
        assert_eq!((mode(&regs), usb_2_3(&regs)), (USB_100_VAL, false));

        block_on(chip.set_usb_current(1099)).unwrap();
        assert_eq!(mode(&regs), USB_AC_VAL);
        assert_eq!(regs.get(0x0C) & USBIN_INPUT_MASK, 11);
    }

    #[test]
    fn suspend_current_parks_usb_until_next_request() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();
        usb_attached(&usb);

        block_on(chip.set_usb_current(SUSPEND_CURRENT_MA)).unwrap();
        assert_eq!(regs.get(CMD_INPUT) & USB_SHUTDOWN, USB_SHUTDOWN);
        assert_eq!(block_on(chip.status()).usb_suspended, REASON_CURRENT);

        block_on(chip.set_usb_current(500)).unwrap();
        assert_eq!(regs.get(CMD_INPUT) & USB_SHUTDOWN, 0);
        assert_eq!(block_on(chip.status()).usb_suspended, 0);
    }

    #[test]
    fn usb100_erratum_raises_small_requests() {
        let regs = smb1358();
        regs.set(0x23, CHECK_USB100_GOOD);
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();
        usb_attached(&usb);

        block_on(chip.set_usb_current(100)).unwrap();
        assert_eq!(regs.get(CMD_INPUT) & USB_100_500_AC_MASK, USB_500_VAL);
    }

    #[test]
    fn current_requests_need_a_typed_usb_supply_and_a_battery() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();
        usb.supply_type.set(SupplyType::Unknown);

        assert_eq!(block_on(chip.set_usb_current(500)), Err(Error::InvalidState));

        usb_attached(&usb);
        regs.set(0x4A, 0x10);
        assert_eq!(block_on(chip.set_usb_current(500)), Err(Error::PermissionDenied));

        let no_usb: Chip<'_> = Smb135x::new(
            RegisterBus::new(regs.clone(), RecordingDelay::default()),
            None,
            Config::default(),
        );
        assert_eq!(block_on(no_usb.set_usb_current(500)), Err(Error::InvalidState));
    }

    #[test]
    fn path_suspension_touches_hardware_only_on_transitions() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();
        regs.clear_writes();

        block_on(chip.charging(false)).unwrap();
        assert_eq!(regs.get(CMD_INPUT) & (USB_SHUTDOWN | DC_SHUTDOWN), USB_SHUTDOWN | DC_SHUTDOWN);
        assert_eq!(regs.writes_to(CMD_INPUT).len(), 2);

        usb_attached(&usb);
        block_on(chip.set_usb_current(SUSPEND_CURRENT_MA)).unwrap();
        // already suspended by the user
        assert_eq!(regs.writes_to(CMD_INPUT).len(), 2);
        assert_eq!(block_on(chip.status()).usb_suspended, REASON_USER | REASON_CURRENT);

        block_on(chip.charging(true)).unwrap();
        let status = block_on(chip.status());
        assert_eq!(status.usb_suspended, REASON_CURRENT);
        assert_eq!(status.dc_suspended, 0);
        assert_eq!(regs.get(CMD_INPUT) & (USB_SHUTDOWN | DC_SHUTDOWN), USB_SHUTDOWN);
    }

    #[test]
    fn failed_suspend_write_is_not_committed() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();

        regs.fail_next(6);
        assert_eq!(
            block_on(chip.path_suspend(Path::Dc, REASON_USER, true)),
            Err(Error::Hardware)
        );
        assert_eq!(block_on(chip.status()).dc_suspended, 0);
        assert_eq!(regs.get(CMD_INPUT) & DC_SHUTDOWN, 0);

        block_on(chip.path_suspend(Path::Dc, REASON_USER, true)).unwrap();
        assert_eq!(block_on(chip.status()).dc_suspended, REASON_USER);
    }

    #[test]
    fn thermal_levels_cap_and_finally_suspend() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let config = Config {
            thermal_mitigation: Vec::from_slice(&[0, 700, 300, 0]).unwrap(),
            ..Default::default()
        };
        let chip = chip(&regs, &usb, config);
        block_on(chip.init()).unwrap();
        usb_attached(&usb);

        block_on(chip.set_usb_current(1000)).unwrap();
        assert_eq!(regs.get(0x0C) & USBIN_INPUT_MASK, 11);

        block_on(chip.set_thermal_level(1)).unwrap();
        assert_eq!(regs.get(0x0C) & USBIN_INPUT_MASK, 8);

        block_on(chip.set_thermal_level(3)).unwrap();
        let status = block_on(chip.status());
        assert_eq!(status.usb_suspended, REASON_THERMAL);
        assert_eq!(status.dc_suspended, REASON_THERMAL);
        assert_eq!(block_on(chip.adapters())[0].map(|a| a.max_ma), Some(0));

        block_on(chip.set_thermal_level(0)).unwrap();
        assert_eq!(regs.get(0x0C) & USBIN_INPUT_MASK, 11);
        assert_eq!(block_on(chip.status()).usb_suspended, 0);
        assert_eq!(regs.get(CMD_INPUT) & (USB_SHUTDOWN | DC_SHUTDOWN), 0);

        assert_eq!(block_on(chip.set_thermal_level(4)), Err(Error::InvalidArgument));
    }

    #[test]
    fn failed_thermal_reprogramming_keeps_the_old_level() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let config = Config {
            thermal_mitigation: Vec::from_slice(&[0, 700, 300, 0]).unwrap(),
            ..Default::default()
        };
        let chip = chip(&regs, &usb, config);
        block_on(chip.init()).unwrap();
        usb_attached(&usb);
        block_on(chip.set_usb_current(1000)).unwrap();

        regs.fail_next(6);
        assert_eq!(block_on(chip.set_thermal_level(1)), Err(Error::Hardware));
        assert_eq!(block_on(chip.status()).thermal_level, 0);
        assert_eq!(regs.get(0x0C) & USBIN_INPUT_MASK, 11);

        block_on(chip.set_thermal_level(1)).unwrap();
        assert_eq!(block_on(chip.status()).thermal_level, 1);
        assert_eq!(regs.get(0x0C) & USBIN_INPUT_MASK, 8);
    }

    #[test]
    fn usb_removal_and_source_detection() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();
        assert!(usb.present.get());

        // usbin_uv latched and high, dcin_uv unchanged
        regs.set(0x54, IRQ_E_DC_UV | 0x03);
        let summary = block_on(chip.service_irq());
        assert!(summary.source_changed);
        assert!(!usb.present.get());
        assert_eq!(usb.supply_type.get(), SupplyType::Unknown);
        assert!(!block_on(chip.status()).usb_present);

        // usb back: usbin_uv drops, src_detect fires with a DCP
        regs.set(0x54, IRQ_E_DC_UV);
        regs.set(0x56, 0xC0);
        regs.set(0x4B, 0x40);
        let summary = block_on(chip.service_irq());
        assert!(summary.source_changed);
        assert_eq!(summary.handled, 2);
        assert!(usb.present.get());
        assert_eq!(usb.supply_type.get(), SupplyType::UsbDcp);

        let counts = block_on(chip.irq_counts());
        assert_eq!(count_for(&counts, "usbin_uv"), 2);
        assert_eq!(count_for(&counts, "src_detect"), 1);
    }

    #[test]
    fn over_voltage_reports_usb_health() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();

        // usbin_ov slot 1: status bit 2, latch bit 3
        regs.set(0x54, IRQ_E_DC_UV | 0x0C);
        block_on(chip.service_irq());
        assert_eq!(usb.health.get(), Health::OverVoltage);
        assert!(!usb.present.get());
    }

    #[test]
    fn termination_and_temperature_irqs() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();

        regs.set(0x52, 0x03);
        regs.set(0x50, 0xC0);
        let summary = block_on(chip.service_irq());
        assert!(summary.charge_complete);
        let status = block_on(chip.status());
        assert!(status.charge_done);
        assert!(status.battery_hot);
        assert_eq!(status.battery_health(), Health::Overheat);
    }

    #[test]
    fn otg_device_follows_rid() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();
        assert!(!usb.otg.get());

        regs.set(0x4C, 0x00);
        // rid slot 1 latched
        regs.set(0x55, 0x08);
        block_on(chip.service_irq());
        assert!(usb.otg.get());
        assert!(block_on(chip.status()).usb_slave_present);
    }

    fn wireless() -> Config {
        Config {
            dc: Some(DcInput { supply_type: SupplyType::Wireless, max_ma: 1000 }),
            ..Default::default()
        }
    }

    #[test]
    fn absent_wireless_pad_keeps_dc_suspended_through_irq_reads() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, wireless());
        block_on(chip.init()).unwrap();
        assert_eq!(block_on(chip.status()).dc_suspended, REASON_CURRENT);
        assert_eq!(regs.get(CMD_INPUT) & DC_SHUTDOWN, DC_SHUTDOWN);

        regs.clear_writes();
        block_on(chip.service_irq());
        let writes = regs.writes_to(CMD_INPUT);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0] & DC_SHUTDOWN, 0);
        assert_eq!(writes[1] & DC_SHUTDOWN, DC_SHUTDOWN);
    }

    #[test]
    fn wireless_insertion_unsuspends_after_a_delay() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, wireless());
        block_on(chip.init()).unwrap();
        assert_eq!(block_on(chip.adapters())[1].map(|a| a.max_ma), Some(0));

        // dcin_uv drops, latch set
        regs.set(0x54, 0x20);
        let summary = block_on(chip.service_irq());
        assert!(summary.dc_unsuspend_pending);
        assert!(summary.source_changed);
        assert_eq!(block_on(chip.status()).dc_suspended, REASON_CURRENT);

        let delay = RecordingDelay::default();
        block_on(chip.finish_dc_insertion(delay.clone())).unwrap();
        assert_eq!(delay.waits_ms(), vec![DCIN_UNSUSPEND_DELAY_MS]);
        assert_eq!(block_on(chip.status()).dc_suspended, 0);
        assert_eq!(regs.get(CMD_INPUT) & DC_SHUTDOWN, 0);
        assert_eq!(block_on(chip.adapters())[1].map(|a| a.max_ma), Some(1000));

        // nothing pending any more
        let delay = RecordingDelay::default();
        block_on(chip.finish_dc_insertion(delay.clone())).unwrap();
        assert!(delay.waits_ms().is_empty());
    }

    #[test]
    fn wireless_removal_cancels_pending_unsuspend() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, wireless());
        block_on(chip.init()).unwrap();

        regs.set(0x54, 0x20);
        block_on(chip.service_irq());
        regs.set(0x54, 0x30);
        block_on(chip.service_irq());

        block_on(chip.finish_dc_insertion(RecordingDelay::default())).unwrap();
        assert_eq!(block_on(chip.status()).dc_suspended, REASON_CURRENT);
    }

    #[test]
    fn system_suspend_defers_interrupts_until_resume() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();

        block_on(chip.suspend());
        assert_eq!(regs.get(0x07), IRQ_USBIN_UV);
        assert_eq!(regs.get(0x08), IRQ2_BATT_MISSING | IRQ2_VBAT_LOW | IRQ2_POWER_OK);
        assert_eq!(block_on(chip.suspend_noirq()), Ok(()));

        regs.set(0x52, 0x03);
        assert_eq!(block_on(chip.service_irq()), InterruptSummary::default());
        assert_eq!(block_on(chip.suspend_noirq()), Err(Error::InvalidState));

        let summary = block_on(chip.resume());
        assert!(summary.charge_complete);
        assert_eq!(regs.get(0x07), 0xC5);
        assert_eq!(regs.get(0x08), 0xD7);
        assert_eq!(regs.get(0x09), 0x15);
        assert_eq!(block_on(chip.suspend_noirq()), Ok(()));
    }

    #[test]
    fn charger_core_drives_the_chip() {
        let regs = smb1358();
        let usb = FakeUsb::default();
        let chip = chip(&regs, &usb, Config::default());
        block_on(chip.init()).unwrap();
        usb.supply_type.set(SupplyType::UsbCdp);
        usb.current_max_ma.set(900);

        let core: ChargerCore<NoopRawMutex, &Chip<'_>> = ChargerCore::new("battery", &chip).unwrap();
        block_on(core.set_charging_current(1200)).unwrap();
        assert_eq!(block_on(core.charging_current()), 900);
        assert_eq!(regs.get(CMD_INPUT) & USB_100_500_AC_MASK, USB_500_VAL);
        assert_eq!(regs.get(0x05) & USB_2_3, USB_2_3);

        regs.set(0x52, 0x03);
        let summary = block_on(core.service_interrupt());
        assert!(summary.charge_complete);
        assert!(block_on(core.charger_info()).done);
    }
}
