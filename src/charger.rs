//! Charger arbitration.
//!
//! A [`ChargerCore`] wraps one chip backend and decides how much current it may draw. The
//! allowed current is the smallest of the best attached source, the battery and charge
//! ceilings, and what the caller asked for. Battery monitors find their charger by name
//! through a [`ChargerRegistry`].

use core::cell::RefCell;

use defmt_or_log::{debug, error, info, warn};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;

use crate::battery::Status;
use crate::Error;

/// Chargers a registry can hold.
pub const MAX_CHARGERS: usize = 4;

/// Input paths a backend can report.
pub const MAX_ADAPTERS: usize = 4;

/// Ceiling used for the battery, charge and recharge currents until told otherwise, mA.
pub const DEFAULT_CEILING_MA: u32 = 2000;

/// One power input of a charger.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct AdapterSource {
    /// Input name
    pub name: &'static str,
    /// Current the input can deliver right now, mA. Zero when nothing is attached.
    pub max_ma: u32,
}

/// The inputs of a charger, queried on every arbitration.
pub type Adapters = [Option<AdapterSource>; MAX_ADAPTERS];

/// Outcome of servicing a charger interrupt.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct InterruptSummary {
    /// Handlers that ran
    pub handled: u8,
    /// An input was attached or removed; the battery should re-arbitrate
    pub source_changed: bool,
    /// The charger terminated charging
    pub charge_complete: bool,
    /// A wireless input was attached and waits for its delayed unsuspend
    pub dc_unsuspend_pending: bool,
}

/// Hardware side of a charger.
#[allow(async_fn_in_trait)]
pub trait ChargerBackend {
    /// Turn charging on or off.
    async fn enable_charging(&self, enable: bool) -> Result<(), Error>;

    /// Program the input current limit.
    async fn set_current_limit(&self, ma: u32) -> Result<(), Error>;

    /// Report every input and what it can deliver.
    async fn adapters(&self) -> Adapters;

    /// Dispatch pending hardware interrupts.
    async fn handle_interrupt(&self) -> InterruptSummary {
        InterruptSummary::default()
    }
}

impl<T: ChargerBackend + ?Sized> ChargerBackend for &T {
    async fn enable_charging(&self, enable: bool) -> Result<(), Error> {
        T::enable_charging(self, enable).await
    }

    async fn set_current_limit(&self, ma: u32) -> Result<(), Error> {
        T::set_current_limit(self, ma).await
    }

    async fn adapters(&self) -> Adapters {
        T::adapters(self).await
    }

    async fn handle_interrupt(&self) -> InterruptSummary {
        T::handle_interrupt(self).await
    }
}

/// Events a backend or the platform can raise on a charger.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ChargerEvent {
    /// Charge terminated
    ChargeComplete,
    /// Reserved codes 1 and 2, accepted and ignored
    Reserved(u8),
    /// New battery current ceiling in mA
    BatteryCeilingChanged(u32),
}

impl ChargerEvent {
    /// Decode an event code and its parameter.
    pub fn from_raw(code: u32, param: u32) -> Result<Self, Error> {
        match code {
            0 => Ok(ChargerEvent::ChargeComplete),
            1 | 2 => Ok(ChargerEvent::Reserved(code as u8)),
            3 => Ok(ChargerEvent::BatteryCeilingChanged(param)),
            _ => Err(Error::PermissionDenied),
        }
    }
}

/// What a battery monitor learns from its charger.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ChargerInfo {
    /// Charging state
    pub status: Status,
    /// Programmed charge current, mA
    pub current_now_ma: u32,
    /// Charge terminated
    pub done: bool,
    /// At least one input can deliver current
    pub adapter_connected: bool,
}

/// Ceilings and flags of one charger.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ChargerState {
    /// Battery current ceiling, mA
    pub ibat_max_ma: u32,
    /// Charge current ceiling, mA
    pub ichg_max_ma: u32,
    /// Programmed charge current, mA
    pub ichg_now_ma: u32,
    /// Recharge current ceiling, mA
    pub irechg_max_ma: u32,
    /// Charging state
    pub charging_state: Status,
    /// Recharging state
    pub recharging_state: Status,
    /// Charging suspended by the platform
    pub charging_suspended: bool,
    /// Charge terminated
    pub charging_done: bool,
    /// Recharging suspended by the platform
    pub recharging_suspended: bool,
}

impl Default for ChargerState {
    fn default() -> Self {
        ChargerState {
            ibat_max_ma: DEFAULT_CEILING_MA,
            ichg_max_ma: DEFAULT_CEILING_MA,
            ichg_now_ma: 0,
            irechg_max_ma: DEFAULT_CEILING_MA,
            charging_state: Status::NotCharging,
            recharging_state: Status::NotCharging,
            charging_suspended: false,
            charging_done: false,
            recharging_suspended: false,
        }
    }
}

/// Best attached input capped by both ceilings and the request.
pub fn arbitrate(adapters: &Adapters, ibat_max_ma: u32, ichg_max_ma: u32, requested_ma: u32) -> u32 {
    let source_ma = adapters.iter().flatten().map(|a| a.max_ma).max().unwrap_or(0);
    source_ma.min(ibat_max_ma).min(ichg_max_ma).min(requested_ma)
}

/// A charger backend and its arbitration state.
pub struct ChargerCore<M: RawMutex, B> {
    name: &'static str,
    backend: B,
    state: Mutex<M, ChargerState>,
}

impl<M: RawMutex, B: ChargerBackend> ChargerCore<M, B> {
    /// Create a charger serving the battery called `name`.
    pub fn new(name: &'static str, backend: B) -> Result<Self, Error> {
        if name.is_empty() {
            error!("charger registration without a battery name");
            return Err(Error::InvalidArgument);
        }
        Ok(ChargerCore {
            name,
            backend,
            state: Mutex::new(ChargerState::default()),
        })
    }

    /// Name of the battery this charger serves
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The chip backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Copy of the arbitration state
    pub async fn state(&self) -> ChargerState {
        *self.state.lock().await
    }

    /// Pause an active charge.
    pub async fn suspend_charging(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.charging_state != Status::Charging || state.charging_suspended {
            return Err(Error::InvalidState);
        }
        self.backend.enable_charging(false).await?;
        state.charging_suspended = true;
        Ok(())
    }

    /// Continue a suspended charge.
    pub async fn resume_charging(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.charging_state != Status::Charging || !state.charging_suspended {
            return Err(Error::InvalidState);
        }
        self.backend.enable_charging(true).await?;
        state.charging_suspended = false;
        Ok(())
    }

    /// Not supported.
    pub async fn suspend_recharging(&self) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// Not supported.
    pub async fn resume_recharging(&self) -> Result<(), Error> {
        Err(Error::NotImplemented)
    }

    /// Arbitrate and program a new charge current.
    ///
    /// Nothing is committed unless every backend call succeeds.
    pub async fn set_charging_current(&self, requested_ma: i32) -> Result<(), Error> {
        let requested_ma = u32::try_from(requested_ma).map_err(|_| Error::InvalidArgument)?;
        let mut state = self.state.lock().await;
        self.apply_current(&mut state, requested_ma).await
    }

    async fn apply_current(&self, state: &mut ChargerState, requested_ma: u32) -> Result<(), Error> {
        let adapters = self.backend.adapters().await;
        let target_ma = arbitrate(&adapters, state.ibat_max_ma, state.ichg_max_ma, requested_ma);
        debug!("{}: requested {} mA, programming {} mA", self.name, requested_ma, target_ma);

        if target_ma == 0 {
            self.backend.enable_charging(false).await?;
        } else {
            self.backend.enable_charging(true).await?;
            self.backend.set_current_limit(target_ma).await?;
        }

        state.charging_suspended = false;
        state.charging_done = false;
        state.ichg_now_ma = target_ma;
        state.charging_state = if target_ma > 0 {
            Status::Charging
        } else {
            Status::NotCharging
        };
        Ok(())
    }

    /// Charge current in effect, mA
    pub async fn charging_current(&self) -> u32 {
        self.state.lock().await.ichg_now_ma
    }

    /// Status, current and input availability.
    pub async fn charger_info(&self) -> ChargerInfo {
        let state = self.state().await;
        let adapters = self.backend.adapters().await;
        ChargerInfo {
            status: state.charging_state,
            current_now_ma: state.ichg_now_ma,
            done: state.charging_done,
            adapter_connected: adapters.iter().flatten().any(|a| a.max_ma > 0),
        }
    }

    /// Handle an event from the backend or the platform.
    pub async fn notify_event(&self, event: ChargerEvent) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        match event {
            ChargerEvent::ChargeComplete => {
                info!("{}: charge complete", self.name);
                state.charging_done = true;
                Ok(())
            }
            ChargerEvent::Reserved(_) => Ok(()),
            ChargerEvent::BatteryCeilingChanged(ma) => {
                if ma == state.ibat_max_ma {
                    return Ok(());
                }
                state.ibat_max_ma = ma;
                if state.charging_state == Status::Charging {
                    self.apply_current(&mut state, ma).await
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Let the backend dispatch its interrupts and act on a terminated charge.
    ///
    /// The summary is returned so the caller can re-run the battery's
    /// external-power-changed handling when an input came or went.
    pub async fn service_interrupt(&self) -> InterruptSummary {
        let summary = self.backend.handle_interrupt().await;
        if summary.charge_complete {
            // ChargeComplete cannot fail
            let _ = self.notify_event(ChargerEvent::ChargeComplete).await;
        }
        summary
    }
}

/// Bounded name-keyed table of chargers.
pub struct ChargerRegistry<'a, M: RawMutex, B> {
    slots: BlockingMutex<M, RefCell<[Option<&'a ChargerCore<M, B>>; MAX_CHARGERS]>>,
}

impl<'a, M: RawMutex, B: ChargerBackend> ChargerRegistry<'a, M, B> {
    /// Create an empty registry
    pub const fn new() -> Self {
        ChargerRegistry {
            slots: BlockingMutex::new(RefCell::new([None; MAX_CHARGERS])),
        }
    }

    /// Add a charger. Fails when full or when the name is already taken.
    pub fn register(&self, charger: &'a ChargerCore<M, B>) -> Result<(), Error> {
        self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();
            if slots.iter().flatten().any(|c| c.name == charger.name) {
                warn!("charger {} already registered", charger.name);
                return Err(Error::InvalidArgument);
            }
            let Some(slot) = slots.iter_mut().find(|s| s.is_none()) else {
                error!("charger registry full, dropping {}", charger.name);
                return Err(Error::OutOfMemory);
            };
            *slot = Some(charger);
            info!("charger {} registered", charger.name);
            Ok(())
        })
    }

    /// The charger serving the battery called `name`.
    pub fn lookup_by_name(&self, name: &str) -> Option<&'a ChargerCore<M, B>> {
        self.slots
            .lock(|slots| slots.borrow().iter().flatten().find(|c| c.name == name).copied())
    }

    /// Number of registered chargers
    pub fn len(&self) -> usize {
        self.slots.lock(|slots| slots.borrow().iter().flatten().count())
    }

    /// Is the registry empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a, M: RawMutex, B: ChargerBackend> Default for ChargerRegistry<'a, M, B> {
    fn default() -> Self {
        Self::new()
    }
}
