//! Platform services used by the battery monitor and the chip backend.

use crate::battery::Health;
use crate::Error;

/// Power-supply reporting and wake-source handling provided by the platform.
pub trait Host {
    /// Announce a new power supply. An error aborts battery registration.
    fn register_power_supply(&self, name: &str) -> Result<(), Error>;

    /// Withdraw a power supply.
    fn unregister_power_supply(&self, name: &str);

    /// Tell listeners that a supply's properties changed.
    fn power_supply_changed(&self, name: &str);

    /// Keep the system awake on behalf of `name`.
    fn stay_awake(&self, name: &str);

    /// Allow the system to suspend again.
    fn relax(&self, name: &str);
}

impl<T: Host + ?Sized> Host for &T {
    fn register_power_supply(&self, name: &str) -> Result<(), Error> {
        T::register_power_supply(self, name)
    }

    fn unregister_power_supply(&self, name: &str) {
        T::unregister_power_supply(self, name)
    }

    fn power_supply_changed(&self, name: &str) {
        T::power_supply_changed(self, name)
    }

    fn stay_awake(&self, name: &str) {
        T::stay_awake(self, name)
    }

    fn relax(&self, name: &str) {
        T::relax(self, name)
    }
}

/// Kind of supply behind a power input.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SupplyType {
    /// Not detected yet
    #[default]
    Unknown,
    /// Battery
    Battery,
    /// Standard downstream USB port
    Usb,
    /// USB dedicated charging port
    UsbDcp,
    /// USB charging downstream port
    UsbCdp,
    /// USB accessory charger adapter
    UsbAca,
    /// Wall adapter
    Mains,
    /// Wireless charging pad
    Wireless,
}

impl SupplyType {
    /// A conservative current limit for the detected port, mA.
    ///
    /// A standard downstream port may only draw 100 mA before enumeration. Charging ports
    /// may provide more but are allowed to limit as low as 500 mA.
    pub fn current_limit(self) -> u32 {
        match self {
            SupplyType::Unknown | SupplyType::Battery => 0,
            SupplyType::Usb => 100,
            SupplyType::UsbDcp | SupplyType::UsbCdp => 1500,
            SupplyType::UsbAca => 500,
            SupplyType::Mains | SupplyType::Wireless => 1000,
        }
    }
}

/// The upstream USB power supply the charger reports into.
pub trait UsbSupply {
    /// Type currently reported by the USB stack.
    fn supply_type(&self) -> SupplyType;

    /// Update the detected source type.
    fn set_supply_type(&self, supply_type: SupplyType);

    /// Update VBUS presence.
    fn set_present(&self, present: bool);

    /// Tell the USB stack whether an OTG device is attached.
    fn set_usb_otg(&self, otg: bool);

    /// Update input health.
    fn set_health(&self, health: Health);

    /// Current the USB stack has negotiated, in mA.
    fn current_max_ma(&self) -> u32;
}

impl<T: UsbSupply + ?Sized> UsbSupply for &T {
    fn supply_type(&self) -> SupplyType {
        T::supply_type(self)
    }

    fn set_supply_type(&self, supply_type: SupplyType) {
        T::set_supply_type(self, supply_type)
    }

    fn set_present(&self, present: bool) {
        T::set_present(self, present)
    }

    fn set_usb_otg(&self, otg: bool) {
        T::set_usb_otg(self, otg)
    }

    fn set_health(&self, health: Health) {
        T::set_health(self, health)
    }

    fn current_max_ma(&self) -> u32 {
        T::current_max_ma(self)
    }
}
