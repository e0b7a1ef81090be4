//! The device: the root of the object graph and the only entity that owns
//! a transport connection and driver-private state.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::model::action::ActionType;
use crate::model::button::Button;
use crate::model::capability::{Capabilities, Capability};
use crate::model::led::{Led, LedType};
use crate::model::profile::Profile;
use crate::model::resolution::{DpiSource, Resolution};

/// Bus protocol a device is attached over, mirroring the `HID_ID` bustype
/// field a caller would read from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusType {
    Usb,
    Bluetooth,
    Unknown(u16),
}

/// Stable hardware identity: enough to disambiguate two otherwise-identical
/// vendor/product pairs (e.g. a wired and wireless revision of the same
/// mouse) via an optional version field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub bus: BusType,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u32,
}

/// Parameters used by [`Device::init_profiles`] to allocate a uniform
/// default tree. Per-entity specifics (physical button roles, LED types,
/// individual capability sets) are filled in afterward by the driver
/// during `probe`.
pub struct ProfileLayout {
    pub num_resolutions: usize,
    pub num_buttons: usize,
    pub num_leds: usize,
    pub profile_capabilities: Capabilities,
    pub resolution_source: DpiSource,
    pub resolution_capabilities: Capabilities,
    pub button_permitted: Vec<ActionType>,
    pub led_capabilities: Capabilities,
}

pub(crate) struct DeviceInner {
    pub identity: DeviceIdentity,
    pub name: String,
    pub firmware_version: String,
    pub driver_name: String,
    pub profiles: Vec<Profile>,
    pub driver_private: Option<Box<dyn Any>>,
    /// Device-wide capabilities: whether writes require an active profile,
    /// whether an explicit save-to-flash command exists, and similar
    /// commit-engine-facing flags. Set once by the driver during `probe`.
    pub capabilities: Capabilities,
}

#[derive(Clone)]
pub struct Device(pub(crate) Rc<RefCell<DeviceInner>>);

impl Device {
    pub fn new(identity: DeviceIdentity, name: impl Into<String>, driver_name: impl Into<String>) -> Self {
        Device(Rc::new(RefCell::new(DeviceInner {
            identity,
            name: name.into(),
            firmware_version: String::new(),
            driver_name: driver_name.into(),
            profiles: Vec::new(),
            driver_private: None,
            capabilities: Capabilities::empty(),
        })))
    }

    /// A minimal device for unit tests of entities that need *a* parent
    /// but don't exercise device-level behavior themselves.
    #[cfg(any(test, feature = "test-support"))]
    pub fn new_for_test() -> Self {
        Device::new(
            DeviceIdentity {
                bus: BusType::Usb,
                vendor_id: 0,
                product_id: 0,
                version: 0,
            },
            "test device",
            "test",
        )
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.0.borrow().identity
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn firmware_version(&self) -> String {
        self.0.borrow().firmware_version.clone()
    }

    pub fn driver_name(&self) -> String {
        self.0.borrow().driver_name.clone()
    }

    pub fn set_firmware_version(&self, version: impl Into<String>) {
        self.0.borrow_mut().firmware_version = version.into();
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.0.borrow().profiles.clone()
    }

    pub fn profile(&self, index: u32) -> Option<Profile> {
        self.profiles().into_iter().find(|p| p.index() == index)
    }

    pub fn active_profile(&self) -> Option<Profile> {
        self.profiles().into_iter().find(Profile::is_active)
    }

    /// True if any profile (or any of its descendants) carries uncommitted
    /// changes.
    pub fn is_dirty(&self) -> bool {
        self.profiles().iter().any(Profile::is_dirty)
    }

    /// Stash driver-private state, downcast later via [`Device::driver_state`].
    pub fn set_driver_state<T: Any>(&self, state: T) {
        self.0.borrow_mut().driver_private = Some(Box::new(state));
    }

    pub fn take_driver_state<T: Any>(&self) -> Option<T> {
        let boxed = self.0.borrow_mut().driver_private.take()?;
        match boxed.downcast::<T>() {
            Ok(state) => Some(*state),
            Err(boxed) => {
                self.0.borrow_mut().driver_private = Some(boxed);
                None
            }
        }
    }

    /// Borrow the driver-private state in place, without taking ownership.
    /// The usual way a driver reaches its open transport/channel across
    /// separate `probe`/`commit`/`set_active_profile` calls on the same
    /// device, since a single `take` would leave nothing for the next call.
    pub fn with_driver_state<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut inner = self.0.borrow_mut();
        let state = inner.driver_private.as_mut()?.downcast_mut::<T>()?;
        Some(f(state))
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.0.borrow().capabilities.has(cap)
    }

    pub fn set_capabilities(&self, caps: Capabilities) {
        self.0.borrow_mut().capabilities = caps;
    }

    /// Allocate `num_profiles` profiles, each with the same fixed number
    /// of buttons/resolutions/LEDs, all content defaulted (disabled/none)
    /// and every dirty flag clear. Called once by a driver's `probe`
    /// after it has determined device limits.
    pub fn init_profiles(&self, num_profiles: usize, layout: &ProfileLayout) {
        let mut profiles = Vec::with_capacity(num_profiles);
        for pi in 0..num_profiles as u32 {
            let profile = Profile::new(self.clone(), pi, layout.profile_capabilities);
            for ri in 0..layout.num_resolutions as u32 {
                let res = Resolution::new(
                    profile.clone(),
                    ri,
                    layout.resolution_source.clone(),
                    layout.resolution_capabilities,
                );
                profile.push_resolution(res);
            }
            for bi in 0..layout.num_buttons as u32 {
                let button = Button::new(
                    profile.clone(),
                    bi,
                    crate::model::action::PhysicalButtonType::Unknown,
                    layout.button_permitted.clone(),
                );
                profile.push_button(button);
            }
            for li in 0..layout.num_leds as u32 {
                let led = Led::new(profile.clone(), li, LedType::Unknown, layout.led_capabilities);
                profile.push_led(led);
            }
            profiles.push(profile);
        }
        self.0.borrow_mut().profiles = profiles;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::capability::Capability;

    fn layout() -> ProfileLayout {
        ProfileLayout {
            num_resolutions: 2,
            num_buttons: 3,
            num_leds: 1,
            profile_capabilities: Capabilities::empty(),
            resolution_source: DpiSource::Range { min: 400, max: 4000, step: 100 },
            resolution_capabilities: Capabilities::empty(),
            button_permitted: vec![ActionType::MouseButton, ActionType::None],
            led_capabilities: Capabilities::single(Capability::LedOn),
        }
    }

    #[test]
    fn init_profiles_allocates_fixed_shape() {
        let device = Device::new_for_test();
        device.init_profiles(2, &layout());
        let profiles = device.profiles();
        assert_eq!(profiles.len(), 2);
        for p in &profiles {
            assert_eq!(p.resolutions().len(), 2);
            assert_eq!(p.buttons().len(), 3);
            assert_eq!(p.leds().len(), 1);
        }
        assert!(profiles[0].is_active());
        assert!(!profiles[1].is_active());
        assert!(!device.is_dirty());
    }

    #[test]
    fn driver_state_roundtrips_through_downcast() {
        let device = Device::new_for_test();
        device.set_driver_state(42u32);
        assert_eq!(device.take_driver_state::<u32>(), Some(42));
        assert_eq!(device.take_driver_state::<u32>(), None);
    }

    #[test]
    fn child_strong_edge_keeps_device_alive() {
        let device = Device::new_for_test();
        device.init_profiles(1, &layout());
        let profile = device.profile(0).unwrap();
        drop(device);
        // The profile's strong back-edge to the device keeps it alive.
        assert_eq!(profile.device().name(), "test device");
    }
}
