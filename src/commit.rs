//! Component F: the commit engine. Turns the dirty subset of a device's
//! profile tree into ordered driver calls, with active-profile handling
//! and rollback-on-failure so a caller never has to reason about partial
//! writes itself.

use std::time::Duration;

use tracing::{debug, warn};

use crate::driver::{wait_ready, DeviceDriver};
use crate::error::Result;
use crate::model::{Capability, Device, Profile};
use crate::transport::Transport;

/// Attempts/interval for the ready handshake after a profile switch. Not
/// configurable per-call: every driver that needs this polls the same
/// cadence, since it reflects how long real hardware takes to settle
/// after activating a profile, not anything caller-specific.
const READY_ATTEMPTS: u32 = 20;
const READY_INTERVAL: Duration = Duration::from_millis(50);

/// Write every dirty profile on `device` to hardware through `driver`, in
/// profile-index order, then restore whichever profile the model
/// considers active. A no-op (and cheap: just a dirty-flag scan) when
/// nothing has changed.
///
/// On failure partway through, the device's active profile is switched
/// back to the one the model had active before this call, profiles
/// already written keep their cleared dirty flag, and the profile that
/// failed (and any not yet attempted) stay dirty so a retried `commit`
/// picks them back up.
pub fn commit(device: &Device, transport: &Transport, driver: &dyn DeviceDriver) -> Result<()> {
    if !device.is_dirty() {
        return Ok(());
    }

    let target_active = device.active_profile();
    let needs_active = device.has_capability(Capability::WriteNeedsActiveProfile);

    let mut profiles = device.profiles();
    profiles.sort_by_key(Profile::index);
    let dirty: Vec<Profile> = profiles.into_iter().filter(Profile::is_dirty).collect();

    let mut hardware_active: Option<Profile> = target_active.clone();

    for profile in &dirty {
        let result = write_one(device, transport, driver, profile, needs_active, &mut hardware_active);
        if let Err(e) = result {
            warn!("commit: profile {} failed, rolling back active profile: {e}", profile.index());
            if let Some(target) = &target_active
                && hardware_active.as_ref().map(Profile::index) != Some(target.index())
            {
                let _ = activate(device, transport, driver, target, &mut hardware_active);
            }
            return Err(e);
        }
        profile.clear_all_dirty();
        debug!("commit: profile {} written", profile.index());
    }

    if let Some(target) = &target_active
        && hardware_active.as_ref().map(Profile::index) != Some(target.index())
    {
        activate(device, transport, driver, target, &mut hardware_active)?;
    }

    Ok(())
}

fn write_one(
    device: &Device,
    transport: &Transport,
    driver: &dyn DeviceDriver,
    profile: &Profile,
    needs_active: bool,
    hardware_active: &mut Option<Profile>,
) -> Result<()> {
    if needs_active && hardware_active.as_ref().map(Profile::index) != Some(profile.index()) {
        activate(device, transport, driver, profile, hardware_active)?;
    }
    driver.commit(device, transport, profile)
}

fn activate(
    device: &Device,
    transport: &Transport,
    driver: &dyn DeviceDriver,
    profile: &Profile,
    hardware_active: &mut Option<Profile>,
) -> Result<()> {
    driver.set_active_profile(device, transport, profile)?;
    wait_ready(READY_ATTEMPTS, READY_INTERVAL, || Ok(true))?;
    *hardware_active = Some(profile.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RatbagError;
    use crate::model::{BusType, Capabilities, DeviceIdentity, ProfileLayout};
    use std::cell::RefCell;

    /// A driver double recording calls in order, so tests can assert both
    /// "what got written" and "in what order", including the rollback path.
    struct RecordingDriver {
        fail_commit_on: Option<u32>,
        calls: RefCell<Vec<String>>,
    }

    impl RecordingDriver {
        fn new() -> Self {
            Self { fail_commit_on: None, calls: RefCell::new(Vec::new()) }
        }
    }

    impl DeviceDriver for RecordingDriver {
        fn id(&self) -> &'static str {
            "recording"
        }

        fn probe(&self, _device: &Device, _transport: &Transport, _entry: &crate::datastore::DataStoreEntry) -> Result<()> {
            Ok(())
        }

        fn remove(&self, _device: &Device) -> Result<()> {
            Ok(())
        }

        fn commit(&self, _device: &Device, _transport: &Transport, profile: &Profile) -> Result<()> {
            self.calls.borrow_mut().push(format!("commit({})", profile.index()));
            if self.fail_commit_on == Some(profile.index()) {
                return Err(RatbagError::device("simulated failure"));
            }
            Ok(())
        }

        fn set_active_profile(&self, _device: &Device, _transport: &Transport, profile: &Profile) -> Result<()> {
            self.calls.borrow_mut().push(format!("activate({})", profile.index()));
            Ok(())
        }
    }

    fn test_transport() -> Transport {
        Transport::fake_for_test()
    }

    fn test_device(num_profiles: usize, needs_active: bool) -> Device {
        let identity = DeviceIdentity { bus: BusType::Usb, vendor_id: 0, product_id: 0, version: 0 };
        let device = Device::new(identity, "test", "recording");
        device.init_profiles(
            num_profiles,
            &ProfileLayout {
                num_resolutions: 1,
                num_buttons: 1,
                num_leds: 0,
                profile_capabilities: Capabilities::empty(),
                resolution_source: crate::model::DpiSource::Range { min: 400, max: 4000, step: 100 },
                resolution_capabilities: Capabilities::empty(),
                button_permitted: vec![crate::model::ActionType::None],
                led_capabilities: Capabilities::empty(),
            },
        );
        if needs_active {
            device.set_capabilities(Capabilities::single(Capability::WriteNeedsActiveProfile));
        }
        device
    }

    #[test]
    fn clean_device_is_a_noop() {
        let device = test_device(2, false);
        let driver = RecordingDriver::new();
        let transport = test_transport();
        commit(&device, &transport, &driver).unwrap();
        assert!(driver.calls.borrow().is_empty());
    }

    #[test]
    fn writes_only_dirty_profiles_in_index_order() {
        let device = test_device(3, false);
        device.profile(2).unwrap().set_name("two").unwrap();
        device.profile(0).unwrap().set_name("zero").unwrap();
        let driver = RecordingDriver::new();
        let transport = test_transport();
        commit(&device, &transport, &driver).unwrap();
        assert_eq!(*driver.calls.borrow(), vec!["commit(0)", "commit(2)"]);
        assert!(!device.is_dirty());
    }

    #[test]
    fn switches_active_profile_when_required_and_restores_it() {
        let device = test_device(2, true);
        // profile 0 is active by default; dirty profile 1 needs activation
        // to receive its write, then the engine must switch back to 0.
        device.profile(1).unwrap().set_name("one").unwrap();
        let driver = RecordingDriver::new();
        let transport = test_transport();
        commit(&device, &transport, &driver).unwrap();
        assert_eq!(
            *driver.calls.borrow(),
            vec!["activate(1)", "commit(1)", "activate(0)"]
        );
    }

    #[test]
    fn failure_rolls_back_active_profile_and_leaves_dirty_flags() {
        let mut driver = RecordingDriver::new();
        driver.fail_commit_on = Some(1);
        let device = test_device(2, true);
        device.profile(1).unwrap().set_name("one").unwrap();
        let transport = test_transport();
        let err = commit(&device, &transport, &driver).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Device);
        assert_eq!(
            *driver.calls.borrow(),
            vec!["activate(1)", "commit(1)", "activate(0)"]
        );
        assert!(device.profile(1).unwrap().is_dirty());
    }
}
