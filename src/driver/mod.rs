//! Driver framework: the [`DeviceDriver`] trait every protocol
//! implementation satisfies, the [`DriverRegistry`] that looks drivers up
//! by the stable id a `.device` file names, and the ready-handshake helper
//! the commit engine and drivers share.
pub mod asus;
pub mod etekcity;
pub mod gskill;
pub mod hidpp;
pub mod hidpp10;
pub mod hidpp20;
pub mod logitech_g600;
pub mod marsgaming;
pub mod openinput;
pub mod roccat;
pub mod sinowealth;
pub mod sinowealth_nubwo;
pub mod steelseries;

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use crate::datastore::DataStoreEntry;
use crate::error::{RatbagError, Result};
use crate::model::{Device, Profile};
use crate::transport::Transport;

/// The operations a driver performs over the lifetime of a device. A
/// driver is pure protocol knowledge: it never opens a transport itself
/// (the caller does, from the hidraw node it enumerated) and never owns
/// the object graph (the core does) — it only populates and drains it.
///
/// `probe`/`commit`/`set_active_profile` all borrow the already-open
/// [`Transport`]; a driver that needs to keep state between calls (a
/// cached feature map, a device index) stores it via
/// [`Device::set_driver_state`]/[`Device::with_driver_state`].
pub trait DeviceDriver {
    /// Stable identifier matching the `Driver=` key in a `.device` file.
    fn id(&self) -> &'static str;

    /// Confirm the device speaks this protocol, read its static shape
    /// (profile/button/resolution/LED counts, capabilities), and call
    /// [`Device::init_profiles`] followed by per-entity population from
    /// whatever the hardware or `entry` reports.
    fn probe(&self, device: &Device, transport: &Transport, entry: &DataStoreEntry) -> Result<()>;

    /// Release any driver-private state. Called when a device is being
    /// dropped from a context; never talks to hardware.
    fn remove(&self, device: &Device) -> Result<()>;

    /// Write one profile's dirty subset to hardware. The commit engine
    /// calls this once per dirty profile, in index order, after ensuring
    /// (per [`crate::model::Capability::WriteNeedsActiveProfile`]) that
    /// `profile` is already active on the device if required.
    fn commit(&self, device: &Device, transport: &Transport, profile: &Profile) -> Result<()>;

    /// Switch the device's active profile. Implementations that need a
    /// save-to-flash step after activation should do it here; the commit
    /// engine calls this exactly once per `commit()` invocation, after all
    /// dirty profiles have been written.
    fn set_active_profile(&self, device: &Device, transport: &Transport, profile: &Profile) -> Result<()>;
}

/// Looks a registered [`DeviceDriver`] up by the id a [`DataStoreEntry`]
/// names. An embedder may construct a registry with only the drivers it
/// cares about; [`DriverRegistry::with_builtin_drivers`] registers every
/// driver this crate ships.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<&'static str, Box<dyn DeviceDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Box<dyn DeviceDriver>) {
        self.drivers.insert(driver.id(), driver);
    }

    pub fn get(&self, id: &str) -> Option<&dyn DeviceDriver> {
        self.drivers.get(id).map(|b| b.as_ref())
    }

    /// A registry carrying every driver shipped in this crate, aliased
    /// under every id a `.device` file may name for it.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(hidpp10::Hidpp10Driver::new()));
        registry.register(Box::new(hidpp20::Hidpp20Driver::new()));
        registry.register(Box::new(asus::AsusDriver::new()));
        registry.register(Box::new(etekcity::EtekcityDriver::new()));
        registry.register(Box::new(gskill::GskillDriver::new()));
        registry.register(Box::new(logitech_g600::LogitechG600Driver::new()));
        registry.register(Box::new(marsgaming::MarsGamingDriver::new()));
        registry.register(Box::new(openinput::OpenInputDriver::new()));
        registry.register(Box::new(sinowealth::SinowealthDriver::new()));
        registry.register(Box::new(sinowealth_nubwo::SinowealthNubwoDriver::new()));
        registry.register(Box::new(steelseries::SteelseriesDriver::new()));
        registry.register(Box::new(roccat::RoccatDriver::new()));
        registry
    }
}

/// Poll `is_ready` with bounded backoff until it reports `true`, the
/// design's "ready handshake" used after a profile switch or an EEPROM
/// write before the device will accept further commands. A persistently
/// busy device (every poll returns `Ok(false)`, or a transient-busy
/// protocol error) surfaces as [`RatbagError::Timeout`] once `attempts`
/// is exhausted; any other error from `is_ready` is propagated immediately.
pub fn wait_ready(attempts: u32, interval: Duration, mut is_ready: impl FnMut() -> Result<bool>) -> Result<()> {
    for attempt in 0..attempts {
        match is_ready() {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) if e.is_transient_busy() => {}
            Err(e) => return Err(e),
        }
        if attempt + 1 < attempts {
            thread::sleep(interval);
        }
    }
    Err(RatbagError::Timeout { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_ready_succeeds_once_ready() {
        let mut calls = 0;
        let result = wait_ready(5, Duration::from_millis(1), || {
            calls += 1;
            Ok(calls >= 3)
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn wait_ready_times_out() {
        let result = wait_ready(3, Duration::from_millis(1), || Ok(false));
        assert_eq!(result.unwrap_err().kind(), crate::error::ErrorKind::Timeout);
    }

    #[test]
    fn wait_ready_propagates_non_busy_error() {
        let result: Result<()> = wait_ready(3, Duration::from_millis(1), || Err(RatbagError::value("boom")));
        assert_eq!(result.unwrap_err().kind(), crate::error::ErrorKind::Value);
    }
}
