//! Profiles: a named, indexed preset bundling a profile's buttons,
//! resolutions, LEDs and scalar settings.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{RatbagError, Result};
use crate::model::button::Button;
use crate::model::capability::{Capabilities, Capability};
use crate::model::device::Device;
use crate::model::led::Led;
use crate::model::resolution::Resolution;

pub(crate) struct ProfileInner {
    pub device: Device,
    pub index: u32,
    pub name: String,
    pub enabled: bool,
    pub active: bool,
    pub report_rate_hz: u32,
    pub report_rates: Vec<u32>,
    pub debounce_ms: Option<u32>,
    pub debounce_times: Vec<u32>,
    pub angle_snapping: Option<bool>,
    pub resolutions: Vec<Resolution>,
    pub buttons: Vec<Button>,
    pub leds: Vec<Led>,
    pub capabilities: Capabilities,
    /// Dirty covers the scalar fields owned directly by this profile
    /// (name, enabled, active, report rate, debounce, angle snapping).
    /// Child dirtiness (buttons/resolutions/LEDs) is *not* folded in here;
    /// `is_dirty()` computes the union on demand.
    pub scalar_dirty: bool,
}

#[derive(Clone)]
pub struct Profile(pub(crate) Rc<RefCell<ProfileInner>>);

impl Profile {
    pub(crate) fn new(device: Device, index: u32, capabilities: Capabilities) -> Self {
        Profile(Rc::new(RefCell::new(ProfileInner {
            device,
            index,
            name: String::new(),
            enabled: true,
            active: index == 0,
            report_rate_hz: 1000,
            report_rates: vec![125, 250, 500, 1000],
            debounce_ms: None,
            debounce_times: Vec::new(),
            angle_snapping: None,
            resolutions: Vec::new(),
            buttons: Vec::new(),
            leds: Vec::new(),
            capabilities,
            scalar_dirty: false,
        })))
    }

    pub(crate) fn push_resolution(&self, r: Resolution) {
        self.0.borrow_mut().resolutions.push(r);
    }

    pub(crate) fn push_button(&self, b: Button) {
        self.0.borrow_mut().buttons.push(b);
    }

    pub(crate) fn push_led(&self, l: Led) {
        self.0.borrow_mut().leds.push(l);
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn device(&self) -> Device {
        self.0.borrow().device.clone()
    }

    pub fn index(&self) -> u32 {
        self.0.borrow().index
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        let mut inner = self.0.borrow_mut();
        inner.name = name.into();
        inner.scalar_dirty = true;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.0.borrow().enabled
    }

    pub fn is_active(&self) -> bool {
        self.0.borrow().active
    }

    pub fn report_rate_hz(&self) -> u32 {
        self.0.borrow().report_rate_hz
    }

    pub fn supported_report_rates(&self) -> Vec<u32> {
        self.0.borrow().report_rates.clone()
    }

    pub fn debounce_ms(&self) -> Option<u32> {
        self.0.borrow().debounce_ms
    }

    pub fn supported_debounce_times(&self) -> Vec<u32> {
        self.0.borrow().debounce_times.clone()
    }

    pub fn angle_snapping(&self) -> Option<bool> {
        self.0.borrow().angle_snapping
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.0.borrow().capabilities.has(cap)
    }

    pub fn resolutions(&self) -> Vec<Resolution> {
        self.0.borrow().resolutions.clone()
    }

    pub fn buttons(&self) -> Vec<Button> {
        self.0.borrow().buttons.clone()
    }

    pub fn leds(&self) -> Vec<Led> {
        self.0.borrow().leds.clone()
    }

    /// True if this profile's own scalars, or any descendant, carry
    /// uncommitted changes.
    pub fn is_dirty(&self) -> bool {
        self.0.borrow().scalar_dirty
            || self.resolutions().iter().any(Resolution::is_dirty)
            || self.buttons().iter().any(Button::is_dirty)
            || self.leds().iter().any(Led::is_dirty)
    }

    pub(crate) fn clear_all_dirty(&self) {
        self.0.borrow_mut().scalar_dirty = false;
        for r in self.resolutions() {
            r.clear_dirty();
        }
        for b in self.buttons() {
            b.clear_dirty();
        }
        for l in self.leds() {
            l.clear_dirty();
        }
    }

    pub fn set_report_rate_hz(&self, hz: u32) -> Result<()> {
        if !self.0.borrow().report_rates.contains(&hz) {
            return Err(RatbagError::value(format!(
                "report rate {hz}Hz not in the supported list"
            )));
        }
        let mut inner = self.0.borrow_mut();
        inner.report_rate_hz = hz;
        inner.scalar_dirty = true;
        Ok(())
    }

    pub fn set_debounce_ms(&self, ms: u32) -> Result<()> {
        if !self.has_capability(Capability::Debounce) {
            return Err(RatbagError::Unsupported("debounce"));
        }
        if !self.0.borrow().debounce_times.is_empty() && !self.0.borrow().debounce_times.contains(&ms)
        {
            return Err(RatbagError::value(format!(
                "debounce {ms}ms not in the supported list"
            )));
        }
        let mut inner = self.0.borrow_mut();
        inner.debounce_ms = Some(ms);
        inner.scalar_dirty = true;
        Ok(())
    }

    pub fn set_angle_snapping(&self, enabled: bool) -> Result<()> {
        if !self.has_capability(Capability::AngleSnapping) {
            return Err(RatbagError::Unsupported("angle-snapping"));
        }
        let mut inner = self.0.borrow_mut();
        inner.angle_snapping = Some(enabled);
        inner.scalar_dirty = true;
        Ok(())
    }

    /// Enable or disable this profile. Disabling the active profile is
    /// always rejected; disabling at all requires the `disable-profile`
    /// capability.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        if !enabled {
            if self.is_active() {
                return Err(RatbagError::value("cannot disable the active profile"));
            }
            if !self.has_capability(Capability::DisableProfile) {
                return Err(RatbagError::Unsupported("disable-profile"));
            }
        }
        let mut inner = self.0.borrow_mut();
        inner.enabled = enabled;
        inner.scalar_dirty = true;
        Ok(())
    }

    /// Make this the device's active profile, clearing `active` on every
    /// sibling. Rejects activating a disabled profile.
    pub fn set_active(&self) -> Result<()> {
        if !self.is_enabled() {
            return Err(RatbagError::value("cannot activate a disabled profile"));
        }
        let device = self.device();
        for sibling in device.profiles() {
            let was_active = sibling.is_active();
            let now_active = Rc::ptr_eq(&sibling.0, &self.0);
            let mut inner = sibling.0.borrow_mut();
            inner.active = now_active;
            if was_active != now_active {
                inner.scalar_dirty = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::device::Device;

    #[test]
    fn set_enabled_false_on_active_rejected() {
        let device = Device::new_for_test();
        let profile = Profile::new(device, 0, Capabilities::single(Capability::DisableProfile));
        assert!(profile.is_active());
        assert!(profile.set_enabled(false).is_err());
    }

    #[test]
    fn set_enabled_false_requires_capability() {
        let device = Device::new_for_test();
        let profile = Profile::new(device, 1, Capabilities::empty());
        assert!(!profile.is_active());
        let err = profile.set_enabled(false).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unsupported);
    }

    #[test]
    fn set_active_on_disabled_rejected() {
        let device = Device::new_for_test();
        let profile = Profile::new(device, 1, Capabilities::empty());
        profile.0.borrow_mut().enabled = false;
        assert!(profile.set_active().is_err());
    }

    #[test]
    fn is_dirty_reflects_child_state() {
        let device = Device::new_for_test();
        let profile = Profile::new(device, 0, Capabilities::empty());
        assert!(!profile.is_dirty());
        profile.0.borrow_mut().scalar_dirty = true;
        assert!(profile.is_dirty());
        profile.clear_all_dirty();
        assert!(!profile.is_dirty());
    }
}
