//! LED entities: one per profile-scoped light zone.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{RatbagError, Result};
use crate::model::capability::{Capabilities, Capability};
use crate::model::profile::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedType {
    Logo,
    Side,
    Wheel,
    Battery,
    Dpi,
    Switches,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedMode {
    Off,
    On,
    Cycle,
    Breathing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorDepth {
    Mono,
    Rgb565,
    Rgb888,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub(crate) struct LedInner {
    pub profile: Profile,
    pub index: u32,
    pub led_type: LedType,
    pub mode: LedMode,
    pub color: Rgb,
    pub color_depth: ColorDepth,
    pub brightness: u8,
    pub duration_ms: u32,
    pub capabilities: Capabilities,
    pub dirty: bool,
}

#[derive(Clone)]
pub struct Led(pub(crate) Rc<RefCell<LedInner>>);

impl Led {
    pub(crate) fn new(profile: Profile, index: u32, led_type: LedType, caps: Capabilities) -> Self {
        Led(Rc::new(RefCell::new(LedInner {
            profile,
            index,
            led_type,
            mode: LedMode::Off,
            color: Rgb::default(),
            color_depth: ColorDepth::Rgb888,
            brightness: 255,
            duration_ms: 0,
            capabilities: caps,
            dirty: false,
        })))
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn profile(&self) -> Profile {
        self.0.borrow().profile.clone()
    }

    pub fn index(&self) -> u32 {
        self.0.borrow().index
    }

    pub fn led_type(&self) -> LedType {
        self.0.borrow().led_type
    }

    pub fn mode(&self) -> LedMode {
        self.0.borrow().mode
    }

    pub fn color(&self) -> Rgb {
        self.0.borrow().color
    }

    pub fn color_depth(&self) -> ColorDepth {
        self.0.borrow().color_depth
    }

    pub fn brightness(&self) -> u8 {
        self.0.borrow().brightness
    }

    /// Effect duration in ms; only meaningful for `cycle`/`breathing` modes.
    pub fn duration_ms(&self) -> u32 {
        self.0.borrow().duration_ms
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.0.borrow().capabilities.has(cap)
    }

    pub fn is_dirty(&self) -> bool {
        self.0.borrow().dirty
    }

    pub(crate) fn clear_dirty(&self) {
        self.0.borrow_mut().dirty = false;
    }

    fn mode_capability(mode: LedMode) -> Option<Capability> {
        match mode {
            LedMode::Off => None,
            LedMode::On => Some(Capability::LedOn),
            LedMode::Cycle => Some(Capability::LedCycle),
            LedMode::Breathing => Some(Capability::LedBreathing),
        }
    }

    pub fn set_mode(&self, mode: LedMode) -> Result<()> {
        if let Some(cap) = Self::mode_capability(mode)
            && !self.has_capability(cap)
        {
            return Err(RatbagError::Unsupported("led mode"));
        }
        let mut inner = self.0.borrow_mut();
        inner.mode = mode;
        inner.dirty = true;
        Ok(())
    }

    /// Ignored by hardware when `mode` is not `on`/`breathing`, but the
    /// setter still accepts and records it so a caller can pre-stage a
    /// color before switching modes.
    pub fn set_color(&self, color: Rgb) -> Result<()> {
        let mut inner = self.0.borrow_mut();
        inner.color = color;
        inner.dirty = true;
        Ok(())
    }

    pub fn set_brightness(&self, brightness: u8) -> Result<()> {
        let mut inner = self.0.borrow_mut();
        inner.brightness = brightness;
        inner.dirty = true;
        Ok(())
    }

    /// Ignored by hardware when `mode` is not `cycle`/`breathing`.
    pub fn set_duration_ms(&self, ms: u32) -> Result<()> {
        let mut inner = self.0.borrow_mut();
        inner.duration_ms = ms;
        inner.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::device::Device;
    use crate::model::profile::Profile;

    fn sample_led(caps: Capabilities) -> Led {
        let device = Device::new_for_test();
        let profile = Profile::new(device, 0, Capabilities::empty());
        Led::new(profile, 0, LedType::Logo, caps)
    }

    #[test]
    fn rejects_unsupported_mode() {
        let led = sample_led(Capabilities::empty());
        assert!(led.set_mode(LedMode::On).is_err());
        assert!(!led.is_dirty());
    }

    #[test]
    fn accepts_supported_mode_and_dirties() {
        let led = sample_led(Capabilities::single(Capability::LedOn));
        assert!(led.set_mode(LedMode::On).is_ok());
        assert!(led.is_dirty());
        assert_eq!(led.mode(), LedMode::On);
    }

    #[test]
    fn off_mode_always_allowed() {
        let led = sample_led(Capabilities::empty());
        assert!(led.set_mode(LedMode::Off).is_ok());
    }
}
