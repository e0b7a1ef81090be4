//! Resolution (DPI) steps: the fixed-size per-profile table of (dpi-x,
//! dpi-y) pairs cycled on the hardware.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{RatbagError, Result};
use crate::model::capability::{Capabilities, Capability};
use crate::model::profile::Profile;

/// Either an enumerated list of supported DPI values, or a contiguous
/// range with a granularity step — mutually exclusive per the design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DpiSource {
    List(Vec<u32>),
    Range { min: u32, max: u32, step: u32 },
}

impl DpiSource {
    pub fn contains(&self, dpi: u32) -> bool {
        match self {
            DpiSource::List(values) => values.contains(&dpi),
            DpiSource::Range { min, max, step } => {
                dpi >= *min && dpi <= *max && (dpi - min) % step.max(&1) == 0
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dpi {
    Unified(u32),
    Separate { x: u32, y: u32 },
}

impl Dpi {
    pub fn x(&self) -> u32 {
        match self {
            Dpi::Unified(v) => *v,
            Dpi::Separate { x, .. } => *x,
        }
    }

    pub fn y(&self) -> u32 {
        match self {
            Dpi::Unified(v) => *v,
            Dpi::Separate { y, .. } => *y,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.x() == 0 && self.y() == 0
    }
}

pub(crate) struct ResolutionInner {
    pub profile: Profile,
    pub index: u32,
    pub dpi: Dpi,
    pub source: DpiSource,
    pub active: bool,
    pub default: bool,
    pub disabled: bool,
    pub capabilities: Capabilities,
    pub dirty: bool,
}

#[derive(Clone)]
pub struct Resolution(pub(crate) Rc<RefCell<ResolutionInner>>);

impl Resolution {
    pub(crate) fn new(
        profile: Profile,
        index: u32,
        source: DpiSource,
        caps: Capabilities,
    ) -> Self {
        Resolution(Rc::new(RefCell::new(ResolutionInner {
            profile,
            index,
            dpi: Dpi::Unified(0),
            source,
            active: index == 0,
            default: index == 0,
            disabled: false,
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

    pub fn dpi(&self) -> Dpi {
        self.0.borrow().dpi
    }

    pub fn source(&self) -> DpiSource {
        self.0.borrow().source.clone()
    }

    pub fn is_active(&self) -> bool {
        self.0.borrow().active
    }

    pub fn is_default(&self) -> bool {
        self.0.borrow().default
    }

    pub fn is_disabled(&self) -> bool {
        self.0.borrow().disabled
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

    fn validate(&self, dpi: u32) -> Result<()> {
        if dpi == 0 {
            if self.has_capability(Capability::ResolutionDisable) {
                return Ok(());
            }
            return Err(RatbagError::value("dpi=0 not supported by this resolution step"));
        }
        if !self.0.borrow().source.contains(dpi) {
            return Err(RatbagError::value(format!(
                "dpi {dpi} outside the device's supported range/list"
            )));
        }
        Ok(())
    }

    /// Set a unified x/y DPI value. `dpi == 0` disables the step if
    /// supported.
    pub fn set_dpi(&self, dpi: u32) -> Result<()> {
        self.validate(dpi)?;
        let mut inner = self.0.borrow_mut();
        inner.dpi = Dpi::Unified(dpi);
        inner.disabled = dpi == 0;
        inner.dirty = true;
        Ok(())
    }

    /// Set independent x/y DPI values; requires the `separate-xy`
    /// capability.
    pub fn set_dpi_xy(&self, x: u32, y: u32) -> Result<()> {
        if !self.has_capability(Capability::SeparateXyDpi) {
            return Err(RatbagError::Unsupported("separate-xy dpi"));
        }
        self.validate(x)?;
        self.validate(y)?;
        let mut inner = self.0.borrow_mut();
        inner.dpi = Dpi::Separate { x, y };
        inner.disabled = x == 0 && y == 0;
        inner.dirty = true;
        Ok(())
    }

    /// Make this the active resolution step, clearing `active` on every
    /// sibling. Errors if the step is disabled.
    pub fn set_active(&self) -> Result<()> {
        if self.is_disabled() {
            return Err(RatbagError::value("cannot activate a disabled resolution step"));
        }
        let profile = self.profile();
        for sibling in profile.resolutions() {
            let was_active = sibling.is_active();
            let mut inner = sibling.0.borrow_mut();
            inner.active = Rc::ptr_eq(&sibling.0, &self.0);
            if was_active != inner.active {
                inner.dirty = true;
            }
        }
        Ok(())
    }

    /// Make this the step the device selects on entering its profile,
    /// clearing `default` on every sibling.
    pub fn set_default(&self) -> Result<()> {
        if self.is_disabled() {
            return Err(RatbagError::value("cannot default to a disabled resolution step"));
        }
        let profile = self.profile();
        for sibling in profile.resolutions() {
            let was_default = sibling.is_default();
            let mut inner = sibling.0.borrow_mut();
            inner.default = Rc::ptr_eq(&sibling.0, &self.0);
            if was_default != inner.default {
                inner.dirty = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::device::Device;
    use crate::model::profile::Profile;

    fn sample_profile() -> Profile {
        let device = Device::new_for_test();
        Profile::new(device, 0, Capabilities::empty())
    }

    #[test]
    fn dpi_zero_requires_disable_capability() {
        let profile = sample_profile();
        let res = Resolution::new(
            profile,
            0,
            DpiSource::Range { min: 400, max: 4000, step: 100 },
            Capabilities::empty(),
        );
        assert!(res.set_dpi(0).is_err());
    }

    #[test]
    fn dpi_zero_disables_when_supported() {
        let profile = sample_profile();
        let res = Resolution::new(
            profile,
            0,
            DpiSource::Range { min: 400, max: 4000, step: 100 },
            Capabilities::single(Capability::ResolutionDisable),
        );
        assert!(res.set_dpi(0).is_ok());
        assert!(res.is_disabled());
    }

    #[test]
    fn dpi_outside_range_rejected() {
        let profile = sample_profile();
        let res = Resolution::new(
            profile,
            0,
            DpiSource::Range { min: 400, max: 4000, step: 100 },
            Capabilities::empty(),
        );
        assert!(res.set_dpi(5000).is_err());
        assert!(res.set_dpi(1600).is_ok());
    }

    #[test]
    fn separate_xy_rejected_without_capability() {
        let profile = sample_profile();
        let res = Resolution::new(
            profile,
            0,
            DpiSource::Range { min: 400, max: 4000, step: 100 },
            Capabilities::empty(),
        );
        assert_eq!(
            res.set_dpi_xy(1600, 800).unwrap_err().kind(),
            crate::error::ErrorKind::Unsupported
        );
    }

    #[test]
    fn only_one_active_per_profile() {
        let profile = sample_profile();
        let source = DpiSource::Range { min: 400, max: 4000, step: 100 };
        let r0 = Resolution::new(profile.clone(), 0, source.clone(), Capabilities::empty());
        let r1 = Resolution::new(profile.clone(), 1, source, Capabilities::empty());
        profile.push_resolution(r0.clone());
        profile.push_resolution(r1.clone());

        r0.set_dpi(800).unwrap();
        r1.set_dpi(1600).unwrap();
        r1.set_active().unwrap();

        assert!(!r0.is_active());
        assert!(r1.is_active());
    }
}
