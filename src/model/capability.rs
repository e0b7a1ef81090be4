//! Capability advertisement. Every entity in the object graph carries a
//! bitset established once at probe time; setters consult it before
//! accepting a value so that "this device doesn't support X" is a `value`
//! or `unsupported` error instead of a silently-ignored write.
//!
//! Modelled the same way the vendor drivers already encode per-model quirks
//! (a plain integer bitmask with named bit positions) rather than as a
//! `bitflags`-style derive, so capability checks read the same as quirk
//! checks throughout the driver layer.

/// A single advertisable capability. The discriminant is the bit position
/// within a [`Capabilities`] set, so new capabilities are appended, never
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Capability {
    /// Profiles may be individually enabled/disabled.
    DisableProfile = 0,
    /// A resolution step may carry independent x/y DPI values.
    SeparateXyDpi = 1,
    /// A resolution step may be disabled by setting dpi to 0.
    ResolutionDisable = 2,
    /// The profile exposes a configurable debounce time.
    Debounce = 3,
    /// The profile exposes configurable angle snapping.
    AngleSnapping = 4,
    /// LEDs support the `on` mode with a settable color.
    LedOn = 5,
    /// LEDs support the `cycle` (hue rotation) mode.
    LedCycle = 6,
    /// LEDs support the `breathing` mode.
    LedBreathing = 7,
    /// The device exposes an explicit "commit to flash" command distinct
    /// from writing live registers.
    SaveToFlash = 8,
    /// The device requires a profile to be active on hardware before it
    /// will accept writes targeting that profile.
    WriteNeedsActiveProfile = 9,
    /// Buttons may be bound to user-programmable macros.
    Macro = 10,
}

/// A bitset of [`Capability`] values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn single(cap: Capability) -> Self {
        Self(1 << (cap as u32))
    }

    pub fn insert(&mut self, cap: Capability) -> &mut Self {
        self.0 |= 1 << (cap as u32);
        self
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.0 & (1 << (cap as u32)) != 0
    }

    pub fn union(mut self, other: Capabilities) -> Capabilities {
        self.0 |= other.0;
        self
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        let mut caps = Capabilities::empty();
        for c in iter {
            caps.insert(c);
        }
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_query() {
        let mut caps = Capabilities::empty();
        assert!(!caps.has(Capability::Macro));
        caps.insert(Capability::Macro);
        assert!(caps.has(Capability::Macro));
        assert!(!caps.has(Capability::SeparateXyDpi));
    }

    #[test]
    fn from_iter_collects_all() {
        let caps: Capabilities =
            [Capability::LedOn, Capability::LedBreathing].into_iter().collect();
        assert!(caps.has(Capability::LedOn));
        assert!(caps.has(Capability::LedBreathing));
        assert!(!caps.has(Capability::LedCycle));
    }
}
