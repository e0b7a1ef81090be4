//! The button action taxonomy: physical button types and the tagged union
//! of things a button can emit when pressed.

use serde::{Deserialize, Serialize};

/// The physical role of a button on the chassis, used by drivers to decide
/// default bindings and by callers to render a sensible UI label. `Unknown`
/// covers buttons a `.device` file doesn't classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalButtonType {
    Left,
    Right,
    Middle,
    Wheel,
    WheelLeft,
    WheelRight,
    Thumb,
    Thumb2,
    Side,
    Side2,
    ResolutionUp,
    ResolutionDown,
    ProfileUp,
    ProfileDown,
    Unknown,
}

/// Named hardware-level functions that aren't a mouse button or key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialAction {
    WheelUp,
    WheelDown,
    WheelLeft,
    WheelRight,
    ResolutionUp,
    ResolutionDown,
    ResolutionCycleUp,
    ResolutionCycleDown,
    ResolutionAlternate,
    ResolutionDefault,
    ProfileUp,
    ProfileDown,
    ProfileCycleUp,
    DoubleClick,
    SecondMode,
    BatteryLevel,
}

/// One event in a macro's ordered event list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroEvent {
    KeyPressed(u32),
    KeyReleased(u32),
    /// Inter-event delay in milliseconds.
    Wait(u32),
}

/// A user-programmed macro bound to a button.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Macro {
    pub name: String,
    pub group: Option<String>,
    pub events: Vec<MacroEvent>,
}

impl Macro {
    /// Build a macro, applying the invariants from the design: a leading
    /// `Wait` is dropped and consecutive `Wait`s are coalesced into one.
    /// Does **not** enforce the device length limit; that is the caller's
    /// (driver's) job since the limit is device-specific.
    pub fn new(name: impl Into<String>, group: Option<String>, events: Vec<MacroEvent>) -> Self {
        Self {
            name: name.into(),
            group,
            events: normalize_events(events),
        }
    }

    /// Truncate the name to `max_len` bytes (on a char boundary) as the
    /// device's own storage format requires.
    pub fn truncate_name(&mut self, max_len: usize) -> bool {
        if self.name.len() <= max_len {
            return false;
        }
        let mut end = max_len;
        while end > 0 && !self.name.is_char_boundary(end) {
            end -= 1;
        }
        self.name.truncate(end);
        true
    }
}

fn normalize_events(events: Vec<MacroEvent>) -> Vec<MacroEvent> {
    let mut out: Vec<MacroEvent> = Vec::with_capacity(events.len());
    for ev in events {
        match ev {
            MacroEvent::Wait(ms) => {
                if out.is_empty() {
                    // Leading wait carries no meaning; the button press is
                    // itself the starting edge.
                    continue;
                }
                match out.last_mut() {
                    Some(MacroEvent::Wait(prev)) => *prev += ms,
                    _ => out.push(MacroEvent::Wait(ms)),
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// What a button does when pressed. Exactly one variant is active at a
/// time; setters validate the chosen variant against the button's
/// permitted action-type set before accepting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    None,
    MouseButton(u8),
    Key(u32),
    Special(SpecialAction),
    Macro(Macro),
}

/// The discriminant of [`Action`], used for the `permitted action types` set
/// (so we can store "what this button may hold" without allocating sample
/// values for every variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    None,
    MouseButton,
    Key,
    Special,
    Macro,
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        match self {
            Action::None => ActionType::None,
            Action::MouseButton(_) => ActionType::MouseButton,
            Action::Key(_) => ActionType::Key,
            Action::Special(_) => ActionType::Special,
            Action::Macro(_) => ActionType::Macro,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_wait_is_dropped() {
        let m = Macro::new(
            "m",
            None,
            vec![MacroEvent::Wait(50), MacroEvent::KeyPressed(30)],
        );
        assert_eq!(m.events, vec![MacroEvent::KeyPressed(30)]);
    }

    #[test]
    fn adjacent_waits_are_coalesced() {
        let m = Macro::new(
            "m",
            None,
            vec![
                MacroEvent::KeyPressed(30),
                MacroEvent::Wait(10),
                MacroEvent::Wait(15),
                MacroEvent::KeyReleased(30),
            ],
        );
        assert_eq!(
            m.events,
            vec![
                MacroEvent::KeyPressed(30),
                MacroEvent::Wait(25),
                MacroEvent::KeyReleased(30),
            ]
        );
    }

    #[test]
    fn truncate_name_respects_char_boundaries() {
        let mut m = Macro::new("hello world", None, vec![]);
        assert!(m.truncate_name(5));
        assert_eq!(m.name, "hello");
        assert!(!m.truncate_name(5));
    }

    #[test]
    fn action_type_matches_variant() {
        assert_eq!(Action::None.action_type(), ActionType::None);
        assert_eq!(Action::MouseButton(1).action_type(), ActionType::MouseButton);
        assert_eq!(
            Action::Special(SpecialAction::WheelUp).action_type(),
            ActionType::Special
        );
    }
}
