//! Button entities: physical input with a single, swappable action.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{RatbagError, Result};
use crate::model::action::{Action, ActionType, PhysicalButtonType};
use crate::model::profile::Profile;

pub(crate) struct ButtonInner {
    pub profile: Profile,
    pub index: u32,
    pub physical_type: PhysicalButtonType,
    pub permitted: Vec<ActionType>,
    pub action: Action,
    pub dirty: bool,
}

#[derive(Clone)]
pub struct Button(pub(crate) Rc<RefCell<ButtonInner>>);

impl Button {
    pub(crate) fn new(
        profile: Profile,
        index: u32,
        physical_type: PhysicalButtonType,
        permitted: Vec<ActionType>,
    ) -> Self {
        Button(Rc::new(RefCell::new(ButtonInner {
            profile,
            index,
            physical_type,
            permitted,
            action: Action::None,
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

    pub fn physical_type(&self) -> PhysicalButtonType {
        self.0.borrow().physical_type
    }

    pub fn permitted_action_types(&self) -> Vec<ActionType> {
        self.0.borrow().permitted.clone()
    }

    pub fn action(&self) -> Action {
        self.0.borrow().action.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.0.borrow().dirty
    }

    pub(crate) fn clear_dirty(&self) {
        self.0.borrow_mut().dirty = false;
    }

    /// Length limit for the macro's event list; `None` means macros are
    /// unsupported on this button (checked via the permitted-types set).
    pub fn set_action(&self, action: Action, macro_event_limit: Option<usize>) -> Result<()> {
        let ty = action.action_type();
        if !self.0.borrow().permitted.contains(&ty) {
            return Err(RatbagError::value(format!(
                "button {} does not permit action type {ty:?}",
                self.index()
            )));
        }
        if let Action::Macro(ref m) = action
            && let Some(limit) = macro_event_limit
            && m.events.len() > limit
        {
            return Err(RatbagError::value(format!(
                "macro has {} events, device supports at most {limit}",
                m.events.len()
            )));
        }
        let mut inner = self.0.borrow_mut();
        inner.action = action;
        inner.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action::SpecialAction;
    use crate::model::capability::Capabilities;
    use crate::model::device::Device;
    use crate::model::profile::Profile;

    fn sample_button(permitted: Vec<ActionType>) -> Button {
        let device = Device::new_for_test();
        let profile = Profile::new(device, 0, Capabilities::empty());
        Button::new(profile, 0, PhysicalButtonType::Left, permitted)
    }

    #[test]
    fn rejects_action_type_not_permitted() {
        let button = sample_button(vec![ActionType::MouseButton]);
        let err = button.set_action(Action::Key(30), None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Value);
        assert!(!button.is_dirty());
    }

    #[test]
    fn accepts_permitted_action_and_dirties() {
        let button = sample_button(vec![ActionType::Special]);
        button
            .set_action(Action::Special(SpecialAction::ResolutionUp), None)
            .unwrap();
        assert!(button.is_dirty());
        assert_eq!(button.action().action_type(), ActionType::Special);
    }

    #[test]
    fn macro_over_limit_rejected() {
        use crate::model::action::{Macro, MacroEvent};
        let button = sample_button(vec![ActionType::Macro]);
        let m = Macro::new(
            "big",
            None,
            vec![MacroEvent::KeyPressed(1); 10],
        );
        let err = button.set_action(Action::Macro(m), Some(5)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Value);
    }
}
