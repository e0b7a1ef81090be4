//! The typed, refcounted device object graph: device → profiles →
//! {buttons, resolutions, LEDs}. See each submodule for the entity it
//! defines; dirty tracking and capability bitsets are threaded through all
//! of them.
//!
//! Every handle (`Device`, `Profile`, `Resolution`, `Button`, `Led`) is a
//! cheap `Clone` wrapping an `Rc<RefCell<_>>`; cloning one *is* the "ref"
//! operation from the design, and dropping the last clone *is* "unref" —
//! there is no separate API for it, since Rust's ownership model makes a
//! distinct unref call redundant. Each child holds a strong `Rc` back to
//! its parent, so a caller holding only a `Button` still keeps the whole
//! chain (button → profile → device) alive.

pub mod action;
pub mod button;
pub mod capability;
pub mod device;
pub mod led;
pub mod profile;
pub mod resolution;

pub use action::{Action, ActionType, Macro, MacroEvent, PhysicalButtonType, SpecialAction};
pub use button::Button;
pub use capability::{Capabilities, Capability};
pub use device::{BusType, Device, DeviceIdentity, ProfileLayout};
pub use led::{ColorDepth, Led, LedMode, LedType, Rgb};
pub use profile::Profile;
pub use resolution::{Dpi, DpiSource, Resolution};
