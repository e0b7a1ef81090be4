//! Device model and commit engine for configuring gaming-mouse hardware
//! over HID feature reports.
//!
//! This crate is the core library split out of the daemon: a typed,
//! refcounted object graph (device → profiles → buttons/resolutions/LEDs)
//! with dirty tracking, the HID++ 1.0/2.0 protocol channels, a driver
//! plugin framework, and a commit engine that writes only the dirty
//! subset of that graph to hardware in a safe order with rollback. It
//! has no opinion about IPC, privilege separation, or process lifecycle —
//! an embedder (a daemon, a CLI, a test harness) drives it by opening a
//! [`transport::Transport`], looking a [`datastore::DataStoreEntry`] up,
//! dispatching to a [`driver::DeviceDriver`], and calling
//! [`commit::commit`] once the resulting [`model::Device`] has dirty
//! state.

pub mod commit;
pub mod datastore;
pub mod driver;
pub mod error;
pub mod model;
pub mod transport;

pub use commit::commit;
pub use datastore::{DataStore, DataStoreEntry, DpiRange, IniDataStore};
pub use driver::{DeviceDriver, DriverRegistry};
pub use error::{ErrorKind, ProtocolCode, RatbagError, Result};
pub use model::{
    Action, ActionType, Button, BusType, Capabilities, Capability, ColorDepth, Device,
    DeviceIdentity, Dpi, DpiSource, Led, LedMode, LedType, Macro, MacroEvent, PhysicalButtonType,
    Profile, ProfileLayout, Resolution, Rgb, SpecialAction,
};
pub use transport::{open_unrestricted, CloseRestricted, OpenRestricted, RawInfo, Transport};
