//! Etekcity/Redragon gaming mouse driver.
//!
//! Targets mice using the Etekcity USB HID protocol: Redragon M709,
//! Etekcity Scroll 1, and similar devices. Profiles are addressed
//! directly by index (no onboard "current profile" register beyond the
//! one this driver writes), each carrying its own settings report (DPI
//! table, report rate, lighting) and a fixed-size key-mapping report.

use crate::datastore::DataStoreEntry;
use crate::error::{RatbagError, Result};
use crate::model::{
    Action, ActionType, Capabilities, Capability, Device, Dpi, DpiSource, Led, LedMode, Profile,
    ProfileLayout, SpecialAction,
};
use crate::transport::Transport;

const ETEKCITY_PROFILE_MAX: u8 = 4;
const ETEKCITY_BUTTON_MAX: usize = 10;
const ETEKCITY_NUM_DPI: usize = 6;

const ETEKCITY_REPORT_ID_CONFIGURE_PROFILE: u8 = 0x04;
const ETEKCITY_REPORT_ID_PROFILE: u8 = 0x05;
const ETEKCITY_REPORT_ID_SETTINGS: u8 = 0x06;
const ETEKCITY_REPORT_ID_KEY_MAPPING: u8 = 0x07;

const ETEKCITY_REPORT_SIZE_PROFILE: usize = 50;
const ETEKCITY_REPORT_SIZE_SETTINGS: usize = 40;

const ETEKCITY_CONFIG_SETTINGS: u8 = 0x10;
const ETEKCITY_CONFIG_KEY_MAPPING: u8 = 0x20;

const ETEKCITY_DPI_MIN: u32 = 100;
const ETEKCITY_DPI_MAX: u32 = 24_000;
const ETEKCITY_DPI_STEP: u32 = 100;
const ETEKCITY_REPORT_RATES: &[u32] = &[125, 250, 500, 1000];

/// Raw byte read from/written to the key-mapping report, mapped to the
/// action it represents. Linux keycodes are the standard
/// `input-event-codes.h` values.
struct ButtonMapping {
    raw: u8,
    action: MappedAction,
}

#[derive(Clone, Copy)]
enum MappedAction {
    None,
    Mouse(u8),
    Special(SpecialAction),
    Key(u32),
}

static BUTTON_MAP: &[ButtonMapping] = &[
    ButtonMapping { raw: 1, action: MappedAction::Mouse(0) },
    ButtonMapping { raw: 2, action: MappedAction::Mouse(1) },
    ButtonMapping { raw: 3, action: MappedAction::Mouse(2) },
    ButtonMapping { raw: 4, action: MappedAction::Special(SpecialAction::DoubleClick) },
    ButtonMapping { raw: 6, action: MappedAction::None },
    ButtonMapping { raw: 7, action: MappedAction::Mouse(3) },
    ButtonMapping { raw: 8, action: MappedAction::Mouse(4) },
    ButtonMapping { raw: 9, action: MappedAction::Special(SpecialAction::WheelUp) },
    ButtonMapping { raw: 10, action: MappedAction::Special(SpecialAction::WheelDown) },
    ButtonMapping { raw: 11, action: MappedAction::Special(SpecialAction::WheelLeft) },
    ButtonMapping { raw: 12, action: MappedAction::Special(SpecialAction::WheelRight) },
    ButtonMapping { raw: 13, action: MappedAction::Special(SpecialAction::ResolutionCycleUp) },
    ButtonMapping { raw: 14, action: MappedAction::Special(SpecialAction::ResolutionUp) },
    ButtonMapping { raw: 15, action: MappedAction::Special(SpecialAction::ResolutionDown) },
    ButtonMapping { raw: 18, action: MappedAction::Special(SpecialAction::ProfileCycleUp) },
    ButtonMapping { raw: 19, action: MappedAction::Special(SpecialAction::ProfileUp) },
    ButtonMapping { raw: 20, action: MappedAction::Special(SpecialAction::ProfileDown) },
    ButtonMapping { raw: 25, action: MappedAction::Key(148) }, // KEY_CONFIG
    ButtonMapping { raw: 26, action: MappedAction::Key(165) }, // KEY_PREVIOUSSONG
    ButtonMapping { raw: 27, action: MappedAction::Key(163) }, // KEY_NEXTSONG
    ButtonMapping { raw: 28, action: MappedAction::Key(164) }, // KEY_PLAYPAUSE
    ButtonMapping { raw: 29, action: MappedAction::Key(166) }, // KEY_STOPCD
    ButtonMapping { raw: 30, action: MappedAction::Key(113) }, // KEY_MUTE
    ButtonMapping { raw: 31, action: MappedAction::Key(115) }, // KEY_VOLUMEUP
    ButtonMapping { raw: 32, action: MappedAction::Key(114) }, // KEY_VOLUMEDOWN
    ButtonMapping { raw: 33, action: MappedAction::Key(140) }, // KEY_CALC
    ButtonMapping { raw: 34, action: MappedAction::Key(155) }, // KEY_MAIL
    ButtonMapping { raw: 35, action: MappedAction::Key(156) }, // KEY_BOOKMARKS
    ButtonMapping { raw: 36, action: MappedAction::Key(159) }, // KEY_FORWARD
    ButtonMapping { raw: 37, action: MappedAction::Key(158) }, // KEY_BACK
    ButtonMapping { raw: 38, action: MappedAction::Key(128) }, // KEY_STOP
    ButtonMapping { raw: 39, action: MappedAction::Key(144) }, // KEY_FILE
    ButtonMapping { raw: 40, action: MappedAction::Key(173) }, // KEY_REFRESH
    ButtonMapping { raw: 41, action: MappedAction::Key(172) }, // KEY_HOMEPAGE
    ButtonMapping { raw: 42, action: MappedAction::Key(217) }, // KEY_SEARCH
];

fn action_from_raw(raw: u8) -> Action {
    match BUTTON_MAP.iter().find(|m| m.raw == raw).map(|m| m.action) {
        Some(MappedAction::None) | None => Action::None,
        Some(MappedAction::Mouse(n)) => Action::MouseButton(n),
        Some(MappedAction::Special(s)) => Action::Special(s),
        Some(MappedAction::Key(k)) => Action::Key(k),
    }
}

fn raw_from_action(action: &Action) -> Result<u8> {
    let wanted = match action {
        Action::None => return Ok(6),
        Action::MouseButton(n) => MappedAction::Mouse(*n),
        Action::Special(s) => MappedAction::Special(*s),
        Action::Key(k) => MappedAction::Key(*k),
        Action::Macro(_) => return Err(RatbagError::Unsupported("etekcity macro buttons")),
    };
    BUTTON_MAP
        .iter()
        .find(|m| match (m.action, wanted) {
            (MappedAction::Mouse(a), MappedAction::Mouse(b)) => a == b,
            (MappedAction::Special(a), MappedAction::Special(b)) => a == b,
            (MappedAction::Key(a), MappedAction::Key(b)) => a == b,
            _ => false,
        })
        .map(|m| m.raw)
        .ok_or_else(|| RatbagError::value("action has no etekcity raw encoding"))
}

/// Convert a logical button index to its storage offset in the profile
/// report: buttons 0-7 map linearly, buttons 8-9 sit past a 5-byte gap.
fn button_to_raw_index(button: usize) -> usize {
    if button < 8 { button } else { button + 5 }
}

fn configure_profile_report(profile: u8, config_type: u8) -> [u8; 3] {
    [ETEKCITY_REPORT_ID_CONFIGURE_PROFILE, profile, config_type]
}

fn set_active_profile_report(index: u8) -> [u8; 3] {
    [ETEKCITY_REPORT_ID_PROFILE, 0x03, index]
}

struct EtekcityData {
    num_profiles: usize,
}

pub struct EtekcityDriver;

impl EtekcityDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EtekcityDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for EtekcityDriver {
    fn id(&self) -> &'static str {
        "etekcity"
    }

    fn probe(&self, device: &Device, transport: &Transport, _entry: &DataStoreEntry) -> Result<()> {
        let mut buf = [0u8; 3];
        buf[0] = ETEKCITY_REPORT_ID_PROFILE;
        transport.get_feature(&mut buf)?;

        let num_profiles = (ETEKCITY_PROFILE_MAX + 1) as usize;

        let mut caps = Capabilities::empty();
        caps.insert(Capability::WriteNeedsActiveProfile);

        device.init_profiles(
            num_profiles,
            &ProfileLayout {
                num_resolutions: ETEKCITY_NUM_DPI,
                num_buttons: ETEKCITY_BUTTON_MAX,
                num_leds: 1,
                profile_capabilities: caps,
                resolution_source: DpiSource::Range {
                    min: ETEKCITY_DPI_MIN,
                    max: ETEKCITY_DPI_MAX,
                    step: ETEKCITY_DPI_STEP,
                },
                resolution_capabilities: Capabilities::empty(),
                button_permitted: vec![
                    ActionType::None,
                    ActionType::MouseButton,
                    ActionType::Key,
                    ActionType::Special,
                ],
                led_capabilities: [Capability::LedOn, Capability::LedBreathing].into_iter().collect(),
            },
        );

        for profile in device.profiles() {
            let raw_index = profile.index() as u8;
            transport.set_feature(&configure_profile_report(raw_index, ETEKCITY_CONFIG_KEY_MAPPING))?;
            let mut report = [0u8; ETEKCITY_REPORT_SIZE_PROFILE];
            report[0] = ETEKCITY_REPORT_ID_PROFILE;
            transport.get_feature(&mut report)?;
            for button in profile.buttons() {
                let offset = 1 + button_to_raw_index(button.index() as usize);
                if offset >= report.len() {
                    continue;
                }
                let action = action_from_raw(report[offset]);
                let _ = button.set_action(action, None);
            }
        }

        device.set_driver_state(EtekcityData { num_profiles });
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<EtekcityData>();
        Ok(())
    }

    fn commit(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let raw_index = profile.index() as u8;
        transport.set_feature(&configure_profile_report(raw_index, ETEKCITY_CONFIG_SETTINGS))?;

        if profile.resolutions().iter().any(crate::model::Resolution::is_dirty) || profile.is_dirty() {
            let mut settings = [0u8; ETEKCITY_REPORT_SIZE_SETTINGS];
            settings[0] = ETEKCITY_REPORT_ID_SETTINGS;
            settings[2] = raw_index;
            settings[5] = 0;
            for (i, resolution) in profile.resolutions().iter().enumerate().take(ETEKCITY_NUM_DPI) {
                let Dpi::Unified(dpi) = resolution.dpi() else {
                    return Err(RatbagError::Unsupported("etekcity has no separate x/y dpi"));
                };
                let raw = ((dpi - ETEKCITY_DPI_MIN) / ETEKCITY_DPI_STEP) as u8;
                settings[6 + i] = raw;
                settings[6 + ETEKCITY_NUM_DPI + i] = raw;
                if resolution.is_active() {
                    settings[18] = i as u8;
                }
            }
            if let Some(rate_index) = ETEKCITY_REPORT_RATES.iter().position(|&r| r == profile.report_rate_hz()) {
                settings[26] = rate_index as u8;
            }
            transport.set_feature(&settings)?;
        }

        transport.set_feature(&configure_profile_report(raw_index, ETEKCITY_CONFIG_KEY_MAPPING))?;
        let mut key_mapping = [0u8; ETEKCITY_REPORT_SIZE_PROFILE];
        key_mapping[0] = ETEKCITY_REPORT_ID_KEY_MAPPING;
        key_mapping[1] = raw_index;
        for button in profile.buttons() {
            if !button.is_dirty() {
                continue;
            }
            let offset = 2 + button_to_raw_index(button.index() as usize);
            if offset >= key_mapping.len() {
                continue;
            }
            key_mapping[offset] = raw_from_action(&button.action())?;
        }
        transport.set_feature(&key_mapping)?;

        for led in profile.leds() {
            if !led.is_dirty() {
                continue;
            }
            write_led(transport, raw_index, &led)?;
        }

        Ok(())
    }

    fn set_active_profile(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        transport.set_feature(&set_active_profile_report(profile.index() as u8))?;
        Ok(())
    }
}

fn write_led(transport: &Transport, profile_index: u8, led: &Led) -> Result<()> {
    let on = match led.mode() {
        LedMode::Off => 0u8,
        LedMode::On | LedMode::Breathing | LedMode::Cycle => 1u8,
    };
    let mut report = [0u8; ETEKCITY_REPORT_SIZE_SETTINGS];
    report[0] = ETEKCITY_REPORT_ID_SETTINGS;
    report[2] = profile_index;
    report[31] = on;
    report[32] = led.brightness();
    transport.set_feature(&report)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_to_raw_index_skips_gap() {
        assert_eq!(button_to_raw_index(0), 0);
        assert_eq!(button_to_raw_index(7), 7);
        assert_eq!(button_to_raw_index(8), 13);
        assert_eq!(button_to_raw_index(9), 14);
    }

    #[test]
    fn raw_action_round_trips_for_mouse_buttons() {
        let action = Action::MouseButton(2);
        let raw = raw_from_action(&action).unwrap();
        assert_eq!(action_from_raw(raw), action);
    }

    #[test]
    fn unmapped_raw_is_none() {
        assert_eq!(action_from_raw(250), Action::None);
    }

    #[test]
    fn macro_action_is_unsupported() {
        let m = crate::model::Macro::new("m", None, vec![]);
        let err = raw_from_action(&Action::Macro(m)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unsupported);
    }
}
