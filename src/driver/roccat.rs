//! Roccat gaming mouse driver.
//!
//! Targets the Kone family (Pure, Pure Color, EMP) and similar Roccat mice:
//! a 0x04 control report used as a ready/busy status byte, a profile-select
//! report, a single settings report holding polling rate and DPI, a flat
//! button-binding table, a macro bank per button, and a multi-zone RGB
//! report. The status-poll shape (`report 0x04`, ready when byte 1 is
//! `0x01`) and the per-zone RGBA color report are the two pieces this
//! driver has an actual capture to work from; the rest of the byte layout
//! is this crate's own, following the same "data tables, not wire-format
//! truth" caveat `sinowealth.rs` documents for its config report.
//!
//! Roccat is one of the two families (with Logitech's wireless receivers)
//! the design calls out as gating writes on a status byte rather than
//! accepting them unconditionally; `wait_ready` from the driver module is
//! used the same way `hidpp10`/`hidpp20` use it after a profile switch.

use crate::datastore::DataStoreEntry;
use crate::driver::wait_ready;
use crate::error::{RatbagError, Result};
use crate::model::{
    Action, ActionType, Capabilities, Capability, Device, Dpi, DpiSource, LedMode, Macro,
    MacroEvent, Profile, ProfileLayout, Rgb,
};
use crate::transport::Transport;
use std::time::Duration;

const ROCCAT_REPORT_CONTROL: u8 = 0x04;
const ROCCAT_REPORT_PROFILE: u8 = 0x05;
const ROCCAT_REPORT_SETTINGS: u8 = 0x06;
const ROCCAT_REPORT_BUTTONS: u8 = 0x07;
const ROCCAT_REPORT_MACRO: u8 = 0x08;
const ROCCAT_REPORT_LED: u8 = 0x0d;

const ROCCAT_CONTROL_SIZE: usize = 4;
const ROCCAT_SETTINGS_SIZE: usize = 16;
const ROCCAT_BUTTONS_SIZE: usize = 42;
const ROCCAT_MACRO_SIZE: usize = 2082;
const ROCCAT_LED_SIZE: usize = 21;

const ROCCAT_NUM_PROFILES: usize = 5;
const ROCCAT_NUM_BUTTONS: usize = 8;
const ROCCAT_NUM_DPI: usize = 5;
const ROCCAT_NUM_LEDS: usize = 3;

const ROCCAT_DPI_MIN: u32 = 200;
const ROCCAT_DPI_MAX: u32 = 8200;
const ROCCAT_DPI_STEP: u32 = 50;

const ROCCAT_REPORT_RATES: &[u32] = &[125, 250, 500, 1000];

/// Maximum number of key events one button's macro bank can hold. The real
/// firmware's bank is the limiting factor the design's open question is
/// about; this crate treats it as a flat array, not a reused counter (see
/// `decode_macro`/`encode_macro` below).
const ROCCAT_MAX_MACRO_EVENTS: usize = 240;

const ROCCAT_READY_ATTEMPTS: u32 = 20;
const ROCCAT_READY_INTERVAL: Duration = Duration::from_millis(30);

const ROCCAT_BUTTON_OFF: u8 = 0x00;
const ROCCAT_BUTTON_MOUSE: u8 = 0x01;
const ROCCAT_BUTTON_KEY: u8 = 0x02;
const ROCCAT_BUTTON_MACRO: u8 = 0x03;
const ROCCAT_BUTTON_WHEEL_UP: u8 = 0x0a;
const ROCCAT_BUTTON_WHEEL_DOWN: u8 = 0x0b;
const ROCCAT_BUTTON_DPI_UP: u8 = 0x0c;
const ROCCAT_BUTTON_DPI_DOWN: u8 = 0x0d;
const ROCCAT_BUTTON_PROFILE_CYCLE: u8 = 0x0e;

/// One raw macro event slot as stored in the macro bank: `[kind, param]`.
const ROCCAT_MACRO_EVENT_KEY_DOWN: u8 = 0x01;
const ROCCAT_MACRO_EVENT_KEY_UP: u8 = 0x02;
const ROCCAT_MACRO_EVENT_WAIT: u8 = 0x03;

fn dpi_to_raw(dpi: u32) -> Option<u8> {
    if dpi < ROCCAT_DPI_MIN || dpi > ROCCAT_DPI_MAX || (dpi - ROCCAT_DPI_MIN) % ROCCAT_DPI_STEP != 0 {
        return None;
    }
    u8::try_from((dpi - ROCCAT_DPI_MIN) / ROCCAT_DPI_STEP).ok()
}

fn raw_to_dpi(raw: u8) -> u32 {
    ROCCAT_DPI_MIN + u32::from(raw) * ROCCAT_DPI_STEP
}

fn button_action_from_raw(raw: u8, param: u8) -> Action {
    use crate::model::SpecialAction;
    match raw {
        ROCCAT_BUTTON_OFF => Action::None,
        ROCCAT_BUTTON_MOUSE => Action::MouseButton(param),
        ROCCAT_BUTTON_KEY => Action::Key(u32::from(param)),
        ROCCAT_BUTTON_WHEEL_UP => Action::Special(SpecialAction::WheelUp),
        ROCCAT_BUTTON_WHEEL_DOWN => Action::Special(SpecialAction::WheelDown),
        ROCCAT_BUTTON_DPI_UP => Action::Special(SpecialAction::ResolutionUp),
        ROCCAT_BUTTON_DPI_DOWN => Action::Special(SpecialAction::ResolutionDown),
        ROCCAT_BUTTON_PROFILE_CYCLE => Action::Special(SpecialAction::ProfileCycleUp),
        _ => Action::None,
    }
}

fn raw_from_button_action(action: &Action) -> Result<(u8, u8)> {
    use crate::model::SpecialAction;
    match action {
        Action::None => Ok((ROCCAT_BUTTON_OFF, 0)),
        Action::MouseButton(n) => Ok((ROCCAT_BUTTON_MOUSE, *n)),
        Action::Key(code) => {
            let key = u8::try_from(*code).map_err(|_| RatbagError::value("keycode does not fit a byte on this device"))?;
            Ok((ROCCAT_BUTTON_KEY, key))
        }
        Action::Special(SpecialAction::WheelUp) => Ok((ROCCAT_BUTTON_WHEEL_UP, 0)),
        Action::Special(SpecialAction::WheelDown) => Ok((ROCCAT_BUTTON_WHEEL_DOWN, 0)),
        Action::Special(SpecialAction::ResolutionUp) => Ok((ROCCAT_BUTTON_DPI_UP, 0)),
        Action::Special(SpecialAction::ResolutionDown) => Ok((ROCCAT_BUTTON_DPI_DOWN, 0)),
        Action::Special(SpecialAction::ProfileCycleUp) => Ok((ROCCAT_BUTTON_PROFILE_CYCLE, 0)),
        Action::Special(_) => Err(RatbagError::Unsupported("roccat special action")),
        Action::Macro(_) => Ok((ROCCAT_BUTTON_MACRO, 0)),
    }
}

/// Decode one button's macro bank.
///
/// The design's open question asks what happens when the firmware's own
/// `count` field is reused as both an event counter and a pre-decremented
/// index into the key table, and what a leading or doubled `wait` means in
/// that scheme. This driver sidesteps the ambiguity entirely on decode: the
/// bank is a flat array of `[kind, param]` slots and `slot_count` is read
/// once as a plain length, never as an index. Each slot decodes
/// independently in forward order; a `wait` slot at index 0 and adjacent
/// `wait` slots decode to the same `MacroEvent::Wait` sequence a normal
/// macro would, and `Macro::new` (not this function) is responsible for
/// collapsing a leading wait or coalescing adjacent ones, exactly as it
/// does for every other driver's macros.
fn decode_macro(bank: &[u8], name: &str) -> Macro {
    let slot_count = usize::from(bank.first().copied().unwrap_or(0)).min(ROCCAT_MAX_MACRO_EVENTS);
    let mut events = Vec::with_capacity(slot_count);
    for slot in bank[1..].chunks_exact(2).take(slot_count) {
        let (kind, param) = (slot[0], slot[1]);
        match kind {
            ROCCAT_MACRO_EVENT_KEY_DOWN => events.push(MacroEvent::KeyPressed(u32::from(param))),
            ROCCAT_MACRO_EVENT_KEY_UP => events.push(MacroEvent::KeyReleased(u32::from(param))),
            ROCCAT_MACRO_EVENT_WAIT => events.push(MacroEvent::Wait(u32::from(param) * 10)),
            _ => {}
        }
    }
    Macro::new(name, None, events)
}

/// Encode a macro into a fixed-size bank: byte 0 is the slot count, then
/// one `[kind, param]` pair per event. `wait` values are quantized to 10ms
/// units (the smallest the one-byte param can address) and clamped to
/// 255 units (2550ms) rather than silently overflowing into the next slot.
fn encode_macro(m: &Macro, bank: &mut [u8]) -> Result<()> {
    if m.events.len() > ROCCAT_MAX_MACRO_EVENTS {
        return Err(RatbagError::value(format!(
            "macro has {} events, device supports at most {ROCCAT_MAX_MACRO_EVENTS}",
            m.events.len()
        )));
    }
    bank[0] = m.events.len() as u8;
    for (i, event) in m.events.iter().enumerate() {
        let (kind, param) = match *event {
            MacroEvent::KeyPressed(code) => (
                ROCCAT_MACRO_EVENT_KEY_DOWN,
                u8::try_from(code).map_err(|_| RatbagError::value("keycode does not fit a byte on this device"))?,
            ),
            MacroEvent::KeyReleased(code) => (
                ROCCAT_MACRO_EVENT_KEY_UP,
                u8::try_from(code).map_err(|_| RatbagError::value("keycode does not fit a byte on this device"))?,
            ),
            MacroEvent::Wait(ms) => (ROCCAT_MACRO_EVENT_WAIT, (ms / 10).min(255) as u8),
        };
        bank[1 + i * 2] = kind;
        bank[1 + i * 2 + 1] = param;
    }
    Ok(())
}

fn led_mode_from_raw(raw: u8) -> LedMode {
    match raw {
        1 => LedMode::On,
        2 => LedMode::Cycle,
        3 => LedMode::Breathing,
        _ => LedMode::Off,
    }
}

fn raw_from_led_mode(mode: LedMode) -> u8 {
    match mode {
        LedMode::Off => 0,
        LedMode::On => 1,
        LedMode::Cycle => 2,
        LedMode::Breathing => 3,
    }
}

struct RoccatData {
    active_profile: u32,
}

pub struct RoccatDriver;

impl RoccatDriver {
    pub fn new() -> Self {
        Self
    }

    /// Poll report `0x04` until byte 1 reads `0x01` ("ready"), the same
    /// status-byte shape a real control-transfer capture of this family
    /// shows after a profile switch or a settings write.
    fn wait_device_ready(&self, transport: &Transport) -> Result<()> {
        wait_ready(ROCCAT_READY_ATTEMPTS, ROCCAT_READY_INTERVAL, || {
            let mut buf = [0u8; ROCCAT_CONTROL_SIZE];
            buf[0] = ROCCAT_REPORT_CONTROL;
            transport.get_feature(&mut buf)?;
            Ok(buf[1] == 0x01)
        })
    }

    fn select_profile(&self, transport: &Transport, index: u32) -> Result<()> {
        let mut buf = [0u8; 3];
        buf[0] = ROCCAT_REPORT_PROFILE;
        buf[1] = index as u8;
        transport.set_feature(&buf)?;
        self.wait_device_ready(transport)
    }

    fn read_settings(&self, transport: &Transport, profile: &Profile) -> Result<()> {
        let mut buf = [0u8; ROCCAT_SETTINGS_SIZE];
        buf[0] = ROCCAT_REPORT_SETTINGS;
        transport.get_feature(&mut buf)?;

        let _ = profile.set_report_rate_hz(ROCCAT_REPORT_RATES.get(usize::from(buf[1])).copied().unwrap_or(1000));

        let active_dpi = buf[2];
        for (i, resolution) in profile.resolutions().iter().enumerate() {
            let raw = buf.get(4 + i).copied().unwrap_or(0);
            let _ = resolution.set_dpi(raw_to_dpi(raw));
            if i as u8 == active_dpi {
                let _ = resolution.set_active();
            }
        }
        Ok(())
    }

    fn read_buttons(&self, transport: &Transport, profile: &Profile) -> Result<()> {
        let mut buf = [0u8; ROCCAT_BUTTONS_SIZE];
        buf[0] = ROCCAT_REPORT_BUTTONS;
        transport.get_feature(&mut buf)?;

        for button in profile.buttons() {
            let offset = 2 + button.index() as usize * 2;
            let raw = buf.get(offset).copied().unwrap_or(0);
            let param = buf.get(offset + 1).copied().unwrap_or(0);
            if raw == ROCCAT_BUTTON_MACRO {
                let mut bank = vec![0u8; ROCCAT_MACRO_SIZE];
                bank[0] = ROCCAT_REPORT_MACRO;
                bank[1] = button.index() as u8;
                transport.get_feature(&mut bank)?;
                let name = String::from_utf8_lossy(&bank[2..34]).trim_end_matches('\0').to_string();
                let macro_events = decode_macro(&bank[34..], &name);
                let _ = button.set_action(Action::Macro(macro_events), Some(ROCCAT_MAX_MACRO_EVENTS));
            } else {
                let _ = button.set_action(button_action_from_raw(raw, param), Some(ROCCAT_MAX_MACRO_EVENTS));
            }
        }
        Ok(())
    }

    fn read_leds(&self, transport: &Transport, profile: &Profile) -> Result<()> {
        let mut buf = [0u8; ROCCAT_LED_SIZE];
        buf[0] = ROCCAT_REPORT_LED;
        transport.get_feature(&mut buf)?;

        for led in profile.leds() {
            let offset = 2 + led.index() as usize * 4;
            if offset + 3 >= buf.len() {
                continue;
            }
            let _ = led.set_mode(led_mode_from_raw(buf[offset]));
            let _ = led.set_color(Rgb { r: buf[offset + 1], g: buf[offset + 2], b: buf[offset + 3] });
        }
        Ok(())
    }

    fn write_settings(&self, transport: &Transport, profile: &Profile) -> Result<()> {
        let mut buf = [0u8; ROCCAT_SETTINGS_SIZE];
        buf[0] = ROCCAT_REPORT_SETTINGS;
        let rate_index = ROCCAT_REPORT_RATES.iter().position(|&r| r == profile.report_rate_hz()).unwrap_or(3);
        buf[1] = rate_index as u8;

        for (i, resolution) in profile.resolutions().iter().enumerate() {
            let Dpi::Unified(dpi) = resolution.dpi() else {
                return Err(RatbagError::Unsupported("roccat has no separate x/y dpi"));
            };
            let raw = dpi_to_raw(dpi).ok_or_else(|| RatbagError::value(format!("{dpi} dpi not representable")))?;
            buf[4 + i] = raw;
            if resolution.is_active() {
                buf[2] = i as u8;
            }
        }
        transport.set_feature(&buf)?;
        self.wait_device_ready(transport)
    }

    fn write_buttons(&self, transport: &Transport, profile: &Profile) -> Result<()> {
        let mut buf = [0u8; ROCCAT_BUTTONS_SIZE];
        buf[0] = ROCCAT_REPORT_BUTTONS;
        let mut dirty_buttons = false;

        for button in profile.buttons() {
            if !button.is_dirty() {
                continue;
            }
            dirty_buttons = true;
            let offset = 2 + button.index() as usize * 2;
            let (raw, param) = raw_from_button_action(&button.action())?;
            buf[offset] = raw;
            buf[offset + 1] = param;

            if let Action::Macro(m) = button.action() {
                let mut bank = vec![0u8; ROCCAT_MACRO_SIZE];
                bank[0] = ROCCAT_REPORT_MACRO;
                bank[1] = button.index() as u8;
                let mut truncated = m;
                let was_truncated = truncated.truncate_name(32);
                let name_bytes = truncated.name.as_bytes();
                let len = name_bytes.len().min(32);
                bank[2..2 + len].copy_from_slice(&name_bytes[..len]);
                encode_macro(&truncated, &mut bank[34..])?;
                transport.set_feature(&bank)?;
                if was_truncated {
                    let _ = button.set_action(Action::Macro(truncated), Some(ROCCAT_MAX_MACRO_EVENTS));
                }
            }
        }

        if dirty_buttons {
            transport.set_feature(&buf)?;
        }
        Ok(())
    }

    fn write_leds(&self, transport: &Transport, profile: &Profile) -> Result<()> {
        let mut buf = [0u8; ROCCAT_LED_SIZE];
        buf[0] = ROCCAT_REPORT_LED;
        let mut dirty_leds = false;

        for led in profile.leds() {
            if !led.is_dirty() {
                continue;
            }
            dirty_leds = true;
            let offset = 2 + led.index() as usize * 4;
            let color = led.color();
            buf[offset] = raw_from_led_mode(led.mode());
            buf[offset + 1] = color.r;
            buf[offset + 2] = color.g;
            buf[offset + 3] = color.b;
        }

        if dirty_leds {
            transport.set_feature(&buf)?;
        }
        Ok(())
    }

    fn led_capabilities(&self) -> Capabilities {
        [Capability::LedOn, Capability::LedCycle, Capability::LedBreathing].into_iter().collect()
    }

    fn write_one(&self, transport: &Transport, profile: &Profile) -> Result<()> {
        if profile.is_dirty() {
            self.write_settings(transport, profile)?;
        }
        self.write_buttons(transport, profile)?;
        self.write_leds(transport, profile)?;
        Ok(())
    }
}

impl Default for RoccatDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for RoccatDriver {
    fn id(&self) -> &'static str {
        "roccat"
    }

    fn probe(&self, device: &Device, transport: &Transport, _entry: &DataStoreEntry) -> Result<()> {
        self.wait_device_ready(transport)?;

        let mut caps = Capabilities::empty();
        caps.insert(Capability::WriteNeedsActiveProfile);
        caps.insert(Capability::DisableProfile);

        device.init_profiles(
            ROCCAT_NUM_PROFILES,
            &ProfileLayout {
                num_resolutions: ROCCAT_NUM_DPI,
                num_buttons: ROCCAT_NUM_BUTTONS,
                num_leds: ROCCAT_NUM_LEDS,
                profile_capabilities: caps,
                resolution_source: DpiSource::Range {
                    min: ROCCAT_DPI_MIN,
                    max: ROCCAT_DPI_MAX,
                    step: ROCCAT_DPI_STEP,
                },
                resolution_capabilities: Capabilities::empty(),
                button_permitted: vec![
                    ActionType::None,
                    ActionType::MouseButton,
                    ActionType::Key,
                    ActionType::Special,
                    ActionType::Macro,
                ],
                led_capabilities: self.led_capabilities(),
            },
        );

        let mut control = [0u8; ROCCAT_CONTROL_SIZE];
        control[0] = ROCCAT_REPORT_CONTROL;
        transport.get_feature(&mut control)?;
        let active_profile = u32::from(control[2]);

        for profile in device.profiles() {
            self.select_profile(transport, profile.index())?;
            self.read_settings(transport, &profile)?;
            self.read_buttons(transport, &profile)?;
            self.read_leds(transport, &profile)?;
            profile.clear_all_dirty();
        }

        if let Some(p) = device.profile(active_profile) {
            let _ = p.set_active();
            p.clear_all_dirty();
        }
        self.select_profile(transport, active_profile)?;

        device.set_driver_state(RoccatData { active_profile });
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<RoccatData>();
        Ok(())
    }

    fn commit(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        self.write_one(transport, profile)
    }

    fn set_active_profile(&self, device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        self.select_profile(transport, profile.index())?;
        device.with_driver_state(|s: &mut RoccatData| s.active_profile = profile.index());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_round_trips_through_raw_byte() {
        let raw = dpi_to_raw(1600).unwrap();
        assert_eq!(raw_to_dpi(raw), 1600);
    }

    #[test]
    fn dpi_must_align_to_step() {
        assert!(dpi_to_raw(ROCCAT_DPI_MIN + 1).is_none());
    }

    #[test]
    fn button_action_round_trips_for_mouse_and_key() {
        let mouse = Action::MouseButton(3);
        let (raw, param) = raw_from_button_action(&mouse).unwrap();
        assert_eq!(button_action_from_raw(raw, param), mouse);

        let key = Action::Key(44);
        let (raw, param) = raw_from_button_action(&key).unwrap();
        assert_eq!(button_action_from_raw(raw, param), key);
    }

    #[test]
    fn macro_bank_round_trips_key_and_wait_events() {
        let m = Macro::new(
            "burst",
            None,
            vec![
                MacroEvent::KeyPressed(30),
                MacroEvent::Wait(50),
                MacroEvent::KeyReleased(30),
            ],
        );
        let mut bank = vec![0u8; ROCCAT_MACRO_SIZE - 34];
        encode_macro(&m, &mut bank).unwrap();
        let decoded = decode_macro(&bank, "burst");
        assert_eq!(decoded.events, m.events);
    }

    #[test]
    fn leading_wait_does_not_survive_decode() {
        // A slot array whose first event is a wait: decode_macro passes it
        // through unchanged (it does not special-case position), and
        // Macro::new is what drops it, matching every other driver.
        let mut bank = vec![0u8; 64];
        bank[0] = 2;
        bank[1] = ROCCAT_MACRO_EVENT_WAIT;
        bank[2] = 5;
        bank[3] = ROCCAT_MACRO_EVENT_KEY_DOWN;
        bank[4] = 30;
        let decoded = decode_macro(&bank, "m");
        assert_eq!(decoded.events, vec![MacroEvent::KeyPressed(30)]);
    }

    #[test]
    fn macro_over_device_limit_rejected() {
        let m = Macro {
            name: "big".into(),
            group: None,
            events: vec![MacroEvent::KeyPressed(1); ROCCAT_MAX_MACRO_EVENTS + 1],
        };
        let mut bank = vec![0u8; ROCCAT_MACRO_SIZE - 34];
        let err = encode_macro(&m, &mut bank).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Value);
    }

    #[test]
    fn led_mode_round_trips() {
        for mode in [LedMode::Off, LedMode::On, LedMode::Cycle, LedMode::Breathing] {
            assert_eq!(led_mode_from_raw(raw_from_led_mode(mode)), mode);
        }
    }
}
