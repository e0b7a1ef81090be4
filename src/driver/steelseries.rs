//! SteelSeries gaming mouse driver.
//!
//! SteelSeries has shipped at least four incompatible wire protocols across
//! its mouse lineup. This driver speaks protocol 1 (short, 32-byte reports,
//! one DPI axis, simple LED effect+color split) and protocol 2 (64-byte
//! reports, a `0x42` magic byte, addressable multi-point LED reports). The
//! protocol version a device speaks is fixed in its `.device` file and never
//! probed for, matching how the original SteelSeries vendor driver resolves
//! it.
//!
//! Protocols 3 and 4 exist in the wild (mostly newer wireless Rival/Aerox
//! models) but are not wired up here; `probe` rejects devices configured for
//! them rather than silently mis-driving the hardware.

use crate::datastore::DataStoreEntry;
use crate::error::{RatbagError, Result};
use crate::model::{
    Action, ActionType, Capabilities, Capability, Device, Dpi, DpiSource, LedMode, Profile,
    ProfileLayout, Rgb,
};
use crate::transport::Transport;

const STEELSERIES_NUM_PROFILES: usize = 1;
const STEELSERIES_NUM_DPI: usize = 2;
const STEELSERIES_NUM_BUTTONS: usize = 8;
const STEELSERIES_NUM_LED: usize = 1;

const STEELSERIES_DPI_MIN: u32 = 100;
const STEELSERIES_DPI_MAX: u32 = 12_000;
const STEELSERIES_DPI_STEP: u32 = 100;

const STEELSERIES_REPORT_SIZE_SHORT: usize = 32;
const STEELSERIES_REPORT_SIZE: usize = 64;

/* Opcodes - protocol 1 (short reports) */
const STEELSERIES_ID_DPI_SHORT: u8 = 0x03;
const STEELSERIES_ID_REPORT_RATE_SHORT: u8 = 0x04;
const STEELSERIES_ID_LED_EFFECT_SHORT: u8 = 0x07;
const STEELSERIES_ID_LED_COLOR_SHORT: u8 = 0x08;
const STEELSERIES_ID_SAVE_SHORT: u8 = 0x09;

/* Opcodes - protocol 2 */
const STEELSERIES_ID_DPI: u8 = 0x53;
const STEELSERIES_ID_REPORT_RATE: u8 = 0x54;
const STEELSERIES_ID_LED: u8 = 0x5b;
const STEELSERIES_ID_SAVE: u8 = 0x59;
const STEELSERIES_ID_SETTINGS: u8 = 0x92;
const STEELSERIES_ID_BUTTONS_OPCODE: u8 = 0x31;

const STEELSERIES_BUTTON_OFF: u8 = 0x00;
const STEELSERIES_BUTTON_KEY: u8 = 0x10;
const STEELSERIES_BUTTON_RES_CYCLE: u8 = 0x30;
const STEELSERIES_BUTTON_WHEEL_UP: u8 = 0x31;
const STEELSERIES_BUTTON_WHEEL_DOWN: u8 = 0x32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

impl ProtocolVersion {
    fn from_entry(entry: &DataStoreEntry) -> Result<Self> {
        match entry.driver_config.get("Protocol").map(String::as_str) {
            Some("1") | None => Ok(ProtocolVersion::V1),
            Some("2") => Ok(ProtocolVersion::V2),
            Some(_) => Err(RatbagError::Unsupported(
                "steelseries protocol versions other than 1 and 2 are not implemented",
            )),
        }
    }
}

/// Scale a DPI value to the single-byte value SteelSeries firmware wants:
/// `raw = dpi / 100 - 1`, with the hardware interpreting `raw + 1` as
/// hundreds of DPI.
fn dpi_to_raw(dpi: u32) -> Option<u8> {
    if dpi < STEELSERIES_DPI_MIN || dpi > STEELSERIES_DPI_MAX || dpi % STEELSERIES_DPI_STEP != 0 {
        return None;
    }
    u8::try_from(dpi / STEELSERIES_DPI_STEP - 1).ok()
}

fn raw_to_dpi(raw: u8) -> u32 {
    (u32::from(raw) + 1) * STEELSERIES_DPI_STEP
}

fn hz_to_raw(hz: u32) -> u8 {
    if hz == 0 || hz >= 1000 {
        0
    } else {
        u8::try_from((1000 / hz).saturating_sub(1)).unwrap_or(0)
    }
}

fn raw_to_hz(raw: u8) -> u32 {
    if raw == 0 {
        1000
    } else {
        1000 / (u32::from(raw) + 1)
    }
}

fn button_action_from_raw(raw: u8, key: u8) -> Action {
    match raw {
        STEELSERIES_BUTTON_OFF => Action::None,
        STEELSERIES_BUTTON_KEY => Action::Key(u32::from(key)),
        STEELSERIES_BUTTON_RES_CYCLE => Action::Special(crate::model::SpecialAction::ResolutionCycleUp),
        STEELSERIES_BUTTON_WHEEL_UP => Action::Special(crate::model::SpecialAction::WheelUp),
        STEELSERIES_BUTTON_WHEEL_DOWN => Action::Special(crate::model::SpecialAction::WheelDown),
        n if n >= 1 && n <= 5 => Action::MouseButton(n),
        _ => Action::None,
    }
}

fn raw_from_button_action(action: &Action) -> Result<(u8, u8)> {
    use crate::model::SpecialAction;
    match action {
        Action::None => Ok((STEELSERIES_BUTTON_OFF, 0)),
        Action::MouseButton(n) if (1..=5).contains(n) => Ok((*n, 0)),
        Action::MouseButton(_) => Err(RatbagError::value("steelseries buttons 6..8 must be key or special actions")),
        Action::Key(code) => {
            let key = u8::try_from(*code).map_err(|_| RatbagError::value("keycode does not fit a byte on this device"))?;
            Ok((STEELSERIES_BUTTON_KEY, key))
        }
        Action::Special(SpecialAction::ResolutionCycleUp) => Ok((STEELSERIES_BUTTON_RES_CYCLE, 0)),
        Action::Special(SpecialAction::WheelUp) => Ok((STEELSERIES_BUTTON_WHEEL_UP, 0)),
        Action::Special(SpecialAction::WheelDown) => Ok((STEELSERIES_BUTTON_WHEEL_DOWN, 0)),
        Action::Special(_) => Err(RatbagError::Unsupported("steelseries special action")),
        Action::Macro(_) => Err(RatbagError::Unsupported("steelseries macro buttons")),
    }
}

struct SteelseriesData {
    version: ProtocolVersion,
}

pub struct SteelseriesDriver;

impl SteelseriesDriver {
    pub fn new() -> Self {
        Self
    }

    fn write_dpi(&self, transport: &Transport, version: ProtocolVersion, res_id: u8, raw: u8) -> Result<()> {
        match version {
            ProtocolVersion::V1 => {
                let mut buf = [0u8; STEELSERIES_REPORT_SIZE_SHORT];
                buf[0] = STEELSERIES_ID_DPI_SHORT;
                buf[1] = res_id;
                buf[2] = raw;
                transport.write_report(&buf)
            }
            ProtocolVersion::V2 => {
                let mut buf = [0u8; STEELSERIES_REPORT_SIZE];
                buf[0] = STEELSERIES_ID_DPI;
                buf[2] = res_id;
                buf[3] = raw;
                buf[6] = 0x42;
                transport.write_report(&buf)
            }
        }
    }

    fn write_report_rate(&self, transport: &Transport, version: ProtocolVersion, hz: u32) -> Result<()> {
        let raw = hz_to_raw(hz);
        match version {
            ProtocolVersion::V1 => {
                let mut buf = [0u8; STEELSERIES_REPORT_SIZE_SHORT];
                buf[0] = STEELSERIES_ID_REPORT_RATE_SHORT;
                buf[2] = raw;
                transport.write_report(&buf)
            }
            ProtocolVersion::V2 => {
                let mut buf = [0u8; STEELSERIES_REPORT_SIZE];
                buf[0] = STEELSERIES_ID_REPORT_RATE;
                buf[2] = raw;
                transport.write_report(&buf)
            }
        }
    }

    fn write_led(&self, transport: &Transport, version: ProtocolVersion, led: &crate::model::Led) -> Result<()> {
        let color = led.color();
        match version {
            ProtocolVersion::V1 => {
                let effect = match led.mode() {
                    LedMode::Off | LedMode::On => 0x01u8,
                    LedMode::Breathing => 0x03,
                    LedMode::Cycle => 0x02,
                };
                let mut effect_buf = [0u8; STEELSERIES_REPORT_SIZE_SHORT];
                effect_buf[0] = STEELSERIES_ID_LED_EFFECT_SHORT;
                effect_buf[1] = led.index() as u8 + 1;
                effect_buf[2] = effect;
                transport.write_report(&effect_buf)?;

                let mut color_buf = [0u8; STEELSERIES_REPORT_SIZE_SHORT];
                color_buf[0] = STEELSERIES_ID_LED_COLOR_SHORT;
                color_buf[1] = led.index() as u8 + 1;
                color_buf[2] = color.r;
                color_buf[3] = color.g;
                color_buf[4] = color.b;
                transport.write_report(&color_buf)
            }
            ProtocolVersion::V2 => {
                let mut buf = [0u8; STEELSERIES_REPORT_SIZE];
                buf[0] = STEELSERIES_ID_LED;
                buf[1] = led.index() as u8;
                let off = led.mode() == LedMode::Off;
                buf[2] = if off { 0 } else { color.r };
                buf[3] = if off { 0 } else { color.g };
                buf[4] = if off { 0 } else { color.b };
                buf[5] = 0x00; // position within the gradient (single solid point)
                buf[6] = if matches!(led.mode(), LedMode::Off | LedMode::On) { 1 } else { 0 }; // disable_repeat
                buf[7] = 1; // npoints
                let duration = (led.duration_ms()).max(330) as u16;
                buf[8..10].copy_from_slice(&duration.to_le_bytes());
                transport.write_report(&buf)
            }
        }
    }

    fn write_save(&self, transport: &Transport, version: ProtocolVersion) -> Result<()> {
        let mut buf = [0u8; STEELSERIES_REPORT_SIZE_SHORT];
        buf[0] = match version {
            ProtocolVersion::V1 => STEELSERIES_ID_SAVE_SHORT,
            ProtocolVersion::V2 => STEELSERIES_ID_SAVE,
        };
        transport.write_report(&buf)
    }

    fn read_settings(&self, transport: &Transport, version: ProtocolVersion, profile: &Profile) -> Result<()> {
        if version != ProtocolVersion::V2 {
            // Protocol 1 devices are write-only for settings; there is
            // nothing to poll back, so probe leaves defaults in place.
            return Ok(());
        }

        let mut req = [0u8; STEELSERIES_REPORT_SIZE];
        req[0] = STEELSERIES_ID_SETTINGS;
        transport.write_report(&req)?;
        let mut buf = [0u8; STEELSERIES_REPORT_SIZE];
        let n = transport.read_report(&mut buf)?;
        if n < 2 {
            return Ok(());
        }

        let active_resolution = buf[1].saturating_sub(1);
        for (i, resolution) in profile.resolutions().iter().enumerate() {
            let dpi_idx = 2 + i * 2;
            if dpi_idx < n {
                let _ = resolution.set_dpi(raw_to_dpi(buf[dpi_idx]));
            }
            if i as u8 == active_resolution {
                let _ = resolution.set_active();
            }
        }

        if let Some(led) = profile.leds().into_iter().next() {
            let offset = 6 + led.index() as usize * 3;
            if offset + 2 < n {
                let _ = led.set_color(Rgb { r: buf[offset], g: buf[offset + 1], b: buf[offset + 2] });
            }
        }

        Ok(())
    }
}

impl Default for SteelseriesDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for SteelseriesDriver {
    fn id(&self) -> &'static str {
        "steelseries"
    }

    fn probe(&self, device: &Device, transport: &Transport, entry: &DataStoreEntry) -> Result<()> {
        let version = ProtocolVersion::from_entry(entry)?;

        let mut caps = Capabilities::empty();
        caps.insert(Capability::WriteNeedsActiveProfile);

        device.init_profiles(
            STEELSERIES_NUM_PROFILES,
            &ProfileLayout {
                num_resolutions: STEELSERIES_NUM_DPI,
                num_buttons: STEELSERIES_NUM_BUTTONS,
                num_leds: STEELSERIES_NUM_LED,
                profile_capabilities: caps,
                resolution_source: DpiSource::Range {
                    min: STEELSERIES_DPI_MIN,
                    max: STEELSERIES_DPI_MAX,
                    step: STEELSERIES_DPI_STEP,
                },
                resolution_capabilities: Capabilities::empty(),
                button_permitted: vec![ActionType::None, ActionType::MouseButton, ActionType::Key, ActionType::Special],
                led_capabilities: [Capability::LedOn, Capability::LedBreathing, Capability::LedCycle]
                    .into_iter()
                    .collect(),
            },
        );

        for profile in device.profiles() {
            // SteelSeries devices ship with factory-default DPI/rate values
            // and are not readable before first write on protocol 1; only
            // protocol 2 exposes a settings read-back.
            for (i, resolution) in profile.resolutions().iter().enumerate() {
                let _ = resolution.set_dpi(800 * (i as u32 + 1));
            }
            if let Some(first) = profile.resolutions().first() {
                let _ = first.set_active();
            }
            let _ = profile.set_report_rate_hz(1000);

            if let Some(led) = profile.leds().into_iter().next() {
                let _ = led.set_mode(LedMode::On);
                let _ = led.set_color(Rgb { r: 255, g: 0, b: 0 });
            }

            self.read_settings(transport, version, &profile)?;
            let _ = profile.set_active();
            profile.clear_all_dirty();
        }

        device.set_driver_state(SteelseriesData { version });
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<SteelseriesData>();
        Ok(())
    }

    fn commit(&self, device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let version = device
            .with_driver_state(|s: &mut SteelseriesData| s.version)
            .ok_or_else(|| RatbagError::device("steelseries driver state missing"))?;

        for (i, resolution) in profile.resolutions().iter().enumerate() {
            if !resolution.is_dirty() {
                continue;
            }
            let Dpi::Unified(dpi) = resolution.dpi() else {
                return Err(RatbagError::Unsupported("steelseries has no separate x/y dpi"));
            };
            let raw = dpi_to_raw(dpi).ok_or_else(|| RatbagError::value(format!("{dpi} dpi not representable")))?;
            self.write_dpi(transport, version, i as u8 + 1, raw)?;
        }

        if profile.is_dirty() {
            self.write_report_rate(transport, version, profile.report_rate_hz())?;
        }

        for button in profile.buttons() {
            if !button.is_dirty() {
                continue;
            }
            let (raw, key) = raw_from_button_action(&button.action())?;
            // Protocol 1 and 2 both use opcode 0x31 with a flat per-button
            // table on protocol 2; protocol 1 mice in this family are
            // fixed-function and do not expose per-button remapping, so
            // writes are only meaningful on protocol 2.
            if version == ProtocolVersion::V2 {
                let mut buf = [0u8; STEELSERIES_REPORT_SIZE];
                buf[0] = STEELSERIES_ID_BUTTONS_OPCODE;
                let idx = 2 + button.index() as usize * 2;
                if idx + 1 < buf.len() {
                    buf[idx] = raw;
                    buf[idx + 1] = key;
                }
                transport.write_report(&buf)?;
            } else {
                return Err(RatbagError::Unsupported("steelseries protocol 1 has fixed-function buttons"));
            }
        }

        for led in profile.leds() {
            if !led.is_dirty() {
                continue;
            }
            self.write_led(transport, version, &led)?;
        }

        self.write_save(transport, version)?;
        Ok(())
    }

    fn set_active_profile(&self, _device: &Device, _transport: &Transport, _profile: &Profile) -> Result<()> {
        // STEELSERIES_NUM_PROFILES is 1: nothing to switch.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_round_trips_through_scaling() {
        let raw = dpi_to_raw(1600).unwrap();
        assert_eq!(raw_to_dpi(raw), 1600);
    }

    #[test]
    fn dpi_step_must_be_hundred() {
        assert!(dpi_to_raw(1650).is_none());
    }

    #[test]
    fn report_rate_round_trips_for_common_rates() {
        for hz in [125, 250, 500, 1000] {
            assert_eq!(raw_to_hz(hz_to_raw(hz)), hz);
        }
    }

    #[test]
    fn button_action_round_trips_for_key_and_special() {
        let key = Action::Key(42);
        let (raw, k) = raw_from_button_action(&key).unwrap();
        assert_eq!(button_action_from_raw(raw, k), key);

        let special = Action::Special(crate::model::SpecialAction::WheelUp);
        let (raw, k) = raw_from_button_action(&special).unwrap();
        assert_eq!(button_action_from_raw(raw, k), special);
    }

    #[test]
    fn macro_action_is_unsupported() {
        let err = raw_from_button_action(&Action::Macro(Default::default())).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unsupported);
    }
}
