//! OpenInput protocol driver.
//!
//! Targets mice implementing the OpenInput HID protocol, an open-source
//! hardware configuration protocol for gaming peripherals: a small set of
//! function pages (info, settings, DPI, buttons, LEDs) addressed by a
//! short (8-byte) or long (32-byte) report, each carrying a function
//! number and a payload.

use crate::datastore::DataStoreEntry;
use crate::error::{RatbagError, Result};
use crate::model::{
    Action, ActionType, Capabilities, Capability, Device, Dpi, DpiSource, Profile, ProfileLayout,
    Rgb,
};
use crate::transport::Transport;

const OI_REPORT_SHORT: u8 = 0x20;

const OI_REPORT_SHORT_SIZE: usize = 8;
const OI_REPORT_LONG_SIZE: usize = 32;
/// Byte offset where payload data begins.
const OI_REPORT_DATA_INDEX: usize = 3;
const OI_REPORT_DATA_MAX_SIZE: usize = OI_REPORT_LONG_SIZE - OI_REPORT_DATA_INDEX;

const OI_PAGE_INFO: u8 = 0x00;
const OI_PAGE_SETTINGS: u8 = 0x01;
const OI_PAGE_DPI: u8 = 0x02;
const OI_PAGE_BUTTONS: u8 = 0x03;
const OI_PAGE_LEDS: u8 = 0x04;
const OI_PAGE_ERROR: u8 = 0xFF;

const OI_FUNCTION_VERSION: u8 = 0x00;
const OI_FUNCTION_GET: u8 = 0x00;
const OI_FUNCTION_SET: u8 = 0x01;

/// Valid polling rates (Hz).
const REPORT_RATES: &[u32] = &[125, 250, 500, 750, 1000];

const OI_NUM_PROFILES: usize = 1;
const OI_NUM_RESOLUTIONS: usize = 4;
const OI_NUM_BUTTONS: usize = 8;
const OI_NUM_LEDS: usize = 1;

const OI_DPI_MIN: u32 = 100;
const OI_DPI_MAX: u32 = 12_000;
const OI_DPI_STEP: u32 = 50;

/// A packed OpenInput HID report.
#[derive(Debug, Default, Clone)]
pub struct OiReport {
    pub id: u8,
    pub function_page: u8,
    pub function: u8,
    pub data: [u8; OI_REPORT_DATA_MAX_SIZE],
}

impl OiReport {
    pub fn to_short_buf(&self) -> [u8; OI_REPORT_SHORT_SIZE] {
        let mut buf = [0u8; OI_REPORT_SHORT_SIZE];
        buf[0] = self.id;
        buf[1] = self.function_page;
        buf[2] = self.function;
        let len = (OI_REPORT_SHORT_SIZE - OI_REPORT_DATA_INDEX).min(self.data.len());
        buf[OI_REPORT_DATA_INDEX..OI_REPORT_DATA_INDEX + len].copy_from_slice(&self.data[..len]);
        buf
    }

    pub fn to_long_buf(&self) -> [u8; OI_REPORT_LONG_SIZE] {
        let mut buf = [0u8; OI_REPORT_LONG_SIZE];
        buf[0] = self.id;
        buf[1] = self.function_page;
        buf[2] = self.function;
        let len = OI_REPORT_DATA_MAX_SIZE.min(self.data.len());
        buf[OI_REPORT_DATA_INDEX..OI_REPORT_DATA_INDEX + len].copy_from_slice(&self.data[..len]);
        buf
    }
}

/// Bitmask of supported feature pages discovered via `SUPPORTED_PAGES`.
pub type SupportedPages = u64;

pub fn build_request(page: u8, function: u8) -> OiReport {
    OiReport { id: OI_REPORT_SHORT, function_page: page, function, data: [0u8; OI_REPORT_DATA_MAX_SIZE] }
}

pub fn page_name(page: u8) -> &'static str {
    match page {
        0x00 => "INFO",
        0x01 => "SETTINGS",
        0x02 => "DPI",
        0x03 => "BUTTONS",
        0x04 => "LEDS",
        0xFD => "GIMMICKS",
        0xFE => "DEBUG",
        0xFF => "ERROR",
        _ => "UNKNOWN",
    }
}

fn exchange(transport: &Transport, req: &OiReport) -> Result<[u8; OI_REPORT_SHORT_SIZE]> {
    let buf = req.to_short_buf();
    transport.write_report(&buf)?;
    let mut reply = [0u8; OI_REPORT_SHORT_SIZE];
    reply[0] = OI_REPORT_SHORT;
    let n = transport.read_report(&mut reply)?;
    if n == 0 {
        return Err(RatbagError::Timeout { attempts: 1 });
    }
    if reply[1] == OI_PAGE_ERROR {
        return Err(RatbagError::protocol(reply[OI_REPORT_DATA_INDEX]));
    }
    Ok(reply)
}

struct OiData {
    fw_version: (u8, u8, u8),
}

pub struct OpenInputDriver;

impl OpenInputDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OpenInputDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for OpenInputDriver {
    fn id(&self) -> &'static str {
        "openinput"
    }

    fn probe(&self, device: &Device, transport: &Transport, _entry: &DataStoreEntry) -> Result<()> {
        let reply = exchange(transport, &build_request(OI_PAGE_INFO, OI_FUNCTION_VERSION))?;
        let fw_version = (reply[OI_REPORT_DATA_INDEX], reply[OI_REPORT_DATA_INDEX + 1], reply[OI_REPORT_DATA_INDEX + 2]);
        device.set_firmware_version(format!("{}.{}.{}", fw_version.0, fw_version.1, fw_version.2));

        device.init_profiles(
            OI_NUM_PROFILES,
            &ProfileLayout {
                num_resolutions: OI_NUM_RESOLUTIONS,
                num_buttons: OI_NUM_BUTTONS,
                num_leds: OI_NUM_LEDS,
                profile_capabilities: Capabilities::empty(),
                resolution_source: DpiSource::Range { min: OI_DPI_MIN, max: OI_DPI_MAX, step: OI_DPI_STEP },
                resolution_capabilities: Capabilities::empty(),
                button_permitted: vec![ActionType::None, ActionType::MouseButton, ActionType::Key],
                led_capabilities: [Capability::LedOn, Capability::LedBreathing, Capability::LedCycle]
                    .into_iter()
                    .collect(),
            },
        );

        let profile = device.profile(0).expect("init_profiles allocated profile 0");

        let reply = exchange(transport, &build_request(OI_PAGE_DPI, OI_FUNCTION_GET))?;
        let count = reply[OI_REPORT_DATA_INDEX].min(OI_NUM_RESOLUTIONS as u8);
        let current = reply[OI_REPORT_DATA_INDEX + 1];
        for (i, resolution) in profile.resolutions().iter().enumerate() {
            if (i as u8) >= count {
                continue;
            }
            let raw = u16::from_le_bytes([reply[OI_REPORT_DATA_INDEX + 2 + i * 2], reply[OI_REPORT_DATA_INDEX + 3 + i * 2]]);
            let _ = resolution.set_dpi(u32::from(raw));
            if i as u8 == current {
                let _ = resolution.set_active();
            }
        }

        for button in profile.buttons() {
            let mut req = build_request(OI_PAGE_BUTTONS, OI_FUNCTION_GET);
            req.data[0] = button.index() as u8;
            let reply = exchange(transport, &req)?;
            let action = action_from_raw(reply[OI_REPORT_DATA_INDEX + 1], reply[OI_REPORT_DATA_INDEX + 2]);
            let _ = button.set_action(action, None);
        }

        for led in profile.leds() {
            let reply = exchange(transport, &build_request(OI_PAGE_LEDS, OI_FUNCTION_GET))?;
            let _ = led.set_mode(model_led_mode_for(reply[OI_REPORT_DATA_INDEX]));
            let _ = led.set_color(Rgb { r: reply[OI_REPORT_DATA_INDEX + 1], g: reply[OI_REPORT_DATA_INDEX + 2], b: reply[OI_REPORT_DATA_INDEX + 3] });
            let _ = led.set_brightness(reply[OI_REPORT_DATA_INDEX + 4]);
        }

        let reply = exchange(transport, &build_request(OI_PAGE_SETTINGS, OI_FUNCTION_GET))?;
        if let Some(&rate) = REPORT_RATES.get(reply[OI_REPORT_DATA_INDEX] as usize) {
            let _ = profile.set_report_rate_hz(rate);
        }
        profile.clear_all_dirty();

        device.set_driver_state(OiData { fw_version });
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<OiData>();
        Ok(())
    }

    fn commit(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        if let Some(rate_index) = REPORT_RATES.iter().position(|&r| r == profile.report_rate_hz()) {
            let mut req = build_request(OI_PAGE_SETTINGS, OI_FUNCTION_SET);
            req.data[0] = rate_index as u8;
            exchange(transport, &req)?;
        }

        for (i, resolution) in profile.resolutions().iter().enumerate() {
            if !resolution.is_dirty() {
                continue;
            }
            let Dpi::Unified(dpi) = resolution.dpi() else {
                return Err(RatbagError::Unsupported("openinput has no separate x/y dpi"));
            };
            let mut req = build_request(OI_PAGE_DPI, OI_FUNCTION_SET);
            req.data[0] = i as u8;
            req.data[1..3].copy_from_slice(&(dpi as u16).to_le_bytes());
            exchange(transport, &req)?;
        }

        for button in profile.buttons() {
            if !button.is_dirty() {
                continue;
            }
            let (function, param) = raw_from_action(&button.action())?;
            let mut req = build_request(OI_PAGE_BUTTONS, OI_FUNCTION_SET);
            req.data[0] = button.index() as u8;
            req.data[1] = function;
            req.data[2] = param;
            exchange(transport, &req)?;
        }

        for led in profile.leds() {
            if !led.is_dirty() {
                continue;
            }
            let color = led.color();
            let mut req = build_request(OI_PAGE_LEDS, OI_FUNCTION_SET);
            req.data[0] = hw_led_mode_for(led.mode());
            req.data[1] = color.r;
            req.data[2] = color.g;
            req.data[3] = color.b;
            req.data[4] = led.brightness();
            exchange(transport, &req)?;
        }

        Ok(())
    }

    fn set_active_profile(&self, _device: &Device, _transport: &Transport, _profile: &Profile) -> Result<()> {
        // Single-profile device: nothing to switch on hardware.
        Ok(())
    }
}

fn hw_led_mode_for(mode: crate::model::LedMode) -> u8 {
    match mode {
        crate::model::LedMode::Off => 0x00,
        crate::model::LedMode::On => 0x01,
        crate::model::LedMode::Breathing => 0x02,
        crate::model::LedMode::Cycle => 0x03,
    }
}

fn model_led_mode_for(raw: u8) -> crate::model::LedMode {
    match raw {
        0x01 => crate::model::LedMode::On,
        0x02 => crate::model::LedMode::Breathing,
        0x03 => crate::model::LedMode::Cycle,
        _ => crate::model::LedMode::Off,
    }
}

fn action_from_raw(function: u8, param: u8) -> Action {
    match function {
        0x01 => Action::MouseButton(param),
        0x02 => Action::Key(u32::from(param)),
        _ => Action::None,
    }
}

fn raw_from_action(action: &Action) -> Result<(u8, u8)> {
    match action {
        Action::None => Ok((0x00, 0)),
        Action::MouseButton(n) => Ok((0x01, *n)),
        Action::Key(code) => {
            let param = u8::try_from(*code).map_err(|_| RatbagError::value("keycode does not fit a byte on this device"))?;
            Ok((0x02, param))
        }
        Action::Special(_) => Err(RatbagError::Unsupported("openinput special actions")),
        Action::Macro(_) => Err(RatbagError::Unsupported("openinput macro buttons")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_report_carries_header_and_payload() {
        let mut req = build_request(OI_PAGE_DPI, OI_FUNCTION_SET);
        req.data[0] = 2;
        let buf = req.to_short_buf();
        assert_eq!(buf[0], OI_REPORT_SHORT);
        assert_eq!(buf[1], OI_PAGE_DPI);
        assert_eq!(buf[2], OI_FUNCTION_SET);
        assert_eq!(buf[OI_REPORT_DATA_INDEX], 2);
    }

    #[test]
    fn page_name_covers_known_pages() {
        assert_eq!(page_name(OI_PAGE_DPI), "DPI");
        assert_eq!(page_name(0x42), "UNKNOWN");
    }

    #[test]
    fn button_action_round_trips() {
        let action = Action::MouseButton(4);
        let (f, p) = raw_from_action(&action).unwrap();
        assert_eq!(action_from_raw(f, p), action);
    }
}
