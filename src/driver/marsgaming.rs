//! MarsGaming MM4 gaming mouse driver.
//!
//! Targets MarsGaming MM4 mice using the proprietary MarsGaming HID
//! protocol: 5 profiles, up to 5 DPI resolutions per profile, 19 buttons,
//! 1 LED zone. Unlike the SET_FEATURE-based vendor protocols elsewhere in
//! this module, MarsGaming speaks a write-then-read request/response
//! pattern over plain output/input reports.

use crate::datastore::DataStoreEntry;
use crate::error::{RatbagError, Result};
use crate::model::{
    Action, ActionType, Capabilities, Capability, Device, Dpi, DpiSource, Profile, ProfileLayout,
    Rgb,
};
use crate::transport::Transport;

const NUM_PROFILES: usize = 5;
const NUM_RESOLUTIONS_PER_PROFILE: usize = 5;
const NUM_BUTTONS: usize = 19;
const NUM_LED: usize = 1;

const RES_MIN: u32 = 50;
const RES_MAX: u32 = 16_400;
const RES_SCALING: u32 = 50;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Write = 0x02,
    Read = 0x03,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HwLedMode {
    #[default]
    Off = 0x00,
    Static = 0x01,
    Breathing = 0x02,
    Rainbow = 0x03,
}

fn hw_led_mode_for(mode: crate::model::LedMode) -> HwLedMode {
    match mode {
        crate::model::LedMode::Off => HwLedMode::Off,
        crate::model::LedMode::On => HwLedMode::Static,
        crate::model::LedMode::Breathing => HwLedMode::Breathing,
        crate::model::LedMode::Cycle => HwLedMode::Rainbow,
    }
}

fn model_led_mode_for(raw: u8) -> crate::model::LedMode {
    match raw {
        x if x == HwLedMode::Static as u8 => crate::model::LedMode::On,
        x if x == HwLedMode::Breathing as u8 => crate::model::LedMode::Breathing,
        x if x == HwLedMode::Rainbow as u8 => crate::model::LedMode::Cycle,
        _ => crate::model::LedMode::Off,
    }
}

pub fn dpi_to_raw(dpi: u32) -> Option<u16> {
    if dpi < RES_MIN || dpi > RES_MAX || dpi % RES_SCALING != 0 {
        return None;
    }
    u16::try_from(dpi / RES_SCALING).ok()
}

pub fn raw_to_dpi(raw: u16) -> u32 {
    u32::from(raw) * RES_SCALING
}

fn resolution_header(report_type: ReportType, profile: u8) -> [u8; 8] {
    [0x01, report_type as u8, 0x4f, profile, 0x2a, 0x00, 0xfa, 0xfa]
}

fn button_header(report_type: ReportType, profile: u8) -> [u8; 8] {
    [0x01, report_type as u8, 0x90, profile, 0x4d, 0x00, 0xfa, 0xfa]
}

fn led_header(report_type: ReportType, profile: u8) -> [u8; 8] {
    [0x01, report_type as u8, 0xf1, profile, 0x06, 0x00, 0xfa, 0xfa]
}

fn button_action_from_raw(function_type: u8, params: [u8; 3]) -> Action {
    match function_type {
        0 => Action::None,
        1 => Action::MouseButton(params[0]),
        2 => Action::Key(u32::from(params[0])),
        _ => Action::None,
    }
}

fn raw_from_button_action(action: &Action) -> Result<(u8, [u8; 3])> {
    match action {
        Action::None => Ok((0, [0; 3])),
        Action::MouseButton(n) => Ok((1, [*n, 0, 0])),
        Action::Key(code) => {
            let key = u8::try_from(*code).map_err(|_| RatbagError::value("keycode does not fit a byte on this device"))?;
            Ok((2, [key, 0, 0]))
        }
        Action::Special(_) => Err(RatbagError::Unsupported("marsgaming special actions")),
        Action::Macro(_) => Err(RatbagError::Unsupported("marsgaming macro buttons")),
    }
}

struct MarsData {
    active_profile: u8,
}

pub struct MarsGamingDriver;

impl MarsGamingDriver {
    pub fn new() -> Self {
        Self
    }

    fn round_trip(&self, transport: &Transport, out: &[u8], in_len: usize) -> Result<Vec<u8>> {
        transport.write_report(out)?;
        let mut buf = vec![0u8; in_len];
        let n = transport.read_report(&mut buf)?;
        if n == 0 {
            return Err(RatbagError::Timeout { attempts: 1 });
        }
        Ok(buf)
    }
}

impl Default for MarsGamingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for MarsGamingDriver {
    fn id(&self) -> &'static str {
        "marsgaming"
    }

    fn probe(&self, device: &Device, transport: &Transport, _entry: &DataStoreEntry) -> Result<()> {
        let mut caps = Capabilities::empty();
        caps.insert(Capability::WriteNeedsActiveProfile);

        device.init_profiles(
            NUM_PROFILES,
            &ProfileLayout {
                num_resolutions: NUM_RESOLUTIONS_PER_PROFILE,
                num_buttons: NUM_BUTTONS,
                num_leds: NUM_LED,
                profile_capabilities: caps,
                resolution_source: DpiSource::Range { min: RES_MIN, max: RES_MAX, step: RES_SCALING },
                resolution_capabilities: Capabilities::empty(),
                button_permitted: vec![ActionType::None, ActionType::MouseButton, ActionType::Key],
                led_capabilities: [Capability::LedOn, Capability::LedBreathing, Capability::LedCycle]
                    .into_iter()
                    .collect(),
            },
        );

        for profile in device.profiles() {
            let raw_index = profile.index() as u8;

            let mut req = [0u8; 64];
            req[..8].copy_from_slice(&resolution_header(ReportType::Read, raw_index));
            let reply = self.round_trip(transport, &req, 64)?;
            let count = reply[8].min(NUM_RESOLUTIONS_PER_PROFILE as u8);
            let current = reply[9];
            for (i, resolution) in profile.resolutions().iter().enumerate() {
                if (i as u8) >= count {
                    continue;
                }
                let offset = 10 + i * 7;
                let x = u16::from_le_bytes([reply[offset + 1], reply[offset + 2]]);
                let _ = resolution.set_dpi(raw_to_dpi(x));
                if i as u8 == current {
                    let _ = resolution.set_active();
                }
            }

            let mut req = [0u8; 16];
            req[..8].copy_from_slice(&led_header(ReportType::Read, raw_index));
            let reply = self.round_trip(transport, &req, 16)?;
            if let Some(led) = profile.leds().into_iter().next() {
                let _ = led.set_mode(model_led_mode_for(reply[8]));
                let _ = led.set_color(Rgb { r: reply[9], g: reply[10], b: reply[11] });
                let _ = led.set_brightness(reply[13]);
            }

            profile.clear_all_dirty();
        }

        device.set_driver_state(MarsData { active_profile: 0 });
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<MarsData>();
        Ok(())
    }

    fn commit(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let raw_index = profile.index() as u8;

        if profile.resolutions().iter().any(crate::model::Resolution::is_dirty) {
            let mut req = [0u8; 64];
            req[..8].copy_from_slice(&resolution_header(ReportType::Write, raw_index));
            req[8] = NUM_RESOLUTIONS_PER_PROFILE as u8;
            for (i, resolution) in profile.resolutions().iter().enumerate() {
                let Dpi::Unified(dpi) = resolution.dpi() else {
                    return Err(RatbagError::Unsupported("marsgaming has no separate x/y dpi"));
                };
                let raw = dpi_to_raw(dpi).ok_or_else(|| RatbagError::value(format!("{dpi} dpi not representable")))?;
                let offset = 10 + i * 7;
                req[offset] = 1;
                req[offset + 1..offset + 3].copy_from_slice(&raw.to_le_bytes());
                if resolution.is_active() {
                    req[9] = i as u8;
                }
            }
            transport.write_report(&req)?;
        }

        for button in profile.buttons() {
            if !button.is_dirty() {
                continue;
            }
            let (function_type, params) = raw_from_button_action(&button.action())?;
            let mut req = [0u8; 16];
            req[..8].copy_from_slice(&button_header(ReportType::Write, raw_index));
            req[8] = button.index() as u8;
            req[9] = function_type;
            req[10..13].copy_from_slice(&params);
            transport.write_report(&req)?;
        }

        for led in profile.leds() {
            if !led.is_dirty() {
                continue;
            }
            let color = led.color();
            let mut req = [0u8; 16];
            req[..8].copy_from_slice(&led_header(ReportType::Write, raw_index));
            req[8] = hw_led_mode_for(led.mode()) as u8;
            req[9] = color.r;
            req[10] = color.g;
            req[11] = color.b;
            req[12] = 0x00; // speed
            req[13] = led.brightness();
            transport.write_report(&req)?;
        }

        Ok(())
    }

    fn set_active_profile(&self, device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let raw_index = profile.index() as u8;
        let mut req = [0u8; 8];
        req.copy_from_slice(&resolution_header(ReportType::Write, raw_index));
        req[5] = 0x01; // activate
        transport.write_report(&req)?;
        device.with_driver_state(|s: &mut MarsData| s.active_profile = raw_index);
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
    fn dpi_must_be_multiple_of_scaling_step() {
        assert!(dpi_to_raw(1625).is_none());
    }

    #[test]
    fn button_action_round_trips_for_mouse_and_key() {
        let mouse = Action::MouseButton(3);
        let (ft, params) = raw_from_button_action(&mouse).unwrap();
        assert_eq!(button_action_from_raw(ft, params), mouse);

        let key = Action::Key(42);
        let (ft, params) = raw_from_button_action(&key).unwrap();
        assert_eq!(button_action_from_raw(ft, params), key);
    }
}
