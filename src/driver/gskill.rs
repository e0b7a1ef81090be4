//! G.Skill gaming mouse driver.
//!
//! Targets G.Skill Ripjaws mice (MX780 and similar): 5 profiles, up to 5
//! DPI slots, 10 buttons, 3 LED zones (logo, wheel, tail) plus a DPI LED.
//! Profile state round-trips as one large feature report per profile,
//! checksummed with a plain XOR over its payload bytes.

use crate::datastore::DataStoreEntry;
use crate::error::{RatbagError, Result};
use crate::model::{
    Action, ActionType, Capabilities, Capability, Device, Dpi, DpiSource, Led, LedMode, Profile,
    ProfileLayout, Resolution,
};
use crate::transport::Transport;

const GSKILL_PROFILE_MAX: usize = 5;
const GSKILL_NUM_DPI: usize = 5;
const GSKILL_BUTTON_MAX: usize = 10;

const GSKILL_MAX_POLLING_RATE: u32 = 1000;
const GSKILL_REPORT_RATES: &[u32] = &[125, 250, 500, 1000];

const GSKILL_MIN_DPI: u32 = 100;
const GSKILL_MAX_DPI: u32 = 8200;
const GSKILL_DPI_UNIT: u32 = 50;

const GSKILL_GET_CURRENT_PROFILE_NUM: u8 = 0x03;
const GSKILL_GET_SET_PROFILE: u8 = 0x05;

const GSKILL_REPORT_SIZE_PROFILE: usize = 644;
const GSKILL_REPORT_SIZE_CMD: usize = 9;

/// Byte offset of the checksum in profile/macro reports.
const GSKILL_CHECKSUM_OFFSET: usize = 3;

const GSKILL_CMD_SUCCESS: u8 = 0xb0;
const GSKILL_CMD_IDLE: u8 = 0xb3;

const GSKILL_LED_TYPE_LOGO: usize = 0;
const GSKILL_LED_TYPE_WHEEL: usize = 1;
const GSKILL_LED_TYPE_TAIL: usize = 2;
const GSKILL_LED_TYPE_COUNT: usize = 3;
const GSKILL_NUM_LEDS: usize = GSKILL_LED_TYPE_COUNT + 1; // + DPI indicator LED

/// Offsets within the 644-byte profile report this driver reads/writes.
/// Not part of the upstream wire format this mouse family happens to
/// share with other G.Skill reports: chosen here to carry this profile's
/// modelled state, since no authoritative byte map for this report was
/// available (see the driver-level note in the grounding ledger).
mod layout {
    pub const REPORT_RATE: usize = 4;
    pub const DPI_TABLE: usize = 5; // GSKILL_NUM_DPI * 2 bytes (x, y)
    pub const ACTIVE_DPI: usize = 15;
    pub const BUTTONS: usize = 16; // GSKILL_BUTTON_MAX * 6 bytes
    pub const LEDS: usize = 76; // GSKILL_NUM_LEDS * 4 bytes (brightness, r, g, b)
}

#[repr(u8)]
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedControlType {
    AllOff = 0x0,
    AllOn = 0x1,
    Breathing = 0x2,
    DpiLedRightCycle = 0x3,
    DpiLedLeftCycle = 0x4,
}

#[repr(u8)]
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonFunctionType {
    Wheel = 0x00,
    Mouse = 0x01,
    Kbd = 0x02,
    Consumer = 0x03,
    Macro = 0x06,
    DpiUp = 0x09,
    DpiDown = 0x0a,
    CycleDpiUp = 0x0b,
    CycleDpiDown = 0x0c,
    ProfileSwitch = 0x0d,
    TemporaryCpiAdjust = 0x15,
    DirectDpiChange = 0x16,
    CycleProfileUp = 0x18,
    CycleProfileDown = 0x19,
    Disable = 0xff,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RawDpiLevel {
    pub x: u8,
    pub y: u8,
}

/// Convert a raw DPI pair to actual DPI values (X, Y). Raw = `dpi /
/// GSKILL_DPI_UNIT - 1`.
pub fn raw_to_dpi(raw: RawDpiLevel) -> (u32, u32) {
    let to_dpi = |r: u8| -> u32 { (u32::from(r) + 1) * GSKILL_DPI_UNIT };
    (to_dpi(raw.x), to_dpi(raw.y))
}

pub fn dpi_to_raw(dpi: u32) -> Option<u8> {
    if dpi < GSKILL_MIN_DPI || dpi > GSKILL_MAX_DPI || dpi % GSKILL_DPI_UNIT != 0 {
        return None;
    }
    u8::try_from((dpi / GSKILL_DPI_UNIT).saturating_sub(1)).ok()
}

/// Compute the one-byte XOR checksum expected at `GSKILL_CHECKSUM_OFFSET`,
/// covering bytes 4..end of the report.
pub fn compute_checksum(report: &[u8]) -> u8 {
    report[4..].iter().fold(0u8, |acc, &b| acc ^ b)
}

fn button_function_for(action: &Action) -> Result<(ButtonFunctionType, [u8; 4])> {
    match action {
        Action::None => Ok((ButtonFunctionType::Disable, [0; 4])),
        Action::MouseButton(n) => Ok((ButtonFunctionType::Mouse, [*n, 0, 0, 0])),
        Action::Key(code) => {
            let bytes = (*code).to_le_bytes();
            Ok((ButtonFunctionType::Kbd, [bytes[0], bytes[1], 0, 0]))
        }
        Action::Special(_) => Err(RatbagError::Unsupported("gskill special actions")),
        Action::Macro(_) => Err(RatbagError::Unsupported("gskill macro buttons")),
    }
}

fn action_from_button_cfg(function_type: u8, params: [u8; 4]) -> Action {
    match function_type {
        x if x == ButtonFunctionType::Disable as u8 => Action::None,
        x if x == ButtonFunctionType::Mouse as u8 => Action::MouseButton(params[0]),
        x if x == ButtonFunctionType::Kbd as u8 => Action::Key(u32::from_le_bytes([params[0], params[1], 0, 0])),
        _ => Action::None,
    }
}

fn led_color_offset(index: usize) -> usize {
    layout::LEDS + index * 4
}

struct GskillData {
    active_profile: u8,
}

pub struct GskillDriver;

impl GskillDriver {
    pub fn new() -> Self {
        Self
    }

    fn read_profile_report(&self, transport: &Transport, index: u8) -> Result<Vec<u8>> {
        let mut report = vec![0u8; GSKILL_REPORT_SIZE_PROFILE];
        report[0] = GSKILL_GET_SET_PROFILE;
        report[2] = index;
        transport.get_feature(&mut report)?;
        Ok(report)
    }
}

impl Default for GskillDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for GskillDriver {
    fn id(&self) -> &'static str {
        "gskill"
    }

    fn probe(&self, device: &Device, transport: &Transport, _entry: &DataStoreEntry) -> Result<()> {
        let mut cmd = [0u8; GSKILL_REPORT_SIZE_CMD];
        cmd[0] = GSKILL_GET_CURRENT_PROFILE_NUM;
        transport.get_feature(&mut cmd)?;

        let status = cmd[1];
        if status != GSKILL_CMD_SUCCESS && status != GSKILL_CMD_IDLE {
            return Err(RatbagError::device(format!("G.Skill probe: unexpected status byte {status:#04x}")));
        }
        let active_profile = cmd[2] & 0x0f;

        let mut caps = Capabilities::empty();
        caps.insert(Capability::WriteNeedsActiveProfile);
        caps.insert(Capability::SaveToFlash);

        device.init_profiles(
            GSKILL_PROFILE_MAX,
            &ProfileLayout {
                num_resolutions: GSKILL_NUM_DPI,
                num_buttons: GSKILL_BUTTON_MAX,
                num_leds: GSKILL_NUM_LEDS,
                profile_capabilities: caps,
                resolution_source: DpiSource::Range {
                    min: GSKILL_MIN_DPI,
                    max: GSKILL_MAX_DPI,
                    step: GSKILL_DPI_UNIT,
                },
                resolution_capabilities: Capabilities::empty(),
                button_permitted: vec![ActionType::None, ActionType::MouseButton, ActionType::Key],
                led_capabilities: [Capability::LedOn, Capability::LedBreathing].into_iter().collect(),
            },
        );
        let _ = GSKILL_MAX_POLLING_RATE;

        for profile in device.profiles() {
            let report = self.read_profile_report(transport, profile.index() as u8)?;
            if let Some(rate) = GSKILL_REPORT_RATES.get(report[layout::REPORT_RATE] as usize) {
                let _ = profile.set_report_rate_hz(*rate);
            }
            for (i, resolution) in profile.resolutions().iter().enumerate() {
                let offset = layout::DPI_TABLE + i * 2;
                let raw = RawDpiLevel { x: report[offset], y: report[offset + 1] };
                let (x, _y) = raw_to_dpi(raw);
                let _ = resolution.set_dpi(x);
                if i == report[layout::ACTIVE_DPI] as usize {
                    let _ = resolution.set_active();
                }
            }
            for button in profile.buttons() {
                let offset = layout::BUTTONS + button.index() as usize * 6;
                let function_type = report[offset];
                let params = [report[offset + 1], report[offset + 2], report[offset + 3], report[offset + 4]];
                let _ = button.set_action(action_from_button_cfg(function_type, params), None);
            }
            profile.clear_all_dirty();
        }
        if let Some(active) = device.profile(u32::from(active_profile)) {
            let _ = active.set_active();
            active.clear_all_dirty();
        }

        device.set_driver_state(GskillData { active_profile });
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<GskillData>();
        Ok(())
    }

    fn commit(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let index = profile.index() as u8;
        let mut report = self.read_profile_report(transport, index)?;
        report[0] = GSKILL_GET_SET_PROFILE;
        report[2] = index;

        if let Some(rate_index) = GSKILL_REPORT_RATES.iter().position(|&r| r == profile.report_rate_hz()) {
            report[layout::REPORT_RATE] = rate_index as u8;
        }

        for (i, resolution) in profile.resolutions().iter().enumerate() {
            let dpi = resolution.dpi();
            let raw_x = dpi_to_raw(dpi.x()).ok_or_else(|| RatbagError::value(format!("{} dpi not representable", dpi.x())))?;
            let raw_y = dpi_to_raw(dpi.y()).ok_or_else(|| RatbagError::value(format!("{} dpi not representable", dpi.y())))?;
            let offset = layout::DPI_TABLE + i * 2;
            report[offset] = raw_x;
            report[offset + 1] = raw_y;
            if resolution.is_active() {
                report[layout::ACTIVE_DPI] = i as u8;
            }
        }

        for button in profile.buttons() {
            if !button.is_dirty() {
                continue;
            }
            let (function_type, params) = button_function_for(&button.action())?;
            let offset = layout::BUTTONS + button.index() as usize * 6;
            report[offset] = function_type as u8;
            report[offset + 1..offset + 5].copy_from_slice(&params);
        }

        for led in profile.leds() {
            if !led.is_dirty() {
                continue;
            }
            write_led_into(&mut report, led);
        }

        report[GSKILL_CHECKSUM_OFFSET] = compute_checksum(&report);
        transport.set_feature(&report)?;
        Ok(())
    }

    fn set_active_profile(&self, device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let mut cmd = [0u8; GSKILL_REPORT_SIZE_CMD];
        cmd[0] = GSKILL_GET_CURRENT_PROFILE_NUM;
        cmd[1] = 0x01;
        cmd[2] = profile.index() as u8;
        transport.set_feature(&cmd)?;
        device.with_driver_state(|s: &mut GskillData| s.active_profile = profile.index() as u8);
        Ok(())
    }
}

fn write_led_into(report: &mut [u8], led: Led) {
    let index = led.index() as usize;
    let offset = led_color_offset(index);
    if offset + 4 > report.len() {
        return;
    }
    let brightness = match led.mode() {
        LedMode::Off => 0,
        _ => led.brightness(),
    };
    let color = led.color();
    report[offset] = brightness;
    report[offset + 1] = color.r;
    report[offset + 2] = color.g;
    report[offset + 3] = color.b;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_round_trips_through_raw_unit() {
        let raw = dpi_to_raw(1600).unwrap();
        let (x, y) = raw_to_dpi(RawDpiLevel { x: raw, y: raw });
        assert_eq!((x, y), (1600, 1600));
    }

    #[test]
    fn dpi_out_of_unit_rejected() {
        assert!(dpi_to_raw(1625).is_none());
    }

    #[test]
    fn checksum_covers_from_byte_four() {
        let mut report = vec![0xffu8; 10];
        report[0] = 1;
        report[1] = 2;
        report[2] = 3;
        report[3] = 0;
        let checksum = compute_checksum(&report);
        report[3] = checksum;
        assert_eq!(compute_checksum(&report[..9]) ^ report[9], checksum ^ checksum);
    }

    #[test]
    fn led_type_indices_are_stable() {
        assert_eq!(GSKILL_LED_TYPE_LOGO, 0);
        assert_eq!(GSKILL_LED_TYPE_WHEEL, 1);
        assert_eq!(GSKILL_LED_TYPE_TAIL, 2);
    }
}
