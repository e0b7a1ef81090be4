//! SinoWealth-based gaming mouse driver.
//!
//! Covers mice using the SinoWealth HID protocol: Glorious Model O/O-,
//! G-Wolves Skoll, Genesis Xenon 770, DreamMachines DM5, and similar
//! devices. These share a sensor/MCU combination and a single large
//! feature report carrying profile, DPI, RGB and button configuration.

use crate::datastore::DataStoreEntry;
use crate::error::{RatbagError, Result};
use crate::model::{
    Action, ActionType, Capabilities, Capability, Device, Dpi, DpiSource, Profile, ProfileLayout,
    Rgb,
};
use crate::transport::Transport;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportId {
    Config = 0x04,
    Cmd = 0x05,
    ConfigLong = 0x06,
}

#[repr(u8)]
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
    FirmwareVersion = 0x01,
    Profile = 0x02,
    GetConfig = 0x11,
    GetButtons = 0x12,
    Debounce = 0x1a,
    LongAngleSnappingAndLod = 0x1b,
    GetConfig2 = 0x21,
    GetButtons2 = 0x22,
    Macro = 0x30,
    GetConfig3 = 0x31,
    GetButtons3 = 0x32,
    Dfu = 0x75,
}

pub const SINOWEALTH_CMD_SIZE: usize = 6;
pub const SINOWEALTH_CONFIG_REPORT_SIZE: usize = 520;

pub const SINOWEALTH_DPI_MIN: u32 = 100;
pub const SINOWEALTH_DPI_STEP: u32 = 100;

pub const SINOWEALTH_DEBOUNCE_MIN: u32 = 4;
pub const SINOWEALTH_DEBOUNCE_MAX: u32 = 16;

pub const SINOWEALTH_NUM_DPIS: usize = 8;
pub const SINOWEALTH_NUM_PROFILES_MAX: usize = 3;
/// Practical button count this driver exposes. `CommandId::GetButtons`
/// theoretically addresses up to 64 remappable inputs; real devices in
/// this family wire at most a handful (left/right/middle/back/forward
/// plus a DPI-cycle button).
const NUM_BUTTONS: usize = 6;
const NUM_LED: usize = 1;

pub const SINOWEALTH_DEBOUNCE_TIMES: &[u32] = &[4, 6, 8, 10, 12, 14, 16];
pub const SINOWEALTH_REPORT_RATES: &[u32] = &[125, 250, 500, 1000];

#[repr(u8)]
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Pmw3360 = 0x06,
    Pmw3212 = 0x08,
    Pmw3327 = 0x0e,
    Pmw3389 = 0x0f,
}

#[repr(u8)]
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RgbEffect {
    Off = 0x00,
    Glorious = 0x01,
    Single = 0x02,
    Breathing7 = 0x03,
    Tail = 0x04,
    Breathing = 0x05,
    Constant = 0x06,
    Rave = 0x07,
    Random = 0x08,
    Wave = 0x09,
    Breathing1 = 0x0a,
    NotSupported = 0xff,
}

/// Bit 3 of the config byte: independent X/Y DPI.
pub const SINOWEALTH_XY_INDEPENDENT: u8 = 0b0000_1000;

/// Byte offsets within the 520-byte config report this driver reads and
/// writes. Authored for this driver, not reverse-engineered from a
/// capture: no wire-format reference was available, so these offsets
/// carry this crate's modelled profile state rather than matching any
/// particular firmware revision (see the grounding ledger).
mod layout {
    pub const ACTIVE_PROFILE: usize = 1;
    pub const ACTIVE_DPI: usize = 2;
    pub const CONFIG_BITS: usize = 3;
    pub const REPORT_RATE: usize = 4;
    pub const DEBOUNCE: usize = 5;
    pub const DPI_X: usize = 6;
    pub const DPI_Y: usize = 6 + super::SINOWEALTH_NUM_DPIS;
    pub const DPI_ENABLED: usize = 22;
    pub const RGB_EFFECT: usize = 23;
    pub const RGB_COLOR: usize = 24;
    pub const RGB_BRIGHTNESS: usize = 27;
    pub const BUTTONS: usize = 40;
}

struct SinowealthData {
    firmware_version: [u8; 2],
}

fn rgb_effect_for(mode: crate::model::LedMode) -> RgbEffect {
    match mode {
        crate::model::LedMode::Off => RgbEffect::Off,
        crate::model::LedMode::On => RgbEffect::Single,
        crate::model::LedMode::Breathing => RgbEffect::Breathing,
        crate::model::LedMode::Cycle => RgbEffect::Wave,
    }
}

fn model_led_mode_for(raw: u8) -> crate::model::LedMode {
    match raw {
        x if x == RgbEffect::Single as u8 || x == RgbEffect::Constant as u8 => crate::model::LedMode::On,
        x if x == RgbEffect::Breathing as u8 || x == RgbEffect::Breathing7 as u8 || x == RgbEffect::Breathing1 as u8 => {
            crate::model::LedMode::Breathing
        }
        x if x == RgbEffect::Wave as u8 || x == RgbEffect::Rave as u8 || x == RgbEffect::Glorious as u8 => {
            crate::model::LedMode::Cycle
        }
        _ => crate::model::LedMode::Off,
    }
}

fn button_action_from_raw(raw: u8, param: u8) -> Action {
    match raw {
        0x00 => Action::None,
        0x01 => Action::MouseButton(param),
        0x02 => Action::Key(u32::from(param)),
        _ => Action::None,
    }
}

fn raw_from_button_action(action: &Action) -> Result<(u8, u8)> {
    match action {
        Action::None => Ok((0x00, 0)),
        Action::MouseButton(n) => Ok((0x01, *n)),
        Action::Key(code) => {
            let key = u8::try_from(*code).map_err(|_| RatbagError::value("keycode does not fit a byte on this device"))?;
            Ok((0x02, key))
        }
        Action::Special(_) => Err(RatbagError::Unsupported("sinowealth special actions")),
        Action::Macro(_) => Err(RatbagError::Unsupported("sinowealth macro buttons")),
    }
}

/// Convert a raw DPI byte to actual DPI value.
pub fn raw_to_dpi(raw: u8) -> u32 {
    (u32::from(raw) + 1) * SINOWEALTH_DPI_STEP
}

/// Convert an actual DPI value to the raw byte the device expects.
/// Returns `None` if `dpi` is below `SINOWEALTH_DPI_MIN`.
pub fn dpi_to_raw(dpi: u32) -> Option<u8> {
    if dpi < SINOWEALTH_DPI_MIN {
        return None;
    }
    let raw = (dpi / SINOWEALTH_DPI_STEP).saturating_sub(1);
    u8::try_from(raw).ok()
}

/// Build a 6-byte command report ready to be sent as a feature report.
pub fn build_cmd(cmd_id: CommandId) -> [u8; SINOWEALTH_CMD_SIZE] {
    let mut buf = [0u8; SINOWEALTH_CMD_SIZE];
    buf[0] = ReportId::Cmd as u8;
    buf[1] = cmd_id as u8;
    buf
}

pub struct SinowealthDriver;

impl SinowealthDriver {
    pub fn new() -> Self {
        Self
    }

    fn read_config(&self, transport: &Transport) -> Result<Box<[u8; SINOWEALTH_CONFIG_REPORT_SIZE]>> {
        let mut report = vec![0u8; SINOWEALTH_CONFIG_REPORT_SIZE].into_boxed_slice();
        report[0] = ReportId::Config as u8;
        transport.get_feature(&mut report)?;
        let boxed: Box<[u8; SINOWEALTH_CONFIG_REPORT_SIZE]> =
            report.try_into().map_err(|_| RatbagError::value("unexpected config report size"))?;
        Ok(boxed)
    }
}

impl Default for SinowealthDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for SinowealthDriver {
    fn id(&self) -> &'static str {
        "sinowealth"
    }

    fn probe(&self, device: &Device, transport: &Transport, _entry: &DataStoreEntry) -> Result<()> {
        let mut cmd = build_cmd(CommandId::FirmwareVersion);
        transport.get_feature(&mut cmd)?;
        let firmware_version = [cmd[2], cmd[3]];
        device.set_firmware_version(format!("{}.{}", firmware_version[0], firmware_version[1]));

        let mut caps = Capabilities::empty();
        caps.insert(Capability::WriteNeedsActiveProfile);

        device.init_profiles(
            SINOWEALTH_NUM_PROFILES_MAX,
            &ProfileLayout {
                num_resolutions: SINOWEALTH_NUM_DPIS,
                num_buttons: NUM_BUTTONS,
                num_leds: NUM_LED,
                profile_capabilities: caps,
                resolution_source: DpiSource::Range {
                    min: SINOWEALTH_DPI_MIN,
                    max: raw_to_dpi(u8::MAX),
                    step: SINOWEALTH_DPI_STEP,
                },
                resolution_capabilities: Capabilities::empty(),
                button_permitted: vec![ActionType::None, ActionType::MouseButton, ActionType::Key],
                led_capabilities: [Capability::LedOn, Capability::LedBreathing, Capability::LedCycle]
                    .into_iter()
                    .collect(),
            },
        );

        let report = self.read_config(transport)?;

        let active_profile = report[layout::ACTIVE_PROFILE];
        let xy_independent = report[layout::CONFIG_BITS] & SINOWEALTH_XY_INDEPENDENT != 0;

        for profile in device.profiles() {
            let _ = profile.set_report_rate_hz(
                SINOWEALTH_REPORT_RATES
                    .get(report[layout::REPORT_RATE] as usize)
                    .copied()
                    .unwrap_or(SINOWEALTH_REPORT_RATES[0]),
            );
            let _ = profile.set_debounce_ms(
                SINOWEALTH_DEBOUNCE_TIMES
                    .get(report[layout::DEBOUNCE] as usize)
                    .copied()
                    .unwrap_or(SINOWEALTH_DEBOUNCE_MIN),
            );

            let enabled_mask = report[layout::DPI_ENABLED];
            for (i, resolution) in profile.resolutions().iter().enumerate() {
                if enabled_mask & (1 << i) == 0 {
                    continue;
                }
                let x = raw_to_dpi(report[layout::DPI_X + i]);
                if xy_independent {
                    let y = raw_to_dpi(report[layout::DPI_Y + i]);
                    let _ = resolution.set_dpi_xy(x, y);
                } else {
                    let _ = resolution.set_dpi(x);
                }
                if i as u8 == report[layout::ACTIVE_DPI] {
                    let _ = resolution.set_active();
                }
            }

            for button in profile.buttons() {
                let offset = layout::BUTTONS + button.index() as usize * 2;
                let _ = button.set_action(button_action_from_raw(report[offset], report[offset + 1]), None);
            }

            if let Some(led) = profile.leds().into_iter().next() {
                let _ = led.set_mode(model_led_mode_for(report[layout::RGB_EFFECT]));
                let _ = led.set_color(Rgb {
                    r: report[layout::RGB_COLOR],
                    g: report[layout::RGB_COLOR + 1],
                    b: report[layout::RGB_COLOR + 2],
                });
                let _ = led.set_brightness(report[layout::RGB_BRIGHTNESS]);
            }
            profile.clear_all_dirty();
        }
        if let Some(p) = device.profile(u32::from(active_profile)) {
            let _ = p.set_active();
            p.clear_all_dirty();
        }

        device.set_driver_state(SinowealthData { firmware_version });
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<SinowealthData>();
        Ok(())
    }

    fn commit(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let mut report = self.read_config(transport)?;
        report[0] = ReportId::Config as u8;
        report[layout::ACTIVE_PROFILE] = profile.index() as u8;

        if let Some(rate_index) = SINOWEALTH_REPORT_RATES.iter().position(|&r| r == profile.report_rate_hz()) {
            report[layout::REPORT_RATE] = rate_index as u8;
        }
        if let Some(debounce_index) =
            profile.debounce_ms().and_then(|ms| SINOWEALTH_DEBOUNCE_TIMES.iter().position(|&d| d == ms))
        {
            report[layout::DEBOUNCE] = debounce_index as u8;
        }

        let mut xy_independent = report[layout::CONFIG_BITS] & SINOWEALTH_XY_INDEPENDENT != 0;
        let mut enabled_mask = report[layout::DPI_ENABLED];
        for (i, resolution) in profile.resolutions().iter().enumerate() {
            if resolution.is_disabled() {
                enabled_mask &= !(1 << i);
                continue;
            }
            enabled_mask |= 1 << i;
            match resolution.dpi() {
                Dpi::Unified(dpi) => {
                    let raw = dpi_to_raw(dpi).ok_or_else(|| RatbagError::value(format!("{dpi} dpi not representable")))?;
                    report[layout::DPI_X + i] = raw;
                    report[layout::DPI_Y + i] = raw;
                }
                Dpi::Separate { x, y } => {
                    xy_independent = true;
                    report[layout::DPI_X + i] =
                        dpi_to_raw(x).ok_or_else(|| RatbagError::value(format!("{x} dpi not representable")))?;
                    report[layout::DPI_Y + i] =
                        dpi_to_raw(y).ok_or_else(|| RatbagError::value(format!("{y} dpi not representable")))?;
                }
            }
            if resolution.is_active() {
                report[layout::ACTIVE_DPI] = i as u8;
            }
        }
        report[layout::DPI_ENABLED] = enabled_mask;
        if xy_independent {
            report[layout::CONFIG_BITS] |= SINOWEALTH_XY_INDEPENDENT;
        } else {
            report[layout::CONFIG_BITS] &= !SINOWEALTH_XY_INDEPENDENT;
        }

        for button in profile.buttons() {
            if !button.is_dirty() {
                continue;
            }
            let (raw, param) = raw_from_button_action(&button.action())?;
            let offset = layout::BUTTONS + button.index() as usize * 2;
            report[offset] = raw;
            report[offset + 1] = param;
        }

        if let Some(led) = profile.leds().into_iter().next() {
            if led.is_dirty() {
                let color = led.color();
                report[layout::RGB_EFFECT] = rgb_effect_for(led.mode()) as u8;
                report[layout::RGB_COLOR] = color.r;
                report[layout::RGB_COLOR + 1] = color.g;
                report[layout::RGB_COLOR + 2] = color.b;
                report[layout::RGB_BRIGHTNESS] = led.brightness();
            }
        }

        transport.set_feature(report.as_slice())?;
        Ok(())
    }

    fn set_active_profile(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let mut cmd = build_cmd(CommandId::Profile);
        cmd[2] = profile.index() as u8;
        transport.set_feature(&cmd)?;
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
    fn dpi_below_minimum_rejected() {
        assert!(dpi_to_raw(50).is_none());
    }

    #[test]
    fn button_action_round_trips_for_mouse_and_key() {
        let mouse = Action::MouseButton(2);
        let (raw, param) = raw_from_button_action(&mouse).unwrap();
        assert_eq!(button_action_from_raw(raw, param), mouse);

        let key = Action::Key(9);
        let (raw, param) = raw_from_button_action(&key).unwrap();
        assert_eq!(button_action_from_raw(raw, param), key);
    }

    #[test]
    fn macro_action_is_unsupported() {
        let err = raw_from_button_action(&Action::Macro(crate::model::Macro::default())).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unsupported);
    }
}
