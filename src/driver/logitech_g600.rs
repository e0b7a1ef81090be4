//! Logitech G600 gaming mouse driver.
//!
//! Targets the Logitech G600 MMO Gaming Mouse: a 20-button device (plus a
//! G-Shift modifier layer, doubling the addressable buttons to 40) with 3
//! profiles, 4 DPI levels, and one RGB LED zone whose color/effect lives
//! inside the profile report itself rather than a separate LED command.

use crate::datastore::DataStoreEntry;
use crate::error::{RatbagError, Result};
use crate::model::{
    Action, ActionType, Capabilities, Capability, Device, Dpi, DpiSource, Led, LedMode, Profile,
    ProfileLayout,
};
use crate::transport::Transport;

const NUM_PROFILES: usize = 3;
/// 20 standard buttons + 20 G-Shift buttons.
const NUM_BUTTONS: usize = 40;
const NUM_DPI: usize = 4;
const NUM_LED: usize = 1;

const DPI_MIN: u32 = 200;
const DPI_MAX: u32 = 8200;

const REPORT_ID_GET_ACTIVE: u8 = 0xF0;
const REPORT_ID_PROFILE_0: u8 = 0xF3;
const REPORT_ID_PROFILE_1: u8 = 0xF4;
const REPORT_ID_PROFILE_2: u8 = 0xF5;

/// Size of a full profile report (bytes): enough to hold the fixed header
/// plus 40 button entries (20 standard + 20 G-Shift) at 3 bytes each.
const REPORT_SIZE_PROFILE: usize = 160;

const LED_SOLID: u8 = 0x00;
const LED_BREATHE: u8 = 0x01;
const LED_CYCLE: u8 = 0x02;

/// Report IDs for the three profiles, indexed by profile number.
const PROFILE_REPORT_IDS: [u8; NUM_PROFILES] = [REPORT_ID_PROFILE_0, REPORT_ID_PROFILE_1, REPORT_ID_PROFILE_2];

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonCode {
    MouseButton = 0x00,
    Key = 0x01,
    GShift = 0x02,
    Disabled = 0x0f,
}

/// A single button entry in the profile report (3 bytes, packed).
#[derive(Debug, Default, Clone, Copy)]
pub struct ButtonEntry {
    pub code: u8,
    pub modifier: u8,
    pub key: u8,
}

impl ButtonEntry {
    fn to_action(self) -> Action {
        match self.code {
            x if x == ButtonCode::MouseButton as u8 => Action::MouseButton(self.key),
            x if x == ButtonCode::Key as u8 => Action::Key(u32::from(self.key)),
            _ => Action::None,
        }
    }

    fn from_action(action: &Action) -> Result<Self> {
        match action {
            Action::None => Ok(ButtonEntry { code: ButtonCode::Disabled as u8, modifier: 0, key: 0 }),
            Action::MouseButton(n) => Ok(ButtonEntry { code: ButtonCode::MouseButton as u8, modifier: 0, key: *n }),
            Action::Key(code) => {
                let key = u8::try_from(*code).map_err(|_| RatbagError::value("keycode does not fit a byte on this device"))?;
                Ok(ButtonEntry { code: ButtonCode::Key as u8, modifier: 0, key })
            }
            Action::Special(_) => Err(RatbagError::Unsupported("g600 special actions")),
            Action::Macro(_) => Err(RatbagError::Unsupported("g600 macro buttons")),
        }
    }
}

/// Polled active-profile + resolution report.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActiveProfileReport {
    pub id: u8,
    /// Packed: `unknown1[0:0] | resolution[1:2] | unknown2[3:3] | profile[4:7]`.
    pub packed: u8,
    pub unknown3: u8,
    pub unknown4: u8,
}

impl ActiveProfileReport {
    pub fn profile(&self) -> u8 {
        (self.packed >> 4) & 0x0f
    }

    pub fn resolution(&self) -> u8 {
        (self.packed >> 1) & 0x03
    }
}

/// Convert a DPI value to the raw byte sent in the profile report.
/// Raw = `dpi / 50`. Range: 200 (0x04) - 8200 (0xa4).
pub fn dpi_to_raw(dpi: u32) -> Option<u8> {
    if dpi < DPI_MIN || dpi > DPI_MAX || dpi % 50 != 0 {
        return None;
    }
    u8::try_from(dpi / 50).ok()
}

pub fn raw_to_dpi(raw: u8) -> u32 {
    u32::from(raw) * 50
}

pub fn raw_to_hz(raw: u8) -> u32 {
    if raw == 0 { 1000 } else { 1000 / (u32::from(raw) + 1) }
}

fn hz_to_raw(hz: u32) -> u8 {
    if hz == 0 || hz >= 1000 {
        0
    } else {
        u8::try_from((1000 / hz).saturating_sub(1)).unwrap_or(0)
    }
}

fn led_effect_for(mode: LedMode) -> u8 {
    match mode {
        LedMode::Off | LedMode::On => LED_SOLID,
        LedMode::Breathing => LED_BREATHE,
        LedMode::Cycle => LED_CYCLE,
    }
}

fn button_offset(index: usize) -> usize {
    if index < 20 {
        // buttons[20] start at byte 33 (see REPORT_SIZE_PROFILE layout).
        33 + index * 3
    } else {
        // g_shift_buttons[20] start after g_shift_color (3 bytes).
        33 + 60 + 3 + (index - 20) * 3
    }
}

struct G600Data {
    active: ActiveProfileReport,
}

pub struct LogitechG600Driver;

impl LogitechG600Driver {
    pub fn new() -> Self {
        Self
    }

    fn read_profile_report(&self, transport: &Transport, index: u32) -> Result<[u8; REPORT_SIZE_PROFILE]> {
        let mut report = [0u8; REPORT_SIZE_PROFILE];
        report[0] = PROFILE_REPORT_IDS[index as usize];
        transport.get_feature(&mut report)?;
        Ok(report)
    }
}

impl Default for LogitechG600Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for LogitechG600Driver {
    fn id(&self) -> &'static str {
        "logitech_g600"
    }

    fn probe(&self, device: &Device, transport: &Transport, _entry: &DataStoreEntry) -> Result<()> {
        let mut active_buf = [0u8; 4];
        active_buf[0] = REPORT_ID_GET_ACTIVE;
        transport.get_feature(&mut active_buf)?;
        let active = ActiveProfileReport {
            id: active_buf[0],
            packed: active_buf[1],
            unknown3: active_buf[2],
            unknown4: active_buf[3],
        };

        let mut caps = Capabilities::empty();
        caps.insert(Capability::WriteNeedsActiveProfile);

        device.init_profiles(
            NUM_PROFILES,
            &ProfileLayout {
                num_resolutions: NUM_DPI,
                num_buttons: NUM_BUTTONS,
                num_leds: NUM_LED,
                profile_capabilities: caps,
                resolution_source: DpiSource::Range { min: DPI_MIN, max: DPI_MAX, step: 50 },
                resolution_capabilities: Capabilities::empty(),
                button_permitted: vec![ActionType::None, ActionType::MouseButton, ActionType::Key],
                led_capabilities: [Capability::LedOn, Capability::LedBreathing, Capability::LedCycle]
                    .into_iter()
                    .collect(),
            },
        );

        for profile in device.profiles() {
            let report = self.read_profile_report(transport, profile.index())?;
            let _ = profile.set_report_rate_hz(raw_to_hz(report[10]));

            for (i, resolution) in profile.resolutions().iter().enumerate() {
                let raw = report[13 + i];
                let _ = resolution.set_dpi(raw_to_dpi(raw));
                if i + 1 == report[12] as usize {
                    let _ = resolution.set_active();
                }
            }

            for button in profile.buttons() {
                let offset = button_offset(button.index() as usize);
                let entry = ButtonEntry { code: report[offset], modifier: report[offset + 1], key: report[offset + 2] };
                let _ = button.set_action(entry.to_action(), None);
            }

            if let Some(led) = profile.leds().into_iter().next() {
                let mode = match report[4] {
                    x if x == LED_BREATHE => LedMode::Breathing,
                    x if x == LED_CYCLE => LedMode::Cycle,
                    _ => LedMode::On,
                };
                let _ = led.set_mode(mode);
                let _ = led.set_color(crate::model::Rgb { r: report[1], g: report[2], b: report[3] });
            }
            profile.clear_all_dirty();
        }
        if let Some(p) = device.profile(u32::from(active.profile())) {
            let _ = p.set_active();
            p.clear_all_dirty();
        }

        device.set_driver_state(G600Data { active });
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<G600Data>();
        Ok(())
    }

    fn commit(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let index = profile.index();
        let mut report = self.read_profile_report(transport, index)?;
        report[0] = PROFILE_REPORT_IDS[index as usize];

        if let Some(led) = profile.leds().into_iter().next() {
            write_led(&mut report, &led);
        }

        report[10] = hz_to_raw(profile.report_rate_hz());

        for (i, resolution) in profile.resolutions().iter().enumerate() {
            let dpi = resolution.dpi();
            let Dpi::Unified(value) = dpi else {
                return Err(RatbagError::Unsupported("g600 has no separate x/y dpi"));
            };
            let raw = dpi_to_raw(value).ok_or_else(|| RatbagError::value(format!("{value} dpi not representable on g600")))?;
            report[13 + i] = raw;
            if resolution.is_active() {
                report[12] = (i + 1) as u8;
            }
        }

        for button in profile.buttons() {
            if !button.is_dirty() {
                continue;
            }
            let entry = ButtonEntry::from_action(&button.action())?;
            let offset = button_offset(button.index() as usize);
            report[offset] = entry.code;
            report[offset + 1] = entry.modifier;
            report[offset + 2] = entry.key;
        }

        transport.set_feature(&report)?;
        Ok(())
    }

    fn set_active_profile(&self, device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let resolution_index = profile.resolutions().iter().position(crate::model::Resolution::is_active).unwrap_or(0) as u8;
        let packed = ((profile.index() as u8) << 4) | (resolution_index << 1);
        let report = [REPORT_ID_GET_ACTIVE, packed, 0, 0];
        transport.set_feature(&report)?;
        device.with_driver_state(|s: &mut G600Data| s.active.packed = packed);
        Ok(())
    }
}

fn write_led(report: &mut [u8], led: &Led) {
    let color = led.color();
    report[1] = color.r;
    report[2] = color.g;
    report[3] = color.b;
    report[4] = led_effect_for(led.mode());
    report[5] = (led.duration_ms() / 100).min(255) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_round_trips_through_raw_steps() {
        let raw = dpi_to_raw(1600).unwrap();
        assert_eq!(raw_to_dpi(raw), 1600);
    }

    #[test]
    fn dpi_out_of_range_rejected() {
        assert!(dpi_to_raw(100).is_none());
        assert!(dpi_to_raw(9000).is_none());
    }

    #[test]
    fn frequency_round_trips_for_common_rates() {
        for hz in [125, 250, 500, 1000] {
            assert_eq!(raw_to_hz(hz_to_raw(hz)), hz);
        }
    }

    #[test]
    fn standard_and_gshift_buttons_occupy_disjoint_offsets() {
        let offsets: Vec<usize> = (0..NUM_BUTTONS).map(button_offset).collect();
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(offsets.len(), sorted.len());
    }

    #[test]
    fn active_profile_report_unpacks_fields() {
        let report = ActiveProfileReport { id: 0xf0, packed: 0b0010_0100, unknown3: 0, unknown4: 0 };
        assert_eq!(report.profile(), 2);
        assert_eq!(report.resolution(), 2);
    }
}
