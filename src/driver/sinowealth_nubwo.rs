//! SinoWealth Nubwo gaming mouse driver.
//!
//! Covers Nubwo mice that use the simplified SinoWealth variant protocol:
//! a single profile, a handful of discrete DPI/rate steps addressed by an
//! encoded byte rather than a raw value, and one aesthetic (LED) report.
//! Distinct from [`super::sinowealth`] — different report IDs, fixed
//! command templates instead of a full onboard-memory image.

use crate::datastore::DataStoreEntry;
use crate::error::{RatbagError, Result};
use crate::model::{
    ActionType, Capabilities, Device, Dpi, DpiSource, Led, LedMode, Profile, ProfileLayout, Rgb,
};
use crate::transport::Transport;

/// HID report ID for performance commands (rate, DPI).
const REPORTID_PERF_CMD: u8 = 0x02;
/// HID report ID for aesthetic commands (LED).
const REPORTID_AESTHETIC_CMD: u8 = 0x03;
/// HID report ID for the firmware version query.
const REPORTID_GET_FIRMWARE: u8 = 0x04;

/// Size of the firmware version response (bytes).
const GET_FIRMWARE_MSGSIZE: usize = 256;
/// Byte offset where the firmware string starts.
const GET_FIRMWARE_MSGOFFSET: usize = 48;

const NUM_PROFILES: usize = 1;
const NUM_RESOLUTIONS: usize = 1;
const NUM_BUTTONS: usize = 0;
const NUM_LEDS: usize = 1;

/// Magic SET_FEATURE that must precede a firmware version query.
const PREFIRMWARE_QUERY: [u8; 16] = [
    0x02, 0x01, 0x49, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Valid polling rates (Hz).
const REPORT_RATES: &[u32] = &[125, 250, 333, 500, 1000];
/// Encoded polling-rate bytes (same order as `REPORT_RATES`).
const REPORT_RATES_ENCODED: &[u8] = &[0x08, 0x04, 0x03, 0x02, 0x01];
/// Template for the polling-rate SET_FEATURE command.
const REPORT_RATE_CMD: [u8; 8] = [0x02, 0x06, 0xbb, 0xaa, 0x28, 0x00, 0x01, 0x00];

/// Valid DPI values (cps).
const DPI_LIST: &[u32] = &[1000, 2000, 3000, 5000, 15_000];
/// Encoded DPI bytes (same order as `DPI_LIST`).
const DPI_ENCODED: &[u8] = &[0x04, 0x03, 0x02, 0x01, 0x00];
/// Template for the DPI SET_FEATURE command.
const DPI_CMD: [u8; 8] = [0x02, 0x06, 0xbb, 0xaa, 0x32, 0x00, 0x01, 0x00];

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Off = 0x00,
    On = 0x01,
    Breathing = 0x02,
    ColorShift = 0x03,
    Spectrum = 0x04,
    Marquee = 0x05,
}

/// Full aesthetic SET_FEATURE report (14 bytes).
#[derive(Debug, Default, Clone)]
pub struct AestheticReport {
    pub report_id: u8,
    pub cmd: [u8; 7],
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub color_mode: u8,
    pub pad_zero: u8,
    /// Brightness: 0x01 (low) - 0x03 (high).
    pub brightness: u8,
    /// Speed / tempo: 0x01 (fast), 0x03 (slow), 0x05 (very slow).
    pub tempo: u8,
}

impl AestheticReport {
    fn into_bytes(self) -> [u8; 14] {
        [
            self.report_id,
            self.cmd[0],
            self.cmd[1],
            self.cmd[2],
            self.cmd[3],
            self.cmd[4],
            self.cmd[5],
            self.cmd[6],
            self.r,
            self.g,
            self.b,
            self.color_mode,
            self.pad_zero,
            self.brightness,
        ]
    }
}

/// Encode a DPI value for the command report.
pub fn encode_dpi(dpi: u32) -> Option<u8> {
    DPI_LIST.iter().position(|&d| d == dpi).map(|i| DPI_ENCODED[i])
}

pub fn decode_dpi(encoded: u8) -> Option<u32> {
    DPI_ENCODED.iter().position(|&e| e == encoded).map(|i| DPI_LIST[i])
}

/// Encode a polling rate for the command report.
pub fn encode_rate(rate: u32) -> Option<u8> {
    REPORT_RATES.iter().position(|&r| r == rate).map(|i| REPORT_RATES_ENCODED[i])
}

/// Build the DPI SET_FEATURE command.
pub fn build_dpi_cmd(encoded: u8) -> [u8; 8] {
    let mut cmd = DPI_CMD;
    cmd[6] = encoded;
    cmd
}

/// Build the polling-rate SET_FEATURE command.
pub fn build_rate_cmd(encoded: u8) -> [u8; 8] {
    let mut cmd = REPORT_RATE_CMD;
    cmd[6] = encoded;
    cmd
}

fn color_mode_for(mode: LedMode) -> u8 {
    match mode {
        LedMode::Off => ColorMode::Off as u8,
        LedMode::On => ColorMode::On as u8,
        LedMode::Breathing => ColorMode::Breathing as u8,
        LedMode::Cycle => ColorMode::Spectrum as u8,
    }
}

struct NubwoData {
    firmware_string: String,
}

pub struct SinowealthNubwoDriver;

impl SinowealthNubwoDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SinowealthNubwoDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for SinowealthNubwoDriver {
    fn id(&self) -> &'static str {
        "sinowealth_nubwo"
    }

    fn probe(&self, device: &Device, transport: &Transport, _entry: &DataStoreEntry) -> Result<()> {
        transport.set_feature(&PREFIRMWARE_QUERY)?;

        let mut buf = [0u8; GET_FIRMWARE_MSGSIZE];
        buf[0] = REPORTID_GET_FIRMWARE;
        transport.get_feature(&mut buf)?;
        let fw_bytes = &buf[GET_FIRMWARE_MSGOFFSET..];
        let fw_len = fw_bytes.iter().position(|&b| b == 0).unwrap_or(fw_bytes.len());
        let firmware_string = String::from_utf8_lossy(&fw_bytes[..fw_len]).into_owned();
        device.set_firmware_version(firmware_string.clone());

        device.init_profiles(
            NUM_PROFILES,
            &ProfileLayout {
                num_resolutions: NUM_RESOLUTIONS,
                num_buttons: NUM_BUTTONS,
                num_leds: NUM_LEDS,
                profile_capabilities: Capabilities::empty(),
                resolution_source: DpiSource::List(DPI_LIST.to_vec()),
                resolution_capabilities: Capabilities::empty(),
                button_permitted: vec![ActionType::None],
                led_capabilities: [
                    crate::model::Capability::LedOn,
                    crate::model::Capability::LedBreathing,
                    crate::model::Capability::LedCycle,
                ]
                .into_iter()
                .collect(),
            },
        );

        device.set_driver_state(NubwoData { firmware_string });
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<NubwoData>();
        Ok(())
    }

    fn commit(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        for resolution in profile.resolutions() {
            if !resolution.is_dirty() {
                continue;
            }
            let Dpi::Unified(dpi) = resolution.dpi() else {
                return Err(RatbagError::Unsupported("sinowealth-nubwo has no separate x/y dpi"));
            };
            let encoded = encode_dpi(dpi)
                .ok_or_else(|| RatbagError::value(format!("{dpi} dpi not in the nubwo DPI table")))?;
            transport.set_feature(&build_dpi_cmd(encoded))?;
        }

        for led in profile.leds() {
            if !led.is_dirty() {
                continue;
            }
            write_led(transport, &led)?;
        }

        Ok(())
    }

    fn set_active_profile(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        // Single-profile device: the rate is the only thing that persists
        // across "activation" and is driven by the profile's report rate.
        let encoded = encode_rate(profile.report_rate_hz())
            .ok_or_else(|| RatbagError::value(format!("{} hz not in the nubwo rate table", profile.report_rate_hz())))?;
        transport.set_feature(&build_rate_cmd(encoded))?;
        Ok(())
    }
}

fn write_led(transport: &Transport, led: &Led) -> Result<()> {
    let Rgb { r, g, b } = led.color();
    let report = AestheticReport {
        report_id: REPORTID_AESTHETIC_CMD,
        cmd: [0xbb, 0xaa, 0x50, 0x00, 0x01, 0x00, 0x00],
        r,
        g,
        b,
        color_mode: color_mode_for(led.mode()),
        pad_zero: 0,
        brightness: (led.brightness() / 85).clamp(1, 3),
        tempo: 0x03,
    };
    transport.set_feature(&report.into_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_round_trips_through_table() {
        for &dpi in DPI_LIST {
            let encoded = encode_dpi(dpi).unwrap();
            assert_eq!(decode_dpi(encoded), Some(dpi));
        }
        assert_eq!(encode_dpi(12345), None);
    }

    #[test]
    fn rate_cmd_carries_encoded_byte() {
        let encoded = encode_rate(500).unwrap();
        let cmd = build_rate_cmd(encoded);
        assert_eq!(cmd[6], encoded);
        assert_eq!(cmd[0], REPORTID_PERF_CMD);
    }
}
