//! Component C: the HID++ 2.0 channel, plus the generic `hidpp20` driver
//! built on it. Modern Logitech gaming mice expose every capability as a
//! numbered "feature" discovered through feature 0x0000 (Root); a feature's
//! runtime index is only stable for the lifetime of a connection, so it is
//! always looked up fresh during `probe` and cached on the device.

use tracing::debug;

use crate::datastore::DataStoreEntry;
use crate::driver::hidpp::{self, HidppReport};
use crate::driver::DeviceDriver;
use crate::error::{RatbagError, Result};
use crate::model::{Capabilities, Capability, Device, DpiSource, LedMode, Profile, ProfileLayout};
use crate::transport::Transport;

/// Arbitrary software id identifying requests as ours; HID++ 2.0 allows a
/// peripheral to multiplex several software clients via this nibble.
const SW_ID: u8 = 0x04;

/// Feature pages this driver knows how to use, beyond the ones already
/// named in [`hidpp`].
const PAGE_ADJUSTABLE_DPI: u16 = 0x2201;
const PAGE_ADJUSTABLE_REPORT_RATE: u16 = 0x8060;
const PAGE_COLOR_LED_EFFECTS: u16 = 0x8070;
const PAGE_ONBOARD_PROFILES: u16 = 0x8100;

const DPI_FN_GET_SENSOR_COUNT: u8 = 0x00;
const DPI_FN_GET_SENSOR_DPI_LIST: u8 = 0x01;
const DPI_FN_GET_SENSOR_DPI: u8 = 0x02;
const DPI_FN_SET_SENSOR_DPI: u8 = 0x03;

const RATE_FN_GET_REPORT_RATE_LIST: u8 = 0x00;
const RATE_FN_GET_REPORT_RATE: u8 = 0x01;
const RATE_FN_SET_REPORT_RATE: u8 = 0x02;

const LED_FN_GET_ZONE_EFFECT: u8 = 0x01;
const LED_FN_SET_ZONE_EFFECT: u8 = 0x02;

const PROFILES_FN_GET_PROFILES_DESCR: u8 = 0x00;
const PROFILES_FN_SET_MODE: u8 = 0x01;
const PROFILES_FN_MEMORY_READ: u8 = 0x04;
const PROFILES_FN_MEMORY_ADDR_WRITE: u8 = 0x05;
const PROFILES_FN_MEMORY_WRITE: u8 = 0x06;
const PROFILES_FN_MEMORY_WRITE_END: u8 = 0x07;

const ONBOARD_MODE_ONBOARD: u8 = 0x01;
const ONBOARD_MODE_HOST: u8 = 0x02;

const LED_HW_MODE_OFF: u8 = 0x00;
const LED_HW_MODE_FIXED: u8 = 0x01;
const LED_HW_MODE_CYCLE: u8 = 0x03;
const LED_HW_MODE_BREATHING: u8 = 0x0a;

/// Thin wrapper around a [`Transport`] speaking the feature-indexed
/// protocol; has no opinion about which features are cached, that's the
/// driver's [`FeatureMap`].
pub struct Hidpp20Channel<'t> {
    transport: &'t Transport,
    device_index: u8,
}

impl<'t> Hidpp20Channel<'t> {
    pub fn new(transport: &'t Transport, device_index: u8) -> Self {
        Self { transport, device_index }
    }

    /// `GetProtocolVersion` against the Root feature. Returns `None` if the
    /// device does not answer at this index (not HID++ 2.0, or wrong index).
    pub fn protocol_version(&self) -> Option<(u8, u8)> {
        let request = hidpp::build_hidpp20_request(
            self.device_index,
            hidpp::ROOT_FEATURE_INDEX,
            hidpp::ROOT_FN_GET_PROTOCOL_VERSION,
            SW_ID,
            &[],
        );
        let dev = self.device_index;
        self.transport
            .request(&request, 20, Transport::default_read_budget(), move |buf| {
                let report = HidppReport::parse(buf)?;
                if report.is_error() || !report.matches_hidpp20(dev, hidpp::ROOT_FEATURE_INDEX) {
                    return None;
                }
                match report {
                    HidppReport::Long { params, .. } => Some((params[0], params[1])),
                    _ => None,
                }
            })
            .ok()
    }

    /// Look the runtime feature index for `page` up via the Root feature.
    /// `Ok(None)` means the device genuinely does not support it (a
    /// recoverable condition the caller is expected to handle, not an
    /// error) — not every mouse has RGB, onboard profiles, etc.
    pub fn get_feature_index(&self, page: u16) -> Result<Option<u8>> {
        let [hi, lo] = page.to_be_bytes();
        let request = hidpp::build_hidpp20_request(
            self.device_index,
            hidpp::ROOT_FEATURE_INDEX,
            hidpp::ROOT_FN_GET_FEATURE,
            SW_ID,
            &[hi, lo],
        );
        let dev = self.device_index;
        self.transport
            .request(&request, 20, Transport::default_read_budget(), move |buf| {
                let report = HidppReport::parse(buf)?;
                if report.is_error() {
                    return Some(Ok(None));
                }
                match &report {
                    HidppReport::Long { device_index, sub_id, params, .. }
                        if *device_index == dev && *sub_id == hidpp::ROOT_FEATURE_INDEX =>
                    {
                        Some(Ok(if params[0] == 0 { None } else { Some(params[0]) }))
                    }
                    _ => None,
                }
            })
    }

    /// Send a feature request and return its 16-byte response payload.
    /// Short acknowledgements (some SET calls on wireless devices) are
    /// zero-padded to 16 bytes; a HID++ error response surfaces as
    /// `RatbagError::protocol(code)`, which a caller may treat as
    /// "feature unsupported" when appropriate instead of a hard failure.
    pub fn feature_request(&self, feature_index: u8, function: u8, params: &[u8]) -> Result<[u8; 16]> {
        let request =
            hidpp::build_hidpp20_request(self.device_index, feature_index, function, SW_ID, params);
        let dev = self.device_index;
        self.transport
            .request(&request, 20, Transport::default_read_budget(), move |buf| {
                let report = HidppReport::parse(buf)?;
                if report.is_error() {
                    return match report {
                        HidppReport::Long { params, .. } => Some(Err(RatbagError::protocol(params[1]))),
                        HidppReport::Short { params, .. } => Some(Err(RatbagError::protocol(params[1]))),
                    };
                }
                match report {
                    HidppReport::Long { device_index, sub_id, params, .. }
                        if device_index == dev && sub_id == feature_index =>
                    {
                        Some(Ok(params))
                    }
                    HidppReport::Short { device_index, sub_id, params, .. }
                        if device_index == dev && sub_id == feature_index =>
                    {
                        let mut long = [0u8; 16];
                        long[..3].copy_from_slice(&params);
                        Some(Ok(long))
                    }
                    _ => None,
                }
            })
    }
}

/// Feature page → runtime index, cached for the device's connection
/// lifetime. Stored in `driver_private` between `probe` and `commit`.
#[derive(Debug, Default)]
struct FeatureMap {
    device_index: u8,
    adjustable_dpi: Option<u8>,
    onboard_profiles: Option<u8>,
    color_led_effects: Option<u8>,
    report_rate: Option<u8>,
}

/// Onboard-profile sector geometry, read once from feature 0x8100's
/// descriptor during probe.
#[derive(Debug, Clone, Copy, Default)]
struct OnboardLayout {
    sector_size: u16,
    profile_count: usize,
    button_count: usize,
}

struct Hidpp20State {
    features: FeatureMap,
    onboard: Option<OnboardLayout>,
}

/// CRC-CCITT (poly 0x1021, init 0xFFFF) as used by the onboard-profile
/// sector checksum.
fn compute_ccitt_crc(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}

pub struct Hidpp20Driver;

impl Hidpp20Driver {
    pub fn new() -> Self {
        Self
    }

    fn channel<'t>(&self, transport: &'t Transport, device_index: u8) -> Hidpp20Channel<'t> {
        Hidpp20Channel::new(transport, device_index)
    }

    fn read_sector(&self, ch: &Hidpp20Channel, idx: u8, sector: u16, size: u16) -> Result<Vec<u8>> {
        let mut result = Vec::with_capacity(size as usize);
        let mut offset = 0u16;
        while offset < size {
            let chunk = (size - offset).min(16);
            let effective = if chunk < 16 { size.saturating_sub(16) } else { offset };
            let mut params = [0u8; 4];
            params[0..2].copy_from_slice(&sector.to_be_bytes());
            params[2..4].copy_from_slice(&effective.to_be_bytes());
            let response = ch.feature_request(idx, PROFILES_FN_MEMORY_READ, &params)?;
            if effective == offset {
                result.extend_from_slice(&response[..chunk as usize]);
            } else {
                result.extend_from_slice(&response[16 - chunk as usize..]);
            }
            offset += chunk;
        }
        Ok(result)
    }

    fn write_sector(&self, ch: &Hidpp20Channel, idx: u8, sector: u16, data: &[u8]) -> Result<()> {
        let size = data.len() as u16;
        let mut start = [0u8; 6];
        start[0..2].copy_from_slice(&sector.to_be_bytes());
        start[4..6].copy_from_slice(&size.to_be_bytes());
        ch.feature_request(idx, PROFILES_FN_MEMORY_ADDR_WRITE, &start)?;
        for chunk in data.chunks(16) {
            let mut payload = [0u8; 16];
            payload[..chunk.len()].copy_from_slice(chunk);
            ch.feature_request(idx, PROFILES_FN_MEMORY_WRITE, &payload)?;
        }
        ch.feature_request(idx, PROFILES_FN_MEMORY_WRITE_END, &[])?;
        Ok(())
    }

    fn led_hw_mode(mode: LedMode) -> u8 {
        match mode {
            LedMode::Off => LED_HW_MODE_OFF,
            LedMode::On => LED_HW_MODE_FIXED,
            LedMode::Cycle => LED_HW_MODE_CYCLE,
            LedMode::Breathing => LED_HW_MODE_BREATHING,
        }
    }
}

impl Default for Hidpp20Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDriver for Hidpp20Driver {
    fn id(&self) -> &'static str {
        "hidpp20"
    }

    fn probe(&self, device: &Device, transport: &Transport, entry: &DataStoreEntry) -> Result<()> {
        const PROBE_INDICES: [u8; 2] = [0xff, 0x00];
        let device_index = PROBE_INDICES
            .into_iter()
            .find(|&idx| self.channel(transport, idx).protocol_version().is_some())
            .ok_or(RatbagError::NotFound)?;

        let ch = self.channel(transport, device_index);
        let mut features = FeatureMap { device_index, ..FeatureMap::default() };
        features.adjustable_dpi = ch.get_feature_index(PAGE_ADJUSTABLE_DPI)?;
        features.onboard_profiles = ch.get_feature_index(PAGE_ONBOARD_PROFILES)?;
        features.color_led_effects = ch.get_feature_index(PAGE_COLOR_LED_EFFECTS)?;
        features.report_rate = ch.get_feature_index(PAGE_ADJUSTABLE_REPORT_RATE)?;

        let mut caps = Capabilities::empty();
        if features.color_led_effects.is_some() {
            caps.insert(Capability::LedOn).insert(Capability::LedCycle).insert(Capability::LedBreathing);
        }
        caps.insert(Capability::SaveToFlash);
        device.set_capabilities(caps);

        let onboard = if let Some(idx) = features.onboard_profiles {
            let desc = ch.feature_request(idx, PROFILES_FN_GET_PROFILES_DESCR, &[])?;
            let mut profile_count = desc[3] as usize;
            if profile_count == 0 {
                profile_count = desc[4].max(1) as usize;
            }
            let button_count = (desc[5] as usize).min(16);
            let sector_size = u16::from_be_bytes([desc[7], desc[8]]);
            debug!("hidpp20: onboard profiles={profile_count} buttons={button_count} sector={sector_size}");
            Some(OnboardLayout { sector_size, profile_count, button_count })
        } else {
            None
        };

        let num_profiles = onboard.map(|o| o.profile_count).unwrap_or(1);
        let num_buttons = onboard.map(|o| o.button_count).unwrap_or(entry.num_buttons.unwrap_or(0) as usize);
        let source = entry
            .dpis
            .clone()
            .map(DpiSource::List)
            .or_else(|| entry.dpi_range.map(|r| DpiSource::Range { min: r.min, max: r.max, step: r.step }))
            .unwrap_or(DpiSource::Range { min: 400, max: 16000, step: 50 });

        let mut button_permitted = vec![crate::model::ActionType::None, crate::model::ActionType::MouseButton];
        button_permitted.push(crate::model::ActionType::Key);
        button_permitted.push(crate::model::ActionType::Special);
        if caps.has(Capability::Macro) {
            button_permitted.push(crate::model::ActionType::Macro);
        }

        device.init_profiles(
            num_profiles,
            &ProfileLayout {
                num_resolutions: 1,
                num_buttons,
                num_leds: 1,
                profile_capabilities: Capabilities::single(Capability::DisableProfile),
                resolution_source: source,
                resolution_capabilities: Capabilities::empty(),
                button_permitted,
                led_capabilities: caps,
            },
        );

        if let Some(idx) = features.adjustable_dpi {
            let sensor = ch.feature_request(idx, DPI_FN_GET_SENSOR_COUNT, &[0])?;
            if sensor[0] > 0 {
                let dpi_data = ch.feature_request(idx, DPI_FN_GET_SENSOR_DPI, &[0])?;
                let current = u16::from_be_bytes([dpi_data[1], dpi_data[2]]);
                if let Some(profile) = device.profile(0)
                    && let Some(res) = profile.resolutions().into_iter().next()
                {
                    let _ = res.set_dpi(u32::from(current));
                }
            }
        }

        device.set_driver_state(Hidpp20State { features, onboard });
        device.profiles().iter().for_each(Profile::clear_all_dirty);
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<Hidpp20State>();
        Ok(())
    }

    fn commit(&self, device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let (device_index, dpi_idx, led_idx, rate_idx, onboard) = device
            .with_driver_state::<Hidpp20State, _>(|s| {
                (s.features.device_index, s.features.adjustable_dpi, s.features.color_led_effects, s.features.report_rate, s.onboard)
            })
            .ok_or_else(|| RatbagError::device("hidpp20 driver state missing, was probe() called?"))?;
        let ch = self.channel(transport, device_index);

        if let Some(idx) = dpi_idx
            && let Some(res) = profile.resolutions().into_iter().find(|r| r.is_active())
        {
            let dpi = res.dpi();
            let bytes = (dpi.x() as u16).to_be_bytes();
            ch.feature_request(idx, DPI_FN_SET_SENSOR_DPI, &[0, bytes[0], bytes[1]])?;
        }

        if let Some(idx) = rate_idx {
            let hz = profile.report_rate_hz();
            if hz > 0 {
                let ms = (1000 / hz).clamp(1, 255) as u8;
                ch.feature_request(idx, RATE_FN_SET_REPORT_RATE, &[ms])?;
            }
        }

        if let Some(idx) = led_idx {
            for led in profile.leds() {
                let zone = led.index() as u8;
                let color = led.color();
                let mode = Self::led_hw_mode(led.mode());
                let mut payload = [0u8; 14];
                payload[0] = zone;
                payload[1] = mode;
                payload[2] = color.r;
                payload[3] = color.g;
                payload[4] = color.b;
                payload[13] = 0x01; // persist
                ch.feature_request(idx, LED_FN_SET_ZONE_EFFECT, &payload[..13])?;
            }
        }

        if let Some(layout) = onboard
            && let Some(idx) = device.with_driver_state::<Hidpp20State, _>(|s| s.features.onboard_profiles).flatten()
        {
            ch.feature_request(idx, PROFILES_FN_SET_MODE, &[ONBOARD_MODE_HOST])?;

            let addr = profile.index() as u16 + 1;
            let mut data = self
                .read_sector(&ch, idx, addr, layout.sector_size)
                .unwrap_or_else(|_| vec![0xffu8; layout.sector_size as usize]);
            if data.len() < layout.sector_size as usize {
                data.resize(layout.sector_size as usize, 0xff);
            }

            let hz = profile.report_rate_hz();
            if hz > 0 {
                data[0] = (1000 / hz).clamp(1, 255) as u8;
            }
            if let Some(def_idx) = profile.resolutions().iter().position(|r| r.is_default()) {
                data[1] = def_idx as u8;
            }
            for (i, res) in profile.resolutions().iter().enumerate().take(5) {
                let bytes = (res.dpi().x() as u16).to_le_bytes();
                data[3 + i * 2] = bytes[0];
                data[3 + i * 2 + 1] = bytes[1];
            }

            let crc_off = data.len() - 2;
            let crc = compute_ccitt_crc(&data[..crc_off]).to_be_bytes();
            data[crc_off] = crc[0];
            data[crc_off + 1] = crc[1];

            let write_result = self.write_sector(&ch, idx, addr, &data);
            let mode_result = ch.feature_request(idx, PROFILES_FN_SET_MODE, &[ONBOARD_MODE_ONBOARD]);
            write_result?;
            mode_result?;
        }

        Ok(())
    }

    fn set_active_profile(&self, device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let device_index = device
            .with_driver_state::<Hidpp20State, _>(|s| s.features.device_index)
            .ok_or_else(|| RatbagError::device("hidpp20 driver state missing"))?;
        let onboard_idx = device.with_driver_state::<Hidpp20State, _>(|s| s.features.onboard_profiles).flatten();
        if let Some(idx) = onboard_idx {
            let ch = self.channel(transport, device_index);
            let addr = profile.index() as u16 + 1;
            ch.feature_request(idx, PROFILES_FN_MEMORY_ADDR_WRITE, &[0, 0, 0, 0, 0, 0])
                .ok();
            let _ = ch.feature_request(idx, PROFILES_FN_SET_MODE, &[addr as u8]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccitt_crc_of_empty_is_init_value() {
        assert_eq!(compute_ccitt_crc(&[]), 0xFFFF);
    }

    #[test]
    fn led_hw_mode_mapping() {
        assert_eq!(Hidpp20Driver::led_hw_mode(LedMode::Off), LED_HW_MODE_OFF);
        assert_eq!(Hidpp20Driver::led_hw_mode(LedMode::On), LED_HW_MODE_FIXED);
        assert_eq!(Hidpp20Driver::led_hw_mode(LedMode::Cycle), LED_HW_MODE_CYCLE);
        assert_eq!(Hidpp20Driver::led_hw_mode(LedMode::Breathing), LED_HW_MODE_BREATHING);
    }
}
