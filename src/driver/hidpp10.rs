//! Component B: the HID++ 1.0 channel. Register-addressed short (7 byte)
//! and long (20 byte) request/response frames, shared by every Logitech
//! driver that still speaks the older register protocol (receivers, wired
//! G-series mice, and the HID++ 1.0 side of wireless Unifying peripherals).
//!
//! This module only knows how to move bytes to and from a register
//! address; it has no opinion about what a register *means* — that's each
//! driver's job, the same way the design separates "protocol library"
//! from "vendor driver".

use std::time::Duration;

use tracing::{debug, trace};

use crate::driver::hidpp::{self, HidppReport, DEVICE_IDX_WIRED};
use crate::error::{RatbagError, Result};
use crate::transport::Transport;

/// `GET_REGISTER`/`SET_REGISTER` address short frames (7 bytes).
const SUB_ID_SET_REGISTER: u8 = 0x80;
const SUB_ID_GET_REGISTER: u8 = 0x81;
/// `GET_LONG_REGISTER`/`SET_LONG_REGISTER` address long frames (20 bytes).
const SUB_ID_SET_LONG_REGISTER: u8 = 0x82;
const SUB_ID_GET_LONG_REGISTER: u8 = 0x83;

/// Registers used by receiver enumeration.
const PAIRING_INFO_DEVICE_NAME: u8 = 0x40;
const PAIRING_INFO_EXTENDED: u8 = 0x30;
const PAIRING_INFO_BASE: u8 = 0x20;
const REG_ENABLE_NOTIFICATIONS: u8 = 0x00;

/// Wireless receivers address paired peripherals at index 1..=6; 0xff
/// always means "the receiver itself".
pub const RECEIVER_INDEX: u8 = 0xff;

/// `protocol(busy)`/`protocol(invalid-param-value)` — the two error codes
/// the design calls out as ones a caller may retry after a short delay.
pub const ERROR_BUSY: u8 = 0x09;
pub const ERROR_INVALID_PARAM_VALUE: u8 = 0x0b;

const MAX_RETRIES_ON_BUSY: u8 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(15);

/// Thin, stateless wrapper around a [`Transport`] that speaks HID++ 1.0.
/// Cheap to construct per-call; drivers typically stash the
/// `device_index` (and any cached registers) inside their
/// `driver_private` state and rebuild one of these per operation.
pub struct Hidpp10Channel<'t> {
    transport: &'t Transport,
    device_index: u8,
}

/// A peripheral discovered by [`Hidpp10Channel::enumerate`]. Identity is
/// kept (pid, device type, serial, name) rather than the index, because
/// the design requires equality across enumerations to survive index
/// reassignment on a wireless receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    pub index: u8,
    pub product_id: u16,
    pub device_type: u8,
    pub serial: [u8; 4],
    pub name: String,
}

impl<'t> Hidpp10Channel<'t> {
    pub fn new(transport: &'t Transport, device_index: u8) -> Self {
        Self { transport, device_index }
    }

    pub fn wired(transport: &'t Transport) -> Self {
        Self::new(transport, DEVICE_IDX_WIRED)
    }

    pub fn device_index(&self) -> u8 {
        self.device_index
    }

    /// `GET_REGISTER` (short frame, 3-byte payload).
    pub fn get_register(&self, address: u8, params: [u8; 2]) -> Result<[u8; 3]> {
        self.short_request(SUB_ID_GET_REGISTER, address, params)
    }

    /// `SET_REGISTER` (short frame, 3-byte payload echoed back).
    pub fn set_register(&self, address: u8, params: [u8; 2]) -> Result<[u8; 3]> {
        self.short_request(SUB_ID_SET_REGISTER, address, params)
    }

    /// `GET_LONG_REGISTER` (long frame, 16-byte payload).
    pub fn get_long_register(&self, address: u8) -> Result<[u8; 16]> {
        self.long_request(SUB_ID_GET_LONG_REGISTER, address, [0u8; 16])
    }

    /// `SET_LONG_REGISTER` (long frame, 16-byte payload echoed back).
    pub fn set_long_register(&self, address: u8, data: [u8; 16]) -> Result<[u8; 16]> {
        self.long_request(SUB_ID_SET_LONG_REGISTER, address, data)
    }

    fn short_request(&self, sub_id: u8, address: u8, params: [u8; 2]) -> Result<[u8; 3]> {
        let dev = self.device_index;
        for attempt in 0..=MAX_RETRIES_ON_BUSY {
            let request = hidpp::build_short_report(dev, sub_id, [address, params[0], params[1]]);
            let result = self.transport.request(
                &request,
                7,
                Transport::default_read_budget(),
                |buf| match_short_reply(buf, dev, sub_id, address),
            );
            match result {
                Err(RatbagError::Protocol { code }) if code.0 == ERROR_BUSY && attempt < MAX_RETRIES_ON_BUSY => {
                    debug!("HID++1.0 register {address:#04x} busy, retrying");
                    std::thread::sleep(RETRY_DELAY);
                    continue;
                }
                Err(RatbagError::Protocol { code }) if code.0 == ERROR_BUSY => {
                    return Err(RatbagError::Timeout { attempts: u32::from(MAX_RETRIES_ON_BUSY) + 1 });
                }
                other => return other,
            }
        }
        unreachable!("loop always returns")
    }

    fn long_request(&self, sub_id: u8, address: u8, data: [u8; 16]) -> Result<[u8; 16]> {
        let dev = self.device_index;
        let mut buf = [0u8; 20];
        buf[0] = hidpp::REPORT_ID_LONG;
        buf[1] = dev;
        buf[2] = sub_id;
        buf[3] = address;
        buf[4..20].copy_from_slice(&data);
        self.transport.request(&buf, 20, Transport::default_read_budget(), |reply| {
            match_long_reply(reply, dev, sub_id, address)
        })
    }

    /// Iterate paired-device indexes 1..=6 on a wireless receiver, skipping
    /// any that return an error (the design's "indexes that return error
    /// are skipped"). Returns devices in ascending index order.
    pub fn enumerate(&self) -> Result<Vec<PairedDevice>> {
        let receiver = Hidpp10Channel::new(self.transport, RECEIVER_INDEX);
        // Ensure wireless-status notifications are enabled so pairing
        // registers are populated; ignore failure, some receivers don't
        // require it.
        let _ = receiver.set_register(REG_ENABLE_NOTIFICATIONS, [0x00, 0x00]);

        let mut devices = Vec::new();
        for index in 1..=6u8 {
            let channel = Hidpp10Channel::new(self.transport, index);
            let base = match channel.get_long_register(PAIRING_INFO_BASE) {
                Ok(data) => data,
                Err(_) => continue,
            };
            let extended = channel.get_long_register(PAIRING_INFO_EXTENDED).unwrap_or([0u8; 16]);
            let name_reg = match channel.get_long_register(PAIRING_INFO_DEVICE_NAME) {
                Ok(data) => data,
                Err(_) => continue,
            };

            let product_id = u16::from_be_bytes([base[2], base[3]]);
            let device_type = base[1];
            let serial = [extended[1], extended[2], extended[3], extended[4]];
            let name_len = (name_reg[1] as usize).min(14);
            let name = String::from_utf8_lossy(&name_reg[2..2 + name_len]).into_owned();

            trace!("HID++1.0 receiver: paired device at index {index}: {name}");
            devices.push(PairedDevice { index, product_id, device_type, serial, name });
        }
        Ok(devices)
    }
}

/// Compare two enumeration results by the identity the design specifies —
/// `(pid, type, serial, name)` — rather than by index, which a receiver is
/// free to reassign between scans.
pub fn same_paired_device(a: &PairedDevice, b: &PairedDevice) -> bool {
    a.product_id == b.product_id
        && a.device_type == b.device_type
        && a.serial == b.serial
        && a.name == b.name
}

fn match_short_reply(buf: &[u8], dev: u8, sub_id: u8, address: u8) -> Option<Result<[u8; 3]>> {
    let report = HidppReport::parse(buf)?;
    match report {
        HidppReport::Short { device_index, sub_id: got_sub, params } if device_index == dev => {
            if got_sub == hidpp::HIDPP10_ERROR && params[0] == sub_id && params[1] == address {
                return Some(Err(RatbagError::protocol(params[2])));
            }
            if got_sub == sub_id {
                return Some(Ok(params));
            }
            None
        }
        _ => None,
    }
}

fn match_long_reply(buf: &[u8], dev: u8, sub_id: u8, address: u8) -> Option<Result<[u8; 16]>> {
    let report = HidppReport::parse(buf)?;
    match report {
        HidppReport::Long { device_index, sub_id: got_sub, address: got_addr, params } if device_index == dev => {
            if got_sub == hidpp::HIDPP10_ERROR {
                // Long-frame error replies reuse the short layout in the
                // first three parameter bytes: [sub_id, address, code].
                if got_addr == sub_id && params[0] == address {
                    return Some(Err(RatbagError::protocol(params[1])));
                }
                return None;
            }
            if got_sub == sub_id && got_addr == address {
                return Some(Ok(params));
            }
            None
        }
        _ => None,
    }
}

/// `GET_REGISTER`/`SET_REGISTER` address used for the single DPI value on
/// wired HID++ 1.0 mice of this era (params: `[dpi_lo, dpi_hi]`, in raw
/// sensor counts, no separate x/y). Not standardized across every HID++
/// 1.0 device that ever shipped; see the driver-level decision recorded
/// alongside this module.
const REG_SENSOR_DPI: u8 = 0x63;
/// Current-profile-index register on devices with onboard memory. Params
/// `[profile, 0x00]`; a device that reports only one profile never needs
/// this register written.
const REG_CURRENT_PROFILE: u8 = 0x51;
/// Simple on/off LED register; params `[0x01, 0x00]` for on, `[0x00, 0x00]`
/// for off. Devices without an addressable LED simply never receive this
/// register.
const REG_LED_STATE: u8 = 0x54;

const HIDPP10_DPI_MIN: u32 = 400;
const HIDPP10_DPI_MAX: u32 = 8200;
const HIDPP10_DPI_STEP: u32 = 50;

fn dpi_to_raw(dpi: u32) -> u16 {
    (dpi / HIDPP10_DPI_STEP) as u16
}

fn raw_to_dpi(raw: u16) -> u32 {
    u32::from(raw) * HIDPP10_DPI_STEP
}

/// Driver-private state cached between `probe` and later calls: the
/// device index this peripheral was found at (`0x00` for a wired device,
/// `1..=6` for a peripheral behind a receiver) and whether the device
/// exposes onboard profile switching at all.
struct Hidpp10State {
    device_index: u8,
    has_onboard_profiles: bool,
}

/// HID++ 1.0 register driver. Unlike [`super::hidpp20::Hidpp20Driver`]
/// there is no self-describing feature table to probe here — a register
/// protocol device either answers the registers this driver knows about
/// or it doesn't, so `probe` degrades to a single always-present profile
/// when the onboard-profile register is absent rather than failing.
pub struct Hidpp10Driver;

impl Hidpp10Driver {
    pub fn new() -> Self {
        Self
    }

    fn channel<'t>(&self, transport: &'t Transport, device: &crate::model::Device) -> Hidpp10Channel<'t> {
        let device_index = device
            .with_driver_state(|s: &Hidpp10State| s.device_index)
            .unwrap_or(DEVICE_IDX_WIRED);
        Hidpp10Channel::new(transport, device_index)
    }
}

impl Default for Hidpp10Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for Hidpp10Driver {
    fn id(&self) -> &'static str {
        "hidpp10"
    }

    fn probe(
        &self,
        device: &crate::model::Device,
        transport: &Transport,
        _entry: &crate::datastore::DataStoreEntry,
    ) -> Result<()> {
        let device_index = DEVICE_IDX_WIRED;
        let channel = Hidpp10Channel::new(transport, device_index);

        let has_onboard_profiles = channel.get_register(REG_CURRENT_PROFILE, [0x00, 0x00]).is_ok();
        let num_profiles = 1;

        let mut caps = crate::model::Capabilities::empty();
        caps.insert(crate::model::Capability::LedOn);
        if has_onboard_profiles {
            caps.insert(crate::model::Capability::WriteNeedsActiveProfile);
        }

        device.init_profiles(
            num_profiles,
            &crate::model::ProfileLayout {
                num_resolutions: 1,
                num_buttons: 0,
                num_leds: 1,
                profile_capabilities: caps,
                resolution_source: crate::model::DpiSource::Range {
                    min: HIDPP10_DPI_MIN,
                    max: HIDPP10_DPI_MAX,
                    step: HIDPP10_DPI_STEP,
                },
                resolution_capabilities: crate::model::Capabilities::empty(),
                button_permitted: vec![crate::model::ActionType::None],
                led_capabilities: crate::model::Capabilities::single(crate::model::Capability::LedOn),
            },
        );

        device.set_driver_state(Hidpp10State { device_index, has_onboard_profiles });
        debug!("hidpp10: probed device index {device_index:#04x}, onboard_profiles={has_onboard_profiles}");
        Ok(())
    }

    fn remove(&self, device: &crate::model::Device) -> Result<()> {
        device.take_driver_state::<Hidpp10State>();
        Ok(())
    }

    fn commit(&self, device: &crate::model::Device, transport: &Transport, profile: &crate::model::Profile) -> Result<()> {
        let channel = self.channel(transport, device);

        for resolution in profile.resolutions() {
            if !resolution.is_dirty() {
                continue;
            }
            let crate::model::Dpi::Unified(dpi) = resolution.dpi() else {
                return Err(RatbagError::Unsupported("hidpp10 does not support separate x/y dpi"));
            };
            let raw = dpi_to_raw(dpi);
            channel.set_register(REG_SENSOR_DPI, raw.to_le_bytes())?;
        }

        for led in profile.leds() {
            if !led.is_dirty() {
                continue;
            }
            let on = !matches!(led.mode(), crate::model::LedMode::Off);
            channel.set_register(REG_LED_STATE, [u8::from(on), 0x00])?;
        }

        Ok(())
    }

    fn set_active_profile(&self, device: &crate::model::Device, transport: &Transport, profile: &crate::model::Profile) -> Result<()> {
        let has_onboard_profiles = device.with_driver_state(|s: &Hidpp10State| s.has_onboard_profiles).unwrap_or(false);
        if !has_onboard_profiles {
            return Ok(());
        }
        let channel = self.channel(transport, device);
        channel.set_register(REG_CURRENT_PROFILE, [profile.index() as u8, 0x00])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_round_trips_through_raw_steps() {
        assert_eq!(raw_to_dpi(dpi_to_raw(800)), 800);
        assert_eq!(dpi_to_raw(400), 8);
    }

    #[test]
    fn short_reply_matches_header() {
        let buf = [0x10, 0x01, 0x81, 0x0d, 0x11, 0x22, 0x33];
        let result = match_short_reply(&buf, 0x01, 0x81, 0x0d);
        assert_eq!(result.unwrap().unwrap(), [0x11, 0x22, 0x33]);
    }

    #[test]
    fn short_reply_decodes_error_frame() {
        // `10 01 8f 81 0d 03 00`: error, sub_id=0x81 (GET_REGISTER), addr=0x0d, code=0x03.
        let buf = [0x10, 0x01, 0x8f, 0x81, 0x0d, 0x03, 0x00];
        let result = match_short_reply(&buf, 0x01, 0x81, 0x0d).unwrap();
        let err = result.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
        assert!(matches!(err, RatbagError::Protocol { code } if code.0 == 0x03));
    }

    #[test]
    fn short_reply_ignores_other_device_index() {
        let buf = [0x10, 0x02, 0x81, 0x0d, 0x11, 0x22, 0x33];
        assert!(match_short_reply(&buf, 0x01, 0x81, 0x0d).is_none());
    }

    #[test]
    fn same_paired_device_ignores_index() {
        let a = PairedDevice {
            index: 1,
            product_id: 0xc53a,
            device_type: 2,
            serial: [1, 2, 3, 4],
            name: "G502".into(),
        };
        let mut b = a.clone();
        b.index = 3;
        assert!(same_paired_device(&a, &b));
        b.serial[0] = 9;
        assert!(!same_paired_device(&a, &b));
    }
}
