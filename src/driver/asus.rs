//! Asus ROG mouse driver.
//!
//! Targets ROG gaming mice speaking the Asus HID protocol: 64-byte raw
//! output/input report pairs, one command word per request, device
//! quirks (double DPI scaling, separate X/Y DPI, a secondary button
//! group) selected per model via the `.device` file's `Quirks=` field.

use crate::datastore::DataStoreEntry;
use crate::error::{RatbagError, Result};
use crate::model::{
    Action, ActionType, Capabilities, Capability, Device, Dpi, DpiSource, LedMode, Profile,
    ProfileLayout, Rgb, SpecialAction,
};
use crate::transport::Transport;

const ASUS_PACKET_SIZE: usize = 64;

const ASUS_STATUS_ERROR: u16 = 0xaaff;

const ASUS_CMD_GET_LED_DATA: u16 = 0x0312;
const ASUS_CMD_GET_SETTINGS: u16 = 0x0412;
const ASUS_CMD_GET_BUTTON_DATA: u16 = 0x0512;
const ASUS_CMD_GET_PROFILE_DATA: u16 = 0x0012;
const ASUS_CMD_SET_LED: u16 = 0x2851;
const ASUS_CMD_SET_SETTING: u16 = 0x3151;
const ASUS_CMD_SET_BUTTON: u16 = 0x2151;
const ASUS_CMD_SET_PROFILE: u16 = 0x0250;
const ASUS_CMD_SAVE: u16 = 0x0350;

const ASUS_FIELD_RATE: u8 = 0;
const ASUS_FIELD_RESPONSE: u8 = 1;
const ASUS_FIELD_SNAPPING: u8 = 2;

const ASUS_ACTION_TYPE_KEY: u8 = 0;
const ASUS_ACTION_TYPE_BUTTON: u8 = 1;
const ASUS_BUTTON_CODE_DISABLED: u8 = 0xff;

const ASUS_MAX_NUM_BUTTON: usize = 17;
const ASUS_MAX_NUM_BUTTON_GROUP: usize = 2;
const ASUS_MAX_NUM_LED: usize = 3;
const ASUS_MAX_NUM_LED_MODES: usize = 7;

const ASUS_QUIRK_DOUBLE_DPI: u32 = 1 << 0;
const ASUS_QUIRK_STRIX_PROFILE: u32 = 1 << 1;
const ASUS_QUIRK_RAW_BRIGHTNESS: u32 = 1 << 3;
const ASUS_QUIRK_SEPARATE_XY_DPI: u32 = 1 << 4;
const ASUS_QUIRK_SEPARATE_LEDS: u32 = 1 << 5;
const ASUS_QUIRK_BUTTONS_SECONDARY: u32 = 1 << 6;

static ASUS_POLLING_RATES: &[u32] = &[125, 250, 500, 1000];
static ASUS_DEBOUNCE_TIMES: &[u32] = &[4, 8, 12, 16, 20, 24, 28, 32];

static ASUS_DEFAULT_BUTTON_MAPPING: &[u8] = &[0xf0, 0xf1, 0xf2, 0xe4, 0xe5, 0xe6, 0xe8, 0xe9];

const ASUS_DEFAULT_LED_MODES: [LedMode; ASUS_MAX_NUM_LED_MODES] = [
    LedMode::On,
    LedMode::Breathing,
    LedMode::Cycle,
    LedMode::On,
    LedMode::On,
    LedMode::On,
    LedMode::On,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AsusButtonKind {
    None,
    Button(u32),
    Special(u32),
    Joystick,
}

struct AsusButtonEntry {
    asus_code: u8,
    kind: AsusButtonKind,
}

const SPECIAL_WHEEL_UP: u32 = 1;
const SPECIAL_WHEEL_DOWN: u32 = 2;
const SPECIAL_WHEEL_RIGHT: u32 = 3;
const SPECIAL_WHEEL_LEFT: u32 = 4;
const SPECIAL_RES_CYCLE_UP: u32 = 5;
const SPECIAL_RES_ALTERNATE: u32 = 6;

fn special_for(value: u32) -> Option<SpecialAction> {
    match value {
        SPECIAL_WHEEL_UP => Some(SpecialAction::WheelUp),
        SPECIAL_WHEEL_DOWN => Some(SpecialAction::WheelDown),
        SPECIAL_WHEEL_RIGHT => Some(SpecialAction::WheelRight),
        SPECIAL_WHEEL_LEFT => Some(SpecialAction::WheelLeft),
        SPECIAL_RES_CYCLE_UP => Some(SpecialAction::ResolutionCycleUp),
        SPECIAL_RES_ALTERNATE => Some(SpecialAction::ResolutionAlternate),
        _ => None,
    }
}

fn value_for_special(action: SpecialAction) -> Option<u32> {
    match action {
        SpecialAction::WheelUp => Some(SPECIAL_WHEEL_UP),
        SpecialAction::WheelDown => Some(SPECIAL_WHEEL_DOWN),
        SpecialAction::WheelRight => Some(SPECIAL_WHEEL_RIGHT),
        SpecialAction::WheelLeft => Some(SPECIAL_WHEEL_LEFT),
        SpecialAction::ResolutionCycleUp => Some(SPECIAL_RES_CYCLE_UP),
        SpecialAction::ResolutionAlternate => Some(SPECIAL_RES_ALTERNATE),
        _ => None,
    }
}

/// Mirrors `ASUS_BUTTON_MAPPING[]`. Order matters: `find_button_by_action`
/// returns the first non-joystick match, so primary buttons come first.
static ASUS_BUTTON_MAPPING: &[AsusButtonEntry] = &[
    AsusButtonEntry { asus_code: 0xf0, kind: AsusButtonKind::Button(0) },
    AsusButtonEntry { asus_code: 0xf1, kind: AsusButtonKind::Button(1) },
    AsusButtonEntry { asus_code: 0xf2, kind: AsusButtonKind::Button(2) },
    AsusButtonEntry { asus_code: 0xe8, kind: AsusButtonKind::Special(SPECIAL_WHEEL_UP) },
    AsusButtonEntry { asus_code: 0xe9, kind: AsusButtonKind::Special(SPECIAL_WHEEL_DOWN) },
    AsusButtonEntry { asus_code: 0xe6, kind: AsusButtonKind::Special(SPECIAL_RES_CYCLE_UP) },
    AsusButtonEntry { asus_code: 0xe4, kind: AsusButtonKind::Button(3) },
    AsusButtonEntry { asus_code: 0xe5, kind: AsusButtonKind::Button(4) },
    AsusButtonEntry { asus_code: 0xe1, kind: AsusButtonKind::Button(3) },
    AsusButtonEntry { asus_code: 0xe2, kind: AsusButtonKind::Button(4) },
    AsusButtonEntry { asus_code: 0xe7, kind: AsusButtonKind::Special(SPECIAL_RES_ALTERNATE) },
    AsusButtonEntry { asus_code: 0xea, kind: AsusButtonKind::None },
    AsusButtonEntry { asus_code: 0xeb, kind: AsusButtonKind::None },
    AsusButtonEntry { asus_code: 0xec, kind: AsusButtonKind::None },
    AsusButtonEntry { asus_code: 0xed, kind: AsusButtonKind::None },
    AsusButtonEntry { asus_code: 0xee, kind: AsusButtonKind::None },
    AsusButtonEntry { asus_code: 0xef, kind: AsusButtonKind::None },
    AsusButtonEntry { asus_code: 0xd0, kind: AsusButtonKind::Joystick },
    AsusButtonEntry { asus_code: 0xd1, kind: AsusButtonKind::Joystick },
    AsusButtonEntry { asus_code: 0xd2, kind: AsusButtonKind::Joystick },
    AsusButtonEntry { asus_code: 0xd3, kind: AsusButtonKind::Joystick },
    AsusButtonEntry { asus_code: 0xd7, kind: AsusButtonKind::Special(SPECIAL_WHEEL_DOWN) },
    AsusButtonEntry { asus_code: 0xd8, kind: AsusButtonKind::Special(SPECIAL_WHEEL_UP) },
    AsusButtonEntry { asus_code: 0xda, kind: AsusButtonKind::Special(SPECIAL_WHEEL_RIGHT) },
    AsusButtonEntry { asus_code: 0xdb, kind: AsusButtonKind::Special(SPECIAL_WHEEL_LEFT) },
];

static ASUS_JOYSTICK_CODES: &[u8] = &[0xd0, 0xd1, 0xd2, 0xd3, 0xd7, 0xd8, 0xda, 0xdb];

const KEY_A: u32 = 30;
const KEY_ENTER: u32 = 28;
const KEY_ESC: u32 = 1;

/// ASUS key-code table: index = ASUS code, value = Linux evdev code, 0 = unmapped.
static ASUS_KEY_MAPPING: &[u32] = &[
    0, 0, 0, 0, KEY_A, 48, 46, 32, 18, 33, 34, 35, 23, 36, 37, 38, 50, 49, 24, 45, 21, 47, 17, 45, 21, 44,
    2, 3, KEY_ENTER, KEY_ESC, 14, 15, 57, 12, 78, 0,
];

fn parse_quirks(quirk_strings: &[String]) -> u32 {
    let mut q = 0u32;
    for s in quirk_strings {
        match s.as_str() {
            "DOUBLE_DPI" => q |= ASUS_QUIRK_DOUBLE_DPI,
            "STRIX_PROFILE" => q |= ASUS_QUIRK_STRIX_PROFILE,
            "RAW_BRIGHTNESS" => q |= ASUS_QUIRK_RAW_BRIGHTNESS,
            "SEPARATE_XY_DPI" => q |= ASUS_QUIRK_SEPARATE_XY_DPI,
            "SEPARATE_LEDS" => q |= ASUS_QUIRK_SEPARATE_LEDS,
            "BUTTONS_SECONDARY" => q |= ASUS_QUIRK_BUTTONS_SECONDARY,
            _ => {}
        }
    }
    q
}

fn dpi_from_stored(stored: u16, quirks: u32) -> u32 {
    let mut val = u32::from(stored) * 50 + 50;
    if quirks & ASUS_QUIRK_DOUBLE_DPI != 0 {
        val *= 2;
    }
    val
}

fn dpi_to_stored(dpi: u32, quirks: u32) -> u8 {
    let adjusted = if quirks & ASUS_QUIRK_DOUBLE_DPI != 0 { dpi / 2 } else { dpi };
    (adjusted.saturating_sub(50) / 50).min(255) as u8
}

fn brightness_to_ratbag(raw: u8, quirks: u32) -> u8 {
    if quirks & ASUS_QUIRK_RAW_BRIGHTNESS != 0 {
        raw
    } else {
        raw.saturating_mul(64)
    }
}

fn brightness_to_asus(ratbag: u8, quirks: u32) -> u8 {
    if quirks & ASUS_QUIRK_RAW_BRIGHTNESS != 0 {
        ratbag
    } else {
        (((u32::from(ratbag) + 32) / 64).min(4)) as u8
    }
}

fn find_button_by_code(code: u8) -> Option<&'static AsusButtonEntry> {
    ASUS_BUTTON_MAPPING.iter().find(|e| e.asus_code == code)
}

fn find_button_by_action(action: &Action, is_joystick: bool) -> Option<&'static AsusButtonEntry> {
    ASUS_BUTTON_MAPPING.iter().find(|e| {
        if is_joystick_code(e.asus_code) != is_joystick {
            return false;
        }
        match (action, &e.kind) {
            (Action::MouseButton(n), AsusButtonKind::Button(code)) => u32::from(*n) == *code,
            (Action::Special(s), AsusButtonKind::Special(n)) => value_for_special(*s) == Some(*n),
            _ => false,
        }
    })
}

fn get_linux_key_code(asus_code: u8) -> Option<u32> {
    let val = ASUS_KEY_MAPPING.get(asus_code as usize).copied().unwrap_or(0);
    if val == 0 {
        None
    } else {
        Some(val)
    }
}

fn find_key_code(linux_code: u32) -> Option<u8> {
    ASUS_KEY_MAPPING.iter().position(|&k| k == linux_code).map(|i| i as u8)
}

fn is_joystick_code(code: u8) -> bool {
    ASUS_JOYSTICK_CODES.contains(&code)
}

fn polling_rate_index(hz: u32) -> Option<u8> {
    ASUS_POLLING_RATES.iter().position(|&r| r == hz).map(|i| i as u8)
}

fn debounce_index(ms: u32) -> Option<u8> {
    ASUS_DEBOUNCE_TIMES.iter().position(|&d| d == ms).map(|i| i as u8)
}

fn parse_led_mode_str(s: &str) -> LedMode {
    if s.eq_ignore_ascii_case("BREATHING") {
        LedMode::Breathing
    } else if s.eq_ignore_ascii_case("CYCLE") {
        LedMode::Cycle
    } else if s.eq_ignore_ascii_case("OFF") {
        LedMode::Off
    } else {
        LedMode::On
    }
}

struct AsusRequest {
    buf: [u8; ASUS_PACKET_SIZE],
}

impl AsusRequest {
    fn new(cmd: u16) -> Self {
        let mut r = Self { buf: [0u8; ASUS_PACKET_SIZE] };
        r.buf[0..2].copy_from_slice(&cmd.to_le_bytes());
        r
    }

    fn set_param(&mut self, idx: usize, val: u8) {
        if let Some(p) = self.buf.get_mut(2 + idx) {
            *p = val;
        }
    }
}

struct AsusResponse {
    buf: [u8; ASUS_PACKET_SIZE],
}

impl Default for AsusResponse {
    fn default() -> Self {
        Self { buf: [0u8; ASUS_PACKET_SIZE] }
    }
}

impl AsusResponse {
    fn status_code(&self) -> u16 {
        u16::from_le_bytes([self.buf[0], self.buf[1]])
    }

    fn result(&self, idx: usize) -> u8 {
        self.buf.get(2 + idx).copied().unwrap_or(0)
    }
}

#[derive(Clone, Copy, Default)]
struct AsusBinding {
    action: u8,
    type_: u8,
}

struct AsusBindingData {
    bindings: [AsusBinding; ASUS_MAX_NUM_BUTTON],
}

impl AsusBindingData {
    fn from_response(resp: &AsusResponse) -> Self {
        let mut data = Self { bindings: [AsusBinding::default(); ASUS_MAX_NUM_BUTTON] };
        for k in 0..ASUS_MAX_NUM_BUTTON {
            data.bindings[k].action = resp.result(2 + k * 2);
            data.bindings[k].type_ = resp.result(3 + k * 2);
        }
        data
    }
}

#[derive(Clone, Copy, Default)]
struct AsusLedEntry {
    mode: u8,
    brightness: u8,
    r: u8,
    g: u8,
    b: u8,
}

struct AsusLedData {
    leds: [AsusLedEntry; ASUS_MAX_NUM_LED],
}

impl AsusLedData {
    fn from_response(resp: &AsusResponse) -> Self {
        let mut leds = [AsusLedEntry::default(); ASUS_MAX_NUM_LED];
        for (i, led) in leds.iter_mut().enumerate() {
            let base = 2 + i * 5;
            *led = AsusLedEntry {
                mode: resp.result(base),
                brightness: resp.result(base + 1),
                r: resp.result(base + 2),
                g: resp.result(base + 3),
                b: resp.result(base + 4),
            };
        }
        Self { leds }
    }
}

struct AsusProfileInfo {
    profile_id: u32,
    dpi_preset: Option<u32>,
    firmware: (u8, u8, u8),
}

struct AsusData {
    is_ready: bool,
    button_mapping: Vec<Option<u8>>,
    led_modes: [LedMode; ASUS_MAX_NUM_LED_MODES],
    quirks: u32,
}

impl AsusData {
    fn has_quirk(&self, quirk: u32) -> bool {
        self.quirks & quirk != 0
    }

    fn from_entry(entry: &DataStoreEntry) -> Self {
        let quirks = parse_quirks(&entry.quirks);
        let slots = ASUS_MAX_NUM_BUTTON * ASUS_MAX_NUM_BUTTON_GROUP;
        let mut button_mapping: Vec<Option<u8>> = (0..slots)
            .map(|i| ASUS_DEFAULT_BUTTON_MAPPING.get(i).copied())
            .collect();
        if let Some(raw) = entry.driver_config.get("ButtonMapping") {
            for (i, code) in parse_hex_list(raw).into_iter().enumerate().take(ASUS_MAX_NUM_BUTTON) {
                button_mapping[i] = Some(code);
            }
        }
        if quirks & ASUS_QUIRK_BUTTONS_SECONDARY != 0 {
            if let Some(raw) = entry.driver_config.get("ButtonMappingSecondary") {
                for (i, code) in parse_hex_list(raw).into_iter().enumerate().take(ASUS_MAX_NUM_BUTTON) {
                    button_mapping[ASUS_MAX_NUM_BUTTON + i] = Some(code);
                }
            }
        }
        let mut led_modes = ASUS_DEFAULT_LED_MODES;
        if let Some(raw) = entry.driver_config.get("LedModes") {
            for (i, s) in raw.split(',').enumerate().take(ASUS_MAX_NUM_LED_MODES) {
                led_modes[i] = parse_led_mode_str(s.trim());
            }
        }
        Self { is_ready: false, button_mapping, led_modes, quirks }
    }
}

fn parse_hex_list(raw: &str) -> Vec<u8> {
    raw.split(',')
        .filter_map(|s| u8::from_str_radix(s.trim().trim_start_matches("0x"), 16).ok())
        .collect()
}

fn query(transport: &Transport, request: &AsusRequest) -> Result<AsusResponse> {
    transport.write_report(&request.buf)?;
    let mut resp = AsusResponse::default();
    let n = transport.read_report(&mut resp.buf)?;
    if n == 0 {
        return Err(RatbagError::Timeout { attempts: 1 });
    }
    if resp.status_code() == ASUS_STATUS_ERROR {
        return Err(RatbagError::protocol(resp.buf[1]));
    }
    Ok(resp)
}

fn get_profile_data(transport: &Transport, quirks: u32) -> Result<AsusProfileInfo> {
    let resp = query(transport, &AsusRequest::new(ASUS_CMD_GET_PROFILE_DATA))?;
    let profile_id =
        if quirks & ASUS_QUIRK_STRIX_PROFILE != 0 { u32::from(resp.result(7)) } else { u32::from(resp.result(8)) };
    let dpi_preset = if resp.result(9) > 0 { Some(u32::from(resp.result(9)) - 1) } else { None };
    Ok(AsusProfileInfo {
        profile_id,
        dpi_preset,
        firmware: (resp.result(13), resp.result(12), resp.result(11)),
    })
}

fn set_profile(transport: &Transport, index: u32) -> Result<()> {
    let mut req = AsusRequest::new(ASUS_CMD_SET_PROFILE);
    req.set_param(0, index as u8);
    query(transport, &req)?;
    Ok(())
}

fn save_profile_cmd(transport: &Transport) -> Result<()> {
    query(transport, &AsusRequest::new(ASUS_CMD_SAVE))?;
    Ok(())
}

fn get_binding_data(transport: &Transport, group: u8) -> Result<AsusBindingData> {
    let mut req = AsusRequest::new(ASUS_CMD_GET_BUTTON_DATA);
    req.set_param(0, group);
    let resp = query(transport, &req)?;
    Ok(AsusBindingData::from_response(&resp))
}

fn set_button_action(transport: &Transport, src: u8, dst: u8, action_type: u8) -> Result<()> {
    let mut req = AsusRequest::new(ASUS_CMD_SET_BUTTON);
    req.set_param(2, src);
    req.set_param(3, ASUS_ACTION_TYPE_BUTTON);
    req.set_param(4, dst);
    req.set_param(5, action_type);
    query(transport, &req)?;
    Ok(())
}

/// DPI/settings response, read unconditionally with the 4-DPI layout; the
/// 2-DPI variant this mouse family also uses packs the same fields two
/// slots earlier, which callers account for via `dpi_count`.
fn get_resolution_data(transport: &Transport, dpi_count: usize) -> Result<([u16; 4], u16, u16, u16)> {
    let req = AsusRequest::new(ASUS_CMD_GET_SETTINGS);
    let resp = query(transport, &req)?;
    if dpi_count <= 2 {
        Ok((
            [u16::from_le_bytes([resp.result(2), resp.result(3)]), u16::from_le_bytes([resp.result(4), resp.result(5)]), 0, 0],
            u16::from_le_bytes([resp.result(6), resp.result(7)]),
            u16::from_le_bytes([resp.result(8), resp.result(9)]),
            u16::from_le_bytes([resp.result(10), resp.result(11)]),
        ))
    } else {
        Ok((
            [
                u16::from_le_bytes([resp.result(2), resp.result(3)]),
                u16::from_le_bytes([resp.result(4), resp.result(5)]),
                u16::from_le_bytes([resp.result(6), resp.result(7)]),
                u16::from_le_bytes([resp.result(8), resp.result(9)]),
            ],
            u16::from_le_bytes([resp.result(10), resp.result(11)]),
            u16::from_le_bytes([resp.result(12), resp.result(13)]),
            u16::from_le_bytes([resp.result(14), resp.result(15)]),
        ))
    }
}

fn get_resolution_xy_data(transport: &Transport) -> Result<[(u16, u16); 4]> {
    let mut req = AsusRequest::new(ASUS_CMD_GET_SETTINGS);
    req.set_param(0, 2);
    let resp = query(transport, &req)?;
    let mut dpi = [(0u16, 0u16); 4];
    for (i, slot) in dpi.iter_mut().enumerate() {
        let base = 2 + i * 4;
        *slot = (u16::from_le_bytes([resp.result(base), resp.result(base + 1)]), u16::from_le_bytes([resp.result(base + 2), resp.result(base + 3)]));
    }
    Ok(dpi)
}

fn set_dpi(transport: &Transport, index: u8, dpi: u32, quirks: u32) -> Result<()> {
    let stored = dpi_to_stored(dpi, quirks);
    let mut req = AsusRequest::new(ASUS_CMD_SET_SETTING);
    req.set_param(0, index);
    req.set_param(2, stored);
    query(transport, &req)?;
    Ok(())
}

fn set_polling_rate(transport: &Transport, hz: u32, dpi_count: u8) -> Result<()> {
    let idx = polling_rate_index(hz).ok_or_else(|| RatbagError::value(format!("unsupported polling rate {hz} Hz")))?;
    let mut req = AsusRequest::new(ASUS_CMD_SET_SETTING);
    req.set_param(0, dpi_count + ASUS_FIELD_RATE);
    req.set_param(2, idx);
    query(transport, &req)?;
    Ok(())
}

fn set_button_response(transport: &Transport, ms: u32, dpi_count: u8) -> Result<()> {
    let idx = debounce_index(ms).ok_or_else(|| RatbagError::value(format!("unsupported debounce time {ms} ms")))?;
    let mut req = AsusRequest::new(ASUS_CMD_SET_SETTING);
    req.set_param(0, dpi_count + ASUS_FIELD_RESPONSE);
    req.set_param(2, idx);
    query(transport, &req)?;
    Ok(())
}

fn set_angle_snapping(transport: &Transport, enabled: bool, dpi_count: u8) -> Result<()> {
    let mut req = AsusRequest::new(ASUS_CMD_SET_SETTING);
    req.set_param(0, dpi_count + ASUS_FIELD_SNAPPING);
    req.set_param(2, u8::from(enabled));
    query(transport, &req)?;
    Ok(())
}

fn get_led_data(transport: &Transport, led_index: u8) -> Result<AsusLedData> {
    let mut req = AsusRequest::new(ASUS_CMD_GET_LED_DATA);
    req.set_param(0, led_index);
    let resp = query(transport, &req)?;
    Ok(AsusLedData::from_response(&resp))
}

fn set_led(transport: &Transport, index: u8, mode: u8, brightness: u8, rgb: Rgb) -> Result<()> {
    let mut req = AsusRequest::new(ASUS_CMD_SET_LED);
    req.set_param(0, index);
    req.set_param(2, mode);
    req.set_param(3, brightness);
    req.set_param(4, rgb.r);
    req.set_param(5, rgb.g);
    req.set_param(6, rgb.b);
    query(transport, &req)?;
    Ok(())
}

pub struct AsusDriver;

impl AsusDriver {
    pub fn new() -> Self {
        Self
    }

    fn load_profile(&self, transport: &Transport, state: &AsusData, profile: &Profile, dpi_preset: Option<u32>) -> Result<()> {
        let dpi_count = profile.resolutions().len();

        let binding = get_binding_data(transport, 0)?;
        let binding_secondary =
            if state.has_quirk(ASUS_QUIRK_BUTTONS_SECONDARY) { Some(get_binding_data(transport, 1)?) } else { None };

        for button in profile.buttons() {
            let dev_idx = button.index() as usize;
            if dev_idx >= state.button_mapping.len() {
                continue;
            }
            let Some(src_code) = state.button_mapping[dev_idx] else { continue };
            let wire = if dev_idx < ASUS_MAX_NUM_BUTTON {
                binding.bindings.get(dev_idx).copied()
            } else {
                binding_secondary.as_ref().and_then(|b| b.bindings.get(dev_idx - ASUS_MAX_NUM_BUTTON)).copied()
            };
            let Some(wire) = wire else { continue };
            let _ = src_code;

            let action = if wire.action == ASUS_BUTTON_CODE_DISABLED {
                Action::None
            } else {
                match wire.type_ {
                    ASUS_ACTION_TYPE_KEY => get_linux_key_code(wire.action).map(Action::Key).unwrap_or(Action::None),
                    ASUS_ACTION_TYPE_BUTTON => match find_button_by_code(wire.action).map(|e| e.kind) {
                        Some(AsusButtonKind::Button(n)) => Action::MouseButton(n as u8),
                        Some(AsusButtonKind::Special(n)) => special_for(n).map(Action::Special).unwrap_or(Action::None),
                        Some(AsusButtonKind::Joystick) => Action::None,
                        _ => Action::None,
                    },
                    _ => Action::None,
                }
            };
            let _ = button.set_action(action, None);
        }

        let (dpis, rate_idx, response_idx, snapping) = get_resolution_data(transport, dpi_count)?;
        let xy_data =
            if state.has_quirk(ASUS_QUIRK_SEPARATE_XY_DPI) { Some(get_resolution_xy_data(transport)?) } else { None };

        let _ = profile.set_report_rate_hz(ASUS_POLLING_RATES.get(rate_idx as usize).copied().unwrap_or(1000));
        if (response_idx as usize) < ASUS_DEBOUNCE_TIMES.len() {
            let _ = profile.set_debounce_ms(ASUS_DEBOUNCE_TIMES[response_idx as usize]);
        }
        let _ = profile.set_angle_snapping(snapping != 0);

        for (i, resolution) in profile.resolutions().iter().enumerate() {
            if let Some(xy) = xy_data.as_ref().and_then(|d| d.get(i)) {
                let _ = resolution.set_dpi_xy(dpi_from_stored(xy.0, state.quirks), dpi_from_stored(xy.1, state.quirks));
            } else {
                let _ = resolution.set_dpi(dpi_from_stored(dpis.get(i).copied().unwrap_or(0), state.quirks));
            }
            if let Some(preset) = dpi_preset {
                if i as u32 == preset {
                    let _ = resolution.set_active();
                }
            }
        }

        let leds = profile.leds();
        if leds.is_empty() {
            return Ok(());
        }

        let bulk = if !state.has_quirk(ASUS_QUIRK_SEPARATE_LEDS) { Some(get_led_data(transport, 0)?) } else { None };

        for led in leds {
            let entry = if state.has_quirk(ASUS_QUIRK_SEPARATE_LEDS) {
                get_led_data(transport, led.index() as u8)?.leds[0]
            } else {
                bulk.as_ref().and_then(|d| d.leds.get(led.index() as usize)).copied().unwrap_or_default()
            };
            let mode = state.led_modes.get(entry.mode as usize).copied().unwrap_or(LedMode::On);
            let _ = led.set_mode(mode);
            let _ = led.set_brightness(brightness_to_ratbag(entry.brightness, state.quirks));
            let _ = led.set_color(Rgb { r: entry.r, g: entry.g, b: entry.b });
        }

        Ok(())
    }

    fn load_all_profiles(&self, transport: &Transport, device: &Device, state: &AsusData) -> Result<()> {
        let info = get_profile_data(transport, state.quirks)?;
        let initial_id = if device.profiles().len() > 1 { info.profile_id } else { 0 };
        device.set_firmware_version(format!("{:02X}.{:02X}.{:02X}", info.firmware.0, info.firmware.1, info.firmware.2));

        for profile in device.profiles() {
            if profile.index() != initial_id {
                set_profile(transport, profile.index())?;
            } else {
                let _ = profile.set_active();
            }
            self.load_profile(transport, state, &profile, info.dpi_preset)?;
            profile.clear_all_dirty();
        }

        if device.profiles().len() > 1 {
            set_profile(transport, initial_id)?;
        }
        Ok(())
    }

    fn save_profile(&self, transport: &Transport, state: &AsusData, profile: &Profile) -> Result<()> {
        let dpi_count = profile.resolutions().len() as u8;

        for button in profile.buttons() {
            if !button.is_dirty() {
                continue;
            }
            let dev_idx = button.index() as usize;
            if dev_idx >= state.button_mapping.len() {
                continue;
            }
            let Some(src_code) = state.button_mapping[dev_idx] else { continue };

            match button.action() {
                Action::None => set_button_action(transport, src_code, ASUS_BUTTON_CODE_DISABLED, ASUS_ACTION_TYPE_BUTTON)?,
                Action::Key(code) => {
                    let key = u8::try_from(code).ok().and_then(find_key_code);
                    if let Some(asus_key) = key {
                        set_button_action(transport, src_code, asus_key, ASUS_ACTION_TYPE_KEY)?;
                    }
                }
                Action::MouseButton(_) | Action::Special(_) => {
                    let action = button.action();
                    let is_joy = is_joystick_code(src_code);
                    let entry = find_button_by_action(&action, is_joy).or_else(|| find_button_by_action(&action, !is_joy));
                    if let Some(e) = entry {
                        set_button_action(transport, src_code, e.asus_code, ASUS_ACTION_TYPE_BUTTON)?;
                    }
                }
                Action::Macro(_) => return Err(RatbagError::Unsupported("asus macro buttons")),
            }
        }

        if profile.is_dirty() {
            set_polling_rate(transport, profile.report_rate_hz(), dpi_count)?;
            if let Some(snapping) = profile.angle_snapping() {
                set_angle_snapping(transport, snapping, dpi_count)?;
            }
            if let Some(debounce) = profile.debounce_ms() {
                set_button_response(transport, debounce, dpi_count)?;
            }
        }

        for resolution in profile.resolutions() {
            if !resolution.is_dirty() {
                continue;
            }
            let dpi = match resolution.dpi() {
                Dpi::Unified(v) => v,
                Dpi::Separate { x, .. } => x,
            };
            set_dpi(transport, resolution.index() as u8, dpi, state.quirks)?;
        }

        for led in profile.leds() {
            if !led.is_dirty() {
                continue;
            }
            let asus_mode = state.led_modes.iter().position(|&m| m == led.mode()).unwrap_or(0) as u8;
            let brightness = brightness_to_asus(led.brightness(), state.quirks);
            set_led(transport, led.index() as u8, asus_mode, brightness, led.color())?;
        }

        Ok(())
    }
}

impl Default for AsusDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::DeviceDriver for AsusDriver {
    fn id(&self) -> &'static str {
        "asus"
    }

    fn probe(&self, device: &Device, transport: &Transport, entry: &DataStoreEntry) -> Result<()> {
        let mut state = AsusData::from_entry(entry);

        let num_profiles = entry.num_profiles.unwrap_or(1) as usize;
        let num_buttons = entry.num_buttons.unwrap_or(8) as usize;
        let num_leds = entry.num_leds.unwrap_or(1) as usize;

        let mut caps = Capabilities::empty();
        caps.insert(Capability::WriteNeedsActiveProfile);

        let resolution_source = match (&entry.dpis, &entry.dpi_range) {
            (Some(list), _) => DpiSource::List(list.clone()),
            (None, Some(range)) => DpiSource::Range { min: range.min, max: range.max, step: range.step },
            (None, None) => DpiSource::Range { min: 50, max: 12_000, step: 50 },
        };
        let resolution_capabilities =
            if state.has_quirk(ASUS_QUIRK_SEPARATE_XY_DPI) { Capabilities::single(Capability::SeparateXyDpi) } else { Capabilities::empty() };

        device.init_profiles(
            num_profiles,
            &ProfileLayout {
                num_resolutions: entry.dpis.as_ref().map(Vec::len).unwrap_or(4).max(1),
                num_buttons,
                num_leds,
                profile_capabilities: caps,
                resolution_source,
                resolution_capabilities,
                button_permitted: vec![ActionType::None, ActionType::MouseButton, ActionType::Key, ActionType::Special],
                led_capabilities: [Capability::LedOn, Capability::LedBreathing, Capability::LedCycle]
                    .into_iter()
                    .collect(),
            },
        );

        match self.load_all_profiles(transport, device, &state) {
            Ok(()) => state.is_ready = true,
            Err(_) => state.is_ready = false,
        }

        device.set_driver_state(state);
        Ok(())
    }

    fn remove(&self, device: &Device) -> Result<()> {
        device.take_driver_state::<AsusData>();
        Ok(())
    }

    fn commit(&self, device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        let ready = device.with_driver_state(|s: &mut AsusData| s.is_ready).unwrap_or(false);

        if !ready {
            // A sleeping/disconnected wireless mouse fails probe without
            // erroring; retry hardware discovery here. Mirrors the
            // original driver's choice of recovering state but still
            // aborting this commit rather than racing a write against a
            // device that just woke up.
            let recovered = device
                .with_driver_state(|s: &mut AsusData| self.load_all_profiles(transport, device, s).is_ok())
                .unwrap_or(false);
            device.with_driver_state(|s: &mut AsusData| s.is_ready = recovered);
            return Err(RatbagError::device("asus device was not ready; commit aborted after recovery reload"));
        }

        let snapshot = device
            .with_driver_state(|s: &mut AsusData| AsusData {
                is_ready: true,
                button_mapping: s.button_mapping.clone(),
                led_modes: s.led_modes,
                quirks: s.quirks,
            })
            .ok_or_else(|| RatbagError::device("asus driver state missing"))?;

        self.save_profile(transport, &snapshot, profile)?;
        save_profile_cmd(transport)?;
        Ok(())
    }

    fn set_active_profile(&self, _device: &Device, transport: &Transport, profile: &Profile) -> Result<()> {
        set_profile(transport, profile.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_roundtrip() {
        for &dpi in &[100u32, 400, 800, 1600, 3200, 6400, 12000] {
            let stored = dpi_to_stored(dpi, 0);
            assert_eq!(dpi_from_stored(u16::from(stored), 0), dpi);
        }
    }

    #[test]
    fn dpi_roundtrip_double_dpi() {
        for &dpi in &[200u32, 800, 1600, 3200, 6400, 12800] {
            let stored = dpi_to_stored(dpi, ASUS_QUIRK_DOUBLE_DPI);
            assert_eq!(dpi_from_stored(u16::from(stored), ASUS_QUIRK_DOUBLE_DPI), dpi);
        }
    }

    #[test]
    fn find_button_by_code_left() {
        let e = find_button_by_code(0xf0).unwrap();
        assert_eq!(e.kind, AsusButtonKind::Button(0));
    }

    #[test]
    fn find_button_by_action_joystick_prefers_axis_code() {
        let e = find_button_by_action(&Action::Special(SpecialAction::WheelUp), true).unwrap();
        assert_eq!(e.asus_code, 0xd8);
    }

    #[test]
    fn key_code_round_trips() {
        let asus = find_key_code(KEY_A).unwrap();
        assert_eq!(get_linux_key_code(asus), Some(KEY_A));
    }

    #[test]
    fn brightness_roundtrips_within_one_step() {
        for &b in &[0u8, 64, 128, 192] {
            let asus = brightness_to_asus(b, 0);
            let back = brightness_to_ratbag(asus, 0);
            assert!((i32::from(back) - i32::from(b)).abs() <= 32);
        }
    }

    #[test]
    fn parse_quirks_combines_flags() {
        let q = parse_quirks(&["DOUBLE_DPI".to_string(), "STRIX_PROFILE".to_string()]);
        assert!(q & ASUS_QUIRK_DOUBLE_DPI != 0);
        assert!(q & ASUS_QUIRK_STRIX_PROFILE != 0);
        assert!(q & ASUS_QUIRK_SEPARATE_LEDS == 0);
    }

    #[test]
    fn request_encodes_command_little_endian() {
        let req = AsusRequest::new(ASUS_CMD_GET_PROFILE_DATA);
        assert_eq!(req.buf[0], 0x12);
        assert_eq!(req.buf[1], 0x00);
    }
}
