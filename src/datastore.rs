//! The data store: the consumed collaborator (§6) that maps a hardware
//! identity to a driver id plus the static limits that identity implies
//! (profile/button/LED counts, DPI list or range). The core only defines
//! the [`DataStore`] trait and matching types; a concrete `.device`-file
//! backed implementation ships here too so the crate is usable end to end
//! without an embedder having to write their own.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use tracing::warn;

use crate::error::{RatbagError, Result};
use crate::model::{BusType, DeviceIdentity};

/// A contiguous DPI range with a granularity step, as written in a
/// `.device` file's `DpiRange = min:max@step` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpiRange {
    pub min: u32,
    pub max: u32,
    pub step: u32,
}

/// Everything the data store knows about one hardware identity. Every
/// field beyond `driver_id`/`name` is optional because not every driver
/// needs static config — some devices self-describe their limits during
/// probe.
#[derive(Debug, Clone, Default)]
pub struct DataStoreEntry {
    pub driver_id: String,
    pub name: String,
    pub num_profiles: Option<u32>,
    pub num_buttons: Option<u32>,
    pub num_leds: Option<u32>,
    pub dpis: Option<Vec<u32>>,
    pub dpi_range: Option<DpiRange>,
    pub wireless: bool,
    /// Free-form quirk names from the `[Driver] Quirks=` key (e.g.
    /// `DOUBLE_DPI`, `SEPARATE_XY_DPI`). The core does not interpret these;
    /// each vendor driver parses the subset it understands into its own
    /// bitmask, per the design's "quirks are data, not code paths" note.
    pub quirks: Vec<String>,
    /// Every other `[Driver]` key, verbatim, for driver-specific config
    /// that has no generic home here (button-code remaps, LED mode tables,
    /// and the like). Keys are case-sensitive as written in the file.
    pub driver_config: HashMap<String, String>,
}

/// One `bus:vid:pid` match line; several may resolve to the same entry
/// (wired and wireless variants of the same mouse, for instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceMatch {
    pub bus: BusType,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Resolves a probed hardware identity to its static configuration. The
/// core never assumes a `.device` file exists on disk; an embedder may
/// supply an entirely different backing store (a compiled-in table, a
/// remote config service) by implementing this trait directly.
pub trait DataStore {
    fn lookup(&self, identity: &DeviceIdentity) -> Option<DataStoreEntry>;
}

/// An in-memory store built from parsed `.device` INI files, keyed by
/// `(bus, vendor, product)`. Ported from the teacher's device database
/// reader; unlike the daemon's version this is loaded eagerly and never
/// watches the filesystem for changes, matching this crate's single-shot,
/// caller-driven probe flow.
pub struct IniDataStore {
    by_match: HashMap<(BusType, u16, u16), DataStoreEntry>,
}

impl IniDataStore {
    pub fn empty() -> Self {
        IniDataStore { by_match: HashMap::new() }
    }

    /// Load every `*.device` file directly under `dir` (non-recursive, as
    /// libratbag's own data directory layout is flat).
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut store = Self::empty();
        let entries = std::fs::read_dir(dir).map_err(|e| RatbagError::io(dir.display().to_string(), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| RatbagError::io(dir.display().to_string(), e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("device") {
                continue;
            }
            if let Err(e) = store.load_file(&path) {
                warn!("skipping malformed device file {}: {e}", path.display());
            }
        }
        Ok(store)
    }

    /// `$LIBRATBAG_DATA_DIR` if set, falling back to the conventional
    /// install path, matching the lookup order the daemon uses.
    pub fn load_default() -> Result<Self> {
        let dir = std::env::var("LIBRATBAG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/usr/share/libratbag"));
        Self::load_dir(&dir)
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let mut ini = Ini::new();
        ini.load(path).map_err(|e| RatbagError::value(format!("{}: {e}", path.display())))?;

        let name = ini
            .get("Device", "Name")
            .ok_or_else(|| RatbagError::value("missing [Device] Name"))?;
        let driver_id = ini
            .get("Device", "Driver")
            .ok_or_else(|| RatbagError::value("missing [Device] Driver"))?;
        let matches_str = ini
            .get("Device", "DeviceMatch")
            .ok_or_else(|| RatbagError::value("missing [Device] DeviceMatch"))?;

        let num_profiles = ini.getuint("Device", "Profiles").ok().flatten().map(|v| v as u32);
        let num_buttons = ini.getuint("Device", "Buttons").ok().flatten().map(|v| v as u32);
        let num_leds = ini.getuint("Device", "Leds").ok().flatten().map(|v| v as u32);
        let wireless = ini.getbool("Device", "Wireless").ok().flatten().unwrap_or(false);

        let dpis = ini.get("Dpi", "Dpis").map(|s| parse_dpi_list(&s));
        let dpi_range = ini.get("Dpi", "DpiRange").and_then(|s| parse_dpi_range(&s).ok());

        let quirks = ini
            .get("Driver", "Quirks")
            .map(|s| s.split(';').map(|q| q.trim().to_string()).filter(|q| !q.is_empty()).collect())
            .unwrap_or_default();

        // `configparser` only exposes section contents through `get`, not
        // enumeration, so the generic bag is populated from the fixed set
        // of keys the shipped vendor drivers actually consult (button-code
        // remaps, LED mode tables, and protocol selectors that vary per
        // model but aren't common enough to deserve a dedicated
        // `DataStoreEntry` field). Keys are stored verbatim since drivers
        // look them up by their exact `.device`-file spelling.
        let mut driver_config = HashMap::new();
        for key in
            ["ButtonMapping", "ButtonMappingSecondary", "LedModes", "DeviceIndex", "Protocol"]
        {
            if let Some(value) = ini.get("Driver", key) {
                driver_config.insert(key.to_string(), value);
            }
        }

        let entry = DataStoreEntry {
            driver_id,
            name,
            num_profiles,
            num_buttons,
            num_leds,
            dpis,
            dpi_range,
            wireless,
            quirks,
            driver_config,
        };

        for m in parse_device_matches(&matches_str) {
            self.by_match.insert((m.bus, m.vendor_id, m.product_id), entry.clone());
        }
        Ok(())
    }
}

impl DataStore for IniDataStore {
    fn lookup(&self, identity: &DeviceIdentity) -> Option<DataStoreEntry> {
        self.by_match
            .get(&(identity.bus, identity.vendor_id, identity.product_id))
            .cloned()
    }
}

fn parse_device_matches(s: &str) -> Vec<DeviceMatch> {
    s.split(';')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let mut it = part.split(':');
            let bus = match it.next()? {
                "usb" => BusType::Usb,
                "bluetooth" => BusType::Bluetooth,
                other => BusType::Unknown(other.parse().unwrap_or(0)),
            };
            let vid = u16::from_str_radix(it.next()?.trim_start_matches("0x"), 16).ok()?;
            let pid = u16::from_str_radix(it.next()?.trim_start_matches("0x"), 16).ok()?;
            Some(DeviceMatch { bus, vendor_id: vid, product_id: pid })
        })
        .collect()
}

fn parse_dpi_list(s: &str) -> Vec<u32> {
    s.split(';').filter_map(|v| v.trim().parse().ok()).collect()
}

fn parse_dpi_range(s: &str) -> Result<DpiRange> {
    let (bounds, step) = s
        .split_once('@')
        .ok_or_else(|| RatbagError::value("DpiRange missing '@step'"))?;
    let (min, max) = bounds
        .split_once(':')
        .ok_or_else(|| RatbagError::value("DpiRange missing 'min:max'"))?;
    let min: u32 = min.parse().map_err(|_| RatbagError::value("bad DpiRange min"))?;
    let max: u32 = max.parse().map_err(|_| RatbagError::value("bad DpiRange max"))?;
    let step: u32 = step.trim().parse().map_err(|_| RatbagError::value("bad DpiRange step"))?;
    if step == 0 {
        return Err(RatbagError::value("DpiRange step cannot be 0"));
    }
    if min > max {
        return Err(RatbagError::value("DpiRange min > max"));
    }
    Ok(DpiRange { min, max, step })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_semicolon_separated_matches() {
        let matches = parse_device_matches("usb:0x1038:0x1724;usb:0x1038:0x1726");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].vendor_id, 0x1038);
        assert_eq!(matches[1].product_id, 0x1726);
    }

    #[test]
    fn dpi_range_rejects_zero_step() {
        assert!(parse_dpi_range("100:8000@0").is_err());
    }

    #[test]
    fn dpi_range_rejects_inverted_bounds() {
        assert!(parse_dpi_range("8000:100@50").is_err());
    }

    #[test]
    fn dpi_range_parses_valid_input() {
        let r = parse_dpi_range("100:8000@50").unwrap();
        assert_eq!(r, DpiRange { min: 100, max: 8000, step: 50 });
    }

    #[test]
    fn loads_quirks_and_driver_config_from_file() {
        let dir = std::env::temp_dir().join(format!("libratbag-core-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.device");
        std::fs::write(
            &path,
            "[Device]\nName=Sample Mouse\nDriver=asus\nDeviceMatch=usb:0x0b05:0x1234\n\n\
             [Driver]\nQuirks=DOUBLE_DPI;SEPARATE_XY_DPI\nLedModes=ON;BREATHING;CYCLE\n",
        )
        .unwrap();

        let store = IniDataStore::load_dir(&dir).unwrap();
        let entry = store
            .lookup(&DeviceIdentity {
                bus: BusType::Usb,
                vendor_id: 0x0b05,
                product_id: 0x1234,
                version: 0,
            })
            .unwrap();
        assert_eq!(entry.quirks, vec!["DOUBLE_DPI", "SEPARATE_XY_DPI"]);
        assert_eq!(entry.driver_config.get("LedModes").unwrap(), "ON;BREATHING;CYCLE");
        assert_eq!(entry.driver_config.get("ButtonMapping"), None);

        std::fs::remove_dir_all(&dir).ok();
    }
}
