//! Component A: the HID raw transport. Abstracts exactly one kernel
//! `/dev/hidraw` endpoint — open/close, get/set feature report, raw
//! read/write, and report-id discovery. No retry policy lives here; that
//! is a driver (or the commit engine's ready handshake) concern.
//!
//! File-descriptor acquisition is delegated to a caller-supplied callback
//! pair (`open_restricted`/`close_restricted`) so a privileged daemon can
//! hand descriptors to an unprivileged embedder of this crate without the
//! crate ever calling `open(2)`/`close(2)` itself.

use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::libc;
use tracing::{debug, trace, warn};

use crate::error::{RatbagError, Result};

/// Supplied by the embedder: open `path` with the given `flags`
/// (`O_RDWR` typically) and return a raw fd, or a negated errno on
/// failure — mirrors the C `open_restricted` callback this design is
/// modelled on.
pub type OpenRestricted = Box<dyn Fn(&Path, i32) -> std::result::Result<RawFd, i32>>;
/// Supplied by the embedder: release a fd previously handed back by
/// `OpenRestricted`.
pub type CloseRestricted = Box<dyn Fn(RawFd)>;

/// HID++ frames (and some vendor protocols) are multiplexed on the same
/// node as ordinary mouse input reports, so a response read loop needs a
/// time budget rather than a fixed read count.
const DEFAULT_READ_BUDGET: Duration = Duration::from_millis(2000);
const SINGLE_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Linux hidraw.h: `_IOC(_IOC_READ|_IOC_WRITE, 'H', 0x07, len)`.
fn hid_get_feature_req(len: usize) -> libc::c_ulong {
    ioc(3, b'H', 0x07, len)
}

/// Linux hidraw.h: `_IOC(_IOC_READ|_IOC_WRITE, 'H', 0x06, len)`.
fn hid_set_feature_req(len: usize) -> libc::c_ulong {
    ioc(3, b'H', 0x06, len)
}

/// `_IOC(_IOC_READ, 'H', 0x03, size_of::<hidraw_devinfo>())`.
fn hid_get_rawinfo_req() -> libc::c_ulong {
    ioc(2, b'H', 0x03, std::mem::size_of::<RawDevInfo>())
}

/// `_IOC(_IOC_READ, 'H', 0x01, size_of::<c_int>())`.
fn hid_get_rdesc_size_req() -> libc::c_ulong {
    ioc(2, b'H', 0x01, std::mem::size_of::<libc::c_int>())
}

/// `_IOC(_IOC_READ, 'H', 0x02, size_of::<hidraw_report_descriptor>())`.
fn hid_get_rdesc_req(size: usize) -> libc::c_ulong {
    ioc(2, b'H', 0x02, HIDRAW_DESC_HEADER + size)
}

const HIDRAW_DESC_HEADER: usize = std::mem::size_of::<libc::c_int>();
const HIDRAW_MAX_DESCRIPTOR_SIZE: usize = 4096;

fn ioc(dir: libc::c_ulong, ty: u8, nr: libc::c_ulong, len: usize) -> libc::c_ulong {
    (dir << 30) | ((ty as libc::c_ulong) << 8) | nr | ((len as libc::c_ulong) << 16)
}

#[repr(C)]
struct RawDevInfo {
    bustype: u32,
    vendor: i16,
    product: i16,
}

/// What `HIDIOCGRAWINFO` returns: bus protocol plus USB vendor/product ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInfo {
    pub bustype: u32,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// One open `/dev/hidraw` endpoint.
pub struct Transport {
    fd: RawFd,
    path: PathBuf,
    close: CloseRestricted,
}

impl Transport {
    /// Open `path` via the caller-supplied `open_restricted` callback.
    pub fn open(path: &Path, open: &OpenRestricted, close: CloseRestricted) -> Result<Self> {
        const O_RDWR: i32 = libc::O_RDWR;
        match open(path, O_RDWR) {
            Ok(fd) => {
                debug!("opened {} as fd {fd}", path.display());
                Ok(Transport {
                    fd,
                    path: path.to_path_buf(),
                    close,
                })
            }
            Err(errno) => Err(RatbagError::io(
                path.display().to_string(),
                std::io::Error::from_raw_os_error(errno.abs()),
            )),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Query `HIDIOCGRAWINFO`: bus type and USB vendor/product identifiers.
    pub fn raw_info(&self) -> Result<RawInfo> {
        let mut info = RawDevInfo {
            bustype: 0,
            vendor: 0,
            product: 0,
        };
        let req = hid_get_rawinfo_req();
        let res = unsafe { libc::ioctl(self.fd, req, &mut info as *mut RawDevInfo) };
        if res < 0 {
            return Err(self.ioctl_err());
        }
        Ok(RawInfo {
            bustype: info.bustype,
            vendor_id: info.vendor as u16,
            product_id: info.product as u16,
        })
    }

    /// Get a HID feature report. `buf[0]` must hold the report id; returns
    /// the number of bytes the kernel wrote back into `buf`.
    pub fn get_feature(&self, buf: &mut [u8]) -> Result<usize> {
        let req = hid_get_feature_req(buf.len());
        let res = unsafe { libc::ioctl(self.fd, req, buf.as_mut_ptr()) };
        if res < 0 {
            return Err(self.ioctl_err());
        }
        let n = res as usize;
        trace!("GET_FEATURE {n} bytes: {:02x?}", &buf[..n]);
        Ok(n)
    }

    /// Set a HID feature report. `buf[0]` must hold the report id.
    pub fn set_feature(&self, buf: &[u8]) -> Result<usize> {
        let req = hid_set_feature_req(buf.len());
        let res = unsafe { libc::ioctl(self.fd, req, buf.as_ptr()) };
        if res < 0 {
            return Err(self.ioctl_err());
        }
        let n = res as usize;
        trace!("SET_FEATURE {n} bytes: {:02x?}", &buf[..n]);
        Ok(n)
    }

    /// Write a report via a plain `write(2)` (the HID++ channels use this
    /// instead of `SET_FEATURE` for request frames).
    pub fn write_report(&self, buf: &[u8]) -> Result<()> {
        let res = unsafe { libc::write(self.fd, buf.as_ptr().cast(), buf.len()) };
        if res < 0 {
            return Err(self.io_err());
        }
        trace!("TX {} bytes: {:02x?}", buf.len(), buf);
        Ok(())
    }

    /// Read one report via a plain `read(2)`, blocking up to
    /// `SINGLE_READ_TIMEOUT` using `poll(2)`. Returns `Ok(0)` on timeout.
    pub fn read_report(&self, buf: &mut [u8]) -> Result<usize> {
        self.read_report_timeout(buf, SINGLE_READ_TIMEOUT)
    }

    fn read_report_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
        use std::os::fd::BorrowedFd;

        let borrowed = unsafe { BorrowedFd::borrow_raw(self.fd) };
        let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
        let millis: i32 = timeout.as_millis().min(i32::MAX as u128) as i32;
        let n = poll(&mut fds, PollTimeout::try_from(millis).unwrap_or(PollTimeout::NONE))
            .map_err(|e| RatbagError::io(self.path.display().to_string(), std::io::Error::from(e)))?;
        if n == 0 {
            return Ok(0);
        }
        let res = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if res < 0 {
            return Err(self.io_err());
        }
        let n = res as usize;
        trace!("RX {n} bytes: {:02x?}", &buf[..n]);
        Ok(n)
    }

    /// Write `request`, then read reports until `matcher` returns `Some`,
    /// an error frame is seen, or `budget` elapses (`timeout`). Discards
    /// any report `matcher` doesn't recognise — necessary because wireless
    /// receivers interleave protocol replies with ordinary input reports.
    pub fn request<T>(
        &self,
        request: &[u8],
        response_len: usize,
        budget: Duration,
        mut matcher: impl FnMut(&[u8]) -> Option<Result<T>>,
    ) -> Result<T> {
        self.write_report(request)?;
        let deadline = Instant::now() + budget;
        let mut buf = vec![0u8; response_len];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let n = self.read_report_timeout(&mut buf, remaining.min(SINGLE_READ_TIMEOUT))?;
            if n == 0 {
                continue;
            }
            if let Some(result) = matcher(&buf[..n]) {
                return result;
            }
        }
        Err(RatbagError::Timeout { attempts: 1 })
    }

    /// Default read budget used by `request` when the caller has no
    /// stronger opinion.
    pub fn default_read_budget() -> Duration {
        DEFAULT_READ_BUDGET
    }

    /// Scan the report descriptor for a `Report ID` global item (tag
    /// `0x85`) carrying `report_id`. This is the descriptor-level way to
    /// answer "does this device expose report id N at all" without
    /// performing a read/write that could have side effects.
    pub fn has_report(&self, report_id: u8) -> Result<bool> {
        let mut size: libc::c_int = 0;
        let req = hid_get_rdesc_size_req();
        let res = unsafe { libc::ioctl(self.fd, req, &mut size as *mut libc::c_int) };
        if res < 0 {
            return Err(self.ioctl_err());
        }
        let size = (size as usize).min(HIDRAW_MAX_DESCRIPTOR_SIZE);

        let mut buf = vec![0u8; HIDRAW_DESC_HEADER + size];
        buf[..HIDRAW_DESC_HEADER].copy_from_slice(&(size as libc::c_int).to_ne_bytes());
        let req = hid_get_rdesc_req(size);
        let res = unsafe { libc::ioctl(self.fd, req, buf.as_mut_ptr()) };
        if res < 0 {
            return Err(self.ioctl_err());
        }

        let desc = &buf[HIDRAW_DESC_HEADER..];
        let mut i = 0;
        while i + 1 < desc.len() {
            if desc[i] == 0x85 && desc[i + 1] == report_id {
                return Ok(true);
            }
            i += 1;
        }
        Ok(false)
    }

    fn ioctl_err(&self) -> RatbagError {
        self.io_err()
    }

    fn io_err(&self) -> RatbagError {
        RatbagError::io(self.path.display().to_string(), std::io::Error::last_os_error())
    }

    /// A `Transport` backed by `/dev/null` instead of a real hidraw node,
    /// for tests that exercise driver/commit-engine logic without talking
    /// to hardware. Any ioctl a test actually drives through this (rather
    /// than stubbing the driver under test) will fail, since `/dev/null`
    /// answers no HID ioctls.
    #[cfg(any(test, feature = "test-support"))]
    pub fn fake_for_test() -> Self {
        let cpath = std::ffi::CString::new("/dev/null").unwrap();
        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR) };
        assert!(fd >= 0, "failed to open /dev/null for fake transport");
        let close: CloseRestricted = Box::new(|fd| {
            unsafe { libc::close(fd) };
        });
        Transport {
            fd,
            path: PathBuf::from("/dev/null"),
            close,
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        (self.close)(self.fd);
        debug!("closed {}", self.path.display());
    }
}

/// A `Transport` that backs both callbacks with plain `open(2)`/`close(2)`,
/// for embedders that don't need a privilege-separated daemon.
pub fn open_unrestricted(path: &Path) -> Result<Transport> {
    let open: OpenRestricted = Box::new(|path, flags| {
        let cpath = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| -(libc::EINVAL))?;
        let fd = unsafe { libc::open(cpath.as_ptr(), flags) };
        if fd < 0 {
            Err(-std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO))
        } else {
            Ok(fd)
        }
    });
    let close: CloseRestricted = Box::new(|fd| {
        unsafe { libc::close(fd) };
    });
    let warn_path = path.to_path_buf();
    match Transport::open(path, &open, close) {
        Ok(t) => Ok(t),
        Err(e) => {
            warn!("failed to open {}: {e}", warn_path.display());
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioc_matches_kernel_macro_shape() {
        // HIDIOCGFEATURE(len) per linux/hidraw.h: dir=3 (RW), type='H', nr=0x07
        let req = hid_get_feature_req(16);
        assert_eq!((req >> 30) & 0x3, 3);
        assert_eq!((req >> 8) & 0xff, b'H' as libc::c_ulong);
        assert_eq!(req & 0xff, 0x07);
        assert_eq!((req >> 16) & 0x3fff, 16);
    }
}
