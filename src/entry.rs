//! Directory entry: the 32-byte 8.3 short directory entry and the
//! canonical-name-to-8.3 conversion.
//!
//! Long filenames (VFAT) are out of scope entirely: no long-name entry
//! type is modeled here, and any long-name entries encountered on disk are
//! skipped as opaque noise rather than parsed.

use crate::codec::DosTimestamp;
use crate::error::{FatImgError, Result};

pub const ATTR_READONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIR: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LFN: u8 = ATTR_READONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

pub const FREE_MARKER: u8 = 0xE5;
pub const END_MARKER: u8 = 0x00;
pub const ENCODED_E5: u8 = 0x05;

pub const ENTRY_SIZE: usize = 32;

const ILLEGAL_CHARS: &[u8] = b"\"*+,./:;<=>?[\\]|";

/// A parsed 32-byte short (8.3) directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortDirEntry {
    pub name: [u8; 11],
    pub attr: u8,
    pub ctime: u16,
    pub cdate: u16,
    pub adate: u16,
    pub start_hi: u16,
    pub time: u16,
    pub date: u16,
    pub start_lo: u16,
    pub size: u32,
}

impl ShortDirEntry {
    pub fn empty() -> Self {
        ShortDirEntry {
            name: [b' '; 11],
            attr: 0,
            ctime: 0,
            cdate: 0,
            adate: 0,
            start_hi: 0,
            time: 0,
            date: 0,
            start_lo: 0,
            size: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == END_MARKER || self.name[0] == FREE_MARKER
    }

    pub fn is_end(&self) -> bool {
        self.name[0] == END_MARKER
    }

    pub fn is_long_name(&self) -> bool {
        self.attr & ATTR_LFN == ATTR_LFN
    }

    pub fn is_dir(&self) -> bool {
        self.attr & ATTR_DIR != 0
    }

    pub fn is_volume_id(&self) -> bool {
        self.attr & ATTR_VOLUME_ID != 0
    }

    pub fn start_cluster(&self) -> u32 {
        ((self.start_hi as u32) << 16) | self.start_lo as u32
    }

    pub fn set_start_cluster(&mut self, cluster: u32) {
        self.start_hi = (cluster >> 16) as u16;
        self.start_lo = (cluster & 0xFFFF) as u16;
    }

    /// Decodes the on-disk name, undoing the `0xE5` -> `0x05` rewrite.
    pub fn decoded_name(&self) -> [u8; 11] {
        let mut out = self.name;
        if out[0] == ENCODED_E5 {
            out[0] = FREE_MARKER;
        }
        out
    }

    pub fn parse(buf: &[u8]) -> ShortDirEntry {
        debug_assert!(buf.len() >= ENTRY_SIZE);
        let mut name = [0u8; 11];
        name.copy_from_slice(&buf[0..11]);
        ShortDirEntry {
            name,
            attr: buf[11],
            ctime: crate::codec::read_u16(&buf[14..16]),
            cdate: crate::codec::read_u16(&buf[16..18]),
            adate: crate::codec::read_u16(&buf[18..20]),
            start_hi: crate::codec::read_u16(&buf[20..22]),
            time: crate::codec::read_u16(&buf[22..24]),
            date: crate::codec::read_u16(&buf[24..26]),
            start_lo: crate::codec::read_u16(&buf[26..28]),
            size: crate::codec::read_u32(&buf[28..32]),
        }
    }

    pub fn serialize(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= ENTRY_SIZE);
        buf[0..11].copy_from_slice(&self.name);
        buf[11] = self.attr;
        buf[12] = 0; // NTRes, unused
        buf[13] = 0; // CrtTimeTenth, unused
        crate::codec::write_u16(&mut buf[14..16], self.ctime);
        crate::codec::write_u16(&mut buf[16..18], self.cdate);
        crate::codec::write_u16(&mut buf[18..20], self.adate);
        crate::codec::write_u16(&mut buf[20..22], self.start_hi);
        crate::codec::write_u16(&mut buf[22..24], self.time);
        crate::codec::write_u16(&mut buf[24..26], self.date);
        crate::codec::write_u16(&mut buf[26..28], self.start_lo);
        crate::codec::write_u32(&mut buf[28..32], self.size);
    }

    pub fn stamp(&mut self, ts: DosTimestamp) {
        self.ctime = ts.time;
        self.cdate = ts.date;
        self.adate = ts.date;
        self.time = ts.time;
        self.date = ts.date;
    }

    /// Renders the 8.3 name the way `list` prints it: `NAME.EXT` with the
    /// separating dot omitted when the extension is empty.
    pub fn display_name(&self) -> String {
        let raw = self.decoded_name();
        let base = String::from_utf8_lossy(&raw[0..8]).trim_end().to_string();
        let ext = String::from_utf8_lossy(&raw[8..11]).trim_end().to_string();
        if ext.is_empty() {
            base
        } else {
            format!("{base}.{ext}")
        }
    }
}

/// Converts a single path component into an 11-byte 8.3 on-disk name.
///
/// Rejects an empty name or a bare `.`; more than one `.` is an error;
/// characters `<= 0x20` or in the illegal set are rejected; lowercase ASCII
/// is folded to uppercase; name/extension length overflow is an error. The
/// leading byte `0xE5` is rewritten to `0x05` to avoid colliding with the
/// deleted-entry marker.
pub fn canonical_to_dir(component: &str) -> Result<[u8; 11]> {
    if component.is_empty() || component == "." {
        return Err(FatImgError::NameError(format!("'{component}' is not a legal name")));
    }

    let mut out = [b' '; 11];
    let mut pos = 0usize; // write position within `out`
    let mut in_ext = false;
    let mut dot_seen = false;

    for &byte in component.as_bytes() {
        if byte == b'.' {
            if dot_seen {
                return Err(FatImgError::NameError(format!("'{component}' has more than one dot")));
            }
            dot_seen = true;
            in_ext = true;
            pos = 8;
            continue;
        }
        if byte <= 0x20 || ILLEGAL_CHARS.contains(&byte) {
            return Err(FatImgError::NameError(format!("'{component}' contains an illegal character")));
        }
        let upper = byte.to_ascii_uppercase();
        let limit = if in_ext { 11 } else { 8 };
        if pos >= limit {
            return Err(FatImgError::NameError(format!(
                "'{component}' exceeds the 8.3 {} length limit",
                if in_ext { "extension" } else { "name" }
            )));
        }
        out[pos] = upper;
        pos += 1;
    }

    if out[0] == b' ' {
        return Err(FatImgError::NameError(format!("'{component}' has an empty name")));
    }
    if out[0] == FREE_MARKER {
        out[0] = ENCODED_E5;
    }
    Ok(out)
}
