//! Formatter: end-to-end volume creation — sizing, wiping, boot
//! sector / FSInfo / backup boot serialization, FAT seeding, and an
//! optional volume label entry.
//!
//! Creates a fresh image file from nothing rather than assuming one
//! already exists: extend-to-size, derive a BPB for the requested
//! geometry, wipe the reserved/FAT region, write the boot sector (plus
//! FSInfo and a backup boot sector for FAT32), seed the FAT's two
//! reserved entries, and optionally plant a volume-label directory
//! entry.

use std::fs::OpenOptions;
use std::path::Path;

use crate::bpb::{Bpb, EstablishParams, SizeFat};
use crate::clock::Clock;
use crate::codec::DosTimestamp;
use crate::device::{Image, OpenMode, SECTOR_SIZE};
use crate::entry::{ShortDirEntry, ATTR_VOLUME_ID};
use crate::error::{FatImgError, Result};
use crate::fat;

pub const DEFAULT_BOOT_CODE_LEN: usize = 420;

/// Opaque boot-code blob shipped as a static asset (replacing a
/// note), filling the bytes between the end of the BPB and the `0x55AA`
/// signature. Replaced wholesale by `FormatOptions::boot_code` when given.
static DEFAULT_BOOT_CODE: [u8; DEFAULT_BOOT_CODE_LEN] = [0u8; DEFAULT_BOOT_CODE_LEN];

pub struct FormatOptions {
    pub image_size_bytes: u64,
    pub size_fat_hint: Option<SizeFat>,
    pub volume_label: Option<[u8; 11]>,
    /// Exactly 512 bytes if present; overlays the whole boot sector except
    /// the BPB region and trailing signature, per `--boot FILE`.
    pub boot_code: Option<[u8; SECTOR_SIZE]>,
    pub number_of_fats: u8,
}

pub struct FormatReport {
    pub bpb: Bpb,
}

/// Creates (or truncates-in-place and rewrites) `path` as a fresh FAT
/// volume. `blocks_kib` sizing, `--offset`, and image extension are the
/// caller's concern (`cli::format`); this function receives the resolved
/// target size directly. `volume_offset_sectors` shifts every sector
/// address the way `--offset` requires.
pub fn format(path: &Path, opts: &FormatOptions, clock: &dyn Clock) -> Result<FormatReport> {
    format_with_offset(path, opts, clock, 0)
}

pub fn format_with_offset(
    path: &Path,
    opts: &FormatOptions,
    clock: &dyn Clock,
    volume_offset_sectors: u64,
) -> Result<FormatReport> {
    let result = try_format(path, opts, clock, volume_offset_sectors);
    if result.is_err() {
        // The creation path removes the image file on boot-sector
        // write failure.
        let _ = std::fs::remove_file(path);
    }
    result
}

fn try_format(path: &Path, opts: &FormatOptions, clock: &dyn Clock, volume_offset_sectors: u64) -> Result<FormatReport> {
    let required_len = volume_offset_sectors * SECTOR_SIZE as u64 + opts.image_size_bytes;
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| FatImgError::io_at(path, e))?;
        drop(file);
    }
    let mut image = Image::open(path, OpenMode::ReadWrite, volume_offset_sectors)?;
    image.extend_to(required_len)?;

    let orphaned_sectors = ((opts.image_size_bytes % 1024) / 512) as u8;
    let params = EstablishParams {
        image_size_bytes: opts.image_size_bytes,
        orphaned_sectors,
        size_fat_hint: opts.size_fat_hint,
        number_of_fats: opts.number_of_fats,
        hidden_sectors: volume_offset_sectors as u32,
        volume_id: volume_id_from_clock(clock),
        volume_label: opts.volume_label,
    };
    let bpb = Bpb::establish(&params)?;

    wipe_metadata_region(&mut image, &bpb)?;

    let mut boot_sector = opts.boot_code.unwrap_or_else(|| {
        let mut buf = [0u8; SECTOR_SIZE];
        let start = if bpb.is_fat32() { 90 } else { 62 };
        buf[start..start + DEFAULT_BOOT_CODE_LEN.min(SECTOR_SIZE - start)]
            .copy_from_slice(&DEFAULT_BOOT_CODE[..DEFAULT_BOOT_CODE_LEN.min(SECTOR_SIZE - start)]);
        buf
    });
    bpb.serialize(&mut boot_sector);
    image.write_sector(0, &boot_sector)?;

    if bpb.is_fat32() {
        let fsinfo = crate::fsinfo::FsInfo { free_clusters: bpb.cluster_count().saturating_sub(1), next_cluster: 3 };
        fsinfo.write(&mut image, &bpb)?;
        image.write_sector(bpb.backup_boot as u64, &boot_sector)?;
        if bpb.info_sector != 0 {
            let mut info_copy = [0u8; SECTOR_SIZE];
            image.read_sector(bpb.info_sector as u64, &mut info_copy)?;
            image.write_sector(bpb.backup_boot as u64 + bpb.info_sector as u64, &info_copy)?;
        }
    }

    seed_fat(&mut image, &bpb)?;

    if let Some(label) = opts.volume_label {
        write_volume_label(&mut image, &bpb, label, DosTimestamp::now(clock))?;
    }

    image.flush()?;
    Ok(FormatReport { bpb })
}

fn volume_id_from_clock(clock: &dyn Clock) -> u32 {
    let wc = clock.now();
    ((wc.year as u32) << 16) ^ (wc.month << 12) ^ (wc.day << 6) ^ (wc.hour << 24) ^ (wc.minute << 8) ^ wc.second
}

fn wipe_metadata_region(image: &mut Image, bpb: &Bpb) -> Result<()> {
    let zero = [0u8; SECTOR_SIZE];
    let end_sector = bpb.data_area_start_sector();
    for s in 0..end_sector {
        image.write_sector(s, &zero)?;
    }
    if !bpb.is_fat32() {
        return Ok(());
    }
    let root_end = bpb.first_sector_of_cluster(3);
    let root_start = bpb.first_sector_of_cluster(2);
    for s in root_start..root_end {
        image.write_sector(s, &zero)?;
    }
    Ok(())
}

fn seed_fat(image: &mut Image, bpb: &Bpb) -> Result<()> {
    let fat0 = 0xFFFF_FF00 | bpb.media_descriptor as u32;
    fat::write_entry(image, bpb, 0, fat0)?;
    fat::write_entry(image, bpb, 1, 0xFFFF_FFFF)?;
    if bpb.is_fat32() {
        fat::write_entry(image, bpb, 2, fat::eoc_value(bpb.size_fat))?;
    }
    Ok(())
}

fn write_volume_label(image: &mut Image, bpb: &Bpb, label: [u8; 11], now: DosTimestamp) -> Result<()> {
    let mut entry = ShortDirEntry::empty();
    entry.name = label;
    entry.attr = ATTR_VOLUME_ID;
    entry.stamp(now);

    let sector = if bpb.is_fat32() { bpb.first_sector_of_cluster(bpb.root_cluster) } else { bpb.root_dir_start_sector() };
    let mut buf = [0u8; SECTOR_SIZE];
    image.read_sector(sector, &mut buf)?;
    entry.serialize(&mut buf[0..crate::entry::ENTRY_SIZE]);
    image.write_sector(sector, &buf)
}

/// Validates a requested `-n LABEL`: at most 11 characters, charset
/// `[A-Z0-9!#$%'-@_{}~]` plus space and high-bit bytes, folded to
/// uppercase. Lowercase input is accepted and folded (matching
/// `canonical_to_dir`'s convention) rather than rejected.
pub fn validate_label(label: &str) -> Result<[u8; 11]> {
    if label.len() > 11 {
        return Err(FatImgError::BadArgument(format!("label '{label}' exceeds 11 characters")));
    }
    let mut out = [b' '; 11];
    for (i, &byte) in label.as_bytes().iter().enumerate() {
        let upper = byte.to_ascii_uppercase();
        if !is_legal_label_byte(upper) {
            return Err(FatImgError::BadArgument(format!("label '{label}' contains an illegal character")));
        }
        out[i] = upper;
    }
    Ok(out)
}

fn is_legal_label_byte(b: u8) -> bool {
    b == b' ' || b >= 0x80 || b.is_ascii_alphanumeric() || b"!#$%'-@_{}~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, WallClock};

    fn clock() -> FixedClock {
        FixedClock(WallClock { year: 2026, month: 7, day: 27, hour: 12, minute: 0, second: 0 })
    }

    #[test]
    fn format_1_44mb_floppy_matches_expected_bpb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.img");
        let opts = FormatOptions {
            image_size_bytes: 1_474_560,
            size_fat_hint: None,
            volume_label: None,
            boot_code: None,
            number_of_fats: 2,
        };
        let report = format(&path, &opts, &clock()).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1_474_560);
        assert_eq!(report.bpb.size_fat, SizeFat::Fat12);
        assert_eq!(report.bpb.sectors_per_cluster, 1);
        assert_eq!(report.bpb.root_entries, 224);
        assert_eq!(report.bpb.media_descriptor, 0xF0);
        assert_eq!(report.bpb.sectors_per_track, 18);
        assert_eq!(report.bpb.heads_per_cylinder, 2);

        let mut image = Image::open(&path, OpenMode::ReadOnly, 0).unwrap();
        assert_eq!(fat::mask(SizeFat::Fat12, fat::read_entry(&mut image, &report.bpb, 0).unwrap()), 0xFF0);
        assert_eq!(fat::mask(SizeFat::Fat12, fat::read_entry(&mut image, &report.bpb, 1).unwrap()), 0xFFF);
    }

    #[test]
    fn format_512mib_is_fat32_with_fsinfo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.img");
        let opts = FormatOptions {
            image_size_bytes: 512 * 1024 * 1024,
            size_fat_hint: None,
            volume_label: None,
            boot_code: None,
            number_of_fats: 2,
        };
        let report = format(&path, &opts, &clock()).unwrap();
        assert_eq!(report.bpb.size_fat, SizeFat::Fat32);
        assert_eq!(report.bpb.root_entries, 0);
        assert_eq!(report.bpb.root_cluster, 2);

        let mut image = Image::open(&path, OpenMode::ReadOnly, 0).unwrap();
        let info = crate::fsinfo::FsInfo::read(&mut image, &report.bpb).unwrap();
        assert!(info.free_clusters > 0);
    }

    #[test]
    fn validate_label_rejects_asterisk() {
        assert!(validate_label("bad*name").is_err());
    }

    #[test]
    fn validate_label_accepts_lowercase_and_folds() {
        let label = validate_label("my-disk").unwrap();
        assert_eq!(&label[0..7], b"MY-DISK");
    }
}
