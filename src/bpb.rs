//! BPB model: parsing and constructing the boot sector, including the
//! geometry derivations every later component (`fat`, `dir`, `file`) reads
//! off of a parsed volume.
//!
//! One struct covers all three FAT widths rather than splitting FAT32's
//! extended fields into a separate type, since most call sites need to
//! branch on `size_fat` anyway. Besides parsing an existing boot sector,
//! this module also derives one from scratch for a requested image size
//! and geometry hint — the fixed-point FAT-length solve in `establish`
//! mirrors the sizing arithmetic of a classic `mkfs.fat`-style formatter.

use crate::codec::{read_u16, read_u32, write_u16, write_u32};
use crate::device::SECTOR_SIZE;
use crate::error::{FatImgError, Result};

pub const MAX_CLUST_12: u32 = 4084;
pub const MIN_CLUST_16: u32 = 4087;
pub const MAX_CLUST_16: u32 = 65524;
pub const MIN_CLUST_32: u32 = 65525;
pub const MAX_CLUST_32: u32 = 268_435_446;

const LEAD_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Floppy geometry table keyed by total sector count: (spc, root_entries, media, spt, heads).
const FLOPPY_GEOMETRIES: &[(u32, u8, u16, u8, u16, u16)] = &[
    (320, 2, 112, 0xFE, 8, 1),
    (360, 2, 112, 0xFC, 9, 1),
    (640, 2, 112, 0xFF, 8, 2),
    (720, 2, 112, 0xFD, 9, 2),
    (1280, 2, 112, 0xFB, 8, 2),
    (1440, 2, 112, 0xF9, 9, 2),
    (1640, 2, 112, 0xF9, 10, 2),
    (2400, 1, 224, 0xF9, 15, 2),
    (2880, 1, 224, 0xF0, 18, 2),
    (3360, 1, 224, 0xF0, 21, 2),
    (3444, 1, 224, 0xF0, 21, 2),
    (5760, 2, 240, 0xF0, 36, 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeFat {
    Fat12,
    Fat16,
    Fat32,
}

impl SizeFat {
    pub fn bits(self) -> u32 {
        match self {
            SizeFat::Fat12 => 12,
            SizeFat::Fat16 => 16,
            SizeFat::Fat32 => 32,
        }
    }
}

/// A fully parsed (or newly established) BPB, plus derived geometry.
#[derive(Debug, Clone)]
pub struct Bpb {
    pub boot_jump: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub number_of_fats: u8,
    pub root_entries: u16,
    pub total_sectors16: u16,
    pub media_descriptor: u8,
    pub sectors_per_fat16: u16,
    pub sectors_per_track: u16,
    pub heads_per_cylinder: u16,
    pub hidden_sectors: u32,
    pub total_sectors32: u32,

    // FAT32-only extension (zeroed/unused otherwise).
    pub sectors_per_fat32: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub info_sector: u16,
    pub backup_boot: u16,
    pub drive_number: u8,
    pub ext_boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],

    pub size_fat: SizeFat,
}

impl Bpb {
    pub fn total_sectors(&self) -> u64 {
        if self.total_sectors16 != 0 {
            self.total_sectors16 as u64
        } else {
            self.total_sectors32 as u64
        }
    }

    pub fn sectors_per_fat(&self) -> u32 {
        if self.sectors_per_fat16 != 0 {
            self.sectors_per_fat16 as u32
        } else {
            self.sectors_per_fat32
        }
    }

    pub fn root_dir_sectors(&self) -> u32 {
        ((self.root_entries as u32) * 32 + self.bytes_per_sector as u32 - 1) / self.bytes_per_sector as u32
    }

    /// First sector of the (FAT12/16) fixed-size root directory region, or
    /// equivalently the start of the data area for FAT32 (whose root is a
    /// regular cluster chain living inside the data area).
    pub fn root_dir_start_sector(&self) -> u64 {
        self.reserved_sectors as u64 + self.number_of_fats as u64 * self.sectors_per_fat() as u64
    }

    pub fn data_area_start_sector(&self) -> u64 {
        self.root_dir_start_sector() + self.root_dir_sectors() as u64
    }

    pub fn cluster_count(&self) -> u32 {
        let data_sectors = self.total_sectors().saturating_sub(self.data_area_start_sector());
        (data_sectors / self.sectors_per_cluster as u64) as u32
    }

    pub fn cluster_size_bytes(&self) -> u64 {
        self.sectors_per_cluster as u64 * self.bytes_per_sector as u64
    }

    /// Absolute sector number of the first sector of data cluster `cluster`
    /// (valid for cluster >= 2).
    pub fn first_sector_of_cluster(&self, cluster: u32) -> u64 {
        debug_assert!(cluster >= 2);
        self.data_area_start_sector() + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }

    pub fn is_fat32(&self) -> bool {
        matches!(self.size_fat, SizeFat::Fat32)
    }

    // ---- Parsing --------------------------------------------------

    pub fn parse(buf: &[u8; SECTOR_SIZE]) -> Result<Bpb> {
        if buf[510] != LEAD_SIGNATURE[0] || buf[511] != LEAD_SIGNATURE[1] {
            return Err(FatImgError::BadImage("missing 0x55AA boot sector signature".into()));
        }
        let boot_jump = [buf[0], buf[1], buf[2]];
        if boot_jump[0] != 0xEB || boot_jump[2] != 0x90 {
            return Err(FatImgError::BadImage("invalid boot jump instruction".into()));
        }
        if boot_jump[1] < 0x16 {
            return Err(FatImgError::BadImage("boot jump offset too small for BPB".into()));
        }

        let mut oem_name = [0u8; 8];
        oem_name.copy_from_slice(&buf[3..11]);

        let bytes_per_sector = read_u16(&buf[11..13]);
        let sectors_per_cluster = buf[13];
        let reserved_sectors = read_u16(&buf[14..16]);
        let number_of_fats = buf[16];
        let root_entries = read_u16(&buf[17..19]);
        let total_sectors16 = read_u16(&buf[19..21]);
        let media_descriptor = buf[21];
        let sectors_per_fat16 = read_u16(&buf[22..24]);
        let sectors_per_track = read_u16(&buf[24..26]);
        let heads_per_cylinder = read_u16(&buf[26..28]);
        let hidden_sectors = read_u32(&buf[28..32]);

        if sectors_per_cluster == 0 || reserved_sectors == 0 || number_of_fats == 0 {
            return Err(FatImgError::BadImage("zero required BPB field".into()));
        }

        let total_sectors32 = if total_sectors16 == 0 {
            if boot_jump[1] < 0x22 {
                return Err(FatImgError::BadImage("total_sectors32 field not present".into()));
            }
            read_u32(&buf[32..36])
        } else {
            0
        };

        let (
            sectors_per_fat32,
            ext_flags,
            fs_version,
            root_cluster,
            info_sector,
            backup_boot,
            drive_number,
            ext_boot_signature,
            volume_id,
            volume_label,
            fs_type,
        ) = if root_entries == 0 {
            if boot_jump[1] < 0x58 {
                return Err(FatImgError::BadImage("FAT32 fields not present".into()));
            }
            let sectors_per_fat32 = read_u32(&buf[36..40]);
            let ext_flags = read_u16(&buf[40..42]);
            let fs_version = read_u16(&buf[42..44]);
            let root_cluster = read_u32(&buf[44..48]);
            let info_sector = read_u16(&buf[48..50]);
            let backup_boot = read_u16(&buf[50..52]);
            let drive_number = buf[64];
            let ext_boot_signature = buf[66];
            let volume_id = read_u32(&buf[67..71]);
            let mut volume_label = [0u8; 11];
            volume_label.copy_from_slice(&buf[71..82]);
            let mut fs_type = [0u8; 8];
            fs_type.copy_from_slice(&buf[82..90]);
            (
                sectors_per_fat32,
                ext_flags,
                fs_version,
                root_cluster,
                info_sector,
                backup_boot,
                drive_number,
                ext_boot_signature,
                volume_id,
                volume_label,
                fs_type,
            )
        } else {
            if boot_jump[1] < 0x3C {
                return Err(FatImgError::BadImage("extended BPB fields not present".into()));
            }
            let drive_number = buf[36];
            let ext_boot_signature = buf[38];
            let volume_id = read_u32(&buf[39..43]);
            let mut volume_label = [0u8; 11];
            volume_label.copy_from_slice(&buf[43..54]);
            let mut fs_type = [0u8; 8];
            fs_type.copy_from_slice(&buf[54..62]);
            (0, 0, 0, 0, 0, 0, drive_number, ext_boot_signature, volume_id, volume_label, fs_type)
        };

        let mut bpb = Bpb {
            boot_jump,
            oem_name,
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            number_of_fats,
            root_entries,
            total_sectors16,
            media_descriptor,
            sectors_per_fat16,
            sectors_per_track,
            heads_per_cylinder,
            hidden_sectors,
            total_sectors32,
            sectors_per_fat32,
            ext_flags,
            fs_version,
            root_cluster,
            info_sector,
            backup_boot,
            drive_number,
            ext_boot_signature,
            volume_id,
            volume_label,
            fs_type,
            size_fat: SizeFat::Fat12, // placeholder, set below
        };
        bpb.size_fat = bpb.detect_size_fat()?;
        Ok(bpb)
    }

    fn detect_size_fat(&self) -> Result<SizeFat> {
        if self.sectors_per_fat16 == 0 && self.sectors_per_fat32 != 0 {
            return Ok(SizeFat::Fat32);
        }
        let count = self.cluster_count();
        if count <= MAX_CLUST_12 {
            Ok(SizeFat::Fat12)
        } else if count >= MIN_CLUST_16 && count <= MAX_CLUST_16 {
            Ok(SizeFat::Fat16)
        } else if count >= MIN_CLUST_32 && count <= MAX_CLUST_32 {
            Ok(SizeFat::Fat32)
        } else {
            Err(FatImgError::BadImage(format!(
                "cluster count {count} is not a legal FAT12/16/32 bracket (forbidden 4085..4086 gap or out of range)"
            )))
        }
    }

    // ---- Serializing ------------------------------------------------

    pub fn serialize(&self, buf: &mut [u8; SECTOR_SIZE]) {
        buf.iter_mut().for_each(|b| *b = 0);
        buf[0..3].copy_from_slice(&self.boot_jump);
        buf[3..11].copy_from_slice(&self.oem_name);
        write_u16(&mut buf[11..13], self.bytes_per_sector);
        buf[13] = self.sectors_per_cluster;
        write_u16(&mut buf[14..16], self.reserved_sectors);
        buf[16] = self.number_of_fats;
        write_u16(&mut buf[17..19], self.root_entries);
        write_u16(&mut buf[19..21], self.total_sectors16);
        buf[21] = self.media_descriptor;
        write_u16(&mut buf[22..24], self.sectors_per_fat16);
        write_u16(&mut buf[24..26], self.sectors_per_track);
        write_u16(&mut buf[26..28], self.heads_per_cylinder);
        write_u32(&mut buf[28..32], self.hidden_sectors);
        write_u32(&mut buf[32..36], self.total_sectors32);

        if self.is_fat32() {
            write_u32(&mut buf[36..40], self.sectors_per_fat32);
            write_u16(&mut buf[40..42], self.ext_flags);
            write_u16(&mut buf[42..44], self.fs_version);
            write_u32(&mut buf[44..48], self.root_cluster);
            write_u16(&mut buf[48..50], self.info_sector);
            write_u16(&mut buf[50..52], self.backup_boot);
            buf[64] = self.drive_number;
            buf[66] = self.ext_boot_signature;
            write_u32(&mut buf[67..71], self.volume_id);
            buf[71..82].copy_from_slice(&self.volume_label);
            buf[82..90].copy_from_slice(&self.fs_type);
        } else {
            buf[36] = self.drive_number;
            buf[38] = self.ext_boot_signature;
            write_u32(&mut buf[39..43], self.volume_id);
            buf[43..54].copy_from_slice(&self.volume_label);
            buf[54..62].copy_from_slice(&self.fs_type);
        }

        buf[510] = LEAD_SIGNATURE[0];
        buf[511] = LEAD_SIGNATURE[1];
    }

    // ---- Establishing (formatter path) -------------------------------

    pub fn establish(params: &EstablishParams) -> Result<Bpb> {
        let mut total_sectors = (params.image_size_bytes / SECTOR_SIZE as u64) + params.orphaned_sectors as u64;
        let mut capped = false;
        if total_sectors > u32::MAX as u64 {
            total_sectors = u32::MAX as u64;
            capped = true;
        }
        let total_sectors = total_sectors as u32;

        let (sectors_per_track, heads_per_cylinder) = chs_geometry(total_sectors as u64);

        let floppy = FLOPPY_GEOMETRIES.iter().find(|g| g.0 == total_sectors);

        let (mut spc, mut root_entries, media_descriptor, sectors_per_track, heads_per_cylinder) =
            if let Some(&(_, spc, root_entries, media, spt, heads)) = floppy {
                (spc, root_entries, media, spt as u16, heads)
            } else {
                (1u8, 512u16, 0xF8u8, sectors_per_track, heads_per_cylinder)
            };

        let align_ok = total_sectors > 8192;

        let forced_flavor = params.size_fat_hint;
        let want_fat32 = forced_flavor == Some(SizeFat::Fat32)
            || (forced_flavor.is_none() && params.image_size_bytes >= 512 * 1024 * 1024);

        let mut reserved_sectors: u16 = if want_fat32 { 32 } else { 1 };
        if want_fat32 {
            root_entries = 0;
            spc = fat32_default_spc(params.image_size_bytes);
        }

        let mut chosen: Option<(SizeFat, u32, u32)> = None; // (flavor, spc, fatlen)
        let mut spc_try = spc;
        'outer: loop {
            let candidates: &[SizeFat] = match forced_flavor {
                Some(f) => std::slice::from_ref(match f {
                    SizeFat::Fat12 => &SizeFat::Fat12,
                    SizeFat::Fat16 => &SizeFat::Fat16,
                    SizeFat::Fat32 => &SizeFat::Fat32,
                }),
                None => &[SizeFat::Fat12, SizeFat::Fat16, SizeFat::Fat32],
            };

            let mut best: Option<(SizeFat, u32, u32)> = None;
            for &flavor in candidates {
                let root_dir_sectors = if flavor == SizeFat::Fat32 {
                    0
                } else {
                    ((root_entries as u32) * 32 + 511) / 512
                };
                let reserved_aligned = align_up(reserved_sectors as u32, spc_try as u32);
                let root_aligned = if align_ok { align_up(root_dir_sectors, spc_try as u32) } else { root_dir_sectors };
                let avail = total_sectors.saturating_sub(reserved_aligned).saturating_sub(root_aligned);

                if let Some((cluster_count, fatlen)) =
                    size_fat_fixed_point(avail, spc_try as u32, params.number_of_fats as u32, flavor.bits())
                {
                    let in_bracket = match flavor {
                        SizeFat::Fat12 => cluster_count <= MAX_CLUST_12,
                        SizeFat::Fat16 => cluster_count >= MIN_CLUST_16 && cluster_count <= MAX_CLUST_16,
                        SizeFat::Fat32 => {
                            cluster_count >= MIN_CLUST_32 || forced_flavor == Some(SizeFat::Fat32)
                        }
                    };
                    if in_bracket {
                        best = match best {
                            None => Some((flavor, cluster_count, fatlen)),
                            Some((_, best_count, _)) if flavor == SizeFat::Fat16 && cluster_count > best_count => {
                                Some((flavor, cluster_count, fatlen))
                            }
                            other => other,
                        };
                    }
                }
            }

            if let Some(result) = best {
                chosen = Some(result);
                break 'outer;
            }

            if spc_try >= 128 {
                return Err(FatImgError::BadArgument(
                    "image too small to hold a valid FAT volume of any flavor".into(),
                ));
            }
            spc_try *= 2;
        }

        let (size_fat, _cluster_count, fatlen) = chosen.unwrap();
        spc = spc_try;

        let root_dir_sectors = if size_fat == SizeFat::Fat32 { 0 } else { ((root_entries as u32) * 32 + 511) / 512 };
        reserved_sectors = align_up(reserved_sectors as u32, spc as u32) as u16;
        if align_ok && size_fat != SizeFat::Fat32 {
            let root_aligned = align_up(root_dir_sectors, spc as u32);
            root_entries = ((root_aligned * 512) / 32) as u16;
        }

        let (info_sector, backup_boot) = if size_fat == SizeFat::Fat32 {
            let info_sector = 1u16;
            let mut backup_boot = None;
            for &candidate in &[6u16, reserved_sectors.saturating_sub(2), reserved_sectors.saturating_sub(1)] {
                if candidate != info_sector && (candidate as u32) < reserved_sectors as u32 {
                    backup_boot = Some(candidate);
                    break;
                }
            }
            let backup_boot = backup_boot.ok_or_else(|| {
                FatImgError::BadArgument("cannot place FAT32 backup boot sector in reserved region".into())
            })?;
            (info_sector, backup_boot)
        } else {
            (0, 0)
        };

        let boot_jump = [0xEBu8, if size_fat == SizeFat::Fat32 { 0x58 } else { 0x3C }, 0x90];
        let oem_name = *b"FATIMG  ";

        let (total_sectors16, total_sectors32) =
            if total_sectors < 0x10000 && size_fat != SizeFat::Fat32 { (total_sectors as u16, 0) } else { (0, total_sectors) };

        let (sectors_per_fat16, sectors_per_fat32) =
            if size_fat == SizeFat::Fat32 { (0, fatlen) } else { (fatlen as u16, 0) };

        let mut label = [b' '; 11];
        if let Some(requested) = &params.volume_label {
            label.copy_from_slice(requested);
        }

        let bpb = Bpb {
            boot_jump,
            oem_name,
            bytes_per_sector: SECTOR_SIZE as u16,
            sectors_per_cluster: spc,
            reserved_sectors,
            number_of_fats: params.number_of_fats,
            root_entries,
            total_sectors16,
            media_descriptor,
            sectors_per_fat16,
            sectors_per_track,
            heads_per_cylinder,
            hidden_sectors: params.hidden_sectors,
            total_sectors32,
            sectors_per_fat32,
            ext_flags: 0,
            fs_version: 0,
            root_cluster: if size_fat == SizeFat::Fat32 { 2 } else { 0 },
            info_sector,
            backup_boot,
            drive_number: 0x80,
            ext_boot_signature: 0x29,
            volume_id: params.volume_id,
            volume_label: label,
            fs_type: fs_type_label(size_fat),
            size_fat,
        };

        if capped {
            log::warn!("requested image size exceeds 2^32-1 sectors; truncating surplus as unused");
        }

        Ok(bpb)
    }
}

fn fs_type_label(flavor: SizeFat) -> [u8; 8] {
    let text: &[u8] = match flavor {
        SizeFat::Fat12 => b"FAT12   ",
        SizeFat::Fat16 => b"FAT16   ",
        SizeFat::Fat32 => b"FAT32   ",
    };
    let mut out = [0u8; 8];
    out.copy_from_slice(text);
    out
}

fn align_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    (value + align - 1) / align * align
}

fn fat32_default_spc(image_size_bytes: u64) -> u8 {
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;
    if image_size_bytes <= 260 * MIB {
        1
    } else if image_size_bytes <= 8 * GIB {
        8
    } else if image_size_bytes <= 16 * GIB {
        16
    } else if image_size_bytes <= 32 * GIB {
        32
    } else {
        64
    }
}

fn chs_geometry(total_sectors: u64) -> (u16, u16) {
    if total_sectors > 65535 * 16 * 63 {
        return (63, 255);
    }
    let mut spt: u64 = 17;
    loop {
        let cylinders = total_sectors / (spt * 2);
        if cylinders <= 1024 || spt >= 63 {
            break;
        }
        spt = if spt == 17 { 31 } else { 63 };
    }
    (spt as u16, 2)
}

/// Fixed-point solve for (cluster_count, fat_len_sectors) given the sectors
/// available for FAT copies + data, the cluster size, FAT copy count, and
/// the candidate entry width. Mirrors the iterative approach in
/// `original_source/mkfs.c`'s `setup_tables()`.
fn size_fat_fixed_point(avail_sectors: u32, spc: u32, nfats: u32, entry_bits: u32) -> Option<(u32, u32)> {
    if avail_sectors == 0 || spc == 0 {
        return None;
    }
    let mut fatlen: u32 = 1;
    for _ in 0..32 {
        let data_sectors = avail_sectors.checked_sub(nfats * fatlen)?;
        let cluster_count = data_sectors / spc;
        let entries = cluster_count + 2;
        let fat_bytes = (entries as u64 * entry_bits as u64 + 7) / 8;
        let new_fatlen = ((fat_bytes + SECTOR_SIZE as u64 - 1) / SECTOR_SIZE as u64).max(1) as u32;
        if new_fatlen == fatlen {
            return Some((cluster_count, fatlen));
        }
        fatlen = new_fatlen;
    }
    None
}

/// Caller-supplied inputs to [`Bpb::establish`].
pub struct EstablishParams {
    pub image_size_bytes: u64,
    pub orphaned_sectors: u8,
    pub size_fat_hint: Option<SizeFat>,
    pub number_of_fats: u8,
    pub hidden_sectors: u32,
    pub volume_id: u32,
    pub volume_label: Option<[u8; 11]>,
}

impl Default for EstablishParams {
    fn default() -> Self {
        EstablishParams {
            image_size_bytes: 0,
            orphaned_sectors: 0,
            size_fat_hint: None,
            number_of_fats: 2,
            hidden_sectors: 0,
            volume_id: 0,
            volume_label: None,
        }
    }
}
