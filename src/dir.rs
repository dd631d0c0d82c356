//! Directory engine: entry iteration, path resolve, free-slot
//! acquisition, and directory creation.
//!
//! Only the 8.3 short-name walk is implemented; long-name (VFAT) entries
//! encountered on disk are skipped as opaque noise rather than assembled
//! into a name.

use crate::bpb::Bpb;
use crate::codec::DosTimestamp;
use crate::device::{Image, SECTOR_SIZE};
use crate::entry::{ShortDirEntry, ATTR_DIR, ENTRY_SIZE};
use crate::error::{FatImgError, Result};
use crate::fat;
use crate::fsinfo::FsInfo;

const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / ENTRY_SIZE;

/// Coordinates of one directory entry slot: absolute sector plus byte
/// offset of the 32-byte record within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub sector: u64,
    pub offset_in_sector: usize,
}

impl EntryLocation {
    pub fn read(&self, image: &mut Image) -> Result<ShortDirEntry> {
        let mut buf = [0u8; SECTOR_SIZE];
        image.read_sector(self.sector, &mut buf)?;
        Ok(ShortDirEntry::parse(&buf[self.offset_in_sector..self.offset_in_sector + ENTRY_SIZE]))
    }

    pub fn write(&self, image: &mut Image, entry: &ShortDirEntry) -> Result<()> {
        let mut buf = [0u8; SECTOR_SIZE];
        image.read_sector(self.sector, &mut buf)?;
        entry.serialize(&mut buf[self.offset_in_sector..self.offset_in_sector + ENTRY_SIZE]);
        image.write_sector(self.sector, &buf)
    }
}

/// What `next_entry` returned.
pub enum IterResult {
    Entry(EntryLocation, ShortDirEntry),
    /// No more entries (non-extensible iterator hit EOC or a `0x00`
    /// sentinel, or the FAT12/16 root hit its fixed bound).
    End,
    /// An extensible iterator ran off the end of the chain; the caller may
    /// grow the directory with [`get_free_dirent`]'s extend step.
    Exhausted,
}

/// Walks the 32-byte entries of one directory: the FAT12/16 root's
/// fixed-size array, or a FAT32 (or subdirectory) cluster chain.
pub struct DirIter {
    /// 0 means the FAT12/16 root area; otherwise the chain's first cluster.
    start_cluster: u32,
    current_cluster: u32,
    current_sector_in_cluster: u32,
    current_entry: usize,
    extensible: bool,
    exhausted: bool,
    root_entries_seen: u32,
    root_entries_total: u32,
}

impl DirIter {
    /// `cluster == 0` addresses the FAT12/16 fixed root directory.
    pub fn new(bpb: &Bpb, cluster: u32, extensible: bool) -> Self {
        DirIter {
            start_cluster: cluster,
            current_cluster: cluster,
            current_sector_in_cluster: 0,
            current_entry: 0,
            extensible,
            exhausted: false,
            root_entries_seen: 0,
            root_entries_total: bpb.root_entries as u32,
        }
    }

    fn is_root(&self) -> bool {
        self.start_cluster == 0
    }

    fn sector_for(&self, bpb: &Bpb) -> u64 {
        if self.is_root() {
            bpb.root_dir_start_sector() + self.current_sector_in_cluster as u64
        } else {
            bpb.first_sector_of_cluster(self.current_cluster) + self.current_sector_in_cluster as u64
        }
    }

    pub fn next_entry(&mut self, image: &mut Image, bpb: &Bpb) -> Result<IterResult> {
        if self.is_root() && self.root_entries_seen >= self.root_entries_total {
            return Ok(IterResult::End);
        }
        if self.exhausted {
            return Ok(if self.extensible { IterResult::Exhausted } else { IterResult::End });
        }

        let sector = self.sector_for(bpb);
        let mut buf = [0u8; SECTOR_SIZE];
        image.read_sector(sector, &mut buf)?;
        let offset_in_sector = self.current_entry * ENTRY_SIZE;
        let parsed = ShortDirEntry::parse(&buf[offset_in_sector..offset_in_sector + ENTRY_SIZE]);

        if !self.extensible && parsed.is_end() {
            return Ok(IterResult::End);
        }

        let location = EntryLocation { sector, offset_in_sector };
        self.advance(image, bpb)?;
        if self.is_root() {
            self.root_entries_seen += 1;
        }
        Ok(IterResult::Entry(location, parsed))
    }

    /// Advances the cursor to the next slot, following the cluster chain
    /// for non-root directories. Sets `exhausted` on running off the chain.
    fn advance(&mut self, image: &mut Image, bpb: &Bpb) -> Result<()> {
        self.current_entry += 1;
        if self.current_entry < ENTRIES_PER_SECTOR {
            return Ok(());
        }
        self.current_entry = 0;
        self.current_sector_in_cluster += 1;

        if self.is_root() {
            return Ok(()); // bounded by root_entries_total, checked above
        }
        if (self.current_sector_in_cluster as u64) < bpb.sectors_per_cluster as u64 {
            return Ok(());
        }
        self.current_sector_in_cluster = 0;

        match fat::next_in_chain(image, bpb, self.current_cluster)? {
            Some(next) => self.current_cluster = next,
            None => self.exhausted = true,
        }
        Ok(())
    }

    /// Repositions the iterator at the start of a freshly spliced cluster,
    /// used after `get_free_dirent` extends the chain.
    pub fn splice_new_cluster(&mut self, new_cluster: u32) {
        self.current_cluster = new_cluster;
        self.current_sector_in_cluster = 0;
        self.current_entry = 0;
        self.exhausted = false;
    }

    pub fn current_cluster_for_dotdot(&self) -> u32 {
        if self.is_root() {
            0
        } else {
            self.start_cluster
        }
    }
}

/// Resolves a slash-separated path to the directory's start cluster (0 for
/// the FAT12/16 root).
pub fn open_dir(image: &mut Image, bpb: &Bpb, path: &str) -> Result<u32> {
    let mut current = if bpb.is_fat32() { bpb.root_cluster } else { 0 };
    for component in path.split(['/', '\\']).filter(|c| !c.is_empty()) {
        let wanted = crate::entry::canonical_to_dir(component)?;
        let mut iter = DirIter::new(bpb, current, false);
        let found = loop {
            match iter.next_entry(image, bpb)? {
                IterResult::Entry(_, entry) => {
                    if entry.is_free() || entry.is_long_name() || entry.is_volume_id() {
                        continue;
                    }
                    if entry.name == wanted {
                        break Some(entry);
                    }
                }
                IterResult::End | IterResult::Exhausted => break None,
            }
        };
        let entry = found.ok_or_else(|| FatImgError::BadArgument(format!("path component '{component}' not found")))?;
        if !entry.is_dir() {
            return Err(FatImgError::Conflict(format!("'{component}' is not a directory")));
        }
        current = entry.start_cluster();
    }
    Ok(current)
}

/// Scans a directory for a name, returning its location and entry if
/// present (skipping free slots, long-name noise, and volume labels).
pub fn find_entry(
    image: &mut Image,
    bpb: &Bpb,
    dir_cluster: u32,
    name: &[u8; 11],
) -> Result<Option<(EntryLocation, ShortDirEntry)>> {
    let mut iter = DirIter::new(bpb, dir_cluster, false);
    loop {
        match iter.next_entry(image, bpb)? {
            IterResult::Entry(loc, entry) => {
                if entry.is_free() || entry.is_long_name() || entry.is_volume_id() {
                    continue;
                }
                if entry.name == *name {
                    return Ok(Some((loc, entry)));
                }
            }
            IterResult::End | IterResult::Exhausted => return Ok(None),
        }
    }
}

/// Finds the first free (`0x00` or `0xE5`) slot in `dir_cluster`, extending
/// the directory with a fresh zeroed cluster if the chain runs out. The
/// FAT12/16 root cannot be extended.
pub fn get_free_dirent(
    image: &mut Image,
    bpb: &Bpb,
    fsinfo: &mut Option<FsInfo>,
    dir_cluster: u32,
) -> Result<EntryLocation> {
    let mut iter = DirIter::new(bpb, dir_cluster, true);
    loop {
        match iter.next_entry(image, bpb)? {
            IterResult::Entry(loc, entry) => {
                if entry.is_free() {
                    return Ok(loc);
                }
            }
            IterResult::Exhausted => {
                if dir_cluster == 0 {
                    return Err(FatImgError::NoSpace);
                }
                let prev = last_cluster_of_chain(image, bpb, dir_cluster)?;
                let new_cluster = fat::allocate_cluster(image, bpb, fsinfo)?;
                zero_cluster(image, bpb, new_cluster)?;
                fat::link(image, bpb, prev, new_cluster)?;
                iter.splice_new_cluster(new_cluster);
            }
            // A full FAT12/16 root hits its fixed bound even in extensible
            // mode (the bound check in `next_entry` runs before the
            // extensible check); the root cannot be grown, so that's NoSpace.
            IterResult::End => return Err(FatImgError::NoSpace),
        }
    }
}

fn last_cluster_of_chain(image: &mut Image, bpb: &Bpb, start: u32) -> Result<u32> {
    let mut current = start;
    while let Some(next) = fat::next_in_chain(image, bpb, current)? {
        current = next;
    }
    Ok(current)
}

fn zero_cluster(image: &mut Image, bpb: &Bpb, cluster: u32) -> Result<()> {
    let zero = [0u8; SECTOR_SIZE];
    let base = bpb.first_sector_of_cluster(cluster);
    for s in 0..bpb.sectors_per_cluster as u64 {
        image.write_sector(base + s, &zero)?;
    }
    Ok(())
}

/// Creates a new subdirectory named `name` inside `parent_cluster`, seeding
/// `.` and `..`. Fails if a non-deleted sibling already uses the name.
pub fn create_dir(
    image: &mut Image,
    bpb: &Bpb,
    fsinfo: &mut Option<FsInfo>,
    parent_cluster: u32,
    name: &[u8; 11],
    now: DosTimestamp,
) -> Result<u32> {
    if find_entry(image, bpb, parent_cluster, name)?.is_some() {
        return Err(FatImgError::AlreadyExists(String::from_utf8_lossy(name).trim_end().to_string()));
    }

    let slot = get_free_dirent(image, bpb, fsinfo, parent_cluster)?;
    let new_cluster = fat::allocate_cluster(image, bpb, fsinfo)?;
    zero_cluster(image, bpb, new_cluster)?;

    let dotdot_target = parent_cluster;

    let mut dot = ShortDirEntry::empty();
    dot.name = *b".          ";
    dot.attr = ATTR_DIR;
    dot.set_start_cluster(new_cluster);
    dot.stamp(now);

    let mut dotdot = ShortDirEntry::empty();
    dotdot.name = *b"..         ";
    dotdot.attr = ATTR_DIR;
    dotdot.set_start_cluster(dotdot_target);
    dotdot.stamp(now);

    let base_sector = bpb.first_sector_of_cluster(new_cluster);
    let mut buf = [0u8; SECTOR_SIZE];
    dot.serialize(&mut buf[0..ENTRY_SIZE]);
    dotdot.serialize(&mut buf[ENTRY_SIZE..2 * ENTRY_SIZE]);
    image.write_sector(base_sector, &buf)?;

    let mut entry = ShortDirEntry::empty();
    entry.name = *name;
    entry.attr = ATTR_DIR;
    entry.set_start_cluster(new_cluster);
    entry.stamp(now);
    entry.size = 0;
    slot.write(image, &entry)?;

    Ok(new_cluster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpb::SizeFat;
    use crate::clock::{FixedClock, WallClock};
    use crate::device::OpenMode;
    use crate::format;
    use std::fs::File;
    use std::io::Write as _;

    fn fresh_volume(size: u64, flavor: Option<SizeFat>) -> (tempfile::TempDir, std::path::PathBuf, Bpb) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.img");
        File::create(&path).unwrap().write_all(&[]).unwrap();
        let clock = FixedClock(WallClock { year: 2026, month: 7, day: 27, hour: 1, minute: 0, second: 0 });
        let opts = format::FormatOptions {
            image_size_bytes: size,
            size_fat_hint: flavor,
            volume_label: None,
            boot_code: None,
            number_of_fats: 2,
        };
        format::format(&path, &opts, &clock).unwrap();
        let mut image = Image::open(&path, OpenMode::ReadWrite, 0).unwrap();
        let mut sector0 = [0u8; SECTOR_SIZE];
        image.read_sector(0, &mut sector0).unwrap();
        let bpb = Bpb::parse(&sector0).unwrap();
        (dir, path, bpb)
    }

    #[test]
    fn mkdir_then_nested_mkdir_links_dotdot() {
        let (_dir, path, bpb) = fresh_volume(1_474_560, Some(SizeFat::Fat12));
        let mut image = Image::open(&path, OpenMode::ReadWrite, 0).unwrap();
        let mut fsinfo = None;
        let clock = FixedClock(WallClock { year: 2026, month: 7, day: 27, hour: 1, minute: 0, second: 0 });
        let now = DosTimestamp::pack(&clock.0);

        let a_name = crate::entry::canonical_to_dir("A").unwrap();
        let a_cluster = create_dir(&mut image, &bpb, &mut fsinfo, 0, &a_name, now).unwrap();

        let b_name = crate::entry::canonical_to_dir("B").unwrap();
        let b_cluster = create_dir(&mut image, &bpb, &mut fsinfo, a_cluster, &b_name, now).unwrap();

        let (_, dotdot) = find_entry(&mut image, &bpb, b_cluster, b"..         ").unwrap().unwrap();
        assert_eq!(dotdot.start_cluster(), a_cluster);

        let (_, dot) = find_entry(&mut image, &bpb, b_cluster, b".          ").unwrap().unwrap();
        assert_eq!(dot.start_cluster(), b_cluster);
    }

    #[test]
    fn create_dir_rejects_duplicate_name() {
        let (_dir, path, bpb) = fresh_volume(1_474_560, Some(SizeFat::Fat12));
        let mut image = Image::open(&path, OpenMode::ReadWrite, 0).unwrap();
        let mut fsinfo = None;
        let now = DosTimestamp::pack(&WallClock { year: 2026, month: 7, day: 27, hour: 1, minute: 0, second: 0 });
        let name = crate::entry::canonical_to_dir("A").unwrap();
        create_dir(&mut image, &bpb, &mut fsinfo, 0, &name, now).unwrap();
        let result = create_dir(&mut image, &bpb, &mut fsinfo, 0, &name, now);
        assert!(matches!(result, Err(FatImgError::AlreadyExists(_))));
    }

    #[test]
    fn open_dir_resolves_nested_path() {
        let (_dir, path, bpb) = fresh_volume(1_474_560, Some(SizeFat::Fat12));
        let mut image = Image::open(&path, OpenMode::ReadWrite, 0).unwrap();
        let mut fsinfo = None;
        let now = DosTimestamp::pack(&WallClock { year: 2026, month: 7, day: 27, hour: 1, minute: 0, second: 0 });
        let a_name = crate::entry::canonical_to_dir("A").unwrap();
        let a_cluster = create_dir(&mut image, &bpb, &mut fsinfo, 0, &a_name, now).unwrap();
        let resolved = open_dir(&mut image, &bpb, "/A").unwrap();
        assert_eq!(resolved, a_cluster);
    }

    #[test]
    fn get_free_dirent_on_full_root_returns_no_space_not_panic() {
        let (_dir, path, bpb) = fresh_volume(1_474_560, Some(SizeFat::Fat12));
        let mut image = Image::open(&path, OpenMode::ReadWrite, 0).unwrap();
        let mut fsinfo = None;

        // The FAT12/16 root cannot be extended; mark every slot non-free so
        // the extensible iterator runs off the fixed bound instead of
        // finding a free one.
        let mut iter = DirIter::new(&bpb, 0, false);
        let mut used = ShortDirEntry::empty();
        used.name = *b"USED       ";
        loop {
            match iter.next_entry(&mut image, &bpb).unwrap() {
                IterResult::Entry(loc, _) => loc.write(&mut image, &used).unwrap(),
                IterResult::End | IterResult::Exhausted => break,
            }
        }

        let result = get_free_dirent(&mut image, &bpb, &mut fsinfo, 0);
        assert!(matches!(result, Err(FatImgError::NoSpace)));
    }
}
