//! File engine: create-or-overwrite, cluster-chunked write stream,
//! and read stream. Streams move bytes between a plain `std::fs::File`
//! host source/target and an image's cluster chain, against the crate's
//! explicit `Image`/`Bpb` plumbing rather than any global filesystem
//! state.

use std::fs::File as HostFile;
use std::io::{Read, Write};
use std::path::Path;

use crate::bpb::Bpb;
use crate::clock::Clock;
use crate::codec::DosTimestamp;
use crate::device::{Image, SECTOR_SIZE};
use crate::dir::{self, EntryLocation};
use crate::entry::{ShortDirEntry, ATTR_ARCHIVE};
use crate::error::{FatImgError, Result};
use crate::fat;
use crate::fsinfo::FsInfo;

/// A handle to a (possibly fresh, possibly truncated) file's directory
/// entry slot, ready to receive a write stream.
pub struct FileHandle {
    pub dir_entry: EntryLocation,
    /// Whether this handle reused an existing file's slot (its old chain
    /// was freed). `cli::copy` uses this to emit the "not interactive,
    /// overwriting" warning spec.md §4.7/§9 calls for.
    pub overwrote_existing: bool,
}

/// Overwrite confirmation collaborator: "not interactive" defaults
/// to yes-with-warning.
pub trait OverwriteDecision {
    fn confirm_overwrite(&self, path: &str) -> bool;
}

pub struct AlwaysOverwrite;
impl OverwriteDecision for AlwaysOverwrite {
    fn confirm_overwrite(&self, _path: &str) -> bool {
        true
    }
}

/// Splits `path` into `(parent, last_component)`; `canonical_to_dir`s the
/// last component; resolves the parent; creates a free slot or reuses an
/// existing file's slot after confirming overwrite and freeing its chain.
pub fn open_file(
    image: &mut Image,
    bpb: &Bpb,
    fsinfo: &mut Option<FsInfo>,
    path: &str,
    overwrite: &dyn OverwriteDecision,
    now: DosTimestamp,
) -> Result<FileHandle> {
    let (parent_path, last) = split_path(path)?;
    let name = crate::entry::canonical_to_dir(last)?;
    let parent_cluster = dir::open_dir(image, bpb, parent_path)?;

    let existing = dir::find_entry(image, bpb, parent_cluster, &name)?;

    let (slot, overwrote_existing) = match existing {
        Some((_loc, entry)) if entry.is_dir() => {
            return Err(FatImgError::Conflict(format!("'{last}' is a directory")));
        }
        Some((loc, entry)) => {
            if !overwrite.confirm_overwrite(path) {
                return Err(FatImgError::AlreadyExists(last.to_string()));
            }
            // Free the existing chain fully before resetting start/size below,
            // never the reverse — otherwise a crash mid-truncation could
            // strand the old chain with no directory entry pointing at it.
            fat::free_chain(image, bpb, fsinfo, entry.start_cluster())?;
            (loc, true)
        }
        None => (dir::get_free_dirent(image, bpb, fsinfo, parent_cluster)?, false),
    };

    let mut entry = ShortDirEntry::empty();
    entry.name = name;
    entry.attr = ATTR_ARCHIVE;
    entry.size = 0;
    entry.set_start_cluster(0);
    entry.stamp(now);
    slot.write(image, &entry)?;

    Ok(FileHandle { dir_entry: slot, overwrote_existing })
}

fn split_path(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => {
            let (parent, rest) = trimmed.split_at(idx);
            let last = &rest[1..];
            if last.is_empty() {
                return Err(FatImgError::BadArgument(format!("'{path}' has no file name component")));
            }
            Ok((if parent.is_empty() { "/" } else { parent }, last))
        }
        None => {
            if trimmed.is_empty() {
                return Err(FatImgError::BadArgument("empty path".into()));
            }
            Ok(("/", trimmed))
        }
    }
}

/// Streams `host_source`'s contents into the image in cluster-sized chunks,
/// updating the directory entry's `start`/`size` and FSInfo after each
/// chunk so a partial write leaves a valid, if short, chain.
pub fn copy_file(image: &mut Image, bpb: &Bpb, fsinfo: &mut Option<FsInfo>, host_source: &Path, handle: &FileHandle) -> Result<()> {
    let mut source = HostFile::open(host_source).map_err(|e| FatImgError::io_at(host_source, e))?;
    let total_len = source.metadata().map_err(|e| FatImgError::io_at(host_source, e))?.len();
    if total_len > u32::MAX as u64 {
        return Err(FatImgError::BadArgument(format!("'{}' exceeds the maximum FAT file size", host_source.display())));
    }

    let cluster_bytes = bpb.cluster_size_bytes() as usize;
    let mut chunk = vec![0u8; cluster_bytes];
    let mut first_cluster: u32 = 0;
    let mut prev_cluster: u32 = 0;
    let mut written: u64 = 0;

    loop {
        let n = read_fill(&mut source, &mut chunk)?;
        if n == 0 {
            break;
        }

        let cluster = fat::allocate_cluster(image, bpb, fsinfo)?;
        if first_cluster == 0 {
            first_cluster = cluster;
        } else {
            fat::link(image, bpb, prev_cluster, cluster)?;
        }

        write_cluster(image, bpb, cluster, &chunk[..n])?;
        // allocate_cluster already sets FAT[cluster] = EOC.

        written += n as u64;
        prev_cluster = cluster;

        let mut entry = handle.dir_entry.read(image)?;
        if entry.start_cluster() == 0 {
            entry.set_start_cluster(first_cluster);
        }
        entry.size = written as u32;
        handle.dir_entry.write(image, &entry)?;

        if n < cluster_bytes {
            break;
        }
    }

    Ok(())
}

fn read_fill(source: &mut HostFile, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = source.read(&mut buf[total..]).map_err(FatImgError::io)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn write_cluster(image: &mut Image, bpb: &Bpb, cluster: u32, data: &[u8]) -> Result<()> {
    let base_sector = bpb.first_sector_of_cluster(cluster);
    let mut offset = 0usize;
    let mut sector_idx = 0u64;
    while offset < bpb.cluster_size_bytes() as usize {
        let mut sector_buf = [0u8; SECTOR_SIZE];
        let remaining = data.len().saturating_sub(offset);
        let take = remaining.min(SECTOR_SIZE);
        if take > 0 {
            sector_buf[..take].copy_from_slice(&data[offset..offset + take]);
        }
        image.write_sector(base_sector + sector_idx, &sector_buf)?;
        offset += SECTOR_SIZE;
        sector_idx += 1;
    }
    Ok(())
}

/// Walks `handle`'s chain, writing its exact byte count out to
/// `host_target`.
pub fn copy_from_image(image: &mut Image, bpb: &Bpb, start_cluster: u32, size: u32, host_target: &Path) -> Result<()> {
    let mut target = HostFile::create(host_target).map_err(|e| FatImgError::io_at(host_target, e))?;
    if start_cluster == 0 || size == 0 {
        return Ok(());
    }

    let mut remaining = size as u64;
    let mut current = start_cluster;
    loop {
        let base_sector = bpb.first_sector_of_cluster(current);
        for s in 0..bpb.sectors_per_cluster as u64 {
            if remaining == 0 {
                break;
            }
            let mut buf = [0u8; SECTOR_SIZE];
            image.read_sector(base_sector + s, &mut buf)?;
            let take = remaining.min(SECTOR_SIZE as u64) as usize;
            target.write_all(&buf[..take]).map_err(|e| FatImgError::io_at(host_target, e))?;
            remaining -= take as u64;
        }
        if remaining == 0 {
            break;
        }
        match fat::next_in_chain(image, bpb, current)? {
            Some(next) => current = next,
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpb::SizeFat;
    use crate::clock::{FixedClock, WallClock};
    use crate::device::OpenMode;
    use crate::format;
    use std::io::Write as _;

    fn fresh_volume(size: u64) -> (tempfile::TempDir, std::path::PathBuf, Bpb) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.img");
        let clock = FixedClock(WallClock { year: 2026, month: 7, day: 27, hour: 1, minute: 0, second: 0 });
        let opts = format::FormatOptions {
            image_size_bytes: size,
            size_fat_hint: Some(SizeFat::Fat12),
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
    fn copy_in_then_out_round_trips() {
        let (tmp, path, bpb) = fresh_volume(1_474_560);
        let host_src = tmp.path().join("hello.txt");
        std::fs::File::create(&host_src).unwrap().write_all(b"hello\n").unwrap();

        let mut image = Image::open(&path, OpenMode::ReadWrite, 0).unwrap();
        let mut fsinfo = None;
        let now = DosTimestamp::pack(&WallClock { year: 2026, month: 7, day: 27, hour: 1, minute: 0, second: 0 });
        let handle = open_file(&mut image, &bpb, &mut fsinfo, "/HELLO.TXT", &AlwaysOverwrite, now).unwrap();
        copy_file(&mut image, &bpb, &mut fsinfo, &host_src, &handle).unwrap();

        let entry = handle.dir_entry.read(&mut image).unwrap();
        assert_eq!(entry.size, 6);

        let host_out = tmp.path().join("out.txt");
        copy_from_image(&mut image, &bpb, entry.start_cluster(), entry.size, &host_out).unwrap();
        let out_bytes = std::fs::read(&host_out).unwrap();
        assert_eq!(out_bytes, b"hello\n");
    }

    #[test]
    fn overwrite_frees_previous_chain_and_keeps_single_entry() {
        let (tmp, path, bpb) = fresh_volume(1_474_560);
        let host_src = tmp.path().join("a.txt");
        std::fs::File::create(&host_src).unwrap().write_all(b"0123456789").unwrap();

        let mut image = Image::open(&path, OpenMode::ReadWrite, 0).unwrap();
        let mut fsinfo = None;
        let now = DosTimestamp::pack(&WallClock { year: 2026, month: 7, day: 27, hour: 1, minute: 0, second: 0 });

        let handle1 = open_file(&mut image, &bpb, &mut fsinfo, "/A.TXT", &AlwaysOverwrite, now).unwrap();
        copy_file(&mut image, &bpb, &mut fsinfo, &host_src, &handle1).unwrap();
        let first_entry = handle1.dir_entry.read(&mut image).unwrap();
        let old_cluster = first_entry.start_cluster();

        std::fs::File::create(&host_src).unwrap().write_all(b"short").unwrap();
        let handle2 = open_file(&mut image, &bpb, &mut fsinfo, "/A.TXT", &AlwaysOverwrite, now).unwrap();
        copy_file(&mut image, &bpb, &mut fsinfo, &host_src, &handle2).unwrap();
        let second_entry = handle2.dir_entry.read(&mut image).unwrap();
        assert_eq!(second_entry.size, 5);

        assert_eq!(fat::read_entry(&mut image, &bpb, old_cluster).unwrap(), 0);

        let root_cluster = 0;
        let name = crate::entry::canonical_to_dir("A.TXT").unwrap();
        let matches: Vec<_> = {
            let mut iter = dir::DirIter::new(&bpb, root_cluster, false);
            let mut found = Vec::new();
            loop {
                match iter.next_entry(&mut image, &bpb).unwrap() {
                    dir::IterResult::Entry(_, e) if !e.is_free() && e.name == name => found.push(e),
                    dir::IterResult::Entry(_, _) => continue,
                    _ => break,
                }
            }
            found
        };
        assert_eq!(matches.len(), 1);
    }
}
