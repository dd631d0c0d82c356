//! Image I/O: positioned 512-byte sector access against the backing
//! host file, shifted by a per-invocation volume-offset-sectors constant.
//!
//! `std::fs::File` wrapped behind `Seek`/`Read`/`Write`, addressed in
//! whole sectors through a small `BlockDevice` trait so an in-memory
//! fake can stand in for it in tests.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{FatImgError, Result};

pub const SECTOR_SIZE: usize = 512;

/// How the backing file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    CreateReadWrite,
}

/// Minimal sector-addressed block device seam, so an alternative backing
/// (e.g. an in-memory fake for tests) can stand in for `Image`.
pub trait BlockDevice {
    fn read_sector(&mut self, sector: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<()>;
    fn write_sector(&mut self, sector: u64, buf: &[u8; SECTOR_SIZE]) -> Result<()>;
}

/// A FAT image backed by a regular host file.
///
/// `volume_offset_sectors` shifts every sector address so the toolkit can
/// operate on a partition embedded inside a larger image (the `--offset`
/// CLI input).
pub struct Image {
    file: File,
    path: std::path::PathBuf,
    volume_offset_sectors: u64,
}

impl Image {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, volume_offset_sectors: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match mode {
            OpenMode::ReadOnly => OpenOptions::new().read(true).open(&path),
            OpenMode::ReadWrite => OpenOptions::new().read(true).write(true).open(&path),
            OpenMode::CreateReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path),
        }
        .map_err(|e| FatImgError::io_at(path.clone(), e))?;
        Ok(Image { file, path, volume_offset_sectors })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn volume_offset_sectors(&self) -> u64 {
        self.volume_offset_sectors
    }

    /// Current size of the backing file in bytes.
    pub fn len(&self) -> Result<u64> {
        self.file.metadata().map(|m| m.len()).map_err(|e| FatImgError::io_at(self.path.clone(), e))
    }

    /// Extends the file to `new_len` bytes by appending zeroed sectors.
    /// Used by the formatter when creating a fresh image.
    pub fn extend_to(&mut self, new_len: u64) -> Result<()> {
        let cur = self.len()?;
        if new_len <= cur {
            return Ok(());
        }
        self.file.seek(SeekFrom::End(0)).map_err(|e| FatImgError::io_at(self.path.clone(), e))?;
        let zeros = [0u8; SECTOR_SIZE];
        let mut remaining = new_len - cur;
        while remaining > 0 {
            let chunk = remaining.min(SECTOR_SIZE as u64) as usize;
            self.file.write_all(&zeros[..chunk]).map_err(|e| FatImgError::io_at(self.path.clone(), e))?;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// Seeks to `volume_offset_sectors * 512 + byte_offset`.
    fn seek_byte(&mut self, byte_offset: u64) -> Result<()> {
        let abs = self.volume_offset_sectors * SECTOR_SIZE as u64 + byte_offset;
        self.file.seek(SeekFrom::Start(abs)).map_err(|e| FatImgError::io_at(self.path.clone(), e))?;
        Ok(())
    }

    pub fn seek_sector(&mut self, sector: u64) -> Result<()> {
        self.seek_byte(sector * SECTOR_SIZE as u64)
    }

    /// Reads a byte range that need not be sector-aligned, used for reading
    /// a partial final sector of a file's last cluster.
    pub fn read_at(&mut self, byte_offset: u64, buf: &mut [u8]) -> Result<()> {
        self.seek_byte(byte_offset)?;
        self.file.read_exact(buf).map_err(|e| FatImgError::io_at(self.path.clone(), e))
    }

    pub fn write_at(&mut self, byte_offset: u64, buf: &[u8]) -> Result<()> {
        self.seek_byte(byte_offset)?;
        self.file.write_all(buf).map_err(|e| FatImgError::io_at(self.path.clone(), e))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush().map_err(|e| FatImgError::io_at(self.path.clone(), e))
    }
}

impl BlockDevice for Image {
    fn read_sector(&mut self, sector: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<()> {
        self.seek_sector(sector)?;
        self.file.read_exact(buf).map_err(|e| FatImgError::io_at(self.path.clone(), e))
    }

    fn write_sector(&mut self, sector: u64, buf: &[u8; SECTOR_SIZE]) -> Result<()> {
        self.seek_sector(sector)?;
        self.file.write_all(buf).map_err(|e| FatImgError::io_at(self.path.clone(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_image(len: u64) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.img");
        let mut f = File::create(&path).unwrap();
        f.write_all(&vec![0u8; len as usize]).unwrap();
        (dir, path)
    }

    #[test]
    fn round_trip_sector() {
        let (_dir, path) = temp_image(4096);
        let mut img = Image::open(&path, OpenMode::ReadWrite, 0).unwrap();
        let mut sector = [0xABu8; SECTOR_SIZE];
        img.write_sector(3, &sector).unwrap();
        sector = [0u8; SECTOR_SIZE];
        img.read_sector(3, &mut sector).unwrap();
        assert!(sector.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn volume_offset_shifts_addresses() {
        let (_dir, path) = temp_image(8192);
        let mut img = Image::open(&path, OpenMode::ReadWrite, 2).unwrap();
        let sector = [0x11u8; SECTOR_SIZE];
        img.write_sector(0, &sector).unwrap();
        drop(img);
        let mut raw = Image::open(&path, OpenMode::ReadOnly, 0).unwrap();
        let mut check = [0u8; SECTOR_SIZE];
        raw.read_sector(2, &mut check).unwrap();
        assert!(check.iter().all(|&b| b == 0x11));
    }

    #[test]
    fn extend_pads_with_zeros() {
        let (_dir, path) = temp_image(512);
        let mut img = Image::open(&path, OpenMode::ReadWrite, 0).unwrap();
        img.extend_to(2048).unwrap();
        assert_eq!(img.len().unwrap(), 2048);
        let mut buf = [0xFFu8; SECTOR_SIZE];
        img.read_sector(2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }
}
