//! The Volume handle: a single value carrying the backing image, its
//! parsed BPB, and (for FAT32) the FSInfo cache, so a process can open
//! more than one image at a time and every operation takes its volume as
//! an explicit parameter rather than reaching for global state.

use std::path::Path;

use crate::bpb::Bpb;
use crate::device::{Image, OpenMode, SECTOR_SIZE};
use crate::error::Result;
use crate::fsinfo::FsInfo;

pub struct Volume {
    pub image: Image,
    pub bpb: Bpb,
    pub fsinfo: Option<FsInfo>,
}

impl Volume {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, volume_offset_sectors: u64) -> Result<Self> {
        let mut image = Image::open(path, mode, volume_offset_sectors)?;
        let mut sector0 = [0u8; SECTOR_SIZE];
        image.read_sector(0, &mut sector0)?;
        let bpb = Bpb::parse(&sector0)?;
        let fsinfo = if bpb.is_fat32() { Some(FsInfo::read(&mut image, &bpb)?) } else { None };
        Ok(Volume { image, bpb, fsinfo })
    }

    /// Cluster at which directory traversal starts: the FAT32 root cluster,
    /// or 0 for the FAT12/16 fixed-size root area.
    pub fn root_cluster(&self) -> u32 {
        if self.bpb.is_fat32() {
            self.bpb.root_cluster
        } else {
            0
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.image.flush()
    }
}
