//! FSInfo maintenance: FAT32's free-cluster count and next-free
//! cluster hint, cached in the info sector and updated on every allocation
//! or free.

use crate::bpb::Bpb;
use crate::codec::{read_u32, write_u32};
use crate::device::{Image, SECTOR_SIZE};
use crate::error::Result;

const LEAD_SIG: u32 = 0x4161_5252; // "RRaA"
const STRUCT_SIG: u32 = 0x6141_7272;
const TRAIL_SIG: [u8; 4] = [0x00, 0x00, 0x55, 0xAA];

#[derive(Debug, Clone, Copy)]
pub struct FsInfo {
    pub free_clusters: u32,
    pub next_cluster: u32,
}

impl FsInfo {
    pub fn read(image: &mut Image, bpb: &Bpb) -> Result<Self> {
        let mut buf = [0u8; SECTOR_SIZE];
        image.read_sector(bpb.info_sector as u64, &mut buf)?;
        let free_clusters = read_u32(&buf[488..492]);
        let next_cluster = read_u32(&buf[492..496]);
        Ok(FsInfo { free_clusters, next_cluster })
    }

    pub fn write(&self, image: &mut Image, bpb: &Bpb) -> Result<()> {
        let mut buf = [0u8; SECTOR_SIZE];
        write_u32(&mut buf[0..4], LEAD_SIG);
        write_u32(&mut buf[484..488], STRUCT_SIG);
        write_u32(&mut buf[488..492], self.free_clusters);
        write_u32(&mut buf[492..496], self.next_cluster);
        buf[508..512].copy_from_slice(&TRAIL_SIG);
        image.write_sector(bpb.info_sector as u64, &buf)
    }

    pub fn on_allocate(&mut self, allocated: u32) {
        self.free_clusters = self.free_clusters.saturating_sub(1);
        self.next_cluster = allocated;
    }

    pub fn on_free(&mut self) {
        self.free_clusters = self.free_clusters.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpb::{Bpb, EstablishParams, SizeFat};
    use crate::device::OpenMode;
    use std::fs::File;
    use std::io::Write;

    fn fat32_volume() -> (tempfile::TempDir, std::path::PathBuf, Bpb) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.img");
        let size = 512 * 1024 * 1024;
        let mut f = File::create(&path).unwrap();
        f.write_all(&vec![0u8; 4096]).unwrap();
        drop(f);
        let params = EstablishParams { image_size_bytes: size, size_fat_hint: Some(SizeFat::Fat32), ..Default::default() };
        let bpb = Bpb::establish(&params).unwrap();
        (dir, path, bpb)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_dir, path, bpb) = fat32_volume();
        let mut image = Image::open(&path, OpenMode::ReadWrite, 0).unwrap();
        image.extend_to((bpb.info_sector as u64 + 1) * SECTOR_SIZE as u64).unwrap();
        let info = FsInfo { free_clusters: 12345, next_cluster: 2 };
        info.write(&mut image, &bpb).unwrap();
        let read_back = FsInfo::read(&mut image, &bpb).unwrap();
        assert_eq!(read_back.free_clusters, 12345);
        assert_eq!(read_back.next_cluster, 2);
    }

    #[test]
    fn allocate_decrements_free_advances_hint() {
        let mut info = FsInfo { free_clusters: 10, next_cluster: 2 };
        info.on_allocate(3);
        assert_eq!(info.free_clusters, 9);
        assert_eq!(info.next_cluster, 3);
    }

    #[test]
    fn free_clamps_at_zero_never_underflows() {
        let mut info = FsInfo { free_clusters: 0, next_cluster: 2 };
        // on_free only increments; underflow clamp matters for repeated allocates below zero.
        let mut alloc_info = FsInfo { free_clusters: 0, next_cluster: 2 };
        alloc_info.on_allocate(5);
        assert_eq!(alloc_info.free_clusters, 0);
        info.on_free();
        assert_eq!(info.free_clusters, 1);
    }
}
