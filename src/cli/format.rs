//! `fatimg format`: create or overwrite a FAT filesystem image.

use std::path::PathBuf;

use clap::Args;

use crate::bpb::SizeFat;
use crate::clock::SystemClock;
use crate::device::SECTOR_SIZE;
use crate::diagnostics::DiagnosticSink;
use crate::error::{FatImgError, Result};
use crate::format::{self, FormatOptions};

#[derive(Args)]
pub struct FormatArgs {
    /// Image file to create or overwrite.
    pub image: PathBuf,

    /// Force the FAT flavor instead of choosing one by size.
    #[arg(short = 'F', value_parser = ["12", "16", "32"])]
    pub size_fat: Option<String>,

    /// Volume label, at most 11 characters.
    #[arg(short = 'n')]
    pub label: Option<String>,

    /// Print the computed BPB fields after formatting.
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Overlay a caller-supplied 512-byte boot sector image.
    #[arg(long)]
    pub boot: Option<PathBuf>,

    /// Image size in KiB. Required when creating a new image.
    #[arg(long)]
    pub blocks: Option<u64>,

    /// Sectors to skip at the start of the image (for an embedded partition).
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

pub fn run(args: &FormatArgs, _sink: &dyn DiagnosticSink) -> Result<()> {
    let size_fat_hint = match args.size_fat.as_deref() {
        Some("12") => Some(SizeFat::Fat12),
        Some("16") => Some(SizeFat::Fat16),
        Some("32") => Some(SizeFat::Fat32),
        Some(other) => return Err(FatImgError::BadArgument(format!("unsupported -F value '{other}'"))),
        None => None,
    };

    let volume_label = args.label.as_deref().map(format::validate_label).transpose()?;

    let boot_code = match &args.boot {
        Some(path) => {
            let bytes = std::fs::read(path).map_err(|e| FatImgError::io_at(path.clone(), e))?;
            if bytes.len() != SECTOR_SIZE {
                return Err(FatImgError::BadArgument(format!(
                    "--boot file must be exactly {SECTOR_SIZE} bytes, got {}",
                    bytes.len()
                )));
            }
            let mut buf = [0u8; SECTOR_SIZE];
            buf.copy_from_slice(&bytes);
            Some(buf)
        }
        None => None,
    };

    let image_size_bytes = match args.blocks {
        Some(kib) => kib * 1024,
        None => {
            let existing = std::fs::metadata(&args.image).map_err(|e| FatImgError::io_at(args.image.clone(), e))?;
            existing.len().saturating_sub(args.offset * SECTOR_SIZE as u64)
        }
    };

    let opts = FormatOptions { image_size_bytes, size_fat_hint, volume_label, boot_code, number_of_fats: 2 };
    let report = format::format_with_offset(&args.image, &opts, &SystemClock, args.offset)?;

    if args.verbose {
        let bpb = &report.bpb;
        println!("bytes_per_sector: {}", bpb.bytes_per_sector);
        println!("sectors_per_cluster: {}", bpb.sectors_per_cluster);
        println!("reserved_sectors: {}", bpb.reserved_sectors);
        println!("number_of_fats: {}", bpb.number_of_fats);
        println!("sectors_per_fat: {}", bpb.sectors_per_fat());
        println!("root_entries: {}", bpb.root_entries);
        println!("total_sectors: {}", bpb.total_sectors());
        println!("size_fat: {}", bpb.size_fat.bits());
        println!("media_descriptor: {:#04x}", bpb.media_descriptor);
        if bpb.is_fat32() {
            println!("root_cluster: {}", bpb.root_cluster);
            println!("info_sector: {}", bpb.info_sector);
            println!("backup_boot: {}", bpb.backup_boot);
        }
    }

    Ok(())
}
