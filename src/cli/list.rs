//! `fatimg list`: print directory entries in physical on-disk order.

use std::path::PathBuf;

use clap::Args;

use crate::codec::DosTimestamp;
use crate::device::OpenMode;
use crate::dir::{self, DirIter, IterResult};
use crate::error::Result;
use crate::volume::Volume;

#[derive(Args)]
pub struct ListArgs {
    /// Directories to list; defaults to the root.
    pub dirs: Vec<String>,

    /// Image file to read.
    #[arg(short = 'i')]
    pub image: PathBuf,

    /// Sectors to skip at the start of the image (for an embedded partition).
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

pub fn run(args: &ListArgs) -> Result<()> {
    let mut volume = Volume::open(&args.image, OpenMode::ReadOnly, args.offset)?;
    let targets: Vec<String> = if args.dirs.is_empty() { vec!["/".to_string()] } else { args.dirs.clone() };
    let multiple = targets.len() > 1;

    for (i, target) in targets.iter().enumerate() {
        if multiple {
            if i > 0 {
                println!();
            }
            println!("{target}:");
        }
        let cluster = dir::open_dir(&mut volume.image, &volume.bpb, target)?;
        list_one(&mut volume, cluster)?;
    }
    Ok(())
}

fn list_one(volume: &mut Volume, cluster: u32) -> Result<()> {
    let mut iter = DirIter::new(&volume.bpb, cluster, false);
    loop {
        match iter.next_entry(&mut volume.image, &volume.bpb)? {
            IterResult::Entry(_, entry) => {
                if entry.is_free() || entry.is_long_name() || entry.is_volume_id() {
                    continue;
                }
                let size_col = if entry.is_dir() { "<DIR>".to_string() } else { entry.size.to_string() };
                let ts = DosTimestamp { date: entry.date, time: entry.time };
                println!(
                    "{:<12} {:>10}  {:04}-{:02}-{:02}  {:02}:{:02}:{:02}",
                    entry.display_name(),
                    size_col,
                    ts.year(),
                    ts.month(),
                    ts.day(),
                    ts.hour(),
                    ts.minute(),
                    ts.second()
                );
            }
            IterResult::End | IterResult::Exhausted => break,
        }
    }
    Ok(())
}
