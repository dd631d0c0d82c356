//! `fatimg mkdir`: create one or more directories inside an image.

use std::path::PathBuf;

use clap::Args;

use crate::clock::SystemClock;
use crate::codec::DosTimestamp;
use crate::device::OpenMode;
use crate::dir;
use crate::error::Result;
use crate::volume::Volume;

#[derive(Args)]
pub struct MkdirArgs {
    /// Directories to create.
    #[arg(required = true)]
    pub dirs: Vec<String>,

    /// Image file to modify.
    #[arg(short = 'i')]
    pub image: PathBuf,

    /// Sectors to skip at the start of the image (for an embedded partition).
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

pub fn run(args: &MkdirArgs) -> Result<()> {
    let mut volume = Volume::open(&args.image, OpenMode::ReadWrite, args.offset)?;
    let now = DosTimestamp::now(&SystemClock);

    for target in &args.dirs {
        let trimmed = target.trim_end_matches(['/', '\\']);
        let (parent_path, leaf) = match trimmed.rfind(['/', '\\']) {
            Some(idx) => {
                let (parent, rest) = trimmed.split_at(idx);
                (if parent.is_empty() { "/" } else { parent }, &rest[1..])
            }
            None => ("/", trimmed),
        };
        let parent_cluster = dir::open_dir(&mut volume.image, &volume.bpb, parent_path)?;
        let name = crate::entry::canonical_to_dir(leaf)?;
        dir::create_dir(&mut volume.image, &volume.bpb, &mut volume.fsinfo, parent_cluster, &name, now)?;
    }

    volume.flush()
}
