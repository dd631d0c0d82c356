//! `fatimg`: an offline FAT12/16/32 image toolkit.
//!
//! The library is organized leaves-first: [`codec`] and [`clock`] underpin
//! [`device`]'s sector I/O; [`bpb`] builds on both to parse or establish a
//! volume's geometry; [`fat`] and [`fsinfo`] implement the allocation table;
//! [`entry`] and [`dir`] implement the 8.3 directory schema; [`file`] and
//! [`format`] are the end-user operations; [`volume`] ties a backing image,
//! its BPB, and its FSInfo cache together as the single value every
//! operation takes explicitly. [`diagnostics`] and the `cli` binary-only
//! module are the external collaborators consumed by the CLI layer.
//!
//! Long filenames (VFAT) are not implemented: only the 8.3 short-name
//! directory schema is read and written. Long-name entries encountered on
//! disk are skipped as opaque noise.

pub mod bpb;
pub mod cli;
pub mod clock;
pub mod codec;
pub mod device;
pub mod diagnostics;
pub mod dir;
pub mod entry;
pub mod error;
pub mod fat;
pub mod file;
pub mod format;
pub mod fsinfo;
pub mod volume;

pub use error::{FatImgError, Result};
