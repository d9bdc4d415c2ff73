//! Static packer for x86-64 ELF64 executables.
//!
//! The pipeline is strictly sequential and every stage takes the image
//! explicitly:
//!
//! ```no_run
//! use std::path::Path;
//! use elfpack_core::{elf, resolve, transform};
//!
//! let input = Path::new("target/release/app");
//! let mut image = elf::load(input)?;
//! let targets = resolve::resolve(&image, &resolve::SectionNames::default())?;
//! transform::pack(&mut image, &targets)?;
//! elf::writer::dump(&image, input)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod crypto;
pub mod elf;
pub mod resolve;
pub mod stub;
pub mod transform;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod fixture;
