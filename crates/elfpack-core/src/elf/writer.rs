//! ELF writer module.
//!
//! Header and program-header edits go through here so the parsed view in
//! [`ElfFile`] and the raw bytes never disagree, and [`dump`] serialises the
//! buffer next to the caller as `<name>_packed`.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use super::parser::{ElfFile, E_ENTRY_OFFSET, P_FLAGS_OFFSET};

/// Suffix appended to the input's file name.
pub const PACKED_SUFFIX: &str = "_packed";
/// Upper bound on the output file name, suffix included.
pub const MAX_FILENAME: usize = 100;

/// Write a `u32` at `offset` in little-endian order.
fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Write a `u64` at `offset` in little-endian order.
fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Point `e_entry` at `addr`.
pub fn set_entry_point(elf: &mut ElfFile, addr: u64) {
    elf.header.entry = addr;
    put_u64(&mut elf.data, E_ENTRY_OFFSET, addr);
}

/// OR `bits` into the flags of program header `index`, leaving the other
/// bits alone.
pub fn or_segment_flags(elf: &mut ElfFile, index: usize, bits: u32) {
    let flags = elf.segments[index].flags | bits;
    elf.segments[index].flags = flags;
    let offset = elf.program_header_offset(index) + P_FLAGS_OFFSET;
    put_u32(&mut elf.data, offset, flags);
}

/// `<last path component><PACKED_SUFFIX>`, with the component's raw bytes
/// cut short so the whole name stays within [`MAX_FILENAME`].  Names that are
/// not valid UTF-8 pass through unchanged.
pub fn output_file_name(original: &Path) -> OsString {
    let base = original.file_name().unwrap_or(original.as_os_str()).as_bytes();
    let keep = base.len().min(MAX_FILENAME - PACKED_SUFFIX.len());

    let mut name = base[..keep].to_vec();
    name.extend_from_slice(PACKED_SUFFIX.as_bytes());
    OsString::from_vec(name)
}

/// Write the packed image into the current directory.
pub fn dump(elf: &ElfFile, original: &Path) -> io::Result<PathBuf> {
    dump_into(elf, original, Path::new("."))
}

/// Write the packed image into `dir`, returning the path written.  An `Err`
/// means the image is not on disk; copying the input's permission bits
/// afterwards is best effort.
pub fn dump_into(elf: &ElfFile, original: &Path, dir: &Path) -> io::Result<PathBuf> {
    let output = dir.join(output_file_name(original));
    fs::write(&output, &elf.data)?;
    let _ = copy_permissions(original, &output);
    Ok(output)
}

/// Give `output` the permission bits of `original`.
fn copy_permissions(original: &Path, output: &Path) -> io::Result<()> {
    let meta = fs::metadata(original)?;
    fs::set_permissions(output, meta.permissions())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
