//! Code-section encryption and stub injection.
//!
//! Encrypts `.text` in place with the fixed XOR key, writes the decrypt stub
//! into the reserved placeholder section, makes the stub's segment
//! executable and the code segment writable (the stub decrypts into the
//! same mapped pages), and redirects the entry point to the stub.

use std::fmt;

use crate::crypto::xor_cipher::{self, PACK_KEY};
use crate::elf::parser::{PF_W, PF_X};
use crate::elf::writer;
use crate::elf::ElfFile;
use crate::resolve::ResolvedTargets;
use crate::stub::{StubParams, StubTemplate, DECRYPT_STUB, PADDING_BYTE};

/// Build-contract violations found before anything is modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackError {
    /// The placeholder section is smaller than the stub.
    StubTooSmall { reserved: u64, required: usize },
    /// A rel32 field cannot reach its target.
    DisplacementOutOfRange { from: u64, to: u64 },
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackError::StubTooSmall { reserved, required } => write!(
                f,
                "stub section too small: {reserved} bytes reserved, {required} required"
            ),
            PackError::DisplacementOutOfRange { from, to } => write!(
                f,
                "0x{to:X} is out of rel32 range from 0x{from:X}"
            ),
        }
    }
}

impl std::error::Error for PackError {}

/// What [`pack`] did, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackReport {
    pub old_entry: u64,
    pub new_entry: u64,
    pub code_addr: u64,
    pub code_len: u64,
    pub stub_len: usize,
    pub key: u8,
    pub code_displacement: i32,
    pub entry_displacement: i32,
}

/// `to - from` as a rel32.
fn rel32(from: u64, to: u64) -> Result<i32, PackError> {
    i32::try_from(to.wrapping_sub(from) as i64)
        .map_err(|_| PackError::DisplacementOutOfRange { from, to })
}

/// Pack with [`DECRYPT_STUB`] and [`PACK_KEY`].
pub fn pack(elf: &mut ElfFile, targets: &ResolvedTargets) -> Result<PackReport, PackError> {
    pack_with(elf, targets, &DECRYPT_STUB, PACK_KEY)
}

/// Pack `elf` in place.  All checks run before the first byte changes, so an
/// `Err` leaves the image untouched.
pub fn pack_with(
    elf: &mut ElfFile,
    targets: &ResolvedTargets,
    template: &StubTemplate,
    key: u8,
) -> Result<PackReport, PackError> {
    let code = elf.sections[targets.code_section];
    let stub = elf.sections[targets.stub_section];

    if stub.size < template.len() as u64 {
        return Err(PackError::StubTooSmall { reserved: stub.size, required: template.len() });
    }

    let old_entry = elf.header.entry;
    let new_entry = stub.addr;

    // Both displacements count from the end of the instruction that uses
    // them, never from its start.
    let self_location = stub.addr.wrapping_add(template.self_location as u64);
    let exit = stub.addr.wrapping_add(template.exit as u64);
    let params = StubParams {
        code_displacement: rel32(self_location, code.addr)?,
        code_length: code.size,
        key,
        entry_displacement: rel32(exit, old_entry)?,
    };

    // --- mutate ------------------------------------------------------------
    xor_cipher::apply(elf.section_data_mut(targets.code_section), key);

    writer::or_segment_flags(elf, targets.stub_segment, PF_X);
    writer::or_segment_flags(elf, targets.code_segment, PF_W);

    let stub_bytes = elf.section_data_mut(targets.stub_section);
    template.materialize(stub_bytes, &params);
    stub_bytes[template.len()..].fill(PADDING_BYTE);

    writer::set_entry_point(elf, new_entry);

    Ok(PackReport {
        old_entry,
        new_entry,
        code_addr: code.addr,
        code_len: code.size,
        stub_len: template.len(),
        key,
        code_displacement: params.code_displacement,
        entry_displacement: params.entry_displacement,
    })
}
