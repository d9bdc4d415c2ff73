//! Minimal ELF64 parser.
//!
//! Accepts little-endian x86-64 executables and shared objects only.  Every
//! header table and every section with file bytes is bounds-checked against
//! the image before an [`ElfFile`] is handed out, so later passes can slice
//! the owned buffer without re-validating.

use std::fmt;
use std::ops::Range;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an ELF image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElfError {
    /// The buffer is shorter than the 64-byte ELF64 header.
    TooSmall(usize),
    /// The first four bytes are not `\x7FELF`.
    InvalidMagic,
    /// `EI_CLASS` is not `ELFCLASS64`.
    UnsupportedClass(u8),
    /// `EI_DATA` is not little-endian.
    UnsupportedEncoding(u8),
    /// `e_type` is neither `ET_EXEC` nor `ET_DYN`.
    UnsupportedType(u16),
    /// `e_machine` is not x86-64.
    UnsupportedMachine(u16),
    /// `e_shentsize` / `e_phentsize` does not match the ELF64 layout.
    BadEntrySize { table: &'static str, size: u16 },
    /// The section header table extends past the end of the buffer.
    SectionTableOutOfBounds,
    /// The program header table extends past the end of the buffer.
    ProgramTableOutOfBounds,
    /// `e_shstrndx` does not name a section.
    BadStringTableIndex(u16),
    /// A section's file bytes extend past the end of the buffer.
    SectionOutOfBounds(usize),
    /// A read ran past the end of the buffer.
    Truncated,
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElfError::TooSmall(len) => {
                write!(f, "input too small to be a valid ELF ({len} bytes)")
            }
            ElfError::InvalidMagic => write!(f, "not an ELF file (bad magic)"),
            ElfError::UnsupportedClass(c) => {
                write!(f, "unsupported ELF class {c} (only ELF64 is supported)")
            }
            ElfError::UnsupportedEncoding(d) => {
                write!(f, "unsupported data encoding {d} (only little-endian is supported)")
            }
            ElfError::UnsupportedType(t) => {
                write!(f, "unsupported ELF type {t} (expected an executable)")
            }
            ElfError::UnsupportedMachine(m) => {
                write!(f, "unsupported machine type: 0x{m:04X}")
            }
            ElfError::BadEntrySize { table, size } => {
                write!(f, "invalid {table} entry size {size}")
            }
            ElfError::SectionTableOutOfBounds => write!(f, "invalid section header table"),
            ElfError::ProgramTableOutOfBounds => write!(f, "invalid program header table"),
            ElfError::BadStringTableIndex(i) => {
                write!(f, "section name string table index {i} out of range")
            }
            ElfError::SectionOutOfBounds(i) => {
                write!(f, "section {i} extends past the end of the file")
            }
            ElfError::Truncated => write!(f, "file is truncated"),
        }
    }
}

impl std::error::Error for ElfError {}

// ---------------------------------------------------------------------------
// Little-endian read helpers
// ---------------------------------------------------------------------------

fn bytes_at<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ElfError> {
    let end = offset.checked_add(N).ok_or(ElfError::Truncated)?;
    let slice = data.get(offset..end).ok_or(ElfError::Truncated)?;
    let mut buf = [0u8; N];
    buf.copy_from_slice(slice);
    Ok(buf)
}

/// Read a `u16` at `offset` (little-endian).
pub(crate) fn read_u16(data: &[u8], offset: usize) -> Result<u16, ElfError> {
    bytes_at(data, offset).map(u16::from_le_bytes)
}

/// Read a `u32` at `offset` (little-endian).
pub(crate) fn read_u32(data: &[u8], offset: usize) -> Result<u32, ElfError> {
    bytes_at(data, offset).map(u32::from_le_bytes)
}

/// Read a `u64` at `offset` (little-endian).
pub(crate) fn read_u64(data: &[u8], offset: usize) -> Result<u64, ElfError> {
    bytes_at(data, offset).map(u64::from_le_bytes)
}

/// `start + count * entry_size` as a byte range, or `None` on overflow.
fn table_range(start: u64, count: u16, entry_size: usize) -> Option<Range<usize>> {
    let start = usize::try_from(start).ok()?;
    let len = (count as usize).checked_mul(entry_size)?;
    Some(start..start.checked_add(len)?)
}

// ---------------------------------------------------------------------------
// Well-known constants
// ---------------------------------------------------------------------------

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;

pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;
pub const EM_X86_64: u16 = 62;

/// Size of the ELF64 file header.
pub const EHDR_SIZE: usize = 64;
/// Size of one ELF64 section header.
pub const SHDR_SIZE: usize = 64;
/// Size of one ELF64 program header.
pub const PHDR_SIZE: usize = 56;

/// Byte offset of `e_entry` inside the file header.
pub(crate) const E_ENTRY_OFFSET: usize = 24;
/// Byte offset of `p_flags` inside a program header.
pub(crate) const P_FLAGS_OFFSET: usize = 4;

pub const SHT_NOBITS: u32 = 8;

pub const PT_LOAD: u32 = 1;

pub const PF_X: u32 = 0x1;
pub const PF_W: u32 = 0x2;
pub const PF_R: u32 = 0x4;

// ---------------------------------------------------------------------------
// Structures
// ---------------------------------------------------------------------------

/// The ELF64 file header fields the packer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfHeader {
    pub class: u8,
    pub encoding: u8,
    pub kind: u16,
    pub machine: u16,
    /// Virtual address execution starts at.
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    /// Index of the section holding section names.
    pub shstrndx: u16,
}

/// A single section header (64 bytes in the file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    /// Offset of the NUL-terminated name inside the string table.
    pub name_offset: u32,
    pub kind: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
}

impl SectionHeader {
    /// Whether the section occupies bytes in the file.
    pub fn has_file_bytes(&self) -> bool {
        self.kind != SHT_NOBITS
    }

    /// File byte range `[offset, offset + size)`.  Only meaningful after the
    /// parser has checked it against the buffer.
    pub fn file_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.size as usize
    }
}

/// A single program header (56 bytes in the file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub kind: u32,
    /// `PF_R | PF_W | PF_X` permission bits.
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
}

impl ProgramHeader {
    pub fn is_load(&self) -> bool {
        self.kind == PT_LOAD
    }

    /// True when `section`'s file bytes lie entirely inside this segment's
    /// file bytes.  Overlap is not enough.
    pub fn contains(&self, section: &SectionHeader) -> bool {
        let Some(seg_end) = self.offset.checked_add(self.filesz) else {
            return false;
        };
        let Some(sec_end) = section.offset.checked_add(section.size) else {
            return false;
        };
        section.offset >= self.offset && sec_end <= seg_end
    }
}

// ---------------------------------------------------------------------------
// ElfFile
// ---------------------------------------------------------------------------

/// A parsed ELF64 image held entirely in memory.
#[derive(Debug, Clone)]
pub struct ElfFile {
    /// The raw bytes of the entire file.
    pub data: Vec<u8>,
    pub header: ElfHeader,
    pub sections: Vec<SectionHeader>,
    pub segments: Vec<ProgramHeader>,
    /// File range of the section-name string table.
    shstrtab: Range<usize>,
}

impl ElfFile {
    /// Parse an ELF64 image from a raw byte buffer.
    ///
    /// The buffer is consumed and stored inside the returned `ElfFile`; every
    /// table and section range is checked against it here, so later accessors
    /// can slice without re-validating.
    pub fn parse(data: Vec<u8>) -> Result<ElfFile, ElfError> {
        if data.len() < EHDR_SIZE {
            return Err(ElfError::TooSmall(data.len()));
        }
        if data[..4] != ELF_MAGIC {
            return Err(ElfError::InvalidMagic);
        }

        // --- File header ---------------------------------------------------
        let class = data[4];
        if class != ELFCLASS64 {
            return Err(ElfError::UnsupportedClass(class));
        }
        let encoding = data[5];
        if encoding != ELFDATA2LSB {
            return Err(ElfError::UnsupportedEncoding(encoding));
        }
        let kind = read_u16(&data, 16)?;
        if kind != ET_EXEC && kind != ET_DYN {
            return Err(ElfError::UnsupportedType(kind));
        }
        let machine = read_u16(&data, 18)?;
        if machine != EM_X86_64 {
            return Err(ElfError::UnsupportedMachine(machine));
        }

        let header = ElfHeader {
            class,
            encoding,
            kind,
            machine,
            entry: read_u64(&data, E_ENTRY_OFFSET)?,
            phoff: read_u64(&data, 32)?,
            shoff: read_u64(&data, 40)?,
            phentsize: read_u16(&data, 54)?,
            phnum: read_u16(&data, 56)?,
            shentsize: read_u16(&data, 58)?,
            shnum: read_u16(&data, 60)?,
            shstrndx: read_u16(&data, 62)?,
        };

        // --- Section headers -----------------------------------------------
        if header.shnum > 0 && header.shentsize as usize != SHDR_SIZE {
            return Err(ElfError::BadEntrySize { table: "section header", size: header.shentsize });
        }
        let sh_table = table_range(header.shoff, header.shnum, SHDR_SIZE)
            .filter(|r| r.end <= data.len())
            .ok_or(ElfError::SectionTableOutOfBounds)?;

        let mut sections = Vec::with_capacity(header.shnum as usize);
        for (i, base) in sh_table.step_by(SHDR_SIZE).enumerate() {
            let section = SectionHeader {
                name_offset: read_u32(&data, base)?,
                kind: read_u32(&data, base + 4)?,
                flags: read_u64(&data, base + 8)?,
                addr: read_u64(&data, base + 16)?,
                offset: read_u64(&data, base + 24)?,
                size: read_u64(&data, base + 32)?,
            };
            if section.has_file_bytes() {
                let in_bounds = section
                    .offset
                    .checked_add(section.size)
                    .is_some_and(|end| end <= data.len() as u64);
                if !in_bounds {
                    return Err(ElfError::SectionOutOfBounds(i));
                }
            }
            sections.push(section);
        }

        // --- Program headers -----------------------------------------------
        if header.phnum > 0 && header.phentsize as usize != PHDR_SIZE {
            return Err(ElfError::BadEntrySize { table: "program header", size: header.phentsize });
        }
        let ph_table = table_range(header.phoff, header.phnum, PHDR_SIZE)
            .filter(|r| r.end <= data.len())
            .ok_or(ElfError::ProgramTableOutOfBounds)?;

        let mut segments = Vec::with_capacity(header.phnum as usize);
        for base in ph_table.step_by(PHDR_SIZE) {
            segments.push(ProgramHeader {
                kind: read_u32(&data, base)?,
                flags: read_u32(&data, base + P_FLAGS_OFFSET)?,
                offset: read_u64(&data, base + 8)?,
                vaddr: read_u64(&data, base + 16)?,
                filesz: read_u64(&data, base + 32)?,
                memsz: read_u64(&data, base + 40)?,
            });
        }

        // --- Section-name string table -------------------------------------
        let shstrtab = sections
            .get(header.shstrndx as usize)
            .filter(|s| s.has_file_bytes())
            .map(SectionHeader::file_range)
            .ok_or(ElfError::BadStringTableIndex(header.shstrndx))?;

        Ok(ElfFile {
            data,
            header,
            sections,
            segments,
            shstrtab,
        })
    }

    // -- helpers ------------------------------------------------------------

    /// Name of `section`, read from the string table.  `None` if the name
    /// offset falls outside the table, has no terminator, or is not UTF-8.
    pub fn section_name(&self, section: &SectionHeader) -> Option<&str> {
        let table = &self.data[self.shstrtab.clone()];
        let tail = table.get(section.name_offset as usize..)?;
        let len = tail.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&tail[..len]).ok()
    }

    /// Raw file bytes of `section`.  Empty for `SHT_NOBITS`.
    pub fn section_data(&self, section: &SectionHeader) -> &[u8] {
        if !section.has_file_bytes() {
            return &[];
        }
        &self.data[section.file_range()]
    }

    /// Mutable raw file bytes of the section at `index`.
    pub fn section_data_mut(&mut self, index: usize) -> &mut [u8] {
        let section = self.sections[index];
        if !section.has_file_bytes() {
            return &mut [];
        }
        &mut self.data[section.file_range()]
    }

    /// Absolute file offset of program header `index`.
    pub(crate) fn program_header_offset(&self, index: usize) -> usize {
        self.header.phoff as usize + index * PHDR_SIZE
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
