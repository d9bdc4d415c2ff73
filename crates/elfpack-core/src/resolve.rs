//! Locate the sections the packer rewrites and the segments that map them.

use std::fmt;

use crate::elf::ElfFile;

/// Name of the code section that gets encrypted.
pub const CODE_SECTION_NAME: &str = ".text";
/// Name of the placeholder section the target's build reserves for the stub.
pub const STUB_SECTION_NAME: &str = ".test_stub";

/// Section names to look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNames {
    pub code: String,
    pub stub: String,
}

impl Default for SectionNames {
    fn default() -> Self {
        Self {
            code: CODE_SECTION_NAME.to_string(),
            stub: STUB_SECTION_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No section carries this name.
    MissingSection(String),
    /// The named section is `SHT_NOBITS` and has nothing in the file to rewrite.
    NoFileBytes(String),
    /// No `PT_LOAD` segment fully contains the named section.
    NoContainingSegment(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::MissingSection(name) => write!(f, "no {name} section in this binary"),
            ResolveError::NoFileBytes(name) => write!(f, "section {name} has no bytes in the file"),
            ResolveError::NoContainingSegment(name) => {
                write!(f, "failed finding the segment that contains the {name} section")
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Indices into [`ElfFile::sections`] and [`ElfFile::segments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub code_section: usize,
    pub stub_section: usize,
    pub code_segment: usize,
    pub stub_segment: usize,
}

/// Find the code and stub sections and the first loadable segment holding
/// each.  With duplicate names the last section in table order wins.
pub fn resolve(elf: &ElfFile, names: &SectionNames) -> Result<ResolvedTargets, ResolveError> {
    let mut code_section = None;
    let mut stub_section = None;
    for (i, section) in elf.sections.iter().enumerate() {
        match elf.section_name(section) {
            Some(name) if name == names.code => code_section = Some(i),
            Some(name) if name == names.stub => stub_section = Some(i),
            _ => {}
        }
    }

    let code_section = code_section.ok_or_else(|| ResolveError::MissingSection(names.code.clone()))?;
    let stub_section = stub_section.ok_or_else(|| ResolveError::MissingSection(names.stub.clone()))?;

    Ok(ResolvedTargets {
        code_section,
        stub_section,
        code_segment: containing_segment(elf, code_section, &names.code)?,
        stub_segment: containing_segment(elf, stub_section, &names.stub)?,
    })
}

fn containing_segment(elf: &ElfFile, section: usize, name: &str) -> Result<usize, ResolveError> {
    let section = &elf.sections[section];
    if !section.has_file_bytes() {
        return Err(ResolveError::NoFileBytes(name.to_string()));
    }
    elf.segments
        .iter()
        .position(|seg| seg.is_load() && seg.contains(section))
        .ok_or_else(|| ResolveError::NoContainingSegment(name.to_string()))
}
