//! Synthetic ELF64 images for tests.
//!
//! Shared by the unit tests (through `#[path]`), the integration tests in
//! this directory and the CLI tests.
//!
//! Layout produced by [`build_elf`]:
//!
//! ```text
//!   0x0000  ELF header (64 bytes)
//!   0x0040  program headers: LOAD (R|X, headers + .text), LOAD (R, stub),
//!           GNU_STACK (RW)
//!   0x0100  .text
//!   stub    .test_stub (reserved, zero filled)
//!   ...     .shstrtab
//!   ...     section headers: NULL, .text, .test_stub, .shstrtab
//! ```
//!
//! Virtual addresses are `BASE + file offset`.

#![allow(dead_code)]

pub const BASE: u64 = 0x40_0000;
pub const TEXT_OFFSET: usize = 0x100;
pub const TEXT_ADDR: u64 = BASE + TEXT_OFFSET as u64;
pub const ENTRY: u64 = TEXT_ADDR;
/// Stub placement for any `.text` of at most 0x80 bytes.
pub const STUB_OFFSET: usize = 0x180;
pub const STUB_ADDR: u64 = BASE + STUB_OFFSET as u64;
pub const STUB_RESERVED: usize = 64;

pub const PT_LOAD: u32 = 1;
pub const PT_GNU_STACK: u32 = 0x6474_E551;
pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

/// mov rax, 60 / xor rdi, rdi / syscall / nop x4
pub const TEXT_BYTES: [u8; 16] = [
    0x48, 0xC7, 0xC0, 0x3C, 0x00, 0x00, 0x00, //
    0x48, 0x31, 0xFF, //
    0x0F, 0x05, //
    0x90, 0x90, 0x90, 0x90,
];

pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

pub fn get_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}

fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Knobs for [`build_elf`].
pub struct ImageSpec<'a> {
    pub text_name: &'a str,
    pub text: &'a [u8],
    pub stub_name: &'a str,
    pub stub_reserved: usize,
}

impl Default for ImageSpec<'_> {
    fn default() -> Self {
        Self {
            text_name: ".text",
            text: &TEXT_BYTES,
            stub_name: ".test_stub",
            stub_reserved: STUB_RESERVED,
        }
    }
}

/// File offset of the stub section for a `.text` of `text_len` bytes.
pub fn stub_offset(text_len: usize) -> usize {
    TEXT_OFFSET + align_up(text_len, 0x80).max(0x80)
}

pub fn stub_addr(text_len: usize) -> u64 {
    BASE + stub_offset(text_len) as u64
}

/// Offset of the program header table.
pub const PHOFF: usize = 0x40;
pub const PHDR_SIZE: usize = 56;
pub const SHDR_SIZE: usize = 64;

pub fn build_elf(spec: &ImageSpec) -> Vec<u8> {
    let text_len = spec.text.len();
    let stub_off = stub_offset(text_len);

    let mut strtab = vec![0u8];
    let text_name_off = strtab.len() as u32;
    strtab.extend_from_slice(spec.text_name.as_bytes());
    strtab.push(0);
    let stub_name_off = strtab.len() as u32;
    strtab.extend_from_slice(spec.stub_name.as_bytes());
    strtab.push(0);
    let strtab_name_off = strtab.len() as u32;
    strtab.extend_from_slice(b".shstrtab\0");

    let strtab_off = stub_off + spec.stub_reserved;
    let shoff = align_up(strtab_off + strtab.len(), 8);
    let total = shoff + 4 * SHDR_SIZE;
    let mut buf = vec![0u8; total];

    // -- ELF header --
    buf[..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
    buf[4] = 2; // ELFCLASS64
    buf[5] = 1; // ELFDATA2LSB
    buf[6] = 1; // EV_CURRENT
    put_u16(&mut buf, 16, 2); // ET_EXEC
    put_u16(&mut buf, 18, 62); // EM_X86_64
    put_u32(&mut buf, 20, 1);
    put_u64(&mut buf, 24, ENTRY);
    put_u64(&mut buf, 32, PHOFF as u64);
    put_u64(&mut buf, 40, shoff as u64);
    put_u16(&mut buf, 52, 64);
    put_u16(&mut buf, 54, PHDR_SIZE as u16);
    put_u16(&mut buf, 56, 3);
    put_u16(&mut buf, 58, SHDR_SIZE as u16);
    put_u16(&mut buf, 60, 4);
    put_u16(&mut buf, 62, 3);

    // -- Program headers --
    let phdrs = [
        (PT_LOAD, PF_R | PF_X, 0usize, stub_off),
        (PT_LOAD, PF_R, stub_off, spec.stub_reserved),
        (PT_GNU_STACK, PF_R | PF_W, 0, 0),
    ];
    for (i, &(kind, flags, offset, size)) in phdrs.iter().enumerate() {
        let p = PHOFF + i * PHDR_SIZE;
        put_u32(&mut buf, p, kind);
        put_u32(&mut buf, p + 4, flags);
        put_u64(&mut buf, p + 8, offset as u64);
        let vaddr = if kind == PT_LOAD { BASE + offset as u64 } else { 0 };
        put_u64(&mut buf, p + 16, vaddr);
        put_u64(&mut buf, p + 24, vaddr);
        put_u64(&mut buf, p + 32, size as u64);
        put_u64(&mut buf, p + 40, size as u64);
        put_u64(&mut buf, p + 48, if kind == PT_LOAD { 0x1000 } else { 0x10 });
    }

    // -- Section contents --
    buf[TEXT_OFFSET..TEXT_OFFSET + text_len].copy_from_slice(spec.text);
    buf[strtab_off..strtab_off + strtab.len()].copy_from_slice(&strtab);

    // -- Section headers (index 0 stays all zero) --
    let shdrs = [
        (text_name_off, 1u32, 0x6u64, TEXT_OFFSET, text_len),
        (stub_name_off, 1, 0x2, stub_off, spec.stub_reserved),
        (strtab_name_off, 3, 0, strtab_off, strtab.len()),
    ];
    for (i, &(name, kind, flags, offset, size)) in shdrs.iter().enumerate() {
        let s = shoff + (i + 1) * SHDR_SIZE;
        put_u32(&mut buf, s, name);
        put_u32(&mut buf, s + 4, kind);
        put_u64(&mut buf, s + 8, flags);
        let addr = if flags != 0 { BASE + offset as u64 } else { 0 };
        put_u64(&mut buf, s + 16, addr);
        put_u64(&mut buf, s + 24, offset as u64);
        put_u64(&mut buf, s + 32, size as u64);
        put_u64(&mut buf, s + 48, 1);
    }

    buf
}

/// Default image whose `.text` is `text_len` bytes of [`TEXT_BYTES`] repeated.
pub fn build_minimal_elf(text_len: usize) -> Vec<u8> {
    let text: Vec<u8> = TEXT_BYTES.iter().copied().cycle().take(text_len).collect();
    build_elf(&ImageSpec { text: &text, ..ImageSpec::default() })
}

/// File offset of program header `index`'s `p_flags`.
pub fn phdr_flags_offset(index: usize) -> usize {
    PHOFF + index * PHDR_SIZE + 4
}
