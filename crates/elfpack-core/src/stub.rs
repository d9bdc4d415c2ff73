//! x86-64 decrypt stub template.
//!
//! The stub is a fixed byte sequence with four patch sites.  At runtime it:
//!
//! ```text
//!   +0   call +5              ; push the address of +5
//!   +5   pop rsi              ; rsi = where we are loaded
//!   +6   add rsi, code_disp   ; rsi = runtime address of .text
//!   +13  mov rcx, code_len
//!   +23  mov al, key
//!   +25  test rcx, rcx        ; guard before the loop, empty .text skips it
//!   +28  jz +40
//!   +30  xor [rsi], al
//!   +32  inc rsi
//!   +35  dec rcx
//!   +38  jnz +30
//!   +40  jmp old_entry
//! ```
//!
//! Only `rsi`, `rcx`, `al` and the flags are clobbered.  `rdx` carries the
//! dynamic linker's fini pointer into `_start` and must survive.

use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, NasmFormatter};

/// What a patch site holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchRole {
    /// `i32` from the self-location point to the start of `.text`.
    CodeDisplacement,
    /// `u64` byte count of `.text`.
    CodeLength,
    /// `u8` XOR key.
    Key,
    /// `i32` from the end of the final `jmp` to the original entry point.
    EntryDisplacement,
}

/// A hole in the template: `width` bytes at `offset`, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSite {
    pub offset: usize,
    pub width: usize,
    pub role: PatchRole,
}

/// Immutable machine-code template plus the metadata needed to patch it.
#[derive(Debug)]
pub struct StubTemplate {
    pub bytes: &'static [u8],
    pub sites: &'static [PatchSite],
    /// Offset whose runtime address the `call`/`pop` pair yields.
    pub self_location: usize,
    /// Offset just past the final `jmp rel32`.
    pub exit: usize,
}

/// Values written into the patch sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubParams {
    pub code_displacement: i32,
    pub code_length: u64,
    pub key: u8,
    pub entry_displacement: i32,
}

impl StubParams {
    /// Little-endian encoding of the value for `role`.
    fn encode(&self, role: PatchRole) -> Vec<u8> {
        match role {
            PatchRole::CodeDisplacement => self.code_displacement.to_le_bytes().to_vec(),
            PatchRole::CodeLength => self.code_length.to_le_bytes().to_vec(),
            PatchRole::Key => vec![self.key],
            PatchRole::EntryDisplacement => self.entry_displacement.to_le_bytes().to_vec(),
        }
    }
}

const STUB_BYTES: [u8; 45] = [
    0xE8, 0x00, 0x00, 0x00, 0x00, // call +5
    0x5E, // pop rsi
    0x48, 0x81, 0xC6, 0x00, 0x00, 0x00, 0x00, // add rsi, imm32
    0x48, 0xB9, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // mov rcx, imm64
    0xB0, 0x00, // mov al, imm8
    0x48, 0x85, 0xC9, // test rcx, rcx
    0x74, 0x0A, // jz +40
    0x30, 0x06, // xor [rsi], al
    0x48, 0xFF, 0xC6, // inc rsi
    0x48, 0xFF, 0xC9, // dec rcx
    0x75, 0xF6, // jnz +30
    0xE9, 0x00, 0x00, 0x00, 0x00, // jmp rel32
];

const STUB_SITES: [PatchSite; 4] = [
    PatchSite { offset: 9, width: 4, role: PatchRole::CodeDisplacement },
    PatchSite { offset: 15, width: 8, role: PatchRole::CodeLength },
    PatchSite { offset: 24, width: 1, role: PatchRole::Key },
    PatchSite { offset: 41, width: 4, role: PatchRole::EntryDisplacement },
];

/// The decrypt stub injected into the placeholder section.
pub static DECRYPT_STUB: StubTemplate = StubTemplate {
    bytes: &STUB_BYTES,
    sites: &STUB_SITES,
    self_location: 5,
    exit: 45,
};

/// Filler for the reserved bytes after the stub (`int3`).
pub const PADDING_BYTE: u8 = 0xCC;

impl StubTemplate {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn site(&self, role: PatchRole) -> Option<&PatchSite> {
        self.sites.iter().find(|s| s.role == role)
    }

    /// Copy the template to the start of `out` and fill every patch site.
    ///
    /// # Panics
    ///
    /// If `out` is shorter than the template.  Callers check capacity first.
    pub fn materialize(&self, out: &mut [u8], params: &StubParams) {
        assert!(
            out.len() >= self.len(),
            "stub needs {} bytes, destination has {}",
            self.len(),
            out.len()
        );
        out[..self.len()].copy_from_slice(self.bytes);
        for site in self.sites {
            let value = params.encode(site.role);
            debug_assert_eq!(value.len(), site.width, "{:?} width mismatch", site.role);
            out[site.offset..site.offset + site.width].copy_from_slice(&value);
        }
    }

    /// Read a patched field back out of `stub` as an unsigned value.
    pub fn read_site(&self, stub: &[u8], role: PatchRole) -> Option<u64> {
        let site = self.site(role)?;
        let raw = stub.get(site.offset..site.offset + site.width)?;
        let mut buf = [0u8; 8];
        buf[..site.width].copy_from_slice(raw);
        Some(u64::from_le_bytes(buf))
    }
}

/// NASM-syntax listing of `code` as if loaded at `ip`, one line per
/// instruction: `address  bytes  mnemonic`.
pub fn disassemble(code: &[u8], ip: u64) -> Vec<String> {
    let mut decoder = Decoder::with_ip(64, code, ip, DecoderOptions::NONE);
    let mut formatter = NasmFormatter::new();
    let mut instruction = Instruction::default();
    let mut lines = Vec::new();

    while decoder.can_decode() {
        let start = decoder.position();
        decoder.decode_out(&mut instruction);
        let mut text = String::new();
        formatter.format(&instruction, &mut text);
        let hex: String = code[start..start + instruction.len()]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();
        lines.push(format!("{:016X}  {:<22}{}", instruction.ip(), hex, text));
    }
    lines
}
