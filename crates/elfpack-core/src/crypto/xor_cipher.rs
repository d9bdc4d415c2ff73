//! Single-byte XOR cipher for code sections.
//!
//! This is NOT a cryptographically secure cipher.  It hides the code bytes
//! from static disassembly; the key travels inside the injected stub in the
//! clear.  The transform is its own inverse, which is what lets the stub
//! decrypt with the exact loop the packer used to encrypt.

/// Key used for every packed image.  Must stay non-zero, a zero key would
/// leave the code untouched.
pub const PACK_KEY: u8 = 0xA5;

/// XOR every byte of `buf` with `key`, in place.
pub fn apply(buf: &mut [u8], key: u8) {
    for b in buf.iter_mut() {
        *b ^= key;
    }
}

/// Copying variant of [`apply`].
pub fn transform(data: &[u8], key: u8) -> Vec<u8> {
    let mut out = data.to_vec();
    apply(&mut out, key);
    out
}
