pub mod xor_cipher;
