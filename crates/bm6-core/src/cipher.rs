//! Frame cipher for BM6 monitors.
//!
//! Every frame exchanged with the monitor is AES-128 in CBC mode with the
//! compiled-in [`CIPHER_KEY`] and an all-zero IV. Each call starts a fresh
//! CBC chain, so the transform is a pure function: the same plaintext always
//! yields the same ciphertext and the codec can be shared freely.

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

use bm6_types::protocol::CIPHER_KEY;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

const ZERO_IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Errors from the frame cipher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Input was empty or not a whole number of blocks.
    #[error("cipher input must be a positive multiple of 16 bytes, got {0}")]
    InvalidLength(usize),
}

fn check_len(len: usize) -> Result<(), CipherError> {
    if len == 0 || len % BLOCK_SIZE != 0 {
        return Err(CipherError::InvalidLength(len));
    }
    Ok(())
}

/// Encrypt whole blocks of plaintext.
///
/// Callers pad with zero bytes; no padding is added here.
pub fn encrypt(plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    check_len(plaintext.len())?;
    let mut buf = plaintext.to_vec();
    let len = buf.len();
    Aes128CbcEnc::new(&CIPHER_KEY.into(), &ZERO_IV.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|_| CipherError::InvalidLength(len))?;
    Ok(buf)
}

/// Decrypt whole blocks of ciphertext.
pub fn decrypt(ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    check_len(ciphertext.len())?;
    let mut buf = ciphertext.to_vec();
    let len = buf.len();
    Aes128CbcDec::new(&CIPHER_KEY.into(), &ZERO_IV.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CipherError::InvalidLength(len))?;
    Ok(buf)
}

/// Decrypt and render the plaintext as lowercase hex.
pub fn decrypt_to_hex(ciphertext: &[u8]) -> Result<String, CipherError> {
    decrypt(ciphertext).map(hex::encode)
}
