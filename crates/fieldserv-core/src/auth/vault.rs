//! Sealing of small secrets at rest.
//!
//! Layout of a sealed blob: `salt (16) || nonce (12) || ciphertext`. The key is
//! derived from the caller's secret with Argon2id and a fresh salt per seal.

use anyhow::{anyhow, ensure, Result};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(secret: &[u8], salt: &[u8]) -> Result<Key> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(secret, salt, &mut key)
        .map_err(|e| anyhow!("Key derivation failed: {}", e))?;
    Ok(*Key::from_slice(&key))
}

/// Encrypt `plaintext` under `secret`.
pub fn seal(secret: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(&derive_key(secret, &salt)?);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| anyhow!("Encryption failed"))?;

    let mut sealed = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a blob produced by [`seal`]. Fails on a wrong secret or tampering.
pub fn unseal(secret: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    ensure!(sealed.len() > SALT_LEN + NONCE_LEN, "Sealed data is truncated");
    let (salt, rest) = sealed.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let cipher = ChaCha20Poly1305::new(&derive_key(secret, salt)?);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| anyhow!("Decryption failed - wrong secret or corrupted data"))
}
