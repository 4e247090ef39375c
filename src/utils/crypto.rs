//! # Login Cryptography
//!
//! Primitives used while negotiating an encrypted session.
//!
//! - AES-128 in CFB8 mode with key = IV = shared secret, one cipher per direction
//! - RSA PKCS#1 v1.5 encryption of the shared secret and verify token
//! - The "server hash": a SHA-1 digest rendered as a signed two's-complement hex number
//! - SHA256withRSA signature verification for chat keys and messages

use crate::error::{constants, ProtocolError, Result};
use cfb8::cipher::inout::InOutBuf;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand_core::OsRng;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;

pub type Aes128Cfb8Enc = cfb8::Encryptor<aes::Aes128>;
pub type Aes128Cfb8Dec = cfb8::Decryptor<aes::Aes128>;

/// Length of the AES shared secret in bytes
pub const SHARED_SECRET_LEN: usize = 16;

pub type SharedSecret = [u8; SHARED_SECRET_LEN];

/// Generate a fresh shared secret from the OS RNG
pub fn generate_shared_secret() -> Result<SharedSecret> {
    let mut secret = [0u8; SHARED_SECRET_LEN];
    getrandom::fill(&mut secret)
        .map_err(|_| ProtocolError::CryptoError(constants::ERR_SHARED_SECRET.into()))?;
    Ok(secret)
}

/// Build the outbound and inbound cipher pair for a shared secret
pub fn cipher_pair(secret: &SharedSecret) -> Result<(Aes128Cfb8Enc, Aes128Cfb8Dec)> {
    let enc = Aes128Cfb8Enc::new_from_slices(secret, secret)
        .map_err(|_| ProtocolError::CryptoError(constants::ERR_CIPHER_INIT.into()))?;
    let dec = Aes128Cfb8Dec::new_from_slices(secret, secret)
        .map_err(|_| ProtocolError::CryptoError(constants::ERR_CIPHER_INIT.into()))?;
    Ok((enc, dec))
}

/// Encrypt bytes in place, continuing the cipher stream
pub fn encrypt_in_place(cipher: &mut Aes128Cfb8Enc, data: &mut [u8]) {
    let (blocks, _) = InOutBuf::from(data).into_chunks();
    cipher.encrypt_blocks_inout_mut(blocks);
}

/// Decrypt bytes in place, continuing the cipher stream
pub fn decrypt_in_place(cipher: &mut Aes128Cfb8Dec, data: &mut [u8]) {
    let (blocks, _) = InOutBuf::from(data).into_chunks();
    cipher.decrypt_blocks_inout_mut(blocks);
}

/// Parse an X.509 SubjectPublicKeyInfo DER blob as an RSA key
pub fn parse_public_key(der: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(der)
        .map_err(|e| ProtocolError::CryptoError(format!("{}: {e}", constants::ERR_RSA_PUBLIC_KEY)))
}

/// RSA PKCS#1 v1.5 encrypt with the server's public key
pub fn rsa_encrypt(public_key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>> {
    public_key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, data)
        .map_err(|e| ProtocolError::CryptoError(e.to_string()))
}

/// Verify a SHA256withRSA signature. Malformed signatures simply fail.
pub fn verify_sha256_rsa(public_key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(message, &signature)
        .is_ok()
}

/// Compute the session server hash for `serverId + secret + publicKey`.
///
/// The SHA-1 digest is interpreted as a signed big-endian integer and printed
/// in lowercase hex without leading zeros, negative values carrying a `-`.
pub fn server_hash(server_id: &str, secret: &[u8], public_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(secret);
    hasher.update(public_key);
    let mut digest: [u8; 20] = hasher.finalize().into();

    let negative = digest[0] & 0x80 != 0;
    if negative {
        // two's complement negate
        let mut carry = true;
        for byte in digest.iter_mut().rev() {
            *byte = !*byte;
            if carry {
                let (sum, overflow) = byte.overflowing_add(1);
                *byte = sum;
                carry = overflow;
            }
        }
    }

    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    let trimmed = hex.trim_start_matches('0');
    let trimmed = if trimmed.is_empty() { "0" } else { trimmed };

    if negative {
        format!("-{trimmed}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_hash_reference_values() {
        // Well-known digests of player names
        assert_eq!(server_hash("Notch", &[], &[]), "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48");
        assert_eq!(server_hash("jeb_", &[], &[]), "-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1");
        assert_eq!(server_hash("simon", &[], &[]), "88e16a1019277b15d58faf0541e11910eb756f6");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_cfb8_streams_are_symmetric() {
        let secret = [0x42u8; SHARED_SECRET_LEN];
        let (mut enc, _) = cipher_pair(&secret).unwrap();
        let (_, mut dec) = cipher_pair(&secret).unwrap();

        let original = b"hello encrypted world".to_vec();
        let mut first = original[..7].to_vec();
        let mut second = original[7..].to_vec();
        encrypt_in_place(&mut enc, &mut first);
        encrypt_in_place(&mut enc, &mut second);
        assert_ne!(first, original[..7]);

        // Decrypt with a different split to prove the stream state carries over
        let mut joined = [first, second].concat();
        let (head, tail) = joined.split_at_mut(3);
        decrypt_in_place(&mut dec, head);
        decrypt_in_place(&mut dec, tail);
        assert_eq!(joined, original);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_shared_secret_is_random() {
        let a = generate_shared_secret().unwrap();
        let b = generate_shared_secret().unwrap();
        assert_ne!(a, b);
    }
}
