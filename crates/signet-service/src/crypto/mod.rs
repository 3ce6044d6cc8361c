//! Cryptographic operations: signing key generation, key-material sealing,
//! and JWT signing.
//!
//! Key material never leaves this module unencrypted except through
//! [`open_key_material`], and the encrypted form redacts itself in Debug
//! output.

use crate::errors::BackendError;
use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM},
    rand::{SecureRandom, SystemRandom},
    signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED_SIGNING},
};
use rsa::{
    pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey},
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::instrument;

/// Supported JWS signature algorithms.
///
/// The set of algorithms this host actually signs with is a policy choice:
/// ES512 is accepted on the wire for forward compatibility but rejected at
/// validation time because the JWT stack does not implement P-521.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    ES256,
    ES384,
    ES512,
    RS256,
    RS384,
    RS512,
}

impl Default for SignatureAlgorithm {
    fn default() -> Self {
        SignatureAlgorithm::ES256
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignatureAlgorithm::ES256 => "ES256",
            SignatureAlgorithm::ES384 => "ES384",
            SignatureAlgorithm::ES512 => "ES512",
            SignatureAlgorithm::RS256 => "RS256",
            SignatureAlgorithm::RS384 => "RS384",
            SignatureAlgorithm::RS512 => "RS512",
        };
        f.write_str(name)
    }
}

/// Concrete key types a policy can hold. Established at key-creation time
/// from the configured signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyType {
    EcdsaP256,
    EcdsaP384,
    Rsa2048,
    Rsa3072,
    Rsa4096,
}

/// Map a signature algorithm (plus the configured RSA key size, for RSA
/// variants) to the key type to generate.
///
/// An unsupported algorithm or an unsupported RSA key size is a
/// configuration error, rejected before any state is mutated.
pub fn key_type_for(
    algorithm: SignatureAlgorithm,
    rsa_key_bits: u32,
) -> Result<KeyType, BackendError> {
    match algorithm {
        SignatureAlgorithm::RS256 | SignatureAlgorithm::RS384 | SignatureAlgorithm::RS512 => {
            match rsa_key_bits {
                2048 => Ok(KeyType::Rsa2048),
                3072 => Ok(KeyType::Rsa3072),
                4096 => Ok(KeyType::Rsa4096),
                other => Err(BackendError::Validation(format!(
                    "unsupported RSA key size: {other} (expected 2048, 3072 or 4096)"
                ))),
            }
        }
        SignatureAlgorithm::ES256 => Ok(KeyType::EcdsaP256),
        SignatureAlgorithm::ES384 => Ok(KeyType::EcdsaP384),
        SignatureAlgorithm::ES512 => Err(BackendError::Validation(
            "unsupported signature algorithm: ES512".to_string(),
        )),
    }
}

/// Signing key material sealed with AES-256-GCM under the master key.
///
/// Serialized into the policy blob; the ciphertext, nonce and tag are what
/// reach durable storage. Debug is manually implemented to redact all of it.
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptedKeyMaterial {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>, // 96-bit (12 bytes)
    pub tag: Vec<u8>,   // 128-bit (16 bytes)
}

impl fmt::Debug for EncryptedKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedKeyMaterial")
            .field("ciphertext", &"[REDACTED]")
            .field("nonce", &"[REDACTED]")
            .field("tag", &"[REDACTED]")
            .finish()
    }
}

/// Generate private key material for `key_type`.
///
/// ECDSA keys are PKCS#8 v1 DER (what the JWT stack signs with directly);
/// RSA keys are PKCS#1 DER.
#[instrument(skip_all, fields(key_type = ?key_type))]
pub fn generate_key_material(key_type: KeyType) -> Result<Vec<u8>, BackendError> {
    match key_type {
        KeyType::EcdsaP256 => generate_ecdsa_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING),
        KeyType::EcdsaP384 => generate_ecdsa_pkcs8(&ECDSA_P384_SHA384_FIXED_SIGNING),
        KeyType::Rsa2048 => generate_rsa_pkcs1(2048),
        KeyType::Rsa3072 => generate_rsa_pkcs1(3072),
        KeyType::Rsa4096 => generate_rsa_pkcs1(4096),
    }
}

fn generate_ecdsa_pkcs8(
    alg: &'static ring::signature::EcdsaSigningAlgorithm,
) -> Result<Vec<u8>, BackendError> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(alg, &rng)
        .map_err(|e| BackendError::Crypto(format!("ECDSA keypair generation failed: {e}")))?;
    Ok(pkcs8.as_ref().to_vec())
}

fn generate_rsa_pkcs1(bits: usize) -> Result<Vec<u8>, BackendError> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| BackendError::Crypto(format!("RSA keypair generation failed: {e}")))?;

    let der = private_key
        .to_pkcs1_der()
        .map_err(|e| BackendError::Crypto(format!("RSA key encoding failed: {e}")))?;

    Ok(der.as_bytes().to_vec())
}

/// Encrypt private key material with AES-256-GCM under the master key.
///
/// Uses a 96-bit random nonce and produces a 128-bit authentication tag.
#[instrument(skip_all)]
pub fn seal_key_material(
    material: &[u8],
    master_key: &[u8],
) -> Result<EncryptedKeyMaterial, BackendError> {
    if master_key.len() != 32 {
        return Err(BackendError::Crypto(format!(
            "invalid master key length: {} (expected 32)",
            master_key.len()
        )));
    }

    let rng = SystemRandom::new();

    let mut nonce_bytes = [0u8; 12];
    rng.fill(&mut nonce_bytes)
        .map_err(|e| BackendError::Crypto(format!("nonce generation failed: {e}")))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound_key = UnboundKey::new(&AES_256_GCM, master_key)
        .map_err(|e| BackendError::Crypto(format!("cipher key creation failed: {e}")))?;
    let sealing_key = LessSafeKey::new(unbound_key);

    let mut in_out = material.to_vec();
    sealing_key
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|e| BackendError::Crypto(format!("encryption operation failed: {e}")))?;

    // After seal_in_place_append_tag, the buffer is ciphertext + 16-byte tag.
    let tag_start = in_out
        .len()
        .checked_sub(16)
        .ok_or_else(|| BackendError::Crypto("encryption produced invalid output".to_string()))?;
    let ciphertext = in_out
        .get(..tag_start)
        .ok_or_else(|| BackendError::Crypto("encryption produced invalid output".to_string()))?
        .to_vec();
    let tag = in_out
        .get(tag_start..)
        .ok_or_else(|| BackendError::Crypto("encryption produced invalid output".to_string()))?
        .to_vec();

    Ok(EncryptedKeyMaterial {
        ciphertext,
        nonce: nonce_bytes.to_vec(),
        tag,
    })
}

/// Decrypt private key material sealed by [`seal_key_material`].
#[instrument(skip_all)]
pub fn open_key_material(
    sealed: &EncryptedKeyMaterial,
    master_key: &[u8],
) -> Result<Vec<u8>, BackendError> {
    if master_key.len() != 32 {
        return Err(BackendError::Crypto(format!(
            "invalid master key length: {} (expected 32)",
            master_key.len()
        )));
    }

    if sealed.nonce.len() != 12 {
        return Err(BackendError::Crypto(format!(
            "invalid nonce length: {} (expected 12)",
            sealed.nonce.len()
        )));
    }

    if sealed.tag.len() != 16 {
        return Err(BackendError::Crypto(format!(
            "invalid tag length: {} (expected 16)",
            sealed.tag.len()
        )));
    }

    let mut in_out = sealed.ciphertext.clone();
    in_out.extend_from_slice(&sealed.tag);

    let nonce_bytes: [u8; 12] = sealed
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| BackendError::Crypto("invalid nonce format".to_string()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound_key = UnboundKey::new(&AES_256_GCM, master_key)
        .map_err(|e| BackendError::Crypto(format!("cipher key creation failed: {e}")))?;
    let opening_key = LessSafeKey::new(unbound_key);

    let plaintext = opening_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|e| BackendError::Crypto(format!("decryption operation failed: {e}")))?;

    Ok(plaintext.to_vec())
}

/// Sign a claim set into a compact serialized JWT.
///
/// The header carries `typ=JWT`, the algorithm, and the `kid` identifying
/// the policy key version used, so verifiers can select the right public
/// key during rotation windows.
#[instrument(skip_all, fields(alg = %algorithm, kid = %key_id))]
pub fn sign_claims<T: Serialize>(
    algorithm: SignatureAlgorithm,
    key_id: &str,
    key_material: &[u8],
    claims: &T,
) -> Result<String, BackendError> {
    let (alg, encoding_key) = match algorithm {
        SignatureAlgorithm::ES256 => (Algorithm::ES256, EncodingKey::from_ec_der(key_material)),
        SignatureAlgorithm::ES384 => (Algorithm::ES384, EncodingKey::from_ec_der(key_material)),
        SignatureAlgorithm::RS256 => (Algorithm::RS256, EncodingKey::from_rsa_der(key_material)),
        SignatureAlgorithm::RS384 => (Algorithm::RS384, EncodingKey::from_rsa_der(key_material)),
        SignatureAlgorithm::RS512 => (Algorithm::RS512, EncodingKey::from_rsa_der(key_material)),
        SignatureAlgorithm::ES512 => {
            return Err(BackendError::Crypto(
                "unsupported signature algorithm: ES512".to_string(),
            ))
        }
    };

    let mut header = Header::new(alg);
    header.typ = Some("JWT".to_string());
    header.kid = Some(key_id.to_string());

    encode(&header, claims, &encoding_key)
        .map_err(|e| BackendError::Crypto(format!("JWT signing operation failed: {e}")))
}

/// Derive the public half of generated key material, in the form the JWT
/// stack verifies with: the raw uncompressed point for ECDSA keys, PKCS#1
/// DER for RSA keys.
pub fn public_key_der(key_type: KeyType, key_material: &[u8]) -> Result<Vec<u8>, BackendError> {
    match key_type {
        KeyType::EcdsaP256 => ecdsa_public_key(&ECDSA_P256_SHA256_FIXED_SIGNING, key_material),
        KeyType::EcdsaP384 => ecdsa_public_key(&ECDSA_P384_SHA384_FIXED_SIGNING, key_material),
        KeyType::Rsa2048 | KeyType::Rsa3072 | KeyType::Rsa4096 => {
            let private_key = RsaPrivateKey::from_pkcs1_der(key_material)
                .map_err(|e| BackendError::Crypto(format!("invalid RSA key material: {e}")))?;
            let der = RsaPublicKey::from(&private_key)
                .to_pkcs1_der()
                .map_err(|e| BackendError::Crypto(format!("RSA public key encoding failed: {e}")))?;
            Ok(der.as_bytes().to_vec())
        }
    }
}

fn ecdsa_public_key(
    alg: &'static ring::signature::EcdsaSigningAlgorithm,
    pkcs8: &[u8],
) -> Result<Vec<u8>, BackendError> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(alg, pkcs8, &rng)
        .map_err(|e| BackendError::Crypto(format!("invalid ECDSA key material: {e}")))?;
    Ok(key_pair.public_key().as_ref().to_vec())
}

/// Stable key identifier for one key version: a URL-safe digest of
/// `<backend id>/<policy name>/<version>`. Carried as the JWT `kid` header.
pub fn key_id(backend_id: &str, policy_name: &str, version: u32) -> String {
    let raw = format!("{backend_id}/{policy_name}/{version}");

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());

    general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}
