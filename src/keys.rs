//! This module defines the key material the engine decrypts and verifies with.
//!
//! A [`Key`] is an Ed25519 primary key, used for signatures, with an optional
//! X25519 subkey used to unwrap session keys. Either half may be public-only.
//!
//! 这个模块定义了引擎用于解密与验证的密钥材料。
use crate::common::algorithms::PublicKeyAlgorithm;
use crate::error::{CryptoError, Result};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::{rngs::OsRng, TryRngCore};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

pub mod ring;
pub mod session;

pub use ring::KeyRing;
pub use session::{SessionKey, SessionKeyCandidate};

/// A 32-byte key fingerprint.
///
/// 32 字节的密钥指纹。
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub(crate) fn compute(algorithm: PublicKeyAlgorithm, public_key: &[u8; 32]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([algorithm.id()]);
        hasher.update(public_key);
        Self(hasher.finalize().into())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The key id is the leading 8 bytes of the fingerprint.
    ///
    /// 密钥 ID 为指纹的前 8 个字节。
    pub fn key_id(&self) -> KeyId {
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.0[..8]);
        KeyId(id)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// An 8-byte key id. The all-zero id is the anonymous-recipient wildcard.
///
/// 8 字节的密钥 ID。全零 ID 表示匿名接收者通配符。
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId([u8; 8]);

impl KeyId {
    pub const WILDCARD: KeyId = KeyId([0u8; 8]);

    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({self})")
    }
}

#[derive(Clone)]
enum SigningPart {
    Secret(SigningKey),
    Public(VerifyingKey),
}

#[derive(Clone)]
enum EncryptionPart {
    Secret(StaticSecret),
    Public(X25519PublicKey),
}

/// An OpenPGP-style key: an Ed25519 primary key plus an optional X25519
/// encryption subkey.
///
/// OpenPGP 风格的密钥：Ed25519 主密钥加上可选的 X25519 加密子密钥。
#[derive(Clone)]
pub struct Key {
    signing: SigningPart,
    encryption: Option<EncryptionPart>,
}

impl Key {
    /// Generates a new private key with both a signing and an encryption part.
    ///
    /// 生成一个同时具备签名与加密部分的新私钥。
    pub fn generate() -> Result<Self> {
        let mut signing = Zeroizing::new([0u8; 32]);
        let mut encryption = Zeroizing::new([0u8; 32]);
        OsRng.try_fill_bytes(&mut signing[..])?;
        OsRng.try_fill_bytes(&mut encryption[..])?;
        Ok(Self::from_secret_bytes(&signing, &encryption))
    }

    /// Rebuilds a private key from its raw secret scalars.
    ///
    /// 从原始私钥标量重建私钥。
    pub fn from_secret_bytes(signing: &[u8; 32], encryption: &[u8; 32]) -> Self {
        Self {
            signing: SigningPart::Secret(SigningKey::from_bytes(signing)),
            encryption: Some(EncryptionPart::Secret(StaticSecret::from(*encryption))),
        }
    }

    /// Rebuilds a public key from raw public key bytes.
    ///
    /// 从原始公钥字节重建公钥。
    pub fn from_public_bytes(signing: &[u8; 32], encryption: Option<&[u8; 32]>) -> Result<Self> {
        let verifying =
            VerifyingKey::from_bytes(signing).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self {
            signing: SigningPart::Public(verifying),
            encryption: encryption.map(|pk| EncryptionPart::Public(X25519PublicKey::from(*pk))),
        })
    }

    /// Returns a copy of this key with all secret material removed.
    ///
    /// 返回去除所有私密材料后的密钥副本。
    pub fn to_public(&self) -> Self {
        Self {
            signing: SigningPart::Public(self.verifying_key()),
            encryption: self.encryption_public().map(EncryptionPart::Public),
        }
    }

    /// Fingerprint of the primary (signing) key.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(PublicKeyAlgorithm::Ed25519, self.verifying_key().as_bytes())
    }

    pub fn key_id(&self) -> KeyId {
        self.fingerprint().key_id()
    }

    /// Fingerprint of the encryption subkey, if any.
    pub fn encryption_fingerprint(&self) -> Option<Fingerprint> {
        self.encryption_public()
            .map(|pk| Fingerprint::compute(PublicKeyAlgorithm::X25519, pk.as_bytes()))
    }

    pub fn encryption_key_id(&self) -> Option<KeyId> {
        self.encryption_fingerprint().map(|fp| fp.key_id())
    }

    pub fn is_private(&self) -> bool {
        matches!(self.signing, SigningPart::Secret(_))
            || matches!(self.encryption, Some(EncryptionPart::Secret(_)))
    }

    /// Whether this key can unwrap session keys.
    pub fn can_decrypt(&self) -> bool {
        self.decryption_secret().is_some()
    }

    pub fn can_sign(&self) -> bool {
        self.signing_key().is_some()
    }

    pub(crate) fn verifying_key(&self) -> VerifyingKey {
        match &self.signing {
            SigningPart::Secret(sk) => sk.verifying_key(),
            SigningPart::Public(vk) => *vk,
        }
    }

    pub(crate) fn signing_key(&self) -> Option<&SigningKey> {
        match &self.signing {
            SigningPart::Secret(sk) => Some(sk),
            SigningPart::Public(_) => None,
        }
    }

    pub(crate) fn decryption_secret(&self) -> Option<&StaticSecret> {
        match &self.encryption {
            Some(EncryptionPart::Secret(secret)) => Some(secret),
            _ => None,
        }
    }

    pub(crate) fn encryption_public(&self) -> Option<X25519PublicKey> {
        match &self.encryption {
            Some(EncryptionPart::Secret(secret)) => Some(X25519PublicKey::from(secret)),
            Some(EncryptionPart::Public(pk)) => Some(*pk),
            None => None,
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("fingerprint", &self.fingerprint())
            .field("encryption_key_id", &self.encryption_key_id())
            .field("private", &self.is_private())
            .finish()
    }
}
