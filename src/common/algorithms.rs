use crate::error::CryptoError;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Symmetric cipher used by session keys and data packets.
///
/// 会话密钥与数据包使用的对称加密算法。
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    Aes128,
    Aes256,
}

impl CipherAlgorithm {
    /// The algorithm identifier used on the wire.
    ///
    /// 线上使用的算法标识。
    pub const fn id(self) -> u8 {
        match self {
            CipherAlgorithm::Aes128 => 7,
            CipherAlgorithm::Aes256 => 9,
        }
    }

    /// Key length in bytes.
    ///
    /// 密钥长度（字节）。
    pub const fn key_size(self) -> usize {
        match self {
            CipherAlgorithm::Aes128 => 16,
            CipherAlgorithm::Aes256 => 32,
        }
    }
}

impl TryFrom<u8> for CipherAlgorithm {
    type Error = CryptoError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            7 => Ok(CipherAlgorithm::Aes128),
            9 => Ok(CipherAlgorithm::Aes256),
            other => Err(CryptoError::UnsupportedCipher(other)),
        }
    }
}

/// AEAD mode identifier for GCM.
pub(crate) const AEAD_GCM: u8 = 3;

/// Public key algorithm identifiers understood by the engine.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PublicKeyAlgorithm {
    X25519,
    Ed25519,
}

impl PublicKeyAlgorithm {
    pub const fn id(self) -> u8 {
        match self {
            PublicKeyAlgorithm::X25519 => 25,
            PublicKeyAlgorithm::Ed25519 => 27,
        }
    }
}

impl TryFrom<u8> for PublicKeyAlgorithm {
    type Error = CryptoError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            25 => Ok(PublicKeyAlgorithm::X25519),
            27 => Ok(PublicKeyAlgorithm::Ed25519),
            other => Err(CryptoError::UnsupportedPublicKeyAlgorithm(other)),
        }
    }
}

/// Hash algorithm identifier for SHA-256, the only digest signatures use.
pub(crate) const HASH_SHA256: u8 = 8;
