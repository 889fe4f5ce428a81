use crate::common::algorithms::CipherAlgorithm;
use crate::error::Result;
use rand::{rngs::OsRng, TryRngCore};
use std::fmt;
use zeroize::Zeroizing;

/// A raw symmetric key that directly decrypts a data packet.
///
/// A session key without a cipher is a v6 session key: the data packet it
/// opens names its own cipher.
///
/// 直接解密数据包的原始对称密钥。
/// 没有算法标识的会话密钥是 v6 会话密钥：其数据包自带算法标识。
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    key: Zeroizing<Vec<u8>>,
    cipher: Option<CipherAlgorithm>,
}

impl SessionKey {
    pub fn new(key: impl Into<Vec<u8>>, cipher: Option<CipherAlgorithm>) -> Self {
        Self {
            key: Zeroizing::new(key.into()),
            cipher,
        }
    }

    /// Generates a random session key for `cipher`. With `v6` set the cipher is
    /// only used for the key length and is not bound to the key.
    ///
    /// 为 `cipher` 生成随机会话密钥。设置 `v6` 时算法只决定密钥长度，不绑定到密钥。
    pub fn generate(cipher: CipherAlgorithm, v6: bool) -> Result<Self> {
        let mut key = Zeroizing::new(vec![0u8; cipher.key_size()]);
        OsRng.try_fill_bytes(&mut key[..])?;
        Ok(Self {
            key,
            cipher: (!v6).then_some(cipher),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn cipher(&self) -> Option<CipherAlgorithm> {
        self.cipher
    }

    pub fn is_v6(&self) -> bool {
        self.cipher.is_none()
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("cipher", &self.cipher)
            .field("len", &self.key.len())
            .finish()
    }
}

/// A session key supplied out of band by the caller.
///
/// 调用者通过带外方式提供的会话密钥。
#[derive(Clone)]
pub struct SessionKeyCandidate {
    pub key_bytes: Zeroizing<Vec<u8>>,
    pub cipher_algorithm: CipherAlgorithm,
    /// v6 candidates never pass `cipher_algorithm` to the data packet.
    pub is_v6: bool,
}

impl SessionKeyCandidate {
    pub fn new(key_bytes: impl Into<Vec<u8>>, cipher_algorithm: CipherAlgorithm) -> Self {
        Self {
            key_bytes: Zeroizing::new(key_bytes.into()),
            cipher_algorithm,
            is_v6: false,
        }
    }

    pub fn v6(key_bytes: impl Into<Vec<u8>>, cipher_algorithm: CipherAlgorithm) -> Self {
        Self {
            key_bytes: Zeroizing::new(key_bytes.into()),
            cipher_algorithm,
            is_v6: true,
        }
    }

    pub(crate) fn to_session_key(&self) -> SessionKey {
        let cipher = (!self.is_v6).then_some(self.cipher_algorithm);
        SessionKey::new(self.key_bytes.to_vec(), cipher)
    }
}

impl From<&SessionKey> for SessionKeyCandidate {
    fn from(key: &SessionKey) -> Self {
        match key.cipher() {
            Some(cipher) => Self::new(key.as_bytes().to_vec(), cipher),
            None => Self::v6(key.as_bytes().to_vec(), CipherAlgorithm::Aes256),
        }
    }
}

impl fmt::Debug for SessionKeyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyCandidate")
            .field("cipher_algorithm", &self.cipher_algorithm)
            .field("is_v6", &self.is_v6)
            .finish()
    }
}
