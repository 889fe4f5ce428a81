//! Session key packets: public-key (X25519) and password (Argon2) wrapping.
//!
//! 会话密钥数据包：公钥（X25519）封装与口令（Argon2）封装。

use super::encrypted::ChunkCipher;
use super::Decoder;
use crate::common::algorithms::{CipherAlgorithm, PublicKeyAlgorithm};
use crate::error::{CryptoError, FormatError, Result};
use crate::keys::{KeyId, SessionKey};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use rand::{rngs::OsRng, TryRngCore};
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

const X25519_WRAP_INFO: &[u8] = b"OpenPGP X25519";
const S2K_ARGON2: u8 = 4;
/// `1 << 31` KiB is the largest memory cost the parameter byte can encode
/// without overflowing the Argon2 `u32`.
const ARGON2_MEMORY_EXP_LIMIT: u8 = 31;
const SKESK_TAG_BYTE: u8 = 0xC3;

/// Public-key encrypted session key packet (v3 or v6).
///
/// 公钥加密的会话密钥数据包（v3 或 v6）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pkesk {
    version: u8,
    recipient: KeyId,
    algorithm: u8,
    ephemeral: [u8; 32],
    wrapped: Vec<u8>,
}

fn x25519_kek(
    ephemeral: &[u8; 32],
    recipient: &X25519PublicKey,
    shared: &[u8; 32],
) -> std::result::Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(96));
    ikm.extend_from_slice(ephemeral);
    ikm.extend_from_slice(recipient.as_bytes());
    ikm.extend_from_slice(shared);
    let mut kek = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(None, &ikm)
        .expand(X25519_WRAP_INFO, &mut kek[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(kek)
}

impl Pkesk {
    pub(crate) fn parse(body: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(body, "public-key encrypted session key");
        let version = d.u8()?;
        if version != 3 && version != 6 {
            return Err(FormatError::UnsupportedVersion {
                kind: "public-key encrypted session key",
                version,
            }
            .into());
        }
        let recipient = KeyId::from_bytes(d.array()?);
        let algorithm = d.u8()?;
        // The rest of the body is laid out per algorithm.
        if PublicKeyAlgorithm::try_from(algorithm)? != PublicKeyAlgorithm::X25519 {
            return Err(CryptoError::UnsupportedPublicKeyAlgorithm(algorithm).into());
        }
        let ephemeral = d.array()?;
        let len = d.u8()? as usize;
        let wrapped = d.take(len)?.to_vec();
        d.finish()?;
        Ok(Self {
            version,
            recipient,
            algorithm,
            ephemeral,
            wrapped,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.extend_from_slice(self.recipient.as_bytes());
        out.push(self.algorithm);
        out.extend_from_slice(&self.ephemeral);
        out.push(self.wrapped.len() as u8);
        out.extend_from_slice(&self.wrapped);
    }

    /// Key id of the intended recipient subkey; the wildcard for anonymous
    /// recipients.
    pub fn recipient(&self) -> KeyId {
        self.recipient
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Wraps `session_key` to `recipient_key`.
    ///
    /// 将 `session_key` 封装给 `recipient_key`。
    pub(crate) fn encrypt(
        recipient: KeyId,
        recipient_key: &X25519PublicKey,
        session_key: &SessionKey,
    ) -> Result<Self> {
        let mut secret = Zeroizing::new([0u8; 32]);
        OsRng.try_fill_bytes(&mut secret[..])?;
        let ephemeral_secret = StaticSecret::from(*secret);
        let ephemeral = X25519PublicKey::from(&ephemeral_secret).to_bytes();
        let shared = ephemeral_secret.diffie_hellman(recipient_key);
        let kek = x25519_kek(&ephemeral, recipient_key, shared.as_bytes())?;

        let version = if session_key.is_v6() { 6 } else { 3 };
        let mut plain = Zeroizing::new(Vec::with_capacity(33));
        if let Some(cipher) = session_key.cipher() {
            plain.push(cipher.id());
        }
        plain.extend_from_slice(session_key.as_bytes());

        let algorithm = PublicKeyAlgorithm::X25519.id();
        let wrapped = ChunkCipher::new(CipherAlgorithm::Aes256, &kek[..])?.seal(
            &[0u8; 12],
            &[version, algorithm],
            &plain,
        )?;
        Ok(Self {
            version,
            recipient,
            algorithm,
            ephemeral,
            wrapped,
        })
    }

    /// Unwraps the session key with the recipient's X25519 secret.
    ///
    /// 使用接收者的 X25519 私钥解封会话密钥。
    pub(crate) fn decrypt(
        &self,
        secret: &StaticSecret,
    ) -> std::result::Result<SessionKey, CryptoError> {
        let shared = secret.diffie_hellman(&X25519PublicKey::from(self.ephemeral));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey);
        }
        let kek = x25519_kek(
            &self.ephemeral,
            &X25519PublicKey::from(secret),
            shared.as_bytes(),
        )?;
        let plain = Zeroizing::new(
            ChunkCipher::new(CipherAlgorithm::Aes256, &kek[..])?.open(
                &[0u8; 12],
                &[self.version, self.algorithm],
                &self.wrapped,
            )?,
        );

        if self.version == 6 {
            if plain.len() != 16 && plain.len() != 32 {
                return Err(CryptoError::InvalidKeyLength {
                    expected: 32,
                    actual: plain.len(),
                });
            }
            return Ok(SessionKey::new(plain.to_vec(), None));
        }

        let (&cipher_id, key) = plain
            .split_first()
            .ok_or(CryptoError::AuthenticationFailed)?;
        let cipher = CipherAlgorithm::try_from(cipher_id)?;
        if key.len() != cipher.key_size() {
            return Err(CryptoError::InvalidKeyLength {
                expected: cipher.key_size(),
                actual: key.len(),
            });
        }
        Ok(SessionKey::new(key.to_vec(), Some(cipher)))
    }
}

/// Argon2id string-to-key parameters.
///
/// Argon2id 口令派生参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct S2kParams {
    pub salt: [u8; 16],
    pub passes: u8,
    pub parallelism: u8,
    /// Memory cost is `1 << memory_exp` KiB.
    pub memory_exp: u8,
}

impl S2kParams {
    pub(crate) fn generate(passes: u8, parallelism: u8, memory_exp: u8) -> Result<Self> {
        let mut salt = [0u8; 16];
        OsRng.try_fill_bytes(&mut salt)?;
        Ok(Self {
            salt,
            passes,
            parallelism,
            memory_exp,
        })
    }

    fn derive(
        &self,
        password: &[u8],
        len: usize,
        max_memory_exp: u8,
    ) -> std::result::Result<Zeroizing<Vec<u8>>, CryptoError> {
        let limit = max_memory_exp.min(ARGON2_MEMORY_EXP_LIMIT);
        if self.memory_exp > limit {
            return Err(CryptoError::KeyDerivation(format!(
                "memory exponent {} exceeds the limit of {limit}",
                self.memory_exp
            )));
        }
        let params = Params::new(
            1u32 << self.memory_exp,
            self.passes as u32,
            self.parallelism as u32,
            Some(len),
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        let mut out = Zeroizing::new(vec![0u8; len]);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password, &self.salt, &mut out[..])
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(out)
    }
}

/// Symmetric-key (password) encrypted session key packet (v4 or v6).
///
/// 对称密钥（口令）加密的会话密钥数据包（v4 或 v6）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skesk {
    version: u8,
    cipher: u8,
    s2k: S2kParams,
    nonce: [u8; 12],
    wrapped: Vec<u8>,
}

impl Skesk {
    pub(crate) fn parse(body: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(body, "symmetric-key encrypted session key");
        let version = d.u8()?;
        if version != 4 && version != 6 {
            return Err(FormatError::UnsupportedVersion {
                kind: "symmetric-key encrypted session key",
                version,
            }
            .into());
        }
        let cipher = d.u8()?;
        let s2k_type = d.u8()?;
        if s2k_type != S2K_ARGON2 {
            return Err(CryptoError::UnsupportedS2k(s2k_type).into());
        }
        let s2k = S2kParams {
            salt: d.array()?,
            passes: d.u8()?,
            parallelism: d.u8()?,
            memory_exp: d.u8()?,
        };
        let nonce = d.array()?;
        let wrapped = d.rest().to_vec();
        Ok(Self {
            version,
            cipher,
            s2k,
            nonce,
            wrapped,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[self.version, self.cipher, S2K_ARGON2]);
        out.extend_from_slice(&self.s2k.salt);
        out.extend_from_slice(&[self.s2k.passes, self.s2k.parallelism, self.s2k.memory_exp]);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.wrapped);
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    fn aad(&self) -> [u8; 3] {
        [SKESK_TAG_BYTE, self.version, self.cipher]
    }

    /// Wraps `session_key` under a key derived from `password`. The wrapping
    /// cipher is the session key's own cipher, or AES-256 for v6 keys.
    ///
    /// 使用由 `password` 派生的密钥封装 `session_key`。
    pub(crate) fn encrypt(
        password: &[u8],
        session_key: &SessionKey,
        s2k: S2kParams,
    ) -> Result<Self> {
        let cipher = session_key.cipher().unwrap_or(CipherAlgorithm::Aes256);
        let mut nonce = [0u8; 12];
        OsRng.try_fill_bytes(&mut nonce)?;
        let mut skesk = Self {
            version: if session_key.is_v6() { 6 } else { 4 },
            cipher: cipher.id(),
            s2k,
            nonce,
            wrapped: Vec::new(),
        };
        let kek = s2k.derive(password, cipher.key_size(), ARGON2_MEMORY_EXP_LIMIT)?;
        skesk.wrapped = ChunkCipher::new(cipher, &kek)?.seal(
            &nonce,
            &skesk.aad(),
            session_key.as_bytes(),
        )?;
        Ok(skesk)
    }

    /// Recovers the session key with `password`. A packet asking for more
    /// than `1 << max_memory_exp` KiB of Argon2 memory is refused.
    ///
    /// 使用 `password` 恢复会话密钥；Argon2 内存需求超过上限的数据包会被拒绝。
    pub(crate) fn decrypt(
        &self,
        password: &[u8],
        max_memory_exp: u8,
    ) -> std::result::Result<SessionKey, CryptoError> {
        let cipher = CipherAlgorithm::try_from(self.cipher)?;
        let kek = self.s2k.derive(password, cipher.key_size(), max_memory_exp)?;
        let key = ChunkCipher::new(cipher, &kek)?.open(&self.nonce, &self.aad(), &self.wrapped)?;
        let key = Zeroizing::new(key);
        Ok(if self.version == 6 {
            SessionKey::new(key.to_vec(), None)
        } else {
            SessionKey::new(key.to_vec(), Some(cipher))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Key;

    fn fast_s2k() -> S2kParams {
        S2kParams::generate(1, 1, 10).unwrap()
    }

    #[test]
    fn test_pkesk_unwraps_for_recipient_only() {
        let key = Key::generate().unwrap();
        let other = Key::generate().unwrap();
        let sk = SessionKey::generate(CipherAlgorithm::Aes128, false).unwrap();
        let pkesk = Pkesk::encrypt(
            key.encryption_key_id().unwrap(),
            &key.encryption_public().unwrap(),
            &sk,
        )
        .unwrap();

        let mut body = Vec::new();
        pkesk.write(&mut body);
        let parsed = Pkesk::parse(&body).unwrap();
        assert_eq!(parsed, pkesk);
        assert_eq!(parsed.recipient(), key.encryption_key_id().unwrap());

        let recovered = parsed.decrypt(key.decryption_secret().unwrap()).unwrap();
        assert_eq!(recovered, sk);
        assert!(matches!(
            parsed.decrypt(other.decryption_secret().unwrap()),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_pkesk_v6_has_no_cipher() {
        let key = Key::generate().unwrap();
        let sk = SessionKey::generate(CipherAlgorithm::Aes256, true).unwrap();
        let pkesk = Pkesk::encrypt(KeyId::WILDCARD, &key.encryption_public().unwrap(), &sk).unwrap();
        assert_eq!(pkesk.version(), 6);
        let recovered = pkesk.decrypt(key.decryption_secret().unwrap()).unwrap();
        assert!(recovered.is_v6());
        assert_eq!(recovered.as_bytes(), sk.as_bytes());
    }

    #[test]
    fn test_skesk_password() {
        let sk = SessionKey::generate(CipherAlgorithm::Aes256, false).unwrap();
        let skesk = Skesk::encrypt(b"hunter2", &sk, fast_s2k()).unwrap();

        let mut body = Vec::new();
        skesk.write(&mut body);
        let parsed = Skesk::parse(&body).unwrap();
        assert_eq!(parsed, skesk);

        assert_eq!(parsed.decrypt(b"hunter2", 21).unwrap(), sk);
        assert!(matches!(
            parsed.decrypt(b"hunter3", 21),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_skesk_memory_cost_is_capped() {
        let sk = SessionKey::generate(CipherAlgorithm::Aes256, false).unwrap();
        let mut skesk = Skesk::encrypt(b"pw", &sk, fast_s2k()).unwrap();
        assert!(matches!(
            skesk.decrypt(b"pw", 9),
            Err(CryptoError::KeyDerivation(_))
        ));

        // Refused before any memory is reserved.
        skesk.s2k.memory_exp = 31;
        assert!(matches!(
            skesk.decrypt(b"pw", 21),
            Err(CryptoError::KeyDerivation(_))
        ));
        skesk.s2k.memory_exp = 40;
        assert!(matches!(
            skesk.decrypt(b"pw", u8::MAX),
            Err(CryptoError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_skesk_rejects_unknown_s2k() {
        let body = [4u8, 9, 3, 0, 0];
        assert!(matches!(
            Skesk::parse(&body),
            Err(crate::Error::Crypto(CryptoError::UnsupportedS2k(3)))
        ));
    }

    #[test]
    fn test_pkesk_rejects_unknown_version() {
        let body = [5u8; 50];
        assert!(matches!(
            Pkesk::parse(&body),
            Err(crate::Error::MalformedMessage(FormatError::UnsupportedVersion { version: 5, .. }))
        ));
    }
}
