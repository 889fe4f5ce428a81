//! Producing encrypted and signed messages.
//!
//! [`MessageBuilder`] assembles everything the decryption engine consumes:
//! session key packets for recipients and passwords, a chunked AEAD data
//! packet, and inside it a literal data packet optionally framed by a one-pass
//! signature and its signature.
//!
//! 生成加密与签名的消息。
//! [`MessageBuilder`] 组装解密引擎所消费的全部内容：面向接收者与口令的会话密钥数据包、
//! 分块 AEAD 数据包，以及其中可选地由一次性签名及其签名包裹的字面数据包。

use crate::common::algorithms::CipherAlgorithm;
use crate::common::clock::Clock;
use crate::common::config::ArcConfig;
use crate::decrypt::sanitize::normalize_line_endings;
use crate::decrypt::SIGNATURE_CONTEXT_NAME;
use crate::error::{CryptoError, Error, Result};
use crate::keys::{Fingerprint, Key, KeyId, SessionKey};
use crate::packet::header::{write_packet, write_streamed_packet};
use crate::packet::key_exchange::S2kParams;
use crate::packet::signature::{Notation, SignatureBuilder, SignatureHasher};
use crate::packet::{
    DataFormat, EncryptedDataHeader, LiteralHeader, OnePassSignature, Pkesk, Signature,
    SignatureType, Skesk, Tag,
};
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

/// Argon2id passes, lanes and memory exponent used for new password packets.
const DEFAULT_S2K: (u8, u8, u8) = (3, 4, 16);

/// Configures and produces encrypted messages.
///
/// The builder is reusable: every `encrypt` call draws a fresh session key
/// (unless one was set explicitly) and fresh randomness.
///
/// 配置并生成加密消息。
/// 构建器可以重复使用：每次 `encrypt` 都会生成新的会话密钥（除非显式设置）与新的随机数。
#[derive(Clone)]
pub struct MessageBuilder {
    recipients: Vec<Key>,
    hidden_recipients: bool,
    passwords: Vec<Zeroizing<Vec<u8>>>,
    s2k: (u8, u8, u8),
    session_key: Option<SessionKey>,
    cipher: CipherAlgorithm,
    v6: bool,
    signing_key: Option<Key>,
    signature_time: Option<u32>,
    signing_context: Option<(String, bool)>,
    intended_recipients: Option<Vec<Fingerprint>>,
    format: DataFormat,
    filename: String,
    modification_time: u32,
    clock: Clock,
    config: ArcConfig,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            hidden_recipients: false,
            passwords: Vec::new(),
            s2k: DEFAULT_S2K,
            session_key: None,
            cipher: CipherAlgorithm::Aes256,
            v6: false,
            signing_key: None,
            signature_time: None,
            signing_context: None,
            intended_recipients: None,
            format: DataFormat::Binary,
            filename: String::new(),
            modification_time: 0,
            clock: Clock::System,
            config: ArcConfig::default(),
        }
    }
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encrypts the session key to `key`'s encryption subkey.
    ///
    /// 将会话密钥加密给 `key` 的加密子密钥。
    pub fn recipient(mut self, key: Key) -> Self {
        self.recipients.push(key);
        self
    }

    /// Writes the wildcard key id into recipient packets.
    pub fn hidden_recipients(mut self) -> Self {
        self.hidden_recipients = true;
        self
    }

    pub fn password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.passwords.push(Zeroizing::new(password.as_ref().to_vec()));
        self
    }

    /// Argon2id cost for password packets; memory is `1 << memory_exp` KiB.
    ///
    /// 口令数据包的 Argon2id 代价参数；内存为 `1 << memory_exp` KiB。
    pub fn password_params(mut self, passes: u8, parallelism: u8, memory_exp: u8) -> Self {
        self.s2k = (passes, parallelism, memory_exp);
        self
    }

    /// Uses `session_key` instead of a freshly generated one.
    pub fn session_key(mut self, session_key: SessionKey) -> Self {
        self.session_key = Some(session_key);
        self
    }

    pub fn cipher(mut self, cipher: CipherAlgorithm) -> Self {
        self.cipher = cipher;
        self
    }

    /// Produces v6 key packets and a v2 data packet that carries its own cipher.
    ///
    /// 生成 v6 密钥数据包以及自带算法标识的 v2 数据包。
    pub fn v6(mut self) -> Self {
        self.v6 = true;
        self
    }

    pub fn signing_key(mut self, key: Key) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Creation time written into signatures. Defaults to the builder's clock.
    pub fn signature_time(mut self, time: u32) -> Self {
        self.signature_time = Some(time);
        self
    }

    /// Adds the signature context notation.
    pub fn signing_context(mut self, value: impl Into<String>, critical: bool) -> Self {
        self.signing_context = Some((value.into(), critical));
        self
    }

    /// Overrides the intended recipients listed in signatures, which default
    /// to the primary fingerprints of the recipients.
    pub fn intended_recipients(mut self, recipients: impl IntoIterator<Item = Fingerprint>) -> Self {
        self.intended_recipients = Some(recipients.into_iter().collect());
        self
    }

    /// Marks the data as text; signatures become text signatures.
    pub fn text(mut self) -> Self {
        self.format = DataFormat::Text;
        self
    }

    /// Marks the data as UTF-8 text; signatures become text signatures.
    pub fn utf8(mut self) -> Self {
        self.format = DataFormat::Utf8;
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn modification_time(mut self, time: u32) -> Self {
        self.modification_time = time;
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: ArcConfig) -> Self {
        self.config = config;
        self
    }

    /// Encrypts `plaintext` into a complete message, signing it inline when a
    /// signing key is set.
    ///
    /// 将 `plaintext` 加密为完整消息；设置了签名密钥时进行内嵌签名。
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let signature = self.signature(plaintext)?;
        let mut inner = Vec::new();
        if let Some(signature) = &signature {
            let mut ops = Vec::new();
            OnePassSignature::for_signature(signature, true).write(&mut ops);
            write_packet(&mut inner, Tag::OnePassSignature, &ops)?;
        }
        self.write_literal(&mut inner, plaintext)?;
        if let Some(signature) = &signature {
            let mut body = Vec::new();
            signature.write(&mut body);
            write_packet(&mut inner, Tag::Signature, &body)?;
        }

        let session_key = self.resolve_session_key()?;
        self.seal(&session_key, &inner)
    }

    /// Encrypts `plaintext` and, separately, a detached signature over it.
    /// Returns `(data message, signature message)`.
    ///
    /// 分别加密 `plaintext` 与其分离签名，返回 `(数据消息, 签名消息)`。
    pub fn encrypt_detached(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let signature = self
            .signature(plaintext)?
            .ok_or(CryptoError::MissingCapability("signing"))?;

        let mut data = Vec::new();
        self.write_literal(&mut data, plaintext)?;
        let data = self.seal(&self.resolve_session_key()?, &data)?;

        let mut packets = Vec::new();
        let mut body = Vec::new();
        signature.write(&mut body);
        write_packet(&mut packets, Tag::Signature, &body)?;
        let mut literal = Vec::new();
        LiteralHeader {
            format: DataFormat::Binary,
            filename: Vec::new(),
            modification_time: 0,
        }
        .write(&mut literal);
        literal.extend_from_slice(&packets);
        let mut inner = Vec::new();
        write_streamed_packet(&mut inner, Tag::LiteralData, &literal)?;
        let signature_message = self.seal(&self.resolve_session_key()?, &inner)?;

        Ok((data, signature_message))
    }

    fn is_text(&self) -> bool {
        self.format != DataFormat::Binary
    }

    fn resolve_session_key(&self) -> Result<SessionKey> {
        match &self.session_key {
            Some(session_key) => Ok(session_key.clone()),
            None => SessionKey::generate(self.cipher, self.v6),
        }
    }

    fn write_literal(&self, out: &mut Vec<u8>, plaintext: &[u8]) -> Result<()> {
        let mut body = Vec::with_capacity(plaintext.len() + 6 + self.filename.len());
        LiteralHeader {
            format: self.format,
            filename: self.filename.as_bytes().to_vec(),
            modification_time: self.modification_time,
        }
        .write(&mut body);
        body.extend_from_slice(plaintext);
        write_streamed_packet(out, Tag::LiteralData, &body)?;
        Ok(())
    }

    fn signature(&self, plaintext: &[u8]) -> Result<Option<Signature>> {
        let Some(key) = &self.signing_key else {
            return Ok(None);
        };
        let signing_key = key
            .signing_key()
            .ok_or(CryptoError::MissingCapability("signing"))?;

        let text = self.is_text();
        let mut hasher = SignatureHasher::new(text);
        if text {
            hasher.update(&normalize_line_endings(plaintext));
        } else {
            hasher.update(plaintext);
        }

        let sig_type = if text {
            SignatureType::Text
        } else {
            SignatureType::Binary
        };
        let created = self
            .signature_time
            .unwrap_or_else(|| self.clock.now().clamp(0, i64::from(u32::MAX)) as u32);
        let mut builder = SignatureBuilder::new(sig_type, created, key.fingerprint());
        let intended = match &self.intended_recipients {
            Some(fingerprints) => fingerprints.clone(),
            None => self.recipients.iter().map(Key::fingerprint).collect(),
        };
        for fingerprint in intended {
            builder = builder.intended_recipient(fingerprint);
        }
        if let Some((value, critical)) = &self.signing_context {
            builder = builder.notation(Notation {
                name: SIGNATURE_CONTEXT_NAME.to_string(),
                value: value.as_bytes().to_vec(),
                human_readable: true,
                critical: *critical,
            });
        }
        builder.sign(signing_key, &hasher).map(Some)
    }

    /// Writes the key packets and the data packet sealing `inner`.
    fn seal(&self, session_key: &SessionKey, inner: &[u8]) -> Result<Vec<u8>> {
        if self.recipients.is_empty() && self.passwords.is_empty() && self.session_key.is_none() {
            return Err(Error::MissingCredential);
        }

        let mut out = Vec::new();
        for recipient in &self.recipients {
            let (Some(public), Some(key_id)) =
                (recipient.encryption_public(), recipient.encryption_key_id())
            else {
                return Err(CryptoError::MissingCapability("encryption").into());
            };
            let key_id = if self.hidden_recipients {
                KeyId::WILDCARD
            } else {
                key_id
            };
            let mut body = Vec::new();
            Pkesk::encrypt(key_id, &public, session_key)?.write(&mut body);
            write_packet(&mut out, Tag::PublicKeyEncryptedSessionKey, &body)?;
        }
        let (passes, parallelism, memory_exp) = self.s2k;
        for password in &self.passwords {
            let s2k = S2kParams::generate(passes, parallelism, memory_exp)?;
            let mut body = Vec::new();
            Skesk::encrypt(password, session_key, s2k)?.write(&mut body);
            write_packet(&mut out, Tag::SymmetricKeyEncryptedSessionKey, &body)?;
        }

        let chunk_size_byte = self.config.chunk_size_byte();
        let header = if session_key.is_v6() {
            EncryptedDataHeader::new_v2(self.cipher, chunk_size_byte)?
        } else {
            EncryptedDataHeader::new_v1(chunk_size_byte)?
        };
        debug!(
            recipients = self.recipients.len(),
            passwords = self.passwords.len(),
            version = header.version(),
            bytes = inner.len(),
            "sealing message"
        );
        let body = header.seal_body(session_key, inner)?;
        write_streamed_packet(&mut out, Tag::SymEncryptedIntegrityProtectedData, &body)?;
        Ok(out)
    }
}

impl fmt::Debug for MessageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuilder")
            .field("recipients", &self.recipients)
            .field("passwords", &self.passwords.len())
            .field("session_key", &self.session_key)
            .field("cipher", &self.cipher)
            .field("v6", &self.v6)
            .field("signing_key", &self.signing_key)
            .field("format", &self.format)
            .field("filename", &self.filename)
            .finish()
    }
}
