//! The streaming decryption engine.
//!
//! A message is unlocked in three stages. The outer packets are walked up to
//! the encrypted data packet; the selected credential recovers a session key
//! that must authenticate the first chunk of that packet; the decrypted bytes
//! are parsed again as an inner packet stream whose literal body is handed to
//! the caller through a [`VerifyDataReader`].
//!
//! 流式解密引擎。
//! 消息分三个阶段解锁：先遍历外层数据包直到加密数据包；再用所选凭据恢复会话密钥，
//! 该密钥必须能认证加密数据包的第一个分块；最后把解密得到的字节重新解析为内层数据包流，
//! 其字面数据主体通过 [`VerifyDataReader`] 交给调用者。

use crate::error::{Error, FormatError, Result};
use crate::keys::{Fingerprint, KeyRing, SessionKey};
use crate::packet::encrypted::{SealedData, Unlocked};
use crate::packet::{
    BodyReader, LiteralHeader, OnePassSignature, Packet, PacketReader, Pkesk, SequencePolicy,
    Signature, Skesk,
};
use std::io::Read;
use tracing::{debug, trace};

pub mod detached;
pub mod prompt;
pub mod reader;
pub mod request;
pub mod sanitize;
pub mod unwrap;
pub mod verify;

pub use detached::decrypt_detached;
pub use reader::VerifyDataReader;
pub use request::{DecryptionOptions, DecryptionRequest, UnlockMode};
pub use verify::{InvalidReason, VerificationContext, VerifyResult, SIGNATURE_CONTEXT_NAME};

use prompt::PasswordPrompt;
use reader::Trailer;
use unwrap::SessionKeyUnwrapper;
use verify::VerificationPolicy;

/// A boxed plaintext or ciphertext source.
pub(crate) type Source<'a> = Box<dyn Read + 'a>;

/// Key packets found in front of the encrypted data packet.
pub(crate) struct Preamble<R> {
    pub pkesks: Vec<Pkesk>,
    pub skesks: Vec<Skesk>,
    pub data: SealedData<R>,
}

/// Walks the outer packets up to and including the encrypted data packet.
///
/// 遍历外层数据包，直到（并包括）加密数据包。
pub(crate) fn read_preamble<R: Read>(mut packets: PacketReader<R>) -> Result<Preamble<R>> {
    let mut pkesks = Vec::new();
    let mut skesks = Vec::new();
    loop {
        match packets.next_packet()? {
            Some(Packet::PublicKeyEncryptedSessionKey(pkesk)) => pkesks.push(pkesk),
            Some(Packet::SymmetricKeyEncryptedSessionKey(skesk)) => skesks.push(skesk),
            Some(Packet::Marker) => {}
            Some(Packet::EncryptedData(header)) => {
                trace!(
                    version = header.version(),
                    pkesks = pkesks.len(),
                    skesks = skesks.len(),
                    "found encrypted data packet"
                );
                let data = SealedData::new(header, packets.into_body()?)?;
                return Ok(Preamble {
                    pkesks,
                    skesks,
                    data,
                });
            }
            Some(Packet::Unsupported(tag)) if tag.is_session_key() => {
                trace!(%tag, "skipping session key packet");
            }
            Some(Packet::Unsupported(tag)) => return Err(Error::UnsupportedPacket(tag)),
            Some(
                packet @ (Packet::OnePassSignature(_)
                | Packet::Signature(_)
                | Packet::LiteralData(_)
                | Packet::Unknown(_)),
            ) => return Err(FormatError::UnexpectedPacket(packet.tag()).into()),
            None => return Err(FormatError::MissingEncryptedData.into()),
        }
    }
}

/// A message whose encrypted data packet has been unlocked.
pub(crate) struct Opened<'a> {
    pub plaintext: Source<'a>,
    pub session_key: SessionKey,
    /// Fingerprints of the private key that unwrapped the session key, if any.
    pub decrypted_with: Vec<Fingerprint>,
    pub policy: SequencePolicy,
}

/// Dispatches a request to the unlocking algorithm of its credential.
///
/// 根据请求的凭据类型分派到对应的解锁算法。
pub(crate) struct StreamDecryptor<'r> {
    request: &'r DecryptionRequest,
}

impl<'r> StreamDecryptor<'r> {
    pub(crate) fn new(request: &'r DecryptionRequest) -> Self {
        Self { request }
    }

    /// Unlocks `ciphertext`. Every call owns a fresh password prompt.
    pub(crate) fn open<'a>(&self, ciphertext: Source<'a>) -> Result<Opened<'a>> {
        let packets = PacketReader::new(ciphertext, self.request.config.max_packet_size());
        let preamble = read_preamble(packets)?;

        let (session_key, unlocked, decrypted_with, policy) = match &self.request.unlock {
            UnlockMode::PrivateKeys(ring) => {
                debug!(
                    keys = ring.len(),
                    pkesks = preamble.pkesks.len(),
                    "unlocking with private keys"
                );
                let (session_key, unlocked, fingerprints) =
                    Self::unlock_with_keys(ring, &preamble)?;
                (session_key, unlocked, fingerprints, SequencePolicy::Strict)
            }
            UnlockMode::Password(password) => {
                debug!(skesks = preamble.skesks.len(), "unlocking with password");
                let mut prompt = PasswordPrompt::new(password);
                let (session_key, unlocked) = Self::unlock_with_password(
                    &mut prompt,
                    &preamble,
                    self.request.config.max_argon2_memory_exp(),
                )?;
                (session_key, unlocked, Vec::new(), SequencePolicy::Strict)
            }
            UnlockMode::SessionKeys(candidates) => {
                debug!(candidates = candidates.len(), "unlocking with session keys");
                let (session_key, unlocked) =
                    SessionKeyUnwrapper::new(candidates).unwrap(&preamble.data)?;
                (session_key, unlocked, Vec::new(), SequencePolicy::Relaxed)
            }
        };

        Ok(Opened {
            plaintext: Box::new(preamble.data.into_reader(unlocked)),
            session_key,
            decrypted_with,
            policy,
        })
    }

    fn unlock_with_keys<R: Read>(
        ring: &KeyRing,
        preamble: &Preamble<R>,
    ) -> Result<(SessionKey, Unlocked, Vec<Fingerprint>)> {
        for pkesk in &preamble.pkesks {
            for key in ring.decryption_keys(pkesk.recipient()) {
                let Some(secret) = key.decryption_secret() else {
                    continue;
                };
                let session_key = match pkesk.decrypt(secret) {
                    Ok(session_key) => session_key,
                    Err(e) => {
                        trace!(recipient = %pkesk.recipient(), error = %e, "session key not unwrapped");
                        continue;
                    }
                };
                match preamble.data.unlock(&session_key) {
                    Ok(unlocked) => {
                        debug!(key = %key.fingerprint(), "session key recovered");
                        let mut fingerprints = vec![key.fingerprint()];
                        fingerprints.extend(key.encryption_fingerprint());
                        return Ok((session_key, unlocked, fingerprints));
                    }
                    Err(e) => trace!(error = %e, "session key did not open the data packet"),
                }
            }
        }
        Err(Error::NoDecryptionKey)
    }

    /// Tries the password against every symmetric key packet. A second
    /// resolve means the first guess failed, which ends the attempt.
    fn unlock_with_password<R: Read>(
        prompt: &mut PasswordPrompt,
        preamble: &Preamble<R>,
        max_memory_exp: u8,
    ) -> Result<(SessionKey, Unlocked)> {
        loop {
            let password = prompt.resolve()?;
            for skesk in &preamble.skesks {
                let session_key = match skesk.decrypt(password, max_memory_exp) {
                    Ok(session_key) => session_key,
                    Err(e) => {
                        trace!(error = %e, "password packet not opened");
                        continue;
                    }
                };
                if let Ok(unlocked) = preamble.data.unlock(&session_key) {
                    return Ok((session_key, unlocked));
                }
            }
        }
    }
}

/// The decrypted packet stream up to the start of the literal body.
pub(crate) struct InnerMessage<'a> {
    pub one_pass: Vec<OnePassSignature>,
    /// Signatures placed in front of the literal data.
    pub leading: Vec<Signature>,
    pub literal: LiteralHeader,
    pub body: BodyReader<Source<'a>>,
}

impl<'a> InnerMessage<'a> {
    pub(crate) fn parse(
        plaintext: Source<'a>,
        policy: SequencePolicy,
        max_packet_size: u64,
    ) -> Result<Self> {
        let mut packets = PacketReader::new(plaintext, max_packet_size);
        let mut one_pass = Vec::new();
        let mut leading = Vec::new();
        loop {
            match packets.next_packet()? {
                Some(Packet::OnePassSignature(ops)) => one_pass.push(ops),
                Some(Packet::Signature(signature)) => leading.push(signature),
                Some(Packet::Marker) => {}
                Some(Packet::LiteralData(literal)) => {
                    return Ok(Self {
                        one_pass,
                        leading,
                        literal,
                        body: packets.into_body()?,
                    });
                }
                Some(Packet::Unsupported(tag)) if tag.is_session_key() => match policy {
                    SequencePolicy::Relaxed => {}
                    SequencePolicy::Strict => {
                        return Err(FormatError::UnexpectedPacket(tag).into())
                    }
                },
                Some(Packet::Unsupported(tag)) => return Err(Error::UnsupportedPacket(tag)),
                Some(
                    Packet::PublicKeyEncryptedSessionKey(_)
                    | Packet::SymmetricKeyEncryptedSessionKey(_)
                    | Packet::Unknown(_),
                ) if policy == SequencePolicy::Relaxed => {}
                Some(
                    packet @ (Packet::PublicKeyEncryptedSessionKey(_)
                    | Packet::SymmetricKeyEncryptedSessionKey(_)
                    | Packet::Unknown(_)
                    | Packet::EncryptedData(_)),
                ) => return Err(FormatError::UnexpectedPacket(packet.tag()).into()),
                None => return Err(FormatError::MissingLiteralData.into()),
            }
        }
    }

    /// Text mode follows the last one-pass signature, or else the last
    /// signature in front of the data.
    pub(crate) fn is_text(&self) -> bool {
        match (self.one_pass.last(), self.leading.last()) {
            (Some(ops), _) => ops.sig_type.is_text(),
            (None, Some(signature)) => signature.sig_type().is_text(),
            (None, None) => false,
        }
    }
}

/// Decrypts `ciphertext` according to `request`.
///
/// Setup errors (credentials, framing, unsupported packets) are returned here
/// before any plaintext is exposed. The signature verdict is only available
/// from [`VerifyDataReader::finalize`] once the plaintext was read to the end.
///
/// 根据 `request` 解密 `ciphertext`。
/// 设置阶段的错误在暴露任何明文之前返回；签名判定只有在明文读完后
/// 才能通过 [`VerifyDataReader::finalize`] 获得。
pub fn decrypt<'a, R: Read + 'a>(
    request: &DecryptionRequest,
    ciphertext: R,
) -> Result<VerifyDataReader<'a>> {
    let opened = StreamDecryptor::new(request).open(Box::new(ciphertext))?;
    let max_packet_size = request.config.max_packet_size();
    let inner = InnerMessage::parse(opened.plaintext, opened.policy, max_packet_size)?;
    let text = inner.is_text();
    let InnerMessage {
        one_pass,
        leading,
        literal,
        body,
    } = inner;

    let trailer = Trailer::Embedded {
        one_pass: one_pass.len(),
        policy: opened.policy,
        max_packet_size,
    };
    let verification = VerificationPolicy::new(request, opened.decrypted_with);
    let session_key = request.retrieve_session_key.then_some(opened.session_key);
    Ok(VerifyDataReader::new(
        &literal,
        body,
        leading,
        text,
        trailer,
        verification,
        session_key,
    ))
}
