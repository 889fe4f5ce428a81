//! The plaintext reader handed to callers, with verification deferred until
//! the literal data has been read to the end.
//!
//! 交给调用者的明文读取器；签名验证推迟到字面数据读完之后。

use super::sanitize::LineEndingNormalizer;
use super::verify::{InvalidReason, VerificationPolicy, VerifyResult};
use super::Source;
use crate::error::{Error, FormatError, Result};
use crate::keys::SessionKey;
use crate::packet::signature::SignatureHasher;
use crate::packet::{
    BodyReader, LiteralHeader, LiteralMetadata, Packet, PacketReader, SequencePolicy, Signature,
};
use std::fmt;
use std::io::{self, Read};
use tracing::{debug, trace};

/// What follows the literal data in the plaintext stream.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Trailer {
    /// Signatures are embedded after the literal data, one per one-pass
    /// signature in front of it.
    Embedded {
        one_pass: usize,
        policy: SequencePolicy,
        max_packet_size: u64,
    },
    /// Signatures came from a separate stream; the rest is drained unread.
    Detached,
}

enum Body<'a> {
    Binary(BodyReader<Source<'a>>),
    Text(LineEndingNormalizer<BodyReader<Source<'a>>>),
}

impl<'a> Body<'a> {
    fn into_source(self) -> Source<'a> {
        match self {
            Body::Binary(body) => body.into_inner(),
            Body::Text(body) => body.into_inner().into_inner(),
        }
    }
}

impl Read for Body<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Body::Binary(body) => body.read(buf),
            Body::Text(body) => body.read(buf),
        }
    }
}

enum State {
    Reading,
    Finished(VerifyResult),
    Corrupted,
}

/// Streams the decrypted literal data and judges its signatures once the
/// stream is exhausted.
///
/// Reads fail with [`io::ErrorKind::InvalidData`] on integrity or framing
/// errors and the reader stays failed afterwards. `Ok(0)` is only returned
/// after the trailing packets were drained and the encrypted data packet
/// authenticated to its end.
///
/// 流式输出解密后的字面数据，并在流读尽后判定其签名。
/// 完整性或格式错误会使读取以 `InvalidData` 失败，之后读取器保持失败状态。
/// 只有在尾部数据包被读完且加密数据包认证到末尾后才会返回 `Ok(0)`。
pub struct VerifyDataReader<'a> {
    body: Option<Body<'a>>,
    hasher: SignatureHasher,
    signatures: Vec<Signature>,
    trailer: Trailer,
    verification: VerificationPolicy,
    metadata: LiteralMetadata,
    session_key: Option<SessionKey>,
    state: State,
}

impl<'a> VerifyDataReader<'a> {
    /// `signatures` are those already known before the literal body: leading
    /// signatures of an embedded message, or the detached signatures.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        literal: &LiteralHeader,
        body: BodyReader<Source<'a>>,
        signatures: Vec<Signature>,
        text: bool,
        trailer: Trailer,
        verification: VerificationPolicy,
        session_key: Option<SessionKey>,
    ) -> Self {
        let body = if text {
            Body::Text(LineEndingNormalizer::new(body))
        } else {
            Body::Binary(body)
        };
        Self {
            body: Some(body),
            hasher: SignatureHasher::new(text),
            signatures,
            trailer,
            verification,
            metadata: LiteralMetadata::from(literal),
            session_key,
            state: State::Reading,
        }
    }

    pub fn metadata(&self) -> &LiteralMetadata {
        &self.metadata
    }

    pub fn filename(&self) -> &str {
        &self.metadata.filename
    }

    pub fn modification_time(&self) -> i64 {
        self.metadata.modification_time
    }

    pub fn is_binary(&self) -> bool {
        self.metadata.is_binary
    }

    pub fn is_utf8(&self) -> bool {
        self.metadata.is_utf8_text
    }

    /// The session key that opened the message, when the request asked for it.
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    /// Whether the plaintext was read to the end and verified.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished(_))
    }

    /// Returns the verification verdict. Before the plaintext was read to the
    /// end, or after a read failed, the verdict is
    /// `Invalid(InvalidReason::Incomplete)`.
    ///
    /// 返回验证结论。明文未读完或读取失败时，结论为 `Invalid(Incomplete)`。
    pub fn finalize(&self) -> VerifyResult {
        match &self.state {
            State::Finished(result) => result.clone(),
            State::Reading | State::Corrupted => VerifyResult::Invalid(InvalidReason::Incomplete),
        }
    }

    /// Reads the whole plaintext and returns it together with the verdict.
    pub fn read_all_and_verify(mut self) -> Result<(Vec<u8>, VerifyResult)> {
        let mut plaintext = Vec::new();
        self.read_to_end(&mut plaintext)?;
        let result = self.finalize();
        Ok((plaintext, result))
    }

    fn finish(&mut self) -> Result<VerifyResult> {
        let mut source = self
            .body
            .take()
            .map(Body::into_source)
            .ok_or(FormatError::MissingLiteralData)?;

        let announced = match self.trailer {
            Trailer::Embedded {
                one_pass,
                policy,
                max_packet_size,
            } => {
                let trailing = read_trailing_signatures(source, policy, max_packet_size)?;
                if policy == SequencePolicy::Strict && trailing.len() != one_pass {
                    return Err(FormatError::SignatureCountMismatch.into());
                }
                self.signatures.extend(trailing);
                one_pass
            }
            Trailer::Detached => {
                io::copy(&mut source, &mut io::sink())?;
                0
            }
        };

        debug!(
            signature_candidates = self.signatures.len(),
            announced, "plaintext drained, verifying"
        );
        Ok(self
            .verification
            .evaluate(&self.signatures, announced, &self.hasher))
    }
}

/// Collects the signature packets after the literal data and reads the
/// plaintext stream to its authenticated end.
fn read_trailing_signatures(
    source: Source<'_>,
    policy: SequencePolicy,
    max_packet_size: u64,
) -> Result<Vec<Signature>> {
    let mut packets = PacketReader::new(source, max_packet_size);
    let mut signatures = Vec::new();
    while let Some(packet) = packets.next_packet()? {
        match packet {
            Packet::Signature(signature) => signatures.push(signature),
            Packet::Marker => {}
            other if policy == SequencePolicy::Relaxed => {
                trace!(tag = %other.tag(), "skipping trailing packet");
            }
            Packet::Unsupported(tag) if !tag.is_session_key() => {
                return Err(Error::UnsupportedPacket(tag))
            }
            other => return Err(FormatError::UnexpectedPacket(other.tag()).into()),
        }
    }
    Ok(signatures)
}

impl Read for VerifyDataReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.state {
            State::Reading => {}
            State::Finished(_) => return Ok(0),
            State::Corrupted => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "plaintext stream is corrupted",
                ))
            }
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(body) = self.body.as_mut() else {
            return Ok(0);
        };

        let n = match body.read(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(e),
            Err(e) => {
                self.state = State::Corrupted;
                return Err(e);
            }
        };
        if n > 0 {
            self.hasher.update(&buf[..n]);
            return Ok(n);
        }

        match self.finish() {
            Ok(result) => {
                self.state = State::Finished(result);
                Ok(0)
            }
            Err(e) => {
                self.state = State::Corrupted;
                Err(e.into())
            }
        }
    }
}

impl fmt::Debug for VerifyDataReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Reading => "reading",
            State::Finished(_) => "finished",
            State::Corrupted => "corrupted",
        };
        f.debug_struct("VerifyDataReader")
            .field("metadata", &self.metadata)
            .field("text", &self.hasher.is_text())
            .field("trailer", &self.trailer)
            .field("signatures", &self.signatures.len())
            .field("state", &state)
            .finish()
    }
}
