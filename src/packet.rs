//! A minimal OpenPGP-style packet codec.
//!
//! Small packets are parsed eagerly into a [`Packet`]. Literal data and
//! encrypted data packets only have their headers parsed; their bodies stay
//! on the wire and are handed out as a streaming [`BodyReader`] through
//! [`PacketReader::into_body`].
//!
//! 最小化的 OpenPGP 风格数据包编解码器。
//! 小型数据包会被立即解析；字面数据包与加密数据包只解析头部，
//! 其主体通过 [`PacketReader::into_body`] 以流的方式交出。

use crate::error::{Error, FormatError, Result};
use std::fmt;
use std::io::{self, Read};
use tracing::debug;

pub mod encrypted;
pub mod header;
pub mod key_exchange;
pub mod literal;
pub mod signature;

pub use encrypted::EncryptedDataHeader;
pub use header::BodyReader;
pub use key_exchange::{Pkesk, Skesk};
pub use literal::{DataFormat, LiteralHeader, LiteralMetadata};
pub use signature::{OnePassSignature, Signature, SignatureType};

use header::{read_header, BodyLength, BodyState};

/// Packet type tags.
///
/// 数据包类型标签。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    PublicKeyEncryptedSessionKey,
    Signature,
    SymmetricKeyEncryptedSessionKey,
    OnePassSignature,
    CompressedData,
    SymmetricallyEncryptedData,
    Marker,
    LiteralData,
    SymEncryptedIntegrityProtectedData,
    AeadEncryptedData,
    Other(u8),
}

impl Tag {
    pub fn id(self) -> u8 {
        match self {
            Tag::PublicKeyEncryptedSessionKey => 1,
            Tag::Signature => 2,
            Tag::SymmetricKeyEncryptedSessionKey => 3,
            Tag::OnePassSignature => 4,
            Tag::CompressedData => 8,
            Tag::SymmetricallyEncryptedData => 9,
            Tag::Marker => 10,
            Tag::LiteralData => 11,
            Tag::SymEncryptedIntegrityProtectedData => 18,
            Tag::AeadEncryptedData => 20,
            Tag::Other(id) => id,
        }
    }

    /// Session key packets, which a reader may skip when it cannot parse
    /// them.
    pub(crate) fn is_session_key(self) -> bool {
        matches!(
            self,
            Tag::PublicKeyEncryptedSessionKey | Tag::SymmetricKeyEncryptedSessionKey
        )
    }

    /// Packets allowed to use partial body lengths.
    pub(crate) fn is_streaming(self) -> bool {
        matches!(
            self,
            Tag::CompressedData
                | Tag::SymmetricallyEncryptedData
                | Tag::LiteralData
                | Tag::SymEncryptedIntegrityProtectedData
                | Tag::AeadEncryptedData
        )
    }
}

impl From<u8> for Tag {
    fn from(id: u8) -> Self {
        match id {
            1 => Tag::PublicKeyEncryptedSessionKey,
            2 => Tag::Signature,
            3 => Tag::SymmetricKeyEncryptedSessionKey,
            4 => Tag::OnePassSignature,
            8 => Tag::CompressedData,
            9 => Tag::SymmetricallyEncryptedData,
            10 => Tag::Marker,
            11 => Tag::LiteralData,
            18 => Tag::SymEncryptedIntegrityProtectedData,
            20 => Tag::AeadEncryptedData,
            other => Tag::Other(other),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tag::PublicKeyEncryptedSessionKey => "public-key encrypted session key",
            Tag::Signature => "signature",
            Tag::SymmetricKeyEncryptedSessionKey => "symmetric-key encrypted session key",
            Tag::OnePassSignature => "one-pass signature",
            Tag::CompressedData => "compressed data",
            Tag::SymmetricallyEncryptedData => "symmetrically encrypted data",
            Tag::Marker => "marker",
            Tag::LiteralData => "literal data",
            Tag::SymEncryptedIntegrityProtectedData => "encrypted data",
            Tag::AeadEncryptedData => "AEAD encrypted data",
            Tag::Other(id) => return write!(f, "tag {id}"),
        };
        f.write_str(name)
    }
}

/// How strictly a packet sequence is checked against the message grammar.
///
/// 数据包序列按消息语法检查的严格程度。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequencePolicy {
    /// Any packet outside the expected grammar is an error.
    Strict,
    /// Unknown or surplus packets are skipped.
    Relaxed,
}

/// One parsed packet.
///
/// 已解析的单个数据包。
#[derive(Clone, Debug)]
pub enum Packet {
    PublicKeyEncryptedSessionKey(Pkesk),
    SymmetricKeyEncryptedSessionKey(Skesk),
    OnePassSignature(OnePassSignature),
    Signature(Signature),
    Marker,
    /// The literal body is pending on the reader.
    LiteralData(LiteralHeader),
    /// The encrypted body is pending on the reader.
    EncryptedData(EncryptedDataHeader),
    /// A recognised packet this crate refuses to process.
    Unsupported(Tag),
    Unknown(Tag),
}

impl Packet {
    pub fn tag(&self) -> Tag {
        match self {
            Packet::PublicKeyEncryptedSessionKey(_) => Tag::PublicKeyEncryptedSessionKey,
            Packet::SymmetricKeyEncryptedSessionKey(_) => Tag::SymmetricKeyEncryptedSessionKey,
            Packet::OnePassSignature(_) => Tag::OnePassSignature,
            Packet::Signature(_) => Tag::Signature,
            Packet::Marker => Tag::Marker,
            Packet::LiteralData(_) => Tag::LiteralData,
            Packet::EncryptedData(_) => Tag::SymEncryptedIntegrityProtectedData,
            Packet::Unsupported(tag) | Packet::Unknown(tag) => *tag,
        }
    }
}

/// Pulls packets off a byte stream.
///
/// 从字节流中拉取数据包。
pub struct PacketReader<R> {
    source: R,
    pending: Option<BodyState>,
    max_packet_size: u64,
}

impl<R: Read> PacketReader<R> {
    pub fn new(source: R, max_packet_size: u64) -> Self {
        Self {
            source,
            pending: None,
            max_packet_size,
        }
    }

    /// Reads the next packet. An unread streaming body left by the previous
    /// packet is skipped first.
    ///
    /// 读取下一个数据包。上一个数据包未读完的流式主体会先被跳过。
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        if let Some(state) = self.pending.take() {
            let mut body = BodyReader::new(&mut self.source, state);
            io::copy(&mut body, &mut io::sink())?;
        }

        let Some(header) = read_header(&mut self.source)? else {
            return Ok(None);
        };

        let packet = match header.tag {
            Tag::LiteralData => {
                let mut body = BodyReader::new(&mut self.source, BodyState::new(header.length));
                let literal = LiteralHeader::read(&mut body)?;
                self.pending = Some(body.state());
                Packet::LiteralData(literal)
            }
            Tag::SymEncryptedIntegrityProtectedData => {
                let mut body = BodyReader::new(&mut self.source, BodyState::new(header.length));
                let encrypted = EncryptedDataHeader::read(&mut body)?;
                self.pending = Some(body.state());
                Packet::EncryptedData(encrypted)
            }
            Tag::CompressedData | Tag::SymmetricallyEncryptedData | Tag::AeadEncryptedData => {
                self.pending = Some(BodyState::new(header.length));
                Packet::Unsupported(header.tag)
            }
            Tag::Other(_) => {
                self.pending = Some(BodyState::new(header.length));
                Packet::Unknown(header.tag)
            }
            tag => {
                let body = self.read_small_body(header.length)?;
                match tag {
                    Tag::PublicKeyEncryptedSessionKey => match Pkesk::parse(&body) {
                        Ok(pkesk) => Packet::PublicKeyEncryptedSessionKey(pkesk),
                        Err(e) if e.is_unsupported() => unsupported_key_packet(tag, &e),
                        Err(e) => return Err(e),
                    },
                    Tag::SymmetricKeyEncryptedSessionKey => match Skesk::parse(&body) {
                        Ok(skesk) => Packet::SymmetricKeyEncryptedSessionKey(skesk),
                        Err(e) if e.is_unsupported() => unsupported_key_packet(tag, &e),
                        Err(e) => return Err(e),
                    },
                    Tag::OnePassSignature => {
                        Packet::OnePassSignature(OnePassSignature::parse(&body)?)
                    }
                    Tag::Signature => Packet::Signature(Signature::parse(&body)?),
                    _ => Packet::Marker,
                }
            }
        };
        Ok(Some(packet))
    }

    fn read_small_body(&mut self, length: BodyLength) -> Result<Vec<u8>> {
        if let BodyLength::Definite(len) = length {
            if len > self.max_packet_size {
                return Err(FormatError::PacketTooLarge(len).into());
            }
        }
        let mut body = Vec::new();
        BodyReader::new(&mut self.source, BodyState::new(length))
            .take(self.max_packet_size + 1)
            .read_to_end(&mut body)?;
        if body.len() as u64 > self.max_packet_size {
            return Err(FormatError::PacketTooLarge(body.len() as u64).into());
        }
        Ok(body)
    }

    /// Hands out the streaming body of the last literal or encrypted data
    /// packet.
    ///
    /// 交出最近一个字面或加密数据包的流式主体。
    pub fn into_body(self) -> Result<BodyReader<R>> {
        match self.pending {
            Some(state) => Ok(BodyReader::new(self.source, state)),
            None => Err(FormatError::NoPendingBody.into()),
        }
    }
}

fn unsupported_key_packet(tag: Tag, err: &Error) -> Packet {
    debug!(%tag, error = %err, "session key packet not understood");
    Packet::Unsupported(tag)
}

/// Cursor over a fully buffered packet body.
pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
    what: &'static str,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, what }
    }

    pub(crate) fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], FormatError> {
        if self.buf.len() < n {
            return Err(FormatError::Malformed(self.what));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> std::result::Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> std::result::Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> std::result::Result<u16, FormatError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> std::result::Result<u32, FormatError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    pub(crate) fn finish(&self) -> std::result::Result<(), FormatError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(FormatError::Malformed(self.what))
        }
    }
}
