//! Chunked AEAD encrypted data packets.
//!
//! The body is a header followed by `n` sealed chunks of `chunk_size` bytes
//! (the last one may be shorter) and a final authentication tag over the empty
//! string. Chunk `i` is sealed with `derive_nonce(base, i)`; the final tag uses
//! index `n` and binds the total plaintext length, so a stream cut at a chunk
//! boundary does not authenticate.
//!
//! 分块 AEAD 加密数据包。
//! 主体由头部、`n` 个密封分块以及一个覆盖空串的最终认证标签组成。
//! 第 `i` 个分块使用 `derive_nonce(base, i)`；最终标签使用索引 `n`
//! 并绑定明文总长度，因此在分块边界截断的流无法通过认证。

use super::header::BodyReader;
use crate::common::algorithms::{CipherAlgorithm, AEAD_GCM};
use crate::common::{chunk_size, derive_nonce, MAX_CHUNK_SIZE_BYTE};
use crate::error::{CryptoError, FormatError, Result};
use crate::keys::SessionKey;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use bytes::{Buf, BytesMut};
use hkdf::Hkdf;
use rand::{rngs::OsRng, TryRngCore};
use sha2::Sha256;
use std::io::{self, Read};
use tracing::trace;
use zeroize::Zeroizing;

const TAG_SIZE: usize = 16;
const PACKET_TAG_BYTE: u8 = 0xD2;

/// Header of an encrypted data packet.
///
/// 加密数据包的头部。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncryptedDataHeader {
    /// The cipher comes from the session key; the base nonce is in the packet.
    V1 {
        aead: u8,
        chunk_size_byte: u8,
        nonce: [u8; 12],
    },
    /// Cipher and salt are in the packet; key and nonce are derived with HKDF.
    V2 {
        cipher: u8,
        aead: u8,
        chunk_size_byte: u8,
        salt: [u8; 32],
    },
}

impl EncryptedDataHeader {
    pub(crate) fn new_v1(chunk_size_byte: u8) -> Result<Self> {
        let mut nonce = [0u8; 12];
        OsRng.try_fill_bytes(&mut nonce)?;
        Ok(Self::V1 {
            aead: AEAD_GCM,
            chunk_size_byte,
            nonce,
        })
    }

    pub(crate) fn new_v2(cipher: CipherAlgorithm, chunk_size_byte: u8) -> Result<Self> {
        let mut salt = [0u8; 32];
        OsRng.try_fill_bytes(&mut salt)?;
        Ok(Self::V2 {
            cipher: cipher.id(),
            aead: AEAD_GCM,
            chunk_size_byte,
            salt,
        })
    }

    pub(crate) fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        let header = match version[0] {
            1 => {
                let mut fixed = [0u8; 14];
                reader.read_exact(&mut fixed)?;
                let mut nonce = [0u8; 12];
                nonce.copy_from_slice(&fixed[2..]);
                Self::V1 {
                    aead: fixed[0],
                    chunk_size_byte: fixed[1],
                    nonce,
                }
            }
            2 => {
                let mut fixed = [0u8; 35];
                reader.read_exact(&mut fixed)?;
                let mut salt = [0u8; 32];
                salt.copy_from_slice(&fixed[3..]);
                Self::V2 {
                    cipher: fixed[0],
                    aead: fixed[1],
                    chunk_size_byte: fixed[2],
                    salt,
                }
            }
            version => {
                return Err(FormatError::UnsupportedVersion {
                    kind: "encrypted data",
                    version,
                }
                .into())
            }
        };
        if header.chunk_size_byte() > MAX_CHUNK_SIZE_BYTE {
            return Err(FormatError::Malformed("encrypted data").into());
        }
        Ok(header)
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        match self {
            Self::V1 {
                aead,
                chunk_size_byte,
                nonce,
            } => {
                out.extend_from_slice(&[1, *aead, *chunk_size_byte]);
                out.extend_from_slice(nonce);
            }
            Self::V2 {
                cipher,
                aead,
                chunk_size_byte,
                salt,
            } => {
                out.extend_from_slice(&[2, *cipher, *aead, *chunk_size_byte]);
                out.extend_from_slice(salt);
            }
        }
    }

    pub fn version(&self) -> u8 {
        match self {
            Self::V1 { .. } => 1,
            Self::V2 { .. } => 2,
        }
    }

    pub fn chunk_size_byte(&self) -> u8 {
        match self {
            Self::V1 {
                chunk_size_byte, ..
            }
            | Self::V2 {
                chunk_size_byte, ..
            } => *chunk_size_byte,
        }
    }

    fn aead(&self) -> u8 {
        match self {
            Self::V1 { aead, .. } | Self::V2 { aead, .. } => *aead,
        }
    }

    /// Derives the chunk schedule for `session_key`.
    ///
    /// 为 `session_key` 推导分块密钥计划。
    pub(crate) fn schedule(
        &self,
        session_key: &SessionKey,
    ) -> std::result::Result<ChunkSchedule, CryptoError> {
        if self.aead() != AEAD_GCM {
            return Err(CryptoError::UnsupportedAead(self.aead()));
        }
        let cipher = match self {
            Self::V1 { .. } => session_key.cipher().ok_or(CryptoError::MissingCipher)?,
            Self::V2 { cipher, .. } => CipherAlgorithm::try_from(*cipher)?,
        };
        let key = session_key.as_bytes();
        if key.len() != cipher.key_size() {
            return Err(CryptoError::InvalidKeyLength {
                expected: cipher.key_size(),
                actual: key.len(),
            });
        }

        let aad = vec![
            PACKET_TAG_BYTE,
            self.version(),
            cipher.id(),
            self.aead(),
            self.chunk_size_byte(),
        ];
        let (chunk_cipher, base_nonce) = match self {
            Self::V1 { nonce, .. } => (ChunkCipher::new(cipher, key)?, *nonce),
            Self::V2 { salt, .. } => {
                let mut okm = Zeroizing::new(vec![0u8; cipher.key_size() + 12]);
                Hkdf::<Sha256>::new(Some(&salt[..]), key)
                    .expand(&aad, &mut okm[..])
                    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
                let (derived_key, nonce_bytes) = okm.split_at(cipher.key_size());
                let mut nonce = [0u8; 12];
                nonce.copy_from_slice(nonce_bytes);
                (ChunkCipher::new(cipher, derived_key)?, nonce)
            }
        };

        Ok(ChunkSchedule {
            cipher: chunk_cipher,
            base_nonce,
            aad,
            chunk_size: chunk_size(self.chunk_size_byte()),
        })
    }

    /// Seals `plaintext` into a complete packet body, header included.
    pub(crate) fn seal_body(&self, session_key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
        let schedule = self.schedule(session_key)?;
        let mut out = Vec::with_capacity(plaintext.len() + 64);
        self.write(&mut out);

        let mut index = 0u64;
        for chunk in plaintext.chunks(schedule.chunk_size) {
            out.extend_from_slice(&schedule.seal_chunk(index, chunk)?);
            index += 1;
        }
        out.extend_from_slice(&schedule.final_tag(index, plaintext.len() as u64)?);
        Ok(out)
    }
}

/// AES-GCM keyed for one data packet.
pub(crate) enum ChunkCipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl ChunkCipher {
    pub(crate) fn new(
        cipher: CipherAlgorithm,
        key: &[u8],
    ) -> std::result::Result<Self, CryptoError> {
        let invalid = || CryptoError::InvalidKeyLength {
            expected: cipher.key_size(),
            actual: key.len(),
        };
        Ok(match cipher {
            CipherAlgorithm::Aes128 => {
                Self::Aes128(Box::new(Aes128Gcm::new_from_slice(key).map_err(|_| invalid())?))
            }
            CipherAlgorithm::Aes256 => {
                Self::Aes256(Box::new(Aes256Gcm::new_from_slice(key).map_err(|_| invalid())?))
            }
        })
    }

    pub(crate) fn seal(
        &self,
        nonce: &[u8; 12],
        aad: &[u8],
        msg: &[u8],
    ) -> std::result::Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload { msg, aad };
        match self {
            Self::Aes128(c) => c.encrypt(nonce, payload),
            Self::Aes256(c) => c.encrypt(nonce, payload),
        }
        .map_err(|_| CryptoError::AuthenticationFailed)
    }

    pub(crate) fn open(
        &self,
        nonce: &[u8; 12],
        aad: &[u8],
        msg: &[u8],
    ) -> std::result::Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload { msg, aad };
        match self {
            Self::Aes128(c) => c.decrypt(nonce, payload),
            Self::Aes256(c) => c.decrypt(nonce, payload),
        }
        .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

/// Per-packet key, nonce and associated data.
pub(crate) struct ChunkSchedule {
    cipher: ChunkCipher,
    base_nonce: [u8; 12],
    aad: Vec<u8>,
    chunk_size: usize,
}

impl ChunkSchedule {
    fn sealed_chunk_size(&self) -> usize {
        self.chunk_size + TAG_SIZE
    }

    fn seal_chunk(&self, index: u64, chunk: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        self.cipher
            .seal(&derive_nonce(&self.base_nonce, index), &self.aad, chunk)
    }

    fn open_chunk(&self, index: u64, chunk: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        self.cipher
            .open(&derive_nonce(&self.base_nonce, index), &self.aad, chunk)
    }

    fn final_aad(&self, total: u64) -> Vec<u8> {
        let mut aad = self.aad.clone();
        aad.extend_from_slice(&total.to_be_bytes());
        aad
    }

    fn final_tag(&self, index: u64, total: u64) -> std::result::Result<Vec<u8>, CryptoError> {
        self.cipher.seal(
            &derive_nonce(&self.base_nonce, index),
            &self.final_aad(total),
            &[],
        )
    }

    fn check_final_tag(
        &self,
        index: u64,
        total: u64,
        tag: &[u8],
    ) -> std::result::Result<(), CryptoError> {
        self.cipher
            .open(&derive_nonce(&self.base_nonce, index), &self.final_aad(total), tag)
            .map(|_| ())
    }

    /// Opens the tail of the stream: an optional last chunk and the final tag.
    fn open_tail(
        &self,
        index: u64,
        total: u64,
        tail: &[u8],
    ) -> std::result::Result<Vec<u8>, CryptoError> {
        if tail.len() < TAG_SIZE || tail.len() > self.sealed_chunk_size() + TAG_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }
        let (chunk, tag) = tail.split_at(tail.len() - TAG_SIZE);
        if chunk.is_empty() {
            self.check_final_tag(index, total, tag)?;
            return Ok(Vec::new());
        }
        if chunk.len() <= TAG_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }
        let plain = self.open_chunk(index, chunk)?;
        self.check_final_tag(index + 1, total + plain.len() as u64, tag)?;
        Ok(plain)
    }
}

/// Decrypted output of one step over the ciphertext.
struct Step {
    plaintext: Vec<u8>,
    consumed: usize,
    last: bool,
}

fn step(
    schedule: &ChunkSchedule,
    index: u64,
    total: u64,
    pending: &[u8],
    eof: bool,
) -> std::result::Result<Step, CryptoError> {
    if eof {
        Ok(Step {
            plaintext: schedule.open_tail(index, total, pending)?,
            consumed: pending.len(),
            last: true,
        })
    } else {
        let sealed = schedule.sealed_chunk_size();
        Ok(Step {
            plaintext: schedule.open_chunk(index, &pending[..sealed])?,
            consumed: sealed,
            last: false,
        })
    }
}

/// Fills `pending` until it holds one sealed chunk plus a tag of lookahead,
/// or the source ends. Returns whether the source ended.
fn fill<R: Read>(source: &mut R, pending: &mut Vec<u8>, target: usize) -> io::Result<bool> {
    let start = pending.len();
    if start >= target {
        return Ok(false);
    }
    pending.resize(target, 0);
    let mut filled = start;
    while filled < target {
        match source.read(&mut pending[filled..]) {
            Ok(0) => {
                pending.truncate(filled);
                return Ok(true);
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                pending.truncate(filled);
                return Err(e);
            }
        }
    }
    Ok(false)
}

/// An encrypted data packet whose first ciphertext unit is buffered, so that
/// several session keys can be tried against it.
///
/// 已缓冲首个密文单元的加密数据包，可对其尝试多个会话密钥。
pub(crate) struct SealedData<R> {
    header: EncryptedDataHeader,
    body: BodyReader<R>,
    pending: Vec<u8>,
    eof: bool,
}

/// Proof that a session key authenticated the first ciphertext unit.
pub(crate) struct Unlocked {
    schedule: ChunkSchedule,
    first: Step,
}

impl<R: Read> SealedData<R> {
    pub(crate) fn new(header: EncryptedDataHeader, mut body: BodyReader<R>) -> Result<Self> {
        let mut pending = Vec::new();
        let target = chunk_size(header.chunk_size_byte()) + 2 * TAG_SIZE;
        let eof = fill(&mut body, &mut pending, target)?;
        Ok(Self {
            header,
            body,
            pending,
            eof,
        })
    }

    /// Authenticates the first chunk (or the final tag of an empty stream)
    /// with `session_key`.
    ///
    /// 使用 `session_key` 认证第一个分块（或空流的最终标签）。
    pub(crate) fn unlock(
        &self,
        session_key: &SessionKey,
    ) -> std::result::Result<Unlocked, CryptoError> {
        let schedule = self.header.schedule(session_key)?;
        let first = step(&schedule, 0, 0, &self.pending, self.eof)?;
        Ok(Unlocked { schedule, first })
    }

    pub(crate) fn into_reader(self, unlocked: Unlocked) -> DecryptReader<R> {
        let Unlocked { schedule, first } = unlocked;
        let mut pending = self.pending;
        pending.drain(..first.consumed);
        let total = first.plaintext.len() as u64;
        DecryptReader {
            source: self.body,
            schedule,
            pending,
            out: BytesMut::from(&first.plaintext[..]),
            index: 1,
            total,
            eof: self.eof,
            finished: first.last,
            poisoned: false,
        }
    }
}

/// Streaming plaintext of an unlocked encrypted data packet. Bytes are only
/// released once the chunk holding them authenticated, and the end of the
/// stream is only reported once the final tag authenticated.
///
/// 已解锁加密数据包的流式明文。
pub struct DecryptReader<R> {
    source: BodyReader<R>,
    schedule: ChunkSchedule,
    pending: Vec<u8>,
    out: BytesMut,
    index: u64,
    total: u64,
    eof: bool,
    finished: bool,
    poisoned: bool,
}

impl<R: Read> DecryptReader<R> {
    fn advance(&mut self) -> Result<()> {
        let target = self.schedule.sealed_chunk_size() + TAG_SIZE;
        if !self.eof {
            self.eof = fill(&mut self.source, &mut self.pending, target)?;
        }
        let next = step(
            &self.schedule,
            self.index,
            self.total,
            &self.pending,
            self.eof,
        )?;
        self.pending.drain(..next.consumed);
        self.index += 1;
        self.total += next.plaintext.len() as u64;
        self.out.extend_from_slice(&next.plaintext);
        if next.last {
            trace!(chunks = self.index, bytes = self.total, "encrypted data authenticated");
            self.finished = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "encrypted data stream is corrupted",
            ));
        }
        while self.out.is_empty() && !self.finished {
            if let Err(e) = self.advance() {
                self.poisoned = true;
                return Err(e.into());
            }
        }
        let n = buf.len().min(self.out.len());
        buf[..n].copy_from_slice(&self.out[..n]);
        self.out.advance(n);
        Ok(n)
    }
}
