use crate::packet::Tag;
use rand::rand_core::OsError;
use std::io;
use thiserror::Error;

/// Errors raised while decoding the packet grammar.
///
/// 解码数据包语法时产生的错误。
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid packet header byte {0:#04x}")]
    InvalidHeader(u8),

    #[error("unexpected {0} packet")]
    UnexpectedPacket(Tag),

    #[error("message does not contain an encrypted data packet")]
    MissingEncryptedData,

    #[error("message does not contain a literal data packet")]
    MissingLiteralData,

    #[error("detached signature stream does not contain a signature")]
    MissingSignature,

    #[error("packet body of {0} bytes exceeds the configured limit")]
    PacketTooLarge(u64),

    #[error("unsupported {kind} version {version}")]
    UnsupportedVersion { kind: &'static str, version: u8 },

    #[error("malformed {0} packet")]
    Malformed(&'static str),

    #[error("number of signatures does not match the one-pass signatures")]
    SignatureCountMismatch,

    #[error("no streaming body is pending on the packet reader")]
    NoPendingBody,
}

/// Errors raised by the cryptographic primitives.
///
/// 密码学原语产生的错误。
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported symmetric cipher id {0}")]
    UnsupportedCipher(u8),

    #[error("unsupported AEAD mode id {0}")]
    UnsupportedAead(u8),

    #[error("unsupported public key algorithm id {0}")]
    UnsupportedPublicKeyAlgorithm(u8),

    #[error("unsupported hash algorithm id {0}")]
    UnsupportedHash(u8),

    #[error("unsupported string-to-key specifier {0}")]
    UnsupportedS2k(u8),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("no cipher is known for this session key")]
    MissingCipher,

    #[error("authentication failed: data may have been tampered with or the key is wrong")]
    AuthenticationFailed,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid public key material")]
    InvalidPublicKey,

    #[error("key has no {0} capability")]
    MissingCapability(&'static str),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("OS-level random number generation failed: {0}")]
    OsRngError(#[from] OsError),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("exactly one of private keys, password or session keys must be configured")]
    MissingCredential,

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] FormatError),

    #[error("unsupported {0} packet")]
    UnsupportedPacket(Tag),

    #[error("wrong password or malformed message")]
    WrongPassword,

    #[error("unable to decrypt the message with any session key candidate")]
    NoMatchingSessionKey(#[source] CryptoError),

    #[error("no private key matches the recipients of the message")]
    NoDecryptionKey,

    #[error("cryptographic operation failed: {0}")]
    Crypto(#[from] CryptoError),
}

impl Error {
    /// Whether the error names a version, algorithm or string-to-key
    /// specifier the engine does not implement, as opposed to broken data.
    pub(crate) fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::MalformedMessage(FormatError::UnsupportedVersion { .. })
                | Error::Crypto(
                    CryptoError::UnsupportedCipher(_)
                        | CryptoError::UnsupportedAead(_)
                        | CryptoError::UnsupportedPublicKeyAlgorithm(_)
                        | CryptoError::UnsupportedHash(_)
                        | CryptoError::UnsupportedS2k(_)
                )
        )
    }
}

/// Recovers a crate error that travelled through an `io::Read` chain.
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Io(io::Error::new(kind, other)),
            None => Error::Io(kind.into()),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

// 定义一个统一的 Result 类型
pub type Result<T> = std::result::Result<T, Error>;
