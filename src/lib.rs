//! `pgp-flow` is a streaming decryption and verification engine for
//! OpenPGP-style encrypted messages. A message can be unlocked with private
//! keys, a password or raw session keys; embedded or detached signatures are
//! verified once the plaintext has been read to the end.
//!
//! ```no_run
//! use pgp_flow::{decrypt, DecryptionOptions, Key, MessageBuilder};
//! use std::io::Read;
//!
//! # fn main() -> pgp_flow::Result<()> {
//! let alice = Key::generate()?;
//! let message = MessageBuilder::new()
//!     .recipient(alice.to_public())
//!     .signing_key(alice.clone())
//!     .encrypt(b"Hello World!")?;
//!
//! let request = DecryptionOptions::new()
//!     .private_key(alice.clone())
//!     .verify_key(alice.to_public())
//!     .build()?;
//! let mut reader = decrypt(&request, &message[..])?;
//! let mut plaintext = Vec::new();
//! reader.read_to_end(&mut plaintext)?;
//! assert!(reader.finalize().is_valid());
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod decrypt;
pub mod error;
pub mod keys;
pub mod packet;
pub mod seal;

pub use common::algorithms::CipherAlgorithm;
pub use common::clock::Clock;
pub use common::config::{ArcConfig, ConfigBuilder};
pub use decrypt::{
    decrypt, decrypt_detached, DecryptionOptions, DecryptionRequest, InvalidReason, UnlockMode,
    VerificationContext, VerifyDataReader, VerifyResult,
};
pub use error::{Error, Result};
pub use keys::{Fingerprint, Key, KeyId, KeyRing, SessionKey, SessionKeyCandidate};
pub use packet::LiteralMetadata;
pub use seal::MessageBuilder;
