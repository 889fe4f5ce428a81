//! Decryption options and the validated, immutable request built from them.
//!
//! 解密选项以及由其构建的、经过校验的不可变请求。

use super::verify::VerificationContext;
use crate::common::clock::Clock;
use crate::common::config::ArcConfig;
use crate::error::{Error, Result};
use crate::keys::{Key, KeyRing, SessionKeyCandidate};
use std::fmt;
use zeroize::Zeroizing;

/// The credential that unlocks a message.
///
/// 解锁消息所用的凭据。
#[derive(Clone)]
pub enum UnlockMode {
    PrivateKeys(KeyRing),
    Password(Zeroizing<Vec<u8>>),
    /// Tried in order against the encrypted data packet.
    SessionKeys(Vec<SessionKeyCandidate>),
}

impl fmt::Debug for UnlockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockMode::PrivateKeys(ring) => f.debug_tuple("PrivateKeys").field(ring).finish(),
            UnlockMode::Password(_) => f.write_str("Password(..)"),
            UnlockMode::SessionKeys(keys) => f.debug_tuple("SessionKeys").field(keys).finish(),
        }
    }
}

/// A draft decryption configuration. Setters consume and return the draft;
/// [`DecryptionOptions::build`] validates it into a [`DecryptionRequest`].
///
/// 解密配置草稿。设置方法按值消耗并返回草稿；
/// [`DecryptionOptions::build`] 将其校验为 [`DecryptionRequest`]。
#[derive(Clone, Default)]
pub struct DecryptionOptions {
    private_keys: Option<KeyRing>,
    password: Option<Zeroizing<Vec<u8>>>,
    session_keys: Vec<SessionKeyCandidate>,
    verify_keys: Option<KeyRing>,
    verification_context: Option<VerificationContext>,
    clock: Clock,
    disable_verify_time_check: bool,
    disable_intended_recipient_check: bool,
    retrieve_session_key: bool,
    config: ArcConfig,
}

impl DecryptionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn private_keys(mut self, keys: KeyRing) -> Self {
        self.private_keys = Some(keys);
        self
    }

    /// Adds one private key to the decryption key ring.
    pub fn private_key(mut self, key: Key) -> Self {
        self.private_keys.get_or_insert_with(KeyRing::new).add_key(key);
        self
    }

    pub fn password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.password = Some(Zeroizing::new(password.as_ref().to_vec()));
        self
    }

    pub fn session_key(mut self, candidate: SessionKeyCandidate) -> Self {
        self.session_keys.push(candidate);
        self
    }

    pub fn session_keys(mut self, candidates: impl IntoIterator<Item = SessionKeyCandidate>) -> Self {
        self.session_keys.extend(candidates);
        self
    }

    pub fn verify_keys(mut self, keys: KeyRing) -> Self {
        self.verify_keys = Some(keys);
        self
    }

    /// Adds one key to the verification key ring.
    pub fn verify_key(mut self, key: Key) -> Self {
        self.verify_keys.get_or_insert_with(KeyRing::new).add_key(key);
        self
    }

    pub fn verification_context(mut self, context: VerificationContext) -> Self {
        self.verification_context = Some(context);
        self
    }

    /// Verifies signatures as of the fixed unix time `time`.
    pub fn verify_time(mut self, time: i64) -> Self {
        self.clock = Clock::Fixed(time);
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn disable_verify_time_check(mut self) -> Self {
        self.disable_verify_time_check = true;
        self
    }

    pub fn disable_intended_recipient_check(mut self) -> Self {
        self.disable_intended_recipient_check = true;
        self
    }

    /// Exposes the session key that opened the message on the reader.
    pub fn retrieve_session_key(mut self) -> Self {
        self.retrieve_session_key = true;
        self
    }

    pub fn config(mut self, config: ArcConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<DecryptionRequest> {
        DecryptionRequest::new(self)
    }
}

/// A validated decryption request. Holds exactly one unlock mode and is never
/// mutated after construction.
///
/// 经过校验的解密请求。恰好包含一种解锁方式，构建后不再改变。
#[derive(Clone)]
pub struct DecryptionRequest {
    pub(crate) unlock: UnlockMode,
    pub(crate) verify_keys: Option<KeyRing>,
    pub(crate) verification_context: Option<VerificationContext>,
    pub(crate) clock: Clock,
    pub(crate) disable_verify_time_check: bool,
    pub(crate) disable_intended_recipient_check: bool,
    pub(crate) retrieve_session_key: bool,
    pub(crate) config: ArcConfig,
}

impl DecryptionRequest {
    pub fn new(options: DecryptionOptions) -> Result<Self> {
        let DecryptionOptions {
            private_keys,
            password,
            session_keys,
            verify_keys,
            verification_context,
            clock,
            disable_verify_time_check,
            disable_intended_recipient_check,
            retrieve_session_key,
            config,
        } = options;

        let mut sources = Vec::with_capacity(1);
        if let Some(ring) = private_keys {
            sources.push(UnlockMode::PrivateKeys(ring));
        }
        if let Some(password) = password {
            sources.push(UnlockMode::Password(password));
        }
        if !session_keys.is_empty() {
            sources.push(UnlockMode::SessionKeys(session_keys));
        }
        let unlock = match sources.pop() {
            Some(mode) if sources.is_empty() => mode,
            _ => return Err(Error::MissingCredential),
        };

        Ok(Self {
            unlock,
            verify_keys,
            verification_context,
            clock,
            disable_verify_time_check,
            disable_intended_recipient_check,
            retrieve_session_key,
            config,
        })
    }

    pub fn unlock_mode(&self) -> &UnlockMode {
        &self.unlock
    }

    pub fn verify_keys(&self) -> Option<&KeyRing> {
        self.verify_keys.as_ref()
    }

    pub fn verification_context(&self) -> Option<&VerificationContext> {
        self.verification_context.as_ref()
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn config(&self) -> &ArcConfig {
        &self.config
    }
}

impl fmt::Debug for DecryptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionRequest")
            .field("unlock", &self.unlock)
            .field("verify_keys", &self.verify_keys)
            .field("verification_context", &self.verification_context)
            .field("clock", &self.clock)
            .field("disable_verify_time_check", &self.disable_verify_time_check)
            .field(
                "disable_intended_recipient_check",
                &self.disable_intended_recipient_check,
            )
            .field("retrieve_session_key", &self.retrieve_session_key)
            .finish()
    }
}
