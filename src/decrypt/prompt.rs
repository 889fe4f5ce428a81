use crate::error::{Error, Result};
use zeroize::Zeroizing;

/// One-shot password supplier. The first `resolve` yields the password; any
/// later call means the password did not open the message and fails with
/// [`Error::WrongPassword`].
///
/// 一次性口令提供者。第一次 `resolve` 返回口令；之后的任何调用都表示
/// 口令未能打开消息，并以 [`Error::WrongPassword`] 失败。
pub(crate) struct PasswordPrompt {
    secret: Zeroizing<Vec<u8>>,
    attempts_remaining: u8,
}

impl PasswordPrompt {
    pub(crate) fn new(secret: &[u8]) -> Self {
        Self {
            secret: Zeroizing::new(secret.to_vec()),
            attempts_remaining: 1,
        }
    }

    pub(crate) fn resolve(&mut self) -> Result<&[u8]> {
        if self.attempts_remaining == 0 {
            return Err(Error::WrongPassword);
        }
        self.attempts_remaining -= 1;
        Ok(&self.secret)
    }
}
