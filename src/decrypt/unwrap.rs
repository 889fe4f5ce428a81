use crate::error::{CryptoError, Error, Result};
use crate::keys::{SessionKey, SessionKeyCandidate};
use crate::packet::encrypted::{SealedData, Unlocked};
use std::io::Read;
use tracing::{debug, trace};

/// Opens an encrypted data packet with caller-supplied session keys, tried in
/// order. Key packets in front of the data packet are irrelevant here and are
/// skipped by the preamble walk.
///
/// 使用调用者提供的会话密钥按顺序尝试打开加密数据包。
pub(crate) struct SessionKeyUnwrapper<'c> {
    candidates: &'c [SessionKeyCandidate],
}

impl<'c> SessionKeyUnwrapper<'c> {
    pub(crate) fn new(candidates: &'c [SessionKeyCandidate]) -> Self {
        Self { candidates }
    }

    /// Returns the first candidate that authenticates the data packet, or
    /// [`Error::NoMatchingSessionKey`] wrapping the last failure.
    pub(crate) fn unwrap<R: Read>(&self, data: &SealedData<R>) -> Result<(SessionKey, Unlocked)> {
        let mut last_error = None;
        for (index, candidate) in self.candidates.iter().enumerate() {
            let session_key = candidate.to_session_key();
            match data.unlock(&session_key) {
                Ok(unlocked) => {
                    debug!(index, v6 = candidate.is_v6, "session key candidate accepted");
                    return Ok((session_key, unlocked));
                }
                Err(e) => {
                    trace!(index, error = %e, "session key candidate rejected");
                    last_error = Some(e);
                }
            }
        }
        Err(Error::NoMatchingSessionKey(
            last_error.unwrap_or(CryptoError::AuthenticationFailed),
        ))
    }
}
