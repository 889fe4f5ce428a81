//! Deferred signature verification policy.
//!
//! 延迟签名验证策略。

use super::request::DecryptionRequest;
use crate::keys::{Fingerprint, Key, KeyRing};
use crate::packet::signature::SignatureHasher;
use crate::packet::Signature;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Notation name carrying the signature context.
pub const SIGNATURE_CONTEXT_NAME: &str = "context@proton.ch";

/// An application-defined context a signature must carry to be accepted.
///
/// 签名必须携带的、由应用定义的上下文。
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationContext {
    value: String,
    required: bool,
    required_after: Option<i64>,
}

impl VerificationContext {
    pub fn new(value: impl Into<String>, required: bool) -> Self {
        Self {
            value: value.into(),
            required,
            required_after: None,
        }
    }

    /// Only requires the context on signatures created at or after `time`.
    pub fn required_after(mut self, time: i64) -> Self {
        self.required_after = Some(time);
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn is_required_at(&self, created: i64) -> bool {
        self.required && self.required_after.map_or(true, |after| created >= after)
    }
}

/// Why a signature did not verify.
///
/// 签名未通过验证的原因。
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidReason {
    NoVerifyKey,
    TimeOutOfRange,
    ContextMismatch,
    IntendedRecipientMismatch,
    CryptoFailure,
    /// The plaintext was not read to the end before finalizing.
    Incomplete,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvalidReason::NoVerifyKey => "no verification key matches the signature issuer",
            InvalidReason::TimeOutOfRange => "signature was created after the verification time",
            InvalidReason::ContextMismatch => "signature context does not match",
            InvalidReason::IntendedRecipientMismatch => {
                "decryption key is not an intended recipient of the signature"
            }
            InvalidReason::CryptoFailure => "signature is cryptographically invalid",
            InvalidReason::Incomplete => "message was not read to the end",
        })
    }
}

/// Outcome of verifying a message.
///
/// 消息验证结果。
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyResult {
    NotSigned,
    Valid { signer: Fingerprint, created: i64 },
    Invalid(InvalidReason),
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid { .. })
    }

    pub fn signer(&self) -> Option<Fingerprint> {
        match self {
            VerifyResult::Valid { signer, .. } => Some(*signer),
            _ => None,
        }
    }
}

/// Everything needed to judge the signatures of one message.
#[derive(Clone, Debug)]
pub(crate) struct VerificationPolicy {
    verify_keys: Option<KeyRing>,
    context: Option<VerificationContext>,
    verify_time: i64,
    check_time: bool,
    check_recipients: bool,
    /// Fingerprints of the private key that unwrapped the session key.
    decrypted_with: Vec<Fingerprint>,
}

impl VerificationPolicy {
    pub(crate) fn new(request: &DecryptionRequest, decrypted_with: Vec<Fingerprint>) -> Self {
        Self {
            verify_keys: request.verify_keys.clone(),
            context: request.verification_context.clone(),
            verify_time: request.clock.now(),
            check_time: !request.disable_verify_time_check,
            check_recipients: !request.disable_intended_recipient_check,
            decrypted_with,
        }
    }

    /// Judges `signatures` over the data fed into `hasher`. `announced` is the
    /// number of one-pass signatures that preceded the data.
    ///
    /// 对写入 `hasher` 的数据上的 `signatures` 作出判定。
    pub(crate) fn evaluate(
        &self,
        signatures: &[Signature],
        announced: usize,
        hasher: &SignatureHasher,
    ) -> VerifyResult {
        let Some(ring) = self.verify_keys.as_ref().filter(|r| !r.is_empty()) else {
            return VerifyResult::NotSigned;
        };
        if signatures.is_empty() {
            if announced > 0 {
                warn!(announced, "one-pass signatures without trailing signatures");
                return VerifyResult::Invalid(InvalidReason::CryptoFailure);
            }
            return VerifyResult::NotSigned;
        }

        let mut first_failure = None;
        for signature in signatures {
            let Some(key) = signature
                .issuer_fingerprint()
                .and_then(|fp| ring.find_by_fingerprint(&fp))
            else {
                continue;
            };
            match self.check(signature, key, hasher) {
                Ok(result) => {
                    debug!(signer = %key.fingerprint(), "signature verified");
                    return result;
                }
                Err(reason) => {
                    first_failure.get_or_insert(reason);
                }
            }
        }

        let reason = first_failure.unwrap_or(InvalidReason::NoVerifyKey);
        warn!(%reason, "signature verification failed");
        VerifyResult::Invalid(reason)
    }

    fn check(
        &self,
        signature: &Signature,
        key: &Key,
        hasher: &SignatureHasher,
    ) -> Result<VerifyResult, InvalidReason> {
        let created = signature
            .creation_time()
            .ok_or(InvalidReason::CryptoFailure)?;
        if self.check_time && created > self.verify_time {
            return Err(InvalidReason::TimeOutOfRange);
        }

        let notations: Vec<_> = signature.notations(SIGNATURE_CONTEXT_NAME).collect();
        match &self.context {
            Some(context) => {
                if notations
                    .iter()
                    .any(|n| n.value != context.value.as_bytes())
                {
                    return Err(InvalidReason::ContextMismatch);
                }
                if notations.is_empty() && context.is_required_at(created) {
                    return Err(InvalidReason::ContextMismatch);
                }
            }
            None => {
                if notations.iter().any(|n| n.critical) {
                    return Err(InvalidReason::ContextMismatch);
                }
            }
        }

        if self.check_recipients && !self.decrypted_with.is_empty() {
            let mut listed = signature.intended_recipients().peekable();
            if listed.peek().is_some() && !listed.any(|fp| self.decrypted_with.contains(&fp)) {
                return Err(InvalidReason::IntendedRecipientMismatch);
            }
        }

        if signature.sig_type().is_text() != hasher.is_text() || signature.has_unknown_critical() {
            return Err(InvalidReason::CryptoFailure);
        }
        signature
            .verify(&key.verifying_key(), hasher)
            .map_err(|_| InvalidReason::CryptoFailure)?;

        Ok(VerifyResult::Valid {
            signer: key.fingerprint(),
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decrypt::request::DecryptionOptions;
    use crate::packet::signature::{Notation, SignatureBuilder};
    use crate::packet::SignatureType;

    fn sign(
        key: &Key,
        created: u32,
        data: &[u8],
        build: impl FnOnce(SignatureBuilder) -> SignatureBuilder,
    ) -> (Signature, SignatureHasher) {
        let mut hasher = SignatureHasher::new(false);
        hasher.update(data);
        let builder = build(SignatureBuilder::new(
            SignatureType::Binary,
            created,
            key.fingerprint(),
        ));
        let sig = builder.sign(key.signing_key().unwrap(), &hasher).unwrap();
        (sig, hasher)
    }

    fn policy(options: DecryptionOptions, decrypted_with: Vec<Fingerprint>) -> VerificationPolicy {
        let request = options.password("unused").build().unwrap();
        VerificationPolicy::new(&request, decrypted_with)
    }

    #[test]
    fn test_not_signed_without_verify_keys() {
        let key = Key::generate().unwrap();
        let (sig, hasher) = sign(&key, 10, b"data", |b| b);
        let p = policy(DecryptionOptions::new().verify_time(100), Vec::new());
        assert_eq!(p.evaluate(&[sig], 1, &hasher), VerifyResult::NotSigned);
    }

    #[test]
    fn test_valid_and_unknown_signer() {
        let key = Key::generate().unwrap();
        let stranger = Key::generate().unwrap();
        let (sig, hasher) = sign(&key, 10, b"data", |b| b);

        let p = policy(
            DecryptionOptions::new().verify_key(key.to_public()).verify_time(100),
            Vec::new(),
        );
        assert_eq!(
            p.evaluate(std::slice::from_ref(&sig), 1, &hasher),
            VerifyResult::Valid {
                signer: key.fingerprint(),
                created: 10
            }
        );

        let p = policy(
            DecryptionOptions::new().verify_key(stranger.to_public()).verify_time(100),
            Vec::new(),
        );
        assert_eq!(
            p.evaluate(&[sig], 1, &hasher),
            VerifyResult::Invalid(InvalidReason::NoVerifyKey)
        );
    }

    #[test]
    fn test_announced_but_missing_signature() {
        let key = Key::generate().unwrap();
        let p = policy(DecryptionOptions::new().verify_key(key.to_public()), Vec::new());
        let hasher = SignatureHasher::new(false);
        assert_eq!(
            p.evaluate(&[], 1, &hasher),
            VerifyResult::Invalid(InvalidReason::CryptoFailure)
        );
        assert_eq!(p.evaluate(&[], 0, &hasher), VerifyResult::NotSigned);
    }

    #[test]
    fn test_context_rules() {
        let key = Key::generate().unwrap();
        let with_ctx = |value: &str, critical: bool| {
            let value = value.as_bytes().to_vec();
            move |b: SignatureBuilder| {
                b.notation(Notation {
                    name: SIGNATURE_CONTEXT_NAME.into(),
                    value,
                    human_readable: true,
                    critical,
                })
            }
        };
        let base = || DecryptionOptions::new().verify_key(key.to_public()).verify_time(100);

        let (plain, hasher) = sign(&key, 50, b"d", |b| b);
        let required = policy(
            base().verification_context(VerificationContext::new("ctx", true)),
            Vec::new(),
        );
        assert_eq!(
            required.evaluate(std::slice::from_ref(&plain), 0, &hasher),
            VerifyResult::Invalid(InvalidReason::ContextMismatch)
        );

        let later = policy(
            base().verification_context(VerificationContext::new("ctx", true).required_after(60)),
            Vec::new(),
        );
        assert!(later.evaluate(std::slice::from_ref(&plain), 0, &hasher).is_valid());

        let (wrong, hasher) = sign(&key, 50, b"d", with_ctx("other", false));
        assert_eq!(
            required.evaluate(&[wrong], 0, &hasher),
            VerifyResult::Invalid(InvalidReason::ContextMismatch)
        );

        let (right, hasher) = sign(&key, 50, b"d", with_ctx("ctx", true));
        assert!(required.evaluate(std::slice::from_ref(&right), 0, &hasher).is_valid());

        let none = policy(base(), Vec::new());
        assert_eq!(
            none.evaluate(&[right], 0, &hasher),
            VerifyResult::Invalid(InvalidReason::ContextMismatch)
        );
    }

    #[test]
    fn test_intended_recipient_mismatch() {
        let signer = Key::generate().unwrap();
        let recipient = Key::generate().unwrap();
        let other = Key::generate().unwrap();
        let (sig, hasher) = sign(&signer, 10, b"d", |b| {
            b.intended_recipient(recipient.fingerprint())
        });
        let base = || DecryptionOptions::new().verify_key(signer.to_public()).verify_time(100);

        let p = policy(base(), vec![other.fingerprint()]);
        assert_eq!(
            p.evaluate(std::slice::from_ref(&sig), 0, &hasher),
            VerifyResult::Invalid(InvalidReason::IntendedRecipientMismatch)
        );

        let p = policy(base(), vec![recipient.fingerprint()]);
        assert!(p.evaluate(std::slice::from_ref(&sig), 0, &hasher).is_valid());

        let p = policy(base().disable_intended_recipient_check(), vec![other.fingerprint()]);
        assert!(p.evaluate(std::slice::from_ref(&sig), 0, &hasher).is_valid());

        // not decrypted with a private key: nothing to compare against
        let p = policy(base(), Vec::new());
        assert!(p.evaluate(&[sig], 0, &hasher).is_valid());
    }

    #[test]
    fn test_text_signature_over_binary_hash_fails() {
        let key = Key::generate().unwrap();
        let mut hasher = SignatureHasher::new(true);
        hasher.update(b"line\n");
        let sig = SignatureBuilder::new(SignatureType::Text, 10, key.fingerprint())
            .sign(key.signing_key().unwrap(), &hasher)
            .unwrap();
        let p = policy(
            DecryptionOptions::new().verify_key(key.to_public()).verify_time(100),
            Vec::new(),
        );
        assert!(p.evaluate(std::slice::from_ref(&sig), 0, &hasher).is_valid());

        let mut binary = SignatureHasher::new(false);
        binary.update(b"line\r\n");
        assert_eq!(
            p.evaluate(&[sig], 0, &binary),
            VerifyResult::Invalid(InvalidReason::CryptoFailure)
        );
    }
}
