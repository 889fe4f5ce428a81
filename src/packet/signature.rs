//! Signature and one-pass signature packets (Ed25519 over SHA-256).
//!
//! 签名与单遍签名数据包（基于 SHA-256 的 Ed25519）。

use super::Decoder;
use crate::common::algorithms::{PublicKeyAlgorithm, HASH_SHA256};
use crate::error::{CryptoError, FormatError, Result};
use crate::keys::{Fingerprint, KeyId};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

const SUBPACKET_CREATION_TIME: u8 = 2;
const SUBPACKET_NOTATION: u8 = 20;
const SUBPACKET_ISSUER_FINGERPRINT: u8 = 33;
const SUBPACKET_INTENDED_RECIPIENT: u8 = 35;
const CRITICAL_BIT: u8 = 0x80;
const FINGERPRINT_VERSION: u8 = 6;

/// Signature type octet. Only document signatures are produced; other types
/// are carried through and never verify.
///
/// 签名类型字节。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureType {
    Binary,
    Text,
    Other(u8),
}

impl SignatureType {
    pub fn id(self) -> u8 {
        match self {
            SignatureType::Binary => 0x00,
            SignatureType::Text => 0x01,
            SignatureType::Other(id) => id,
        }
    }

    pub fn is_text(self) -> bool {
        self == SignatureType::Text
    }
}

impl From<u8> for SignatureType {
    fn from(id: u8) -> Self {
        match id {
            0x00 => SignatureType::Binary,
            0x01 => SignatureType::Text,
            other => SignatureType::Other(other),
        }
    }
}

/// A notation subpacket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notation {
    pub name: String,
    pub value: Vec<u8>,
    pub human_readable: bool,
    pub critical: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Subpacket {
    CreationTime(u32),
    IssuerFingerprint(Fingerprint),
    IntendedRecipient(Fingerprint),
    Notation(Notation),
    Unknown { critical: bool },
}

fn read_subpacket_length(d: &mut Decoder<'_>) -> std::result::Result<usize, FormatError> {
    let first = d.u8()?;
    Ok(match first {
        0..=191 => first as usize,
        192..=254 => (((first as usize) - 192) << 8) + d.u8()? as usize + 192,
        255 => d.u32()? as usize,
    })
}

fn write_subpacket(out: &mut Vec<u8>, kind: u8, critical: bool, data: &[u8]) {
    let len = data.len() + 1;
    if len < 192 {
        out.push(len as u8);
    } else if len < 8384 {
        let v = len - 192;
        out.extend_from_slice(&[((v >> 8) as u8) + 192, (v & 0xFF) as u8]);
    } else {
        out.push(255);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    out.push(if critical { kind | CRITICAL_BIT } else { kind });
    out.extend_from_slice(data);
}

fn read_fingerprint(data: &[u8]) -> std::result::Result<Fingerprint, FormatError> {
    let mut d = Decoder::new(data, "signature subpacket");
    if d.u8()? != FINGERPRINT_VERSION {
        return Err(FormatError::Malformed("signature subpacket"));
    }
    let fingerprint = Fingerprint::from_bytes(d.array()?);
    d.finish()?;
    Ok(fingerprint)
}

fn parse_subpackets(area: &[u8]) -> std::result::Result<Vec<Subpacket>, FormatError> {
    let mut d = Decoder::new(area, "signature subpacket");
    let mut subpackets = Vec::new();
    while !d.is_empty() {
        let len = read_subpacket_length(&mut d)?;
        if len == 0 {
            return Err(FormatError::Malformed("signature subpacket"));
        }
        let raw = d.take(len)?;
        let critical = raw[0] & CRITICAL_BIT != 0;
        let data = &raw[1..];
        let subpacket = match raw[0] & !CRITICAL_BIT {
            SUBPACKET_CREATION_TIME => {
                let mut sd = Decoder::new(data, "signature subpacket");
                let time = sd.u32()?;
                sd.finish()?;
                Subpacket::CreationTime(time)
            }
            SUBPACKET_ISSUER_FINGERPRINT => Subpacket::IssuerFingerprint(read_fingerprint(data)?),
            SUBPACKET_INTENDED_RECIPIENT => Subpacket::IntendedRecipient(read_fingerprint(data)?),
            SUBPACKET_NOTATION => {
                let mut sd = Decoder::new(data, "notation");
                let flags: [u8; 4] = sd.array()?;
                let name_len = sd.u16()? as usize;
                let value_len = sd.u16()? as usize;
                let name = String::from_utf8_lossy(sd.take(name_len)?).into_owned();
                let value = sd.take(value_len)?.to_vec();
                sd.finish()?;
                Subpacket::Notation(Notation {
                    name,
                    value,
                    human_readable: flags[0] & 0x80 != 0,
                    critical,
                })
            }
            _ => Subpacket::Unknown { critical },
        };
        subpackets.push(subpacket);
    }
    Ok(subpackets)
}

/// A v4 document signature.
///
/// v4 文档签名。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    sig_type: SignatureType,
    pk_algorithm: u8,
    hash_algorithm: u8,
    hashed_area: Vec<u8>,
    unhashed_area: Vec<u8>,
    subpackets: Vec<Subpacket>,
    left16: [u8; 2],
    signature: Vec<u8>,
}

impl Signature {
    pub(crate) fn parse(body: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(body, "signature");
        let version = d.u8()?;
        if version != 4 {
            return Err(FormatError::UnsupportedVersion {
                kind: "signature",
                version,
            }
            .into());
        }
        let sig_type = SignatureType::from(d.u8()?);
        let pk_algorithm = d.u8()?;
        let hash_algorithm = d.u8()?;
        let hashed_len = d.u16()? as usize;
        let hashed_area = d.take(hashed_len)?.to_vec();
        let unhashed_len = d.u16()? as usize;
        let unhashed_area = d.take(unhashed_len)?.to_vec();
        let left16 = d.array()?;
        let signature = d.rest().to_vec();
        let subpackets = parse_subpackets(&hashed_area)?;
        Ok(Self {
            sig_type,
            pk_algorithm,
            hash_algorithm,
            hashed_area,
            unhashed_area,
            subpackets,
            left16,
            signature,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[4, self.sig_type.id(), self.pk_algorithm, self.hash_algorithm]);
        out.extend_from_slice(&(self.hashed_area.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.hashed_area);
        out.extend_from_slice(&(self.unhashed_area.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.unhashed_area);
        out.extend_from_slice(&self.left16);
        out.extend_from_slice(&self.signature);
    }

    pub fn sig_type(&self) -> SignatureType {
        self.sig_type
    }

    /// Creation time in seconds since the epoch.
    pub fn creation_time(&self) -> Option<i64> {
        self.subpackets.iter().find_map(|s| match s {
            Subpacket::CreationTime(t) => Some(*t as i64),
            _ => None,
        })
    }

    pub fn issuer_fingerprint(&self) -> Option<Fingerprint> {
        self.subpackets.iter().find_map(|s| match s {
            Subpacket::IssuerFingerprint(fp) => Some(*fp),
            _ => None,
        })
    }

    pub fn issuer_key_id(&self) -> Option<KeyId> {
        self.issuer_fingerprint().map(|fp| fp.key_id())
    }

    pub fn intended_recipients(&self) -> impl Iterator<Item = Fingerprint> + '_ {
        self.subpackets.iter().filter_map(|s| match s {
            Subpacket::IntendedRecipient(fp) => Some(*fp),
            _ => None,
        })
    }

    pub fn notations<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Notation> + 'a {
        self.subpackets.iter().filter_map(move |s| match s {
            Subpacket::Notation(n) if n.name == name => Some(n),
            _ => None,
        })
    }

    /// Whether the hashed area carries a critical subpacket this crate does not
    /// understand.
    pub fn has_unknown_critical(&self) -> bool {
        self.subpackets
            .iter()
            .any(|s| matches!(s, Subpacket::Unknown { critical: true, .. }))
    }

    fn digest(&self, data: &SignatureHasher) -> [u8; 32] {
        let mut hasher = data.hasher.clone();
        let mut trailer = Vec::with_capacity(6 + self.hashed_area.len());
        trailer.extend_from_slice(&[4, self.sig_type.id(), self.pk_algorithm, self.hash_algorithm]);
        trailer.extend_from_slice(&(self.hashed_area.len() as u16).to_be_bytes());
        trailer.extend_from_slice(&self.hashed_area);
        hasher.update(&trailer);
        hasher.update([0x04, 0xFF]);
        hasher.update((trailer.len() as u32).to_be_bytes());
        hasher.finalize().into()
    }

    /// Checks the signature over the data fed into `data` with `key`.
    ///
    /// 使用 `key` 校验写入 `data` 的数据上的签名。
    pub(crate) fn verify(
        &self,
        key: &VerifyingKey,
        data: &SignatureHasher,
    ) -> std::result::Result<(), CryptoError> {
        if self.hash_algorithm != HASH_SHA256 {
            return Err(CryptoError::UnsupportedHash(self.hash_algorithm));
        }
        if PublicKeyAlgorithm::try_from(self.pk_algorithm)? != PublicKeyAlgorithm::Ed25519 {
            return Err(CryptoError::UnsupportedPublicKeyAlgorithm(self.pk_algorithm));
        }
        let digest = self.digest(data);
        if digest[..2] != self.left16 {
            return Err(CryptoError::AuthenticationFailed);
        }
        let signature = ed25519_dalek::Signature::from_slice(&self.signature)
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        key.verify_strict(&digest, &signature)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

/// Builds and signs a document signature.
pub(crate) struct SignatureBuilder {
    sig_type: SignatureType,
    created: u32,
    issuer: Fingerprint,
    intended_recipients: Vec<Fingerprint>,
    notations: Vec<Notation>,
    raw: Vec<(u8, bool, Vec<u8>)>,
}

impl SignatureBuilder {
    pub(crate) fn new(sig_type: SignatureType, created: u32, issuer: Fingerprint) -> Self {
        Self {
            sig_type,
            created,
            issuer,
            intended_recipients: Vec::new(),
            notations: Vec::new(),
            raw: Vec::new(),
        }
    }

    pub(crate) fn intended_recipient(mut self, recipient: Fingerprint) -> Self {
        self.intended_recipients.push(recipient);
        self
    }

    pub(crate) fn notation(mut self, notation: Notation) -> Self {
        self.notations.push(notation);
        self
    }

    #[cfg(test)]
    pub(crate) fn raw_subpacket(mut self, kind: u8, critical: bool, data: &[u8]) -> Self {
        self.raw.push((kind, critical, data.to_vec()));
        self
    }

    fn hashed_area(&self) -> Vec<u8> {
        let mut area = Vec::new();
        write_subpacket(
            &mut area,
            SUBPACKET_CREATION_TIME,
            true,
            &self.created.to_be_bytes(),
        );
        let mut issuer = vec![FINGERPRINT_VERSION];
        issuer.extend_from_slice(self.issuer.as_bytes());
        write_subpacket(&mut area, SUBPACKET_ISSUER_FINGERPRINT, false, &issuer);
        for notation in &self.notations {
            let mut data = vec![if notation.human_readable { 0x80 } else { 0 }, 0, 0, 0];
            data.extend_from_slice(&(notation.name.len() as u16).to_be_bytes());
            data.extend_from_slice(&(notation.value.len() as u16).to_be_bytes());
            data.extend_from_slice(notation.name.as_bytes());
            data.extend_from_slice(&notation.value);
            write_subpacket(&mut area, SUBPACKET_NOTATION, notation.critical, &data);
        }
        for recipient in &self.intended_recipients {
            let mut data = vec![FINGERPRINT_VERSION];
            data.extend_from_slice(recipient.as_bytes());
            write_subpacket(&mut area, SUBPACKET_INTENDED_RECIPIENT, false, &data);
        }
        for (kind, critical, data) in &self.raw {
            write_subpacket(&mut area, *kind, *critical, data);
        }
        area
    }

    pub(crate) fn sign(self, key: &SigningKey, data: &SignatureHasher) -> Result<Signature> {
        let hashed_area = self.hashed_area();
        let subpackets = parse_subpackets(&hashed_area)?;
        let mut signature = Signature {
            sig_type: self.sig_type,
            pk_algorithm: PublicKeyAlgorithm::Ed25519.id(),
            hash_algorithm: HASH_SHA256,
            hashed_area,
            unhashed_area: Vec::new(),
            subpackets,
            left16: [0; 2],
            signature: Vec::new(),
        };
        let digest = signature.digest(data);
        signature.left16 = [digest[0], digest[1]];
        signature.signature = key.sign(&digest).to_bytes().to_vec();
        Ok(signature)
    }
}

/// One-pass signature packet announcing a trailing signature.
///
/// 预告尾随签名的单遍签名数据包。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnePassSignature {
    pub sig_type: SignatureType,
    pub hash_algorithm: u8,
    pub pk_algorithm: u8,
    pub issuer: KeyId,
    /// Set on the last one-pass signature before the signed data.
    pub last: bool,
}

impl OnePassSignature {
    pub(crate) fn for_signature(signature: &Signature, last: bool) -> Self {
        Self {
            sig_type: signature.sig_type,
            hash_algorithm: signature.hash_algorithm,
            pk_algorithm: signature.pk_algorithm,
            issuer: signature.issuer_key_id().unwrap_or(KeyId::WILDCARD),
            last,
        }
    }

    pub(crate) fn parse(body: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(body, "one-pass signature");
        let version = d.u8()?;
        if version != 3 {
            return Err(FormatError::UnsupportedVersion {
                kind: "one-pass signature",
                version,
            }
            .into());
        }
        let sig_type = SignatureType::from(d.u8()?);
        let hash_algorithm = d.u8()?;
        let pk_algorithm = d.u8()?;
        let issuer = KeyId::from_bytes(d.array()?);
        let last = d.u8()? != 0;
        d.finish()?;
        Ok(Self {
            sig_type,
            hash_algorithm,
            pk_algorithm,
            issuer,
            last,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[3, self.sig_type.id(), self.hash_algorithm, self.pk_algorithm]);
        out.extend_from_slice(self.issuer.as_bytes());
        out.push(self.last as u8);
    }
}

/// Running hash of signed data. In text mode every LF is hashed as CRLF.
///
/// 已签名数据的滚动哈希。文本模式下每个 LF 都按 CRLF 计入哈希。
#[derive(Clone)]
pub(crate) struct SignatureHasher {
    hasher: Sha256,
    text: bool,
}

impl SignatureHasher {
    pub(crate) fn new(text: bool) -> Self {
        Self {
            hasher: Sha256::new(),
            text,
        }
    }

    pub(crate) fn is_text(&self) -> bool {
        self.text
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        if !self.text {
            self.hasher.update(data);
            return;
        }
        let mut lines = data.split(|&b| b == b'\n');
        if let Some(first) = lines.next() {
            self.hasher.update(first);
        }
        for line in lines {
            self.hasher.update(b"\r\n");
            self.hasher.update(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Key;

    fn signed(text: bool, data: &[u8], key: &Key) -> (Signature, SignatureHasher) {
        let mut hasher = SignatureHasher::new(text);
        hasher.update(data);
        let sig_type = if text {
            SignatureType::Text
        } else {
            SignatureType::Binary
        };
        let sig = SignatureBuilder::new(sig_type, 1_700_000_000, key.fingerprint())
            .notation(Notation {
                name: "context@proton.ch".into(),
                value: b"ctx".to_vec(),
                human_readable: true,
                critical: true,
            })
            .intended_recipient(key.fingerprint())
            .sign(key.signing_key().unwrap(), &hasher)
            .unwrap();
        (sig, hasher)
    }

    #[test]
    fn test_sign_parse_verify() {
        let key = Key::generate().unwrap();
        let (sig, hasher) = signed(false, b"payload", &key);
        let mut body = Vec::new();
        sig.write(&mut body);
        let parsed = Signature::parse(&body).unwrap();
        assert_eq!(parsed, sig);

        assert_eq!(parsed.creation_time(), Some(1_700_000_000));
        assert_eq!(parsed.issuer_fingerprint(), Some(key.fingerprint()));
        assert_eq!(parsed.intended_recipients().collect::<Vec<_>>(), vec![key.fingerprint()]);
        let notation = parsed.notations("context@proton.ch").next().unwrap();
        assert!(notation.critical);
        assert_eq!(notation.value, b"ctx");
        assert!(!parsed.has_unknown_critical());

        parsed.verify(&key.verifying_key(), &hasher).unwrap();
    }

    #[test]
    fn test_verify_rejects_other_data_and_key() {
        let key = Key::generate().unwrap();
        let other = Key::generate().unwrap();
        let (sig, hasher) = signed(false, b"payload", &key);
        assert!(sig.verify(&other.verifying_key(), &hasher).is_err());

        let mut tampered = SignatureHasher::new(false);
        tampered.update(b"payloaD");
        assert!(sig.verify(&key.verifying_key(), &tampered).is_err());
    }

    #[test]
    fn test_text_hasher_expands_line_feeds() {
        let mut text = SignatureHasher::new(true);
        text.update(b"a\nb");
        text.update(b"\n");
        let mut binary = SignatureHasher::new(false);
        binary.update(b"a\r\nb\r\n");
        assert_eq!(text.hasher.finalize(), binary.hasher.finalize());
    }

    #[test]
    fn test_unknown_critical_subpacket_is_flagged() {
        let key = Key::generate().unwrap();
        let hasher = SignatureHasher::new(false);
        let sig = SignatureBuilder::new(SignatureType::Binary, 1, key.fingerprint())
            .raw_subpacket(99, true, &[1, 2])
            .sign(key.signing_key().unwrap(), &hasher)
            .unwrap();
        assert!(sig.has_unknown_critical());
    }

    #[test]
    fn test_one_pass_signature_parse() {
        let key = Key::generate().unwrap();
        let (sig, _) = signed(true, b"x", &key);
        let ops = OnePassSignature::for_signature(&sig, true);
        let mut body = Vec::new();
        ops.write(&mut body);
        let parsed = OnePassSignature::parse(&body).unwrap();
        assert_eq!(parsed, ops);
        assert_eq!(parsed.issuer, key.key_id());
        assert!(parsed.sig_type.is_text());
    }
}
