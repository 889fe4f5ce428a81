use super::{Fingerprint, Key, KeyId};
use std::fmt;

/// An ordered set of keys.
///
/// 一组有序的密钥。
#[derive(Clone, Default)]
pub struct KeyRing {
    keys: Vec<Key>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&mut self, key: Key) {
        self.keys.push(key);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Looks up a key by its primary fingerprint.
    ///
    /// 通过主密钥指纹查找密钥。
    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<&Key> {
        self.keys.iter().find(|k| k.fingerprint() == *fingerprint)
    }

    /// Private keys able to unwrap a session key addressed to `recipient`.
    /// The wildcard id matches every decryption-capable key.
    ///
    /// 能够解开发往 `recipient` 的会话密钥的私钥。通配符 ID 匹配所有可解密的密钥。
    pub fn decryption_keys(&self, recipient: KeyId) -> impl Iterator<Item = &Key> {
        self.keys.iter().filter(move |k| {
            k.can_decrypt() && (recipient.is_wildcard() || k.encryption_key_id() == Some(recipient))
        })
    }
}

impl From<Key> for KeyRing {
    fn from(key: Key) -> Self {
        Self { keys: vec![key] }
    }
}

impl FromIterator<Key> for KeyRing {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decryption_keys_match_recipient() {
        let a = Key::generate().unwrap();
        let b = Key::generate().unwrap();
        let ring: KeyRing = [a.clone(), b.clone(), b.to_public()].into_iter().collect();

        let matched: Vec<_> = ring
            .decryption_keys(b.encryption_key_id().unwrap())
            .map(|k| k.fingerprint())
            .collect();
        assert_eq!(matched, vec![b.fingerprint()]);

        // the public copy of `b` is skipped even for the wildcard
        assert_eq!(ring.decryption_keys(KeyId::WILDCARD).count(), 2);
    }

    #[test]
    fn test_find_by_fingerprint() {
        let key = Key::generate().unwrap();
        let ring = KeyRing::from(key.to_public());
        assert!(ring.find_by_fingerprint(&key.fingerprint()).is_some());
        assert!(ring
            .find_by_fingerprint(&Key::generate().unwrap().fingerprint())
            .is_none());
    }
}
