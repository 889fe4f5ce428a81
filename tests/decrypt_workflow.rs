//! End-to-end tests: messages produced by `MessageBuilder` and unlocked with
//! each of the three credential kinds.

use pgp_flow::{
    decrypt, CipherAlgorithm, ConfigBuilder, DecryptionOptions, Error, Key, KeyId,
    MessageBuilder, SessionKey, SessionKeyCandidate, VerifyResult,
};
use std::io::{ErrorKind, Read};

const SIGNED_AT: u32 = 1_650_000_000;
const VERIFY_AT: i64 = 1_700_000_000;

fn get_test_data() -> Vec<u8> {
    (0..5000u32).map(|i| (i % 251) as u8).collect()
}

/// Password packets with the cheapest Argon2 cost the tests can afford.
fn password_builder(passwords: &[&str]) -> MessageBuilder {
    passwords
        .iter()
        .fold(MessageBuilder::new().password_params(1, 1, 10), |b, pw| {
            b.password(pw)
        })
}

/// Frames `body` as a new-format packet with a one-byte length.
fn prepend_packet(tag: u8, body: &[u8], message: &[u8]) -> Vec<u8> {
    assert!(body.len() < 192);
    let mut out = vec![0xC0 | tag, body.len() as u8];
    out.extend_from_slice(body);
    out.extend_from_slice(message);
    out
}

/// A v4 password packet using Argon2 with `1 << memory_exp` KiB and
/// garbage key material.
fn argon2_skesk(memory_exp: u8) -> Vec<u8> {
    let mut body = vec![4u8, 9, 4];
    body.extend_from_slice(&[0x11; 16]);
    body.extend_from_slice(&[1, 1, memory_exp]);
    body.extend_from_slice(&[0x22; 12]);
    body.extend_from_slice(&[0x33; 48]);
    body
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn read_all(
    options: &DecryptionOptions,
    message: &[u8],
) -> pgp_flow::Result<(Vec<u8>, VerifyResult)> {
    init_tracing();
    let request = options.clone().build()?;
    decrypt(&request, message)?.read_all_and_verify()
}

#[test]
fn test_private_key_round_trip() {
    let alice = Key::generate().unwrap();
    let bob = Key::generate().unwrap();
    let plaintext = get_test_data();
    let message = MessageBuilder::new()
        .recipient(bob.to_public())
        .signing_key(alice.clone())
        .signature_time(SIGNED_AT)
        .encrypt(&plaintext)
        .unwrap();

    let options = DecryptionOptions::new()
        .private_key(bob.clone())
        .verify_key(alice.to_public())
        .verify_time(VERIFY_AT);
    let (decrypted, result) = read_all(&options, &message).unwrap();
    assert_eq!(decrypted, plaintext);
    assert_eq!(
        result,
        VerifyResult::Valid {
            signer: alice.fingerprint(),
            created: i64::from(SIGNED_AT),
        }
    );
}

#[test]
fn test_private_key_not_a_recipient() {
    let bob = Key::generate().unwrap();
    let eve = Key::generate().unwrap();
    let message = MessageBuilder::new()
        .recipient(bob.to_public())
        .encrypt(b"secret")
        .unwrap();

    let request = DecryptionOptions::new().private_key(eve).build().unwrap();
    assert!(matches!(
        decrypt(&request, &message[..]),
        Err(Error::NoDecryptionKey)
    ));

    // A public-only copy of the right key cannot unwrap either.
    let request = DecryptionOptions::new()
        .private_key(bob.to_public())
        .build()
        .unwrap();
    assert!(matches!(
        decrypt(&request, &message[..]),
        Err(Error::NoDecryptionKey)
    ));
}

#[test]
fn test_hidden_recipient_tries_every_key() {
    let bob = Key::generate().unwrap();
    let other = Key::generate().unwrap();
    let message = MessageBuilder::new()
        .recipient(bob.to_public())
        .hidden_recipients()
        .encrypt(b"anonymous")
        .unwrap();

    let options = DecryptionOptions::new().private_key(other).private_key(bob);
    let (decrypted, result) = read_all(&options, &message).unwrap();
    assert_eq!(decrypted, b"anonymous");
    assert_eq!(result, VerifyResult::NotSigned);
}

#[test]
fn test_password_round_trip() {
    let signer = Key::generate().unwrap();
    let plaintext = get_test_data();
    let message = password_builder(&["correct horse"])
        .signing_key(signer.clone())
        .signature_time(SIGNED_AT)
        .encrypt(&plaintext)
        .unwrap();

    let options = DecryptionOptions::new()
        .password("correct horse")
        .verify_key(signer.to_public())
        .verify_time(VERIFY_AT);
    let (decrypted, result) = read_all(&options, &message).unwrap();
    assert_eq!(decrypted, plaintext);
    assert!(result.is_valid());
}

#[test]
fn test_wrong_password_fails_without_plaintext() {
    let message = password_builder(&["right"]).encrypt(b"never shown").unwrap();
    let request = DecryptionOptions::new().password("wrong").build().unwrap();
    assert!(matches!(
        decrypt(&request, &message[..]),
        Err(Error::WrongPassword)
    ));

    // The request holds no prompt state, so the right password still works.
    let request = DecryptionOptions::new().password("right").build().unwrap();
    let (decrypted, _) = decrypt(&request, &message[..])
        .unwrap()
        .read_all_and_verify()
        .unwrap();
    assert_eq!(decrypted, b"never shown");
}

#[test]
fn test_one_password_attempt_covers_every_password_packet() {
    let message = password_builder(&["first", "second"])
        .encrypt(b"two doors")
        .unwrap();

    for password in ["first", "second"] {
        let options = DecryptionOptions::new().password(password);
        let (decrypted, _) = read_all(&options, &message).unwrap();
        assert_eq!(decrypted, b"two doors");
    }

    let request = DecryptionOptions::new().password("third").build().unwrap();
    assert!(matches!(
        decrypt(&request, &message[..]),
        Err(Error::WrongPassword)
    ));
}

#[test]
fn test_session_key_candidates_in_any_position() {
    let session_key = SessionKey::generate(CipherAlgorithm::Aes256, false).unwrap();
    let message = MessageBuilder::new()
        .session_key(session_key.clone())
        .encrypt(b"out of band")
        .unwrap();

    let right = SessionKeyCandidate::from(&session_key);
    let wrong = || {
        SessionKeyCandidate::from(&SessionKey::generate(CipherAlgorithm::Aes256, false).unwrap())
    };
    let lists = [
        vec![right.clone(), wrong(), wrong()],
        vec![wrong(), right.clone(), wrong()],
        vec![wrong(), wrong(), right.clone()],
    ];
    for list in lists {
        let options = DecryptionOptions::new().session_keys(list);
        let (decrypted, _) = read_all(&options, &message).unwrap();
        assert_eq!(decrypted, b"out of band");
    }

    let request = DecryptionOptions::new()
        .session_keys([wrong(), wrong()])
        .build()
        .unwrap();
    assert!(matches!(
        decrypt(&request, &message[..]),
        Err(Error::NoMatchingSessionKey(_))
    ));
}

#[test]
fn test_session_key_ignores_unreadable_key_packets() {
    let session_key = SessionKey::generate(CipherAlgorithm::Aes256, false).unwrap();
    let message = MessageBuilder::new()
        .session_key(session_key.clone())
        .password_params(1, 1, 10)
        .password("pw")
        .encrypt(b"still readable")
        .unwrap();
    // Iterated-and-salted S2K, then a v5 public-key packet.
    let iterated = [4u8, 9, 3, 8, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0, 1, 96];
    let message = prepend_packet(3, &iterated, &message);
    let message = prepend_packet(1, &[5; 24], &message);

    let options = DecryptionOptions::new().session_key(SessionKeyCandidate::from(&session_key));
    let (decrypted, _) = read_all(&options, &message).unwrap();
    assert_eq!(decrypted, b"still readable");

    let options = DecryptionOptions::new().password("pw");
    let (decrypted, _) = read_all(&options, &message).unwrap();
    assert_eq!(decrypted, b"still readable");
}

#[test]
fn test_mixed_recipient_algorithms() {
    let bob = Key::generate().unwrap();
    let message = MessageBuilder::new()
        .recipient(bob.to_public())
        .encrypt(b"for bob")
        .unwrap();
    // A v3 packet for an RSA recipient, followed by bob's X25519 packet.
    let mut rsa = vec![3u8];
    rsa.extend_from_slice(KeyId::WILDCARD.as_bytes());
    rsa.extend_from_slice(&[1, 0x04, 0x00]);
    rsa.extend_from_slice(&[0x5A; 128]);
    let message = prepend_packet(1, &rsa, &message);

    let options = DecryptionOptions::new().private_key(bob);
    let (decrypted, _) = read_all(&options, &message).unwrap();
    assert_eq!(decrypted, b"for bob");
}

#[test]
fn test_oversized_argon2_packet_is_passed_over() {
    let message = password_builder(&["pw"]).encrypt(b"cheap kdf").unwrap();
    // Asks for 2 TiB of Argon2 memory.
    let message = prepend_packet(3, &argon2_skesk(31), &message);

    let options = DecryptionOptions::new().password("pw");
    let (decrypted, _) = read_all(&options, &message).unwrap();
    assert_eq!(decrypted, b"cheap kdf");

    // A cap below the genuine packet's cost leaves nothing to try.
    let config = ConfigBuilder::new().set_max_argon2_memory_exp(9).build();
    let request = DecryptionOptions::new()
        .password("pw")
        .config(config)
        .build()
        .unwrap();
    assert!(matches!(
        decrypt(&request, &message[..]),
        Err(Error::WrongPassword)
    ));
}

#[test]
fn test_session_key_skips_key_packets() {
    let bob = Key::generate().unwrap();
    let message = MessageBuilder::new()
        .recipient(bob.to_public())
        .v6()
        .encrypt(b"v6 message")
        .unwrap();

    let request = DecryptionOptions::new()
        .private_key(bob)
        .retrieve_session_key()
        .build()
        .unwrap();
    let reader = decrypt(&request, &message[..]).unwrap();
    let session_key = reader.session_key().cloned().unwrap();
    assert!(session_key.is_v6());
    reader.read_all_and_verify().unwrap();

    let options = DecryptionOptions::new().session_key(SessionKeyCandidate::from(&session_key));
    let (decrypted, _) = read_all(&options, &message).unwrap();
    assert_eq!(decrypted, b"v6 message");
}

#[test]
fn test_text_signature_normalizes_line_endings() {
    let signer = Key::generate().unwrap();
    let bob = Key::generate().unwrap();
    let options = DecryptionOptions::new()
        .private_key(bob.clone())
        .verify_key(signer.to_public())
        .verify_time(VERIFY_AT);

    for body in [&b"one\ntwo\n"[..], b"one\r\ntwo\r\n", b"one\rtwo\r"] {
        let message = MessageBuilder::new()
            .recipient(bob.to_public())
            .signing_key(signer.clone())
            .signature_time(SIGNED_AT)
            .utf8()
            .encrypt(body)
            .unwrap();
        let request = options.clone().build().unwrap();
        let reader = decrypt(&request, &message[..]).unwrap();
        assert!(reader.is_utf8());
        assert!(!reader.is_binary());
        let (decrypted, result) = reader.read_all_and_verify().unwrap();
        assert_eq!(decrypted, b"one\ntwo\n");
        assert!(result.is_valid());
    }
}

#[test]
fn test_hello_world_scenario() {
    let signer = Key::generate().unwrap();
    let session_key = SessionKey::generate(CipherAlgorithm::Aes256, false).unwrap();
    let message = MessageBuilder::new()
        .session_key(session_key.clone())
        .signing_key(signer.clone())
        .signature_time(SIGNED_AT)
        .filename("filename.txt")
        .modification_time(1_600_000_000)
        .encrypt(b"Hello World!")
        .unwrap();

    let request = DecryptionOptions::new()
        .session_key(SessionKeyCandidate::from(&session_key))
        .verify_key(signer.to_public())
        .verify_time(VERIFY_AT)
        .build()
        .unwrap();
    let reader = decrypt(&request, &message[..]).unwrap();
    assert!(reader.is_binary());
    assert_eq!(reader.filename(), "filename.txt");
    assert_eq!(reader.modification_time(), 1_600_000_000);

    let (plaintext, result) = reader.read_all_and_verify().unwrap();
    assert_eq!(plaintext, b"Hello World!");
    assert_eq!(result.signer(), Some(signer.fingerprint()));
}

#[test]
fn test_tampered_chunk_aborts_read() {
    let bob = Key::generate().unwrap();
    let config = ConfigBuilder::new().set_chunk_size_byte(0).build();
    let mut message = MessageBuilder::new()
        .recipient(bob.to_public())
        .config(config)
        .encrypt(&get_test_data())
        .unwrap();
    let at = message.len() - 100;
    message[at] ^= 0x40;

    let request = DecryptionOptions::new().private_key(bob).build().unwrap();
    let mut reader = decrypt(&request, &message[..]).unwrap();
    let mut sink = Vec::new();
    let err = reader.read_to_end(&mut sink).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert!(matches!(
        reader.finalize(),
        VerifyResult::Invalid(pgp_flow::InvalidReason::Incomplete)
    ));
}

#[test]
fn test_truncated_message_is_rejected() {
    let session_key = SessionKey::generate(CipherAlgorithm::Aes128, false).unwrap();
    let config = ConfigBuilder::new().set_chunk_size_byte(0).build();
    let message = MessageBuilder::new()
        .session_key(session_key.clone())
        .cipher(CipherAlgorithm::Aes128)
        .config(config)
        .encrypt(&get_test_data())
        .unwrap();

    let request = DecryptionOptions::new()
        .session_key(SessionKeyCandidate::from(&session_key))
        .build()
        .unwrap();
    for cut in [16, 80, 200] {
        let truncated = &message[..message.len() - cut];
        let mut reader = decrypt(&request, truncated).unwrap();
        let mut sink = Vec::new();
        assert!(reader.read_to_end(&mut sink).is_err());
    }
}

#[test]
fn test_compressed_message_is_unsupported() {
    // New-format compressed data packet (tag 8) holding one byte.
    let message = [0xC8, 0x01, 0x00];
    let request = DecryptionOptions::new().password("pw").build().unwrap();
    assert!(matches!(
        decrypt(&request, &message[..]),
        Err(Error::UnsupportedPacket(_))
    ));
}

#[test]
fn test_builder_reuse() {
    let bob = Key::generate().unwrap();
    let builder = MessageBuilder::new().recipient(bob.to_public());
    let first = builder.encrypt(b"same").unwrap();
    let second = builder.encrypt(b"same").unwrap();
    assert_ne!(first, second);

    let options = DecryptionOptions::new().private_key(bob);
    for message in [first, second] {
        let (decrypted, _) = read_all(&options, &message).unwrap();
        assert_eq!(decrypted, b"same");
    }
}
