use criterion::{criterion_group, criterion_main, Criterion};
use pgp_flow::{
    decrypt, CipherAlgorithm, DecryptionOptions, Key, MessageBuilder, SessionKey,
    SessionKeyCandidate,
};
use rand::{rngs::OsRng, TryRngCore};
use std::hint::black_box;
use std::io::Read;

const KIBIBYTE: usize = 1024;
const MEBIBYTE: usize = 1024 * KIBIBYTE;
const PLAINTEXT_SIZE: usize = MEBIBYTE; // 1 MiB

/// Generates a signer, a session key and a signed message of random bytes.
fn setup() -> (Key, SessionKey, Vec<u8>) {
    let signer = Key::generate().unwrap();
    let session_key = SessionKey::generate(CipherAlgorithm::Aes256, false).unwrap();
    let mut plaintext = vec![0u8; PLAINTEXT_SIZE];
    OsRng.try_fill_bytes(&mut plaintext).unwrap();
    let message = MessageBuilder::new()
        .session_key(session_key.clone())
        .signing_key(signer.clone())
        .encrypt(&plaintext)
        .unwrap();
    (signer, session_key, message)
}

fn benchmark_decrypt(c: &mut Criterion) {
    let (signer, session_key, message) = setup();

    let mut group = c.benchmark_group("Decrypt");
    group.sample_size(10);
    group.throughput(criterion::Throughput::Bytes(PLAINTEXT_SIZE as u64));

    let unverified = DecryptionOptions::new()
        .session_key(SessionKeyCandidate::from(&session_key))
        .build()
        .unwrap();
    group.bench_function("session_key", |b| {
        b.iter(|| {
            let mut reader = decrypt(&unverified, black_box(&message[..])).unwrap();
            let mut plaintext = Vec::with_capacity(PLAINTEXT_SIZE);
            reader.read_to_end(&mut plaintext).unwrap();
        });
    });

    let verified = DecryptionOptions::new()
        .session_key(SessionKeyCandidate::from(&session_key))
        .verify_key(signer.to_public())
        .build()
        .unwrap();
    group.bench_function("session_key_verified", |b| {
        b.iter(|| {
            let (_, result) = decrypt(&verified, black_box(&message[..]))
                .unwrap()
                .read_all_and_verify()
                .unwrap();
            assert!(result.is_valid());
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_decrypt);
criterion_main!(benches);
