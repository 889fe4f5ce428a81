//! Shared constants, algorithm identifiers, configuration and clocks.
//!
//! 共享常量、算法标识、配置与时钟。

pub mod algorithms;
pub mod clock;
pub mod config;

/// Default chunk size of the chunked AEAD data packet, expressed as the
/// on-wire chunk size byte (`1 << (byte + 6)`), i.e. 64 KiB.
///
/// 分块 AEAD 数据包的默认分块大小（线上编码为 `1 << (byte + 6)`），即 64 KiB。
pub const DEFAULT_CHUNK_SIZE_BYTE: u8 = 10;

/// Largest chunk size byte accepted on the wire.
pub const MAX_CHUNK_SIZE_BYTE: u8 = 16;

/// Default upper bound for the body of any non-streaming packet.
pub const DEFAULT_MAX_PACKET_SIZE: u64 = 1 << 20;

/// Default upper bound for the decrypted payload of a detached signature stream.
pub const DEFAULT_MAX_SIGNATURE_SIZE: usize = 64 * 1024;

/// Default cap on the Argon2 memory exponent read from password packets:
/// `1 << 21` KiB, i.e. 2 GiB.
///
/// 口令数据包中 Argon2 内存指数的默认上限：`1 << 21` KiB，即 2 GiB。
pub const DEFAULT_MAX_ARGON2_MEMORY_EXP: u8 = 21;

/// Converts a chunk size byte into a chunk length in bytes.
pub const fn chunk_size(chunk_size_byte: u8) -> usize {
    1usize << (chunk_size_byte as u32 + 6)
}

/// Derives a nonce for a specific chunk index from a base nonce.
pub fn derive_nonce(base_nonce: &[u8; 12], chunk_index: u64) -> [u8; 12] {
    let mut nonce_bytes = *base_nonce;
    let i_bytes = chunk_index.to_le_bytes(); // u64 -> 8 bytes, little-endian

    // XOR the chunk index into the last 8 bytes of the nonce
    for j in 0..8 {
        nonce_bytes[4 + j] ^= i_bytes[j];
    }

    nonce_bytes
}
