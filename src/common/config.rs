use crate::common::{
    DEFAULT_CHUNK_SIZE_BYTE, DEFAULT_MAX_ARGON2_MEMORY_EXP, DEFAULT_MAX_PACKET_SIZE,
    DEFAULT_MAX_SIGNATURE_SIZE, MAX_CHUNK_SIZE_BYTE,
};
use std::sync::Arc;

pub(crate) struct ConfigIndex {
    pub chunk_size_byte: u8,
    pub max_packet_size: u64,
    pub max_signature_size: usize,
    pub max_argon2_memory_exp: u8,
}

impl Default for ConfigIndex {
    fn default() -> Self {
        Self {
            chunk_size_byte: DEFAULT_CHUNK_SIZE_BYTE,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_signature_size: DEFAULT_MAX_SIGNATURE_SIZE,
            max_argon2_memory_exp: DEFAULT_MAX_ARGON2_MEMORY_EXP,
        }
    }
}

/// Cheaply clonable engine limits shared by requests and builders.
///
/// 可廉价克隆的引擎限制参数，由请求与构建器共享。
#[derive(Clone, Default)]
pub struct ArcConfig {
    index: Arc<ConfigIndex>,
}

impl ArcConfig {
    /// Chunk size byte used when producing data packets.
    pub fn chunk_size_byte(&self) -> u8 {
        self.index.chunk_size_byte
    }

    /// Upper bound for the body of any non-streaming packet.
    pub fn max_packet_size(&self) -> u64 {
        self.index.max_packet_size
    }

    /// Upper bound for a decrypted detached signature payload.
    pub fn max_signature_size(&self) -> usize {
        self.index.max_signature_size
    }

    /// Largest Argon2 memory exponent a password packet may ask for.
    /// Packets above it are tried like any password packet that fails.
    pub fn max_argon2_memory_exp(&self) -> u8 {
        self.index.max_argon2_memory_exp
    }
}

impl std::fmt::Debug for ArcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcConfig")
            .field("chunk_size_byte", &self.chunk_size_byte())
            .field("max_packet_size", &self.max_packet_size())
            .field("max_signature_size", &self.max_signature_size())
            .field("max_argon2_memory_exp", &self.max_argon2_memory_exp())
            .finish()
    }
}

pub struct ConfigBuilder {
    pub chunk_size_byte: u8,
    pub max_packet_size: u64,
    pub max_signature_size: usize,
    pub max_argon2_memory_exp: u8,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            chunk_size_byte: DEFAULT_CHUNK_SIZE_BYTE,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_signature_size: DEFAULT_MAX_SIGNATURE_SIZE,
            max_argon2_memory_exp: DEFAULT_MAX_ARGON2_MEMORY_EXP,
        }
    }

    /// Sets the chunk size byte; values above the wire maximum are clamped.
    pub fn set_chunk_size_byte(mut self, chunk_size_byte: u8) -> Self {
        self.chunk_size_byte = chunk_size_byte.min(MAX_CHUNK_SIZE_BYTE);
        self
    }

    pub fn set_max_packet_size(mut self, max_packet_size: u64) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn set_max_signature_size(mut self, max_signature_size: usize) -> Self {
        self.max_signature_size = max_signature_size;
        self
    }

    pub fn set_max_argon2_memory_exp(mut self, max_argon2_memory_exp: u8) -> Self {
        self.max_argon2_memory_exp = max_argon2_memory_exp;
        self
    }

    pub fn build(self) -> ArcConfig {
        ArcConfig {
            index: Arc::new(ConfigIndex {
                chunk_size_byte: self.chunk_size_byte,
                max_packet_size: self.max_packet_size,
                max_signature_size: self.max_signature_size,
                max_argon2_memory_exp: self.max_argon2_memory_exp,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_clamps_chunk_size() {
        let config = ConfigBuilder::new().set_chunk_size_byte(40).build();
        assert_eq!(config.chunk_size_byte(), MAX_CHUNK_SIZE_BYTE);
    }

    #[test]
    fn test_default_limits() {
        let config = ArcConfig::default();
        assert_eq!(config.chunk_size_byte(), DEFAULT_CHUNK_SIZE_BYTE);
        assert_eq!(config.max_signature_size(), DEFAULT_MAX_SIGNATURE_SIZE);
        assert_eq!(config.max_argon2_memory_exp(), DEFAULT_MAX_ARGON2_MEMORY_EXP);
    }
}
