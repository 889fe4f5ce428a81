use crate::error::{FormatError, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Format byte of a literal data packet.
///
/// 字面数据包的格式字节。
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataFormat {
    Binary,
    Text,
    Utf8,
    Mime,
}

impl DataFormat {
    pub fn byte(self) -> u8 {
        match self {
            DataFormat::Binary => b'b',
            DataFormat::Text => b't',
            DataFormat::Utf8 => b'u',
            DataFormat::Mime => b'm',
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'b' => Some(DataFormat::Binary),
            b't' => Some(DataFormat::Text),
            b'u' => Some(DataFormat::Utf8),
            b'm' => Some(DataFormat::Mime),
            _ => None,
        }
    }
}

/// The header fields in front of a literal data body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiteralHeader {
    pub format: DataFormat,
    pub filename: Vec<u8>,
    pub modification_time: u32,
}

impl LiteralHeader {
    pub(crate) fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut fixed = [0u8; 2];
        reader.read_exact(&mut fixed)?;
        let format =
            DataFormat::from_byte(fixed[0]).ok_or(FormatError::Malformed("literal data"))?;
        let mut filename = vec![0u8; fixed[1] as usize];
        reader.read_exact(&mut filename)?;
        let mut time = [0u8; 4];
        reader.read_exact(&mut time)?;
        Ok(Self {
            format,
            filename,
            modification_time: u32::from_be_bytes(time),
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        let name = &self.filename[..self.filename.len().min(255)];
        out.push(self.format.byte());
        out.push(name.len() as u8);
        out.extend_from_slice(name);
        out.extend_from_slice(&self.modification_time.to_be_bytes());
    }
}

/// Metadata of the decrypted literal data, as exposed to callers.
///
/// 暴露给调用者的解密后字面数据元信息。
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiteralMetadata {
    pub filename: String,
    pub modification_time: i64,
    pub is_binary: bool,
    pub is_utf8_text: bool,
}

impl From<&LiteralHeader> for LiteralMetadata {
    fn from(header: &LiteralHeader) -> Self {
        Self {
            filename: String::from_utf8_lossy(&header.filename).into_owned(),
            modification_time: header.modification_time as i64,
            is_binary: header.format == DataFormat::Binary,
            is_utf8_text: header.format == DataFormat::Utf8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_parse() {
        let header = LiteralHeader {
            format: DataFormat::Utf8,
            filename: b"notes.txt".to_vec(),
            modification_time: 1_700_000_000,
        };
        let mut out = Vec::new();
        header.write(&mut out);
        out.extend_from_slice(b"body");

        let mut cursor = Cursor::new(out);
        let parsed = LiteralHeader::read(&mut cursor).unwrap();
        assert_eq!(parsed, header);
        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"body");

        let meta = LiteralMetadata::from(&parsed);
        assert_eq!(meta.filename, "notes.txt");
        assert!(meta.is_utf8_text);
        assert!(!meta.is_binary);
    }

    #[test]
    fn test_unknown_format_byte() {
        let bytes = [b'x', 0, 0, 0, 0, 0];
        assert!(LiteralHeader::read(&mut Cursor::new(bytes)).is_err());
    }
}
