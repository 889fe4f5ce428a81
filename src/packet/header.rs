//! Packet header framing: tags, body lengths and the streaming body reader.
//!
//! 数据包头部帧：标签、主体长度与流式主体读取器。

use super::Tag;
use crate::error::{FormatError, Result};
use std::io::{self, Read, Write};

/// Size of the first and every following partial body chunk we emit.
const PARTIAL_CHUNK_EXP: u8 = 9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BodyLength {
    Definite(u64),
    Partial(u64),
    /// Old-format packets whose body runs to the end of the input.
    Indeterminate,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct PacketHeader {
    pub tag: Tag,
    pub length: BodyLength,
}

fn read_byte<R: Read>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads a new-format body length.
pub(crate) fn read_new_length<R: Read>(reader: &mut R) -> io::Result<BodyLength> {
    let [first] = read_array::<_, 1>(reader)?;
    Ok(match first {
        0..=191 => BodyLength::Definite(first as u64),
        192..=223 => {
            let [second] = read_array::<_, 1>(reader)?;
            BodyLength::Definite((((first as u64) - 192) << 8) + second as u64 + 192)
        }
        224..=254 => BodyLength::Partial(1u64 << (first & 0x1F)),
        255 => BodyLength::Definite(u32::from_be_bytes(read_array(reader)?) as u64),
    })
}

/// Reads the next packet header, or `None` on a clean end of input.
pub(crate) fn read_header<R: Read>(reader: &mut R) -> Result<Option<PacketHeader>> {
    let Some(first) = read_byte(reader)? else {
        return Ok(None);
    };
    if first & 0x80 == 0 {
        return Err(FormatError::InvalidHeader(first).into());
    }

    if first & 0x40 != 0 {
        let tag = Tag::from(first & 0x3F);
        let length = read_new_length(reader)?;
        if matches!(length, BodyLength::Partial(_)) && !tag.is_streaming() {
            return Err(FormatError::Malformed("partial length on non-streaming").into());
        }
        return Ok(Some(PacketHeader { tag, length }));
    }

    let tag = Tag::from((first >> 2) & 0x0F);
    let length = match first & 0x03 {
        0 => BodyLength::Definite(read_array::<_, 1>(reader)?[0] as u64),
        1 => BodyLength::Definite(u16::from_be_bytes(read_array(reader)?) as u64),
        2 => BodyLength::Definite(u32::from_be_bytes(read_array(reader)?) as u64),
        _ => BodyLength::Indeterminate,
    };
    Ok(Some(PacketHeader { tag, length }))
}

/// Position inside a packet body, independent of the source it is read from.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BodyState {
    remaining: u64,
    partial: bool,
    indeterminate: bool,
    done: bool,
}

impl BodyState {
    pub(crate) fn new(length: BodyLength) -> Self {
        let (remaining, partial, indeterminate) = match length {
            BodyLength::Definite(n) => (n, false, false),
            BodyLength::Partial(n) => (n, true, false),
            BodyLength::Indeterminate => (0, false, true),
        };
        Self {
            remaining,
            partial,
            indeterminate,
            done: false,
        }
    }

    fn read_from<R: Read>(&mut self, source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.done {
                return Ok(0);
            }
            if self.indeterminate {
                let n = source.read(buf)?;
                if n == 0 {
                    self.done = true;
                }
                return Ok(n);
            }
            if self.remaining == 0 {
                if !self.partial {
                    self.done = true;
                    return Ok(0);
                }
                match read_new_length(source)? {
                    BodyLength::Partial(n) => self.remaining = n,
                    BodyLength::Definite(n) => {
                        self.remaining = n;
                        self.partial = false;
                    }
                    BodyLength::Indeterminate => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "indeterminate length inside a partial body",
                        ))
                    }
                }
                continue;
            }

            let want = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
            let n = source.read(&mut buf[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "packet body is truncated",
                ));
            }
            self.remaining -= n as u64;
            return Ok(n);
        }
    }
}

/// Reads one packet body, following partial body length chunks.
///
/// 读取单个数据包主体，并跟随部分长度分块。
pub struct BodyReader<R> {
    source: R,
    state: BodyState,
}

impl<R: Read> BodyReader<R> {
    pub(crate) fn new(source: R, state: BodyState) -> Self {
        Self { source, state }
    }

    pub(crate) fn state(&self) -> BodyState {
        self.state
    }

    /// Returns the underlying source, positioned right after this body once
    /// it has been read to the end.
    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R: Read> Read for BodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.state.read_from(&mut self.source, buf)
    }
}

fn write_length<W: Write>(writer: &mut W, len: usize) -> io::Result<()> {
    match len {
        0..=191 => writer.write_all(&[len as u8]),
        192..=8383 => {
            let v = len - 192;
            writer.write_all(&[((v >> 8) as u8) + 192, (v & 0xFF) as u8])
        }
        _ => {
            writer.write_all(&[0xFF])?;
            writer.write_all(&(len as u32).to_be_bytes())
        }
    }
}

/// Writes a new-format packet with a definite body length.
pub(crate) fn write_packet<W: Write>(writer: &mut W, tag: Tag, body: &[u8]) -> io::Result<()> {
    writer.write_all(&[0xC0 | tag.id()])?;
    write_length(writer, body.len())?;
    writer.write_all(body)
}

/// Writes a new-format packet using partial body lengths for bodies larger
/// than one partial chunk.
pub(crate) fn write_streamed_packet<W: Write>(
    writer: &mut W,
    tag: Tag,
    body: &[u8],
) -> io::Result<()> {
    let chunk = 1usize << PARTIAL_CHUNK_EXP;
    writer.write_all(&[0xC0 | tag.id()])?;
    let mut rest = body;
    while rest.len() > chunk {
        writer.write_all(&[0xE0 | PARTIAL_CHUNK_EXP])?;
        writer.write_all(&rest[..chunk])?;
        rest = &rest[chunk..];
    }
    write_length(writer, rest.len())?;
    writer.write_all(rest)
}
