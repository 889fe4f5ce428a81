use std::io::{self, Read};

/// Rewrites CRLF and lone CR line endings to LF while streaming.
///
/// 以流式方式把 CRLF 与单独的 CR 换行改写为 LF。
pub struct LineEndingNormalizer<R> {
    inner: R,
    skip_lf: bool,
}

impl<R: Read> LineEndingNormalizer<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            skip_lf: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn normalize_in_place(&mut self, buf: &mut [u8]) -> usize {
        let mut written = 0;
        for i in 0..buf.len() {
            let byte = buf[i];
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            if byte == b'\r' {
                self.skip_lf = true;
                buf[written] = b'\n';
            } else {
                buf[written] = byte;
            }
            written += 1;
        }
        written
    }
}

impl<R: Read> Read for LineEndingNormalizer<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }
            let written = self.normalize_in_place(&mut buf[..n]);
            if written > 0 {
                return Ok(written);
            }
        }
    }
}

/// Normalizes a complete buffer.
pub fn normalize_line_endings(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    let len = LineEndingNormalizer::new(io::empty()).normalize_in_place(&mut out);
    out.truncate(len);
    out
}
