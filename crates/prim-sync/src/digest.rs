use std::io::{self, Write};

use sha2::{Digest, Sha256};

use crate::metadata::CacheMetadata;

/// Unit of payload I/O while streaming.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Hex-encoded SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// True iff there is a prior record and its stored digest equals `new_digest`.
pub fn is_unchanged(prior: Option<&CacheMetadata>, new_digest: &str) -> bool {
    prior.is_some_and(|meta| meta.content_hash == new_digest)
}

/// Writer adapter that hashes every byte it forwards.
///
/// Lets the digest be computed while a payload streams to disk instead of
/// re-reading the file afterwards.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Write `data` through in slices of at most [`CHUNK_SIZE`] bytes.
    pub fn write_chunked(&mut self, data: &[u8]) -> io::Result<()> {
        for chunk in data.chunks(CHUNK_SIZE) {
            self.write_all(chunk)?;
        }
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flush and return the inner writer, the hex digest and the byte count.
    pub fn finish(mut self) -> io::Result<(W, String, u64)> {
        self.inner.flush()?;
        let hash = hex::encode(self.hasher.finalize());
        Ok((self.inner, hash, self.written))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
