//! zlib framing for the `Gzip-stream` request.
//!
//! Both directions carry one long-lived zlib stream. Every client flush ends
//! with a sync flush so the server can decode a complete request without
//! waiting for more input.

use bytes::BytesMut;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::io;

const SCRATCH_SIZE: usize = 32 * 1024;

fn zlib_error(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

// =============================================================================
// Deflate (client -> server)
// =============================================================================

pub struct Deflater {
    inner: Compress,
    scratch: Vec<u8>,
}

impl Deflater {
    pub fn new(level: u32) -> Self {
        Self {
            inner: Compress::new(Compression::new(level.min(9)), true),
            scratch: vec![0u8; SCRATCH_SIZE],
        }
    }

    /// Compress `input` and emit a sync flush, appending to `out`.
    pub fn sync(&mut self, mut input: &[u8], out: &mut BytesMut) -> io::Result<()> {
        loop {
            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();

            self.inner
                .compress(input, &mut self.scratch, FlushCompress::Sync)
                .map_err(zlib_error)?;

            let consumed = (self.inner.total_in() - before_in) as usize;
            let produced = (self.inner.total_out() - before_out) as usize;
            out.extend_from_slice(&self.scratch[..produced]);
            input = &input[consumed..];

            // Spare output space after a sync flush means zlib is drained
            if input.is_empty() && produced < self.scratch.len() {
                return Ok(());
            }
        }
    }

    /// Terminate the stream, appending the trailer to `out`.
    pub fn finish(&mut self, out: &mut BytesMut) -> io::Result<()> {
        loop {
            let before_out = self.inner.total_out();
            let status = self
                .inner
                .compress(&[], &mut self.scratch, FlushCompress::Finish)
                .map_err(zlib_error)?;
            let produced = (self.inner.total_out() - before_out) as usize;
            out.extend_from_slice(&self.scratch[..produced]);

            if status == Status::StreamEnd {
                return Ok(());
            }
            if produced == 0 && status == Status::BufError {
                return Ok(());
            }
        }
    }

    pub fn total_in(&self) -> u64 {
        self.inner.total_in()
    }

    pub fn total_out(&self) -> u64 {
        self.inner.total_out()
    }
}

// =============================================================================
// Inflate (server -> client)
// =============================================================================

pub struct Inflater {
    inner: Decompress,
    scratch: Vec<u8>,
    finished: bool,
}

impl Inflater {
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(true),
            scratch: vec![0u8; SCRATCH_SIZE],
            finished: false,
        }
    }

    /// Inflate whatever `input` holds, appending plain bytes to `out`.
    ///
    /// Bytes following the end of the zlib stream are ignored.
    pub fn decompress(&mut self, mut input: &[u8], out: &mut BytesMut) -> io::Result<()> {
        while !self.finished {
            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();

            let status = self
                .inner
                .decompress(input, &mut self.scratch, FlushDecompress::None)
                .map_err(zlib_error)?;

            let consumed = (self.inner.total_in() - before_in) as usize;
            let produced = (self.inner.total_out() - before_out) as usize;
            out.extend_from_slice(&self.scratch[..produced]);
            input = &input[consumed..];

            if status == Status::StreamEnd {
                self.finished = true;
                break;
            }
            if consumed == 0 && produced == 0 {
                break;
            }
            if input.is_empty() && produced < self.scratch.len() {
                break;
            }
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}
