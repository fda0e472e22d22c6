//! Buffered duplex byte stream carrying the CVS protocol.
//!
//! Reads are line oriented with an escape hatch for counted file bodies.
//! Writes accumulate until [`CvsStream::flush`], which is the only place
//! bytes leave the process. Once compression is enabled every byte in
//! both directions passes through zlib.

use crate::error::{CvsError, Result};
use crate::transport::compress::{Deflater, Inflater};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 16 * 1024;

/// Trace target for every protocol line.
pub const PROTO_TARGET: &str = "cvs_sync::proto";

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Byte counters for one stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    /// Bytes received from the channel, compressed or not.
    pub wire_read: u64,
    /// Bytes sent to the channel, compressed or not.
    pub wire_written: u64,
    /// Protocol bytes consumed by callers.
    pub payload_read: u64,
    /// Protocol bytes queued by callers.
    pub payload_written: u64,
}

pub struct CvsStream {
    reader: BoxedReader,
    writer: BoxedWriter,
    rbuf: BytesMut,
    wbuf: BytesMut,
    scratch: Vec<u8>,
    deflater: Option<Deflater>,
    inflater: Option<Inflater>,
    eof: bool,
    stats: StreamStats,
}

impl CvsStream {
    pub fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader,
            writer,
            rbuf: BytesMut::with_capacity(READ_CHUNK),
            wbuf: BytesMut::with_capacity(READ_CHUNK),
            scratch: vec![0u8; READ_CHUNK],
            deflater: None,
            inflater: None,
            eof: false,
            stats: StreamStats::default(),
        }
    }

    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(Box::new(reader), Box::new(writer))
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn is_compressed(&self) -> bool {
        self.deflater.is_some()
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Pull one chunk from the channel into the read buffer.
    ///
    /// Returns `false` once the peer has closed its side.
    async fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let n = self
            .reader
            .read(&mut self.scratch)
            .await
            .map_err(CvsError::ProtocolIo)?;
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.stats.wire_read += n as u64;

        match self.inflater.as_mut() {
            Some(inflater) => inflater
                .decompress(&self.scratch[..n], &mut self.rbuf)
                .map_err(CvsError::ProtocolIo)?,
            None => self.rbuf.extend_from_slice(&self.scratch[..n]),
        }
        Ok(true)
    }

    /// Read one line, without its terminating newline, as raw bytes.
    ///
    /// A final unterminated line is returned as is; EOF with nothing
    /// buffered is [`CvsError::ConnectionClosed`].
    pub async fn read_line_bytes(&mut self) -> Result<Bytes> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.rbuf[scanned..].iter().position(|b| *b == b'\n') {
                let end = scanned + pos;
                let mut raw = self.rbuf.split_to(end + 1);
                self.stats.payload_read += raw.len() as u64;
                raw.truncate(end);
                tracing::trace!(target: PROTO_TARGET, "S: {}", decode_text(&raw));
                return Ok(raw.freeze());
            }
            scanned = self.rbuf.len();

            if !self.fill().await? {
                if self.rbuf.is_empty() {
                    return Err(CvsError::ConnectionClosed);
                }
                let raw = self.rbuf.split();
                self.stats.payload_read += raw.len() as u64;
                tracing::trace!(target: PROTO_TARGET, "S: {} (unterminated)", decode_text(&raw));
                return Ok(raw.freeze());
            }
        }
    }

    /// Read one line as text. See [`decode_text`].
    pub async fn read_line(&mut self) -> Result<String> {
        let raw = self.read_line_bytes().await?;
        Ok(decode_text(&raw))
    }

    /// Read exactly `len` bytes, draining buffered data first.
    pub async fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        if self.rbuf.len() < len {
            self.rbuf.reserve(len - self.rbuf.len());
        }
        while self.rbuf.len() < len {
            if !self.fill().await? {
                return Err(CvsError::Truncated {
                    read: self.rbuf.len(),
                    expected: len,
                });
            }
        }
        self.stats.payload_read += len as u64;
        tracing::trace!(target: PROTO_TARGET, "S: <{} bytes>", len);
        Ok(self.rbuf.split_to(len).freeze())
    }

    // =========================================================================
    // Writing
    // =========================================================================

    pub fn write_line(&mut self, line: &str) {
        tracing::trace!(target: PROTO_TARGET, "C: {}", line);
        self.wbuf.extend_from_slice(line.as_bytes());
        self.wbuf.extend_from_slice(b"\n");
        self.stats.payload_written += line.len() as u64 + 1;
    }

    pub fn write_raw(&mut self, data: &[u8]) {
        tracing::trace!(target: PROTO_TARGET, "C: <{} bytes>", data.len());
        self.wbuf.extend_from_slice(data);
        self.stats.payload_written += data.len() as u64;
    }

    /// Send everything queued so far.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.wbuf.is_empty() {
            let pending = self.wbuf.split();
            let out = match self.deflater.as_mut() {
                Some(deflater) => {
                    let mut out = BytesMut::with_capacity(pending.len() / 2 + 64);
                    deflater
                        .sync(&pending, &mut out)
                        .map_err(CvsError::ProtocolIo)?;
                    out
                }
                None => pending,
            };
            self.write_wire(&out).await?;
        }
        self.writer.flush().await.map_err(CvsError::ProtocolIo)
    }

    async fn write_wire(&mut self, data: &[u8]) -> Result<()> {
        self.writer
            .write_all(data)
            .await
            .map_err(CvsError::ProtocolIo)?;
        self.stats.wire_written += data.len() as u64;
        Ok(())
    }

    /// Switch both directions to zlib. Anything already queued goes out
    /// uncompressed first.
    pub async fn enable_compression(&mut self, level: u32) -> Result<()> {
        self.flush().await?;
        self.deflater = Some(Deflater::new(level));
        self.inflater = Some(Inflater::new());
        tracing::debug!("Enabled stream compression at level {}", level);
        Ok(())
    }

    /// Finish compression, close the write side and drain what the peer
    /// still sends.
    pub async fn shutdown(&mut self) -> Result<StreamStats> {
        self.flush().await?;
        if let Some(mut deflater) = self.deflater.take() {
            let mut trailer = BytesMut::new();
            deflater
                .finish(&mut trailer)
                .map_err(CvsError::ProtocolIo)?;
            self.write_wire(&trailer).await?;
            self.writer.flush().await.map_err(CvsError::ProtocolIo)?;
            tracing::debug!(
                "Deflate: {} bytes in, {} bytes out",
                deflater.total_in(),
                deflater.total_out()
            );
        }
        self.writer
            .shutdown()
            .await
            .map_err(CvsError::ProtocolIo)?;

        loop {
            match self.fill().await {
                Ok(true) => {
                    let leftover = self.rbuf.split();
                    if !leftover.is_empty() {
                        tracing::debug!("Discarding {} bytes after shutdown", leftover.len());
                    }
                }
                Ok(false) => break,
                Err(e) => {
                    tracing::debug!("Ignoring read error while draining: {}", e);
                    break;
                }
            }
        }

        let stats = self.stats;
        tracing::debug!(
            "Stream closed: {} bytes read ({} on wire), {} bytes written ({} on wire)",
            stats.payload_read,
            stats.wire_read,
            stats.payload_written,
            stats.wire_written
        );
        Ok(stats)
    }
}

/// Decode server text without losing bytes: UTF-8 when valid, otherwise
/// Latin-1, which maps every byte to its own char.
pub fn decode_text(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => raw.iter().map(|b| char::from(*b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn pair() -> (CvsStream, tokio::io::DuplexStream) {
        let (client, server) = duplex(64 * 1024);
        let (r, w) = tokio::io::split(client);
        (CvsStream::from_io(r, w), server)
    }

    #[tokio::test]
    async fn test_read_lines_and_body() {
        let (mut stream, mut server) = pair();
        server
            .write_all(b"M hello\nCreated foo/\n5\nabcdeok\ntail")
            .await
            .unwrap();
        drop(server);

        assert_eq!(stream.read_line().await.unwrap(), "M hello");
        assert_eq!(stream.read_line().await.unwrap(), "Created foo/");
        assert_eq!(stream.read_line().await.unwrap(), "5");
        assert_eq!(&stream.read_exact(5).await.unwrap()[..], b"abcde");
        assert_eq!(stream.read_line().await.unwrap(), "ok");
        assert_eq!(stream.read_line().await.unwrap(), "tail");
        assert!(matches!(
            stream.read_line().await,
            Err(CvsError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_latin1_lines_keep_their_bytes() {
        let (mut stream, mut server) = pair();
        server.write_all(b"M caf\xe9\nM caf\xe8\nM caf\xc3\xa9\n").await.unwrap();
        drop(server);

        assert_eq!(&stream.read_line_bytes().await.unwrap()[..], b"M caf\xe9");
        let second = stream.read_line().await.unwrap();
        assert_eq!(second, "M caf\u{e8}");
        assert_eq!(stream.read_line().await.unwrap(), "M caf\u{e9}");
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text(b"plain"), "plain");
        assert_eq!(decode_text("Müller".as_bytes()), "Müller");
        assert_eq!(decode_text(b"M\xfcller"), "Müller");
        assert_ne!(decode_text(b"caf\xe9"), decode_text(b"caf\xe8"));
    }

    #[tokio::test]
    async fn test_read_exact_truncated() {
        let (mut stream, mut server) = pair();
        server.write_all(b"abc").await.unwrap();
        drop(server);

        match stream.read_exact(10).await {
            Err(CvsError::Truncated { read, expected }) => {
                assert_eq!(read, 3);
                assert_eq!(expected, 10);
            }
            other => panic!("Expected Truncated, got {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_writes_are_buffered_until_flush() {
        let (mut stream, mut server) = pair();
        stream.write_line("Root /cvsroot");
        stream.write_raw(b"xyz");
        assert_eq!(stream.stats().wire_written, 0);

        stream.flush().await.unwrap();
        let mut buf = vec![0u8; 17];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"Root /cvsroot\nxyz");
        assert_eq!(stream.stats().wire_written, 17);
        assert_eq!(stream.stats().payload_written, 17);
    }

    #[tokio::test]
    async fn test_compressed_round_trip() {
        let (mut stream, server) = pair();
        let (mut server_rx, mut server_tx) = tokio::io::split(server);

        stream.write_line("Gzip-stream 1");
        stream.enable_compression(1).await.unwrap();
        stream.write_line("valid-requests");
        stream.flush().await.unwrap();

        // Server side: plain request line, then a zlib stream
        let mut plain = vec![0u8; 14];
        server_rx.read_exact(&mut plain).await.unwrap();
        assert_eq!(&plain, b"Gzip-stream 1\n");

        let mut wire = vec![0u8; 4096];
        let n = server_rx.read(&mut wire).await.unwrap();
        let mut inflater = Inflater::new();
        let mut decoded = BytesMut::new();
        inflater.decompress(&wire[..n], &mut decoded).unwrap();
        assert_eq!(&decoded[..], b"valid-requests\n");

        let mut deflater = Deflater::new(1);
        let mut reply = BytesMut::new();
        deflater.sync(b"Valid-requests co\nok\n", &mut reply).unwrap();
        server_tx.write_all(&reply).await.unwrap();

        assert_eq!(stream.read_line().await.unwrap(), "Valid-requests co");
        assert_eq!(stream.read_line().await.unwrap(), "ok");
        assert!(stream.stats().wire_read > 0);
        assert!(stream.is_compressed());
    }
}
