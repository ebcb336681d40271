//! Tagged-frame multiplexing on the server-to-client direction.
//!
//! Once the daemon has written the checksum seed it switches its side of the
//! connection to multiplexed mode. Every chunk it writes from then on is
//! framed as a four-byte little-endian header `tag << 24 | len` followed by
//! `len` payload bytes. File data travels under [`MessageTag::Data`];
//! diagnostics travel under the error/info/log tags and are surfaced out of
//! band on the client. The client-to-server direction is never multiplexed.

use std::io::{self, Read, Write};

use crate::wire::WireRead;

/// Maximum payload carried by a single multiplexed frame (24-bit length).
pub const MAX_FRAME_PAYLOAD: usize = 0x00FF_FFFF;

/// Frame tags used by protocol 27.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum MessageTag {
    /// Fatal transfer error reported by the peer.
    ErrorXfer = 1,
    /// Informational message for the remote user.
    Info = 2,
    /// Error message for the remote user.
    Error = 3,
    /// Warning message for the remote user.
    Warning = 4,
    /// Message destined for the daemon log only.
    Log = 5,
    /// Raw transfer data.
    Data = 7,
}

impl MessageTag {
    /// Returns the tag's on-the-wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a tag from its on-the-wire value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ErrorXfer),
            2 => Some(Self::Info),
            3 => Some(Self::Error),
            4 => Some(Self::Warning),
            5 => Some(Self::Log),
            7 => Some(Self::Data),
            _ => None,
        }
    }

    /// Returns `true` for the tags that abort a transfer when received.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::ErrorXfer | Self::Error)
    }
}

fn encode_header(tag: MessageTag, len: usize) -> io::Result<[u8; 4]> {
    if len > MAX_FRAME_PAYLOAD {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("multiplexed payload of {len} bytes exceeds the 24-bit frame limit"),
        ));
    }
    let header = (u32::from(tag.as_u8()) << 24) | (len as u32);
    Ok(header.to_le_bytes())
}

/// Writer that frames everything passing through it as multiplexed data.
///
/// Plain [`Write`] calls become [`MessageTag::Data`] frames; [`send`]
/// transmits a frame with an explicit tag, which is how errors reach the
/// peer once multiplexing is active.
///
/// [`send`]: MuxWriter::send
#[derive(Debug)]
pub struct MuxWriter<W> {
    inner: W,
}

impl<W: Write> MuxWriter<W> {
    /// Starts multiplexing on `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Sends a single frame with the given tag.
    ///
    /// # Errors
    ///
    /// Fails when the payload exceeds [`MAX_FRAME_PAYLOAD`] or the underlying
    /// writer errors.
    pub fn send(&mut self, tag: MessageTag, payload: &[u8]) -> io::Result<()> {
        let header = encode_header(tag, payload.len())?;
        self.inner.write_all(&header)?;
        self.inner.write_all(payload)?;
        self.inner.flush()
    }
}

impl<W: Write> Write for MuxWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk = &buf[..buf.len().min(MAX_FRAME_PAYLOAD)];
        let header = encode_header(MessageTag::Data, chunk.len())?;
        self.inner.write_all(&header)?;
        self.inner.write_all(chunk)?;
        Ok(chunk.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that strips multiplexed framing, yielding the data stream.
///
/// Non-data frames are handled inline: info, warning and log frames are
/// forwarded to the logging layer, while error frames terminate the read
/// with an [`io::Error`] carrying the peer's message. Byte order inside the
/// data tag is preserved exactly.
#[derive(Debug)]
pub struct DemuxReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: Read> DemuxReader<R> {
    /// Starts demultiplexing on `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Refills the internal buffer from the next data frame.
    ///
    /// Returns `false` on a clean end of stream at a frame boundary.
    fn fill(&mut self) -> io::Result<bool> {
        loop {
            let mut header = [0u8; 4];
            match self.inner.read(&mut header[..1])? {
                0 => return Ok(false),
                _ => self.inner.read_exact(&mut header[1..])?,
            }
            let header = u32::from_le_bytes(header);
            let tag = (header >> 24) as u8;
            let len = (header & MAX_FRAME_PAYLOAD as u32) as usize;

            let Some(tag) = MessageTag::from_u8(tag) else {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown multiplexed frame tag {tag}"),
                ));
            };

            match tag {
                MessageTag::Data => {
                    if len == 0 {
                        continue;
                    }
                    self.buf.resize(len, 0);
                    self.inner.read_exact(&mut self.buf)?;
                    self.pos = 0;
                    return Ok(true);
                }
                MessageTag::Info | MessageTag::Log => {
                    let msg = self.inner.read_bytes(len)?;
                    tracing::info!(target: "rsync_protocol::mux", "{}", text(&msg));
                }
                MessageTag::Warning => {
                    let msg = self.inner.read_bytes(len)?;
                    tracing::warn!(target: "rsync_protocol::mux", "{}", text(&msg));
                }
                MessageTag::Error | MessageTag::ErrorXfer => {
                    let msg = self.inner.read_bytes(len)?;
                    return Err(io::Error::other(format!("remote error: {}", text(&msg))));
                }
            }
        }
    }
}

fn text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).trim_end().to_owned()
}

impl<R: Read> Read for DemuxReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.pos == self.buf.len() && !self.fill()? {
            return Ok(0);
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn data_frames_round_trip() {
        let mut wire = Vec::new();
        {
            let mut mux = MuxWriter::new(&mut wire);
            mux.write_all(b"hello ").unwrap();
            mux.write_all(b"world").unwrap();
        }

        let mut demux = DemuxReader::new(Cursor::new(wire));
        let mut out = String::new();
        demux.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn header_layout_matches_protocol() {
        let mut wire = Vec::new();
        MuxWriter::new(&mut wire).write_all(b"abc").unwrap();
        // tag 7 in the top byte, 24-bit length below.
        assert_eq!(&wire[..4], &[3, 0, 0, 7]);
        assert_eq!(&wire[4..], b"abc");
    }

    #[test]
    fn error_frame_aborts_the_stream() {
        let mut wire = Vec::new();
        {
            let mut mux = MuxWriter::new(&mut wire);
            mux.write_all(b"partial").unwrap();
            mux.send(MessageTag::Error, b"boom\n").unwrap();
        }

        let mut demux = DemuxReader::new(Cursor::new(wire));
        let mut buf = [0u8; 7];
        demux.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"partial");

        let err = demux.read(&mut buf).unwrap_err();
        assert!(err.to_string().contains("boom"), "got: {err}");
    }

    #[test]
    fn info_frames_are_transparent() {
        let mut wire = Vec::new();
        {
            let mut mux = MuxWriter::new(&mut wire);
            mux.send(MessageTag::Info, b"status line\n").unwrap();
            mux.write_all(b"data").unwrap();
        }

        let mut demux = DemuxReader::new(Cursor::new(wire));
        let mut out = Vec::new();
        demux.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"data");
    }

    #[test]
    fn clean_eof_at_frame_boundary() {
        let mut wire = Vec::new();
        MuxWriter::new(&mut wire).write_all(b"xy").unwrap();

        let mut demux = DemuxReader::new(Cursor::new(wire));
        let mut out = Vec::new();
        demux.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"xy");
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let header = encode_header(MessageTag::Data, MAX_FRAME_PAYLOAD + 1);
        assert!(header.is_err());
    }
}
