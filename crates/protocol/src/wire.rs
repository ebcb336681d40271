//! Little-endian primitive codec and byte-counting stream wrappers.
//!
//! The rsync wire format uses fixed-size little-endian integers for protocol
//! versions below 30. The only wrinkle is the `i64` encoding: values that fit
//! in a non-negative `i32` are sent as four bytes, anything else is sent as
//! the `-1` sentinel followed by the full eight bytes.
//!
//! [`CountingReader`] and [`CountingWriter`] wrap the connection halves and
//! tally every byte moved; the counters feed the three-integer statistics
//! block exchanged at the end of a transfer.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Extension trait decoding wire primitives from any [`Read`] implementor.
pub trait WireRead: Read {
    /// Reads a single byte.
    fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a little-endian `i32`.
    fn read_i32(&mut self) -> io::Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Reads an `i64` in the short-or-long wire encoding.
    ///
    /// A leading value other than `-1` is the number itself; the `-1`
    /// sentinel announces a full eight-byte little-endian integer.
    fn read_i64(&mut self) -> io::Result<i64> {
        let head = self.read_i32()?;
        if head != -1 {
            return Ok(i64::from(head));
        }
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Reads exactly `len` bytes into a fresh buffer.
    fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read + ?Sized> WireRead for R {}

/// Extension trait encoding wire primitives onto any [`Write`] implementor.
pub trait WireWrite: Write {
    /// Writes a single byte.
    fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.write_all(&[value])
    }

    /// Writes a little-endian `i32`.
    fn write_i32(&mut self, value: i32) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes an `i64`, using the four-byte short form when the value fits
    /// in `0..=i32::MAX` and the `-1`-prefixed eight-byte form otherwise.
    fn write_i64(&mut self, value: i64) -> io::Result<()> {
        if (0..=i64::from(i32::MAX)).contains(&value) {
            return self.write_i32(value as i32);
        }
        self.write_i32(-1)?;
        self.write_all(&value.to_le_bytes())
    }
}

impl<W: Write + ?Sized> WireWrite for W {}

/// Cloneable handle onto a transferred-bytes tally.
///
/// The counter is shared between the stream wrapper that increments it and
/// whichever task assembles the final [`TransferStats`](crate::TransferStats).
#[derive(Clone, Debug, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    /// Returns the number of bytes counted so far.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
}

/// [`Read`] adapter counting every byte handed out.
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    counter: ByteCounter,
}

impl<R> CountingReader<R> {
    /// Wraps `inner` with a fresh counter.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            counter: ByteCounter::default(),
        }
    }

    /// Returns a handle onto this reader's byte counter.
    #[must_use]
    pub fn counter(&self) -> ByteCounter {
        self.counter.clone()
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

/// [`Write`] adapter counting every byte accepted.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    counter: ByteCounter,
}

impl<W> CountingWriter<W> {
    /// Wraps `inner` with a fresh counter.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            counter: ByteCounter::default(),
        }
    }

    /// Returns a handle onto this writer's byte counter.
    #[must_use]
    pub fn counter(&self) -> ByteCounter {
        self.counter.clone()
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use proptest::prelude::*;

    #[test]
    fn i64_short_form_boundaries() {
        let mut buf = Vec::new();
        buf.write_i64(0).unwrap();
        assert_eq!(buf.len(), 4);

        buf.clear();
        buf.write_i64(i64::from(i32::MAX)).unwrap();
        assert_eq!(buf.len(), 4);

        buf.clear();
        buf.write_i64(i64::from(i32::MAX) + 1).unwrap();
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[..4], &(-1i32).to_le_bytes());

        buf.clear();
        buf.write_i64(-1).unwrap();
        assert_eq!(buf.len(), 12);
    }

    #[test]
    fn counting_wrappers_tally_bytes() {
        let mut wr = CountingWriter::new(Vec::new());
        let written = wr.counter();
        wr.write_i32(7).unwrap();
        wr.write_all(b"abc").unwrap();
        assert_eq!(written.get(), 7);

        let mut rd = CountingReader::new(Cursor::new(vec![0u8; 16]));
        let read = rd.counter();
        rd.read_i32().unwrap();
        rd.read_bytes(5).unwrap();
        assert_eq!(read.get(), 9);
    }

    proptest! {
        #[test]
        fn i32_round_trip(value in any::<i32>()) {
            let mut buf = Vec::new();
            buf.write_i32(value).unwrap();
            prop_assert_eq!(buf.len(), 4);
            let decoded = Cursor::new(buf).read_i32().unwrap();
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn i64_round_trip(value in any::<i64>()) {
            let mut buf = Vec::new();
            buf.write_i64(value).unwrap();
            let short = (0..=i64::from(i32::MAX)).contains(&value);
            prop_assert_eq!(buf.len(), if short { 4 } else { 12 });
            let decoded = Cursor::new(buf).read_i64().unwrap();
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn bytes_round_trip(data in prop::collection::vec(any::<u8>(), 0..256)) {
            let decoded = Cursor::new(data.clone()).read_bytes(data.len()).unwrap();
            prop_assert_eq!(decoded, data);
        }
    }
}
