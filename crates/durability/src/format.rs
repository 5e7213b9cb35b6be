//! Log frame format
//!
//! Every record is stored as one frame:
//!
//! ```text
//! +--------+--------+--------------+------------+-----------------+
//! | 0x5E   | 0x0F   | length (u32) | sum (u16)  | payload         |
//! | magic  | magic  | big-endian   | big-endian | `length` bytes  |
//! +--------+--------+--------------+------------+-----------------+
//! ```
//!
//! The checksum is the low 16 bits of the sum of the absolute values of the
//! payload bytes read as signed 8-bit integers.
//!
//! # Reading
//!
//! [`FrameReader`] scans a byte stream for frames. In strict mode any damaged
//! frame is an error. In best-effort mode the reader slides forward one byte
//! at a time until it finds a frame that validates again. A frame cut off by
//! end-of-stream is a torn write and ends the scan in both modes, but only
//! when no valid frame follows it. A length that overruns the stream while
//! intact frames remain behind it is damage, not a torn write.

use byteorder::{BigEndian, ByteOrder};
use spool_core::{Error, Result};
use std::io::{ErrorKind, Read};

/// Frame magic
pub const MAGIC: [u8; 2] = [0x5E, 0x0F];

/// Bytes before the payload: magic, length, checksum
pub const HEADER_LEN: usize = 8;

const READ_CHUNK: usize = 64 * 1024;

/// How damaged frames are handled while reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Damage is an error
    Strict,
    /// Damage is skipped
    BestEffort,
}

/// Frame checksum
#[inline]
pub fn checksum(payload: &[u8]) -> u16 {
    payload
        .iter()
        .fold(0u16, |sum, b| sum.wrapping_add(u16::from((*b as i8).unsigned_abs())))
}

/// Frame a payload
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::InvalidInput(format!("payload of {} bytes", payload.len())))?;
    let mut frame = vec![0u8; HEADER_LEN + payload.len()];
    frame[..2].copy_from_slice(&MAGIC);
    BigEndian::write_u32(&mut frame[2..6], len);
    BigEndian::write_u16(&mut frame[6..8], checksum(payload));
    frame[HEADER_LEN..].copy_from_slice(payload);
    Ok(frame)
}

/// Counters collected while scanning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Frames that validated
    pub frames: u64,
    /// Damaged regions skipped in best-effort mode
    pub damaged: u64,
    /// Bytes skipped in best-effort mode
    pub skipped_bytes: u64,
    /// Scan ended at a frame cut off by end-of-stream
    pub torn_tail: bool,
}

/// Sequential frame scanner
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
    /// Stream offset of `buf[0]`
    base: u64,
    eof: bool,
    finished: bool,
    resyncing: bool,
    valid_end: u64,
    max_record_size: usize,
    stats: ScanStats,
}

enum Check {
    Valid(usize),
    Damaged(String),
    Torn,
}

impl<R: Read> FrameReader<R> {
    /// Create a reader rejecting payloads above `max_record_size`
    pub fn new(inner: R, max_record_size: usize) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            pos: 0,
            base: 0,
            eof: false,
            finished: false,
            resyncing: false,
            valid_end: 0,
            max_record_size,
            stats: ScanStats::default(),
        }
    }

    /// Next valid payload, or `None` at end of stream
    pub fn next_frame(&mut self, mode: ReadMode) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.check()? {
                Check::Valid(len) => {
                    let start = self.pos + HEADER_LEN;
                    let payload = self.buf[start..start + len].to_vec();
                    self.pos = start + len;
                    self.valid_end = self.offset();
                    self.resyncing = false;
                    self.stats.frames += 1;
                    return Ok(Some(payload));
                }
                Check::Torn => {
                    let remaining = self.buf.len() - self.pos;
                    if remaining > 0 {
                        self.stats.torn_tail = true;
                        tracing::warn!(
                            offset = self.offset(),
                            bytes = remaining,
                            "log ends in a torn frame"
                        );
                    }
                    self.finished = true;
                    return Ok(None);
                }
                Check::Damaged(reason) => {
                    let offset = self.offset();
                    if mode == ReadMode::Strict {
                        return Err(Error::Corruption(format!("{} at offset {}", reason, offset)));
                    }
                    if !self.resyncing {
                        self.resyncing = true;
                        self.stats.damaged += 1;
                        tracing::warn!(offset, %reason, "skipping damaged log frame");
                    }
                    self.pos += 1;
                    self.stats.skipped_bytes += 1;
                }
            }
        }
    }

    /// Stream offset of the next unread byte
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Stream offset just past the last valid frame
    pub fn valid_end(&self) -> u64 {
        self.valid_end
    }

    /// Whether the scan reached the end of the stream
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Scan counters
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    fn check(&mut self) -> Result<Check> {
        if !self.fill(HEADER_LEN)? {
            return Ok(Check::Torn);
        }
        let header = &self.buf[self.pos..self.pos + HEADER_LEN];
        if header[..2] != MAGIC {
            return Ok(Check::Damaged("bad frame magic".to_string()));
        }
        let len = BigEndian::read_u32(&header[2..6]) as usize;
        let expected = BigEndian::read_u16(&header[6..8]);
        if len > self.max_record_size {
            return Ok(Check::Damaged(format!(
                "frame length {} exceeds limit {}",
                len, self.max_record_size
            )));
        }
        if !self.fill(HEADER_LEN + len)? {
            if self.valid_frame_follows() {
                return Ok(Check::Damaged(format!(
                    "frame length {} runs past the end of the log",
                    len
                )));
            }
            return Ok(Check::Torn);
        }
        let start = self.pos + HEADER_LEN;
        let actual = checksum(&self.buf[start..start + len]);
        if actual != expected {
            return Ok(Check::Damaged(format!(
                "checksum mismatch (stored {:#06x}, computed {:#06x})",
                expected, actual
            )));
        }
        Ok(Check::Valid(len))
    }

    /// Whether an intact frame starts anywhere after `pos`
    ///
    /// Only called once the stream is exhausted, so `buf` holds every
    /// remaining byte.
    fn valid_frame_follows(&self) -> bool {
        let rest = &self.buf[self.pos..];
        (1..rest.len().saturating_sub(HEADER_LEN - 1)).any(|at| {
            let header = &rest[at..at + HEADER_LEN];
            if header[..2] != MAGIC {
                return false;
            }
            let len = BigEndian::read_u32(&header[2..6]) as usize;
            let start = at + HEADER_LEN;
            len <= self.max_record_size
                && len <= rest.len() - start
                && checksum(&rest[start..start + len]) == BigEndian::read_u16(&header[6..8])
        })
    }

    /// Make `n` bytes available from `pos`; false when the stream ends first
    fn fill(&mut self, n: usize) -> Result<bool> {
        if self.buf.len() - self.pos >= n {
            return Ok(true);
        }
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.base += self.pos as u64;
            self.pos = 0;
        }
        while self.buf.len() < n && !self.eof {
            let start = self.buf.len();
            self.buf.resize(start + READ_CHUNK.max(n - start), 0);
            match self.inner.read(&mut self.buf[start..]) {
                Ok(0) => {
                    self.buf.truncate(start);
                    self.eof = true;
                }
                Ok(read) => self.buf.truncate(start + read),
                Err(e) if e.kind() == ErrorKind::Interrupted => self.buf.truncate(start),
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e.into());
                }
            }
        }
        Ok(self.buf.len() >= n)
    }
}
