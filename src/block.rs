//! Framed byte channel: raw mode vs block-data mode over `std::io`.
//!
//! Both sides of the codec speak through this layer. In raw mode bytes pass
//! straight through (tags, descriptors, field images). In block-data mode the
//! write side coalesces primitive data into frames of at most
//! [`MAX_BLOCK_SIZE`](crate::wire::MAX_BLOCK_SIZE) bytes, each preceded by a
//! 2-byte header (`BlockData` tag + `u8` length) or a 5-byte header
//! (`BlockDataLong` tag + `i32` length); the read side scans frame headers and
//! buffers one frame at a time. Multi-byte primitives may straddle frames.

use crate::error::{GraphwireError, Result};
use crate::wire::{Tag, MAX_BLOCK_SIZE};
use std::io::{Read, Write};
use tracing::trace;

// --- HOOK-FACING PRIMITIVE TRAITS ---

/// Primitive sink surface handed to custom write hooks (object-safe).
pub(crate) trait PrimSink {
    fn sink_bool(&mut self, v: bool) -> Result<()>;
    fn sink_i8(&mut self, v: i8) -> Result<()>;
    fn sink_u8(&mut self, v: u8) -> Result<()>;
    fn sink_char(&mut self, v: u16) -> Result<()>;
    fn sink_i16(&mut self, v: i16) -> Result<()>;
    fn sink_i32(&mut self, v: i32) -> Result<()>;
    fn sink_i64(&mut self, v: i64) -> Result<()>;
    fn sink_f32(&mut self, v: f32) -> Result<()>;
    fn sink_f64(&mut self, v: f64) -> Result<()>;
    fn sink_bytes(&mut self, b: &[u8]) -> Result<()>;
    fn sink_utf(&mut self, s: &str) -> Result<()>;
}

/// Primitive source surface handed to custom read hooks (object-safe).
pub(crate) trait PrimSource {
    fn source_bool(&mut self) -> Result<bool>;
    fn source_i8(&mut self) -> Result<i8>;
    fn source_u8(&mut self) -> Result<u8>;
    fn source_char(&mut self) -> Result<u16>;
    fn source_i16(&mut self) -> Result<i16>;
    fn source_i32(&mut self) -> Result<i32>;
    fn source_i64(&mut self) -> Result<i64>;
    fn source_f32(&mut self) -> Result<f32>;
    fn source_f64(&mut self) -> Result<f64>;
    fn source_bytes(&mut self, out: &mut [u8]) -> Result<()>;
    fn source_utf(&mut self) -> Result<String>;
}

// --- WRITE SIDE ---

/// Buffered framing writer over an arbitrary `io::Write` sink.
pub(crate) struct BlockDataWriter<W: Write> {
    dest: W,
    buf: Box<[u8; MAX_BLOCK_SIZE]>,
    pos: usize,
    blkmode: bool,
}

impl<W: Write> BlockDataWriter<W> {
    pub(crate) fn new(dest: W) -> Self {
        Self {
            dest,
            buf: Box::new([0u8; MAX_BLOCK_SIZE]),
            pos: 0,
            blkmode: false,
        }
    }

    /// Switches between raw and block-data mode, returning the previous mode.
    /// Any buffered bytes are drained first, so a mode switch is also a frame
    /// boundary.
    pub(crate) fn set_mode(&mut self, mode: bool) -> Result<bool> {
        if mode == self.blkmode {
            return Ok(mode);
        }
        self.drain()?;
        self.blkmode = mode;
        Ok(!mode)
    }

    pub(crate) fn mode(&self) -> bool {
        self.blkmode
    }

    /// Flushes the internal buffer to the sink, preceded by a frame header when
    /// in block-data mode.
    fn drain(&mut self) -> Result<()> {
        if self.pos == 0 {
            return Ok(());
        }
        if self.blkmode {
            self.write_frame_header(self.pos)?;
        }
        self.dest.write_all(&self.buf[..self.pos])?;
        self.pos = 0;
        Ok(())
    }

    fn write_frame_header(&mut self, len: usize) -> Result<()> {
        if len <= u8::MAX as usize {
            self.dest.write_all(&[Tag::BlockData.as_u8(), len as u8])?;
        } else {
            let len = i32::try_from(len)
                .map_err(|_| GraphwireError::Internal(format!("oversized frame: {len} bytes")))?;
            let mut hdr = [0u8; 5];
            hdr[0] = Tag::BlockDataLong.as_u8();
            hdr[1..5].copy_from_slice(&len.to_be_bytes());
            self.dest.write_all(&hdr)?;
        }
        Ok(())
    }

    pub(crate) fn write_u8(&mut self, v: u8) -> Result<()> {
        if self.pos >= MAX_BLOCK_SIZE {
            self.drain()?;
        }
        self.buf[self.pos] = v;
        self.pos += 1;
        Ok(())
    }

    /// Writes bytes through the buffer, splitting across frames as needed.
    pub(crate) fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let mut rest = bytes;
        while !rest.is_empty() {
            if self.pos >= MAX_BLOCK_SIZE {
                self.drain()?;
            }
            let n = rest.len().min(MAX_BLOCK_SIZE - self.pos);
            self.buf[self.pos..self.pos + n].copy_from_slice(&rest[..n]);
            self.pos += n;
            rest = &rest[n..];
        }
        Ok(())
    }

    pub(crate) fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(u8::from(v))
    }

    pub(crate) fn write_i8(&mut self, v: i8) -> Result<()> {
        self.write_u8(v as u8)
    }

    pub(crate) fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    pub(crate) fn write_char(&mut self, v: u16) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    pub(crate) fn write_i16(&mut self, v: i16) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    pub(crate) fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    pub(crate) fn write_i64(&mut self, v: i64) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    pub(crate) fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_raw(&v.to_bits().to_be_bytes())
    }

    pub(crate) fn write_f64(&mut self, v: f64) -> Result<()> {
        self.write_raw(&v.to_bits().to_be_bytes())
    }

    // --- BULK ARRAY CODECS ---

    pub(crate) fn write_bools(&mut self, vs: &[bool]) -> Result<()> {
        for v in vs {
            self.write_bool(*v)?;
        }
        Ok(())
    }

    pub(crate) fn write_i8s(&mut self, vs: &[i8]) -> Result<()> {
        for v in vs {
            self.write_u8(*v as u8)?;
        }
        Ok(())
    }

    pub(crate) fn write_chars(&mut self, vs: &[u16]) -> Result<()> {
        for v in vs {
            self.write_raw(&v.to_be_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn write_i16s(&mut self, vs: &[i16]) -> Result<()> {
        for v in vs {
            self.write_raw(&v.to_be_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn write_i32s(&mut self, vs: &[i32]) -> Result<()> {
        for v in vs {
            self.write_raw(&v.to_be_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn write_i64s(&mut self, vs: &[i64]) -> Result<()> {
        for v in vs {
            self.write_raw(&v.to_be_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn write_f32s(&mut self, vs: &[f32]) -> Result<()> {
        for v in vs {
            self.write_raw(&v.to_bits().to_be_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn write_f64s(&mut self, vs: &[f64]) -> Result<()> {
        for v in vs {
            self.write_raw(&v.to_bits().to_be_bytes())?;
        }
        Ok(())
    }

    // --- STRINGS ---

    /// Short-form string: `u16` encoded length followed by the body. Fails if
    /// the encoding exceeds 65535 bytes; the codec uses the long-string tag for
    /// those.
    pub(crate) fn write_utf(&mut self, s: &str) -> Result<()> {
        let len = utf_len(s);
        if len > u16::MAX as u64 {
            return Err(GraphwireError::Format(format!(
                "string encoding is {len} bytes, over the 65535-byte short-form limit"
            )));
        }
        self.write_u16(len as u16)?;
        self.write_utf_body(s)
    }

    /// Long-form string body with an 8-byte length prefix.
    pub(crate) fn write_long_utf(&mut self, s: &str) -> Result<()> {
        let len = utf_len(s);
        self.write_i64(len as i64)?;
        self.write_utf_body(s)
    }

    fn write_utf_body(&mut self, s: &str) -> Result<()> {
        let mut enc = [0u8; 6];
        for c in s.chars() {
            let n = encode_char(c, &mut enc);
            self.write_raw(&enc[..n])?;
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        self.drain()?;
        self.dest.flush()?;
        Ok(())
    }

    /// Drains any buffered bytes and returns the underlying sink.
    pub(crate) fn into_inner(mut self) -> Result<W> {
        self.drain()?;
        Ok(self.dest)
    }
}

impl<W: Write> PrimSink for BlockDataWriter<W> {
    fn sink_bool(&mut self, v: bool) -> Result<()> {
        self.write_bool(v)
    }
    fn sink_i8(&mut self, v: i8) -> Result<()> {
        self.write_i8(v)
    }
    fn sink_u8(&mut self, v: u8) -> Result<()> {
        self.write_u8(v)
    }
    fn sink_char(&mut self, v: u16) -> Result<()> {
        self.write_char(v)
    }
    fn sink_i16(&mut self, v: i16) -> Result<()> {
        self.write_i16(v)
    }
    fn sink_i32(&mut self, v: i32) -> Result<()> {
        self.write_i32(v)
    }
    fn sink_i64(&mut self, v: i64) -> Result<()> {
        self.write_i64(v)
    }
    fn sink_f32(&mut self, v: f32) -> Result<()> {
        self.write_f32(v)
    }
    fn sink_f64(&mut self, v: f64) -> Result<()> {
        self.write_f64(v)
    }
    fn sink_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.write_raw(b)
    }
    fn sink_utf(&mut self, s: &str) -> Result<()> {
        self.write_utf(s)
    }
}

// --- READ SIDE ---

/// Buffered de-framing reader over an arbitrary `io::Read` source.
///
/// In block-data mode, reads pull from the current frame and scan the next
/// frame header on exhaustion. A non-block tag encountered during the scan ends
/// the block-data run without being consumed; further block-mode reads surface
/// the optional-data signal.
pub(crate) struct BlockDataReader<R: Read> {
    src: R,
    /// Single byte of raw lookahead for tag peeking.
    peeked: Option<u8>,
    buf: Box<[u8; MAX_BLOCK_SIZE]>,
    pos: usize,
    end: usize,
    /// Bytes of the current frame not yet pulled into `buf`.
    unread: usize,
    blkmode: bool,
    /// A non-block tag ended the block-data run (or it was force-ended).
    blocked: bool,
    /// Reset tag absorbed during a frame-header scan, not yet acted on.
    pending_reset: bool,
    /// Whether a reset tag is legal here (codec recursion depth is zero).
    reset_allowed: bool,
}

impl<R: Read> BlockDataReader<R> {
    pub(crate) fn new(src: R) -> Self {
        Self {
            src,
            peeked: None,
            buf: Box::new([0u8; MAX_BLOCK_SIZE]),
            pos: 0,
            end: 0,
            unread: 0,
            blkmode: false,
            blocked: false,
            pending_reset: false,
            reset_allowed: false,
        }
    }

    // --- RAW LAYER ---

    fn raw_u8(&mut self) -> Result<u8> {
        if let Some(b) = self.peeked.take() {
            return Ok(b);
        }
        let mut b = [0u8; 1];
        self.src.read_exact(&mut b)?;
        Ok(b[0])
    }

    /// Peeks one raw byte without consuming it.
    pub(crate) fn peek_raw(&mut self) -> Result<u8> {
        if let Some(b) = self.peeked {
            return Ok(b);
        }
        let mut b = [0u8; 1];
        self.src.read_exact(&mut b)?;
        self.peeked = Some(b[0]);
        Ok(b[0])
    }

    fn raw_fill(&mut self, out: &mut [u8]) -> Result<()> {
        let mut start = 0;
        if !out.is_empty() {
            if let Some(b) = self.peeked.take() {
                out[0] = b;
                start = 1;
            }
        }
        self.src.read_exact(&mut out[start..])?;
        Ok(())
    }

    // --- MODE ---

    /// Switches between raw and block-data mode, returning the previous mode.
    ///
    /// Leaving block-data mode with unconsumed buffered frame bytes is a usage
    /// fault: the caller would silently lose stream position.
    pub(crate) fn set_mode(&mut self, mode: bool) -> Result<bool> {
        if mode == self.blkmode {
            return Ok(mode);
        }
        if mode {
            self.pos = 0;
            self.end = 0;
            self.unread = 0;
        } else if self.pos < self.end || self.unread > 0 {
            return Err(GraphwireError::Usage(
                "unconsumed block data at mode switch".to_string(),
            ));
        }
        self.blocked = false;
        self.blkmode = mode;
        Ok(!mode)
    }

    pub(crate) fn mode(&self) -> bool {
        self.blkmode
    }

    pub(crate) fn set_reset_allowed(&mut self, allowed: bool) {
        self.reset_allowed = allowed;
    }

    /// Takes the pending reset recorded by the frame scanner, if any.
    pub(crate) fn take_pending_reset(&mut self) -> bool {
        std::mem::take(&mut self.pending_reset)
    }

    /// Marks the current block-data run as ended even though no terminating
    /// tag was seen. Used after default field data when the stream level has
    /// no custom section: any further hook read must see end-of-data instead
    /// of misreading the next level's raw bytes as a frame header.
    pub(crate) fn force_end_of_data(&mut self) {
        self.blocked = true;
    }

    // --- FRAME SCANNING ---

    /// Buffers the next chunk of block data. Returns `false` when the run has
    /// ended (a non-block tag is next, left unconsumed).
    fn refill(&mut self) -> Result<bool> {
        loop {
            if self.blocked {
                return Ok(false);
            }
            if self.unread > 0 {
                let n = self.unread.min(MAX_BLOCK_SIZE);
                let mut start = 0;
                if let Some(b) = self.peeked.take() {
                    self.buf[0] = b;
                    start = 1;
                }
                self.src.read_exact(&mut self.buf[start..n])?;
                self.pos = 0;
                self.end = n;
                self.unread -= n;
                return Ok(true);
            }
            let tag = self.peek_raw()?;
            if tag == Tag::BlockData.as_u8() {
                self.raw_u8()?;
                self.unread = self.raw_u8()? as usize;
            } else if tag == Tag::BlockDataLong.as_u8() {
                self.raw_u8()?;
                let mut len = [0u8; 4];
                self.raw_fill(&mut len)?;
                let len = i32::from_be_bytes(len);
                if len < 0 {
                    return Err(GraphwireError::Format(format!(
                        "negative block-data frame length {len}"
                    )));
                }
                self.unread = len as usize;
            } else if tag == Tag::Reset.as_u8() {
                if !self.reset_allowed {
                    return Err(GraphwireError::Format(
                        "reset tag inside nested value data".to_string(),
                    ));
                }
                self.raw_u8()?;
                trace!("reset tag absorbed during frame scan");
                self.pending_reset = true;
            } else {
                self.blocked = true;
                return Ok(false);
            }
            // zero-length frames loop back to the next header
        }
    }

    /// Forces a frame-header scan so `current_block_remaining` reflects the
    /// next frame. Returns whether any block data is available.
    pub(crate) fn peek_block(&mut self) -> Result<bool> {
        if self.pos < self.end {
            return Ok(true);
        }
        self.refill()
    }

    /// Framed bytes currently known to belong to this block-data run.
    pub(crate) fn current_block_remaining(&self) -> usize {
        (self.end - self.pos) + self.unread
    }

    /// Consumes all remaining frames of the current run, stopping (without
    /// consuming) at the first non-block tag.
    pub(crate) fn skip_block_data(&mut self) -> Result<()> {
        loop {
            self.pos = self.end;
            if !self.refill()? {
                return Ok(());
            }
        }
    }

    // --- BLOCK-MODE PRIMITIVES ---

    fn blk_u8(&mut self) -> Result<u8> {
        loop {
            if self.pos < self.end {
                let b = self.buf[self.pos];
                self.pos += 1;
                return Ok(b);
            }
            if !self.refill()? {
                return Err(GraphwireError::OptionalData {
                    length: 0,
                    eof: true,
                });
            }
        }
    }

    fn blk_fill(&mut self, out: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < out.len() {
            if self.pos < self.end {
                let n = (self.end - self.pos).min(out.len() - done);
                out[done..done + n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
                self.pos += n;
                done += n;
            } else if !self.refill()? {
                return Err(GraphwireError::OptionalData {
                    length: 0,
                    eof: true,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        if self.blkmode {
            self.blk_u8()
        } else {
            self.raw_u8()
        }
    }

    pub(crate) fn read_fully(&mut self, out: &mut [u8]) -> Result<()> {
        if self.blkmode {
            self.blk_fill(out)
        } else {
            self.raw_fill(out)
        }
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub(crate) fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_fully(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    pub(crate) fn read_char(&mut self) -> Result<u16> {
        self.read_u16()
    }

    pub(crate) fn read_i16(&mut self) -> Result<i16> {
        let mut b = [0u8; 2];
        self.read_fully(&mut b)?;
        Ok(i16::from_be_bytes(b))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_fully(&mut b)?;
        Ok(i32::from_be_bytes(b))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64> {
        let mut b = [0u8; 8];
        self.read_fully(&mut b)?;
        Ok(i64::from_be_bytes(b))
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32> {
        let mut b = [0u8; 4];
        self.read_fully(&mut b)?;
        Ok(f32::from_bits(u32::from_be_bytes(b)))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64> {
        let mut b = [0u8; 8];
        self.read_fully(&mut b)?;
        Ok(f64::from_bits(u64::from_be_bytes(b)))
    }

    // --- BULK ARRAY CODECS ---

    pub(crate) fn read_bools(&mut self, len: usize) -> Result<Vec<bool>> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_bool()?);
        }
        Ok(out)
    }

    pub(crate) fn read_i8s(&mut self, len: usize) -> Result<Vec<i8>> {
        let mut out = vec![0u8; len];
        self.read_fully(&mut out)?;
        Ok(out.into_iter().map(|b| b as i8).collect())
    }

    pub(crate) fn read_chars(&mut self, len: usize) -> Result<Vec<u16>> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_char()?);
        }
        Ok(out)
    }

    pub(crate) fn read_i16s(&mut self, len: usize) -> Result<Vec<i16>> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_i16()?);
        }
        Ok(out)
    }

    pub(crate) fn read_i32s(&mut self, len: usize) -> Result<Vec<i32>> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_i32()?);
        }
        Ok(out)
    }

    pub(crate) fn read_i64s(&mut self, len: usize) -> Result<Vec<i64>> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_i64()?);
        }
        Ok(out)
    }

    pub(crate) fn read_f32s(&mut self, len: usize) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_f32()?);
        }
        Ok(out)
    }

    pub(crate) fn read_f64s(&mut self, len: usize) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_f64()?);
        }
        Ok(out)
    }

    // --- STRINGS ---

    /// Short-form string: `u16` encoded length followed by the body.
    pub(crate) fn read_utf(&mut self) -> Result<String> {
        let len = self.read_u16()? as u64;
        self.read_utf_body(len)
    }

    /// Decodes a string body of `len` encoded bytes. Consumption is capped at
    /// the declared length even when the body is malformed.
    pub(crate) fn read_utf_body(&mut self, len: u64) -> Result<String> {
        let len = usize::try_from(len)
            .map_err(|_| GraphwireError::Format(format!("string length {len} out of range")))?;
        let mut raw = vec![0u8; len];
        self.read_fully(&mut raw)?;
        decode_utf(&raw)
    }
}

impl<R: Read> PrimSource for BlockDataReader<R> {
    fn source_bool(&mut self) -> Result<bool> {
        self.read_bool()
    }
    fn source_i8(&mut self) -> Result<i8> {
        self.read_i8()
    }
    fn source_u8(&mut self) -> Result<u8> {
        self.read_u8()
    }
    fn source_char(&mut self) -> Result<u16> {
        self.read_char()
    }
    fn source_i16(&mut self) -> Result<i16> {
        self.read_i16()
    }
    fn source_i32(&mut self) -> Result<i32> {
        self.read_i32()
    }
    fn source_i64(&mut self) -> Result<i64> {
        self.read_i64()
    }
    fn source_f32(&mut self) -> Result<f32> {
        self.read_f32()
    }
    fn source_f64(&mut self) -> Result<f64> {
        self.read_f64()
    }
    fn source_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        self.read_fully(out)
    }
    fn source_utf(&mut self) -> Result<String> {
        self.read_utf()
    }
}

// --- UTF CODEC ---

/// Encoded byte length of a string: 1/2/3 bytes per BMP scalar, 6 bytes
/// (two 3-byte surrogate halves) per supplementary scalar.
pub(crate) fn utf_len(s: &str) -> u64 {
    s.chars()
        .map(|c| {
            let cp = c as u32;
            if cp < 0x80 {
                1u64
            } else if cp < 0x800 {
                2
            } else if cp <= 0xFFFF {
                3
            } else {
                6
            }
        })
        .sum()
}

/// Encodes one scalar into `out`, returning the number of bytes used.
/// Supplementary scalars become a surrogate pair of two 3-byte sequences so
/// the wire grammar stays within 1/2/3-byte productions.
fn encode_char(c: char, out: &mut [u8; 6]) -> usize {
    let cp = c as u32;
    if cp < 0x80 {
        out[0] = cp as u8;
        1
    } else if cp < 0x800 {
        out[0] = 0xC0 | (cp >> 6) as u8;
        out[1] = 0x80 | (cp & 0x3F) as u8;
        2
    } else if cp <= 0xFFFF {
        encode_bmp(cp, &mut out[..3]);
        3
    } else {
        let hi = 0xD800 + ((cp - 0x1_0000) >> 10);
        let lo = 0xDC00 + ((cp - 0x1_0000) & 0x3FF);
        encode_bmp(hi, &mut out[..3]);
        encode_bmp(lo, &mut out[3..6]);
        6
    }
}

fn encode_bmp(u: u32, out: &mut [u8]) {
    out[0] = 0xE0 | (u >> 12) as u8;
    out[1] = 0x80 | ((u >> 6) & 0x3F) as u8;
    out[2] = 0x80 | (u & 0x3F) as u8;
}

/// Decodes a string body, rejoining surrogate pairs produced by
/// [`encode_char`]. Malformed input fails with the byte offset consumed so far.
fn decode_utf(raw: &[u8]) -> Result<String> {
    fn cont(raw: &[u8], at: usize, i: usize) -> Result<u32> {
        match raw.get(i) {
            Some(b) if b & 0xC0 == 0x80 => Ok(u32::from(b & 0x3F)),
            _ => Err(malformed(at)),
        }
    }
    fn malformed(at: usize) -> GraphwireError {
        GraphwireError::Format(format!("malformed string encoding at byte offset {at}"))
    }

    let mut out = String::with_capacity(raw.len());
    let mut pending_hi: Option<u32> = None;
    let mut i = 0;
    while i < raw.len() {
        let b0 = u32::from(raw[i]);
        let (cp, n) = match b0 {
            0x00..=0x7F => (b0, 1),
            0xC0..=0xDF => {
                let b1 = cont(raw, i, i + 1)?;
                (((b0 & 0x1F) << 6) | b1, 2)
            }
            0xE0..=0xEF => {
                let b1 = cont(raw, i, i + 1)?;
                let b2 = cont(raw, i, i + 2)?;
                (((b0 & 0x0F) << 12) | (b1 << 6) | b2, 3)
            }
            _ => return Err(malformed(i)),
        };
        if let Some(hi) = pending_hi.take() {
            if (0xDC00..=0xDFFF).contains(&cp) {
                let full = 0x1_0000 + ((hi - 0xD800) << 10) + (cp - 0xDC00);
                out.push(char::from_u32(full).ok_or_else(|| malformed(i))?);
            } else {
                return Err(GraphwireError::Format(format!(
                    "unpaired high surrogate before byte offset {i}"
                )));
            }
        } else if (0xD800..=0xDBFF).contains(&cp) {
            pending_hi = Some(cp);
        } else if (0xDC00..=0xDFFF).contains(&cp) {
            return Err(GraphwireError::Format(format!(
                "unpaired low surrogate at byte offset {i}"
            )));
        } else {
            out.push(char::from_u32(cp).ok_or_else(|| malformed(i))?);
        }
        i += n;
    }
    if pending_hi.is_some() {
        return Err(GraphwireError::Format(
            "string ends inside a surrogate pair".to_string(),
        ));
    }
    Ok(out)
}
