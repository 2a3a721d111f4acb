//! Resource byte stream
//!
//! A cursor over one resource's bytes, backed by an engine stream handle.
//!
//! # Cursor model
//!
//! The engine cursor moves forward (`read`, `skip`) and can be sent back to
//! exactly two places: the last mark or the start of the resource. There is
//! no absolute positioning, so [`ResourceStream::seek`] is `reset(false)`
//! followed by `skip(position)` and costs time proportional to the target
//! offset on every call. Callers that jump around a large resource should
//! prefer [`ResourceStream::read_range`] on a ranged stream.
//!
//! Streams over filtered content may refuse `skip`, `mark` and `reset`;
//! those calls return [`BridgeError::Native`] with an unsupported error.
//!
//! # Lifecycle
//!
//! [`ResourceStream::close`] releases the engine stream. It is idempotent;
//! a second close is logged and ignored. Every accessor used after close
//! returns an empty value without reaching the engine. Dropping an
//! unclosed stream releases it as a last resort.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::error::Result;
use crate::handle::{HandleKind, OwnedHandle};
use crate::native::{NativeHandle, NativeModule};

/// Cursor over one resource's bytes
#[derive(Debug)]
pub struct ResourceStream {
    handle: OwnedHandle,
    relative_path: String,
    /// Length reported by the engine when the stream was opened
    length: u64,
    position: u64,
    mark: u64,
    max_read_all: usize,
}

impl ResourceStream {
    /// Wrap a freshly opened engine stream
    ///
    /// Probes the declared length once, with the cursor at the start.
    pub(crate) fn open(
        native: Arc<dyn NativeModule>,
        handle: NativeHandle,
        relative_path: impl Into<String>,
        max_read_all: usize,
    ) -> Self {
        let length = native.available(handle);
        let relative_path = relative_path.into();
        tracing::debug!(
            "Opened stream [ptr:{}] for {} ({} bytes)",
            handle,
            relative_path,
            length
        );
        Self {
            handle: OwnedHandle::new(native, handle, HandleKind::Stream),
            relative_path,
            length,
            position: 0,
            mark: 0,
            max_read_all,
        }
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Declared length of the resource
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current cursor position
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_released()
    }

    /// Live engine handle, logging misuse when the stream is closed
    fn live(&self, op: &str) -> Option<NativeHandle> {
        let handle = self.handle.get();
        if handle.is_none() {
            tracing::error!(
                "{} on closed stream [ptr:{}] for {}",
                op,
                self.handle.raw(),
                self.relative_path
            );
        }
        handle
    }

    fn remaining(&self) -> u64 {
        self.length.saturating_sub(self.position)
    }

    /// Bytes left between the cursor and the end of the resource
    pub fn available(&self) -> u64 {
        match self.live("available") {
            Some(h) => self.handle.native().available(h),
            None => 0,
        }
    }

    /// Read up to `length` bytes; empty at end of stream
    pub fn read(&mut self, length: usize) -> Vec<u8> {
        let Some(h) = self.live("read") else {
            return Vec::new();
        };
        let want = (length as u64).min(self.remaining()) as usize;
        if want == 0 {
            return Vec::new();
        }
        let bytes = self.handle.native().read_bytes(h, want);
        self.position += bytes.len() as u64;
        bytes
    }

    /// Read into `buf`, returning the number of bytes copied (0 at end)
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let bytes = self.read(buf.len());
        buf[..bytes.len()].copy_from_slice(&bytes);
        bytes.len()
    }

    /// Everything from the cursor to the end, capped at the configured
    /// whole-read limit
    pub fn read_all(&mut self) -> Vec<u8> {
        let Some(h) = self.live("read_all") else {
            return Vec::new();
        };
        let bytes = self.handle.native().read_all(h, self.max_read_all);
        self.position += bytes.len() as u64;
        bytes
    }

    /// Read `min(length, len - offset)` bytes starting at `offset`
    ///
    /// Short results only happen at the end of the resource. A request
    /// that starts at or past the end yields an empty result.
    pub fn read_range(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let Some(h) = self.live("read_range") else {
            return Ok(Vec::new());
        };
        let take = (length as u64).min(self.length.saturating_sub(offset)) as usize;
        if take == 0 {
            return Ok(Vec::new());
        }
        let bytes = self.handle.native().read_range(h, offset, take)?;
        self.position = offset + bytes.len() as u64;
        Ok(bytes)
    }

    /// Advance the cursor by up to `count` bytes, forward only
    ///
    /// Returns the number of bytes actually skipped.
    pub fn skip(&mut self, count: u64) -> Result<u64> {
        let Some(h) = self.live("skip") else {
            return Ok(0);
        };
        let count = count.min(self.remaining());
        if count == 0 {
            return Ok(0);
        }
        self.handle.native().skip(h, count)?;
        self.position += count;
        Ok(count)
    }

    /// Record the current position as the mark
    ///
    /// The engine cursor has no buffering limit, so no read limit applies.
    pub fn mark(&mut self) -> Result<()> {
        let Some(h) = self.live("mark") else {
            return Ok(());
        };
        self.handle.native().mark(h)?;
        self.mark = self.position;
        Ok(())
    }

    /// Move the cursor back to the mark, or to the start when `to_mark` is
    /// false
    pub fn reset(&mut self, to_mark: bool) -> Result<()> {
        let Some(h) = self.live("reset") else {
            return Ok(());
        };
        self.handle.native().reset(h, to_mark)?;
        self.position = if to_mark { self.mark } else { 0 };
        Ok(())
    }

    /// Position the cursor at `position` by rewinding to the start and
    /// skipping forward
    ///
    /// O(position) on every call: the engine walks the resource again from
    /// the beginning. Returns the resulting position, which is clamped to
    /// the declared length.
    pub fn seek(&mut self, position: u64) -> Result<u64> {
        if self.live("seek").is_none() {
            return Ok(0);
        }
        self.reset(false)?;
        self.skip(position)
    }

    /// Release the engine stream. Returns `true` if this call released it.
    pub fn close(&self) -> bool {
        let released = self.handle.release();
        if released {
            tracing::debug!(
                "Closed stream [ptr:{}] for {}",
                self.handle.raw(),
                self.relative_path
            );
        }
        released
    }
}

impl Read for ResourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf))
    }
}

impl Seek for ResourceStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;

        if target >= self.position {
            let step = target - self.position;
            self.skip(step)?;
        } else {
            ResourceStream::seek(self, target)?;
        }
        Ok(self.position)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}
