//! Packet framer: raw byte chunks in, whole records out
//!
//! ## Overview
//!
//! The device sample channel is byte-oriented: a single `read()` may return
//! half a record, three records and a partial fourth, or nothing useful at
//! all. The framer owns the reassembly state — a bounded byte arena with a
//! read index — and carries any trailing partial record verbatim across
//! calls.
//!
//! ```text
//! read #1: [tag|payload][tag|pay     → 1 record out, 5 bytes retained
//! read #2:            load][tag|...] → retained + new bytes, decode resumes
//! ```
//!
//! ## Corruption policy
//!
//! An unrecognized tag means the stream is corrupt. The framer drops the
//! *entire* accumulated buffer and reports [`DecodeError::UnknownTag`],
//! rather than sliding one byte at a time looking for the next plausible
//! header: payload bytes routinely look like valid tags, and resyncing onto
//! a false header produces garbage records indefinitely. Dropping to a
//! clean slate bounds the damage to one read cycle.
//!
//! ## API shape
//!
//! Pull-based, like the stream traits elsewhere in this workspace:
//! [`FrameDecoder::next_record`] returns `nb::Result`, with `WouldBlock`
//! meaning "partial record retained, feed me more bytes".

use crate::errors::DecodeError;
use crate::records::{Record, RecordKind, TAG_LEN};

/// Arena capacity in bytes
///
/// Sized for a full batch-FIFO drain in one read: a device queue holding
/// hundreds of records is delivered as a single large chunk when the
/// batch timeout fires.
pub const FRAMER_CAPACITY: usize = 8192;

/// Stateful stream framer and record decoder
pub struct FrameDecoder {
    /// Byte arena; `buf[read..]` is the undecoded remainder
    buf: heapless::Vec<u8, FRAMER_CAPACITY>,
    /// Decode cursor into `buf`
    read: usize,
}

impl FrameDecoder {
    /// Create an empty framer
    pub const fn new() -> Self {
        Self { buf: heapless::Vec::new(), read: 0 }
    }

    /// Append a freshly-read chunk to the arena
    ///
    /// On overflow the accumulated buffer and the chunk are both dropped —
    /// framing alignment is already lost at that point — and
    /// [`DecodeError::Overflow`] is returned.
    pub fn extend(&mut self, chunk: &[u8]) -> Result<(), DecodeError> {
        self.compact();
        if self.buf.extend_from_slice(chunk).is_err() {
            let dropped = self.buf.len() + chunk.len();
            self.reset();
            log_warn!("framer arena overflow, dropping {} bytes", dropped);
            return Err(DecodeError::Overflow { dropped });
        }
        Ok(())
    }

    /// Decode the next complete record from the arena
    ///
    /// - `Ok(record)`: a record was decoded and consumed
    /// - `Err(WouldBlock)`: fewer bytes than one record; remainder retained
    /// - `Err(Other(UnknownTag))`: corrupt stream; buffer dropped
    pub fn next_record(&mut self) -> nb::Result<Record, DecodeError> {
        let pending = &self.buf[self.read..];
        if pending.len() < TAG_LEN {
            return Err(nb::Error::WouldBlock);
        }

        let tag = u16::from_le_bytes([pending[0], pending[1]]);
        let kind = match RecordKind::from_tag(tag) {
            Some(kind) => kind,
            None => {
                log_warn!("unknown record tag {:#06x}, dropping {} bytes", tag, pending.len());
                self.reset();
                return Err(nb::Error::Other(DecodeError::UnknownTag { tag }));
            }
        };

        let size = kind.size();
        if pending.len() < size {
            return Err(nb::Error::WouldBlock);
        }

        let record = Record::decode(kind, &pending[..size]);
        self.read += size;
        Ok(record)
    }

    /// Number of buffered, undecoded bytes
    pub fn pending(&self) -> usize {
        self.buf.len() - self.read
    }

    /// Drop all framing state
    pub fn reset(&mut self) {
        self.buf.clear();
        self.read = 0;
    }

    /// Move the undecoded remainder to the front of the arena
    fn compact(&mut self) {
        if self.read == 0 {
            return;
        }
        let len = self.buf.len();
        self.buf.copy_within(self.read..len, 0);
        self.buf.truncate(len - self.read);
        self.read = 0;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
