//! Byte-stream framing
//!
//! Accumulates raw bytes from an instrument channel and emits complete
//! frames whenever the device's terminator sequence is seen. Instruments in
//! this system end every response with a short fixed terminator (`CR LF`,
//! `~ CR`, ...) rather than carrying a length prefix.

/// Accumulates incoming bytes and detects terminator-delimited frames.
///
/// Partial writes from the transport simply accumulate across `feed` calls;
/// a frame is never split. The accumulator has no length or timeout
/// safeguard of its own; a response that never terminates grows the buffer
/// until the caller resets it.
#[derive(Debug)]
pub struct FrameAccumulator {
    buffer: Vec<u8>,
    terminator: &'static [u8],
}

impl FrameAccumulator {
    /// Create an accumulator for the given terminator sequence.
    pub fn new(terminator: &'static [u8]) -> Self {
        debug_assert!(!terminator.is_empty());
        Self {
            buffer: Vec::with_capacity(256),
            terminator,
        }
    }

    /// Append incoming bytes, returning every frame completed by them.
    ///
    /// Each returned frame includes its terminator. Multiple frames may
    /// complete in a single call when the transport delivers a burst.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &b in bytes {
            self.buffer.push(b);
            if self.buffer.ends_with(self.terminator) {
                frames.push(std::mem::take(&mut self.buffer));
            }
        }
        frames
    }

    /// Number of bytes currently buffered (incomplete frame).
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any partially accumulated frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// The terminator this accumulator frames on.
    pub fn terminator(&self) -> &'static [u8] {
        self.terminator
    }
}
