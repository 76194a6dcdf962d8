//! Single-slot, versioned frame handoff between the UI engine's render
//! thread (producer) and the compositor thread (consumer).
//!
//! Latest wins: intermediate publishes between two consumes are dropped.
//! The lock is held only while copying bytes and metadata in or out; format
//! conversion and GPU upload happen on the consumer's own snapshot.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// Pixel payload plus metadata. `version` starts at 0 (nothing published)
/// and strictly increases on every publish.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    pub pixels: Vec<u8>,
    pub row_bytes: usize,
    pub width: usize,
    pub height: usize,
    pub version: u64,
}

impl FrameSlot {
    fn copy_from(&mut self, other: &FrameSlot) {
        // Reuses the destination allocation across frames.
        self.pixels.clear();
        self.pixels.extend_from_slice(&other.pixels);
        self.row_bytes = other.row_bytes;
        self.width = other.width;
        self.height = other.height;
        self.version = other.version;
    }
}

/// Shared handoff slot. Share it behind an `Arc` between exactly one
/// producer and one consumer.
#[derive(Debug, Default)]
pub struct FrameHandoff {
    slot: Mutex<FrameSlot>,
    first_frame: Condvar,
}

impl FrameHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FrameSlot> {
        // The slot is plain bytes and counters; a panicking holder cannot
        // leave it logically inconsistent beyond a torn frame.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy a bitmap into the slot and bump the version.
    ///
    /// Returns the new version, or `None` if the bitmap description is
    /// inconsistent (empty, or `pixels` shorter than `row_bytes * height`).
    pub fn publish(&self, pixels: &[u8], row_bytes: usize, width: usize, height: usize) -> Option<u64> {
        let frame_bytes = row_bytes.checked_mul(height)?;
        if width == 0 || height == 0 || row_bytes < width * 4 || pixels.len() < frame_bytes {
            return None;
        }

        let version = {
            let mut slot = self.lock();
            slot.pixels.clear();
            slot.pixels.extend_from_slice(&pixels[..frame_bytes]);
            slot.row_bytes = row_bytes;
            slot.width = width;
            slot.height = height;
            slot.version += 1;
            slot.version
        };

        if version == 1 {
            debug!("Frame handoff: first frame published ({}x{})", width, height);
        }
        self.first_frame.notify_all();
        trace!("Frame handoff: published version {}", version);
        Some(version)
    }

    /// Latest published version (0 if nothing was published yet).
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Copy the slot into `out` if it holds a version other than `seen`.
    pub fn snapshot_into(&self, seen: u64, out: &mut FrameSlot) -> bool {
        let slot = self.lock();
        if slot.version == 0 || slot.version == seen {
            return false;
        }
        out.copy_from(&slot);
        true
    }

    /// Block until the first frame is published or `timeout` elapses.
    ///
    /// Returns the `(width, height, version)` of the frame on success and
    /// `None` on timeout.
    pub fn wait_for_first_frame(&self, timeout: Duration) -> Option<(usize, usize, u64)> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        while slot.version == 0 {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = match self.first_frame.wait_timeout(slot, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        Some((slot.width, slot.height, slot.version))
    }
}

/// Consumer-side bookkeeping: remembers the last version that was
/// successfully uploaded and owns a reusable snapshot buffer.
#[derive(Debug, Default)]
pub struct FrameConsumer {
    uploaded_version: u64,
    snapshot: FrameSlot,
}

impl FrameConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the latest frame unless it was already uploaded.
    pub fn consume(&mut self, handoff: &FrameHandoff) -> Option<&FrameSlot> {
        if handoff.snapshot_into(self.uploaded_version, &mut self.snapshot) {
            Some(&self.snapshot)
        } else {
            None
        }
    }

    /// Record a successful upload. Versions never go backward.
    pub fn mark_uploaded(&mut self, version: u64) {
        if version > self.uploaded_version {
            self.uploaded_version = version;
        }
    }

    pub fn uploaded_version(&self) -> u64 {
        self.uploaded_version
    }
}
