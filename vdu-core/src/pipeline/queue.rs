//! Bounded frame queue and render scheduler.
//!
//! Latency is prioritized over completeness: under backpressure the
//! queue sheds everything but the newest picture, and a render pass
//! always draws the most recent successfully decoded frame.

use std::collections::VecDeque;

use super::{DecodedPicture, MAX_RENDER_QUEUE, Surface};

// ── FrameQueue ───────────────────────────────────────────────────

/// Bounded buffer of decoded pictures awaiting a draw.
///
/// Dropped pictures are disposed immediately (their buffers are
/// released on drop), which matters for the GPU tier where output
/// slots are scarce.
pub struct FrameQueue {
    entries: VecDeque<DecodedPicture>,
    bound: usize,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::with_bound(MAX_RENDER_QUEUE)
    }

    pub fn with_bound(bound: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(bound + 1),
            bound: bound.max(1),
        }
    }

    /// Appends a picture. If the queue would exceed its bound, every
    /// entry except the one just pushed is dropped.
    pub fn push(&mut self, picture: DecodedPicture) {
        self.entries.push_back(picture);
        if self.entries.len() > self.bound {
            self.drain_to_newest();
        }
    }

    /// Drops all but the most recent entry.
    pub fn drain_to_newest(&mut self) {
        while self.entries.len() > 1 {
            self.entries.pop_front();
        }
    }

    pub fn pop(&mut self) -> Option<DecodedPicture> {
        self.entries.pop_front()
    }

    /// Disposes every buffered picture.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the consumer has fallen behind the producer. The queue
    /// sheds on push and can never grow past its bound, so a full
    /// queue is the backlog signal.
    pub fn backlogged(&self) -> bool {
        self.entries.len() >= self.bound
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── RenderScheduler ──────────────────────────────────────────────

/// Schedules at most one render pass per pending batch of pictures.
pub struct RenderScheduler {
    scheduled: bool,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self { scheduled: false }
    }

    /// Requests a render pass. Returns `false` when one is already
    /// pending.
    pub fn request(&mut self) -> bool {
        if self.scheduled {
            return false;
        }
        self.scheduled = true;
        true
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Runs one render pass: discards everything but the newest
    /// picture, draws it, and reschedules if more arrived meanwhile.
    ///
    /// Returns `true` when another pass was scheduled.
    pub fn render_pass<S: Surface + ?Sized>(
        &mut self,
        queue: &mut FrameQueue,
        surface: &mut S,
    ) -> bool {
        self.scheduled = false;
        if queue.is_empty() {
            return false;
        }

        queue.drain_to_newest();
        if let Some(picture) = queue.pop() {
            surface.draw(picture);
        }

        if !queue.is_empty() {
            self.request();
            return true;
        }
        false
    }
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new()
    }
}
