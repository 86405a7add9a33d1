//! Bounded sample queue between track writes and the device callback.
//!
//! Writers push interleaved `f32` samples (blocking or not); the output
//! callback drains it without ever blocking. Capacity equals the endpoint's
//! platform buffer, so a blocking write waits exactly as long as the
//! platform would.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Thread-safe bounded queue for interleaved `f32` audio samples.
///
/// A `closed` flag lives under the same mutex as the samples so that writers
/// blocked on a full queue are reliably woken on release.
pub struct SampleQueue {
    channels: usize,
    inner: Mutex<QueueInner>,
    cv: Condvar,
    capacity: usize,
    flush_generation: AtomicU64,
    low_watermark_ms: AtomicU64,
}

struct QueueInner {
    samples: VecDeque<f32>,
    closed: bool,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples (not frames).
    pub fn new(channels: usize, capacity: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(QueueInner {
                samples: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            cv: Condvar::new(),
            capacity: capacity.max(channels),
            flush_generation: AtomicU64::new(0),
            low_watermark_ms: AtomicU64::new(0),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Buffered samples (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further pushes and wake every blocked writer. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.cv.notify_all();
    }

    /// Drop every buffered sample and start a new flush generation.
    pub fn clear(&self) {
        let mut g = self.lock();
        g.samples.clear();
        self.flush_generation.fetch_add(1, Ordering::AcqRel);
        drop(g);
        self.cv.notify_all();
    }

    /// Bumped by every [`SampleQueue::clear`]. Consumers holding samples
    /// popped earlier must discard them once this changes.
    pub fn generation(&self) -> u64 {
        self.flush_generation.load(Ordering::Acquire)
    }

    /// Push all of `samples`, waiting for space as needed.
    ///
    /// Returns the number of samples queued, which is short only if the queue
    /// was closed while waiting.
    pub fn push_blocking(&self, samples: &[f32]) -> usize {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.samples.len() >= self.capacity && !g.closed {
                g = match self.cv.wait(g) {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            if g.closed {
                break;
            }
            offset += self.fill(&mut g, &samples[offset..]);
            drop(g);
            self.cv.notify_all();
        }
        offset
    }

    /// Push as much of `samples` as currently fits. Never waits.
    pub fn push_available(&self, samples: &[f32]) -> usize {
        let mut g = self.lock();
        if g.closed {
            return 0;
        }
        let pushed = self.fill(&mut g, samples);
        drop(g);
        if pushed > 0 {
            self.cv.notify_all();
        }
        pushed
    }

    /// Pop up to `max_frames` whole frames, or `None` when no full frame is buffered.
    pub fn pop_frames(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let take_frames = (g.samples.len() / self.channels).min(max_frames);
        let take = take_frames * self.channels;
        if take == 0 {
            return None;
        }
        let out: Vec<f32> = g.samples.drain(..take).collect();
        let remaining = g.samples.len();
        drop(g);
        self.cv.notify_all();
        self.log_low_watermark(remaining);
        Some(out)
    }

    fn fill(&self, g: &mut QueueInner, samples: &[f32]) -> usize {
        let room = self.capacity.saturating_sub(g.samples.len());
        let n = room.min(samples.len());
        g.samples.extend(&samples[..n]);
        n
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn log_low_watermark(&self, queued: usize) {
        let threshold = (self.capacity / 8).max(self.channels * 16);
        if queued > 0 && queued < threshold {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_else(|_| Duration::from_millis(0))
                .as_millis() as u64;
            let last = self.low_watermark_ms.load(Ordering::Relaxed);
            if now.saturating_sub(last) > 1000 {
                self.low_watermark_ms.store(now, Ordering::Relaxed);
                tracing::debug!(
                    queued_samples = queued,
                    threshold_samples = threshold,
                    "track buffer low watermark"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pop_on_empty_queue_returns_none() {
        let q = SampleQueue::new(2, 16);
        assert!(q.pop_frames(4).is_none());
    }

    #[test]
    fn pop_returns_whole_frames_only() {
        let q = SampleQueue::new(2, 64);
        assert_eq!(q.push_available(&[1.0, 2.0, 3.0, 4.0, 5.0]), 5);

        let out = q.pop_frames(8).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(q.len(), 1);
        assert!(q.pop_frames(8).is_none());
    }

    #[test]
    fn push_available_stops_at_capacity() {
        let q = SampleQueue::new(2, 6);
        assert_eq!(q.push_available(&[0.5; 10]), 6);
        assert_eq!(q.push_available(&[0.5; 2]), 0);
        q.pop_frames(1);
        assert_eq!(q.push_available(&[0.5; 2]), 2);
    }

    #[test]
    fn push_blocking_waits_for_consumer() {
        let q = Arc::new(SampleQueue::new(2, 4));
        let consumer = q.clone();

        let handle = thread::spawn(move || {
            let mut drained = 0;
            while drained < 12 {
                if let Some(v) = consumer.pop_frames(1) {
                    drained += v.len();
                } else {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            drained
        });

        assert_eq!(q.push_blocking(&[0.25; 12]), 12);
        assert_eq!(handle.join().unwrap(), 12);
    }

    #[test]
    fn close_releases_blocked_writer() {
        let q = Arc::new(SampleQueue::new(1, 2));
        let closer = q.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });

        assert_eq!(q.push_blocking(&[0.0; 5]), 2);
        handle.join().unwrap();
        assert_eq!(q.push_available(&[0.0]), 0);
        assert!(q.pop_frames(4).is_some());
    }

    #[test]
    fn clear_discards_buffered_samples() {
        let q = SampleQueue::new(1, 8);
        q.push_available(&[1.0; 8]);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.push_available(&[1.0; 8]), 8);
    }

    #[test]
    fn clear_starts_a_new_generation() {
        let q = SampleQueue::new(2, 8);
        let before = q.generation();
        q.push_available(&[0.5; 4]);
        q.pop_frames(1);
        assert_eq!(q.generation(), before);
        q.clear();
        assert_eq!(q.generation(), before + 1);
    }
}
