//! Frame ring shared between the mixing thread and the device callback
//!
//! This module provides a fixed-capacity circular store of interleaved
//! `f32` frames and splits it into a producer half and a consumer half.
//!
//! ## Design Notes
//!
//! The only value both threads read and write is the ready-frame counter.
//! Each half owns its own cursor, so cursors are plain `usize` fields and
//! never cross threads. At any instant the producer owns the vacant frames
//! and the consumer owns the ready frames; the counter decides where the
//! boundary lies.
//!
//! Ordering: the producer writes samples, then adds to the counter with
//! release semantics. The consumer loads the counter with acquire semantics
//! before reading, and subtracts with release semantics once it has copied
//! the frames out, so the producer never overwrites frames still being read.
//!
//! The counter is unsigned. Only the consumer subtracts, and it never
//! subtracts more than it has just observed, so it cannot go below zero.
//! The producer refuses writes larger than the vacant space, so it cannot
//! exceed capacity.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::error::{SinkError, SinkResult};

/// State shared by both halves of a ring
struct Shared {
    /// Interleaved samples, `channels * capacity` long
    samples: Box<[UnsafeCell<f32>]>,
    channels: usize,
    /// Capacity in frames
    capacity: usize,
    /// Mixing quantum in frames
    quantum: usize,
    /// Frames written by the producer and not yet drained
    ready: AtomicUsize,
    /// Playback active; gates draining and the producer wake
    running: AtomicBool,
    /// Sticky underrun flag, raised by the consumer, cleared by the host
    starved: AtomicBool,
}

// SAFETY: sample storage is only reached through `frames`/`frames_mut`,
// whose callers hold disjoint frame ranges as decided by `ready`.
unsafe impl Sync for Shared {}

impl Shared {
    /// Borrow `len` frames starting at `frame` for reading.
    ///
    /// # Safety
    /// The range must be owned by the caller's side of the ring.
    unsafe fn frames(&self, frame: usize, len: usize) -> &[f32] {
        debug_assert!(frame + len <= self.capacity);
        let start = frame * self.channels;
        let ptr = UnsafeCell::raw_get(self.samples.as_ptr().add(start));
        std::slice::from_raw_parts(ptr, len * self.channels)
    }

    /// Borrow `len` frames starting at `frame` for writing.
    ///
    /// # Safety
    /// The range must be owned by the caller's side of the ring and no
    /// other borrow of it may be live.
    #[allow(clippy::mut_from_ref)]
    unsafe fn frames_mut(&self, frame: usize, len: usize) -> &mut [f32] {
        debug_assert!(frame + len <= self.capacity);
        let start = frame * self.channels;
        let ptr = UnsafeCell::raw_get(self.samples.as_ptr().add(start));
        std::slice::from_raw_parts_mut(ptr, len * self.channels)
    }

    fn headroom_quanta(&self) -> usize {
        let ready = self.ready.load(Ordering::Acquire);
        (self.capacity - ready.min(self.capacity)) / self.quantum
    }
}

/// A fixed-capacity ring of interleaved frames
///
/// Create one per device session, then call [`FrameRing::split`] to hand
/// the producer half to the mixing thread and the consumer half to the
/// device callback.
///
/// ## Example
///
/// ```
/// use ringsink::audio::FrameRing;
///
/// let ring = FrameRing::new(2, 1024, 256).unwrap();
/// let (producer, consumer) = ring.split();
/// assert_eq!(producer.headroom_quanta(), 4);
/// assert_eq!(consumer.ready_frames(), 0);
/// ```
pub struct FrameRing {
    shared: Arc<Shared>,
}

impl FrameRing {
    /// Allocate a silent, empty ring
    ///
    /// # Arguments
    /// * `channels` - Interleaved channel count
    /// * `capacity_frames` - Capacity in frames; must be a positive multiple of `quantum_frames`
    /// * `quantum_frames` - Frame count the mixer produces per tick
    ///
    /// # Panics
    /// If `channels` or `quantum_frames` is zero, or `capacity_frames` is
    /// not a positive multiple of `quantum_frames`.
    pub fn new(channels: usize, capacity_frames: usize, quantum_frames: usize) -> SinkResult<Self> {
        assert!(channels > 0, "ring needs at least one channel");
        assert!(quantum_frames > 0, "quantum must be positive");
        assert!(
            capacity_frames > 0 && capacity_frames % quantum_frames == 0,
            "capacity {} is not a positive multiple of quantum {}",
            capacity_frames,
            quantum_frames
        );

        let alloc_error = || SinkError::Allocation {
            frames: capacity_frames,
            channels,
        };
        let len = capacity_frames.checked_mul(channels).ok_or_else(alloc_error)?;

        let mut samples: Vec<UnsafeCell<f32>> = Vec::new();
        samples.try_reserve_exact(len).map_err(|_| alloc_error())?;
        samples.resize_with(len, || UnsafeCell::new(0.0));

        Ok(Self {
            shared: Arc::new(Shared {
                samples: samples.into_boxed_slice(),
                channels,
                capacity: capacity_frames,
                quantum: quantum_frames,
                ready: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                starved: AtomicBool::new(false),
            }),
        })
    }

    /// Split into the producer and consumer halves
    pub fn split(self) -> (RingProducer, RingConsumer) {
        let producer = RingProducer {
            shared: Arc::clone(&self.shared),
            write: 0,
        };
        let consumer = RingConsumer {
            shared: self.shared,
            read: 0,
        };
        (producer, consumer)
    }
}

/// Writing half of a [`FrameRing`], owned by the mixing thread
pub struct RingProducer {
    shared: Arc<Shared>,
    /// Write cursor in frames
    write: usize,
}

impl RingProducer {
    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity
    }

    pub fn quantum_frames(&self) -> usize {
        self.shared.quantum
    }

    /// Frames published and not yet drained
    pub fn ready_frames(&self) -> usize {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Frames the producer may write without touching unread data
    pub fn vacant_frames(&self) -> usize {
        self.shared.capacity - self.ready_frames().min(self.shared.capacity)
    }

    /// Whole quanta of headroom: `(capacity - min(capacity, ready)) / quantum`
    pub fn headroom_quanta(&self) -> usize {
        self.shared.headroom_quanta()
    }

    /// Write `frames` frames at the write cursor and publish them
    ///
    /// `fill` receives the destination region and the logical frame offset
    /// of its first frame within this write. It is called twice when the
    /// write crosses the end of the ring.
    ///
    /// Nothing happens for `frames == 0`. Returns `false` without writing
    /// when `frames` exceeds the vacant space.
    pub fn write_with<F>(&mut self, frames: usize, mut fill: F) -> bool
    where
        F: FnMut(&mut [f32], usize),
    {
        if frames == 0 {
            return true;
        }
        if frames > self.vacant_frames() {
            return false;
        }

        let capacity = self.shared.capacity;
        let first = frames.min(capacity - self.write);
        // SAFETY: `frames <= vacant`, so both regions are owned by the producer.
        unsafe {
            fill(self.shared.frames_mut(self.write, first), 0);
            if first < frames {
                fill(self.shared.frames_mut(0, frames - first), first);
            }
        }

        self.publish(frames);
        true
    }

    /// Fill the whole ring with silence and mark every frame ready
    ///
    /// Used once at session start so the device's first pulls are defined.
    /// Returns `false` if any frame is already published.
    pub fn prime_silence(&mut self) -> bool {
        if self.ready_frames() != 0 {
            return false;
        }
        let capacity = self.shared.capacity;
        self.write_with(capacity, |dst, _| dst.fill(0.0))
    }

    fn publish(&mut self, frames: usize) {
        self.shared.ready.fetch_add(frames, Ordering::AcqRel);
        self.write = (self.write + frames) % self.shared.capacity;
    }

    pub fn set_running(&self, running: bool) {
        self.shared.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Whether an underrun occurred since the last [`RingProducer::reset_starved`]
    pub fn is_starved(&self) -> bool {
        self.shared.starved.load(Ordering::Acquire)
    }

    pub fn reset_starved(&self) {
        self.shared.starved.store(false, Ordering::Release);
    }
}

/// Reading half of a [`FrameRing`], owned by the device callback
pub struct RingConsumer {
    shared: Arc<Shared>,
    /// Read cursor in frames
    read: usize,
}

impl RingConsumer {
    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity
    }

    pub fn ready_frames(&self) -> usize {
        self.shared.ready.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Copy up to `dst.len() / channels` ready frames into `dst`
    ///
    /// Copies the longest contiguous run before the end of the ring, so a
    /// wrapping read takes two iterations. Returns the number of frames
    /// copied; samples past them are left untouched.
    pub fn read_into(&mut self, dst: &mut [f32]) -> usize {
        let channels = self.shared.channels;
        let capacity = self.shared.capacity;
        let wanted = dst.len() / channels;
        let mut copied = 0;

        while copied < wanted {
            let ready = self.shared.ready.load(Ordering::Acquire);
            if ready == 0 {
                break;
            }
            let run = ready.min(capacity - self.read).min(wanted - copied);

            // SAFETY: `run <= ready`, so these frames are owned by the consumer.
            let src = unsafe { self.shared.frames(self.read, run) };
            dst[copied * channels..(copied + run) * channels].copy_from_slice(src);

            let before = self.shared.ready.fetch_sub(run, Ordering::AcqRel);
            debug_assert!(before >= run);
            self.read = (self.read + run) % capacity;
            copied += run;
        }

        copied
    }

    pub(crate) fn mark_starved(&self) {
        self.shared.starved.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_values(producer: &mut RingProducer, values: &[f32]) -> bool {
        let channels = producer.channels();
        let frames = values.len() / channels;
        producer.write_with(frames, |dst, offset| {
            let start = offset * channels;
            dst.copy_from_slice(&values[start..start + dst.len()]);
        })
    }

    #[test]
    fn test_new_ring_is_empty() {
        let (producer, consumer) = FrameRing::new(2, 1024, 256).unwrap().split();
        assert_eq!(producer.ready_frames(), 0);
        assert_eq!(producer.vacant_frames(), 1024);
        assert_eq!(producer.headroom_quanta(), 4);
        assert_eq!(consumer.ready_frames(), 0);
        assert!(!producer.is_running());
        assert!(!producer.is_starved());
    }

    #[test]
    #[should_panic]
    fn test_capacity_must_be_multiple_of_quantum() {
        let _ = FrameRing::new(2, 1000, 256);
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_rejected() {
        let _ = FrameRing::new(2, 0, 256);
    }

    #[test]
    fn test_oversized_ring_reports_allocation_error() {
        let capacity = usize::MAX / 2 + 1;
        let result = FrameRing::new(4, capacity, 1);
        assert!(matches!(
            result,
            Err(SinkError::Allocation { frames, channels: 4 }) if frames == capacity
        ));
    }

    #[test]
    fn test_zero_frame_write_is_noop() {
        let (mut producer, _consumer) = FrameRing::new(2, 8, 4).unwrap().split();
        let mut called = false;
        assert!(producer.write_with(0, |_, _| called = true));
        assert!(!called);
        assert_eq!(producer.ready_frames(), 0);
    }

    #[test]
    fn test_write_larger_than_vacant_is_refused() {
        let (mut producer, _consumer) = FrameRing::new(1, 8, 4).unwrap().split();
        assert!(write_values(&mut producer, &[1.0; 8]));
        assert!(!write_values(&mut producer, &[2.0; 4]));
        assert_eq!(producer.ready_frames(), 8);
    }

    #[test]
    fn test_headroom_tracks_ready_frames() {
        let (mut producer, mut consumer) = FrameRing::new(2, 1024, 256).unwrap().split();

        assert!(write_values(&mut producer, &[0.25; 512]));
        assert_eq!(producer.headroom_quanta(), 3);

        assert!(write_values(&mut producer, &[0.25; 1024]));
        assert_eq!(producer.headroom_quanta(), 1);

        let mut out = vec![0.0; 200];
        assert_eq!(consumer.read_into(&mut out), 100);
        // 356 vacant frames is still one whole quantum
        assert_eq!(producer.headroom_quanta(), 1);

        let mut out = vec![0.0; 400];
        assert_eq!(consumer.read_into(&mut out), 200);
        assert_eq!(producer.headroom_quanta(), 2);
    }

    #[test]
    fn test_wraparound_matches_linear_sequence() {
        let (mut producer, mut consumer) = FrameRing::new(2, 8, 2).unwrap().split();
        let sequence: Vec<f32> = (0..24).map(|i| i as f32).collect();

        // Fill six frames, drain four, then write six more across the end.
        assert!(write_values(&mut producer, &sequence[..12]));
        let mut out = vec![0.0; 8];
        assert_eq!(consumer.read_into(&mut out), 4);
        assert_eq!(&out[..], &sequence[..8]);

        assert!(write_values(&mut producer, &sequence[12..24]));
        assert_eq!(producer.ready_frames(), 8);

        let mut out = vec![0.0; 16];
        assert_eq!(consumer.read_into(&mut out), 8);
        assert_eq!(&out[..], &sequence[8..24]);
    }

    #[test]
    fn test_split_write_reports_offsets() {
        let (mut producer, mut consumer) = FrameRing::new(1, 4, 1).unwrap().split();
        assert!(write_values(&mut producer, &[1.0, 2.0, 3.0]));
        let mut out = [0.0; 3];
        consumer.read_into(&mut out);

        let mut offsets = Vec::new();
        assert!(producer.write_with(3, |dst, offset| offsets.push((offset, dst.len()))));
        assert_eq!(offsets, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_prime_fills_with_silence() {
        let (mut producer, mut consumer) = FrameRing::new(2, 8, 4).unwrap().split();
        assert!(producer.prime_silence());
        assert_eq!(producer.ready_frames(), 8);
        assert_eq!(producer.headroom_quanta(), 0);
        assert!(!producer.prime_silence());

        let mut out = vec![1.0; 16];
        assert_eq!(consumer.read_into(&mut out), 8);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_starved_flag_is_sticky_until_reset() {
        let (producer, consumer) = FrameRing::new(1, 4, 4).unwrap().split();
        consumer.mark_starved();
        assert!(producer.is_starved());
        assert!(producer.is_starved());
        producer.reset_starved();
        assert!(!producer.is_starved());
    }
}
