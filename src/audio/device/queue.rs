//! Push-then-pull stream queue
//!
//! Some device APIs do not hand the callback the device buffer directly.
//! Instead the application pushes audio into a stream object and the API
//! pulls from that stream at its own pace. [`QueuedStream`] models that:
//! on each pull it tops the queue up from the [`DeviceDrain`] in whole
//! frames, then copies the requested amount out of the queue.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::audio::consumer::DeviceDrain;

pub struct QueuedStream {
    drain: DeviceDrain,
    /// Side the drain pushes into
    input: HeapProd<f32>,
    /// Side the device pulls from
    output: HeapCons<f32>,
    /// Preallocated staging area, as large as the queue
    scratch: Vec<f32>,
}

impl QueuedStream {
    /// Create a stream queue holding at most `capacity_samples` samples
    ///
    /// The capacity is rounded down to whole frames, and is at least one frame.
    pub fn new(drain: DeviceDrain, capacity_samples: usize) -> Self {
        let channels = drain.channels();
        let capacity = (capacity_samples / channels).max(1) * channels;
        let (input, output) = HeapRb::<f32>::new(capacity).split();
        Self {
            drain,
            input,
            output,
            scratch: vec![0.0; capacity],
        }
    }

    /// Samples currently queued for the device
    pub fn queued(&self) -> usize {
        self.output.occupied_len()
    }

    /// Fill `data` for the device, drawing more audio from the ring as needed
    ///
    /// Requests larger than the queue are served in several refills.
    pub fn pull(&mut self, data: &mut [f32]) {
        let mut filled = 0;

        while filled < data.len() {
            let remaining = data.len() - filled;
            let queued = self.output.occupied_len();
            if queued < remaining {
                self.refill(remaining - queued);
            }

            let pulled = self.output.pop_slice(&mut data[filled..]);
            if pulled == 0 {
                break;
            }
            filled += pulled;
        }

        data[filled..].fill(0.0);
    }

    /// Push at least `missing` samples, rounded up to whole frames and
    /// limited by the free space in the queue
    fn refill(&mut self, missing: usize) {
        let channels = self.drain.channels();
        let room = self.input.vacant_len().min(self.scratch.len());
        let wanted = missing.div_ceil(channels) * channels;
        let chunk = wanted.min(room) / channels * channels;
        if chunk == 0 {
            return;
        }

        let staged = &mut self.scratch[..chunk];
        self.drain.drain(staged);
        self.input.push_slice(staged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::producer::{AudioBlock, GainRamp, MixProducer};
    use crate::audio::ring::FrameRing;

    fn stream_with_sequence(frames: usize, queue_samples: usize) -> (MixProducer, QueuedStream) {
        let (producer, consumer) = FrameRing::new(2, frames, frames).unwrap().split();
        producer.set_running(true);
        let mut producer = MixProducer::new(producer);

        let left: Vec<f32> = (1..=frames).map(|i| i as f32).collect();
        let right: Vec<f32> = left.iter().map(|v| v * 10.0).collect();
        let planar: [&[f32]; 2] = [&left, &right];
        producer.consume(&AudioBlock::new(&planar), GainRamp::UNITY);

        let stream = QueuedStream::new(DeviceDrain::new(consumer), queue_samples);
        (producer, stream)
    }

    #[test]
    fn test_pull_preserves_sequence_across_sizes() {
        let (producer, mut stream) = stream_with_sequence(256, 128);

        let mut received = Vec::new();
        for size in [70usize, 130, 2, 98, 200, 12] {
            let mut data = vec![0.0; size];
            stream.pull(&mut data);
            received.extend_from_slice(&data);
        }

        assert_eq!(received.len(), 512);
        for (i, frame) in received.chunks(2).enumerate() {
            assert_eq!(frame[0], (i + 1) as f32);
            assert_eq!(frame[1], (i + 1) as f32 * 10.0);
        }
        assert!(!producer.ring().is_starved());
    }

    #[test]
    fn test_pull_keeps_queue_in_whole_frames() {
        let (_producer, mut stream) = stream_with_sequence(256, 64);
        let mut data = vec![0.0; 3];
        stream.pull(&mut data);
        assert_eq!(data, vec![1.0, 10.0, 2.0]);
        assert_eq!(stream.queued(), 1);
    }

    #[test]
    fn test_pull_underrun_is_silent_and_flagged() {
        let (producer, mut stream) = stream_with_sequence(4, 64);

        let mut data = vec![1.0; 16];
        stream.pull(&mut data);
        assert_eq!(&data[..8], &[1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0]);
        assert!(data[8..].iter().all(|&s| s == 0.0));
        assert!(producer.ring().is_starved());
    }

    #[test]
    fn test_refill_covers_only_the_request() {
        let (producer, mut stream) = stream_with_sequence(256, 128);
        let mut data = vec![0.0; 4];
        stream.pull(&mut data);
        assert_eq!(data, vec![1.0, 10.0, 2.0, 20.0]);
        assert_eq!(stream.queued(), 0);
        assert_eq!(producer.ring().ready_frames(), 254);
    }

    #[test]
    fn test_request_larger_than_queue() {
        let (_producer, mut stream) = stream_with_sequence(256, 8);
        let mut data = vec![-1.0; 12];
        stream.pull(&mut data);
        assert_eq!(
            data,
            vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0, 5.0, 50.0, 6.0, 60.0]
        );
        assert_eq!(stream.queued(), 0);
    }
}
