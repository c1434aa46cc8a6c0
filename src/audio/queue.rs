//! Bounded audio queue between the audio pump and the audio writer
//!
//! A single-producer, single-consumer FIFO of fixed capacity. Enqueue never
//! blocks: when the queue is full the new chunk is dropped, which is the only
//! backpressure the relay applies to incoming audio.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::types::AudioChunk;

/// Default number of chunks held between pump and writer.
/// At 20ms per Opus frame this is ~400ms of audio.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Drops are reported on the first one and then every this many
const DROP_LOG_INTERVAL: u64 = 100;

#[derive(Debug)]
struct QueueStats {
    capacity: usize,
    dropped: AtomicU64,
}

/// Create a bounded audio queue with the given capacity (at least 1)
pub fn bounded(capacity: usize) -> (AudioQueueProducer, AudioQueueConsumer) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let stats = Arc::new(QueueStats {
        capacity,
        dropped: AtomicU64::new(0),
    });

    (
        AudioQueueProducer {
            tx,
            stats: stats.clone(),
        },
        AudioQueueConsumer { rx, stats },
    )
}

/// Enqueue side, owned by the audio pump
#[derive(Debug, Clone)]
pub struct AudioQueueProducer {
    tx: mpsc::Sender<AudioChunk>,
    stats: Arc<QueueStats>,
}

impl AudioQueueProducer {
    /// Offer a chunk without blocking.
    ///
    /// Returns `false` when the chunk was dropped because the queue is full
    /// or the consumer is gone. Dropping is not an error.
    pub fn enqueue(&self, chunk: AudioChunk) -> bool {
        match self.tx.try_send(chunk) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % DROP_LOG_INTERVAL == 0 {
                    log::warn!(
                        "Audio queue full ({} chunks), {} chunk(s) dropped so far",
                        self.stats.capacity,
                        dropped
                    );
                }
                false
            }
        }
    }

    /// Chunks currently held
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.stats.capacity
    }

    /// Total chunks dropped since creation
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

/// Dequeue side, owned by the audio writer
#[derive(Debug)]
pub struct AudioQueueConsumer {
    rx: mpsc::Receiver<AudioChunk>,
    stats: Arc<QueueStats>,
}

impl AudioQueueConsumer {
    /// Wait for the next chunk.
    ///
    /// There is no timeout: this suspends until a chunk arrives, and only
    /// returns `None` once every producer has been dropped.
    pub async fn dequeue(&mut self) -> Option<AudioChunk> {
        self.rx.recv().await
    }

    /// Take a chunk if one is ready
    pub fn try_dequeue(&mut self) -> Option<AudioChunk> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.stats.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunk(tag: i16) -> AudioChunk {
        AudioChunk {
            channels: 1,
            samples: vec![tag; 4],
        }
    }

    #[test]
    fn test_enqueue_until_full() {
        let (producer, _consumer) = bounded(DEFAULT_QUEUE_CAPACITY);
        for i in 0..20 {
            assert!(producer.enqueue(chunk(i)));
        }
        assert_eq!(producer.len(), 20);
        assert!(!producer.enqueue(chunk(99)));
        assert_eq!(producer.len(), 20);
        assert_eq!(producer.dropped(), 1);
    }

    #[tokio::test]
    async fn test_dequeue_frees_space() {
        let (producer, mut consumer) = bounded(2);
        assert!(producer.enqueue(chunk(1)));
        assert!(producer.enqueue(chunk(2)));
        assert!(!producer.enqueue(chunk(3)));

        assert_eq!(consumer.dequeue().await, Some(chunk(1)));
        assert!(producer.enqueue(chunk(4)));
        assert_eq!(consumer.dequeue().await, Some(chunk(2)));
        assert_eq!(consumer.dequeue().await, Some(chunk(4)));
        assert!(consumer.is_empty());
    }

    #[tokio::test]
    async fn test_dequeue_ends_when_producer_dropped() {
        let (producer, mut consumer) = bounded(4);
        producer.enqueue(chunk(7));
        drop(producer);
        assert_eq!(consumer.dequeue().await, Some(chunk(7)));
        assert_eq!(consumer.dequeue().await, None);
    }

    #[test]
    fn test_enqueue_after_consumer_dropped_is_silent() {
        let (producer, consumer) = bounded(4);
        drop(consumer);
        assert!(!producer.enqueue(chunk(1)));
        assert_eq!(producer.dropped(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (producer, _consumer) = bounded(0);
        assert_eq!(producer.capacity(), 1);
        assert!(producer.enqueue(chunk(1)));
        assert!(!producer.enqueue(chunk(2)));
    }

    proptest! {
        /// Length never exceeds capacity; once full, enqueue leaves length unchanged
        #[test]
        fn length_never_exceeds_capacity(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let (producer, mut consumer) = bounded(DEFAULT_QUEUE_CAPACITY);
            let mut tag = 0i16;
            for enqueue in ops {
                if enqueue {
                    let before = producer.len();
                    let accepted = producer.enqueue(chunk(tag));
                    tag = tag.wrapping_add(1);
                    if before == DEFAULT_QUEUE_CAPACITY {
                        prop_assert!(!accepted);
                        prop_assert_eq!(producer.len(), before);
                    }
                } else {
                    let _ = consumer.try_dequeue();
                }
                prop_assert!(producer.len() <= DEFAULT_QUEUE_CAPACITY);
            }
        }

        /// Dequeue order is enqueue order restricted to accepted chunks
        #[test]
        fn order_is_preserved_minus_drops(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let (producer, mut consumer) = bounded(DEFAULT_QUEUE_CAPACITY);
            let mut accepted = Vec::new();
            let mut observed = Vec::new();
            let mut tag = 0i16;
            for enqueue in ops {
                if enqueue {
                    if producer.enqueue(chunk(tag)) {
                        accepted.push(tag);
                    }
                    tag = tag.wrapping_add(1);
                } else if let Some(c) = consumer.try_dequeue() {
                    observed.push(c.samples[0]);
                }
            }
            while let Some(c) = consumer.try_dequeue() {
                observed.push(c.samples[0]);
            }
            prop_assert_eq!(observed, accepted);
        }
    }
}
