//! Audio writer: bounded queue -> blocking device writes
//!
//! Each write runs on the blocking pool. If the writer task is aborted while
//! a write is in flight, that write still runs to completion on the pool.

use std::sync::Arc;

use super::output::AudioSink;
use super::queue::AudioQueueConsumer;

/// Drain `consumer` into `sink` until every producer is gone.
///
/// With no sink (device failed to open) chunks are drained and discarded.
/// Returns the number of chunks written successfully.
pub async fn run_audio_writer(
    mut consumer: AudioQueueConsumer,
    sink: Option<Arc<dyn AudioSink>>,
) -> u64 {
    let mut written = 0u64;
    match &sink {
        Some(sink) => log::info!("Audio writer started on '{}'", sink.name()),
        None => log::info!("Audio writer started without an output device, discarding audio"),
    }

    while let Some(chunk) = consumer.dequeue().await {
        let Some(sink) = sink.clone() else {
            continue;
        };

        match tokio::task::spawn_blocking(move || sink.write(chunk)).await {
            Ok(Ok(())) => written += 1,
            Ok(Err(e)) => log::warn!("Audio write failed: {}", e),
            Err(e) => log::error!("Audio write task failed: {}", e),
        }
    }

    log::info!("Audio writer stopped after {} chunk(s)", written);
    written
}
