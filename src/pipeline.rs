//! Capture, classify and correlate stages
//!
//! Three tasks joined by bounded channels. Each stage forwards exactly one
//! [`Envelope::EndOfStream`] before it exits, so shutdown drains from the
//! front: on end of input, on cancellation, or when a source fails. Full
//! channels block the upstream stage, which throttles the packet source.

use crate::classifier::{ApplicationMessage, Classifier};
use crate::config::PipelinesConfig;
use crate::engine::LegEngine;
use crate::error::{SpycraftError, SpycraftResult};
use crate::packet::DecodedPacket;
use crate::source::PacketSource;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Queue element: data or the end marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<T> {
    Data(T),
    EndOfStream,
}

/// Queue capacities for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub packet_queue: usize,
    pub message_queue: usize,
}

impl PipelineConfig {
    /// Pick the packet queue size by source kind
    pub fn from_config(pipelines: &PipelinesConfig, live: bool) -> Self {
        Self {
            packet_queue: if live { pipelines.capture } else { pipelines.scan },
            message_queue: pipelines.message,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&PipelinesConfig::default(), false)
    }
}

/// What a finished run hands back
#[derive(Debug)]
pub struct PipelineOutput {
    pub engine: LegEngine,
    pub packets: u64,
    pub messages: u64,
}

/// Run the pipeline until the source is exhausted or `cancel` fires
///
/// A source error stops the capture, lets the later stages drain, and is
/// then returned.
pub async fn run<S>(
    source: S,
    classifier: Classifier,
    engine: LegEngine,
    config: PipelineConfig,
    cancel: CancellationToken,
) -> SpycraftResult<PipelineOutput>
where
    S: PacketSource + 'static,
{
    let (packet_tx, packet_rx) = mpsc::channel(config.packet_queue.max(1));
    let (message_tx, message_rx) = mpsc::channel(config.message_queue.max(1));

    info!(
        "scanning for {}/{}",
        classifier.host(),
        classifier.port()
    );
    let capture = tokio::task::spawn_blocking(move || capture_stage(source, packet_tx, cancel));
    let classify = tokio::spawn(classify_stage(classifier, packet_rx, message_tx));
    let correlate = tokio::spawn(correlate_stage(engine, message_rx));

    let engine = correlate
        .await
        .map_err(|_| SpycraftError::ChannelClosed { stage: "correlate" })?;
    let messages = classify
        .await
        .map_err(|_| SpycraftError::ChannelClosed { stage: "classify" })??;
    let packets = capture
        .await
        .map_err(|_| SpycraftError::ChannelClosed { stage: "capture" })??;

    info!("pipeline drained after {} packets", packets);
    Ok(PipelineOutput {
        engine,
        packets,
        messages,
    })
}

fn capture_stage<S: PacketSource>(
    mut source: S,
    tx: mpsc::Sender<Envelope<DecodedPacket>>,
    cancel: CancellationToken,
) -> SpycraftResult<u64> {
    let mut packets = 0u64;
    let mut failure = None;
    while !cancel.is_cancelled() {
        let packet = match source.next_packet() {
            Some(Ok(packet)) => packet,
            Some(Err(e)) => {
                error!("capture failed: {}", e);
                failure = Some(e);
                break;
            }
            None => break,
        };
        packets += 1;
        if tx.blocking_send(Envelope::Data(packet)).is_err() {
            failure = Some(SpycraftError::ChannelClosed { stage: "classify" });
            break;
        }
    }
    if cancel.is_cancelled() {
        info!("capture cancelled");
    }

    // downstream may already be gone
    let _ = tx.blocking_send(Envelope::EndOfStream);
    match failure {
        Some(e) => Err(e),
        None => Ok(packets),
    }
}

async fn classify_stage(
    classifier: Classifier,
    mut rx: mpsc::Receiver<Envelope<DecodedPacket>>,
    tx: mpsc::Sender<Envelope<ApplicationMessage>>,
) -> SpycraftResult<u64> {
    let mut messages = 0u64;
    while let Some(Envelope::Data(packet)) = rx.recv().await {
        let Some(message) = classifier.classify(&packet) else {
            continue;
        };
        messages += 1;
        if tx.send(Envelope::Data(message)).await.is_err() {
            return Err(SpycraftError::ChannelClosed { stage: "correlate" });
        }
    }
    debug!("classify stage done after {} messages", messages);
    let _ = tx.send(Envelope::EndOfStream).await;
    Ok(messages)
}

async fn correlate_stage(
    mut engine: LegEngine,
    mut rx: mpsc::Receiver<Envelope<ApplicationMessage>>,
) -> LegEngine {
    while let Some(Envelope::Data(message)) = rx.recv().await {
        engine.process(&message);
        engine.reap_if_due(message.timestamp);
    }
    debug!("correlate stage done with {} legs", engine.len());
    engine
}
