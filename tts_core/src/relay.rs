//! Relay coordinator: one worker task per response that turns queued text
//! units into audio and feeds the sink strictly in order.
//!
//! The worker owns the sink and the receiving end of an unbounded queue, so
//! there is never more than one writer and never more than one worker. Each
//! unit is processed end to end (synthesis read loop included) before the
//! next one is dequeued.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::playback::{AudioSink, WriteOutcome};
use crate::segmenter::TextUnit;
use crate::synth::{AudioChunk, Synthesizer};

/// Work for the coordinator, consumed in FIFO order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Speak(TextUnit),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Queue empty, waiting for work.
    Idle,
    /// Processing queued items.
    Draining,
}

/// How the audio side of one response went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub units_spoken: u64,
    pub synthesis_failures: u64,
    pub playback_failed: bool,
    pub cancelled: bool,
}

/// Producer side of a running coordinator.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<QueueItem>,
    cancel: CancellationToken,
    state: watch::Receiver<RelayState>,
}

impl RelayHandle {
    /// Queue an item. Returns false once the worker has stopped.
    pub fn enqueue(&self, item: QueueItem) -> bool {
        self.tx.send(item).is_ok()
    }

    /// Drop pending work and stop playback now.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RelayState> {
        self.state.clone()
    }
}

enum Flow {
    Continue,
    Cancelled,
}

pub struct RelayCoordinator<K> {
    synth: Arc<dyn Synthesizer>,
    sink: K,
    rx: mpsc::UnboundedReceiver<QueueItem>,
    cancel: CancellationToken,
    state: watch::Sender<RelayState>,
    summary: RelaySummary,
}

impl<K: AudioSink + 'static> RelayCoordinator<K> {
    /// Start the worker for one response. The worker stops after `End`, on
    /// cancellation, or when every handle is gone.
    pub fn spawn(
        synth: Arc<dyn Synthesizer>,
        sink: K,
        cancel: CancellationToken,
    ) -> (RelayHandle, JoinHandle<RelaySummary>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(RelayState::Idle);

        let coordinator = Self {
            synth,
            sink,
            rx,
            cancel: cancel.clone(),
            state: state_tx,
            summary: RelaySummary::default(),
        };
        let worker = tokio::spawn(coordinator.run());

        let handle = RelayHandle {
            tx,
            cancel,
            state: state_rx,
        };
        (handle, worker)
    }

    async fn run(mut self) -> RelaySummary {
        let cancel = self.cancel.clone();
        loop {
            if cancel.is_cancelled() {
                return self.abort().await;
            }

            let next = match self.rx.try_recv() {
                Ok(item) => Some(item),
                Err(mpsc::error::TryRecvError::Disconnected) => None,
                Err(mpsc::error::TryRecvError::Empty) => {
                    self.set_state(RelayState::Idle);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.abort().await,
                        item = self.rx.recv() => item,
                    }
                }
            };
            self.set_state(RelayState::Draining);

            match next {
                Some(QueueItem::Speak(unit)) => {
                    if let Flow::Cancelled = self.speak(unit, &cancel).await {
                        return self.abort().await;
                    }
                }
                Some(QueueItem::End) => return self.finish(&cancel).await,
                None => {
                    debug!("Relay queue closed without an end marker");
                    return self.finish(&cancel).await;
                }
            }
        }
    }

    async fn speak(&mut self, unit: TextUnit, cancel: &CancellationToken) -> Flow {
        if self.summary.playback_failed {
            debug!(sequence = unit.sequence, "Playback unavailable, skipping unit");
            return Flow::Continue;
        }

        if let Err(e) = self.sink.ensure_started().await {
            error!(sequence = unit.sequence, "Giving up on audio for this response: {e}");
            self.summary.playback_failed = true;
            return Flow::Continue;
        }

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Flow::Cancelled,
            started = self.synth.synthesize(&unit.content) => started,
        };
        let mut audio = match started {
            Ok(audio) => audio,
            Err(e) => {
                warn!(sequence = unit.sequence, "Synthesis failed, skipping unit: {e}");
                self.summary.synthesis_failures += 1;
                return Flow::Continue;
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Flow::Cancelled,
                next = audio.next() => next,
            };
            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    warn!(sequence = unit.sequence, "Synthesis stream broke off: {e}");
                    self.summary.synthesis_failures += 1;
                    return Flow::Continue;
                }
                None => break,
            };

            let chunk = AudioChunk {
                bytes,
                sequence: unit.sequence,
            };
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Flow::Cancelled,
                outcome = self.sink.write(&chunk) => outcome,
            };
            if outcome == WriteOutcome::Skipped {
                debug!(sequence = unit.sequence, "Audio chunk skipped by sink");
            }
        }

        debug!(sequence = unit.sequence, "Unit spoken");
        self.summary.units_spoken += 1;
        Flow::Continue
    }

    async fn finish(mut self, cancel: &CancellationToken) -> RelaySummary {
        let interrupted = tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            ended = self.sink.end_gracefully() => {
                if let Err(e) = ended {
                    warn!("Player did not shut down cleanly: {e}");
                }
                false
            }
        };
        if interrupted {
            return self.abort().await;
        }

        self.set_state(RelayState::Idle);
        info!(
            spoken = self.summary.units_spoken,
            failures = self.summary.synthesis_failures,
            "Relay finished"
        );
        self.summary
    }

    async fn abort(mut self) -> RelaySummary {
        self.rx.close();
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        self.sink.stop_immediately().await;

        self.summary.cancelled = true;
        self.set_state(RelayState::Idle);
        info!(dropped, spoken = self.summary.units_spoken, "Relay cancelled");
        self.summary
    }

    fn set_state(&self, state: RelayState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}
