//! Pass-through tap between the upstream model stream and its consumer.
//!
//! Every upstream item is forwarded unchanged and without waiting on the
//! audio path. On the side, text deltas are segmented into sentences and
//! queued on the relay coordinator.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use llm_core::{EventDecoder, StreamEvent};
use tracing::{debug, error};

use crate::relay::{QueueItem, RelayHandle};
use crate::segmenter::SentenceSegmenter;

pub struct SpeechRelay {
    decoder: EventDecoder,
    segmenter: SentenceSegmenter,
    handle: RelayHandle,
    ended: bool,
    faulted: bool,
}

impl SpeechRelay {
    pub fn new(handle: RelayHandle) -> Self {
        Self {
            decoder: EventDecoder::new(),
            segmenter: SentenceSegmenter::new(),
            handle,
            ended: false,
            faulted: false,
        }
    }

    /// Look at one upstream chunk. Never fails and never blocks.
    pub fn observe(&mut self, chunk: &[u8]) {
        for event in self.decoder.push(chunk) {
            self.on_event(event);
        }
    }

    /// The upstream is exhausted: flush partial input and close the queue.
    pub fn complete(&mut self) {
        if let Some(event) = self.decoder.finish() {
            self.on_event(event);
        }
        self.end();
    }

    /// Text seen so far in this response.
    pub fn transcript(&self) -> &str {
        self.segmenter.transcript()
    }

    /// Forward `upstream` unchanged while feeding the relay.
    ///
    /// Dropping the returned stream before the upstream is exhausted cancels
    /// speech for this response; reaching the end lets queued speech finish.
    pub fn tap<S, E>(self, upstream: S) -> impl Stream<Item = Result<Bytes, E>> + Send + 'static
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Send + 'static,
    {
        let mut relay = self;
        async_stream::stream! {
            let abort_on_drop = relay.handle.cancellation().drop_guard();
            futures::pin_mut!(upstream);
            while let Some(item) = upstream.next().await {
                // Forward first; decoding happens on the way back in.
                let seen = item.as_ref().ok().cloned();
                yield item;
                if let Some(bytes) = seen {
                    relay.observe(&bytes);
                }
            }
            relay.complete();
            abort_on_drop.disarm();
        }
    }

    fn on_event(&mut self, event: StreamEvent) {
        if self.ended || self.faulted {
            return;
        }
        match event {
            StreamEvent::TextDelta { text } => match self.segmenter.push(&text) {
                Ok(units) => {
                    for unit in units {
                        debug!(sequence = unit.sequence, "Queueing sentence");
                        self.handle.enqueue(QueueItem::Speak(unit));
                    }
                }
                Err(e) => self.fault(e),
            },
            StreamEvent::Finish | StreamEvent::Done => self.end(),
            StreamEvent::Other => {}
        }
    }

    fn end(&mut self) {
        if self.ended || self.faulted {
            return;
        }
        self.ended = true;
        match self.segmenter.flush() {
            Ok(Some(unit)) => {
                debug!(sequence = unit.sequence, "Queueing final fragment");
                self.handle.enqueue(QueueItem::Speak(unit));
            }
            Ok(None) => {}
            Err(e) => return self.fault(e),
        }
        self.handle.enqueue(QueueItem::End);
    }

    fn fault(&mut self, e: crate::error::SegmentationError) {
        error!("Stopping speech for this response: {e}");
        self.faulted = true;
        self.handle.cancel();
    }
}
