//! Sentence segmentation of streamed model text.
//!
//! Boundaries are punctuation only (`.`, `!`, `?`). There is no abbreviation
//! or number awareness: "3.14" is cut after "3.". A boundary is confirmed
//! once the character after the punctuation run has arrived, so a sentence
//! sitting at the very end of the buffer waits for more text or for `flush`.

use crate::error::SegmentationError;

/// One sentence queued for speech. `sequence` starts at 1 and is contiguous
/// within a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub content: String,
    pub sequence: u64,
}

#[derive(Debug)]
pub struct SentenceSegmenter {
    buffer: String,
    transcript: String,
    // Bytes of the transcript already handed out as units (or discarded
    // whitespace between them).
    consumed: usize,
    next_sequence: u64,
    // Where the boundary search resumes in `buffer`.
    scan: Scan,
}

#[derive(Debug, Default, Clone, Copy)]
struct Scan {
    pos: usize,
    has_word: bool,
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            transcript: String::new(),
            consumed: 0,
            next_sequence: 1,
            scan: Scan::default(),
        }
    }

    /// Forget everything; the next unit is sequence 1 again.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Append a delta and return every sentence it completed.
    pub fn push(&mut self, delta: &str) -> Result<Vec<TextUnit>, SegmentationError> {
        self.buffer.push_str(delta);
        self.transcript.push_str(delta);

        let mut units = Vec::new();
        while let Some(end) = sentence_end(&self.buffer, &mut self.scan) {
            let sentence: String = self.buffer.drain(..end).collect();
            self.scan = Scan::default();
            self.consumed += sentence.len();
            if let Some(unit) = self.make_unit(&sentence) {
                units.push(unit);
            }
        }
        self.check()?;
        Ok(units)
    }

    /// Emit whatever is left as a final unit, if it has any content.
    pub fn flush(&mut self) -> Result<Option<TextUnit>, SegmentationError> {
        let rest = std::mem::take(&mut self.buffer);
        self.scan = Scan::default();
        self.consumed += rest.len();
        self.check()?;
        Ok(self.make_unit(&rest))
    }

    /// Everything received so far in this response.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Text still waiting for a boundary.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn make_unit(&mut self, raw: &str) -> Option<TextUnit> {
        let content = raw.trim();
        if content.is_empty() {
            return None;
        }
        let unit = TextUnit {
            content: content.to_string(),
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        Some(unit)
    }

    fn check(&self) -> Result<(), SegmentationError> {
        if self.consumed + self.buffer.len() != self.transcript.len() {
            return Err(SegmentationError {
                consumed: self.consumed,
                buffered: self.buffer.len(),
                transcript: self.transcript.len(),
            });
        }
        Ok(())
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Byte offset just past the first complete sentence in `buf`, searching
/// from where `scan` stopped last time.
fn sentence_end(buf: &str, scan: &mut Scan) -> Option<usize> {
    let start = scan.pos;
    let mut chars = buf[start..].char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        if is_terminal(c) {
            match chars.peek() {
                None => {
                    // Unconfirmed: look at this character again next time.
                    scan.pos = start + offset;
                    return None;
                }
                Some(&(next_offset, next)) if scan.has_word && !is_terminal(next) => {
                    return Some(start + next_offset);
                }
                Some(_) => {}
            }
        } else if !c.is_whitespace() {
            scan.has_word = true;
        }
    }
    scan.pos = buf.len();
    None
}
