//! Per-stream `seq` tracking for gap and reorder detection.
//!
//! The tracker only reports what it saw. Resolving a gap (refetching state)
//! is up to the caller.

use std::collections::HashMap;

use agentfield_protocol::EventFrame;

/// Stream key used when no configured payload field identifies the stream.
pub const CONNECTION_STREAM: &str = "connection";

/// A jump in `seq` larger than one on a single stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceGap {
    pub stream: String,
    pub event: String,
    pub expected: u64,
    pub observed: u64,
}

impl SequenceGap {
    /// Number of frames that were skipped.
    pub fn missing(&self) -> u64 {
        self.observed - self.expected
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeqObservation {
    /// The frame carried no `seq`.
    Untracked,
    /// First `seq` seen on this stream since the last reset.
    First,
    InOrder,
    Gap(SequenceGap),
    /// Duplicate or older than the highest `seq` already seen.
    Stale { last: u64, observed: u64 },
}

#[derive(Debug, Clone)]
pub struct SequenceTracker {
    key_fields: Vec<String>,
    last: HashMap<String, u64>,
}

impl SequenceTracker {
    pub fn new(key_fields: Vec<String>) -> Self {
        Self {
            key_fields,
            last: HashMap::new(),
        }
    }

    /// Stream key for a frame: the first configured payload field holding a
    /// string, rendered as `field:value`, or [`CONNECTION_STREAM`].
    pub fn stream_key(&self, frame: &EventFrame) -> String {
        self.key_fields
            .iter()
            .find_map(|field| frame.payload_str(field).map(|value| format!("{field}:{value}")))
            .unwrap_or_else(|| CONNECTION_STREAM.to_string())
    }

    pub fn observe(&mut self, frame: &EventFrame) -> SeqObservation {
        let Some(seq) = frame.seq else {
            return SeqObservation::Untracked;
        };
        let stream = self.stream_key(frame);
        match self.last.get(&stream).copied() {
            None => {
                self.last.insert(stream, seq);
                SeqObservation::First
            },
            Some(last) if seq <= last => SeqObservation::Stale {
                last,
                observed: seq,
            },
            Some(last) if seq == last + 1 => {
                self.last.insert(stream, seq);
                SeqObservation::InOrder
            },
            Some(last) => {
                // Advance past the gap so it is reported once.
                self.last.insert(stream.clone(), seq);
                SeqObservation::Gap(SequenceGap {
                    stream,
                    event: frame.event.clone(),
                    expected: last + 1,
                    observed: seq,
                })
            },
        }
    }

    pub fn last_seq(&self, stream: &str) -> Option<u64> {
        self.last.get(stream).copied()
    }

    /// Forget all streams; numbering restarts on a fresh connection.
    pub fn reset(&mut self) {
        self.last.clear();
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn chat(session: &str, seq: u64) -> EventFrame {
        EventFrame::new("chat", json!({ "sessionKey": session })).with_seq(seq)
    }

    fn tracker() -> SequenceTracker {
        SequenceTracker::new(vec!["sessionKey".into(), "runId".into()])
    }

    #[test]
    fn in_order_stream_has_no_gap() {
        let mut t = tracker();
        assert_eq!(t.observe(&chat("main", 1)), SeqObservation::First);
        assert_eq!(t.observe(&chat("main", 2)), SeqObservation::InOrder);
        assert_eq!(t.last_seq("sessionKey:main"), Some(2));
    }

    #[test]
    fn gap_reported_once_then_tracking_resumes() {
        let mut t = tracker();
        t.observe(&chat("main", 5));
        match t.observe(&chat("main", 7)) {
            SeqObservation::Gap(gap) => {
                assert_eq!(gap.stream, "sessionKey:main");
                assert_eq!(gap.expected, 6);
                assert_eq!(gap.observed, 7);
                assert_eq!(gap.missing(), 1);
            },
            other => panic!("expected gap, got {other:?}"),
        }
        assert_eq!(t.observe(&chat("main", 8)), SeqObservation::InOrder);
    }

    #[test]
    fn streams_are_independent() {
        let mut t = tracker();
        t.observe(&chat("a", 1));
        t.observe(&chat("b", 10));
        assert_eq!(t.observe(&chat("a", 2)), SeqObservation::InOrder);
        assert_eq!(t.observe(&chat("b", 11)), SeqObservation::InOrder);
    }

    #[test]
    fn late_or_duplicate_frames_are_stale() {
        let mut t = tracker();
        t.observe(&chat("main", 4));
        assert_eq!(t.observe(&chat("main", 4)), SeqObservation::Stale {
            last: 4,
            observed: 4
        });
        assert_eq!(t.observe(&chat("main", 2)), SeqObservation::Stale {
            last: 4,
            observed: 2
        });
        assert_eq!(t.last_seq("sessionKey:main"), Some(4));
    }

    #[test]
    fn falls_back_to_connection_stream() {
        let mut t = tracker();
        let tick = EventFrame::new("tick", json!({ "ts": 1 })).with_seq(1);
        assert_eq!(t.stream_key(&tick), CONNECTION_STREAM);
        let run = EventFrame::new("agent", json!({ "runId": "r-1" }));
        assert_eq!(t.stream_key(&run), "runId:r-1");
        assert_eq!(t.observe(&tick), SeqObservation::First);
    }

    #[test]
    fn frames_without_seq_are_untracked() {
        let mut t = tracker();
        let frame = EventFrame::new("presence", json!({}));
        assert_eq!(t.observe(&frame), SeqObservation::Untracked);
    }

    #[test]
    fn reset_forgets_streams() {
        let mut t = tracker();
        t.observe(&chat("main", 9));
        t.reset();
        assert_eq!(t.observe(&chat("main", 1)), SeqObservation::First);
    }
}
