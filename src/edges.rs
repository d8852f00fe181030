//! Consecutive-sender transitions.
//!
//! Every message is read as a reply to the message right before it: the later
//! message's author is the edge source, the earlier one's the target.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::transcript::{MessageRecord, Transcript};

/// One "replied to" instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectedEdge {
    /// Index of the replying message (see [`MessageRecord::index`]).
    pub index: usize,
    pub source: String,
    pub target: String,
    pub time: NaiveDateTime,
}

impl DirectedEdge {
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

/// One edge per adjacent pair of records. The first record has no predecessor and
/// yields nothing. Same-user neighbours only occur when collapsing was disabled; they
/// are kept here and left to the weighting stage to discard.
pub fn directed_edges(transcript: &Transcript) -> Vec<DirectedEdge> {
    records_to_edges(&transcript.records)
}

pub fn records_to_edges(records: &[MessageRecord]) -> Vec<DirectedEdge> {
    records
        .windows(2)
        .map(|pair| DirectedEdge {
            index: pair[1].index,
            source: pair[1].user.clone(),
            target: pair[0].user.clone(),
            time: pair[1].timestamp,
        })
        .collect()
}
