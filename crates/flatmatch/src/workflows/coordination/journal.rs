use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicantId, MeetingFormat, Party, ProposalId, ResidentId, VoteChoice,
};

/// Immutable entry in an application's conversation timeline. Sequence
/// numbers start at 1 and increase by 1 per application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Structural transitions and free-text messages merged into one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ApplicationSubmitted {
        applicant_id: ApplicantId,
    },
    VoteCast {
        resident_id: ResidentId,
        choice: VoteChoice,
    },
    DecisionReached {
        decision: VoteChoice,
        forced_by: Option<ResidentId>,
    },
    ApplicationArchived,
    ProposalCreated {
        proposal_id: ProposalId,
        proposed_by: Party,
        date: NaiveDate,
        time: NaiveTime,
        format: MeetingFormat,
    },
    ProposalSuperseded {
        proposal_id: ProposalId,
        superseded_by: ProposalId,
    },
    ProposalChangeRequested {
        proposal_id: ProposalId,
        requested_by: Party,
        reason: Option<String>,
    },
    ProposalConfirmed {
        proposal_id: ProposalId,
        confirmed_by: Party,
    },
    ProposalCancelled {
        proposal_id: ProposalId,
        cancelled_by: Party,
    },
    Message {
        sender: Party,
        body: String,
    },
}

/// Append-only, strictly ordered event log for a single application.
/// Events are never reordered or mutated after insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationLog {
    events: Vec<ConversationEvent>,
}

impl ConversationLog {
    /// Append an event, assigning the next sequence number.
    pub fn append(&mut self, kind: EventKind, recorded_at: DateTime<Utc>) -> ConversationEvent {
        let event = ConversationEvent {
            seq: self.events.len() as u64 + 1,
            recorded_at,
            kind,
        };
        self.events.push(event.clone());
        event
    }

    pub fn events(&self) -> &[ConversationEvent] {
        &self.events
    }

    /// Page of events with `seq > after`, at most `limit` entries.
    /// Sequence numbers map directly onto positions, so the cursor is
    /// an index into the log.
    pub fn read_after(&self, after: u64, limit: usize) -> &[ConversationEvent] {
        let start = (after as usize).min(self.events.len());
        let end = start.saturating_add(limit).min(self.events.len());
        &self.events[start..end]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
