//! Application and meeting coordination workflow.
//!
//! Tracks the lifecycle of a candidate's application to join a household,
//! turns independent resident votes into a single invite/decline decision,
//! negotiates a meeting between the applicant and the household, resolves
//! candidate meeting slots from per-resident availability, and keeps an
//! append-only conversation log per application thread.

pub mod consensus;
pub mod domain;
pub mod journal;
pub mod repository;
pub mod router;
pub mod service;
pub mod slots;

#[cfg(test)]
mod tests;

pub use consensus::{ConsensusConfig, QuorumOutcome, VoteTally};
pub use domain::{
    ApplicantId, Application, ApplicationId, ApplicationStatus, ConflictError, HouseholdId,
    InvalidStateError, MeetingFormat, MeetingProposal, Party, PartySide, ProposalId,
    ProposalStatus, ResidentId, SavedIntent, ValidationError, Vote, VoteChoice, MAX_ANSWER_CHARS,
};
pub use journal::{ConversationEvent, ConversationLog, EventKind};
pub use repository::{
    ApplicationRecord, ApplicationView, CoordinationStore, DirectoryError, HouseholdDirectory,
    Notification, NotificationPublisher, NotifyError, ProposalView, RepositoryError,
};
pub use router::coordination_router;
pub use service::{CoordinationConfig, CoordinationError, CoordinationService};
pub use slots::{ResidentAvailability, SlotWindow, TimeSlot};
