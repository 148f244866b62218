use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::consensus::{self, VoteTally};
use super::domain::{
    ApplicantId, Application, ApplicationId, HouseholdId, MeetingProposal, Party, ProposalId,
    ResidentId, SavedIntent, Vote,
};
use super::journal::{ConversationEvent, ConversationLog};

/// Storage record for one application thread: the entity itself plus its
/// votes, proposals, and conversation log, under one optimistic version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application: Application,
    pub votes: BTreeMap<ResidentId, Vote>,
    pub proposals: Vec<MeetingProposal>,
    pub log: ConversationLog,
    pub version: u64,
}

impl ApplicationRecord {
    pub fn new(application: Application) -> Self {
        Self {
            application,
            votes: BTreeMap::new(),
            proposals: Vec::new(),
            log: ConversationLog::default(),
            version: 1,
        }
    }

    /// The single pending or confirmed proposal, if any.
    pub fn active_proposal(&self) -> Option<&MeetingProposal> {
        self.proposals.iter().find(|proposal| proposal.is_active())
    }

    pub fn proposal(&self, id: &ProposalId) -> Option<&MeetingProposal> {
        self.proposals.iter().find(|proposal| &proposal.id == id)
    }

    pub fn proposal_mut(&mut self, id: &ProposalId) -> Option<&mut MeetingProposal> {
        self.proposals
            .iter_mut()
            .find(|proposal| &proposal.id == id)
    }

    pub fn tally(&self, total_residents: usize) -> VoteTally {
        consensus::tally_votes(&self.votes, total_residents)
    }

    pub fn view(&self, total_residents: usize) -> ApplicationView {
        ApplicationView {
            application_id: self.application.id.clone(),
            applicant_id: self.application.applicant_id.clone(),
            household_id: self.application.household_id.clone(),
            status: self.application.status.label(),
            answer_text: self.application.answer_text.clone(),
            archived: self.application.archived,
            submitted_at: self.application.submitted_at,
            last_updated_at: self.application.last_updated_at,
            version: self.version,
            tally: self.tally(total_residents),
            active_proposal: self.active_proposal().map(ProposalView::from),
        }
    }
}

/// Storage abstraction so the service can be exercised in isolation.
pub trait CoordinationStore: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// Resolve the thread owning a proposal; proposals are addressed
    /// directly by the confirm/change/cancel endpoints.
    fn fetch_by_proposal(
        &self,
        id: &ProposalId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn upsert_intent(&self, intent: SavedIntent) -> Result<(), RepositoryError>;
    fn fetch_intent(
        &self,
        applicant_id: &ApplicantId,
        household_id: &HouseholdId,
    ) -> Result<Option<SavedIntent>, RepositoryError>;
    fn remove_intent(
        &self,
        applicant_id: &ApplicantId,
        household_id: &HouseholdId,
    ) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Household membership directory; supplied by the profile system, which
/// owns resident identities and admin rights.
pub trait HouseholdDirectory: Send + Sync {
    fn residents(&self, household_id: &HouseholdId) -> Result<Vec<ResidentId>, DirectoryError>;
    fn is_admin(
        &self,
        household_id: &HouseholdId,
        resident_id: &ResidentId,
    ) -> Result<bool, DirectoryError>;
}

/// Directory lookup error.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("household {0} is not known to the directory")]
    UnknownHousehold(HouseholdId),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook fed by every conversation event append.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Notification payload so routes/tests can assert integration boundaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub application_id: ApplicationId,
    pub household_id: HouseholdId,
    pub event: ConversationEvent,
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Sanitized thread state exposed over the API.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub application_id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub household_id: HouseholdId,
    pub status: &'static str,
    pub answer_text: String,
    pub archived: bool,
    pub submitted_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub version: u64,
    pub tally: VoteTally,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_proposal: Option<ProposalView>,
}

/// Wire representation of one meeting proposal.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalView {
    pub proposal_id: ProposalId,
    pub application_id: ApplicationId,
    pub proposed_by: Party,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub status: &'static str,
}

impl From<&MeetingProposal> for ProposalView {
    fn from(proposal: &MeetingProposal) -> Self {
        Self {
            proposal_id: proposal.id.clone(),
            application_id: proposal.application_id.clone(),
            proposed_by: proposal.proposed_by.clone(),
            date: proposal.date,
            time: proposal.time,
            duration_minutes: proposal.duration_minutes,
            format: proposal.format.label(),
            location: proposal.location.clone(),
            status: proposal.status.label(),
        }
    }
}
