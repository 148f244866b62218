use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on the applicant's introduction text, counted in characters.
pub const MAX_ANSWER_CHARS: usize = 100;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_type!(
    /// Identifier of one applicant↔household application thread.
    ApplicationId
);
id_type!(
    /// Identifier of a candidate applying to join a household.
    ApplicantId
);
id_type!(
    /// Identifier of the resident group evaluating applicants.
    HouseholdId
);
id_type!(
    /// Identifier of a single household member.
    ResidentId
);
id_type!(
    /// Identifier of one concrete meeting proposal.
    ProposalId
);

/// Lifecycle of an application. `Invited` and `Declined` are terminal
/// with respect to voting; re-applying requires a new application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Invited,
    Declined,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Invited => "invited",
            ApplicationStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One resident's stance on an application; doubles as the decision type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Invite,
    Decline,
}

impl VoteChoice {
    pub const fn label(self) -> &'static str {
        match self {
            VoteChoice::Invite => "invite",
            VoteChoice::Decline => "decline",
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Actor in a meeting negotiation: the applicant, or one specific resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Party {
    Applicant,
    Resident { resident_id: ResidentId },
}

impl Party {
    pub fn side(&self) -> PartySide {
        match self {
            Party::Applicant => PartySide::Applicant,
            Party::Resident { .. } => PartySide::Household,
        }
    }

    pub fn resident(&self) -> Option<&ResidentId> {
        match self {
            Party::Applicant => None,
            Party::Resident { resident_id } => Some(resident_id),
        }
    }
}

/// The two sides of a negotiation. Counterparty acceptance means the
/// opposite side, not merely a different individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartySide {
    Applicant,
    Household,
}

/// One candidate's bid to join one household.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub household_id: HouseholdId,
    pub status: ApplicationStatus,
    pub answer_text: String,
    pub archived: bool,
    pub submitted_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl Application {
    /// Create a pending application from a validated submission.
    pub fn submit(
        id: ApplicationId,
        applicant_id: ApplicantId,
        household_id: HouseholdId,
        answer_text: String,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        validate_answer_text(&answer_text)?;
        Ok(Self {
            id,
            applicant_id,
            household_id,
            status: ApplicationStatus::Pending,
            answer_text,
            archived: false,
            submitted_at: now,
            last_updated_at: now,
        })
    }

    /// Apply the household's decision. Rejects anything but a first
    /// decision on a pending application, so double decisions surface
    /// to the caller instead of passing silently.
    pub fn apply_decision(
        &mut self,
        decision: VoteChoice,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidStateError> {
        if self.status != ApplicationStatus::Pending {
            return Err(InvalidStateError::NotPending {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = match decision {
            VoteChoice::Invite => ApplicationStatus::Invited,
            VoteChoice::Decline => ApplicationStatus::Declined,
        };
        self.last_updated_at = now;
        Ok(())
    }

    /// Mark a declined application read-only. Returns `false` when the
    /// application was already archived (a no-op).
    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<bool, InvalidStateError> {
        if self.archived {
            return Ok(false);
        }
        if self.status != ApplicationStatus::Declined {
            return Err(InvalidStateError::NotDeclined {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.archived = true;
        self.last_updated_at = now;
        Ok(true)
    }

    pub fn ensure_mutable(&self) -> Result<(), InvalidStateError> {
        if self.archived {
            return Err(InvalidStateError::Archived {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// Draft application kept private to the applicant; becomes visible to
/// the household only once promoted to a real submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedIntent {
    pub applicant_id: ApplicantId,
    pub household_id: HouseholdId,
    pub answer_text: String,
    pub saved_at: DateTime<Utc>,
}

/// One resident's vote on one application. Later casts overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub application_id: ApplicationId,
    pub resident_id: ResidentId,
    pub choice: VoteChoice,
    pub cast_at: DateTime<Utc>,
}

/// How the meeting takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingFormat {
    FaceToFace,
    Video,
}

impl MeetingFormat {
    pub const fn label(self) -> &'static str {
        match self {
            MeetingFormat::FaceToFace => "face_to_face",
            MeetingFormat::Video => "video",
        }
    }
}

/// Lifecycle of a single meeting proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Confirmed,
    Superseded,
    Cancelled,
}

impl ProposalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Confirmed => "confirmed",
            ProposalStatus::Superseded => "superseded",
            ProposalStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One concrete candidate meeting tied to an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingProposal {
    pub id: ProposalId,
    pub application_id: ApplicationId,
    pub proposed_by: Party,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub format: MeetingFormat,
    pub location: Option<String>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
}

impl MeetingProposal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ProposalId,
        application_id: ApplicationId,
        proposed_by: Party,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: u32,
        format: MeetingFormat,
        location: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if duration_minutes == 0 {
            return Err(ValidationError::ZeroDuration);
        }
        match (format, &location) {
            (MeetingFormat::FaceToFace, None) => return Err(ValidationError::MissingLocation),
            (MeetingFormat::Video, Some(_)) => return Err(ValidationError::UnexpectedLocation),
            _ => {}
        }
        Ok(Self {
            id,
            application_id,
            proposed_by,
            date,
            time,
            duration_minutes,
            format,
            location,
            status: ProposalStatus::Pending,
            created_at: now,
        })
    }

    /// Pending and confirmed proposals block new proposals for the thread.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            ProposalStatus::Pending | ProposalStatus::Confirmed
        )
    }

    /// Counterparty acceptance: only the opposite side may confirm.
    pub fn confirm(&mut self, confirming_party: &Party) -> Result<(), InvalidStateError> {
        if self.status != ProposalStatus::Pending {
            return Err(InvalidStateError::ProposalNotPending {
                id: self.id.clone(),
                status: self.status,
            });
        }
        if confirming_party.side() == self.proposed_by.side() {
            return Err(InvalidStateError::OwnProposal {
                id: self.id.clone(),
            });
        }
        self.status = ProposalStatus::Confirmed;
        Ok(())
    }

    /// Mark a pending proposal non-active; it is never resurrected.
    pub fn supersede(&mut self) -> Result<(), InvalidStateError> {
        if self.status != ProposalStatus::Pending {
            return Err(InvalidStateError::ProposalNotPending {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = ProposalStatus::Superseded;
        Ok(())
    }

    /// Cancellation is only legal once confirmed; it reopens the thread
    /// for a fresh proposal.
    pub fn cancel(&mut self) -> Result<(), InvalidStateError> {
        if self.status != ProposalStatus::Confirmed {
            return Err(InvalidStateError::ProposalNotConfirmed {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = ProposalStatus::Cancelled;
        Ok(())
    }
}

pub fn validate_answer_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyAnswer);
    }
    let found = text.chars().count();
    if found > MAX_ANSWER_CHARS {
        return Err(ValidationError::AnswerTooLong {
            max: MAX_ANSWER_CHARS,
            found,
        });
    }
    Ok(())
}

/// Malformed input. Recoverable by resubmitting corrected data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("answer text must not be empty")]
    EmptyAnswer,
    #[error("answer text exceeds {max} characters (found {found})")]
    AnswerTooLong { max: usize, found: usize },
    #[error("face-to-face meetings require a location")]
    MissingLocation,
    #[error("video meetings must not carry a location")]
    UnexpectedLocation,
    #[error("meeting duration must be at least one minute")]
    ZeroDuration,
    #[error("message body must not be empty")]
    EmptyMessage,
}

/// The requested transition is illegal in the current state. Each variant
/// carries the authoritative state so callers can resynchronize.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidStateError {
    #[error("application {id} is not pending (status: {status})")]
    NotPending {
        id: ApplicationId,
        status: ApplicationStatus,
    },
    #[error("application {id} is not invited (status: {status})")]
    NotInvited {
        id: ApplicationId,
        status: ApplicationStatus,
    },
    #[error("application {id} is not declined (status: {status})")]
    NotDeclined {
        id: ApplicationId,
        status: ApplicationStatus,
    },
    #[error("application {id} is archived and read-only")]
    Archived { id: ApplicationId },
    #[error("proposal {id} is not pending (status: {status})")]
    ProposalNotPending { id: ProposalId, status: ProposalStatus },
    #[error("proposal {id} is not confirmed (status: {status})")]
    ProposalNotConfirmed { id: ProposalId, status: ProposalStatus },
    #[error("application {application_id} already has a confirmed proposal ({proposal_id})")]
    ConfirmedProposalExists {
        application_id: ApplicationId,
        proposal_id: ProposalId,
    },
    #[error("proposal {id} cannot be confirmed by the side that proposed it")]
    OwnProposal { id: ProposalId },
    #[error("resident {resident_id} is not a member of household {household_id}")]
    NotAHouseholdMember {
        resident_id: ResidentId,
        household_id: HouseholdId,
    },
    #[error("resident {resident_id} is not an admin of household {household_id}")]
    NotAHouseholdAdmin {
        resident_id: ResidentId,
        household_id: HouseholdId,
    },
}

/// Stale optimistic-version write detected under concurrent mutation.
/// The caller refetches current state and retries with the new version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stale write: expected version {expected}, current version is {current}")]
pub struct ConflictError {
    pub expected: u64,
    pub current: u64,
}
