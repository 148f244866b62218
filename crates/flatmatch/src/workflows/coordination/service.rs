use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::consensus::{self, ConsensusConfig, QuorumOutcome, VoteTally};
use super::domain::{
    ApplicantId, Application, ApplicationId, ApplicationStatus, ConflictError, HouseholdId,
    InvalidStateError, MeetingFormat, MeetingProposal, Party, ProposalId, ProposalStatus,
    ResidentId, SavedIntent, ValidationError, Vote, VoteChoice,
};
use super::journal::{ConversationEvent, EventKind};
use super::repository::{
    ApplicationRecord, ApplicationView, CoordinationStore, DirectoryError, HouseholdDirectory,
    Notification, NotificationPublisher, NotifyError, RepositoryError,
};
use super::slots::{self, ResidentAvailability, SlotWindow, TimeSlot};

/// Policy configuration for the coordination service.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoordinationConfig {
    pub consensus: ConsensusConfig,
    pub slots: SlotWindow,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static PROPOSAL_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

fn next_proposal_id() -> ProposalId {
    let id = PROPOSAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ProposalId(format!("prop-{id:06}"))
}

fn check_version(record: &ApplicationRecord, expected: Option<u64>) -> Result<(), ConflictError> {
    match expected {
        Some(expected) if expected != record.version => Err(ConflictError {
            expected,
            current: record.version,
        }),
        _ => Ok(()),
    }
}

/// Service composing the lifecycle, consensus, negotiation, slot, and
/// journal engines over the storage and collaborator seams.
pub struct CoordinationService<S, D, N> {
    store: Arc<S>,
    directory: Arc<D>,
    notifier: Arc<N>,
    config: CoordinationConfig,
    // Serializes mutations per application thread; threads are fully
    // independent of each other.
    thread_locks: Mutex<HashMap<ApplicationId, Arc<Mutex<()>>>>,
}

impl<S, D, N> CoordinationService<S, D, N>
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, notifier: Arc<N>, config: CoordinationConfig) -> Self {
        Self {
            store,
            directory,
            notifier,
            config,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    fn thread_lock(&self, id: &ApplicationId) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().expect("lock registry poisoned");
        locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one atomic state transition under the application's lock.
    ///
    /// The operation returns a value plus the events its transition
    /// produced; an operation yielding no events is treated as a no-op
    /// and leaves the record (and its version) untouched. On success the
    /// events are appended to the log, the version is bumped, and one
    /// notification per event goes out.
    fn mutate<T>(
        &self,
        id: &ApplicationId,
        expected_version: Option<u64>,
        op: impl FnOnce(&mut ApplicationRecord) -> Result<(T, Vec<EventKind>), CoordinationError>,
    ) -> Result<(ApplicationRecord, T), CoordinationError> {
        let lock = self.thread_lock(id);
        let _guard = lock.lock().expect("application lock poisoned");

        let mut record = self
            .store
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        check_version(&record, expected_version)?;

        let (value, events) = op(&mut record)?;
        if events.is_empty() {
            return Ok((record, value));
        }

        let now = Utc::now();
        record.application.last_updated_at = now;
        record.version += 1;
        let appended: Vec<ConversationEvent> = events
            .into_iter()
            .map(|kind| record.log.append(kind, now))
            .collect();

        self.store.update(record.clone())?;
        self.publish_events(&record, appended)?;
        Ok((record, value))
    }

    fn publish_events(
        &self,
        record: &ApplicationRecord,
        events: Vec<ConversationEvent>,
    ) -> Result<(), CoordinationError> {
        for event in events {
            self.notifier.publish(Notification {
                application_id: record.application.id.clone(),
                household_id: record.application.household_id.clone(),
                event,
            })?;
        }
        Ok(())
    }

    fn require_member(
        &self,
        household_id: &HouseholdId,
        resident_id: &ResidentId,
    ) -> Result<Vec<ResidentId>, CoordinationError> {
        let residents = self.directory.residents(household_id)?;
        if !residents.contains(resident_id) {
            return Err(InvalidStateError::NotAHouseholdMember {
                resident_id: resident_id.clone(),
                household_id: household_id.clone(),
            }
            .into());
        }
        Ok(residents)
    }

    /// Create a pending application for the applicant/household pair.
    pub fn submit(
        &self,
        applicant_id: ApplicantId,
        household_id: HouseholdId,
        answer_text: String,
    ) -> Result<ApplicationRecord, CoordinationError> {
        // Also validates that the household exists.
        self.directory.residents(&household_id)?;

        let now = Utc::now();
        let application = Application::submit(
            next_application_id(),
            applicant_id.clone(),
            household_id,
            answer_text,
            now,
        )?;
        let mut record = ApplicationRecord::new(application);
        let event = record
            .log
            .append(EventKind::ApplicationSubmitted { applicant_id }, now);

        let stored = self.store.insert(record)?;
        info!(application_id = %stored.application.id, "application submitted");
        self.publish_events(&stored, vec![event])?;
        Ok(stored)
    }

    /// Park a draft without creating a household-visible record. Drafts
    /// are validated only when promoted.
    pub fn save_intent(
        &self,
        applicant_id: ApplicantId,
        household_id: HouseholdId,
        answer_text: String,
    ) -> Result<SavedIntent, CoordinationError> {
        let intent = SavedIntent {
            applicant_id,
            household_id,
            answer_text,
            saved_at: Utc::now(),
        };
        self.store.upsert_intent(intent.clone())?;
        Ok(intent)
    }

    /// Promote a saved draft into a real pending application. A draft
    /// failing validation stays parked for the applicant to fix.
    pub fn promote_intent(
        &self,
        applicant_id: &ApplicantId,
        household_id: &HouseholdId,
    ) -> Result<ApplicationRecord, CoordinationError> {
        let intent = self
            .store
            .fetch_intent(applicant_id, household_id)?
            .ok_or(RepositoryError::NotFound)?;
        let record = self.submit(intent.applicant_id, intent.household_id, intent.answer_text)?;
        self.store.remove_intent(applicant_id, household_id)?;
        Ok(record)
    }

    /// Upsert one resident's vote and finalize the decision once a
    /// quorum rule fires.
    pub fn cast_vote(
        &self,
        application_id: &ApplicationId,
        resident_id: ResidentId,
        choice: VoteChoice,
        expected_version: Option<u64>,
    ) -> Result<(ApplicationRecord, VoteTally), CoordinationError> {
        self.mutate(application_id, expected_version, |record| {
            record.application.ensure_mutable()?;
            if record.application.status != ApplicationStatus::Pending {
                return Err(InvalidStateError::NotPending {
                    id: record.application.id.clone(),
                    status: record.application.status,
                }
                .into());
            }
            let residents =
                self.require_member(&record.application.household_id, &resident_id)?;

            let now = Utc::now();
            record.votes.insert(
                resident_id.clone(),
                Vote {
                    application_id: record.application.id.clone(),
                    resident_id: resident_id.clone(),
                    choice,
                    cast_at: now,
                },
            );

            let tally = consensus::tally_votes(&record.votes, residents.len());
            let mut events = vec![EventKind::VoteCast {
                resident_id: resident_id.clone(),
                choice,
            }];

            match consensus::evaluate(&tally, &self.config.consensus) {
                QuorumOutcome::Decided(decision) => {
                    record.application.apply_decision(decision, now)?;
                    info!(
                        application_id = %record.application.id,
                        decision = decision.label(),
                        "quorum reached"
                    );
                    events.push(EventKind::DecisionReached {
                        decision,
                        forced_by: None,
                    });
                }
                QuorumOutcome::Deadlocked => {
                    debug!(
                        application_id = %record.application.id,
                        "vote deadlocked, awaiting admin override"
                    );
                }
                QuorumOutcome::Open => {}
            }

            Ok((tally, events))
        })
    }

    /// Explicit resident override: resolves deadlocks (and anything else
    /// still pending) with a final decision. Requires admin rights.
    pub fn force_decision(
        &self,
        application_id: &ApplicationId,
        resident_id: ResidentId,
        choice: VoteChoice,
        expected_version: Option<u64>,
    ) -> Result<ApplicationRecord, CoordinationError> {
        let (record, ()) = self.mutate(application_id, expected_version, |record| {
            record.application.ensure_mutable()?;
            self.require_member(&record.application.household_id, &resident_id)?;
            if !self
                .directory
                .is_admin(&record.application.household_id, &resident_id)?
            {
                return Err(InvalidStateError::NotAHouseholdAdmin {
                    resident_id: resident_id.clone(),
                    household_id: record.application.household_id.clone(),
                }
                .into());
            }

            record.application.apply_decision(choice, Utc::now())?;
            info!(
                application_id = %record.application.id,
                decision = choice.label(),
                forced_by = %resident_id,
                "decision forced by admin"
            );
            Ok((
                (),
                vec![EventKind::DecisionReached {
                    decision: choice,
                    forced_by: Some(resident_id.clone()),
                }],
            ))
        })?;
        Ok(record)
    }

    /// Mark a declined application read-only. No-op when already archived.
    pub fn archive(
        &self,
        application_id: &ApplicationId,
        expected_version: Option<u64>,
    ) -> Result<ApplicationRecord, CoordinationError> {
        let (record, ()) = self.mutate(application_id, expected_version, |record| {
            let archived_now = record.application.archive(Utc::now())?;
            let events = if archived_now {
                vec![EventKind::ApplicationArchived]
            } else {
                Vec::new()
            };
            Ok(((), events))
        })?;
        Ok(record)
    }

    /// Create a meeting proposal, superseding any prior pending one.
    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        &self,
        application_id: &ApplicationId,
        proposed_by: Party,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: u32,
        format: MeetingFormat,
        location: Option<String>,
        expected_version: Option<u64>,
    ) -> Result<(ApplicationRecord, ProposalId), CoordinationError> {
        self.mutate(application_id, expected_version, |record| {
            record.application.ensure_mutable()?;
            if record.application.status != ApplicationStatus::Invited {
                return Err(InvalidStateError::NotInvited {
                    id: record.application.id.clone(),
                    status: record.application.status,
                }
                .into());
            }
            if let Some(resident_id) = proposed_by.resident() {
                self.require_member(&record.application.household_id, resident_id)?;
            }
            if let Some(confirmed) = record
                .proposals
                .iter()
                .find(|proposal| proposal.status == ProposalStatus::Confirmed)
            {
                return Err(InvalidStateError::ConfirmedProposalExists {
                    application_id: record.application.id.clone(),
                    proposal_id: confirmed.id.clone(),
                }
                .into());
            }

            let proposal = MeetingProposal::new(
                next_proposal_id(),
                record.application.id.clone(),
                proposed_by.clone(),
                date,
                time,
                duration_minutes,
                format,
                location.clone(),
                Utc::now(),
            )?;

            let mut events = Vec::new();
            if let Some(prior) = record
                .proposals
                .iter_mut()
                .find(|existing| existing.status == ProposalStatus::Pending)
            {
                prior.supersede()?;
                events.push(EventKind::ProposalSuperseded {
                    proposal_id: prior.id.clone(),
                    superseded_by: proposal.id.clone(),
                });
            }
            events.push(EventKind::ProposalCreated {
                proposal_id: proposal.id.clone(),
                proposed_by: proposal.proposed_by.clone(),
                date: proposal.date,
                time: proposal.time,
                format: proposal.format,
            });

            let proposal_id = proposal.id.clone();
            record.proposals.push(proposal);
            Ok((proposal_id, events))
        })
    }

    /// Counterparty acceptance of a pending proposal.
    pub fn confirm(
        &self,
        proposal_id: &ProposalId,
        acting_party: Party,
        expected_version: Option<u64>,
    ) -> Result<ApplicationRecord, CoordinationError> {
        let application_id = self.application_for_proposal(proposal_id)?;
        let (record, ()) = self.mutate(&application_id, expected_version, |record| {
            record.application.ensure_mutable()?;
            if let Some(resident_id) = acting_party.resident() {
                self.require_member(&record.application.household_id, resident_id)?;
            }
            let proposal = record
                .proposal_mut(proposal_id)
                .ok_or(RepositoryError::NotFound)?;
            proposal.confirm(&acting_party)?;
            info!(
                application_id = %record.application.id,
                proposal_id = %proposal_id,
                "meeting confirmed"
            );
            Ok((
                (),
                vec![EventKind::ProposalConfirmed {
                    proposal_id: proposal_id.clone(),
                    confirmed_by: acting_party.clone(),
                }],
            ))
        })?;
        Ok(record)
    }

    /// Decline a pending proposal in favor of a future counter-proposal.
    /// Does not auto-create a replacement.
    pub fn request_change(
        &self,
        proposal_id: &ProposalId,
        acting_party: Party,
        reason: Option<String>,
        expected_version: Option<u64>,
    ) -> Result<ApplicationRecord, CoordinationError> {
        let application_id = self.application_for_proposal(proposal_id)?;
        let (record, ()) = self.mutate(&application_id, expected_version, |record| {
            record.application.ensure_mutable()?;
            if let Some(resident_id) = acting_party.resident() {
                self.require_member(&record.application.household_id, resident_id)?;
            }
            let proposal = record
                .proposal_mut(proposal_id)
                .ok_or(RepositoryError::NotFound)?;
            proposal.supersede()?;
            Ok((
                (),
                vec![EventKind::ProposalChangeRequested {
                    proposal_id: proposal_id.clone(),
                    requested_by: acting_party.clone(),
                    reason: reason.clone(),
                }],
            ))
        })?;
        Ok(record)
    }

    /// Cancel a confirmed meeting, reopening the negotiation window.
    pub fn cancel(
        &self,
        proposal_id: &ProposalId,
        acting_party: Party,
        expected_version: Option<u64>,
    ) -> Result<ApplicationRecord, CoordinationError> {
        let application_id = self.application_for_proposal(proposal_id)?;
        let (record, ()) = self.mutate(&application_id, expected_version, |record| {
            record.application.ensure_mutable()?;
            if let Some(resident_id) = acting_party.resident() {
                self.require_member(&record.application.household_id, resident_id)?;
            }
            let proposal = record
                .proposal_mut(proposal_id)
                .ok_or(RepositoryError::NotFound)?;
            proposal.cancel()?;
            info!(
                application_id = %record.application.id,
                proposal_id = %proposal_id,
                "confirmed meeting cancelled"
            );
            Ok((
                (),
                vec![EventKind::ProposalCancelled {
                    proposal_id: proposal_id.clone(),
                    cancelled_by: acting_party.clone(),
                }],
            ))
        })?;
        Ok(record)
    }

    /// Append a free-text message to the thread timeline.
    pub fn post_message(
        &self,
        application_id: &ApplicationId,
        sender: Party,
        body: String,
    ) -> Result<(ApplicationRecord, ConversationEvent), CoordinationError> {
        if body.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let (record, ()) = self.mutate(application_id, None, |record| {
            record.application.ensure_mutable()?;
            if let Some(resident_id) = sender.resident() {
                self.require_member(&record.application.household_id, resident_id)?;
            }
            Ok((
                (),
                vec![EventKind::Message {
                    sender: sender.clone(),
                    body: body.clone(),
                }],
            ))
        })?;
        let event = record
            .log
            .events()
            .last()
            .cloned()
            .ok_or_else(|| RepositoryError::Unavailable("journal lost an append".to_string()))?;
        Ok((record, event))
    }

    /// Run the slot resolver over caller-supplied availability calendars.
    pub fn resolve_slots(
        &self,
        application_id: &ApplicationId,
        availabilities: &ResidentAvailability,
        from: NaiveDate,
        lookahead_days: Option<u16>,
    ) -> Result<Vec<TimeSlot>, CoordinationError> {
        if self.store.fetch(application_id)?.is_none() {
            return Err(RepositoryError::NotFound.into());
        }
        let mut window: SlotWindow = self.config.slots;
        if let Some(days) = lookahead_days {
            window.lookahead_days = days;
        }
        Ok(slots::resolve(availabilities, &window, from))
    }

    /// Fetch a thread with its tally for API responses.
    pub fn get(
        &self,
        application_id: &ApplicationId,
    ) -> Result<(ApplicationRecord, usize), CoordinationError> {
        let record = self
            .store
            .fetch(application_id)?
            .ok_or(RepositoryError::NotFound)?;
        let residents = self.directory.residents(&record.application.household_id)?;
        Ok((record, residents.len()))
    }

    pub fn view(&self, application_id: &ApplicationId) -> Result<ApplicationView, CoordinationError> {
        let (record, total_residents) = self.get(application_id)?;
        Ok(record.view(total_residents))
    }

    /// Paginated conversation log read, oldest first.
    pub fn events(
        &self,
        application_id: &ApplicationId,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<ConversationEvent>, CoordinationError> {
        let record = self
            .store
            .fetch(application_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record.log.read_after(after.unwrap_or(0), limit).to_vec())
    }

    /// Resolve the thread a proposal belongs to.
    pub fn application_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<ApplicationId, CoordinationError> {
        let record = self
            .store
            .fetch_by_proposal(proposal_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record.application.id.clone())
    }
}

/// Error raised by the coordination service.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Notification(#[from] NotifyError),
}
