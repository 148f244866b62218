use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use crate::workflows::coordination::domain::{
    ApplicantId, ApplicationId, HouseholdId, Party, ProposalId, ResidentId, SavedIntent,
    VoteChoice,
};
use crate::workflows::coordination::repository::{
    ApplicationRecord, CoordinationStore, DirectoryError, HouseholdDirectory, Notification,
    NotificationPublisher, NotifyError, RepositoryError,
};
use crate::workflows::coordination::router::coordination_router;
use crate::workflows::coordination::service::{CoordinationConfig, CoordinationService};

pub(super) type TestService = CoordinationService<MemoryStore, StaticDirectory, RecordingNotifier>;

pub(super) fn household() -> HouseholdId {
    HouseholdId::from("wg-linden")
}

pub(super) fn duo_household() -> HouseholdId {
    HouseholdId::from("wg-duo")
}

pub(super) fn applicant() -> ApplicantId {
    ApplicantId::from("cand-mia")
}

pub(super) fn anna() -> ResidentId {
    ResidentId::from("r-anna")
}

pub(super) fn ben() -> ResidentId {
    ResidentId::from("r-ben")
}

pub(super) fn cara() -> ResidentId {
    ResidentId::from("r-cara")
}

pub(super) fn dana() -> ResidentId {
    ResidentId::from("r-dana")
}

pub(super) fn elif() -> ResidentId {
    ResidentId::from("r-elif")
}

pub(super) fn resident_party(resident: ResidentId) -> Party {
    Party::Resident {
        resident_id: resident,
    }
}

pub(super) fn answer() -> String {
    "Quiet industrial design student, loves cooking for the flat.".to_string()
}

pub(super) fn answer_of_len(len: usize) -> String {
    "x".repeat(len)
}

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

pub(super) fn build_service() -> (Arc<TestService>, Arc<MemoryStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(MemoryStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let directory = Arc::new(StaticDirectory::seeded());
    let service = Arc::new(CoordinationService::new(
        store.clone(),
        directory,
        notifier.clone(),
        CoordinationConfig::default(),
    ));
    (service, store, notifier)
}

/// Submit a fresh pending application to the three-resident household.
pub(super) fn submit_pending(service: &TestService) -> ApplicationRecord {
    service
        .submit(applicant(), household(), answer())
        .expect("submission succeeds")
}

/// Submit and vote the application through to `Invited` (majority lock).
pub(super) fn invited_record(service: &TestService) -> ApplicationRecord {
    let record = submit_pending(service);
    service
        .cast_vote(&record.application.id, anna(), VoteChoice::Invite, None)
        .expect("first vote succeeds");
    let (record, _) = service
        .cast_vote(&record.application.id, ben(), VoteChoice::Invite, None)
        .expect("second vote succeeds");
    record
}

/// Invited application with a pending video proposal from the applicant.
pub(super) fn proposed_record(service: &TestService) -> (ApplicationRecord, ProposalId) {
    let record = invited_record(service);
    let (record, proposal_id) = service
        .propose(
            &record.application.id,
            Party::Applicant,
            date(2026, 8, 11),
            time(18, 0),
            45,
            crate::workflows::coordination::domain::MeetingFormat::Video,
            None,
            None,
        )
        .expect("proposal succeeds");
    (record, proposal_id)
}

pub(super) fn test_router(service: Arc<TestService>) -> axum::Router {
    coordination_router(service)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
    intents: Arc<Mutex<HashMap<(ApplicantId, HouseholdId), SavedIntent>>>,
}

impl MemoryStore {
    pub(super) fn record_count(&self) -> usize {
        self.records.lock().expect("store mutex poisoned").len()
    }

    pub(super) fn intent_count(&self) -> usize {
        self.intents.lock().expect("store mutex poisoned").len()
    }
}

impl CoordinationStore for MemoryStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        if guard.contains_key(&record.application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.application.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        if !guard.contains_key(&record.application.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(record.application.id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn fetch_by_proposal(
        &self,
        id: &ProposalId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .find(|record| record.proposal(id).is_some())
            .cloned())
    }

    fn upsert_intent(&self, intent: SavedIntent) -> Result<(), RepositoryError> {
        let mut guard = self.intents.lock().expect("store mutex poisoned");
        guard.insert(
            (intent.applicant_id.clone(), intent.household_id.clone()),
            intent,
        );
        Ok(())
    }

    fn fetch_intent(
        &self,
        applicant_id: &ApplicantId,
        household_id: &HouseholdId,
    ) -> Result<Option<SavedIntent>, RepositoryError> {
        let guard = self.intents.lock().expect("store mutex poisoned");
        Ok(guard
            .get(&(applicant_id.clone(), household_id.clone()))
            .cloned())
    }

    fn remove_intent(
        &self,
        applicant_id: &ApplicantId,
        household_id: &HouseholdId,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.intents.lock().expect("store mutex poisoned");
        guard.remove(&(applicant_id.clone(), household_id.clone()));
        Ok(())
    }
}

/// Membership directory seeded with a three-resident household (anna is
/// admin) and a two-resident household for deadlock scenarios.
pub(super) struct StaticDirectory {
    households: HashMap<HouseholdId, Vec<ResidentId>>,
    admins: HashSet<(HouseholdId, ResidentId)>,
}

impl StaticDirectory {
    pub(super) fn seeded() -> Self {
        let mut households = HashMap::new();
        households.insert(household(), vec![anna(), ben(), cara()]);
        households.insert(duo_household(), vec![dana(), elif()]);

        let mut admins = HashSet::new();
        admins.insert((household(), anna()));
        admins.insert((duo_household(), dana()));

        Self { households, admins }
    }
}

impl HouseholdDirectory for StaticDirectory {
    fn residents(&self, household_id: &HouseholdId) -> Result<Vec<ResidentId>, DirectoryError> {
        self.households
            .get(household_id)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownHousehold(household_id.clone()))
    }

    fn is_admin(
        &self,
        household_id: &HouseholdId,
        resident_id: &ResidentId,
    ) -> Result<bool, DirectoryError> {
        if !self.households.contains_key(household_id) {
            return Err(DirectoryError::UnknownHousehold(household_id.clone()));
        }
        Ok(self
            .admins
            .contains(&(household_id.clone(), resident_id.clone())))
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingNotifier {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub(super) fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .expect("notifier mutex poisoned")
            .clone()
    }
}

impl NotificationPublisher for RecordingNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        self.notifications
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

/// Store that fails every call, for exercising 500 paths.
pub(super) struct UnavailableStore;

impl CoordinationStore for UnavailableStore {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn update(&self, _record: ApplicationRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn fetch_by_proposal(
        &self,
        _id: &ProposalId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn upsert_intent(&self, _intent: SavedIntent) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn fetch_intent(
        &self,
        _applicant_id: &ApplicantId,
        _household_id: &HouseholdId,
    ) -> Result<Option<SavedIntent>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn remove_intent(
        &self,
        _applicant_id: &ApplicantId,
        _household_id: &HouseholdId,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }
}
