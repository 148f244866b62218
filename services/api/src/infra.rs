use chrono::NaiveDate;
use flatmatch::workflows::coordination::{
    ApplicantId, ApplicationId, ApplicationRecord, CoordinationConfig, CoordinationStore,
    DirectoryError, HouseholdDirectory, HouseholdId, Notification, NotificationPublisher,
    NotifyError, ProposalId, RepositoryError, ResidentId, SavedIntent,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryCoordinationStore {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
    intents: Arc<Mutex<HashMap<(ApplicantId, HouseholdId), SavedIntent>>>,
}

impl CoordinationStore for InMemoryCoordinationStore {
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
        if guard.contains_key(&record.application.id) {
            guard.insert(record.application.id.clone(), record);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
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

/// Directory backed by a static membership table. Stands in for the
/// profile system that owns households and resident identities.
pub(crate) struct StaticHouseholdDirectory {
    households: HashMap<HouseholdId, Vec<ResidentId>>,
    admins: HashSet<(HouseholdId, ResidentId)>,
}

impl StaticHouseholdDirectory {
    pub(crate) fn new() -> Self {
        Self {
            households: HashMap::new(),
            admins: HashSet::new(),
        }
    }

    pub(crate) fn with_household(
        mut self,
        household_id: HouseholdId,
        residents: Vec<ResidentId>,
        admins: Vec<ResidentId>,
    ) -> Self {
        for admin in &admins {
            self.admins.insert((household_id.clone(), admin.clone()));
        }
        self.households.insert(household_id, residents);
        self
    }
}

impl HouseholdDirectory for StaticHouseholdDirectory {
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

/// Placeholder directory until the profile service integration lands:
/// one three-resident household with a single admin.
pub(crate) fn demo_directory() -> StaticHouseholdDirectory {
    StaticHouseholdDirectory::new().with_household(
        HouseholdId::from("wg-sonnenallee"),
        vec![
            ResidentId::from("r-alex"),
            ResidentId::from("r-bo"),
            ResidentId::from("r-chris"),
        ],
        vec![ResidentId::from("r-alex")],
    )
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationPublisher {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        debug!(
            application_id = %notification.application_id,
            seq = notification.event.seq,
            "conversation event dispatched"
        );
        self.notifications
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .expect("notifier mutex poisoned")
            .clone()
    }
}

pub(crate) fn default_coordination_config() -> CoordinationConfig {
    CoordinationConfig::default()
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
