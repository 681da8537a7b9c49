//! In-memory job registry
//!
//! Every job gets a [`JobRecord`] holding its scalar state and a
//! single-consumer event feed. The id→record map is the only structure shared
//! across jobs; the store synchronizes it internally.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{JobEvent, JobKind, JobOutput, JobStatus, JobStatusResponse};

pub type SharedJobStore = Arc<JobStore>;

type EventReceiver = mpsc::UnboundedReceiver<JobEvent>;

/// Genera un id opaco per un nuovo job
pub fn new_job_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Stato scalare di un job, scritto solo dal runner che lo possiede
#[derive(Debug, Clone)]
pub struct JobState {
    pub status: JobStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub result: Option<JobOutput>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            status: JobStatus::Queued,
            progress: 0,
            message: None,
            result: None,
            finished_at: None,
        }
    }
}

pub struct JobRecord {
    id: String,
    kind: JobKind,
    created_at: DateTime<Utc>,
    state: StdRwLock<JobState>,
    // true dopo l'evento terminale
    sealed: AtomicBool,
    events_tx: mpsc::UnboundedSender<JobEvent>,
    events_rx: Arc<Mutex<EventReceiver>>,
}

impl std::fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl JobRecord {
    fn new(id: String, kind: JobKind) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            id,
            kind,
            created_at: Utc::now(),
            state: StdRwLock::new(JobState::default()),
            sealed: AtomicBool::new(false),
            events_tx,
            events_rx: Arc::new(Mutex::new(events_rx)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn snapshot(&self) -> JobState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status_response(&self) -> JobStatusResponse {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        JobStatusResponse {
            id: self.id.clone(),
            status: state.status,
            progress: state.progress,
            message: state.message.clone(),
        }
    }

    pub fn result(&self) -> Option<JobOutput> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .result
            .clone()
    }

    fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .finished_at
    }

    /// Porta il job a una milestone intermedia e restituisce l'evento da pubblicare
    pub(crate) fn advance(&self, status: JobStatus, progress: u8) -> JobEvent {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // la progress non scende mai
        state.progress = state.progress.max(progress.min(99));
        state.status = status;
        let message = format!("{} ({}%)", status, state.progress);
        state.message = Some(message.clone());
        JobEvent::progress(status, state.progress, message)
    }

    pub(crate) fn complete(&self, output: JobOutput) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.status = JobStatus::Completed;
        state.progress = 100;
        state.message = Some(format!("{} (100%)", JobStatus::Completed));
        state.result = Some(output);
        state.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&self, message: String) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.status = JobStatus::Failed;
        state.message = Some(message);
        state.result = None;
        state.finished_at = Some(Utc::now());
    }

    fn push(&self, event: JobEvent) {
        if self.sealed.load(Ordering::Acquire) {
            tracing::warn!("Evento scartato dopo lo stato terminale: job_id={}", self.id);
            return;
        }
        if event.is_terminal() {
            self.sealed.store(true, Ordering::Release);
        }
        // Il receiver vive quanto il record: l'invio fallisce solo se il record è stato rimosso
        let _ = self.events_tx.send(event);
    }
}

/// Accesso esclusivo al feed eventi di un job
///
/// Finché la subscription è viva nessun altro lettore può agganciarsi allo
/// stesso job; al drop il feed torna disponibile con gli eventi non letti.
pub struct EventSubscription {
    job_id: String,
    rx: OwnedMutexGuard<EventReceiver>,
}

impl EventSubscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Prossimo evento in ordine FIFO; `None` se il job non esiste più
    pub async fn next(&mut self) -> Option<JobEvent> {
        self.rx.recv().await
    }
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, Arc<JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un nuovo job in stato `queued` con progress 0
    pub async fn create(&self, id: &str, kind: JobKind) -> Result<Arc<JobRecord>> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(id) {
            return Err(AppError::Internal(format!("Id job duplicato: {}", id)));
        }
        let record = Arc::new(JobRecord::new(id.to_string(), kind));
        jobs.insert(id.to_string(), record.clone());
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<JobRecord>> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Accoda un evento sul feed del job; nessun effetto se il job non esiste
    pub async fn push_event(&self, id: &str, event: JobEvent) {
        if let Some(record) = self.get(id).await {
            record.push(event);
        }
    }

    /// Attende e rimuove il prossimo evento; `None` (fine stream) per id sconosciuti
    pub async fn next_event(&self, id: &str) -> Option<JobEvent> {
        let rx = self.get(id).await?.events_rx.clone();
        let mut rx = rx.lock().await;
        rx.recv().await
    }

    /// Aggancia l'unico lettore ammesso al feed del job
    pub async fn subscribe(&self, id: &str) -> Result<EventSubscription> {
        let record = self
            .get(id)
            .await
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;
        let rx = record
            .events_rx
            .clone()
            .try_lock_owned()
            .map_err(|_| AppError::StreamBusy(id.to_string()))?;
        Ok(EventSubscription {
            job_id: id.to_string(),
            rx,
        })
    }

    /// Rimuove i job terminati da più di `retention`; restituisce quanti ne ha rimossi
    pub async fn purge_finished(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, record| !record.finished_at().is_some_and(|at| at <= cutoff));
        before - jobs.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
