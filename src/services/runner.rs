//! Ciclo di vita di un job: quattro milestone di avanzamento, poi l'operazione
//! vera e propria e un singolo evento terminale.
//!
//! Le pause tra le milestone sono sintetiche: servono solo a rendere visibile
//! l'avanzamento sul feed SSE e non riflettono lavoro reale.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::models::{JobEvent, JobKind, JobOutput, JobStatus};
use crate::services::classifier::{classify, extract_error_context};
use crate::services::edit::EditOperation;
use crate::services::store::SharedJobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub status: JobStatus,
    pub progress: u8,
}

/// Milestone in ordine; la seconda dipende dal tipo di job
pub fn milestones(kind: JobKind) -> [Milestone; 4] {
    let check = match kind {
        JobKind::Text => JobStatus::Validating,
        JobKind::Image => JobStatus::Uploading,
    };
    [
        Milestone {
            status: JobStatus::Queued,
            progress: 10,
        },
        Milestone {
            status: check,
            progress: 30,
        },
        Milestone {
            status: JobStatus::Processing,
            progress: 60,
        },
        Milestone {
            status: JobStatus::Finalizing,
            progress: 90,
        },
    ]
}

/// Pausa prima di ogni milestone
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub async fn tick(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(Duration::from_millis(600))
    }
}

/// Lavoro da eseguire più i metadati del file risultato
pub struct JobTask {
    pub operation: Box<dyn EditOperation>,
    pub file_name: Option<String>,
    pub mime: Option<String>,
}

impl JobTask {
    pub fn new(
        operation: Box<dyn EditOperation>,
        file_name: Option<String>,
        mime: Option<String>,
    ) -> Self {
        Self {
            operation,
            file_name,
            mime,
        }
    }
}

pub async fn run_job(store: SharedJobStore, job_id: String, task: JobTask, pacer: Pacer) {
    let Some(record) = store.get(&job_id).await else {
        tracing::warn!("Job {} non trovato, esecuzione annullata", job_id);
        return;
    };

    let kind = record.kind();
    tracing::info!("Avvio job {} ({})", job_id, kind);

    for milestone in milestones(kind) {
        pacer.tick().await;
        let event = record.advance(milestone.status, milestone.progress);
        store.push_event(&job_id, event).await;
    }

    let JobTask {
        operation,
        file_name,
        mime,
    } = task;

    match operation.execute().await {
        Ok(outcome) => {
            let size = outcome.data.len();
            record.complete(JobOutput {
                data: outcome.data,
                file_name,
                mime: mime.or(outcome.mime),
            });
            store.push_event(&job_id, JobEvent::Completed).await;
            tracing::info!("Job {} completato ({} bytes)", job_id, size);
        }
        Err(err) => {
            let classification = classify(err.as_ref());
            let context = extract_error_context(err.as_ref());
            tracing::error!(
                job_id = %job_id,
                kind = %classification.kind,
                context = %serde_json::to_string(&context).unwrap_or_default(),
                "Job fallito: {}",
                err
            );
            record.fail(classification.message.clone());
            store
                .push_event(
                    &job_id,
                    JobEvent::Failed {
                        message: classification.message,
                        kind: classification.kind,
                    },
                )
                .await;
        }
    }
}

/// Esegue il job in background, senza bloccare la richiesta che lo ha creato
pub fn spawn_job(store: SharedJobStore, job_id: String, task: JobTask, pacer: Pacer) -> JoinHandle<()> {
    tokio::spawn(run_job(store, job_id, task, pacer))
}
