pub mod classifier;
pub mod edit;
pub mod genai;
pub mod runner;
pub mod store;
pub mod stream;

pub use classifier::{classify, extract_error_context, Classification, ErrorContext};
pub use edit::{EditOperation, ImageEdit, TextEdit};
pub use genai::{GenAiClient, ImageProvider};
pub use runner::{spawn_job, JobTask, Pacer};
pub use store::{new_job_id, JobStore, SharedJobStore};
pub use stream::event_stream;
