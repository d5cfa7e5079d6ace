pub mod answer;
pub mod attempt;
pub mod form;
pub mod health;
pub mod loaders;
pub mod platform;
pub mod queue_item;
pub mod summary;

pub use answer::{normalize_signature, AnswerEntry, AnswerScope};
pub use attempt::{
    AttemptRecord, Confidence, EvidenceSnapshot, RunEvidence, RunOutcome, VerificationMethod,
};
pub use form::{FieldKind, FormField};
pub use health::{BreakerState, PlatformHealth};
pub use loaders::{load_all_job_seeds, load_answer_bank, load_job_seeds, JobSeed};
pub use platform::Platform;
pub use queue_item::{JobRef, QueueItem, QueueStatus};
pub use summary::{BatchSummary, ItemOutcome};
