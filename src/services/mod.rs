pub mod answer_resolver;
pub mod circuit_breaker;
pub mod queue_manager;
pub mod unresolved_writer;
pub mod verifier;

pub use answer_resolver::{AnswerResolver, MatchTier, Resolution};
pub use circuit_breaker::{BreakerSignal, BreakerTransition, CircuitBreaker, Permit};
pub use queue_manager::QueueManager;
pub use unresolved_writer::UnresolvedWriter;
pub use verifier::{confirmation_rules, ConfirmationRules, Verifier};
