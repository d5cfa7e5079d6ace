pub mod js_executor;
pub mod state_store;

pub use js_executor::JsExecutor;
pub use state_store::{PersistedState, StateStore};
