pub mod application_flow;

pub use application_flow::ApplicationFlow;
