pub mod orchestrator;
pub mod record;

pub use orchestrator::{SessionEvent, WorkflowOrchestrator};
pub use record::{WorkflowRecord, WorkflowStatus, WorkflowType};
