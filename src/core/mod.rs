pub mod dynamic_fields;
pub mod error;
pub mod membership;
pub mod models;
pub mod orchestrator;
pub mod remote;
pub mod resolver;
pub mod session;
pub mod upload;

pub use error::{Result, UpgradeError};
pub use models::{ArtifactId, DeviceInternalId, JobId};
pub use orchestrator::{Orchestrator, RunFailure, RunPlan, RunReport, Stage};
pub use remote::{BackboxApi, HttpFailure, HttpReply, TransportError};
pub use session::{Session, login};
