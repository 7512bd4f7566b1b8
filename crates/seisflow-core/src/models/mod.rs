pub mod project;
pub mod submission;
pub mod token;

pub use project::{PlotLimits, Priority, ProjectCreated, ProjectDescriptor, ProjectStatus};
pub use submission::{FieldValue, SubmissionId, SubmissionRecord, Submitter};
pub use token::{AuthState, TokenPair, TokenResponse};
