mod pipeline;
mod store;
mod types;
mod validate;

pub use pipeline::{EvolveOutcome, SelfEvolutionPipeline};
pub use store::VersionStore;
pub use types::{EvolutionFailure, EvolutionVersion, FailureReason, VersionStatus};
