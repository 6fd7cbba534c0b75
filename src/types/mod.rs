//! Core entity types shared by the repository, engine and provider layers.

mod comparison;
mod file;
mod group;
mod progress;

pub use comparison::{ComparisonDuplicateFile, ComparisonResult};
pub use file::File;
pub use group::{DuplicateGroup, DuplicateGroupWithMembers, DuplicateStats};
pub use progress::{ComparisonPhase, JobStatus, OperationType, Progress, StepMetadata};
