//! Capability registry, background jobs and the built-in capabilities.

pub mod builtin;
pub mod jobs;
pub mod registry;

pub use builtin::{CapabilityListCapability, JobStatusCapability, WriteFileCapability};
pub use jobs::{JobCapability, JobRecord, JobRunner, JobState, JobStore};
pub use registry::{describe_definitions, CapabilityDefinition, CapabilityRegistry};
