pub mod capability_list;
pub mod job_status;
pub mod write_file;

pub use capability_list::CapabilityListCapability;
pub use job_status::JobStatusCapability;
pub use write_file::WriteFileCapability;
