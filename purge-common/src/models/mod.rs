pub mod audit_log_entry;
pub mod connected_platform;
pub mod deletion_request;
pub mod job_registry_item;
pub mod throttleable_attempt;
pub mod user;
pub mod verification_code;
