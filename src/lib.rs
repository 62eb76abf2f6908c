pub mod adapters;
pub mod core;
pub mod orchestration;
pub mod security;
pub mod validation;

pub use self::core::*;
pub use orchestration::{
    BulkPublishOptions, MultiPlatformPublishResult, MultiPublishOptions, PublishOrchestrator,
    ScheduleRequest,
};
pub use security::{CredentialStore, PlatformCredentials};
