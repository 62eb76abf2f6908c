pub mod credentials;

pub use credentials::{CredentialStore, CredentialType, PlatformCredentials, mask_secret};
