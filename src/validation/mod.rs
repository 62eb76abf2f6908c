pub mod content_validator;

pub use content_validator::ContentValidator;
