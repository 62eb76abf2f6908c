//! Content Validator - Checks formatted content against platform capabilities
//!
//! Adapters call this before every publish, schedule and update so that
//! content a platform would reject fails fast with field-level errors instead
//! of a remote error.
//!
//! # Example
//!
//! ```
//! use platform_publisher::core::{ContentItem, FormatOptions, PlatformCapabilities, format_for_platform};
//! use platform_publisher::validation::ContentValidator;
//!
//! let caps = PlatformCapabilities::default();
//! let item = ContentItem::new("post-1", "Hello", "<p>World</p>");
//! let formatted = format_for_platform(&item, "blog", &caps, &FormatOptions::default());
//!
//! let result = ContentValidator::new().validate(&formatted, &caps);
//! assert!(result.valid);
//! ```

use crate::core::capabilities::PlatformCapabilities;
use crate::core::content::FormattedContent;
use crate::core::traits::{ValidationError, ValidationResult, ValidationWarning};

/// Validator for formatted content
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentValidator;

impl ContentValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate formatted content against a platform's capabilities
    pub fn validate(&self, content: &FormattedContent, caps: &PlatformCapabilities) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.validate_text(content, caps, &mut errors, &mut warnings);
        self.validate_terms(content, caps, &mut errors, &mut warnings);
        self.validate_media(content, caps, &mut errors);

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn validate_text(
        &self,
        content: &FormattedContent,
        caps: &PlatformCapabilities,
        errors: &mut Vec<ValidationError>,
        warnings: &mut Vec<ValidationWarning>,
    ) {
        let title_length = content.title.chars().count();
        if content.title.trim().is_empty() {
            errors.push(ValidationError::new("title", "Title is required"));
        } else if title_length > caps.max_title_length {
            errors.push(ValidationError::new(
                "title",
                format!(
                    "Title is {} characters; limit is {}",
                    title_length, caps.max_title_length
                ),
            ));
        }

        let body_length = content.body.chars().count();
        if content.body.trim().is_empty() {
            errors.push(ValidationError::new("body", "Body is required"));
        } else if body_length > caps.max_content_length {
            errors.push(ValidationError::new(
                "body",
                format!(
                    "Body is {} characters; limit is {}",
                    body_length, caps.max_content_length
                ),
            ));
        }

        if !caps.supported_formats.contains(&content.body_format) {
            errors.push(ValidationError::new(
                "body_format",
                format!("Body format {:?} is not supported", content.body_format),
            ));
        }

        let excerpt_length = content.excerpt.chars().count();
        if content.excerpt.trim().is_empty() {
            warnings.push(ValidationWarning::new("excerpt", "Excerpt is empty"));
        } else if excerpt_length > caps.max_description_length {
            errors.push(ValidationError::new(
                "excerpt",
                format!(
                    "Excerpt is {} characters; limit is {}",
                    excerpt_length, caps.max_description_length
                ),
            ));
        }
    }

    fn validate_terms(
        &self,
        content: &FormattedContent,
        caps: &PlatformCapabilities,
        errors: &mut Vec<ValidationError>,
        warnings: &mut Vec<ValidationWarning>,
    ) {
        let tags = &content.metadata.tags;
        if !tags.is_empty() {
            if !caps.supports_tags {
                warnings.push(ValidationWarning::new(
                    "tags",
                    "Platform does not support tags; they will be ignored",
                ));
            } else if let Some(max_tags) = caps.max_tags
                && tags.len() > max_tags
            {
                errors.push(ValidationError::new(
                    "tags",
                    format!("{} tags given; limit is {}", tags.len(), max_tags),
                ));
            }
        }

        if !content.metadata.categories.is_empty() && !caps.supports_categories {
            warnings.push(ValidationWarning::new(
                "categories",
                "Platform does not support categories; they will be ignored",
            ));
        }
    }

    fn validate_media(
        &self,
        content: &FormattedContent,
        caps: &PlatformCapabilities,
        errors: &mut Vec<ValidationError>,
    ) {
        for (i, media) in content.media.iter().enumerate() {
            if !caps.supports_media(media.media_type) {
                errors.push(ValidationError::new(
                    format!("media[{}]", i),
                    format!("Media type {:?} is not supported", media.media_type),
                ));
            }
        }

        if let Some(max_media) = caps.max_media_items
            && content.media.len() > max_media
        {
            errors.push(ValidationError::new(
                "media",
                format!("{} media items given; limit is {}", content.media.len(), max_media),
            ));
        }
    }
}
