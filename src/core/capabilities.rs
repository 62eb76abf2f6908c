//! Platform capability descriptors
//!
//! Static data describing what one destination platform supports. A
//! descriptor is set once when an adapter is constructed and never changes.

use serde::{Deserialize, Serialize};

/// Media kinds a platform may accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Document,
}

/// Body markup understood by a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    #[default]
    Html,
    Markdown,
    Plain,
}

/// Optional features gated by capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Scheduling,
    Drafts,
    Updates,
    Deletion,
    Analytics,
    Categories,
    Tags,
    BulkOperations,
}

impl Capability {
    /// Operation name used in "not supported" errors
    pub fn operation(&self) -> &'static str {
        match self {
            Capability::Scheduling => "scheduling",
            Capability::Drafts => "drafts",
            Capability::Updates => "updates",
            Capability::Deletion => "deletion",
            Capability::Analytics => "analytics",
            Capability::Categories => "categories",
            Capability::Tags => "tags",
            Capability::BulkOperations => "bulk operations",
        }
    }
}

/// Immutable descriptor of one platform's limits and feature flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCapabilities {
    /// Maximum body length in characters
    pub max_content_length: usize,
    /// Maximum title length in characters
    pub max_title_length: usize,
    /// Maximum excerpt/description length in characters
    pub max_description_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tags: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_media_items: Option<usize>,
    pub supported_media_types: Vec<MediaType>,
    pub supported_formats: Vec<BodyFormat>,
    pub supports_scheduling: bool,
    pub supports_drafts: bool,
    pub supports_updates: bool,
    pub supports_deletion: bool,
    pub supports_analytics: bool,
    pub supports_categories: bool,
    pub supports_tags: bool,
    pub supports_bulk_operations: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            max_content_length: 100_000,
            max_title_length: 200,
            max_description_length: 300,
            max_tags: None,
            max_media_items: None,
            supported_media_types: vec![MediaType::Image],
            supported_formats: vec![BodyFormat::Html],
            supports_scheduling: false,
            supports_drafts: false,
            supports_updates: false,
            supports_deletion: false,
            supports_analytics: false,
            supports_categories: false,
            supports_tags: false,
            supports_bulk_operations: false,
        }
    }
}

impl PlatformCapabilities {
    /// Descriptor with every optional feature enabled
    pub fn full() -> Self {
        Self {
            supported_media_types: vec![
                MediaType::Image,
                MediaType::Video,
                MediaType::Audio,
                MediaType::Document,
            ],
            supported_formats: vec![BodyFormat::Html, BodyFormat::Markdown, BodyFormat::Plain],
            supports_scheduling: true,
            supports_drafts: true,
            supports_updates: true,
            supports_deletion: true,
            supports_analytics: true,
            supports_categories: true,
            supports_tags: true,
            supports_bulk_operations: true,
            ..Self::default()
        }
    }

    /// Check a single feature flag
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Scheduling => self.supports_scheduling,
            Capability::Drafts => self.supports_drafts,
            Capability::Updates => self.supports_updates,
            Capability::Deletion => self.supports_deletion,
            Capability::Analytics => self.supports_analytics,
            Capability::Categories => self.supports_categories,
            Capability::Tags => self.supports_tags,
            Capability::BulkOperations => self.supports_bulk_operations,
        }
    }

    pub fn supports_media(&self, media_type: MediaType) -> bool {
        self.supported_media_types.contains(&media_type)
    }

    /// Preferred body format: the requested one if supported, otherwise the
    /// platform's first listed format
    pub fn preferred_format(&self, requested: Option<BodyFormat>) -> BodyFormat {
        match requested {
            Some(format) if self.supported_formats.contains(&format) => format,
            _ => self
                .supported_formats
                .first()
                .copied()
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capabilities_disable_optional_features() {
        let caps = PlatformCapabilities::default();

        assert!(!caps.supports(Capability::Scheduling));
        assert!(!caps.supports(Capability::Deletion));
        assert!(caps.supports_media(MediaType::Image));
        assert!(!caps.supports_media(MediaType::Video));
    }

    #[test]
    fn test_full_capabilities() {
        let caps = PlatformCapabilities::full();

        for capability in [
            Capability::Scheduling,
            Capability::Drafts,
            Capability::Updates,
            Capability::Deletion,
            Capability::Analytics,
            Capability::Categories,
            Capability::Tags,
            Capability::BulkOperations,
        ] {
            assert!(caps.supports(capability), "{:?} should be supported", capability);
        }
    }

    #[test]
    fn test_preferred_format_falls_back() {
        let caps = PlatformCapabilities {
            supported_formats: vec![BodyFormat::Markdown],
            ..PlatformCapabilities::default()
        };

        assert_eq!(caps.preferred_format(Some(BodyFormat::Html)), BodyFormat::Markdown);
        assert_eq!(caps.preferred_format(Some(BodyFormat::Markdown)), BodyFormat::Markdown);
        assert_eq!(caps.preferred_format(None), BodyFormat::Markdown);
    }

    #[test]
    fn test_capabilities_deserialize_camel_case() {
        let yaml = r#"
maxContentLength: 500
maxTitleLength: 80
maxDescriptionLength: 120
maxTags: 5
supportedMediaTypes: [image, video]
supportedFormats: [markdown]
supportsScheduling: true
supportsDrafts: true
supportsUpdates: false
supportsDeletion: false
supportsAnalytics: false
supportsCategories: false
supportsTags: true
supportsBulkOperations: false
"#;
        let caps: PlatformCapabilities = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(caps.max_content_length, 500);
        assert_eq!(caps.max_tags, Some(5));
        assert!(caps.supports_media(MediaType::Video));
        assert!(caps.supports(Capability::Scheduling));
    }
}
