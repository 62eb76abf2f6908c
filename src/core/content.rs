//! Content model and platform formatting
//!
//! A [`ContentItem`] is the finished source produced upstream; it is never
//! mutated. Each adapter renders its own [`FormattedContent`] copy that fits
//! the platform's [`PlatformCapabilities`].

use crate::core::capabilities::{BodyFormat, MediaType, PlatformCapabilities};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Marker appended to truncated text
pub const ELLIPSIS: &str = "...";

/// Fraction of a length limit searched backwards for a word boundary
const WORD_BOUNDARY_WINDOW: f64 = 0.2;

lazy_static! {
    static ref BREAK_TAG: Regex = Regex::new(r"(?i)<br\s*/?>|</p>|</li>|</h[1-6]>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref HEADING_TAG: Regex = Regex::new(r"(?is)<h([1-6])[^>]*>(.*?)</h[1-6]>").unwrap();
    static ref STRONG_TAG: Regex = Regex::new(r"(?is)<(?:strong|b)>(.*?)</(?:strong|b)>").unwrap();
    static ref EM_TAG: Regex = Regex::new(r"(?is)<(?:em|i)>(.*?)</(?:em|i)>").unwrap();
    static ref LINK_TAG: Regex = Regex::new(r#"(?is)<a\s+[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#).unwrap();
    static ref LIST_ITEM_TAG: Regex = Regex::new(r"(?i)<li[^>]*>").unwrap();
    static ref MD_HEADING: Regex = Regex::new(r"(?m)^#{1,6}\s+").unwrap();
    static ref MD_EMPHASIS: Regex = Regex::new(r"\*{1,2}([^*]+)\*{1,2}").unwrap();
    static ref MD_LINK: Regex = Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap();
    static ref EXTRA_NEWLINES: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref NON_SLUG: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Descriptive metadata carried with a content item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Search-engine fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Reference to a media asset hosted elsewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaReference {
    pub url: String,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Finished source content handed to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub body_format: BodyFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub metadata: ContentMetadata,
    #[serde(default)]
    pub seo: SeoFields,
    #[serde(default)]
    pub media: Vec<MediaReference>,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            body_format: BodyFormat::default(),
            excerpt: None,
            metadata: ContentMetadata::default(),
            seo: SeoFields::default(),
            media: Vec::new(),
        }
    }
}

/// Options controlling how content is rendered for a platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOptions {
    /// Requested body format; ignored if the platform does not support it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_format: Option<BodyFormat>,
    #[serde(default = "default_include_media")]
    pub include_media: bool,
    /// Length of a generated excerpt when the source has none
    #[serde(default = "default_excerpt_length")]
    pub excerpt_length: usize,
    /// Tags appended to the source tags for this publish
    #[serde(default)]
    pub extra_tags: Vec<String>,
}

fn default_include_media() -> bool {
    true
}

fn default_excerpt_length() -> usize {
    160
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            body_format: None,
            include_media: default_include_media(),
            excerpt_length: default_excerpt_length(),
            extra_tags: Vec::new(),
        }
    }
}

/// Platform-adapted rendering of one content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedContent {
    pub platform: String,
    pub source_id: String,
    pub title: String,
    pub body: String,
    pub body_format: BodyFormat,
    pub excerpt: String,
    pub metadata: ContentMetadata,
    pub seo: SeoFields,
    pub media: Vec<MediaReference>,
    /// 0.0 means the content was published as written; 1.0 means it was
    /// heavily altered to fit the platform
    pub adaptation_score: f64,
    /// One note per alteration applied
    pub adaptations: Vec<String>,
    pub formatted_at: DateTime<Utc>,
}

/// Truncate `text` to at most `max_chars` characters
///
/// When truncation is needed the result ends with [`ELLIPSIS`]. The cut is
/// placed on the last whitespace inside the final 20% of the limit if one
/// exists; otherwise the text is cut hard. Returns the text and whether it
/// was truncated.
pub fn truncate_at_word_boundary(text: &str, max_chars: usize) -> (String, bool) {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return (text.to_string(), false);
    }

    let marker_len = ELLIPSIS.chars().count();
    if max_chars <= marker_len {
        return (chars[..max_chars].iter().collect(), true);
    }

    let available = max_chars - marker_len;
    let window = (max_chars as f64 * WORD_BOUNDARY_WINDOW).floor() as usize;
    let window_start = max_chars - window;

    let boundary = (window_start..=available)
        .rev()
        .find(|&i| chars[i].is_whitespace());
    let cut = boundary.unwrap_or(available);

    let kept: String = chars[..cut].iter().collect();
    (format!("{}{}", kept.trim_end(), ELLIPSIS), true)
}

/// URL slug derived from a title
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    NON_SLUG.replace_all(&lower, "-").trim_matches('-').to_string()
}

/// Convert a body between markup formats
pub fn convert_body(body: &str, from: BodyFormat, to: BodyFormat) -> String {
    match (from, to) {
        (a, b) if a == b => body.to_string(),
        (BodyFormat::Html, BodyFormat::Plain) => html_to_plain(body),
        (BodyFormat::Html, BodyFormat::Markdown) => html_to_markdown(body),
        (BodyFormat::Markdown, BodyFormat::Plain) => markdown_to_plain(body),
        (BodyFormat::Markdown, BodyFormat::Html) => markdown_to_html(body),
        (BodyFormat::Plain, BodyFormat::Html) => plain_to_html(body),
        (BodyFormat::Plain, BodyFormat::Markdown) => body.to_string(),
        _ => body.to_string(),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn collapse_newlines(text: &str) -> String {
    EXTRA_NEWLINES.replace_all(text, "\n\n").trim().to_string()
}

fn html_to_plain(html: &str) -> String {
    let with_breaks = BREAK_TAG.replace_all(html, "\n");
    let stripped = ANY_TAG.replace_all(&with_breaks, "");
    collapse_newlines(&decode_entities(&stripped))
}

fn html_to_markdown(html: &str) -> String {
    let text = HEADING_TAG.replace_all(html, |caps: &regex::Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("\n{} {}\n", "#".repeat(level), &caps[2])
    });
    let text = STRONG_TAG.replace_all(&text, "**$1**");
    let text = EM_TAG.replace_all(&text, "*$1*");
    let text = LINK_TAG.replace_all(&text, "[$2]($1)");
    let text = LIST_ITEM_TAG.replace_all(&text, "- ");
    html_to_plain(&text)
}

fn markdown_to_plain(markdown: &str) -> String {
    let text = MD_HEADING.replace_all(markdown, "");
    let text = MD_LINK.replace_all(&text, "$1");
    let text = MD_EMPHASIS.replace_all(&text, "$1");
    collapse_newlines(&text)
}

fn markdown_to_html(markdown: &str) -> String {
    markdown
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            let level = block.chars().take_while(|c| *c == '#').count();
            if (1..=6).contains(&level) && block[level..].starts_with(' ') {
                let heading = escape_html(block[level..].trim());
                format!("<h{level}>{heading}</h{level}>")
            } else {
                let inline = MD_LINK.replace_all(block, |caps: &regex::Captures| {
                    let whole = &caps[0];
                    let url_start = whole.find("](").map(|i| i + 2).unwrap_or(whole.len());
                    let url = whole[url_start..].trim_end_matches(')');
                    format!("<a href=\"{}\">{}</a>", url, &caps[1])
                });
                let inline = MD_EMPHASIS.replace_all(&inline, "<strong>$1</strong>");
                format!("<p>{}</p>", inline)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn plain_to_html(plain: &str) -> String {
    plain
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| format!("<p>{}</p>", escape_html(block).replace('\n', "<br/>")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_terms(terms: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    for term in terms {
        let term = term.trim().to_string();
        if !term.is_empty() && !seen.iter().any(|t| t.eq_ignore_ascii_case(&term)) {
            seen.push(term);
        }
    }
    seen
}

/// Render a content item within a platform's capability limits
///
/// This is the formatting routine shared by every adapter; adapters needing
/// platform-specific enrichment post-process its output.
pub fn format_for_platform(
    content: &ContentItem,
    platform: &str,
    capabilities: &PlatformCapabilities,
    options: &FormatOptions,
) -> FormattedContent {
    let mut adaptations = Vec::new();
    let mut score = 0.0_f64;

    // Title
    let (title, title_cut) = truncate_at_word_boundary(content.title.trim(), capabilities.max_title_length);
    if title_cut {
        adaptations.push(format!("title truncated to {} characters", capabilities.max_title_length));
        score += 0.15;
    }

    // Body format, then length
    let body_format = capabilities.preferred_format(options.body_format.or(Some(content.body_format)));
    let converted = convert_body(&content.body, content.body_format, body_format);
    if body_format != content.body_format {
        adaptations.push(format!("body converted to {:?}", body_format).to_lowercase());
        score += 0.05;
    }
    let original_len = converted.chars().count();
    let (body, body_cut) = truncate_at_word_boundary(&converted, capabilities.max_content_length);
    if body_cut {
        let kept = body.chars().count().saturating_sub(ELLIPSIS.len());
        let removed_ratio = 1.0 - kept as f64 / original_len.max(1) as f64;
        adaptations.push(format!(
            "body truncated to {} characters",
            capabilities.max_content_length
        ));
        score += 0.1 + 0.5 * removed_ratio;
    }

    // Excerpt
    let excerpt_limit = capabilities.max_description_length.min(options.excerpt_length.max(1));
    let excerpt_source = match &content.excerpt {
        Some(excerpt) if !excerpt.trim().is_empty() => excerpt.trim().to_string(),
        _ => {
            adaptations.push("excerpt generated from body".to_string());
            score += 0.05;
            convert_body(&content.body, content.body_format, BodyFormat::Plain)
                .replace('\n', " ")
        }
    };
    let (excerpt, excerpt_cut) = truncate_at_word_boundary(&excerpt_source, excerpt_limit);
    if excerpt_cut && content.excerpt.is_some() {
        adaptations.push(format!("excerpt truncated to {} characters", excerpt_limit));
        score += 0.05;
    }

    // Tags and categories
    let requested_tags = normalize_terms(
        content
            .metadata
            .tags
            .iter()
            .chain(options.extra_tags.iter())
            .cloned(),
    );
    let mut tags = requested_tags.clone();
    if !capabilities.supports_tags {
        tags.clear();
    } else if let Some(max_tags) = capabilities.max_tags {
        tags.truncate(max_tags);
    }
    if tags.len() < requested_tags.len() {
        adaptations.push(format!(
            "{} of {} tags dropped",
            requested_tags.len() - tags.len(),
            requested_tags.len()
        ));
        score += 0.1 * (requested_tags.len() - tags.len()) as f64 / requested_tags.len() as f64;
    }

    let mut categories = normalize_terms(content.metadata.categories.iter().cloned());
    if !capabilities.supports_categories && !categories.is_empty() {
        adaptations.push("categories dropped".to_string());
        categories.clear();
        score += 0.05;
    }

    // Media
    let media: Vec<MediaReference> = if options.include_media {
        let mut kept: Vec<MediaReference> = content
            .media
            .iter()
            .filter(|m| capabilities.supports_media(m.media_type))
            .cloned()
            .collect();
        if let Some(max_media) = capabilities.max_media_items {
            kept.truncate(max_media);
        }
        kept
    } else {
        Vec::new()
    };
    if media.len() < content.media.len() {
        adaptations.push(format!(
            "{} of {} media items dropped",
            content.media.len() - media.len(),
            content.media.len()
        ));
        score += 0.15 * (content.media.len() - media.len()) as f64 / content.media.len() as f64;
    }

    // SEO
    let mut seo = content.seo.clone();
    if let Some(description) = &seo.meta_description {
        let (description, _) = truncate_at_word_boundary(description, capabilities.max_description_length);
        seo.meta_description = Some(description);
    }

    let metadata = ContentMetadata {
        slug: Some(
            content
                .metadata
                .slug
                .clone()
                .unwrap_or_else(|| slugify(&content.title)),
        ),
        tags,
        categories,
        author: content.metadata.author.clone(),
        canonical_url: content.metadata.canonical_url.clone(),
        language: content.metadata.language.clone(),
    };

    FormattedContent {
        platform: platform.to_string(),
        source_id: content.id.clone(),
        title,
        body,
        body_format,
        excerpt,
        metadata,
        seo,
        media,
        adaptation_score: score.min(1.0),
        adaptations,
        formatted_at: Utc::now(),
    }
}
