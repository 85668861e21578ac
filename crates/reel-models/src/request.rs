//! Render request descriptor.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::encoding::{DEFAULT_DURATION_MS, DEFAULT_FRAME_RATE};

/// Template used when the request does not name one.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Describes which article to render and with which template.
///
/// The identifying fields are opaque strings; they are only checked for
/// presence and sane length. Missing fields deserialize to empty strings so
/// that validation, not JSON parsing, reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    /// Publishing site key (e.g. "aje")
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "site is required"))]
    pub site: String,

    /// Article slug
    #[serde(default)]
    #[validate(length(min = 1, max = 512, message = "slug is required"))]
    pub slug: String,

    /// Content type of the article (post, liveblog, ...)
    #[serde(default)]
    #[validate(length(min = 1, max = 64, message = "postType is required"))]
    pub post_type: String,

    /// Template name
    #[serde(default = "default_template")]
    #[validate(length(min = 1, max = 64, message = "template must not be empty"))]
    pub template: String,

    /// Recording length override in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1000, max = 60000, message = "durationMs must be between 1000 and 60000"))]
    pub duration_ms: Option<u64>,

    /// Frame rate override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 60, message = "frameRate must be between 1 and 60"))]
    pub frame_rate: Option<u32>,
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

impl RenderRequest {
    /// Create a request with default timing.
    pub fn new(
        site: impl Into<String>,
        slug: impl Into<String>,
        post_type: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            site: site.into(),
            slug: slug.into(),
            post_type: post_type.into(),
            template: template.into(),
            duration_ms: None,
            frame_rate: None,
        }
    }

    /// Recording length, falling back to the default.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms.unwrap_or(DEFAULT_DURATION_MS)
    }

    /// Frame rate, falling back to the default.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate.unwrap_or(DEFAULT_FRAME_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request() {
        let req = RenderRequest::new("aje", "x", "post", "default");
        assert!(req.validate().is_ok());
        assert_eq!(req.duration_ms(), 10_000);
        assert_eq!(req.frame_rate(), 25);
    }

    #[test]
    fn test_missing_fields_fail_validation() {
        let req: RenderRequest = serde_json::from_str(r#"{"site":"aje"}"#).unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("slug"));
        assert!(!fields.contains_key("site"));
        assert_eq!(fields.len(), 2);
        assert_eq!(req.template, "default");
    }

    #[test]
    fn test_camel_case_wire_format() {
        let req: RenderRequest = serde_json::from_str(
            r#"{"site":"aje","slug":"x","postType":"liveblog","durationMs":5000,"frameRate":30}"#,
        )
        .unwrap();
        assert_eq!(req.post_type, "liveblog");
        assert_eq!(req.duration_ms(), 5000);
        assert_eq!(req.frame_rate(), 30);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_timing_rejected() {
        let mut req = RenderRequest::new("aje", "x", "post", "default");
        req.frame_rate = Some(0);
        assert!(req.validate().is_err());

        req.frame_rate = None;
        req.duration_ms = Some(120_000);
        assert!(req.validate().is_err());
    }
}
