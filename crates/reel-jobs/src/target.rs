//! Render target addresses.

use url::Url;

use reel_models::RenderRequest;

use crate::error::{JobsError, JobsResult};

/// Builds the address of the template page that renders a request.
///
/// `{base}/{template}/?site=..&slug=..&postType=..`
#[derive(Debug, Clone)]
pub struct TargetResolver {
    base: Url,
}

impl TargetResolver {
    pub fn new(base_url: &str) -> JobsResult<Self> {
        let base = Url::parse(base_url).map_err(|e| {
            JobsError::config_error(format!("invalid template base URL '{}': {}", base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(JobsError::config_error(format!(
                "template base URL '{}' cannot carry a path",
                base_url
            )));
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn resolve(&self, request: &RenderRequest) -> JobsResult<String> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| JobsError::config_error("template base URL cannot carry a path"))?
            .pop_if_empty()
            .push(&request.template)
            .push("");
        url.query_pairs_mut()
            .clear()
            .append_pair("site", &request.site)
            .append_pair("slug", &request.slug)
            .append_pair("postType", &request.post_type);
        Ok(url.into())
    }
}
