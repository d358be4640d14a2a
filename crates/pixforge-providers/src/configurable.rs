//! Configurable HTTP provider
//!
//! A generic provider driven by a [`PluginManifest`]: it renders a JSON body
//! template, calls the configured endpoint and collects result URLs from the
//! response using simple path notation.

use crate::manifest::{EndpointSpec, HttpMethod, PluginManifest};
use crate::provider::{ImageProvider, GENERATE_AND_FACE_SWAP, GENERATE_ONLY};
use async_trait::async_trait;
use pixforge_core::{Capability, Error, GenerationRequest, ProviderOutcome, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Per-call timeout when the manifest sets none
pub const DEFAULT_PLUGIN_TIMEOUT_SECS: u64 = 120;

/// Placeholder replaced by the full image URL array
const IMAGE_URLS_PLACEHOLDER: &str = "{{image_urls}}";

/// Provider backed by a declarative HTTP/JSON manifest
#[derive(Debug, Clone)]
pub struct ConfigurableProvider {
    name: String,
    manifest: PluginManifest,
    client: reqwest::Client,
}

impl ConfigurableProvider {
    /// Build a provider from a parsed manifest
    pub fn new(name: impl Into<String>, manifest: PluginManifest) -> Result<Self> {
        let name = name.into();
        if manifest.generate.is_none() {
            return Err(Error::config(format!(
                "plugin '{}' has no generate section",
                name
            )));
        }

        let timeout = manifest.timeout_secs.unwrap_or(DEFAULT_PLUGIN_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name,
            manifest,
            client,
        })
    }

    async fn call(&self, spec: &EndpointSpec, vars: &TemplateVars<'_>) -> Result<Value> {
        let body = render_template(&spec.body, vars);

        let mut request = match spec.method {
            HttpMethod::Post => self.client.post(&spec.endpoint),
            HttpMethod::Put => self.client.put(&spec.endpoint),
        };

        if let Some(env_name) = &spec.api_key_env {
            let key = std::env::var(env_name).map_err(|_| {
                Error::config(format!("environment variable {} is not set", env_name))
            })?;
            request = match &spec.auth_header {
                Some(header) => request.header(header.as_str(), key),
                None => request.bearer_auth(key),
            };
        }

        for (header, value) in &spec.headers {
            request = request.header(header.as_str(), value.as_str());
        }

        debug!(plugin = %self.name, endpoint = %spec.endpoint, "Calling provider endpoint");

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::provider(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::provider(format!("failed reading response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::provider(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_text(&text, 300)
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::provider(format!("response is not JSON: {}", e)))
    }
}

#[async_trait]
impl ImageProvider for ConfigurableProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        if self.manifest.swap_face.is_some() {
            GENERATE_AND_FACE_SWAP
        } else {
            GENERATE_ONLY
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderOutcome {
        let Some(spec) = &self.manifest.generate else {
            return ProviderOutcome::failure("no generate endpoint configured");
        };

        let vars = TemplateVars::for_request(request);
        match self.call(spec, &vars).await {
            Ok(response) => ProviderOutcome::Success(result_urls(&response, spec)),
            Err(e) => ProviderOutcome::failure(e.to_string()),
        }
    }

    async fn swap_face(&self, source_url: &str, face_url: &str) -> Result<String> {
        let Some(spec) = &self.manifest.swap_face else {
            return Err(Error::unsupported(format!(
                "provider '{}' does not support face swap",
                self.name
            )));
        };

        let vars = TemplateVars {
            source_url,
            face_url,
            ..TemplateVars::default()
        };
        let response = self.call(spec, &vars).await?;
        result_urls(&response, spec)
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider("face swap response contained no URL"))
    }
}

/// Values substituted into body templates
#[derive(Debug, Default)]
pub(crate) struct TemplateVars<'a> {
    prompt: &'a str,
    size: &'a str,
    aspect_ratio: &'a str,
    image_urls: &'a [String],
    source_url: &'a str,
    face_url: &'a str,
}

impl<'a> TemplateVars<'a> {
    fn for_request(request: &'a GenerationRequest) -> Self {
        Self {
            prompt: &request.prompt,
            size: &request.size,
            aspect_ratio: &request.aspect_ratio,
            image_urls: &request.image_urls,
            ..Self::default()
        }
    }

    fn substitute(&self, text: &str) -> String {
        text.replace("{{prompt}}", self.prompt)
            .replace("{{size}}", self.size)
            .replace("{{aspect_ratio}}", self.aspect_ratio)
            .replace("{{source_url}}", self.source_url)
            .replace("{{face_url}}", self.face_url)
    }
}

/// Render a JSON template.
///
/// A string that is exactly `{{image_urls}}` becomes the URL array; other
/// placeholders are substituted inside strings.
pub(crate) fn render_template(template: &Value, vars: &TemplateVars<'_>) -> Value {
    match template {
        Value::String(text) if text.trim() == IMAGE_URLS_PLACEHOLDER => Value::Array(
            vars.image_urls
                .iter()
                .map(|url| Value::String(url.clone()))
                .collect(),
        ),
        Value::String(text) => Value::String(vars.substitute(text)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_template(item, vars))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), render_template(value, vars)))
                .collect(),
        ),
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    }
}

fn result_urls(response: &Value, spec: &EndpointSpec) -> Vec<String> {
    let root = match &spec.result_path {
        Some(path) => match extract_path(response, path) {
            Some(value) => value,
            None => return Vec::new(),
        },
        None => response,
    };

    let mut urls = Vec::new();
    collect_urls(root, &mut urls);
    urls
}

/// Extract value from JSON using a simple path notation
/// ("data.images", "output[0].url")
pub(crate) fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.').filter(|part| !part.is_empty()) {
        if let Some(bracket_pos) = part.find('[') {
            let key = &part[..bracket_pos];
            let index_str = part[bracket_pos + 1..].trim_end_matches(']');

            if !key.is_empty() {
                current = current.get(key)?;
            }

            let index: usize = index_str.parse().ok()?;
            current = current.get(index)?;
        } else {
            current = current.get(part)?;
        }
    }

    Some(current)
}

/// Collect every distinct http(s) URL under `value`, in document order
pub(crate) fn collect_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if (trimmed.starts_with("http://") || trimmed.starts_with("https://"))
                && !out.iter().any(|existing| existing == trimmed)
            {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_urls(item, out);
            }
        }
        Value::Object(fields) => {
            for item in fields.values() {
                collect_urls(item, out);
            }
        }
        _ => {}
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_template() {
        let urls = vec!["http://a/1.jpg".to_string(), "http://a/2.jpg".to_string()];
        let request = GenerationRequest::new("a red fox")
            .with_images(urls.clone())
            .with_size("4K");
        let vars = TemplateVars::for_request(&request);

        let template = json!({
            "prompt": "{{prompt}}",
            "images": "{{image_urls}}",
            "options": {"size": "{{size}}", "ratio": "{{aspect_ratio}}", "n": 1}
        });
        let rendered = render_template(&template, &vars);

        assert_eq!(rendered["prompt"], "a red fox");
        assert_eq!(rendered["images"], json!(urls));
        assert_eq!(rendered["options"]["size"], "4K");
        assert_eq!(rendered["options"]["ratio"], "auto");
        assert_eq!(rendered["options"]["n"], 1);
    }

    #[test]
    fn test_empty_template_renders_object() {
        let vars = TemplateVars::default();
        assert_eq!(render_template(&Value::Null, &vars), json!({}));
    }

    #[test]
    fn test_extract_path() {
        let value = json!({"data": {"output": [{"url": "http://x/r.jpg"}]}});
        assert_eq!(
            extract_path(&value, "data.output[0].url"),
            Some(&json!("http://x/r.jpg"))
        );
        assert!(extract_path(&value, "data.missing").is_none());
        assert!(extract_path(&value, "data.output[3]").is_none());
    }

    #[test]
    fn test_collect_urls_dedups_and_filters() {
        let value = json!({
            "images": ["http://x/a.jpg", " http://x/a.jpg ", "not-a-url"],
            "meta": {"thumb": "https://x/b.jpg", "count": 2}
        });
        let mut urls = Vec::new();
        collect_urls(&value, &mut urls);
        urls.sort();
        assert_eq!(urls, vec!["http://x/a.jpg", "https://x/b.jpg"]);
    }

    #[test]
    fn test_capabilities_follow_manifest() {
        let generate_only = PluginManifest::from_yaml(
            "generate:\n  endpoint: https://api.test/gen\n",
        )
        .unwrap();
        let provider = ConfigurableProvider::new("p", generate_only).unwrap();
        assert!(provider.supports(Capability::Generate));
        assert!(!provider.supports(Capability::FaceSwap));

        let with_swap = PluginManifest::from_yaml(
            "generate:\n  endpoint: https://api.test/gen\nswap_face:\n  endpoint: https://api.test/swap\n",
        )
        .unwrap();
        let provider = ConfigurableProvider::new("p", with_swap).unwrap();
        assert!(provider.supports(Capability::FaceSwap));
    }

    #[test]
    fn test_requires_generate_section() {
        let manifest = PluginManifest::from_yaml("timeout_secs: 5\n").unwrap();
        assert!(ConfigurableProvider::new("p", manifest).is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_failure() {
        let manifest = PluginManifest::from_yaml(
            "generate:\n  endpoint: https://api.test/gen\n  api_key_env: PIXFORGE_TEST_UNSET_KEY_9F2\n",
        )
        .unwrap();
        let provider = ConfigurableProvider::new("p", manifest).unwrap();
        let outcome = provider.generate(&GenerationRequest::new("x")).await;
        assert!(matches!(outcome, ProviderOutcome::Failure(reason) if reason.contains("PIXFORGE_TEST_UNSET_KEY_9F2")));
    }
}
