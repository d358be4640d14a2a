//! Image host backend (imgbb)

use super::{ImgBbConfig, UploadError, Uploader, UPLOAD_TIMEOUT};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Uploads with one multipart POST and reads `data.url` from the reply
#[derive(Debug, Clone)]
pub struct ImgBbUploader {
    config: ImgBbConfig,
    client: reqwest::Client,
}

impl ImgBbUploader {
    pub fn new(config: ImgBbConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Uploader for ImgBbUploader {
    fn backend(&self) -> &str {
        "imgbb"
    }

    async fn upload(&self, local_path: &Path, original_filename: &str) -> Result<String, UploadError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| UploadError::config("IMGBB_API_KEY is not set"))?;

        let bytes = tokio::fs::read(local_path).await?;
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(original_filename)
            .to_string();

        debug!("Uploading {} ({} bytes) to image host", file_name, bytes.len());

        let form = Form::new()
            .text("key", api_key.to_string())
            .part("image", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.as_u16() != 200 {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let url = parse_upload_url(&body)?;
        info!("Uploaded {} to image host", original_filename);
        Ok(url)
    }
}

fn parse_upload_url(body: &str) -> Result<String, UploadError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| UploadError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    value
        .pointer("/data/url")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| UploadError::MalformedResponse("missing data.url".to_string()))
}
