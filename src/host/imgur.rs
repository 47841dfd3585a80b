use std::path::Path;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::info;

use crate::error::UploadError;
use crate::host::ImageHost;

const HOST: &str = "imgur";

/// Anonymous uploads to the Imgur image API.
pub struct ImgurHost {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
}

impl ImgurHost {
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Report<UploadError>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .change_context(UploadError::Unreachable { host: HOST.into() })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
        })
    }
}

impl ImageHost for ImgurHost {
    fn name(&self) -> &str {
        HOST
    }

    fn upload(&self, path: &Path) -> BoxFuture<'_, Result<String, Report<UploadError>>> {
        let path = path.to_owned();
        Box::pin(async move {
            let bytes = tokio::fs::read(&path)
                .await
                .change_context(UploadError::ReadArtifact)
                .attach_with(|| format!("path: {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "chart".into());

            let part = Part::bytes(bytes)
                .file_name(file_name)
                .mime_str(mime_for(&path))
                .change_context(UploadError::ReadArtifact)?;
            let form = Form::new().part("image", part).text("type", "file");

            let response = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Client-ID {}", self.client_id))
                .multipart(form)
                .send()
                .await
                .change_context(UploadError::Unreachable { host: HOST.into() })
                .attach_with(|| format!("endpoint: {}", self.endpoint))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .change_context(UploadError::ResponseParse { host: HOST.into() })?;
            if !status.is_success() {
                return Err(Report::new(UploadError::Rejected { host: HOST.into() })
                    .attach(format!("HTTP status: {status}")));
            }

            let url = parse_link(&body)?;
            info!(path = %path.display(), url = %url, "image uploaded");
            Ok(url)
        })
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    data: UploadData,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

fn parse_link(body: &str) -> Result<String, Report<UploadError>> {
    let response: UploadResponse = serde_json::from_str(body)
        .change_context(UploadError::ResponseParse { host: HOST.into() })?;
    match (response.success, response.data.link) {
        (true, Some(link)) if !link.is_empty() => Ok(link),
        _ => {
            let reason = response
                .data
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no link in response".into());
            Err(Report::new(UploadError::Rejected { host: HOST.into() }).attach(reason))
        }
    }
}

pub(crate) fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
