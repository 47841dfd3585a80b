use std::path::Path;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;

use crate::error::UploadError;
use crate::host::ImageHost;

/// Keeps images on disk and hands back `file://` URLs.
pub struct LocalHost;

impl ImageHost for LocalHost {
    fn name(&self) -> &str {
        "local"
    }

    fn upload(&self, path: &Path) -> BoxFuture<'_, Result<String, Report<UploadError>>> {
        let path = path.to_owned();
        Box::pin(async move {
            let absolute = tokio::fs::canonicalize(&path)
                .await
                .change_context(UploadError::ReadArtifact)
                .attach_with(|| format!("path: {}", path.display()))?;
            Ok(format!("file://{}", absolute.display()))
        })
    }
}
