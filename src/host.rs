pub mod imgur;
pub mod local;

use std::path::Path;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::UploadError;

/// Publishes a rendered image and returns a shareable URL.
pub trait ImageHost: Send + Sync {
    fn name(&self) -> &str;

    fn upload(&self, path: &Path) -> BoxFuture<'_, Result<String, Report<UploadError>>>;
}
