use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use tracing::debug;

use crate::error::NameResolutionError;
use crate::resolver::SymbolNameResolver;

const STRATEGY: &str = "web page";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Reads the security name from the title of a public quote page.
pub struct WebPageResolver {
    client: reqwest::Client,
    /// URL template containing a `{symbol}` placeholder.
    url_template: String,
}

impl WebPageResolver {
    pub fn new(
        url_template: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Report<NameResolutionError>> {
        let url_template = url_template.into();
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .change_context(NameResolutionError {
                symbol: String::new(),
                strategy: STRATEGY.into(),
            })?;
        Ok(Self {
            client,
            url_template,
        })
    }

    fn url_for(&self, symbol: &str) -> String {
        self.url_template.replace("{symbol}", symbol)
    }
}

impl SymbolNameResolver for WebPageResolver {
    fn strategy(&self) -> &str {
        STRATEGY
    }

    fn resolve(&self, symbol: &str) -> BoxFuture<'_, Result<String, Report<NameResolutionError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let error = || NameResolutionError {
                symbol: symbol.clone(),
                strategy: STRATEGY.into(),
            };
            let url = self.url_for(&symbol);

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .change_context_lazy(error)
                .attach_with(|| format!("url: {url}"))?;
            if !response.status().is_success() {
                return Err(Report::new(error())
                    .attach(format!("HTTP status: {}", response.status())));
            }
            let html = response.text().await.change_context_lazy(error)?;

            let name = extract_name(&html, &symbol)
                .ok_or_else(|| Report::new(error()).attach("page title holds no name"))?;
            debug!(symbol = %symbol, name = %name, "resolved display name from web page");
            Ok(name)
        })
    }
}

/// Pull the security name out of a quote page's `<title>`.
///
/// Quote page titles look like `台積電(2330) 走勢圖 - Yahoo股市`; the name is
/// the text before the ticker parenthesis or the first ` - ` separator.
// Title format checked against the tw.stock.yahoo.com quote page layout, the
// default `names.fallback_url`. Other sites need their own extraction.
pub fn extract_name(html: &str, symbol: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets valid for `html`
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let content_start = open + lower[open..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find("</title>")?;
    let title = html[content_start..content_end]
        .replace("&amp;", "&")
        .replace("&#39;", "'");

    let cut = ['(', '（']
        .iter()
        .filter_map(|c| title.find(*c))
        .chain(title.find(" - "))
        .min()
        .unwrap_or(title.len());
    let name = title[..cut].trim();

    if name.is_empty() || name.eq_ignore_ascii_case(symbol) {
        None
    } else {
        Some(name.to_owned())
    }
}
