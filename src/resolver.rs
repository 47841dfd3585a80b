pub mod web_page;

use std::sync::Arc;

use error_stack::Report;
use futures::future::BoxFuture;
use tracing::warn;

use crate::error::NameResolutionError;

/// One strategy for turning a symbol into a human-readable security name.
pub trait SymbolNameResolver: Send + Sync {
    /// Short label used in logs (e.g. `"yahoo"`).
    fn strategy(&self) -> &str;

    fn resolve(&self, symbol: &str) -> BoxFuture<'_, Result<String, Report<NameResolutionError>>>;
}

/// Ordered list of name strategies; the first success wins.
///
/// Never fails: when every strategy fails the raw symbol is returned.
#[derive(Clone, Default)]
pub struct ResolverChain {
    strategies: Vec<Arc<dyn SymbolNameResolver>>,
}

impl ResolverChain {
    pub fn new(strategies: Vec<Arc<dyn SymbolNameResolver>>) -> Self {
        Self { strategies }
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub async fn display_name(&self, symbol: &str) -> String {
        for strategy in &self.strategies {
            match strategy.resolve(symbol).await {
                Ok(name) => return name,
                Err(e) => {
                    warn!(
                        symbol,
                        strategy = strategy.strategy(),
                        error = ?e,
                        "name lookup failed, trying next strategy"
                    );
                }
            }
        }
        symbol.to_owned()
    }
}
