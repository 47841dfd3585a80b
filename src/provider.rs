pub mod yahoo;

use chrono::NaiveDate;
use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::ProviderError;
use crate::model::PriceSeries;

/// Source of daily price history.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn PriceSeriesProvider`).
pub trait PriceSeriesProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch daily bars for `symbol` from `start` up to today, oldest first.
    ///
    /// Fails with `ProviderError::NoData` when the symbol is unknown or the
    /// range holds no bars.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
    ) -> BoxFuture<'_, Result<PriceSeries, Report<ProviderError>>>;
}
