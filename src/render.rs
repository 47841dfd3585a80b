pub mod png;
pub mod svg;

use std::path::Path;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::RenderError;
use crate::model::IndicatorSeries;

/// Text drawn around a chart.
#[derive(Debug, Clone)]
pub struct ChartLabels {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
}

/// Draws an indicator series, one line per component against the date axis.
pub trait ChartRenderer: Send + Sync {
    /// File extension of the produced image, without the dot.
    fn extension(&self) -> &str;

    /// Write the chart image to `output`, creating parent directories.
    fn render<'a>(
        &'a self,
        series: &'a IndicatorSeries,
        labels: &'a ChartLabels,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<(), Report<RenderError>>>;
}
