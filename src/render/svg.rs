//! Chart layout as an SVG document, later rasterized by the PNG renderer.

use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::model::IndicatorSeries;
use crate::render::ChartLabels;

const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 180.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 80.0;
const X_TICKS: usize = 6;
const PALETTE: [&str; 6] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b",
];

/// Canvas size and text font of a chart.
#[derive(Debug, Clone, Copy)]
pub struct Canvas<'a> {
    pub width: u32,
    pub height: u32,
    /// CSS font-family list applied to every text element.
    pub font_family: &'a str,
}

/// Lay out `series` as a standalone SVG document.
pub fn document(
    series: &IndicatorSeries,
    labels: &ChartLabels,
    canvas: Canvas<'_>,
) -> Result<String, std::fmt::Error> {
    let (w, h) = (f64::from(canvas.width), f64::from(canvas.height));
    let plot = PlotArea {
        left: MARGIN_LEFT,
        top: MARGIN_TOP,
        width: (w - MARGIN_LEFT - MARGIN_RIGHT).max(1.0),
        height: (h - MARGIN_TOP - MARGIN_BOTTOM).max(1.0),
    };

    let mut svg = String::new();
    writeln!(
        svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="{}">"##,
        escape(canvas.font_family)
    )?;
    writeln!(svg, r#"<rect width="{w}" height="{h}" fill="white"/>"#)?;
    writeln!(
        svg,
        r#"<text x="{}" y="{}" font-size="22" text-anchor="middle">{}</text>"#,
        w / 2.0,
        MARGIN_TOP / 2.0 + 8.0,
        escape(&labels.title)
    )?;
    writeln!(
        svg,
        r#"<text x="{}" y="{}" font-size="16" text-anchor="middle">{}</text>"#,
        plot.left + plot.width / 2.0,
        h - 20.0,
        escape(&labels.x_label)
    )?;
    let (yx, yy) = (24.0, plot.top + plot.height / 2.0);
    writeln!(
        svg,
        r#"<text x="{yx}" y="{yy}" font-size="16" text-anchor="middle" transform="rotate(-90 {yx} {yy})">{}</text>"#,
        escape(&labels.y_label)
    )?;

    let Some((lo, hi)) = value_range(series) else {
        writeln!(
            svg,
            r##"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="#888"/>"##,
            plot.left, plot.top, plot.width, plot.height
        )?;
        writeln!(
            svg,
            r##"<text x="{}" y="{}" font-size="18" text-anchor="middle" fill="#888">no data</text>"##,
            plot.left + plot.width / 2.0,
            plot.top + plot.height / 2.0
        )?;
        svg.push_str("</svg>\n");
        return Ok(svg);
    };

    // horizontal grid on the value axis
    for tick in value_ticks(lo, hi) {
        let y = plot.y(tick, lo, hi);
        writeln!(
            svg,
            r##"<line x1="{}" y1="{y:.2}" x2="{}" y2="{y:.2}" stroke="#ddd" stroke-width="1"/>"##,
            plot.left,
            plot.left + plot.width
        )?;
        writeln!(
            svg,
            r#"<text x="{}" y="{:.2}" font-size="12" text-anchor="end">{}</text>"#,
            plot.left - 8.0,
            y + 4.0,
            format_tick(tick, hi - lo)
        )?;
    }

    let n = series.len();
    for i in date_tick_indices(n, X_TICKS) {
        let x = plot.x(i, n);
        writeln!(
            svg,
            r##"<line x1="{x:.2}" y1="{}" x2="{x:.2}" y2="{}" stroke="#444"/>"##,
            plot.top + plot.height,
            plot.top + plot.height + 5.0
        )?;
        writeln!(
            svg,
            r#"<text x="{x:.2}" y="{}" font-size="12" text-anchor="middle">{}</text>"#,
            plot.top + plot.height + 22.0,
            format_date(series.dates[i])
        )?;
    }

    writeln!(
        svg,
        r##"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="#444"/>"##,
        plot.left, plot.top, plot.width, plot.height
    )?;

    for (c, component) in series.components.iter().enumerate() {
        let color = PALETTE[c % PALETTE.len()];
        for segment in defined_segments(&component.values) {
            let points = segment
                .map(|i| {
                    format!(
                        "{:.2},{:.2}",
                        plot.x(i, n),
                        plot.y(component.values[i], lo, hi)
                    )
                })
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(
                svg,
                r#"<polyline points="{points}" fill="none" stroke="{color}" stroke-width="1.5"/>"#
            )?;
        }

        let ly = plot.top + 20.0 + 24.0 * c as f64;
        let lx = plot.left + plot.width + 16.0;
        writeln!(
            svg,
            r#"<line x1="{lx}" y1="{ly}" x2="{}" y2="{ly}" stroke="{color}" stroke-width="3"/>"#,
            lx + 24.0
        )?;
        writeln!(
            svg,
            r#"<text x="{}" y="{}" font-size="14">{}</text>"#,
            lx + 32.0,
            ly + 5.0,
            escape(legend_label(component.name))
        )?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

struct PlotArea {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl PlotArea {
    fn x(&self, i: usize, n: usize) -> f64 {
        if n <= 1 {
            return self.left + self.width / 2.0;
        }
        self.left + self.width * i as f64 / (n - 1) as f64
    }

    fn y(&self, v: f64, lo: f64, hi: f64) -> f64 {
        self.top + self.height * (hi - v) / (hi - lo)
    }
}

fn legend_label(name: &str) -> &str {
    match name {
        "macd" => "MACD",
        "signal" => "MACD Signal",
        "histogram" => "MACD Hist",
        "rsi" => "RSI",
        "upper" => "Upper Band",
        "middle" => "Middle Band",
        "lower" => "Lower Band",
        other => other,
    }
}

/// Padded `(low, high)` over every finite value, `None` if there is none.
fn value_range(series: &IndicatorSeries) -> Option<(f64, f64)> {
    if series.is_empty() {
        return None;
    }
    let (lo, hi) = series
        .components
        .iter()
        .flat_map(|c| c.values.iter().copied())
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;
    let pad = if hi > lo {
        (hi - lo) * 0.05
    } else {
        lo.abs().max(1.0) * 0.05
    };
    Some((lo - pad, hi + pad))
}

/// Round-numbered ticks (steps of 1, 2 or 5 times a power of ten) in `[lo, hi]`.
fn value_ticks(lo: f64, hi: f64) -> Vec<f64> {
    let step = nice_step((hi - lo) / 5.0);
    if !step.is_finite() || step <= 0.0 {
        return vec![];
    }
    let first = (lo / step).ceil() as i64;
    let last = (hi / step).floor() as i64;
    (first..=last).map(|k| k as f64 * step).collect()
}

fn nice_step(raw: f64) -> f64 {
    let magnitude = 10f64.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let nice = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

fn format_tick(value: f64, range: f64) -> String {
    let decimals = if range >= 50.0 {
        0
    } else if range >= 5.0 {
        1
    } else {
        (2.0 - range.log10().floor()).clamp(2.0, 6.0) as usize
    };
    // avoid "-0"
    let value = if value.abs() < 1e-12 { 0.0 } else { value };
    format!("{value:.decimals$}")
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Up to `count` evenly spaced indices over `0..n`, always including both ends.
fn date_tick_indices(n: usize, count: usize) -> Vec<usize> {
    match n {
        0 => vec![],
        1 => vec![0],
        _ => {
            let count = count.clamp(2, n);
            let mut ticks: Vec<usize> = (0..count)
                .map(|k| ((n - 1) as f64 * k as f64 / (count - 1) as f64).round() as usize)
                .collect();
            ticks.dedup();
            ticks
        }
    }
}

/// Index ranges of consecutive finite values.
fn defined_segments(values: &[f64]) -> Vec<std::ops::Range<usize>> {
    let mut segments = Vec::new();
    let mut start = None;
    for (i, v) in values.iter().enumerate() {
        match (v.is_finite(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                segments.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        segments.push(s..values.len());
    }
    segments
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::{Component, IndicatorKind};

    fn series(values: Vec<f64>) -> IndicatorSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        IndicatorSeries {
            kind: IndicatorKind::Rsi,
            dates: (0..values.len())
                .map(|i| start + Duration::days(i as i64))
                .collect(),
            components: vec![Component { name: "rsi", values }],
        }
    }

    fn labels() -> ChartLabels {
        ChartLabels {
            title: "台積電 RSI & co".into(),
            x_label: "Date".into(),
            y_label: "RSI".into(),
        }
    }

    const CANVAS: Canvas<'static> = Canvas {
        width: 800,
        height: 400,
        font_family: "'Noto Sans TC', sans-serif",
    };

    #[test]
    fn segments_split_on_nan() {
        let values = [f64::NAN, 1.0, 2.0, f64::NAN, 3.0, f64::INFINITY, 4.0];
        assert_eq!(defined_segments(&values), vec![1..3, 4..5, 6..7]);
        assert!(defined_segments(&[f64::NAN; 3]).is_empty());
    }

    #[test]
    fn nice_steps() {
        assert!((nice_step(0.7) - 1.0).abs() < 1e-12);
        assert!((nice_step(1.5) - 2.0).abs() < 1e-12);
        assert!((nice_step(3.0) - 5.0).abs() < 1e-12);
        assert!((nice_step(7.0) - 10.0).abs() < 1e-12);
        assert!((nice_step(0.03) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn value_ticks_within_range() {
        // range 10.2 -> raw step 2.04 -> nice step 5
        assert_eq!(value_ticks(-2.3, 7.9), vec![0.0, 5.0]);
        let ticks = value_ticks(20.0, 80.0);
        assert_eq!(ticks.first().copied(), Some(20.0));
        assert_eq!(ticks.last().copied(), Some(80.0));
        assert!(ticks.iter().all(|t| (20.0..=80.0).contains(t)));
    }

    #[test]
    fn date_ticks_cover_both_ends() {
        assert_eq!(date_tick_indices(0, 6), Vec::<usize>::new());
        assert_eq!(date_tick_indices(1, 6), vec![0]);
        assert_eq!(date_tick_indices(3, 6), vec![0, 1, 2]);
        let ticks = date_tick_indices(100, 6);
        assert_eq!(ticks.len(), 6);
        assert_eq!(ticks[0], 0);
        assert_eq!(*ticks.last().unwrap(), 99);
    }

    #[test]
    fn value_range_ignores_undefined() {
        let (lo, hi) = value_range(&series(vec![f64::NAN, 10.0, 20.0])).unwrap();
        assert!(lo < 10.0 && hi > 20.0);
        assert!(value_range(&series(vec![f64::NAN, f64::NAN])).is_none());
        assert!(value_range(&series(Vec::new())).is_none());
        let (lo, hi) = value_range(&series(vec![100.0, 100.0])).unwrap();
        assert!(lo < 100.0 && hi > 100.0);
    }

    #[test]
    fn document_has_one_polyline_per_segment_and_escaped_text() {
        let svg = document(
            &series(vec![f64::NAN, 30.0, 60.0, f64::NAN, 55.0, 70.0]),
            &labels(),
            CANVAS,
        )
        .unwrap();
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains("台積電 RSI &amp; co"));
        assert!(svg.contains(r#"font-family="&apos;Noto Sans TC&apos;, sans-serif""#));
        assert!(svg.contains(">RSI</text>"));
        assert!(svg.contains("2024-01-01"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn all_undefined_series_renders_no_data_note() {
        let svg = document(&series(vec![f64::NAN; 4]), &labels(), CANVAS).unwrap();
        assert!(svg.contains("no data"));
        assert_eq!(svg.matches("<polyline").count(), 0);
    }
}
