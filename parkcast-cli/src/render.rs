//! HTML dashboard rendering.
//!
//! The page is a single self-contained file: a handlebars template filled from
//! a [`DashboardView`], with the three charts drawn as inline SVG.

use anyhow::Context;
use chrono_tz::Tz;
use handlebars::Handlebars;
use parkcast_core::{Forecast, ForecastPoint, Prediction};
use serde::Serialize;
use std::fmt::Write as _;

const TEMPLATE_NAME: &str = "dashboard";
const TEMPLATE: &str = include_str!("templates/dashboard.hbs");

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 320.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 50.0;

#[derive(Debug, Serialize)]
struct StatCard {
    class: &'static str,
    label: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct Highlight {
    title: &'static str,
    date: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct ChartView {
    title: String,
    svg: String,
}

#[derive(Debug, Serialize)]
struct RowView {
    date: String,
    weekday: String,
    is_holiday: bool,
    holiday: String,
    available: bool,
    visitors: String,
    vehicles: String,
    traffic_flow: String,
    temperature: String,
    reason: Option<String>,
}

/// Everything the template needs, pre-formatted.
#[derive(Debug, Serialize)]
struct DashboardView {
    location: String,
    generated_at: String,
    horizon: usize,
    stats: Vec<StatCard>,
    highlights: Vec<Highlight>,
    charts: Vec<ChartView>,
    rows: Vec<RowView>,
    unavailable_days: usize,
}

/// Whole number with thousands separators, e.g. `12,345`.
pub fn format_count(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn format_opt(value: Option<f64>) -> String {
    value.map(format_count).unwrap_or_else(|| "n/a".to_string())
}

/// Badge text for a holiday row. Unnamed holidays still get a badge.
fn holiday_label(point: &ForecastPoint) -> String {
    let info = point.holiday();
    if !info.is_holiday {
        return String::new();
    }
    match info.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "Holiday".to_string(),
    }
}

struct Series<'a> {
    title: &'static str,
    color: &'static str,
    value: fn(&Prediction) -> f64,
    points: &'a [ForecastPoint],
}

/// Inline SVG line chart. Unavailable days break the line.
fn line_chart(series: &Series<'_>) -> String {
    let n = series.points.len();
    let values: Vec<Option<f64>> = series
        .points
        .iter()
        .map(|p| p.prediction().map(series.value))
        .collect();
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let (lo, hi) = match (
        present.iter().copied().reduce(f64::min),
        present.iter().copied().reduce(f64::max),
    ) {
        (Some(lo), Some(hi)) => (lo * 0.95, hi * 1.05),
        _ => (0.0, 1.0),
    };
    let span = if hi - lo > f64::EPSILON { hi - lo } else { 1.0 };

    let plot_w = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let x = |i: usize| {
        if n <= 1 {
            MARGIN_LEFT + plot_w / 2.0
        } else {
            MARGIN_LEFT + plot_w * i as f64 / (n - 1) as f64
        }
    };
    let y = |v: f64| MARGIN_TOP + plot_h * (1.0 - (v - lo) / span);
    let baseline = MARGIN_TOP + plot_h;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg viewBox="0 0 {CHART_WIDTH} {CHART_HEIGHT}" role="img" aria-label="{}" xmlns="http://www.w3.org/2000/svg">"#,
        series.title
    );

    // Gridlines and y labels
    for step in 0..=4 {
        let v = lo + span * f64::from(step) / 4.0;
        let gy = y(v);
        let _ = write!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{gy:.1}" x2="{:.1}" y2="{gy:.1}" stroke="#ddd" stroke-dasharray="4 4"/><text x="{:.1}" y="{:.1}" font-size="12" text-anchor="end" fill="#666">{}</text>"##,
            CHART_WIDTH - MARGIN_RIGHT,
            MARGIN_LEFT - 8.0,
            gy + 4.0,
            format_count(v)
        );
    }

    // Contiguous runs of available days
    let mut segments: Vec<Vec<(f64, f64)>> = Vec::new();
    let mut current = Vec::new();
    for (i, v) in values.iter().enumerate() {
        match v {
            Some(v) => current.push((x(i), y(*v))),
            None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    for segment in &segments {
        let line: Vec<String> = segment
            .iter()
            .map(|(px, py)| format!("{px:.1},{py:.1}"))
            .collect();
        if let (Some(first), Some(last)) = (segment.first(), segment.last()) {
            let _ = write!(
                svg,
                r#"<polygon points="{:.1},{baseline:.1} {} {:.1},{baseline:.1}" fill="{}" fill-opacity="0.25"/>"#,
                first.0,
                line.join(" "),
                last.0,
                series.color
            );
        }
        let _ = write!(
            svg,
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2.5"/>"#,
            line.join(" "),
            series.color
        );
        for (px, py) in segment {
            let _ = write!(
                svg,
                r#"<circle cx="{px:.1}" cy="{py:.1}" r="5" fill="{}"/>"#,
                series.color
            );
        }
    }

    // X labels
    for (i, point) in series.points.iter().enumerate() {
        let _ = write!(
            svg,
            r##"<text x="{:.1}" y="{:.1}" font-size="12" text-anchor="middle" fill="#333">{}</text>"##,
            x(i),
            baseline + 20.0,
            point.date().format("%a %b %d")
        );
    }
    svg.push_str("</svg>");
    svg
}

fn build_view(location: &str, tz: Tz, forecast: &Forecast) -> DashboardView {
    let summary = forecast.summary();
    let points = forecast.points();

    let stats = vec![
        StatCard {
            class: "visitors",
            label: "Avg Daily Visitors",
            value: format_opt(summary.avg_visitors),
        },
        StatCard {
            class: "vehicles",
            label: "Avg Daily Vehicles",
            value: format_opt(summary.avg_vehicles),
        },
        StatCard {
            class: "traffic",
            label: "Avg Traffic Flow",
            value: format_opt(summary.avg_traffic_flow),
        },
    ];

    let highlights = [
        ("Peak Traffic Day", summary.peak_traffic),
        ("Lowest Traffic Day", summary.lowest_traffic),
    ]
    .into_iter()
    .filter_map(|(title, day)| {
        day.map(|d| Highlight {
            title,
            date: d.date.format("%A, %B %-d").to_string(),
            value: format_count(d.value),
        })
    })
    .collect();

    let charts = [
        Series {
            title: "Visitor Predictions",
            color: "#2E86AB",
            value: |p| p.visitors,
            points,
        },
        Series {
            title: "Vehicle Predictions",
            color: "#A23B72",
            value: |p| p.vehicles,
            points,
        },
        Series {
            title: "Traffic Flow Predictions",
            color: "#F18F01",
            value: |p| p.traffic_flow,
            points,
        },
    ]
    .iter()
    .map(|s| ChartView {
        title: s.title.to_string(),
        svg: line_chart(s),
    })
    .collect();

    let rows = points
        .iter()
        .map(|point| {
            let p = point.prediction();
            RowView {
                date: point.date().to_string(),
                weekday: point.date().format("%a").to_string(),
                is_holiday: point.holiday().is_holiday,
                holiday: holiday_label(point),
                available: p.is_some(),
                visitors: format_opt(p.map(|p| p.visitors)),
                vehicles: format_opt(p.map(|p| p.vehicles)),
                traffic_flow: format_opt(p.map(|p| p.traffic_flow)),
                temperature: p
                    .and_then(|p| p.weather)
                    .map(|w| format!("{:.1}°C", w.temp_mean))
                    .unwrap_or_else(|| "n/a".to_string()),
                reason: match point.outcome() {
                    parkcast_core::PointOutcome::Unavailable { reason } => Some(reason.clone()),
                    parkcast_core::PointOutcome::Predicted(_) => None,
                },
            }
        })
        .collect();

    DashboardView {
        location: location.to_string(),
        generated_at: forecast
            .generated_at()
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string(),
        horizon: forecast.len(),
        stats,
        highlights,
        charts,
        rows,
        unavailable_days: summary.unavailable_days,
    }
}

/// Compiled dashboard template.
pub struct Dashboard {
    registry: Handlebars<'static>,
}

impl Dashboard {
    pub fn new() -> anyhow::Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry
            .register_template_string(TEMPLATE_NAME, TEMPLATE)
            .context("Dashboard template failed to compile")?;
        Ok(Self { registry })
    }

    pub fn render(&self, location: &str, tz: Tz, forecast: &Forecast) -> anyhow::Result<String> {
        let view = build_view(location, tz, forecast);
        self.registry
            .render(TEMPLATE_NAME, &view)
            .context("Dashboard render error")
    }
}
