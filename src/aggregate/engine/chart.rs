//! # Chart Rendering
//!
//! Grouped charts keep one accumulator per distinct key. Raw point charts
//! (scatter, time series and ungrouped line/bar) and histograms keep one
//! number pair per record, since every point is drawn.
//!
//! Output is standalone SVG markup.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde_json::Value;

use super::accumulator::Accumulator;
use super::values::{date_value, display_value, numeric_value, pick};
use super::EngineError;
use crate::aggregate::config::{Aggregator, GraphConfig, GraphType};
use crate::record::Record;
use crate::store::RecordSorter;

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 600;
pub const HISTOGRAM_BINS: usize = 30;

/// Default series colors
pub const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

const BLANK: &str = "(blank)";

#[derive(Debug, Clone)]
struct Group {
    label: String,
    sort_key: Value,
    acc: Accumulator,
}

#[derive(Debug, Clone)]
enum Mode {
    Grouped {
        key_field: String,
        value_field: Option<String>,
        aggregator: Aggregator,
        groups: Vec<Group>,
        index: HashMap<String, usize>,
    },
    Points {
        x_field: String,
        y_field: String,
        points: Vec<(Value, f64)>,
    },
    Samples {
        field: String,
        samples: Vec<f64>,
    },
}

/// Incremental chart
#[derive(Debug, Clone)]
pub struct ChartBuilder {
    config: GraphConfig,
    kind: GraphType,
    mode: Mode,
    records: u64,
}

fn required(field: Option<&str>, message: &str) -> Result<String, EngineError> {
    field
        .map(str::to_string)
        .ok_or_else(|| EngineError::InvalidParams(message.to_string()))
}

impl ChartBuilder {
    pub fn new(config: GraphConfig) -> Result<Self, EngineError> {
        let kind = config
            .graph_type
            .ok_or_else(|| EngineError::InvalidParams("Graph type is required".to_string()))?;

        let grouped = |key_field: String, aggregator: Aggregator, value_field: Option<&str>| {
            if aggregator != Aggregator::Count && value_field.is_none() {
                return Err(EngineError::InvalidParams(
                    "yAxis.field is required when using aggregation".to_string(),
                ));
            }
            Ok(Mode::Grouped {
                key_field,
                value_field: value_field.map(str::to_string),
                aggregator,
                groups: Vec::new(),
                index: HashMap::new(),
            })
        };

        let mode = match kind {
            GraphType::Pie => {
                let category = required(config.category(), "categoryField is required for pie chart")?;
                grouped(
                    category,
                    config.aggregation.unwrap_or(Aggregator::Count),
                    config.y_field(),
                )?
            }
            GraphType::Histogram => Mode::Samples {
                field: required(config.y_field(), "yAxis.field is required for histogram")?,
                samples: Vec::new(),
            },
            _ => {
                let message = format!(
                    "xAxis.field and yAxis.field are required for {} chart",
                    kind.as_str()
                );
                match config.aggregation {
                    Some(aggregator) => grouped(
                        required(config.x_field().or(config.category()), &message)?,
                        aggregator,
                        config.y_field(),
                    )?,
                    None if kind == GraphType::Bar && config.y_field().is_none() => grouped(
                        required(config.x_field().or(config.category()), &message)?,
                        Aggregator::Count,
                        None,
                    )?,
                    None => Mode::Points {
                        x_field: required(config.x_field().or(config.category()), &message)?,
                        y_field: required(config.y_field(), &message)?,
                        points: Vec::new(),
                    },
                }
            }
        };

        Ok(Self {
            config,
            kind,
            mode,
            records: 0,
        })
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn push(&mut self, record: &Record) {
        self.records += 1;
        match &mut self.mode {
            Mode::Grouped {
                key_field,
                value_field,
                groups,
                index,
                ..
            } => {
                let key = pick(record, key_field).cloned().unwrap_or(Value::Null);
                let mut label = display_value(&key);
                if label.is_empty() {
                    label = BLANK.to_string();
                }
                let reading = value_field
                    .as_deref()
                    .and_then(|f| pick(record, f))
                    .and_then(numeric_value);
                let slot = *index.entry(label.clone()).or_insert_with(|| {
                    groups.push(Group {
                        label,
                        sort_key: key,
                        acc: Accumulator::default(),
                    });
                    groups.len() - 1
                });
                groups[slot].acc.push(reading);
            }
            Mode::Points {
                x_field,
                y_field,
                points,
            } => {
                let y = pick(record, y_field).and_then(numeric_value);
                if let Some(y) = y {
                    let x = pick(record, x_field).cloned().unwrap_or(Value::Null);
                    points.push((x, y));
                }
            }
            Mode::Samples { field, samples } => {
                if let Some(v) = pick(record, field).and_then(numeric_value) {
                    samples.push(v);
                }
            }
        }
    }

    /// Renders the SVG document
    pub fn render(self) -> String {
        let width = self.config.width.unwrap_or(DEFAULT_WIDTH).max(100) as f64;
        let height = self.config.height.unwrap_or(DEFAULT_HEIGHT).max(100) as f64;
        let colors: Vec<String> = match &self.config.colors {
            Some(colors) if !colors.is_empty() => colors.clone(),
            _ => PALETTE.iter().map(|c| c.to_string()).collect(),
        };
        let labels = AxisLabels::from_config(&self.config, &self.mode);
        let title = match self.config.title.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(title) => title.to_string(),
            None => labels.default_title(self.kind),
        };

        let mut canvas = Canvas::new(width, height, &title);
        let options = RenderOptions {
            colors,
            show_grid: self.config.show_grid.unwrap_or(true),
            show_legend: self.config.show_legend.unwrap_or(true),
            labels,
        };

        match (self.kind, self.mode) {
            (GraphType::Pie, Mode::Grouped { aggregator, groups, .. }) => {
                canvas.pie(&sorted_groups(groups, aggregator), &options)
            }
            (GraphType::Line, Mode::Grouped { aggregator, groups, .. }) => {
                canvas.category_line(&sorted_groups(groups, aggregator), &options)
            }
            (GraphType::TimeSeries, Mode::Grouped { aggregator, groups, .. }) => {
                let points = groups
                    .iter()
                    .filter_map(|g| {
                        date_value(&g.sort_key)
                            .map(|at| (at.timestamp_millis() as f64, g.acc.result(aggregator)))
                    })
                    .collect();
                canvas.xy(sorted_points(points), XKind::Time, true, &options)
            }
            (_, Mode::Grouped { aggregator, groups, .. }) => {
                canvas.bars(&sorted_groups(groups, aggregator), &options)
            }
            (GraphType::Scatter, Mode::Points { points, .. }) => {
                let points = points
                    .iter()
                    .filter_map(|(x, y)| numeric_value(x).map(|x| (x, *y)))
                    .collect();
                canvas.xy(points, XKind::Number, false, &options)
            }
            (GraphType::TimeSeries, Mode::Points { points, .. }) => {
                let points = points
                    .iter()
                    .filter_map(|(x, y)| date_value(x).map(|at| (at.timestamp_millis() as f64, *y)))
                    .collect();
                canvas.xy(sorted_points(points), XKind::Time, true, &options)
            }
            (kind, Mode::Points { mut points, .. }) => {
                points.sort_by(|a, b| RecordSorter::compare_values(Some(&a.0), Some(&b.0)));
                let categories: Vec<(String, f64)> = points
                    .into_iter()
                    .map(|(x, y)| (display_value(&x), y))
                    .collect();
                if kind == GraphType::Line {
                    canvas.category_line(&categories, &options)
                } else {
                    canvas.bars(&categories, &options)
                }
            }
            (_, Mode::Samples { samples, .. }) => canvas.histogram(&samples, &options),
        }

        canvas.finish()
    }
}

fn sorted_groups(mut groups: Vec<Group>, aggregator: Aggregator) -> Vec<(String, f64)> {
    groups.sort_by(|a, b| RecordSorter::compare_values(Some(&a.sort_key), Some(&b.sort_key)));
    groups
        .into_iter()
        .map(|g| (g.label, g.acc.result(aggregator)))
        .collect()
}

fn sorted_points(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points
}

struct AxisLabels {
    x: String,
    y: String,
    category: String,
}

impl AxisLabels {
    fn from_config(config: &GraphConfig, mode: &Mode) -> Self {
        let axis_label = |axis: &Option<crate::aggregate::config::GraphAxis>| {
            axis.as_ref().and_then(|a| {
                a.label
                    .clone()
                    .filter(|l| !l.is_empty())
                    .or_else(|| Some(a.field.clone()).filter(|f| !f.is_empty()))
            })
        };
        let category = config
            .category_field_label
            .clone()
            .or_else(|| config.category_field.clone())
            .unwrap_or_default();
        let x = axis_label(&config.x_axis).unwrap_or_else(|| category.clone());
        let y = axis_label(&config.y_axis).unwrap_or_else(|| match mode {
            Mode::Grouped { aggregator, .. } if *aggregator == Aggregator::Count => "Count".to_string(),
            _ => String::new(),
        });
        Self { x, y, category }
    }

    fn default_title(&self, kind: GraphType) -> String {
        match kind {
            GraphType::Bar => format!("{} by {}", self.y, self.x),
            GraphType::Line => format!("{} over {}", self.y, self.x),
            GraphType::Pie => format!("Distribution by {}", self.category),
            GraphType::Scatter => format!("{} vs {}", self.y, self.x),
            GraphType::Histogram => format!("Distribution of {}", self.y),
            GraphType::TimeSeries => format!("{} over time", self.y),
        }
    }
}

struct RenderOptions {
    colors: Vec<String>,
    show_grid: bool,
    show_legend: bool,
    labels: AxisLabels,
}

impl RenderOptions {
    fn color(&self, i: usize) -> &str {
        &self.colors[i % self.colors.len()]
    }
}

#[derive(Clone, Copy, PartialEq)]
enum XKind {
    Number,
    Time,
}

/// Plot area bounds
#[derive(Clone, Copy)]
struct Area {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl Area {
    fn width(&self) -> f64 {
        self.right - self.left
    }

    fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

struct Canvas {
    out: String,
    width: f64,
    height: f64,
}

impl Canvas {
    fn new(width: f64, height: f64, title: &str) -> Self {
        let mut out = String::new();
        let _ = write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
            w = width,
            h = height
        );
        let _ = write!(out, r#"<rect width="{}" height="{}" fill="white"/>"#, width, height);
        let _ = write!(
            out,
            r#"<text x="{}" y="30" text-anchor="middle" font-size="16">{}</text>"#,
            width / 2.0,
            escape(title)
        );
        Self { out, width, height }
    }

    fn finish(mut self) -> String {
        self.out.push_str("</svg>");
        self.out
    }

    fn area(&self, legend: bool) -> Area {
        Area {
            left: 70.0,
            top: 50.0,
            right: self.width - if legend { 170.0 } else { 30.0 },
            bottom: self.height - 80.0,
        }
    }

    fn text(&mut self, x: f64, y: f64, anchor: &str, size: u32, content: &str) {
        let _ = write!(
            self.out,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="{}" font-size="{}">{}</text>"#,
            x,
            y,
            anchor,
            size,
            escape(content)
        );
    }

    /// Axes, y ticks, optional grid and axis titles; returns the y scale
    fn frame(&mut self, area: Area, y_min: f64, y_max: f64, options: &RenderOptions) -> impl Fn(f64) -> f64 {
        let (lo, hi) = nice_range(y_min, y_max);
        for i in 0..=5 {
            let value = lo + (hi - lo) * i as f64 / 5.0;
            let y = area.bottom - area.height() * i as f64 / 5.0;
            if options.show_grid {
                let _ = write!(
                    self.out,
                    r##"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#cccccc" stroke-opacity="0.6"/>"##,
                    area.left,
                    area.right,
                    y = y
                );
            }
            self.text(area.left - 8.0, y + 4.0, "end", 11, &format_number(value));
        }
        let _ = write!(
            self.out,
            r#"<line x1="{l:.1}" y1="{t:.1}" x2="{l:.1}" y2="{b:.1}" stroke="black"/><line x1="{l:.1}" y1="{b:.1}" x2="{r:.1}" y2="{b:.1}" stroke="black"/>"#,
            l = area.left,
            t = area.top,
            b = area.bottom,
            r = area.right
        );
        let x_label = options.labels.x.clone();
        let y_label = options.labels.y.clone();
        self.text((area.left + area.right) / 2.0, self.height - 20.0, "middle", 12, &x_label);
        let _ = write!(
            self.out,
            r#"<text x="18" y="{:.1}" text-anchor="middle" font-size="12" transform="rotate(-90 18 {:.1})">{}</text>"#,
            (area.top + area.bottom) / 2.0,
            (area.top + area.bottom) / 2.0,
            escape(&y_label)
        );
        move |v: f64| area.bottom - (v - lo) / (hi - lo) * area.height()
    }

    fn legend(&mut self, entries: &[(String, String)]) {
        let x = self.width - 160.0;
        for (i, (label, color)) in entries.iter().enumerate() {
            let y = 60.0 + i as f64 * 20.0;
            let _ = write!(
                self.out,
                r#"<rect x="{:.1}" y="{:.1}" width="12" height="12" fill="{}"/>"#,
                x,
                y,
                escape(color)
            );
            self.text(x + 18.0, y + 10.0, "start", 11, label);
        }
    }

    fn category_labels(&mut self, area: Area, categories: &[(String, f64)]) {
        let band = area.width() / categories.len().max(1) as f64;
        for (i, (label, _)) in categories.iter().enumerate() {
            let x = area.left + band * (i as f64 + 0.5);
            let y = area.bottom + 16.0;
            let _ = write!(
                self.out,
                r#"<text x="{x:.1}" y="{y:.1}" text-anchor="end" font-size="11" transform="rotate(-45 {x:.1} {y:.1})">{}</text>"#,
                escape(label),
                x = x,
                y = y
            );
        }
    }

    fn bars(&mut self, categories: &[(String, f64)], options: &RenderOptions) {
        let area = self.area(options.show_legend);
        let (min, max) = bounds(categories.iter().map(|c| c.1));
        let scale = self.frame(area, min.min(0.0), max, options);
        let band = area.width() / categories.len().max(1) as f64;
        let base = scale(0.0);
        let color = options.color(0).to_string();
        for (i, (_, value)) in categories.iter().enumerate() {
            let y = scale(*value);
            let (top, h) = if y < base { (y, base - y) } else { (base, y - base) };
            let _ = write!(
                self.out,
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"/>"#,
                area.left + band * (i as f64 + 0.1),
                top,
                band * 0.8,
                h,
                escape(&color)
            );
        }
        self.category_labels(area, categories);
        if options.show_legend {
            self.legend(&[(options.labels.y.clone(), color)]);
        }
    }

    fn category_line(&mut self, categories: &[(String, f64)], options: &RenderOptions) {
        let area = self.area(options.show_legend);
        let (min, max) = bounds(categories.iter().map(|c| c.1));
        let scale = self.frame(area, min, max, options);
        let band = area.width() / categories.len().max(1) as f64;
        let points: Vec<(f64, f64)> = categories
            .iter()
            .enumerate()
            .map(|(i, (_, v))| (area.left + band * (i as f64 + 0.5), scale(*v)))
            .collect();
        let color = options.color(0).to_string();
        self.polyline(&points, &color, true);
        self.category_labels(area, categories);
        if options.show_legend {
            self.legend(&[(options.labels.y.clone(), color)]);
        }
    }

    fn xy(&mut self, points: Vec<(f64, f64)>, kind: XKind, connect: bool, options: &RenderOptions) {
        let area = self.area(options.show_legend);
        let (y_min, y_max) = bounds(points.iter().map(|p| p.1));
        let scale_y = self.frame(area, y_min, y_max, options);
        let (x_min, x_max) = bounds(points.iter().map(|p| p.0));
        let (x_lo, x_hi) = if kind == XKind::Time {
            if x_max > x_min { (x_min, x_max) } else { (x_min - 1.0, x_min + 1.0) }
        } else {
            nice_range(x_min, x_max)
        };
        let scale_x = |v: f64| area.left + (v - x_lo) / (x_hi - x_lo) * area.width();

        for i in 0..=4 {
            let value = x_lo + (x_hi - x_lo) * i as f64 / 4.0;
            let label = match kind {
                XKind::Number => format_number(value),
                XKind::Time => chrono::DateTime::from_timestamp_millis(value as i64)
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            };
            self.text(scale_x(value), area.bottom + 18.0, "middle", 11, &label);
        }

        let plotted: Vec<(f64, f64)> = points.iter().map(|(x, y)| (scale_x(*x), scale_y(*y))).collect();
        let color = options.color(0).to_string();
        if connect {
            self.polyline(&plotted, &color, true);
        } else {
            for (x, y) in &plotted {
                let _ = write!(
                    self.out,
                    r#"<circle cx="{:.1}" cy="{:.1}" r="3.5" fill="{}" fill-opacity="0.8"/>"#,
                    x,
                    y,
                    escape(&color)
                );
            }
        }
        if options.show_legend {
            self.legend(&[(options.labels.y.clone(), color)]);
        }
    }

    fn histogram(&mut self, samples: &[f64], options: &RenderOptions) {
        let area = self.area(false);
        let (min, max) = bounds(samples.iter().copied());
        let span = if max > min { max - min } else { 1.0 };
        let mut counts = [0u64; HISTOGRAM_BINS];
        for v in samples {
            let bin = (((v - min) / span) * HISTOGRAM_BINS as f64) as usize;
            counts[bin.min(HISTOGRAM_BINS - 1)] += 1;
        }
        let peak = counts.iter().copied().max().unwrap_or(0) as f64;
        let frequency = RenderOptions {
            colors: options.colors.clone(),
            show_grid: options.show_grid,
            show_legend: false,
            labels: AxisLabels {
                x: options.labels.y.clone(),
                y: "Frequency".to_string(),
                category: String::new(),
            },
        };
        let scale = self.frame(area, 0.0, peak, &frequency);
        let band = area.width() / HISTOGRAM_BINS as f64;
        let color = options.color(0).to_string();
        for (i, count) in counts.iter().enumerate() {
            let y = scale(*count as f64);
            let _ = write!(
                self.out,
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" stroke="white"/>"#,
                area.left + band * i as f64,
                y,
                band,
                area.bottom - y,
                escape(&color)
            );
        }
        self.text(area.left, area.bottom + 18.0, "middle", 11, &format_number(min));
        self.text(area.right, area.bottom + 18.0, "middle", 11, &format_number(min + span));
    }

    fn pie(&mut self, slices: &[(String, f64)], options: &RenderOptions) {
        let area = self.area(options.show_legend);
        let cx = (area.left + area.right) / 2.0;
        let cy = (area.top + area.bottom) / 2.0;
        let r = area.width().min(area.height()) / 2.0;
        let total: f64 = slices.iter().map(|s| s.1.max(0.0)).sum();
        if total <= 0.0 {
            return;
        }

        let mut angle = -std::f64::consts::FRAC_PI_2;
        let mut legend = Vec::with_capacity(slices.len());
        for (i, (label, value)) in slices.iter().enumerate() {
            let share = value.max(0.0) / total;
            let color = options.color(i).to_string();
            legend.push((label.clone(), color.clone()));
            if share <= 0.0 {
                continue;
            }
            let sweep = share * std::f64::consts::TAU;
            if share >= 1.0 {
                let _ = write!(
                    self.out,
                    r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="{}"/>"#,
                    cx,
                    cy,
                    r,
                    escape(&color)
                );
            } else {
                let (x1, y1) = (cx + r * angle.cos(), cy + r * angle.sin());
                let end = angle + sweep;
                let (x2, y2) = (cx + r * end.cos(), cy + r * end.sin());
                let large = if sweep > std::f64::consts::PI { 1 } else { 0 };
                let _ = write!(
                    self.out,
                    r#"<path d="M {:.1} {:.1} L {:.1} {:.1} A {:.1} {:.1} 0 {} 1 {:.1} {:.1} Z" fill="{}" stroke="white"/>"#,
                    cx,
                    cy,
                    x1,
                    y1,
                    r,
                    r,
                    large,
                    x2,
                    y2,
                    escape(&color)
                );
            }
            let mid = angle + sweep / 2.0;
            self.text(
                cx + r * 0.6 * mid.cos(),
                cy + r * 0.6 * mid.sin(),
                "middle",
                11,
                &format!("{:.1}%", share * 100.0),
            );
            if !options.show_legend {
                self.text(cx + r * 1.1 * mid.cos(), cy + r * 1.1 * mid.sin(), "middle", 11, label);
            }
            angle += sweep;
        }
        if options.show_legend {
            self.legend(&legend);
        }
    }

    fn polyline(&mut self, points: &[(f64, f64)], color: &str, markers: bool) {
        let path: Vec<String> = points.iter().map(|(x, y)| format!("{:.1},{:.1}", x, y)).collect();
        let _ = write!(
            self.out,
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
            path.join(" "),
            escape(color)
        );
        if markers {
            for (x, y) in points {
                let _ = write!(
                    self.out,
                    r#"<circle cx="{:.1}" cy="{:.1}" r="3" fill="{}"/>"#,
                    x,
                    y,
                    escape(color)
                );
            }
        }
    }
}

/// Min and max of the values, `(0, 1)` when there are none
fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo.is_finite() && hi.is_finite() {
        (lo, hi)
    } else {
        (0.0, 1.0)
    }
}

/// Widens a degenerate range and pads the top slightly
fn nice_range(min: f64, max: f64) -> (f64, f64) {
    if (max - min).abs() < f64::EPSILON {
        return (min - 1.0, max + 1.0);
    }
    (min, max + (max - min) * 0.05)
}

fn format_number(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{:.0}", value)
    } else {
        let text = format!("{:.2}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chart(config: Value, records: Vec<Value>) -> Result<String, EngineError> {
        let mut builder = ChartBuilder::new(serde_json::from_value(config).unwrap())?;
        for r in records {
            builder.push(r.as_object().unwrap());
        }
        Ok(builder.render())
    }

    #[test]
    fn test_bar_chart_counts_categories() {
        let svg = chart(
            json!({"type": "bar", "xAxis": {"field": "status"}, "aggregation": "count", "title": "Deals <open>"}),
            vec![json!({"status": "a"}), json!({"status": "b"}), json!({"status": "a"})],
        )
        .unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<rect").count(), 1 + 2 + 1);
        assert!(svg.contains("Deals &lt;open&gt;"));
    }

    #[test]
    fn test_pie_chart_shares() {
        let svg = chart(
            json!({"type": "pie", "categoryField": "status", "showLegend": false}),
            vec![json!({"status": "a"}), json!({"status": "b"}), json!({"status": "b"}), json!({"status": "b"})],
        )
        .unwrap();
        assert!(svg.contains("25.0%"));
        assert!(svg.contains("75.0%"));
        assert!(svg.contains("Distribution by status"));
    }

    #[test]
    fn test_default_titles_and_sizes() {
        let svg = chart(
            json!({"type": "scatter", "xAxis": {"field": "x"}, "yAxis": {"field": "y", "label": "Yield"}, "width": 400, "height": 300}),
            vec![json!({"x": 1, "y": 2}), json!({"x": 3, "y": "4"}), json!({"x": 5})],
        )
        .unwrap();
        assert!(svg.contains(r#"width="400" height="300""#));
        assert!(svg.contains("Yield vs x"));
        assert_eq!(svg.matches("<circle").count(), 2);
    }

    #[test]
    fn test_time_series_and_histogram() {
        let svg = chart(
            json!({"type": "timeSeries", "xAxis": {"field": "at"}, "yAxis": {"field": "v"}}),
            vec![
                json!({"at": "2024-01-02T00:00:00.000Z", "v": 2}),
                json!({"at": "2024-01-01T00:00:00.000Z", "v": 1}),
            ],
        )
        .unwrap();
        assert!(svg.contains("<polyline"));
        assert!(svg.contains("v over time"));

        let svg = chart(
            json!({"type": "histogram", "yAxis": {"field": "v"}}),
            (0..50).map(|i| json!({"v": i})).collect(),
        )
        .unwrap();
        assert!(svg.contains("Frequency"));
        assert!(svg.contains("Distribution of v"));
    }

    #[test]
    fn test_required_fields() {
        assert!(chart(json!({"type": "pie"}), vec![]).is_err());
        assert!(chart(json!({"type": "line", "xAxis": {"field": "x"}}), vec![]).is_err());
        assert!(chart(json!({"type": "bar", "xAxis": {"field": "x"}, "aggregation": "sum"}), vec![]).is_err());
        assert!(chart(json!({"type": "bar", "xAxis": {"field": "x"}}), vec![]).is_ok());
        assert!(chart(json!({}), vec![]).is_err());
    }
}
