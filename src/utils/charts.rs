//! SVG Chart Generator
//!
//! Renders the training curves, the confusion matrix heatmap and the
//! per-species accuracy bars as standalone SVG files.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const PANEL_WIDTH: f64 = 640.0;
const CHART_HEIGHT: f64 = 480.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 90.0;
const MARGIN_LEFT: f64 = 80.0;

pub const COLOR_PRIMARY: &str = "#3498db";
pub const COLOR_SECONDARY: &str = "#2ecc71";
pub const COLOR_TERTIARY: &str = "#e74c3c";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";
const FONT: &str = "Arial, sans-serif";

/// Palette cycled through for per-species bars
pub const PALETTE: [&str; 6] = [
    COLOR_PRIMARY,
    COLOR_SECONDARY,
    COLOR_TERTIARY,
    "#9b59b6",
    "#f39c12",
    "#1abc9c",
];

/// A data series for line charts
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    /// (x, y) pairs
    pub points: Vec<(f64, f64)>,
    pub color: String,
}

impl DataSeries {
    /// Series over epochs 1..=n
    pub fn from_epochs(name: &str, values: &[f64], color: &str) -> Self {
        Self {
            name: name.to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &v)| ((i + 1) as f64, v))
                .collect(),
            color: color.to_string(),
        }
    }
}

/// One panel of a line chart
#[derive(Debug, Clone)]
pub struct LinePanel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<DataSeries>,
}

/// Bar chart data
#[derive(Debug, Clone)]
pub struct BarData {
    pub label: String,
    /// Value in percent
    pub value: f64,
    pub color: String,
}

/// Generate an SVG with one or more line panels side by side
pub fn generate_line_chart(panels: &[LinePanel], output_path: &Path) -> std::io::Result<()> {
    let width = PANEL_WIDTH * panels.len().max(1) as f64;
    let mut svg = svg_header(width, CHART_HEIGHT);

    for (i, panel) in panels.iter().enumerate() {
        render_line_panel(&mut svg, i as f64 * PANEL_WIDTH, panel);
    }

    svg.push_str("</svg>");
    fs::write(output_path, svg)
}

fn render_line_panel(svg: &mut String, offset_x: f64, panel: &LinePanel) {
    let plot_width = PANEL_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let left = offset_x + MARGIN_LEFT;

    let (x_min, x_max, y_min, y_max) = find_ranges(&panel.series);
    let y_min = y_min.min(0.0);
    let y_max = if y_max > y_min { y_max * 1.05 } else { y_min + 1.0 };
    let x_span = if x_max > x_min { x_max - x_min } else { 1.0 };

    let to_x = |x: f64| left + ((x - x_min) / x_span) * plot_width;
    let to_y = |y: f64| MARGIN_TOP + plot_height - ((y - y_min) / (y_max - y_min)) * plot_height;

    push_text(svg, offset_x + PANEL_WIDTH / 2.0, 35.0, "middle", 18, true, &panel.title);

    for i in 0..=5 {
        let value = y_min + (i as f64 / 5.0) * (y_max - y_min);
        let y = to_y(value);
        let _ = write!(
            svg,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            left, y, left + plot_width, y, COLOR_GRID
        );
        push_text(svg, left - 10.0, y + 4.0, "end", 12, false, &format!("{:.2}", value));
    }

    push_axes(svg, left, plot_width, plot_height);

    push_text(
        svg,
        left + plot_width / 2.0,
        CHART_HEIGHT - 45.0,
        "middle",
        14,
        false,
        &panel.x_label,
    );
    let label_x = offset_x + 20.0;
    let _ = write!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="{}" font-size="14" fill="{}" transform="rotate(-90 {} {})">{}</text>"#,
        label_x,
        CHART_HEIGHT / 2.0,
        FONT,
        COLOR_TEXT,
        label_x,
        CHART_HEIGHT / 2.0,
        escape_xml(&panel.y_label)
    );

    for series in &panel.series {
        if series.points.is_empty() {
            continue;
        }

        let path: Vec<String> = series
            .points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                format!("{} {} {}", if i == 0 { "M" } else { "L" }, to_x(x), to_y(y))
            })
            .collect();

        let _ = write!(
            svg,
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
            path.join(" "),
            series.color
        );

        for &(x, y) in &series.points {
            let _ = write!(
                svg,
                r#"<circle cx="{}" cy="{}" r="3" fill="{}"/>"#,
                to_x(x),
                to_y(y),
                series.color
            );
        }
    }

    // X ticks from the longest series
    if let Some(longest) = panel.series.iter().max_by_key(|s| s.points.len()) {
        let step = (longest.points.len() / 10).max(1);
        for &(x, _) in longest.points.iter().step_by(step) {
            push_text(
                svg,
                to_x(x),
                MARGIN_TOP + plot_height + 20.0,
                "middle",
                11,
                false,
                &format!("{:.0}", x),
            );
        }
    }

    let mut legend_y = MARGIN_TOP + 10.0;
    for series in &panel.series {
        let legend_x = offset_x + PANEL_WIDTH - MARGIN_RIGHT - 160.0;
        let _ = write!(
            svg,
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            legend_x, legend_y, series.color
        );
        push_text(svg, legend_x + 20.0, legend_y + 12.0, "start", 12, false, &series.name);
        legend_y += 25.0;
    }
}

/// Generate a bar chart SVG, values in percent
pub fn generate_bar_chart(
    title: &str,
    y_label: &str,
    bars: &[BarData],
    output_path: &Path,
) -> std::io::Result<()> {
    let plot_width = PANEL_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let y_max = bars.iter().map(|b| b.value).fold(0.0f64, f64::max).max(100.0);

    let slot = plot_width / bars.len().max(1) as f64;
    let bar_width = slot * 0.7;
    let bar_gap = slot * 0.3;

    let mut svg = svg_header(PANEL_WIDTH, CHART_HEIGHT);
    push_text(&mut svg, PANEL_WIDTH / 2.0, 35.0, "middle", 18, true, title);

    for i in 0..=5 {
        let y = MARGIN_TOP + plot_height - (i as f64 / 5.0) * plot_height;
        let value = (i as f64 / 5.0) * y_max;
        let _ = write!(
            svg,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        );
        push_text(&mut svg, MARGIN_LEFT - 10.0, y + 4.0, "end", 12, false, &format!("{:.0}%", value));
    }

    push_axes(&mut svg, MARGIN_LEFT, plot_width, plot_height);

    let _ = write!(
        svg,
        r#"<text x="20" y="{}" text-anchor="middle" font-family="{}" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0,
        FONT,
        COLOR_TEXT,
        CHART_HEIGHT / 2.0,
        escape_xml(y_label)
    );

    for (i, bar) in bars.iter().enumerate() {
        let x = MARGIN_LEFT + i as f64 * slot + bar_gap / 2.0;
        let bar_height = (bar.value / y_max) * plot_height;
        let y = MARGIN_TOP + plot_height - bar_height;

        let _ = write!(
            svg,
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" rx="4"/>"#,
            x, y, bar_width, bar_height, bar.color
        );
        push_text(
            &mut svg,
            x + bar_width / 2.0,
            y - 8.0,
            "middle",
            12,
            true,
            &format!("{:.2}%", bar.value),
        );
        push_text(
            &mut svg,
            x + bar_width / 2.0,
            MARGIN_TOP + plot_height + 25.0,
            "middle",
            11,
            false,
            &bar.label,
        );
    }

    svg.push_str("</svg>");
    fs::write(output_path, svg)
}

/// Generate a heatmap of row-normalized values in [0, 1]
///
/// Rows are drawn top to bottom, columns left to right.
pub fn generate_heatmap(
    title: &str,
    row_axis_label: &str,
    col_axis_label: &str,
    labels: &[String],
    values: &[Vec<f64>],
    output_path: &Path,
) -> std::io::Result<()> {
    let n = labels.len().max(1);
    let cell = 120.0;
    let left = 200.0;
    let top = 80.0;
    let width = left + cell * n as f64 + 60.0;
    let height = top + cell * n as f64 + 140.0;

    let mut svg = svg_header(width, height);
    push_text(&mut svg, width / 2.0, 40.0, "middle", 20, true, title);

    for (row, row_values) in values.iter().enumerate() {
        for (col, &value) in row_values.iter().enumerate() {
            let x = left + col as f64 * cell;
            let y = top + row as f64 * cell;
            let _ = write!(
                svg,
                r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" stroke="white" stroke-width="2"/>"#,
                x,
                y,
                cell,
                cell,
                blues(value)
            );
            let text_color = if value > 0.5 { "white" } else { COLOR_TEXT };
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="{}" font-size="16" fill="{}">{:.2}</text>"#,
                x + cell / 2.0,
                y + cell / 2.0 + 6.0,
                FONT,
                text_color,
                value
            );
        }
    }

    for (i, label) in labels.iter().enumerate() {
        push_text(
            &mut svg,
            left - 10.0,
            top + i as f64 * cell + cell / 2.0 + 4.0,
            "end",
            12,
            false,
            label,
        );
        push_text(
            &mut svg,
            left + i as f64 * cell + cell / 2.0,
            top + n as f64 * cell + 20.0,
            "middle",
            12,
            false,
            label,
        );
    }

    push_text(
        &mut svg,
        left + cell * n as f64 / 2.0,
        top + n as f64 * cell + 60.0,
        "middle",
        16,
        false,
        col_axis_label,
    );
    let mid_y = top + cell * n as f64 / 2.0;
    let _ = write!(
        svg,
        r#"<text x="24" y="{}" text-anchor="middle" font-family="{}" font-size="16" fill="{}" transform="rotate(-90 24 {})">{}</text>"#,
        mid_y,
        FONT,
        COLOR_TEXT,
        mid_y,
        escape_xml(row_axis_label)
    );

    svg.push_str("</svg>");
    fs::write(output_path, svg)
}

fn svg_header(width: f64, height: f64) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}"><rect width="{w}" height="{h}" fill="white"/>"#,
        w = width,
        h = height
    )
}

fn push_axes(svg: &mut String, left: f64, plot_width: f64, plot_height: f64) {
    let _ = write!(
        svg,
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        left,
        MARGIN_TOP + plot_height,
        left + plot_width,
        MARGIN_TOP + plot_height,
        COLOR_AXIS
    );
    let _ = write!(
        svg,
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        left,
        MARGIN_TOP,
        left,
        MARGIN_TOP + plot_height,
        COLOR_AXIS
    );
}

fn push_text(svg: &mut String, x: f64, y: f64, anchor: &str, size: u32, bold: bool, text: &str) {
    let weight = if bold { r#" font-weight="bold""# } else { "" };
    let _ = write!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="{}" font-family="{}" font-size="{}"{} fill="{}">{}</text>"#,
        x,
        y,
        anchor,
        FONT,
        size,
        weight,
        COLOR_TEXT,
        escape_xml(text)
    );
}

/// White-to-blue color ramp
fn blues(value: f64) -> String {
    let t = value.clamp(0.0, 1.0);
    let lerp = |from: f64, to: f64| (from + (to - from) * t).round() as u8;
    format!("#{:02x}{:02x}{:02x}", lerp(247.0, 8.0), lerp(251.0, 48.0), lerp(255.0, 107.0))
}

fn find_ranges(series: &[DataSeries]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for (x, y) in series.iter().flat_map(|s| s.points.iter().copied()) {
        if !y.is_finite() {
            continue;
        }
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    if !x_min.is_finite() {
        return (0.0, 1.0, 0.0, 1.0);
    }

    (x_min, x_max, y_min, y_max)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
