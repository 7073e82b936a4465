use plotters::element::Pie;
use plotters::prelude::*;
use std::io::Cursor;

use crate::aggregate::{CrossTable, GroupTotal};
use crate::error::{DashboardError, Result};
use crate::view::ChartKind;

/// Configuration options for chart generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the chart
    pub title: String,

    /// Label for the X-axis
    pub x_label: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,

    pub graph_type: ChartKind,
}

impl Default for GraphOptions {
    /// Bar chart, 800x600, generic labels
    fn default() -> Self {
        Self {
            title: "Sales".to_string(),
            x_label: String::new(),
            y_label: "Sales".to_string(),
            width: 800,
            height: 600,
            graph_type: ChartKind::Bar,
        }
    }
}

impl GraphOptions {
    pub fn new(title: &str, graph_type: ChartKind) -> Self {
        Self {
            title: title.to_string(),
            graph_type,
            ..Self::default()
        }
    }

    pub fn sized(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// Slice colours, cycled when there are more groups than colours
const PALETTE: [RGBColor; 8] = [
    RGBColor(229, 9, 20),
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

/// Upper bound of the value axis: 10% headroom, never zero
pub fn value_ceiling(series: &[GroupTotal]) -> f64 {
    let max = series.iter().map(|g| g.value).fold(0.0_f64, f64::max);
    if max <= 0.0 { 1.0 } else { max * 1.1 }
}

/// Percentage share of each slice; empty when the total is not positive
pub fn pie_shares(series: &[GroupTotal]) -> Vec<(String, f64)> {
    let total: f64 = series.iter().map(|g| g.value.max(0.0)).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    series
        .iter()
        .filter(|g| g.value > 0.0)
        .map(|g| (g.key.clone(), g.value / total * 100.0))
        .collect()
}

/// Renders a chart into a raw RGB buffer (`width * height * 3` bytes)
pub fn render_rgb(series: &[GroupTotal], options: &GraphOptions) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; (options.width * options.height * 3) as usize];
    draw_chart(&mut buffer, series, options)
        .map_err(|e| DashboardError::Render(format!("{}: {}", options.title, e)))?;
    Ok(buffer)
}

/// Renders a chart as PNG bytes
pub fn render_png(series: &[GroupTotal], options: &GraphOptions) -> Result<Vec<u8>> {
    encode_png(render_rgb(series, options)?, options)
}

/// Upper bound of the value axis for a two-key table
pub fn table_ceiling(table: &CrossTable) -> f64 {
    let max = table.values.iter().flatten().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 { 1.0 } else { max * 1.1 }
}

/// Grouped bars: one cluster per table row, one colour per column
pub fn render_grouped_png(table: &CrossTable, options: &GraphOptions) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; (options.width * options.height * 3) as usize];
    draw_grouped_bars(&mut buffer, table, options)
        .map_err(|e| DashboardError::Render(format!("{}: {}", options.title, e)))?;
    encode_png(buffer, options)
}

fn encode_png(buffer: Vec<u8>, options: &GraphOptions) -> Result<Vec<u8>> {
    let image = image::RgbImage::from_raw(options.width, options.height, buffer)
        .ok_or_else(|| DashboardError::Render("chart buffer has the wrong size".into()))?;
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
        .map_err(|e| DashboardError::Render(e.to_string()))?;
    Ok(png)
}

fn draw_chart(
    buffer: &mut [u8],
    series: &[GroupTotal],
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::with_buffer(buffer, (options.width, options.height))
        .into_drawing_area();
    root.fill(&WHITE)?;

    match options.graph_type {
        ChartKind::Bar => draw_bars(&root, series, options)?,
        ChartKind::Line => draw_line(&root, series, options)?,
        ChartKind::Pie => draw_pie(&root, series, options)?,
    }

    root.present()?;
    Ok(())
}

fn draw_grouped_bars(
    buffer: &mut [u8],
    table: &CrossTable,
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::with_buffer(buffer, (options.width, options.height))
        .into_drawing_area();
    root.fill(&WHITE)?;

    let slots = table.rows.len().max(1) as f64;
    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..slots, 0.0..table_ceiling(table))?;

    let label = |x: &f64| {
        let slot = *x - 0.5;
        if slot < 0.0 {
            return String::new();
        }
        table.rows.get(slot.floor() as usize).cloned().unwrap_or_default()
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(table.rows.len().max(1))
        .x_label_formatter(&label)
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    let width = 0.7 / table.columns.len().max(1) as f64;
    for (c, column) in table.columns.iter().enumerate() {
        let color = PALETTE[c % PALETTE.len()];
        chart
            .draw_series(table.values.iter().enumerate().map(|(r, row)| {
                let x = r as f64 + 0.15 + c as f64 * width;
                Rectangle::new([(x, 0.0), (x + width, row[c])], color.filled())
            }))?
            .label(column.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn category_label(series: &[GroupTotal], x: f64) -> String {
    if x < 0.0 {
        return String::new();
    }
    series
        .get(x.floor() as usize)
        .map(|g| g.key.clone())
        .unwrap_or_default()
}

/// One bar per group, labelled with its key
fn draw_bars<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    series: &[GroupTotal],
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn std::error::Error>>
where
    DB::ErrorType: 'static,
{
    let slots = series.len().max(1) as f64;
    let mut chart = ChartBuilder::on(root)
        .caption(&options.title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..slots, 0.0..value_ceiling(series))?;

    let label = |x: &f64| category_label(series, *x - 0.5);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(series.len().max(1))
        .x_label_formatter(&label)
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    chart.draw_series(series.iter().enumerate().map(|(i, g)| {
        let x = i as f64;
        Rectangle::new(
            [(x + 0.15, 0.0), (x + 0.85, g.value)],
            PALETTE[i % PALETTE.len()].filled(),
        )
    }))?;

    Ok(())
}

/// Points joined in series order, e.g. Monday..Sunday or month by month
fn draw_line<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    series: &[GroupTotal],
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn std::error::Error>>
where
    DB::ErrorType: 'static,
{
    let last = (series.len().max(2) - 1) as f64;
    let mut chart = ChartBuilder::on(root)
        .caption(&options.title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.25..last + 0.25, 0.0..value_ceiling(series))?;

    let label = |x: &f64| {
        if (x - x.round()).abs() < 1e-6 {
            category_label(series, x.round())
        } else {
            String::new()
        }
    };
    chart
        .configure_mesh()
        .x_labels(series.len().max(2))
        .x_label_formatter(&label)
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    let points: Vec<(f64, f64)> = series
        .iter()
        .enumerate()
        .map(|(i, g)| (i as f64, g.value))
        .collect();
    chart.draw_series(LineSeries::new(points.clone(), &PALETTE[1]))?;
    chart.draw_series(
        points
            .into_iter()
            .map(|p| Circle::new(p, 4, PALETTE[0].filled())),
    )?;

    Ok(())
}

/// Share of each group; a chart with nothing to share shows a note instead
fn draw_pie<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    series: &[GroupTotal],
    options: &GraphOptions,
) -> std::result::Result<(), Box<dyn std::error::Error>>
where
    DB::ErrorType: 'static,
{
    let area = root.titled(&options.title, ("sans-serif", 30).into_font())?;
    let shares = pie_shares(series);
    let (w, h) = area.dim_in_pixel();

    if shares.is_empty() {
        area.draw(&Text::new(
            "No data",
            (w as i32 / 2 - 30, h as i32 / 2),
            ("sans-serif", 20).into_font(),
        ))?;
        return Ok(());
    }

    let center = (w as i32 / 2, h as i32 / 2);
    let radius = (w.min(h) as f64) * 0.35;
    let sizes: Vec<f64> = shares.iter().map(|(_, s)| *s).collect();
    let colors: Vec<RGBColor> = (0..shares.len())
        .map(|i| PALETTE[i % PALETTE.len()])
        .collect();
    let labels: Vec<String> = shares
        .iter()
        .map(|(k, s)| format!("{} {:.1}%", k, s))
        .collect();

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.label_style(("sans-serif", 16).into_font());
    area.draw(&pie)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[(&str, f64)]) -> Vec<GroupTotal> {
        values
            .iter()
            .map(|(k, v)| GroupTotal {
                key: k.to_string(),
                value: *v,
            })
            .collect()
    }

    #[test]
    fn ceiling_never_collapses_to_zero() {
        assert_eq!(value_ceiling(&[]), 1.0);
        assert_eq!(value_ceiling(&series(&[("a", 0.0)])), 1.0);
        assert!((value_ceiling(&series(&[("a", 100.0), ("b", 50.0)])) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn pie_shares_sum_to_hundred() {
        let shares = pie_shares(&series(&[("a", 30.0), ("b", 10.0), ("c", 0.0)]));
        assert_eq!(shares.len(), 2);
        assert!((shares[0].1 - 75.0).abs() < 1e-9);
        assert!((shares.iter().map(|s| s.1).sum::<f64>() - 100.0).abs() < 1e-9);
        assert!(pie_shares(&series(&[("a", 0.0)])).is_empty());
    }

    #[test]
    fn grouped_ceiling_uses_the_largest_cell() {
        let table = CrossTable {
            rows: vec!["A".into(), "B".into()],
            columns: vec!["Norte".into(), "Sur".into()],
            values: vec![vec![10.0, 40.0], vec![0.0, 20.0]],
        };
        assert!((table_ceiling(&table) - 44.0).abs() < 1e-9);
        let empty = CrossTable {
            rows: Vec::new(),
            columns: Vec::new(),
            values: Vec::new(),
        };
        assert_eq!(table_ceiling(&empty), 1.0);
    }

    #[test]
    fn category_labels_follow_series_order() {
        let s = series(&[("Monday", 1.0), ("Tuesday", 2.0)]);
        assert_eq!(category_label(&s, 1.0), "Tuesday");
        assert_eq!(category_label(&s, 5.0), "");
        assert_eq!(category_label(&s, -0.5), "");
    }
}
