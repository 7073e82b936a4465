//! PDF summary: cover page, KPI block, three charts and a fixed
//! recommendations section.

use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use log::warn;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::io::Write;

use crate::aggregate::{self, GroupTotal, Kpis};
use crate::error::{DashboardError, Result};
use crate::format::{format_compliance, format_currency};
use crate::graph::{self, GraphOptions};
use crate::record::{DateFilter, Dimension, Measure, SalesDataset};
use crate::view::ChartKind;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const CHART_PIXELS: (u32, u32) = (800, 400);
const CHART_POINTS: (i64, i64) = (495, 248);

pub const RECOMMENDATIONS: [&str; 4] = [
    "General management: build strategy around the best-performing branches.",
    "Marketing: concentrate campaigns on the strongest days and hours.",
    "Commercial: use dynamic targets and incentives.",
    "Sales team: apply behavioural-economics selling techniques.",
];

/// A chart to be placed in the report
#[derive(Clone, Debug)]
pub struct ReportChart {
    pub title: String,
    pub kind: ChartKind,
    pub series: Vec<GroupTotal>,
}

/// Everything printed in the report
#[derive(Clone, Debug)]
pub struct ReportContent {
    pub title: String,
    pub subtitle: String,
    pub generated_on: NaiveDate,
    pub range: Option<DateFilter>,
    pub kpis: Kpis,
    pub charts: Vec<ReportChart>,
    pub recommendations: Vec<String>,
}

/// Collects the report figures for `dataset` within `range`
pub fn report_content(
    dataset: &SalesDataset,
    range: Option<DateFilter>,
    generated_on: NaiveDate,
) -> ReportContent {
    let data = aggregate::filter_range(dataset, range);
    let middle = if data.has_hours() {
        ReportChart {
            title: "Sales by hour".into(),
            kind: ChartKind::Bar,
            series: aggregate::hour_bucket(&data, Measure::Amount).entries,
        }
    } else {
        ReportChart {
            title: "Sales by month".into(),
            kind: ChartKind::Line,
            series: aggregate::month_bucket(&data, Measure::Amount).entries,
        }
    };

    ReportContent {
        title: "Management Sales Report".into(),
        subtitle: "Executive edition - CEO and commercial management".into(),
        generated_on,
        range,
        kpis: aggregate::kpis(&data),
        charts: vec![
            ReportChart {
                title: "Sales by weekday".into(),
                kind: ChartKind::Bar,
                series: aggregate::day_of_week_bucket(&data, Measure::Amount).entries,
            },
            middle,
            ReportChart {
                title: "Sales by branch".into(),
                kind: ChartKind::Bar,
                series: aggregate::group_sum(&data, Dimension::Branch, Measure::Amount).entries,
            },
        ],
        recommendations: RECOMMENDATIONS.iter().map(|r| r.to_string()).collect(),
    }
}

pub fn build_report(
    dataset: &SalesDataset,
    range: Option<DateFilter>,
    generated_on: NaiveDate,
) -> Result<Vec<u8>> {
    render_pdf(&report_content(dataset, range, generated_on))
}

/// KPI lines printed under the cover
pub fn kpi_lines(kpis: &Kpis) -> Vec<String> {
    let leader = |entry: &Option<GroupTotal>| {
        entry
            .as_ref()
            .map(|e| format!("{} ({})", e.key, format_currency(e.value)))
            .unwrap_or_else(|| "-".to_string())
    };
    vec![
        format!("Total sales: {}", format_currency(kpis.total_amount)),
        format!("Total target: {}", format_currency(kpis.total_target)),
        format!("Compliance: {}", format_compliance(&kpis.compliance)),
        format!("Top product: {}", leader(&kpis.top_product)),
        format!("Leading branch: {}", leader(&kpis.top_branch)),
        format!("Top seller: {}", leader(&kpis.top_seller)),
    ]
}

/// PDF strings are written in WinAnsi; characters outside Latin-1 become '?'
fn pdf_text(text: &str) -> Object {
    let bytes: Vec<u8> = text
        .chars()
        .map(|c| if (c as u32) < 256 { c as u32 as u8 } else { b'?' })
        .collect();
    Object::string_literal(bytes)
}

struct Page {
    operations: Vec<Operation>,
    images: Vec<(String, ObjectId)>,
    cursor: i64,
}

impl Page {
    fn new() -> Self {
        Page {
            operations: Vec::new(),
            images: Vec::new(),
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    fn fits(&self, height: i64) -> bool {
        self.cursor - height >= MARGIN
    }

    fn text_at(&mut self, font: &str, size: i64, x: i64, y: i64, text: &str) {
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![pdf_text(text)]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn line(&mut self, font: &str, size: i64, text: &str) {
        self.cursor -= size + 6;
        let y = self.cursor;
        self.text_at(font, size, MARGIN, y, text);
    }

    /// Horizontally centred text, width estimated from the font size
    fn centred(&mut self, font: &str, size: i64, text: &str) {
        self.cursor -= size + 8;
        let width = text.chars().count() as i64 * size / 2;
        let x = ((PAGE_WIDTH - width) / 2).max(MARGIN);
        let y = self.cursor;
        self.text_at(font, size, x, y, text);
    }

    fn image(&mut self, name: &str, id: ObjectId, width: i64, height: i64) {
        self.cursor -= height + 6;
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0_i64.into(),
                    0_i64.into(),
                    height.into(),
                    MARGIN.into(),
                    self.cursor.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        self.images.push((name.to_string(), id));
    }
}

fn image_object(rgb: &[u8], width: u32, height: u32) -> Result<Stream> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(rgb)?;
    let compressed = encoder.finish()?;
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "FlateDecode",
        },
        compressed,
    );
    stream.allows_compression = false;
    Ok(stream)
}

/// Lays out `content` and returns the PDF bytes
pub fn render_pdf(content: &ReportContent) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut pages = Vec::new();

    // cover
    let mut cover = Page::new();
    cover.cursor -= 220;
    cover.centred("F2", 24, &content.title);
    cover.centred("F1", 14, &content.subtitle);
    cover.centred("F1", 14, &format!("Date: {}", content.generated_on.format("%Y-%m-%d")));
    if let Some(range) = content.range {
        cover.centred(
            "F1",
            12,
            &format!("Period: {} to {}", range.start, range.end),
        );
    }
    pages.push(cover);

    let mut page = Page::new();
    page.line("F2", 16, "Management analysis");
    page.cursor -= 6;
    for line in kpi_lines(&content.kpis) {
        page.line("F1", 12, &line);
    }
    page.cursor -= 10;

    for (idx, chart) in content.charts.iter().enumerate() {
        if !page.fits(CHART_POINTS.1 + 30) {
            pages.push(std::mem::replace(&mut page, Page::new()));
        }
        page.line("F2", 12, &format!("Chart: {}", chart.title));
        let options = GraphOptions::new(&chart.title, chart.kind)
            .sized(CHART_PIXELS.0, CHART_PIXELS.1);
        match graph::render_rgb(&chart.series, &options) {
            Ok(rgb) => {
                let id = doc.add_object(image_object(&rgb, CHART_PIXELS.0, CHART_PIXELS.1)?);
                page.image(&format!("Im{}", idx + 1), id, CHART_POINTS.0, CHART_POINTS.1);
            }
            Err(e) => {
                warn!("leaving chart '{}' out of the report: {}", chart.title, e);
                page.line("F1", 11, "(chart unavailable)");
            }
        }
        page.cursor -= 10;
    }

    let needed = 30 + 18 * content.recommendations.len() as i64;
    if !page.fits(needed) {
        pages.push(std::mem::replace(&mut page, Page::new()));
    }
    page.line("F2", 12, "Recommendations");
    for rec in &content.recommendations {
        page.line("F1", 11, &format!("- {}", rec));
    }
    pages.push(page);

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let stream = Content {
            operations: page.operations,
        }
        .encode()
        .map_err(|e| DashboardError::Render(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), stream));

        let mut xobjects = Dictionary::new();
        for (name, id) in page.images {
            xobjects.set(name, id);
        }
        let resources = dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
            "XObject" => xobjects,
        };
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0_i64.into(), 0_i64.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| DashboardError::Render(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SalesRecord;

    fn data() -> SalesDataset {
        let d = |day| NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        vec![
            SalesRecord::create(d(3), "Bogota", "A", 100.0, 80.0).with_seller("Ana"),
            SalesRecord::create(d(4), "Cali", "B", 50.0, 100.0).with_seller("Luis"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn content_has_three_charts_and_month_fallback() {
        let content = report_content(&data(), None, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(content.charts.len(), 3);
        assert_eq!(content.charts[0].series.len(), 7);
        assert_eq!(content.charts[1].title, "Sales by month");
        assert_eq!(content.recommendations.len(), RECOMMENDATIONS.len());
    }

    #[test]
    fn kpi_lines_show_na_for_zero_target() {
        let empty = SalesDataset::default();
        let lines = kpi_lines(&aggregate::kpis(&empty));
        assert!(lines.contains(&"Compliance: N/A".to_string()));
        assert!(lines.contains(&"Top product: -".to_string()));
    }

    #[test]
    fn report_is_a_pdf_even_when_charts_fail() {
        // charts need system fonts; missing ones only drop the images
        let bytes = build_report(&data(), None, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap())
            .unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
    }

    #[test]
    fn selected_period_is_printed_on_the_cover() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        let range = DateFilter::new(d(4), d(30));
        let content = report_content(&data(), Some(range), d(30));
        assert_eq!(content.kpis.record_count, 1);

        let bytes = build_report(&data(), Some(range), d(30)).unwrap();
        let needle = b"Period: 2024-06-04 to 2024-06-30";
        assert!(bytes.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn non_latin_text_is_replaced() {
        match pdf_text("Año €") {
            Object::String(bytes, _) => assert_eq!(bytes, vec![b'A', 0xF1, b'o', b' ', b'?']),
            other => panic!("unexpected object {:?}", other),
        }
    }
}
