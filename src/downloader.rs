use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::aggregate::{self, Compliance, GroupTotal};
use crate::error::{DashboardError, Result};
use crate::record::{Dimension, Measure, SalesDataset};

/// Convert grouped totals to CSV
///
/// The first row is a header with `key_label` and `value_label`; one row
/// follows per group in the order given.
///
/// # Examples
/// ```
/// use sales_dashboard::aggregate::GroupTotal;
/// use sales_dashboard::downloader::totals_to_csv;
///
/// let rows = vec![GroupTotal { key: "Bogota, Centro".into(), value: 150.0 }];
/// let csv = totals_to_csv(&rows, "branch", "amount").unwrap();
/// assert_eq!(csv, "branch,amount\n\"Bogota, Centro\",150\n");
/// ```
pub fn totals_to_csv(rows: &[GroupTotal], key_label: &str, value_label: &str) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([key_label, value_label]).map_err(csv_error)?;
    for row in rows {
        writer
            .write_record([row.key.clone(), row.value.to_string()])
            .map_err(csv_error)?;
    }
    finish_csv(writer)
}

/// Convert the records of a dataset to CSV with canonical column names
pub fn records_to_csv(dataset: &SalesDataset) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["date", "branch", "product", "seller", "amount", "target", "hour"])
        .map_err(csv_error)?;
    for record in dataset {
        writer
            .write_record([
                record.date.format("%Y-%m-%d").to_string(),
                record.branch.clone(),
                record.product.clone(),
                record.seller.clone().unwrap_or_default(),
                record.amount.to_string(),
                record.target.to_string(),
                record.hour.map(|h| h.to_string()).unwrap_or_default(),
            ])
            .map_err(csv_error)?;
    }
    finish_csv(writer)
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| DashboardError::Render(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| DashboardError::Render(e.to_string()))
}

fn csv_error(e: csv::Error) -> DashboardError {
    DashboardError::Render(format!("csv export: {}", e))
}

type SheetResult = std::result::Result<Worksheet, XlsxError>;

fn xlsx_error(e: XlsxError) -> DashboardError {
    DashboardError::Render(format!("xlsx export: {}", e))
}

/// Convert a dataset to an XLSX workbook
///
/// Sheets: the records themselves, sales by product, branch and seller,
/// and compliance by branch. Compliance reads N/A where the target is zero.
pub fn to_xlsx(dataset: &SalesDataset) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    workbook.push_worksheet(records_sheet(dataset, &bold).map_err(xlsx_error)?);
    for dimension in Dimension::ALL {
        if dimension == Dimension::Seller && !dataset.has_sellers() {
            continue;
        }
        let totals = aggregate::top_by(dataset, dimension, Measure::Amount, None);
        let name = format!("By {}", dimension.label().to_lowercase());
        workbook.push_worksheet(
            totals_sheet(&name, dimension.label(), &totals, &bold).map_err(xlsx_error)?,
        );
    }
    workbook.push_worksheet(compliance_sheet(dataset, &bold).map_err(xlsx_error)?);

    workbook.save_to_buffer().map_err(xlsx_error)
}

fn records_sheet(dataset: &SalesDataset, bold: &Format) -> SheetResult {
    let mut sheet = Worksheet::new();
    sheet.set_name("Records")?;
    let headers = ["Date", "Branch", "Product", "Seller", "Amount", "Target", "Hour"];
    for (c, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, c as u16, *header, bold)?;
    }
    for (i, record) in dataset.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, record.date.format("%Y-%m-%d").to_string())?;
        sheet.write_string(row, 1, &record.branch)?;
        sheet.write_string(row, 2, &record.product)?;
        if let Some(seller) = &record.seller {
            sheet.write_string(row, 3, seller)?;
        }
        sheet.write_number(row, 4, record.amount)?;
        sheet.write_number(row, 5, record.target)?;
        if let Some(hour) = record.hour {
            sheet.write_number(row, 6, hour as f64)?;
        }
    }
    Ok(sheet)
}

fn totals_sheet(
    name: &str,
    key_label: &str,
    totals: &[GroupTotal],
    bold: &Format,
) -> SheetResult {
    let mut sheet = Worksheet::new();
    sheet.set_name(name)?;
    sheet.write_string_with_format(0, 0, key_label, bold)?;
    sheet.write_string_with_format(0, 1, "Amount", bold)?;
    for (i, total) in totals.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, &total.key)?;
        sheet.write_number(row, 1, total.value)?;
    }
    Ok(sheet)
}

fn compliance_sheet(dataset: &SalesDataset, bold: &Format) -> SheetResult {
    let mut sheet = Worksheet::new();
    sheet.set_name("Compliance by branch")?;
    for (c, header) in ["Branch", "Amount", "Target", "Compliance %"].iter().enumerate() {
        sheet.write_string_with_format(0, c as u16, *header, bold)?;
    }
    for (i, group) in aggregate::group_compliance(dataset, Dimension::Branch)
        .iter()
        .enumerate()
    {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, &group.key)?;
        sheet.write_number(row, 1, group.amount)?;
        sheet.write_number(row, 2, group.target)?;
        match group.compliance {
            Compliance::Percent(p) => sheet.write_number(row, 3, p)?,
            Compliance::Undefined => sheet.write_string(row, 3, "N/A")?,
        };
    }
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SalesRecord;
    use chrono::NaiveDate;

    fn data() -> SalesDataset {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        vec![
            SalesRecord::create(d, "Norte", "A", 100.0, 0.0).with_hour(9),
            SalesRecord::create(d, "Sur", "B", 40.0, 50.0).with_seller("Ana"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn records_csv_leaves_missing_optionals_blank() {
        let csv = records_to_csv(&data()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,branch,product,seller,amount,target,hour");
        assert_eq!(lines[1], "2024-01-02,Norte,A,,100,0,9");
        assert_eq!(lines[2], "2024-01-02,Sur,B,Ana,40,50,");
    }

    #[test]
    fn totals_csv_keeps_given_order() {
        let totals = aggregate::top_by(&data(), Dimension::Branch, Measure::Amount, None);
        let csv = totals_to_csv(&totals, "branch", "amount").unwrap();
        assert_eq!(csv, "branch,amount\nNorte,100\nSur,40\n");
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = to_xlsx(&data()).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
