use calamine::{Data, DataType, Range, Reader, open_workbook_auto, open_workbook_auto_from_rs};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use log::{debug, info};
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::{DashboardError, Result};
use crate::record::{SalesDataset, SalesRecord};
use crate::schema::{Column, ColumnMap, HeaderAliases};

/// Date layouts accepted in text cells, tried in order
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// A cell value as read from the source, before typing
#[derive(Clone, Debug, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl RawCell {
    fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    fn display(&self) -> String {
        match self {
            RawCell::Empty => String::new(),
            RawCell::Text(s) => s.clone(),
            RawCell::Number(n) => n.to_string(),
            RawCell::Date(d) => d.to_string(),
        }
    }
}

/// Where a dataset comes from
#[derive(Clone, Debug)]
pub enum Source<'a> {
    /// A CSV or XLSX file on disk, chosen by extension
    Path(&'a Path),
    /// An uploaded file held in memory; `name` carries the extension
    Upload { name: &'a str, bytes: &'a [u8] },
}

/// Load a sales dataset from any supported source
///
/// # Examples
/// ```no_run
/// use sales_dashboard::loader::{load, Source};
/// use sales_dashboard::schema::HeaderAliases;
/// use std::path::Path;
///
/// match load(Source::Path(Path::new("data/sales.xlsx")), &HeaderAliases::default()) {
///     Ok(data) => println!("Loaded {} sales rows", data.len()),
///     Err(e) => eprintln!("{}", e.user_message()),
/// }
/// ```
pub fn load(source: Source<'_>, aliases: &HeaderAliases) -> Result<SalesDataset> {
    match source {
        Source::Path(path) => load_path(path, aliases),
        Source::Upload { name, bytes } => match extension_of(Path::new(name)).as_deref() {
            Some("csv") => from_csv_reader(bytes, aliases),
            Some("xlsx") | Some("xls") | Some("xlsm") | Some("ods") => {
                from_excel_bytes(bytes, aliases)
            }
            Some(ext) => Err(DashboardError::SourceUnavailable(format!(
                "unsupported file extension: {}",
                ext
            ))),
            None => Err(DashboardError::SourceUnavailable(format!(
                "uploaded file '{}' has no extension",
                name
            ))),
        },
    }
}

/// Detect file type and load the appropriate format
pub fn load_path(path: &Path, aliases: &HeaderAliases) -> Result<SalesDataset> {
    if !path.exists() {
        return Err(DashboardError::SourceUnavailable(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let dataset = match extension_of(path).as_deref() {
        Some("csv") => from_csv(path, aliases),
        Some("xlsx") | Some("xls") | Some("xlsm") | Some("ods") => from_excel(path, aliases),
        Some(ext) => Err(DashboardError::SourceUnavailable(format!(
            "unsupported file extension: {}",
            ext
        ))),
        None => Err(DashboardError::SourceUnavailable(format!(
            "file has no extension: {}",
            path.display()
        ))),
    }?;

    info!("loaded {} sales rows from {}", dataset.len(), path.display());
    Ok(dataset)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Load a dataset from a CSV file with a header row
pub fn from_csv(path: &Path, aliases: &HeaderAliases) -> Result<SalesDataset> {
    let file = std::fs::File::open(path)?;
    from_csv_reader(file, aliases)
}

pub fn from_csv_reader<R: Read>(reader: R, aliases: &HeaderAliases) -> Result<SalesDataset> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(DashboardError::SourceUnavailable("CSV file is empty".into()));
    }
    let columns = aliases.map_headers(&headers)?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(csv_error)?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let cells: Vec<RawCell> = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    RawCell::Empty
                } else {
                    RawCell::Text(field.to_string())
                }
            })
            .collect();
        rows.push((line, cells));
    }

    build_dataset(&columns, rows)
}

fn csv_error(e: csv::Error) -> DashboardError {
    let row = e.position().map(|p| p.line() as usize).unwrap_or(0);
    match e.into_kind() {
        csv::ErrorKind::Io(io) => DashboardError::Io(io),
        kind => DashboardError::Parse {
            row,
            column: "-".into(),
            value: String::new(),
            reason: format!("malformed CSV: {:?}", kind),
        },
    }
}

/// Load a dataset from the first worksheet of an Excel workbook
pub fn from_excel(path: &Path, aliases: &HeaderAliases) -> Result<SalesDataset> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        DashboardError::SourceUnavailable(format!("cannot open {}: {}", path.display(), e))
    })?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DashboardError::SourceUnavailable("no sheets found in workbook".into()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| {
            DashboardError::SourceUnavailable(format!("cannot read sheet {}: {}", first, e))
        })?;
    excel_rows(&range, aliases)
}

pub fn from_excel_bytes(bytes: &[u8], aliases: &HeaderAliases) -> Result<SalesDataset> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| DashboardError::SourceUnavailable(format!("cannot open workbook: {}", e)))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DashboardError::SourceUnavailable("no sheets found in workbook".into()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| {
            DashboardError::SourceUnavailable(format!("cannot read sheet {}: {}", first, e))
        })?;
    excel_rows(&range, aliases)
}

fn excel_rows(range: &Range<Data>, aliases: &HeaderAliases) -> Result<SalesDataset> {
    // calamine trims leading empty rows, so row 0 of the range is not always sheet row 1
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let mut rows = range.rows().enumerate();
    let (_, header_row) = rows
        .next()
        .ok_or_else(|| DashboardError::SourceUnavailable("Excel sheet is empty".into()))?;
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();
    let columns = aliases.map_headers(&headers)?;
    let typed = rows
        .map(|(idx, row)| (first_row + idx + 1, row.iter().map(excel_cell).collect()))
        .collect();
    build_dataset(&columns, typed)
}

fn excel_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty => RawCell::Empty,
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Float(f) => RawCell::Number(*f),
        Data::Bool(b) => RawCell::Text(b.to_string()),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => RawCell::Date(dt),
            None => RawCell::Text(cell.to_string()),
        },
        other => RawCell::Text(other.to_string()),
    }
}

/// Types every data row; `rows` pairs the spreadsheet row number with its cells
pub fn build_dataset(
    columns: &ColumnMap,
    rows: Vec<(usize, Vec<RawCell>)>,
) -> Result<SalesDataset> {
    let mut records = Vec::with_capacity(rows.len());
    for (row, cells) in rows {
        if cells.iter().all(RawCell::is_empty) {
            debug!("skipping blank row {}", row);
            continue;
        }
        records.push(parse_record(columns, row, &cells)?);
    }
    Ok(SalesDataset::new(records))
}

fn cell_at<'c>(columns: &ColumnMap, cells: &'c [RawCell], column: Column) -> Option<&'c RawCell> {
    columns.position(column).and_then(|idx| cells.get(idx))
}

fn parse_record(columns: &ColumnMap, row: usize, cells: &[RawCell]) -> Result<SalesRecord> {
    let empty = RawCell::Empty;
    let get = |column| cell_at(columns, cells, column).unwrap_or(&empty);

    let seller = match get(Column::Seller) {
        c if c.is_empty() => None,
        c => Some(c.display().trim().to_string()),
    };
    let hour = match get(Column::Hour) {
        c if c.is_empty() => None,
        c => Some(parse_hour(c).map_err(|reason| parse_error(row, Column::Hour, c, reason))?),
    };

    Ok(SalesRecord {
        date: parse_date(get(Column::Date))
            .map_err(|reason| parse_error(row, Column::Date, get(Column::Date), reason))?,
        branch: parse_text(get(Column::Branch))
            .map_err(|reason| parse_error(row, Column::Branch, get(Column::Branch), reason))?,
        product: parse_text(get(Column::Product))
            .map_err(|reason| parse_error(row, Column::Product, get(Column::Product), reason))?,
        seller,
        amount: parse_amount(get(Column::Amount))
            .map_err(|reason| parse_error(row, Column::Amount, get(Column::Amount), reason))?,
        target: parse_amount(get(Column::Target))
            .map_err(|reason| parse_error(row, Column::Target, get(Column::Target), reason))?,
        hour,
    })
}

fn parse_error(row: usize, column: Column, cell: &RawCell, reason: &str) -> DashboardError {
    DashboardError::Parse {
        row,
        column: column.name().to_string(),
        value: cell.display(),
        reason: reason.to_string(),
    }
}

fn parse_text(cell: &RawCell) -> std::result::Result<String, &'static str> {
    match cell {
        RawCell::Empty => Err("value is empty"),
        RawCell::Text(s) if s.trim().is_empty() => Err("value is empty"),
        RawCell::Text(s) => Ok(s.trim().to_string()),
        // numeric codes such as product 1001 come through as numbers
        RawCell::Number(n) if n.fract() == 0.0 => Ok(format!("{}", *n as i64)),
        other => Ok(other.display()),
    }
}

pub fn parse_date(cell: &RawCell) -> std::result::Result<NaiveDate, &'static str> {
    match cell {
        RawCell::Date(dt) => Ok(dt.date()),
        RawCell::Text(s) => {
            let s = s.trim();
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .or_else(|| {
                    DATETIME_FORMATS
                        .iter()
                        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                        .map(|dt| dt.date())
                })
                .ok_or("not a date")
        }
        RawCell::Number(_) => Err("expected a date, found a number"),
        RawCell::Empty => Err("date is empty"),
    }
}

/// Reads a non-negative amount; `$` signs and `,` thousands separators are ignored
pub fn parse_amount(cell: &RawCell) -> std::result::Result<f64, &'static str> {
    let value = match cell {
        RawCell::Number(n) => *n,
        RawCell::Text(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | ' '))
                .collect();
            cleaned.parse::<f64>().map_err(|_| "not a number")?
        }
        RawCell::Empty => return Err("amount is empty"),
        RawCell::Date(_) => return Err("expected a number, found a date"),
    };

    if !value.is_finite() {
        Err("not a finite number")
    } else if value < 0.0 {
        Err("must not be negative")
    } else {
        Ok(value)
    }
}

fn parse_hour(cell: &RawCell) -> std::result::Result<u8, &'static str> {
    let hour = match cell {
        RawCell::Number(n) if n.fract() == 0.0 => *n as i64,
        // Excel stores a time of day as a fraction of a day
        RawCell::Number(n) if (0.0..1.0).contains(n) => (n * 24.0).floor() as i64,
        RawCell::Date(dt) => dt.hour() as i64,
        RawCell::Text(s) => {
            let s = s.trim();
            let head = s.split(':').next().unwrap_or(s);
            head.parse::<i64>().map_err(|_| "not an hour")?
        }
        _ => return Err("not an hour"),
    };
    if (0..24).contains(&hour) {
        Ok(hour as u8)
    } else {
        Err("hour must be between 0 and 23")
    }
}
