use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of the sales table
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SalesRecord {
    pub date: NaiveDate,
    pub branch: String,
    pub product: String,
    pub seller: Option<String>,
    pub amount: f64,
    pub target: f64,
    /// Hour of day (0-23) when the source carries one
    pub hour: Option<u8>,
}

impl SalesRecord {
    pub fn create(date: NaiveDate, branch: &str, product: &str, amount: f64, target: f64) -> Self {
        SalesRecord {
            date,
            branch: branch.to_string(),
            product: product.to_string(),
            seller: None,
            amount,
            target,
            hour: None,
        }
    }

    pub fn with_seller(mut self, seller: &str) -> Self {
        self.seller = Some(seller.to_string());
        self
    }

    pub fn with_hour(mut self, hour: u8) -> Self {
        self.hour = Some(hour);
        self
    }

    /// Grouping key for `dimension`, `None` when the row does not carry it
    pub fn key(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Product => Some(self.product.as_str()),
            Dimension::Branch => Some(self.branch.as_str()),
            Dimension::Seller => self.seller.as_deref(),
        }
    }

    pub fn value(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Amount => self.amount,
            Measure::Target => self.target,
        }
    }
}

/// Categorical column a dataset can be grouped by
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Product,
    Branch,
    Seller,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Product, Dimension::Branch, Dimension::Seller];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "product" | "products" | "producto" | "productos" => Some(Dimension::Product),
            "branch" | "branches" | "store" | "sucursal" | "sucursales" => Some(Dimension::Branch),
            "seller" | "sellers" | "vendedor" | "vendedores" => Some(Dimension::Seller),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Product => "Product",
            Dimension::Branch => "Branch",
            Dimension::Seller => "Seller",
        }
    }
}

/// Numeric column a dataset can be summed over
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Amount,
    Target,
}

impl Measure {
    pub fn label(&self) -> &'static str {
        match self {
            Measure::Amount => "Sales",
            Measure::Target => "Target",
        }
    }
}

/// Closed date interval `[start, end]`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct DateFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateFilter {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateFilter { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Ordered, read-only sequence of sales records
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct SalesDataset {
    records: Vec<SalesRecord>,
}

impl SalesDataset {
    pub fn new(records: Vec<SalesRecord>) -> Self {
        SalesDataset { records }
    }

    pub fn records(&self) -> &[SalesRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SalesRecord> {
        self.records.iter()
    }

    /// Earliest and latest dates present, if any
    pub fn date_span(&self) -> Option<DateFilter> {
        let start = self.records.iter().map(|r| r.date).min()?;
        let end = self.records.iter().map(|r| r.date).max()?;
        Some(DateFilter::new(start, end))
    }

    pub fn has_hours(&self) -> bool {
        self.records.iter().any(|r| r.hour.is_some())
    }

    pub fn has_sellers(&self) -> bool {
        self.records.iter().any(|r| r.seller.is_some())
    }

    /// New view holding only the rows matching `keep`
    pub fn subset<F>(&self, keep: F) -> SalesDataset
    where
        F: Fn(&SalesRecord) -> bool,
    {
        SalesDataset {
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SalesDataset {
    type Item = &'a SalesRecord;
    type IntoIter = std::slice::Iter<'a, SalesRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<SalesRecord> for SalesDataset {
    fn from_iter<I: IntoIterator<Item = SalesRecord>>(iter: I) -> Self {
        SalesDataset {
            records: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn seller_key_is_optional() {
        let record = SalesRecord::create(day(1), "Norte", "A", 10.0, 5.0);
        assert_eq!(record.key(Dimension::Product), Some("A"));
        assert_eq!(record.key(Dimension::Seller), None);
        let record = record.with_seller("Ana");
        assert_eq!(record.key(Dimension::Seller), Some("Ana"));
    }

    #[test]
    fn dimension_names_accept_localized_headers() {
        assert_eq!(Dimension::from_name("Sucursal"), Some(Dimension::Branch));
        assert_eq!(Dimension::from_name(" products "), Some(Dimension::Product));
        assert_eq!(Dimension::from_name("vendedor"), Some(Dimension::Seller));
        assert_eq!(Dimension::from_name("region"), None);
    }

    #[test]
    fn date_span_covers_all_rows() {
        let data: SalesDataset = vec![
            SalesRecord::create(day(5), "X", "A", 1.0, 1.0),
            SalesRecord::create(day(2), "X", "A", 1.0, 1.0),
            SalesRecord::create(day(9), "X", "A", 1.0, 1.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(data.date_span(), Some(DateFilter::new(day(2), day(9))));
        assert_eq!(SalesDataset::default().date_span(), None);
    }
}
