//! Seeded synthetic sales data for demos and tests.

use chrono::{Days, NaiveDate};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

use crate::error::{DashboardError, Result};
use crate::record::{SalesDataset, SalesRecord};

pub const BRANCHES: [&str; 4] = ["Bogota", "Medellin", "Cali", "Barranquilla"];
pub const PRODUCTS: [&str; 5] = ["Laptop", "Phone", "Tablet", "Monitor", "Headphones"];
const SELLERS: [[&str; 2]; 4] = [
    ["Ana", "Carlos"],
    ["Lucia", "Mateo"],
    ["Sofia", "Andres"],
    ["Valentina", "Diego"],
];

/// Builds `days` days of sales starting at `start`.
///
/// The same seed always yields the same dataset.
pub fn generate(seed: u64, start: NaiveDate, days: u32) -> SalesDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::new();

    for offset in 0..days {
        let Some(date) = start.checked_add_days(Days::new(offset as u64)) else {
            break;
        };
        for (b, branch) in BRANCHES.iter().enumerate() {
            let sales = rng.gen_range(1..=3);
            for _ in 0..sales {
                let product = PRODUCTS[rng.gen_range(0..PRODUCTS.len())];
                let seller = SELLERS[b][rng.gen_range(0..2)];
                let amount = (rng.gen_range(50.0..500.0_f64)).round();
                let target = (amount * rng.gen_range(0.8..1.3_f64)).round();
                let hour = rng.gen_range(8..20u8);
                records.push(
                    SalesRecord::create(date, branch, product, amount, target)
                        .with_seller(seller)
                        .with_hour(hour),
                );
            }
        }
    }

    SalesDataset::new(records)
}

/// Writes the dataset as CSV with the canonical header
pub fn write_csv(dataset: &SalesDataset, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| DashboardError::Render(format!("{}: {}", path.display(), e)))?;
    writer
        .write_record(["date", "branch", "product", "seller", "amount", "target", "hour"])
        .map_err(|e| DashboardError::Render(e.to_string()))?;
    for r in dataset {
        writer
            .write_record([
                r.date.format("%Y-%m-%d").to_string(),
                r.branch.clone(),
                r.product.clone(),
                r.seller.clone().unwrap_or_default(),
                r.amount.to_string(),
                r.target.to_string(),
                r.hour.map(|h| h.to_string()).unwrap_or_default(),
            ])
            .map_err(|e| DashboardError::Render(e.to_string()))?;
    }
    writer.flush()?;
    info!("wrote {} fixture records to {}", dataset.len(), path.display());
    Ok(())
}

#[cfg(feature = "report")]
pub fn write_xlsx(dataset: &SalesDataset, path: &Path) -> Result<()> {
    let bytes = crate::downloader::to_xlsx(dataset)?;
    std::fs::write(path, bytes)?;
    info!("wrote {} fixture records to {}", dataset.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;
    use crate::schema::HeaderAliases;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn same_seed_same_data() {
        assert_eq!(generate(7, start(), 10), generate(7, start(), 10));
        assert_ne!(generate(7, start(), 10), generate(8, start(), 10));
    }

    #[test]
    fn generated_rows_cover_the_requested_days() {
        let data = generate(1, start(), 5);
        let span = data.date_span().unwrap();
        assert_eq!(span.start, start());
        assert_eq!(span.end, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert!(data.len() >= 5 * BRANCHES.len());
        assert!(data.iter().all(|r| r.amount >= 50.0 && r.target > 0.0));
        assert!(data.has_hours() && data.has_sellers());
    }

    #[test]
    fn written_csv_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.csv");
        let data = generate(3, start(), 3);
        write_csv(&data, &path).unwrap();
        let loaded = loader::load_path(&path, &HeaderAliases::default()).unwrap();
        assert_eq!(loaded, data);
    }
}
