#![cfg(not(tarpaulin_include))]

use chrono::NaiveDate;
use sales_dashboard::fixtures;
use std::env;
use std::path::PathBuf;

/// Writes a synthetic sales file
///
/// Usage: fixture <output.csv|output.xlsx> [seed] [days] [start YYYY-MM-DD]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <output.csv|output.xlsx> [seed] [days] [start]",
            args[0]
        );
        return Ok(());
    }

    let output = PathBuf::from(&args[1]);
    let seed: u64 = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(42);
    let days: u32 = args.get(3).map(|s| s.parse()).transpose()?.unwrap_or(90);
    let start = match args.get(4) {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")?,
        None => NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("invalid default start date")?,
    };

    let dataset = fixtures::generate(seed, start, days);
    let is_xlsx = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));

    if is_xlsx {
        fixtures::write_xlsx(&dataset, &output)?;
    } else {
        fixtures::write_csv(&dataset, &output)?;
    }

    println!(
        "Wrote {} records ({} days from {}, seed {}) to {}",
        dataset.len(),
        days,
        start,
        seed,
        output.display()
    );
    Ok(())
}
