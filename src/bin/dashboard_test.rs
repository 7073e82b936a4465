#![cfg(not(tarpaulin_include))]

use chrono::NaiveDate;
use sales_dashboard::aggregate::{self, Compliance};
use sales_dashboard::chat::{self, ChatContext, Intent};
use sales_dashboard::fixtures;
use sales_dashboard::record::{DateFilter, Dimension, Measure, SalesDataset, SalesRecord};
use sales_dashboard::view::{self, Profile, ViewContext};
use sales_dashboard::{downloader, report};

fn sample() -> SalesDataset {
    let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
    vec![
        SalesRecord::create(d(1), "Norte", "A", 100.0, 0.0).with_seller("Ana"),
        SalesRecord::create(d(2), "Sur", "A", 50.0, 0.0).with_seller("Luis"),
        SalesRecord::create(d(3), "Norte", "B", 50.0, 0.0).with_seller("Ana"),
    ]
    .into_iter()
    .collect()
}

fn main() {
    println!("=== Sales Dashboard Test Suite ===\n");

    println!("Test 1: Grouped totals keep first-seen order");
    let data = sample();
    let by_product = aggregate::group_sum(&data, Dimension::Product, Measure::Amount);
    assert_eq!(by_product.as_pairs(), vec![("A".to_string(), 150.0), ("B".to_string(), 50.0)]);
    println!("✓ {:?}\n", by_product.as_pairs());

    println!("Test 2: Ranking breaks ties by first appearance");
    let ranked = aggregate::rank(&data, Dimension::Branch, Measure::Amount);
    assert_eq!(ranked[0].key, "Norte");
    assert_eq!(ranked[0].rank, 1);
    println!("✓ {} ranks first\n", ranked[0].key);

    println!("Test 3: Compliance with a zero target is undefined");
    assert!(aggregate::compliance(&data).is_err());
    assert_eq!(aggregate::kpis(&data).compliance, Compliance::Undefined);
    println!("✓ compliance shows N/A\n");

    println!("Test 4: Inverted range gives an empty dataset");
    let jan = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
    let empty = aggregate::filter_range(&data, Some(DateFilter::new(jan(3), jan(1))));
    assert!(empty.is_empty());
    println!("✓ no records\n");

    println!("Test 5: Weekday bucket always has seven entries");
    let weekdays = aggregate::day_of_week_bucket(&data, Measure::Amount);
    assert_eq!(weekdays.len(), 7);
    println!("✓ {:?}\n", weekdays.keys());

    println!("Test 6: Chat resolves Spanish and English questions");
    let ctx = ChatContext::default();
    let reply = chat::answer("¿Qué producto vendió más?", &data, &ctx);
    assert_eq!(reply.intent, Some(Intent::TopProduct));
    let reply = chat::answer("which product sold the most", &data, &ctx);
    assert_eq!(reply.intent, Some(Intent::TopProduct));
    println!("✓ {}\n", reply.text);

    println!("Test 7: Manager view stays locked without a face match");
    let view = view::build_view(&data, &ViewContext::new(Profile::GeneralManager));
    assert!(view.locked);
    assert!(view.panels.is_empty());
    println!("✓ {}\n", view.notice.unwrap_or_default());

    println!("Test 8: Fixture data exports to every format");
    let fixture = fixtures::generate(42, jan(1), 30);
    let pdf = report::build_report(&fixture, None, jan(31)).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    let xlsx = downloader::to_xlsx(&fixture).unwrap();
    assert!(xlsx.starts_with(b"PK"));
    let csv = downloader::records_to_csv(&fixture).unwrap();
    assert_eq!(csv.lines().count(), fixture.len() + 1);
    println!(
        "✓ pdf {} bytes, xlsx {} bytes, csv {} rows\n",
        pdf.len(),
        xlsx.len(),
        fixture.len()
    );

    println!("All tests passed!");
}
