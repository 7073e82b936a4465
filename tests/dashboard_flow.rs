use chrono::NaiveDate;
use sales_dashboard::aggregate::{self, Compliance};
use sales_dashboard::cache::DatasetCache;
use sales_dashboard::chat::{self, ChatContext, Intent};
use sales_dashboard::config;
use sales_dashboard::error::DashboardError;
use sales_dashboard::fixtures;
use sales_dashboard::loader;
use sales_dashboard::record::{DateFilter, Dimension, Measure};
use sales_dashboard::schema::HeaderAliases;
use sales_dashboard::view::{self, Panel, Profile, ViewContext};
use std::fs;

const VENTAS: &str = "Fecha,Sucursal,Producto,Vendedor,Ventas,Meta\n\
                      2024-01-01,Norte,A,Ana,100,80\n\
                      2024-01-02,Sur,A,Luis,50,100\n\
                      2024-01-03,Norte,B,Ana,\"$1,050\",1000\n";

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

#[test]
fn spanish_headers_load_and_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ventas.csv");
    fs::write(&path, VENTAS).unwrap();

    let mut cache = DatasetCache::default();
    let data = cache.get_or_load(&path).unwrap();
    assert_eq!(data.len(), 3);
    assert_eq!(aggregate::total(&data, Measure::Amount), 1200.0);

    let kpis = aggregate::kpis(&data);
    assert_eq!(kpis.top_branch.unwrap().key, "Norte");
    match kpis.compliance {
        Compliance::Percent(p) => assert!((p - 1200.0 / 1180.0 * 100.0).abs() < 1e-9),
        Compliance::Undefined => panic!("target is not zero"),
    }
}

#[test]
fn cache_serves_same_table_until_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ventas.csv");
    fs::write(&path, VENTAS).unwrap();

    let mut cache = DatasetCache::default();
    let first = cache.get_or_load(&path).unwrap();
    fs::write(&path, "Fecha,Sucursal,Producto,Ventas,Meta\n2024-02-01,Este,C,10,10\n").unwrap();

    let again = cache.get_or_load(&path).unwrap();
    assert_eq!(again.len(), first.len());

    let reloaded = cache.reload(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.records()[0].branch, "Este");
}

#[test]
fn missing_column_names_what_was_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.csv");
    fs::write(&path, "Fecha,Producto,Ventas\n2024-01-01,A,1\n").unwrap();

    let err = loader::load_path(&path, &HeaderAliases::default()).unwrap_err();
    match &err {
        DashboardError::Schema { missing, .. } => {
            assert!(missing.contains(&"branch".to_string()));
            assert!(missing.contains(&"target".to_string()));
        }
        other => panic!("expected a schema error, got {:?}", other),
    }
    assert!(err.user_message().contains("Fecha, Producto, Ventas"));
}

#[test]
fn missing_file_is_unavailable() {
    let err = loader::load_path(
        std::path::Path::new("/definitely/not/here.csv"),
        &HeaderAliases::default(),
    )
    .unwrap_err();
    assert!(matches!(err, DashboardError::SourceUnavailable(_)));
}

#[test]
fn configured_aliases_extend_builtin_headers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.csv");
    fs::write(&path, "Day,Store,Item,Revenue,Goal\n2024-01-01,X,A,10,20\n").unwrap();

    let config = config::parse(
        r#"
        [data]
        path = "custom.csv"
        [data.aliases]
        date = ["day"]
        branch = ["store"]
        product = ["item"]
        amount = ["revenue"]
        target = ["goal"]
        "#,
    )
    .unwrap();
    let data = loader::load_path(&path, &config.header_aliases()).unwrap();
    assert_eq!(aggregate::compliance(&data).unwrap(), 50.0);
}

#[test]
fn filtering_is_idempotent_and_bounded() {
    let data = fixtures::generate(11, day(1), 31);
    let range = DateFilter::new(day(5), day(12));
    let once = aggregate::filter_range(&data, Some(range));
    let twice = aggregate::filter_range(&once, Some(range));
    assert_eq!(once, twice);
    assert!(once.iter().all(|r| range.contains(r.date)));
    assert!(aggregate::total(&once, Measure::Amount) <= aggregate::total(&data, Measure::Amount));
}

#[test]
fn ranking_is_a_permutation_of_group_totals() {
    let data = fixtures::generate(5, day(1), 20);
    for dimension in Dimension::ALL {
        let groups = aggregate::group_sum(&data, dimension, Measure::Amount);
        let ranked = aggregate::rank(&data, dimension, Measure::Amount);
        assert_eq!(ranked.len(), groups.len());
        assert!(ranked.windows(2).all(|w| w[0].value >= w[1].value));
        for (i, entry) in ranked.iter().enumerate() {
            assert_eq!(entry.rank, i + 1);
            assert_eq!(groups.get(&entry.key), Some(entry.value));
        }
    }
}

#[test]
fn buckets_partition_the_total() {
    let data = fixtures::generate(9, day(1), 60);
    let total = aggregate::total(&data, Measure::Amount);
    let by_weekday: f64 = aggregate::day_of_week_bucket(&data, Measure::Amount)
        .entries
        .iter()
        .map(|g| g.value)
        .sum();
    let by_month: f64 = aggregate::month_bucket(&data, Measure::Amount)
        .entries
        .iter()
        .map(|g| g.value)
        .sum();
    assert!((by_weekday - total).abs() < 1e-6);
    assert!((by_month - total).abs() < 1e-6);
}

#[test]
fn profiles_and_chat_share_the_same_numbers() {
    let data = fixtures::generate(21, day(1), 14);
    let ctx = ViewContext::new(Profile::GeneralManager)
        .with_threshold(Some(95.0))
        .unlocked(true);
    let view = view::build_view(&data, &ctx);
    let alerts = view
        .panels
        .iter()
        .find_map(|p| match p {
            Panel::Alerts { flagged, .. } => Some(flagged.clone()),
            _ => None,
        })
        .unwrap_or_default();

    let ctx = ChatContext {
        range: None,
        alert_threshold: Some(95.0),
    };
    let reply = chat::answer("alertas de cumplimiento", &data, &ctx);
    assert_eq!(reply.intent, Some(Intent::Alerts));
    for (branch, _) in &alerts {
        assert!(reply.text.contains(branch.as_str()));
    }
}

#[cfg(feature = "report")]
#[test]
fn fixture_workbook_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.xlsx");
    let data = fixtures::generate(2, day(1), 7);
    fixtures::write_xlsx(&data, &path).unwrap();

    let loaded = loader::load_path(&path, &HeaderAliases::default()).unwrap();
    assert_eq!(loaded.len(), data.len());
    assert_eq!(
        aggregate::total(&loaded, Measure::Amount),
        aggregate::total(&data, Measure::Amount)
    );
    assert!(loaded.has_hours());
}
