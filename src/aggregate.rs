//! Sales aggregation: totals, compliance, rankings and date-bucketed trends.
//!
//! Every function takes a dataset by reference and returns freshly computed
//! values; nothing here mutates or caches.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{DashboardError, Result};
use crate::record::{DateFilter, Dimension, Measure, SalesDataset};

pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Summed value for one group key
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct GroupTotal {
    pub key: String,
    pub value: f64,
}

/// Ordered mapping from group key to summed value
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Aggregate {
    pub entries: Vec<GroupTotal>,
}

impl Aggregate {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.iter().find(|e| e.key == key).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key.as_str()).collect()
    }

    pub fn as_pairs(&self) -> Vec<(String, f64)> {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.value))
            .collect()
    }
}

/// Sales-to-target ratio in percent, or undefined over a zero target
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "kind", content = "percent", rename_all = "lowercase")]
pub enum Compliance {
    Percent(f64),
    Undefined,
}

impl Compliance {
    pub fn from_totals(amount: f64, target: f64) -> Self {
        if target == 0.0 {
            Compliance::Undefined
        } else {
            Compliance::Percent(amount / target * 100.0)
        }
    }

    pub fn percent(&self) -> Option<f64> {
        match self {
            Compliance::Percent(p) => Some(*p),
            Compliance::Undefined => None,
        }
    }
}

impl fmt::Display for Compliance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compliance::Percent(p) => write!(f, "{:.2}%", p),
            Compliance::Undefined => write!(f, "N/A"),
        }
    }
}

/// Per-group sales, target and compliance
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct GroupCompliance {
    pub key: String,
    pub amount: f64,
    pub target: f64,
    pub compliance: Compliance,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RankedEntry {
    pub rank: usize,
    pub key: String,
    pub value: f64,
}

/// Records with `start <= date <= end`
pub fn filter_by_date(dataset: &SalesDataset, start: NaiveDate, end: NaiveDate) -> SalesDataset {
    let range = DateFilter::new(start, end);
    dataset.subset(|r| range.contains(r.date))
}

pub fn filter_range(dataset: &SalesDataset, range: Option<DateFilter>) -> SalesDataset {
    match range {
        Some(r) => filter_by_date(dataset, r.start, r.end),
        None => dataset.clone(),
    }
}

pub fn total(dataset: &SalesDataset, field: Measure) -> f64 {
    dataset.iter().map(|r| r.value(field)).sum()
}

/// Total sales over total target, in percent
pub fn compliance(dataset: &SalesDataset) -> Result<f64> {
    let amount = total(dataset, Measure::Amount);
    match Compliance::from_totals(amount, total(dataset, Measure::Target)) {
        Compliance::Percent(p) => Ok(p),
        Compliance::Undefined => Err(DashboardError::DivisionUndefined("target total")),
    }
}

/// Sums `value_field` per `key_field`, keys in first-encountered order
pub fn group_sum(dataset: &SalesDataset, key_field: Dimension, value_field: Measure) -> Aggregate {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut entries: Vec<GroupTotal> = Vec::new();

    for record in dataset {
        let Some(key) = record.key(key_field) else {
            continue;
        };
        let slot = *index.entry(key).or_insert_with(|| {
            entries.push(GroupTotal {
                key: key.to_string(),
                value: 0.0,
            });
            entries.len() - 1
        });
        entries[slot].value += record.value(value_field);
    }

    Aggregate { entries }
}

/// Groups sorted by descending value; ties keep first-encountered order
pub fn top_by(
    dataset: &SalesDataset,
    key_field: Dimension,
    value_field: Measure,
    n: Option<usize>,
) -> Vec<GroupTotal> {
    let mut entries = group_sum(dataset, key_field, value_field).entries;
    // sort_by is stable, which is what keeps tie order deterministic
    entries.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if let Some(n) = n {
        entries.truncate(n);
    }
    entries
}

pub fn rank(
    dataset: &SalesDataset,
    key_field: Dimension,
    value_field: Measure,
) -> Vec<RankedEntry> {
    top_by(dataset, key_field, value_field, None)
        .into_iter()
        .enumerate()
        .map(|(i, e)| RankedEntry {
            rank: i + 1,
            key: e.key,
            value: e.value,
        })
        .collect()
}

/// Seven entries, Monday through Sunday, zero where a weekday has no rows
pub fn day_of_week_bucket(dataset: &SalesDataset, value_field: Measure) -> Aggregate {
    let mut sums = [0.0_f64; 7];
    for record in dataset {
        sums[record.date.weekday().num_days_from_monday() as usize] += record.value(value_field);
    }
    Aggregate {
        entries: WEEKDAYS
            .iter()
            .zip(sums)
            .map(|(day, value)| GroupTotal {
                key: weekday_name(*day).to_string(),
                value,
            })
            .collect(),
    }
}

/// `YYYY-MM` buckets in ascending chronological order
pub fn month_bucket(dataset: &SalesDataset, value_field: Measure) -> Aggregate {
    let mut months: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for record in dataset {
        *months
            .entry((record.date.year(), record.date.month()))
            .or_insert(0.0) += record.value(value_field);
    }
    Aggregate {
        entries: months
            .into_iter()
            .map(|((y, m), value)| GroupTotal {
                key: format!("{:04}-{:02}", y, m),
                value,
            })
            .collect(),
    }
}

/// Twenty-four entries `00`..`23`; rows without an hour are not counted
pub fn hour_bucket(dataset: &SalesDataset, value_field: Measure) -> Aggregate {
    let mut sums = [0.0_f64; 24];
    for record in dataset {
        if let Some(hour) = record.hour {
            sums[hour as usize % 24] += record.value(value_field);
        }
    }
    Aggregate {
        entries: sums
            .iter()
            .enumerate()
            .map(|(h, value)| GroupTotal {
                key: format!("{:02}", h),
                value: *value,
            })
            .collect(),
    }
}

pub fn group_compliance(dataset: &SalesDataset, key_field: Dimension) -> Vec<GroupCompliance> {
    let amounts = group_sum(dataset, key_field, Measure::Amount);
    let targets = group_sum(dataset, key_field, Measure::Target);
    amounts
        .entries
        .into_iter()
        .zip(targets.entries)
        .map(|(a, t)| GroupCompliance {
            compliance: Compliance::from_totals(a.value, t.value),
            key: a.key,
            amount: a.value,
            target: t.value,
        })
        .collect()
}

/// Groups whose compliance is strictly below `threshold` percent.
///
/// Groups with a zero target have no compliance and are never reported.
pub fn compliance_alert(
    dataset: &SalesDataset,
    key_field: Dimension,
    threshold: f64,
) -> Vec<(String, f64)> {
    group_compliance(dataset, key_field)
        .into_iter()
        .filter_map(|g| match g.compliance {
            Compliance::Percent(p) if p < threshold => Some((g.key, p)),
            _ => None,
        })
        .collect()
}

/// Daily totals per group key, dates ascending within each series
pub fn daily_series(
    dataset: &SalesDataset,
    key_field: Dimension,
) -> Vec<(String, Vec<(NaiveDate, f64)>)> {
    let mut order: Vec<String> = Vec::new();
    let mut series: HashMap<String, BTreeMap<NaiveDate, f64>> = HashMap::new();
    for record in dataset {
        let Some(key) = record.key(key_field) else {
            continue;
        };
        if !series.contains_key(key) {
            order.push(key.to_string());
        }
        *series
            .entry(key.to_string())
            .or_default()
            .entry(record.date)
            .or_insert(0.0) += record.amount;
    }
    order
        .into_iter()
        .map(|key| {
            let points = series.remove(&key).unwrap_or_default().into_iter().collect();
            (key, points)
        })
        .collect()
}

/// Two-key breakdown such as sales per product and branch
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct CrossTable {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    /// `values[r][c]` is the sum for `rows[r]` and `columns[c]`
    pub values: Vec<Vec<f64>>,
}

pub fn cross_sum(
    dataset: &SalesDataset,
    row_key: Dimension,
    col_key: Dimension,
    value_field: Measure,
) -> CrossTable {
    let keys = |dimension: Dimension| -> Vec<String> {
        group_sum(dataset, dimension, value_field)
            .keys()
            .iter()
            .map(|k| k.to_string())
            .collect()
    };
    let rows = keys(row_key);
    let columns = keys(col_key);
    let mut values = vec![vec![0.0; columns.len()]; rows.len()];

    for record in dataset {
        let (Some(r), Some(c)) = (record.key(row_key), record.key(col_key)) else {
            continue;
        };
        if let (Some(ri), Some(ci)) = (
            rows.iter().position(|k| k == r),
            columns.iter().position(|k| k == c),
        ) {
            values[ri][ci] += record.value(value_field);
        }
    }

    CrossTable {
        rows,
        columns,
        values,
    }
}

/// Headline figures shown on the KPI cards
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Kpis {
    pub record_count: usize,
    pub total_amount: f64,
    pub total_target: f64,
    pub compliance: Compliance,
    pub top_product: Option<GroupTotal>,
    pub top_branch: Option<GroupTotal>,
    pub top_seller: Option<GroupTotal>,
}

pub fn kpis(dataset: &SalesDataset) -> Kpis {
    let total_amount = total(dataset, Measure::Amount);
    let total_target = total(dataset, Measure::Target);
    let leader = |dimension| {
        top_by(dataset, dimension, Measure::Amount, Some(1))
            .into_iter()
            .next()
    };
    Kpis {
        record_count: dataset.len(),
        total_amount,
        total_target,
        compliance: Compliance::from_totals(total_amount, total_target),
        top_product: leader(Dimension::Product),
        top_branch: leader(Dimension::Branch),
        top_seller: leader(Dimension::Seller),
    }
}
