//! Canned-question "chat": a declarative table of trigger phrases, each bound
//! to one aggregate computation and the chart that illustrates it.
//!
//! Matching does not depend on table order. A trigger found inside a longer
//! trigger is ignored ("no cumplio la meta" is not also "cumplio la meta").
//! If the remaining triggers belong to more than one intent the question is
//! reported as ambiguous instead of silently picking one.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::aggregate::{self, Aggregate, Compliance, GroupTotal};
use crate::format::{format_currency, format_percent};
use crate::record::{DateFilter, Dimension, Measure, SalesDataset};
use crate::schema::fold_accent;
use crate::view::ChartKind;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    TotalSales,
    Compliance,
    TopProduct,
    TopBranch,
    TopSeller,
    BranchesOverTarget,
    BranchesBelowTarget,
    Alerts,
    WeeklyTrend,
    MonthlyTrend,
    HourlyTrend,
}

struct IntentRule {
    intent: Intent,
    triggers: &'static [&'static str],
}

const RULES: [IntentRule; 11] = [
    IntentRule {
        intent: Intent::TotalSales,
        triggers: &["total sales", "how much did we sell", "ventas totales", "cuanto vendimos"],
    },
    IntentRule {
        intent: Intent::Compliance,
        triggers: &["compliance", "percent of target", "cumplimiento"],
    },
    IntentRule {
        intent: Intent::TopProduct,
        triggers: &[
            "top product",
            "top products",
            "best selling product",
            "best selling products",
            "sales by product",
            "product sold the most",
            "producto vendio mas",
            "producto mas vendido",
            "mejor producto",
            "mejores productos",
            "productos mas vendidos",
            "ventas por producto",
        ],
    },
    IntentRule {
        intent: Intent::TopBranch,
        triggers: &[
            "top branch",
            "top branches",
            "best branch",
            "best branches",
            "sales by branch",
            "leading branch",
            "sucursal lider",
            "mejor sucursal",
            "sucursal vendio mas",
            "mejores sucursales",
            "ventas por sucursal",
        ],
    },
    IntentRule {
        intent: Intent::TopSeller,
        triggers: &[
            "top seller",
            "top sellers",
            "best seller",
            "best sellers",
            "best salesperson",
            "sales by seller",
            "vendedor destacado",
            "mejor vendedor",
            "mejores vendedores",
            "ventas por vendedor",
        ],
    },
    IntentRule {
        intent: Intent::BranchesOverTarget,
        triggers: &[
            "above target",
            "over target",
            "met the target",
            "met its target",
            "met their target",
            "beat the target",
            "beat its target",
            "beat their target",
            "supero la meta",
            "superaron la meta",
            "cumplio la meta",
        ],
    },
    IntentRule {
        intent: Intent::BranchesBelowTarget,
        triggers: &[
            "below target",
            "under target",
            "missed the target",
            "missed its target",
            "missed their target",
            "below its target",
            "below their target",
            "bajo la meta",
            "debajo de la meta",
            "no cumplio la meta",
            "no cumplieron la meta",
        ],
    },
    IntentRule {
        intent: Intent::Alerts,
        triggers: &[
            "alert",
            "alerts",
            "compliance alert",
            "compliance alerts",
            "alerta",
            "alertas",
            "alertas de cumplimiento",
        ],
    },
    IntentRule {
        intent: Intent::WeeklyTrend,
        triggers: &["weekly trend", "by weekday", "day of week", "tendencia semanal", "por dia"],
    },
    IntentRule {
        intent: Intent::MonthlyTrend,
        triggers: &["monthly trend", "by month", "tendencia mensual", "por mes"],
    },
    IntentRule {
        intent: Intent::HourlyTrend,
        triggers: &["hourly", "by hour", "por hora"],
    },
];

/// Questions offered as buttons and as the fallback suggestion list
pub const SUGGESTED_QUESTIONS: [&str; 6] = [
    "Which product sold the most?",
    "Which branch beat the target?",
    "What is the weekly trend?",
    "¿Qué producto vendió más?",
    "¿Qué sucursal superó la meta?",
    "¿Cuál es la tendencia semanal?",
];

lazy_static! {
    static ref SEPARATORS: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    static ref NORMALIZED_RULES: Vec<(Intent, Vec<String>)> = RULES
        .iter()
        .map(|rule| {
            (
                rule.intent,
                rule.triggers.iter().map(|t| normalize(t)).collect(),
            )
        })
        .collect();
}

/// Lower-case, accent-free, single-spaced text
pub fn normalize(text: &str) -> String {
    let folded: String = text.to_lowercase().chars().map(fold_accent).collect();
    SEPARATORS.replace_all(&folded, " ").trim().to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Matched(Intent),
    Ambiguous(Vec<Intent>),
    Unknown,
}

/// Finds the intent a question asks for
pub fn resolve(question: &str) -> Resolution {
    let padded = format!(" {} ", normalize(question));

    // (start, end, intent) of every trigger occurrence
    let mut hits: Vec<(usize, usize, Intent)> = Vec::new();
    for (intent, triggers) in NORMALIZED_RULES.iter() {
        for trigger in triggers {
            let needle = format!(" {} ", trigger);
            for (at, _) in padded.match_indices(&needle) {
                hits.push((at + 1, at + 1 + trigger.len(), *intent));
            }
        }
    }
    hits.sort_by_key(|&(start, end, _)| (start, end));

    let mut intents: Vec<Intent> = Vec::new();
    for &(start, end, intent) in &hits {
        let shadowed = hits
            .iter()
            .any(|&(s, e, _)| s <= start && end <= e && e - s > end - start);
        if !shadowed && !intents.contains(&intent) {
            intents.push(intent);
        }
    }

    match intents.len() {
        0 => Resolution::Unknown,
        1 => Resolution::Matched(intents[0]),
        _ => Resolution::Ambiguous(intents),
    }
}

/// Chart accompanying an answer
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub series: Vec<GroupTotal>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ChatReply {
    pub question: String,
    pub intent: Option<Intent>,
    pub text: String,
    pub chart: Option<ChartSpec>,
    pub suggestions: Vec<String>,
}

/// Selection state a question is answered against
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatContext {
    pub range: Option<DateFilter>,
    pub alert_threshold: Option<f64>,
}

pub fn answer(question: &str, dataset: &SalesDataset, ctx: &ChatContext) -> ChatReply {
    let suggestions = || -> Vec<String> {
        SUGGESTED_QUESTIONS.iter().map(|q| q.to_string()).collect()
    };
    match resolve(question) {
        Resolution::Matched(intent) => {
            let data = aggregate::filter_range(dataset, ctx.range);
            let (text, chart) = compute(intent, &data, ctx);
            ChatReply {
                question: question.to_string(),
                intent: Some(intent),
                text,
                chart,
                suggestions: Vec::new(),
            }
        }
        Resolution::Ambiguous(intents) => ChatReply {
            question: question.to_string(),
            intent: None,
            text: format!(
                "That question matches several topics ({}). Please ask about one of them.",
                intents
                    .iter()
                    .map(|i| topic(*i))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            chart: None,
            suggestions: suggestions(),
        },
        Resolution::Unknown => ChatReply {
            question: question.to_string(),
            intent: None,
            text: "I can't answer that yet. Try one of the suggested questions.".into(),
            chart: None,
            suggestions: suggestions(),
        },
    }
}

fn topic(intent: Intent) -> &'static str {
    match intent {
        Intent::TotalSales => "total sales",
        Intent::Compliance => "compliance",
        Intent::TopProduct => "top product",
        Intent::TopBranch => "top branch",
        Intent::TopSeller => "top seller",
        Intent::BranchesOverTarget => "branches over target",
        Intent::BranchesBelowTarget => "branches below target",
        Intent::Alerts => "compliance alerts",
        Intent::WeeklyTrend => "weekly trend",
        Intent::MonthlyTrend => "monthly trend",
        Intent::HourlyTrend => "hourly trend",
    }
}

fn chart(kind: ChartKind, title: &str, series: Vec<GroupTotal>) -> Option<ChartSpec> {
    Some(ChartSpec {
        kind,
        title: title.to_string(),
        series,
    })
}

fn compute(intent: Intent, data: &SalesDataset, ctx: &ChatContext) -> (String, Option<ChartSpec>) {
    if data.is_empty() {
        return ("There are no sales in the selected range.".into(), None);
    }

    match intent {
        Intent::TotalSales => {
            let amount = aggregate::total(data, Measure::Amount);
            let target = aggregate::total(data, Measure::Target);
            (
                format!(
                    "Total sales are {} against a target of {}.",
                    format_currency(amount),
                    format_currency(target)
                ),
                None,
            )
        }
        Intent::Compliance => {
            let text = match aggregate::compliance(data) {
                Ok(p) => format!("Overall compliance is {}.", format_percent(p)),
                Err(_) => "Overall compliance is N/A: the target total is zero.".to_string(),
            };
            let series = percent_series(data, Dimension::Branch, |_| true);
            (text, chart(ChartKind::Bar, "Compliance by branch (%)", series))
        }
        Intent::TopProduct => leader(data, Dimension::Product, "product"),
        Intent::TopBranch => leader(data, Dimension::Branch, "branch"),
        Intent::TopSeller => {
            if !data.has_sellers() {
                ("The data has no seller column.".into(), None)
            } else {
                leader(data, Dimension::Seller, "seller")
            }
        }
        Intent::BranchesOverTarget => {
            let series = percent_series(data, Dimension::Branch, |p| p >= 100.0);
            let text = if series.is_empty() {
                "No branch reached its target.".to_string()
            } else {
                format!("Branches at or above target: {}.", describe_percent(&series))
            };
            (text, chart(ChartKind::Bar, "Branches at or above target (%)", series))
        }
        Intent::BranchesBelowTarget => {
            let series = percent_series(data, Dimension::Branch, |p| p < 100.0);
            let text = if series.is_empty() {
                "Every branch reached its target.".to_string()
            } else {
                format!("Branches below target: {}.", describe_percent(&series))
            };
            (text, chart(ChartKind::Bar, "Branches below target (%)", series))
        }
        Intent::Alerts => match ctx.alert_threshold {
            None => ("No alert threshold is configured.".into(), None),
            Some(threshold) => {
                let flagged: Vec<GroupTotal> =
                    aggregate::compliance_alert(data, Dimension::Branch, threshold)
                        .into_iter()
                        .map(|(key, value)| GroupTotal { key, value })
                        .collect();
                let text = if flagged.is_empty() {
                    format!("No branch is below {}% compliance.", threshold)
                } else {
                    format!(
                        "Branches below {}% compliance: {}.",
                        threshold,
                        describe_percent(&flagged)
                    )
                };
                (text, chart(ChartKind::Bar, "Compliance alerts (%)", flagged))
            }
        },
        Intent::WeeklyTrend => trend(
            aggregate::day_of_week_bucket(data, Measure::Amount),
            "day",
            "Sales by weekday",
        ),
        Intent::MonthlyTrend => trend(
            aggregate::month_bucket(data, Measure::Amount),
            "month",
            "Sales by month",
        ),
        Intent::HourlyTrend => {
            if !data.has_hours() {
                ("The data has no hour column.".into(), None)
            } else {
                trend(
                    aggregate::hour_bucket(data, Measure::Amount),
                    "hour",
                    "Sales by hour",
                )
            }
        }
    }
}

fn leader(data: &SalesDataset, dimension: Dimension, noun: &str) -> (String, Option<ChartSpec>) {
    let ranked = aggregate::top_by(data, dimension, Measure::Amount, None);
    match ranked.first() {
        Some(top) => (
            format!(
                "The top {} is {} with {} in sales.",
                noun,
                top.key,
                format_currency(top.value)
            ),
            chart(
                ChartKind::Bar,
                &format!("Sales by {}", dimension.label().to_lowercase()),
                ranked,
            ),
        ),
        None => (format!("No {} has sales in this range.", noun), None),
    }
}

fn trend(bucket: Aggregate, unit: &str, title: &str) -> (String, Option<ChartSpec>) {
    let best = bucket
        .entries
        .iter()
        .fold(None::<&GroupTotal>, |best, e| match best {
            Some(b) if b.value >= e.value => Some(b),
            _ => Some(e),
        });
    let text = match best {
        Some(b) => format!(
            "The strongest {} is {} with {}.",
            unit,
            b.key,
            format_currency(b.value)
        ),
        None => "There is no trend to show.".to_string(),
    };
    (text, chart(ChartKind::Line, title, bucket.entries))
}

fn percent_series<F>(data: &SalesDataset, dimension: Dimension, keep: F) -> Vec<GroupTotal>
where
    F: Fn(f64) -> bool,
{
    aggregate::group_compliance(data, dimension)
        .into_iter()
        .filter_map(|g| match g.compliance {
            Compliance::Percent(p) if keep(p) => Some(GroupTotal { key: g.key, value: p }),
            _ => None,
        })
        .collect()
}

fn describe_percent(series: &[GroupTotal]) -> String {
    series
        .iter()
        .map(|g| format!("{} ({})", g.key, format_percent(g.value)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reveals a reply one character at a time.
///
/// Setting the cancel flag prints the remainder at once.
pub struct Typewriter {
    delay: Duration,
    cancel: Arc<AtomicBool>,
}

impl Typewriter {
    pub fn new(delay: Duration) -> Self {
        Typewriter {
            delay,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Writes `text` to `out`; returns `false` when the reveal was cut short
    pub fn play<W: Write>(&self, text: &str, out: &mut W) -> io::Result<bool> {
        if self.delay.is_zero() {
            out.write_all(text.as_bytes())?;
            out.flush()?;
            return Ok(true);
        }

        for (idx, ch) in text.char_indices() {
            if self.cancel.load(Ordering::Relaxed) {
                out.write_all(text[idx..].as_bytes())?;
                out.flush()?;
                return Ok(false);
            }
            write!(out, "{}", ch)?;
            out.flush()?;
            std::thread::sleep(self.delay);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SalesRecord;
    use chrono::NaiveDate;

    fn data() -> SalesDataset {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        vec![
            SalesRecord::create(d(4), "X", "A", 75.0, 100.0),
            SalesRecord::create(d(5), "Y", "B", 120.0, 100.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn spanish_and_english_questions_resolve() {
        assert_eq!(
            resolve("¿Qué producto vendió más?"),
            Resolution::Matched(Intent::TopProduct)
        );
        assert_eq!(
            resolve("Which branch beat the target?"),
            Resolution::Matched(Intent::BranchesOverTarget)
        );
        assert_eq!(
            resolve("¿Cuál es la tendencia semanal?"),
            Resolution::Matched(Intent::WeeklyTrend)
        );
    }

    #[test]
    fn longer_trigger_beats_overlapping_shorter_one() {
        assert_eq!(
            resolve("¿Qué sucursal no cumplió la meta?"),
            Resolution::Matched(Intent::BranchesBelowTarget)
        );
        assert_eq!(
            resolve("show compliance alerts"),
            Resolution::Matched(Intent::Alerts)
        );
    }

    #[test]
    fn plural_and_possessive_phrasings_resolve() {
        assert_eq!(resolve("Top products?"), Resolution::Matched(Intent::TopProduct));
        assert_eq!(resolve("who are the best sellers"), Resolution::Matched(Intent::TopSeller));
        assert_eq!(resolve("ventas por sucursal"), Resolution::Matched(Intent::TopBranch));
        assert_eq!(
            resolve("which branch missed its target?"),
            Resolution::Matched(Intent::BranchesBelowTarget)
        );
        assert_eq!(
            resolve("which branches met their target"),
            Resolution::Matched(Intent::BranchesOverTarget)
        );
    }

    #[test]
    fn two_separate_topics_are_ambiguous() {
        assert_eq!(
            resolve("total sales and compliance"),
            Resolution::Ambiguous(vec![Intent::TotalSales, Intent::Compliance])
        );
        let reply = answer("weekly trend and top product", &data(), &ChatContext::default());
        assert_eq!(reply.intent, None);
    }

    #[test]
    fn equal_length_matches_are_ambiguous() {
        match resolve("best branch or best seller?") {
            Resolution::Ambiguous(intents) => {
                assert!(intents.contains(&Intent::TopBranch));
                assert!(intents.contains(&Intent::TopSeller));
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn unknown_question_offers_suggestions() {
        let reply = answer("what's the weather", &data(), &ChatContext::default());
        assert_eq!(reply.intent, None);
        assert_eq!(reply.suggestions.len(), SUGGESTED_QUESTIONS.len());
    }

    #[test]
    fn top_product_answer_carries_bar_chart() {
        let reply = answer("top product", &data(), &ChatContext::default());
        assert!(reply.text.contains("B"));
        let chart = reply.chart.unwrap();
        assert_eq!(chart.kind, ChartKind::Bar);
        assert_eq!(chart.series[0].key, "B");
    }

    #[test]
    fn alerts_need_an_explicit_threshold() {
        let reply = answer("alerts", &data(), &ChatContext::default());
        assert!(reply.text.contains("No alert threshold"));

        let ctx = ChatContext {
            range: None,
            alert_threshold: Some(80.0),
        };
        let reply = answer("alerts", &data(), &ctx);
        assert!(reply.text.contains("X (75.00%)"));
    }

    #[test]
    fn empty_range_is_answered_politely() {
        let ctx = ChatContext {
            range: Some(DateFilter::new(
                NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
            )),
            alert_threshold: None,
        };
        let reply = answer("total sales", &data(), &ctx);
        assert_eq!(reply.intent, Some(Intent::TotalSales));
        assert!(reply.text.contains("no sales"));
    }

    #[test]
    fn typewriter_without_delay_writes_everything() {
        let mut out = Vec::new();
        let done = Typewriter::new(Duration::ZERO).play("hola", &mut out).unwrap();
        assert!(done);
        assert_eq!(out, b"hola");
    }

    #[test]
    fn cancelled_typewriter_flushes_remainder() {
        let writer = Typewriter::new(Duration::from_millis(1));
        writer.cancel_handle().store(true, Ordering::Relaxed);
        let mut out = Vec::new();
        let done = writer.play("report ready", &mut out).unwrap();
        assert!(!done);
        assert_eq!(String::from_utf8(out).unwrap(), "report ready");
    }
}
