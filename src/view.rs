//! View models: everything one render pass needs, computed fresh from a
//! typed selection context.

use serde::{Deserialize, Serialize};

use crate::aggregate::{
    self, Aggregate, CrossTable, GroupCompliance, GroupTotal, Kpis, RankedEntry,
};
use crate::format::{format_compliance, format_currency};
use crate::record::{DateFilter, Dimension, Measure, SalesDataset};

/// Who is looking at the dashboard; decides which panels are shown
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    GeneralManager,
    SalesDirector,
    MarketingDirector,
}

impl Profile {
    pub const ALL: [Profile; 3] = [
        Profile::GeneralManager,
        Profile::SalesDirector,
        Profile::MarketingDirector,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match normalized.as_str() {
            "manager" | "generalmanager" | "gerente" | "gerentegeneral" => {
                Some(Profile::GeneralManager)
            }
            "sales" | "salesdirector" | "directordeventas" | "ventas" => {
                Some(Profile::SalesDirector)
            }
            "marketing" | "marketingdirector" | "directordemarketing" => {
                Some(Profile::MarketingDirector)
            }
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Profile::GeneralManager => "General Manager",
            Profile::SalesDirector => "Sales Director",
            Profile::MarketingDirector => "Marketing Director",
        }
    }

    /// Whether this view is behind the manager gate
    pub fn requires_unlock(&self) -> bool {
        matches!(self, Profile::GeneralManager)
    }
}

/// Minimal selection state carried between interactions
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ViewContext {
    pub profile: Profile,
    pub range: Option<DateFilter>,
    /// Restricts every figure to one product, branch or seller
    pub entity: Option<(Dimension, String)>,
    /// Compliance percentage under which groups are flagged; no default
    pub alert_threshold: Option<f64>,
    pub manager_unlocked: bool,
}

impl ViewContext {
    pub fn new(profile: Profile) -> Self {
        ViewContext {
            profile,
            range: None,
            entity: None,
            alert_threshold: None,
            manager_unlocked: false,
        }
    }

    pub fn with_range(mut self, range: Option<DateFilter>) -> Self {
        self.range = range;
        self
    }

    pub fn with_entity(mut self, dimension: Dimension, key: &str) -> Self {
        self.entity = Some((dimension, key.to_string()));
        self
    }

    pub fn with_threshold(mut self, threshold: Option<f64>) -> Self {
        self.alert_threshold = threshold;
        self
    }

    pub fn unlocked(mut self, unlocked: bool) -> Self {
        self.manager_unlocked = unlocked;
        self
    }

    /// The dataset restricted to the selected date range and entity
    pub fn apply(&self, dataset: &SalesDataset) -> SalesDataset {
        let filtered = aggregate::filter_range(dataset, self.range);
        match &self.entity {
            Some((dimension, key)) => filtered.subset(|r| r.key(*dimension) == Some(key.as_str())),
            None => filtered,
        }
    }
}

/// One KPI card
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Card {
    pub label: String,
    pub value: String,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Panel {
    Chart {
        title: String,
        kind: ChartKind,
        series: Vec<GroupTotal>,
    },
    /// Bars clustered by table row, one colour per column
    GroupedChart {
        title: String,
        table: CrossTable,
    },
    Trend {
        title: String,
        lines: Vec<(String, Vec<(chrono::NaiveDate, f64)>)>,
    },
    Ranking {
        title: String,
        rows: Vec<RankedEntry>,
    },
    ComplianceTable {
        title: String,
        rows: Vec<GroupCompliance>,
    },
    Alerts {
        title: String,
        threshold: Option<f64>,
        flagged: Vec<(String, f64)>,
        note: Option<String>,
    },
}

impl Panel {
    pub fn title(&self) -> &str {
        match self {
            Panel::Chart { title, .. }
            | Panel::GroupedChart { title, .. }
            | Panel::Trend { title, .. }
            | Panel::Ranking { title, .. }
            | Panel::ComplianceTable { title, .. }
            | Panel::Alerts { title, .. } => title,
        }
    }

    fn chart(title: &str, kind: ChartKind, aggregate: Aggregate) -> Self {
        Panel::Chart {
            title: title.to_string(),
            kind,
            series: aggregate.entries,
        }
    }
}

/// Computed values for one render pass
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ViewModel {
    pub profile: Profile,
    pub range: Option<DateFilter>,
    pub locked: bool,
    pub notice: Option<String>,
    pub kpis: Option<Kpis>,
    pub cards: Vec<Card>,
    pub panels: Vec<Panel>,
}

pub fn kpi_cards(kpis: &Kpis) -> Vec<Card> {
    let leader = |entry: &Option<GroupTotal>| {
        entry
            .as_ref()
            .map(|e| e.key.clone())
            .unwrap_or_else(|| "-".to_string())
    };
    vec![
        Card {
            label: "Total sales".into(),
            value: format_currency(kpis.total_amount),
        },
        Card {
            label: "Total target".into(),
            value: format_currency(kpis.total_target),
        },
        Card {
            label: "Compliance".into(),
            value: format_compliance(&kpis.compliance),
        },
        Card {
            label: "Top product".into(),
            value: leader(&kpis.top_product),
        },
        Card {
            label: "Top branch".into(),
            value: leader(&kpis.top_branch),
        },
        Card {
            label: "Top seller".into(),
            value: leader(&kpis.top_seller),
        },
    ]
}

/// Builds the view for `ctx` from the full dataset
pub fn build_view(dataset: &SalesDataset, ctx: &ViewContext) -> ViewModel {
    if ctx.profile.requires_unlock() && !ctx.manager_unlocked {
        return ViewModel {
            profile: ctx.profile,
            range: ctx.range,
            locked: true,
            notice: Some("The manager view requires identity verification.".into()),
            kpis: None,
            cards: Vec::new(),
            panels: Vec::new(),
        };
    }

    let data = ctx.apply(dataset);
    let kpis = aggregate::kpis(&data);
    let cards = kpi_cards(&kpis);
    let notice = if data.is_empty() {
        Some("No sales in the selected range.".to_string())
    } else {
        None
    };

    let panels = match ctx.profile {
        Profile::GeneralManager => vec![
            Panel::chart(
                "Sales by branch",
                ChartKind::Bar,
                aggregate::group_sum(&data, Dimension::Branch, Measure::Amount),
            ),
            Panel::ComplianceTable {
                title: "Compliance by branch".into(),
                rows: aggregate::group_compliance(&data, Dimension::Branch),
            },
            alert_panel(&data, ctx.alert_threshold),
            Panel::Ranking {
                title: "Seller ranking".into(),
                rows: aggregate::rank(&data, Dimension::Seller, Measure::Amount),
            },
        ],
        Profile::SalesDirector => vec![
            Panel::chart(
                "Sales by product",
                ChartKind::Bar,
                aggregate::group_sum(&data, Dimension::Product, Measure::Amount),
            ),
            Panel::GroupedChart {
                title: "Sales by product and branch".into(),
                table: aggregate::cross_sum(
                    &data,
                    Dimension::Product,
                    Dimension::Branch,
                    Measure::Amount,
                ),
            },
            Panel::Trend {
                title: "Sales trend by branch".into(),
                lines: aggregate::daily_series(&data, Dimension::Branch),
            },
            Panel::chart(
                "Sales by weekday",
                ChartKind::Line,
                aggregate::day_of_week_bucket(&data, Measure::Amount),
            ),
        ],
        Profile::MarketingDirector => {
            let top = Aggregate {
                entries: aggregate::top_by(&data, Dimension::Product, Measure::Amount, Some(5)),
            };
            vec![
                Panel::Ranking {
                    title: "Top 5 products".into(),
                    rows: aggregate::rank(&data, Dimension::Product, Measure::Amount)
                        .into_iter()
                        .take(5)
                        .collect(),
                },
                Panel::chart("Top 5 products share", ChartKind::Pie, top),
                Panel::chart(
                    "Monthly sales",
                    ChartKind::Line,
                    aggregate::month_bucket(&data, Measure::Amount),
                ),
            ]
        }
    };

    ViewModel {
        profile: ctx.profile,
        range: ctx.range,
        locked: false,
        notice,
        kpis: Some(kpis),
        cards,
        panels,
    }
}

fn alert_panel(data: &SalesDataset, threshold: Option<f64>) -> Panel {
    match threshold {
        Some(t) => Panel::Alerts {
            title: format!("Branches below {}% compliance", t),
            threshold: Some(t),
            flagged: aggregate::compliance_alert(data, Dimension::Branch, t),
            note: None,
        },
        None => Panel::Alerts {
            title: "Compliance alerts".into(),
            threshold: None,
            flagged: Vec::new(),
            note: Some("No alert threshold configured.".into()),
        },
    }
}

/// Compliance of a group list, flattened for display
pub fn compliance_rows(rows: &[GroupCompliance]) -> Vec<(String, String, String, String)> {
    rows.iter()
        .map(|g| {
            (
                g.key.clone(),
                format_currency(g.amount),
                format_currency(g.target),
                format_compliance(&g.compliance),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SalesRecord;
    use chrono::NaiveDate;

    fn data() -> SalesDataset {
        let d = |day| NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
        vec![
            SalesRecord::create(d(1), "X", "A", 75.0, 100.0).with_seller("Ana"),
            SalesRecord::create(d(2), "Y", "B", 90.0, 100.0).with_seller("Luis"),
            SalesRecord::create(d(20), "Y", "A", 10.0, 10.0).with_seller("Ana"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn manager_view_is_locked_until_unlocked() {
        let ctx = ViewContext::new(Profile::GeneralManager);
        let view = build_view(&data(), &ctx);
        assert!(view.locked);
        assert!(view.panels.is_empty());

        let view = build_view(&data(), &ctx.unlocked(true));
        assert!(!view.locked);
        assert_eq!(view.panels.len(), 4);
    }

    #[test]
    fn sales_director_sees_products_split_by_branch() {
        let view = build_view(&data(), &ViewContext::new(Profile::SalesDirector));
        let table = view
            .panels
            .iter()
            .find_map(|p| match p {
                Panel::GroupedChart { table, .. } => Some(table.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(table.rows, vec!["A", "B"]);
        assert_eq!(table.columns, vec!["X", "Y"]);
        assert_eq!(table.values, vec![vec![75.0, 10.0], vec![0.0, 90.0]]);
    }

    #[test]
    fn alert_panel_without_threshold_says_so() {
        let ctx = ViewContext::new(Profile::GeneralManager).unlocked(true);
        let view = build_view(&data(), &ctx);
        let alerts = view
            .panels
            .iter()
            .find(|p| matches!(p, Panel::Alerts { .. }))
            .unwrap();
        match alerts {
            Panel::Alerts { flagged, note, .. } => {
                assert!(flagged.is_empty());
                assert!(note.is_some());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn range_and_entity_narrow_the_figures() {
        let range = DateFilter::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        );
        let ctx = ViewContext::new(Profile::SalesDirector)
            .with_range(Some(range))
            .with_entity(Dimension::Product, "A");
        let view = build_view(&data(), &ctx);
        let kpis = view.kpis.unwrap();
        assert_eq!(kpis.record_count, 1);
        assert_eq!(kpis.total_amount, 75.0);
        assert_eq!(view.cards[0].value, "$75");
    }

    #[test]
    fn empty_range_shows_notice_and_na() {
        let range = DateFilter::new(
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2030, 1, 2).unwrap(),
        );
        let view = build_view(
            &data(),
            &ViewContext::new(Profile::MarketingDirector).with_range(Some(range)),
        );
        assert!(view.notice.is_some());
        assert_eq!(view.cards[2].value, "N/A");
    }

    #[test]
    fn compliance_rows_format_money_and_na() {
        let mut rows = aggregate::group_compliance(&data(), Dimension::Branch);
        rows.push(GroupCompliance {
            key: "Z".into(),
            amount: 1500.0,
            target: 0.0,
            compliance: aggregate::Compliance::Undefined,
        });
        let flat = compliance_rows(&rows);
        assert_eq!(flat[0].0, "X");
        assert_eq!(flat[0].1, "$75");
        assert_eq!(flat[0].2, "$100");
        assert_eq!(flat[0].3, "75.00%");
        assert_eq!(flat[2].1, "$1,500");
        assert_eq!(flat[2].3, "N/A");
    }

    #[test]
    fn profile_names_accept_spanish_titles() {
        assert_eq!(Profile::from_name("Gerente General"), Some(Profile::GeneralManager));
        assert_eq!(Profile::from_name("Director de Ventas"), Some(Profile::SalesDirector));
        assert_eq!(Profile::from_name("marketing"), Some(Profile::MarketingDirector));
        assert_eq!(Profile::from_name("intern"), None);
    }

    #[test]
    fn panels_serialize_with_a_type_tag() {
        let panel = alert_panel(&data(), None);
        let json = serde_json::to_value(&panel).unwrap();
        assert_eq!(json["type"], "alerts");
        assert_eq!(json["note"], "No alert threshold configured.");
        assert!(json["threshold"].is_null());
    }
}
