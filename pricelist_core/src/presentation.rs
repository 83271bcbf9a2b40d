//! # Presentation Layer
//!
//! Turns the store contents into a render-ready [`Dashboard`]: the materials
//! table, the price comparison chart, the profit chart and the summary
//! totals. Drawing is left to a [`Renderer`]; [`DashboardPresenter`] connects
//! a renderer to the store so every store change redraws synchronously.
//!
//! Each row's prices are computed once and the same figures feed the row, the
//! charts and the totals.

use std::time::Duration;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::material::MaterialId;
use crate::numeric::to_f64;
use crate::pricing::{self, Totals};
use crate::store::{StoreChange, StoreObserver, StoreView};

/// Chart labels longer than this are cut and suffixed with `...`
pub const CHART_LABEL_MAX: usize = 15;

/// One line of the materials table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub id: Option<MaterialId>,
    pub name: String,
    pub unit: String,
    #[serde(with = "crate::numeric::lenient")]
    pub real_price: Decimal,
    #[serde(with = "crate::numeric::lenient")]
    pub markup: Decimal,
    #[serde(with = "crate::numeric::lenient")]
    pub markup_price: Decimal,
    #[serde(with = "crate::numeric::lenient")]
    pub profit_margin: Decimal,
    #[serde(with = "crate::numeric::lenient")]
    pub final_price: Decimal,
    #[serde(with = "crate::numeric::lenient")]
    pub profit: Decimal,
    /// Not yet accepted by the remote store
    pub pending: bool,
}

/// Bar chart: real price against markup price per material.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceComparisonChart {
    pub labels: Vec<String>,
    pub real_prices: Vec<f64>,
    pub markup_prices: Vec<f64>,
}

/// Doughnut chart: total real price against total profit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitChart {
    pub total_real_price: f64,
    pub total_profit: f64,
}

impl ProfitChart {
    pub const LABELS: [&'static str; 2] = ["Total Real Price", "Total Profit"];
}

/// Everything a renderer draws.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub rows: Vec<TableRow>,
    pub price_chart: PriceComparisonChart,
    pub profit_chart: ProfitChart,
    pub summary: Totals,
    pub pending_count: usize,
}

impl Dashboard {
    /// Build the dashboard for the current store contents.
    ///
    /// Pending materials are listed (flagged) after the synced rows; charts
    /// and totals cover the synced collection only.
    pub fn build(view: StoreView<'_>) -> Self {
        let mut dashboard = Dashboard::default();

        for material in view.materials {
            let prices = pricing::compute(material);

            dashboard.price_chart.labels.push(truncate_label(&material.name));
            dashboard.price_chart.real_prices.push(to_f64(material.real_price));
            dashboard.price_chart.markup_prices.push(to_f64(prices.markup_price));
            dashboard.summary.accumulate(material.real_price, &prices);

            dashboard.rows.push(TableRow {
                id: material.id.clone(),
                name: material.name.clone(),
                unit: material.unit.clone(),
                real_price: material.real_price,
                markup: material.markup,
                markup_price: prices.markup_price,
                profit_margin: material.profit_margin,
                final_price: prices.final_price,
                profit: prices.profit,
                pending: false,
            });
        }

        for pending in view.pending {
            let material = pending.as_material();
            let prices = pricing::compute(&material);
            dashboard.rows.push(TableRow {
                id: material.id.clone(),
                name: material.name,
                unit: material.unit,
                real_price: material.real_price,
                markup: material.markup,
                markup_price: prices.markup_price,
                profit_margin: material.profit_margin,
                final_price: prices.final_price,
                profit: prices.profit,
                pending: true,
            });
        }

        dashboard.pending_count = view.pending.len();
        dashboard.profit_chart = ProfitChart {
            total_real_price: to_f64(dashboard.summary.total_real_price),
            total_profit: to_f64(dashboard.summary.total_profit),
        };
        dashboard
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Draws a dashboard somewhere (terminal, window, test recorder).
pub trait Renderer: Send {
    fn render(&mut self, dashboard: &Dashboard);
}

/// Store observer that rebuilds the dashboard and hands it to a renderer.
pub struct DashboardPresenter<R: Renderer> {
    renderer: R,
}

impl<R: Renderer> DashboardPresenter<R> {
    pub fn new(renderer: R) -> Self {
        DashboardPresenter { renderer }
    }
}

impl<R: Renderer> StoreObserver for DashboardPresenter<R> {
    fn on_change(&mut self, _change: &StoreChange, view: StoreView<'_>) {
        self.renderer.render(&Dashboard::build(view));
    }
}

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// A toast-style message for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    /// Auto-hide delay for transient messages
    pub const AUTO_HIDE_MS: u64 = 3000;

    pub fn info(text: impl Into<String>) -> Self {
        StatusMessage {
            level: StatusLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        StatusMessage {
            level: StatusLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        StatusMessage {
            level: StatusLevel::Error,
            text: text.into(),
        }
    }

    /// Info and success messages hide themselves; errors stay until replaced.
    pub fn is_transient(&self) -> bool {
        self.level != StatusLevel::Error
    }

    /// Whether a message that has been up for `age` should be hidden by now.
    pub fn is_expired(&self, age: Duration) -> bool {
        self.is_transient() && age >= Duration::from_millis(Self::AUTO_HIDE_MS)
    }
}

/// Shows status messages to the operator.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: StatusMessage);
}

/// Format an amount as Indonesian Rupiah: `Rp 1.234.567`, no decimals.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();
    let grouped = group_thousands(&digits, '.');
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-Rp {}", grouped)
    } else {
        format!("Rp {}", grouped)
    }
}

/// Format a percentage without trailing zeros: `12.5%`.
pub fn format_percent(value: Decimal) -> String {
    format!("{}%", value.normalize())
}

fn group_thousands(digits: &str, separator: char) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(c);
    }
    grouped
}

/// Shorten a chart label to [`CHART_LABEL_MAX`] characters plus `...`.
pub fn truncate_label(name: &str) -> String {
    if name.chars().count() > CHART_LABEL_MAX {
        let cut: String = name.chars().take(CHART_LABEL_MAX).collect();
        format!("{}...", cut)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PriceError;
    use crate::material::{Material, MaterialDraft};
    use crate::store::MaterialStore;
    use std::sync::{Arc, Mutex};

    fn material(id: &str, name: &str, real: i64, markup: i64, margin: i64) -> Material {
        Material::from_draft(
            MaterialId::new(id),
            &MaterialDraft::new(
                name,
                "unit",
                Decimal::from(real),
                Decimal::from(markup),
                Decimal::from(margin),
            ),
        )
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<Dashboard>>>);

    impl Renderer for Capture {
        fn render(&mut self, dashboard: &Dashboard) {
            self.0.lock().unwrap().push(dashboard.clone());
        }
    }

    #[test]
    fn test_currency_format() {
        assert_eq!(format_currency(Decimal::from(85000)), "Rp 85.000");
        assert_eq!(format_currency(Decimal::new(1221875, 1)), "Rp 122.188");
        assert_eq!(format_currency(Decimal::from(2_500_000)), "Rp 2.500.000");
        assert_eq!(format_currency(Decimal::ZERO), "Rp 0");
        assert_eq!(format_currency(Decimal::from(-5000)), "-Rp 5.000");
        assert_eq!(format_currency(Decimal::new(4, 1)), "Rp 0");
    }

    #[test]
    fn test_percent_format() {
        assert_eq!(format_percent(Decimal::new(1250, 2)), "12.5%");
        assert_eq!(format_percent(Decimal::from(30)), "30%");
    }

    #[test]
    fn test_label_truncation() {
        assert_eq!(truncate_label("Freon R32"), "Freon R32");
        assert_eq!(truncate_label("Pipa Tembaga 1/2 inch"), "Pipa Tembaga 1/...");
        assert_eq!(truncate_label("123456789012345"), "123456789012345");
    }

    #[test]
    fn test_dashboard_build() {
        let mut store = MaterialStore::new();
        store.replace_all(vec![
            material("a", "Pipa Tembaga 1/2\"", 85000, 25, 15),
            material("b", "Kabel", 15000, 20, 15),
        ]);

        let dashboard = Dashboard::build(store.view());
        assert_eq!(dashboard.rows.len(), 2);
        assert_eq!(dashboard.rows[0].markup_price, Decimal::from(106250));
        assert_eq!(dashboard.rows[0].final_price, Decimal::new(1221875, 1));
        assert_eq!(dashboard.price_chart.labels, vec!["Pipa Tembaga 1/...", "Kabel"]);
        assert_eq!(dashboard.price_chart.markup_prices, vec![106250.0, 18000.0]);
        assert_eq!(dashboard.summary.total_real_price, Decimal::from(100000));
        assert_eq!(dashboard.profit_chart.total_real_price, 100000.0);
        assert_eq!(
            dashboard.summary.total_profit,
            dashboard.rows.iter().map(|r| r.profit).sum::<Decimal>()
        );
    }

    #[test]
    fn test_pending_rows_are_flagged_and_not_totalled() {
        let mut store = MaterialStore::new();
        store.replace_all(vec![material("a", "Kabel", 15000, 20, 15)]);
        store.push_pending(
            MaterialDraft::new("Offline", "kg", Decimal::from(1000), Decimal::ZERO, Decimal::ZERO),
            &PriceError::remote("create", "offline"),
        );

        let dashboard = Dashboard::build(store.view());
        assert_eq!(dashboard.rows.len(), 2);
        assert!(dashboard.rows[1].pending);
        assert_eq!(dashboard.pending_count, 1);
        assert_eq!(dashboard.summary.count, 1);
        assert_eq!(dashboard.price_chart.labels.len(), 1);
    }

    #[test]
    fn test_presenter_redraws_on_every_change() {
        let capture = Capture::default();
        let mut store = MaterialStore::new();
        store.subscribe(Box::new(DashboardPresenter::new(capture.clone())));
        store.replace_all(vec![material("a", "Kabel", 15000, 20, 15)]);
        store.replace_all(Vec::new());

        let frames = capture.0.lock().unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].is_empty());
        assert_eq!(frames[1].rows.len(), 1);
        assert!(frames[2].is_empty());
    }

    #[test]
    fn test_status_messages() {
        assert!(StatusMessage::success("saved").is_transient());
        assert!(!StatusMessage::error("failed").is_transient());

        let hide_after = Duration::from_millis(StatusMessage::AUTO_HIDE_MS);
        assert!(!StatusMessage::info("loading").is_expired(Duration::from_millis(500)));
        assert!(StatusMessage::info("loading").is_expired(hide_after));
        assert!(!StatusMessage::error("failed").is_expired(hide_after * 10));
    }
}
