//! Text rendering of the dashboard and status messages.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use pricelist_core::presentation::{
    format_currency, format_percent, Dashboard, Notifier, ProfitChart, Renderer, StatusLevel,
    StatusMessage,
};

/// Widest bar in the charts, in characters
const BAR_WIDTH: usize = 40;

/// Draw the whole dashboard as plain text.
pub fn render_dashboard(dashboard: &Dashboard) -> String {
    let mut out = String::new();

    if dashboard.is_empty() {
        out.push_str("No materials yet. Use 'add' or 'sample' to get started.\n");
    } else {
        render_table(&mut out, dashboard);
        out.push('\n');
        render_price_chart(&mut out, dashboard);
        out.push('\n');
        render_profit_chart(&mut out, &dashboard.profit_chart);
    }

    out.push('\n');
    render_summary(&mut out, dashboard);
    out
}

fn render_table(out: &mut String, dashboard: &Dashboard) {
    let _ = writeln!(
        out,
        "{:>3}  {:<24} {:<8} {:>16} {:>8} {:>16} {:>8} {:>16} {:>16}",
        "#",
        "Material",
        "Unit",
        "Real Price",
        "Markup",
        "Markup Price",
        "Margin",
        "Final Price",
        "Profit"
    );
    let _ = writeln!(out, "{}", "-".repeat(125));

    for (index, row) in dashboard.rows.iter().enumerate() {
        let name = if row.pending {
            format!("{} (unsynced)", row.name)
        } else {
            row.name.clone()
        };
        let _ = writeln!(
            out,
            "{:>3}  {:<24} {:<8} {:>16} {:>8} {:>16} {:>8} {:>16} {:>16}",
            index + 1,
            clip(&name, 24),
            clip(&row.unit, 8),
            format_currency(row.real_price),
            format_percent(row.markup),
            format_currency(row.markup_price),
            format_percent(row.profit_margin),
            format_currency(row.final_price),
            format_currency(row.profit),
        );
    }
}

fn render_price_chart(out: &mut String, dashboard: &Dashboard) {
    let chart = &dashboard.price_chart;
    let max = chart
        .real_prices
        .iter()
        .chain(chart.markup_prices.iter())
        .cloned()
        .fold(0.0_f64, f64::max);

    out.push_str("Price Comparison (# real, = markup)\n");
    for (i, label) in chart.labels.iter().enumerate() {
        let _ = writeln!(out, "  {:<18} {}", label, bar(chart.real_prices[i], max, '#'));
        let _ = writeln!(out, "  {:<18} {}", "", bar(chart.markup_prices[i], max, '='));
    }
}

fn render_profit_chart(out: &mut String, chart: &ProfitChart) {
    let total = chart.total_real_price + chart.total_profit;
    out.push_str("Profit Analysis\n");
    for (label, value) in ProfitChart::LABELS
        .iter()
        .zip([chart.total_real_price, chart.total_profit])
    {
        let share = if total > 0.0 { value / total * 100.0 } else { 0.0 };
        let _ = writeln!(out, "  {:<18} {:>5.1}% {}", label, share, bar(value, total, '*'));
    }
}

fn render_summary(out: &mut String, dashboard: &Dashboard) {
    let summary = &dashboard.summary;
    let _ = writeln!(out, "Total Real Price:   {}", format_currency(summary.total_real_price));
    let _ = writeln!(out, "Total Markup Price: {}", format_currency(summary.total_markup_price));
    let _ = writeln!(out, "Total Final Price:  {}", format_currency(summary.total_final_price));
    let _ = writeln!(out, "Total Profit:       {}", format_currency(summary.total_profit));
    if dashboard.pending_count > 0 {
        let _ = writeln!(
            out,
            "{} unsynced material(s) not included; use 'retry' to send them again",
            dashboard.pending_count
        );
    }
}

fn bar(value: f64, max: f64, fill: char) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let width = ((value / max) * BAR_WIDTH as f64).round().max(1.0) as usize;
    fill.to_string().repeat(width.min(BAR_WIDTH))
}

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}~", cut)
    }
}

/// Prints the dashboard to stdout on every store change.
pub struct TerminalRenderer;

impl Renderer for TerminalRenderer {
    fn render(&mut self, dashboard: &Dashboard) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout);
        let _ = write!(stdout, "{}", render_dashboard(dashboard));
        let _ = stdout.flush();
    }
}

/// Status messages waiting for the next prompt.
///
/// Success and info toasts that are older than
/// [`StatusMessage::AUTO_HIDE_MS`] by then are dropped unseen; errors are
/// always shown.
#[derive(Clone, Default)]
pub struct StatusLine {
    queue: Arc<Mutex<Vec<(StatusMessage, Instant)>>>,
}

impl StatusLine {
    pub fn push(&self, message: StatusMessage, at: Instant) {
        self.lock().push((message, at));
    }

    /// Empty the queue, returning what is still visible at `now`.
    pub fn take_visible(&self, now: Instant) -> Vec<StatusMessage> {
        self.lock()
            .drain(..)
            .filter(|(message, at)| !message.is_expired(now.saturating_duration_since(*at)))
            .map(|(message, _)| message)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(StatusMessage, Instant)>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Queues status messages as one-line toasts on a [`StatusLine`].
pub struct ToastNotifier {
    line: StatusLine,
}

impl ToastNotifier {
    pub fn new(line: StatusLine) -> Self {
        ToastNotifier { line }
    }
}

pub fn format_status(message: &StatusMessage) -> String {
    let tag = match message.level {
        StatusLevel::Info => "info",
        StatusLevel::Success => " ok ",
        StatusLevel::Error => "fail",
    };
    format!("[{}] {}", tag, message.text)
}

impl Notifier for ToastNotifier {
    fn notify(&self, message: StatusMessage) {
        self.line.push(message, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricelist_core::material::{Material, MaterialDraft, MaterialId};
    use pricelist_core::MaterialStore;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn dashboard() -> Dashboard {
        let mut store = MaterialStore::new();
        store.replace_all(vec![
            Material::from_draft(
                MaterialId::new("a"),
                &MaterialDraft::new(
                    "Pipa Tembaga 1/2\"",
                    "meter",
                    Decimal::from(85000),
                    Decimal::from(25),
                    Decimal::from(15),
                ),
            ),
            Material::from_draft(
                MaterialId::new("b"),
                &MaterialDraft::new(
                    "Freon R32",
                    "kg",
                    Decimal::from(120000),
                    Decimal::from(35),
                    Decimal::from(15),
                ),
            ),
        ]);
        Dashboard::build(store.view())
    }

    #[test]
    fn test_render_contains_rows_and_totals() {
        let text = render_dashboard(&dashboard());
        assert!(text.contains("Pipa Tembaga 1/2\""));
        assert!(text.contains("Rp 122.188"));
        assert!(text.contains("Total Real Price:   Rp 205.000"));
        assert!(text.contains("Pipa Tembaga 1/..."));
        assert!(text.contains("Profit Analysis"));
    }

    #[test]
    fn test_render_empty() {
        let text = render_dashboard(&Dashboard::default());
        assert!(text.contains("No materials yet"));
        assert!(text.contains("Total Profit:       Rp 0"));
    }

    #[test]
    fn test_bars() {
        assert_eq!(bar(50.0, 100.0, '#').len(), 20);
        assert_eq!(bar(100.0, 100.0, '#').len(), BAR_WIDTH);
        assert_eq!(bar(0.0, 100.0, '#'), "");
        assert_eq!(bar(0.001, 100.0, '#'), "#");
    }

    #[test]
    fn test_status_line_hides_stale_toasts() {
        let line = StatusLine::default();
        let notifier = ToastNotifier::new(line.clone());
        notifier.notify(StatusMessage::success("Material added"));
        let shown = line.take_visible(Instant::now());
        assert_eq!(shown, vec![StatusMessage::success("Material added")]);
        assert!(line.take_visible(Instant::now()).is_empty());

        let start = Instant::now();
        line.push(StatusMessage::info("Loading materials..."), start);
        line.push(StatusMessage::error("Remote create failed"), start);
        let later = start + Duration::from_millis(StatusMessage::AUTO_HIDE_MS + 1);
        assert_eq!(line.take_visible(later), vec![StatusMessage::error("Remote create failed")]);
    }

    #[test]
    fn test_status_format() {
        assert_eq!(format_status(&StatusMessage::error("offline")), "[fail] offline");
        assert_eq!(format_status(&StatusMessage::success("saved")), "[ ok ] saved");
    }
}
