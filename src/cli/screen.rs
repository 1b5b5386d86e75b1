use super::ui;
use crate::App;
use crate::core::session::Session;
use crate::core::{Aggregation, FetchError, ResultRow, TickerSet, TickerSymbol, aggregate};
use anyhow::Result;
use comfy_table::Cell;
use std::time::Duration;
use tracing::{debug, info, warn};

const CHART_WIDTH: usize = 60;

#[derive(Debug, Clone, Default)]
pub struct ScreenArgs {
    /// Replaces the saved selection for this run when non-empty.
    pub tickers: Vec<TickerSymbol>,
    /// Added on top of the resolved selection.
    pub add: Vec<TickerSymbol>,
    pub refresh: bool,
    pub undervalued_only: bool,
    pub charts: bool,
    pub save: bool,
}

/// Explicit tickers win, then the saved selection, then the configured default.
pub async fn resolve_selection(app: &App, args: &ScreenArgs) -> Result<TickerSet> {
    let mut selection: TickerSet = if !args.tickers.is_empty() {
        args.tickers.iter().cloned().collect()
    } else {
        match app.session.saved_tickers().await? {
            Some(saved) => saved,
            None => app.config.default_selection.iter().cloned().collect(),
        }
    };
    selection.extend(args.add.iter().cloned());
    Ok(selection)
}

pub async fn fetch(app: &App, selection: &TickerSet, refresh: bool) -> Aggregation {
    let pb = ui::new_progress_bar(selection.len() as u64, true);
    pb.set_message(if refresh {
        "Refreshing market data..."
    } else {
        "Fetching market data..."
    });

    let options = app.aggregate_options(refresh);
    let progress = pb.clone();
    let aggregation = aggregate(
        selection.iter().cloned(),
        &app.snapshots,
        &options,
        &move || progress.inc(1),
    )
    .await;
    pb.finish_and_clear();

    debug!(
        rows = aggregation.rows.len(),
        failures = aggregation.failures.len(),
        "Aggregation complete"
    );
    aggregation
}

/// Saves `selection` and reports the outcome. Returns false, with a warning on
/// stderr, when the session store cannot outlive this process.
pub async fn save_selection(session: &Session, selection: &TickerSet) -> Result<bool> {
    if !session.is_persistent() {
        eprintln!(
            "{}",
            ui::style_text(
                "Selection not saved: no writable data directory (set data_path in the config).",
                ui::StyleType::Error
            )
        );
        return Ok(false);
    }
    session.save_tickers(selection).await?;
    info!("Saved selection of {} tickers", selection.len());
    println!(
        "{}",
        ui::style_text("Selection saved.", ui::StyleType::Subtle)
    );
    Ok(true)
}

pub async fn run(app: &App, args: &ScreenArgs) -> Result<()> {
    let selection = resolve_selection(app, args).await?;
    if args.save {
        save_selection(&app.session, &selection).await?;
    }

    if selection.is_empty() {
        println!("No tickers selected.");
        return Ok(());
    }

    let aggregation = fetch(app, &selection, args.refresh).await;
    println!("{}", render(&aggregation, args));
    Ok(())
}

/// Re-renders the screen every `interval` until interrupted. Only the first
/// pass honors `--refresh`; later passes refetch as cache entries expire.
pub async fn watch(app: &App, args: &ScreenArgs, interval: Duration) -> Result<()> {
    watch_until(app, args, interval, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Runs the watch loop until `shutdown` resolves, which may happen mid-fetch.
pub async fn watch_until<S>(
    app: &App,
    args: &ScreenArgs,
    interval: Duration,
    shutdown: S,
) -> Result<()>
where
    S: std::future::Future<Output = ()>,
{
    let selection = resolve_selection(app, args).await?;
    if selection.is_empty() {
        println!("No tickers selected.");
        return Ok(());
    }

    tokio::pin!(shutdown);
    let term = console::Term::stdout();
    let mut refresh = args.refresh;
    loop {
        let aggregation = tokio::select! {
            _ = &mut shutdown => break,
            aggregation = fetch(app, &selection, refresh) => aggregation,
        };
        refresh = false;

        term.clear_screen()?;
        println!("{}", render(&aggregation, args));
        println!(
            "\n{}",
            ui::style_text(
                &format!(
                    "Updated {} - next update in {}s, Ctrl-C to quit",
                    chrono::Local::now().format("%H:%M:%S"),
                    interval.as_secs()
                ),
                ui::StyleType::Subtle
            )
        );

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    Ok(())
}

pub fn render(aggregation: &Aggregation, args: &ScreenArgs) -> String {
    let mut output = String::new();

    if !args.undervalued_only {
        output.push_str(&format!(
            "{}\n\n",
            ui::style_text("Valuation Screen", ui::StyleType::Title)
        ));
        output.push_str(&render_rows(aggregation.rows.iter()));
        output.push_str("\n\n");
    }

    output.push_str(&format!(
        "{}\n\n",
        ui::style_text("Undervalued", ui::StyleType::Title)
    ));
    if aggregation.undervalued().next().is_some() {
        output.push_str(&render_rows(aggregation.undervalued()));
    } else {
        output.push_str(&ui::style_text(
            "No undervalued tickers.",
            ui::StyleType::Subtle,
        ));
    }

    if !aggregation.failures.is_empty() {
        output.push_str("\n\n");
        output.push_str(&render_failures(&aggregation.failures));
    }

    if args.charts {
        let rows: Vec<&ResultRow> = if args.undervalued_only {
            aggregation.undervalued().collect()
        } else {
            aggregation.rows.iter().collect()
        };
        output.push_str("\n\n");
        output.push_str(&render_charts(&rows));
    }

    output
}

pub fn render_rows<'a>(rows: impl Iterator<Item = &'a ResultRow>) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Name"),
        ui::header_cell("Price"),
        ui::header_cell("EPS"),
        ui::header_cell("PER"),
        ui::header_cell("PBV"),
        ui::header_cell("ROE (%)"),
        ui::header_cell("Fair Value"),
        ui::header_cell("Undervalued"),
        ui::header_cell("Recommendation"),
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(row.ticker.as_str()),
            Cell::new(row.short_name.as_deref().unwrap_or("")),
            ui::format_optional_cell(row.price, ui::format_decimal),
            ui::format_optional_cell(Some(row.eps), ui::format_decimal),
            ui::format_optional_cell(row.per, ui::format_decimal),
            ui::format_optional_cell(row.pbv, ui::format_decimal),
            ui::format_optional_cell(row.roe_percent, ui::format_decimal),
            ui::format_optional_cell(row.fair_value, ui::format_decimal),
            ui::undervalued_cell(row.undervalued),
            ui::recommendation_cell(row.recommendation),
        ]);
    }

    table.to_string()
}

pub fn render_failures(failures: &[FetchError]) -> String {
    let mut output = ui::style_text("Failed tickers", ui::StyleType::Title);
    output.push('\n');
    for failure in failures {
        output.push_str(&format!(
            "\n  {} {}",
            ui::style_text(failure.ticker().as_str(), ui::StyleType::Error),
            failure.reason()
        ));
    }
    output
}

pub fn render_charts(rows: &[&ResultRow]) -> String {
    let mut output = ui::style_text("Price History", ui::StyleType::Title);
    output.push('\n');
    for row in rows {
        output.push_str(&format!("\n{}\n", row.ticker));
        let (Some(first), Some(last)) = (row.history.first(), row.history.last()) else {
            output.push_str(&ui::style_text(
                "  no price history",
                ui::StyleType::Subtle,
            ));
            output.push('\n');
            continue;
        };
        let low = row.history.iter().map(|p| p.close).min().unwrap_or(first.close);
        let high = row.history.iter().map(|p| p.close).max().unwrap_or(last.close);
        output.push_str(&format!(
            "  {}\n  {} to {}  low {}  high {}  last {}\n",
            ui::sparkline(&row.history, CHART_WIDTH),
            first.date,
            last.date,
            ui::format_decimal(low),
            ui::format_decimal(high),
            ui::format_decimal(last.close)
        ));
    }
    output
}
