use super::ui;
use crate::core::config::AppConfig;
use crate::core::session::Session;
use crate::core::{TickerSet, TickerSymbol};
use anyhow::Result;
use tracing::info;

#[derive(Debug, Clone)]
pub enum SelectionAction {
    Show,
    Add(Vec<TickerSymbol>),
    Remove(Vec<TickerSymbol>),
    Clear,
}

/// The saved selection, or the configured default if nothing is saved.
pub async fn current(session: &Session, config: &AppConfig) -> Result<(TickerSet, bool)> {
    Ok(match session.saved_tickers().await? {
        Some(saved) => (saved, true),
        None => (config.default_selection.iter().cloned().collect(), false),
    })
}

/// Applies `action` and returns the resulting selection.
pub async fn apply(
    session: &Session,
    config: &AppConfig,
    action: &SelectionAction,
) -> Result<TickerSet> {
    if !matches!(action, SelectionAction::Show) {
        session.ensure_persistent()?;
    }
    let (mut selection, _) = current(session, config).await?;
    match action {
        SelectionAction::Show => {}
        SelectionAction::Add(tickers) => {
            selection.extend(tickers.iter().cloned());
            session.save_tickers(&selection).await?;
            info!("Added {} tickers to selection", tickers.len());
        }
        SelectionAction::Remove(tickers) => {
            for ticker in tickers {
                selection.remove(ticker);
            }
            session.save_tickers(&selection).await?;
            info!("Removed {} tickers from selection", tickers.len());
        }
        SelectionAction::Clear => {
            session.clear().await?;
            info!("Cleared saved selection");
            selection = config.default_selection.iter().cloned().collect();
        }
    }
    Ok(selection)
}

pub async fn run(session: &Session, config: &AppConfig, action: &SelectionAction) -> Result<()> {
    let selection = apply(session, config, action).await?;
    let (_, saved) = current(session, config).await?;
    println!("{}", render(&selection, saved, &config.watchlist));
    Ok(())
}

pub fn render(selection: &TickerSet, saved: bool, watchlist: &[TickerSymbol]) -> String {
    let source = if saved { "saved" } else { "default" };
    let mut output = format!(
        "{}\n\n",
        ui::style_text(&format!("Selection ({source})"), ui::StyleType::Title)
    );
    if selection.is_empty() {
        output.push_str(&ui::style_text("  (empty)", ui::StyleType::Subtle));
    } else {
        let joined: Vec<&str> = selection.iter().map(TickerSymbol::as_str).collect();
        output.push_str(&format!("  {}", joined.join(", ")));
    }

    output.push_str(&format!(
        "\n\n{}\n\n",
        ui::style_text("Watchlist", ui::StyleType::Title)
    ));
    let available: Vec<String> = watchlist
        .iter()
        .map(|ticker| {
            if selection.contains(ticker) {
                format!("{ticker}*")
            } else {
                ticker.to_string()
            }
        })
        .collect();
    output.push_str(&format!("  {}", available.join(", ")));
    output
}
