use super::ui;
use crate::core::{SearchCandidate, SearchProvider};
use anyhow::Result;
use comfy_table::Cell;
use tracing::warn;

pub async fn run(provider: &dyn SearchProvider, query: &str) -> Result<()> {
    let candidates = provider.search(query).await?;
    if candidates.is_empty() {
        warn!(query, "No matches found");
        println!(
            "{}",
            ui::style_text(&format!("No matches found for '{query}'."), ui::StyleType::Subtle)
        );
        return Ok(());
    }
    println!("{}", render(&candidates));
    Ok(())
}

pub fn render(candidates: &[SearchCandidate]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Symbol"), ui::header_cell("Name")]);
    for candidate in candidates {
        table.add_row(vec![
            Cell::new(&candidate.symbol),
            Cell::new(&candidate.name),
        ]);
    }
    table.to_string()
}
