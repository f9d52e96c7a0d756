use super::ui;
use crate::core::{DataOrigin, StockDirectory, StockListSource};
use anyhow::Result;
use comfy_table::Cell;

pub async fn run(source: &dyn StockListSource) -> Result<()> {
    let pb = ui::new_spinner("Fetching stock list");
    let result = source.fetch_stocks().await;
    pb.finish_and_clear();

    let directory = result?;
    println!("{}", ui::style_text("Stocks", ui::StyleType::Title));
    println!("{}", render(&directory));
    if directory.origin == DataOrigin::Synthetic {
        println!(
            "{}",
            ui::style_text(
                "Stock service unavailable, showing sample stocks",
                ui::StyleType::Warning
            )
        );
    }
    Ok(())
}

fn render(directory: &StockDirectory) -> comfy_table::Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Symbol"), ui::header_cell("Name")]);

    let mut rows: Vec<(&String, &String)> = directory
        .entries
        .iter()
        .map(|(name, symbol)| (symbol, name))
        .collect();
    rows.sort();
    for (symbol, name) in rows {
        table.add_row(vec![Cell::new(symbol), Cell::new(name)]);
    }
    table
}
