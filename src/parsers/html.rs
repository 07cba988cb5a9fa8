use csv::{QuoteStyle, WriterBuilder};
use scraper::{ElementRef, Html, Selector};

use crate::error::{JournalError, Result};
use crate::parsers::metatrader;
use crate::parsers::row::RowOutcome;

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| JournalError::Parse(format!("selector '{}': {:?}", css, e)))
}

fn table_rows(table: ElementRef<'_>, tr: &Selector, cells: &Selector) -> Vec<Vec<String>> {
    table
        .select(tr)
        .map(|row| {
            row.select(cells)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .collect()
        })
        .collect()
}

/// Rows of the first table holding more than one row.
fn first_data_table(content: &str) -> Result<Option<Vec<Vec<String>>>> {
    let document = Html::parse_document(content);
    let table_sel = selector("table")?;
    let tr_sel = selector("tr")?;
    let cell_sel = selector("td, th")?;

    for table in document.select(&table_sel) {
        let rows = table_rows(table, &tr_sel, &cell_sel);
        if rows.len() > 1 {
            return Ok(Some(rows));
        }
    }
    Ok(None)
}

/// Cell text joined with bare commas, so a cell holding a whole
/// comma-separated record splits into fields when read back.
fn rows_to_csv(rows: &[Vec<String>]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .quote_style(QuoteStyle::Never)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| JournalError::Parse(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| JournalError::Parse(e.to_string()))
}

/// Broker HTML statement. No usable table means no trades, not an error.
/// When the table cells yield nothing, the table is re-read as CSV text.
pub fn parse_html(content: &str) -> Result<Vec<RowOutcome>> {
    let Some(rows) = first_data_table(content)? else {
        log::info!("No HTML table with more than one row found");
        return Ok(Vec::new());
    };

    let outcomes: Vec<RowOutcome> = rows
        .iter()
        .map(|fields| metatrader::normalize_fields(fields))
        .collect();

    if outcomes.iter().any(RowOutcome::is_parsed) {
        return Ok(outcomes);
    }

    log::debug!("HTML table gave no trades, retrying as CSV ({} rows)", rows.len());
    metatrader::parse_csv(&rows_to_csv(&rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_table() {
        let html = r#"<html><body>
            <table><tr><td>Account: 1234</td></tr></table>
            <table>
              <tr><th>Ticket</th><th>Open Time</th><th>Type</th><th>Size</th><th>Item</th><th>Price</th><th>Close</th></tr>
              <tr><td>1</td><td>2024.05.01 09:00</td><td>buy</td><td>3</td><td>NVDA</td><td>900.00</td><td>910.00</td></tr>
              <tr><td>2</td><td>2024.05.02 09:00</td><td>sell</td><td>0.1</td><td>EURUSD</td><td>1.0800</td><td>1.0750</td></tr>
            </table>
        </body></html>"#;

        let outcomes = parse_html(html).unwrap();
        assert_eq!(outcomes.len(), 3);
        let trades: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                RowOutcome::Parsed(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].profit_loss, 30.0);
        assert_eq!(trades[1].symbol, "EUR/USD");
        assert_eq!(trades[1].profit_loss, 50.0);
    }

    #[test]
    fn test_single_row_table_is_empty_not_error() {
        let html = "<table><tr><td>1</td><td>2024.05.01</td><td>buy</td><td>1</td><td>AAPL</td><td>1</td><td>2</td></tr></table>";
        assert!(parse_html(html).unwrap().is_empty());
        assert!(parse_html("<p>no tables here</p>").unwrap().is_empty());
    }

    #[test]
    fn test_single_cell_records_are_split_as_csv() {
        let html = "<table>\
            <tr><td>1,2024.01.10 10:00,buy,1,AAPL,100,110</td></tr>\
            <tr><td>2,2024.01.11 10:00,sell,2,AAPL,120,118</td></tr>\
            </table>";
        let outcomes = parse_html(html).unwrap();
        assert_eq!(outcomes.len(), 2);

        let trades: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                RowOutcome::Parsed(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].symbol, "AAPL");
        assert_eq!(trades[0].profit_loss, 10.0);
        assert_eq!(trades[1].profit_loss, 4.0);
    }

    #[test]
    fn test_table_without_trades_stays_empty() {
        let html = "<table><tr><td>a</td><td>b</td></tr><tr><td>c</td><td>d</td></tr></table>";
        let outcomes = parse_html(html).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.is_parsed()));
    }

    #[test]
    fn test_rows_to_csv_joins_cells_unquoted() {
        let csv = rows_to_csv(&[vec!["a,b".into(), "c".into()], vec!["d".into()]]).unwrap();
        assert_eq!(csv, "a,b,c\nd\n");
    }
}
