use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

use crate::error::{JournalError, Result};
use crate::parsers::row::{normalize_order, RawOrder, RowOutcome};

pub const SOURCE: &str = "MetaTrader XML";

fn attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| JournalError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
        let value = attr
            .unescape_value()
            .map_err(|e| JournalError::Parse(e.to_string()))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn first_of(attrs: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| attrs.get(*k).cloned())
}

fn raw_order(attrs: &HashMap<String, String>) -> RawOrder {
    RawOrder {
        ticket: first_of(attrs, &["ticket", "id"]),
        open_time: first_of(attrs, &["open_time", "opentime", "time"]),
        kind: first_of(attrs, &["type", "side"]),
        size: first_of(attrs, &["size", "lots", "volume"]),
        symbol: first_of(attrs, &["symbol", "item"]),
        open_price: first_of(attrs, &["open_price", "openprice", "price"]),
        stop_loss: first_of(attrs, &["sl", "stop_loss"]),
        take_profit: first_of(attrs, &["tp", "take_profit"]),
        close_time: first_of(attrs, &["close_time", "closetime"]),
        close_price: first_of(attrs, &["close_price", "closeprice"]),
        commission: first_of(attrs, &["commission"]),
        swap: first_of(attrs, &["swap"]),
        profit: first_of(attrs, &["profit"]),
    }
}

/// Reads every `<order>` element's attributes. Other elements are ignored.
pub fn parse_xml(content: &str) -> Result<Vec<RowOutcome>> {
    let mut reader = Reader::from_str(content);
    let mut outcomes = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref().eq_ignore_ascii_case(b"order") => {
                let attrs = attributes(&e)?;
                outcomes.push(normalize_order(&raw_order(&attrs), SOURCE));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    log::debug!("Parsed {} <order> elements", outcomes.len());
    Ok(outcomes)
}
