use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Standard forex lot in units of base currency.
pub const FOREX_CONTRACT_SIZE: f64 = 100_000.0;
pub const GOLD_CONTRACT_SIZE: f64 = 100.0;
pub const SILVER_CONTRACT_SIZE: f64 = 50.0;
pub const COMMODITY_CONTRACT_SIZE: f64 = 1_000.0;

const STANDARD_PIP: f64 = 0.0001;
const JPY_PIP: f64 = 0.01;

static CRYPTO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(BTC|XBT|ETH|XRP|LTC|BCH|ADA|SOL|DOGE|DOT|BNB|AVAX|MATIC|POL|LINK|TRX|SHIB|XLM|ATOM|UNI|ETC|FIL|NEAR|APT|ARB|TON|PEPE|SUI|INJ|XMR|AAVE)[-_]?(USDT|USDC|USD|EUR|GBP|BTC|ETH|PERP)?$",
    )
    .expect("crypto pattern is valid")
});

static STOCK_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Z0-9]{1,6}\.(US|NYSE|NASDAQ|N|OQ|L|LN|DE|F|XETRA|PA|AS|BR|MI|MC|SW|ST|CO|OL|HE|TO|V|AX|HK|T|NS|BO|SA)$",
    )
    .expect("stock suffix pattern is valid")
});

const INDEX_TICKERS: &[&str] = &[
    "US30", "US100", "US500", "US2000", "SPX", "SPX500", "SP500", "NAS100", "NDX", "USTEC",
    "DJ30", "DJI", "DOW", "GER30", "GER40", "DE30", "DE40", "DAX", "UK100", "FTSE", "FTSE100",
    "JP225", "JPN225", "NIKKEI", "FRA40", "CAC40", "EU50", "STOXX50", "AUS200", "HK50", "HSI",
    "VIX",
];

const GOLD_PREFIXES: &[&str] = &["XAU", "GOLD"];
const SILVER_PREFIXES: &[&str] = &["XAG", "SILVER"];
const OTHER_COMMODITY_PREFIXES: &[&str] = &[
    "XPT", "XPD", "PLATINUM", "PALLADIUM", "WTI", "BRENT", "USOIL", "UKOIL", "XTI", "XBR",
    "NGAS", "NATGAS", "XNG", "COPPER", "CORN", "WHEAT", "SOYBEAN", "COFFEE", "SUGAR", "COCOA",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentClass {
    Forex,
    Crypto,
    Stock,
    Index,
    Commodity,
    Other,
}

impl InstrumentClass {
    /// Rules are checked in order; the first match wins and unmatched
    /// symbols are treated as stocks.
    pub fn classify(hint: &str) -> InstrumentClass {
        let symbol = hint.trim().to_uppercase();
        if symbol.is_empty() {
            return InstrumentClass::Other;
        }

        if symbol.contains('/') {
            return InstrumentClass::Forex;
        }
        if CRYPTO_RE.is_match(&symbol) {
            return InstrumentClass::Crypto;
        }
        if STOCK_SUFFIX_RE.is_match(&symbol) {
            return InstrumentClass::Stock;
        }

        let base = symbol.split('.').next().unwrap_or(&symbol);
        if INDEX_TICKERS.contains(&base) {
            return InstrumentClass::Index;
        }
        if commodity_kind(&symbol).is_some() {
            return InstrumentClass::Commodity;
        }

        InstrumentClass::Stock
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentClass::Forex => "forex",
            InstrumentClass::Crypto => "crypto",
            InstrumentClass::Stock => "stock",
            InstrumentClass::Index => "index",
            InstrumentClass::Commodity => "commodity",
            InstrumentClass::Other => "other",
        }
    }
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify_instrument(hint: &str) -> InstrumentClass {
    InstrumentClass::classify(hint)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommodityKind {
    Gold,
    Silver,
    Other,
}

fn commodity_kind(symbol: &str) -> Option<CommodityKind> {
    if GOLD_PREFIXES.iter().any(|p| symbol.starts_with(p)) {
        Some(CommodityKind::Gold)
    } else if SILVER_PREFIXES.iter().any(|p| symbol.starts_with(p)) {
        Some(CommodityKind::Silver)
    } else if OTHER_COMMODITY_PREFIXES.iter().any(|p| symbol.starts_with(p)) {
        Some(CommodityKind::Other)
    } else {
        None
    }
}

/// Units per lot. Stocks and indices size by share count, so their
/// multiplier is 1 and the lot size carries the quantity.
pub fn contract_size(class: InstrumentClass, symbol: &str) -> f64 {
    match class {
        InstrumentClass::Forex => FOREX_CONTRACT_SIZE,
        InstrumentClass::Crypto | InstrumentClass::Stock | InstrumentClass::Index => 1.0,
        InstrumentClass::Commodity => match commodity_kind(&symbol.trim().to_uppercase()) {
            Some(CommodityKind::Gold) => GOLD_CONTRACT_SIZE,
            Some(CommodityKind::Silver) => SILVER_CONTRACT_SIZE,
            _ => COMMODITY_CONTRACT_SIZE,
        },
        InstrumentClass::Other => 1.0,
    }
}

pub fn pip_size(symbol: &str) -> f64 {
    if symbol.to_uppercase().contains("JPY") {
        JPY_PIP
    } else {
        STANDARD_PIP
    }
}

const ISO_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "NZD", "SEK", "NOK", "DKK", "PLN", "HUF",
    "CZK", "TRY", "ZAR", "MXN", "SGD", "HKD", "CNH", "CNY", "RUB", "ILS", "THB",
];

/// Rewrites a six-letter currency pair such as `EURUSD` or `gbpjpy.m` to
/// `EUR/USD` / `GBP/JPY`. Anything that is not two ISO codes is returned
/// trimmed and uppercased.
pub fn normalize_symbol(raw: &str) -> String {
    let symbol = raw.trim().to_uppercase();
    let core: String = symbol
        .split(|c: char| c == '.' || c == '_')
        .next()
        .unwrap_or(&symbol)
        .to_string();

    if core.len() == 6 && core.chars().all(|c| c.is_ascii_alphabetic()) {
        let (base, quote) = core.split_at(3);
        if ISO_CURRENCIES.contains(&base) && ISO_CURRENCIES.contains(&quote) {
            return format!("{}/{}", base, quote);
        }
    }

    symbol
}
