use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::calc::{round2, InstrumentClass};
use crate::error::JournalError;
use crate::models::Trade;
use crate::parsers::dates::day_of;

const DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateRange {
    Today,
    Week,
    Month,
    ThreeMonths,
    SixMonths,
    Year,
    #[default]
    All,
}

impl DateRange {
    /// Earliest close time included in the range, `None` for all time.
    pub fn since(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            DateRange::Today => Some(now.date_naive().and_time(NaiveTime::MIN).and_utc().timestamp()),
            DateRange::Week => Some(now.timestamp() - 7 * DAY),
            DateRange::Month => Some(now.timestamp() - 30 * DAY),
            DateRange::ThreeMonths => Some(now.timestamp() - 90 * DAY),
            DateRange::SixMonths => Some(now.timestamp() - 180 * DAY),
            DateRange::Year => Some(now.timestamp() - 365 * DAY),
            DateRange::All => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            DateRange::Today => "today",
            DateRange::Week => "week",
            DateRange::Month => "month",
            DateRange::ThreeMonths => "3months",
            DateRange::SixMonths => "6months",
            DateRange::Year => "year",
            DateRange::All => "all",
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateRange {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" => Ok(DateRange::Today),
            "week" => Ok(DateRange::Week),
            "month" => Ok(DateRange::Month),
            "3months" => Ok(DateRange::ThreeMonths),
            "6months" => Ok(DateRange::SixMonths),
            "year" => Ok(DateRange::Year),
            "all" | "" => Ok(DateRange::All),
            other => Err(JournalError::InvalidInput(format!("unknown date range '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_trades: i32,
    pub wins: i32,
    pub losses: i32,
    pub breakevens: i32,
    pub open_trades: i32,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub total_fees: f64,
    pub net_pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityCurvePoint {
    pub date: String,
    pub cumulative_pnl: f64,
    pub daily_pnl: f64,
    pub trade_count: i32,
}

/// Per-group totals for the tag and instrument breakdowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownRow {
    pub key: String,
    pub trades: i32,
    pub wins: i32,
    pub win_rate: f64,
    pub total_pnl: f64,
}

fn close_time(trade: &Trade) -> i64 {
    trade.exit_date.unwrap_or(trade.entry_date)
}

fn closed_in_range(trades: &[Trade], range: DateRange) -> impl Iterator<Item = &Trade> {
    let since = range.since(Utc::now());
    trades
        .iter()
        .filter(move |t| !t.is_open() && since.is_none_or(|s| close_time(t) >= s))
}

fn win_rate(wins: i32, losses: i32) -> f64 {
    if wins + losses > 0 {
        round2(wins as f64 / (wins + losses) as f64 * 100.0)
    } else {
        0.0
    }
}

pub fn dashboard_stats(trades: &[Trade], range: DateRange) -> DashboardStats {
    let mut stats = DashboardStats {
        open_trades: trades.iter().filter(|t| t.is_open()).count() as i32,
        ..Default::default()
    };

    let mut best = f64::NEG_INFINITY;
    let mut worst = f64::INFINITY;

    for trade in closed_in_range(trades, range) {
        let pnl = trade.profit_loss;
        stats.total_trades += 1;
        stats.total_pnl += pnl;
        stats.total_fees += trade.fees;
        best = best.max(pnl);
        worst = worst.min(pnl);

        if pnl > 0.0 {
            stats.wins += 1;
            stats.gross_profit += pnl;
        } else if pnl < 0.0 {
            stats.losses += 1;
            stats.gross_loss += pnl.abs();
        } else {
            stats.breakevens += 1;
        }
    }

    if stats.total_trades > 0 {
        stats.best_trade = best;
        stats.worst_trade = worst;
    }

    stats.win_rate = win_rate(stats.wins, stats.losses);
    stats.profit_factor = if stats.gross_loss > 0.0 {
        round2(stats.gross_profit / stats.gross_loss)
    } else if stats.gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };
    if stats.wins > 0 {
        stats.avg_win = round2(stats.gross_profit / stats.wins as f64);
    }
    if stats.losses > 0 {
        stats.avg_loss = round2(stats.gross_loss / stats.losses as f64);
    }

    stats.total_pnl = round2(stats.total_pnl);
    stats.gross_profit = round2(stats.gross_profit);
    stats.gross_loss = round2(stats.gross_loss);
    stats.total_fees = round2(stats.total_fees);
    stats.net_pnl = round2(stats.total_pnl - stats.total_fees);

    stats
}

/// Daily P/L of closed trades with its running total, oldest day first.
pub fn equity_curve(trades: &[Trade], range: DateRange) -> Vec<EquityCurvePoint> {
    let mut daily: BTreeMap<String, (f64, i32)> = BTreeMap::new();
    for trade in closed_in_range(trades, range) {
        let entry = daily.entry(day_of(close_time(trade))).or_insert((0.0, 0));
        entry.0 += trade.profit_loss;
        entry.1 += 1;
    }

    let mut cumulative_pnl = 0.0;
    daily
        .into_iter()
        .map(|(date, (daily_pnl, trade_count))| {
            cumulative_pnl += daily_pnl;
            EquityCurvePoint {
                date,
                cumulative_pnl: round2(cumulative_pnl),
                daily_pnl: round2(daily_pnl),
                trade_count,
            }
        })
        .collect()
}

fn breakdown<'a, F>(trades: &'a [Trade], range: DateRange, keys: F) -> Vec<BreakdownRow>
where
    F: Fn(&'a Trade) -> Vec<String>,
{
    let mut groups: HashMap<String, (i32, i32, i32, f64)> = HashMap::new();
    for trade in closed_in_range(trades, range) {
        for key in keys(trade) {
            let group = groups.entry(key).or_default();
            group.0 += 1;
            if trade.profit_loss > 0.0 {
                group.1 += 1;
            } else if trade.profit_loss < 0.0 {
                group.2 += 1;
            }
            group.3 += trade.profit_loss;
        }
    }

    let mut rows: Vec<BreakdownRow> = groups
        .into_iter()
        .map(|(key, (trades, wins, losses, pnl))| BreakdownRow {
            key,
            trades,
            wins,
            win_rate: win_rate(wins, losses),
            total_pnl: round2(pnl),
        })
        .collect();
    rows.sort_by(|a, b| b.total_pnl.total_cmp(&a.total_pnl).then_with(|| a.key.cmp(&b.key)));
    rows
}

/// Results per hashtag. A trade with several tags counts once in each.
pub fn tag_breakdown(trades: &[Trade], range: DateRange) -> Vec<BreakdownRow> {
    breakdown(trades, range, |t| t.tags.clone())
}

/// Results per instrument class.
pub fn instrument_breakdown(trades: &[Trade], range: DateRange) -> Vec<BreakdownRow> {
    breakdown(trades, range, |t| vec![InstrumentClass::classify(&t.symbol).to_string()])
}
