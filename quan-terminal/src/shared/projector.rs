//! Translation of feed messages into series points and display text.
//!
//! Everything here is pure: callers pass the target series in and receive the
//! derived display fields back.

use crate::shared::{
    series::RollingSeries,
    types::{BalanceUpdate, PriceTick},
};
use chrono::{DateTime, Local, TimeZone};

/// Trade side implied by the sign of the price change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_change(change: f64) -> Self {
        if change >= 0.0 { Side::Buy } else { Side::Sell }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Styling class of the change metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    Up,
    Down,
}

/// Display fields derived from one price tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickView {
    pub symbol: String,
    pub time_label: String,
    pub price: String,
    pub change: String,
    pub change_class: ChangeClass,
    pub volume: String,
    pub side: Side,
}

/// Display fields derived from one balance update
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceView {
    pub time_label: String,
    pub balance: String,
}

/// Format a unix timestamp in seconds as a local `HH:MM:SS` label.
pub fn time_label(timestamp_seconds: f64) -> String {
    let secs = timestamp_seconds.floor();
    let nanos = ((timestamp_seconds - secs) * 1e9) as u32;

    match Local.timestamp_opt(secs as i64, nanos).single() {
        Some(time) => format_time(&time),
        None => "--:--:--".to_string(),
    }
}

fn format_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%H:%M:%S").to_string()
}

pub fn format_signed(value: f64) -> String {
    if value >= 0.0 {
        // abs() folds -0.0 into +0.00
        format!("+{:.2}", value.abs())
    } else {
        format!("{value:.2}")
    }
}

/// Append the tick to `series` and return its display snapshot.
pub fn project_tick(tick: &PriceTick, series: &mut RollingSeries) -> TickView {
    let label = time_label(tick.timestamp_seconds);
    series.push(label.clone(), tick.price);

    TickView {
        symbol: tick.symbol.clone(),
        time_label: label,
        price: format!("{:.2}", tick.price),
        change: format_signed(tick.change),
        change_class: if tick.change >= 0.0 {
            ChangeClass::Up
        } else {
            ChangeClass::Down
        },
        volume: format!("{:.2}", tick.volume),
        side: Side::from_change(tick.change),
    }
}

/// Project a balance update received at `received`.
///
/// Errors leave `series` untouched and come back as the error text.
pub fn project_balance(
    update: &BalanceUpdate,
    series: &mut RollingSeries,
    received: DateTime<Local>,
) -> Result<BalanceView, String> {
    match update {
        BalanceUpdate::Balance(balance) => {
            let label = format_time(&received);
            series.push(label.clone(), *balance);
            Ok(BalanceView {
                time_label: label,
                balance: format!("{balance:.2}"),
            })
        }
        BalanceUpdate::Error(error) => Err(error.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc_tick() -> PriceTick {
        PriceTick {
            symbol: "BTCUSDT".to_string(),
            price: 50000.12,
            change: -25.5,
            volume: 120.4,
            timestamp_seconds: 1_700_000_000.0,
        }
    }

    #[test]
    fn test_project_tick() {
        let mut series = RollingSeries::new(60);
        let view = project_tick(&btc_tick(), &mut series);

        assert_eq!(view.symbol, "BTCUSDT");
        assert_eq!(view.price, "50000.12");
        assert_eq!(view.change, "-25.50");
        assert_eq!(view.change_class, ChangeClass::Down);
        assert_eq!(view.volume, "120.40");
        assert_eq!(view.side, Side::Sell);

        assert_eq!(series.len(), 1);
        assert_eq!(series.last(), Some((view.time_label.as_str(), 50000.12)));
        assert_eq!(view.time_label, time_label(1_700_000_000.0));
    }

    #[test]
    fn test_zero_change_is_buy() {
        let mut series = RollingSeries::new(60);
        let tick = PriceTick {
            change: 0.0,
            ..btc_tick()
        };
        let view = project_tick(&tick, &mut series);

        assert_eq!(view.change, "+0.00");
        assert_eq!(view.change_class, ChangeClass::Up);
        assert_eq!(view.side, Side::Buy);
    }

    #[test]
    fn test_time_label_shape() {
        let label = time_label(1_700_000_000.25);
        assert_eq!(label.len(), 8);
        assert_eq!(label.matches(':').count(), 2);

        assert_eq!(time_label(f64::MAX), "--:--:--");
    }

    #[test]
    fn test_project_balance() {
        let mut series = RollingSeries::new(50);
        let view = project_balance(&BalanceUpdate::Balance(1234.5), &mut series, Local::now())
            .unwrap();
        assert_eq!(view.balance, "1234.50");
        assert_eq!(series.len(), 1);

        let error = project_balance(
            &BalanceUpdate::Error("api key missing".to_string()),
            &mut series,
            Local::now(),
        );
        assert_eq!(error, Err("api key missing".to_string()));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Buy.to_string(), "BUY");
        assert_eq!(Side::Sell.to_string(), "SELL");
    }
}
