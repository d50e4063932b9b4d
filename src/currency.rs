//! UGR valuation. One UGR is worth a fixed, weighted basket of essential goods,
//! so its value moves with the prices of those goods.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

/// Value of one UGR in basic-need units.
pub const UGR_BASE_VALUE: Decimal = Decimal::ONE;

/// Yearly value gain assumed by [`project_value`] when none is given: 2%.
pub const DEFAULT_EFFICIENCY_GAIN: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CurrencyError {
    #[error("Amount is too large to value")]
    Overflow,
    #[error("Basket item `{0}` has no price")]
    Unpriced(String),
    #[error("Baseline basket has no value")]
    EmptyBaseline,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BasketItem {
    pub name: String,
    /// Unit the price refers to, e.g. `1 kg`.
    pub quantity: String,
    pub price: Decimal,
    pub weight: Decimal,
}

impl BasketItem {
    fn new(name: &str, quantity: &str, price: Decimal, weight: Decimal) -> Self {
        Self {
            name: name.to_string(),
            quantity: quantity.to_string(),
            price,
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Basket {
    pub items: Vec<BasketItem>,
}

impl Basket {
    /// The published reference basket.
    pub fn standard() -> Self {
        Self {
            items: vec![
                BasketItem::new("Rice", "1 kg", Decimal::new(250, 2), Decimal::new(25, 2)),
                BasketItem::new("Wheat Flour", "1 kg", Decimal::new(180, 2), Decimal::new(20, 2)),
                BasketItem::new("Drinking Water", "1 liter", Decimal::new(50, 2), Decimal::new(15, 2)),
                BasketItem::new("Electricity", "1 kWh", Decimal::new(15, 2), Decimal::new(10, 2)),
                BasketItem::new("Fuel", "1 liter", Decimal::new(120, 2), Decimal::new(20, 2)),
                BasketItem::new("Medical Pack", "Basic package", Decimal::new(125, 2), Decimal::new(10, 2)),
            ],
        }
    }

    /// Weighted sum of item prices: the value of one UGR.
    pub fn total_value(&self) -> Result<Decimal, CurrencyError> {
        self.items.iter().try_fold(Decimal::ZERO, |total, item| {
            item.price
                .checked_mul(item.weight)
                .and_then(|share| total.checked_add(share))
                .ok_or(CurrencyError::Overflow)
        })
    }

    /// How many units of each item `ugr` buys when spent along the basket weights.
    pub fn purchasable(&self, ugr: Decimal) -> Result<Vec<(&BasketItem, Decimal)>, CurrencyError> {
        let budget = self
            .total_value()?
            .checked_mul(ugr)
            .ok_or(CurrencyError::Overflow)?;
        self.items
            .iter()
            .map(|item| {
                if item.price.is_zero() {
                    return Err(CurrencyError::Unpriced(item.name.clone()));
                }
                let units = budget
                    .checked_mul(item.weight)
                    .and_then(|share| share.checked_div(item.price))
                    .ok_or(CurrencyError::Overflow)?;
                Ok((item, units))
            })
            .collect()
    }

    /// Human-readable summary of what `ugr` buys, listing at most three goods.
    pub fn describe_goods(&self, ugr: Decimal) -> Result<String, CurrencyError> {
        let thousand = Decimal::ONE_THOUSAND;
        let significant = Decimal::new(1, 1);
        let descriptions: Vec<String> = self
            .purchasable(ugr)?
            .into_iter()
            .filter(|(_, units)| *units >= significant)
            .map(|(item, units)| {
                let shown = if units >= thousand {
                    format!("{} thousand", round(units / thousand, 1))
                } else if units >= Decimal::ONE {
                    round(units, 1).to_string()
                } else {
                    round(units, 2).to_string()
                };
                format!("{shown} {} {}", item.quantity, item.name)
            })
            .collect();

        if descriptions.is_empty() {
            return Ok("Various essential goods".to_string());
        }
        let mut summary = descriptions[..descriptions.len().min(3)].join(" + ");
        if descriptions.len() > 3 {
            summary.push_str(" + more");
        }
        Ok(summary)
    }
}

fn round(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Percentage change in total basket value between two price snapshots.
pub fn inflation(last: &[Decimal], current: &[Decimal]) -> Result<Decimal, CurrencyError> {
    let sum = |values: &[Decimal]| {
        values
            .iter()
            .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
            .ok_or(CurrencyError::Overflow)
    };
    let last = sum(last)?;
    let current = sum(current)?;
    if last.is_zero() {
        return Err(CurrencyError::EmptyBaseline);
    }
    (current - last)
        .checked_div(last)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or(CurrencyError::Overflow)
}

/// Value of one UGR after `years` of compounding `efficiency_gain`.
pub fn project_value(years: u32, efficiency_gain: Decimal) -> Result<Decimal, CurrencyError> {
    let factor = Decimal::ONE + efficiency_gain;
    (0..years).try_fold(Decimal::ONE, |value, _| {
        value.checked_mul(factor).ok_or(CurrencyError::Overflow)
    })
}

/// Converts a local amount into UGR at `exchange_rate` basic-need units per local unit.
pub fn convert_to_ugr(amount: Decimal, exchange_rate: Decimal) -> Result<Decimal, CurrencyError> {
    amount
        .checked_mul(exchange_rate)
        .and_then(|units| units.checked_div(UGR_BASE_VALUE))
        .ok_or(CurrencyError::Overflow)
}
