//! Market data types
//!
//! Quote and Position are the normalized values carried by the public streams.
//! Both are small `Copy` types so broadcast fan-out stays cheap.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places used when comparing position prices
pub const POSITION_PRICE_SCALE: u32 = 2;

/// Upstream push topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Quote,
    Position,
    Order,
}

impl Topic {
    /// Table name used by the exchange
    pub fn name(&self) -> &'static str {
        match self {
            Topic::Quote => "quote",
            Topic::Position => "position",
            Topic::Order => "order",
        }
    }

    /// Parse table name from an upstream frame
    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            "quote" => Some(Topic::Quote),
            "position" => Some(Topic::Position),
            "order" => Some(Topic::Order),
            _ => None,
        }
    }
}

/// Top of book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Best bid price
    pub bid: Decimal,
    /// Best ask price
    pub ask: Decimal,
}

impl Quote {
    #[inline]
    pub const fn new(bid: Decimal, ask: Decimal) -> Self {
        Self { bid, ask }
    }

    /// Build from exchange floats; `None` if either side is not finite
    pub fn from_f64(bid: f64, ask: f64) -> Option<Self> {
        Some(Self {
            bid: Decimal::from_f64(bid)?,
            ask: Decimal::from_f64(ask)?,
        })
    }

    /// Exact comparison on both sides
    #[inline]
    pub fn same_as(&self, other: &Quote) -> bool {
        self == other
    }
}

/// Position state for the tracked instrument
///
/// `price` is the average entry price. The exchange reports it as `null`
/// while the position is flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub price: Option<Decimal>,
    /// Signed size: positive long, negative short, zero flat
    pub quantity: Decimal,
}

impl Position {
    #[inline]
    pub const fn new(price: Option<Decimal>, quantity: Decimal) -> Self {
        Self { price, quantity }
    }

    /// Price rounded to the cent, half away from zero
    #[inline]
    pub fn rounded_price(&self) -> Option<Decimal> {
        self.price.map(|p| {
            p.round_dp_with_strategy(POSITION_PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
        })
    }

    /// Change-detection equality: price at cent precision, quantity exact
    #[inline]
    pub fn same_as(&self, other: &Position) -> bool {
        self.quantity == other.quantity && self.rounded_price() == other.rounded_price()
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }
}
