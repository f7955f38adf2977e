//! Normalized price observations
//!
//! An [`Entry`] is built once by a source fetcher and never mutated. Its
//! [`DataType`] carries the instrument kind, the pair id and, for futures,
//! the expiry in seconds.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FetchError, InvalidArgument};
use crate::types::{Asset, DataType, InstrumentKind, Pair};

/// Largest number of decimals a price can be scaled by exactly.
pub const MAX_DECIMALS: u32 = 28;

/// Scale an observed price to an integer with `decimals` digits.
///
/// The result is `round(price * 10^decimals)`; `None` when the price is
/// negative or the scaled value does not fit.
pub fn scale_price(price: Decimal, decimals: u32) -> Option<u128> {
    if price.is_sign_negative() || decimals > MAX_DECIMALS {
        return None;
    }
    let factor = Decimal::from_i128_with_scale(10i128.pow(decimals), 0);
    price
        .checked_mul(factor)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u128()
}

/// One normalized price observation ready for submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub data_type: DataType,
    pub pair: Pair,
    /// round(observed price * 10^decimals)
    pub price: u128,
    /// Seconds since epoch
    pub timestamp: u64,
    pub volume: f64,
    /// Exchange tag, e.g. "OKX"
    pub source: String,
    pub publisher: String,
}

impl Entry {
    /// Entry for `asset` with zero volume; futures start as perpetual.
    pub fn new(
        asset: &Asset,
        price: u128,
        timestamp: u64,
        source: &str,
        publisher: &str,
    ) -> Result<Self, InvalidArgument> {
        let pair_id = asset.pair.pair_id()?;
        let data_type = match asset.kind {
            InstrumentKind::Spot => DataType::Spot(pair_id),
            InstrumentKind::Future => DataType::Future(pair_id, 0),
        };
        Ok(Self {
            data_type,
            pair: asset.pair.clone(),
            price,
            timestamp,
            volume: 0.0,
            source: source.to_string(),
            publisher: publisher.to_string(),
        })
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = if volume.is_finite() && volume > 0.0 {
            volume
        } else {
            0.0
        };
        self
    }

    /// Set the expiry (seconds) of a future entry; spot entries are unchanged.
    pub fn with_expiry(mut self, expiry_timestamp: u64) -> Self {
        if let DataType::Future(pair_id, _) = self.data_type {
            self.data_type = DataType::Future(pair_id, expiry_timestamp);
        }
        self
    }

    pub fn kind(&self) -> InstrumentKind {
        self.data_type.kind()
    }

    /// Expiry in seconds, 0 for spot and perpetual entries.
    pub fn expiry_timestamp(&self) -> u64 {
        self.data_type.expiration().unwrap_or(0)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} price={} ts={} source={}",
            self.kind(),
            self.pair,
            self.price,
            self.timestamp,
            self.source
        )?;
        if self.kind() == InstrumentKind::Future {
            write!(f, " expiry={}", self.expiry_timestamp())?;
        }
        Ok(())
    }
}

/// "No data for this asset from this source right now"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub message: String,
}

impl FetchFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Standard message for a pair the source does not know.
    pub fn not_found(pair: &Pair, source: &str) -> Self {
        Self::new(format!("No data found for {} from {}", pair, source))
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Element of a fetcher's result list
#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    Entry(Entry),
    NotFound(FetchFailure),
}

impl FetchItem {
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            FetchItem::Entry(entry) => Some(entry),
            FetchItem::NotFound(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchItem::NotFound(_))
    }
}

/// Result of one (source, asset) attempt
///
/// Fatal failures keep their position next to the entries and not-found
/// values of sibling assets.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Entry(Entry),
    NotFound {
        source: String,
        pair: Pair,
        failure: FetchFailure,
    },
    Fatal {
        source: String,
        pair: Pair,
        error: FetchError,
    },
}

impl FetchOutcome {
    /// Outcomes for fetching `pair` from `source`: one per returned item, or
    /// a single `Fatal` when the call failed.
    pub fn from_result(
        source: &str,
        pair: &Pair,
        result: Result<Vec<FetchItem>, FetchError>,
    ) -> Vec<Self> {
        match result {
            Ok(items) => items
                .into_iter()
                .map(|item| match item {
                    FetchItem::Entry(entry) => FetchOutcome::Entry(entry),
                    FetchItem::NotFound(failure) => FetchOutcome::NotFound {
                        source: source.to_string(),
                        pair: pair.clone(),
                        failure,
                    },
                })
                .collect(),
            Err(error) => {
                tracing::error!(source = %source, pair = %pair, error = %error, "Fetch failed");
                vec![FetchOutcome::Fatal {
                    source: source.to_string(),
                    pair: pair.clone(),
                    error,
                }]
            }
        }
    }

    pub fn entry(&self) -> Option<&Entry> {
        match self {
            FetchOutcome::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn into_entry(self) -> Option<Entry> {
        match self {
            FetchOutcome::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchOutcome::NotFound { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchOutcome::Fatal { .. })
    }
}
