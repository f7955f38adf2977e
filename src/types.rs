//! Core types used throughout the feeder
//!
//! Defines assets, pair identifiers and the keys the oracle contract uses for
//! reads and writes.

use ethers::types::U256;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::error::InvalidArgument;

/// Longest string that fits in a single field element.
pub const SHORT_STRING_MAX_LEN: usize = 31;

/// Encode an ASCII string as a field element (big-endian bytes).
///
/// Lower-case input is upper-cased first, matching what the oracle stores.
pub fn short_string_to_felt(text: &str) -> Result<U256, InvalidArgument> {
    if text.is_empty() {
        return Err(InvalidArgument::EmptyString);
    }
    let upper = text.to_uppercase();
    if upper != text {
        tracing::warn!(text = %text, "Converting lower case to upper case for short string");
    }
    let bytes = upper.as_bytes();
    if bytes.len() > SHORT_STRING_MAX_LEN {
        return Err(InvalidArgument::StringTooLong(upper));
    }
    Ok(U256::from_big_endian(bytes))
}

/// Decode a field element produced by [`short_string_to_felt`].
pub fn felt_to_short_string(felt: U256) -> Option<String> {
    let mut buf = [0u8; 32];
    felt.to_big_endian(&mut buf);
    let start = buf.iter().position(|b| *b != 0)?;
    String::from_utf8(buf[start..].to_vec()).ok()
}

/// Instrument kind of an asset, entry or data key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentKind {
    Spot,
    Future,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentKind::Spot => write!(f, "SPOT"),
            InstrumentKind::Future => write!(f, "FUTURE"),
        }
    }
}

#[derive(Deserialize)]
struct PairRepr {
    base: String,
    quote: String,
}

impl From<PairRepr> for Pair {
    fn from(repr: PairRepr) -> Self {
        Pair::new(repr.base, repr.quote)
    }
}

/// Trading pair, symbols kept upper-case
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "PairRepr")]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Canonical symbol, e.g. "BTC/USD"
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    pub fn pair_id(&self) -> Result<PairId, InvalidArgument> {
        PairId::from_symbol(&self.symbol())
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Asset record supplied by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub kind: InstrumentKind,
    pub pair: Pair,
    pub decimals: u32,
}

impl Asset {
    pub fn spot(base: &str, quote: &str, decimals: u32) -> Self {
        Self {
            kind: InstrumentKind::Spot,
            pair: Pair::new(base, quote),
            decimals,
        }
    }

    pub fn future(base: &str, quote: &str, decimals: u32) -> Self {
        Self {
            kind: InstrumentKind::Future,
            pair: Pair::new(base, quote),
            decimals,
        }
    }

    /// Catalog used when the configuration lists no assets.
    pub fn default_catalog() -> Vec<Asset> {
        vec![
            Asset::spot("BTC", "USD", 8),
            Asset::spot("ETH", "USD", 8),
            Asset::spot("WBTC", "USD", 8),
            Asset::spot("USDC", "USD", 6),
            Asset::spot("USDT", "USD", 6),
            Asset::spot("DAI", "USD", 8),
            Asset::future("BTC", "USD", 8),
            Asset::future("BTC", "USDT", 6),
            Asset::future("ETH", "USD", 8),
            Asset::future("ETH", "USDT", 6),
        ]
    }
}

/// Canonical integer id of a trading pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairId(U256);

impl PairId {
    /// Id for a symbol such as "ETH/USD".
    pub fn from_symbol(symbol: &str) -> Result<Self, InvalidArgument> {
        short_string_to_felt(symbol).map(Self)
    }

    pub const fn from_u256(value: U256) -> Self {
        Self(value)
    }

    pub const fn as_u256(&self) -> U256 {
        self.0
    }

    /// Symbol the id was derived from, if it decodes to UTF-8.
    pub fn to_symbol(&self) -> Option<String> {
        felt_to_short_string(self.0)
    }
}

impl From<u128> for PairId {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_symbol() {
            Some(symbol) => write!(f, "{}", symbol),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

/// Conversion of caller-supplied pair identifiers.
///
/// Symbols and unsigned integers resolve to the same key; anything else is
/// rejected rather than coerced.
pub trait IntoPairId {
    fn into_pair_id(self) -> Result<PairId, InvalidArgument>;
}

impl IntoPairId for PairId {
    fn into_pair_id(self) -> Result<PairId, InvalidArgument> {
        Ok(self)
    }
}

impl IntoPairId for &str {
    fn into_pair_id(self) -> Result<PairId, InvalidArgument> {
        PairId::from_symbol(self)
    }
}

impl IntoPairId for String {
    fn into_pair_id(self) -> Result<PairId, InvalidArgument> {
        PairId::from_symbol(&self)
    }
}

impl IntoPairId for &String {
    fn into_pair_id(self) -> Result<PairId, InvalidArgument> {
        PairId::from_symbol(self)
    }
}

impl IntoPairId for u128 {
    fn into_pair_id(self) -> Result<PairId, InvalidArgument> {
        Ok(PairId::from(self))
    }
}

impl IntoPairId for U256 {
    fn into_pair_id(self) -> Result<PairId, InvalidArgument> {
        Ok(PairId::from_u256(self))
    }
}

impl IntoPairId for &serde_json::Value {
    fn into_pair_id(self) -> Result<PairId, InvalidArgument> {
        match self {
            serde_json::Value::String(symbol) => PairId::from_symbol(symbol),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(|id| PairId::from(u128::from(id)))
                .ok_or_else(|| InvalidArgument::PairIdType(format!("number {}", n))),
            other => Err(InvalidArgument::PairIdType(other.to_string())),
        }
    }
}

/// Key used for both reads and writes on the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "SpotEntry")]
    Spot(PairId),
    /// Pair id and expiry timestamp in seconds (0 for perpetuals)
    #[serde(rename = "FutureEntry")]
    Future(PairId, u64),
}

impl DataType {
    pub fn kind(&self) -> InstrumentKind {
        match self {
            DataType::Spot(_) => InstrumentKind::Spot,
            DataType::Future(..) => InstrumentKind::Future,
        }
    }

    pub fn pair_id(&self) -> PairId {
        match self {
            DataType::Spot(id) | DataType::Future(id, _) => *id,
        }
    }

    pub fn expiration(&self) -> Option<u64> {
        match self {
            DataType::Spot(_) => None,
            DataType::Future(_, expiry) => Some(*expiry),
        }
    }
}

/// How the oracle combines the sources' raw entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    #[default]
    Median,
    #[serde(alias = "average")]
    Mean,
    Error,
}

impl AggregationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMode::Median => "Median",
            AggregationMode::Mean => "Mean",
            AggregationMode::Error => "Error",
        }
    }
}

impl Serialize for AggregationMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.as_str(), &())?;
        map.end()
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate computed by the oracle itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResponse {
    pub price: u128,
    pub decimals: u32,
    pub last_updated_timestamp: u64,
    pub num_sources_aggregated: u32,
    pub expiration_timestamp: Option<u64>,
}
