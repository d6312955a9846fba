// Message Parser - typed ingestion adapter
// Raw Binance stream payloads and REST/Kraken backfill responses -> core types

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::types::{BookLevel, DepthSnapshot, Interval, KlineTick, Side, TradePrint};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Invalid {field}: '{value}'")]
    InvalidField { field: String, value: String },
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError::InvalidJson(e.to_string())
    }
}

// ============================================================================
// Numeric fields
// ============================================================================

/// Feeds send decimals either as strings ("64250.10") or as bare numbers
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Num(f64),
    Text(String),
}

impl RawNumber {
    fn to_f64(&self, field: &str) -> Result<f64, ParseError> {
        let value = match self {
            RawNumber::Num(v) => *v,
            RawNumber::Text(s) => s.trim().parse::<f64>().map_err(|_| ParseError::InvalidField {
                field: field.to_string(),
                value: s.clone(),
            })?,
        };
        if !value.is_finite() {
            return Err(ParseError::InvalidField {
                field: field.to_string(),
                value: value.to_string(),
            });
        }
        Ok(value)
    }
}

fn value_to_f64(value: &serde_json::Value, field: &str) -> Result<f64, ParseError> {
    let raw: RawNumber = serde_json::from_value(value.clone()).map_err(|_| ParseError::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
    })?;
    raw.to_f64(field)
}

fn value_to_i64(value: &serde_json::Value, field: &str) -> Result<i64, ParseError> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|v| v as i64))
        .or_else(|| value.as_str().and_then(|s| s.parse::<i64>().ok()))
        .ok_or_else(|| ParseError::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn parse_levels(raw: &[[RawNumber; 2]]) -> Result<Vec<BookLevel>, ParseError> {
    raw.iter()
        .map(|[price, size]| Ok(BookLevel::new(price.to_f64("level.price")?, size.to_f64("level.size")?)))
        .collect()
}

// ============================================================================
// Parsed Message
// ============================================================================

/// Every stream payload the engine understands, already typed
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Kline(KlineTick),
    Trade(TradePrint),
    /// Full book replacement (partial-depth stream or REST snapshot)
    DepthSnapshot(DepthSnapshot),
    /// Level changes to merge; size 0 removes a level
    DepthUpdate(DepthSnapshot),
}

impl ParsedMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedMessage::Kline(_) => "kline",
            ParsedMessage::Trade(_) => "trade",
            ParsedMessage::DepthSnapshot(_) => "depth_snapshot",
            ParsedMessage::DepthUpdate(_) => "depth_update",
        }
    }
}

// ============================================================================
// Serde Structures (raw feed JSON)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawKlineData {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "i", default)]
    interval: Option<String>,
    #[serde(rename = "o")]
    open: RawNumber,
    #[serde(rename = "h")]
    high: RawNumber,
    #[serde(rename = "l")]
    low: RawNumber,
    #[serde(rename = "c")]
    close: RawNumber,
    #[serde(rename = "v")]
    volume: RawNumber,
    #[serde(rename = "V", default)]
    taker_buy_volume: Option<RawNumber>,
    #[serde(rename = "x", default)]
    is_closed: bool,
}

#[derive(Debug, Deserialize)]
struct RawKline {
    #[serde(rename = "k")]
    kline: RawKlineData,
}

/// aggTrade and trade share the fields the engine needs
#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(rename = "p")]
    price: RawNumber,
    #[serde(rename = "q")]
    quantity: RawNumber,
    #[serde(rename = "T")]
    trade_time: i64,
    #[serde(rename = "m")]
    is_buyer_maker: bool,
}

#[derive(Debug, Deserialize)]
struct RawDepthUpdate {
    #[serde(rename = "E", default)]
    event_time: i64,
    #[serde(rename = "b")]
    bids: Vec<[RawNumber; 2]>,
    #[serde(rename = "a")]
    asks: Vec<[RawNumber; 2]>,
}

#[derive(Debug, Deserialize)]
struct RawDepthSnapshot {
    #[serde(rename = "E", default)]
    event_time: i64,
    bids: Vec<[RawNumber; 2]>,
    asks: Vec<[RawNumber; 2]>,
}

// ============================================================================
// MessageParser - stateful parser with validation & stats
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ParserStats {
    pub messages_parsed: u64,
    pub parse_errors: u64,
    pub validation_failures: u64,
    pub kline_count: u64,
    pub trade_count: u64,
    pub depth_count: u64,
}

impl ParserStats {
    pub fn error_rate(&self) -> f64 {
        let total = self.messages_parsed + self.parse_errors + self.validation_failures;
        if total > 0 {
            (self.parse_errors + self.validation_failures) as f64 / total as f64
        } else {
            0.0
        }
    }
}

pub struct MessageParser {
    symbol: String,
    interval: Interval,
    pub stats: ParserStats,
}

impl MessageParser {
    pub fn new(symbol: &str, interval: Interval) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            interval,
            stats: ParserStats::default(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Retarget the parser after an instrument switch
    pub fn set_instrument(&mut self, symbol: &str, interval: Interval) {
        self.symbol = symbol.to_uppercase();
        self.interval = interval;
    }

    /// Parse any supported stream message, counting the outcome
    pub fn parse(&mut self, raw_json: &str) -> Result<ParsedMessage, ParseError> {
        match self.parse_inner(raw_json) {
            Ok(msg) => {
                self.stats.messages_parsed += 1;
                match &msg {
                    ParsedMessage::Kline(_) => self.stats.kline_count += 1,
                    ParsedMessage::Trade(_) => self.stats.trade_count += 1,
                    ParsedMessage::DepthSnapshot(_) | ParsedMessage::DepthUpdate(_) => {
                        self.stats.depth_count += 1
                    }
                }
                Ok(msg)
            }
            Err(e) => {
                match e {
                    ParseError::ValidationFailed(_) => self.stats.validation_failures += 1,
                    _ => self.stats.parse_errors += 1,
                }
                debug!(error = %e, "Feed message rejected");
                Err(e)
            }
        }
    }

    fn parse_inner(&self, raw_json: &str) -> Result<ParsedMessage, ParseError> {
        let value: serde_json::Value = serde_json::from_str(raw_json)?;

        // Unwrap combined stream format: {"stream": "...", "data": {...}}
        let data = value.get("data").unwrap_or(&value);

        // Partial depth payloads carry no event type
        if data.get("e").is_none() && data.get("bids").is_some() && data.get("asks").is_some() {
            let raw: RawDepthSnapshot = serde_json::from_value(data.clone())?;
            return Ok(ParsedMessage::DepthSnapshot(DepthSnapshot {
                bids: parse_levels(&raw.bids)?,
                asks: parse_levels(&raw.asks)?,
                timestamp: raw.event_time,
            }));
        }

        let event_type = data
            .get("e")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ParseError::InvalidJson("Missing event type 'e'".into()))?;

        if let Some(sym) = data.get("s").and_then(|v| v.as_str()) {
            if !sym.eq_ignore_ascii_case(&self.symbol) {
                return Err(ParseError::ValidationFailed(format!(
                    "Symbol mismatch: expected {}, got {}",
                    self.symbol, sym
                )));
            }
        }

        match event_type {
            "kline" => self.parse_kline(data),
            "aggTrade" | "trade" => self.parse_trade(data),
            "depthUpdate" => self.parse_depth_update(data),
            other => Err(ParseError::UnknownEventType(other.to_string())),
        }
    }

    fn parse_kline(&self, data: &serde_json::Value) -> Result<ParsedMessage, ParseError> {
        let raw: RawKline = serde_json::from_value(data.clone())?;
        let k = raw.kline;

        if let Some(interval) = &k.interval {
            if interval != self.interval.as_str() {
                return Err(ParseError::ValidationFailed(format!(
                    "Interval mismatch: expected {}, got {}",
                    self.interval, interval
                )));
            }
        }

        let tick = KlineTick::new(
            k.open_time,
            k.open.to_f64("kline.open")?,
            k.high.to_f64("kline.high")?,
            k.low.to_f64("kline.low")?,
            k.close.to_f64("kline.close")?,
            k.volume.to_f64("kline.volume")?,
            k.taker_buy_volume
                .as_ref()
                .map(|v| v.to_f64("kline.taker_buy_volume"))
                .transpose()?,
            k.is_closed,
        );
        validate_kline(&tick)?;
        Ok(ParsedMessage::Kline(tick))
    }

    fn parse_trade(&self, data: &serde_json::Value) -> Result<ParsedMessage, ParseError> {
        let raw: RawTrade = serde_json::from_value(data.clone())?;
        let price = raw.price.to_f64("trade.price")?;
        let size = raw.quantity.to_f64("trade.quantity")?;

        if price <= 0.0 || size < 0.0 {
            return Err(ParseError::ValidationFailed(format!(
                "Non-positive trade: price={}, size={}",
                price, size
            )));
        }

        // Buyer is maker means the seller crossed the spread
        let side = if raw.is_buyer_maker { Side::Sell } else { Side::Buy };
        Ok(ParsedMessage::Trade(TradePrint::new(price, size, side, raw.trade_time)))
    }

    fn parse_depth_update(&self, data: &serde_json::Value) -> Result<ParsedMessage, ParseError> {
        let raw: RawDepthUpdate = serde_json::from_value(data.clone())?;
        Ok(ParsedMessage::DepthUpdate(DepthSnapshot {
            bids: parse_levels(&raw.bids)?,
            asks: parse_levels(&raw.asks)?,
            timestamp: raw.event_time,
        }))
    }

    pub fn reset_stats(&mut self) {
        self.stats = ParserStats::default();
    }
}

fn validate_kline(tick: &KlineTick) -> Result<(), ParseError> {
    if tick.high < tick.low {
        return Err(ParseError::ValidationFailed(format!(
            "Kline high {} below low {}",
            tick.high, tick.low
        )));
    }
    if tick.volume < 0.0 {
        return Err(ParseError::ValidationFailed(format!("Negative kline volume {}", tick.volume)));
    }
    Ok(())
}

// ============================================================================
// Backfill adapters (stateless)
// ============================================================================

/// Binance REST klines: [[openTime, "o", "h", "l", "c", "v", closeTime, "q", n, "V", "Q", "B"], ...]
///
/// Rows are returned in ascending time order with duplicates collapsed to the
/// latest row; every row except the last is marked closed.
pub fn parse_binance_klines(raw_json: &str) -> Result<Vec<KlineTick>, ParseError> {
    let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(raw_json)?;

    let mut klines = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.len() < 6 {
            return Err(ParseError::ValidationFailed(format!(
                "Kline row {} has {} fields, expected at least 6",
                i,
                row.len()
            )));
        }
        let taker_buy = match row.get(9) {
            Some(v) => Some(value_to_f64(v, "kline.taker_buy_volume")?),
            None => None,
        };
        let tick = KlineTick::new(
            value_to_i64(&row[0], "kline.open_time")?,
            value_to_f64(&row[1], "kline.open")?,
            value_to_f64(&row[2], "kline.high")?,
            value_to_f64(&row[3], "kline.low")?,
            value_to_f64(&row[4], "kline.close")?,
            value_to_f64(&row[5], "kline.volume")?,
            taker_buy,
            true,
        );
        validate_kline(&tick)?;
        klines.push(tick);
    }

    Ok(normalize_backfill(klines, None))
}

/// Kraken public OHLC response:
/// {"error":[],"result":{"XXBTZUSD":[[t_secs,"o","h","l","c","vwap","v",count],...],"last":..}}
///
/// Times are converted to milliseconds and only the newest `limit` rows are kept.
pub fn parse_kraken_ohlc(raw_json: &str, limit: usize) -> Result<Vec<KlineTick>, ParseError> {
    let value: serde_json::Value = serde_json::from_str(raw_json)?;

    if let Some(first) = value
        .get("error")
        .and_then(|e| e.as_array())
        .and_then(|errors| errors.first())
    {
        let message = first.as_str().unwrap_or("unknown error").to_string();
        warn!(error = %message, "Kraken API error");
        return Err(ParseError::ValidationFailed(format!("Kraken error: {}", message)));
    }

    // The result key is the exchange's pair name, which may differ from the request
    let rows = value
        .get("result")
        .and_then(|r| r.as_object())
        .and_then(|result| result.values().find_map(|v| v.as_array()))
        .ok_or_else(|| ParseError::InvalidJson("No OHLC list in Kraken result".into()))?;

    let mut klines = Vec::with_capacity(rows.len());
    for row in rows {
        let fields = row
            .as_array()
            .filter(|f| f.len() >= 7)
            .ok_or_else(|| ParseError::ValidationFailed(format!("Malformed OHLC row: {}", row)))?;
        let tick = KlineTick::new(
            value_to_i64(&fields[0], "ohlc.time")? * 1000,
            value_to_f64(&fields[1], "ohlc.open")?,
            value_to_f64(&fields[2], "ohlc.high")?,
            value_to_f64(&fields[3], "ohlc.low")?,
            value_to_f64(&fields[4], "ohlc.close")?,
            value_to_f64(&fields[6], "ohlc.volume")?,
            None,
            true,
        );
        validate_kline(&tick)?;
        klines.push(tick);
    }

    Ok(normalize_backfill(klines, Some(limit)))
}

/// Sort ascending, keep the last row per period, trim to `limit`, and leave
/// the newest row open
fn normalize_backfill(mut klines: Vec<KlineTick>, limit: Option<usize>) -> Vec<KlineTick> {
    klines.sort_by_key(|k| k.period_start_ms);

    let mut deduped: Vec<KlineTick> = Vec::with_capacity(klines.len());
    for tick in klines {
        match deduped.last_mut() {
            Some(last) if last.period_start_ms == tick.period_start_ms => *last = tick,
            _ => deduped.push(tick),
        }
    }

    if let Some(limit) = limit {
        if deduped.len() > limit {
            deduped.drain(..deduped.len() - limit);
        }
    }
    if let Some(last) = deduped.last_mut() {
        last.is_closed = false;
    }
    deduped
}

/// Kraken pair name for an exchange symbol (BTCUSDT -> XBTUSDT)
pub fn kraken_pair(symbol: &str) -> String {
    let symbol = symbol.to_uppercase();
    let base = if symbol.starts_with("BTC") {
        "XBT".to_string()
    } else {
        symbol.chars().take(3).collect()
    };
    let quote = if symbol.ends_with("USDT") { "USDT" } else { "USD" };
    format!("{}{}", base, quote)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kline_json(symbol: &str, interval: &str, t: i64, close: &str, closed: bool) -> String {
        format!(
            r#"{{"e":"kline","E":{t},"s":"{symbol}","k":{{"t":{t},"T":{end},"s":"{symbol}","i":"{interval}","o":"100.0","c":"{close}","h":"102.0","l":"99.0","v":"10.0","n":5,"x":{closed},"q":"1000.0","V":"6.0","Q":"600.0"}}}}"#,
            t = t,
            end = t + 59_999,
            symbol = symbol,
            interval = interval,
            close = close,
            closed = closed
        )
    }

    #[test]
    fn test_parse_kline() {
        let mut parser = MessageParser::new("btcusdt", Interval::OneMinute);
        let msg = parser.parse(&kline_json("BTCUSDT", "1m", 60_000, "101.5", false)).unwrap();

        match msg {
            ParsedMessage::Kline(k) => {
                assert_eq!(k.period_start_ms, 60_000);
                assert_eq!(k.close, 101.5);
                assert_eq!(k.taker_buy_volume, Some(6.0));
                assert!(!k.is_closed);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(parser.stats.kline_count, 1);
    }

    #[test]
    fn test_combined_stream_and_numeric_fields() {
        let mut parser = MessageParser::new("BTCUSDT", Interval::OneMinute);
        let raw = r#"{"stream":"btcusdt@kline_1m","data":{"e":"kline","s":"BTCUSDT","k":{"t":0,"i":"1m","o":1,"h":2,"l":0.5,"c":1.5,"v":3,"x":true}}}"#;
        match parser.parse(raw).unwrap() {
            ParsedMessage::Kline(k) => {
                assert_eq!(k.high, 2.0);
                assert_eq!(k.taker_buy_volume, None);
                assert!(k.is_closed);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_other_symbol_and_interval() {
        let mut parser = MessageParser::new("BTCUSDT", Interval::OneMinute);
        assert!(matches!(
            parser.parse(&kline_json("ETHUSDT", "1m", 0, "1", false)),
            Err(ParseError::ValidationFailed(_))
        ));
        assert!(matches!(
            parser.parse(&kline_json("BTCUSDT", "5m", 0, "1", false)),
            Err(ParseError::ValidationFailed(_))
        ));
        assert_eq!(parser.stats.validation_failures, 2);
    }

    #[test]
    fn test_parse_agg_trade_side() {
        let mut parser = MessageParser::new("BTCUSDT", Interval::OneMinute);
        let sell = r#"{"e":"aggTrade","E":1,"s":"BTCUSDT","a":1,"p":"100.5","q":"2.0","f":1,"l":1,"T":1000,"m":true}"#;
        let buy = r#"{"e":"trade","E":1,"s":"BTCUSDT","t":2,"p":"100.5","q":"1.0","T":1001,"m":false}"#;

        match parser.parse(sell).unwrap() {
            ParsedMessage::Trade(t) => {
                assert_eq!(t.side, Side::Sell);
                assert_eq!(t.size, 2.0);
                assert_eq!(t.timestamp, 1000);
            }
            other => panic!("unexpected {:?}", other),
        }
        match parser.parse(buy).unwrap() {
            ParsedMessage::Trade(t) => assert_eq!(t.side, Side::Buy),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_depth_variants() {
        let mut parser = MessageParser::new("BTCUSDT", Interval::OneMinute);
        let snapshot = r#"{"lastUpdateId":10,"bids":[["100.0","1.5"]],"asks":[["101.0","2.0"],["102.0","1.0"]]}"#;
        let update = r#"{"e":"depthUpdate","E":5,"s":"BTCUSDT","U":1,"u":2,"b":[["100.0","0"]],"a":[]}"#;

        match parser.parse(snapshot).unwrap() {
            ParsedMessage::DepthSnapshot(d) => {
                assert_eq!(d.bids.len(), 1);
                assert_eq!(d.asks[1].price, 102.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        match parser.parse(update).unwrap() {
            ParsedMessage::DepthUpdate(d) => {
                assert_eq!(d.bids[0].size, 0.0);
                assert_eq!(d.timestamp, 5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bad_input_counts_errors() {
        let mut parser = MessageParser::new("BTCUSDT", Interval::OneMinute);
        assert!(matches!(parser.parse("not json"), Err(ParseError::InvalidJson(_))));
        assert!(matches!(
            parser.parse(r#"{"e":"markPriceUpdate","s":"BTCUSDT"}"#),
            Err(ParseError::UnknownEventType(_))
        ));
        assert!(matches!(
            parser.parse(&kline_json("BTCUSDT", "1m", 0, "abc", false)),
            Err(ParseError::InvalidField { .. })
        ));
        assert_eq!(parser.stats.parse_errors, 3);
        assert!(parser.stats.error_rate() > 0.99);
    }

    #[test]
    fn test_binance_backfill() {
        let raw = r#"[
            [120000,"3","4","2","3.5","10",179999,"0",1,"7","0","0"],
            [60000,"1","2","0.5","1.5","10",119999,"0",1,"4","0","0"],
            [60000,"1","2.5","0.5","2","12",119999,"0",1,"5","0","0"]
        ]"#;
        let klines = parse_binance_klines(raw).unwrap();
        assert_eq!(klines.len(), 2);
        assert_eq!(klines[0].period_start_ms, 60_000);
        assert_eq!(klines[0].close, 2.0);
        assert_eq!(klines[0].taker_buy_volume, Some(5.0));
        assert!(klines[0].is_closed);
        assert!(!klines[1].is_closed);
    }

    #[test]
    fn test_kraken_backfill() {
        let raw = r#"{"error":[],"result":{"XXBTZUSD":[
            [180,"3","4","2","3.5","3.2","10",5],
            [60,"1","2","0.5","1.5","1.2","11",5],
            [120,"2","3","1","2.5","2.2","12",5]
        ],"last":180}}"#;
        let klines = parse_kraken_ohlc(raw, 2).unwrap();
        assert_eq!(klines.len(), 2);
        assert_eq!(klines[0].period_start_ms, 120_000);
        assert_eq!(klines[0].volume, 12.0);
        assert_eq!(klines[1].period_start_ms, 180_000);
        assert!(!klines[1].is_closed);
    }

    #[test]
    fn test_kraken_error_surfaced() {
        let raw = r#"{"error":["EQuery:Unknown asset pair"],"result":{}}"#;
        match parse_kraken_ohlc(raw, 10) {
            Err(ParseError::ValidationFailed(msg)) => assert!(msg.contains("Unknown asset pair")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_kraken_pair() {
        assert_eq!(kraken_pair("BTCUSDT"), "XBTUSDT");
        assert_eq!(kraken_pair("ethusd"), "ETHUSD");
        assert_eq!(kraken_pair("SOLEUR"), "SOLUSD");
    }
}
