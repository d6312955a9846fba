// Layer 2 - Ingestion
// Raw feed payloads become typed ticks; depth snapshots become book metrics

pub mod orderbook;
pub mod parser;

pub use orderbook::{DepthBook, DepthMetrics};
pub use parser::{
    kraken_pair, parse_binance_klines, parse_kraken_ohlc, MessageParser, ParseError,
    ParsedMessage, ParserStats,
};
