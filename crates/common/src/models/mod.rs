pub mod candle;
pub mod performance;
pub mod signal;
pub mod ticker;
pub mod trade;

pub use candle::Candle;
pub use performance::PerformanceSnapshot;
pub use signal::{
    BollingerValues, IndicatorSnapshot, MacdValues, Signal, SignalKind, StochasticValues,
    TrendAnalysis, TrendDirection, VolumeProfile,
};
pub use ticker::TickerStats;
pub use trade::{ExitReason, Trade, TradeSide, TradeStatus, UnknownVariant};
