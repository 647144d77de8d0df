pub mod binance_client;
pub mod kline_response;
pub mod ticker_response;

pub use binance_client::BinanceRestClient;
