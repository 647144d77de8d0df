pub mod backtester;
pub mod risk_manager;
pub mod signal_generator;
