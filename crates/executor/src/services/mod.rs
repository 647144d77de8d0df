pub mod notification_service;
pub mod paper_trader;
pub mod performance_review;
pub mod report;
pub mod trading_bot;
