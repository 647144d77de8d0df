pub mod performance_repo;
pub mod price_repo;
pub mod trades_repo;

pub use performance_repo::PerformanceRepository;
pub use price_repo::PriceHistoryRepository;
pub use trades_repo::TradesRepository;
