use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

pub struct PriceHistoryRepository;

impl PriceHistoryRepository {
    pub async fn insert(
        pool: &SqlitePool,
        symbol: &str,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO price_history (symbol, price, timestamp) VALUES (?, ?, ?)")
            .bind(symbol)
            .bind(price)
            .bind(at)
            .execute(pool)
            .await?;
        Ok(())
    }
}
