use chrono::{DateTime, Utc};
use common::models::PerformanceSnapshot;
use sqlx::SqlitePool;

pub struct PerformanceRepository;

impl PerformanceRepository {
    pub async fn record(
        pool: &SqlitePool,
        snapshot: &PerformanceSnapshot,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
                INSERT OR REPLACE INTO performance (timestamp, balance, equity, open_trades, total_trades)
                VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.timestamp)
        .bind(snapshot.balance)
        .bind(snapshot.equity)
        .bind(snapshot.open_trades)
        .bind(snapshot.total_trades)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// The most recently written snapshot.
    pub async fn latest(pool: &SqlitePool) -> Result<Option<PerformanceSnapshot>, sqlx::Error> {
        let row = sqlx::query_as::<_, (DateTime<Utc>, f64, f64, i64, i64)>(
            r#"
                SELECT timestamp, balance, equity, open_trades, total_trades
                FROM performance ORDER BY rowid DESC LIMIT 1
            "#,
        )
        .fetch_optional(pool)
        .await?;

        Ok(row.map(
            |(timestamp, balance, equity, open_trades, total_trades)| PerformanceSnapshot {
                timestamp,
                balance,
                equity,
                open_trades,
                total_trades,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use chrono::Duration;

    #[tokio::test]
    async fn test_latest_returns_last_written_snapshot() {
        let pool = connect_in_memory().await.unwrap();
        assert!(PerformanceRepository::latest(&pool).await.unwrap().is_none());

        let now = Utc::now();
        for (i, balance) in [10_000.0, 9_950.0, 10_120.0].into_iter().enumerate() {
            let snapshot = PerformanceSnapshot {
                timestamp: now + Duration::seconds(i as i64),
                balance,
                equity: balance,
                open_trades: 0,
                total_trades: i as i64,
            };
            PerformanceRepository::record(&pool, &snapshot).await.unwrap();
        }

        let latest = PerformanceRepository::latest(&pool).await.unwrap().unwrap();
        assert_eq!(latest.balance, 10_120.0);
        assert_eq!(latest.total_trades, 2);
    }
}
