use chrono::{DateTime, Utc};
use common::models::{Trade, TradeSide, TradeStatus};
use sqlx::SqlitePool;
use tracing::debug;

const TRADE_COLUMNS: &str = "id, symbol, side, entry_price, exit_price, quantity, profit_loss, \
     profit_loss_pct, entry_time, exit_time, status, strategy, stop_loss, take_profit";

#[derive(Debug, sqlx::FromRow)]
struct TradeRow {
    id: i64,
    symbol: String,
    side: String,
    entry_price: f64,
    exit_price: Option<f64>,
    quantity: f64,
    profit_loss: f64,
    profit_loss_pct: f64,
    entry_time: DateTime<Utc>,
    exit_time: Option<DateTime<Utc>>,
    status: String,
    strategy: String,
    stop_loss: f64,
    take_profit: f64,
}

impl TryFrom<TradeRow> for Trade {
    type Error = sqlx::Error;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        let side = row
            .side
            .parse::<TradeSide>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let status = row
            .status
            .parse::<TradeStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Trade {
            id: row.id,
            symbol: row.symbol,
            side,
            entry_price: row.entry_price,
            exit_price: row.exit_price,
            quantity: row.quantity,
            profit_loss: row.profit_loss,
            profit_loss_pct: row.profit_loss_pct,
            entry_time: row.entry_time,
            exit_time: row.exit_time,
            status,
            strategy: row.strategy,
            stop_loss: row.stop_loss,
            take_profit: row.take_profit,
        })
    }
}

fn into_trades(rows: Vec<TradeRow>) -> Result<Vec<Trade>, sqlx::Error> {
    rows.into_iter().map(Trade::try_from).collect()
}

pub struct TradesRepository;

impl TradesRepository {
    /// Inserts a new trade and returns the id the ledger assigned to it.
    pub async fn insert(pool: &SqlitePool, trade: &Trade) -> Result<i64, sqlx::Error> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
                INSERT INTO trades (
                    symbol, side, entry_price, exit_price, quantity, profit_loss,
                    profit_loss_pct, entry_time, exit_time, status, strategy, stop_loss, take_profit
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
        )
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.entry_price)
        .bind(trade.exit_price)
        .bind(trade.quantity)
        .bind(trade.profit_loss)
        .bind(trade.profit_loss_pct)
        .bind(trade.entry_time)
        .bind(trade.exit_time)
        .bind(trade.status.as_str())
        .bind(&trade.strategy)
        .bind(trade.stop_loss)
        .bind(trade.take_profit)
        .fetch_one(pool)
        .await?;

        debug!("Inserted trade #{} for {}", id, trade.symbol);
        Ok(id)
    }

    /// Writes the exit fields of a closed trade. Returns false if the row was
    /// missing or already closed.
    pub async fn close(pool: &SqlitePool, trade: &Trade) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
                UPDATE trades
                SET exit_price = ?, exit_time = ?, status = ?, profit_loss = ?, profit_loss_pct = ?
                WHERE id = ? AND status = 'OPEN'
            "#,
        )
        .bind(trade.exit_price)
        .bind(trade.exit_time)
        .bind(trade.status.as_str())
        .bind(trade.profit_loss)
        .bind(trade.profit_loss_pct)
        .bind(trade.id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn has_open_trade(pool: &SqlitePool, symbol: &str) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM trades WHERE symbol = ? AND status = 'OPEN'",
        )
        .bind(symbol)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn open_trades(pool: &SqlitePool) -> Result<Vec<Trade>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE status = 'OPEN' ORDER BY id"
        ))
        .fetch_all(pool)
        .await?;
        into_trades(rows)
    }

    /// Closed trades in the order they were closed.
    pub async fn closed_trades(pool: &SqlitePool) -> Result<Vec<Trade>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE status = 'CLOSED' ORDER BY exit_time, id"
        ))
        .fetch_all(pool)
        .await?;
        into_trades(rows)
    }

    pub async fn closed_since(
        pool: &SqlitePool,
        since: DateTime<Utc>,
    ) -> Result<Vec<Trade>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades \
             WHERE status = 'CLOSED' AND exit_time >= ? ORDER BY exit_time, id"
        ))
        .bind(since)
        .fetch_all(pool)
        .await?;
        into_trades(rows)
    }

    /// Trades entered at or after `since`, open or closed.
    pub async fn count_entered_since(
        pool: &SqlitePool,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM trades WHERE entry_time >= ?")
            .bind(since)
            .fetch_one(pool)
            .await
    }

    /// The most recently closed trades, newest first.
    pub async fn recent_closed(pool: &SqlitePool, limit: i64) -> Result<Vec<Trade>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades \
             WHERE status = 'CLOSED' ORDER BY exit_time DESC, id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await?;
        into_trades(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use chrono::Duration;

    fn new_trade(symbol: &str) -> Trade {
        Trade {
            id: 0,
            symbol: symbol.to_string(),
            side: TradeSide::Buy,
            entry_price: 100.0,
            exit_price: None,
            quantity: 2.0,
            profit_loss: 0.0,
            profit_loss_pct: 0.0,
            entry_time: Utc::now(),
            exit_time: None,
            status: TradeStatus::Open,
            strategy: "micro_scalp".to_string(),
            stop_loss: 95.0,
            take_profit: 110.0,
        }
    }

    #[tokio::test]
    async fn test_insert_then_read_back_open_trade() {
        let pool = connect_in_memory().await.unwrap();
        let id = TradesRepository::insert(&pool, &new_trade("SOLUSDT")).await.unwrap();

        let open = TradesRepository::open_trades(&pool).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, id);
        assert_eq!(open[0].side, TradeSide::Buy);
        assert_eq!(open[0].stop_loss, 95.0);
        assert!(TradesRepository::has_open_trade(&pool, "SOLUSDT").await.unwrap());
        assert!(!TradesRepository::has_open_trade(&pool, "BTCUSDT").await.unwrap());
    }

    #[tokio::test]
    async fn test_close_moves_trade_out_of_open_set_once() {
        let pool = connect_in_memory().await.unwrap();
        let mut trade = new_trade("ETHUSDT");
        trade.id = TradesRepository::insert(&pool, &trade).await.unwrap();

        trade.close(105.0, 0.001, Utc::now());
        assert!(TradesRepository::close(&pool, &trade).await.unwrap());
        assert!(!TradesRepository::close(&pool, &trade).await.unwrap());

        assert!(TradesRepository::open_trades(&pool).await.unwrap().is_empty());
        let closed = TradesRepository::closed_trades(&pool).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, TradeStatus::Closed);
        assert_eq!(closed[0].exit_price, Some(105.0));
        assert!((closed[0].profit_loss - trade.profit_loss).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_closed_since_filters_by_exit_time() {
        let pool = connect_in_memory().await.unwrap();
        let now = Utc::now();

        for (symbol, hours_ago) in [("BTCUSDT", 10), ("ETHUSDT", 2), ("SOLUSDT", 1)] {
            let mut trade = new_trade(symbol);
            trade.id = TradesRepository::insert(&pool, &trade).await.unwrap();
            trade.close(99.0, 0.0, now - Duration::hours(hours_ago));
            TradesRepository::close(&pool, &trade).await.unwrap();
        }

        let recent = TradesRepository::closed_since(&pool, now - Duration::hours(6))
            .await
            .unwrap();
        let symbols: Vec<&str> = recent.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ETHUSDT", "SOLUSDT"]);

        let latest = TradesRepository::recent_closed(&pool, 1).await.unwrap();
        assert_eq!(latest[0].symbol, "SOLUSDT");
    }

    #[tokio::test]
    async fn test_count_entered_since_includes_open_and_closed() {
        let pool = connect_in_memory().await.unwrap();
        let now = Utc::now();

        let mut yesterday = new_trade("BTCUSDT");
        yesterday.entry_time = now - Duration::hours(30);
        TradesRepository::insert(&pool, &yesterday).await.unwrap();

        let mut closed = new_trade("ETHUSDT");
        closed.entry_time = now - Duration::minutes(20);
        closed.id = TradesRepository::insert(&pool, &closed).await.unwrap();
        closed.close(98.0, 0.001, now - Duration::minutes(5));
        TradesRepository::close(&pool, &closed).await.unwrap();

        TradesRepository::insert(&pool, &new_trade("SOLUSDT")).await.unwrap();

        let since = now - Duration::hours(1);
        assert_eq!(TradesRepository::count_entered_since(&pool, since).await.unwrap(), 2);
        assert_eq!(
            TradesRepository::count_entered_since(&pool, now + Duration::minutes(1))
                .await
                .unwrap(),
            0
        );
    }
}
