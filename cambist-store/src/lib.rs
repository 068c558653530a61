//! # Cambist-Store
//! Durable SQLite persistence for the trading engine's order state: the `orders`,
//! `order_profit`, `order_matching` and `last_tick` tables.
//!
//! The schema is owned by this crate and initialised with `CREATE TABLE IF NOT
//! EXISTS` on open. Every statement binds its parameters; every operation is one
//! independent autocommit statement. Removing an order row never cascades into the
//! profit or matching tables — callers that want a purge invoke the dedicated
//! `remove_*` operations themselves.
//!
//! One engine worker owns the writer [`Store`] for its configuration; readers (the
//! UI via the stats worker) open their own connections.

use cambist_data::{Candle, MarketOrder, Side};
use cambist_instrument::{Currency, ExchangeId, Market};
use cambist_ta::StrategyKind;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// All errors generated in the cambist-store crate.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("timestamp parse '{value}': {source}")]
    TimestampParse {
        value: String,
        source: chrono::ParseError,
    },
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS orders(
    db_id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL,
    base_currency INTEGER NOT NULL,
    traded_currency INTEGER NOT NULL,
    side INTEGER NOT NULL,
    exchange INTEGER NOT NULL,
    quantity REAL NOT NULL,
    price REAL NOT NULL,
    opened_at TEXT,
    canceled INTEGER NOT NULL);

CREATE TABLE IF NOT EXISTS order_profit(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id INTEGER NOT NULL,
    currency INTEGER,
    exchange INTEGER NOT NULL,
    FOREIGN KEY(order_id) REFERENCES orders(db_id));

CREATE TABLE IF NOT EXISTS order_matching(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_order_id INTEGER NOT NULL,
    to_order_id INTEGER NOT NULL,
    from_side INTEGER NOT NULL,
    to_side INTEGER NOT NULL,
    exchange INTEGER NOT NULL,
    pair TEXT NOT NULL,
    FOREIGN KEY(from_order_id) REFERENCES orders(db_id),
    FOREIGN KEY(to_order_id) REFERENCES orders(db_id));

CREATE TABLE IF NOT EXISTS last_tick(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange INTEGER NOT NULL,
    base_currency INTEGER NOT NULL,
    traded_currency INTEGER NOT NULL,
    strategy_type INTEGER NOT NULL,
    opened_at TEXT NOT NULL,
    open REAL NOT NULL,
    close REAL NOT NULL,
    low REAL NOT NULL,
    high REAL NOT NULL,
    volume REAL NOT NULL);

CREATE UNIQUE INDEX IF NOT EXISTS last_tick_key
    ON last_tick(exchange, base_currency, traded_currency, strategy_type);
";

/// SQLite-backed store for the engine's durable order state.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if absent) the store at `path` & initialise missing tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    /// Open a private in-memory store (tests, dry runs).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ---- orders ----------------------------------------------------------

    /// Insert a market order & return the assigned `db_id`.
    pub fn insert_market_order(&self, order: &MarketOrder) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO orders(uuid, base_currency, traded_currency, side, exchange, \
             quantity, price, opened_at, canceled) VALUES(?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                order.uuid,
                order.base.index(),
                order.traded.index(),
                order.side.index(),
                order.exchange.index(),
                order.quantity,
                order.price,
                order.opened_at.to_rfc3339(),
                order.canceled as i64,
            ],
        )?;
        let db_id = self.conn.last_insert_rowid();
        debug!(db_id, uuid = %order.uuid, "market order inserted");
        Ok(db_id)
    }

    /// Flag an order row canceled (or clear the flag).
    pub fn set_order_canceled(&self, db_id: i64, canceled: bool) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE orders SET canceled = ?1 WHERE db_id = ?2",
            params![canceled as i64, db_id],
        )?;
        Ok(())
    }

    /// Remove one order row. Does NOT cascade into profit/matching tables.
    pub fn remove_market_order(&self, db_id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM orders WHERE db_id = ?1", params![db_id])?;
        Ok(())
    }

    /// Remove every order row belonging to `exchange`.
    pub fn remove_market_orders(&self, exchange: ExchangeId) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM orders WHERE exchange = ?1",
            params![exchange.index()],
        )?;
        Ok(())
    }

    /// All order rows belonging to `exchange`.
    pub fn browse_orders(&self, exchange: ExchangeId) -> Result<Vec<MarketOrder>, StoreError> {
        let mut statement = self.conn.prepare(
            "SELECT db_id, uuid, base_currency, traded_currency, side, exchange, \
             quantity, price, opened_at, canceled FROM orders WHERE exchange = ?1",
        )?;
        let rows = statement.query_map(params![exchange.index()], row_to_order)?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(parse_order_row(row?)?);
        }
        Ok(orders)
    }

    /// One order row by `db_id`.
    pub fn get_order(&self, db_id: i64) -> Result<Option<MarketOrder>, StoreError> {
        let mut statement = self.conn.prepare(
            "SELECT db_id, uuid, base_currency, traded_currency, side, exchange, \
             quantity, price, opened_at, canceled FROM orders WHERE db_id = ?1",
        )?;
        let mut rows = statement.query_map(params![db_id], row_to_order)?;
        match rows.next() {
            Some(row) => Ok(Some(parse_order_row(row?)?)),
            None => Ok(None),
        }
    }

    // ---- order profit ----------------------------------------------------

    /// Record that a filled BUY belongs to the open profit group of `currency`.
    pub fn insert_order_profit(
        &self,
        order_id: i64,
        currency: Currency,
        exchange: ExchangeId,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO order_profit(order_id, currency, exchange) VALUES(?1,?2,?3)",
            params![order_id, currency.index(), exchange.index()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Remove a BUY from whichever profit group holds it.
    pub fn remove_order_profit(&self, order_id: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM order_profit WHERE order_id = ?1",
            params![order_id],
        )?;
        Ok(())
    }

    /// Purge the whole profit group of `currency` on `exchange`.
    pub fn remove_currency_profit(
        &self,
        currency: Currency,
        exchange: ExchangeId,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM order_profit WHERE currency = ?1 AND exchange = ?2",
            params![currency.index(), exchange.index()],
        )?;
        Ok(())
    }

    /// Reconstruct every profit group on `exchange` by joining back to `orders`.
    pub fn browse_orders_profit(
        &self,
        exchange: ExchangeId,
    ) -> Result<HashMap<Currency, Vec<MarketOrder>>, StoreError> {
        let mut statement = self.conn.prepare(
            "SELECT p.currency, o.db_id, o.uuid, o.base_currency, o.traded_currency, \
             o.side, o.exchange, o.quantity, o.price, o.opened_at, o.canceled \
             FROM order_profit p JOIN orders o ON o.db_id = p.order_id \
             WHERE p.exchange = ?1",
        )?;
        let rows = statement.query_map(params![exchange.index()], |row| {
            let currency: i64 = row.get(0)?;
            let order = OrderRow {
                db_id: row.get(1)?,
                uuid: row.get(2)?,
                base: row.get(3)?,
                traded: row.get(4)?,
                side: row.get(5)?,
                exchange: row.get(6)?,
                quantity: row.get(7)?,
                price: row.get(8)?,
                opened_at: row.get(9)?,
                canceled: row.get(10)?,
            };
            Ok((currency, order))
        })?;

        let mut groups: HashMap<Currency, Vec<MarketOrder>> = HashMap::new();
        for row in rows {
            let (currency, order) = row?;
            groups
                .entry(Currency::from_index(currency))
                .or_default()
                .push(parse_order_row(order)?);
        }
        Ok(groups)
    }

    // ---- order matching --------------------------------------------------

    /// Record a `(from, to)` matching, in this engine always `(SELL, BUY)`.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_order_matching(
        &self,
        from_order_id: i64,
        to_order_id: i64,
        from_side: Side,
        to_side: Side,
        exchange: ExchangeId,
        pair: &str,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO order_matching(from_order_id, to_order_id, from_side, to_side, \
             exchange, pair) VALUES(?1,?2,?3,?4,?5,?6)",
            params![
                from_order_id,
                to_order_id,
                from_side.index(),
                to_side.index(),
                exchange.index(),
                pair,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Remove one matching pair.
    pub fn remove_order_matching(
        &self,
        from_order_id: i64,
        to_order_id: i64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM order_matching WHERE from_order_id = ?1 AND to_order_id = ?2",
            params![from_order_id, to_order_id],
        )?;
        Ok(())
    }

    /// Purge every matching recorded for `pair` on `exchange`.
    pub fn remove_currency_orders_matching(
        &self,
        exchange: ExchangeId,
        pair: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM order_matching WHERE exchange = ?1 AND pair = ?2",
            params![exchange.index(), pair],
        )?;
        Ok(())
    }

    /// Every `(from, to)` matching on `exchange`, joined back to `orders` twice.
    pub fn browse_orders_matching(
        &self,
        exchange: ExchangeId,
    ) -> Result<Vec<(MarketOrder, MarketOrder)>, StoreError> {
        let mut statement = self.conn.prepare(
            "SELECT f.db_id, f.uuid, f.base_currency, f.traded_currency, f.side, f.exchange, \
             f.quantity, f.price, f.opened_at, f.canceled, \
             t.db_id, t.uuid, t.base_currency, t.traded_currency, t.side, t.exchange, \
             t.quantity, t.price, t.opened_at, t.canceled \
             FROM order_matching m \
             JOIN orders f ON f.db_id = m.from_order_id \
             JOIN orders t ON t.db_id = m.to_order_id \
             WHERE m.exchange = ?1",
        )?;
        let rows = statement.query_map(params![exchange.index()], |row| {
            let from = OrderRow {
                db_id: row.get(0)?,
                uuid: row.get(1)?,
                base: row.get(2)?,
                traded: row.get(3)?,
                side: row.get(4)?,
                exchange: row.get(5)?,
                quantity: row.get(6)?,
                price: row.get(7)?,
                opened_at: row.get(8)?,
                canceled: row.get(9)?,
            };
            let to = OrderRow {
                db_id: row.get(10)?,
                uuid: row.get(11)?,
                base: row.get(12)?,
                traded: row.get(13)?,
                side: row.get(14)?,
                exchange: row.get(15)?,
                quantity: row.get(16)?,
                price: row.get(17)?,
                opened_at: row.get(18)?,
                canceled: row.get(19)?,
            };
            Ok((from, to))
        })?;

        let mut matchings = Vec::new();
        for row in rows {
            let (from, to) = row?;
            matchings.push((parse_order_row(from)?, parse_order_row(to)?));
        }
        Ok(matchings)
    }

    // ---- last tick -------------------------------------------------------

    /// Record the newest signal-producing candle for a market/strategy key,
    /// overwriting the previous one.
    pub fn upsert_last_tick(
        &self,
        exchange: ExchangeId,
        market: Market,
        strategy: StrategyKind,
        candle: &Candle,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO last_tick(exchange, base_currency, traded_currency, strategy_type, \
             opened_at, open, close, low, high, volume) \
             VALUES(?1,?2,?3,?4,?5,?6,?7,?8,?9,?10) \
             ON CONFLICT(exchange, base_currency, traded_currency, strategy_type) \
             DO UPDATE SET opened_at = ?5, open = ?6, close = ?7, low = ?8, high = ?9, \
             volume = ?10",
            params![
                exchange.index(),
                market.base.index(),
                market.traded.index(),
                strategy.index(),
                candle.time.to_rfc3339(),
                candle.open,
                candle.close,
                candle.low,
                candle.high,
                candle.volume,
            ],
        )?;
        Ok(())
    }

    /// The cached signal candles for `market` on `exchange`, keyed by strategy.
    pub fn browse_last_ticks(
        &self,
        exchange: ExchangeId,
        market: Market,
    ) -> Result<HashMap<StrategyKind, Candle>, StoreError> {
        let mut statement = self.conn.prepare(
            "SELECT strategy_type, opened_at, open, close, low, high, volume \
             FROM last_tick WHERE exchange = ?1 AND base_currency = ?2 AND \
             traded_currency = ?3",
        )?;
        let rows = statement.query_map(
            params![
                exchange.index(),
                market.base.index(),
                market.traded.index()
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                ))
            },
        )?;

        let mut ticks = HashMap::new();
        for row in rows {
            let (strategy, opened_at, open, close, low, high, volume) = row?;
            ticks.insert(
                StrategyKind::from_index(strategy),
                Candle {
                    time: parse_timestamp(&opened_at)?,
                    open,
                    close,
                    low,
                    high,
                    volume,
                },
            );
        }
        Ok(ticks)
    }
}

/// Raw order row as read from SQLite, before enum/timestamp decoding.
struct OrderRow {
    db_id: i64,
    uuid: String,
    base: i64,
    traded: i64,
    side: i64,
    exchange: i64,
    quantity: f64,
    price: f64,
    opened_at: Option<String>,
    canceled: i64,
}

fn row_to_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        db_id: row.get(0)?,
        uuid: row.get(1)?,
        base: row.get(2)?,
        traded: row.get(3)?,
        side: row.get(4)?,
        exchange: row.get(5)?,
        quantity: row.get(6)?,
        price: row.get(7)?,
        opened_at: row.get(8)?,
        canceled: row.get(9)?,
    })
}

fn parse_order_row(row: OrderRow) -> Result<MarketOrder, StoreError> {
    let opened_at = match row.opened_at {
        Some(value) => parse_timestamp(&value)?,
        None => DateTime::<Utc>::UNIX_EPOCH,
    };
    Ok(MarketOrder {
        db_id: row.db_id,
        uuid: row.uuid,
        base: Currency::from_index(row.base),
        traded: Currency::from_index(row.traded),
        side: Side::from_index(row.side),
        exchange: ExchangeId::from_index(row.exchange),
        quantity: row.quantity,
        price: row.price,
        opened_at,
        canceled: row.canceled != 0,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|source| StoreError::TimestampParse {
            value: value.to_owned(),
            source,
        })
}
