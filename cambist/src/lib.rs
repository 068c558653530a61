//! # Cambist
//! Cambist is an automated cryptocurrency trading engine. Each active trade
//! configuration runs its own control-loop worker that, every tick:
//!
//! 1. reconciles local open orders against the exchange's authoritative view,
//! 2. cancels timed-out open orders,
//! 3. evaluates the configured indicator strategy over fresh candles,
//! 4. opens BUY orders subject to the admission rules,
//! 5. opens matching SELL orders for filled BUYs at the configured profit,
//! 6. refreshes the last-tick signal cache,
//! 7. sleeps until the next trading-timeout boundary.
//!
//! Balances, open orders, matchings and buy/sell profit groups persist in the
//! `cambist-store` SQLite tables so trading state survives restarts. Exchange
//! access goes through the `cambist-exchange` capability; signals come from
//! `cambist-ta`. A separate read-only stats worker publishes state snapshots to
//! the host over a channel.

/// Per-configuration trade settings & validation.
pub mod config;

/// Defines the [`Event`](event::Event) enum & transmitter used to publish engine
/// activity to the embedding host.
pub mod event;

/// In-memory authoritative mirrors of open orders, profit groups, matchings and
/// the last signal-producing candle per market/strategy.
pub mod holder;

/// The [`Engine`](engine::Engine): one trading worker per active configuration
/// plus the stats worker.
pub mod engine;

pub mod error;

pub use config::{AppSettings, TradeConfiguration};
pub use engine::{Command, Engine, EngineLego};
pub use error::EngineError;
