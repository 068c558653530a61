//! End-to-end trading scenarios driving a [`TradingWorker`] against a scripted
//! mock exchange: signal evaluation, buy admission, fill detection, profit sells,
//! timeout cancellation & duplicate-signal suppression.

use cambist::config::{
    AppSettings, BuySettings, CoinSettings, SellSettings, StockExchangeSettings,
    TradeConfiguration,
};
use cambist::engine::{TradingWorker, WorkerLego};
use cambist::event::{Event, EventTx};
use cambist_data::{Candle, CurrencyTick, LotSizeHolder, MarketOrder, Side};
use cambist_exchange::Exchange;
use cambist_instrument::{CandleInterval, Currency, ExchangeId, Market};
use cambist_integration::{Credentials, ExchangeError};
use cambist_store::Store;
use cambist_ta::{IndicatorConfig, StrategyKind};
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Candle closes that never produce an SMA crossing: every candle is flat, so no
/// moving-average point can sit strictly inside a candle body.
const CLOSES_WITHOUT_BUY_SIGNAL: [f64; 14] = [
    22.27, 22.19, 22.08, 22.17, 22.18, 22.13, 22.23, 22.43, 22.24, 22.29, 22.15, 22.39, 22.38,
    22.61,
];

/// OHLCV rows ending with a close jump 3915 -> 3935.770 that pulls the 5-period
/// SMA inside the final candle's body with a rising line: a BUY crossing.
const CANDLES_BUY_SIGNAL: [(f64, f64, f64, f64, f64); 21] = [
    (3899.354, 3910.847, 3899.354, 3910.847, 31771.19121),
    (3910.511, 3913.390, 3910.511, 3915.000, 23792.07473),
    (3911.685, 3917.909, 3907.374, 3919.826, 56319.24906),
    (3917.909, 3911.798, 3911.798, 3918.656, 27686.28295),
    (3912.101, 3915.099, 3912.000, 3915.662, 24852.16023),
    (3915.037, 3916.218, 3912.888, 3916.913, 50898.86019),
    (3916.218, 3914.879, 3912.275, 3921.000, 131419.3891),
    (3913.004, 3915.272, 3911.284, 3915.447, 18808.81698),
    (3915.349, 3918.083, 3913.817, 3920.607, 32993.89884),
    (3921.459, 3920.733, 3914.940, 3922.860, 51772.78955),
    (3918.687, 3915.446, 3912.761, 3918.910, 138872.9634),
    (3918.089, 3917.974, 3911.810, 3918.413, 85961.77295),
    (3917.516, 3915.519, 3914.290, 3917.974, 15910.84497),
    (3914.291, 3911.444, 3911.074, 3915.130, 28474.95081),
    (3909.808, 3911.888, 3909.492, 3915.912, 10442.95158),
    (3911.888, 3912.499, 3900.120, 3913.235, 105326.5773),
    (3912.500, 3914.576, 3910.966, 3914.921, 64686.21302),
    (3914.921, 3914.920, 3911.419, 3914.921, 31435.45970),
    (3914.921, 3917.974, 3914.411, 3917.974, 100569.5918),
    (3917.974, 3915.000, 3914.850, 3917.974, 15242.44981),
    (3915.000, 3935.770, 3915.000, 3935.770, 68510.95386),
];

const BASE_TIME: i64 = 1_546_300_800;

fn flat_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(index, close)| {
            Candle::new(BASE_TIME + index as i64 * 3_600, *close, *close, *close, *close, *close)
        })
        .collect()
}

fn ohlcv_candles(rows: &[(f64, f64, f64, f64, f64)]) -> Vec<Candle> {
    rows.iter()
        .enumerate()
        .map(|(index, (open, close, low, high, volume))| {
            Candle::new(
                BASE_TIME + index as i64 * 3_600,
                *open,
                *close,
                *low,
                *high,
                *volume,
            )
        })
        .collect()
}

// ---- scripted exchange ----------------------------------------------------

#[derive(Default)]
struct MockState {
    ticker: CurrencyTick,
    candles: Vec<Candle>,
    /// What the venue reports as the account's open orders.
    remote_open: Vec<MarketOrder>,
    /// Scripted `get_account_order` answers for orders gone from the open set.
    settled: HashMap<String, MarketOrder>,
    /// Every order placement the engine performed.
    placed: Vec<MarketOrder>,
    /// Every cancel request the engine performed.
    cancel_requests: Vec<String>,
    cancel_answer: bool,
    /// Minutes subtracted from now for placed orders, to script timeouts.
    placed_age_minutes: i64,
    next_id: u64,
}

#[derive(Clone)]
struct MockExchange {
    state: Arc<Mutex<MockState>>,
}

impl MockExchange {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                cancel_answer: true,
                ..MockState::default()
            })),
        }
    }

    fn place(&self, market: Market, side: Side, quantity: f64, rate: f64) -> MarketOrder {
        let mut state = self.state.lock();
        state.next_id += 1;
        let order = MarketOrder {
            db_id: 0,
            uuid: format!("mock-{}", state.next_id),
            base: market.base,
            traded: market.traded,
            side,
            exchange: ExchangeId::Bittrex,
            quantity,
            price: rate,
            opened_at: Utc::now() - ChronoDuration::minutes(state.placed_age_minutes),
            canceled: false,
        };
        state.placed.push(order.clone());
        state.remote_open.push(order.clone());
        order
    }
}

impl Exchange for MockExchange {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bittrex
    }

    fn set_credentials(&mut self, _credentials: Credentials) {}

    fn get_ticker(&self, _market: Market) -> Result<CurrencyTick, ExchangeError> {
        Ok(self.state.lock().ticker)
    }

    fn get_candles(
        &self,
        _market: Market,
        _interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError> {
        Ok(self.state.lock().candles.clone())
    }

    fn get_balance(&self, _currency: Currency) -> Result<f64, ExchangeError> {
        Ok(0.0)
    }

    fn get_account_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        Ok(self
            .state
            .lock()
            .remote_open
            .iter()
            .filter(|order| order.market() == market)
            .cloned()
            .collect())
    }

    fn get_market_open_orders(&self, _market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        Ok(Vec::new())
    }

    fn get_account_order(
        &self,
        _market: Market,
        uuid: &str,
    ) -> Result<MarketOrder, ExchangeError> {
        let state = self.state.lock();
        if let Some(order) = state.settled.get(uuid) {
            return Ok(order.clone());
        }
        state
            .remote_open
            .iter()
            .find(|order| order.uuid == uuid)
            .cloned()
            .ok_or(ExchangeError::NoData)
    }

    fn place_buy(
        &self,
        market: Market,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError> {
        Ok(self.place(market, Side::Buy, quantity, rate))
    }

    fn place_sell(
        &self,
        market: Market,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError> {
        Ok(self.place(market, Side::Sell, quantity, rate))
    }

    fn cancel(&self, _market: Market, uuid: &str) -> Result<bool, ExchangeError> {
        let mut state = self.state.lock();
        state.cancel_requests.push(uuid.to_owned());
        if state.cancel_answer {
            state.remote_open.retain(|order| order.uuid != uuid);
        }
        Ok(state.cancel_answer)
    }

    fn get_lot_sizes(&self) -> Result<LotSizeHolder, ExchangeError> {
        Ok(LotSizeHolder::empty())
    }
}

// ---- fixture --------------------------------------------------------------

fn configuration() -> TradeConfiguration {
    TradeConfiguration {
        name: "usd-btc-sma".to_owned(),
        active: true,
        strategy_name: "sma-5".to_owned(),
        indicators: vec![IndicatorConfig::Sma {
            period: 5,
            crossing_interval: 0,
        }],
        candle_interval: CandleInterval::OneHour,
        buy_settings: BuySettings {
            max_open_orders: 5,
            max_open_time: 5,
            max_coin_amount: 100_000.0,
            percentage_buy_amount: 10.0,
            min_order_price: 1.0,
            open_positions_per_coin: 3,
            open_order_when_any_indicator_is_triggered: false,
        },
        sell_settings: SellSettings {
            open_order_time: 10,
            profit_percentage: 10.0,
        },
        coin_settings: CoinSettings {
            base_currency: Currency::Usd,
            traded_currencies: vec![Currency::Btc],
        },
        stock_exchange_settings: StockExchangeSettings {
            exchange: ExchangeId::Bittrex,
            api_key: "key".to_owned(),
            secret_key: "secret".to_owned(),
        },
    }
}

struct Fixture {
    worker: TradingWorker<EventTx>,
    exchange: MockExchange,
    store: Store,
    _command_tx: mpsc::Sender<cambist::engine::Command>,
    _event_rx: mpsc::UnboundedReceiver<Event>,
}

fn fixture(configuration: TradeConfiguration) -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let exchange = MockExchange::new();
    let (command_tx, command_rx) = mpsc::channel(4);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let dir = std::env::temp_dir().join(format!("cambist-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let store_path = dir.join("cambist.db");

    let worker = TradingWorker::new(WorkerLego {
        engine_id: Uuid::new_v4(),
        configuration,
        app_settings: AppSettings { trading_timeout: 1 },
        exchange: Box::new(exchange.clone()),
        store: Store::open(&store_path).unwrap(),
        command_rx,
        event_tx: EventTx::new(event_tx),
    })
    .unwrap();

    Fixture {
        worker,
        exchange,
        store: Store::open(&store_path).unwrap(),
        _command_tx: command_tx,
        _event_rx: event_rx,
    }
}

fn market() -> Market {
    Market::new(Currency::Usd, Currency::Btc)
}

// ---- scenarios ------------------------------------------------------------

#[test]
fn no_signal_places_no_order_but_refreshes_last_tick_cache() {
    let mut fixture = fixture(configuration());
    let candles = flat_candles(&CLOSES_WITHOUT_BUY_SIGNAL);
    {
        let mut state = fixture.exchange.state.lock();
        state.candles = candles.clone();
        state.ticker = CurrencyTick::new(22.5, 22.6, Currency::Usd, Currency::Btc);
    }

    fixture.worker.prepare();
    fixture.worker.tick();

    assert!(fixture.exchange.state.lock().placed.is_empty());
    assert_eq!(fixture.worker.orders().buy_orders_count(), 0);
    // The evaluated candle lands in the cache even without a signal.
    assert!(fixture.worker.signaled().contains_market(
        market(),
        StrategyKind::Sma,
        candles.last().unwrap()
    ));
    let cached = fixture
        .store
        .browse_last_ticks(ExchangeId::Bittrex, market())
        .unwrap();
    assert_eq!(cached.get(&StrategyKind::Sma), candles.last());
}

#[test]
fn sma_buy_signal_places_one_buy_at_the_bid() {
    let mut fixture = fixture(configuration());
    {
        let mut state = fixture.exchange.state.lock();
        state.candles = ohlcv_candles(&CANDLES_BUY_SIGNAL);
        state.ticker = CurrencyTick::new(3920.0, 3921.0, Currency::Usd, Currency::Btc);
    }

    fixture.worker.prepare();
    fixture.worker.tick();

    let placed = fixture.exchange.state.lock().placed.clone();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].side, Side::Buy);
    assert_eq!(placed[0].price, 3920.0);

    assert_eq!(fixture.worker.orders().buy_orders_count(), 1);
    assert!(fixture
        .worker
        .orders()
        .orders_profit(Currency::Btc)
        .is_none_or_empty());

    let rows = fixture.store.browse_orders(ExchangeId::Bittrex).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].uuid, placed[0].uuid);
}

#[test]
fn duplicate_newest_candle_suppresses_a_second_buy() {
    let mut fixture = fixture(configuration());
    {
        let mut state = fixture.exchange.state.lock();
        state.candles = ohlcv_candles(&CANDLES_BUY_SIGNAL);
        state.ticker = CurrencyTick::new(3920.0, 3921.0, Currency::Usd, Currency::Btc);
    }

    fixture.worker.prepare();
    fixture.worker.tick();
    // Same newest candle next tick: signal composition is skipped entirely.
    fixture.worker.tick();

    assert_eq!(fixture.exchange.state.lock().placed.len(), 1);
    assert_eq!(fixture.worker.orders().buy_orders_count(), 1);
}

#[test]
fn filled_buy_enters_profit_group_and_sell_opens_at_target() {
    let mut config = configuration();
    config.indicators = vec![IndicatorConfig::Sma {
        period: 2,
        crossing_interval: 0,
    }];
    config.buy_settings.max_coin_amount = 32.045;
    let mut fixture = fixture(config);

    // Tick 1: a buy crossing at bid 2.21.
    {
        let mut state = fixture.exchange.state.lock();
        state.candles = vec![
            Candle::new(BASE_TIME, 2.0, 2.0, 2.0, 2.0, 1.0),
            Candle::new(BASE_TIME + 3_600, 2.0, 2.0, 2.0, 2.0, 1.0),
            Candle::new(BASE_TIME + 7_200, 2.0, 2.0, 2.0, 2.0, 1.0),
            Candle::new(BASE_TIME + 10_800, 2.0, 2.5, 2.0, 2.5, 1.0),
        ];
        state.ticker = CurrencyTick::new(2.21, 2.25, Currency::Usd, Currency::Btc);
    }
    fixture.worker.prepare();
    fixture.worker.tick();

    let buy = fixture.exchange.state.lock().placed[0].clone();
    assert_eq!(buy.price, 2.21);
    assert_eq!(fixture.worker.orders().buy_orders_count(), 1);

    // Tick 2: the venue reports the buy gone & filled, the market turns down
    // (sell crossing) with the ask above the 10% profit target of 2.431.
    {
        let mut state = fixture.exchange.state.lock();
        state.remote_open.retain(|order| order.uuid != buy.uuid);
        state.settled.insert(buy.uuid.clone(), buy.clone());
        state.candles = vec![
            Candle::new(BASE_TIME + 14_400, 2.6, 2.6, 2.6, 2.6, 1.0),
            Candle::new(BASE_TIME + 18_000, 2.6, 2.6, 2.6, 2.6, 1.0),
            Candle::new(BASE_TIME + 21_600, 2.6, 2.6, 2.6, 2.6, 1.0),
            Candle::new(BASE_TIME + 25_200, 2.6, 2.4, 2.4, 2.6, 1.0),
        ];
        state.ticker = CurrencyTick::new(2.49, 2.50, Currency::Usd, Currency::Btc);
    }
    fixture.worker.tick();

    let placed = fixture.exchange.state.lock().placed.clone();
    assert_eq!(placed.len(), 2);
    let sell = &placed[1];
    assert_eq!(sell.side, Side::Sell);
    assert_eq!(sell.price, 2.50);
    assert_eq!(sell.quantity, buy.quantity);

    assert_eq!(fixture.worker.orders().sell_orders_count(), 1);
    assert!(fixture
        .worker
        .orders()
        .orders_profit(Currency::Btc)
        .is_none_or_empty());
    // The profit entry created on fill was consumed by the sell placement.
    assert!(fixture
        .store
        .browse_orders_profit(ExchangeId::Bittrex)
        .unwrap()
        .is_empty());
}

/// The buy-signal series with a fresh newest candle whose close jump also pulls
/// the SMA inside the candle body: a second, distinct BUY crossing.
const SECOND_BUY_CANDLE: (f64, f64, f64, f64, f64) =
    (3916.000, 3985.770, 3915.000, 3935.872, 68510.95387);

#[test]
fn fresh_signal_candle_opens_an_additional_buy() {
    let mut fixture = fixture(configuration());
    {
        let mut state = fixture.exchange.state.lock();
        state.candles = ohlcv_candles(&CANDLES_BUY_SIGNAL);
        state.ticker = CurrencyTick::new(3920.0, 3921.0, Currency::Usd, Currency::Btc);
    }

    fixture.worker.prepare();
    fixture.worker.tick();
    assert_eq!(fixture.worker.orders().buy_orders_count(), 1);

    // The next interval closes with a different candle; the cache no longer
    // matches and the crossing fires again.
    {
        let mut state = fixture.exchange.state.lock();
        let mut rows = CANDLES_BUY_SIGNAL[1..].to_vec();
        rows.push(SECOND_BUY_CANDLE);
        state.candles = ohlcv_candles(&rows);
    }
    fixture.worker.tick();

    assert_eq!(fixture.exchange.state.lock().placed.len(), 2);
    assert_eq!(fixture.worker.orders().buy_orders_count(), 2);

    // Invariants: every tracked open order is persisted with a real db id, the
    // buy & sell sets stay disjoint, and committed value respects the funded cap.
    let rows = fixture.store.browse_orders(ExchangeId::Bittrex).unwrap();
    for buy in fixture.worker.orders().buy_orders() {
        assert_ne!(buy.db_id, 0);
        assert!(rows.iter().any(|row| row.db_id == buy.db_id));
        assert!(!fixture.worker.orders().contains_sell_order(buy));
    }
    assert!(
        fixture.worker.orders().coin_in_trading()
            <= configuration().buy_settings.max_coin_amount
    );
}

#[test]
fn timed_out_buy_is_canceled_and_dropped() {
    let mut fixture = fixture(configuration());
    {
        let mut state = fixture.exchange.state.lock();
        state.candles = ohlcv_candles(&CANDLES_BUY_SIGNAL);
        state.ticker = CurrencyTick::new(3920.0, 3921.0, Currency::Usd, Currency::Btc);
        // Placed orders open 6 minutes in the past; max_open_time is 5.
        state.placed_age_minutes = 6;
    }

    fixture.worker.prepare();
    fixture.worker.tick();
    assert_eq!(fixture.worker.orders().buy_orders_count(), 1);
    let buy = fixture.exchange.state.lock().placed[0].clone();

    fixture.worker.tick();

    assert_eq!(
        fixture.exchange.state.lock().cancel_requests,
        vec![buy.uuid.clone()]
    );
    assert_eq!(fixture.worker.orders().buy_orders_count(), 0);
    let rows = fixture.store.browse_orders(ExchangeId::Bittrex).unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].canceled);
}

#[test]
fn timed_out_sell_cancellation_restores_the_profit_group() {
    let mut config = configuration();
    config.indicators = vec![IndicatorConfig::Sma {
        period: 2,
        crossing_interval: 0,
    }];
    config.buy_settings.max_coin_amount = 32.045;
    let mut fixture = fixture(config);

    // Buy, fill, sell as in the profit scenario — but sells age out immediately.
    {
        let mut state = fixture.exchange.state.lock();
        state.candles = vec![
            Candle::new(BASE_TIME, 2.0, 2.0, 2.0, 2.0, 1.0),
            Candle::new(BASE_TIME + 3_600, 2.0, 2.0, 2.0, 2.0, 1.0),
            Candle::new(BASE_TIME + 7_200, 2.0, 2.5, 2.0, 2.5, 1.0),
        ];
        state.ticker = CurrencyTick::new(2.21, 2.25, Currency::Usd, Currency::Btc);
    }
    fixture.worker.prepare();
    fixture.worker.tick();
    let buy = fixture.exchange.state.lock().placed[0].clone();

    {
        let mut state = fixture.exchange.state.lock();
        state.remote_open.retain(|order| order.uuid != buy.uuid);
        state.settled.insert(buy.uuid.clone(), buy.clone());
        state.candles = vec![
            Candle::new(BASE_TIME + 10_800, 2.6, 2.6, 2.6, 2.6, 1.0),
            Candle::new(BASE_TIME + 14_400, 2.6, 2.6, 2.6, 2.6, 1.0),
            Candle::new(BASE_TIME + 18_000, 2.6, 2.4, 2.4, 2.6, 1.0),
        ];
        state.ticker = CurrencyTick::new(2.49, 2.50, Currency::Usd, Currency::Btc);
        // The sell placed this tick is born 11 minutes old; open_order_time is 10.
        state.placed_age_minutes = 11;
    }
    fixture.worker.tick();
    assert_eq!(fixture.worker.orders().sell_orders_count(), 1);
    let sell = fixture.exchange.state.lock().placed[1].clone();

    // Tick 3: nothing new from the venue; the timed-out sell gets canceled and
    // the originally paired buy returns to the profit group.
    {
        let mut state = fixture.exchange.state.lock();
        state.candles = vec![
            Candle::new(BASE_TIME + 21_600, 2.6, 2.6, 2.6, 2.6, 1.0),
            Candle::new(BASE_TIME + 25_200, 2.6, 2.6, 2.6, 2.6, 1.0),
            Candle::new(BASE_TIME + 28_800, 2.6, 2.6, 2.6, 2.6, 1.0),
        ];
    }
    fixture.worker.tick();

    assert!(fixture
        .exchange
        .state
        .lock()
        .cancel_requests
        .contains(&sell.uuid));
    assert_eq!(fixture.worker.orders().sell_orders_count(), 0);
    let group = fixture.worker.orders().orders_profit(Currency::Btc).unwrap();
    assert_eq!(group.len(), 1);
    assert!(group.iter().any(|order| order.uuid == buy.uuid));

    let stored = fixture
        .store
        .browse_orders_profit(ExchangeId::Bittrex)
        .unwrap();
    assert_eq!(stored.get(&Currency::Btc).map(Vec::len), Some(1));
}

#[test]
fn buy_admission_respects_max_open_orders() {
    let mut config = configuration();
    config.buy_settings.max_open_orders = 1;
    let mut fixture = fixture(config);
    {
        let mut state = fixture.exchange.state.lock();
        state.candles = ohlcv_candles(&CANDLES_BUY_SIGNAL);
        state.ticker = CurrencyTick::new(3920.0, 3921.0, Currency::Usd, Currency::Btc);
    }

    fixture.worker.prepare();
    fixture.worker.tick();
    assert_eq!(fixture.worker.orders().buy_orders_count(), 1);

    // A fresh newest candle with the same shape fires again, but the cap holds.
    {
        let mut state = fixture.exchange.state.lock();
        let mut candles = ohlcv_candles(&CANDLES_BUY_SIGNAL);
        let mut newest = *candles.last().unwrap();
        newest.time = newest.time + ChronoDuration::hours(1);
        candles.push(newest);
        state.candles = candles;
    }
    fixture.worker.tick();

    assert_eq!(fixture.exchange.state.lock().placed.len(), 1);
    assert_eq!(fixture.worker.orders().buy_orders_count(), 1);
}

#[test]
fn stats_worker_rederives_snapshots_from_store_and_venue() {
    use cambist::engine::{StatsLego, StatsWorker};

    let exchange = MockExchange::new();
    let dir = std::env::temp_dir().join(format!("cambist-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let store_path = dir.join("cambist.db");

    // Seed durable state: one filled buy waiting in the BTC profit group.
    let store = Store::open(&store_path).unwrap();
    let buy = MarketOrder {
        uuid: "buy-1".to_owned(),
        base: Currency::Usd,
        traded: Currency::Btc,
        side: Side::Buy,
        exchange: ExchangeId::Bittrex,
        quantity: 1.45,
        price: 2.21,
        ..MarketOrder::default()
    };
    let buy_id = store.insert_market_order(&buy).unwrap();
    store
        .insert_order_profit(buy_id, Currency::Btc, ExchangeId::Bittrex)
        .unwrap();

    // The venue also reports one open buy.
    exchange.place(market(), Side::Buy, 2.0, 3.0);

    let (_command_tx, command_rx) = mpsc::channel(4);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut stats = StatsWorker::new(StatsLego {
        configuration: "usd-btc-sma".to_owned(),
        exchange_id: ExchangeId::Bittrex,
        exchange: Box::new(exchange.clone()),
        store: Store::open(&store_path).unwrap(),
        markets: vec![market()],
        update_interval: std::time::Duration::from_secs(30),
        interrupt: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        command_rx,
        event_tx: EventTx::new(event_tx),
    });

    stats.refresh();

    let Ok(Event::Snapshot(snapshot)) = event_rx.try_recv() else {
        panic!("expected a snapshot event");
    };
    assert_eq!(snapshot.configuration, "usd-btc-sma");
    assert_eq!(snapshot.open_buys.len(), 1);
    assert_eq!(
        snapshot
            .orders_profit
            .get(&Currency::Btc)
            .map(Vec::len),
        Some(1)
    );
    // Committed value: the venue's open buy (2 * 3) plus the profit-group buy.
    assert_eq!(snapshot.coin_in_trading, 2.0 * 3.0 + 1.45 * 2.21);
}

// Small extension trait keeping the profit-group assertions readable.
trait ProfitGroupAssert {
    fn is_none_or_empty(&self) -> bool;
}

impl ProfitGroupAssert for Option<&cambist::holder::OrdersProfit> {
    fn is_none_or_empty(&self) -> bool {
        self.map_or(true, |group| group.is_empty())
    }
}
