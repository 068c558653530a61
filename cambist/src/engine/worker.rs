use crate::config::{AppSettings, TradeConfiguration};
use crate::engine::Command;
use crate::error::EngineError;
use crate::event::{Event, MessageTransmitter, Snapshot};
use crate::holder::{SignaledMarketHolder, TradeOrdersHolder};
use cambist_data::{LotSizeHolder, MarketOrder, Side};
use cambist_exchange::Exchange;
use cambist_instrument::{Currency, Market};
use cambist_integration::ExchangeError;
use cambist_store::Store;
use cambist_ta::{CustomStrategy, Signal};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Interval at which a sleeping worker re-checks its command channel.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

/// Lego components for constructing a [`TradingWorker`] via the new() constructor
/// method.
pub struct WorkerLego<EventTx>
where
    EventTx: MessageTransmitter<Event>,
{
    /// Identifier for the engine this worker is associated with.
    pub engine_id: Uuid,
    /// The (validated) trade configuration this worker trades.
    pub configuration: TradeConfiguration,
    /// Application-wide settings.
    pub app_settings: AppSettings,
    /// Venue adapter, already credentialed.
    pub exchange: Box<dyn Exchange>,
    /// This worker's writer handle onto the persistent store.
    pub store: Store,
    /// mpsc::Receiver for receiving [`Command`]s from a remote source.
    pub command_rx: mpsc::Receiver<Command>,
    /// [`Event`] transmitter for publishing every order transition & snapshot.
    pub event_tx: EventTx,
}

/// Control-loop worker for one trade configuration.
///
/// Each tick runs strictly in order: reconcile local state with the venue, cancel
/// timed-out orders, evaluate signals per traded currency, open BUYs under the
/// admission rules, open profit SELLs for filled BUYs, refresh the last-tick cache,
/// then sleep until the next trading-timeout boundary. Persistence of a local
/// transition always happens after the venue action that caused it succeeds —
/// local state mirrors the venue, never the other way around.
pub struct TradingWorker<EventTx>
where
    EventTx: MessageTransmitter<Event>,
{
    engine_id: Uuid,
    configuration: TradeConfiguration,
    app_settings: AppSettings,
    exchange: Box<dyn Exchange>,
    store: Store,
    command_rx: mpsc::Receiver<Command>,
    event_tx: EventTx,
    strategies: HashMap<Currency, CustomStrategy>,
    orders: TradeOrdersHolder,
    signaled: SignaledMarketHolder,
    lots: LotSizeHolder,
    /// Currencies the venue rejected as pairs; disabled for the session.
    disabled: HashSet<Currency>,
}

impl<EventTx> TradingWorker<EventTx>
where
    EventTx: MessageTransmitter<Event>,
{
    /// Constructs a new [`TradingWorker`] from the provided [`WorkerLego`],
    /// building one strategy instance per traded currency so crossing state stays
    /// per-market.
    pub fn new(lego: WorkerLego<EventTx>) -> Result<Self, EngineError> {
        let mut strategies = HashMap::new();
        for currency in &lego.configuration.coin_settings.traded_currencies {
            strategies.insert(*currency, lego.configuration.build_strategy()?);
        }

        Ok(Self {
            engine_id: lego.engine_id,
            configuration: lego.configuration,
            app_settings: lego.app_settings,
            exchange: lego.exchange,
            store: lego.store,
            command_rx: lego.command_rx,
            event_tx: lego.event_tx,
            strategies,
            orders: TradeOrdersHolder::new(),
            signaled: SignaledMarketHolder::new(),
            lots: LotSizeHolder::empty(),
            disabled: HashSet::new(),
        })
    }

    /// The in-memory trade state (tests & diagnostics).
    pub fn orders(&self) -> &TradeOrdersHolder {
        &self.orders
    }

    /// The last-tick signal cache (tests & diagnostics).
    pub fn signaled(&self) -> &SignaledMarketHolder {
        &self.signaled
    }

    fn markets(&self) -> Vec<(Currency, Market)> {
        self.configuration
            .coin_settings
            .traded_currencies
            .iter()
            .map(|currency| {
                (
                    *currency,
                    Market::new(self.configuration.coin_settings.base_currency, *currency),
                )
            })
            .collect()
    }

    /// Restore durable state & reconcile the in-memory mirror against the venue
    /// before the first tick.
    pub fn prepare(&mut self) {
        match self.exchange.get_lot_sizes() {
            Ok(lots) => self.lots = lots,
            Err(error) => warn!(%error, "lot sizes unavailable, quantities go unrounded"),
        }

        let exchange_id = self.configuration.stock_exchange_settings.exchange;

        // Profit groups & matchings come straight from the store.
        match self.store.browse_orders_profit(exchange_id) {
            Ok(groups) => {
                for (currency, orders) in groups {
                    let group = self.orders.orders_profit_mut(currency);
                    for order in orders {
                        group.insert(order);
                    }
                }
            }
            Err(error) => error!(%error, "failed restoring profit groups"),
        }
        match self.store.browse_orders_matching(exchange_id) {
            Ok(matchings) => {
                for (from, to) in matchings {
                    self.orders.matching_mut().insert(from, to);
                }
            }
            Err(error) => error!(%error, "failed restoring order matchings"),
        }

        // Open orders are whatever the venue still reports, joined back to the
        // orders table by uuid for their db ids.
        let known = match self.store.browse_orders(exchange_id) {
            Ok(orders) => orders
                .into_iter()
                .map(|order| (order.uuid.clone(), order))
                .collect::<HashMap<_, _>>(),
            Err(error) => {
                error!(%error, "failed browsing stored orders");
                HashMap::new()
            }
        };

        for (currency, market) in self.markets() {
            let remote = match self.exchange.get_account_open_orders(market) {
                Ok(remote) => remote,
                Err(error) => {
                    warn!(%currency, %error, "open orders unavailable during restore");
                    continue;
                }
            };
            for mut order in remote {
                if let Some(stored) = known.get(&order.uuid) {
                    order.db_id = stored.db_id;
                } else {
                    match self.store.insert_market_order(&order) {
                        Ok(db_id) => order.db_id = db_id,
                        Err(error) => {
                            error!(%error, uuid = %order.uuid, "failed persisting restored order");
                            continue;
                        }
                    }
                }
                match order.side {
                    Side::Buy => self.orders.add_buy_order(order),
                    Side::Sell => self.orders.add_sell_order(order),
                }
            }

            match self.store.browse_last_ticks(exchange_id, market) {
                Ok(ticks) => {
                    for (strategy, candle) in ticks {
                        self.signaled.add_market(market, strategy, candle);
                    }
                }
                Err(error) => error!(%error, "failed restoring last-tick cache"),
            }
        }

        info!(
            engine_id = %self.engine_id,
            configuration = %self.configuration.name,
            open_buys = self.orders.buy_orders_count(),
            open_sells = self.orders.sell_orders_count(),
            "trade state restored"
        );
    }

    /// Run the trading loop until a [`Command::Terminate`] arrives. The current
    /// tick always completes before the worker exits.
    pub fn run(mut self) {
        self.prepare();

        'trading: loop {
            while let Some(command) = self.receive_remote_command() {
                match command {
                    Command::Terminate(_) => break 'trading,
                }
            }

            self.tick();

            if self.sleep_interrupted(self.app_settings.tick_sleep()) {
                break 'trading;
            }
        }

        info!(
            engine_id = %self.engine_id,
            configuration = %self.configuration.name,
            "trading worker stopped"
        );
    }

    /// One full pass of the control loop for this configuration.
    pub fn tick(&mut self) {
        for (currency, market) in self.markets() {
            if self.disabled.contains(&currency) {
                continue;
            }
            if let Err(error) = self.reconcile_market(currency, market) {
                self.handle_currency_error(currency, "reconcile", error);
            }
        }

        self.cancel_timed_out_buys();
        self.cancel_timed_out_sells();

        for (currency, market) in self.markets() {
            if self.disabled.contains(&currency) {
                continue;
            }
            if let Err(error) = self.process_signals(currency, market) {
                self.handle_currency_error(currency, "signals", error);
            }
        }

        self.publish_snapshot();
    }

    fn handle_currency_error(&mut self, currency: Currency, step: &str, error: ExchangeError) {
        match error {
            // A venue that rejects the pair symbol will keep rejecting it.
            ExchangeError::InvalidPair => {
                warn!(%currency, step, "pair rejected by venue, disabling for session");
                self.disabled.insert(currency);
            }
            error => {
                error!(%currency, step, %error, "currency abandoned for this tick");
            }
        }
    }

    // ---- step 1: reconcile ----------------------------------------------

    fn reconcile_market(
        &mut self,
        currency: Currency,
        market: Market,
    ) -> Result<(), ExchangeError> {
        let remote: BTreeSet<MarketOrder> = self
            .exchange
            .get_account_open_orders(market)?
            .into_iter()
            .collect();

        for buy in self.orders.buy_orders_diff(&remote) {
            if buy.market() != market {
                continue;
            }
            self.settle_missing_buy(currency, market, buy)?;
        }

        for sell in self.orders.sell_orders_diff(&remote) {
            if sell.market() != market {
                continue;
            }
            self.settle_missing_sell(currency, market, sell)?;
        }
        Ok(())
    }

    /// A local open BUY the venue no longer reports either filled or was canceled.
    fn settle_missing_buy(
        &mut self,
        currency: Currency,
        market: Market,
        buy: MarketOrder,
    ) -> Result<(), ExchangeError> {
        match self.exchange.get_account_order(market, &buy.uuid) {
            Ok(status) if !status.canceled => {
                info!(uuid = %buy.uuid, "buy filled, entering profit group");
                self.orders.remove_buy_order(&buy);
                if let Err(error) = self.store.insert_order_profit(
                    buy.db_id,
                    currency,
                    buy.exchange,
                ) {
                    error!(%error, uuid = %buy.uuid, "failed persisting profit entry");
                }
                self.orders.orders_profit_mut(currency).insert(buy.clone());
                self.event_tx.send(Event::OrderFilled(buy));
            }
            Ok(_) => self.forget_canceled_buy(buy),
            Err(ExchangeError::NoData) => {
                // Without a record, only age distinguishes canceled from pending.
                if self.older_than(&buy, self.configuration.buy_settings.max_open_time) {
                    self.forget_canceled_buy(buy);
                }
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    fn forget_canceled_buy(&mut self, buy: MarketOrder) {
        info!(uuid = %buy.uuid, "buy canceled on venue, dropping");
        self.orders.remove_buy_order(&buy);
        if let Err(error) = self.store.set_order_canceled(buy.db_id, true) {
            error!(%error, uuid = %buy.uuid, "failed persisting cancellation");
        }
        self.event_tx.send(Event::OrderCanceled(buy));
    }

    /// A local open SELL the venue no longer reports: on fill, record the matching
    /// & close the position; on cancellation, restore the paired BUY so the next
    /// tick can re-open a SELL.
    fn settle_missing_sell(
        &mut self,
        currency: Currency,
        market: Market,
        sell: MarketOrder,
    ) -> Result<(), ExchangeError> {
        match self.exchange.get_account_order(market, &sell.uuid) {
            Ok(status) if !status.canceled => {
                info!(uuid = %sell.uuid, "sell filled, position closed");
                self.orders.remove_sell_order(&sell);
                if let Some(buy) = self.orders.matching().matched_of(&sell).cloned() {
                    if let Err(error) = self.store.insert_order_matching(
                        sell.db_id,
                        buy.db_id,
                        Side::Sell,
                        Side::Buy,
                        sell.exchange,
                        &market.to_string(),
                    ) {
                        error!(%error, uuid = %sell.uuid, "failed persisting matching");
                    }
                    self.orders.orders_profit_mut(currency).remove(&buy);
                    if let Err(error) = self.store.remove_order_profit(buy.db_id) {
                        error!(%error, uuid = %buy.uuid, "failed removing profit entry");
                    }
                } else {
                    warn!(uuid = %sell.uuid, "filled sell had no tentative matching");
                }
                self.event_tx.send(Event::OrderFilled(sell));
            }
            Ok(_) => self.restore_canceled_sell(currency, sell),
            Err(ExchangeError::NoData) => {
                if self.older_than(&sell, self.configuration.sell_settings.open_order_time) {
                    self.restore_canceled_sell(currency, sell);
                }
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    fn restore_canceled_sell(&mut self, currency: Currency, sell: MarketOrder) {
        info!(uuid = %sell.uuid, "sell canceled on venue, restoring buy to profit group");
        self.orders.remove_sell_order(&sell);
        if let Err(error) = self.store.set_order_canceled(sell.db_id, true) {
            error!(%error, uuid = %sell.uuid, "failed persisting cancellation");
        }
        if let Some(buy) = self.orders.matching_mut().remove(&sell) {
            if let Err(error) =
                self.store
                    .insert_order_profit(buy.db_id, currency, buy.exchange)
            {
                error!(%error, uuid = %buy.uuid, "failed persisting restored profit entry");
            }
            self.orders.orders_profit_mut(currency).insert(buy);
        }
        self.event_tx.send(Event::OrderCanceled(sell));
    }

    // ---- step 2: timeouts ------------------------------------------------

    fn older_than(&self, order: &MarketOrder, minutes: u64) -> bool {
        Utc::now() - order.opened_at > ChronoDuration::minutes(minutes as i64)
    }

    fn cancel_timed_out_buys(&mut self) {
        let expired = self
            .orders
            .buy_orders()
            .filter(|buy| self.older_than(buy, self.configuration.buy_settings.max_open_time))
            .cloned()
            .collect::<Vec<_>>();

        for buy in expired {
            match self.exchange.cancel(buy.market(), &buy.uuid) {
                Ok(true) => {
                    info!(uuid = %buy.uuid, "buy timed out, canceled");
                    self.orders.remove_buy_order(&buy);
                    self.orders
                        .orders_profit_mut(buy.traded)
                        .remove(&buy);
                    if let Err(error) = self.store.set_order_canceled(buy.db_id, true) {
                        error!(%error, uuid = %buy.uuid, "failed persisting cancellation");
                    }
                    self.event_tx.send(Event::OrderCanceled(buy));
                }
                Ok(false) => {
                    debug!(uuid = %buy.uuid, "cancel denied, awaiting reconciliation");
                }
                // The order stays put with its original opened_at; retried next tick.
                Err(error) => warn!(uuid = %buy.uuid, %error, "cancel failed, will retry"),
            }
        }
    }

    fn cancel_timed_out_sells(&mut self) {
        let expired = self
            .orders
            .sell_orders()
            .filter(|sell| {
                self.older_than(sell, self.configuration.sell_settings.open_order_time)
            })
            .cloned()
            .collect::<Vec<_>>();

        for sell in expired {
            match self.exchange.cancel(sell.market(), &sell.uuid) {
                Ok(true) => {
                    info!(uuid = %sell.uuid, "sell timed out, canceled");
                    self.restore_canceled_sell(sell.traded, sell);
                }
                Ok(false) => {
                    debug!(uuid = %sell.uuid, "cancel denied, awaiting reconciliation");
                }
                Err(error) => warn!(uuid = %sell.uuid, %error, "cancel failed, will retry"),
            }
        }
    }

    // ---- steps 3-6: signals & order placement ---------------------------

    fn process_signals(
        &mut self,
        currency: Currency,
        market: Market,
    ) -> Result<(), ExchangeError> {
        let candles = self
            .exchange
            .get_candles(market, self.configuration.candle_interval)?;

        if candles.len() < self.configuration.required_history() {
            debug!(%currency, candles = candles.len(), "not enough history for a signal");
            return Ok(());
        }
        let newest = candles[candles.len() - 1];

        let Some(strategy) = self.strategies.get_mut(&currency) else {
            return Ok(());
        };
        let kind = strategy.kind();

        // The newest candle already drove this strategy once; skip recomposition.
        if self.signaled.contains_market(market, kind, &newest) {
            debug!(%currency, "newest candle already evaluated, skipping");
            return Ok(());
        }

        let verdict = match strategy.evaluate(&candles) {
            Ok(verdict) => verdict,
            Err(error) => {
                debug!(%currency, %error, "strategy produced no verdict");
                return Ok(());
            }
        };

        match verdict {
            Some(Signal::Buy) => self.try_open_buy(currency, market)?,
            Some(Signal::Sell) => self.try_open_sells(currency, market)?,
            None => {}
        }

        self.signaled.add_market(market, kind, newest);
        if let Err(error) = self.store.upsert_last_tick(
            self.configuration.stock_exchange_settings.exchange,
            market,
            kind,
            &newest,
        ) {
            error!(%error, %currency, "failed persisting last-tick cache");
        }
        Ok(())
    }

    /// Step 4: open a BUY when every admission rule holds.
    fn try_open_buy(&mut self, currency: Currency, market: Market) -> Result<(), ExchangeError> {
        let buy_settings = &self.configuration.buy_settings;

        if self.orders.buy_orders_count() >= buy_settings.max_open_orders {
            debug!(%currency, "max open orders reached, buy skipped");
            return Ok(());
        }

        let profit_positions = self
            .orders
            .orders_profit(currency)
            .map_or(0, |group| group.len());
        if profit_positions + self.orders.buy_open_positions_for(market)
            >= buy_settings.open_positions_per_coin
        {
            debug!(%currency, "open positions per coin reached, buy skipped");
            return Ok(());
        }

        let proposed_cost =
            buy_settings.max_coin_amount * buy_settings.percentage_buy_amount / 100.0;
        if self.orders.coin_in_trading() + proposed_cost > buy_settings.max_coin_amount {
            debug!(%currency, "funded cap exhausted, buy skipped");
            return Ok(());
        }
        if proposed_cost < buy_settings.min_order_price {
            debug!(%currency, "proposed cost below minimum order price, buy skipped");
            return Ok(());
        }

        let ticker = self.exchange.get_ticker(market)?;
        if !ticker.has_valid_bid() {
            warn!(%currency, bid = ticker.bid, "unusable bid, buy skipped");
            return Ok(());
        }

        let quantity = self
            .lots
            .round_quantity(&market, proposed_cost / ticker.bid);
        if quantity * ticker.bid < buy_settings.min_order_price {
            debug!(%currency, quantity, "lot rounding pushed cost below minimum, buy aborted");
            return Ok(());
        }

        match self.exchange.place_buy(market, quantity, ticker.bid) {
            Ok(mut order) => {
                match self.store.insert_market_order(&order) {
                    Ok(db_id) => order.db_id = db_id,
                    Err(error) => {
                        // The venue accepted the order; reconciliation will
                        // re-observe it even though this write failed.
                        error!(%error, uuid = %order.uuid, "failed persisting buy order");
                    }
                }
                info!(uuid = %order.uuid, %currency, quantity, rate = ticker.bid, "buy placed");
                self.orders.add_buy_order(order.clone());
                self.event_tx.send(Event::OrderPlaced(order));
            }
            Err(ExchangeError::InsufficientFunds) => {
                warn!(%currency, "buy rejected for insufficient funds");
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    /// Step 5: open profit SELLs for every filled BUY whose target the market
    /// already meets; the rest defer to the next tick.
    fn try_open_sells(&mut self, currency: Currency, market: Market) -> Result<(), ExchangeError> {
        let waiting = match self.orders.orders_profit(currency) {
            Some(group) if !group.is_empty() => group.iter().cloned().collect::<Vec<_>>(),
            _ => return Ok(()),
        };

        let ticker = self.exchange.get_ticker(market)?;
        let margin = 1.0 + self.configuration.sell_settings.profit_percentage / 100.0;

        for buy in waiting {
            let target_rate = buy.price * margin;
            if ticker.ask < target_rate {
                debug!(
                    uuid = %buy.uuid,
                    ask = ticker.ask,
                    target_rate,
                    "market below profit target, sell deferred"
                );
                continue;
            }
            let rate = ticker.ask.max(target_rate);

            match self.exchange.place_sell(market, buy.quantity, rate) {
                Ok(mut sell) => {
                    match self.store.insert_market_order(&sell) {
                        Ok(db_id) => sell.db_id = db_id,
                        Err(error) => {
                            error!(%error, uuid = %sell.uuid, "failed persisting sell order");
                        }
                    }
                    info!(
                        uuid = %sell.uuid,
                        buy_uuid = %buy.uuid,
                        quantity = buy.quantity,
                        rate,
                        "sell placed against filled buy"
                    );
                    self.orders.orders_profit_mut(currency).remove(&buy);
                    if let Err(error) = self.store.remove_order_profit(buy.db_id) {
                        error!(%error, uuid = %buy.uuid, "failed removing profit entry");
                    }
                    self.orders.add_sell_order(sell.clone());
                    // Tentative matching; recorded durably once the sell fills.
                    self.orders.matching_mut().insert(sell.clone(), buy);
                    self.event_tx.send(Event::OrderPlaced(sell));
                }
                Err(ExchangeError::InsufficientFunds) => {
                    warn!(uuid = %buy.uuid, "sell rejected for insufficient funds");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    // ---- snapshots & commands -------------------------------------------

    fn publish_snapshot(&mut self) {
        let snapshot = Snapshot {
            configuration: self.configuration.name.clone(),
            taken_at: Some(Utc::now()),
            open_buys: self.orders.buy_orders().cloned().collect(),
            open_sells: self.orders.sell_orders().cloned().collect(),
            orders_profit: self
                .orders
                .profit_groups()
                .map(|(currency, group)| (*currency, group.iter().cloned().collect()))
                .collect(),
            coin_in_trading: self.orders.coin_in_trading(),
        };
        self.event_tx.send(Event::Snapshot(snapshot));
    }

    /// Returns a [`Command`] if one has been received.
    fn receive_remote_command(&mut self) -> Option<Command> {
        match self.command_rx.try_recv() {
            Ok(command) => {
                debug!(command = ?command, "worker received remote command");
                Some(command)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!(
                    action = "synthesising a Command::Terminate",
                    "remote Command transmitter has been dropped"
                );
                Some(Command::Terminate(
                    "remote command transmitter dropped".to_owned(),
                ))
            }
        }
    }

    /// Sleep for `duration` in slices, returning true when a Terminate arrived.
    fn sleep_interrupted(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            if let Some(Command::Terminate(_)) = self.receive_remote_command() {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline.saturating_duration_since(Instant::now())));
        }
        false
    }
}
