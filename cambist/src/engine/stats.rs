use crate::engine::Command;
use crate::event::{Event, MessageTransmitter, Snapshot};
use cambist_data::{MarketOrder, Side};
use cambist_exchange::Exchange;
use cambist_instrument::{Currency, ExchangeId, Market};
use cambist_store::Store;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

/// Interval at which a sleeping stats worker re-checks its command channel.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

/// Lego components for constructing a [`StatsWorker`] via the new() constructor
/// method.
pub struct StatsLego<EventTx>
where
    EventTx: MessageTransmitter<Event>,
{
    /// Configuration name stamped onto every published snapshot.
    pub configuration: String,
    /// Venue this worker reconciles against, with its own credentials/session.
    pub exchange_id: ExchangeId,
    pub exchange: Box<dyn Exchange>,
    /// Read-only store handle (its own connection).
    pub store: Store,
    /// The markets the configuration trades.
    pub markets: Vec<Market>,
    /// Seconds between refreshes.
    pub update_interval: Duration,
    /// Short-circuits the remaining per-market iterations of a refresh.
    pub interrupt: Arc<AtomicBool>,
    pub command_rx: mpsc::Receiver<Command>,
    pub event_tx: EventTx,
}

/// Read-only periodic reconciliation worker: re-derives one configuration's state
/// from the venue & the persistent store and publishes [`Snapshot`]s for the UI.
/// It never touches the trading workers' in-memory state.
pub struct StatsWorker<EventTx>
where
    EventTx: MessageTransmitter<Event>,
{
    configuration: String,
    exchange_id: ExchangeId,
    exchange: Box<dyn Exchange>,
    store: Store,
    markets: Vec<Market>,
    update_interval: Duration,
    interrupt: Arc<AtomicBool>,
    command_rx: mpsc::Receiver<Command>,
    event_tx: EventTx,
}

impl<EventTx> StatsWorker<EventTx>
where
    EventTx: MessageTransmitter<Event>,
{
    /// Constructs a new [`StatsWorker`] from the provided [`StatsLego`].
    pub fn new(lego: StatsLego<EventTx>) -> Self {
        Self {
            configuration: lego.configuration,
            exchange_id: lego.exchange_id,
            exchange: lego.exchange,
            store: lego.store,
            markets: lego.markets,
            update_interval: lego.update_interval,
            interrupt: lego.interrupt,
            command_rx: lego.command_rx,
            event_tx: lego.event_tx,
        }
    }

    /// Run the refresh loop until a [`Command::Terminate`] arrives.
    pub fn run(mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(Command::Terminate(_)) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            self.refresh();

            if self.sleep_interrupted() {
                break;
            }
        }
        info!(configuration = %self.configuration, "stats worker stopped");
    }

    /// One refresh pass: gather remote open orders per market (honouring the
    /// interrupt flag between iterations), join store state & publish a snapshot.
    pub fn refresh(&mut self) {
        self.interrupt.store(false, Ordering::Relaxed);

        let mut open_buys: Vec<MarketOrder> = Vec::new();
        let mut open_sells: Vec<MarketOrder> = Vec::new();

        for market in self.markets.clone() {
            if self.interrupt.load(Ordering::Relaxed) {
                debug!(configuration = %self.configuration, "stats refresh interrupted");
                break;
            }
            match self.exchange.get_account_open_orders(market) {
                Ok(orders) => {
                    for order in orders {
                        match order.side {
                            Side::Buy => open_buys.push(order),
                            Side::Sell => open_sells.push(order),
                        }
                    }
                }
                Err(error) => {
                    warn!(%market, %error, "stats refresh skipped market");
                }
            }
        }

        let orders_profit: HashMap<Currency, Vec<MarketOrder>> = self
            .store
            .browse_orders_profit(self.exchange_id)
            .unwrap_or_default();

        // Open sells are valued at their matched buy's cost.
        let matched_cost: f64 = self
            .store
            .browse_orders_matching(self.exchange_id)
            .unwrap_or_default()
            .into_iter()
            .filter(|(sell, _)| open_sells.iter().any(|open| open.uuid == sell.uuid))
            .map(|(_, buy)| buy.cost())
            .sum();
        let coin_in_trading = open_buys.iter().map(MarketOrder::cost).sum::<f64>()
            + matched_cost
            + orders_profit
                .values()
                .flatten()
                .map(MarketOrder::cost)
                .sum::<f64>();

        self.event_tx.send(Event::Snapshot(Snapshot {
            configuration: self.configuration.clone(),
            taken_at: Some(Utc::now()),
            open_buys,
            open_sells,
            orders_profit,
            coin_in_trading,
        }));
    }

    fn sleep_interrupted(&mut self) -> bool {
        let deadline = Instant::now() + self.update_interval;
        while Instant::now() < deadline {
            match self.command_rx.try_recv() {
                Ok(Command::Terminate(_)) | Err(TryRecvError::Disconnected) => return true,
                Err(TryRecvError::Empty) => {}
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline.saturating_duration_since(Instant::now())));
        }
        false
    }
}
