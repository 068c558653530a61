use crate::config::{AppSettings, TradeConfiguration};
use crate::error::EngineError;
use crate::event::{Event, MessageTransmitter};
use cambist_exchange::{Binance, Bittrex, Exchange, Huobi, Kraken, Poloniex};
use cambist_instrument::ExchangeId;
use cambist_integration::Credentials;
use cambist_store::Store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// The trading worker control loop.
pub mod worker;

/// The read-only stats worker that re-derives UI snapshots.
pub mod stats;

pub use stats::{StatsLego, StatsWorker};
pub use worker::{TradingWorker, WorkerLego};

/// Commands a running worker consumes between ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Finish the current tick, persist observed transitions & exit.
    Terminate(String),
}

/// Construct the venue adapter for a configuration's exchange settings.
pub fn build_exchange(
    exchange: ExchangeId,
    credentials: Credentials,
) -> Result<Box<dyn Exchange>, EngineError> {
    let mut adapter: Box<dyn Exchange> = match exchange {
        ExchangeId::Bittrex => Box::new(Bittrex::new()?),
        ExchangeId::Binance => Box::new(Binance::new()?),
        ExchangeId::Kraken => Box::new(Kraken::new()?),
        ExchangeId::Poloniex => Box::new(Poloniex::new()?),
        ExchangeId::Huobi => Box::new(Huobi::new()?),
        ExchangeId::Unknown => {
            return Err(EngineError::ConfigurationInvalid {
                name: String::new(),
                reason: "unknown exchange".to_owned(),
            })
        }
    };
    adapter.set_credentials(credentials);
    Ok(adapter)
}

/// Lego components for constructing an [`Engine`] via the init() constructor method.
pub struct EngineLego<EventTx>
where
    EventTx: MessageTransmitter<Event> + Clone + 'static,
{
    /// Unique identifier for this [`Engine`] instance.
    pub engine_id: Uuid,
    /// Application-wide settings shared by every worker.
    pub app_settings: AppSettings,
    /// Every parsed trade configuration; only `active` ones get a worker.
    pub configurations: Vec<TradeConfiguration>,
    /// SQLite database file backing every worker's [`Store`].
    pub store_path: PathBuf,
    /// Seconds between stats-worker refreshes.
    pub stats_update_interval: std::time::Duration,
    /// [`Event`] transmitter cloned into each worker.
    pub event_tx: EventTx,
}

/// Multi-threaded trading engine running one [`TradingWorker`] thread per active
/// trade configuration. Workers share no mutable state; a graceful shutdown sends
/// [`Command::Terminate`] to each worker's command channel.
pub struct Engine {
    engine_id: Uuid,
    command_txs: HashMap<String, mpsc::Sender<Command>>,
    handles: Vec<JoinHandle<()>>,
    stats_interrupt: Arc<AtomicBool>,
}

impl Engine {
    /// Validate every active configuration, spawn its worker thread & return the
    /// running [`Engine`] handle.
    pub fn init<EventTx>(lego: EngineLego<EventTx>) -> Result<Self, EngineError>
    where
        EventTx: MessageTransmitter<Event> + Clone + 'static,
    {
        let stats_interrupt = Arc::new(AtomicBool::new(false));
        let mut command_txs = HashMap::new();
        let mut handles = Vec::new();

        for configuration in lego
            .configurations
            .into_iter()
            .filter(|configuration| configuration.active)
        {
            configuration.validate()?;

            let exchange = build_exchange(
                configuration.stock_exchange_settings.exchange,
                Credentials::new(
                    configuration.stock_exchange_settings.api_key.clone(),
                    configuration.stock_exchange_settings.secret_key.clone(),
                ),
            )?;
            let store = Store::open(&lego.store_path)?;
            let (command_tx, command_rx) = mpsc::channel(4);

            let worker = TradingWorker::new(WorkerLego {
                engine_id: lego.engine_id,
                configuration: configuration.clone(),
                app_settings: lego.app_settings.clone(),
                exchange,
                store,
                command_rx,
                event_tx: lego.event_tx.clone(),
            })?;

            command_txs.insert(configuration.name.clone(), command_tx);
            let name = configuration.name.clone();
            handles.push(std::thread::spawn(move || {
                info!(configuration = %name, "trading worker starting");
                worker.run();
            }));

            // The stats worker reconciles read-only, with its own adapter session
            // and store connection, so the UI never contends with trading.
            let stats_exchange = build_exchange(
                configuration.stock_exchange_settings.exchange,
                Credentials::new(
                    configuration.stock_exchange_settings.api_key.clone(),
                    configuration.stock_exchange_settings.secret_key.clone(),
                ),
            )?;
            let (stats_command_tx, stats_command_rx) = mpsc::channel(4);
            let stats = stats::StatsWorker::new(stats::StatsLego {
                configuration: configuration.name.clone(),
                exchange_id: configuration.stock_exchange_settings.exchange,
                exchange: stats_exchange,
                store: Store::open(&lego.store_path)?,
                markets: configuration
                    .coin_settings
                    .traded_currencies
                    .iter()
                    .map(|currency| {
                        cambist_instrument::Market::new(
                            configuration.coin_settings.base_currency,
                            *currency,
                        )
                    })
                    .collect(),
                update_interval: lego.stats_update_interval,
                interrupt: Arc::clone(&stats_interrupt),
                command_rx: stats_command_rx,
                event_tx: lego.event_tx.clone(),
            });
            command_txs.insert(format!("{}/stats", configuration.name), stats_command_tx);
            handles.push(std::thread::spawn(move || stats.run()));
        }

        info!(
            engine_id = %lego.engine_id,
            workers = handles.len(),
            "constructed new Engine instance"
        );

        Ok(Self {
            engine_id: lego.engine_id,
            command_txs,
            handles,
            stats_interrupt,
        })
    }

    /// This engine's unique identifier.
    pub fn engine_id(&self) -> Uuid {
        self.engine_id
    }

    /// Flag the stats worker to short-circuit its remaining per-market iterations.
    /// Trading workers do not honour this flag.
    pub fn stats_interrupt(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stats_interrupt)
    }

    /// Request a graceful stop of one configuration's worker.
    pub fn stop_configuration(&self, name: &str, reason: impl Into<String>) {
        match self.command_txs.get(name) {
            Some(command_tx) => {
                let _ = command_tx.try_send(Command::Terminate(reason.into()));
            }
            None => warn!(configuration = %name, "no worker to stop"),
        }
    }

    /// Request a graceful stop of every worker & join their threads.
    pub fn terminate(self, reason: impl Into<String>) {
        let reason = reason.into();
        for (name, command_tx) in &self.command_txs {
            if command_tx
                .try_send(Command::Terminate(reason.clone()))
                .is_err()
            {
                warn!(configuration = %name, "worker command channel full or closed");
            }
        }
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}
