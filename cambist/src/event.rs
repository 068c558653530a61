use cambist_data::MarketOrder;
use cambist_instrument::Currency;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::warn;

/// Events the engine publishes while trading. Order lifecycle events communicate
/// work done against the venue; [`Event::Snapshot`] carries the per-tick state copy
/// the UI renders instead of sharing the engine's mutable holders.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub enum Event {
    OrderPlaced(MarketOrder),
    OrderFilled(MarketOrder),
    OrderCanceled(MarketOrder),
    Snapshot(Snapshot),
}

/// Immutable copy of one configuration's trade state after a tick.
#[derive(Clone, PartialEq, Debug, Serialize, Default)]
pub struct Snapshot {
    pub configuration: String,
    pub taken_at: Option<DateTime<Utc>>,
    pub open_buys: Vec<MarketOrder>,
    pub open_sells: Vec<MarketOrder>,
    pub orders_profit: HashMap<Currency, Vec<MarketOrder>>,
    pub coin_in_trading: f64,
}

/// Message transmitter for sending engine messages to downstream consumers.
pub trait MessageTransmitter<Message>: Send {
    /// Attempts to send a message to an external message subscriber.
    fn send(&mut self, message: Message);

    /// Attempts to send many messages to an external message subscriber.
    fn send_many(&mut self, messages: Vec<Message>);
}

/// Transmitter for sending engine [`Event`]s to an external sink. Useful for
/// event-sourcing, real-time dashboards & general monitoring.
#[derive(Debug, Clone)]
pub struct EventTx {
    /// Flag to communicate if the external [`Event`] receiver has been dropped.
    receiver_dropped: bool,
    /// [`Event`] channel transmitter to send [`Event`]s to an external sink.
    event_tx: mpsc::UnboundedSender<Event>,
}

impl MessageTransmitter<Event> for EventTx {
    fn send(&mut self, message: Event) {
        if self.receiver_dropped {
            return;
        }

        if self.event_tx.send(message).is_err() {
            warn!(
                action = "setting receiver_dropped = true",
                why = "event receiver dropped",
                "cannot send Events"
            );
            self.receiver_dropped = true;
        }
    }

    fn send_many(&mut self, messages: Vec<Event>) {
        if self.receiver_dropped {
            return;
        }

        messages.into_iter().for_each(|message| {
            let _ = self.event_tx.send(message);
        })
    }
}

impl EventTx {
    /// Constructs a new [`EventTx`] instance using the provided channel transmitter.
    pub fn new(event_tx: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            receiver_dropped: false,
            event_tx,
        }
    }
}
