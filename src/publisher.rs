//! Event fan-out to the external push collaborators. One broadcast ring
//! feeds every subscriber; a slow subscriber lags and loses the oldest
//! events instead of blocking the pipeline, and the lag is surfaced as a
//! counter. Events for one match are always sent from the cycle task in
//! order, so per-match ordering survives the fan-out.

use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "arbitrage.new")]
    ArbitrageNew,
    #[serde(rename = "arbitrage.expired")]
    ArbitrageExpired,
    #[serde(rename = "odds.update")]
    OddsUpdate,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventLeg {
    pub provider: String,
    pub outcome: u8,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub match_id: i64,
    #[serde(rename = "match")]
    pub match_label: String,
    pub bet_type: String,
    pub margin: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub legs: Vec<EventLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stakes: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_pct: Option<f64>,
}

pub struct Publisher {
    tx: broadcast::Sender<Event>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a subscriber. Dropping the returned receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send one event to every subscriber. With no subscribers the event is
    /// simply discarded.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}
