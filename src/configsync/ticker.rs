//! # Tickers
//!
//! Recurring timer used by the sync actor once periodic sync has started.

use crate::constants::MIN_TICK_PERIOD;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// A recurring timer
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick; `None` once the ticker has ended
    async fn tick(&mut self) -> Option<()>;
}

pub trait TickerFactory: Send + Sync {
    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

/// Ticker backed by a tokio interval whose first tick is one period out
///
/// Periods shorter than [`MIN_TICK_PERIOD`] are raised to it.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let period = period.max(MIN_TICK_PERIOD);
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Option<()> {
        self.interval.tick().await;
        Some(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalTickerFactory;

impl TickerFactory for IntervalTickerFactory {
    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker> {
        Box::new(IntervalTicker::new(period))
    }
}

/// Ticker fired by hand from tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ManualTickerFactory {
    senders: std::sync::Mutex<Vec<tokio::sync::mpsc::UnboundedSender<()>>>,
    periods: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl ManualTickerFactory {
    /// Number of tickers created so far
    pub(crate) fn created(&self) -> usize {
        self.periods.lock().expect("ticker lock").len()
    }

    pub(crate) fn periods(&self) -> Vec<Duration> {
        self.periods.lock().expect("ticker lock").clone()
    }

    /// Fire the most recently created ticker
    pub(crate) fn fire(&self) -> bool {
        self.senders
            .lock()
            .expect("ticker lock")
            .last()
            .is_some_and(|tx| tx.send(()).is_ok())
    }

    /// End every live ticker
    pub(crate) fn end_all(&self) {
        self.senders.lock().expect("ticker lock").clear();
    }
}

#[cfg(test)]
struct ManualTicker(tokio::sync::mpsc::UnboundedReceiver<()>);

#[cfg(test)]
#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

#[cfg(test)]
impl TickerFactory for ManualTickerFactory {
    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.senders.lock().expect("ticker lock").push(tx);
        self.periods.lock().expect("ticker lock").push(period);
        Box::new(ManualTicker(rx))
    }
}
