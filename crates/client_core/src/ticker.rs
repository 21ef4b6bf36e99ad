//! Countdown tick sources injected into [`crate::runner::QuizRunner`].

use std::time::Duration;

use futures::{stream::BoxStream, StreamExt};
use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_stream::wrappers::{IntervalStream, UnboundedReceiverStream};

pub trait TickSource: Send + Sync {
    /// A fresh stream of ticks. Called again whenever the countdown is re-armed.
    fn ticks(&self) -> BoxStream<'static, ()>;
}

/// Wall-clock ticks; the first one fires one period after arming.
pub struct IntervalTicks {
    period: Duration,
}

impl IntervalTicks {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl Default for IntervalTicks {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl TickSource for IntervalTicks {
    fn ticks(&self) -> BoxStream<'static, ()> {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        IntervalStream::new(interval).map(|_| ()).boxed()
    }
}

/// Hand-driven ticks. Only the most recently armed stream receives them.
#[derive(Default)]
pub struct ChannelTicks {
    sender: std::sync::Mutex<Option<mpsc::UnboundedSender<()>>>,
}

impl ChannelTicks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when no countdown is currently listening.
    pub fn fire(&self) -> bool {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.as_ref().is_some_and(|tx| tx.send(()).is_ok())
    }
}

impl TickSource for ChannelTicks {
    fn ticks(&self) -> BoxStream<'static, ()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(tx);
        UnboundedReceiverStream::new(rx).boxed()
    }
}
