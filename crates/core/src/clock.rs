use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A periodic ticker owned by a single session.
///
/// Ticks are delivered through the callback passed to `start`. The background
/// task is aborted by `stop` and on drop, so a clock never outlives its owner.
pub struct SessionClock {
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl SessionClock {
    pub fn new(period: Duration) -> Self {
        Self { period, task: None }
    }

    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// Starts ticking. The first tick arrives one full period after this call.
    ///
    /// Restarting a running clock replaces the previous ticker.
    pub fn start<F>(&mut self, mut on_tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.stop();
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                on_tick();
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Renders whole seconds as `MM:SS`. Minutes keep counting past an hour.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
