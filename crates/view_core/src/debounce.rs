use std::{
    sync::Mutex,
    time::Duration,
};

use tokio::{sync::mpsc, task::JoinHandle, time};

/// Collapses a burst of submissions on one logical channel into the
/// single most recent one. Each `submit` cancels whatever was pending
/// and schedules the new value to be forwarded into the sink after the
/// quiet period; only the last value received before the channel goes
/// quiet is ever applied. Dropping the debouncer discards a pending
/// value instead of force-applying it.
pub struct Debouncer<T: Send + 'static> {
    quiet_period: Duration,
    sink: mpsc::UnboundedSender<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(quiet_period: Duration, sink: mpsc::UnboundedSender<T>) -> Self {
        Self {
            quiet_period,
            sink,
            pending: Mutex::new(None),
        }
    }

    /// Schedules `value`, superseding any not-yet-applied submission.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, value: T) {
        let sink = self.sink.clone();
        let quiet_period = self.quiet_period;
        let task = tokio::spawn(async move {
            time::sleep(quiet_period).await;
            let _ = sink.send(value);
        });

        if let Some(superseded) = self.swap_pending(Some(task)) {
            superseded.abort();
        }
    }

    /// Unconditionally drops the pending submission, if any.
    pub fn cancel(&self) {
        if let Some(pending) = self.swap_pending(None) {
            pending.abort();
        }
    }

    fn swap_pending(&self, next: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        let mut guard = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match next {
            Some(task) => guard.replace(task),
            None => guard.take(),
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(300);

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_the_last_value() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(QUIET, tx);

        debouncer.submit("v1");
        debouncer.submit("v2");
        debouncer.submit("v3");

        time::sleep(Duration::from_millis(400)).await;
        assert_eq!(rx.try_recv().ok(), Some("v3"));
        assert!(rx.try_recv().is_err(), "only one value may be applied");
    }

    #[tokio::test(start_paused = true)]
    async fn values_separated_by_quiet_periods_all_apply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(QUIET, tx);

        debouncer.submit("first");
        time::sleep(Duration::from_millis(400)).await;
        debouncer.submit("second");
        time::sleep(Duration::from_millis(400)).await;

        assert_eq!(rx.try_recv().ok(), Some("first"));
        assert_eq!(rx.try_recv().ok(), Some("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_the_pending_value() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(QUIET, tx);

        debouncer.submit("doomed");
        debouncer.cancel();

        time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_discards_the_pending_value() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(QUIET, tx);

        debouncer.submit("doomed");
        drop(debouncer);

        time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn late_submit_restarts_the_quiet_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(QUIET, tx);

        debouncer.submit("early");
        time::sleep(Duration::from_millis(200)).await;
        debouncer.submit("late");

        // 200ms after the second submit the first would have fired by
        // now were it still pending.
        time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());

        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.try_recv().ok(), Some("late"));
    }
}
