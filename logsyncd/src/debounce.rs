use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Downstream callback fired when a debounce cycle closes with pending
/// changes.
#[async_trait]
pub trait ReloadNotify: Send + Sync {
    async fn notify(&self);
}

/// Coalesces many rapid updates into at most one notification per period.
///
/// Every config write runs inside `update` under the gate's lock, so a tick
/// that observes the pending flag always observes the latest completed
/// write. The flag is read-and-cleared under the same lock, so a write is
/// never lost and a pending state never fires twice.
pub struct DebounceGate {
    pending: Mutex<bool>,
    period: Duration,
    notifier: Box<dyn ReloadNotify>,
}

impl DebounceGate {
    pub fn new(period: Duration, notifier: Box<dyn ReloadNotify>) -> Self {
        DebounceGate {
            pending: Mutex::new(false),
            period,
            notifier,
        }
    }

    /// Run `task` under the gate's lock and mark the cycle dirty. Never
    /// blocks on the notification itself.
    pub async fn update<T>(&self, task: impl FnOnce() -> T) -> T {
        let mut pending = self.pending.lock().await;
        let out = task();
        *pending = true;
        out
    }

    /// Background tick loop. Runs for the life of the process.
    pub async fn run(self: Arc<Self>) {
        loop {
            sleep(self.period).await;
            let mut pending = self.pending.lock().await;
            if *pending {
                self.notifier.notify().await;
                *pending = false;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotify {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ReloadNotify for CountingNotify {
        async fn notify(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Notifier that records the shared value at the moment it fires.
    struct ObservingNotify {
        value: Arc<std::sync::Mutex<u32>>,
        seen: Arc<std::sync::Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl ReloadNotify for ObservingNotify {
        async fn notify(&self) {
            let v = *self.value.lock().unwrap();
            self.seen.lock().unwrap().push(v);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_updates_one_notification() {
        let count = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(DebounceGate::new(
            Duration::from_secs(4),
            Box::new(CountingNotify {
                count: count.clone(),
            }),
        ));
        tokio::spawn(gate.clone().run());

        for _ in 0..10 {
            gate.update(|| {}).await;
        }
        sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // An idle period must not fire again.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // A fresh write opens a new cycle.
        gate.update(|| {}).await;
        sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_follows_last_write() {
        let value = Arc::new(std::sync::Mutex::new(0u32));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let gate = Arc::new(DebounceGate::new(
            Duration::from_secs(4),
            Box::new(ObservingNotify {
                value: value.clone(),
                seen: seen.clone(),
            }),
        ));
        tokio::spawn(gate.clone().run());

        for i in 1..=10u32 {
            let value = value.clone();
            gate.update(move || *value.lock().unwrap() = i).await;
        }
        sleep(Duration::from_secs(5)).await;
        assert_eq!(*seen.lock().unwrap(), vec![10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_gate_never_fires() {
        let count = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(DebounceGate::new(
            Duration::from_secs(4),
            Box::new(CountingNotify {
                count: count.clone(),
            }),
        ));
        tokio::spawn(gate.clone().run());
        sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
