use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Rows between two progress log lines.
pub const REPORT_EVERY: usize = 100;

type Observer = Arc<dyn Fn(usize) + Send + Sync>;

/// Count of rows finished during one run, successful or not.
///
/// Created per run and handed to every row task. The count is observability
/// only; nothing branches on it.
#[derive(Clone, Default)]
pub struct ProgressCounter {
    count: Arc<AtomicUsize>,
    observer: Option<Observer>,
}

impl fmt::Debug for ProgressCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressCounter")
            .field("count", &self.get())
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `observer` with the running total every [`REPORT_EVERY`] rows.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Record one finished row and return the new total.
    pub fn increment(&self) -> usize {
        let total = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if total % REPORT_EVERY == 0 {
            tracing::info!("Processed {} records so far.", total);
            if let Some(ref observer) = self.observer {
                observer(total);
            }
        }
        total
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_increment_returns_total() {
        let counter = ProgressCounter::new();
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_clones_share_count() {
        let counter = ProgressCounter::new();
        let other = counter.clone();
        counter.increment();
        other.increment();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_observer_fires_every_hundred() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let counter = ProgressCounter::new().with_observer(move |n| sink.lock().unwrap().push(n));

        for _ in 0..250 {
            counter.increment();
        }
        assert_eq!(*seen.lock().unwrap(), vec![100, 200]);
    }

    #[test]
    fn test_concurrent_increments() {
        let counter = ProgressCounter::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.increment();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.get(), 8000);
    }
}
