use llm_batch_augment::*;
use object_store::memory::InMemory;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Input text that makes [`EchoClient`] hang far past every deadline.
pub const HANG: &str = "HANG";

/// Deterministic completion stub: answers `"resp: <input>"`.
///
/// Inputs equal to [`HANG`] never answer in time. Inputs listed in
/// `failures` get that many 503s before succeeding. `delay` applies to
/// failed calls too.
#[derive(Default)]
pub struct EchoClient {
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub delay: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl EchoClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(self, input: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(input.to_string(), times);
        self
    }
}

pub fn input_of(request: &CompletionRequest) -> String {
    request
        .prompt()
        .rsplit("Input: ")
        .next()
        .unwrap_or("")
        .to_string()
}

impl CompletionClient for EchoClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let input = input_of(request);

        let should_fail = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&input) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if should_fail {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            return Err(AugmentError::Status {
                status: 503,
                body: "overloaded".into(),
            });
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if input == HANG {
            tokio::time::sleep(Duration::from_secs(1_000_000)).await;
        } else if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("resp: {}", input))
    }
}

/// Loader that hands out a fixed dataset.
pub struct StaticLoader(pub Dataset);

impl DatasetLoader for StaticLoader {
    async fn load(&self, _locator: &str) -> Result<Dataset> {
        Ok(self.0.clone())
    }
}

pub struct FailingLoader;

impl DatasetLoader for FailingLoader {
    async fn load(&self, locator: &str) -> Result<Dataset> {
        Err(AugmentError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", locator),
        )))
    }
}

pub struct FailingSink;

impl ResultSink for FailingSink {
    async fn upload(&self, _key: &str, _body: Vec<u8>) -> Result<String> {
        Err(AugmentError::Other("access denied".into()))
    }
}

/// `n` rows of `(id, text)` where text is `"text <i>"`, except `hang_at`.
pub fn dataset(n: usize, hang_at: Option<usize>) -> Dataset {
    let rows = (0..n)
        .map(|i| {
            let text = if Some(i) == hang_at {
                HANG.to_string()
            } else {
                format!("text {}", i)
            };
            vec![i.to_string(), text]
        })
        .collect();
    Dataset::new(vec!["id".into(), "text".into()], rows)
}

pub fn request(max_rows: usize) -> JobRequest {
    JobRequest {
        source_locator: "memory://input.csv".into(),
        column_index: 1,
        max_rows,
        system_prompt: "Summarize the text.".into(),
        model: "gpt-4o-mini".into(),
        temperature: 0.1,
    }
}

pub fn memory_sink() -> (ObjectStoreSink, Arc<InMemory>) {
    let store = Arc::new(InMemory::new());
    (ObjectStoreSink::new(store.clone(), "memory://out"), store)
}

pub async fn read_upload(store: &InMemory, key: &str) -> Dataset {
    use object_store::ObjectStore;
    let bytes = store
        .get(&object_store::path::Path::from(key))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    llm_batch_augment::storage::parse_csv(&bytes).unwrap()
}
