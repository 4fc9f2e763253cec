//! Self-replenishing pool of ready-to-serve cards.
//!
//! Epistemic foundation:
//! - K_i: Consumers want a card now; generation takes seconds
//! - B_i: The generator will eventually produce cards (might not)
//! - I^B: Backend latency is unknowable → buffer ahead of demand
//!
//! One background task watches the buffer and triggers a fill burst
//! when supply drops below the refill threshold. A burst runs up to
//! `concurrency` generation workers in parallel; a failing worker is
//! logged and contributes nothing. Consumer acquisition never waits
//! on generation directly, only on the buffer.

use crate::client::TriviaBackend;
use crate::generate::CardGenerator;
use crate::models::{Card, PoolConfig, Result, TriviumError};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Unconditional pause between background refill checks. Bounds the
/// backend call rate even when the buffer stays below target.
const REFILL_INTERVAL: Duration = Duration::from_millis(500);

/// Pause after a fill burst that produced nothing, so a persistently
/// failing backend is not hammered.
const EMPTY_BURST_PAUSE: Duration = Duration::from_secs(2);

/// Dedup keys remembered before the set is wiped.
const SEEN_BOUND: usize = 2000;

/// Bounded membership set with a full-clear eviction policy.
///
/// Simpler and weaker than an LRU: once the bound is exceeded the
/// whole history is dropped, so an old question can resurface right
/// after a clear.
struct SeenSet {
    keys: HashSet<String>,
    bound: usize,
}

impl SeenSet {
    fn new(bound: usize) -> Self {
        Self {
            keys: HashSet::new(),
            bound,
        }
    }

    /// Record a key. Returns false when the key was already present.
    fn insert(&mut self, key: String) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        if self.keys.len() > self.bound {
            self.keys.clear();
        }
        self.keys.insert(key);
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.keys.len()
    }
}

struct PoolInner<B> {
    generator: CardGenerator<B>,
    config: PoolConfig,
    /// FIFO buffer of ready cards
    buffer: Mutex<VecDeque<Card>>,
    /// Counts buffered cards; consumers block on it
    ready: Semaphore,
    /// Advisory size, readable without locking
    buffered: AtomicUsize,
    /// Pool-level dedup across fill bursts
    seen: Mutex<SeenSet>,
    /// At most one active fill burst
    fill_lock: Mutex<()>,
    stopped: AtomicBool,
    background: Mutex<Option<JoinHandle<()>>>,
}

/// Shared handle to a card pool. Cloning is cheap; all clones drive
/// the same buffer and background task.
pub struct CardPool<B> {
    inner: Arc<PoolInner<B>>,
}

impl<B> Clone for CardPool<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: TriviaBackend + 'static> CardPool<B> {
    /// Create a pool. Fails fast on a config that would make the
    /// refill loop meaningless, before any task is spawned.
    pub fn new(generator: CardGenerator<B>, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                generator,
                config,
                buffer: Mutex::new(VecDeque::new()),
                ready: Semaphore::new(0),
                buffered: AtomicUsize::new(0),
                seen: Mutex::new(SeenSet::new(SEEN_BOUND)),
                fill_lock: Mutex::new(()),
                stopped: AtomicBool::new(false),
                background: Mutex::new(None),
            }),
        })
    }

    /// Buffered card count. Advisory only: concurrent producers and
    /// consumers may change it before the caller acts on it.
    pub fn size(&self) -> usize {
        self.inner.buffered.load(Ordering::Relaxed)
    }

    /// Pop the oldest card, waiting up to `timeout` for one to appear.
    pub async fn acquire(&self, timeout: Duration) -> Result<Card> {
        let permit = tokio::time::timeout(timeout, self.inner.ready.acquire())
            .await
            .map_err(|_| TriviumError::Timeout(timeout))?
            .map_err(|_| TriviumError::Internal("pool semaphore closed".to_string()))?;
        permit.forget();
        self.pop().await
    }

    /// Pop the oldest card without waiting.
    pub async fn try_acquire(&self) -> Result<Card> {
        match self.inner.ready.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.pop().await
            }
            Err(_) => Err(TriviumError::EmptyPool),
        }
    }

    async fn pop(&self) -> Result<Card> {
        let card = self.inner.buffer.lock().await.pop_front();
        match card {
            Some(card) => {
                self.inner.buffered.fetch_sub(1, Ordering::Relaxed);
                Ok(card)
            }
            // A forgotten permit guarantees a buffered card; reaching
            // this means the permit/buffer pairing broke.
            None => Err(TriviumError::Internal(
                "pool buffer out of sync".to_string(),
            )),
        }
    }

    async fn push(&self, card: Card) {
        self.inner.buffer.lock().await.push_back(card);
        self.inner.buffered.fetch_add(1, Ordering::Relaxed);
        self.inner.ready.add_permits(1);
    }

    /// Run fill passes until at least `min_ready` cards are buffered
    /// or the deadline elapses.
    pub async fn warm_up(&self, min_ready: usize, deadline: Duration) -> Result<()> {
        let started = tokio::time::Instant::now();
        while self.size() < min_ready {
            self.fill_once().await;
            if started.elapsed() > deadline && self.size() < min_ready {
                return Err(TriviumError::Timeout(deadline));
            }
        }
        Ok(())
    }

    /// Spawn the background refill task. Idempotent: a second call
    /// while one is running is a no-op.
    pub async fn start(&self) {
        let mut handle = self.inner.background.lock().await;
        if handle.is_some() {
            return;
        }
        let pool = self.clone();
        *handle = Some(tokio::spawn(async move { pool.background_main().await }));
    }

    /// Ask the background task to exit. Idempotent. The flag is
    /// observed between loop iterations; in-flight generation is
    /// allowed to finish, and already buffered cards stay acquirable.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Relaxed);
    }

    async fn background_main(&self) {
        info!("Pool refill task started");
        while !self.inner.stopped.load(Ordering::Relaxed) {
            if self.size() < self.inner.config.refill_threshold {
                while self.size() < self.inner.config.target_size
                    && !self.inner.stopped.load(Ordering::Relaxed)
                {
                    self.fill_once().await;
                }
            }
            tokio::time::sleep(REFILL_INTERVAL).await;
        }
        info!("Pool refill task stopped");
    }

    /// One fill burst: up to `concurrency` generation workers in
    /// parallel, results enqueued in completion order until the buffer
    /// reaches target size. Surplus cards from a burst are discarded.
    async fn fill_once(&self) {
        let missing = self.inner.config.target_size.saturating_sub(self.size());
        if missing == 0 {
            return;
        }

        info!(
            size = self.size(),
            target = self.inner.config.target_size,
            "Filling pool"
        );

        let _guard = self.inner.fill_lock.lock().await;
        if self.size() >= self.inner.config.target_size {
            return;
        }

        let mut workers = FuturesUnordered::new();
        for _ in 0..self.inner.config.concurrency {
            let pool = self.clone();
            let batch_size = self.inner.config.batch_size;
            workers.push(tokio::spawn(async move {
                pool.inner.generator.generate_batch(batch_size).await
            }));
        }

        let mut added = 0usize;
        let mut target_reached = false;

        while let Some(joined) = workers.next().await {
            let cards = match joined {
                Ok(Ok(cards)) => cards,
                Ok(Err(e)) => {
                    warn!("Fill worker failed: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Fill worker panicked: {}", e);
                    continue;
                }
            };

            if target_reached {
                continue;
            }

            for card in cards {
                if !self.inner.seen.lock().await.insert(card.dedup_key()) {
                    continue;
                }
                self.push(card).await;
                added += 1;

                if self.size() >= self.inner.config.target_size {
                    target_reached = true;
                    break;
                }
            }
        }

        if added == 0 {
            warn!("Pool fill produced no cards");
            tokio::time::sleep(EMPTY_BURST_PAUSE).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::StyleValidator;
    use crate::models::{BackendError, StylePolicy};
    use async_trait::async_trait;

    /// Yields a unique valid card per call; calls matching the failure
    /// predicate return a transient error instead.
    struct CountingBackend {
        calls: Arc<AtomicUsize>,
        fail_when: fn(usize) -> bool,
        repeat_same_card: bool,
    }

    impl CountingBackend {
        fn reliable() -> Self {
            Self::with_failures(|_| false)
        }

        fn with_failures(fail_when: fn(usize) -> bool) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                fail_when,
                repeat_same_card: false,
            }
        }
    }

    #[async_trait]
    impl TriviaBackend for CountingBackend {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if (self.fail_when)(n) {
                return Err(
                    BackendError::InvalidResponse("scripted failure".to_string()).into(),
                );
            }
            let serial = if self.repeat_same_card { 0 } else { n };
            Ok(format!(
                r#"{{"question": "How many widgets fit in storage crate number {serial}?", "answer": {answer}, "explanation": "Counted during a packing demo."}}"#,
                answer = serial + 1
            ))
        }

        fn max_tokens(&self) -> u32 {
            256
        }
    }

    fn pool_with(backend: CountingBackend, config: PoolConfig) -> CardPool<CountingBackend> {
        let validator = StyleValidator::new(&StylePolicy::default()).unwrap();
        CardPool::new(CardGenerator::new(backend, validator), config).unwrap()
    }

    fn config(
        target_size: usize,
        refill_threshold: usize,
        batch_size: usize,
        concurrency: usize,
    ) -> PoolConfig {
        PoolConfig {
            target_size,
            refill_threshold,
            batch_size,
            concurrency,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_up_converges_to_min_ready() {
        let pool = pool_with(CountingBackend::reliable(), config(3, 1, 1, 1));
        pool.warm_up(3, Duration::from_secs(60)).await.unwrap();
        assert_eq!(pool.size(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_never_overshoots_target() {
        // Each burst could produce up to 12 cards for a target of 2.
        let pool = pool_with(CountingBackend::reliable(), config(2, 1, 3, 4));
        pool.warm_up(2, Duration::from_secs(60)).await.unwrap();
        assert_eq!(pool.size(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_tolerates_transient_backend_failures() {
        let backend = CountingBackend::with_failures(|n| n % 2 == 0);
        let pool = pool_with(backend, config(2, 1, 1, 2));
        pool.warm_up(2, Duration::from_secs(120)).await.unwrap();
        assert_eq!(pool.size(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_is_fifo() {
        let pool = pool_with(CountingBackend::reliable(), config(2, 1, 2, 1));
        pool.warm_up(2, Duration::from_secs(60)).await.unwrap();

        let first = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let second = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(first.answer(), 1.0);
        assert_eq!(second.answer(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out_on_empty_pool() {
        let pool = pool_with(CountingBackend::reliable(), config(2, 1, 1, 1));
        let result = pool.acquire(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(TriviumError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_reports_empty() {
        let pool = pool_with(CountingBackend::reliable(), config(2, 1, 1, 1));
        assert!(matches!(
            pool.try_acquire().await,
            Err(TriviumError::EmptyPool)
        ));

        pool.warm_up(1, Duration::from_secs(60)).await.unwrap();
        assert!(pool.try_acquire().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_up_times_out_when_backend_never_yields() {
        let backend = CountingBackend::with_failures(|_| true);
        let pool = pool_with(backend, config(2, 1, 1, 1));
        let result = pool.warm_up(1, Duration::from_secs(3)).await;
        assert!(matches!(result, Err(TriviumError::Timeout(_))));
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_question_is_not_buffered_twice() {
        let backend = CountingBackend {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_when: |_| false,
            repeat_same_card: true,
        };
        let pool = pool_with(backend, config(2, 1, 1, 1));

        pool.warm_up(1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(pool.size(), 1);

        // Every further fill yields the same question; the pool-level
        // dedup set keeps it out and the buffer never grows.
        let result = pool.warm_up(2, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(TriviumError::Timeout(_))));
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refill_and_idempotent_stop() {
        let backend = CountingBackend::reliable();
        let calls = Arc::clone(&backend.calls);
        let pool = pool_with(backend, config(3, 3, 1, 1));

        pool.start().await;
        pool.start().await;

        let mut polls = 0;
        while pool.size() < 3 && polls < 1000 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            polls += 1;
        }
        assert_eq!(pool.size(), 3);

        pool.stop();
        pool.stop();
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Buffered cards survive stop; draining one would trigger a
        // refill if the background task were still alive.
        let card = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert!(!card.question().is_empty());

        let calls_after_stop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(calls.load(Ordering::SeqCst), calls_after_stop);
    }

    #[test]
    fn test_seen_set_rejects_duplicates() {
        let mut seen = SeenSet::new(10);
        assert!(seen.insert("how many teeth".to_string()));
        assert!(!seen.insert("how many teeth".to_string()));
    }

    #[test]
    fn test_seen_set_clears_completely_past_bound() {
        let mut seen = SeenSet::new(3);
        for i in 0..4 {
            assert!(seen.insert(format!("key {i}")));
        }
        assert_eq!(seen.len(), 4);

        // Inserting past the bound wipes history; the new key survives.
        assert!(seen.insert("key 4".to_string()));
        assert_eq!(seen.len(), 1);

        // A pre-clear key can resurface.
        assert!(seen.insert("key 0".to_string()));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_start() {
        let validator = StyleValidator::new(&StylePolicy::default()).unwrap();
        let generator = CardGenerator::new(CountingBackend::reliable(), validator);
        let result = CardPool::new(generator, config(0, 1, 1, 1));
        assert!(result.is_err());
    }
}
