//! Fixed-size worker pool with one reusable session per worker.
//!
//! Each worker owns a slot holding at most one session. A worker takes its session out of
//! the slot for the duration of a run and puts it back when the queue is drained, so sessions
//! persist across runs until [`WorkerPool::shutdown`]. A worker aborted by the deadline drops
//! its session instead (backends kill their browser on drop).

use crate::task::search_sentence;
use copyscan_core::{CheckConfig, Sentence, SentenceOutcome, Session, SessionFactory};
use futures_util::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

type Slot<S> = Arc<Mutex<Option<S>>>;
type Queue = Arc<Mutex<VecDeque<Sentence>>>;

/// Outcomes of one run, in completion order.
#[derive(Debug)]
pub struct PoolRun {
    pub outcomes: Vec<SentenceOutcome>,
    /// Workers actually spawned: `min(worker_count, sentences)`.
    pub workers: usize,
}

pub struct WorkerPool<F: SessionFactory> {
    factory: Arc<F>,
    slots: Mutex<Vec<Slot<F::Session>>>,
}

impl<F: SessionFactory> WorkerPool<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    fn slot(&self, worker_id: usize) -> Slot<F::Session> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        while slots.len() <= worker_id {
            slots.push(Arc::new(Mutex::new(None)));
        }
        slots[worker_id].clone()
    }

    /// Number of sessions currently parked in the pool.
    pub fn live_sessions(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .filter(|s| s.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    /// Search every sentence, spreading them over `min(cfg.worker_count, sentences.len())`
    /// workers pulling from one shared queue.
    ///
    /// A sentence whose task panics produces no outcome. When `cfg.deadline` elapses the
    /// remaining workers are aborted and whatever has been collected is returned.
    pub async fn run_all(&self, sentences: Vec<Sentence>, cfg: &CheckConfig) -> PoolRun {
        let total = sentences.len();
        let workers = cfg.worker_count.min(total);
        if workers == 0 {
            return PoolRun {
                outcomes: Vec::new(),
                workers: 0,
            };
        }

        let queue: Queue = Arc::new(Mutex::new(sentences.into()));
        let cfg = Arc::new(cfg.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut set = JoinSet::new();

        tracing::info!(workers, sentences = total, backend = self.factory.name(), "starting workers");
        for worker_id in 0..workers {
            set.spawn(worker_loop(
                worker_id,
                self.factory.clone(),
                self.slot(worker_id),
                queue.clone(),
                tx.clone(),
                cfg.clone(),
            ));
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        let collect = async {
            while let Some(o) = rx.recv().await {
                outcomes.push(o);
            }
        };
        match cfg.deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, collect).await.is_err() {
                    tracing::warn!(
                        deadline_ms = deadline.as_millis() as u64,
                        "deadline reached; aborting remaining sentence tasks"
                    );
                    set.abort_all();
                    let late = drain_ready(&mut rx, &mut outcomes);
                    if late > 0 {
                        tracing::debug!(late, "kept outcomes that arrived at the deadline");
                    }
                }
            }
            None => collect.await,
        }
        while set.join_next().await.is_some() {}

        PoolRun { outcomes, workers }
    }

    /// Release every parked session. Returns how many were released.
    pub async fn shutdown(&self) -> usize {
        let slots: Vec<Slot<F::Session>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut released = 0;
        for (worker_id, slot) in slots.iter().enumerate() {
            let session = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(mut s) = session {
                if let Err(e) = s.release().await {
                    tracing::warn!(worker_id, error = %e, "session release failed");
                }
                released += 1;
            }
        }
        tracing::debug!(released, "worker pool shut down");
        released
    }
}

/// Move every outcome already sitting in `rx` into `outcomes` without waiting.
fn drain_ready(
    rx: &mut mpsc::UnboundedReceiver<SentenceOutcome>,
    outcomes: &mut Vec<SentenceOutcome>,
) -> usize {
    let before = outcomes.len();
    while let Ok(o) = rx.try_recv() {
        outcomes.push(o);
    }
    outcomes.len() - before
}

fn next_sentence(queue: &Queue) -> Option<Sentence> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

async fn worker_loop<F: SessionFactory>(
    worker_id: usize,
    factory: Arc<F>,
    slot: Slot<F::Session>,
    queue: Queue,
    tx: mpsc::UnboundedSender<SentenceOutcome>,
    cfg: Arc<CheckConfig>,
) {
    let opts = cfg.session_options();
    let mut session = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    let mut handled = 0usize;

    while let Some(sentence) = next_sentence(&queue) {
        if !session.as_mut().is_some_and(|s| s.is_alive()) {
            if let Some(mut dead) = session.take() {
                let _ = dead.release().await;
            }
            match factory.create(worker_id, &opts).await {
                Ok(s) => session = Some(s),
                Err(e) => {
                    tracing::warn!(worker_id, index = sentence.index, error = %e, "session unavailable");
                    let _ = tx.send(SentenceOutcome::unmatched(&sentence));
                    continue;
                }
            }
        }
        let Some(s) = session.as_mut() else {
            continue;
        };

        let result = AssertUnwindSafe(search_sentence(s, &sentence, &cfg))
            .catch_unwind()
            .await;
        match result {
            Ok(outcome) => {
                let _ = tx.send(outcome);
            }
            Err(_) => {
                tracing::warn!(worker_id, index = sentence.index, "sentence task panicked; session dropped");
                session = None;
            }
        }
        handled += 1;
    }

    *slot.lock().unwrap_or_else(PoisonError::into_inner) = session;
    tracing::debug!(worker_id, handled, "worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::stub::{hit, Script, StubFactory};
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn sentences(texts: &[&str]) -> Vec<Sentence> {
        let mut pos = 0;
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let s = Sentence {
                    index: i + 1,
                    text: t.to_string(),
                    start: pos,
                    end: pos + t.len(),
                };
                pos += t.len() + 1;
                s
            })
            .collect()
    }

    fn cfg(workers: usize) -> CheckConfig {
        CheckConfig {
            worker_count: workers,
            ..CheckConfig::default()
        }
    }

    const TEXTS: &[&str] = &[
        "first sentence of the document here",
        "second sentence of the document here",
        "third sentence of the document here",
        "fourth sentence of the document here",
        "fifth sentence of the document here",
        "sixth sentence of the document here",
    ];

    #[tokio::test]
    async fn every_sentence_gets_one_outcome_in_completion_order() {
        let mut script = Script::default();
        script
            .delays
            .push(("first".to_string(), Duration::from_millis(150)));
        script.results.insert(
            TEXTS[1].to_string(),
            vec![hit("https://src.test/2", TEXTS[1])],
        );
        let pool = WorkerPool::new(StubFactory::new(script));
        let run = pool.run_all(sentences(TEXTS), &cfg(3)).await;

        assert_eq!(run.workers, 3);
        let idx: BTreeSet<usize> = run.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(idx, (1..=6).collect());
        assert_eq!(run.outcomes.len(), 6);
        assert_ne!(run.outcomes[0].index, 1);
        let second = run.outcomes.iter().find(|o| o.index == 2).unwrap();
        assert_eq!(second.matched_urls, vec!["https://src.test/2"]);
    }

    #[tokio::test]
    async fn workers_are_capped_by_sentence_count() {
        let pool = WorkerPool::new(StubFactory::new(Script::default()));
        let run = pool.run_all(sentences(&TEXTS[..2]), &cfg(8)).await;
        assert_eq!(run.workers, 2);
        assert_eq!(run.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn sessions_are_reused_across_tasks_and_runs() {
        let factory = StubFactory::new(Script::default());
        let counters = factory.counters.clone();
        let pool = WorkerPool::new(factory);

        pool.run_all(sentences(TEXTS), &cfg(2)).await;
        pool.run_all(sentences(TEXTS), &cfg(2)).await;
        let creates = counters.creates.load(Ordering::SeqCst);
        assert!(creates <= 2, "created {creates} sessions");
        assert_eq!(pool.live_sessions(), creates);

        assert_eq!(pool.shutdown().await, creates);
        assert_eq!(counters.releases.load(Ordering::SeqCst), creates);
        assert_eq!(pool.live_sessions(), 0);
    }

    #[tokio::test]
    async fn panicking_task_is_excluded_and_session_replaced() {
        let script = Script {
            panic_on: Some("second".to_string()),
            ..Script::default()
        };
        let factory = StubFactory::new(script);
        let counters = factory.counters.clone();
        let pool = WorkerPool::new(factory);

        let run = pool.run_all(sentences(&TEXTS[..3]), &cfg(1)).await;
        let idx: Vec<usize> = run.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(idx, vec![1, 3]);
        assert_eq!(counters.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn session_creation_failure_fails_open() {
        let script = Script {
            fail_create: true,
            ..Script::default()
        };
        let pool = WorkerPool::new(StubFactory::new(script));
        let run = pool.run_all(sentences(TEXTS), &cfg(2)).await;
        assert_eq!(run.outcomes.len(), TEXTS.len());
        assert!(run.outcomes.iter().all(|o| !o.is_match()));
        assert_eq!(pool.live_sessions(), 0);
    }

    #[tokio::test]
    async fn deadline_returns_partial_outcomes() {
        let mut script = Script::default();
        script
            .delays
            .push(("third".to_string(), Duration::from_secs(30)));
        let pool = WorkerPool::new(StubFactory::new(script));
        let c = CheckConfig {
            deadline: Some(Duration::from_millis(300)),
            ..cfg(1)
        };
        let started = std::time::Instant::now();
        let run = pool.run_all(sentences(TEXTS), &c).await;
        assert!(started.elapsed() < Duration::from_secs(10));
        let idx: Vec<usize> = run.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(idx, vec![1, 2]);
        assert_eq!(pool.live_sessions(), 0);
    }

    #[tokio::test]
    async fn outcomes_queued_at_the_deadline_are_kept() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let batch = sentences(&TEXTS[..3]);
        for s in &batch {
            tx.send(SentenceOutcome::unmatched(s)).unwrap();
        }
        let mut outcomes = vec![SentenceOutcome::unmatched(&batch[0])];
        assert_eq!(drain_ready(&mut rx, &mut outcomes), 3);
        assert_eq!(outcomes.len(), 4);
        assert_eq!(drain_ready(&mut rx, &mut outcomes), 0);

        drop(tx);
        assert_eq!(drain_ready(&mut rx, &mut outcomes), 0);
    }

    #[tokio::test]
    async fn deadline_keeps_every_finished_sentence() {
        let mut script = Script::default();
        script
            .delays
            .push(("fourth".to_string(), Duration::from_secs(30)));
        let pool = WorkerPool::new(StubFactory::new(script));
        let c = CheckConfig {
            deadline: Some(Duration::from_millis(300)),
            ..cfg(4)
        };
        let run = pool.run_all(sentences(TEXTS), &c).await;
        let idx: BTreeSet<usize> = run.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(idx, BTreeSet::from([1, 2, 3, 5, 6]));
    }
}
