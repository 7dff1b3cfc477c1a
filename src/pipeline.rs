//! Scrape → persist pipeline.
//!
//! A pipeline is a [`TwoStage`] chain: the first stage takes no input, the
//! second takes exactly what the first produced. The daily trigger does not
//! run the chain directly; it pushes a [`PipelineTask::First`] onto a
//! [`TaskQueue`]. A single background worker pops tasks one at a time, and
//! when a first stage succeeds it queues the matching
//! [`PipelineTask::Second`] carrying the whole output.
//!
//! # Run states
//!
//! ```text
//! TRIGGERED → FETCHING → PARSING → NORMALIZING → PERSISTING → DONE
//!                                       └──────────────┴──────→ FAILED
//! ```
//!
//! Fetch and parse failures only drop the affected section and never move a
//! run to `FAILED`. Nothing is retried; the next daily trigger is the only
//! second chance. Overlapping runs are not detected.

use crate::config::ScrapeConfig;
use crate::error::{PipelineError, ScrapeError};
use crate::models::NormalizedArticle;
use crate::normalize::normalize;
use crate::scrapers::RankingScraper;
use crate::storage::ArticleStore;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Triggered,
    Fetching,
    Parsing,
    Normalizing,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Triggered => "TRIGGERED",
            RunState::Fetching => "FETCHING",
            RunState::Parsing => "PARSING",
            RunState::Normalizing => "NORMALIZING",
            RunState::Persisting => "PERSISTING",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One unit of pipeline work.
pub trait Stage: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn run(
        &self,
        run_id: u64,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, PipelineError>> + Send;
}

/// Two stages where the second consumes the first's output.
pub struct TwoStage<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> TwoStage<A, B>
where
    A: Stage<Input = ()>,
    B: Stage<Input = A::Output>,
{
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    /// Run both stages inline, bypassing the queue.
    #[instrument(level = "info", skip(self))]
    pub async fn run_once(&self, run_id: u64) -> Result<B::Output, PipelineError> {
        info!(run_id, state = %RunState::Triggered, "Pipeline run started");
        let result = async {
            let intermediate = self.first.run(run_id, ()).await?;
            self.second.run(run_id, intermediate).await
        }
        .await;
        match &result {
            Ok(_) => info!(run_id, state = %RunState::Done, "Pipeline run finished"),
            Err(e) => error!(run_id, state = %RunState::Failed, error = %e, "Pipeline run failed"),
        }
        result
    }
}

/// Stage 1: scrape every section and normalize the records.
pub struct ScrapeStage {
    scraper: RankingScraper,
}

impl ScrapeStage {
    pub fn new(config: &ScrapeConfig) -> Result<Self, ScrapeError> {
        Ok(Self {
            scraper: RankingScraper::new(config)?,
        })
    }
}

impl Stage for ScrapeStage {
    type Input = ();
    type Output = Vec<NormalizedArticle>;

    async fn run(&self, run_id: u64, _input: ()) -> Result<Self::Output, PipelineError> {
        let date = self.scraper.target_date();
        info!(run_id, state = %RunState::Fetching, %date, "Fetching ranking pages");
        let pages = self.scraper.fetch(date).await;

        info!(run_id, state = %RunState::Parsing, pages = pages.len(), "Parsing ranking pages");
        let rankings = self.scraper.parse(&pages);

        info!(run_id, state = %RunState::Normalizing, sections = rankings.len(), "Normalizing records");
        Ok(normalize(&rankings)?)
    }
}

/// Stage 2: bulk insert the normalized articles.
pub struct PersistStage {
    store: ArticleStore,
}

impl PersistStage {
    pub fn new(store: ArticleStore) -> Self {
        Self { store }
    }
}

impl Stage for PersistStage {
    type Input = Vec<NormalizedArticle>;
    type Output = u64;

    async fn run(&self, run_id: u64, input: Self::Input) -> Result<u64, PipelineError> {
        info!(run_id, state = %RunState::Persisting, count = input.len(), "Persisting articles");
        Ok(self.store.bulk_insert(&input).await?)
    }
}

/// The daily news pipeline.
pub type NewsPipeline = TwoStage<ScrapeStage, PersistStage>;

pub fn news_pipeline(config: &ScrapeConfig, store: ArticleStore) -> Result<NewsPipeline, ScrapeError> {
    Ok(TwoStage::new(ScrapeStage::new(config)?, PersistStage::new(store)))
}

#[derive(Debug)]
pub enum PipelineTask<T> {
    First { run_id: u64 },
    Second { run_id: u64, input: T },
}

/// Producer side of the worker's queue.
pub struct TaskQueue<T> {
    // Unbounded: the worker feeds stage 2 back into its own queue.
    tx: mpsc::UnboundedSender<PipelineTask<T>>,
    next_run_id: Arc<AtomicU64>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            next_run_id: Arc::clone(&self.next_run_id),
        }
    }
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Queue a new run and return its id.
    pub fn trigger(&self) -> Result<u64, PipelineError> {
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        self.tx
            .send(PipelineTask::First { run_id })
            .map_err(|_| PipelineError::QueueClosed)?;
        info!(run_id, state = %RunState::Triggered, "Pipeline run queued");
        Ok(run_id)
    }
}

pub struct WorkerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop after the task in progress and any queued stage 2 tasks complete.
    pub async fn stop(self) -> Result<(), tokio::task::JoinError> {
        let _ = self.cancel_tx.send(());
        self.join.await
    }
}

/// Start the single pipeline worker.
///
/// On [`WorkerHandle::stop`] the task in progress completes, then every
/// stage 2 task already queued still runs. Queued stage 1 tasks are dropped
/// with a warning.
pub fn spawn_worker<A, B>(pipeline: Arc<TwoStage<A, B>>) -> (TaskQueue<A::Output>, WorkerHandle)
where
    A: Stage<Input = ()>,
    B: Stage<Input = A::Output>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<PipelineTask<A::Output>>();
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let queue = TaskQueue {
        tx,
        next_run_id: Arc::new(AtomicU64::new(1)),
    };
    let chain_tx = queue.tx.clone();

    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel_rx.recv() => {
                    info!("pipeline worker shutdown requested");
                    break;
                }
                task = rx.recv() => {
                    let Some(task) = task else { return };
                    run_task(&pipeline, &chain_tx, task).await;
                }
            }
        }

        while let Ok(task) = rx.try_recv() {
            match task {
                PipelineTask::First { run_id } => {
                    warn!(run_id, "Worker stopping; queued run dropped before stage 1");
                }
                second @ PipelineTask::Second { .. } => {
                    run_task(&pipeline, &chain_tx, second).await;
                }
            }
        }
    });

    (queue, WorkerHandle { cancel_tx, join })
}

async fn run_task<A, B>(
    pipeline: &TwoStage<A, B>,
    chain_tx: &mpsc::UnboundedSender<PipelineTask<A::Output>>,
    task: PipelineTask<A::Output>,
) where
    A: Stage<Input = ()>,
    B: Stage<Input = A::Output>,
{
    match task {
        PipelineTask::First { run_id } => match pipeline.first.run(run_id, ()).await {
            Ok(output) => {
                if chain_tx.send(PipelineTask::Second { run_id, input: output }).is_err() {
                    error!(run_id, state = %RunState::Failed, "Queue closed; stage 1 output dropped");
                }
            }
            Err(e) => {
                error!(run_id, state = %RunState::Failed, error = %e, "Stage 1 failed");
            }
        },
        PipelineTask::Second { run_id, input } => match pipeline.second.run(run_id, input).await {
            Ok(_) => info!(run_id, state = %RunState::Done, "Pipeline run finished"),
            Err(e) => error!(run_id, state = %RunState::Failed, error = %e, "Stage 2 failed"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRange;
    use crate::error::ValidationError;
    use crate::storage::tests::reject_title;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn article(title: &str) -> NormalizedArticle {
        NormalizedArticle {
            title: title.to_string(),
            image: "https://img/x.jpg".to_string(),
            journal: "J".to_string(),
            url: format!("https://n.news.naver.com/{title}"),
            view: 1,
            publish_date: NaiveDate::from_ymd_opt(2023, 9, 1).unwrap(),
        }
    }

    /// Fails on its first call, then returns two articles.
    struct FlakyScrape {
        calls: AtomicUsize,
    }

    impl Stage for FlakyScrape {
        type Input = ();
        type Output = Vec<NormalizedArticle>;

        async fn run(&self, _run_id: u64, _input: ()) -> Result<Self::Output, PipelineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(PipelineError::Validation(ValidationError {
                    index: 0,
                    journal: "J".into(),
                    field: "publish_date",
                    reason: "bad".into(),
                }));
            }
            Ok(vec![article("A"), article("B")])
        }
    }

    struct Recorder {
        tx: mpsc::UnboundedSender<(u64, Vec<NormalizedArticle>)>,
    }

    impl Stage for Recorder {
        type Input = Vec<NormalizedArticle>;
        type Output = ();

        async fn run(&self, run_id: u64, input: Self::Input) -> Result<(), PipelineError> {
            let _ = self.tx.send((run_id, input));
            Ok(())
        }
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::Normalizing.to_string(), "NORMALIZING");
        assert_eq!(RunState::Failed.to_string(), "FAILED");
    }

    #[tokio::test]
    async fn test_empty_sections_persist_zero_rows() {
        let config = ScrapeConfig {
            sections: Vec::new(),
            delay: DelayRange::none(),
            ..ScrapeConfig::default()
        };
        let store = ArticleStore::in_memory().await.unwrap();
        let pipeline = news_pipeline(&config, store.clone()).unwrap();

        let stage_one = pipeline.first.run(1, ()).await.unwrap();
        assert!(stage_one.is_empty());
        assert_eq!(pipeline.run_once(1).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persist_stage_does_not_dedupe() {
        let store = ArticleStore::in_memory().await.unwrap();
        let stage = PersistStage::new(store.clone());
        let batch = vec![article("A"), article("B")];
        stage.run(1, batch.clone()).await.unwrap();
        stage.run(2, batch).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_persist_stage_failure_stores_nothing() {
        let store = ArticleStore::in_memory().await.unwrap();
        reject_title(&store, "B").await;
        let stage = PersistStage::new(store.clone());

        let result = stage.run(1, vec![article("A"), article("B"), article("C")]).await;
        assert!(matches!(result, Err(PipelineError::Storage(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_worker_chains_stage_two_only_after_success() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Arc::new(TwoStage::new(
            FlakyScrape {
                calls: AtomicUsize::new(0),
            },
            Recorder { tx },
        ));
        let (queue, handle) = spawn_worker(pipeline);

        assert_eq!(queue.trigger().unwrap(), 1);
        assert_eq!(queue.trigger().unwrap(), 2);

        let (run_id, input) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(run_id, 2);
        assert_eq!(input, vec![article("A"), article("B")]);
        assert!(rx.try_recv().is_err());

        handle.stop().await.unwrap();
    }

    /// Takes a while, then reports a fixed count.
    struct SlowCount;

    impl Stage for SlowCount {
        type Input = ();
        type Output = usize;

        async fn run(&self, _run_id: u64, _input: ()) -> Result<usize, PipelineError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(7)
        }
    }

    struct CountRecorder {
        tx: mpsc::UnboundedSender<(u64, usize)>,
    }

    impl Stage for CountRecorder {
        type Input = usize;
        type Output = ();

        async fn run(&self, run_id: u64, input: usize) -> Result<(), PipelineError> {
            let _ = self.tx.send((run_id, input));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stop_during_stage_one_still_runs_stage_two() {
        for _ in 0..10 {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let pipeline = Arc::new(TwoStage::new(SlowCount, CountRecorder { tx }));
            let (queue, handle) = spawn_worker(pipeline);

            assert_eq!(queue.trigger().unwrap(), 1);
            assert_eq!(queue.trigger().unwrap(), 2);
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.stop().await.unwrap();

            assert_eq!(rx.try_recv().unwrap(), (1, 7));
            // Run 2 never started stage 1, so nothing more reaches stage 2.
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_trigger_after_stop_is_queue_closed() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let pipeline = Arc::new(TwoStage::new(
            FlakyScrape {
                calls: AtomicUsize::new(1),
            },
            Recorder { tx },
        ));
        let (queue, handle) = spawn_worker(pipeline);
        handle.stop().await.unwrap();
        assert!(matches!(queue.trigger(), Err(PipelineError::QueueClosed)));
    }
}
