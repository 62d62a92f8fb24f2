//! # Execução em Lote
//!
//! Roda vários cenários ao mesmo tempo, cada um com seu próprio browser.
//!
//! ## Para todos entenderem:
//!
//! Um browser por cenário é caro (memória, CPU, janela). Um semáforo
//! limita quantos rodam juntos; os demais esperam na fila.
//!
//! ```text
//! max_parallel = 2
//!
//! [PO-001] ──────────>
//! [PO-002] ────────────────>
//!                     [PO-003] ──────>     <- espera uma vaga
//! ```
//!
//! Cenários não compartilham nada além do banco: cada execução tem seu
//! driver, seu value cache e seu `run_id`.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::config::Timeouts;
use crate::driver::DriverFactory;
use crate::email::EmailVerifier;
use crate::engine::{RunSummary, ScenarioRunner};
use crate::errors::ErrorCode;
use crate::progress::ProgressSink;
use crate::protocol::{BrowserConfig, ScenarioStatus};
use crate::storage::Persistence;

/// Um cenário a executar com o browser configurado para `user_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub scenario_key: String,
    pub user_key: String,
}

impl BatchJob {
    pub fn new(scenario_key: impl Into<String>, user_key: impl Into<String>) -> Self {
        Self {
            scenario_key: scenario_key.into(),
            user_key: user_key.into(),
        }
    }
}

pub struct BatchRunner {
    factory: Arc<dyn DriverFactory>,
    persistence: Arc<dyn Persistence>,
    email: Option<Arc<dyn EmailVerifier>>,
    progress: Arc<dyn ProgressSink>,
    timeouts: Timeouts,
    max_parallel: usize,
}

impl BatchRunner {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        persistence: Arc<dyn Persistence>,
        progress: Arc<dyn ProgressSink>,
        timeouts: Timeouts,
        max_parallel: usize,
    ) -> Self {
        Self {
            factory,
            persistence,
            email: None,
            progress,
            timeouts,
            max_parallel,
        }
    }

    pub fn with_email(mut self, email: Arc<dyn EmailVerifier>) -> Self {
        self.email = Some(email);
        self
    }

    /// Executa um único job no task atual.
    ///
    /// Mesmo caminho de cada item do lote: se o browser não abrir, o
    /// cenário fica gravado como `failed`.
    pub async fn run_one(&self, job: BatchJob) -> RunSummary {
        run_job(
            &job,
            Arc::clone(&self.factory),
            Arc::clone(&self.persistence),
            self.email.clone(),
            Arc::clone(&self.progress),
            self.timeouts.clone(),
        )
        .await
    }

    /// Executa todos os jobs e devolve os resumos na ordem dos jobs.
    ///
    /// `max_parallel = 0` significa "todos de uma vez".
    #[instrument(skip_all, fields(jobs = jobs.len()))]
    pub async fn run(&self, jobs: Vec<BatchJob>) -> Vec<RunSummary> {
        let max_parallel = if self.max_parallel > 0 {
            self.max_parallel
        } else {
            jobs.len().max(1)
        };
        let semaphore = Arc::new(Semaphore::new(max_parallel));
        info!(max_parallel, "Lote iniciado com limite de concorrência");

        let mut join_set = JoinSet::new();

        for (index, job) in jobs.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let factory = Arc::clone(&self.factory);
            let persistence = Arc::clone(&self.persistence);
            let email = self.email.clone();
            let progress = Arc::clone(&self.progress);
            let timeouts = self.timeouts.clone();

            join_set.spawn(async move {
                // O semáforo nunca é fechado; erro aqui só se isso mudar.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return (index, RunSummary::aborted(&job.scenario_key, format!("[{}] {}", ErrorCode::INTERNAL_ERROR, e)))
                    }
                };

                let summary = run_job(&job, factory, persistence, email, progress, timeouts).await;
                (index, summary)
            });
        }

        let mut slots: Vec<Option<RunSummary>> = vec![None; jobs.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, summary)) => slots[index] = Some(summary),
                Err(e) => error!(error = %e, "Task de cenário abortou"),
            }
        }

        let summaries: Vec<RunSummary> = slots
            .into_iter()
            .zip(jobs)
            .map(|(slot, job)| {
                slot.unwrap_or_else(|| {
                    RunSummary::aborted(
                        &job.scenario_key,
                        format!("[{}] execução interrompida", ErrorCode::INTERNAL_ERROR),
                    )
                })
            })
            .collect();

        let passed = summaries.iter().filter(|s| s.succeeded()).count();
        info!(total = summaries.len(), passed, failed = summaries.len() - passed, "Lote finalizado");
        summaries
    }
}

async fn run_job(
    job: &BatchJob,
    factory: Arc<dyn DriverFactory>,
    persistence: Arc<dyn Persistence>,
    email: Option<Arc<dyn EmailVerifier>>,
    progress: Arc<dyn ProgressSink>,
    timeouts: Timeouts,
) -> RunSummary {
    let browser = persistence.load_browser_config(&job.user_key).unwrap_or_else(|e| {
        warn!(user = %job.user_key, error = %e, "Config de browser indisponível, usando padrão");
        BrowserConfig::default()
    });

    let driver = match factory.launch(&browser).await {
        Ok(driver) => driver,
        Err(e) => {
            error!(scenario = %job.scenario_key, error = %e, "Não foi possível abrir o browser");
            if let Err(e) = persistence.save_scenario_status(&job.scenario_key, &ScenarioStatus::finished(false)) {
                warn!(scenario = %job.scenario_key, error = %e, "Falha ao gravar status do cenário");
            }
            return RunSummary::aborted(&job.scenario_key, format!("[{}] {}", ErrorCode::DRIVER_TRANSPORT, e));
        }
    };

    let mut runner = ScenarioRunner::new(driver, persistence)
        .with_progress(progress)
        .with_timeouts(timeouts);
    if let Some(email) = email {
        runner = runner.with_email(email);
    }

    let summary = runner.run(&job.scenario_key).await;
    runner.close().await;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use crate::driver::{Driver, DriverError, DriverResult, ElementHandle, Locator};
    use crate::loader::{ScenarioBundle, ScenarioDefinition, StepDefinition, UserBrowserConfig};
    use crate::progress::NoProgress;
    use crate::protocol::{BrowserKind, ScenarioState};
    use crate::storage::SqliteStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use serde_json::Value;
    use std::time::Duration;

    /// Abre MockDrivers e mede quantos estão abertos ao mesmo tempo.
    #[derive(Default)]
    struct CountingFactory {
        launched: Mutex<Vec<BrowserConfig>>,
        drivers: Mutex<Vec<MockDriver>>,
        open: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        fail_firefox: bool,
    }

    struct TrackedDriver {
        inner: MockDriver,
        open: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Driver for TrackedDriver {
        async fn navigate(&self, url: &str) -> DriverResult<()> {
            self.inner.navigate(url).await
        }
        async fn current_url(&self) -> DriverResult<String> {
            self.inner.current_url().await
        }
        async fn find(&self, locator: &Locator) -> DriverResult<Option<ElementHandle>> {
            self.inner.find(locator).await
        }
        async fn is_clickable(&self, element: &ElementHandle) -> DriverResult<bool> {
            self.inner.is_clickable(element).await
        }
        async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
            self.inner.click(element).await
        }
        async fn context_click(&self, element: &ElementHandle) -> DriverResult<()> {
            self.inner.context_click(element).await
        }
        async fn clear(&self, element: &ElementHandle) -> DriverResult<()> {
            self.inner.clear(element).await
        }
        async fn send_keys(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
            self.inner.send_keys(element, text).await
        }
        async fn press_enter(&self) -> DriverResult<()> {
            self.inner.press_enter().await
        }
        async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
            self.inner.text(element).await
        }
        async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
            self.inner.attribute(element, name).await
        }
        async fn execute_script(&self, body: &str, args: Vec<Value>) -> DriverResult<Value> {
            self.inner.execute_script(body, args).await
        }
        async fn screenshot(&self) -> DriverResult<Vec<u8>> {
            self.inner.screenshot().await
        }
        async fn close(&self) -> DriverResult<()> {
            self.open.fetch_sub(1, Ordering::SeqCst);
            self.inner.close().await
        }
    }

    #[async_trait]
    impl DriverFactory for CountingFactory {
        async fn launch(&self, config: &BrowserConfig) -> DriverResult<Box<dyn Driver>> {
            self.launched.lock().push(config.clone());
            if self.fail_firefox && config.browser_kind == BrowserKind::Firefox {
                return Err(DriverError::Transport("geckodriver not running".into()));
            }
            let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now_open, Ordering::SeqCst);

            let inner = MockDriver::new();
            self.drivers.lock().push(inner.clone());
            Ok(Box::new(TrackedDriver {
                inner,
                open: Arc::clone(&self.open),
            }))
        }
    }

    fn wait_scenario(key: &str, seconds: &str) -> ScenarioDefinition {
        ScenarioDefinition {
            key: key.to_string(),
            name: key.to_string(),
            steps: vec![StepDefinition {
                order: 1,
                name: Some("Pause".to_string()),
                template: None,
                kind: Some("wait".to_string()),
                target: None,
                description: Some(seconds.to_string()),
                requires_manual_input: false,
            }],
        }
    }

    fn store(scenarios: Vec<ScenarioDefinition>, users: Vec<UserBrowserConfig>) -> Arc<SqliteStore> {
        let store = SqliteStore::open_memory().unwrap();
        store
            .import(&ScenarioBundle {
                templates: vec![],
                scenarios,
                users,
            })
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallelism_is_bounded() {
        let store = store(
            vec![
                wait_scenario("A", "1"),
                wait_scenario("B", "1"),
                wait_scenario("C", "1"),
                wait_scenario("D", "1"),
            ],
            vec![],
        );
        let factory = Arc::new(CountingFactory::default());
        let batch = BatchRunner::new(factory.clone(), store.clone(), Arc::new(NoProgress), Timeouts::strict(), 2);

        let jobs = ["A", "B", "C", "D"].iter().map(|k| BatchJob::new(*k, "qa01")).collect();
        let summaries = batch.run(jobs).await;

        assert_eq!(summaries.len(), 4);
        assert!(summaries.iter().all(|s| s.succeeded()));
        assert_eq!(
            summaries.iter().map(|s| s.scenario_key.as_str()).collect::<Vec<_>>(),
            vec!["A", "B", "C", "D"]
        );
        assert!(factory.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(factory.open.load(Ordering::SeqCst), 0);
        assert_eq!(factory.launched.lock().len(), 4);
        for driver in factory.drivers.lock().iter() {
            assert_eq!(driver.calls().last().map(String::as_str), Some("close"));
        }
    }

    #[tokio::test]
    async fn test_browser_config_comes_from_user() {
        let store = store(
            vec![wait_scenario("A", "0")],
            vec![UserBrowserConfig {
                user: "qa02".to_string(),
                browser: BrowserConfig {
                    browser_kind: BrowserKind::Edge,
                    incognito: true,
                    second_screen: false,
                },
            }],
        );
        let factory = Arc::new(CountingFactory::default());
        let batch = BatchRunner::new(factory.clone(), store, Arc::new(NoProgress), Timeouts::strict(), 1);

        batch.run(vec![BatchJob::new("A", "qa02")]).await;

        let launched = factory.launched.lock();
        assert_eq!(launched[0].browser_kind, BrowserKind::Edge);
        assert!(launched[0].incognito);
    }

    #[tokio::test]
    async fn test_launch_failure_fails_only_that_scenario() {
        let store = store(
            vec![wait_scenario("A", "0"), wait_scenario("B", "0")],
            vec![UserBrowserConfig {
                user: "fox".to_string(),
                browser: BrowserConfig {
                    browser_kind: BrowserKind::Firefox,
                    ..Default::default()
                },
            }],
        );
        let factory = Arc::new(CountingFactory {
            fail_firefox: true,
            ..Default::default()
        });
        let batch = BatchRunner::new(factory, store.clone(), Arc::new(NoProgress), Timeouts::strict(), 2);

        let summaries = batch
            .run(vec![BatchJob::new("A", "fox"), BatchJob::new("B", "qa01")])
            .await;

        assert_eq!(summaries[0].status, ScenarioState::Failed);
        assert!(summaries[0].error.as_deref().unwrap().starts_with("[E2001]"));
        assert!(summaries[1].succeeded());
        assert_eq!(store.scenario_status("A").unwrap().status, ScenarioState::Failed);
        assert_eq!(store.scenario_status("B").unwrap().status, ScenarioState::Completed);
    }

    #[tokio::test]
    async fn test_single_run_records_launch_failure() {
        let store = store(
            vec![wait_scenario("A", "0")],
            vec![UserBrowserConfig {
                user: "fox".to_string(),
                browser: BrowserConfig {
                    browser_kind: BrowserKind::Firefox,
                    ..Default::default()
                },
            }],
        );
        let factory = Arc::new(CountingFactory {
            fail_firefox: true,
            ..Default::default()
        });
        let batch = BatchRunner::new(factory, store.clone(), Arc::new(NoProgress), Timeouts::strict(), 1);

        let summary = batch.run_one(BatchJob::new("A", "fox")).await;

        assert!(!summary.succeeded());
        assert!(summary.error.as_deref().unwrap().starts_with("[E2001]"));
        let status = store.scenario_status("A").unwrap();
        assert_eq!(status.status, ScenarioState::Failed);
        assert!(status.last_executed_at.is_some());
    }

    #[tokio::test]
    async fn test_single_run_closes_browser() {
        let store = store(vec![wait_scenario("A", "0")], vec![]);
        let factory = Arc::new(CountingFactory::default());
        let batch = BatchRunner::new(factory.clone(), store.clone(), Arc::new(NoProgress), Timeouts::strict(), 1);

        assert!(batch.run_one(BatchJob::new("A", "qa01")).await.succeeded());
        assert_eq!(factory.open.load(Ordering::SeqCst), 0);
        assert_eq!(store.scenario_status("A").unwrap().status, ScenarioState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_parallel_runs_everything_at_once() {
        let store = store(vec![wait_scenario("A", "5"), wait_scenario("B", "5")], vec![]);
        let factory = Arc::new(CountingFactory::default());
        let batch = BatchRunner::new(factory.clone(), store, Arc::new(NoProgress), Timeouts::strict(), 0);

        let start = tokio::time::Instant::now();
        batch.run(vec![BatchJob::new("A", "u"), BatchJob::new("B", "u")]).await;

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(factory.peak.load(Ordering::SeqCst), 2);
    }
}
