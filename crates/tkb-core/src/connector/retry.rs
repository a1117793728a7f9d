use super::{ConnectionManager, Deployer};
use crate::error::RegistryError;
use crate::knowledge::RegistryContract;
use crate::shared::RetrySettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Fixed-delay reconnect schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub retry_delay: Duration,
    pub after_deploy_delay: Duration,
    /// `None` retries for the lifetime of the task.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            after_deploy_delay: Duration::from_millis(settings.after_deploy_delay_ms),
            max_attempts: (settings.max_attempts > 0).then_some(settings.max_attempts),
        }
    }
}

/// Background task driving a `ConnectionManager` until it holds a handle.
pub struct Reconnector {
    manager: Arc<ConnectionManager>,
    deployer: Option<Arc<dyn Deployer>>,
    policy: RetryPolicy,
}

impl Reconnector {
    pub fn new(manager: Arc<ConnectionManager>, policy: RetryPolicy) -> Self {
        Self {
            manager,
            deployer: None,
            policy,
        }
    }

    /// Deploy through `deployer` whenever the descriptor file does not exist.
    pub fn with_auto_deploy(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.deployer = Some(deployer);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Retries until connected. Errors only when `max_attempts` runs out.
    pub async fn run(self) -> Result<Arc<dyn RegistryContract>, RegistryError> {
        let mut delay = self.policy.initial_delay;
        let mut attempt: u32 = 0;
        // At most one successful auto-deploy per run; each one puts a new contract on chain.
        let mut deployed = false;
        loop {
            tokio::time::sleep(delay).await;
            attempt += 1;

            let err = match self.manager.try_connect().await {
                Ok(contract) => return Ok(contract),
                Err(e) => e,
            };
            delay = self.policy.retry_delay;

            match &self.deployer {
                Some(deployer) if err.is_descriptor_absent() && !deployed => {
                    tracing::info!(target: "tkb::connector", attempt, "Descriptor not found, deploying registry");
                    match deployer.deploy().await {
                        Ok(outcome) => {
                            deployed = true;
                            delay = self.policy.after_deploy_delay;
                            if let Err(e) = self.manager.record_deployment(&outcome) {
                                tracing::error!(target: "tkb::connector", attempt, error = %e, "Deployed address not recorded");
                            }
                        }
                        Err(e) => tracing::error!(target: "tkb::connector", attempt, error = %e, "Auto-deploy failed"),
                    }
                }
                Some(_) if err.is_descriptor_absent() => {
                    tracing::warn!(
                        target: "tkb::connector",
                        attempt,
                        "Descriptor still absent after deploy; the deploy command announced no address"
                    );
                }
                _ => {}
            }

            if self.policy.max_attempts.is_some_and(|max| attempt >= max) {
                tracing::error!(target: "tkb::connector", attempt, error = %err, "Giving up on registry connection");
                return Err(err);
            }
            tracing::warn!(
                target: "tkb::connector",
                attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "Registry connection failed, retrying"
            );
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<Arc<dyn RegistryContract>, RegistryError>> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::tests::{write_descriptor, FlakyBinder, ADDR};
    use crate::connector::{ConnectionState, DeployOutcome};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_secs(5),
            retry_delay: Duration::from_secs(10),
            after_deploy_delay: Duration::from_secs(1),
            max_attempts,
        }
    }

    /// Writes the descriptor the way the deploy toolchain would.
    struct WritingDeployer {
        path: PathBuf,
        runs: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Deployer for WritingDeployer {
        async fn deploy(&self) -> Result<DeployOutcome, RegistryError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            write_descriptor(&self.path, ADDR);
            Ok(DeployOutcome {
                announced_address: Some(ADDR.to_string()),
            })
        }
    }

    /// Prints the address like the registry deploy script and writes no descriptor.
    struct AnnouncingDeployer {
        announced: Option<&'static str>,
        runs: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Deployer for AnnouncingDeployer {
        async fn deploy(&self) -> Result<DeployOutcome, RegistryError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(DeployOutcome {
                announced_address: self.announced.map(str::to_string),
            })
        }
    }

    struct FailingDeployer;

    #[async_trait::async_trait]
    impl Deployer for FailingDeployer {
        async fn deploy(&self) -> Result<DeployOutcome, RegistryError> {
            Err(RegistryError::DeploymentFailed { code: Some(1) })
        }
    }

    #[test]
    fn zero_max_attempts_means_unbounded() {
        let settings = RetrySettings::default();
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.retry_delay, Duration::from_millis(10_000));

        let bounded = RetrySettings {
            max_attempts: 3,
            ..RetrySettings::default()
        };
        assert_eq!(RetryPolicy::from(&bounded).max_attempts, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn connects_after_k_failed_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        write_descriptor(&path, ADDR);
        let binder = Arc::new(FlakyBinder::new(3));
        let manager = Arc::new(ConnectionManager::new(&path, "KnowledgeRegistry", binder.clone()));

        let started = Instant::now();
        let contract = Reconnector::new(Arc::clone(&manager), policy(None)).run().await.unwrap();

        assert_eq!(contract.address(), ADDR);
        assert_eq!(binder.calls.load(Ordering::SeqCst), 4);
        assert_eq!(manager.state(), ConnectionState::Connected);
        // 5s initial delay plus three 10s retry delays.
        assert_eq!(started.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn absent_descriptor_triggers_deploy_then_connects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let manager = Arc::new(ConnectionManager::new(&path, "KnowledgeRegistry", Arc::new(FlakyBinder::new(0))));
        let deployer = Arc::new(WritingDeployer {
            path: path.clone(),
            runs: AtomicU32::new(0),
        });

        let started = Instant::now();
        let contract = Reconnector::new(Arc::clone(&manager), policy(None))
            .with_auto_deploy(deployer.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(contract.address(), ADDR);
        assert_eq!(deployer.runs.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert_eq!(manager.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn announced_address_is_bound_after_a_single_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployments").join("registry.json");
        let manager = Arc::new(ConnectionManager::new(&path, "KnowledgeRegistry", Arc::new(FlakyBinder::new(0))));
        let deployer = Arc::new(AnnouncingDeployer {
            announced: Some(ADDR),
            runs: AtomicU32::new(0),
        });
        let policy = RetryPolicy {
            max_attempts: Some(10),
            ..RetryPolicy::default()
        };

        let started = Instant::now();
        let contract = Reconnector::new(Arc::clone(&manager), policy)
            .with_auto_deploy(deployer.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(contract.address(), ADDR);
        assert_eq!(deployer.runs.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert!(path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_deploy_is_not_repeated() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ConnectionManager::new(
            dir.path().join("registry.json"),
            "KnowledgeRegistry",
            Arc::new(FlakyBinder::new(0)),
        ));
        let deployer = Arc::new(AnnouncingDeployer {
            announced: None,
            runs: AtomicU32::new(0),
        });

        let started = Instant::now();
        let err = Reconnector::new(Arc::clone(&manager), policy(Some(4)))
            .with_auto_deploy(deployer.clone())
            .run()
            .await
            .err()
            .unwrap();

        assert!(err.is_descriptor_absent());
        assert_eq!(deployer.runs.load(Ordering::SeqCst), 1);
        // 5s initial, 1s after the deploy, then two 10s retry delays.
        assert_eq!(started.elapsed(), Duration::from_secs(26));
    }

    #[tokio::test(start_paused = true)]
    async fn absent_descriptor_without_deployer_just_retries() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ConnectionManager::new(
            dir.path().join("registry.json"),
            "KnowledgeRegistry",
            Arc::new(FlakyBinder::new(0)),
        ));

        let err = Reconnector::new(Arc::clone(&manager), policy(Some(2))).run().await.err().unwrap();
        assert!(err.is_descriptor_absent());
        assert_eq!(manager.attempts(), 2);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_deploy_falls_back_to_retry_delay() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ConnectionManager::new(
            dir.path().join("registry.json"),
            "KnowledgeRegistry",
            Arc::new(FlakyBinder::new(0)),
        ));

        let started = Instant::now();
        let err = Reconnector::new(Arc::clone(&manager), policy(Some(3)))
            .with_auto_deploy(Arc::new(FailingDeployer))
            .run()
            .await
            .err()
            .unwrap();
        assert!(err.is_descriptor_absent());
        assert_eq!(started.elapsed(), Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_is_observable_through_state_watch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        write_descriptor(&path, ADDR);
        let manager = Arc::new(ConnectionManager::new(&path, "KnowledgeRegistry", Arc::new(FlakyBinder::new(1))));
        let mut state = manager.subscribe();

        let task = Reconnector::new(Arc::clone(&manager), policy(None))
            .with_initial_delay(Duration::ZERO)
            .spawn();
        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        assert!(manager.current_handle().is_some());
        assert!(task.await.unwrap().is_ok());
    }
}
