//! Configuration shared by the TKB services.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Logical name of the registry contract inside `contracts.<name>` descriptors.
pub const DEFAULT_CONTRACT_NAME: &str = "KnowledgeRegistry";

const DEFAULT_RPC_ENDPOINTS: [&str; 3] = [
    "http://blockchain:8545",
    "http://localhost:8545",
    "http://127.0.0.1:8545",
];

const DEFAULT_DEPLOY_COMMAND: [&str; 6] = ["npx", "hardhat", "run", "scripts/deploy.ts", "--network", "localhost"];

/// Fixed-delay reconnect schedule, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Delay before the first connect attempt after startup.
    pub initial_delay_ms: u64,
    /// Delay after a failed attempt.
    pub retry_delay_ms: u64,
    /// Delay after an on-demand deployment finished.
    pub after_deploy_delay_ms: u64,
    /// Attempts before giving up. `0` keeps retrying for the process lifetime.
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            retry_delay_ms: 10_000,
            after_deploy_delay_ms: 1_000,
            max_attempts: 0,
        }
    }
}

/// External deploy toolchain invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Deploy automatically when the descriptor file does not exist.
    pub auto_deploy: bool,
    /// Program followed by its arguments. Empty disables deployment.
    #[serde(default)]
    pub command: Vec<String>,
    /// Working directory of the deploy command.
    pub workdir: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            auto_deploy: true,
            command: DEFAULT_DEPLOY_COMMAND.iter().map(|s| s.to_string()).collect(),
            workdir: "../blockchain".to_string(),
        }
    }
}

/// Gateway configuration. Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TkbConfig {
    pub app_name: String,
    /// Interface the HTTP facade binds to.
    pub host: String,
    pub port: u16,

    /// If true, unmatched paths serve the frontend bundle from `frontend_dir`. (Config alias: `ui_enabled`)
    #[serde(default, alias = "ui_enabled")]
    pub frontend_enabled: bool,
    pub frontend_dir: String,

    /// JSON file written by the deploy toolchain with the registry address.
    pub descriptor_path: String,
    pub contract_name: String,
    /// JSON-RPC node endpoints in preference order.
    pub rpc_endpoints: Vec<String>,
    /// Timeout for the per-endpoint liveness probe. Chain reads are not bounded.
    pub probe_timeout_ms: u64,
    /// Record reads in flight at once; `1` reads strictly sequentially.
    pub read_concurrency: usize,

    pub retry: RetrySettings,
    pub deploy: DeploySettings,
}

impl Default for TkbConfig {
    fn default() -> Self {
        Self {
            app_name: "TKB Backend".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3001,
            frontend_enabled: true,
            frontend_dir: "frontend".to_string(),
            descriptor_path: "deployments/registry.json".to_string(),
            contract_name: DEFAULT_CONTRACT_NAME.to_string(),
            rpc_endpoints: DEFAULT_RPC_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            probe_timeout_ms: 3_000,
            read_concurrency: 1,
            retry: RetrySettings::default(),
            deploy: DeploySettings::default(),
        }
    }
}

impl TkbConfig {
    /// Load config from file and environment. Precedence: env `TKB_*` > `TKB_CONFIG` path (default `config/gateway.toml`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("TKB_CONFIG").unwrap_or_else(|_| "config/gateway.toml".to_string());
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("app_name", defaults.app_name)?
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("frontend_enabled", defaults.frontend_enabled)?
            .set_default("frontend_dir", defaults.frontend_dir)?
            .set_default("descriptor_path", defaults.descriptor_path)?
            .set_default("contract_name", defaults.contract_name)?
            .set_default("rpc_endpoints", defaults.rpc_endpoints)?
            .set_default("probe_timeout_ms", defaults.probe_timeout_ms)?
            .set_default("read_concurrency", defaults.read_concurrency as u64)?
            .set_default("retry.initial_delay_ms", defaults.retry.initial_delay_ms)?
            .set_default("retry.retry_delay_ms", defaults.retry.retry_delay_ms)?
            .set_default("retry.after_deploy_delay_ms", defaults.retry.after_deploy_delay_ms)?
            .set_default("retry.max_attempts", u64::from(defaults.retry.max_attempts))?
            .set_default("deploy.auto_deploy", defaults.deploy.auto_deploy)?
            .set_default("deploy.command", defaults.deploy.command)?
            .set_default("deploy.workdir", defaults.deploy.workdir)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("TKB")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("rpc_endpoints")
                    .with_list_parse_key("deploy.command")
                    .try_parsing(true),
            )
            .build()?;

        built.try_deserialize()
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn descriptor_path(&self) -> PathBuf {
        PathBuf::from(&self.descriptor_path)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Frontend development server configuration (`TKB_PROXY_*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevProxyConfig {
    pub listen: String,
    /// Backend base URL that `/api/*` requests are forwarded to.
    pub target: String,
    pub frontend_dir: String,
}

impl Default for DevProxyConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
            target: "http://tkb-backend-1:3001".to_string(),
            frontend_dir: "frontend".to_string(),
        }
    }
}

impl DevProxyConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("listen", defaults.listen)?
            .set_default("target", defaults.target)?
            .set_default("frontend_dir", defaults.frontend_dir)?
            .add_source(config::Environment::with_prefix("TKB_PROXY").prefix_separator("_"))
            .build()?
            .try_deserialize()
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.listen.parse()
    }
}
