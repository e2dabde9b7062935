use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use slashtodo::{AdminTokens, DEFAULT_MAX_ATTEMPTS, IntegrationTokens};

/// Runtime configuration for the `slashtodo-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file in the working directory is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "slashtodo-server",
    version,
    about = "Webhook server for the /todo slash command"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:8080" or "/tmp/slashtodo.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Comma-separated tokens the chat platform signs slash commands and
    /// actions with. Requests carrying any other token are rejected.
    ///
    /// Environment variable: `MATTERMOST_TOKENS`
    #[arg(long, env = "MATTERMOST_TOKENS", hide_env_values = true)]
    pub mattermost_tokens: String,

    /// Public URL this server is reachable at. Interactive "Close" buttons
    /// post back to `{BASE_URL}/todoClose`.
    ///
    /// Environment variable: `BASE_URL`
    #[arg(long, env = "BASE_URL")]
    pub base_url: String,

    /// Comma-separated scoped admin tokens for `/readAll` and `/cleanAll`:
    /// `system:SECRET`, `team:TEAM:SECRET` or `channel:TEAM:CHANNEL:SECRET`.
    /// Without any, the admin endpoints reject every request.
    ///
    /// Environment variable: `ADMIN_TOKENS`
    #[arg(long, env = "ADMIN_TOKENS", hide_env_values = true, default_value = "")]
    pub admin_tokens: String,

    /// Where channel records are kept.
    ///
    /// Environment variable: `STORE`
    #[arg(long, env = "STORE", value_enum, default_value_t = StoreKind::Memory)]
    pub store: StoreKind,

    /// Redis connection URL, required when `STORE=redis`.
    ///
    /// Environment variable: `REDIS_URL`
    #[arg(long, env = "REDIS_URL", hide_env_values = true)]
    pub redis_url: Option<String>,

    /// Conditional-write attempts per operation before a contended channel
    /// is reported as an error.
    ///
    /// Environment variable: `STORE_MAX_ATTEMPTS`
    #[arg(long, env = "STORE_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub store_max_attempts: usize,

    /// Emit logs as JSON lines instead of the human-readable format.
    ///
    /// Environment variable: `LOG_JSON`
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Process-local; records are lost on restart.
    Memory,
    /// Shared Redis server.
    Redis,
}

#[derive(Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Redis { url: String },
}

// Connection URLs may carry credentials.
impl core::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::Redis { .. } => f.write_str("Redis { url: <redacted> }"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub tokens: IntegrationTokens,
    pub admin_tokens: AdminTokens,
    pub base_url: String,
    pub store: StoreConfig,
    pub max_attempts: usize,
    pub log_json: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let tokens: IntegrationTokens = args
            .mattermost_tokens
            .parse()
            .context("invalid MATTERMOST_TOKENS")?;
        if tokens.is_empty() {
            bail!("MATTERMOST_TOKENS must contain at least one token");
        }

        let admin_tokens: AdminTokens = args
            .admin_tokens
            .parse()
            .context("invalid ADMIN_TOKENS")?;

        let base_url = args.base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("BASE_URL must not be empty");
        }

        if args.store_max_attempts == 0 {
            bail!("STORE_MAX_ATTEMPTS must be greater than 0");
        }

        let store = match args.store {
            StoreKind::Memory => StoreConfig::Memory,
            StoreKind::Redis => {
                if !cfg!(feature = "redis") {
                    bail!("STORE=redis requires building with the `redis` feature");
                }
                let url = args
                    .redis_url
                    .filter(|url| !url.trim().is_empty())
                    .context("REDIS_URL is required when STORE=redis")?;
                StoreConfig::Redis { url }
            }
        };

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            tokens,
            admin_tokens,
            base_url,
            store,
            max_attempts: args.store_max_attempts,
            log_json: args.log_json,
        })
    }
}
