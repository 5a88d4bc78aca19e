//! Connection acquisition with bounded retry
//!
//! The source server is assumed to be unreliable: it may refuse connections
//! while restarting or after crashing on a bad query. Every acquisition runs
//! the configured `ServerHook`, waits for the server to warm up and then
//! tries to connect, up to `max_attempts` times.
//!
//! The supervisor keeps no state between calls. Callers hand a poisoned
//! connection back through [`ConnectionSupervisor::replace`] and receive a
//! fresh one; the old handle is closed and must not be used again.

use async_trait::async_trait;
use dbsalvage_core::{Connection, ConnectionConfig, DatabaseDriver, SalvageError};
use std::sync::Arc;
use std::time::Duration;

use crate::{ExtractError, Result};


/// Side effect run before every connection attempt
#[async_trait]
pub trait ServerHook: Send + Sync {
    /// Make sure the database server is up. Failures are logged by the
    /// supervisor and otherwise ignored.
    async fn ensure_running(&self) -> std::io::Result<()>;
}

/// Hook that does nothing, for servers managed elsewhere
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopServerHook;

#[async_trait]
impl ServerHook for NoopServerHook {
    async fn ensure_running(&self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Hook that runs an external program, e.g. `/etc/init.d/firebird start`.
///
/// The program is waited for; its exit status is logged, not checked.
#[derive(Debug, Clone)]
pub struct CommandServerHook {
    program: String,
    args: Vec<String>,
}

impl CommandServerHook {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace. Returns `None` for a blank line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl ServerHook for CommandServerHook {
    async fn ensure_running(&self) -> std::io::Result<()> {
        tracing::debug!(program = %self.program, args = ?self.args, "running server start command");
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .status()
            .await?;
        tracing::debug!(program = %self.program, %status, "server start command finished");
        Ok(())
    }
}

/// Retry policy for connection acquisition
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Consecutive failed attempts before giving up (at least 1)
    pub max_attempts: u32,
    /// Delay between running the server hook and connecting
    pub warmup: Duration,
}

impl SupervisorConfig {
    pub fn new(max_attempts: u32, warmup: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            warmup,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::new(20, Duration::from_secs(5))
    }
}

/// How a failed connection attempt is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Operational failure: refused, reset, timed out
    Transient,
    /// Anything else. Still retried, the server may be mid-restart.
    Unexpected,
}

impl FailureKind {
    pub fn classify(error: &SalvageError) -> Self {
        if error.is_connection_level() {
            FailureKind::Transient
        } else {
            FailureKind::Unexpected
        }
    }
}

/// Hands out connections to the source database
pub struct ConnectionSupervisor {
    driver: Arc<dyn DatabaseDriver>,
    connection_config: ConnectionConfig,
    hook: Arc<dyn ServerHook>,
    config: SupervisorConfig,
}

impl ConnectionSupervisor {
    pub fn new(
        driver: Arc<dyn DatabaseDriver>,
        connection_config: ConnectionConfig,
        hook: Arc<dyn ServerHook>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            driver,
            connection_config,
            hook,
            config,
        }
    }

    pub fn driver(&self) -> &Arc<dyn DatabaseDriver> {
        &self.driver
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Open a new connection, retrying up to `max_attempts` times
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn acquire(&self) -> Result<Arc<dyn Connection>> {
        let target = self.driver.build_connection_string(&self.connection_config);
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            if let Err(e) = self.hook.ensure_running().await {
                tracing::warn!(attempt, error = %e, "server hook failed, connecting anyway");
            }
            tokio::time::sleep(self.config.warmup).await;

            match self.driver.connect(&self.connection_config).await {
                Ok(conn) => {
                    tracing::info!(attempt, target = %target, "connected");
                    return Ok(conn);
                }
                Err(e) => {
                    match FailureKind::classify(&e) {
                        FailureKind::Transient => tracing::warn!(
                            attempt,
                            max_attempts = self.config.max_attempts,
                            error = %e,
                            "connection attempt failed"
                        ),
                        FailureKind::Unexpected => tracing::error!(
                            attempt,
                            max_attempts = self.config.max_attempts,
                            error = %e,
                            "unexpected error while connecting"
                        ),
                    }
                    last_error = e.to_string();
                }
            }
        }

        tracing::error!(
            attempts = self.config.max_attempts,
            target = %target,
            "giving up on connecting"
        );
        Err(ExtractError::ConnectionExhausted {
            attempts: self.config.max_attempts,
            last_error,
        })
    }

    /// Close a connection that must not be used again. Close errors are
    /// logged; a poisoned session often cannot be closed cleanly.
    pub async fn discard(&self, conn: Arc<dyn Connection>) {
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "error while closing discarded connection");
        }
    }

    /// Discard `old` and acquire a fresh connection in its place
    pub async fn replace(&self, old: Arc<dyn Connection>) -> Result<Arc<dyn Connection>> {
        self.discard(old).await;
        self.acquire().await
    }
}
