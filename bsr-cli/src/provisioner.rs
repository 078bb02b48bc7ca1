//! Provisioner - The external tool `out` runs against the working directory

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bsr_core::{OutParams, Source};
use log::info;
use thiserror::Error;
use tokio::process::Command;

/// Environment variable overriding the provisioning binary
pub const BINARY_ENV: &str = "BSR_BBL_BINARY";

/// Provisioning binary used when `BSR_BBL_BINARY` is not set
pub const DEFAULT_BINARY: &str = "bbl";

/// Errors raised by a provisioning run
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The tool could not be started
    #[error("failed to start {binary}: {message}")]
    Spawn { binary: String, message: String },

    /// The tool ran and reported failure
    #[error("{binary} {command} exited with {status}")]
    Failed {
        binary: String,
        command: String,
        status: String,
    },
}

/// Runs a provisioning command in a working directory
///
/// The command may create, change or delete the state file inside `state_dir`.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn run(
        &self,
        working_dir: &Path,
        state_dir: &Path,
        source: &Source,
        params: &OutParams,
    ) -> Result<(), ProvisionError>;
}

/// Runs the `bbl` binary as a subprocess
#[derive(Debug, Clone)]
pub struct BblProvisioner {
    binary: PathBuf,
}

impl BblProvisioner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Use `BSR_BBL_BINARY`, falling back to `bbl` on the PATH
    pub fn from_env() -> Self {
        let binary = std::env::var_os(BINARY_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY));
        Self::new(binary)
    }

    /// Build `<binary> <command> --state-dir <state_dir> [args...]`
    fn command(
        &self,
        working_dir: &Path,
        state_dir: &Path,
        source: &Source,
        params: &OutParams,
    ) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg(&params.command)
            .arg("--state-dir")
            .arg(state_dir)
            .args(&params.args)
            .current_dir(working_dir)
            .env("BBL_IAAS", &source.iaas)
            .stdin(Stdio::null())
            // stdout carries the resource response, the tool's output goes to stderr
            .stdout(Stdio::from(std::io::stderr()))
            .stderr(Stdio::inherit());

        if let Some(region) = &source.region {
            command.env("BBL_AWS_REGION", region);
        }
        if let Some(access_key_id) = &source.access_key_id {
            command.env("BBL_AWS_ACCESS_KEY_ID", access_key_id);
        }
        if let Some(secret_access_key) = &source.secret_access_key {
            command.env("BBL_AWS_SECRET_ACCESS_KEY", secret_access_key);
        }
        if let Some(region) = &source.gcp_region {
            command.env("BBL_GCP_REGION", region);
        }
        if let Some(key) = &source.gcp_service_account_key {
            command.env("BBL_GCP_SERVICE_ACCOUNT_KEY", key);
        }
        command
    }
}

impl Default for BblProvisioner {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

#[async_trait]
impl Provisioner for BblProvisioner {
    async fn run(
        &self,
        working_dir: &Path,
        state_dir: &Path,
        source: &Source,
        params: &OutParams,
    ) -> Result<(), ProvisionError> {
        let binary = self.binary.display().to_string();
        info!("Running {} {} in {}", binary, params.command, working_dir.display());

        let status = self
            .command(working_dir, state_dir, source, params)
            .status()
            .await
            .map_err(|e| ProvisionError::Spawn {
                binary: binary.clone(),
                message: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ProvisionError::Failed {
                binary,
                command: params.command.clone(),
                status: status.to_string(),
            })
        }
    }
}
