//! The artist metadata agent: configuration-driven construction of a
//! supervised worker and the two tools it exposes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aria_config::Config;
use aria_core::{AriaHome, BackendKind, Fetcher, HostAllowListGate, HostCallGate, wasm_cache_dir};
use aria_mcp::{ArtistArgs, ToolName};
use aria_sandbox::{
    HostFunctionBridge, ModuleSource, SandboxResult, SandboxSettings, SharedExecutionContext,
};
use tracing::{debug, error, info, warn};

use crate::backend::{McpConnector, WorkerBackend};
use crate::error::AgentResult;
use crate::module::ModuleBackend;
use crate::process::ProcessBackend;
use crate::supervisor::WorkerSupervisor;

/// Looks up artist biographies and URLs through a supervised worker.
#[derive(Debug, Clone)]
pub struct ArtistAgent {
    supervisor: WorkerSupervisor,
}

impl ArtistAgent {
    /// Wrap an existing supervisor.
    #[must_use]
    pub fn new(supervisor: WorkerSupervisor) -> Self {
        Self { supervisor }
    }

    /// Build the agent described by `config`.
    ///
    /// Returns `None` when no worker is configured, the configured worker
    /// does not exist, or the sandbox for a module worker cannot be built.
    /// A missing worker disables the agent; it is not an error.
    ///
    /// `gate` and `fetcher` back the `http_fetch` capability of module
    /// workers and are unused for native ones.
    pub async fn from_config(
        config: &Config,
        gate: Arc<dyn HostCallGate>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Option<Self> {
        let agent = &config.agent;
        let Some(configured) = agent.worker_path.as_deref() else {
            warn!(agent = %agent.name, "no worker path configured; artist agent disabled");
            return None;
        };
        let Some(path) = resolve_worker_path(configured) else {
            warn!(agent = %agent.name, path = %configured.display(), "worker not found; artist agent disabled");
            return None;
        };

        let kind = BackendKind::for_path(&path);
        let backend: Arc<dyn WorkerBackend> = match kind {
            BackendKind::Process => Arc::new(
                ProcessBackend::new(&path, agent.worker_args.clone())
                    .with_kill_grace(agent.kill_grace()),
            ),
            BackendKind::Module => match module_backend(config, &path, gate, fetcher).await {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    error!(agent = %agent.name, path = %path.display(), error = %e, "failed to prepare worker module; artist agent disabled");
                    return None;
                },
            },
        };

        let connector = Arc::new(
            McpConnector::new(&agent.name, agent.init_timeout())
                .with_close_timeout(agent.shutdown_timeout()),
        );
        let supervisor = WorkerSupervisor::new(&agent.name, backend, connector)
            .with_call_timeout(agent.call_timeout());

        info!(agent = %agent.name, path = %path.display(), backend = %kind, "artist agent configured");
        Some(Self::new(supervisor))
    }

    /// Fetch an artist's biography.
    ///
    /// # Errors
    ///
    /// See [`WorkerSupervisor::invoke`].
    pub async fn get_artist_biography(&self, id: &str, name: &str, mbid: &str) -> AgentResult<String> {
        self.call(ToolName::ArtistBiography, &ArtistArgs::new(id, name).with_mbid(mbid))
            .await
    }

    /// Fetch an artist's URL.
    ///
    /// # Errors
    ///
    /// See [`WorkerSupervisor::invoke`].
    pub async fn get_artist_url(&self, id: &str, name: &str, mbid: &str) -> AgentResult<String> {
        self.call(ToolName::ArtistUrl, &ArtistArgs::new(id, name).with_mbid(mbid))
            .await
    }

    /// Call `tool` with `args`.
    ///
    /// # Errors
    ///
    /// See [`WorkerSupervisor::invoke`].
    pub async fn call(&self, tool: ToolName, args: &ArtistArgs) -> AgentResult<String> {
        debug!(tool = %tool, artist = %args.name, "calling artist tool");
        self.supervisor
            .invoke(tool.as_str(), args.to_arguments())
            .await
    }

    /// The underlying supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    /// Stop the worker and release shared sandbox state.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }
}

/// The permission gate `config` asks for.
#[must_use]
pub fn gate_from_config(config: &Config) -> Arc<dyn HostCallGate> {
    Arc::new(HostAllowListGate::new(config.sandbox.allow_hosts.iter().cloned()))
}

/// Locate the worker: an existing file, or a bare program name on `PATH`.
#[must_use]
pub fn resolve_worker_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.components().count() == 1 {
        return which::which(path).ok();
    }
    None
}

async fn module_backend(
    config: &Config,
    path: &Path,
    gate: Arc<dyn HostCallGate>,
    fetcher: Arc<dyn Fetcher>,
) -> SandboxResult<ModuleBackend> {
    let mut settings = SandboxSettings::new(&config.agent.name, ModuleSource::File(path.to_path_buf()))
        .with_precompile(config.sandbox.precompile);
    if config.sandbox.compile_cache {
        match data_dir(config) {
            Some(dir) => settings = settings.with_cache_dir(wasm_cache_dir(&dir)),
            None => warn!("no data directory available; compilation cache disabled"),
        }
    }
    if let Some(max) = config.sandbox.max_memory_bytes {
        settings = settings.with_max_memory_bytes(max);
    }

    let bridge = HostFunctionBridge::new(&config.agent.name, gate, fetcher)
        .with_default_timeout(config.fetch.default_timeout());
    let context = SharedExecutionContext::new(settings, bridge).await?;

    Ok(ModuleBackend::new(Arc::new(context))
        .with_startup_grace(config.sandbox.startup_grace())
        .with_shutdown_timeout(config.agent.shutdown_timeout()))
}

fn data_dir(config: &Config) -> Option<PathBuf> {
    config
        .sandbox
        .data_dir
        .clone()
        .or_else(|| AriaHome::resolve().ok().map(|home| home.data_dir()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::AllowAllGate;
    use aria_test::MockFetcher;

    fn config_with_worker(path: Option<PathBuf>) -> Config {
        let mut config = Config::default();
        config.agent.worker_path = path;
        config
    }

    async fn build(config: &Config) -> Option<ArtistAgent> {
        ArtistAgent::from_config(config, Arc::new(AllowAllGate), Arc::new(MockFetcher::new())).await
    }

    #[tokio::test]
    async fn unconfigured_worker_disables_agent() {
        assert!(build(&config_with_worker(None)).await.is_none());
    }

    #[tokio::test]
    async fn missing_worker_disables_agent() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_worker(Some(dir.path().join("absent-worker")));
        assert!(build(&config).await.is_none());
    }

    #[tokio::test]
    async fn invalid_module_disables_agent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.wasm");
        std::fs::write(&path, b"not wasm").unwrap();
        let mut config = config_with_worker(Some(path));
        config.sandbox.compile_cache = false;
        assert!(build(&config).await.is_none());
    }

    #[tokio::test]
    async fn native_worker_selects_process_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp-server");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        let agent = build(&config_with_worker(Some(path))).await.unwrap();
        assert_eq!(agent.supervisor().kind(), BackendKind::Process);
    }

    #[tokio::test]
    async fn module_worker_selects_module_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp-server.wasm");
        std::fs::write(&path, b"(module (memory (export \"memory\") 1) (func (export \"_start\")))").unwrap();
        let mut config = config_with_worker(Some(path));
        config.sandbox.data_dir = Some(dir.path().join("data"));
        let agent = build(&config).await.unwrap();
        assert_eq!(agent.supervisor().kind(), BackendKind::Module);
        assert!(dir.path().join("data").join("cache").join("wasm").exists());
    }

    #[test]
    fn bare_names_resolve_through_path() {
        assert!(resolve_worker_path(Path::new("definitely-not-an-aria-worker")).is_none());
        #[cfg(unix)]
        assert!(resolve_worker_path(Path::new("sh")).is_some());
    }
}
