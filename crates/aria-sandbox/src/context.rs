//! The shared execution context: one engine, linker and (optionally)
//! precompiled module for the agent's whole lifetime.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, Linker, Module, StoreLimits};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};

use crate::bridge::{self, HostFunctionBridge};
use crate::error::{SandboxError, SandboxResult};

/// Where the worker module comes from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// A `.wasm` (or `.wat`) file on disk.
    File(PathBuf),
    /// Module bytes or text held in memory.
    Bytes(Arc<[u8]>),
}

impl ModuleSource {
    fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }
}

/// Construction settings for [`SharedExecutionContext`].
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    /// Worker name, used as `argv[0]` and in logs.
    pub worker_name: String,
    /// The worker module.
    pub source: ModuleSource,
    /// Directory for the persistent compilation cache; `None` disables it.
    pub cache_dir: Option<PathBuf>,
    /// Compile once at construction instead of once per session.
    pub precompile: bool,
    /// Linear memory cap per instance.
    pub max_memory_bytes: Option<u64>,
}

impl SandboxSettings {
    /// Settings for `source` with caching off and precompilation on.
    #[must_use]
    pub fn new(worker_name: impl Into<String>, source: ModuleSource) -> Self {
        Self {
            worker_name: worker_name.into(),
            source,
            cache_dir: None,
            precompile: true,
            max_memory_bytes: None,
        }
    }

    /// Enable the compilation cache under `dir`.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set whether the module is compiled at construction.
    #[must_use]
    pub fn with_precompile(mut self, precompile: bool) -> Self {
        self.precompile = precompile;
        self
    }

    /// Cap each instance's linear memory.
    #[must_use]
    pub fn with_max_memory_bytes(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }
}

/// Per-store data of a module instance.
pub struct ModuleState {
    wasi: WasiP1Ctx,
    bridge: Arc<HostFunctionBridge>,
    limits: StoreLimits,
}

impl ModuleState {
    pub(crate) fn new(wasi: WasiP1Ctx, bridge: Arc<HostFunctionBridge>, limits: StoreLimits) -> Self {
        Self {
            wasi,
            bridge,
            limits,
        }
    }

    pub(crate) fn bridge(&self) -> &Arc<HostFunctionBridge> {
        &self.bridge
    }

    pub(crate) fn limits_mut(&mut self) -> &mut StoreLimits {
        &mut self.limits
    }
}

/// Engine, linker and compiled-module cache shared by every session.
///
/// Only [`shutdown`](Self::shutdown) releases the shared state; sessions
/// own nothing here except the lease on their instance.
pub struct SharedExecutionContext {
    engine: Engine,
    linker: Arc<Linker<ModuleState>>,
    bridge: Arc<HostFunctionBridge>,
    settings: SandboxSettings,
    precompiled: RwLock<Option<Module>>,
    shut_down: AtomicBool,
    compilations: AtomicUsize,
    pub(crate) live: Arc<AtomicUsize>,
}

impl SharedExecutionContext {
    /// Build the engine, register host functions and, when configured,
    /// compile the worker module.
    ///
    /// # Errors
    ///
    /// Fails if the engine, cache or linker cannot be set up, or if
    /// precompilation is on and the module cannot be read or compiled.
    pub async fn new(settings: SandboxSettings, bridge: HostFunctionBridge) -> SandboxResult<Self> {
        let mut config = Config::new();
        config.async_support(true);
        if let Some(dir) = &settings.cache_dir {
            let cache_file = write_cache_config(dir)?;
            config
                .cache_config_load(&cache_file)
                .map_err(|e| SandboxError::Cache(format!("{e:#}")))?;
            debug!(dir = %dir.display(), "compilation cache enabled");
        }
        let engine = Engine::new(&config).map_err(|e| SandboxError::Engine(format!("{e:#}")))?;

        let mut linker: Linker<ModuleState> = Linker::new(&engine);
        preview1::add_to_linker_async(&mut linker, |state: &mut ModuleState| &mut state.wasi)
            .map_err(|e| SandboxError::Link(format!("{e:#}")))?;
        bridge::add_to_linker(&mut linker)?;

        let precompiled = if settings.precompile {
            let module = compile(&engine, &settings.source).await?;
            info!(worker = %settings.worker_name, source = %settings.source.describe(), "worker module precompiled");
            Some(module)
        } else {
            None
        };

        let compiled_up_front = usize::from(precompiled.is_some());
        Ok(Self {
            engine,
            linker: Arc::new(linker),
            bridge: Arc::new(bridge),
            settings,
            precompiled: RwLock::new(precompiled),
            shut_down: AtomicBool::new(false),
            compilations: AtomicUsize::new(compiled_up_front),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The module for a new session: the precompiled one, or a fresh
    /// compile owned by that session alone.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::ShutDown`] after shutdown, or a compile error.
    pub async fn module_for_session(&self) -> SandboxResult<Module> {
        if self.is_shut_down() {
            return Err(SandboxError::ShutDown);
        }
        if let Some(module) = self.precompiled.read().await.as_ref() {
            return Ok(module.clone());
        }
        let module = compile(&self.engine, &self.settings.source).await?;
        self.compilations.fetch_add(1, Ordering::SeqCst);
        Ok(module)
    }

    /// How many times the worker module has been compiled.
    #[must_use]
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    /// Number of instances whose resources are still held.
    #[must_use]
    pub fn live_instances(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Release the shared compiled module and refuse new sessions.
    ///
    /// Instances still running keep their own module handle until they
    /// stop. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.precompiled.write().await.take();
        let live = self.live_instances();
        if live > 0 {
            warn!(worker = %self.settings.worker_name, live, "sandbox shut down with instances still running");
        } else {
            info!(worker = %self.settings.worker_name, "sandbox shut down");
        }
    }

    /// The worker settings.
    #[must_use]
    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn linker(&self) -> Arc<Linker<ModuleState>> {
        Arc::clone(&self.linker)
    }

    pub(crate) fn bridge(&self) -> Arc<HostFunctionBridge> {
        Arc::clone(&self.bridge)
    }
}

impl std::fmt::Debug for SharedExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedExecutionContext")
            .field("settings", &self.settings)
            .field("live", &self.live_instances())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

async fn compile(engine: &Engine, source: &ModuleSource) -> SandboxResult<Module> {
    let bytes: Arc<[u8]> = match source {
        ModuleSource::File(path) => tokio::fs::read(path)
            .await
            .map_err(|source| SandboxError::ModuleRead {
                path: path.clone(),
                source,
            })?
            .into(),
        ModuleSource::Bytes(bytes) => Arc::clone(bytes),
    };
    let engine = engine.clone();
    tokio::task::spawn_blocking(move || Module::new(&engine, &*bytes))
        .await
        .map_err(|e| SandboxError::Compile(e.to_string()))?
        .map_err(|e| SandboxError::Compile(format!("{e:#}")))
}

const CACHE_CONFIG_FILE: &str = "wasmtime-cache.toml";

/// Write the engine's cache configuration file into `dir`.
fn write_cache_config(dir: &Path) -> SandboxResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let dir = std::fs::canonicalize(dir)?;
    let mut cache = toml::Table::new();
    cache.insert("enabled".to_string(), toml::Value::Boolean(true));
    cache.insert(
        "directory".to_string(),
        toml::Value::String(dir.display().to_string()),
    );
    let mut root = toml::Table::new();
    root.insert("cache".to_string(), toml::Value::Table(cache));
    let rendered = toml::to_string(&root).map_err(|e| SandboxError::Cache(e.to_string()))?;

    let path = dir.join(CACHE_CONFIG_FILE);
    std::fs::write(&path, rendered)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::AllowAllGate;
    use aria_test::MockFetcher;

    const EXIT_AT_ONCE: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "_start")))
    "#;

    fn bridge() -> HostFunctionBridge {
        HostFunctionBridge::new("mcp", Arc::new(AllowAllGate), Arc::new(MockFetcher::new()))
    }

    fn inline(wat: &str) -> ModuleSource {
        ModuleSource::Bytes(Arc::from(wat.as_bytes()))
    }

    #[tokio::test]
    async fn precompiled_module_is_shared() {
        let settings = SandboxSettings::new("mcp", inline(EXIT_AT_ONCE));
        let ctx = SharedExecutionContext::new(settings, bridge()).await.unwrap();
        assert_eq!(ctx.compilations(), 1);
        ctx.module_for_session().await.unwrap();
        ctx.module_for_session().await.unwrap();
        assert_eq!(ctx.compilations(), 1);
    }

    #[tokio::test]
    async fn on_demand_modules_are_per_session() {
        let settings = SandboxSettings::new("mcp", inline(EXIT_AT_ONCE)).with_precompile(false);
        let ctx = SharedExecutionContext::new(settings, bridge()).await.unwrap();
        assert_eq!(ctx.compilations(), 0);
        ctx.module_for_session().await.unwrap();
        ctx.module_for_session().await.unwrap();
        assert_eq!(ctx.compilations(), 2);
    }

    #[tokio::test]
    async fn invalid_module_fails_precompile() {
        let settings = SandboxSettings::new("mcp", inline("(module (func (export"));
        let err = SharedExecutionContext::new(settings, bridge()).await.unwrap_err();
        assert!(matches!(err, SandboxError::Compile(_)));
    }

    #[tokio::test]
    async fn missing_file_fails_precompile() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SandboxSettings::new(
            "mcp",
            ModuleSource::File(dir.path().join("missing.wasm")),
        );
        let err = SharedExecutionContext::new(settings, bridge()).await.unwrap_err();
        assert!(matches!(err, SandboxError::ModuleRead { .. }));
    }

    #[tokio::test]
    async fn cache_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache").join("wasm");
        let settings = SandboxSettings::new("mcp", inline(EXIT_AT_ONCE)).with_cache_dir(&cache);
        SharedExecutionContext::new(settings, bridge()).await.unwrap();
        assert!(cache.join(CACHE_CONFIG_FILE).exists());
    }

    #[tokio::test]
    async fn shutdown_refuses_new_sessions() {
        let settings = SandboxSettings::new("mcp", inline(EXIT_AT_ONCE));
        let ctx = SharedExecutionContext::new(settings, bridge()).await.unwrap();
        ctx.shutdown().await;
        ctx.shutdown().await;
        assert!(ctx.is_shut_down());
        assert!(matches!(
            ctx.module_for_session().await,
            Err(SandboxError::ShutDown)
        ));
    }
}
