//! Module Loader core
//!
//! A load fetches the code artifact, executes it with a fresh
//! [`FragmentHandle`](fragbus::FragmentHandle), then fetches and applies the
//! style artifact. Concurrent loads of the same name share one in-flight
//! future, and the work itself runs on a spawned task so a caller that drops
//! its future never strands the others.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use fragbus::{HostEvent, Registry};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::json;
use tracing::{debug, info, warn};

use super::cache::AssetCache;
use super::error::{ExecutionError, LoadError};
use super::fetch::{AssetFetcher, AssetKind};
use super::record::{LoadOutcome, LoadRecord, LoadRequest};
use super::runtime::ScriptRuntime;
use crate::config::LoaderConfig;

/// Source stamped on events the loader emits
pub const LOADER_SOURCE: &str = "loader";

type InFlight = Shared<BoxFuture<'static, Result<(), LoadError>>>;

struct LoaderInner {
    fetcher: Arc<dyn AssetFetcher>,
    runtime: Arc<dyn ScriptRuntime>,
    registry: Registry,
    cache: AssetCache,
    records: RwLock<HashMap<String, LoadRecord>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    mark_loaded_on_style_failure: bool,
}

/// Loads fragments at most once each
#[derive(Clone)]
pub struct ModuleLoader {
    inner: Arc<LoaderInner>,
}

impl ModuleLoader {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        runtime: Arc<dyn ScriptRuntime>,
        registry: Registry,
        config: &LoaderConfig,
    ) -> Self {
        debug!(
            mark_loaded_on_style_failure = config.mark_loaded_on_style_failure,
            "ModuleLoader::new: called"
        );
        Self {
            inner: Arc::new(LoaderInner {
                fetcher,
                runtime,
                registry,
                cache: AssetCache::new(),
                records: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                mark_loaded_on_style_failure: config.mark_loaded_on_style_failure,
            }),
        }
    }

    /// Load one fragment
    ///
    /// Resolves `Cached` without fetching when the fragment is already loaded
    /// and `Joined` when another caller's load was already running. Must be
    /// called from within a tokio runtime.
    pub async fn load(&self, request: LoadRequest) -> Result<LoadOutcome, LoadError> {
        debug!(name = %request.name, code_url = %request.code_url, "ModuleLoader::load: called");

        let (pending, outcome) = {
            let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

            // cache is marked before the in-flight slot is cleared, so checking
            // both under this lock never misses a finished load
            if self.inner.cache.has(&request.name) {
                debug!(name = %request.name, "ModuleLoader::load: already loaded");
                return Ok(LoadOutcome::Cached);
            }

            match in_flight.get(&request.name) {
                Some(existing) => {
                    debug!(name = %request.name, "ModuleLoader::load: joining in-flight load");
                    (existing.clone(), LoadOutcome::Joined)
                }
                None => {
                    let pending = self.start(request.clone());
                    in_flight.insert(request.name.clone(), pending.clone());
                    (pending, LoadOutcome::Fetched)
                }
            }
        };

        pending.await.map(|()| outcome)
    }

    /// Load several fragments concurrently; results keep input order
    pub async fn load_all(&self, requests: Vec<LoadRequest>) -> Vec<Result<LoadOutcome, LoadError>> {
        debug!(count = requests.len(), "ModuleLoader::load_all: called");
        futures::future::join_all(requests.into_iter().map(|request| self.load(request))).await
    }

    /// Current load record for `name`
    pub fn status(&self, name: &str) -> LoadRecord {
        self.inner
            .records
            .read()
            .ok()
            .and_then(|records| records.get(name).cloned())
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.inner.cache.has(name)
    }

    pub fn cache(&self) -> &AssetCache {
        &self.inner.cache
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Spawn the load task; caller must hold the in-flight lock
    fn start(&self, request: LoadRequest) -> InFlight {
        self.inner.set_record(&request.name, LoadRecord::Loading);

        let inner = self.inner.clone();
        let name = request.name.clone();
        let task = tokio::spawn(async move {
            let result = match AssertUnwindSafe(inner.fetch_and_install(&request)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(LoadError::Aborted {
                    name: request.name.clone(),
                    reason: "load task panicked".to_string(),
                }),
            };
            inner.finish(&request, &result);
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(LoadError::Aborted {
                    name,
                    reason: e.to_string(),
                }),
            }
        }
        .boxed()
        .shared()
    }
}

impl LoaderInner {
    fn set_record(&self, name: &str, record: LoadRecord) {
        debug!(%name, %record, "ModuleLoader: record updated");
        if let Ok(mut records) = self.records.write() {
            records.insert(name.to_string(), record);
        }
    }

    async fn fetch_and_install(&self, request: &LoadRequest) -> Result<(), LoadError> {
        let name = &request.name;
        let code_failure = |reason: String| LoadError::CodeLoadFailure {
            name: name.clone(),
            url: request.code_url.clone(),
            reason,
        };

        let code = self
            .fetcher
            .fetch(&request.code_url, AssetKind::Code)
            .await
            .map_err(|e| code_failure(e.to_string()))?;

        // a fragment that fails or panics in init must leave nothing on the bus
        let handle = self.registry.handle_for(name.clone(), request.capabilities);
        let executed = panic::catch_unwind(AssertUnwindSafe(|| self.runtime.execute(&code, handle.clone())))
            .unwrap_or_else(|payload| Err(ExecutionError::from_panic(name.clone(), payload.as_ref())));
        if let Err(e) = executed {
            let released = handle.release();
            warn!(%name, error = %e, released, "ModuleLoader: code execution failed, handle released");
            return Err(code_failure(e.to_string()));
        }

        // style only after the code is in
        let Some(style_url) = &request.style_url else {
            return Ok(());
        };

        let styled = match self.fetcher.fetch(style_url, AssetKind::Style).await {
            Ok(style) => panic::catch_unwind(AssertUnwindSafe(|| self.runtime.apply_style(name, &style)))
                .unwrap_or_else(|payload| Err(ExecutionError::from_panic(name.clone(), payload.as_ref())))
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match styled {
            Ok(()) => Ok(()),
            Err(reason) => {
                if self.mark_loaded_on_style_failure {
                    warn!(%name, %reason, "ModuleLoader: style failed, keeping fragment loaded");
                    self.cache.mark_loaded(name);
                } else {
                    handle.release();
                }
                Err(LoadError::StyleLoadFailure {
                    name: name.clone(),
                    url: style_url.clone(),
                    reason,
                })
            }
        }
    }

    fn finish(&self, request: &LoadRequest, result: &Result<(), LoadError>) {
        let name = &request.name;
        match result {
            Ok(()) => {
                self.cache.mark_loaded(name);
                self.set_record(name, LoadRecord::Loaded);
            }
            Err(e) if self.cache.has(name) => {
                warn!(%name, error = %e, "ModuleLoader: load finished with error");
                self.set_record(name, LoadRecord::Loaded);
            }
            Err(e) => {
                warn!(%name, error = %e, "ModuleLoader: load failed");
                self.set_record(name, LoadRecord::Failed { reason: e.to_string() });
            }
        }

        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);

        if result.is_ok() {
            info!(%name, "ModuleLoader: fragment loaded");
            self.registry.bus().publish_from(
                HostEvent::MfeLoaded(json!({
                    "name": name,
                    "codeUrl": request.code_url,
                    "styleUrl": request.style_url,
                })),
                LOADER_SOURCE,
            );
        }
    }
}
