//! Script runtime seam
//!
//! Executing a fragment's code artifact is delegated to a [`ScriptRuntime`].
//! [`NativeRuntime`] treats the artifact as opaque source and hands control to
//! an in-process [`Fragment`] entry point registered under the fragment name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use fragbus::FragmentHandle;
use tracing::{debug, info};

use super::error::ExecutionError;
use super::fetch::Asset;

/// Initialization entry point of an in-process fragment
pub trait Fragment: Send + Sync {
    fn init(&self, handle: FragmentHandle) -> eyre::Result<()>;
}

impl<F> Fragment for F
where
    F: Fn(FragmentHandle) -> eyre::Result<()> + Send + Sync,
{
    fn init(&self, handle: FragmentHandle) -> eyre::Result<()> {
        self(handle)
    }
}

/// Runs fetched code and installs fetched styles
pub trait ScriptRuntime: Send + Sync {
    /// Execute the code artifact; `handle` is the fragment's only way onto the bus
    fn execute(&self, code: &Asset, handle: FragmentHandle) -> Result<(), ExecutionError>;

    fn apply_style(&self, fragment: &str, style: &Asset) -> Result<(), ExecutionError>;
}

/// Runtime dispatching to registered Rust entry points
#[derive(Default)]
pub struct NativeRuntime {
    entry_points: RwLock<HashMap<String, Arc<dyn Fragment>>>,
    executed: RwLock<Vec<String>>,
    styles: RwLock<HashMap<String, String>>,
}

impl NativeRuntime {
    pub fn new() -> Self {
        debug!("NativeRuntime::new: called");
        Self::default()
    }

    /// Register the entry point run when code for `name` executes
    pub fn register(&self, name: impl Into<String>, fragment: impl Fragment + 'static) {
        let name = name.into();
        debug!(%name, "NativeRuntime::register: called");
        if let Ok(mut entry_points) = self.entry_points.write() {
            entry_points.insert(name, Arc::new(fragment));
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entry_points
            .read()
            .map(|e| e.contains_key(name))
            .unwrap_or(false)
    }

    /// Fragment names whose code ran, in execution order
    pub fn executed(&self) -> Vec<String> {
        self.executed.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Installed stylesheet text for `name`
    pub fn style_for(&self, name: &str) -> Option<String> {
        self.styles.read().ok().and_then(|s| s.get(name).cloned())
    }

    fn parse(asset: &Asset) -> Result<&str, ExecutionError> {
        if asset.is_empty() {
            return Err(ExecutionError::Empty { url: asset.url.clone() });
        }
        std::str::from_utf8(&asset.body).map_err(|_| ExecutionError::NotUtf8 { url: asset.url.clone() })
    }
}

impl ScriptRuntime for NativeRuntime {
    fn execute(&self, code: &Asset, handle: FragmentHandle) -> Result<(), ExecutionError> {
        let fragment = handle.fragment().to_string();
        debug!(%fragment, url = %code.url, "NativeRuntime::execute: called");
        Self::parse(code)?;

        let entry_point = self.entry_points.read().ok().and_then(|e| e.get(&fragment).cloned());
        match entry_point {
            Some(entry_point) => {
                entry_point.init(handle).map_err(|e| ExecutionError::Init {
                    fragment: fragment.clone(),
                    message: e.to_string(),
                })?;
                info!(%fragment, "NativeRuntime::execute: fragment initialized");
            }
            None => debug!(%fragment, "NativeRuntime::execute: no entry point registered"),
        }

        if let Ok(mut executed) = self.executed.write() {
            executed.push(fragment);
        }
        Ok(())
    }

    fn apply_style(&self, fragment: &str, style: &Asset) -> Result<(), ExecutionError> {
        debug!(%fragment, url = %style.url, "NativeRuntime::apply_style: called");
        let text = Self::parse(style)?;
        if let Ok(mut styles) = self.styles.write() {
            styles.insert(fragment.to_string(), text.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fetch::AssetKind;
    use fragbus::{Capabilities, MessageBus, Registry};
    use serde_json::json;

    fn handle(name: &str) -> (Registry, FragmentHandle) {
        let registry = Registry::new(MessageBus::shared());
        let handle = registry.handle_for(name, Capabilities::full());
        (registry, handle)
    }

    #[test]
    fn test_execute_runs_registered_entry_point() {
        let runtime = NativeRuntime::new();
        runtime.register("panel", |handle: FragmentHandle| -> eyre::Result<()> {
            handle.set_state("panelReady", json!(true))?;
            Ok(())
        });
        let (registry, handle) = handle("panel");

        let code = Asset::new("https://x/main.js", AssetKind::Code, "export default 1;");
        runtime.execute(&code, handle).unwrap();

        assert_eq!(registry.bus().state_value("panelReady"), Some(json!(true)));
        assert_eq!(runtime.executed(), vec!["panel"]);
    }

    #[test]
    fn test_execute_without_entry_point_succeeds() {
        let runtime = NativeRuntime::new();
        let (_registry, handle) = handle("unknown");
        let code = Asset::new("https://x/main.js", AssetKind::Code, "noop");
        assert!(runtime.execute(&code, handle).is_ok());
        assert!(!runtime.is_registered("unknown"));
    }

    #[test]
    fn test_execute_rejects_empty_and_binary() {
        let runtime = NativeRuntime::new();
        let (_registry, handle) = handle("panel");

        let empty = Asset::new("https://x/empty.js", AssetKind::Code, Vec::<u8>::new());
        assert!(matches!(
            runtime.execute(&empty, handle.clone()),
            Err(ExecutionError::Empty { .. })
        ));

        let binary = Asset::new("https://x/bin.js", AssetKind::Code, vec![0xffu8, 0xfe, 0x00]);
        assert!(matches!(runtime.execute(&binary, handle), Err(ExecutionError::NotUtf8 { .. })));
        assert!(runtime.executed().is_empty());
    }

    #[test]
    fn test_init_failure_maps_to_execution_error() {
        let runtime = NativeRuntime::new();
        runtime.register("panel", |_handle: FragmentHandle| -> eyre::Result<()> {
            Err(eyre::eyre!("missing element"))
        });
        let (_registry, handle) = handle("panel");

        let code = Asset::new("https://x/main.js", AssetKind::Code, "init()");
        let err = runtime.execute(&code, handle).unwrap_err();
        assert!(err.to_string().contains("missing element"));
    }

    #[test]
    fn test_apply_style_records_text() {
        let runtime = NativeRuntime::new();
        let style = Asset::new("https://x/styles.css", AssetKind::Style, ".panel { color: red; }");
        runtime.apply_style("panel", &style).unwrap();
        assert_eq!(runtime.style_for("panel").as_deref(), Some(".panel { color: red; }"));
    }
}
