//! mfehost - micro-frontend host runtime
//!
//! Loads independently built fragments at runtime and wires them to the
//! host over a shared [`fragbus::MessageBus`].
//!
//! # Modules
//!
//! - [`loader`] - asset fetching, script runtime seam, [`ModuleLoader`]
//! - [`host`] - the host orchestrator
//! - [`fragments`] - built-in in-process fragments
//! - [`config`] - YAML configuration
//! - [`cli`] - command-line definitions

pub mod cli;
pub mod config;
pub mod fragments;
pub mod host;
pub mod loader;

pub use config::{Config, FragmentConfig, HostConfig, LoaderConfig};
pub use host::{Host, LoggedMessage};
pub use loader::{
    Asset, AssetCache, AssetFetcher, AssetKind, ExecutionError, FetchError, Fragment, HttpFetcher, LoadError,
    LoadOutcome, LoadRecord, LoadRequest, ModuleLoader, NativeRuntime, ScriptRuntime,
};
