//! Dynamic module loader
//!
//! Fetches fragment assets, executes them through a [`ScriptRuntime`] and
//! remembers which fragments are loaded so each is fetched at most once.

mod cache;
mod core;
mod error;
mod fetch;
mod record;
mod runtime;

pub use cache::AssetCache;
pub use core::{LOADER_SOURCE, ModuleLoader};
pub use error::{ExecutionError, FetchError, LoadError};
pub use fetch::{Asset, AssetFetcher, AssetKind, HttpFetcher};
pub use record::{LoadOutcome, LoadRecord, LoadRequest};
pub use runtime::{Fragment, NativeRuntime, ScriptRuntime};
