//! Built-in in-process fragments
//!
//! `user-list` is the reference fragment: it follows the theme, shows host
//! messages and asks the host for the user directory when it starts.

use std::sync::{Arc, Mutex, PoisonError};

use fragbus::events::kind;
use fragbus::{DataResponse, FragmentHandle, HostEvent, HostMessage, RequestData};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::loader::{Fragment, NativeRuntime};

pub const USER_LIST: &str = "user-list";

/// What the user list fragment currently shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserListView {
    pub theme: Option<String>,
    pub user_name: Option<String>,
    pub users: Vec<String>,
    pub host_messages: Vec<String>,
    pub pending_request: Option<String>,
}

/// Fragment listing the host's users
#[derive(Clone, Default)]
pub struct UserListFragment {
    view: Arc<Mutex<UserListView>>,
}

impl UserListFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> UserListView {
        self.view.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Fragment for UserListFragment {
    fn init(&self, handle: FragmentHandle) -> eyre::Result<()> {
        debug!(fragment = %handle.fragment(), "UserListFragment::init: called");

        let view = self.view.clone();
        handle.subscribe_state(move |snapshot| {
            let mut view = view.lock().unwrap_or_else(PoisonError::into_inner);
            view.theme = snapshot.get("theme").and_then(Value::as_str).map(str::to_string);
            view.user_name = snapshot
                .get("userInfo")
                .and_then(|u| u.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(())
        })?;

        let view = self.view.clone();
        handle.on(kind::HOST_MESSAGE, move |envelope| {
            let message: HostMessage = envelope.decode()?.payload;
            view.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .host_messages
                .push(message.message);
            Ok(())
        })?;

        let view = self.view.clone();
        handle.on(kind::DATA_RESPONSE, move |envelope| {
            let response: DataResponse = envelope.decode()?.payload;
            let mut view = view.lock().unwrap_or_else(PoisonError::into_inner);
            if view.pending_request.as_deref() != Some(response.request_id.as_str()) {
                return Ok(());
            }
            view.pending_request = None;
            view.users = response.data["users"]
                .as_array()
                .map(|users| {
                    users
                        .iter()
                        .filter_map(|u| u["name"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            Ok(())
        })?;

        let request_id = Uuid::now_v7().to_string();
        self.view.lock().unwrap_or_else(PoisonError::into_inner).pending_request = Some(request_id.clone());
        handle.publish(HostEvent::RequestData(RequestData { request_id }))?;
        Ok(())
    }
}

/// Register every built-in fragment; returns the user list for inspection
pub fn register_builtins(runtime: &NativeRuntime) -> UserListFragment {
    let user_list = UserListFragment::new();
    runtime.register(USER_LIST, user_list.clone());
    user_list
}
