//! Ambient correlation context.
//!
//! Each logical unit of work owns its own slot:
//! - inside [`scope`] / [`with_request_id`], a tokio task-local;
//! - in any other tokio task, an entry keyed by the task id, so tasks
//!   sharing a worker thread never see each other's values;
//! - outside tokio, a thread-local.
//!
//! A task that calls [`set_request_id`] or [`bind_context`] outside a
//! scope must end with [`clear_context`] (or hold a
//! [`RequestContextGuard`]); its entry lives until then.

use crate::trace::SpanIds;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use tokio::task::Id as TaskId;

#[derive(Debug, Clone, Default)]
struct ContextSlot {
    request_id: Option<String>,
    bound: Map<String, Value>,
}

tokio::task_local! {
    static TASK_CONTEXT: RefCell<ContextSlot>;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<ContextSlot> = RefCell::new(ContextSlot::default());
}

static UNSCOPED_TASKS: LazyLock<Mutex<HashMap<TaskId, ContextSlot>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn unscoped_tasks() -> MutexGuard<'static, HashMap<TaskId, ContextSlot>> {
    UNSCOPED_TASKS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot of the ambient context taken at emission time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmbientContext {
    pub request_id: Option<String>,
    /// Fields bound with [`bind_context`].
    pub bound: Map<String, Value>,
    /// Currently open `tracing` span, when the emission happened inside one.
    pub span: Option<SpanIds>,
}

impl AmbientContext {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

fn update(f: impl Fn(&mut ContextSlot)) {
    if TASK_CONTEXT.try_with(|slot| f(&mut slot.borrow_mut())).is_ok() {
        return;
    }
    match tokio::task::try_id() {
        Some(task) => f(unscoped_tasks().entry(task).or_default()),
        None => THREAD_CONTEXT.with(|slot| f(&mut slot.borrow_mut())),
    }
}

fn snapshot() -> ContextSlot {
    if let Ok(slot) = TASK_CONTEXT.try_with(|slot| slot.borrow().clone()) {
        return slot;
    }
    match tokio::task::try_id() {
        Some(task) => unscoped_tasks().get(&task).cloned().unwrap_or_default(),
        None => THREAD_CONTEXT.with(|slot| slot.borrow().clone()),
    }
}

/// Context of the current task or thread, without span information.
pub fn current() -> AmbientContext {
    let slot = snapshot();
    AmbientContext {
        request_id: slot.request_id,
        bound: slot.bound,
        span: None,
    }
}

pub fn set_request_id(request_id: impl Into<String>) {
    let request_id = request_id.into();
    update(|slot| slot.request_id = Some(request_id.clone()));
}

pub fn request_id() -> Option<String> {
    snapshot().request_id
}

/// Bind an extra field that every record emitted from this task carries.
pub fn bind_context(key: impl Into<String>, value: impl Into<Value>) {
    let key = key.into();
    let value = value.into();
    update(|slot| {
        slot.bound.insert(key.clone(), value.clone());
    });
}

pub fn unbind_context(key: &str) {
    update(|slot| {
        slot.bound.remove(key);
    });
}

/// Remove the request id and every bound field.
pub fn clear_context() {
    if TASK_CONTEXT
        .try_with(|slot| *slot.borrow_mut() = ContextSlot::default())
        .is_ok()
    {
        return;
    }
    match tokio::task::try_id() {
        Some(task) => {
            unscoped_tasks().remove(&task);
        }
        None => THREAD_CONTEXT.with(|slot| *slot.borrow_mut() = ContextSlot::default()),
    }
}

/// Run `fut` with a fresh, empty context slot of its own.
pub async fn scope<F: Future>(fut: F) -> F::Output {
    TASK_CONTEXT
        .scope(RefCell::new(ContextSlot::default()), fut)
        .await
}

/// Run `fut` with a fresh context slot whose request id is already set.
pub async fn with_request_id<F: Future>(request_id: impl Into<String>, fut: F) -> F::Output {
    let slot = ContextSlot {
        request_id: Some(request_id.into()),
        bound: Map::new(),
    };
    TASK_CONTEXT.scope(RefCell::new(slot), fut).await
}

/// Clears the context when dropped, including on early return or unwind.
#[must_use = "the context is cleared as soon as the guard is dropped"]
pub struct RequestContextGuard {
    _private: (),
}

impl Drop for RequestContextGuard {
    fn drop(&mut self) {
        clear_context();
    }
}

/// Set the request id for the current task or thread until the guard drops.
pub fn enter_request(request_id: impl Into<String>) -> RequestContextGuard {
    set_request_id(request_id);
    RequestContextGuard { _private: () }
}
