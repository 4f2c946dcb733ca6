use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::storage::{ClientState, SharedCacheStore};

use super::errors::IdentityError;
use super::registry::{ServiceProvider, ServiceRegistry};
use super::types::Identity;

/// Cache prefix of the persisted invocation context.
pub const INVOCATION_STATE_PREFIX: &str = "identity_ctx";
const INVOCATION_KEY: &str = "invocation.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MethodName {
    Create,
    Authenticate,
}

/// The most recent create/authenticate call whose completion has not fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    pub service_name: String,
    pub method_name: MethodName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_state: Option<Value>,
}

/// What a provider reports on success. `method_name` and `client_state` are
/// filled from the invocation context when the provider leaves them empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<MethodName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_state: Option<Value>,
}

impl AttemptResult {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            method_name: None,
            client_state: None,
        }
    }
}

pub type AttemptOutcome = Result<AttemptResult, IdentityError>;

/// One-shot callback passed to `create`/`authenticate`. It lives in memory
/// only and does not survive a reload.
pub type CompletionCallback = Box<dyn FnOnce(&AttemptOutcome) + Send>;

type CompletionHook = Arc<dyn Fn(&AttemptOutcome) + Send + Sync>;

/// Return value of `create`/`authenticate`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptDispatch {
    /// The service cannot perform the requested method. Nothing was recorded.
    Unsupported,
    /// Whatever the provider returned to its immediate caller.
    Delegated(Value),
}

impl AttemptDispatch {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }
}

#[derive(Default)]
struct Hooks {
    next_id: u64,
    entries: Vec<(u64, CompletionHook)>,
}

/// Deregisters a completion hook.
pub struct HookStopper {
    id: u64,
    hooks: Weak<Mutex<Hooks>>,
}

impl HookStopper {
    pub fn stop(&self) {
        if let Some(hooks) = self.hooks.upgrade() {
            lock(&hooks).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client-side entry point for identity attempts.
///
/// Holds the registered providers, the single persisted invocation slot, the
/// pending one-shot callback and the completion hooks. At most one attempt is
/// in flight per coordinator; starting another replaces the pending one.
#[derive(Clone)]
pub struct AttemptCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    services: ServiceRegistry<ServiceProvider>,
    state: ClientState,
    callback: Mutex<Option<CompletionCallback>>,
    hooks: Arc<Mutex<Hooks>>,
}

impl AttemptCoordinator {
    pub fn new(cache: SharedCacheStore) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                services: ServiceRegistry::new(),
                state: ClientState::new(cache, INVOCATION_STATE_PREFIX),
                callback: Mutex::new(None),
                hooks: Arc::new(Mutex::new(Hooks::default())),
            }),
        }
    }

    pub fn register_service(
        &self,
        name: &str,
        provider: ServiceProvider,
    ) -> Result<(), IdentityError> {
        self.inner.services.register(name, provider)
    }

    pub fn services(&self) -> &ServiceRegistry<ServiceProvider> {
        &self.inner.services
    }

    /// Start a create attempt. Returns `Unsupported` without side effects when
    /// the service cannot create.
    #[tracing::instrument(skip(self, options, callback))]
    pub async fn create(
        &self,
        service_name: &str,
        options: Value,
        callback: Option<CompletionCallback>,
    ) -> Result<AttemptDispatch, IdentityError> {
        let ServiceProvider::WithCreate(service) = self.inner.services.lookup(service_name)? else {
            tracing::debug!("Service does not support create");
            return Ok(AttemptDispatch::Unsupported);
        };

        self.begin(service_name, MethodName::Create, &options, callback)
            .await?;
        Ok(AttemptDispatch::Delegated(
            service.create(self, options).await?,
        ))
    }

    #[tracing::instrument(skip(self, options, callback))]
    pub async fn authenticate(
        &self,
        service_name: &str,
        options: Value,
        callback: Option<CompletionCallback>,
    ) -> Result<AttemptDispatch, IdentityError> {
        let provider = self.inner.services.lookup(service_name)?;

        self.begin(service_name, MethodName::Authenticate, &options, callback)
            .await?;
        Ok(AttemptDispatch::Delegated(
            provider.authenticate(self, options).await?,
        ))
    }

    async fn begin(
        &self,
        service_name: &str,
        method_name: MethodName,
        options: &Value,
        callback: Option<CompletionCallback>,
    ) -> Result<(), IdentityError> {
        let context = InvocationContext {
            service_name: service_name.to_string(),
            method_name,
            client_state: options.get("clientState").cloned(),
        };
        self.inner.state.set(INVOCATION_KEY, &context).await?;
        *lock(&self.inner.callback) = callback;
        Ok(())
    }

    /// The pending invocation, if any.
    pub async fn pending_invocation(&self) -> Result<Option<InvocationContext>, IdentityError> {
        Ok(self.inner.state.get(INVOCATION_KEY).await?)
    }

    /// Register a hook called on every completion. Hooks run in registration
    /// order, before the one-shot callback.
    pub fn on_attempt_completion(
        &self,
        hook: impl Fn(&AttemptOutcome) + Send + Sync + 'static,
    ) -> HookStopper {
        let mut hooks = lock(&self.inner.hooks);
        let id = hooks.next_id;
        hooks.next_id += 1;
        hooks.entries.push((id, Arc::new(hook)));
        HookStopper {
            id,
            hooks: Arc::downgrade(&self.inner.hooks),
        }
    }

    /// Complete the pending attempt.
    ///
    /// Fails with `ContractViolation` when no attempt is pending, or when a
    /// successful result lacks a service name or method name after merging in
    /// the invocation context. A malformed result leaves the attempt pending.
    /// Returns the outcome that was delivered to the hooks and callback.
    pub async fn fire_attempt_completion(
        &self,
        outcome: AttemptOutcome,
    ) -> Result<AttemptOutcome, IdentityError> {
        let Some(context) = self.pending_invocation().await? else {
            return Err(IdentityError::ContractViolation(
                "attempt completion fired without a pending create or authenticate".to_string(),
            )
            .log());
        };

        let outcome = match outcome {
            Ok(result) => Ok(merge_context(result, &context)?),
            Err(e) => Err(e),
        };

        self.inner.state.remove(INVOCATION_KEY).await?;
        let callback = lock(&self.inner.callback).take();

        tracing::debug!(
            service_name = %context.service_name,
            method_name = ?context.method_name,
            success = outcome.is_ok(),
            "Attempt completed"
        );

        let hooks: Vec<CompletionHook> = lock(&self.inner.hooks)
            .entries
            .iter()
            .map(|(_, hook)| hook.clone())
            .collect();
        for hook in hooks {
            hook(&outcome);
        }
        if let Some(callback) = callback {
            callback(&outcome);
        }

        Ok(outcome)
    }
}

fn merge_context(
    mut result: AttemptResult,
    context: &InvocationContext,
) -> Result<AttemptResult, IdentityError> {
    if result.method_name.is_none() {
        result.method_name = Some(context.method_name);
    }
    if result.client_state.is_none() {
        result.client_state = context.client_state.clone();
    }
    if result.identity.service_name.is_empty() {
        return Err(IdentityError::ContractViolation(
            "attempt result identity has no serviceName".to_string(),
        )
        .log());
    }
    Ok(result)
}
