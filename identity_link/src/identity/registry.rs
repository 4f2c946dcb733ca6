use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::attempt::AttemptCoordinator;
use super::errors::IdentityError;

/// A client-side identity provider that can authenticate an existing principal.
///
/// Providers report the outcome through
/// [`AttemptCoordinator::fire_attempt_completion`]; the returned value is only
/// what the provider chooses to hand back to the immediate caller.
#[async_trait]
pub trait AuthenticateService: Send + Sync {
    async fn authenticate(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError>;
}

/// A provider that can also create a new principal.
#[async_trait]
pub trait CreateService: AuthenticateService {
    async fn create(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError>;
}

/// A registered provider, tagged with its capabilities.
#[derive(Clone)]
pub enum ServiceProvider {
    AuthenticateOnly(Arc<dyn AuthenticateService>),
    WithCreate(Arc<dyn CreateService>),
}

impl ServiceProvider {
    pub fn supports_create(&self) -> bool {
        matches!(self, Self::WithCreate(_))
    }

    pub(crate) async fn authenticate(
        &self,
        attempts: &AttemptCoordinator,
        options: Value,
    ) -> Result<Value, IdentityError> {
        match self {
            Self::AuthenticateOnly(service) => service.authenticate(attempts, options).await,
            Self::WithCreate(service) => service.authenticate(attempts, options).await,
        }
    }
}

/// Services by name. Registration is expected at startup; names are unique and
/// entries are never removed.
pub struct ServiceRegistry<S> {
    services: RwLock<HashMap<String, S>>,
}

impl<S: Clone> ServiceRegistry<S> {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: &str, service: S) -> Result<(), IdentityError> {
        let mut services = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(name) {
            return Err(IdentityError::ServiceAlreadyRegistered(name.to_string()));
        }
        services.insert(name.to_string(), service);
        tracing::debug!(service_name = %name, "Registered identity service");
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<S, IdentityError> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| IdentityError::ServiceNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl<S: Clone> Default for ServiceRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
