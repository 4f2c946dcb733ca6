use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;

use crate::identity::{AttemptCoordinator, AttemptResult, Identity, IdentityError};
use crate::rpc::{LOGIN_METHOD_GET_IDENTITY, LOGIN_METHOD_SET_ESTABLISHING, RpcError, RpcTransport};
use crate::storage::{ClientState, SharedCacheStore};

use super::types::{ESTABLISHING_KEY, ESTABLISHING_STATE_PREFIX};

/// Client half of the login-method bridge.
///
/// Turns any login method into an identity service: while the establishing
/// flag is set the server answers a successful login with the
/// identity-established error, and the client then fetches the identity
/// signed for that account and completes the pending attempt with it.
///
/// The flag survives a full page transition, so a redirect-based login can be
/// completed on page load with [`LoginMethodClient::on_page_load_login`].
#[derive(Clone)]
pub struct LoginMethodClient {
    transport: Arc<dyn RpcTransport>,
    state: ClientState,
}

impl LoginMethodClient {
    /// Restores the persisted establishing flag and tells the server about it.
    pub async fn new(
        transport: Arc<dyn RpcTransport>,
        cache: SharedCacheStore,
    ) -> Result<Self, IdentityError> {
        let client = Self {
            transport,
            state: ClientState::new(cache, ESTABLISHING_STATE_PREFIX),
        };
        let establishing = client.is_establishing().await?;
        client.notify_server(establishing).await;
        Ok(client)
    }

    pub async fn is_establishing(&self) -> Result<bool, IdentityError> {
        Ok(self
            .state
            .get::<bool>(ESTABLISHING_KEY)
            .await?
            .unwrap_or(false))
    }

    async fn set_establishing(&self, flag: bool) -> Result<(), IdentityError> {
        if self.is_establishing().await? != flag {
            self.notify_server(flag).await;
        }
        self.state.set(ESTABLISHING_KEY, &flag).await?;
        Ok(())
    }

    async fn notify_server(&self, flag: bool) {
        if let Err(e) = self
            .transport
            .call(LOGIN_METHOD_SET_ESTABLISHING, vec![json!(flag)])
            .await
        {
            tracing::error!(error = %e, establishing = flag, "Failed to sync establishing flag");
        }
    }

    /// Run `login` with the establishing flag set and complete the pending
    /// attempt with the identity it establishes.
    ///
    /// `login` must fail: with the identity-established error when the login
    /// succeeded, or with the login's own error otherwise. A login that
    /// returns successfully is a contract violation of the login method named
    /// `login_method`.
    #[tracing::instrument(skip(self, attempts, login))]
    pub async fn establish_with<F>(
        &self,
        attempts: &AttemptCoordinator,
        login_method: &str,
        login: F,
    ) -> Result<AttemptResult, IdentityError>
    where
        F: Future<Output = Result<Value, RpcError>> + Send,
    {
        self.set_establishing(true).await?;
        match login.await {
            Ok(_) => {
                self.set_establishing(false).await?;
                Err(IdentityError::ContractViolation(format!(
                    "{login_method} failed to return an error"
                ))
                .log())
            }
            Err(err) => self.complete_establishing(attempts, err).await,
        }
    }

    /// Complete an establish that went through a full page transition.
    ///
    /// `login_error` is the outcome of the login observed on page load.
    /// Returns `None` when there is nothing to complete.
    pub async fn on_page_load_login(
        &self,
        attempts: &AttemptCoordinator,
        login_error: Option<&RpcError>,
    ) -> Result<Option<AttemptResult>, IdentityError> {
        match login_error {
            Some(err) if err.is_identity_established() && self.is_establishing().await? => self
                .complete_establishing(attempts, err.clone())
                .await
                .map(Some),
            _ => Ok(None),
        }
    }

    async fn complete_establishing(
        &self,
        attempts: &AttemptCoordinator,
        err: RpcError,
    ) -> Result<AttemptResult, IdentityError> {
        self.set_establishing(false).await?;

        let outcome = if err.is_identity_established() {
            self.fetch_identity().await.map(AttemptResult::new)
        } else {
            Err(IdentityError::Rpc(err))
        };

        attempts.fire_attempt_completion(outcome).await?
    }

    async fn fetch_identity(&self) -> Result<Identity, IdentityError> {
        let value = self.transport.call(LOGIN_METHOD_GET_IDENTITY, vec![]).await?;
        let identity: Option<Identity> = serde_json::from_value(value).map_err(|e| {
            IdentityError::InvalidIdentity(format!("malformed established identity: {e}"))
        })?;
        identity.ok_or_else(|| {
            IdentityError::InvalidIdentity("no identity was established".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryCacheStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records calls and answers `_getIdentity` with a fixed identity.
    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl RecordingTransport {
        fn establishing_calls(&self) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(method, _)| method == LOGIN_METHOD_SET_ESTABLISHING)
                .map(|(_, args)| args[0].clone())
                .collect()
        }
    }

    #[async_trait]
    impl RpcTransport for RecordingTransport {
        async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), args));
            match method {
                LOGIN_METHOD_GET_IDENTITY => Ok(json!({
                    "serviceName": "loginMethod",
                    "id": "user-1",
                    "when": 1,
                })),
                _ => Ok(Value::Null),
            }
        }
    }

    #[tokio::test]
    async fn test_new_syncs_persisted_flag() {
        // Given a persisted establishing flag from an earlier page
        let cache = InMemoryCacheStore::shared();
        ClientState::new(cache.clone(), ESTABLISHING_STATE_PREFIX)
            .set(ESTABLISHING_KEY, &true)
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());

        // When the client is constructed
        let client = LoginMethodClient::new(transport.clone(), cache)
            .await
            .unwrap();

        // Then the flag is restored and sent to the server
        assert!(client.is_establishing().await.unwrap());
        assert_eq!(transport.establishing_calls(), vec![json!(true)]);
    }

    #[tokio::test]
    async fn test_set_establishing_notifies_only_on_change() {
        let transport = Arc::new(RecordingTransport::default());
        let client = LoginMethodClient::new(transport.clone(), InMemoryCacheStore::shared())
            .await
            .unwrap();

        client.set_establishing(true).await.unwrap();
        client.set_establishing(true).await.unwrap();
        client.set_establishing(false).await.unwrap();

        assert_eq!(
            transport.establishing_calls(),
            vec![json!(false), json!(true), json!(false)]
        );
    }

    #[tokio::test]
    async fn test_login_that_succeeds_is_contract_violation() {
        let cache = InMemoryCacheStore::shared();
        let client = LoginMethodClient::new(Arc::new(RecordingTransport::default()), cache.clone())
            .await
            .unwrap();
        let attempts = AttemptCoordinator::new(cache);

        let result = client
            .establish_with(&attempts, "loginWithNothing", async {
                Ok::<_, RpcError>(json!({"id": "u"}))
            })
            .await;

        match result {
            Err(IdentityError::ContractViolation(reason)) => {
                assert_eq!(reason, "loginWithNothing failed to return an error");
            }
            other => panic!("expected a contract violation, got {other:?}"),
        }
        assert!(!client.is_establishing().await.unwrap());
    }

    #[tokio::test]
    async fn test_page_load_ignores_other_outcomes() {
        let cache = InMemoryCacheStore::shared();
        let client = LoginMethodClient::new(Arc::new(RecordingTransport::default()), cache.clone())
            .await
            .unwrap();
        let attempts = AttemptCoordinator::new(cache);

        // No login outcome
        assert_eq!(
            client.on_page_load_login(&attempts, None).await.unwrap(),
            None
        );

        // The sentinel, but nothing is being established
        let sentinel = RpcError::identity_established();
        assert_eq!(
            client
                .on_page_load_login(&attempts, Some(&sentinel))
                .await
                .unwrap(),
            None
        );

        // Some other error while establishing
        client.set_establishing(true).await.unwrap();
        let other = RpcError::forbidden("User not found");
        assert_eq!(
            client
                .on_page_load_login(&attempts, Some(&other))
                .await
                .unwrap(),
            None
        );
        assert!(client.is_establishing().await.unwrap());
    }
}
