//! identity_link - signed identity assertions and account linking
//!
//! An identity is a `{serviceName, id}` pair vouched for by a server-side
//! signature. This crate provides:
//! - rotating signing secrets shared through a durable store, and a signer
//!   that produces and verifies identities with them;
//! - a client-side coordinator that runs create/authenticate attempts against
//!   registered identity services and reports their completion;
//! - accounts backed by identities (create, log in, link, unlink);
//! - a bridge that turns any login method into an identity service.

mod accounts;
mod config;
mod context;
mod identity;
mod login_method;
mod rpc;
mod storage;
mod utils;

#[cfg(test)]
mod test_utils;

pub use accounts::{
    Account, AccountStore, AccountStoreError, AccountsError, AccountsIdentityClient,
    AccountsIdentityServer, IDENTITIES_FIELD, IdentityLoginHandler, NewAccount, SqlAccountStore,
};
pub use config::{
    IDENTITY_ADDITIONAL_SECRET, IDENTITY_CONNECTION_STATE_TTL,
    IDENTITY_FORBID_CLIENT_ACCOUNT_CREATION, IDENTITY_MAX_SECRET_AGE, IdentityConfig,
};
pub use context::{IdentityClient, IdentityServer};
pub use identity::{
    AttemptCoordinator, AttemptDispatch, AttemptOutcome, AttemptResult, AuthenticateService,
    CompletionCallback, CreateService, DataStoreSecretStorage, HookStopper, INVOCATION_STATE_PREFIX,
    Identity, IdentityError, IdentityRef, IdentitySigner, InMemorySecretStorage,
    InvocationContext, MethodName, RESERVED_CLAIMS, Secret, SecretStorage, SecretStore,
    ServiceProvider, ServiceRegistry,
};
pub use login_method::{
    ESTABLISHING_STATE_PREFIX, LOGIN_METHOD_SERVICE_NAME, LoginAttempt, LoginMethodClient,
    LoginMethodServer, ValidationOutcome,
};
pub use rpc::local::{LocalConnection, LocalMethod, LocalServer};
pub use rpc::{
    ACCOUNT_NOT_FOUND, ACCOUNTS_IDENTITY_ADD_IDENTITY, ACCOUNTS_IDENTITY_CREATE,
    ACCOUNTS_IDENTITY_GET_IDENTITIES, ACCOUNTS_IDENTITY_REMOVE_IDENTITY, DUPLICATE_ACCOUNT,
    ErrorCode, IDENTITY_ESTABLISHED, IdentityRpcHandlers, LOGIN, LOGIN_METHOD_GET_IDENTITY,
    LOGIN_METHOD_SET_ESTABLISHING, LOGOUT, LoginHandler, NOT_LOGGED_IN, RpcError, RpcSession,
    RpcTransport,
};
pub use storage::{
    CacheData, CacheStore, ClientState, DB_TABLE_PREFIX, DataStore, InMemoryCacheStore,
    PostgresDataStore, RedisCacheStore, SharedCacheStore, SharedDataStore, SqliteDataStore,
    StorageError, cache_store_from_env, data_store_from_env,
};
pub use utils::{UtilError, gen_random_string};
