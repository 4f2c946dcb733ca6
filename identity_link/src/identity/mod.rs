//! Identity assertions: the signed value type, the rotating secret store, the
//! signer/verifier, the service registry and the client-side attempt
//! coordinator.

mod attempt;
mod errors;
mod registry;
mod secrets;
mod signer;
mod types;

pub use attempt::{
    AttemptCoordinator, AttemptDispatch, AttemptOutcome, AttemptResult, CompletionCallback,
    HookStopper, INVOCATION_STATE_PREFIX, InvocationContext, MethodName,
};
pub use errors::IdentityError;
pub use registry::{AuthenticateService, CreateService, ServiceProvider, ServiceRegistry};
pub use secrets::{
    DataStoreSecretStorage, InMemorySecretStorage, Secret, SecretStorage, SecretStore,
};
pub use signer::IdentitySigner;
pub use types::{Identity, IdentityRef, RESERVED_CLAIMS};
