mod storage;
mod store;
mod types;

pub use storage::{DataStoreSecretStorage, InMemorySecretStorage, SecretStorage};
pub use store::SecretStore;
pub use types::Secret;
