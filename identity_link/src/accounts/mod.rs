//! Accounts backed by identities: create an account from a verified identity,
//! log in with one, and link or unlink further identities.

mod client;
mod errors;
mod server;
mod storage;
mod types;

pub use client::AccountsIdentityClient;
pub use errors::{AccountStoreError, AccountsError, IDENTITIES_FIELD};
pub use server::{AccountsIdentityServer, IdentityLoginHandler};
pub use storage::{AccountStore, SqlAccountStore};
pub use types::{Account, NewAccount};
