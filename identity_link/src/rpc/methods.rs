//! Names of the remote procedures exposed by the identity server.

pub const ACCOUNTS_IDENTITY_CREATE: &str = "Accounts.identity.create";
pub const ACCOUNTS_IDENTITY_ADD_IDENTITY: &str = "Accounts.identity.addIdentity";
pub const ACCOUNTS_IDENTITY_REMOVE_IDENTITY: &str = "Accounts.identity.removeIdentity";
pub const ACCOUNTS_IDENTITY_GET_IDENTITIES: &str = "Accounts.identity.getIdentities";

pub const LOGIN_METHOD_SET_ESTABLISHING: &str = "Identity.loginMethod._setEstablishing";
pub const LOGIN_METHOD_GET_IDENTITY: &str = "Identity.loginMethod._getIdentity";

pub const LOGIN: &str = "login";
pub const LOGOUT: &str = "logout";
