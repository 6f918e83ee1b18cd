//! Authentication: the active account, scope sets, the identity provider
//! contract and the credential broker built on top of it.

pub mod account;
pub mod broker;
pub mod error;
pub mod identity;
pub mod logger;
pub mod scope;

pub use account::{Account, AccountStore};
pub use broker::{AuthStatus, CredentialBroker, TokenResult};
pub use error::{AuthError, AuthResult};
pub use identity::{AuthenticationResult, IdentityClient, IdentityError, TerminalIdentity};
pub use logger::{IdentityLogger, LogLevel, TracingLogger};
pub use scope::ScopeSet;
