//! Mutually authenticated RPC between sites and remote applications.
//!
//! A site registers with an app by sending it a fresh connection record
//! (`cxnId` plus shared secret) in an envelope sealed to the app's certificate
//! key. After that both sides exchange standard envelopes sealed under the
//! shared secret.
//!
//! - [`RegistrationClient`] (site) and [`RegistrationServer`] (app) run the
//!   handshake.
//! - [`ApiClient`] (app) and [`ApiServer`] (site) carry API calls.
//! - [`CxnStore`], [`HttpTransport`] and [`CertificateTrust`] are the
//!   capabilities callers plug in.
//!
//! Nothing here installs a `tracing` subscriber. Without one, log events are
//! discarded.

mod api_client;
mod config;
mod envelope;
mod error;
mod http;
mod locks;
mod message;
mod registration;
pub mod reply;
mod server;
pub mod store;
mod types;
pub mod validate;

pub use api_client::ApiClient;
pub use config::{AppIdentity, ConfigError, SiteConfig};
pub use envelope::{GarbledMessage, GarbledReason, MessageKind};
pub use error::{CxnError, ErrorKind, Result};
pub use http::{HttpRequest, HttpResponse, HttpTransport, TransportError, TransportErrorKind};
pub use message::{
    decode, ApiCall, AppKeys, KeySource, Message, RegistrationMessage, RegistrationPayload,
    StdMessage,
};
pub use registration::{RegistrationClient, ACTION_REGISTER, ACTION_UNREGISTER, CXN_ENTITY};
pub use server::{ApiHandler, ApiServer, RegistrationServer};
pub use store::{CxnStore, MemoryCxnStore, StoreError};
#[cfg(feature = "sqlite")]
pub use store::SqliteCxnStore;
pub use types::{ApiRule, AppMeta, ConnectionRecord, Outcome, Perm};

pub use cxn_trust::{CaPolicy, CertificateTrust, TrustError, X509Trust};

/// MIME type of every envelope body.
pub const MIME_TYPE: &str = "application/x-cxn-rpc";

/// Header carrying [`MIME_TYPE`].
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

pub use envelope::WIRE_VERSION;
