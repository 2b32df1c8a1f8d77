//! Shared fixtures: a throwaway CA, apps with certificates signed by it, a
//! site, and an in-process transport that routes requests by URL.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use cxn_rpc::{
    ApiCall, ApiHandler, ApiServer, AppIdentity, AppMeta, CaPolicy, ConnectionRecord, CxnStore,
    HttpRequest, HttpResponse, HttpTransport, MemoryCxnStore, Perm, RegistrationClient,
    RegistrationServer, SiteConfig, TransportError, TransportErrorKind,
};
use parking_lot::Mutex;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair,
    PKCS_ECDSA_P256_SHA256,
};
use serde_json::{json, Value};

pub const SITE_URL: &str = "https://site.example.org/civicrm/cxn/api";
pub const APP_ID: &str = "app:org.civicrm.cron";
pub const APP_URL: &str = "https://app/";

// ============================================================================
// PKI
// ============================================================================

pub struct TestCa {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl TestCa {
    pub fn new(name: &str) -> Self {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, name);
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    /// Issue an app certificate and return it with the PKCS#8 key PEM.
    pub fn issue(&self, app_id: &str) -> (String, String) {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut params = CertificateParams::new(vec!["app.example.org".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, app_id);
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert.pem(), key.serialize_pem())
    }
}

// ============================================================================
// Transport
// ============================================================================

type Route = Arc<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// In-process [`HttpTransport`]. Records every request; unknown URLs fail
/// like a refused connection.
#[derive(Default)]
pub struct Loopback {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl Loopback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(
        &self,
        url: &str,
        handler: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    ) {
        self.routes.lock().insert(url.to_string(), Arc::new(handler));
    }

    pub fn unroute(&self, url: &str) {
        self.routes.lock().remove(url);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl HttpTransport for Loopback {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let route = self.routes.lock().get(&request.url).cloned();
        match route {
            Some(handler) => Ok(handler(request)),
            None => Err(TransportError::with_kind(
                format!("connection refused: {}", request.url),
                TransportErrorKind::Connect,
            )),
        }
    }
}

// ============================================================================
// Parties
// ============================================================================

pub fn contact_perm() -> Perm {
    serde_json::from_value(json!({
        "api": [{"entity": "Contact", "action": "get"}],
        "grant": ["view all contacts"]
    }))
    .unwrap()
}

/// An app with a CA-signed certificate, its own store, and a registration
/// endpoint.
pub struct TestApp {
    pub meta: AppMeta,
    pub identity: AppIdentity,
    pub store: Arc<MemoryCxnStore>,
    pub server: Arc<RegistrationServer>,
}

impl TestApp {
    pub fn new(ca: &TestCa) -> Self {
        Self::with_id(ca, APP_ID, APP_URL)
    }

    pub fn with_id(ca: &TestCa, app_id: &str, app_url: &str) -> Self {
        let (cert_pem, key_pem) = ca.issue(app_id);
        let identity = AppIdentity::from_pkcs8_pem(app_id, app_url, &key_pem).unwrap();
        let store = Arc::new(MemoryCxnStore::new());
        let server = Arc::new(RegistrationServer::new(
            identity.clone(),
            store.clone() as Arc<dyn CxnStore>,
        ));
        Self {
            meta: AppMeta {
                app_id: app_id.to_string(),
                app_cert: cert_pem,
                app_url: app_url.to_string(),
                perm: contact_perm(),
            },
            identity,
            store,
            server,
        }
    }

    /// Serve this app's registration endpoint on `transport`.
    pub fn serve(&self, transport: &Loopback) {
        let server = Arc::clone(&self.server);
        transport.route(&self.meta.app_url, move |req| server.handle(&req.body));
    }
}

/// Echoes the call back so tests can see what reached the handler.
pub fn echo_handler() -> Arc<dyn ApiHandler> {
    Arc::new(|cxn: &ConnectionRecord, call: &ApiCall| -> Value {
        cxn_rpc::reply::success(json!({
            "cxn_id": cxn.cxn_id,
            "entity": call.entity,
            "action": call.action,
            "params": call.params,
        }))
    })
}

/// A site: its store, registration client, and API endpoint.
pub struct TestSite {
    pub store: Arc<MemoryCxnStore>,
    pub client: RegistrationClient,
    pub api: Arc<ApiServer>,
}

impl TestSite {
    pub fn new(ca: CaPolicy, transport: Arc<Loopback>) -> Self {
        let store = Arc::new(MemoryCxnStore::new());
        let client = RegistrationClient::new(
            SiteConfig::new(SITE_URL, ca).unwrap(),
            store.clone() as Arc<dyn CxnStore>,
            transport as Arc<dyn HttpTransport>,
        );
        let api = Arc::new(ApiServer::new(
            store.clone() as Arc<dyn CxnStore>,
            echo_handler(),
        ));
        Self { store, client, api }
    }

    pub fn serve(&self, transport: &Loopback) {
        let api = Arc::clone(&self.api);
        transport.route(SITE_URL, move |req| api.handle(&req.body));
    }
}
