//! Site ↔ app registration handshake.

mod common;

use std::sync::Arc;

use common::{Loopback, TestApp, TestCa, TestSite, APP_URL, SITE_URL};
use cxn_rpc::{
    decode, reply, AppKeys, CaPolicy, ConnectionRecord, CxnError, CxnStore, ErrorKind,
    HttpResponse, HttpTransport, MemoryCxnStore, Message, MessageKind, Outcome, Perm,
    RegistrationClient, RegistrationMessage, RegistrationPayload, SiteConfig, StdMessage,
    MIME_TYPE,
};
use serde_json::{json, Value};

fn setup() -> (TestCa, TestApp, TestSite, Arc<Loopback>) {
    let ca = TestCa::new("cxn test CA");
    let app = TestApp::new(&ca);
    let transport = Loopback::new();
    app.serve(&transport);
    let site = TestSite::new(CaPolicy::verify(ca.pem()), Arc::clone(&transport));
    (ca, app, site, transport)
}

fn decode_sent_registration(app: &TestApp, body: &[u8]) -> cxn_rpc::RegistrationMessage {
    let keys = AppKeys {
        store: app.store.as_ref(),
        identity: &app.identity,
    };
    match decode(&[MessageKind::Registration], body, &keys).unwrap() {
        Message::Registration(msg) => msg,
        other => panic!("expected registration, got {:?}", other.kind()),
    }
}

/// Hand a registration envelope straight to the app's endpoint and return the
/// decrypted result body.
fn deliver(app: &TestApp, cxn: &ConnectionRecord, entity: &str, action: &str) -> Value {
    let payload = RegistrationPayload {
        cxn: cxn.clone(),
        entity: entity.to_string(),
        action: action.to_string(),
        params: json!({}),
    };
    let body = RegistrationMessage::new(&app.meta.app_id, payload)
        .encode(&app.identity.secret_key().public_key())
        .unwrap();
    let resp = app.server.handle(&body);
    assert_eq!(resp.status, 200);

    let keys = MemoryCxnStore::new();
    keys.add(cxn).unwrap();
    match decode(&[MessageKind::Std], &resp.body, &keys).unwrap() {
        Message::Std(msg) => {
            assert_eq!(msg.cxn_id, cxn.cxn_id);
            msg.data
        }
        other => panic!("expected std, got {:?}", other.kind()),
    }
}

// ============================================================================
// register
// ============================================================================

#[test]
fn register_success() {
    let (_ca, app, site, transport) = setup();

    let outcome = site.client.register(&app.meta).unwrap();
    assert!(outcome.success);

    // One POST to the app, carrying a registration envelope for Cxn.register.
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, APP_URL);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].header("Content-Type"), Some(MIME_TYPE));
    let sent = decode_sent_registration(&app, &requests[0].body);
    assert_eq!(sent.app_id, app.meta.app_id);
    assert_eq!(sent.payload.entity, "Cxn");
    assert_eq!(sent.payload.action, "register");
    assert_eq!(sent.payload.params, json!({}));
    assert_eq!(sent.payload.cxn.cxn_id, outcome.cxn_id);

    // Both sides now hold the same record.
    let site_cxn = site.store.get_by_app_id(&app.meta.app_id).unwrap().unwrap();
    assert_eq!(site_cxn.cxn_id, outcome.cxn_id);
    assert_eq!(site_cxn.site_url, SITE_URL);
    assert_eq!(site_cxn.app_url, APP_URL);
    assert_eq!(site_cxn.perm, app.meta.perm);
    let app_cxn = app.store.get_by_cxn_id(&outcome.cxn_id).unwrap().unwrap();
    assert_eq!(app_cxn, site_cxn);
}

#[test]
fn reregistration_keeps_id_and_secret() {
    let (_ca, mut app, site, transport) = setup();

    let first = site.client.register(&app.meta).unwrap();
    let original = site.store.get_by_cxn_id(&first.cxn_id).unwrap().unwrap();

    app.meta.app_url = "https://app2/".to_string();
    app.meta.perm = Perm::default();
    app.serve(&transport);
    let second = site.client.register(&app.meta).unwrap();

    assert!(second.success);
    assert_eq!(second.cxn_id, first.cxn_id);
    assert_eq!(site.store.get_all().unwrap().len(), 1);
    let refreshed = site.store.get_by_cxn_id(&first.cxn_id).unwrap().unwrap();
    assert_eq!(refreshed.secret, original.secret);
    assert_eq!(refreshed.app_url, "https://app2/");
    assert_eq!(refreshed.perm, Perm::default());
    assert_eq!(transport.requests()[1].url, "https://app2/");

    // The app accepted the refreshed record under the same secret.
    let app_cxn = app.store.get_by_cxn_id(&first.cxn_id).unwrap().unwrap();
    assert_eq!(app_cxn.app_url, "https://app2/");
}

#[test]
fn invalid_metadata_is_rejected_before_anything_happens() {
    let (_ca, mut app, site, transport) = setup();
    app.meta.app_url = "not-a-url".to_string();

    let err = site.client.register(&app.meta).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidMetadata);
    assert!(site.store.is_empty());
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn certificate_from_other_ca_is_rejected() {
    let (_ca, _app, site, transport) = setup();
    let rogue_ca = TestCa::new("rogue CA");
    let rogue = TestApp::new(&rogue_ca);

    let err = site.client.register(&rogue.meta).unwrap_err();
    assert!(matches!(err, CxnError::InvalidCertificate(_)));
    assert!(site.store.is_empty());
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn insecure_mode_skips_certificate_validation() {
    let rogue_ca = TestCa::new("anyone");
    let app = TestApp::new(&rogue_ca);
    let transport = Loopback::new();
    app.serve(&transport);
    let site = TestSite::new(CaPolicy::Insecure, Arc::clone(&transport));

    let outcome = site.client.register(&app.meta).unwrap();
    assert!(outcome.success);
}

#[test]
fn echoed_wrong_connection_is_rejected_and_record_kept() {
    let (_ca, app, site, transport) = setup();

    // Another connection the site knows about.
    let other = ConnectionRecord {
        cxn_id: "cxn:0ther".to_string(),
        secret: cxn_crypto::generate_secret().unwrap(),
        app_id: "app:org.example.other".to_string(),
        app_url: "https://other/".to_string(),
        site_url: SITE_URL.to_string(),
        perm: Perm::default(),
    };
    site.store.add(&other).unwrap();

    // A misbehaving app that answers for the other connection.
    let answer = other.clone();
    transport.route(APP_URL, move |_req| {
        let body = StdMessage::new(&answer.cxn_id, reply::success(json!([])))
            .encode(&answer.secret)
            .unwrap();
        HttpResponse::new(200, body)
    });

    let err = site.client.register(&app.meta).unwrap_err();
    match &err {
        CxnError::WrongConnection { expected, received } => {
            assert_eq!(received, "cxn:0ther");
            assert_ne!(expected, "cxn:0ther");
        }
        other => panic!("expected wrong connection, got {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::InvalidMessage);

    // The record created for this app is still there.
    assert!(site.store.get_by_app_id(&app.meta.app_id).unwrap().is_some());
}

#[test]
fn app_rejection_is_unsuccessful_not_an_error() {
    let (_ca, app, site, transport) = setup();

    // Pre-seed the app with a different secret for the cxnId the site will
    // reuse, so the app refuses the registration.
    site.client.register(&app.meta).unwrap();
    let cxn = site.store.get_by_app_id(&app.meta.app_id).unwrap().unwrap();
    let mut hijacked = cxn.clone();
    hijacked.secret = cxn_crypto::generate_secret().unwrap();
    app.store.add(&hijacked).unwrap();

    let outcome = site.client.register(&app.meta).unwrap();
    assert_eq!(outcome.cxn_id, cxn.cxn_id);
    assert!(!outcome.success);
    assert_eq!(transport.request_count(), 2);
    assert!(site.store.get_by_cxn_id(&cxn.cxn_id).unwrap().is_some());
}

#[test]
fn non_200_status_is_unsuccessful() {
    let (_ca, app, site, transport) = setup();
    let server = Arc::clone(&app.server);
    transport.route(APP_URL, move |req| {
        let mut resp = server.handle(&req.body);
        resp.status = 503;
        resp
    });

    let outcome = site.client.register(&app.meta).unwrap();
    assert!(!outcome.success);
}

#[test]
fn garbled_registration_response_is_an_error() {
    let (_ca, app, site, transport) = setup();
    transport.route(APP_URL, |_req| HttpResponse::new(200, b"<html>oops</html>".to_vec()));

    let err = site.client.register(&app.meta).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GarbledMessage);
    // Persisted before the call, and left for a retry.
    assert!(site.store.get_by_app_id(&app.meta.app_id).unwrap().is_some());
}

#[test]
fn transport_failure_propagates() {
    let (_ca, app, site, transport) = setup();
    transport.unroute(APP_URL);

    let err = site.client.register(&app.meta).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
}

#[test]
fn concurrent_registration_of_one_app_converges() {
    let (_ca, app, site, _transport) = setup();
    let site = Arc::new(site);
    let meta = app.meta.clone();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let site = Arc::clone(&site);
            let meta = meta.clone();
            std::thread::spawn(move || site.client.register(&meta).unwrap())
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(outcomes.iter().all(|o| o.success));
    assert!(outcomes.iter().all(|o| o.cxn_id == outcomes[0].cxn_id));
    assert_eq!(site.store.get_all().unwrap().len(), 1);
    assert_eq!(app.store.get_all().unwrap().len(), 1);
}

#[test]
fn custom_trust_is_consulted() {
    use cxn_rpc::{CertificateTrust, TrustError};

    struct DenyAll;
    impl CertificateTrust for DenyAll {
        fn validate_cert(&self, _cert: &str, _ca: &str) -> cxn_trust::Result<()> {
            Err(TrustError::UntrustedIssuer)
        }
        fn extract_public_key(&self, _cert: &str) -> cxn_trust::Result<cxn_trust::PublicKey> {
            Err(TrustError::UnsupportedKey("denied".into()))
        }
    }

    let ca = TestCa::new("cxn test CA");
    let app = TestApp::new(&ca);
    let transport = Loopback::new();
    let store = Arc::new(cxn_rpc::MemoryCxnStore::new());
    let client = RegistrationClient::new(
        SiteConfig::new(SITE_URL, CaPolicy::verify(ca.pem())).unwrap(),
        store.clone() as Arc<dyn CxnStore>,
        transport.clone() as Arc<dyn HttpTransport>,
    )
    .with_trust(Arc::new(DenyAll));

    let err = client.register(&app.meta).unwrap_err();
    assert!(matches!(err, CxnError::InvalidCertificate(TrustError::UntrustedIssuer)));
    assert!(store.is_empty());
}

#[cfg(feature = "sqlite")]
#[test]
fn sqlite_backed_site_survives_restart() {
    let ca = TestCa::new("cxn test CA");
    let app = TestApp::new(&ca);
    let transport = Loopback::new();
    app.serve(&transport);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.sqlite");
    let config = SiteConfig::new(SITE_URL, CaPolicy::verify(ca.pem())).unwrap();

    let first = {
        let store = Arc::new(cxn_rpc::SqliteCxnStore::open(&path).unwrap());
        let client = RegistrationClient::new(
            config.clone(),
            store as Arc<dyn CxnStore>,
            transport.clone() as Arc<dyn HttpTransport>,
        );
        client.register(&app.meta).unwrap()
    };

    let store = Arc::new(cxn_rpc::SqliteCxnStore::open(&path).unwrap());
    let client = RegistrationClient::new(
        config,
        store.clone() as Arc<dyn CxnStore>,
        transport.clone() as Arc<dyn HttpTransport>,
    );
    let second = client.register(&app.meta).unwrap();
    assert!(second.success);
    assert_eq!(second.cxn_id, first.cxn_id);
}

// ============================================================================
// unregister
// ============================================================================

#[test]
fn unregister_unknown_app_makes_no_call() {
    let (_ca, app, site, transport) = setup();

    assert_eq!(site.client.unregister(&app.meta).unwrap(), None);
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn unregister_removes_both_sides() {
    let (_ca, app, site, transport) = setup();
    let registered = site.client.register(&app.meta).unwrap();

    let outcome = site.client.unregister(&app.meta).unwrap().unwrap();
    assert_eq!(outcome.cxn_id, registered.cxn_id);
    assert!(outcome.success);
    assert!(site.store.is_empty());
    assert!(app.store.is_empty());

    let sent = decode_sent_registration(&app, &transport.requests()[1].body);
    assert_eq!(sent.payload.action, "unregister");
}

#[test]
fn unregister_cleans_up_and_reraises_transport_error() {
    let (_ca, app, site, transport) = setup();
    site.client.register(&app.meta).unwrap();
    transport.unroute(APP_URL);

    let err = site.client.unregister(&app.meta).unwrap_err();
    assert!(matches!(err, CxnError::Transport(ref e) if e.message.contains("connection refused")));
    assert!(site.store.is_empty());
}

#[test]
fn unregister_cleans_up_and_reraises_garbled_response() {
    let (_ca, app, site, transport) = setup();
    site.client.register(&app.meta).unwrap();
    transport.route(APP_URL, |_req| HttpResponse::new(500, b"fatal error".to_vec()));

    let err = site.client.unregister(&app.meta).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GarbledMessage);
    assert!(site.store.is_empty());
}

#[test]
fn unregister_cleans_up_after_certificate_failure() {
    let (_ca, mut app, site, transport) = setup();
    site.client.register(&app.meta).unwrap();

    // The app's certificate is replaced with one the site's CA never issued.
    let rogue_ca = TestCa::new("rogue CA");
    app.meta.app_cert = rogue_ca.issue(&app.meta.app_id).0;

    let err = site.client.unregister(&app.meta).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCertificate);
    assert!(site.store.is_empty());
    assert_eq!(transport.request_count(), 1);
}

#[test]
fn unregister_cleans_up_when_app_answers_with_error() {
    let (_ca, app, site, transport) = setup();
    site.client.register(&app.meta).unwrap();
    let rec = site.store.get_by_app_id(&app.meta.app_id).unwrap().unwrap();

    let answer = rec.clone();
    transport.route(APP_URL, move |_req| {
        let body = StdMessage::new(&answer.cxn_id, reply::error("Not today"))
            .encode(&answer.secret)
            .unwrap();
        HttpResponse::new(200, body)
    });

    let outcome = site.client.unregister(&app.meta).unwrap();
    assert_eq!(
        outcome,
        Some(Outcome {
            cxn_id: rec.cxn_id.clone(),
            success: false,
        })
    );
    assert!(site.store.is_empty());
    assert!(app.store.get_by_cxn_id(&rec.cxn_id).unwrap().is_some());
}

#[test]
fn unregister_cleans_up_on_non_200_status() {
    let (_ca, app, site, transport) = setup();
    site.client.register(&app.meta).unwrap();
    let server = Arc::clone(&app.server);
    transport.route(APP_URL, move |req| {
        let mut resp = server.handle(&req.body);
        resp.status = 503;
        resp
    });

    let outcome = site.client.unregister(&app.meta).unwrap().unwrap();
    assert!(!outcome.success);
    assert!(site.store.is_empty());
}

// ============================================================================
// RegistrationServer
// ============================================================================

fn registered() -> (TestApp, ConnectionRecord) {
    let (_ca, app, site, _transport) = setup();
    site.client.register(&app.meta).unwrap();
    let cxn = app.store.get_by_app_id(&app.meta.app_id).unwrap().unwrap();
    (app, cxn)
}

#[test]
fn server_refuses_record_for_another_app() {
    let (app, cxn) = registered();
    let before = app.store.get_all().unwrap();

    let mut other = cxn.clone();
    other.cxn_id = cxn_rpc::validate::new_cxn_id();
    other.app_id = "app:org.example.other".to_string();

    let result = deliver(&app, &other, "Cxn", "register");
    assert_eq!(result["is_error"], 1);
    assert!(reply::error_message(&result)
        .unwrap()
        .contains("different app"));
    assert_eq!(app.store.get_all().unwrap(), before);
}

#[test]
fn server_refuses_unsupported_entity() {
    let (app, cxn) = registered();
    let before = app.store.get_all().unwrap();

    let result = deliver(&app, &cxn, "Contact", "unregister");
    assert_eq!(result["is_error"], 1);
    assert_eq!(
        reply::error_message(&result),
        Some("Unsupported entity Contact")
    );
    assert_eq!(app.store.get_all().unwrap(), before);
}

#[test]
fn server_refuses_unsupported_action() {
    let (app, cxn) = registered();
    let before = app.store.get_all().unwrap();

    let result = deliver(&app, &cxn, "Cxn", "delete");
    assert_eq!(result["is_error"], 1);
    assert_eq!(reply::error_message(&result), Some("Unsupported action delete"));
    assert_eq!(app.store.get_all().unwrap(), before);
}

#[test]
fn server_refuses_unregister_with_different_secret() {
    let (app, cxn) = registered();

    let mut impostor = cxn.clone();
    impostor.secret = cxn_crypto::generate_secret().unwrap();

    let result = deliver(&app, &impostor, "Cxn", "unregister");
    assert_eq!(result["is_error"], 1);
    let kept = app.store.get_by_cxn_id(&cxn.cxn_id).unwrap().unwrap();
    assert_eq!(kept.secret, cxn.secret);

    let result = deliver(&app, &cxn, "Cxn", "unregister");
    assert!(reply::is_ok(&result));
    assert!(app.store.is_empty());
}
