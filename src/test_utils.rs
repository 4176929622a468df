//! In-process doubles and request helpers shared by handler tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, Response},
    Router,
};
use serde_json::Value;

use crate::app::build_app;
use crate::auth::extractors::SESSION_COOKIE;
use crate::auth::jwt::SessionKeys;
use crate::config::{
    AppConfig, BusinessConfig, EmailConfig, EmailTransportConfig, JwtConfig, PaymentConfig,
    ProcessorConfig, S3Config,
};
use crate::email::{Mailer, OutgoingMail};
use crate::payments::{
    dummy::DummyProcessor, webhook::WebhookEvent, CheckoutRequest, PaymentError,
    PaymentProcessor, ProcessorInvoiceRequest, RegisteredInvoice,
};
use crate::state::AppState;
use crate::storage::StorageClient;
use crate::store::MemoryStore;

pub const ADMIN_EMAIL: &str = "owner@builder.test";
pub const WEBHOOK_SECRET: &str = "whsec_test";
const JWT_SECRET: &str = "test-secret";

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: None,
        admin_email: ADMIN_EMAIL.into(),
        public_base_url: "http://localhost:3000".into(),
        jwt: JwtConfig {
            secret: JWT_SECRET.into(),
            issuer: "sitedesk".into(),
            audience: "sitedesk-admin".into(),
            ttl_minutes: 60,
            cookie_secure: false,
        },
        s3: S3Config {
            endpoint: "http://fake.local".into(),
            bucket: "test".into(),
            access_key: "test".into(),
            secret_key: "test".into(),
            region: "us-east-1".into(),
            limit_bytes: 10_000,
        },
        payment: PaymentConfig {
            processor: ProcessorConfig::Dummy,
            webhook_secret: WEBHOOK_SECRET.into(),
            service_fee_basis_points: 350,
        },
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: std::env::temp_dir().to_string_lossy().into_owned(),
            },
            from_email: "office@builder.test".into(),
            from_name: "Builder Office".into(),
        },
        business: BusinessConfig {
            name: "Builder Co".into(),
            address_lines: vec!["1 Main St".into(), "Springfield".into()],
        },
    }
}

/// Object storage that only records what it was asked to do.
#[derive(Default)]
pub struct FakeStorage {
    deleted: Mutex<Vec<String>>,
    sizes: Mutex<HashMap<String, i64>>,
}

impl FakeStorage {
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn set_size(&self, prefix: &str, bytes: i64) {
        self.sizes.lock().unwrap().insert(prefix.to_string(), bytes);
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn presign_put(&self, key: &str, _content_type: &str, seconds: u64) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{key}?op=put&expires={seconds}"))
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{key}?expires={seconds}"))
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().extend(keys.iter().cloned());
        Ok(())
    }

    async fn total_size(&self, prefix: &str) -> anyhow::Result<i64> {
        Ok(self.sizes.lock().unwrap().get(prefix).copied().unwrap_or(0))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail_next: Mutex<bool>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    /// The next send returns an error and records nothing.
    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            anyhow::bail!("smtp unavailable");
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Processor whose every call fails upstream.
pub struct FailingProcessor;

#[async_trait]
impl PaymentProcessor for FailingProcessor {
    async fn register_invoice(&self, _req: &ProcessorInvoiceRequest) -> crate::payments::Result<RegisteredInvoice> {
        Err(PaymentError::ProviderApi("card_declined".into()))
    }

    async fn void_invoice(&self, _id: &str) -> crate::payments::Result<()> {
        Err(PaymentError::ProviderApi("no such invoice".into()))
    }

    async fn create_checkout_session(&self, _req: &CheckoutRequest) -> crate::payments::Result<String> {
        Err(PaymentError::ProviderApi("checkout unavailable".into()))
    }

    async fn validate_webhook(&self, _headers: &HeaderMap, _body: &str) -> crate::payments::Result<WebhookEvent> {
        Err(PaymentError::InvalidSignature("not configured".into()))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<FakeStorage>,
    pub payments: Arc<DummyProcessor>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        let payments = Arc::new(DummyProcessor::new(WEBHOOK_SECRET));
        Self::build(payments.clone(), payments)
    }

    /// `payments` still points at an unused dummy so assertions compile.
    pub fn with_failing_processor() -> Self {
        Self::build(Arc::new(FailingProcessor), Arc::new(DummyProcessor::new(WEBHOOK_SECRET)))
    }

    fn build(active: Arc<dyn PaymentProcessor>, payments: Arc<DummyProcessor>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(FakeStorage::default());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState {
            config: Arc::new(test_config()),
            store: store.clone(),
            storage: storage.clone(),
            payments: active,
            mailer: mailer.clone(),
            db: None,
        };
        Self {
            state,
            store,
            storage,
            payments,
            mailer,
        }
    }

    pub fn router(&self) -> Router {
        build_app(self.state.clone())
    }
}

pub fn cookie_signed_with(secret: &str, is_admin: bool) -> String {
    let mut jwt = test_config().jwt;
    jwt.secret = secret.to_string();
    let token = SessionKeys::new(&jwt).sign(ADMIN_EMAIL, is_admin).unwrap();
    format!("{SESSION_COOKIE}={token}")
}

pub fn admin_cookie() -> String {
    cookie_signed_with(JWT_SECRET, true)
}

pub fn non_admin_cookie() -> String {
    cookie_signed_with(JWT_SECRET, false)
}

pub fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(res: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
