//! Provider HTTP session with cassette routing.
//!
//! Every provider owns one [`HttpSession`]. While a cassette is attached,
//! requests are answered from it and unseen requests are recorded (or
//! rejected, in playback mode). Certificate verification can be relaxed for
//! the lifetime of a guard; both overrides are scoped to the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::cassette::{Cassette, CassetteError, RecordedRequest, RecordedResponse};
use crate::config::NetworkConfig;

/// Errors from the provider HTTP session.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error(transparent)]
    Cassette(#[from] CassetteError),
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Network client handed to a provider.
#[derive(Debug)]
pub struct HttpSession {
    strict: reqwest::Client,
    relaxed: reqwest::Client,
    user_agent: String,
    verify_certificates: AtomicBool,
    cassette: Mutex<Option<Arc<Cassette>>>,
}

impl HttpSession {
    /// Builds a session from network configuration.
    ///
    /// # Errors
    /// - `HttpError::ClientBuild` - TLS backend or client setup failed
    pub fn new(config: &NetworkConfig) -> Result<Self, HttpError> {
        let build = |accept_invalid_certs: bool| {
            reqwest::Client::builder()
                .user_agent(config.user_agent.clone())
                .timeout(config.request_timeout)
                .danger_accept_invalid_certs(accept_invalid_certs)
                .build()
                .map_err(|e| HttpError::ClientBuild {
                    reason: e.to_string(),
                })
        };

        Ok(Self {
            strict: build(false)?,
            relaxed: build(true)?,
            user_agent: config.user_agent.clone(),
            verify_certificates: AtomicBool::new(true),
            cassette: Mutex::new(None),
        })
    }

    /// Starts a GET request.
    pub fn get(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Get, url)
    }

    /// Starts a POST request.
    pub fn post(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Post, url)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Whether live requests currently verify TLS certificates.
    pub fn verifies_certificates(&self) -> bool {
        self.verify_certificates.load(Ordering::SeqCst)
    }

    /// Disables certificate verification until the guard is dropped.
    ///
    /// Some indexers serve from hosts with non-standard certificate chains.
    /// The previous setting is restored on every exit path, including panics.
    pub fn relax_certificate_verification(&self) -> VerificationOverride<'_> {
        let previous = self.verify_certificates.swap(false, Ordering::SeqCst);
        VerificationOverride {
            session: self,
            previous,
        }
    }

    /// Routes requests through `cassette` until the guard is dropped.
    pub fn attach_cassette(&self, cassette: Arc<Cassette>) -> CassetteAttachment<'_> {
        let previous = self.cassette.lock().replace(cassette);
        CassetteAttachment {
            session: self,
            previous,
        }
    }

    /// Cassette currently attached, if any.
    pub fn cassette(&self) -> Option<Arc<Cassette>> {
        self.cassette.lock().clone()
    }

    fn live_client(&self) -> &reqwest::Client {
        if self.verifies_certificates() {
            &self.strict
        } else {
            &self.relaxed
        }
    }

    async fn execute(&self, request: RecordedRequest) -> Result<RecordedResponse, HttpError> {
        let Some(cassette) = self.cassette() else {
            return self.send_live(&request).await;
        };

        if let Some(response) = cassette.play(&request) {
            return Ok(response);
        }
        if !cassette.mode().allows_recording() {
            return Err(cassette.no_match(&request).into());
        }

        let response = self.send_live(&request).await?;
        cassette.record(request, response.clone())?;
        Ok(response)
    }

    async fn send_live(&self, request: &RecordedRequest) -> Result<RecordedResponse, HttpError> {
        let method = match request.method.as_str() {
            "POST" => reqwest::Method::POST,
            _ => reqwest::Method::GET,
        };

        let mut builder = self.live_client().request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        tracing::debug!("Live request {} {}", request.method, request.url);

        let response = builder.send().await.map_err(|e| HttpError::Request {
            url: request.url.clone(),
            reason: if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            },
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        // Cassettes store text; non-UTF-8 bytes are replaced.
        let body = response.text().await.map_err(|e| HttpError::Request {
            url: request.url.clone(),
            reason: format!("failed to read body: {e}"),
        })?;

        Ok(RecordedResponse {
            status,
            headers,
            body,
        })
    }
}

/// Restores the previous certificate verification setting on drop.
#[derive(Debug)]
pub struct VerificationOverride<'a> {
    session: &'a HttpSession,
    previous: bool,
}

impl Drop for VerificationOverride<'_> {
    fn drop(&mut self) {
        self.session
            .verify_certificates
            .store(self.previous, Ordering::SeqCst);
    }
}

/// Detaches the cassette (restoring any previous one) on drop.
#[derive(Debug)]
pub struct CassetteAttachment<'a> {
    session: &'a HttpSession,
    previous: Option<Arc<Cassette>>,
}

impl Drop for CassetteAttachment<'_> {
    fn drop(&mut self) {
        *self.session.cassette.lock() = self.previous.take();
    }
}

/// Request under construction.
pub struct RequestBuilder<'a> {
    session: &'a HttpSession,
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: String,
}

impl<'a> RequestBuilder<'a> {
    fn new(session: &'a HttpSession, method: Method, url: &str) -> Self {
        Self {
            session,
            method,
            url: url.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends query parameters, percent-encoded.
    #[must_use]
    pub fn query<K, V>(mut self, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.query.extend(
            params
                .iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())),
        );
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Sets a form-encoded body.
    #[must_use]
    pub fn form<K, V>(mut self, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
            .finish();
        self.headers.push((
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        ));
        self
    }

    /// Sends the request, through the attached cassette if there is one.
    ///
    /// # Errors
    /// - `HttpError::InvalidUrl` - URL does not parse
    /// - `HttpError::Request` - Live request failed
    /// - `HttpError::Cassette` - No stored interaction and recording disabled
    pub async fn send(self) -> Result<HttpResponse, HttpError> {
        let mut url = url::Url::parse(&self.url).map_err(|source| HttpError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }

        let request = RecordedRequest {
            method: self.method.as_str().to_string(),
            url: url.to_string(),
            headers: self.headers,
            body: self.body,
        };
        let url = request.url.clone();
        let response = self.session.execute(request).await?;

        Ok(HttpResponse {
            url,
            status: response.status,
            headers: response.headers,
            body: response.body,
        })
    }
}

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    /// - `HttpError::Decode` - Body is not valid JSON for `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_str(&self.body).map_err(|e| HttpError::Decode {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use axum::Router;
    use axum::http::{HeaderMap, HeaderValue};
    use axum::routing::{get, post};

    use super::*;
    use crate::cassette::{CassetteKey, CassetteKeying, CassetteStore, RecordMode};
    use crate::provider::ProviderId;

    async fn spawn_search_server(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/api/search",
            get(move || {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    r#"{"results":[]}"#
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn session() -> HttpSession {
        HttpSession::new(&NetworkConfig::default()).unwrap()
    }

    fn key() -> CassetteKey {
        CassetteKey::for_provider(&ProviderId::from_name("alpha"))
    }

    #[tokio::test]
    async fn test_extend_mode_records_then_playback_serves_offline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_search_server(Arc::clone(&hits)).await;
        let dir = tempfile::tempdir().unwrap();
        let url = format!("{base}/api/search");

        let recorder = CassetteStore::new(dir.path(), RecordMode::Extend, CassetteKeying::PerProvider);
        let cassette = Arc::new(recorder.open(key()).unwrap());
        let session = session();
        {
            let _attached = session.attach_cassette(Arc::clone(&cassette));
            let response = session
                .get(&url)
                .query(&[("q", "The 100 S07E08")])
                .send()
                .await
                .unwrap();
            assert!(response.is_success());
            assert!(response.url.ends_with("q=The+100+S07E08"));
        }
        assert!(session.cassette().is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(cassette.flush().unwrap());

        let player = CassetteStore::new(dir.path(), RecordMode::Playback, CassetteKeying::PerProvider);
        let replay = Arc::new(player.open(key()).unwrap());
        let _attached = session.attach_cassette(Arc::clone(&replay));
        let response = session
            .get(&url)
            .query(&[("q", "The 100 S07E08")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.body, r#"{"results":[]}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    async fn spawn_login_server(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/login",
            post(move |headers: HeaderMap, body: String| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let header = |name: &str| {
                        headers
                            .get(name)
                            .and_then(|value| value.to_str().ok())
                            .unwrap_or_default()
                            .to_string()
                    };
                    format!("{}|{}|{}", header("user-agent"), header("x-api-key"), body)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_post_bodies_are_part_of_the_match() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_login_server(Arc::clone(&hits)).await;
        let dir = tempfile::tempdir().unwrap();
        let url = format!("{base}/login");
        let session = session();

        let recorder = CassetteStore::new(dir.path(), RecordMode::Extend, CassetteKeying::PerProvider);
        let cassette = Arc::new(recorder.open(key()).unwrap());
        {
            let _attached = session.attach_cassette(Arc::clone(&cassette));
            let response = session
                .post(&url)
                .header("X-Api-Key", "k1")
                .form(&[("username", "alice"), ("password", "s3cret")])
                .send()
                .await
                .unwrap();
            assert_eq!(
                response.text(),
                format!("{}|k1|username=alice&password=s3cret", session.user_agent())
            );
        }
        assert!(cassette.flush().unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let player = CassetteStore::new(dir.path(), RecordMode::Playback, CassetteKeying::PerProvider);
        let replay = Arc::new(player.open(key()).unwrap());
        let _attached = session.attach_cassette(Arc::clone(&replay));

        let replayed = session
            .post(&url)
            .header("X-Api-Key", "k1")
            .form(&[("username", "alice"), ("password", "s3cret")])
            .send()
            .await
            .unwrap();
        assert!(replayed.text().ends_with("|k1|username=alice&password=s3cret"));

        let other_body = session
            .post(&url)
            .form(&[("username", "bob"), ("password", "s3cret")])
            .send()
            .await;
        assert!(matches!(
            other_body,
            Err(HttpError::Cassette(CassetteError::NoMatchingInteraction { .. }))
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_utf8_header_values_are_kept_lossily() {
        let app = Router::new().route(
            "/file",
            get(|| async {
                let mut headers = HeaderMap::new();
                headers.insert("x-filename", HeaderValue::from_bytes(b"caf\xe9").unwrap());
                (headers, "payload")
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let store = CassetteStore::new(dir.path(), RecordMode::Extend, CassetteKeying::PerProvider);
        let cassette = Arc::new(store.open(key()).unwrap());
        let session = session();
        {
            let _attached = session.attach_cassette(Arc::clone(&cassette));
            session.get(&format!("http://{addr}/file")).send().await.unwrap();
        }
        assert!(cassette.flush().unwrap());

        let reloaded = store.open(key()).unwrap();
        let replayed = reloaded
            .play(&RecordedRequest {
                method: "GET".to_string(),
                url: format!("http://{addr}/file"),
                headers: Vec::new(),
                body: String::new(),
            })
            .unwrap();
        assert!(
            replayed
                .headers
                .iter()
                .any(|(name, value)| name == "x-filename" && value == "caf\u{FFFD}")
        );
        assert_eq!(replayed.body, "payload");
    }

    #[tokio::test]
    async fn test_playback_without_match_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = CassetteStore::new(dir.path(), RecordMode::Playback, CassetteKeying::PerProvider);
        let cassette = Arc::new(store.open(key()).unwrap());
        let session = session();
        let _attached = session.attach_cassette(cassette);

        let result = session.get("http://127.0.0.1:9/api/search").send().await;
        assert!(matches!(
            result,
            Err(HttpError::Cassette(CassetteError::NoMatchingInteraction { .. }))
        ));
    }

    #[test]
    fn test_verification_override_restores_previous_setting() {
        let session = session();
        assert!(session.verifies_certificates());
        {
            let _relaxed = session.relax_certificate_verification();
            assert!(!session.verifies_certificates());
            {
                let _nested = session.relax_certificate_verification();
                assert!(!session.verifies_certificates());
            }
            assert!(!session.verifies_certificates());
        }
        assert!(session.verifies_certificates());
    }

    #[test]
    fn test_verification_restored_after_panic() {
        let session = session();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _relaxed = session.relax_certificate_verification();
            panic!("provider blew up");
        }));
        assert!(result.is_err());
        assert!(session.verifies_certificates());
    }

    #[test]
    fn test_invalid_url_is_rejected_before_routing() {
        let session = session();
        let result = tokio_test::block_on(session.get("not a url").send());
        assert!(matches!(result, Err(HttpError::InvalidUrl { .. })));
    }
}
