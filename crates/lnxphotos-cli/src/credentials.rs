//! Credential and MFA providers
//!
//! Adapter implementations of the core's `ICredentialProvider` and
//! `IMfaProvider` ports:
//!
//! - [`ParameterProvider`] - the `--password` argument
//! - [`KeyringProvider`] - OS credential store, with write-back after a
//!   successful interactive login
//! - [`ConsoleProvider`] - interactive terminal prompts
//! - [`WebUiProvider`] - a one-shot local HTTP form for headless boxes the
//!   user can reach over the network

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use lnxphotos_core::domain::Username;
use lnxphotos_core::error::SyncError;
use lnxphotos_core::ports::{ICredentialProvider, IMfaProvider};

/// Keyring service name under which passwords are stored.
const KEYRING_SERVICE: &str = "lnxphotos";

// ============================================================================
// ParameterProvider
// ============================================================================

/// Supplies the password given on the command line, if any.
pub struct ParameterProvider {
    password: Option<String>,
}

impl ParameterProvider {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

#[async_trait::async_trait]
impl ICredentialProvider for ParameterProvider {
    fn name(&self) -> &'static str {
        "parameter"
    }

    async fn password(&self, _username: &Username) -> Result<Option<String>, SyncError> {
        Ok(self.password.clone())
    }
}

// ============================================================================
// KeyringProvider
// ============================================================================

/// Reads and writes the password in the OS keyring (Secret Service on
/// Linux). A missing entry is not an error; it just means another provider
/// gets its turn.
pub struct KeyringProvider;

impl KeyringProvider {
    fn entry(username: &Username) -> Result<keyring::Entry, SyncError> {
        keyring::Entry::new(KEYRING_SERVICE, username.as_str())
            .map_err(|e| SyncError::Unexpected(format!("keyring entry: {e}")))
    }
}

#[async_trait::async_trait]
impl ICredentialProvider for KeyringProvider {
    fn name(&self) -> &'static str {
        "keyring"
    }

    async fn password(&self, username: &Username) -> Result<Option<String>, SyncError> {
        let username = username.clone();
        tokio::task::spawn_blocking(move || {
            let entry = Self::entry(&username)?;
            match entry.get_password() {
                Ok(password) => Ok(Some(password)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(err) => {
                    warn!(error = %err, "Keyring lookup failed");
                    Ok(None)
                }
            }
        })
        .await
        .map_err(|e| SyncError::Unexpected(format!("keyring task: {e}")))?
    }

    async fn remember(&self, username: &Username, password: &str) -> Result<(), SyncError> {
        let username = username.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = Self::entry(&username)?;
            entry
                .set_password(&password)
                .map_err(|e| SyncError::Unexpected(format!("keyring store: {e}")))?;
            debug!(%username, "Stored password in keyring");
            Ok(())
        })
        .await
        .map_err(|e| SyncError::Unexpected(format!("keyring task: {e}")))?
    }
}

// ============================================================================
// ConsoleProvider
// ============================================================================

/// Interactive terminal prompts for password and MFA code.
pub struct ConsoleProvider;

#[async_trait::async_trait]
impl ICredentialProvider for ConsoleProvider {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn password(&self, username: &Username) -> Result<Option<String>, SyncError> {
        let prompt = format!("iCloud password for {username}: ");
        let password = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
            .await
            .map_err(|e| SyncError::Unexpected(format!("prompt task: {e}")))?
            .map_err(|e| SyncError::AuthFailed {
                reason: format!("password prompt failed: {e}"),
            })?;

        if password.is_empty() {
            Ok(None)
        } else {
            Ok(Some(password))
        }
    }
}

#[async_trait::async_trait]
impl IMfaProvider for ConsoleProvider {
    async fn code(&self, username: &Username) -> Result<String, SyncError> {
        let prompt = format!("Two-factor code for {username}: ");
        let code = tokio::task::spawn_blocking(move || {
            use std::io::Write;
            print!("{prompt}");
            std::io::stdout().flush().ok();
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .map(|_| line.trim().to_string())
        })
        .await
        .map_err(|e| SyncError::Unexpected(format!("prompt task: {e}")))?
        .map_err(|e| SyncError::MfaFailed(format!("code prompt failed: {e}")))?;

        if code.is_empty() {
            Err(SyncError::MfaRequired)
        } else {
            Ok(code)
        }
    }
}

// ============================================================================
// WebUiProvider
// ============================================================================

/// Port the web UI listens on.
const WEBUI_PORT: u16 = 8475;

/// Serves a minimal local web form and waits for a single submission.
/// Implements both the password and the MFA port, so a headless machine
/// needs the browser only once per prompt.
pub struct WebUiProvider {
    port: u16,
    /// Serializes prompts; two concurrent prompts on one port cannot work.
    gate: Arc<Mutex<()>>,
}

impl WebUiProvider {
    pub fn new() -> Self {
        Self {
            port: WEBUI_PORT,
            gate: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Runs the one-shot form server until a value is submitted.
    async fn prompt(&self, title: &str, field: &str) -> Result<String, SyncError> {
        let _serialized = self.gate.lock().await;

        let addr: SocketAddr = ([127, 0, 0, 1], self.port).into();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SyncError::Unexpected(format!("web UI bind {addr}: {e}")))?;
        info!(%addr, title, "Waiting for input via web UI");

        let (tx, mut rx) = mpsc::channel::<String>(1);
        let page = form_page(title, field);
        let field = field.to_string();

        loop {
            let (stream, _) = tokio::select! {
                accepted = listener.accept() => accepted
                    .map_err(|e| SyncError::Unexpected(format!("web UI accept: {e}")))?,
                Some(value) = rx.recv() => return Ok(value),
            };

            let tx = tx.clone();
            let page = page.clone();
            let field = field.clone();
            let service = service_fn(move |request: Request<Incoming>| {
                let tx = tx.clone();
                let page = page.clone();
                let field = field.clone();
                async move { handle_request(request, &page, &field, tx).await }
            });

            // One connection at a time; the form is a single user anyway
            let io = TokioIo::new(stream);
            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await
            {
                debug!(error = %err, "Web UI connection error");
            }

            if let Ok(value) = rx.try_recv() {
                return Ok(value);
            }
        }
    }
}

impl Default for WebUiProvider {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_request(
    request: Request<Incoming>,
    page: &str,
    field: &str,
    tx: mpsc::Sender<String>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    match (request.method(), request.uri().path()) {
        (&Method::GET, "/") => Ok(Response::new(Full::new(Bytes::from(page.to_string())))),
        (&Method::POST, "/submit") => {
            let body = request.into_body().collect().await?.to_bytes();
            let submitted = parse_form_value(&body, field);
            match submitted {
                Some(value) if !value.is_empty() => {
                    let _ = tx.send(value).await;
                    Ok(Response::new(Full::new(Bytes::from(
                        "Received, you can close this tab.",
                    ))))
                }
                _ => {
                    let mut response =
                        Response::new(Full::new(Bytes::from("Missing value, go back and retry.")));
                    *response.status_mut() = StatusCode::BAD_REQUEST;
                    Ok(response)
                }
            }
        }
        _ => {
            let mut response = Response::new(Full::new(Bytes::from("Not found")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            Ok(response)
        }
    }
}

fn form_page(title: &str, field: &str) -> String {
    format!(
        "<!doctype html><html><head><title>{title}</title></head><body>\
         <h1>{title}</h1>\
         <form method=\"post\" action=\"/submit\">\
         <input type=\"password\" name=\"{field}\" autofocus>\
         <button type=\"submit\">Submit</button>\
         </form></body></html>"
    )
}

/// Extracts our single field from the submitted form body.
fn parse_form_value(body: &[u8], field: &str) -> Option<String> {
    for (name, value) in url::form_urlencoded::parse(body) {
        if name == field {
            return Some(value.into_owned());
        }
    }
    None
}

#[async_trait::async_trait]
impl ICredentialProvider for WebUiProvider {
    fn name(&self) -> &'static str {
        "webui"
    }

    async fn password(&self, username: &Username) -> Result<Option<String>, SyncError> {
        let value = self
            .prompt(&format!("iCloud password for {username}"), "password")
            .await?;
        Ok(Some(value))
    }
}

#[async_trait::async_trait]
impl IMfaProvider for WebUiProvider {
    async fn code(&self, username: &Username) -> Result<String, SyncError> {
        self.prompt(&format!("Two-factor code for {username}"), "code")
            .await
    }
}
