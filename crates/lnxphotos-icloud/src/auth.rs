//! Authentication flow for the iCloud photo service
//!
//! Implements the session-token sign-in used by the web clients: password
//! sign-in against the auth gateway, optional trusted-device two-factor
//! verification, session trust (so later sign-ins inside the trust window
//! skip MFA), and the setup-service login that exchanges the session token
//! for service cookies and the photo database endpoint.
//!
//! All state lives in the caller-owned [`SessionData`]; this module only
//! moves it through the flow. Cookies are captured and replayed explicitly
//! so the persisted session file is complete and inspectable.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use lnxphotos_core::config::ServiceDomain;
use lnxphotos_core::domain::Username;
use lnxphotos_core::error::SyncError;
use lnxphotos_core::ports::{AuthOutcome, SessionData, StoredCookie};

/// Auth gateway, global service.
const AUTH_BASE_COM: &str = "https://idmsa.apple.com/appleauth/auth";
/// Auth gateway, China mainland service.
const AUTH_BASE_CN: &str = "https://idmsa.apple.com.cn/appleauth/auth";
/// Setup service, global.
const SETUP_BASE_COM: &str = "https://setup.icloud.com/setup/ws/1";
/// Setup service, China mainland.
const SETUP_BASE_CN: &str = "https://setup.icloud.com.cn/setup/ws/1";

/// OAuth client id of the web client we impersonate.
const WIDGET_KEY: &str = "d39ba9916b7251055b22c7f910e2ea796ee65e98b2ddecea8f5dde8d9d1a815d";

/// Session token header on sign-in responses.
const HDR_SESSION_TOKEN: &str = "X-Apple-Session-Token";
/// Auth-flow session id header.
const HDR_SESSION_ID: &str = "X-Apple-ID-Session-Id";
/// Auth-flow state header.
const HDR_SCNT: &str = "scnt";
/// Trust token header on the trust response.
const HDR_TRUST_TOKEN: &str = "X-Apple-TwoSV-Trust-Token";

/// Resolved endpoint pair for one service region.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth_base: String,
    pub setup_base: String,
}

impl Endpoints {
    #[must_use]
    pub fn for_domain(domain: ServiceDomain) -> Self {
        match domain {
            ServiceDomain::Com => Self {
                auth_base: AUTH_BASE_COM.to_string(),
                setup_base: SETUP_BASE_COM.to_string(),
            },
            ServiceDomain::Cn => Self {
                auth_base: AUTH_BASE_CN.to_string(),
                setup_base: SETUP_BASE_CN.to_string(),
            },
        }
    }

    /// Custom endpoints for tests against a mock server.
    #[must_use]
    pub fn custom(auth_base: impl Into<String>, setup_base: impl Into<String>) -> Self {
        Self {
            auth_base: auth_base.into(),
            setup_base: setup_base.into(),
        }
    }
}

// ============================================================================
// Flow steps
// ============================================================================

/// Password sign-in. On success the session carries a fresh session token;
/// a 409 means the account wants a two-factor code next.
pub async fn sign_in(
    http: &Client,
    endpoints: &Endpoints,
    session: &mut SessionData,
    username: &Username,
    password: &str,
) -> Result<AuthOutcome, SyncError> {
    let body = json!({
        "accountName": username.as_str(),
        "password": password,
        "rememberMe": true,
        "trustTokens": session.trust_token.as_ref().map(|t| vec![t.clone()]).unwrap_or_default(),
    });

    let request = http
        .post(format!("{}/signin?isRememberMeEnabled=true", endpoints.auth_base))
        .json(&body);
    let response = send(auth_headers(request, session)).await?;

    capture_auth_headers(&response, session);
    capture_cookies(&response, session);

    match response.status() {
        StatusCode::OK => {
            debug!(%username, "Password accepted, session established");
            Ok(AuthOutcome::Authenticated)
        }
        StatusCode::CONFLICT => {
            debug!(%username, "Password accepted, two-factor code required");
            Ok(AuthOutcome::MfaRequired)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::AuthFailed {
            reason: "invalid username or password".to_string(),
        }),
        status => Err(classify_status(status, "sign-in")),
    }
}

/// Submits a trusted-device security code, then requests session trust.
pub async fn submit_mfa(
    http: &Client,
    endpoints: &Endpoints,
    session: &mut SessionData,
    code: &str,
) -> Result<(), SyncError> {
    let request = http
        .post(format!(
            "{}/verify/trusteddevice/securitycode",
            endpoints.auth_base
        ))
        .json(&json!({ "securityCode": { "code": code } }));
    let response = send(auth_headers(request, session)).await?;

    capture_auth_headers(&response, session);
    capture_cookies(&response, session);

    match response.status() {
        StatusCode::OK | StatusCode::NO_CONTENT => {}
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(SyncError::MfaFailed("security code rejected".to_string()));
        }
        status => return Err(classify_status(status, "two-factor verification")),
    }

    // Trust the session so re-auth inside the trust window skips MFA
    let request = http.get(format!("{}/2sv/trust", endpoints.auth_base));
    let response = send(auth_headers(request, session)).await?;

    capture_auth_headers(&response, session);
    capture_cookies(&response, session);

    if let Some(trust) = header_string(&response, HDR_TRUST_TOKEN) {
        session.trust_token = Some(trust);
    } else {
        warn!("Trust request returned no trust token; MFA will repeat next session");
    }

    Ok(())
}

/// Exchanges the session token for service cookies and returns the photo
/// database endpoint URL.
pub async fn account_login(
    http: &Client,
    endpoints: &Endpoints,
    session: &mut SessionData,
) -> Result<String, SyncError> {
    let Some(token) = session.session_token.clone() else {
        return Err(SyncError::AuthExpired);
    };

    let body = json!({
        "dsWebAuthToken": token,
        "extended_login": true,
        "trustToken": session.trust_token.clone().unwrap_or_default(),
    });

    let request = http
        .post(format!("{}/accountLogin", endpoints.setup_base))
        .header("Cookie", cookie_header(session))
        .json(&body);
    let response = send(request).await?;

    capture_cookies(&response, session);

    match response.status() {
        StatusCode::OK => {}
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(SyncError::AuthExpired),
        status => return Err(classify_status(status, "account login")),
    }

    let payload: serde_json::Value = response
        .json()
        .await
        .map_err(|e| SyncError::Unexpected(format!("account login body: {e}")))?;

    payload
        .pointer("/webservices/ckdatabasews/url")
        .and_then(|v| v.as_str())
        .map(|s| s.trim_end_matches('/').to_string())
        .ok_or_else(|| {
            SyncError::Unexpected("account login response lacks photo service URL".to_string())
        })
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Auth-gateway headers: client id plus the flow state from earlier steps.
fn auth_headers(request: RequestBuilder, session: &SessionData) -> RequestBuilder {
    let mut request = request
        .header("X-Apple-OAuth-Client-Id", WIDGET_KEY)
        .header("X-Apple-Widget-Key", WIDGET_KEY)
        .header("Accept", "application/json")
        .header("Cookie", cookie_header(session));

    if let Some(session_id) = &session.session_id {
        request = request.header(HDR_SESSION_ID, session_id.clone());
    }
    if let Some(scnt) = &session.scnt {
        request = request.header(HDR_SCNT, scnt.clone());
    }
    request
}

async fn send(request: RequestBuilder) -> Result<Response, SyncError> {
    request.send().await.map_err(map_transport_error)
}

/// Transport-level failures are always retriable.
pub fn map_transport_error(err: reqwest::Error) -> SyncError {
    SyncError::ServiceUnavailable(err.to_string())
}

/// Maps an unexpected HTTP status into the error taxonomy.
pub fn classify_status(status: StatusCode, context: &str) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::MISDIRECTED_REQUEST => SyncError::AuthExpired,
        StatusCode::NOT_FOUND => SyncError::NotFound(context.to_string()),
        StatusCode::TOO_MANY_REQUESTS => SyncError::RateLimited { retry_after: None },
        status if status.is_server_error() => {
            SyncError::ServiceUnavailable(format!("{context}: HTTP {status}"))
        }
        status => SyncError::Unexpected(format!("{context}: HTTP {status}")),
    }
}

/// Remembers the auth-flow state headers a response carries.
fn capture_auth_headers(response: &Response, session: &mut SessionData) {
    if let Some(token) = header_string(response, HDR_SESSION_TOKEN) {
        session.session_token = Some(token);
    }
    if let Some(id) = header_string(response, HDR_SESSION_ID) {
        session.session_id = Some(id);
    }
    if let Some(scnt) = header_string(response, HDR_SCNT) {
        session.scnt = Some(scnt);
    }
}

/// Folds `Set-Cookie` headers into the session, newest value per name.
pub fn capture_cookies(response: &Response, session: &mut SessionData) {
    let domain = response.url().host_str().unwrap_or("").to_string();

    for header in response.headers().get_all(reqwest::header::SET_COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        let Some(pair) = raw.split(';').next() else {
            continue;
        };
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let (name, value) = (name.trim().to_string(), value.trim().to_string());
        if name.is_empty() {
            continue;
        }

        if let Some(existing) = session.cookies.iter_mut().find(|c| c.name == name) {
            existing.value = value;
            existing.domain = domain.clone();
        } else {
            session.cookies.push(StoredCookie {
                name,
                value,
                domain: domain.clone(),
            });
        }
    }
}

/// Renders the stored cookies as a request `Cookie` header value.
pub fn cookie_header(session: &SessionData) -> String {
    session
        .cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

fn header_string(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
