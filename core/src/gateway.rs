//! HTTP gateway to the Canvas REST API: retry/backoff, a stable User-Agent,
//! endpoint-aware anonymization, and audit logging of every call. The retry
//! loop shape follows the teacher's model client: match on success /
//! retriable status / transport error, honor `Retry-After`, else fall back
//! to exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::StatusCode;
use serde_json::Value;

use crate::anonymizer::Anonymizer;
use crate::audit::AuditLog;
use crate::error::CoreError;
use crate::error::Result;
use crate::rate_limiter::AdaptiveRateLimiter;
use crate::user_agent::canvas_mcp_user_agent;
use crate::util::backoff;

const MAX_RETRIES: u64 = 3;
const INITIAL_BACKOFF_SECS: u64 = 2;

const SAFE_ENDPOINTS: &[&str] = &["/courses", "/self", "/accounts", "/terms"];
const STUDENT_DATA_ENDPOINTS: &[&str] =
    &["/users", "/discussion", "/submissions", "/enrollments", "/groups", "/analytics"];

/// Request body shape. Canvas distinguishes JSON payloads from
/// `application/x-www-form-urlencoded` payloads that may repeat a key (e.g.
/// `rubric_assessment[1][points]` alongside `rubric_assessment[2][points]`),
/// which `reqwest`'s own form helper can't express - the raw, pre-encoded
/// body is sent with an explicit content-type instead.
pub enum RequestBody {
    Json(Value),
    FormEncoded(String),
}

pub struct CanvasGateway {
    http: reqwest::Client,
    base_url: String,
    token: String,
    rate_limiter: Arc<AdaptiveRateLimiter>,
    anonymizer: Arc<Anonymizer>,
    audit: Arc<AuditLog>,
    anonymization_enabled: bool,
    log_api_requests: bool,
}

impl CanvasGateway {
    pub fn new(
        base_url: &str,
        token: &str,
        timeout: Duration,
        anonymization_enabled: bool,
        rate_limiter: Arc<AdaptiveRateLimiter>,
        anonymizer: Arc<Anonymizer>,
        audit: Arc<AuditLog>,
    ) -> Result<Self> {
        Self::with_request_logging(
            base_url,
            token,
            timeout,
            anonymization_enabled,
            false,
            rate_limiter,
            anonymizer,
            audit,
        )
    }

    /// Same as `new`, but when `log_api_requests` is set every dispatched
    /// request is narrated on the `tracing` stream (sanitized endpoint only -
    /// this is the ambient diagnostic channel, not the audit log).
    #[allow(clippy::too_many_arguments)]
    pub fn with_request_logging(
        base_url: &str,
        token: &str,
        timeout: Duration,
        anonymization_enabled: bool,
        log_api_requests: bool,
        rate_limiter: Arc<AdaptiveRateLimiter>,
        anonymizer: Arc<Anonymizer>,
        audit: Arc<AuditLog>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(canvas_mcp_user_agent())
            .build()?;
        Ok(CanvasGateway {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            rate_limiter,
            anonymizer,
            audit,
            anonymization_enabled,
            log_api_requests,
        })
    }

    /// A single Canvas API call, with retry on `429`/server errors and
    /// endpoint-aware anonymization of the successful response.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<RequestBody>,
        skip_anonymization: bool,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, ensure_leading_slash(endpoint));
        if self.log_api_requests {
            tracing::debug!(
                method = %method,
                endpoint = %crate::audit::sanitize_endpoint(endpoint),
                "dispatching canvas request"
            );
        }

        for attempt in 0..=MAX_RETRIES {
            self.rate_limiter.acquire().await;

            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.token);
            if !query.is_empty() {
                request = request.query(query);
            }
            request = match &body {
                Some(RequestBody::Json(value)) => request.json(value),
                Some(RequestBody::FormEncoded(encoded)) => request
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(encoded.clone()),
                None => request,
            };

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    if attempt == MAX_RETRIES {
                        self.log_error(&method, endpoint, &err.to_string()).await;
                        return Err(CoreError::Network(err));
                    }
                    tokio::time::sleep(backoff(attempt + 1)).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                self.rate_limiter.record_success().await;
                let json: Value = response.json().await.unwrap_or(Value::Null);
                let result = if !skip_anonymization
                    && self.anonymization_enabled
                    && should_anonymize_endpoint(endpoint)
                {
                    let data_type = determine_data_type(endpoint);
                    self.anonymizer.anonymize_response_data(&json, data_type)
                } else {
                    json
                };
                self.audit.log_data_access(method.as_str(), endpoint, "success", None).await;
                return Ok(result);
            }

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                self.rate_limiter.record_429().await;
                let delay = retry_after_delay(&response).unwrap_or_else(|| {
                    Duration::from_secs(INITIAL_BACKOFF_SECS * (1 << attempt))
                });
                tokio::time::sleep(delay).await;
                continue;
            }

            let message = error_message(response).await;
            self.log_error(&method, endpoint, &format!("HTTP {}", status.as_u16())).await;
            return Err(status_to_error(status, message));
        }

        unreachable!("retry loop always returns on its last iteration")
    }

    async fn log_error(&self, method: &Method, endpoint: &str, error: &str) {
        self.audit
            .log_data_access(method.as_str(), endpoint, "error", Some(error))
            .await;
    }

    /// Canvas's three-step external-storage upload protocol, step two: POSTs
    /// the file to the pre-signed `upload_url` using an unauthenticated
    /// client, then follows a redirect back through the authenticated Canvas
    /// client if Canvas asks for confirmation.
    pub async fn upload_to_storage(
        &self,
        upload_url: &str,
        upload_params: &serde_json::Map<String, Value>,
        filename: &str,
        content_type: &str,
        file_bytes: Vec<u8>,
    ) -> Result<Value> {
        let storage_client = reqwest::Client::builder()
            .user_agent(canvas_mcp_user_agent())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let mut form = reqwest::multipart::Form::new();
        for (key, value) in upload_params {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            form = form.text(key.clone(), value);
        }
        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .unwrap_or_else(|_| reqwest::multipart::Part::bytes(Vec::new()));
        form = form.part("file", part);

        let response = storage_client.post(upload_url).multipart(form).send().await?;
        let status = response.status();

        if status.is_redirection() {
            if let Some(location) = response.headers().get(reqwest::header::LOCATION) {
                let location = location.to_str().unwrap_or_default().to_string();
                let confirm = self
                    .http
                    .get(&location)
                    .bearer_auth(&self.token)
                    .send()
                    .await?;
                let confirm_status = confirm.status();
                return if confirm_status.is_success() {
                    Ok(confirm.json().await.unwrap_or(Value::Null))
                } else {
                    Err(CoreError::CanvasApi {
                        status: confirm_status.as_u16(),
                        message: "upload redirect confirmation failed".to_string(),
                    })
                };
            }
        }

        if status.is_success() {
            return Ok(response
                .json()
                .await
                .unwrap_or_else(|_| serde_json::json!({"success": true, "status_code": status.as_u16()})));
        }

        Err(CoreError::CanvasApi {
            status: status.as_u16(),
            message: "file upload to storage failed".to_string(),
        })
    }
}

/// Maps a non-retriable Canvas response status to its place in the §7
/// closed error taxonomy, rather than always wrapping it as a generic
/// `canvas-api` error - callers (the tool dispatcher's `Suggestion:` line,
/// the bulk grader's failure accounting) key off these specific variants.
fn status_to_error(status: StatusCode, message: String) -> CoreError {
    match status {
        StatusCode::UNAUTHORIZED => CoreError::Unauthorized(message),
        StatusCode::FORBIDDEN => CoreError::Forbidden(message),
        StatusCode::NOT_FOUND => CoreError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => CoreError::RateLimited(message),
        _ => CoreError::CanvasApi {
            status: status.as_u16(),
            message,
        },
    }
}

fn ensure_leading_slash(endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{endpoint}")
    }
}

fn retry_after_delay(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) if !text.is_empty() => {
            if let Ok(json) = serde_json::from_str::<Value>(&text) {
                json.to_string()
            } else {
                text
            }
        }
        _ => format!("HTTP {}", status.as_u16()),
    }
}

/// Mirrors `_determine_data_type`: picks the anonymization shape hint from
/// the endpoint path.
pub fn determine_data_type(endpoint: &str) -> &'static str {
    let lower = endpoint.to_lowercase();
    if lower.contains("/discussion_topics") && lower.contains("/entries") {
        "discussions"
    } else if lower.contains("/discussion") {
        "discussions"
    } else if lower.contains("/users") || lower.contains("/enrollments") {
        "users"
    } else if lower.contains("/submissions") {
        "submissions"
    } else if lower.contains("/assignments") {
        "assignments"
    } else {
        "general"
    }
}

/// Mirrors `_should_anonymize_endpoint`: discussion entries always
/// anonymize; course/account/term/self-scoped endpoints that don't also
/// touch `/users` never do; anything else touching student data does.
pub fn should_anonymize_endpoint(endpoint: &str) -> bool {
    let lower = endpoint.to_lowercase();
    if lower.contains("/discussion_topics") && lower.contains("/entries") {
        return true;
    }
    let is_safe = SAFE_ENDPOINTS.iter().any(|safe| lower.contains(safe)) && !lower.contains("/users");
    if is_safe {
        return false;
    }
    STUDENT_DATA_ENDPOINTS.iter().any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::audit::AuditLog;
    use crate::rate_limiter::AdaptiveRateLimiter;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method as http_method;
    use wiremock::matchers::path;

    async fn gateway_against(server: &MockServer) -> CanvasGateway {
        let audit = Arc::new(AuditLog::init(&std::env::temp_dir(), false, false).unwrap());
        let rate_limiter = Arc::new(AdaptiveRateLimiter::new());
        let anonymizer = Arc::new(Anonymizer::new());
        CanvasGateway::new(&server.uri(), "test-token", Duration::from_secs(5), false, rate_limiter, anonymizer, audit)
            .unwrap()
    }

    #[tokio::test]
    async fn maps_401_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/courses/1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "bad token"})))
            .mount(&server)
            .await;

        let gateway = gateway_against(&server).await;
        let err = gateway.request(Method::GET, "/courses/1", &[], None, true).await.unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn maps_403_to_forbidden() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/courses/1"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({"error": "not allowed"})))
            .mount(&server)
            .await;

        let gateway = gateway_against(&server).await;
        let err = gateway.request(Method::GET, "/courses/1", &[], None, true).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/courses/999"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"error": "no such course"})))
            .mount(&server)
            .await;

        let gateway = gateway_against(&server).await;
        let err = gateway.request(Method::GET, "/courses/999", &[], None, true).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn maps_exhausted_429_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/courses"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(serde_json::json!({"error": "slow down"}))
                    .insert_header("Retry-After", "0"),
            )
            .mount(&server)
            .await;

        let gateway = gateway_against(&server).await;
        let err = gateway.request(Method::GET, "/courses", &[], None, true).await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimited(_)));
    }

    #[tokio::test]
    async fn maps_500_to_generic_canvas_api_error() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/courses"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "boom"})))
            .mount(&server)
            .await;

        let gateway = gateway_against(&server).await;
        let err = gateway.request(Method::GET, "/courses", &[], None, true).await.unwrap_err();
        assert!(matches!(err, CoreError::CanvasApi { status: 500, .. }));
    }

    #[test]
    fn data_type_matches_endpoint_shape() {
        assert_eq!(determine_data_type("/courses/1/discussion_topics/2/entries"), "discussions");
        assert_eq!(determine_data_type("/courses/1/submissions"), "submissions");
        assert_eq!(determine_data_type("/courses/1/assignments"), "assignments");
        assert_eq!(determine_data_type("/courses/1/enrollments"), "users");
        assert_eq!(determine_data_type("/accounts/1/terms"), "general");
    }

    #[test]
    fn safe_endpoints_skip_anonymization_unless_users_involved() {
        assert!(!should_anonymize_endpoint("/courses/1"));
        assert!(should_anonymize_endpoint("/courses/1/users"));
        // A bare /courses/.../submissions path matches the SAFE_ENDPOINTS
        // "/courses" prefix and never mentions /users, so per §4.4's literal
        // exception rule (and the original _should_anonymize_endpoint) it is
        // treated as safe and skipped, even though /submissions is itself a
        // student-bearing endpoint in isolation.
        assert!(!should_anonymize_endpoint("/courses/1/submissions"));
    }

    #[test]
    fn discussion_entries_always_anonymize() {
        assert!(should_anonymize_endpoint("/courses/1/discussion_topics/2/entries"));
    }
}
