pub mod anonymizer;
pub mod audit;
pub mod bulk_grader;
pub mod config;
pub mod course_cache;
pub mod error;
pub mod file_upload;
pub mod gateway;
pub mod paginator;
pub mod rate_limiter;
pub mod rubric_encoder;
pub mod user_agent;
pub mod util;
pub mod validator;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::anonymizer::Anonymizer;
use crate::audit::AuditLog;
use crate::config::Config;
use crate::course_cache::CourseCache;
use crate::course_cache::is_explicit_sis_id;
use crate::course_cache::is_numeric_course_id;
use crate::course_cache::looks_like_course_code;
use crate::error::CoreError;
use crate::error::Result;
use crate::gateway::CanvasGateway;
use crate::paginator::Paginator;
use crate::rate_limiter::AdaptiveRateLimiter;

/// Everything a tool handler needs to talk to Canvas: the HTTP gateway, the
/// course-identifier cache, the paginator, and the shared anonymizer/audit
/// sinks. One instance is constructed at startup and shared (via `Arc`)
/// across every concurrent tool invocation.
pub struct CanvasClient {
    pub gateway: Arc<CanvasGateway>,
    pub paginator: Paginator,
    pub course_cache: CourseCache,
    pub anonymizer: Arc<Anonymizer>,
    pub audit: Arc<AuditLog>,
    /// Default fan-out width for bulk operations (`MAX_CONCURRENT_REQUESTS`),
    /// used when a caller doesn't pin a narrower `max_concurrent` itself.
    pub default_max_concurrent: usize,
}

impl CanvasClient {
    /// Builds the full client from `config`, resolving the audit log
    /// directory from `config.audit_log_dir` (expanding a leading `~/`).
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_audit_dir(config, &config.resolved_audit_log_dir())
    }

    /// Same as `new`, but with an explicit audit log directory - used by
    /// tests that need an isolated temp directory.
    pub fn with_audit_dir(config: &Config, audit_log_dir: &std::path::Path) -> Result<Self> {
        let audit = Arc::new(AuditLog::init(
            audit_log_dir,
            config.log_access_events,
            config.log_execution_events,
        )?);
        let anonymizer = Arc::new(Anonymizer::with_debug(config.anonymization_debug));
        let rate_limiter = Arc::new(AdaptiveRateLimiter::new());
        let gateway = Arc::new(CanvasGateway::with_request_logging(
            &config.canvas_api_url,
            &config.canvas_api_token,
            Duration::from_secs(config.api_timeout_secs),
            config.enable_data_anonymization,
            config.log_api_requests,
            rate_limiter,
            anonymizer.clone(),
            audit.clone(),
        )?);
        let paginator = Paginator::new(gateway.clone(), anonymizer.clone(), config.enable_data_anonymization);
        let course_cache = CourseCache::new(Duration::from_secs(config.cache_ttl_secs));

        Ok(CanvasClient {
            gateway,
            paginator,
            course_cache,
            anonymizer,
            audit,
            default_max_concurrent: config.max_concurrent_requests,
        })
    }

    /// Resolves any course identifier (numeric ID, `sis_course_id:...`,
    /// course code, or cached course code) to a Canvas numeric course ID,
    /// refreshing the course cache on a cache miss before falling back to an
    /// SIS-id guess.
    pub async fn resolve_course_id(&self, identifier: &str) -> Result<String> {
        if is_numeric_course_id(identifier) || is_explicit_sis_id(identifier) {
            return Ok(identifier.to_string());
        }
        if let Some(id) = self.course_cache.lookup_id(identifier).await {
            return Ok(id);
        }
        if looks_like_course_code(identifier) {
            if self.course_cache.is_empty().await {
                self.refresh_course_cache().await?;
                if let Some(id) = self.course_cache.lookup_id(identifier).await {
                    return Ok(id);
                }
            }
            return Ok(format!("sis_course_id:{identifier}"));
        }
        Ok(identifier.to_string())
    }

    /// Resolves a Canvas numeric course ID to its course code, refreshing the
    /// cache on a miss and falling back to a direct single-course fetch if
    /// the full-listing refresh still doesn't have it.
    pub async fn resolve_course_code(&self, course_id: &str) -> Result<String> {
        if looks_like_course_code(course_id) {
            return Ok(course_id.to_string());
        }
        if let Some(code) = self.course_cache.lookup_code(course_id).await {
            return Ok(code);
        }
        if self.course_cache.is_empty().await {
            self.refresh_course_cache().await?;
            if let Some(code) = self.course_cache.lookup_code(course_id).await {
                return Ok(code);
            }
        }

        let course = self
            .gateway
            .request(Method::GET, &format!("/courses/{course_id}"), &[], None, true)
            .await?;
        let code = course
            .get("course_code")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::NotFound(format!("course {course_id} has no course_code")))?;
        self.course_cache.put(course_id, code).await;
        Ok(code.to_string())
    }

    async fn refresh_course_cache(&self) -> Result<()> {
        let courses = self
            .paginator
            .fetch_all("/courses", &[("per_page".to_string(), "100".to_string())])
            .await?;
        let pairs: Vec<(String, String)> = courses
            .iter()
            .filter_map(|course| {
                let id = course.get("id")?;
                let code = course.get("course_code")?.as_str()?;
                Some((stringify(id), code.to_string()))
            })
            .collect();
        tracing::info!(count = pairs.len(), "refreshed course cache");
        self.course_cache.refresh(&pairs).await;
        Ok(())
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn numeric_and_sis_identifiers_resolve_without_network() {
        // Exercised indirectly through `resolve_course_id`'s early returns in
        // the gateway-integration tests; this module only re-exports the
        // classification helpers used there.
        assert!(is_numeric_course_id("12345"));
        assert!(is_explicit_sis_id("sis_course_id:CS225"));
    }
}
