//! Page-number pagination over Canvas list endpoints. Anonymization is
//! applied once to the fully concatenated dataset, never per page, so a
//! pseudonym assigned to a student in page 1 is the same pseudonym used if
//! that student also appears on page 3.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::anonymizer::Anonymizer;
use crate::error::Result;
use crate::gateway::CanvasGateway;
use crate::gateway::determine_data_type;
use crate::gateway::should_anonymize_endpoint;

const DEFAULT_PER_PAGE: u32 = 100;

pub struct Paginator {
    gateway: Arc<CanvasGateway>,
    anonymizer: Arc<Anonymizer>,
    anonymization_enabled: bool,
}

impl Paginator {
    pub fn new(gateway: Arc<CanvasGateway>, anonymizer: Arc<Anonymizer>, anonymization_enabled: bool) -> Self {
        Paginator {
            gateway,
            anonymizer,
            anonymization_enabled,
        }
    }

    /// Fetches every page of `endpoint`, stopping as soon as a short page is
    /// seen (the conventional Canvas end-of-results signal), then
    /// anonymizes the concatenated result set in one pass.
    pub async fn fetch_all(&self, endpoint: &str, params: &[(String, String)]) -> Result<Vec<Value>> {
        let per_page = params
            .iter()
            .find(|(key, _)| key == "per_page")
            .and_then(|(_, value)| value.parse::<u32>().ok())
            .unwrap_or(DEFAULT_PER_PAGE);

        let mut all_results = Vec::new();
        let mut page = 1u32;

        loop {
            let mut query: Vec<(String, String)> =
                params.iter().filter(|(key, _)| key != "per_page" && key != "page").cloned().collect();
            query.push(("per_page".to_string(), per_page.to_string()));
            query.push(("page".to_string(), page.to_string()));

            let response = self
                .gateway
                .request(Method::GET, endpoint, &query, None, true)
                .await?;

            let Value::Array(items) = response else {
                break;
            };
            let page_len = items.len();
            all_results.extend(items);
            if page_len < per_page as usize {
                break;
            }
            page += 1;
        }

        if self.anonymization_enabled && should_anonymize_endpoint(endpoint) {
            let data_type = determine_data_type(endpoint);
            all_results = all_results
                .into_iter()
                .map(|item| self.anonymizer.anonymize_response_data(&item, data_type))
                .collect();
        }

        Ok(all_results)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::audit::AuditLog;
    use crate::rate_limiter::AdaptiveRateLimiter;
    use std::time::Duration;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;
    use wiremock::matchers::query_param;

    async fn paginator_against(server: &MockServer) -> Paginator {
        let audit = Arc::new(AuditLog::init(&std::env::temp_dir(), false, false).unwrap());
        let rate_limiter = Arc::new(AdaptiveRateLimiter::new());
        let anonymizer = Arc::new(Anonymizer::new());
        let gateway = Arc::new(
            CanvasGateway::new(
                &server.uri(),
                "test-token",
                Duration::from_secs(5),
                false,
                rate_limiter,
                anonymizer.clone(),
                audit,
            )
            .unwrap(),
        );
        Paginator::new(gateway, anonymizer, false)
    }

    #[tokio::test]
    async fn stops_after_a_short_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/courses"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1}, {"id": 2}
            ])))
            .mount(&server)
            .await;

        let paginator = paginator_against(&server).await;
        let results = paginator
            .fetch_all("/courses", &[("per_page".to_string(), "2".to_string())])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn follows_additional_pages_until_short_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/courses"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 1}, {"id": 2}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/courses"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 3}])))
            .mount(&server)
            .await;

        let paginator = paginator_against(&server).await;
        let results = paginator
            .fetch_all("/courses", &[("per_page".to_string(), "2".to_string())])
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }
}
