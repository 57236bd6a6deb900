//! Bulk grading orchestrator: grades many submissions for one assignment
//! concurrently, in bounded batches, with dry-run support and per-student
//! failure isolation - a bad grade for one student never aborts the batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Map;
use serde_json::Value;

use crate::error::CoreError;
use crate::error::Result;
use crate::gateway::CanvasGateway;
use crate::gateway::RequestBody;
use crate::rubric_encoder::encode_rubric_assessment;
use crate::rubric_encoder::encode_simple_grade;
use crate::rubric_encoder::total_rubric_points;

/// One student's desired grade: either a rubric assessment or a plain score.
#[derive(Debug, Clone)]
pub struct GradeInput {
    pub rubric_assessment: Option<Map<String, Value>>,
    pub grade: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GradeOutcome {
    pub user_id: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug)]
pub struct BulkGradeSummary {
    pub total: usize,
    pub graded: usize,
    pub failed: usize,
    pub failed_results: Vec<GradeOutcome>,
    pub dry_run: bool,
}

const FAILURE_SAMPLE_LIMIT: usize = 10;

/// Grades every entry in `grades` for `assignment_id` in `course_id`,
/// `max_concurrent` submissions at a time, pausing `rate_limit_delay`
/// between batches (never after the last one).
///
/// If any grade carries a rubric assessment but the assignment isn't
/// configured to grade via its rubric, this aborts before submitting
/// anything (a fatal precondition failure, unlike a single student's grade
/// failing).
pub async fn bulk_grade_submissions(
    gateway: Arc<CanvasGateway>,
    course_id: &str,
    assignment_id: &str,
    grades: HashMap<String, GradeInput>,
    dry_run: bool,
    max_concurrent: usize,
    rate_limit_delay: Duration,
) -> Result<BulkGradeSummary> {
    if grades.is_empty() {
        return Err(CoreError::Validation("grades map must not be empty".to_string()));
    }

    let has_rubric_grades = grades.values().any(|g| g.rubric_assessment.is_some());
    if has_rubric_grades && !dry_run {
        let assignment = gateway
            .request(
                Method::GET,
                &format!("/courses/{course_id}/assignments/{assignment_id}"),
                &[("include[]".to_string(), "rubric_settings".to_string())],
                None,
                true,
            )
            .await?;
        let uses_rubric = assignment
            .get("rubric_settings")
            .and_then(|settings| settings.get("use_rubric_for_grading"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !uses_rubric {
            return Err(CoreError::Validation(
                "assignment is not configured to grade via its rubric; rubric_assessment grades would be ignored"
                    .to_string(),
            ));
        }
    }

    let mut total = 0usize;
    let mut graded = 0usize;
    let mut failed_results = Vec::new();

    let user_ids: Vec<String> = grades.keys().cloned().collect();
    let batches: Vec<Vec<String>> = user_ids.chunks(max_concurrent.max(1)).map(|c| c.to_vec()).collect();
    let batch_count = batches.len();

    for (batch_index, batch) in batches.into_iter().enumerate() {
        let mut tasks = tokio::task::JoinSet::new();
        for user_id in batch {
            let grade_input = grades.get(&user_id).cloned().unwrap_or(GradeInput {
                rubric_assessment: None,
                grade: None,
                comment: None,
            });
            let gateway = gateway.clone();
            let course_id = course_id.to_string();
            let assignment_id = assignment_id.to_string();
            tasks.spawn(async move {
                grade_single_submission(&gateway, &course_id, &assignment_id, &user_id, &grade_input, dry_run).await
            });
        }

        while let Some(outcome) = tasks.join_next().await {
            total += 1;
            match outcome {
                Ok(outcome) => {
                    if outcome.success {
                        graded += 1;
                    } else {
                        failed_results.push(outcome);
                    }
                }
                Err(join_error) => {
                    failed_results.push(GradeOutcome {
                        user_id: "unknown".to_string(),
                        success: false,
                        message: format!("grading task panicked: {join_error}"),
                    });
                }
            }
        }

        if batch_index + 1 < batch_count {
            tokio::time::sleep(rate_limit_delay).await;
        }
    }

    let failed = failed_results.len();
    failed_results.truncate(FAILURE_SAMPLE_LIMIT);

    Ok(BulkGradeSummary {
        total,
        graded,
        failed,
        failed_results,
        dry_run,
    })
}

async fn grade_single_submission(
    gateway: &CanvasGateway,
    course_id: &str,
    assignment_id: &str,
    user_id: &str,
    grade_input: &GradeInput,
    dry_run: bool,
) -> GradeOutcome {
    if dry_run {
        let points = match &grade_input.rubric_assessment {
            Some(rubric) => total_rubric_points(rubric),
            None => grade_input
                .grade
                .as_deref()
                .and_then(|g| g.parse::<f64>().ok())
                .unwrap_or(0.0),
        };
        return GradeOutcome {
            user_id: user_id.to_string(),
            success: true,
            message: format!("DRY RUN: would grade with {points} points"),
        };
    }

    let encoded = match &grade_input.rubric_assessment {
        Some(rubric) => encode_rubric_assessment(rubric, grade_input.comment.as_deref()),
        None => {
            let grade = match &grade_input.grade {
                Some(grade) => grade,
                None => {
                    return GradeOutcome {
                        user_id: user_id.to_string(),
                        success: false,
                        message: "grade input has neither a grade nor a rubric_assessment".to_string(),
                    };
                }
            };
            encode_simple_grade(grade, grade_input.comment.as_deref())
        }
    };

    let endpoint = format!("/courses/{course_id}/assignments/{assignment_id}/submissions/{user_id}");
    match gateway
        .request(Method::PUT, &endpoint, &[], Some(RequestBody::FormEncoded(encoded)), true)
        .await
    {
        Ok(_) => GradeOutcome {
            user_id: user_id.to_string(),
            success: true,
            message: "graded".to_string(),
        },
        Err(err) => GradeOutcome {
            user_id: user_id.to_string(),
            success: false,
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::anonymizer::Anonymizer;
    use crate::audit::AuditLog;
    use crate::rate_limiter::AdaptiveRateLimiter;
    use serde_json::json;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    async fn gateway_against(server: &MockServer) -> Arc<CanvasGateway> {
        let audit = Arc::new(AuditLog::init(&std::env::temp_dir(), false, false).unwrap());
        Arc::new(
            CanvasGateway::new(
                &server.uri(),
                "test-token",
                Duration::from_secs(5),
                false,
                Arc::new(AdaptiveRateLimiter::new()),
                Arc::new(Anonymizer::new()),
                audit,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn empty_grades_map_is_rejected_up_front() {
        let server = MockServer::start().await;
        let gateway = gateway_against(&server).await;
        let result = bulk_grade_submissions(
            gateway,
            "1",
            "2",
            HashMap::new(),
            true,
            5,
            Duration::from_millis(0),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dry_run_never_calls_canvas() {
        let server = MockServer::start().await;
        let gateway = gateway_against(&server).await;

        let mut grades = HashMap::new();
        grades.insert(
            "1".to_string(),
            GradeInput {
                rubric_assessment: None,
                grade: Some("95".to_string()),
                comment: None,
            },
        );

        let summary = bulk_grade_submissions(gateway, "1", "2", grades, true, 5, Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(summary.graded, 1);
        assert!(summary.dry_run);
    }

    #[tokio::test]
    async fn rubric_grades_abort_when_assignment_does_not_use_rubric_grading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/courses/1/assignments/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rubric_settings": {"use_rubric_for_grading": false}
            })))
            .mount(&server)
            .await;
        let gateway = gateway_against(&server).await;

        let mut grades = HashMap::new();
        grades.insert(
            "1".to_string(),
            GradeInput {
                rubric_assessment: Some(json!({"101": {"points": 5}}).as_object().unwrap().clone()),
                grade: None,
                comment: None,
            },
        );

        let result = bulk_grade_submissions(gateway, "1", "2", grades, false, 5, Duration::from_millis(0)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn per_student_failure_does_not_abort_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/courses/1/assignments/2/submissions/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/courses/1/assignments/2/submissions/2"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"errors": "bad grade"})))
            .mount(&server)
            .await;
        let gateway = gateway_against(&server).await;

        let mut grades = HashMap::new();
        grades.insert(
            "1".to_string(),
            GradeInput {
                rubric_assessment: None,
                grade: Some("95".to_string()),
                comment: None,
            },
        );
        grades.insert(
            "2".to_string(),
            GradeInput {
                rubric_assessment: None,
                grade: Some("bad".to_string()),
                comment: None,
            },
        );

        let summary = bulk_grade_submissions(gateway, "1", "2", grades, false, 5, Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.graded, 1);
        assert_eq!(summary.failed, 1);
    }
}
