//! Executes a representative tool call against a `CanvasClient` and renders
//! the result as the single text block `CallToolResult` expects.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use canvas_mcp_core::CanvasClient;
use canvas_mcp_core::bulk_grader::GradeInput;
use canvas_mcp_core::bulk_grader::bulk_grade_submissions;
use canvas_mcp_core::error::CoreError;
use canvas_mcp_core::file_upload;
use canvas_mcp_core::validator::ExpectedType;
use canvas_mcp_core::validator::validate_parameter;
use reqwest::Method;
use serde_json::Value;

use crate::tool_schemas::BulkGradeSubmissionsParams;
use crate::tool_schemas::GetCourseParams;
use crate::tool_schemas::GradeSubmissionParams;
use crate::tool_schemas::ListCoursesParams;
use crate::tool_schemas::UploadCourseFileParams;

/// Outcome of a tool call: rendered text plus whether it represents an error.
pub struct ToolOutcome {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(text: String) -> Self {
        ToolOutcome { text, is_error: false }
    }

    /// Renders a `CoreError` the way the tool dispatcher contract requires:
    /// `Error [<code>]: <message>`, with an optional `Suggestion:` line for
    /// error codes that have an obvious next step.
    fn err(error: &CoreError) -> Self {
        let mut text = format!("Error [{}]: {error}", error.code());
        if let Some(suggestion) = suggestion_for(error) {
            text.push_str("\nSuggestion: ");
            text.push_str(suggestion);
        }
        ToolOutcome { text, is_error: true }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        let error = CoreError::Validation(message.into());
        ToolOutcome::err(&error)
    }
}

pub async fn dispatch(client: &Arc<CanvasClient>, name: &str, arguments: Value) -> ToolOutcome {
    match name {
        "list_courses" => list_courses(client, arguments).await,
        "get_course" => get_course(client, arguments).await,
        "grade_submission" => grade_submission(client, arguments).await,
        "bulk_grade_submissions" => bulk_grade(client, arguments).await,
        "upload_course_file" => upload_course_file(client, arguments).await,
        other => ToolOutcome::bad_request(format!("unknown tool: {other}")),
    }
}

async fn list_courses(client: &Arc<CanvasClient>, arguments: Value) -> ToolOutcome {
    let params: ListCoursesParams = match serde_json::from_value(arguments) {
        Ok(params) => params,
        Err(err) => return ToolOutcome::bad_request(err.to_string()),
    };

    let mut query = vec![("per_page".to_string(), "100".to_string())];
    if let Some(state) = params.enrollment_state {
        query.push(("enrollment_state".to_string(), state));
    }

    match client.paginator.fetch_all("/courses", &query).await {
        Ok(courses) => ToolOutcome::ok(serde_json::to_string_pretty(&courses).unwrap_or_default()),
        Err(err) => ToolOutcome::err(&err),
    }
}

async fn get_course(client: &Arc<CanvasClient>, arguments: Value) -> ToolOutcome {
    let params: GetCourseParams = match serde_json::from_value(arguments) {
        Ok(params) => params,
        Err(err) => return ToolOutcome::bad_request(err.to_string()),
    };

    let course_id = match client.resolve_course_id(&params.course_identifier).await {
        Ok(id) => id,
        Err(err) => return ToolOutcome::err(&err),
    };

    match client
        .gateway
        .request(Method::GET, &format!("/courses/{course_id}"), &[], None, false)
        .await
    {
        Ok(course) => ToolOutcome::ok(serde_json::to_string_pretty(&course).unwrap_or_default()),
        Err(err) => ToolOutcome::err(&err),
    }
}

async fn grade_submission(client: &Arc<CanvasClient>, mut arguments: Value) -> ToolOutcome {
    if let Err(outcome) = coerce_field(&mut arguments, "dry_run", ExpectedType::Optional(Box::new(ExpectedType::Bool))) {
        return outcome;
    }
    let params: GradeSubmissionParams = match serde_json::from_value(arguments) {
        Ok(params) => params,
        Err(err) => return ToolOutcome::bad_request(err.to_string()),
    };

    let course_id = match client.resolve_course_id(&params.course_identifier).await {
        Ok(id) => id,
        Err(err) => return ToolOutcome::err(&err),
    };

    let rubric_assessment = match params.rubric_assessment {
        Some(Value::Object(map)) => Some(map),
        Some(_) => return ToolOutcome::bad_request("rubric_assessment must be an object"),
        None => None,
    };

    let mut grades = HashMap::new();
    grades.insert(
        params.user_id.clone(),
        GradeInput {
            rubric_assessment,
            grade: params.grade,
            comment: params.comment,
        },
    );

    match bulk_grade_submissions(
        client.gateway.clone(),
        &course_id,
        &params.assignment_id,
        grades,
        params.dry_run.unwrap_or(false),
        1,
        Duration::from_secs(0),
    )
    .await
    {
        Ok(summary) if summary.graded == 1 => ToolOutcome::ok(format!(
            "graded user {} for assignment {}{}",
            params.user_id,
            params.assignment_id,
            if summary.dry_run { " (dry run)" } else { "" }
        )),
        Ok(summary) => {
            let detail = summary
                .failed_results
                .first()
                .map(|f| f.message.clone())
                .unwrap_or_else(|| "unknown failure".to_string());
            ToolOutcome::bad_request(format!("grading failed: {detail}"))
        }
        Err(err) => ToolOutcome::err(&err),
    }
}

async fn bulk_grade(client: &Arc<CanvasClient>, mut arguments: Value) -> ToolOutcome {
    if let Err(outcome) = coerce_field(&mut arguments, "dry_run", ExpectedType::Optional(Box::new(ExpectedType::Bool))) {
        return outcome;
    }
    if let Err(outcome) = coerce_field(&mut arguments, "max_concurrent", ExpectedType::Optional(Box::new(ExpectedType::Int))) {
        return outcome;
    }
    let params: BulkGradeSubmissionsParams = match serde_json::from_value(arguments) {
        Ok(params) => params,
        Err(err) => return ToolOutcome::bad_request(err.to_string()),
    };

    let course_id = match client.resolve_course_id(&params.course_identifier).await {
        Ok(id) => id,
        Err(err) => return ToolOutcome::err(&err),
    };

    let Value::Object(raw_grades) = params.grades else {
        return ToolOutcome::bad_request("grades must be a JSON object keyed by user ID");
    };

    let mut grades = HashMap::new();
    for (user_id, entry) in raw_grades {
        let Value::Object(entry) = entry else {
            return ToolOutcome::bad_request(format!("grade entry for user {user_id} must be an object"));
        };
        let rubric_assessment = match entry.get("rubric_assessment") {
            Some(Value::Object(map)) => Some(map.clone()),
            Some(_) => return ToolOutcome::bad_request(format!("rubric_assessment for user {user_id} must be an object")),
            None => None,
        };
        grades.insert(
            user_id,
            GradeInput {
                rubric_assessment,
                grade: entry.get("grade").and_then(Value::as_str).map(str::to_string),
                comment: entry.get("comment").and_then(Value::as_str).map(str::to_string),
            },
        );
    }

    let max_concurrent = params
        .max_concurrent
        .map(|n| n as usize)
        .unwrap_or(client.default_max_concurrent);

    match bulk_grade_submissions(
        client.gateway.clone(),
        &course_id,
        &params.assignment_id,
        grades,
        params.dry_run.unwrap_or(false),
        max_concurrent,
        Duration::from_secs(1),
    )
    .await
    {
        Ok(summary) => {
            let mut report = format!(
                "graded {}/{} submissions ({} failed){}\n",
                summary.graded,
                summary.total,
                summary.failed,
                if summary.dry_run { " [DRY RUN]" } else { "" }
            );
            for failure in &summary.failed_results {
                report.push_str(&format!("  - user {}: {}\n", failure.user_id, failure.message));
            }
            ToolOutcome::ok(report)
        }
        Err(err) => ToolOutcome::err(&err),
    }
}

async fn upload_course_file(client: &Arc<CanvasClient>, arguments: Value) -> ToolOutcome {
    let params: UploadCourseFileParams = match serde_json::from_value(arguments) {
        Ok(params) => params,
        Err(err) => return ToolOutcome::bad_request(err.to_string()),
    };

    let on_duplicate = params.on_duplicate.unwrap_or_else(|| "rename".to_string());
    if on_duplicate != "rename" && on_duplicate != "overwrite" {
        return ToolOutcome::bad_request("on_duplicate must be 'rename' or 'overwrite'");
    }

    let path = Path::new(&params.file_path);
    let metadata = match file_upload::validate_file_for_upload(path, file_upload::DEFAULT_MAX_FILE_SIZE_BYTES) {
        Ok(metadata) => metadata,
        Err(err) => return ToolOutcome::err(&err),
    };

    let file_bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => return ToolOutcome::err(&CoreError::Io(err)),
    };

    let course_id = match client.resolve_course_id(&params.course_identifier).await {
        Ok(id) => id,
        Err(err) => return ToolOutcome::err(&err),
    };

    match file_upload::upload_course_file(
        &client.gateway,
        &course_id,
        file_bytes,
        &metadata,
        &on_duplicate,
        params.parent_folder_path.as_deref(),
    )
    .await
    {
        Ok(uploaded) => {
            let course_code = client
                .resolve_course_code(&course_id)
                .await
                .unwrap_or_else(|_| course_id.clone());
            let file_id = uploaded.get("id").map(value_to_display).unwrap_or_else(|| "unknown".to_string());
            let display_name = uploaded
                .get("display_name")
                .or_else(|| uploaded.get("filename"))
                .map(value_to_display)
                .unwrap_or_else(|| metadata.sanitized_name.clone());
            ToolOutcome::ok(format!(
                "uploaded '{display_name}' (id {file_id}, {}) to {course_code}",
                file_upload::format_file_size(metadata.file_size)
            ))
        }
        Err(err) => ToolOutcome::err(&err),
    }
}

/// A short, code-specific remediation hint for the `Suggestion:` line of a
/// rendered error envelope. Not every code has an obvious next step.
fn suggestion_for(error: &CoreError) -> Option<&'static str> {
    match error {
        CoreError::RateLimited(_) => Some("wait for the rate limit to recover and retry"),
        CoreError::Unauthorized(_) => Some("check that CANVAS_API_TOKEN is valid and not expired"),
        CoreError::NotFound(_) => Some("double-check the course/assignment/user identifier"),
        CoreError::InvalidParameter { .. } => Some("fix the parameter value and resend the request"),
        CoreError::Forbidden(_) => Some("confirm the token's account has permission for this action"),
        _ => None,
    }
}

/// Forgiving pre-coercion for one loosely-typed scalar field (e.g. a host
/// that sends `"dry_run": "yes"` or `"max_concurrent": "5"` instead of a
/// native bool/int), applied in place before the strict typed `serde`
/// deserialize that follows. Absent or already-null fields are left alone.
fn coerce_field(arguments: &mut Value, field: &str, expected: ExpectedType) -> std::result::Result<(), ToolOutcome> {
    let Value::Object(map) = arguments else {
        return Ok(());
    };
    let Some(raw) = map.get(field) else {
        return Ok(());
    };
    if raw.is_null() {
        return Ok(());
    }
    match validate_parameter(field, raw, &expected) {
        Ok(coerced) => {
            map.insert(field.to_string(), coerced);
            Ok(())
        }
        Err(err) => Err(ToolOutcome::err(&err)),
    }
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_field_accepts_loosely_typed_dry_run() {
        let mut arguments = json!({"dry_run": "yes"});
        coerce_field(&mut arguments, "dry_run", ExpectedType::Optional(Box::new(ExpectedType::Bool))).unwrap();
        assert_eq!(arguments["dry_run"], json!(true));
    }

    #[test]
    fn coerce_field_rejects_unparseable_value() {
        let mut arguments = json!({"max_concurrent": "lots"});
        let result = coerce_field(&mut arguments, "max_concurrent", ExpectedType::Optional(Box::new(ExpectedType::Int)));
        assert!(result.is_err());
    }

    #[test]
    fn coerce_field_leaves_absent_and_null_fields_untouched() {
        let mut arguments = json!({"other": 1});
        coerce_field(&mut arguments, "dry_run", ExpectedType::Optional(Box::new(ExpectedType::Bool))).unwrap();
        assert_eq!(arguments, json!({"other": 1}));

        let mut arguments = json!({"dry_run": null});
        coerce_field(&mut arguments, "dry_run", ExpectedType::Optional(Box::new(ExpectedType::Bool))).unwrap();
        assert_eq!(arguments, json!({"dry_run": null}));
    }
}
