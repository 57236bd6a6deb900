//! Input-parameter structs and JSON-schema generation for the representative
//! tool surface. Each Canvas tool in the full integration follows this same
//! shape; only five are implemented here, chosen to exercise every core
//! component at least once (gateway, paginator, course cache, bulk grader,
//! file upload).

use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use serde::Deserialize;
use serde_json::Value;

use mcp_types::Tool;
use mcp_types::ToolInputSchema;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListCoursesParams {
    /// Canvas `enrollment_state` filter, e.g. "active" or "completed". Omit for all states.
    #[serde(default)]
    pub enrollment_state: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetCourseParams {
    /// Canvas numeric course ID, SIS course code, or `sis_course_id:...` identifier.
    pub course_identifier: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GradeSubmissionParams {
    pub course_identifier: String,
    pub assignment_id: String,
    pub user_id: String,
    /// Plain numeric/letter grade. Mutually exclusive with `rubric_assessment`.
    #[serde(default)]
    pub grade: Option<String>,
    /// Map of rubric criterion ID to `{points, rating_id, comments}`.
    #[serde(default)]
    pub rubric_assessment: Option<Value>,
    #[serde(default)]
    pub comment: Option<String>,
    /// If true, validates and reports what would happen without submitting a grade.
    #[serde(default)]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BulkGradeSubmissionsParams {
    pub course_identifier: String,
    pub assignment_id: String,
    /// Map of Canvas user ID to `{grade}` or `{rubric_assessment, comment}`.
    pub grades: Value,
    #[serde(default)]
    pub dry_run: Option<bool>,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UploadCourseFileParams {
    pub course_identifier: String,
    /// Absolute path to the local file to upload.
    pub file_path: String,
    /// "rename" or "overwrite" when a same-named file already exists.
    #[serde(default)]
    pub on_duplicate: Option<String>,
    #[serde(default)]
    pub parent_folder_path: Option<String>,
}

pub fn build_tool<T: JsonSchema>(name: &str, description: &str) -> Tool {
    let settings = SchemaSettings::draft2019_09().with(|s| {
        s.inline_subschemas = true;
        s.option_add_null_type = false;
    });
    let generator = settings.into_generator();
    let schema = generator.into_root_schema_for::<T>();
    let schema_value = serde_json::to_value(&schema).unwrap_or(Value::Null);

    let input_schema: ToolInputSchema = serde_json::from_value(schema_value).unwrap_or(ToolInputSchema {
        r#type: "object".to_string(),
        properties: None,
        required: None,
    });

    Tool {
        name: name.to_string(),
        input_schema,
        description: Some(description.to_string()),
        annotations: None,
    }
}

pub fn representative_tools() -> Vec<Tool> {
    vec![
        build_tool::<ListCoursesParams>("list_courses", "List courses visible to this Canvas token."),
        build_tool::<GetCourseParams>("get_course", "Fetch a single course by identifier."),
        build_tool::<GradeSubmissionParams>(
            "grade_submission",
            "Grade one student's submission, with a plain grade or a rubric assessment.",
        ),
        build_tool::<BulkGradeSubmissionsParams>(
            "bulk_grade_submissions",
            "Grade many students' submissions for one assignment concurrently.",
        ),
        build_tool::<UploadCourseFileParams>(
            "upload_course_file",
            "Upload a local file into a course's Canvas file storage.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn every_representative_tool_has_an_object_schema() {
        for tool in representative_tools() {
            assert_eq!(tool.input_schema.r#type, "object");
        }
    }

    #[test]
    fn get_course_requires_course_identifier() {
        let tool = build_tool::<GetCourseParams>("get_course", "desc");
        let required = tool.input_schema.required.expect("required list");
        assert!(required.contains(&"course_identifier".to_string()));
    }
}
