//! Encodes a rubric assessment as Canvas's bracketed form-field
//! (`rubric_assessment[criterion_id][points]`) wire format. Built on the same
//! repeated-key-capable encoder the gateway uses elsewhere, since other
//! Canvas endpoints (e.g. `module[prerequisite_module_ids][]`) need genuinely
//! repeated keys even though a single rubric assessment's keys happen to be
//! unique.

use serde_json::Map;
use serde_json::Value;
use url::form_urlencoded::Serializer;

/// Builds the `application/x-www-form-urlencoded` body for a
/// `PUT /courses/{id}/assignments/{id}/submissions/{user_id}` rubric grade.
pub fn encode_rubric_assessment(rubric_assessment: &Map<String, Value>, comment: Option<&str>) -> String {
    let mut serializer = Serializer::new(String::new());

    for (criterion_id, assessment) in rubric_assessment {
        let Value::Object(fields) = assessment else {
            continue;
        };
        if let Some(points) = fields.get("points") {
            serializer.append_pair(
                &format!("rubric_assessment[{criterion_id}][points]"),
                &stringify(points),
            );
        }
        if let Some(rating_id) = fields.get("rating_id") {
            serializer.append_pair(
                &format!("rubric_assessment[{criterion_id}][rating_id]"),
                &stringify(rating_id),
            );
        }
        if let Some(comments) = fields.get("comments") {
            serializer.append_pair(
                &format!("rubric_assessment[{criterion_id}][comments]"),
                &stringify(comments),
            );
        }
    }

    if let Some(comment) = comment {
        serializer.append_pair("comment[text_comment]", comment);
    }

    serializer.finish()
}

/// Builds the simple (non-rubric) grading body: `submission[posted_grade]`
/// plus an optional comment.
pub fn encode_simple_grade(grade: &str, comment: Option<&str>) -> String {
    let mut serializer = Serializer::new(String::new());
    serializer.append_pair("submission[posted_grade]", grade);
    if let Some(comment) = comment {
        serializer.append_pair("comment[text_comment]", comment);
    }
    serializer.finish()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Sum of a rubric assessment's per-criterion points, used for dry-run
/// previews and summary reporting.
pub fn total_rubric_points(rubric_assessment: &Map<String, Value>) -> f64 {
    rubric_assessment
        .values()
        .filter_map(|assessment| assessment.get("points"))
        .filter_map(Value::as_f64)
        .sum()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_bracketed_fields_per_criterion() {
        let rubric = json!({
            "101": {"points": 8, "comments": "good work"},
            "102": {"rating_id": "r1"},
        });
        let Value::Object(rubric) = rubric else { unreachable!() };
        let encoded = encode_rubric_assessment(&rubric, Some("great job"));
        assert!(encoded.contains("rubric_assessment%5B101%5D%5Bpoints%5D=8"));
        assert!(encoded.contains("rubric_assessment%5B101%5D%5Bcomments%5D=good+work"));
        assert!(encoded.contains("rubric_assessment%5B102%5D%5Brating_id%5D=r1"));
        assert!(encoded.contains("comment%5Btext_comment%5D=great+job"));
    }

    #[test]
    fn simple_grade_encodes_posted_grade() {
        let encoded = encode_simple_grade("95", None);
        assert_eq!(encoded, "submission%5Bposted_grade%5D=95");
    }

    #[test]
    fn form_encoder_preserves_every_repeated_key_occurrence() {
        // Canvas's bracket-array wire format (e.g. `module[prerequisite_module_ids][]`)
        // needs three separate `k=` occurrences, not the last one winning.
        let mut serializer = Serializer::new(String::new());
        for value in ["a", "b", "c"] {
            serializer.append_pair("k", value);
        }
        assert_eq!(serializer.finish(), "k=a&k=b&k=c");
    }

    #[test]
    fn total_points_sums_across_criteria() {
        let rubric = json!({
            "101": {"points": 8},
            "102": {"points": 4.5},
        });
        let Value::Object(rubric) = rubric else { unreachable!() };
        assert_eq!(total_rubric_points(&rubric), 12.5);
    }
}
