//! Pre-upload file validation and the three-step Canvas file-upload
//! orchestration: request an upload slot, PUT the bytes to the returned
//! storage URL, then confirm (following a redirect if Canvas asks for one).

use std::collections::HashSet;
use std::path::Path;

use reqwest::Method;
use serde_json::Value;

use crate::error::CoreError;
use crate::error::Result;
use crate::gateway::CanvasGateway;
use crate::gateway::RequestBody;

pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 100 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &[
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "csv", "rtf", "odt", "ods", "odp",
    // code / text
    "md", "py", "js", "ts", "html", "css", "json", "xml", "java", "c", "cpp", "h", "rb", "go", "rs",
    "sql", "ipynb", "r", "rmd",
    // images
    "png", "jpg", "jpeg", "gif", "svg", "webp", "bmp", "ico",
    // archives
    "zip", "tar", "gz", "7z",
    // audio / video
    "mp3", "mp4", "wav", "m4a", "webm", "mov",
];

pub struct FileMetadata {
    pub file_size: u64,
    pub mime_type: String,
    pub sanitized_name: String,
}

/// Validates a local file is a sane upload candidate before Canvas is ever
/// contacted: exists, readable, non-empty, within the size limit, and has an
/// allowed extension.
pub fn validate_file_for_upload(path: &Path, max_size_bytes: u64) -> Result<FileMetadata> {
    let metadata = std::fs::metadata(path)
        .map_err(|_| CoreError::Validation(format!("file does not exist: {}", path.display())))?;

    if !metadata.is_file() {
        return Err(CoreError::Validation(format!("not a file: {}", path.display())));
    }

    let size = metadata.len();
    if size == 0 {
        return Err(CoreError::Validation(format!("file is empty: {}", path.display())));
    }
    if size > max_size_bytes {
        return Err(CoreError::Validation(format!(
            "file size {:.1} MB exceeds limit of {:.1} MB",
            size as f64 / (1024.0 * 1024.0),
            max_size_bytes as f64 / (1024.0 * 1024.0),
        )));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();
    let allowed: HashSet<&str> = ALLOWED_EXTENSIONS.iter().copied().collect();
    if !allowed.contains(extension.as_str()) {
        return Err(CoreError::Validation(format!(
            "file extension '.{extension}' is not allowed"
        )));
    }

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file");

    Ok(FileMetadata {
        file_size: size,
        mime_type: detect_mime_type(&extension),
        sanitized_name: sanitize_filename(filename),
    })
}

fn detect_mime_type(extension: &str) -> String {
    mime_guess::from_ext(extension)
        .first()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Replaces whitespace with underscores, strips anything but
/// alphanumerics/underscore/hyphen/dot, collapses repeated underscores, and
/// caps the stem at 200 characters.
pub fn sanitize_filename(filename: &str) -> String {
    let path = Path::new(filename);
    let extension = path.extension().and_then(|e| e.to_str()).map(|e| format!(".{e}")).unwrap_or_default();
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");

    let replaced: String = stem
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' { c } else { '_' })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    let mut last_was_underscore = false;
    for c in replaced.chars() {
        if c == '_' {
            if !last_was_underscore {
                collapsed.push(c);
            }
            last_was_underscore = true;
        } else {
            collapsed.push(c);
            last_was_underscore = false;
        }
    }

    let trimmed = collapsed.trim_matches('_');
    let stem = if trimmed.is_empty() { "file" } else { trimmed };
    let stem: String = stem.chars().take(200).collect();

    format!("{stem}{extension}")
}

pub fn format_file_size(size_bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit_index = 0;
    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }
    if unit_index == 0 {
        format!("{size_bytes} {}", UNITS[unit_index])
    } else {
        format!("{size:.1} {}", UNITS[unit_index])
    }
}

/// Runs Canvas's three-step upload protocol against an already-validated
/// local file and returns the confirmed file resource.
pub async fn upload_course_file(
    gateway: &CanvasGateway,
    course_id: &str,
    file_bytes: Vec<u8>,
    metadata: &FileMetadata,
    on_duplicate: &str,
    parent_folder_path: Option<&str>,
) -> Result<Value> {
    let mut form = vec![
        ("name".to_string(), metadata.sanitized_name.clone()),
        ("size".to_string(), metadata.file_size.to_string()),
        ("content_type".to_string(), metadata.mime_type.clone()),
        ("on_duplicate".to_string(), on_duplicate.to_string()),
    ];
    if let Some(folder) = parent_folder_path {
        form.push(("parent_folder_path".to_string(), folder.to_string()));
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&form)
        .finish();

    let slot = gateway
        .request(
            Method::POST,
            &format!("/courses/{course_id}/files"),
            &[],
            Some(RequestBody::FormEncoded(encoded)),
            true,
        )
        .await?;

    let upload_url = slot
        .get("upload_url")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::CanvasApi {
            status: 502,
            message: "Canvas did not return an upload_url".to_string(),
        })?;
    let upload_params = slot
        .get("upload_params")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    gateway
        .upload_to_storage(
            upload_url,
            &upload_params,
            &metadata.sanitized_name,
            &metadata.mime_type,
            file_bytes,
        )
        .await
}
