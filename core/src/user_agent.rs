/// Stable User-Agent string sent with every Canvas API request, so Canvas-side
/// request logs can attribute traffic to this integration and its version.
pub fn canvas_mcp_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let os_info = os_info::get();
    format!(
        "canvas-mcp-rs/{version} ({os_type} {os_version}; {arch})",
        os_type = os_info.os_type(),
        os_version = os_info.version(),
        arch = std::env::consts::ARCH,
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn user_agent_starts_with_product_token() {
        let ua = canvas_mcp_user_agent();
        assert!(ua.starts_with("canvas-mcp-rs/"));
    }
}
