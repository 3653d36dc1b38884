//! Local error page for the authorization endpoint.
//!
//! Rendered when the client or redirect URI cannot be trusted, so the error
//! is shown to the user instead of being sent to an unvalidated URI.

/// Styles for the error page.
const STYLES: &str = r#"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: #0d0e1a;
    min-height: 100vh;
    display: flex;
    justify-content: center;
    align-items: center;
    color: #f8f9fe;
    line-height: 1.5;
}

.card {
    max-width: 420px;
    padding: 2rem;
    border-radius: 12px;
    border: 1px solid rgba(255, 255, 255, 0.08);
    background: #141629;
    text-align: center;
}

.error-title {
    font-size: 1.25rem;
    font-weight: 600;
    margin-bottom: 0.5rem;
}

.error-description {
    color: #adb5bd;
    margin-bottom: 1rem;
}

.error-code {
    font-family: ui-monospace, monospace;
    font-size: 0.75rem;
    color: #ff4d3d;
}
"#;

/// Renders the authorization error page.
///
/// # Arguments
///
/// * `error_code` - OAuth error code (e.g., "invalid_request")
/// * `error_description` - Human-readable error description
#[must_use]
pub fn render_error_page(error_code: &str, error_description: &str) -> String {
    let mut html = String::with_capacity(2048);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("    <meta charset=\"UTF-8\">\n");
    html.push_str(
        "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    html.push_str("    <title>Authorization Error - keyward</title>\n");
    html.push_str("    <style>");
    html.push_str(STYLES);
    html.push_str("</style>\n</head>\n<body>\n");
    html.push_str("<div class=\"card\">\n");
    html.push_str("<div class=\"error-title\">Authorization Error</div>\n");
    html.push_str("<div class=\"error-description\">");
    html.push_str(&html_escape(error_description));
    html.push_str("</div>\n");
    html.push_str("<div class=\"error-code\">");
    html.push_str(&html_escape(error_code));
    html.push_str("</div>\n</div>\n</body>\n</html>");
    html
}

/// Simple HTML escaping to prevent XSS.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_page() {
        let html = render_error_page("invalid_request", "redirect_uri is not registered");
        assert!(html.contains("Authorization Error"));
        assert!(html.contains("invalid_request"));
        assert!(html.contains("redirect_uri is not registered"));
    }

    #[test]
    fn test_html_escape() {
        let html = render_error_page("invalid_request", "<script>alert('x')</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert_eq!(html_escape("a & \"b\""), "a &amp; &quot;b&quot;");
    }
}
