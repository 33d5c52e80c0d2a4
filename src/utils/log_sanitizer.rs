// ============================================================================
// Log Sanitization
// ============================================================================
//
// Request params, emails and ERP messages are user or third-party input.
// Everything logged from them goes through these helpers so a crafted value
// cannot forge log lines or leak a full customer address.
//
// ============================================================================

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::params::ParamsBag;

/// Maximum length for a logged value
const MAX_LOG_LENGTH: usize = 200;

static ANSI_ESCAPE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("static regex")
});

/// Strip ANSI sequences and control characters, flatten newlines, truncate.
///
/// ```
/// use shop_invader::utils::log_sanitizer::sanitize_for_log;
///
/// assert_eq!(sanitize_for_log("admin\nINFO: forged"), "admin INFO: forged");
/// assert_eq!(sanitize_for_log("a\x1b[31mred\x1b[0m"), "ared");
/// ```
pub fn sanitize_for_log(input: &str) -> String {
    let cleaned: String = ANSI_ESCAPE_REGEX
        .replace_all(input, "")
        .chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    if cleaned.chars().count() > MAX_LOG_LENGTH {
        let truncated: String = cleaned.chars().take(MAX_LOG_LENGTH).collect();
        format!("{}...", truncated)
    } else {
        cleaned
    }
}

/// Keep the first character of the local part and the full domain.
///
/// ```
/// use shop_invader::utils::log_sanitizer::mask_email;
///
/// assert_eq!(mask_email("alice@example.com"), "a***@example.com");
/// assert_eq!(mask_email(""), "[none]");
/// ```
pub fn mask_email(email: &str) -> String {
    let email = sanitize_for_log(email.trim());
    if email.is_empty() {
        return "[none]".to_string();
    }

    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}", first, domain)
        }
        None => "[invalid-email]".to_string(),
    }
}

/// Parameter names only; values never reach the logs
pub fn params_for_log(params: &ParamsBag) -> String {
    let keys: Vec<String> = params.keys().map(|key| sanitize_for_log(key)).collect();
    format!("[{}]", keys.join(", "))
}
