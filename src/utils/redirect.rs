use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

/// Accept only same-site targets: a path, not a scheme or `//host`
pub fn local_target(target: &str) -> Option<&str> {
    let target = target.trim();
    let local = target.starts_with('/')
        && !target.starts_with("//")
        && !target.starts_with("/\\")
        && !target.chars().any(char::is_control);

    local.then_some(target)
}

/// `302 Found` to a local target; `None` when the target is not local
pub fn found(target: &str) -> Option<Response> {
    let target = local_target(target)?;
    let location = HeaderValue::from_str(target).ok()?;
    Some((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_target() {
        assert_eq!(local_target("/account"), Some("/account"));
        assert_eq!(local_target(" /cart?step=2 "), Some("/cart?step=2"));
        assert_eq!(local_target("https://evil.example.com"), None);
        assert_eq!(local_target("//evil.example.com"), None);
        assert_eq!(local_target("/\\evil.example.com"), None);
        assert_eq!(local_target("account"), None);
    }

    #[test]
    fn test_found() {
        let response = found("/account").unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/account");
        assert!(found("http://elsewhere").is_none());
    }
}
