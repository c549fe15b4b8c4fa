use axum::http::HeaderMap;

use activity_domain::RuntimeConfig;

pub fn authorize(config: &RuntimeConfig, headers: &HeaderMap) -> bool {
    if let Some(api_token) = &config.api_token {
        return extract_bearer(headers)
            .map(|v| v == *api_token)
            .unwrap_or(false);
    }
    true
}

/// Browser websockets cannot set headers, so the stream also accepts
/// `?access_token=`.
pub fn authorize_stream(
    config: &RuntimeConfig,
    headers: &HeaderMap,
    access_token: Option<&str>,
) -> bool {
    if authorize(config, headers) {
        return true;
    }
    match (&config.api_token, access_token.map(str::trim)) {
        (Some(expected), Some(given)) => !given.is_empty() && given == expected,
        _ => false,
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("Authorization")?.to_str().ok()?.trim();
    let prefix = "Bearer ";
    if !value.starts_with(prefix) {
        return None;
    }
    let token = value[prefix.len()..].trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use activity_domain::SeedMode;

    fn config(api_token: Option<&str>) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            api_token: api_token.map(ToString::to_string),
            capacity: 15,
            watches: Vec::new(),
            seed_mode: SeedMode::None,
            seed_path: String::new(),
            subscribe_timeout_seconds: 1,
            retry_initial_millis: 1,
            retry_max_millis: 1,
            retry_max_attempts: 0,
            max_body_bytes: 1024,
            request_timeout_seconds: 1,
        }
    }

    #[test]
    fn open_when_no_token_configured() {
        assert!(authorize(&config(None), &HeaderMap::new()));
    }

    #[test]
    fn bearer_token_must_match() {
        let config = config(Some("secret"));
        let mut headers = HeaderMap::new();
        assert!(!authorize(&config, &headers));
        headers.insert("Authorization", "Bearer secret".parse().unwrap());
        assert!(authorize(&config, &headers));
        headers.insert("Authorization", "Bearer nope".parse().unwrap());
        assert!(!authorize(&config, &headers));
    }

    #[test]
    fn stream_accepts_query_token() {
        let config = config(Some("secret"));
        assert!(authorize_stream(&config, &HeaderMap::new(), Some("secret")));
        assert!(!authorize_stream(&config, &HeaderMap::new(), Some("")));
        assert!(!authorize_stream(&config, &HeaderMap::new(), None));
    }
}
