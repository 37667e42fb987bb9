use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

pub(crate) const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Secure `HttpOnly` cookie carrying the refresh token.
pub(crate) fn refresh_cookie(token: &str, ttl_seconds: i64) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={ttl_seconds}"
    ))
}

pub(crate) fn clear_refresh_cookie() -> HeaderValue {
    HeaderValue::from_static(
        "refreshToken=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0",
    )
}

pub(crate) fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == REFRESH_COOKIE_NAME && !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn cookie_attributes() -> Result<()> {
        let cookie = refresh_cookie("abc", 60)?;
        let value = cookie.to_str()?;
        assert!(value.starts_with("refreshToken=abc;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Secure"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.ends_with("Max-Age=60"));

        assert!(clear_refresh_cookie().to_str()?.contains("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn refresh_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        assert!(extract_refresh_token(&headers).is_none());

        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; refreshToken=tok-1"));
        assert_eq!(extract_refresh_token(&headers).as_deref(), Some("tok-1"));

        headers.insert(COOKIE, HeaderValue::from_static("refreshToken="));
        assert!(extract_refresh_token(&headers).is_none());
    }
}
