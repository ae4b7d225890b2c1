use rand::{distributions::Alphanumeric, thread_rng, Rng};

/// Random identifier embedded in each refresh token, so two logins by the
/// same user in the same second still yield distinct tokens.
pub fn generate_token_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Refresh token cookie attached to a login response.
#[must_use]
pub fn refresh_cookie(token: &str, max_age_secs: u64) -> String {
    format!("refreshToken={token}; Max-Age={max_age_secs}; Path=/; HttpOnly; SameSite=Lax")
}

/// Find the refresh token in a `Cookie` header value.
#[must_use]
pub fn refresh_token_from_cookies(cookies: &str) -> Option<&str> {
    cookies
        .split(';')
        .find_map(|cookie| cookie.trim().strip_prefix("refreshToken="))
        .filter(|token| !token.is_empty())
}
