use cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};

use crate::identity::BEARER_PREFIX;

pub const ACCESS_COOKIE: &str = "access_token";

pub fn access_cookie(token: &str, ttl: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((ACCESS_COOKIE, format!("{BEARER_PREFIX}{token}")))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(ttl)
        .build()
}

/// Logout only forgets the cookie client-side; the token itself stays valid
/// until it expires.
pub fn cleared_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((ACCESS_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn access_attributes() {
        let header = access_cookie("abc.def.ghi", Duration::seconds(86_400), false).to_string();

        assert!(header.starts_with("access_token=Bearer abc.def.ghi"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Max-Age=86400"));
        assert!(!header.contains("Secure"));

        let header = access_cookie("t", Duration::seconds(60), true).to_string();
        assert!(header.contains("Secure"));
    }

    #[test]
    fn cleared() {
        let header = cleared_cookie(false).to_string();

        assert!(header.starts_with("access_token=;"));
        assert!(header.contains("Max-Age=0"));
    }
}
