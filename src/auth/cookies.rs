//! Session cookies carrying the token pair.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};

use crate::auth::session::TokenPair;
use crate::config::{AuthConfig, SameSitePolicy};

/// Cookie carrying the access token.
pub const ACCESS_COOKIE_NAME: &str = "jwt";

/// Cookie carrying the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Attributes shared by both session cookies.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    domain: Option<String>,
    secure: bool,
    same_site: SameSite,
}

impl CookiePolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        let same_site = match config.same_site {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::None => SameSite::None,
        };
        Self { domain: config.cookie_domain.clone(), secure: config.cookie_secure, same_site }
    }

    fn build(
        &self,
        name: &'static str,
        value: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Cookie<'static> {
        let mut builder = Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site);

        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }

        builder = match expires_at {
            Some(expires_at) => {
                let remaining = (expires_at - Utc::now()).num_seconds().max(0);
                builder.max_age(time::Duration::seconds(remaining)).expires(
                    time::OffsetDateTime::from_unix_timestamp(expires_at.timestamp()).ok(),
                )
            }
            None => builder.max_age(time::Duration::ZERO).expires(time::OffsetDateTime::UNIX_EPOCH),
        };

        builder.build()
    }

    /// Add both session cookies for `pair` to the jar.
    pub fn set_session(&self, jar: CookieJar, pair: &TokenPair) -> CookieJar {
        let access =
            self.build(ACCESS_COOKIE_NAME, pair.access_token.clone(), Some(pair.access_expires_at));
        let refresh =
            self.build(REFRESH_COOKIE_NAME, pair.refresh_token.clone(), Some(pair.refresh_expires_at));
        jar.add(access).add(refresh)
    }

    /// Overwrite both session cookies with expired blanks.
    pub fn clear_session(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.build(ACCESS_COOKIE_NAME, String::new(), None))
            .add(self.build(REFRESH_COOKIE_NAME, String::new(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pair() -> TokenPair {
        TokenPair {
            access_token: "access".to_string(),
            access_expires_at: Utc::now() + Duration::seconds(3600),
            refresh_token: "refresh".to_string(),
            refresh_expires_at: Utc::now() + Duration::seconds(7200),
        }
    }

    #[test]
    fn session_cookies_are_scoped() {
        let config = AuthConfig {
            cookie_domain: Some("hack.example.com".to_string()),
            same_site: SameSitePolicy::Strict,
            ..Default::default()
        };
        let jar = CookiePolicy::from_config(&config).set_session(CookieJar::new(), &pair());

        let access = jar.get(ACCESS_COOKIE_NAME).unwrap();
        assert_eq!(access.value(), "access");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::Strict));
        assert_eq!(access.path(), Some("/"));
        assert_eq!(access.domain(), Some("hack.example.com"));

        let refresh = jar.get(REFRESH_COOKIE_NAME).unwrap();
        assert_eq!(refresh.value(), "refresh");
        assert!(refresh.max_age().unwrap() > access.max_age().unwrap());
    }

    #[test]
    fn cleared_cookies_expire_immediately() {
        let policy = CookiePolicy::from_config(&AuthConfig::default());
        let jar = policy.clear_session(policy.set_session(CookieJar::new(), &pair()));

        let access = jar.get(ACCESS_COOKIE_NAME).unwrap();
        assert_eq!(access.value(), "");
        assert_eq!(access.max_age(), Some(time::Duration::ZERO));
    }
}
