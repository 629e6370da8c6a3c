//! Cookie model and the jar shared between the HTTP client and the
//! credential file.
//!
//! Cookies are persisted with the capitalised field names the auth file has
//! always used:
//!
//! ```json
//! { "Name": "SID", "Value": "...", "Domain": ".google.com", "Path": "/", "Secure": true, "HttpOnly": false }
//! ```

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use reqwest::Url;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

/// Session cookie that must stay pinned to the photos host.
pub const HOST_ONLY_COOKIE: &str = "OTZ";
/// Host the [`HOST_ONLY_COOKIE`] is pinned to on save.
pub const PHOTOS_DOMAIN: &str = "photos.google.com";
/// Domain every other cookie is pinned to on save.
pub const PARENT_DOMAIN: &str = ".google.com";

/// A single cookie as stored in the auth file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// Expiry from `Expires`/`Max-Age`; `None` is a session cookie. Not
    /// persisted.
    #[serde(skip)]
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    /// Create a root-path cookie with no domain.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: "/".to_owned(),
            secure: false,
            http_only: false,
            expires: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|at| at <= Utc::now())
    }

    /// Copy of this cookie with domain and path pinned the way the service
    /// accepts them on reload.
    pub fn normalized(&self) -> Self {
        let domain = if self.name == HOST_ONLY_COOKIE {
            PHOTOS_DOMAIN
        } else {
            PARENT_DOMAIN
        };
        Self {
            domain: domain.to_owned(),
            path: "/".to_owned(),
            expires: None,
            ..self.clone()
        }
    }

    /// Whether this cookie should be sent to `url`.
    ///
    /// A cookie without a domain matches every host.
    pub fn matches(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or("");
        let domain = self.domain.trim_start_matches('.');
        let domain_ok = domain.is_empty()
            || host.eq_ignore_ascii_case(domain)
            || host.ends_with(&format!(".{domain}"));
        let path = if self.path.is_empty() { "/" } else { &self.path };
        domain_ok && url.path().starts_with(path) && (!self.secure || url.scheme() == "https")
    }

    /// Parse a `Set-Cookie` header received from `url`. Attributes other
    /// than `Domain`, `Path`, `Expires`, `Max-Age`, `Secure` and `HttpOnly`
    /// are ignored. `Max-Age` wins over `Expires`.
    pub fn parse_set_cookie(header: &str, url: &Url) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.trim().split_once('=')?;
        let mut cookie = Self::new(name.trim(), value.trim());
        cookie.domain = url.host_str().unwrap_or("").to_owned();
        let mut max_age = None;

        for part in parts {
            let part = part.trim();
            match part.split_once('=') {
                Some((attr, val)) if attr.trim().eq_ignore_ascii_case("domain") => {
                    cookie.domain = val.trim().to_owned();
                }
                Some((attr, val)) if attr.trim().eq_ignore_ascii_case("path") => {
                    cookie.path = val.trim().to_owned();
                }
                Some((attr, val)) if attr.trim().eq_ignore_ascii_case("expires") => {
                    cookie.expires = parse_http_date(val.trim());
                }
                Some((attr, val)) if attr.trim().eq_ignore_ascii_case("max-age") => {
                    max_age = val.trim().parse::<i64>().ok();
                }
                None if part.eq_ignore_ascii_case("secure") => cookie.secure = true,
                None if part.eq_ignore_ascii_case("httponly") => cookie.http_only = true,
                _ => {}
            }
        }
        if let Some(secs) = max_age {
            cookie.expires = Some(if secs <= 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                TimeDelta::try_seconds(secs)
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            });
        }
        Some(cookie)
    }
}

/// Thread-safe cookie storage, plugged into the HTTP client as its
/// [`CookieStore`].
///
/// Reads (building a `Cookie` header) take a shared lock; absorbing
/// `Set-Cookie` headers takes the exclusive lock.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<Vec<Cookie>>,
}

impl CookieJar {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self {
            cookies: RwLock::new(cookies),
        }
    }

    /// Insert a cookie, replacing any with the same name, domain and path.
    /// An already expired cookie only removes its predecessor.
    pub fn add(&self, cookie: Cookie) {
        let mut cookies = self.cookies.write();
        cookies.retain(|c| {
            !(c.name == cookie.name && c.path == cookie.path && same_domain(&c.domain, &cookie.domain))
        });
        if !cookie.is_expired() {
            cookies.push(cookie);
        }
    }

    /// Drop every cookie whose expiry has passed.
    pub fn remove_expired(&self) {
        self.cookies.write().retain(|c| !c.is_expired());
    }

    /// Snapshot of every live cookie, in insertion order.
    pub fn all(&self) -> Vec<Cookie> {
        self.cookies
            .read()
            .iter()
            .filter(|c| !c.is_expired())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cookies.read().iter().filter(|c| !c.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the `Cookie` header value for `url`.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies.read();
        let pairs: Vec<String> = cookies
            .iter()
            .filter(|c| !c.is_expired() && c.matches(url))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else { continue };
            if let Some(cookie) = Cookie::parse_set_cookie(raw, url) {
                if cookie.is_expired() {
                    tracing::debug!(name = %cookie.name, domain = %cookie.domain, "removing cookie");
                } else {
                    tracing::debug!(name = %cookie.name, domain = %cookie.domain, "absorbing cookie");
                }
                self.add(cookie);
            }
        }
        self.remove_expired();
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_for(url)
            .and_then(|value| HeaderValue::from_str(&value).ok())
    }
}

/// `Expires` values: RFC 2822 (`Wed, 21 Oct 2015 07:28:00 GMT`) or the
/// older dashed form (`Wed, 21-Oct-2015 07:28:00 GMT`).
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|at| at.and_utc())
}

fn same_domain(a: &str, b: &str) -> bool {
    a.trim_start_matches('.')
        .eq_ignore_ascii_case(b.trim_start_matches('.'))
}

/// Parse a browser `Cookie:` header (`a=1; b=2`) into cookies scoped to the
/// parent domain.
pub fn parse_cookie_header(header: &str) -> Vec<Cookie> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(
                Cookie {
                    secure: true,
                    ..Cookie::new(name, value.trim())
                }
                .normalized(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn normalization_pins_domains_and_path() {
        let otz = Cookie {
            domain: "accounts.google.com".into(),
            path: "/u/0".into(),
            ..Cookie::new("OTZ", "1")
        };
        let sid = Cookie {
            domain: "photos.google.com".into(),
            ..Cookie::new("SID", "2")
        };
        assert_eq!(otz.normalized().domain, "photos.google.com");
        assert_eq!(otz.normalized().path, "/");
        assert_eq!(sid.normalized().domain, ".google.com");
    }

    #[test]
    fn normalization_is_idempotent() {
        let c = Cookie::new("HSID", "x").normalized();
        assert_eq!(c.normalized(), c);
    }

    #[test]
    fn parent_domain_matches_subdomains() {
        let c = Cookie::new("SID", "x").normalized();
        assert!(c.matches(&url("https://photos.google.com/login")));
        assert!(c.matches(&url("https://google.com/")));
        assert!(!c.matches(&url("https://example.com/")));
    }

    #[test]
    fn secure_cookie_needs_https() {
        let c = Cookie {
            secure: true,
            ..Cookie::new("SID", "x")
        };
        assert!(!c.matches(&url("http://localhost/")));
        assert!(c.matches(&url("https://localhost/")));
    }

    #[test]
    fn parses_set_cookie_attributes() {
        let c = Cookie::parse_set_cookie(
            "NID=abc; expires=Sun, 01-Jan-2034 00:00:00 GMT; path=/; domain=.google.com; Secure; HttpOnly",
            &url("https://photos.google.com/"),
        )
        .unwrap();
        assert_eq!(c.name, "NID");
        assert_eq!(c.value, "abc");
        assert_eq!(c.domain, ".google.com");
        assert!(c.secure);
        assert!(c.http_only);
        assert_eq!(
            c.expires,
            DateTime::parse_from_rfc3339("2034-01-01T00:00:00Z")
                .ok()
                .map(|at| at.with_timezone(&Utc))
        );
        assert!(!c.is_expired());
    }

    #[test]
    fn max_age_overrides_expires() {
        let c = Cookie::parse_set_cookie(
            "NID=abc; Max-Age=0; Expires=Sun, 01 Jan 2034 00:00:00 GMT",
            &url("https://photos.google.com/"),
        )
        .unwrap();
        assert!(c.is_expired());
    }

    #[test]
    fn deletion_header_removes_cookie() {
        let jar = CookieJar::new(vec![
            Cookie {
                domain: "photos.google.com".into(),
                ..Cookie::new("SID", "live")
            },
            Cookie::new("HSID", "h"),
        ]);
        let headers = [HeaderValue::from_static(
            "SID=; Max-Age=0; Path=/; Domain=photos.google.com",
        )];
        jar.set_cookies(&mut headers.iter(), &url("https://photos.google.com/"));

        assert_eq!(jar.len(), 1);
        assert!(jar.all().iter().all(|c| c.name != "SID"));
        assert_eq!(
            jar.header_for(&url("https://photos.google.com/")).as_deref(),
            Some("HSID=h")
        );
    }

    #[test]
    fn past_expiry_is_never_sent_or_saved() {
        let jar = CookieJar::new(vec![Cookie {
            domain: "localhost".into(),
            ..Cookie::new("a", "1")
        }]);
        let headers = [HeaderValue::from_static(
            "a=; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        )];
        jar.set_cookies(&mut headers.iter(), &url("http://localhost/"));
        assert!(jar.is_empty());
        assert_eq!(jar.header_for(&url("http://localhost/")), None);
    }

    #[test]
    fn expiry_is_not_persisted() {
        let c = Cookie::parse_set_cookie("NID=abc; Max-Age=3600", &url("https://photos.google.com/"))
            .unwrap();
        assert!(c.expires.is_some());
        let json = serde_json::to_value(&c).unwrap();
        assert!(json.get("Expires").is_none());
        assert_eq!(c.normalized().expires, None);
    }

    #[test]
    fn jar_replaces_same_cookie() {
        let jar = CookieJar::default();
        jar.add(Cookie::new("a", "1"));
        jar.add(Cookie::new("a", "2"));
        jar.add(Cookie::new("b", "3"));
        assert_eq!(jar.len(), 2);
        assert_eq!(
            jar.header_for(&url("http://localhost/")).as_deref(),
            Some("a=2; b=3")
        );
    }

    #[test]
    fn cookie_header_roundtrip_into_cookies() {
        let cookies = parse_cookie_header("SID=abc; OTZ=7;  HSID = q ;broken");
        let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["SID", "OTZ", "HSID"]);
        assert_eq!(cookies[1].domain, "photos.google.com");
        assert_eq!(cookies[2].value, "q");
    }
}
