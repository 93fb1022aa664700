//! Covered request components and their canonical values.
//!
//! A component is either a derived component (name starts with `@`) or a
//! lowercase header field name. Values are resolved from a [`RequestView`],
//! which borrows the method, URI and headers of an `http::Request`.

use std::{fmt, str::FromStr};

use http::{HeaderMap, Method, Uri};

use crate::error::AuthError;

/// Header component that carries the body digest.
pub const CONTENT_DIGEST: &str = "content-digest";

/// One covered component of a signed request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Component {
    /// `@method`: the request method, uppercase.
    Method,
    /// `@authority`: host and optional port, lowercase.
    Authority,
    /// `@scheme`: URI scheme, lowercase.
    Scheme,
    /// `@target-uri`: the absolute request URI.
    TargetUri,
    /// `@request-target`: path and query as sent on the request line.
    RequestTarget,
    /// `@path`: the path only.
    Path,
    /// `@query`: the query including the leading `?`.
    Query,
    /// A header field, by lowercase name.
    Header(String),
}

impl Component {
    /// Canonical component name as it appears in the signature base.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Method => "@method",
            Self::Authority => "@authority",
            Self::Scheme => "@scheme",
            Self::TargetUri => "@target-uri",
            Self::RequestTarget => "@request-target",
            Self::Path => "@path",
            Self::Query => "@query",
            Self::Header(name) => name,
        }
    }

    /// Returns `true` for the `content-digest` header component.
    #[must_use]
    pub fn is_content_digest(&self) -> bool {
        matches!(self, Self::Header(name) if name == CONTENT_DIGEST)
    }

    /// Resolves this component's value, or `None` if the request lacks it.
    #[must_use]
    pub fn value(&self, request: &RequestView<'_>) -> Option<String> {
        match self {
            Self::Method => Some(request.method.as_str().to_owned()),
            Self::Authority => request.authority(),
            Self::Scheme => request.uri.scheme_str().map(str::to_ascii_lowercase),
            Self::TargetUri => {
                let scheme = request.uri.scheme_str()?;
                let authority = request.authority()?;
                Some(format!("{}://{authority}{}", scheme.to_ascii_lowercase(), request.target()))
            },
            Self::RequestTarget => Some(request.target()),
            Self::Path => Some(match request.uri.path() {
                "" => "/".to_owned(),
                path => path.to_owned(),
            }),
            Self::Query => Some(format!("?{}", request.uri.query().unwrap_or_default())),
            Self::Header(name) => header_value(request.headers, name),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Component {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let component = match lower.as_str() {
            "@method" => Self::Method,
            "@authority" => Self::Authority,
            "@scheme" => Self::Scheme,
            "@target-uri" => Self::TargetUri,
            "@request-target" => Self::RequestTarget,
            "@path" => Self::Path,
            "@query" => Self::Query,
            derived if derived.starts_with('@') => {
                return Err(AuthError::signing_config(format!(
                    "unsupported derived component '{derived}'"
                )));
            },
            name => {
                if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
                    return Err(AuthError::signing_config(format!(
                        "invalid header component '{name}'"
                    )));
                }
                Self::Header(name.to_owned())
            },
        };
        Ok(component)
    }
}

/// Parses a list of component names, rejecting duplicates.
///
/// # Errors
///
/// Returns [`AuthError::SigningConfig`] for an unknown derived component, an
/// invalid header name, a duplicate or an empty list.
pub fn parse_components<I, S>(names: I) -> Result<Vec<Component>, AuthError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut components: Vec<Component> = Vec::new();
    for name in names {
        let component: Component = name.as_ref().parse()?;
        if components.contains(&component) {
            return Err(AuthError::signing_config(format!("component '{component}' listed twice")));
        }
        components.push(component);
    }
    if components.is_empty() {
        return Err(AuthError::signing_config("at least one component must be covered"));
    }
    Ok(components)
}

/// The parts of an HTTP request that components are resolved from.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    /// Request method.
    pub method: &'a Method,
    /// Request URI, absolute or origin-form.
    pub uri: &'a Uri,
    /// Request headers.
    pub headers: &'a HeaderMap,
}

impl<'a> RequestView<'a> {
    /// Borrows the method, URI and headers of `request`.
    #[must_use]
    pub fn of<B>(request: &'a http::Request<B>) -> Self {
        Self { method: request.method(), uri: request.uri(), headers: request.headers() }
    }

    fn authority(&self) -> Option<String> {
        if let Some(authority) = self.uri.authority() {
            return Some(authority.as_str().to_ascii_lowercase());
        }
        header_value(self.headers, http::header::HOST.as_str()).map(|h| h.to_ascii_lowercase())
    }

    fn target(&self) -> String {
        match self.uri.path_and_query() {
            Some(pq) if !pq.as_str().is_empty() => pq.as_str().to_owned(),
            _ => "/".to_owned(),
        }
    }
}

/// All values of header `name`, trimmed and joined with `", "`.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let mut values = headers.get_all(name).iter().peekable();
    values.peek()?;

    let mut joined = String::new();
    for (i, value) in values.enumerate() {
        if i > 0 {
            joined.push_str(", ");
        }
        joined.push_str(String::from_utf8_lossy(value.as_bytes()).trim());
    }
    Some(joined)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn request(uri: &str) -> http::Request<()> {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("Host", "Example.com")
            .header("X-Multi", " a ")
            .header("X-Multi", "b")
            .body(())
            .unwrap()
    }

    #[rstest]
    #[case::method("@method", Some("POST"))]
    #[case::authority("@authority", Some("example.com:8443"))]
    #[case::scheme("@scheme", Some("https"))]
    #[case::target_uri("@target-uri", Some("https://example.com:8443/parabol/notify?x=1"))]
    #[case::request_target("@request-target", Some("/parabol/notify?x=1"))]
    #[case::path("@path", Some("/parabol/notify"))]
    #[case::query("@query", Some("?x=1"))]
    #[case::multi_header("x-multi", Some("a, b"))]
    #[case::missing_header("x-absent", None)]
    fn test_absolute_uri_values(#[case] name: &str, #[case] expected: Option<&str>) {
        let req = request("https://Example.com:8443/parabol/notify?x=1");
        let component: Component = name.parse().unwrap();
        assert_eq!(component.value(&RequestView::of(&req)).as_deref(), expected);
    }

    #[test]
    fn test_origin_form_uses_host_header() {
        let req = request("/notify");
        let view = RequestView::of(&req);

        assert_eq!(Component::Authority.value(&view).as_deref(), Some("example.com"));
        assert_eq!(Component::Scheme.value(&view), None);
        assert_eq!(Component::TargetUri.value(&view), None);
        assert_eq!(Component::Query.value(&view).as_deref(), Some("?"));
    }

    #[test]
    fn test_parse_normalizes_case() {
        assert_eq!(
            "Content-Digest".parse::<Component>().unwrap(),
            Component::Header(CONTENT_DIGEST.into())
        );
        assert!("content-digest".parse::<Component>().unwrap().is_content_digest());
        assert_eq!("@METHOD".parse::<Component>().unwrap(), Component::Method);
    }

    #[rstest]
    #[case::unknown_derived(&["@status"])]
    #[case::bad_header(&["bad header"])]
    #[case::duplicate(&["@method", "@METHOD"])]
    #[case::empty(&[])]
    fn test_parse_components_rejects(#[case] names: &[&str]) {
        assert!(matches!(parse_components(names), Err(AuthError::SigningConfig(_))));
    }
}
