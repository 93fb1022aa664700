//! Guarded copying of inbound headers onto outbound requests.

use http::{HeaderMap, HeaderName, HeaderValue};

/// Longest accepted `name + value`, well below common proxy limits.
pub const MAX_HEADER_LENGTH: usize = 1024;

/// Why a header was not copied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum HeaderCopyError {
    /// Name plus value exceeds [`MAX_HEADER_LENGTH`].
    #[error("header {name} is too long ({length} bytes)")]
    TooLong {
        /// Header name.
        name: String,
        /// Combined length of name and value.
        length: usize,
    },

    /// The name or a value contains CR or LF, or the name is not a valid header name.
    #[error("header {name} contains invalid characters")]
    InvalidCharacters {
        /// Header name, with control characters escaped.
        name: String,
    },
}

/// Copies every value of header `name` from `from` to `to`.
///
/// All values are checked before any is copied, so `to` is unchanged on
/// error. Returns the number of values copied; an absent header copies
/// nothing.
///
/// # Errors
///
/// - [`HeaderCopyError::InvalidCharacters`] if the name or a value holds CR/LF
/// - [`HeaderCopyError::TooLong`] if a name and value together exceed [`MAX_HEADER_LENGTH`]
///
/// # Example
///
/// ```
/// use http::HeaderMap;
/// use linkbridge_server::headers::safe_copy_header;
///
/// let mut from = HeaderMap::new();
/// from.insert("x-application-authorization", "Bearer abc".parse().unwrap());
/// let mut to = HeaderMap::new();
///
/// assert_eq!(safe_copy_header(&from, "x-application-authorization", &mut to), Ok(1));
/// assert_eq!(to["x-application-authorization"], "Bearer abc");
/// ```
pub fn safe_copy_header(
    from: &HeaderMap,
    name: &str,
    to: &mut HeaderMap,
) -> Result<usize, HeaderCopyError> {
    let invalid = || HeaderCopyError::InvalidCharacters { name: name.escape_debug().to_string() };
    if name.contains(['\r', '\n']) {
        return Err(invalid());
    }
    let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;

    let values: Vec<&HeaderValue> = from.get_all(&header).iter().collect();
    for value in &values {
        if value.as_bytes().iter().any(|b| matches!(b, b'\r' | b'\n')) {
            return Err(invalid());
        }
        let length = name.len() + value.len();
        if length > MAX_HEADER_LENGTH {
            return Err(HeaderCopyError::TooLong { name: name.to_owned(), length });
        }
    }

    for value in &values {
        to.append(header.clone(), (*value).clone());
    }
    Ok(values.len())
}
