//! Signature parameters and the canonical signature base.
//!
//! The signature base is one line per covered component, in covered order,
//! followed by the parameters line:
//!
//! ```text
//! "@method": POST
//! "@request-target": /notify/C1
//! "content-digest": sha-256=:...:
//! "@signature-params": ("@method" "@request-target" "content-digest");created=1700000000;expires=1700000060;keyid="parabol";alg="hmac-sha256"
//! ```
//!
//! Lines are joined with `\n` and there is no trailing newline.

use crate::{
    components::{Component, RequestView},
    keys::Algorithm,
};

/// Parameters attached to one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    /// Covered components, in signing order.
    pub components: Vec<Component>,
    /// Creation time, Unix seconds.
    pub created: i64,
    /// Expiry time, Unix seconds.
    pub expires: Option<i64>,
    /// Key identifier.
    pub key_id: String,
    /// Signing algorithm.
    pub algorithm: Option<Algorithm>,
    /// Application tag.
    pub tag: Option<String>,
}

impl SignatureParams {
    /// Serializes to the `Signature-Input` member value.
    #[must_use]
    pub fn serialize(&self) -> String {
        let names: Vec<String> =
            self.components.iter().map(|c| format!("\"{}\"", c.name())).collect();
        let mut out = format!("({});created={}", names.join(" "), self.created);
        if let Some(expires) = self.expires {
            out.push_str(&format!(";expires={expires}"));
        }
        out.push_str(&format!(";keyid=\"{}\"", self.key_id));
        if let Some(alg) = self.algorithm {
            out.push_str(&format!(";alg=\"{alg}\""));
        }
        if let Some(tag) = &self.tag {
            out.push_str(&format!(";tag=\"{tag}\""));
        }
        out
    }

    /// Parses a `Signature-Input` member value.
    ///
    /// # Errors
    ///
    /// Returns a description of the first syntax problem.
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        let rest = input.strip_prefix('(').ok_or("inner list must start with '('")?;
        let (list, params) = rest.split_once(')').ok_or("unterminated inner list")?;

        let mut components = Vec::new();
        for item in list.split_whitespace() {
            let name = unquote(item).ok_or_else(|| format!("component {item} is not quoted"))?;
            let component: Component =
                name.parse().map_err(|_| format!("unsupported component {item}"))?;
            components.push(component);
        }

        let mut created = None;
        let mut expires = None;
        let mut key_id = None;
        let mut algorithm = None;
        let mut tag = None;

        for param in split_params(params)? {
            let (name, value) =
                param.split_once('=').ok_or_else(|| format!("bad parameter {param}"))?;
            match name {
                "created" => created = Some(parse_int(name, value)?),
                "expires" => expires = Some(parse_int(name, value)?),
                "keyid" => key_id = Some(unquote(value).ok_or("keyid must be quoted")?.to_owned()),
                "alg" => {
                    let alg = unquote(value).ok_or("alg must be quoted")?;
                    algorithm = Some(alg.parse().map_err(|_| format!("unsupported alg {alg}"))?);
                },
                "tag" => tag = Some(unquote(value).ok_or("tag must be quoted")?.to_owned()),
                // Unrecognized parameters are covered by the signature and otherwise ignored.
                _ => {},
            }
        }

        Ok(Self {
            components,
            created: created.ok_or("missing created parameter")?,
            expires,
            key_id: key_id.ok_or("missing keyid parameter")?,
            algorithm,
            tag,
        })
    }
}

/// Builds the signature base for `components` of `request`.
///
/// `params` is the exact `Signature-Input` member value, so the verifier
/// signs over what the sender sent rather than a re-serialization.
///
/// # Errors
///
/// Returns the name of the first component the request does not carry.
pub fn signature_base(
    components: &[Component],
    request: &RequestView<'_>,
    params: &str,
) -> Result<String, String> {
    let mut base = String::new();
    for component in components {
        let value = component
            .value(request)
            .ok_or_else(|| format!("request has no value for {component}"))?;
        if value.contains(['\n', '\r']) {
            return Err(format!("{component} contains a line break"));
        }
        base.push_str(&format!("\"{}\": {value}\n", component.name()));
    }
    base.push_str(&format!("\"@signature-params\": {params}"));
    Ok(base)
}

/// Finds the member labelled `label` in a dictionary header such as
/// `Signature-Input` or `Signature`.
pub(crate) fn dictionary_member<'a>(header: &'a str, label: &str) -> Option<&'a str> {
    split_top_level(header, ',')
        .into_iter()
        .filter_map(|member| member.trim().split_once('='))
        .find(|(name, _)| name.trim() == label)
        .map(|(_, value)| value.trim())
}

/// Decodes a byte sequence item (`:<base64>:`).
pub(crate) fn byte_sequence(value: &str) -> Option<&str> {
    value.strip_prefix(':')?.strip_suffix(':')
}

fn unquote(value: &str) -> Option<&str> {
    value.strip_prefix('"')?.strip_suffix('"')
}

fn parse_int(name: &str, value: &str) -> Result<i64, String> {
    value.parse().map_err(|_| format!("{name} is not an integer"))
}

fn split_params(params: &str) -> Result<Vec<&str>, String> {
    let params = params.trim();
    if params.is_empty() {
        return Ok(Vec::new());
    }
    let params = params.strip_prefix(';').ok_or("parameters must start with ';'")?;
    Ok(split_top_level(params, ';').into_iter().map(str::trim).collect())
}

/// Splits on `sep` outside double quotes.
fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, ch) in input.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            c if c == sep && !quoted => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            },
            _ => {},
        }
    }
    parts.push(&input[start..]);
    parts
}
