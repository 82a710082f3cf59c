//! Canonical string construction for parameter signatures.
//!
//! The canonical string is built from the request parameters and the
//! application secret as follows:
//!
//! ```text
//! name1=value1&name2=value2&...&nameN=valueN&appSecret=<secret>
//! ```
//!
//! Parameter names are sorted lexicographically (by byte value), the `sign`
//! parameter is excluded, and parameters with blank values are skipped. The
//! result is deterministic for a given parameter set regardless of the order
//! the parameters arrived in.
//!
//! Within names and values, `%`, `&` and `=` are percent-encoded so that two
//! different parameter sets can never produce the same canonical string. All
//! other characters are written as-is.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, utf8_percent_encode};

/// Flat mapping from parameter name to value for one request.
///
/// A `BTreeMap` keeps names unique and iterates them in canonical order.
pub type ParameterMap = BTreeMap<String, String>;

/// Name of the parameter carrying the caller-supplied signature.
pub const SIGN_KEY: &str = "sign";
/// Name of the parameter carrying the application identifier.
pub const APP_ID_KEY: &str = "appId";
/// Name of the parameter carrying the single-use nonce.
pub const NONCE_KEY: &str = "nonce";
/// Name of the parameter carrying the request timestamp (epoch milliseconds).
pub const TIMESTAMP_KEY: &str = "timestamp";
/// Name of the optional parameter selecting the digest algorithm.
pub const SIGN_TYPE_KEY: &str = "signType";
/// Name under which the secret is appended to the canonical string.
pub const SECRET_KEY: &str = "appSecret";

/// Separator between `name=value` pairs.
const PAIR_DELIMITER: char = '&';
/// Separator between a name and its value.
const VALUE_DELIMITER: char = '=';

/// Characters escaped inside names and values: the two delimiters and the
/// escape character itself.
const CANONICAL_ESCAPE_SET: &AsciiSet = &AsciiSet::EMPTY.add(b'%').add(b'&').add(b'=');

/// Build the canonical string to be hashed from `params` and `secret`.
///
/// # Examples
///
/// ```
/// use signgate_auth::canonical::{ParameterMap, build_canonical_string};
///
/// let params = ParameterMap::from([
///     ("nonce".to_owned(), "abc".to_owned()),
///     ("amount".to_owned(), "10".to_owned()),
///     ("sign".to_owned(), "ignored".to_owned()),
/// ]);
/// assert_eq!(
///     build_canonical_string(&params, "secret"),
///     "amount=10&nonce=abc&appSecret=secret"
/// );
/// ```
#[must_use]
pub fn build_canonical_string(params: &ParameterMap, secret: &str) -> String {
    let capacity = estimate_len(params) + SECRET_KEY.len() + secret.len() + 2;
    let mut canonical = String::with_capacity(capacity);

    for (name, value) in signed_pairs(params) {
        if !canonical.is_empty() {
            canonical.push(PAIR_DELIMITER);
        }
        canonical.extend(utf8_percent_encode(name, CANONICAL_ESCAPE_SET));
        canonical.push(VALUE_DELIMITER);
        canonical.extend(utf8_percent_encode(value, CANONICAL_ESCAPE_SET));
    }

    if !canonical.is_empty() {
        canonical.push(PAIR_DELIMITER);
    }
    canonical.push_str(SECRET_KEY);
    canonical.push(VALUE_DELIMITER);
    canonical.push_str(secret);

    canonical
}

/// Iterate the parameters that take part in the signature, in canonical order.
pub fn signed_pairs(params: &ParameterMap) -> impl Iterator<Item = (&str, &str)> {
    params
        .iter()
        .filter(|(name, value)| name.as_str() != SIGN_KEY && !value.trim().is_empty())
        .map(|(name, value)| (name.as_str(), value.as_str()))
}

fn estimate_len(params: &ParameterMap) -> usize {
    params.iter().map(|(k, v)| k.len() + v.len() + 2).sum()
}
