//! Flattening a request into the parameter map that is signed.
//!
//! - `application/json` (any parameters): the body must be a UTF-8 JSON
//!   object. Each member becomes one parameter: strings as-is, numbers and
//!   booleans as their JSON text, arrays and objects as compact JSON, `null`
//!   members skipped. An empty body yields an empty map and the query string
//!   is ignored.
//! - Anything else: the query string, plus the body when it is
//!   `application/x-www-form-urlencoded`.
//!
//! A parameter name that occurs twice, in the same source or across query
//! and form body, is rejected rather than merged. A JSON member counts even
//! when its value is `null`.
//!
//! Percent escapes in the query string and form body must decode to UTF-8.
//! Invalid sequences are rejected, never replaced, so the signed value is
//! always the value the next stage reads.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::request::Parts;
use mime::Mime;
use percent_encoding::percent_decode_str;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::Value;
use signgate_auth::ParameterMap;
use tracing::trace;

use crate::body::{BoxError, ReplayableBody};
use crate::error::ExtractionError;

/// How the request carries its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParameterSource {
    JsonBody,
    QueryAndForm,
    Query,
}

/// Build the parameter map of a request.
///
/// The body is buffered only when it carries parameters, so it remains
/// available to the next stage through `body`.
///
/// # Errors
///
/// Returns an [`ExtractionError`] if the content type is malformed, the body
/// cannot be read, is too large, is not UTF-8, is malformed JSON or not a JSON
/// object, if a percent escape does not decode to UTF-8, or if a parameter
/// name is duplicated.
pub async fn extract_parameters<B>(
    parts: &Parts,
    body: &mut ReplayableBody<B>,
    max_body_bytes: usize,
) -> Result<ParameterMap, ExtractionError>
where
    B: http_body::Body,
    B::Error: Into<BoxError>,
{
    let source = classify(parts)?;
    trace!(?source, path = parts.uri.path(), "Extracting request parameters");

    match source {
        ParameterSource::JsonBody => {
            let bytes = body.buffer(max_body_bytes).await?;
            parse_json_object(bytes)
        }
        ParameterSource::QueryAndForm => {
            let mut params = parse_query(parts)?;
            let bytes = body.buffer(max_body_bytes).await?;
            let text = std::str::from_utf8(bytes).map_err(|_| ExtractionError::InvalidUtf8)?;
            insert_urlencoded(&mut params, text)?;
            Ok(params)
        }
        ParameterSource::Query => parse_query(parts),
    }
}

fn classify(parts: &Parts) -> Result<ParameterSource, ExtractionError> {
    let Some(value) = parts.headers.get(CONTENT_TYPE) else {
        return Ok(ParameterSource::Query);
    };
    let raw = value
        .to_str()
        .map_err(|_| ExtractionError::InvalidContentType("not visible ASCII".to_owned()))?;
    let media: Mime = raw
        .parse()
        .map_err(|e: mime::FromStrError| ExtractionError::InvalidContentType(e.to_string()))?;

    if media.type_() != mime::APPLICATION {
        return Ok(ParameterSource::Query);
    }
    let subtype = media.subtype();
    Ok(if subtype == mime::JSON {
        ParameterSource::JsonBody
    } else if subtype == mime::WWW_FORM_URLENCODED {
        ParameterSource::QueryAndForm
    } else {
        ParameterSource::Query
    })
}

fn parse_query(parts: &Parts) -> Result<ParameterMap, ExtractionError> {
    let mut params = ParameterMap::new();
    if let Some(query) = parts.uri.query() {
        insert_urlencoded(&mut params, query)?;
    }
    Ok(params)
}

/// Add the `application/x-www-form-urlencoded` pairs of `input` to `params`.
///
/// Empty segments are skipped and a segment without `=` has an empty value.
fn insert_urlencoded(params: &mut ParameterMap, input: &str) -> Result<(), ExtractionError> {
    for segment in input.split('&').filter(|segment| !segment.is_empty()) {
        let (name, value) = segment.split_once('=').unwrap_or((segment, ""));
        let name = decode_component(name)?;
        if params.contains_key(&name) {
            return Err(ExtractionError::DuplicateParameter(name));
        }
        params.insert(name, decode_component(value)?);
    }
    Ok(())
}

/// Decode one name or value: `+` is a space, `%XX` is a byte.
fn decode_component(raw: &str) -> Result<String, ExtractionError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| ExtractionError::InvalidUtf8)
}

fn parse_json_object(bytes: &Bytes) -> Result<ParameterMap, ExtractionError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ExtractionError::InvalidUtf8)?;
    if text.trim().is_empty() {
        return Ok(ParameterMap::new());
    }

    let members: JsonMembers = serde_json::from_str(text).map_err(|e| match e.classify() {
        serde_json::error::Category::Data => ExtractionError::NotAnObject,
        _ => ExtractionError::InvalidJson(e.to_string()),
    })?;

    let mut seen = HashSet::with_capacity(members.0.len());
    let mut params = ParameterMap::new();
    for (name, value) in members.0 {
        if !seen.insert(name.clone()) {
            return Err(ExtractionError::DuplicateParameter(name));
        }
        if let Some(value) = flatten_value(value) {
            params.insert(name, value);
        }
    }
    Ok(params)
}

/// Render one JSON member as a parameter value. `None` for `null`.
fn flatten_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested @ (Value::Array(_) | Value::Object(_)) => Some(nested.to_string()),
    }
}

/// Top-level JSON object members in document order, duplicates preserved.
struct JsonMembers(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for JsonMembers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MembersVisitor;

        impl<'de> Visitor<'de> for MembersVisitor {
            type Value = JsonMembers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut members = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, Value>()? {
                    members.push(entry);
                }
                Ok(JsonMembers(members))
            }
        }

        deserializer.deserialize_map(MembersVisitor)
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::Full;

    use super::*;

    fn request(uri: &str, content_type: Option<&str>) -> Parts {
        let mut builder = http::Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        builder.body(()).unwrap().into_parts().0
    }

    async fn extract(
        uri: &str,
        content_type: Option<&str>,
        body: &'static str,
    ) -> Result<ParameterMap, ExtractionError> {
        let parts = request(uri, content_type);
        let mut body = ReplayableBody::new(Full::new(Bytes::from_static(body.as_bytes())));
        extract_parameters(&parts, &mut body, 1024).await
    }

    fn map(pairs: &[(&str, &str)]) -> ParameterMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[tokio::test]
    async fn test_should_flatten_json_object() {
        let params = extract(
            "/api/orders/create",
            Some("application/json"),
            r#"{"appId":"a1","amount":10,"price":1.5,"vip":true,"note":null,"tags":["x","y"],"meta":{"k":"v"}}"#,
        )
        .await
        .unwrap();

        assert_eq!(
            params,
            map(&[
                ("amount", "10"),
                ("appId", "a1"),
                ("meta", r#"{"k":"v"}"#),
                ("price", "1.5"),
                ("tags", r#"["x","y"]"#),
                ("vip", "true"),
            ])
        );
    }

    #[tokio::test]
    async fn test_should_accept_json_with_charset() {
        let params = extract("/x", Some("application/json;charset=UTF-8"), r#"{"a":"1"}"#)
            .await
            .unwrap();
        assert_eq!(params, map(&[("a", "1")]));
    }

    #[tokio::test]
    async fn test_should_ignore_query_for_json_body() {
        let params = extract("/x?q=1", Some("application/json"), r#"{"a":"1"}"#)
            .await
            .unwrap();
        assert_eq!(params, map(&[("a", "1")]));
    }

    #[tokio::test]
    async fn test_should_return_empty_map_for_empty_json_body() {
        let params = extract("/x", Some("application/json"), "  ").await.unwrap();
        assert!(params.is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_malformed_json() {
        let result = extract("/x", Some("application/json"), r#"{"a":"#).await;
        assert!(matches!(result, Err(ExtractionError::InvalidJson(_))));
    }

    #[tokio::test]
    async fn test_should_reject_json_that_is_not_an_object() {
        let result = extract("/x", Some("application/json"), r#"["a","b"]"#).await;
        assert_eq!(result.unwrap_err(), ExtractionError::NotAnObject);
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_json_member() {
        let result = extract("/x", Some("application/json"), r#"{"a":"1","a":"2"}"#).await;
        assert_eq!(
            result.unwrap_err(),
            ExtractionError::DuplicateParameter("a".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_json_member_after_null() {
        let result = extract(
            "/x",
            Some("application/json"),
            r#"{"amount":null,"amount":"10"}"#,
        )
        .await;
        assert_eq!(
            result.unwrap_err(),
            ExtractionError::DuplicateParameter("amount".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_merge_query_and_form_body() {
        let params = extract(
            "/x?appId=a1&nonce=n%201",
            Some("application/x-www-form-urlencoded"),
            "amount=10&memo=hello+world",
        )
        .await
        .unwrap();
        assert_eq!(
            params,
            map(&[
                ("amount", "10"),
                ("appId", "a1"),
                ("memo", "hello world"),
                ("nonce", "n 1"),
            ])
        );
    }

    #[tokio::test]
    async fn test_should_produce_same_map_for_json_and_form() {
        let json = extract(
            "/x",
            Some("application/json"),
            r#"{"appId":"a1","nonce":"n","amount":"10"}"#,
        )
        .await
        .unwrap();
        let form = extract(
            "/x",
            Some("application/x-www-form-urlencoded"),
            "appId=a1&nonce=n&amount=10",
        )
        .await
        .unwrap();
        assert_eq!(json, form);
    }

    #[tokio::test]
    async fn test_should_reject_key_in_both_query_and_form() {
        let result = extract(
            "/x?appId=a1",
            Some("application/x-www-form-urlencoded"),
            "appId=a2",
        )
        .await;
        assert_eq!(
            result.unwrap_err(),
            ExtractionError::DuplicateParameter("appId".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_reject_repeated_query_key() {
        let result = extract("/x?a=1&a=2", None, "").await;
        assert!(matches!(result, Err(ExtractionError::DuplicateParameter(_))));
    }

    #[tokio::test]
    async fn test_should_reject_form_value_that_is_not_utf8() {
        let result = extract("/x", Some("application/x-www-form-urlencoded"), "a=%FF").await;
        assert_eq!(result.unwrap_err(), ExtractionError::InvalidUtf8);
    }

    #[tokio::test]
    async fn test_should_reject_query_name_that_is_not_utf8() {
        let result = extract("/x?%FE=1", None, "").await;
        assert_eq!(result.unwrap_err(), ExtractionError::InvalidUtf8);
    }

    #[tokio::test]
    async fn test_should_keep_literal_replacement_character() {
        let params = extract("/x?a=%EF%BF%BD", None, "").await.unwrap();
        assert_eq!(params, map(&[("a", "\u{FFFD}")]));
    }

    #[tokio::test]
    async fn test_should_decode_plus_and_escapes_like_a_form_encoder() {
        let params = extract("/x?a=1%2B1&b=x+y&c&&d=%3D", None, "").await.unwrap();
        assert_eq!(
            params,
            map(&[("a", "1+1"), ("b", "x y"), ("c", ""), ("d", "=")])
        );
    }

    #[tokio::test]
    async fn test_should_read_only_query_for_other_content_types() {
        let params = extract("/x?a=1", Some("text/plain"), "b=2").await.unwrap();
        assert_eq!(params, map(&[("a", "1")]));
    }

    #[tokio::test]
    async fn test_should_not_buffer_body_without_body_parameters() {
        let parts = request("/x?a=1", None);
        let mut body = ReplayableBody::new(Full::new(Bytes::from_static(b"payload")));
        extract_parameters(&parts, &mut body, 1024).await.unwrap();
        assert!(!body.is_buffered());
    }

    #[tokio::test]
    async fn test_should_reject_malformed_content_type() {
        let result = extract("/x", Some("application"), "{}").await;
        assert!(matches!(result, Err(ExtractionError::InvalidContentType(_))));
    }

    #[tokio::test]
    async fn test_should_reject_invalid_utf8_body() {
        let parts = request("/x", Some("application/json"));
        let mut body = ReplayableBody::new(Full::new(Bytes::from_static(&[0x7b, 0xff, 0x7d])));
        let result = extract_parameters(&parts, &mut body, 1024).await;
        assert_eq!(result.unwrap_err(), ExtractionError::InvalidUtf8);
    }

    #[tokio::test]
    async fn test_should_reject_oversized_body() {
        let parts = request("/x", Some("application/json"));
        let mut body = ReplayableBody::new(Full::new(Bytes::from(vec![b' '; 64])));
        let result = extract_parameters(&parts, &mut body, 16).await;
        assert_eq!(result.unwrap_err(), ExtractionError::BodyTooLarge { limit: 16 });
    }
}
