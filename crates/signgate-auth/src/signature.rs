//! Parameter signature computation and verification.
//!
//! The verification flow for one request is:
//!
//! 1. [`validate_params`] checks that the signing parameters (`nonce`,
//!    `timestamp`, `sign`) are present and that `signType`, if given, names a
//!    supported algorithm.
//! 2. [`check_timestamp`] optionally rejects requests whose `timestamp` falls
//!    outside the accepted clock skew.
//! 3. [`compute_signature`] builds the canonical string and hashes it.
//! 4. The computed digest is compared with the supplied `sign` in constant time.
//!
//! [`verify_params`] runs steps 1, 3 and 4 in one call.

use std::fmt;
use std::time::Duration;

use digest::Digest;
use hmac::{Hmac, KeyInit, Mac};
use md5::Md5;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::canonical::{
    NONCE_KEY, ParameterMap, SIGN_KEY, SIGN_TYPE_KEY, TIMESTAMP_KEY, build_canonical_string,
};
use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Parameters that must be present and non-blank on every signed request.
const REQUIRED_PARAMS: [&str; 3] = [NONCE_KEY, TIMESTAMP_KEY, SIGN_KEY];

/// Digest algorithm selected by the `signType` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignType {
    /// Hex MD5 of the canonical string.
    Md5,
    /// Hex SHA-256 of the canonical string.
    #[default]
    Sha256,
    /// Hex HMAC-SHA256 of the canonical string, keyed with the secret.
    HmacSha256,
}

impl SignType {
    /// Parse a `signType` value. Matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::UnsupportedSignType`] for unknown names.
    pub fn parse(value: &str) -> Result<Self, SignatureError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA256" | "SHA-256" => Ok(Self::Sha256),
            "HMAC-SHA256" | "HMACSHA256" | "HMAC_SHA256" => Ok(Self::HmacSha256),
            _ => Err(SignatureError::UnsupportedSignType(value.to_owned())),
        }
    }

    /// The sign type requested by `params`, [`SignType::Sha256`] when absent or blank.
    pub fn from_params(params: &ParameterMap) -> Result<Self, SignatureError> {
        match params.get(SIGN_TYPE_KEY) {
            Some(value) if !value.trim().is_empty() => Self::parse(value),
            _ => Ok(Self::default()),
        }
    }

    /// Canonical name of the algorithm.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA256",
            Self::HmacSha256 => "HMAC-SHA256",
        }
    }

    fn digest_hex(self, canonical: &str, secret: &str) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(canonical.as_bytes())),
            Self::Sha256 => hex::encode(Sha256::digest(canonical.as_bytes())),
            Self::HmacSha256 => {
                let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                    .expect("HMAC can accept keys of any length");
                mac.update(canonical.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
        }
    }
}

impl fmt::Display for SignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical string and digest computed for one verification attempt.
///
/// The canonical string embeds the application secret, so it is never
/// exposed through `Debug` and is dropped with the artifact.
pub struct SignatureArtifact {
    canonical: String,
    digest: String,
    sign_type: SignType,
}

impl SignatureArtifact {
    /// Compute the artifact for `params` signed with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::UnsupportedSignType`] if `signType` is not supported.
    pub fn compute(params: &ParameterMap, secret: &str) -> Result<Self, SignatureError> {
        let sign_type = SignType::from_params(params)?;
        let canonical = build_canonical_string(params, secret);
        let digest = sign_type.digest_hex(&canonical, secret);
        Ok(Self {
            canonical,
            digest,
            sign_type,
        })
    }

    /// The lowercase hex digest.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The algorithm used.
    #[must_use]
    pub fn sign_type(&self) -> SignType {
        self.sign_type
    }

    /// Length of the canonical string, for diagnostics.
    #[must_use]
    pub fn canonical_len(&self) -> usize {
        self.canonical.len()
    }

    /// Exact, case-sensitive, constant-time comparison with a supplied signature.
    #[must_use]
    pub fn matches(&self, supplied: &str) -> bool {
        supplied.as_bytes().ct_eq(self.digest.as_bytes()).into()
    }
}

impl fmt::Debug for SignatureArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureArtifact")
            .field("canonical", &"<redacted>")
            .field("digest", &self.digest)
            .field("sign_type", &self.sign_type)
            .finish()
    }
}

/// Check that the signing parameters are present and well-formed.
///
/// # Errors
///
/// Returns [`SignatureError::MissingParameter`] for a missing or blank
/// `nonce`, `timestamp` or `sign`, and [`SignatureError::UnsupportedSignType`]
/// for an unknown `signType`.
pub fn validate_params(params: &ParameterMap) -> Result<(), SignatureError> {
    for name in REQUIRED_PARAMS {
        match params.get(name) {
            Some(value) if !value.trim().is_empty() => {}
            _ => return Err(SignatureError::MissingParameter(name)),
        }
    }
    SignType::from_params(params).map(|_| ())
}

/// Reject a request whose `timestamp` is further than `tolerance` from `now_millis`.
///
/// # Errors
///
/// Returns [`SignatureError::MissingParameter`] if `timestamp` is absent,
/// [`SignatureError::InvalidTimestamp`] if it is not an integer, and
/// [`SignatureError::Expired`] if it is outside the window.
pub fn check_timestamp(
    params: &ParameterMap,
    now_millis: i64,
    tolerance: Duration,
) -> Result<(), SignatureError> {
    let raw = params
        .get(TIMESTAMP_KEY)
        .ok_or(SignatureError::MissingParameter(TIMESTAMP_KEY))?;
    let timestamp: i64 = raw
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp(raw.clone()))?;

    let tolerance_millis = u64::try_from(tolerance.as_millis()).unwrap_or(u64::MAX);
    if now_millis.abs_diff(timestamp) > tolerance_millis {
        debug!(timestamp, now_millis, "Request timestamp outside accepted window");
        return Err(SignatureError::Expired);
    }
    Ok(())
}

/// Compute the signature of `params` under `secret`.
///
/// The `sign` parameter itself never contributes to the result.
///
/// # Errors
///
/// Returns [`SignatureError::UnsupportedSignType`] if `signType` is not supported.
pub fn compute_signature(params: &ParameterMap, secret: &str) -> Result<String, SignatureError> {
    SignatureArtifact::compute(params, secret).map(|artifact| artifact.digest)
}

/// Whether `supplied` is the signature of `params` under `secret`.
///
/// Returns `false` when the signature cannot be computed at all.
#[must_use]
pub fn verify_signature(params: &ParameterMap, supplied: &str, secret: &str) -> bool {
    SignatureArtifact::compute(params, secret).is_ok_and(|artifact| artifact.matches(supplied))
}

/// Validate `params` and check their embedded `sign` against `secret`.
///
/// # Errors
///
/// Returns a format error from [`validate_params`], or
/// [`SignatureError::Mismatch`] if the signature is wrong.
pub fn verify_params(params: &ParameterMap, secret: &str) -> Result<(), SignatureError> {
    validate_params(params)?;
    let supplied = params
        .get(SIGN_KEY)
        .ok_or(SignatureError::MissingParameter(SIGN_KEY))?;

    let artifact = SignatureArtifact::compute(params, secret)?;
    if artifact.matches(supplied) {
        debug!(sign_type = %artifact.sign_type(), "Signature verification succeeded");
        Ok(())
    } else {
        debug!(
            sign_type = %artifact.sign_type(),
            canonical_len = artifact.canonical_len(),
            "Signature mismatch"
        );
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::APP_ID_KEY;

    const SECRET: &str = "0a1b2c3d4e5f";

    fn base_params() -> ParameterMap {
        ParameterMap::from([
            (APP_ID_KEY.to_owned(), "1552274783265".to_owned()),
            (NONCE_KEY.to_owned(), "w4Xz9q".to_owned()),
            (TIMESTAMP_KEY.to_owned(), "1700000000000".to_owned()),
            ("amount".to_owned(), "10".to_owned()),
        ])
    }

    fn signed(mut params: ParameterMap, secret: &str) -> ParameterMap {
        let sign = compute_signature(&params, secret).unwrap();
        params.insert(SIGN_KEY.to_owned(), sign);
        params
    }

    fn mutate_char(c: char) -> char {
        if c == '0' { '1' } else { '0' }
    }

    #[test]
    fn test_should_compute_sha256_of_canonical_string_by_default() {
        let params = base_params();
        let canonical = build_canonical_string(&params, SECRET);
        let expected = hex::encode(Sha256::digest(canonical.as_bytes()));
        assert_eq!(compute_signature(&params, SECRET).unwrap(), expected);
    }

    #[test]
    fn test_should_compute_md5_when_requested() {
        let mut params = base_params();
        params.insert(SIGN_TYPE_KEY.to_owned(), "md5".to_owned());
        let canonical = build_canonical_string(&params, SECRET);
        let expected = hex::encode(Md5::digest(canonical.as_bytes()));
        let sign = compute_signature(&params, SECRET).unwrap();
        assert_eq!(sign, expected);
        assert_eq!(sign.len(), 32);
    }

    #[test]
    fn test_should_compute_hmac_sha256_when_requested() {
        let mut params = base_params();
        params.insert(SIGN_TYPE_KEY.to_owned(), "HMAC-SHA256".to_owned());
        let sign = compute_signature(&params, SECRET).unwrap();
        assert_eq!(sign.len(), 64);
        // Keyed digest differs from the plain digest of the same canonical string.
        let canonical = build_canonical_string(&params, SECRET);
        assert_ne!(sign, hex::encode(Sha256::digest(canonical.as_bytes())));
    }

    #[test]
    fn test_should_verify_round_trip_for_every_sign_type() {
        for sign_type in ["MD5", "SHA256", "HMAC-SHA256"] {
            let mut params = base_params();
            params.insert(SIGN_TYPE_KEY.to_owned(), sign_type.to_owned());
            let sign = compute_signature(&params, SECRET).unwrap();
            assert!(verify_signature(&params, &sign, SECRET), "{sign_type}");
        }
    }

    #[test]
    fn test_should_verify_round_trip_for_empty_and_unicode_params() {
        let empty = ParameterMap::new();
        let sign = compute_signature(&empty, "").unwrap();
        assert!(verify_signature(&empty, &sign, ""));

        let unicode = ParameterMap::from([("名字".to_owned(), "值 & = ?".to_owned())]);
        let sign = compute_signature(&unicode, "秘密").unwrap();
        assert!(verify_signature(&unicode, &sign, "秘密"));
    }

    #[test]
    fn test_should_reject_every_single_character_mutation() {
        let params = base_params();
        let sign = compute_signature(&params, SECRET).unwrap();

        for i in 0..sign.len() {
            let tampered: String = sign
                .chars()
                .enumerate()
                .map(|(j, c)| if i == j { mutate_char(c) } else { c })
                .collect();
            assert!(!verify_signature(&params, &tampered, SECRET), "position {i}");
        }
    }

    #[test]
    fn test_should_compare_case_sensitively() {
        let params = base_params();
        let sign = compute_signature(&params, SECRET).unwrap();
        assert!(!verify_signature(&params, &sign.to_uppercase(), SECRET));
    }

    #[test]
    fn test_should_reject_truncated_signature() {
        let params = base_params();
        let sign = compute_signature(&params, SECRET).unwrap();
        assert!(!verify_signature(&params, &sign[..sign.len() - 1], SECRET));
        assert!(!verify_signature(&params, "", SECRET));
    }

    #[test]
    fn test_should_fail_with_wrong_secret() {
        let params = signed(base_params(), SECRET);
        assert_eq!(
            verify_params(&params, "other-secret"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_should_detect_tampered_parameter_value() {
        let mut params = signed(base_params(), SECRET);
        params.insert("amount".to_owned(), "1000".to_owned());
        assert_eq!(verify_params(&params, SECRET), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_should_verify_params_with_embedded_sign() {
        let params = signed(base_params(), SECRET);
        assert_eq!(verify_params(&params, SECRET), Ok(()));
    }

    #[test]
    fn test_should_report_missing_sign_as_format_error() {
        let params = base_params();
        let err = verify_params(&params, SECRET).unwrap_err();
        assert_eq!(err, SignatureError::MissingParameter(SIGN_KEY));
        assert!(err.is_format_error());
    }

    #[test]
    fn test_should_report_missing_or_blank_nonce_as_format_error() {
        let mut params = signed(base_params(), SECRET);
        params.remove(NONCE_KEY);
        assert_eq!(
            validate_params(&params),
            Err(SignatureError::MissingParameter(NONCE_KEY))
        );

        params.insert(NONCE_KEY.to_owned(), "   ".to_owned());
        assert_eq!(
            validate_params(&params),
            Err(SignatureError::MissingParameter(NONCE_KEY))
        );
    }

    #[test]
    fn test_should_report_missing_timestamp_as_format_error() {
        let mut params = signed(base_params(), SECRET);
        params.remove(TIMESTAMP_KEY);
        assert_eq!(
            validate_params(&params),
            Err(SignatureError::MissingParameter(TIMESTAMP_KEY))
        );
    }

    #[test]
    fn test_should_reject_unsupported_sign_type() {
        let mut params = signed(base_params(), SECRET);
        params.insert(SIGN_TYPE_KEY.to_owned(), "SHA1".to_owned());
        assert!(matches!(
            validate_params(&params),
            Err(SignatureError::UnsupportedSignType(_))
        ));
        assert!(!verify_signature(&params, "anything", SECRET));
    }

    #[test]
    fn test_should_not_treat_mismatch_as_format_error() {
        assert!(!SignatureError::Mismatch.is_format_error());
        assert!(SignatureError::Expired.is_format_error());
    }

    #[test]
    fn test_should_accept_timestamp_within_tolerance() {
        let params = base_params();
        let tolerance = Duration::from_secs(300);
        assert!(check_timestamp(&params, 1_700_000_000_000, tolerance).is_ok());
        assert!(check_timestamp(&params, 1_700_000_299_999, tolerance).is_ok());
        assert!(check_timestamp(&params, 1_699_999_700_000, tolerance).is_ok());
    }

    #[test]
    fn test_should_reject_timestamp_outside_tolerance() {
        let params = base_params();
        let tolerance = Duration::from_secs(300);
        assert_eq!(
            check_timestamp(&params, 1_700_000_300_001, tolerance),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            check_timestamp(&params, 1_699_999_699_999, tolerance),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_should_reject_non_numeric_timestamp() {
        let mut params = base_params();
        params.insert(TIMESTAMP_KEY.to_owned(), "yesterday".to_owned());
        assert!(matches!(
            check_timestamp(&params, 0, Duration::from_secs(1)),
            Err(SignatureError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_should_redact_canonical_string_in_debug_output() {
        let artifact = SignatureArtifact::compute(&base_params(), SECRET).unwrap();
        let debug = format!("{artifact:?}");
        assert!(!debug.contains(SECRET));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_should_parse_sign_type_names() {
        assert_eq!(SignType::parse("sha-256").unwrap(), SignType::Sha256);
        assert_eq!(SignType::parse(" Md5 ").unwrap(), SignType::Md5);
        assert_eq!(SignType::parse("hmacsha256").unwrap(), SignType::HmacSha256);
        assert!(SignType::parse("RSA").is_err());
        assert_eq!(SignType::HmacSha256.to_string(), "HMAC-SHA256");
    }
}
