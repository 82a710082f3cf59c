//! Signature verification integration tests.

#[cfg(test)]
mod tests {
    use crate::{
        APP_ID, APP_SECRET, IDENTITY_HEADER, client, endpoint_url, is_denial, signed_params,
    };

    fn url(path: &str) -> String {
        format!("{}{path}", endpoint_url())
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_forward_signed_json_request() {
        let params = signed_params(APP_ID, APP_SECRET, &[("amount", "10")]);

        let response = client()
            .post(url("/api/orders/create"))
            .header(IDENTITY_HEADER, APP_ID)
            .json(&params)
            .send()
            .await
            .unwrap();

        assert!(!is_denial(response.status()), "got {}", response.status());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_forward_signed_form_request() {
        let params = signed_params(APP_ID, APP_SECRET, &[("amount", "10")]);
        let body = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let response = client()
            .post(url("/api/orders/create"))
            .header(IDENTITY_HEADER, APP_ID)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .unwrap();

        assert!(!is_denial(response.status()), "got {}", response.status());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_deny_tampered_request() {
        let mut params = signed_params(APP_ID, APP_SECRET, &[("amount", "10")]);
        params.insert("amount".to_owned(), "1000".to_owned());

        let response = client()
            .post(url("/api/orders/create"))
            .header(IDENTITY_HEADER, APP_ID)
            .json(&params)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["code"], "SignatureInvalid");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_deny_missing_nonce() {
        let mut params = signed_params(APP_ID, APP_SECRET, &[]);
        params.remove("nonce");

        let response = client()
            .post(url("/api/orders/create"))
            .header(IDENTITY_HEADER, APP_ID)
            .json(&params)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["code"], "SignatureFormatError");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_deny_unknown_application() {
        let params = signed_params("ghost-app", "ghost-secret", &[]);

        let response = client()
            .post(url("/api/orders/create"))
            .header(IDENTITY_HEADER, "ghost-app")
            .json(&params)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["code"], "InvalidClient");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_skip_verification_on_login_path() {
        let response = client()
            .post(url("/auth/login/submit"))
            .header(IDENTITY_HEADER, APP_ID)
            .json(&serde_json::json!({ "sign": "garbage" }))
            .send()
            .await
            .unwrap();

        assert!(!is_denial(response.status()), "got {}", response.status());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_skip_verification_for_anonymous_caller() {
        let response = client()
            .post(url("/api/orders/create"))
            .json(&serde_json::json!({ "sign": "garbage" }))
            .send()
            .await
            .unwrap();

        assert!(!is_denial(response.status()), "got {}", response.status());
    }
}
