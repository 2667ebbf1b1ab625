use chrono::{Duration, Utc};
use mockito::Matcher;
use scheduler_module::linkedin_auth::{
    AuthError, CredentialRecord, CredentialStore, LinkedInAuth, LinkedInAuthConfig,
};
use std::sync::Arc;
use tempfile::TempDir;

fn config(temp: &TempDir, base_url: &str) -> LinkedInAuthConfig {
    LinkedInAuthConfig {
        client_id: Some("client-1".to_string()),
        client_secret: Some("shh".to_string()),
        redirect_uri: Some("http://localhost/callback".to_string()),
        token_path: temp.path().join("linkedin_tokens.json"),
        oauth_base_url: base_url.to_string(),
        ..LinkedInAuthConfig::default()
    }
}

fn seed_record(temp: &TempDir, refresh_token: Option<&str>) -> CredentialRecord {
    let record = CredentialRecord {
        access_token: "stale-access".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at: Utc::now() - Duration::seconds(1),
        expires_in: Some(3600),
        scope: None,
    };
    CredentialStore::new(temp.path().join("linkedin_tokens.json"))
        .save(&record)
        .expect("seed credentials");
    record
}

#[tokio::test]
async fn expired_token_is_refreshed_exactly_once() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    seed_record(&temp, Some("refresh-1"));

    let mut server = mockito::Server::new_async().await;
    let refresh = server
        .mock("POST", "/accessToken")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
            Matcher::UrlEncoded("client_id".into(), "client-1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"fresh-access","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    let auth = LinkedInAuth::new(config(&temp, &server.url()));
    let token = auth.get_valid_access_token().await;
    assert_eq!(token.as_deref(), Some("fresh-access"));

    // The refreshed record is cached; a second call does not hit the provider.
    assert_eq!(
        auth.get_valid_access_token().await.as_deref(),
        Some("fresh-access")
    );
    refresh.assert_async().await;

    let persisted = CredentialStore::new(temp.path().join("linkedin_tokens.json"))
        .load()?
        .expect("persisted record");
    assert_eq!(persisted.access_token, "fresh-access");
    // Provider did not rotate the refresh token, so the old one is kept.
    assert_eq!(persisted.refresh_token.as_deref(), Some("refresh-1"));
    assert!(persisted.expires_at > Utc::now() + Duration::seconds(3400));
    Ok(())
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    seed_record(&temp, Some("refresh-1"));

    let mut server = mockito::Server::new_async().await;
    let refresh = server
        .mock("POST", "/accessToken")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"fresh-access","expires_in":3600,"refresh_token":"refresh-2"}"#)
        .expect(1)
        .create_async()
        .await;

    let auth = Arc::new(LinkedInAuth::new(config(&temp, &server.url())));
    let callers: Vec<_> = (0..4)
        .map(|_| {
            let auth = auth.clone();
            tokio::spawn(async move { auth.get_valid_access_token().await })
        })
        .collect();
    for caller in callers {
        assert_eq!(caller.await?.as_deref(), Some("fresh-access"));
    }
    refresh.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn missing_refresh_token_yields_no_token() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    seed_record(&temp, None);

    let mut server = mockito::Server::new_async().await;
    let refresh = server
        .mock("POST", "/accessToken")
        .expect(0)
        .create_async()
        .await;

    let auth = LinkedInAuth::new(config(&temp, &server.url()));
    assert!(auth.get_valid_access_token().await.is_none());
    assert!(matches!(
        auth.refresh_access_token().await,
        Err(AuthError::MissingRefreshToken)
    ));
    refresh.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn failed_refresh_yields_no_token() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    seed_record(&temp, Some("revoked"));

    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/accessToken")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .create_async()
        .await;

    let auth = LinkedInAuth::new(config(&temp, &server.url()));
    assert!(auth.get_valid_access_token().await.is_none());

    match auth.refresh_access_token().await {
        Err(AuthError::Rejected { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn exchange_persists_record_and_survives_restart() -> Result<(), Box<dyn std::error::Error>>
{
    let temp = TempDir::new()?;
    let mut server = mockito::Server::new_async().await;
    let exchange = server
        .mock("POST", "/accessToken")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "one-time".into()),
            Matcher::UrlEncoded("redirect_uri".into(), "http://localhost/callback".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"access_token":"new-access","expires_in":5184000,"refresh_token":"new-refresh","scope":"openid"}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let auth = LinkedInAuth::new(config(&temp, &server.url()));
    assert!(!auth.has_credentials());
    let record = auth.exchange_code_for_token("one-time").await?;
    assert_eq!(record.access_token, "new-access");
    assert_eq!(record.refresh_token.as_deref(), Some("new-refresh"));
    exchange.assert_async().await;

    let restarted = LinkedInAuth::new(config(&temp, &server.url()));
    assert!(restarted.has_credentials());
    assert_eq!(
        restarted.get_valid_access_token().await.as_deref(),
        Some("new-access")
    );
    Ok(())
}

#[tokio::test]
async fn rejected_code_is_a_hard_failure() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/accessToken")
        .with_status(401)
        .with_body("bad code")
        .expect(1)
        .create_async()
        .await;

    let auth = LinkedInAuth::new(config(&temp, &server.url()));
    let err = auth.exchange_code_for_token("used-twice").await.unwrap_err();
    assert!(matches!(err, AuthError::Rejected { status: 401, .. }));
    assert!(!auth.has_credentials());
    assert!(!temp.path().join("linkedin_tokens.json").exists());
    Ok(())
}

/// Accepts connections and holds them open without ever replying.
async fn silent_token_endpoint() -> Result<String, std::io::Error> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn unresponsive_token_endpoint_times_out() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    seed_record(&temp, Some("refresh-1"));
    let base_url = silent_token_endpoint().await?;

    let auth = LinkedInAuth::new(LinkedInAuthConfig {
        request_timeout: std::time::Duration::from_millis(200),
        ..config(&temp, &base_url)
    });

    let token = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        auth.get_valid_access_token(),
    )
    .await?;
    assert!(token.is_none());

    // The refresh lock was released, so a second attempt runs and fails too.
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        auth.refresh_access_token(),
    )
    .await?;
    assert!(matches!(result, Err(AuthError::Http(_))));
    Ok(())
}

#[tokio::test]
async fn out_of_range_lifetime_fails_exchange_cleanly() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/accessToken")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"a","expires_in":100000000000000000}"#)
        .create_async()
        .await;

    let auth = LinkedInAuth::new(config(&temp, &server.url()));
    let err = auth.exchange_code_for_token("code").await.unwrap_err();
    assert!(matches!(err, AuthError::Json(_)));
    assert!(!auth.has_credentials());
    assert!(!temp.path().join("linkedin_tokens.json").exists());
    Ok(())
}

#[tokio::test]
async fn out_of_range_lifetime_on_refresh_yields_no_token() -> Result<(), Box<dyn std::error::Error>>
{
    let temp = TempDir::new()?;
    seed_record(&temp, Some("refresh-1"));
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/accessToken")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"a","expires_in":100000000000000000}"#)
        .create_async()
        .await;

    let auth = LinkedInAuth::new(config(&temp, &server.url()));
    assert!(auth.get_valid_access_token().await.is_none());
    Ok(())
}
