use keyward_auth::oauth::{PkceChallenge, PkceVerifier};
use keyward_auth::testing::{DpopSigner, REDIRECT_URI};
use keyward_auth::types::{ClientType, PkcePolicy};
use keyward_server::{AppConfig, ClientConfig, build_app, build_state};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::task::JoinHandle;

const SESSION: &str = "browser-session-1";
const SUBJECT: &str = "alice";

struct TestServer {
    base: String,
    client: reqwest::Client,
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

async fn start_server() -> TestServer {
    // Bind first so DPoP proofs can name the real address
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    let mut cfg = AppConfig::default();
    cfg.auth.issuer = base.clone();
    cfg.auth.public_url = base.clone();
    cfg.auth.signing.algorithm = "ES384".into();
    cfg.clients = vec![ClientConfig {
        client_id: "spa".into(),
        client_type: ClientType::Public,
        secret: None,
        secret_hash: None,
        redirect_uris: vec![REDIRECT_URI.into()],
        grant_types: vec![
            keyward_auth::GrantType::AuthorizationCode,
            keyward_auth::GrantType::RefreshToken,
        ],
        scopes: vec!["read".into(), "write".into()],
        pkce_policy: PkcePolicy::Required,
    }];

    let state = build_state(&cfg).expect("build state");
    let app = build_app(state, &cfg);
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestServer {
        base,
        client,
        shutdown: tx,
        handle,
    }
}

/// Runs `/state` and `/authorize`, returning the issued code.
async fn authorize(server: &TestServer, verifier: &PkceVerifier) -> String {
    let resp = server
        .client
        .post(format!("{}/state", server.base))
        .form(&[("session_id", SESSION)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let state = body["state"].as_str().unwrap().to_string();
    assert!(body["expires_in"].as_u64().unwrap() > 0);

    let challenge = PkceChallenge::from_verifier(verifier);
    let resp = server
        .client
        .get(format!("{}/authorize", server.base))
        .query(&[
            ("response_type", "code"),
            ("client_id", "spa"),
            ("redirect_uri", REDIRECT_URI),
            ("scope", "read"),
            ("state", state.as_str()),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ])
        .header("x-authenticated-subject", SUBJECT)
        .header("cookie", format!("keyward_session={SESSION}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);

    let location = url::Url::parse(
        resp.headers()["location"]
            .to_str()
            .expect("ascii location"),
    )
    .unwrap();
    assert!(location.as_str().starts_with(REDIRECT_URI));
    let param = |name: &str| {
        location
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    assert_eq!(param("state").as_deref(), Some(state.as_str()));
    param("code").expect("code in redirect")
}

async fn exchange(
    server: &TestServer,
    code: &str,
    verifier: &PkceVerifier,
    dpop: Option<String>,
) -> reqwest::Response {
    let mut request = server
        .client
        .post(format!("{}/token", server.base))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier.as_str()),
            ("client_id", "spa"),
        ]);
    if let Some(proof) = dpop {
        request = request.header("dpop", proof);
    }
    request.send().await.unwrap()
}

async fn refresh(server: &TestServer, refresh_token: &str, dpop: Option<String>) -> reqwest::Response {
    let mut request = server
        .client
        .post(format!("{}/token", server.base))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", "spa"),
        ]);
    if let Some(proof) = dpop {
        request = request.header("dpop", proof);
    }
    request.send().await.unwrap()
}

async fn whoami(server: &TestServer, authorization: String, dpop: Option<String>) -> StatusCode {
    let mut request = server
        .client
        .get(format!("{}/whoami", server.base))
        .header("authorization", authorization);
    if let Some(proof) = dpop {
        request = request.header("dpop", proof);
    }
    request.send().await.unwrap().status()
}

fn oauth_error(body: &Value) -> &str {
    body["error"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn bearer_flow_rotates_and_detects_replay() {
    let server = start_server().await;
    let verifier = PkceVerifier::generate();
    let code = authorize(&server, &verifier).await;

    // Exchange
    let resp = exchange(&server, &code, &verifier, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["cache-control"], "no-store");
    let tokens: Value = resp.json().await.unwrap();
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["scope"], "read");
    let access = tokens["access_token"].as_str().unwrap().to_string();
    let first_refresh = tokens["refresh_token"].as_str().unwrap().to_string();

    assert_eq!(
        whoami(&server, format!("Bearer {access}"), None).await,
        StatusCode::OK
    );

    // Rotation
    let resp = refresh(&server, &first_refresh, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rotated: Value = resp.json().await.unwrap();
    let second_refresh = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(second_refresh, first_refresh);

    // A second redemption of the code fails and takes the family down
    let resp = exchange(&server, &code, &verifier, None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(oauth_error(&body), "invalid_grant");

    let resp = refresh(&server, &second_refresh, None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        whoami(&server, format!("Bearer {access}"), None).await,
        StatusCode::UNAUTHORIZED
    );

    server.stop().await;
}

#[tokio::test]
async fn revoke_ends_the_family() {
    let server = start_server().await;
    let verifier = PkceVerifier::generate();
    let code = authorize(&server, &verifier).await;

    let tokens: Value = exchange(&server, &code, &verifier, None)
        .await
        .json()
        .await
        .unwrap();
    let access = tokens["access_token"].as_str().unwrap().to_string();
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let resp = server
            .client
            .post(format!("{}/revoke", server.base))
            .form(&[
                ("token", refresh_token.as_str()),
                ("token_type_hint", "refresh_token"),
                ("client_id", "spa"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = refresh(&server, &refresh_token, None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        whoami(&server, format!("Bearer {access}"), None).await,
        StatusCode::UNAUTHORIZED
    );

    // Absent, empty and unknown tokens get the same answer
    for form in [
        vec![("client_id", "spa")],
        vec![("token", ""), ("client_id", "spa")],
        vec![("token", "never-issued"), ("client_id", "spa")],
    ] {
        let resp = server
            .client
            .post(format!("{}/revoke", server.base))
            .form(&form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    server.stop().await;
}

#[tokio::test]
async fn dpop_bound_tokens_require_proofs() {
    let server = start_server().await;
    let signer = DpopSigner::generate();
    let token_uri = format!("{}/token", server.base);
    let whoami_uri = format!("{}/whoami", server.base);

    let verifier = PkceVerifier::generate();
    let code = authorize(&server, &verifier).await;
    let resp = exchange(
        &server,
        &code,
        &verifier,
        Some(signer.proof("POST", &token_uri, None)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let tokens: Value = resp.json().await.unwrap();
    assert_eq!(tokens["token_type"], "DPoP");
    let access = tokens["access_token"].as_str().unwrap().to_string();
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

    // Bearer presentation of a bound token is refused
    assert_eq!(
        whoami(&server, format!("Bearer {access}"), None).await,
        StatusCode::UNAUTHORIZED
    );

    let proof = signer.proof("GET", &whoami_uri, Some(&access));
    assert_eq!(
        whoami(&server, format!("DPoP {access}"), Some(proof.clone())).await,
        StatusCode::OK
    );
    // Same proof again
    assert_eq!(
        whoami(&server, format!("DPoP {access}"), Some(proof)).await,
        StatusCode::UNAUTHORIZED
    );

    // A bound family cannot be refreshed without a proof from the same key
    let resp = refresh(&server, &refresh_token, None).await;
    assert!(resp.status().is_client_error());

    let resp = refresh(
        &server,
        &refresh_token,
        Some(signer.proof("POST", &token_uri, None)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rotated: Value = resp.json().await.unwrap();
    assert_eq!(rotated["token_type"], "DPoP");

    server.stop().await;
}

#[tokio::test]
async fn authorize_errors_never_redirect_to_unregistered_uris() {
    let server = start_server().await;

    let resp = server
        .client
        .get(format!("{}/authorize", server.base))
        .query(&[
            ("response_type", "code"),
            ("client_id", "spa"),
            ("redirect_uri", "https://attacker.example.com/callback"),
            ("state", "whatever"),
        ])
        .header("x-authenticated-subject", SUBJECT)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.headers().get("location").is_none());

    // A registered redirect with a forged state gets the error by redirect
    let challenge = PkceChallenge::from_verifier(&PkceVerifier::generate());
    let resp = server
        .client
        .get(format!("{}/authorize", server.base))
        .query(&[
            ("response_type", "code"),
            ("client_id", "spa"),
            ("redirect_uri", REDIRECT_URI),
            ("state", "forged-state"),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ])
        .header("x-authenticated-subject", SUBJECT)
        .header("cookie", format!("keyward_session={SESSION}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    let location = resp.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with(REDIRECT_URI));
    assert!(location.contains("error="));
    assert!(!location.contains("code="));

    server.stop().await;
}

#[tokio::test]
async fn jwks_and_health_are_served() {
    let server = start_server().await;

    let resp = server
        .client
        .get(format!("{}/jwks", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let jwks: Value = resp.json().await.unwrap();
    let keys = jwks["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["alg"], "ES384");

    let resp = server
        .client
        .get(format!("{}/healthz", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    server.stop().await;
}
