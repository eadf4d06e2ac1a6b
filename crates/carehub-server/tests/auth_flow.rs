use carehub_auth::config::ClientConfig;
use carehub_auth::types::{Flavour, UserType};
use carehub_server::build_app;
use carehub_server::config::{
    AppConfig, SeedConfig, SeedFacility, SeedProgram, SeedStaff, SeedUser,
};
use reqwest::StatusCode;
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use serde_json::Value;
use tokio::task::JoinHandle;

const REDIRECT_URI: &str = "http://localhost:3000/callback";
const AUTHORIZE_QUERY: &str = "response_type=code&client_id=web&redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback&state=xyz&scope=openid";

fn seed_user(id: &str, username: &str, user_type: UserType, flavours: Vec<Flavour>) -> SeedUser {
    SeedUser {
        id: id.into(),
        username: username.into(),
        name: Some(format!("{username} user")),
        email: None,
        gender: None,
        user_type,
        is_superuser: false,
        pin: "4821".into(),
        flavours,
        roles: vec![],
        permissions: vec![],
    }
}

fn create_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.oauth.signing_secret = "integration-test-secret".into();
    config.auth.oauth.clients.push(ClientConfig {
        client_id: "web".into(),
        client_secret: Some("web-secret".into()),
        redirect_uris: vec![REDIRECT_URI.into()],
        grant_types: vec!["authorization_code".into(), "refresh_token".into()],
        scopes: vec!["openid".into()],
    });

    let mut staff = seed_user("u1", "jdoe", UserType::Staff, vec![Flavour::Pro]);
    staff.roles = vec!["nurse".into()];
    staff.permissions = vec!["read_client".into()];
    config.seed = SeedConfig {
        users: vec![
            staff,
            seed_user("u2", "mdoe", UserType::Client, vec![Flavour::Consumer]),
        ],
        programs: vec![SeedProgram {
            id: "P1".into(),
            name: "Maternal Health".into(),
            organisation_id: "org1".into(),
            facilities: vec![SeedFacility {
                id: "F1".into(),
                name: "Kisumu Clinic".into(),
            }],
            staff: vec![SeedStaff {
                id: "S1".into(),
                user_id: "u1".into(),
                default_facility_id: None,
            }],
        }],
    };
    config
}

async fn start_server(
    config: &AppConfig,
) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(config).await.expect("build app");

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client")
}

fn session_cookie(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with("carehub_session=") && pair.len() > "carehub_session=".len())
        .map(str::to_string)
}

async fn post_page(
    client: &reqwest::Client,
    base: &str,
    cookie: &str,
    form: &[(&str, &str)],
) -> reqwest::Response {
    client
        .post(format!("{base}/oauth/authorize?{AUTHORIZE_QUERY}"))
        .header(COOKIE, cookie)
        .form(form)
        .send()
        .await
        .expect("post page")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (base, shutdown, handle) = start_server(&create_config()).await;

    let res = client().get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn authorize_flow_issues_code_with_program_and_facility_claims() {
    let (base, shutdown, handle) = start_server(&create_config()).await;
    let client = client();

    // Bootstrap renders the login page and sets the session cookie
    let res = client
        .get(format!("{base}/oauth/authorize?{AUTHORIZE_QUERY}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = session_cookie(&res).expect("session cookie");
    let html = res.text().await.unwrap();
    assert!(html.contains("name=\"pin\""));

    // Login advances to the program picker
    let res = post_page(
        &client,
        &base,
        &cookie,
        &[("page", "login"), ("username", "jdoe"), ("pin", "4821")],
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let html = res.text().await.unwrap();
    assert!(html.contains("Maternal Health"));

    // Program choice advances to the facility picker
    let res = post_page(
        &client,
        &base,
        &cookie,
        &[("page", "chooseProgram"), ("program", "P1")],
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let html = res.text().await.unwrap();
    assert!(html.contains("Kisumu Clinic"));

    // Facility choice redirects back to the client with a code
    let res = post_page(
        &client,
        &base,
        &cookie,
        &[("page", "chooseFacility"), ("facility", "F1")],
    )
    .await;
    assert!(res.status().is_redirection());
    let location = res.headers()[LOCATION].to_str().unwrap().to_string();
    let location = url::Url::parse(&location).unwrap();
    let params: std::collections::HashMap<_, _> = location.query_pairs().into_owned().collect();
    assert!(location.as_str().starts_with(REDIRECT_URI));
    assert_eq!(params["state"], "xyz");
    let code = params["code"].clone();

    // The session is gone: replaying the last page restarts at login
    let res = post_page(
        &client,
        &base,
        &cookie,
        &[("page", "chooseFacility"), ("facility", "F1")],
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let html = res.text().await.unwrap();
    assert!(html.contains("Your session was restarted"));

    // Exchange the code
    let res = client
        .post(format!("{base}/oauth/token"))
        .basic_auth("web", Some("web-secret"))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let tokens: Value = res.json().await.unwrap();
    let access_token = tokens["access_token"].as_str().unwrap().to_string();
    assert_eq!(tokens["token_type"], "Bearer");
    assert!(tokens["refresh_token"].is_string());

    // Codes are single use
    let res = client
        .post(format!("{base}/oauth/token"))
        .basic_auth("web", Some("web-secret"))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_grant");

    // The access token carries the flow's claims
    let res = client
        .post(format!("{base}/oauth/introspect"))
        .basic_auth("web", Some("web-secret"))
        .form(&[("token", access_token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let claims: Value = res.json().await.unwrap();
    assert_eq!(claims["active"], true);
    assert_eq!(claims["user_id"], "u1");
    assert_eq!(claims["program_id"], "P1");
    assert_eq!(claims["facility_id"], "F1");
    assert_eq!(claims["staff_id"], "S1");
    assert_eq!(claims["organisation_id"], "org1");

    // Revocation deactivates it
    let res = client
        .post(format!("{base}/oauth/revoke"))
        .basic_auth("web", Some("web-secret"))
        .form(&[("token", access_token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{base}/oauth/introspect"))
        .basic_auth("web", Some("web-secret"))
        .form(&[("token", access_token.as_str())])
        .send()
        .await
        .unwrap();
    let claims: Value = res.json().await.unwrap();
    assert_eq!(claims["active"], false);

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn wrong_pin_keeps_login_page_with_error() {
    let (base, shutdown, handle) = start_server(&create_config()).await;
    let client = client();

    let res = client
        .get(format!("{base}/oauth/authorize?{AUTHORIZE_QUERY}"))
        .send()
        .await
        .unwrap();
    let cookie = session_cookie(&res).expect("session cookie");

    let res = post_page(
        &client,
        &base,
        &cookie,
        &[("page", "login"), ("username", "jdoe"), ("pin", "0000")],
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let html = res.text().await.unwrap();
    assert!(html.contains("Invalid username or PIN"));
    assert!(html.contains("name=\"pin\""));

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn authorize_with_unknown_client_renders_error_page() {
    let (base, shutdown, handle) = start_server(&create_config()).await;

    let res = client()
        .get(format!(
            "{base}/oauth/authorize?response_type=code&client_id=nobody&redirect_uri=http%3A%2F%2Fevil.example%2Fcb&state=s"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res.headers().get(LOCATION).is_none());
    assert!(session_cookie(&res).is_none());

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn login_by_phone_returns_profile_and_tokens() {
    let (base, shutdown, handle) = start_server(&create_config()).await;
    let client = client();

    let res = client
        .post(format!("{base}/login_by_phone"))
        .json(&serde_json::json!({"username": "mdoe", "pin": "4821", "flavour": "CONSUMER"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], 1);
    assert_eq!(body["profile"]["username"], "mdoe");
    assert_eq!(body["isClient"], true);
    assert_eq!(body["isStaff"], false);
    let access_token = body["tokens"]["access_token"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{base}/oauth/introspect"))
        .basic_auth("web", Some("web-secret"))
        .form(&[("token", access_token.as_str())])
        .send()
        .await
        .unwrap();
    let claims: Value = res.json().await.unwrap();
    assert_eq!(claims["active"], true);
    assert_eq!(claims["user_id"], "u2");
    assert_eq!(claims["flavour"], "CONSUMER");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn login_by_phone_locks_out_after_mismatch() {
    let (base, shutdown, handle) = start_server(&create_config()).await;
    let client = client();

    let res = client
        .post(format!("{base}/login_by_phone"))
        .json(&serde_json::json!({"username": "jdoe", "pin": "0000", "flavour": "PRO"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], 8);
    assert_eq!(body["failedLoginCount"], 1);

    // The correct PIN is refused while the backoff is running
    let res = client
        .post(format!("{base}/login_by_phone"))
        .json(&serde_json::json!({"username": "jdoe", "pin": "4821", "flavour": "PRO"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], 73);
    assert!(body["retryTime"].as_i64().unwrap() > 0);

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn token_endpoint_rejects_unsupported_grant() {
    let (base, shutdown, handle) = start_server(&create_config()).await;

    let res = client()
        .post(format!("{base}/oauth/token"))
        .basic_auth("web", Some("web-secret"))
        .form(&[("grant_type", "password")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unsupported_grant_type");

    let _ = shutdown.send(());
    let _ = handle.await;
}
