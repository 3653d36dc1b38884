use std::{env, fs, time::Duration};

use keyward_auth::types::ClientType;
use keyward_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("keyward.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081

[logging]
level = "debug"

[auth]
issuer = "https://auth.example.com"
audience = "https://api.example.com"
public_url = "https://auth.example.com"

[auth.code]
lifetime = "60s"

[auth.refresh]
lifetime = "30d"
grace_period = "5s"

[auth.dpop]
window = "90s"

[[clients]]
client_id = "spa"
client_type = "public"
redirect_uris = ["https://app.example.com/callback"]
pkce_policy = "required"

[[clients]]
client_id = "backend"
client_type = "confidential"
secret = "backend-secret"
redirect_uris = ["https://backend.example.com/callback"]
grant_types = ["authorization_code"]
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.auth.issuer, "https://auth.example.com");
    assert_eq!(cfg.auth.code.lifetime, Duration::from_secs(60));
    assert_eq!(cfg.auth.refresh.grace_period, Duration::from_secs(5));
    assert_eq!(cfg.auth.dpop.window, Duration::from_secs(90));
    assert_eq!(cfg.clients.len(), 2);
    assert_eq!(cfg.clients[0].client_type, ClientType::Public);
    assert_eq!(cfg.clients[0].grant_types.len(), 2);

    let clients = cfg.registered_clients().expect("registrations");
    let backend = clients.iter().find(|c| c.client_id == "backend").unwrap();
    assert!(backend.client_secret.as_deref().unwrap().starts_with("$argon2"));

    // 2) Env override should win over file
    unsafe {
        env::set_var("KEYWARD__SERVER__PORT", "9091");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.server.port, 9091);
    unsafe {
        env::remove_var("KEYWARD__SERVER__PORT");
    }

    // 3) Refresh grace above the limit is rejected
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[auth.refresh]
grace_period = "30s"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("auth config error"));

    // 4) Public clients cannot carry a secret
    let invalid_client = dir.path().join("invalid_client.toml");
    fs::write(
        &invalid_client,
        r#"
[[clients]]
client_id = "spa"
client_type = "public"
secret = "oops"
redirect_uris = ["https://app.example.com/callback"]
"#,
    )
    .expect("write invalid client toml");
    let err = load_config(invalid_client.to_str()).expect_err("expected client error");
    assert!(err.contains("public clients"));

    // 5) Missing file falls back to defaults
    let missing = dir.path().join("missing.toml");
    let cfg = load_config(missing.to_str()).expect("defaults");
    assert_eq!(cfg.server.port, 8080);
    assert!(cfg.clients.is_empty());
}
