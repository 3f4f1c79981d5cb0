//! Config save/load roundtrip integration tests.

use secrecy::ExposeSecret;
use tempfile::TempDir;
use wabridge_core::config::{BindMode, Config};
use wabridge_integration_tests::session_config;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wabridge.json5");

    let mut config = Config::default();
    config.gateway.bind = BindMode::Lan;
    config.bridge.retention_days = 14;
    config.sessions.insert("main".to_string(), session_config("https://crm.example.com"));
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.port, config.gateway.port);
    assert_eq!(loaded.gateway.bind, BindMode::Lan);
    assert_eq!(loaded.bridge.retention_days, 14);

    let session = loaded.get_session("main").unwrap();
    assert_eq!(session.crm.inbox_id, 7);
    assert_eq!(session.crm.api_token.expose_secret(), "crm-token");
    loaded.validate().unwrap();
}

#[test]
fn test_hand_written_json5_with_comments() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wabridge.json5");
    std::fs::write(
        &path,
        r#"{
            // bridge one session
            sessions: {
                main: {
                    crm: { base_url: "https://crm.example.com", account_id: 1, inbox_id: 3, api_token: "t" },
                    sign_messages: true,
                },
            },
            phone: { default_country_code: "55" },
        }"#,
    )
    .unwrap();

    let loaded = Config::load(&path).unwrap();
    let session = loaded.get_session("main").unwrap();
    assert!(session.enabled);
    assert!(session.sign_messages);
    assert_eq!(loaded.phone.regional_rules, vec!["br-ninth-digit".to_string()]);
}

#[test]
fn test_redacted_config_hides_tokens() {
    let mut config = Config::default();
    config.sessions.insert("main".to_string(), session_config("https://crm.example.com"));

    let shown = config.redacted().to_json5().unwrap();
    assert!(!shown.contains("crm-token"));
    assert!(shown.contains("********"));
}
