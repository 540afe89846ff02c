mod common;

use common::*;
use codeloom::graphs::GraphBuilder;
use codeloom::runtimes::runtime_config::RunConfig;
use codeloom::runtimes::{RunManager, RunnerError};
use codeloom::secrets::{
    is_enveloped, materialize_env, resolve_value, RunSecret, SecretCipher, SecretError,
};
use codeloom::state::VersionedState;
use codeloom::types::NodeKind;
use proptest::prelude::*;

#[test]
fn envelope_round_trips_under_the_same_key() {
    let cipher = SecretCipher::new("test-master-key").unwrap();
    let envelope = cipher.encrypt("ghp_sensitive_token_value").unwrap();

    assert!(is_enveloped(&envelope));
    assert_eq!(
        cipher.decrypt("token", &envelope).unwrap(),
        "ghp_sensitive_token_value"
    );
}

#[test]
fn plaintext_passes_through_unchanged() {
    let cipher = SecretCipher::new("test-master-key").unwrap();
    // Typical token: not base64 of sufficient length, so structurally not
    // an envelope.
    let plain = "ghp_abcdef0123456789";
    assert!(!is_enveloped(plain));
    assert_eq!(resolve_value("t", plain, Some(&cipher)).unwrap(), plain);
    assert_eq!(resolve_value("t", plain, None).unwrap(), plain);
}

#[test]
fn enveloped_value_without_key_is_a_hard_error() {
    let cipher = SecretCipher::new("k").unwrap();
    let envelope = cipher.encrypt("secret").unwrap();
    let err = resolve_value("token", &envelope, None).err().unwrap();
    assert!(matches!(err, SecretError::MissingKey { .. }));
}

#[test]
fn corrupt_envelope_fails_decryption() {
    let cipher = SecretCipher::new("k").unwrap();
    let mut envelope = cipher.encrypt("secret").unwrap();
    // Flip a character deep in the ciphertext portion.
    let flipped = if envelope.ends_with('A') { 'B' } else { 'A' };
    envelope.pop();
    envelope.push(flipped);
    let err = cipher.decrypt("token", &envelope).err().unwrap();
    assert!(matches!(err, SecretError::DecryptionFailed { .. }));
}

#[test]
fn only_exposable_secrets_are_materialized() {
    let cipher = SecretCipher::new("k").unwrap();
    let secrets = vec![
        RunSecret::new("VISIBLE", cipher.encrypt("open-sesame").unwrap(), true),
        RunSecret::new("HIDDEN", "plain-but-private", false),
    ];

    let env = materialize_env(&secrets, Some(&cipher)).unwrap();
    assert_eq!(env.len(), 1);
    assert_eq!(env[0], ("VISIBLE".to_string(), "open-sesame".to_string()));
}

#[tokio::test]
async fn run_with_enveloped_secrets_and_no_key_is_not_created() {
    // EngineConfig has no encryption key; the run must be rejected before
    // any graph executes.
    let app = GraphBuilder::new()
        .add_node(NodeKind::Custom("n".into()), NoopNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("n".into()))
        .with_engine_config(test_engine())
        .compile()
        .unwrap();
    let mut manager = RunManager::new(app).await;

    let cipher = SecretCipher::new("some-other-process-key").unwrap();
    let config = RunConfig {
        secrets: vec![RunSecret::new(
            "API_KEY",
            cipher.encrypt("v").unwrap(),
            true,
        )],
        ..RunConfig::default()
    };

    let err = manager
        .create_run(config, VersionedState::new_with_user_message("go"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RunnerError::Configuration { .. }));
    assert!(manager.list_runs().is_empty());
}

proptest! {
    #[test]
    fn round_trip_preserves_arbitrary_plaintext(value in ".{0,200}") {
        let cipher = SecretCipher::new("prop-key").unwrap();
        let envelope = cipher.encrypt(&value).unwrap();
        prop_assert_eq!(cipher.decrypt("t", &envelope).unwrap(), value);
    }

    #[test]
    fn decrypting_with_a_different_key_never_succeeds(value in ".{1,64}") {
        let a = SecretCipher::new("key-a").unwrap();
        let b = SecretCipher::new("key-b").unwrap();
        let envelope = a.encrypt(&value).unwrap();
        prop_assert!(b.decrypt("t", &envelope).is_err());
    }
}
