//! End-to-end tests of the backup pipeline against in-memory collaborators.

mod common;

use std::sync::Arc;

use common::{
    decrypt, dump_bytes, event, fixed_clock, orchestrator, DumpScript, RejectingObjectStore,
    ScriptedDumpProducer, StaticSecrets, StaticTokenIssuer, KEY_HEX,
};
use dumpstream::storage::StoreEvent;
use dumpstream::{
    BackupError, BackupKey, BackupOrchestrator, BackupOutcome, CredentialError, EnvSnapshot,
    MemoryObjectStore, Stage,
};

fn key_for(database: &str) -> String {
    BackupKey::generate(database, None, common::fixed_time()).to_string()
}

fn location(key: &str) -> String {
    MemoryObjectStore::location("B", key)
}

#[tokio::test]
async fn test_multiple_databases_in_order() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let store = MemoryObjectStore::new();

    let outcome = orchestrator(producer.clone(), store.clone())
        .handle(event(r#"{"PGDATABASE": "a,b", "S3_BUCKET": "B"}"#), &EnvSnapshot::default())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        BackupOutcome::Multiple(vec![location(&key_for("a")), location(&key_for("b"))])
    );
    assert_eq!(producer.started(), vec!["a", "b"]);
    assert_eq!(store.object(&key_for("a")).unwrap().body, dump_bytes("a"));
    assert_eq!(store.object(&key_for("b")).unwrap().body, dump_bytes("b"));
}

#[tokio::test]
async fn test_single_database_returns_single_location() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let store = MemoryObjectStore::new();

    let outcome = orchestrator(producer, store)
        .handle(event(r#"{"PGDATABASE": "orders", "S3_BUCKET": "B"}"#), &EnvSnapshot::default())
        .await
        .unwrap();

    assert_eq!(outcome, BackupOutcome::Single(location(&key_for("orders"))));
    assert_eq!(
        serde_json::to_string(&outcome).unwrap(),
        format!("\"memory://B/{}\"", key_for("orders"))
    );
}

#[tokio::test]
async fn test_duplicate_names_are_each_backed_up() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let outcome = orchestrator(producer.clone(), MemoryObjectStore::new())
        .handle(event(r#"{"PGDATABASE": "a, a", "S3_BUCKET": "B"}"#), &EnvSnapshot::default())
        .await
        .unwrap();

    assert_eq!(outcome.len(), 2);
    assert_eq!(producer.started(), vec!["a", "a"]);
}

#[tokio::test]
async fn test_root_prefix_and_storage_options() {
    let store = MemoryObjectStore::new();
    orchestrator(Arc::new(ScriptedDumpProducer::new()), store.clone())
        .handle(
            event(r#"{"PGDATABASE": "a", "S3_BUCKET": "B", "ROOT": "prod", "S3_STORAGE_CLASS": "GLACIER_IR"}"#),
            &EnvSnapshot::default(),
        )
        .await
        .unwrap();

    let key = BackupKey::generate("a", Some("prod"), common::fixed_time());
    assert_eq!(key.as_str(), "prod/2024-05-17/a-17-05-2024@13-45-30.backup");
    let object = store.object(key.as_str()).unwrap();
    assert_eq!(object.bucket, "B");
    assert_eq!(object.storage_class, "GLACIER_IR");
}

#[tokio::test]
async fn test_empty_database_name_fails_before_any_work() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let store = MemoryObjectStore::new();

    let err = orchestrator(producer.clone(), store.clone())
        .handle(event(r#"{"PGDATABASE": "", "S3_BUCKET": "B"}"#), &EnvSnapshot::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::DatabaseName { .. }));
    assert_eq!(err.stage(), Stage::ResolveNames);
    assert!(producer.started().is_empty());
    assert!(store.events().is_empty());
}

#[tokio::test]
async fn test_invalid_encryption_key_fails_before_dump() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let store = MemoryObjectStore::new();

    let err = orchestrator(producer.clone(), store.clone())
        .handle(
            event(r#"{"PGDATABASE": "a", "S3_BUCKET": "B", "ENCRYPT_KEY": "bad"}"#),
            &EnvSnapshot::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::EncryptionKey(_)));
    assert_eq!(err.stage(), Stage::Configure);
    assert!(producer.started().is_empty());
    assert!(store.events().is_empty());
}

#[tokio::test]
async fn test_missing_bucket_is_configuration_error() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let err = orchestrator(producer.clone(), MemoryObjectStore::new())
        .handle(event(r#"{"PGDATABASE": "a"}"#), &EnvSnapshot::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::Configuration { .. }));
    assert!(err.to_string().contains("S3_BUCKET"));
    assert!(producer.started().is_empty());
}

#[tokio::test]
async fn test_encrypted_backup_stores_iv_first() {
    let store = MemoryObjectStore::new();
    let json = format!(r#"{{"PGDATABASE": "a", "S3_BUCKET": "B", "ENCRYPT_KEY": "{KEY_HEX}"}}"#);

    orchestrator(Arc::new(ScriptedDumpProducer::new()), store.clone())
        .handle(event(&json), &EnvSnapshot::default())
        .await
        .unwrap();

    let key = key_for("a");
    let iv_key = format!("{key}.iv");
    assert_eq!(
        store.events(),
        vec![
            StoreEvent::Started { key: iv_key.clone() },
            StoreEvent::Completed { key: iv_key.clone() },
            StoreEvent::Started { key: key.clone() },
            StoreEvent::Completed { key: key.clone() },
        ]
    );

    let iv_hex = String::from_utf8(store.object(&iv_key).unwrap().body).unwrap();
    assert_eq!(iv_hex.len(), 32);

    let ciphertext = store.object(&key).unwrap().body;
    assert_ne!(ciphertext, dump_bytes("a"));
    assert_eq!(decrypt(&ciphertext, KEY_HEX, &iv_hex), dump_bytes("a"));
}

#[tokio::test]
async fn test_unencrypted_backup_is_identical_to_dump() {
    let store = MemoryObjectStore::new();
    orchestrator(Arc::new(ScriptedDumpProducer::new()), store.clone())
        .handle(
            event(r#"{"PGDATABASE": "a", "S3_BUCKET": "B", "ENCRYPT_KEY": ""}"#),
            &EnvSnapshot::default(),
        )
        .await
        .unwrap();

    assert_eq!(store.keys(), vec![key_for("a")]);
    assert_eq!(store.object(&key_for("a")).unwrap().body, dump_bytes("a"));
}

#[tokio::test]
async fn test_fail_fast_on_mid_stream_dump_failure() {
    let producer = Arc::new(
        ScriptedDumpProducer::new()
            .with_script("b", DumpScript::FailMidStream(b"PGDMP partial".to_vec())),
    );
    let store = MemoryObjectStore::new();

    let err = orchestrator(producer.clone(), store.clone())
        .handle(event(r#"{"PGDATABASE": "a,b,c", "S3_BUCKET": "B"}"#), &EnvSnapshot::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::Process { .. }));
    assert_eq!(err.stage(), Stage::Dump);
    assert_eq!(err.database(), Some("b"));
    assert_eq!(producer.started(), vec!["a", "b"]);
    assert_eq!(store.keys(), vec![key_for("a")]);
    assert_eq!(store.events().last(), Some(&StoreEvent::Failed { key: key_for("b") }));
}

#[tokio::test]
async fn test_fail_fast_on_upload_failure() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let memory = MemoryObjectStore::new();
    let store = Arc::new(RejectingObjectStore::new(memory.clone(), key_for("b")));

    let err = BackupOrchestrator::new(producer.clone(), store.clone())
        .with_clock(fixed_clock())
        .handle(event(r#"{"PGDATABASE": "a,b,c", "S3_BUCKET": "B"}"#), &EnvSnapshot::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::Upload { ref key, .. } if *key == key_for("b")));
    assert_eq!(err.stage(), Stage::Upload);
    assert_eq!(err.database(), Some("b"));
    assert_eq!(producer.started(), vec!["a", "b"]);
    assert_eq!(store.attempts(), vec![key_for("a"), key_for("b")]);
    assert_eq!(memory.keys(), vec![key_for("a")]);
    assert_eq!(memory.object(&key_for("a")).unwrap().body, dump_bytes("a"));
}

#[tokio::test]
async fn test_iv_upload_failure_stops_before_main_upload() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let memory = MemoryObjectStore::new();
    let iv_key = BackupKey::generate("a", None, common::fixed_time()).iv_key();
    let store = Arc::new(RejectingObjectStore::new(memory.clone(), iv_key.clone()));

    let err = BackupOrchestrator::new(producer.clone(), store.clone())
        .with_clock(fixed_clock())
        .handle(
            event(&format!(r#"{{"PGDATABASE": "a,b", "S3_BUCKET": "B", "ENCRYPT_KEY": "{KEY_HEX}"}}"#)),
            &EnvSnapshot::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::Upload { ref key, .. } if *key == iv_key));
    assert_eq!(err.database(), Some("a"));
    assert_eq!(store.attempts(), vec![iv_key]);
    assert_eq!(producer.started(), vec!["a"]);
    assert!(memory.keys().is_empty());
    assert!(memory.events().is_empty());
}

#[tokio::test]
async fn test_dump_start_failure_is_process_error() {
    let producer =
        Arc::new(ScriptedDumpProducer::new().with_script("a", DumpScript::FailToStart));
    let store = MemoryObjectStore::new();

    let err = orchestrator(producer, store.clone())
        .handle(event(r#"{"PGDATABASE": "a,b", "S3_BUCKET": "B"}"#), &EnvSnapshot::default())
        .await
        .unwrap_err();

    assert_eq!(err.database(), Some("a"));
    assert!(err.to_string().contains("does not exist"));
    assert!(store.events().is_empty());
}

#[tokio::test]
async fn test_environment_overrides_event() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let env: EnvSnapshot =
        [("PGDATABASE", "from_env"), ("PGPASSWORD", "env-password")].into_iter().collect();

    orchestrator(producer.clone(), MemoryObjectStore::new())
        .handle(event(r#"{"PGDATABASE": "from_event", "S3_BUCKET": "B"}"#), &env)
        .await
        .unwrap();

    let invocation = &producer.invocations()[0];
    assert_eq!(invocation.database, "from_env");
    assert_eq!(invocation.password.as_ref().unwrap().expose_secret(), "env-password");
}

#[tokio::test]
async fn test_secrets_manager_credentials_reach_dump() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let secrets = Arc::new(StaticSecrets::new(
        "prod/db",
        r#"{"username": "backup_user", "password": "from-secret"}"#,
    ));

    orchestrator(producer.clone(), MemoryObjectStore::new())
        .with_secrets_client(secrets.clone())
        .handle(
            event(
                r#"{"PGDATABASE": "a", "S3_BUCKET": "B", "PGUSER": "ignored", "SECRETS_MANAGER_SECRET_ID": "prod/db"}"#,
            ),
            &EnvSnapshot::default(),
        )
        .await
        .unwrap();

    assert_eq!(secrets.calls(), vec!["prod/db"]);
    let invocation = &producer.invocations()[0];
    assert_eq!(invocation.user.as_deref(), Some("backup_user"));
    assert_eq!(invocation.password.as_ref().unwrap().expose_secret(), "from-secret");
}

#[tokio::test]
async fn test_iam_token_replaces_password() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let issuer = Arc::new(StaticTokenIssuer::new("iam-token"));

    orchestrator(producer.clone(), MemoryObjectStore::new())
        .with_token_issuer(issuer.clone())
        .handle(
            event(
                r#"{"PGDATABASE": "a,b", "S3_BUCKET": "B", "PGHOST": "db.internal", "PGUSER": "iam_user", "PGPASSWORD": "old", "USE_IAM_AUTH": true, "S3_REGION": "us-east-2"}"#,
            ),
            &EnvSnapshot::default(),
        )
        .await
        .unwrap();

    let requests = issuer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].host, "db.internal");
    assert_eq!(requests[0].region, "us-east-2");
    for invocation in producer.invocations() {
        assert_eq!(invocation.password.as_ref().unwrap().expose_secret(), "iam-token");
    }
}

#[tokio::test]
async fn test_secret_fetch_failure_stops_run() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let secrets = Arc::new(StaticSecrets::new("other", "{}"));

    let err = orchestrator(producer.clone(), MemoryObjectStore::new())
        .with_secrets_client(secrets)
        .handle(
            event(r#"{"PGDATABASE": "a", "S3_BUCKET": "B", "SECRETS_MANAGER_SECRET_ID": "prod/db"}"#),
            &EnvSnapshot::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::Credential(CredentialError::SecretFetch { .. })));
    assert_eq!(err.stage(), Stage::Decorate);
    assert!(producer.started().is_empty());
}

#[tokio::test]
async fn test_strategy_without_collaborator_fails() {
    let producer = Arc::new(ScriptedDumpProducer::new());
    let orchestrator: BackupOrchestrator =
        orchestrator(producer.clone(), MemoryObjectStore::new());

    let err = orchestrator
        .handle(
            event(r#"{"PGDATABASE": "a", "S3_BUCKET": "B", "USE_IAM_AUTH": "true", "PGHOST": "h", "PGUSER": "u"}"#),
            &EnvSnapshot::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::Credential(CredentialError::MissingCollaborator { .. })));
    assert!(producer.started().is_empty());
}
