//! Common test utilities for all integration tests.
//!
//! Provides in-memory fakes for the external collaborators of a backup run.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use dumpstream::credentials::{TokenError, TokenRequest};
use dumpstream::secrets::SecretsError;
use dumpstream::{
    BackupOrchestrator, ByteSource, ConnectionParams, DumpError, DumpProducer, EventPayload,
    FixedClock, MemoryObjectStore, ObjectStore, PutOptions, SecretString, SecretsClient,
    StorageError, TokenIssuer,
};

/// 64 hex characters, a valid AES-256 key.
pub const KEY_HEX: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";

/// Instant used by [`fixed_clock`].
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 17, 13, 45, 30).unwrap()
}

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(fixed_time()))
}

/// Dump bytes for a database, starting with the custom-format header.
pub fn dump_bytes(database: &str) -> Vec<u8> {
    let mut bytes = b"PGDMP".to_vec();
    bytes.extend(format!("-- dump of {database} --").repeat(40).into_bytes());
    bytes
}

pub fn event(json: &str) -> EventPayload {
    EventPayload::from_json(json).expect("valid event json")
}

/// What the scripted producer does for a database.
#[derive(Debug, Clone)]
pub enum DumpScript {
    Succeed(Vec<u8>),
    FailToStart,
    /// Emit the bytes, then fail the stream like a crashed pg_dump
    FailMidStream(Vec<u8>),
}

/// Dump producer that replays scripted output and records every start.
#[derive(Default)]
pub struct ScriptedDumpProducer {
    scripts: Mutex<HashMap<String, DumpScript>>,
    invocations: Mutex<Vec<ConnectionParams>>,
}

impl ScriptedDumpProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, database: &str, script: DumpScript) -> Self {
        self.scripts.lock().unwrap().insert(database.to_string(), script);
        self
    }

    /// Databases the producer was started for, in order.
    pub fn started(&self) -> Vec<String> {
        self.invocations.lock().unwrap().iter().map(|p| p.database.clone()).collect()
    }

    pub fn invocations(&self) -> Vec<ConnectionParams> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl DumpProducer for ScriptedDumpProducer {
    async fn start(&self, params: &ConnectionParams) -> Result<ByteSource, DumpError> {
        self.invocations.lock().unwrap().push(params.clone());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&params.database)
            .cloned()
            .unwrap_or_else(|| DumpScript::Succeed(dump_bytes(&params.database)));

        match script {
            DumpScript::Succeed(bytes) => Ok(Box::pin(Cursor::new(bytes))),
            DumpScript::FailToStart => Err(DumpError::EarlyExit {
                status: "exit status: 1".to_string(),
                stderr: format!("database \"{}\" does not exist", params.database),
            }),
            DumpScript::FailMidStream(bytes) => {
                Ok(Box::pin(Cursor::new(bytes).chain(FailingReader::dump_failed())))
            }
        }
    }
}

/// Reader that fails on first poll.
pub struct FailingReader {
    error: Option<io::Error>,
}

impl FailingReader {
    pub fn new(error: io::Error) -> Self {
        Self { error: Some(error) }
    }

    pub fn dump_failed() -> Self {
        Self::new(io::Error::other(DumpError::Failed {
            status: "exit status: 1".to_string(),
            stderr: "server closed the connection unexpectedly".to_string(),
        }))
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let error = self.error.take().unwrap_or_else(|| io::Error::other("already failed"));
        Poll::Ready(Err(error))
    }
}

/// Secrets client returning a fixed value for one secret id.
pub struct StaticSecrets {
    secret_id: String,
    value: String,
    calls: Mutex<Vec<String>>,
}

impl StaticSecrets {
    pub fn new(secret_id: &str, value: &str) -> Self {
        Self { secret_id: secret_id.to_string(), value: value.to_string(), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretsClient for StaticSecrets {
    async fn get_secret(&self, key: &str) -> dumpstream::secrets::Result<String> {
        self.calls.lock().unwrap().push(key.to_string());
        if key == self.secret_id {
            Ok(self.value.clone())
        } else {
            Err(SecretsError::not_found(key))
        }
    }
}

/// Token issuer that signs every request with the same token.
pub struct StaticTokenIssuer {
    token: String,
    requests: Mutex<Vec<TokenRequest>>,
}

impl StaticTokenIssuer {
    pub fn new(token: &str) -> Self {
        Self { token: token.to_string(), requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<TokenRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenIssuer for StaticTokenIssuer {
    async fn issue_token(&self, request: &TokenRequest) -> Result<SecretString, TokenError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(SecretString::new(self.token.clone()))
    }
}

/// Object store that rejects uploads to one key and passes the rest to a
/// [`MemoryObjectStore`]. Records every key an upload was attempted for.
pub struct RejectingObjectStore {
    inner: MemoryObjectStore,
    rejected_key: String,
    attempts: Mutex<Vec<String>>,
}

impl RejectingObjectStore {
    pub fn new(inner: MemoryObjectStore, rejected_key: impl Into<String>) -> Self {
        Self { inner, rejected_key: rejected_key.into(), attempts: Mutex::new(Vec::new()) }
    }

    /// Keys uploads were attempted for, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for RejectingObjectStore {
    async fn put(
        &self,
        key: &str,
        body: ByteSource,
        options: &PutOptions,
    ) -> Result<String, StorageError> {
        self.attempts.lock().unwrap().push(key.to_string());
        if key == self.rejected_key {
            return Err(StorageError::request_message(key, "AccessDenied: Access Denied"));
        }
        self.inner.put(key, body, options).await
    }
}

/// Orchestrator over a scripted producer and a memory store with a fixed clock.
pub fn orchestrator(
    producer: Arc<ScriptedDumpProducer>,
    store: MemoryObjectStore,
) -> BackupOrchestrator {
    BackupOrchestrator::new(producer, Arc::new(store)).with_clock(fixed_clock())
}

/// Decrypt an AES-256-CBC backup with a hex key and hex IV.
pub fn decrypt(ciphertext: &[u8], key_hex: &str, iv_hex: &str) -> Vec<u8> {
    use cbc::cipher::block_padding::Pkcs7;
    use cbc::cipher::{BlockDecryptMut, KeyIvInit};

    let key = hex::decode(key_hex).unwrap();
    let iv = hex::decode(iv_hex).unwrap();
    cbc::Decryptor::<aes::Aes256>::new_from_slices(&key, &iv)
        .unwrap()
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .unwrap()
}
