//! Shared test utilities for memsync-hooks integration tests.

#![allow(dead_code)]

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use memsync_core::{ContextPayload, Environment, StateDir};
use memsync_hooks::{FetchOptions, KnowledgeService, OutboundMessage, ServiceError, ServiceResult};
use serde_json::json;
use tempfile::TempDir;

/// In-memory knowledge service that records every call.
pub struct FakeService {
    pub fail_sends: AtomicBool,
    pub fail_fetches: AtomicBool,
    pub fail_resolves: AtomicBool,
    pub sent: Mutex<Vec<(String, Vec<OutboundMessage>)>>,
    pub resolves: Mutex<Vec<String>>,
    pub fetches: Mutex<Vec<(String, FetchOptions)>>,
    pub payload: ContextPayload,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            fail_sends: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
            fail_resolves: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            resolves: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            payload: ContextPayload::new(json!({
                "representation": "Alice is refactoring the parser.",
                "peerCard": ["Prefers small commits"],
            })),
        }
    }

    /// A service whose every call fails.
    pub fn failing() -> Self {
        let service = Self::new();
        service.set_failing(true);
        service
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_sends.store(failing, Ordering::SeqCst);
        self.fail_fetches.store(failing, Ordering::SeqCst);
        self.fail_resolves.store(failing, Ordering::SeqCst);
    }

    /// Contents of every delivered message, in delivery order.
    pub fn sent_contents(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, msgs)| msgs.iter().map(|m| m.content.clone()))
            .collect()
    }

    /// Session ids that received a batch, in delivery order.
    pub fn sent_sessions(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(session, _)| session.clone())
            .collect()
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.lock().unwrap().len()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    fn resolve(&self, kind: &str, name: &str) -> ServiceResult<String> {
        self.resolves
            .lock()
            .unwrap()
            .push(format!("{}:{}", kind, name));
        if self.fail_resolves.load(Ordering::SeqCst) {
            return Err(ServiceError::Network {
                message: "connection refused".to_string(),
            });
        }
        Ok(format!("{}-{}", kind, name))
    }
}

impl KnowledgeService for FakeService {
    fn resolve_workspace(&self, name: &str) -> ServiceResult<String> {
        self.resolve("ws", name)
    }

    fn resolve_peer(&self, name: &str) -> ServiceResult<String> {
        self.resolve("peer", name)
    }

    fn resolve_session(&self, name: &str) -> ServiceResult<String> {
        self.resolve("session", name)
    }

    fn fetch_context(&self, peer_id: &str, options: &FetchOptions) -> ServiceResult<ContextPayload> {
        self.fetches
            .lock()
            .unwrap()
            .push((peer_id.to_string(), options.clone()));
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(ServiceError::Service {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.payload.clone())
    }

    fn send_messages(&self, session_id: &str, messages: &[OutboundMessage]) -> ServiceResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ServiceError::Network {
                message: "timed out".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((session_id.to_string(), messages.to_vec()));
        Ok(())
    }
}

/// A temp state directory with `config` written as `config.json`.
pub fn state_with_config(config: serde_json::Value) -> (TempDir, StateDir) {
    let temp = TempDir::new().expect("create temp dir");
    let state = StateDir::at(temp.path());
    fs::write(
        state.config_path(),
        serde_json::to_string_pretty(&config).expect("serialize config"),
    )
    .expect("write config");
    (temp, state)
}

/// A configured state directory for peer `alice`.
pub fn configured_state() -> (TempDir, StateDir) {
    state_with_config(json!({"apiKey": "test-key", "peerName": "alice"}))
}

pub fn no_env() -> Environment {
    Environment::empty()
}
