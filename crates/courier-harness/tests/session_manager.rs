//! Session manager tests
//!
//! These tests verify the session lifecycle:
//! - One build per identity, however often it is ensured
//! - Rebinding flushes the previous session before building the next
//! - Flush failures are downgraded and never block a rebind or shutdown

use std::sync::Arc;

use courier_client::{SessionConfig, SessionManager};
use courier_core::{Config, EntityIdentity, Status};
use courier_harness::CountingFactory;

fn session_config(entity_auth: &str) -> SessionConfig {
    SessionConfig { entity_auth: entity_auth.to_string(), config: Arc::new(Config::default()) }
}

#[test]
fn ensure_same_identity_twice_builds_once() {
    let factory = CountingFactory::new();
    let mut manager = SessionManager::new(factory.clone());
    let e1 = EntityIdentity::new("E1");

    manager.ensure_session(&e1, &session_config("NONE")).unwrap();
    manager.ensure_session(&e1, &session_config("NONE")).unwrap();

    assert_eq!(factory.build_count(), 1);
    assert_eq!(factory.builds()[0].entity_auth, "NONE");
    assert_eq!(factory.builds()[0].store.flush_count(), 0);
}

#[test]
fn ensure_new_identity_flushes_previous_and_rebuilds() {
    let factory = CountingFactory::new();
    let mut manager = SessionManager::new(factory.clone());

    manager.ensure_session(&EntityIdentity::new("E1"), &session_config("NONE")).unwrap();
    manager.ensure_session(&EntityIdentity::new("E2"), &session_config("NONE")).unwrap();

    let builds = factory.builds();
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0].identity.as_str(), "E1");
    assert_eq!(builds[0].store.flush_count(), 1);
    assert_eq!(builds[1].identity.as_str(), "E2");
    assert_eq!(builds[1].store.flush_count(), 0);
    assert_eq!(manager.current().unwrap().identity().as_str(), "E2");
}

#[test]
fn switching_back_builds_a_fresh_session() {
    let factory = CountingFactory::new();
    let mut manager = SessionManager::new(factory.clone());

    for id in ["E1", "E2", "E1"] {
        manager.ensure_session(&EntityIdentity::new(id), &session_config("NONE")).unwrap();
    }

    assert_eq!(factory.build_count(), 3);
    let builds = factory.builds();
    assert!(!Arc::ptr_eq(&builds[0].key_exchange, &builds[2].key_exchange));
}

#[test]
fn flush_failure_does_not_block_rebind() {
    let factory = CountingFactory::new();
    factory.fail_flushes();
    let mut manager = SessionManager::new(factory.clone());

    manager.ensure_session(&EntityIdentity::new("E1"), &session_config("NONE")).unwrap();
    let session =
        manager.ensure_session(&EntityIdentity::new("E2"), &session_config("NONE")).unwrap();

    assert_eq!(session.identity().as_str(), "E2");
    assert_eq!(factory.builds()[0].store.flush_count(), 1);
}

#[test]
fn flush_failure_does_not_block_shutdown() {
    let factory = CountingFactory::new();
    factory.fail_flushes();
    let mut manager = SessionManager::new(factory.clone());
    manager.ensure_session(&EntityIdentity::new("E1"), &session_config("NONE")).unwrap();

    manager.shutdown();

    assert!(manager.current().is_none());
    assert_eq!(factory.builds()[0].store.flush_count(), 1);
}

#[test]
fn save_surfaces_flush_failure_but_keeps_session() {
    let factory = CountingFactory::new();
    factory.fail_flushes();
    let mut manager = SessionManager::new(factory.clone());
    manager.ensure_session(&EntityIdentity::new("E1"), &session_config("NONE")).unwrap();

    assert!(manager.save().is_err());
    assert!(manager.current().is_some());
}

#[test]
fn shutdown_without_session_is_noop() {
    let factory = CountingFactory::new();
    let mut manager = SessionManager::new(factory.clone());

    manager.shutdown();

    assert_eq!(factory.build_count(), 0);
}

#[test]
fn unlisted_entity_auth_fails_build_as_config_error() {
    let factory = CountingFactory::new();
    let mut manager = SessionManager::new(factory.clone());

    let err = manager
        .ensure_session(&EntityIdentity::new("E1"), &session_config("KERBEROS"))
        .unwrap_err();

    assert_eq!(Status::classify(&err), Status::CfgError);
    assert_eq!(factory.build_count(), 0);
    assert!(manager.current().is_none());
}
