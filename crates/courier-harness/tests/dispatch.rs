//! Dispatch and classification tests
//!
//! Drives `ClientApp` against scripted engines and checks that every engine
//! outcome lands on the right status:
//! - Payload → OK, error reply → PROTOCOL_ERROR, neither → PROTOCOL_ERROR
//! - Engine failures, direct or wrapped → PROTOCOL_EXC
//! - Conflicting payload sources → ARG_ERROR before any engine activity

use bytes::Bytes;
use courier_client::ClientApp;
use courier_core::{
    ArgumentOverlay, Config, EngineError, EngineResponse, ErrorReply, KeyExchangeConfig,
    OptionKey, OptionSet, Status,
};
use courier_harness::{CountingFactory, Reply, SharedBuffer, capture_console};

const BASE: &[&str] = &["-url", "localhost:4500", "-eid", "client-1"];

fn app_with(
    extra: &[&str],
    factory: &CountingFactory,
) -> (ClientApp<CountingFactory>, SharedBuffer, SharedBuffer) {
    let args: Vec<&str> = BASE.iter().chain(extra).copied().collect();
    let overlay = ArgumentOverlay::from_args(args).unwrap();
    let (console, out, err) = capture_console();
    (ClientApp::new(overlay, Config::default(), factory.clone(), console), out, err)
}

async fn status_for(reply: Reply) -> Status {
    let factory = CountingFactory::new();
    factory.push_reply(reply);
    let (mut app, _, _) = app_with(&["-msg", "hi"], &factory);
    app.send_single_request().await
}

#[tokio::test]
async fn payload_reply_is_ok_and_printed() {
    let factory = CountingFactory::new();
    factory.push_reply(Reply::payload("pong"));
    let (mut app, out, err) = app_with(&["-msg", "ping"], &factory);

    assert_eq!(app.send_single_request().await, Status::Ok);

    let out = out.contents();
    assert!(out.contains("Options: -url localhost:4500 -eid client-1 -msg ping"));
    assert!(out.contains("Response: pong"));
    assert!(err.contents().is_empty());
}

#[tokio::test]
async fn response_with_neither_payload_nor_error_is_protocol_error() {
    assert_eq!(status_for(Reply::Raw(EngineResponse::default())).await, Status::ProtocolError);
}

#[tokio::test]
async fn error_reply_is_protocol_error() {
    let factory = CountingFactory::new();
    factory.push_reply(Reply::error(7, Some("denied")));
    let (mut app, _, err) = app_with(&["-msg", "hi"], &factory);

    assert_eq!(app.send_single_request().await, Status::ProtocolError);
    assert!(err.contents().contains("RESPONSE ERROR: error_code 7, error_msg \"denied\""));
}

#[tokio::test]
async fn payload_wins_over_error_header() {
    let response = EngineResponse {
        payload: Some(Bytes::from_static(b"both")),
        error: Some(ErrorReply { code: 9, message: None }),
    };
    assert_eq!(status_for(Reply::Raw(response)).await, Status::Ok);
}

#[tokio::test]
async fn engine_failures_are_protocol_exceptions() {
    assert_eq!(
        status_for(Reply::EngineFailure(EngineError::Protocol("bad mac".to_string()))).await,
        Status::ProtocolExc
    );
    assert_eq!(
        status_for(Reply::WrappedEngineFailure(EngineError::KeyExchange("no".to_string()))).await,
        Status::ProtocolExc
    );
}

#[tokio::test]
async fn wrapped_connection_failure_is_comm_error() {
    assert_eq!(status_for(Reply::Unreachable).await, Status::CommError);
}

#[tokio::test]
async fn inline_and_file_payload_conflict_before_engine() {
    let factory = CountingFactory::new();
    let (mut app, _, err) = app_with(&["-msg", "hi", "-if", "payload.bin"], &factory);

    assert_eq!(app.send_single_request().await, Status::ArgError);
    assert!(err.contents().contains("-if and -msg cannot be both specified"));
    assert_eq!(factory.build_count(), 0);
    assert_eq!(factory.send_count(), 0);
}

#[tokio::test]
async fn missing_entity_is_arg_error() {
    let factory = CountingFactory::new();
    let overlay = ArgumentOverlay::from_args(["-url", "localhost:4500"]).unwrap();
    let (console, _, _) = capture_console();
    let mut app = ClientApp::new(overlay, Config::default(), factory.clone(), console);

    assert_eq!(app.send_single_request().await, Status::ArgError);
    assert_eq!(factory.build_count(), 0);
}

#[tokio::test]
async fn file_payload_is_sent_and_reply_written_to_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");
    std::fs::write(&input, b"file payload").unwrap();
    std::fs::write(&output, b"stale contents that are longer").unwrap();

    let factory = CountingFactory::new();
    let (mut app, out, _) = app_with(
        &["-if", input.to_str().unwrap(), "-of", output.to_str().unwrap()],
        &factory,
    );

    assert_eq!(app.send_single_request().await, Status::Ok);

    let builds = factory.builds();
    let log = builds[0].log.lock();
    assert_eq!(log.sends[0].payload, Bytes::from_static(b"file payload"));
    assert_eq!(std::fs::read(&output).unwrap(), b"file payload");
    assert!(!out.contents().contains("Response:"));
}

#[tokio::test]
async fn unreadable_input_file_is_internal_error() {
    let factory = CountingFactory::new();
    let (mut app, _, _) = app_with(&["-if", "/nonexistent/in.bin"], &factory);

    assert_eq!(app.send_single_request().await, Status::InternalError);
    assert_eq!(factory.send_count(), 0);
}

#[tokio::test]
async fn message_options_reach_engine() {
    let factory = CountingFactory::new();
    let (mut app, _, _) = app_with(
        &["-msg", "hi", "-uid", "alice", "-enc", "false", "-nrep", "true", "-v", "true"],
        &factory,
    );

    assert_eq!(app.send_single_request().await, Status::Ok);

    let builds = factory.builds();
    let log = builds[0].log.lock();
    let config = &log.sends[0].config;
    assert_eq!(config.user_id.as_deref(), Some("alice"));
    assert_eq!(config.user_auth.as_deref(), Some("EMAIL_PASSWORD"));
    assert!(!config.encrypted);
    assert!(config.integrity_protected);
    assert!(config.non_replayable);
    assert_eq!(log.verbose, vec![true]);
}

#[tokio::test]
async fn unlisted_user_auth_is_config_error() {
    let factory = CountingFactory::new();
    let (mut app, _, _) = app_with(&["-msg", "hi", "-uid", "alice", "-uas", "SMS"], &factory);

    assert_eq!(app.send_single_request().await, Status::CfgError);
    assert_eq!(factory.send_count(), 0);
}

#[tokio::test]
async fn key_exchange_is_configured_before_send() {
    let factory = CountingFactory::new();
    let (mut app, _, _) =
        app_with(&["-msg", "hi", "-kx", "JWE_LADDER", "-kxm", "PSK"], &factory);

    assert_eq!(app.send_single_request().await, Status::Ok);

    let builds = factory.builds();
    let log = builds[0].log.lock();
    assert_eq!(log.fetched.len(), 1);
    assert_eq!(log.fetched[0][0].config, KeyExchangeConfig::new("JWE_LADDER", Some("PSK")));
}

#[tokio::test]
async fn every_round_after_a_fetch_gets_fresh_material() {
    let factory = CountingFactory::new();
    factory.fetches_per_send(3);
    let (mut app, _, _) = app_with(&["-msg", "hi", "-kx", "DIFFIE_HELLMAN"], &factory);

    app.send_single_request().await;
    app.send_single_request().await;

    let builds = factory.builds();
    let log = builds[0].log.lock();
    assert_eq!(log.fetched.len(), 6);
    // Retries within one round share the set
    assert_eq!(log.fetched[0], log.fetched[2]);
    // The next round recomputed because the set was consumed
    assert_ne!(log.fetched[2][0].nonce, log.fetched[3][0].nonce);
}

#[tokio::test]
async fn unsupported_mechanism_is_config_error_without_send() {
    let factory = CountingFactory::new();
    let (mut app, _, _) =
        app_with(&["-msg", "hi", "-kx", "DIFFIE_HELLMAN", "-kxm", "PSK"], &factory);

    assert_eq!(app.send_single_request().await, Status::CfgError);
    assert_eq!(factory.send_count(), 0);
}

#[tokio::test]
async fn identity_change_between_rounds_rebinds() {
    let factory = CountingFactory::new();
    let (mut app, _, _) = app_with(&["-msg", "hi"], &factory);

    app.send_single_request().await;
    app.merge(OptionSet::default().with(OptionKey::EntityId, "client-2")).unwrap();
    app.send_single_request().await;
    app.send_single_request().await;

    let builds = factory.builds();
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0].store.flush_count(), 1);
    assert_eq!(builds[1].identity.as_str(), "client-2");
    assert_eq!(builds[1].log.lock().sends.len(), 2);

    app.shutdown();
    assert_eq!(builds[1].store.flush_count(), 1);
}
