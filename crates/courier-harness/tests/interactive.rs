//! Interactive loop tests
//!
//! Feeds operator input through `run` with `-int true` and checks:
//! - each line merges over the overlay before exactly one dispatch
//! - reserved commands never dispatch
//! - failures are reported and the loop keeps going
//! - `quit` and end of input both exit 0 after flushing the session

use courier_client::{HINT, PROMPT, run};
use courier_core::{KeyExchangeConfig, Status};
use courier_harness::{CountingFactory, Reply, SharedBuffer, capture_console};

const ARGS: &[&str] = &["-int", "true", "-url", "localhost:4500", "-eid", "client-1", "-msg", "hi"];

async fn session(factory: &CountingFactory, input: &str) -> (Status, SharedBuffer, SharedBuffer) {
    session_bytes(factory, input.as_bytes()).await
}

async fn session_bytes(
    factory: &CountingFactory,
    input: &[u8],
) -> (Status, SharedBuffer, SharedBuffer) {
    let args = ARGS.iter().map(|s| (*s).to_string()).collect();
    let (console, out, err) = capture_console();
    let status = run(args, factory.clone(), console, input).await;
    (status, out, err)
}

#[tokio::test]
async fn quit_exits_zero_without_dispatch() {
    let factory = CountingFactory::new();

    let (status, out, _) = session(&factory, "quit\n").await;

    assert_eq!(status, Status::Ok);
    assert_eq!(factory.build_count(), 0);
    let out = out.contents();
    assert!(out.starts_with(PROMPT));
    assert!(out.ends_with("Exit Status 0: Success\n"));
}

#[tokio::test]
async fn end_of_input_exits_like_quit() {
    let factory = CountingFactory::new();

    let (status, _, _) = session(&factory, "\n").await;

    assert_eq!(status, Status::Ok);
    assert_eq!(factory.send_count(), 1);
    assert_eq!(factory.builds()[0].store.flush_count(), 1);
}

#[tokio::test]
async fn empty_line_resends_current_options() {
    let factory = CountingFactory::new();

    session(&factory, "\n\n   \nq\n").await;

    assert_eq!(factory.build_count(), 1);
    assert_eq!(factory.send_count(), 3);
}

#[tokio::test]
async fn line_merges_before_dispatch() {
    let factory = CountingFactory::new();

    let (_, out, _) = session(&factory, "-msg \"hello there\" -kx JWE_LADDER -kxm PSK\nquit\n").await;

    let builds = factory.builds();
    let log = builds[0].log.lock();
    assert_eq!(log.sends[0].payload.as_ref(), b"hello there");
    assert_eq!(log.fetched[0][0].config, KeyExchangeConfig::new("JWE_LADDER", Some("PSK")));
    assert!(out.contents().contains("Response: hello there"));
}

#[tokio::test]
async fn sentinel_removes_option() {
    let factory = CountingFactory::new();

    let (_, out, _) = session(&factory, "-uid alice\n-uid -\nlist\nquit\n").await;

    let builds = factory.builds();
    let log = builds[0].log.lock();
    assert_eq!(log.sends.len(), 2);
    assert_eq!(log.sends[0].config.user_id.as_deref(), Some("alice"));
    assert_eq!(log.sends[1].config.user_id, None);
    assert!(out.contents().contains("args: -int true -url localhost:4500 -eid client-1 -msg hi\n"));
}

#[tokio::test]
async fn removing_key_exchange_keeps_last_descriptor_set() {
    let factory = CountingFactory::new();

    session(&factory, "-kx DIFFIE_HELLMAN\n-kx -\nquit\n").await;

    let builds = factory.builds();
    assert_eq!(
        builds[0].key_exchange.config(),
        Some(KeyExchangeConfig::new("DIFFIE_HELLMAN", None))
    );
    let log = builds[0].log.lock();
    assert_eq!(log.sends.len(), 2);
    // No reconfigure ran, so the consumed set is handed out again
    assert_eq!(log.fetched[0], log.fetched[1]);
    assert_eq!(log.fetched[1].len(), 1);
}

#[tokio::test]
async fn list_prints_options_without_dispatch() {
    let factory = CountingFactory::new();

    let (_, out, _) = session(&factory, "-uid alice\nlist\nquit\n").await;

    assert_eq!(factory.send_count(), 1);
    let out = out.contents();
    assert!(out.contains("args: -int true -url localhost:4500 -eid client-1 -uid alice -msg hi\n"));
}

#[tokio::test]
async fn hint_and_help_print_without_dispatch() {
    let factory = CountingFactory::new();

    let (_, out, _) = session(&factory, "?\nHELP\nquit\n").await;

    assert_eq!(factory.build_count(), 0);
    let out = out.contents();
    assert!(out.contains(HINT));
    assert!(out.contains("EXIT STATUS"));
}

#[tokio::test]
async fn save_flushes_live_session() {
    let factory = CountingFactory::new();

    session(&factory, "\nsave\nsave\nquit\n").await;

    // Two saves plus the flush on exit
    assert_eq!(factory.builds()[0].store.flush_count(), 3);
}

#[tokio::test]
async fn save_without_session_is_silent() {
    let factory = CountingFactory::new();

    let (status, _, err) = session(&factory, "save\nquit\n").await;

    assert_eq!(status, Status::Ok);
    assert!(err.contents().is_empty());
}

#[tokio::test]
async fn failed_save_is_reported_and_loop_continues() {
    let factory = CountingFactory::new();
    factory.fail_flushes();

    let (status, _, err) = session(&factory, "\nsave\n\nquit\n").await;

    assert_eq!(status, Status::Ok);
    assert_eq!(factory.send_count(), 2);
    assert!(err.contents().contains("Error: "));
}

#[tokio::test]
async fn identity_change_rebinds_session() {
    let factory = CountingFactory::new();

    session(&factory, "\n-eid client-2\n\nquit\n").await;

    let builds = factory.builds();
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0].identity.as_str(), "client-1");
    assert_eq!(builds[0].store.flush_count(), 1);
    assert_eq!(builds[1].identity.as_str(), "client-2");
    assert_eq!(builds[1].log.lock().sends.len(), 2);
    assert_eq!(builds[1].store.flush_count(), 1);
}

#[tokio::test]
async fn failures_are_reported_and_loop_continues() {
    let factory = CountingFactory::new();
    factory.push_reply(Reply::error(7, None));
    factory.push_reply(Reply::Unreachable);

    let (status, out, err) = session(&factory, "\n\n\nquit\n").await;

    assert_eq!(status, Status::Ok);
    assert_eq!(factory.send_count(), 3);
    let out = out.contents();
    assert!(out.contains("Status: 4: Server Protocol Error Reply"));
    assert!(out.contains("Status: 5: Server Communication Error"));
    assert!(out.contains("Response: hi"));
    assert!(err.contents().contains("RESPONSE ERROR: error_code 7"));
}

#[tokio::test]
async fn malformed_line_is_not_dispatched() {
    let factory = CountingFactory::new();

    let (status, _, err) = session(&factory, "-bogus x\n-msg \"open\nquit\n").await;

    assert_eq!(status, Status::Ok);
    assert_eq!(factory.send_count(), 0);
    let err = err.contents();
    assert!(err.contains("Error: unrecognized option: -bogus"));
    assert!(err.contains("Error: unterminated quote in input"));
}

#[tokio::test]
async fn interactive_mode_cannot_be_turned_off() {
    let factory = CountingFactory::new();

    let (status, _, err) = session(&factory, "-int false\n-int -\n-int true\nquit\n").await;

    assert_eq!(status, Status::Ok);
    let err = err.contents();
    assert_eq!(err.matches("interactive mode cannot be changed at runtime").count(), 2);
    // Restating the current value is a plain resend
    assert_eq!(factory.send_count(), 1);
}

#[tokio::test]
async fn conflicting_payload_sources_do_not_end_loop() {
    let factory = CountingFactory::new();

    let (_, out, _) = session(&factory, "-if payload.bin\n-if -\nquit\n").await;

    assert!(out.contents().contains("Status: 1: Invalid Arguments"));
    assert_eq!(factory.send_count(), 1);
}

#[tokio::test]
async fn invalid_utf8_line_is_reported_and_loop_continues() {
    let factory = CountingFactory::new();

    let (status, out, err) = session_bytes(&factory, b"\xff\xfe\nq\n").await;

    assert_eq!(status, Status::Ok);
    assert_eq!(factory.send_count(), 0);
    assert!(err.contents().contains("Error: input line is not valid UTF-8"));
    assert!(out.contents().ends_with("Exit Status 0: Success\n"));
}

#[tokio::test]
async fn lines_after_invalid_utf8_are_dispatched() {
    let factory = CountingFactory::new();

    let (status, _, _) = session_bytes(&factory, b"-msg caf\xe9\n-msg cafe\nquit\n").await;

    assert_eq!(status, Status::Ok);
    let builds = factory.builds();
    let log = builds[0].log.lock();
    assert_eq!(log.sends.len(), 1);
    assert_eq!(log.sends[0].payload.as_ref(), b"cafe");
}

#[tokio::test]
async fn final_line_without_newline_is_processed() {
    let factory = CountingFactory::new();

    let (status, _, _) = session(&factory, "-msg last").await;

    assert_eq!(status, Status::Ok);
    assert_eq!(factory.send_count(), 1);
}
