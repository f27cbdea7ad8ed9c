//! Integration tests for TerminalCorrelator routing

mod common;

use std::sync::Arc;

use sessionlink::config::RoutingSettings;
use sessionlink::terminal::{CandidateSource, TerminalCorrelator, TerminalHandle};
use sessionlink::{SessionError, SessionId};

use common::FakeHost;

fn sid(raw: &str) -> SessionId {
    SessionId::parse(raw).unwrap()
}

fn correlator(host: &Arc<FakeHost>) -> TerminalCorrelator {
    TerminalCorrelator::new(host.clone(), &RoutingSettings::default())
}

#[test]
fn test_binding_wins_without_scanning() {
    let host = FakeHost::new();
    let t1 = host.open("t1", "zsh");
    host.open("t2", "claude abc");
    let correlator = correlator(&host);

    correlator.register_binding(&sid("abc"), t1.clone());
    let scans_before = host.scans();

    let candidate = correlator.find_candidate(&sid("abc")).unwrap();
    assert_eq!(candidate.source, CandidateSource::Binding);
    assert_eq!(candidate.terminal.id(), t1.id());
    assert_eq!(host.scans(), scans_before, "binding lookup must not scan terminals");
}

#[test]
fn test_label_match_is_case_insensitive_and_registers() {
    let host = FakeHost::new();
    host.open("t1", "zsh");
    let t2 = host.open("t2", "Claude ABC-123");
    let correlator = correlator(&host);
    let id = sid("abc-123");

    assert!(correlator.resolve(&id).is_none());
    let candidate = correlator.find_candidate(&id).unwrap();
    assert_eq!(candidate.source, CandidateSource::LabelMatch);
    assert_eq!(candidate.terminal.id(), t2.id());

    // Registered on match
    assert_eq!(correlator.resolve(&id).unwrap().id(), t2.id());
    assert_eq!(
        correlator.find_candidate(&id).unwrap().source,
        CandidateSource::Binding
    );
}

#[test]
fn test_ambiguous_labels_are_not_guessed() {
    let host = FakeHost::new();
    host.open("t1", "claude abc");
    host.open("t2", "tail abc.log");
    let correlator = correlator(&host);

    assert!(correlator.by_label(&sid("abc")).is_none());
    assert!(correlator.find_candidate(&sid("abc")).is_none());
    assert!(correlator.resolve(&sid("abc")).is_none());
}

#[test]
fn test_focus_requires_allowed_program() {
    let host = FakeHost::new();
    let shell = host.open("t1", "zsh");
    let agent = host.open("t2", "claude");
    let correlator = correlator(&host);
    let id = sid("abc");

    host.focus(&shell);
    assert!(correlator.find_candidate(&id).is_none());

    host.focus(&agent);
    let candidate = correlator.find_candidate(&id).unwrap();
    assert_eq!(candidate.source, CandidateSource::FocusedAllowListed);
    assert_eq!(candidate.terminal.id(), agent.id());
}

#[test]
fn test_focus_skips_terminal_bound_to_other_session() {
    let host = FakeHost::new();
    let agent = host.open("t1", "claude");
    let correlator = correlator(&host);

    correlator.register_binding(&sid("other"), agent.clone());
    host.focus(&agent);

    assert!(correlator.by_focus(&sid("abc")).is_none());
    assert!(correlator.by_focus(&sid("other")).is_some());
}

#[test]
fn test_close_removes_binding() {
    let host = FakeHost::new();
    let t1 = host.open("t1", "zsh");
    let correlator = correlator(&host);
    let id = sid("abc");

    correlator.register_binding(&id, t1.clone());
    assert!(correlator.resolve(&id).is_some());

    host.close(&t1);
    assert!(correlator.resolve(&id).is_none());
}

#[test]
fn test_close_of_replaced_terminal_keeps_new_binding() {
    let host = FakeHost::new();
    let old = host.open("t1", "zsh");
    let new = host.open("t2", "zsh");
    let correlator = correlator(&host);
    let id = sid("abc");

    correlator.register_binding(&id, old.clone());
    correlator.register_binding(&id, new.clone());
    host.close(&old);

    assert_eq!(correlator.resolve(&id).unwrap().id(), new.id());
}

#[test]
fn test_unbind() {
    let host = FakeHost::new();
    let t1 = host.open("t1", "zsh");
    let correlator = correlator(&host);

    correlator.register_binding(&sid("abc"), t1);
    assert!(correlator.unbind(&sid("abc")));
    assert!(!correlator.unbind(&sid("abc")));
    assert!(correlator.resolve(&sid("abc")).is_none());
}

#[tokio::test]
async fn test_send_text_and_raw_sequence() {
    let host = FakeHost::new();
    let t1 = host.open("t1", "zsh");
    let correlator = correlator(&host);
    let id = sid("abc");
    correlator.register_binding(&id, t1.clone());

    let source = correlator.send_text(&id, "hello").await.unwrap();
    assert_eq!(source, CandidateSource::Binding);
    correlator.send_raw_sequence(&id, "\x1b[A").await.unwrap();

    assert_eq!(
        t1.sent(),
        vec![
            ("hello".to_string(), true),
            ("\x1b[A".to_string(), false)
        ]
    );
    assert_eq!(t1.shown(), 2);
}

#[tokio::test]
async fn test_no_terminal_found_lists_open_labels() {
    let host = FakeHost::new();
    let shell = host.open("t1", "zsh");
    let node = host.open("t2", "node");
    host.focus(&node);
    let correlator = correlator(&host);

    let err = correlator.send_text(&sid("abc"), "hello").await.unwrap_err();
    match err {
        SessionError::NoTerminalFound {
            session_id,
            open_terminals,
        } => {
            assert_eq!(session_id, "abc");
            assert_eq!(open_terminals, vec!["zsh".to_string(), "node".to_string()]);
        }
        other => panic!("expected NoTerminalFound, got {:?}", other),
    }

    assert!(shell.sent().is_empty());
    assert!(node.sent().is_empty());
    assert_eq!(node.shown(), 0);
}
