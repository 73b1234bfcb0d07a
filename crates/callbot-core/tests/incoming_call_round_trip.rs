//! End-to-end exercise of the agent/account/event-bus wiring via
//! `FakeSipLibrary`, covering the "incoming-call round trip" and
//! "barge-in play supersession" scenarios from spec.md §8.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use callbot_core::account::Account;
use callbot_core::agent::{Agent, AgentConfig, ConfigBuilder};
use callbot_core::command::Command;
use callbot_core::error::AgentError;
use callbot_core::events::EventTag;
use callbot_core::sip::{FakeSipLibrary, SipLibraryEvent};

fn test_config(agent_id: &str, recording_dir: &str) -> AgentConfig {
    ConfigBuilder::new()
        .agent_id(agent_id)
        .sip_identity("sip:agent@example.com", "sip:example.com")
        .recording_directory(recording_dir)
        .build()
        .unwrap()
}

#[test]
fn incoming_call_is_answered_and_tracked() {
    let config = test_config(
        "round-trip-agent",
        "/tmp/callbot-core-it-round-trip-recordings",
    );
    let agent = Arc::new(Agent::new(config));
    let sip = Arc::new(FakeSipLibrary::new());

    let answered = Arc::new(AtomicUsize::new(0));
    let answered_clone = answered.clone();
    agent.event_bus().subscribe(EventTag::CallAnswered, move |_| {
        answered_clone.fetch_add(1, Ordering::SeqCst);
    });

    agent.clone().start_nonblocking(sip.clone()).unwrap();

    sip.inject(SipLibraryEvent::IncomingCall {
        call_id: "call-1".to_string(),
        remote_uri: "sip:bob@example.com".to_string(),
    });

    wait_until(Duration::from_secs(2), || answered.load(Ordering::SeqCst) == 1);
    assert_eq!(answered.load(Ordering::SeqCst), 1);
    assert_eq!(agent.account().call_count(), 1);

    agent.stop().unwrap();
}

#[test]
fn account_play_wav_reaches_media_thread_and_supersedes() {
    let config = test_config(
        "barge-in-agent",
        "/tmp/callbot-core-it-barge-in-recordings",
    );
    let agent = Arc::new(Agent::new(config));
    let sip = Arc::new(FakeSipLibrary::new());

    let playing = Arc::new(AtomicUsize::new(0));
    let playing_clone = playing.clone();
    agent.event_bus().subscribe(EventTag::AudioPlaying, move |_| {
        playing_clone.fetch_add(1, Ordering::SeqCst);
    });

    agent.clone().start_nonblocking(sip.clone()).unwrap();

    sip.inject(SipLibraryEvent::IncomingCall {
        call_id: "call-1".to_string(),
        remote_uri: "sip:bob@example.com".to_string(),
    });
    wait_until(Duration::from_secs(2), || agent.account().call_count() == 1);

    write_wav_fixture("/tmp/callbot-core-it-first.wav", 5.0);
    write_wav_fixture("/tmp/callbot-core-it-second.wav", 5.0);

    agent
        .account()
        .play_wav_to_call("/tmp/callbot-core-it-first.wav", Some("call-1".to_string()))
        .unwrap();
    wait_until(Duration::from_secs(2), || playing.load(Ordering::SeqCst) == 1);

    agent
        .account()
        .play_wav_to_call("/tmp/callbot-core-it-second.wav", Some("call-1".to_string()))
        .unwrap();
    wait_until(Duration::from_secs(2), || playing.load(Ordering::SeqCst) == 2);

    assert_eq!(playing.load(Ordering::SeqCst), 2);

    agent.stop().unwrap();
    let _ = std::fs::remove_file("/tmp/callbot-core-it-first.wav");
    let _ = std::fs::remove_file("/tmp/callbot-core-it-second.wav");
}

#[test]
fn play_wav_to_call_with_no_active_call_is_rejected() {
    let (tx, _rx) = callbot_core::command::command_queue();
    let account = Account::new("sip:agent@example.com", tx);
    let result = account.play_wav_to_call("/tmp/does-not-matter.wav", None);
    assert!(result.is_err());
}

#[test]
fn command_queue_closes_on_agent_stop() {
    let config = test_config(
        "stop-agent",
        "/tmp/callbot-core-it-stop-recordings",
    );
    let agent = Arc::new(Agent::new(config));
    let sip = Arc::new(FakeSipLibrary::new());
    let commands = agent.command_sender();

    agent.clone().start_nonblocking(sip).unwrap();
    agent.stop().unwrap();

    let result = commands.submit(Command::PlayWav {
        call_id: "call-1".to_string(),
        file_path: "/tmp/unused.wav".to_string(),
    });
    assert!(matches!(result, Err(AgentError::QueueClosed)));
}

fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) {
    let start = std::time::Instant::now();
    while !predicate() {
        if start.elapsed() > timeout {
            panic!("condition did not become true within {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn write_wav_fixture(path: &str, seconds: f64) {
    let samples = (8000.0 * seconds) as usize;
    let pcm = vec![0u8; samples * 2];
    callbot_core::wavfile::write_wav(std::path::Path::new(path), &pcm, 8000, 2).unwrap();
}
