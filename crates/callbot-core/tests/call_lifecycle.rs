//! Covers a call's full media lifecycle through the agent: confirmed state
//! stands up a recorder, disconnect tears it down and persists a transcript.

use std::sync::Arc;
use std::time::Duration;

use callbot_core::agent::{Agent, ConfigBuilder};
use callbot_core::call::ChatRole;
use callbot_core::sip::{FakeSipLibrary, SipLibraryEvent};

fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) {
    let start = std::time::Instant::now();
    while !predicate() {
        if start.elapsed() > timeout {
            panic!("condition did not become true within {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn confirmed_call_gets_a_recorder_and_disconnect_removes_it() {
    let recording_dir = "/tmp/callbot-core-it-lifecycle-recordings";
    let config = ConfigBuilder::new()
        .agent_id("lifecycle-agent")
        .sip_identity("sip:agent@example.com", "sip:example.com")
        .recording_directory(recording_dir)
        .build()
        .unwrap();

    let agent = Arc::new(Agent::new(config));
    let sip = Arc::new(FakeSipLibrary::new());
    agent.clone().start_nonblocking(sip.clone()).unwrap();

    sip.inject(SipLibraryEvent::IncomingCall {
        call_id: "call-42".to_string(),
        remote_uri: "sip:caller@example.com".to_string(),
    });
    wait_until(Duration::from_secs(2), || agent.account().call_count() == 1);

    sip.inject(SipLibraryEvent::CallStateConfirmed {
        call_id: "call-42".to_string(),
    });
    wait_until(Duration::from_secs(2), || {
        std::path::Path::new(recording_dir).join("call-42.pcm").exists()
    });

    let call = agent.account().get_call("call-42").unwrap();
    {
        let mut call = call.lock().unwrap();
        call.add_chat_message(ChatRole::Caller, "hello");
    }
    let transcript_path = std::path::Path::new(recording_dir).join("call-42.yaml");
    {
        let call = call.lock().unwrap();
        call.save_transcript(&transcript_path).unwrap();
    }
    assert!(transcript_path.exists());

    sip.inject(SipLibraryEvent::CallStateDisconnected {
        call_id: "call-42".to_string(),
    });
    wait_until(Duration::from_secs(2), || agent.account().call_count() == 0);

    agent.stop().unwrap();
    let _ = std::fs::remove_dir_all(recording_dir);
}
