//! Two hosts on one in-memory network: rendezvous, chat and hang-up

use std::sync::Arc;
use std::time::Duration;

use btchat_core::{
    BtchatConfig, BtchatError, ChatEvent, ChatMessage, Direction, Role, SessionError,
    SessionState, SERVICE_UUID,
};
use btchat_runtime::{MemoryNetwork, SessionManager};
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn next_matching<F>(rx: &mut broadcast::Receiver<ChatEvent>, mut predicate: F) -> ChatEvent
where
    F: FnMut(&ChatEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_state(event: &ChatEvent, wanted: SessionState) -> bool {
    matches!(event, ChatEvent::SessionStateChanged { state, .. } if *state == wanted)
}

async fn connected_pair(
    network: &MemoryNetwork,
) -> (
    SessionManager,
    broadcast::Receiver<ChatEvent>,
    SessionManager,
    broadcast::Receiver<ChatEvent>,
) {
    let host = SessionManager::new(Arc::new(network.transport("AA:AA")), BtchatConfig::default());
    let client =
        SessionManager::new(Arc::new(network.transport("BB:BB")), BtchatConfig::default());
    let mut host_rx = host.subscribe();
    let mut client_rx = client.subscribe();

    host.host().await.unwrap();
    while !network.has_listener("AA:AA", SERVICE_UUID) {
        tokio::task::yield_now().await;
    }
    client.connect("AA:AA").await.unwrap();

    let event = next_matching(&mut host_rx, |e| is_state(e, SessionState::Connected)).await;
    assert_eq!(
        event,
        ChatEvent::SessionStateChanged {
            role: Role::Listener,
            state: SessionState::Connected,
            peer: Some("BB:BB".to_string()),
        }
    );
    let event = next_matching(&mut client_rx, |e| is_state(e, SessionState::Connected)).await;
    assert_eq!(
        event,
        ChatEvent::SessionStateChanged {
            role: Role::Initiator,
            state: SessionState::Connected,
            peer: Some("AA:AA".to_string()),
        }
    );

    (host, host_rx, client, client_rx)
}

#[tokio::test]
async fn test_messages_flow_both_ways() {
    let network = MemoryNetwork::new();
    let (host, mut host_rx, client, mut client_rx) = connected_pair(&network).await;

    client.send("hello").await.unwrap();
    let event = next_matching(&mut host_rx, |e| matches!(e, ChatEvent::Message { .. })).await;
    assert_eq!(
        event,
        ChatEvent::Message {
            peer: "BB:BB".to_string(),
            message: ChatMessage::received("hello"),
        }
    );

    host.send("hi back").await.unwrap();
    let event = next_matching(&mut client_rx, |e| {
        matches!(e, ChatEvent::Message { message, .. } if message.direction == Direction::Received)
    })
    .await;
    assert_eq!(
        event,
        ChatEvent::Message {
            peer: "AA:AA".to_string(),
            message: ChatMessage::received("hi back"),
        }
    );

    host.stop().await;
    client.stop().await;
}

#[tokio::test]
async fn test_second_session_rejected_while_connected() {
    let network = MemoryNetwork::new();
    let (host, _host_rx, client, _client_rx) = connected_pair(&network).await;

    let err = host.host().await.unwrap_err();
    assert!(matches!(
        err,
        BtchatError::Session(SessionError::AlreadyActive {
            role: Role::Listener
        })
    ));
    assert_eq!(host.state().await, SessionState::Connected);
    assert_eq!(host.peer().await.as_deref(), Some("BB:BB"));

    host.stop().await;
    client.stop().await;
}

#[tokio::test]
async fn test_hangup_closes_remote_session() {
    let network = MemoryNetwork::new();
    let (host, mut host_rx, client, _client_rx) = connected_pair(&network).await;

    client.stop().await;

    let event = next_matching(&mut host_rx, |e| is_state(e, SessionState::Closed)).await;
    assert_eq!(
        event,
        ChatEvent::SessionStateChanged {
            role: Role::Listener,
            state: SessionState::Closed,
            peer: Some("BB:BB".to_string()),
        }
    );
    assert_eq!(host.state().await, SessionState::Closed);
    assert!(host.send("anyone?").await.is_err());

    // A closed session frees the slot for the next role
    host.host().await.unwrap();
    assert_eq!(host.state().await, SessionState::Listening);
    host.stop().await;
}
