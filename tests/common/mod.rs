#![allow(dead_code)]

use client::{ChatClient, ClientEvent};
use server::listener::Server;
use server::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub type Events = UnboundedReceiver<ClientEvent>;

/// Starts a relay on an ephemeral port and returns its address and registry
pub async fn start_server() -> (String, Arc<Registry>) {
    let server = Server::new("127.0.0.1:0").await.expect("bind server");
    let addr = server.local_addr().expect("local addr").to_string();
    let registry = server.registry();
    tokio::spawn(server.run());
    (addr, registry)
}

pub async fn next_event(events: &mut Events) -> ClientEvent {
    timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
}

pub async fn next_line(events: &mut Events) -> String {
    match next_event(events).await {
        ClientEvent::ChatLine(line) => line,
        other => panic!("expected a chat line, got {:?}", other),
    }
}

/// Reads events until a user list equal to `expected` arrives
pub async fn wait_for_users(events: &mut Events, expected: &[&str]) {
    loop {
        if let ClientEvent::UserListUpdated(names) = next_event(events).await {
            if names == expected {
                return;
            }
        }
    }
}

pub struct Member {
    pub chat: ChatClient,
    pub events: Events,
}

/// Joins every name in turn, waiting until all members have seen each arrival,
/// so no member has pending events when this returns.
pub async fn join_all(addr: &str, names: &[&str]) -> Vec<Member> {
    let mut members: Vec<Member> = Vec::new();

    for (i, name) in names.iter().enumerate() {
        let (chat, mut events) = ChatClient::connect(addr, name).await.expect("connect");
        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::Joined {
                name: name.to_string()
            }
        );
        members.push(Member { chat, events });

        let mut online: Vec<&str> = names[..=i].to_vec();
        online.sort();
        for member in members.iter_mut() {
            wait_for_users(&mut member.events, &online).await;
        }
    }

    members
}

/// Asserts nothing arrives for a short while
pub async fn assert_quiet(events: &mut Events) {
    if let Ok(Some(event)) = timeout(Duration::from_millis(100), events.recv()).await {
        panic!("unexpected event {:?}", event);
    }
}
