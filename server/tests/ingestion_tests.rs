//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! End-to-end ingestion tests over real TCP connections

use async_trait::async_trait;
use heartwire_server::{
    ConnectionId, EventChannel, HeartbeatServer, Message, MonitorConfig, MonitorEvent,
    MonitorHandler, SourceId, StateTransition, StatusCode,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn test_config() -> MonitorConfig {
    MonitorConfig::new("127.0.0.1:0".parse().unwrap())
}

async fn start(config: MonitorConfig) -> (HeartbeatServer, SocketAddr, UnboundedReceiver<MonitorEvent>) {
    let server = HeartbeatServer::new(config).unwrap();
    let (handler, events) = EventChannel::new();
    let addr = server.start(Arc::new(handler)).await.unwrap();
    (server, addr, events)
}

async fn next_event(events: &mut UnboundedReceiver<MonitorEvent>) -> MonitorEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Skip connection lifecycle events and return the next client-level event
async fn next_client_event(events: &mut UnboundedReceiver<MonitorEvent>) -> MonitorEvent {
    loop {
        match next_event(events).await {
            MonitorEvent::ConnectionOpened { .. } | MonitorEvent::ConnectionClosed { .. } => {}
            event => return event,
        }
    }
}

#[tokio::test]
async fn test_heartbeat_session_end_to_end() {
    let (server, addr, mut events) = start(test_config()).await;
    let registry = server.registry();
    let source = SourceId::from([10, 0, 0, 5]);

    assert!(matches!(
        next_event(&mut events).await,
        MonitorEvent::ServerStarted { addr: a, .. } if a == addr
    ));

    let mut client = TcpStream::connect(addr).await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        MonitorEvent::ConnectionOpened { .. }
    ));

    // First report creates the client
    client.write_all(b"10.0.0.5_state2\r\n").await.unwrap();
    match next_event(&mut events).await {
        MonitorEvent::ClientAdded { client } => {
            assert_eq!(client.source, source);
            assert_eq!(client.status, StatusCode::Primary);
        }
        other => panic!("expected ClientAdded, got {other:?}"),
    }
    match next_event(&mut events).await {
        MonitorEvent::MessageReceived { message, .. } => {
            assert_eq!(message.raw(), "10.0.0.5_state2");
            assert_eq!(message.status(), StatusCode::Primary);
        }
        other => panic!("expected MessageReceived, got {other:?}"),
    }
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(source).unwrap().status, StatusCode::Primary);

    // A different status is a transition
    client.write_all(b"10.0.0.5_state1\r\n").await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        MonitorEvent::MessageReceived { .. }
    ));
    match next_event(&mut events).await {
        MonitorEvent::StatusChanged { transition } => {
            assert_eq!(transition.source, source);
            assert_eq!(transition.from, StatusCode::Primary);
            assert_eq!(transition.to, StatusCode::Secondary);
            assert_eq!(transition.sequence, 1);
        }
        other => panic!("expected StatusChanged, got {other:?}"),
    }
    assert_eq!(registry.history(source).unwrap().len(), 1);

    // Malformed frames are reported and leave the record alone
    client.write_all(b"garbage\r\n").await.unwrap();
    match next_event(&mut events).await {
        MonitorEvent::Error {
            error, recoverable, ..
        } => {
            assert!(error.contains("garbage"));
            assert!(recoverable);
        }
        other => panic!("expected Error, got {other:?}"),
    }
    let info = registry.get(source).unwrap();
    assert_eq!(info.status, StatusCode::Secondary);
    assert_eq!(info.message_count, 2);

    // Closing the socket disconnects the client but keeps its record
    drop(client);
    assert!(matches!(
        next_event(&mut events).await,
        MonitorEvent::ClientDisconnected { source: s, .. } if s == source
    ));
    match next_event(&mut events).await {
        MonitorEvent::ConnectionClosed { info, .. } => {
            assert_eq!(info.frames_received, 3);
            assert_eq!(info.invalid_messages, 1);
            assert_eq!(info.sources, vec![source]);
        }
        other => panic!("expected ConnectionClosed, got {other:?}"),
    }
    let info = registry.get(source).unwrap();
    assert!(!info.connected);
    assert_eq!(info.history_len, 1);

    server.stop().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        MonitorEvent::ServerStopped { addr: a, .. } if a == addr
    ));
}

#[tokio::test]
async fn test_repeated_status_is_not_a_transition() {
    let (server, addr, mut events) = start(test_config()).await;
    let source = SourceId::from([10, 0, 0, 8]);

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"10.0.0.8_state0\r\n10.0.0.8_state0\r\n10.0.0.8_state0\r\n")
        .await
        .unwrap();

    let mut messages = 0;
    while messages < 3 {
        match next_client_event(&mut events).await {
            MonitorEvent::MessageReceived { .. } => messages += 1,
            MonitorEvent::StatusChanged { .. } => panic!("unexpected transition"),
            _ => {}
        }
    }

    let info = server.registry().get(source).unwrap();
    assert_eq!(info.status, StatusCode::Error);
    assert_eq!(info.message_count, 3);
    assert_eq!(info.transition_count, 0);

    drop(client);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_source_reporting_over_two_connections() {
    let (server, addr, mut events) = start(test_config()).await;
    let source = SourceId::from([10, 0, 0, 5]);

    let mut first = TcpStream::connect(addr).await.unwrap();
    first.write_all(b"10.0.0.5_state2\r\n").await.unwrap();
    loop {
        if let MonitorEvent::MessageReceived { .. } = next_client_event(&mut events).await {
            break;
        }
    }

    let mut second = TcpStream::connect(addr).await.unwrap();
    second.write_all(b"10.0.0.5_state0\r\n").await.unwrap();
    let transition = loop {
        if let MonitorEvent::StatusChanged { transition } = next_client_event(&mut events).await {
            break transition;
        }
    };

    assert_eq!(transition.from, StatusCode::Primary);
    assert_eq!(transition.to, StatusCode::Error);
    assert_eq!(transition.sequence, 1);
    assert_eq!(server.registry().len(), 1);
    assert_eq!(server.registry().get(source).unwrap().message_count, 2);

    // The source stays connected while the second connection still reports it
    drop(first);
    loop {
        match next_event(&mut events).await {
            MonitorEvent::ConnectionClosed { .. } => break,
            MonitorEvent::ClientDisconnected { .. } => panic!("source still has a live connection"),
            _ => {}
        }
    }
    assert_eq!(server.connection_count(), 1);
    assert!(server.registry().get(source).unwrap().connected);

    drop(second);
    assert!(matches!(
        next_client_event(&mut events).await,
        MonitorEvent::ClientDisconnected { source: s, .. } if s == source
    ));
    assert!(!server.registry().get(source).unwrap().connected);

    server.stop().await.unwrap();
}

/// Records status change sequences and stalls message notifications for one connection
struct SlowConnectionHandler {
    slow: ConnectionId,
    sequences: Mutex<Vec<u64>>,
}

#[async_trait]
impl MonitorHandler for SlowConnectionHandler {
    async fn on_message(&self, id: ConnectionId, _message: &Message) {
        if id == self.slow {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    }

    async fn on_status_changed(&self, transition: &StateTransition) {
        self.sequences.lock().unwrap().push(transition.sequence);
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_status_changes_stay_ordered_across_connections() {
    let server = HeartbeatServer::new(test_config()).unwrap();
    let handler = Arc::new(SlowConnectionHandler {
        slow: ConnectionId::new(1),
        sequences: Mutex::new(Vec::new()),
    });
    let addr = server.start(handler.clone()).await.unwrap();
    let registry = server.registry();
    let source = SourceId::from([10, 0, 0, 5]);

    let mut slow = TcpStream::connect(addr).await.unwrap();
    wait_until(|| server.connection_count() == 1).await;
    let mut fast = TcpStream::connect(addr).await.unwrap();
    wait_until(|| server.connection_count() == 2).await;

    fast.write_all(b"10.0.0.5_state2\r\n").await.unwrap();
    wait_until(|| registry.contains(source)).await;

    // Applied as sequence 1, then its worker stalls in on_message
    slow.write_all(b"10.0.0.5_state1\r\n").await.unwrap();
    wait_until(|| {
        registry
            .get(source)
            .is_some_and(|client| client.status == StatusCode::Secondary)
    })
    .await;

    // Sequence 2 applied by the other connection while the first is stalled
    fast.write_all(b"10.0.0.5_state0\r\n").await.unwrap();
    wait_until(|| handler.sequences.lock().unwrap().len() == 2).await;

    assert_eq!(*handler.sequences.lock().unwrap(), vec![1, 2]);
    assert_eq!(registry.get(source).unwrap().transition_count, 2);

    drop(slow);
    drop(fast);
    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_agents() {
    const AGENTS: u8 = 20;
    const REPORTS: usize = 10;

    let (server, addr, _events) = start(test_config()).await;

    let agents: Vec<_> = (1..=AGENTS)
        .map(|n| {
            tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                for i in 0..REPORTS {
                    let frame = format!("10.1.0.{n}_state{}\r\n", i % 3);
                    stream.write_all(frame.as_bytes()).await.unwrap();
                }
                stream.shutdown().await.unwrap();
            })
        })
        .collect();
    for agent in agents {
        agent.await.unwrap();
    }

    let registry = server.registry();
    let manager = server.manager();
    // Agents may finish before the server has accepted every connection
    timeout(WAIT, async {
        while manager.total_connections() < AGENTS as u64 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    timeout(WAIT, manager.wait_idle()).await.unwrap();

    let stats = server.statistics();
    assert_eq!(stats.total_clients, AGENTS as usize);
    assert_eq!(stats.total_messages, AGENTS as u64 * REPORTS as u64);
    // state0, state1, state2 repeating gives a transition on every report after the first
    assert_eq!(stats.total_transitions, AGENTS as u64 * (REPORTS as u64 - 1));
    assert_eq!(stats.connected_clients, 0);

    for n in 1..=AGENTS {
        let info = registry.get(SourceId::from([10, 1, 0, n])).unwrap();
        assert_eq!(info.message_count, REPORTS as u64);
        assert_eq!(info.status, StatusCode::Error);
    }

    let metrics = server.metrics().snapshot();
    assert_eq!(metrics.total_connections, AGENTS as u64);
    assert_eq!(metrics.valid_messages, AGENTS as u64 * REPORTS as u64);
    assert_eq!(metrics.parse_errors, 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_disconnects_live_clients() {
    let (server, addr, mut events) = start(test_config()).await;
    let source = SourceId::from([192, 168, 1, 20]);

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"192.168.1.20_state1\r\n").await.unwrap();
    loop {
        if let MonitorEvent::MessageReceived { .. } = next_client_event(&mut events).await {
            break;
        }
    }

    server.stop().await.unwrap();
    assert!(matches!(
        next_client_event(&mut events).await,
        MonitorEvent::ClientDisconnected { source: s, .. } if s == source
    ));
    assert!(!server.registry().get(source).unwrap().connected);
    assert_eq!(server.connection_count(), 0);
    drop(client);
}
