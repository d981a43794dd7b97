mod support;

use std::time::Duration;

use domain::{ClientFrame, ServerFrame, CHAT_CHANNEL, MESSAGE_SENT_EVENT, PRESENCE_CHANNEL};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::json;
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};

use support::{session_token, spawn_server, TestServer};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn open(server: &TestServer, username: &str) -> Socket {
    let token = session_token(server, username).await;
    let (socket, _) = connect_async(format!("{}?token={token}", server.ws_url()))
        .await
        .expect("websocket connect");
    socket
}

async fn send(socket: &mut Socket, frame: ClientFrame) {
    let text = serde_json::to_string(&frame).unwrap();
    socket
        .send(TungsteniteMessage::Text(text.into()))
        .await
        .expect("send frame");
}

async fn next_frame(socket: &mut Socket) -> ServerFrame {
    loop {
        let message = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("valid message");
        if let TungsteniteMessage::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("server frame");
        }
    }
}

fn member_names(frame: &ServerFrame) -> Vec<String> {
    match frame {
        ServerFrame::Here { members, .. } => {
            members.iter().map(|m| m.name.to_string()).collect()
        }
        other => panic!("expected here frame, got {other:?}"),
    }
}

#[tokio::test]
async fn rejects_invalid_token() {
    let server = spawn_server().await;
    let result = connect_async(format!("{}?token=bogus", server.ws_url())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn presence_membership_is_broadcast() {
    let server = spawn_server().await;

    let mut alice = open(&server, "alice").await;
    send(
        &mut alice,
        ClientFrame::Subscribe {
            channel: PRESENCE_CHANNEL.to_string(),
        },
    )
    .await;
    let here = next_frame(&mut alice).await;
    assert_eq!(member_names(&here), vec!["alice"]);
    assert!(matches!(next_frame(&mut alice).await, ServerFrame::Subscribed { .. }));

    let mut bob = open(&server, "bob").await;
    send(
        &mut bob,
        ClientFrame::Subscribe {
            channel: PRESENCE_CHANNEL.to_string(),
        },
    )
    .await;
    let mut names = member_names(&next_frame(&mut bob).await);
    names.sort();
    assert_eq!(names, vec!["alice", "bob"]);

    match next_frame(&mut alice).await {
        ServerFrame::Joining { member, .. } => assert_eq!(member.name.as_str(), "bob"),
        other => panic!("expected joining, got {other:?}"),
    }

    bob.close(None).await.unwrap();
    match next_frame(&mut alice).await {
        ServerFrame::Leaving { member, .. } => assert_eq!(member.name.as_str(), "bob"),
        other => panic!("expected leaving, got {other:?}"),
    }
}

#[tokio::test]
async fn messages_and_whispers_reach_subscribers() {
    let server = spawn_server().await;

    let mut alice = open(&server, "alice").await;
    let mut bob = open(&server, "bob").await;
    for socket in [&mut alice, &mut bob] {
        send(
            socket,
            ClientFrame::Subscribe {
                channel: CHAT_CHANNEL.to_string(),
            },
        )
        .await;
        assert!(matches!(next_frame(socket).await, ServerFrame::Subscribed { .. }));
    }

    send(
        &mut bob,
        ClientFrame::Whisper {
            channel: CHAT_CHANNEL.to_string(),
            event: "typing".to_string(),
            payload: json!({ "username": "bob" }),
        },
    )
    .await;
    match next_frame(&mut alice).await {
        ServerFrame::Whisper { event, payload, .. } => {
            assert_eq!(event, "typing");
            assert_eq!(payload["username"], "bob");
        }
        other => panic!("expected whisper, got {other:?}"),
    }

    let token = session_token(&server, "carol").await;
    let status = Client::new()
        .post(format!("{}/api/v1/messages", server.base_url()))
        .bearer_auth(token)
        .json(&json!({ "body": "hello all" }))
        .send()
        .await
        .unwrap()
        .status();
    assert!(status.is_success());

    for socket in [&mut alice, &mut bob] {
        match next_frame(socket).await {
            ServerFrame::Event { event, payload, .. } => {
                assert_eq!(event, MESSAGE_SENT_EVENT);
                assert_eq!(payload["body"], "hello all");
                assert_eq!(payload["username"], "carol");
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }
}
