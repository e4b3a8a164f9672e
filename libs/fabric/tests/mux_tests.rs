mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{connected_channel, init_tracing, Recorder};
use searchlink_fabric::{
    error::{Error, Result},
    Message, MuxId, MuxMessageDispatcher, RequestHandler, RequestOptions,
};

/// Handler that acknowledges with the payload reversed
#[derive(Default)]
struct Reverse {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl RequestHandler for Reverse {
    async fn handle(&self, message: &Message) -> Result<Option<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut payload = message.payload.clone();
        payload.reverse();
        Ok(Some(payload))
    }
}

struct Refuse;

#[async_trait::async_trait]
impl RequestHandler for Refuse {
    async fn handle(&self, _message: &Message) -> Result<Option<Vec<u8>>> {
        Err(Error::Handler("index is read-only".to_string()))
    }
}

/// Handler that never accepts a request
#[derive(Default)]
struct Decline {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl RequestHandler for Decline {
    async fn handle(&self, _message: &Message) -> Result<Option<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

#[tokio::test]
async fn duplicate_claims_are_rejected() {
    let channel = connected_channel("shared").await;
    let muxer = channel.install_muxer();

    muxer.reserve(MuxId(1)).unwrap();
    muxer.reserve(MuxId(2)).unwrap();
    assert!(matches!(muxer.reserve(MuxId(1)), Err(Error::MuxIdTaken(MuxId(1)))));
    assert_eq!(muxer.claimed(), vec![MuxId(1), MuxId(2)]);

    assert!(muxer.remove(MuxId(1)));
    assert!(!muxer.remove(MuxId(1)));
    muxer.reserve(MuxId(1)).unwrap();
}

#[tokio::test]
async fn binding_requires_a_reservation() {
    let channel = connected_channel("shared").await;
    let muxer = channel.install_muxer();

    let err = muxer.bind(MuxId(9), Recorder::new()).unwrap_err();
    assert!(matches!(err, Error::MuxIdNotClaimed(MuxId(9))));
}

#[tokio::test]
async fn messages_are_routed_by_mux_id() {
    let channel = connected_channel("shared").await;
    let muxer = channel.install_muxer();
    let one = Recorder::new();
    let two = Recorder::new();
    muxer.add(MuxId(1), one.clone()).unwrap();
    muxer.add(MuxId(2), two.clone()).unwrap();

    channel
        .send(Message::broadcast(b"for-two".to_vec()).with_mux_id(MuxId(2)))
        .await
        .unwrap();

    assert_eq!(two.wait_for(1).await[0].payload, b"for-two");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(one.messages().is_empty());
}

#[tokio::test]
async fn synchronous_request_returns_the_remote_reply() {
    init_tracing();
    let client_channel = connected_channel("shared").await;
    let server_channel = connected_channel("shared").await;

    let server_handler = Arc::new(Reverse::default());
    let server = MuxMessageDispatcher::new(MuxId(3), server_channel.clone(), server_handler.clone());
    server_channel.install_muxer().add(MuxId(3), server.clone()).unwrap();

    let client = MuxMessageDispatcher::new(MuxId(3), client_channel.clone(), Arc::new(Reverse::default()));
    client_channel.install_muxer().add(MuxId(3), client.clone()).unwrap();

    let reply = client
        .send_message(
            Message::unicast(server_channel.address().unwrap(), b"abc".to_vec()),
            RequestOptions::synchronous(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    assert_eq!(reply, Some(b"cba".to_vec()));
    assert_eq!(server_handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn remote_handler_failure_is_reported_to_the_requester() {
    let client_channel = connected_channel("shared").await;
    let server_channel = connected_channel("shared").await;

    let server = MuxMessageDispatcher::new(MuxId(4), server_channel.clone(), Arc::new(Refuse));
    server_channel.install_muxer().add(MuxId(4), server).unwrap();
    let client = MuxMessageDispatcher::new(MuxId(4), client_channel.clone(), Arc::new(Refuse));
    client_channel.install_muxer().add(MuxId(4), client.clone()).unwrap();

    let err = client
        .send_message(
            Message::unicast(server_channel.address().unwrap(), b"x".to_vec()),
            RequestOptions::synchronous(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Remote(reason) if reason.contains("read-only")));
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let client_channel = connected_channel("shared").await;
    let silent_channel = connected_channel("shared").await;
    // Nobody claims the id on the remote side, so the request is dropped
    silent_channel.install_muxer();

    let client = MuxMessageDispatcher::new(MuxId(5), client_channel.clone(), Arc::new(Refuse));
    client_channel.install_muxer().add(MuxId(5), client.clone()).unwrap();

    let err = client
        .send_message(
            Message::unicast(silent_channel.address().unwrap(), b"x".to_vec()),
            RequestOptions::synchronous(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn asynchronous_send_is_one_way() {
    let client_channel = connected_channel("shared").await;
    let server_channel = connected_channel("shared").await;

    let handler = Arc::new(Reverse::default());
    let server = MuxMessageDispatcher::new(MuxId(6), server_channel.clone(), handler.clone());
    server_channel.install_muxer().add(MuxId(6), server).unwrap();
    let client = MuxMessageDispatcher::new(MuxId(6), client_channel.clone(), Arc::new(Refuse));

    let reply = client
        .send_message(
            Message::unicast(server_channel.address().unwrap(), b"x".to_vec()),
            RequestOptions::asynchronous(),
        )
        .await
        .unwrap();
    assert_eq!(reply, None);

    tokio::time::timeout(Duration::from_secs(5), async {
        while handler.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn declined_requests_get_no_reply() {
    let client_channel = connected_channel("shared").await;
    let server_channel = connected_channel("shared").await;

    let decline = Arc::new(Decline::default());
    let server = MuxMessageDispatcher::new(MuxId(7), server_channel.clone(), decline.clone());
    server_channel.install_muxer().add(MuxId(7), server).unwrap();
    let client = MuxMessageDispatcher::new(MuxId(7), client_channel.clone(), Arc::new(Refuse));
    client_channel.install_muxer().add(MuxId(7), client.clone()).unwrap();

    let err = client
        .send_message(
            Message::unicast(server_channel.address().unwrap(), b"x".to_vec()),
            RequestOptions::synchronous(Duration::from_millis(300)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(decline.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn first_accepting_member_answers_a_broadcast() {
    let client_channel = connected_channel("shared").await;
    let server_channel = connected_channel("shared").await;
    client_channel.add_member(server_channel.address().unwrap());

    let server = MuxMessageDispatcher::new(MuxId(8), server_channel.clone(), Arc::new(Reverse::default()));
    server_channel.install_muxer().add(MuxId(8), server).unwrap();
    // The local copy of the broadcast is declined
    let client = MuxMessageDispatcher::new(MuxId(8), client_channel.clone(), Arc::new(Decline::default()));
    client_channel.install_muxer().add(MuxId(8), client.clone()).unwrap();

    let reply = client
        .send_message(
            Message::broadcast(b"abc".to_vec()),
            RequestOptions::synchronous(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    assert_eq!(reply, Some(b"cba".to_vec()));
}

#[tokio::test]
async fn shutdown_dispatcher_refuses_to_send() {
    let channel = connected_channel("shared").await;
    let handler = Arc::new(Reverse::default());
    let dispatcher = MuxMessageDispatcher::new(MuxId(9), channel.clone(), handler.clone());
    channel.install_muxer().add(MuxId(9), dispatcher.clone()).unwrap();

    dispatcher.shutdown();
    assert!(dispatcher.is_stopped());

    for options in [
        RequestOptions::asynchronous(),
        RequestOptions::synchronous(Duration::from_secs(1)),
    ] {
        let err = dispatcher
            .send_message(Message::broadcast(b"late".to_vec()), options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DispatcherStopped));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(channel.stats().sent(), 0);
}
