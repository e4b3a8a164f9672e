mod common;

use std::sync::Arc;

use common::{connected_channel, init_tracing, Recorder};
use searchlink_fabric::{error::Error, GroupChannel, Message, StackConfig, UpHandler};

#[tokio::test]
async fn address_is_assigned_only_by_connect() {
    init_tracing();
    let channel = GroupChannel::with_defaults().unwrap();
    assert!(channel.is_open());
    assert!(!channel.is_connected());
    assert_eq!(channel.address(), None);

    channel.connect("inventory").await.unwrap();

    let address = channel.address().expect("connected channel has an address");
    assert_eq!(address.socket_addr().ip().to_string(), "127.0.0.1");
    assert_ne!(address.socket_addr().port(), 0);
    assert_eq!(channel.cluster_name().as_deref(), Some("inventory"));
    assert_eq!(channel.members(), vec![address]);
    assert_eq!(channel.stats().connects(), 1);
}

#[tokio::test]
async fn reconnecting_to_same_cluster_is_a_no_op() {
    let channel = connected_channel("inventory").await;
    let address = channel.address();

    channel.connect("inventory").await.unwrap();
    assert_eq!(channel.address(), address);
    assert_eq!(channel.stats().connects(), 1);

    let err = channel.connect("billing").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyConnected(name) if name == "inventory"));
}

#[tokio::test]
async fn send_requires_a_connection() {
    let channel = GroupChannel::with_defaults().unwrap();
    let err = channel.send(Message::broadcast(b"x".to_vec())).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
}

#[tokio::test]
async fn disconnect_and_close_follow_the_lifecycle() {
    let channel = connected_channel("inventory").await;

    channel.disconnect().await.unwrap();
    assert!(channel.is_open());
    assert_eq!(channel.address(), None);
    assert!(matches!(channel.disconnect().await, Err(Error::NotConnected)));

    channel.close().await.unwrap();
    channel.close().await.unwrap();
    assert!(!channel.is_open());
    assert_eq!(channel.stats().disconnects(), 1);
    assert_eq!(channel.stats().closes(), 1);
    assert!(matches!(channel.connect("inventory").await, Err(Error::ChannelClosed)));
}

#[tokio::test]
async fn broadcast_reaches_remote_members_and_loops_back() {
    init_tracing();
    let first = connected_channel("inventory").await;
    let second = connected_channel("inventory").await;
    first.add_member(second.address().unwrap());

    let local = Recorder::new();
    let remote = Recorder::new();
    first.set_receiver(local.clone());
    second.set_receiver(remote.clone());

    first
        .send(Message::broadcast(b"update".to_vec()))
        .await
        .unwrap();

    let received = remote.wait_for(1).await;
    assert_eq!(received[0].payload, b"update");
    assert_eq!(received[0].src, first.address());
    assert_eq!(local.wait_for(1).await[0].payload, b"update");
    assert_eq!(first.stats().sent(), 1);
}

#[tokio::test]
async fn unicast_only_reaches_its_destination() {
    let first = connected_channel("inventory").await;
    let second = connected_channel("inventory").await;
    let local = Recorder::new();
    let remote = Recorder::new();
    first.set_receiver(local.clone());
    second.set_receiver(remote.clone());

    first
        .send(Message::unicast(second.address().unwrap(), b"direct".to_vec()))
        .await
        .unwrap();

    assert_eq!(remote.wait_for(1).await[0].payload, b"direct");
    assert!(local.messages().is_empty());
}

#[tokio::test]
async fn broadcast_to_unreachable_member_reports_partial_delivery() {
    let channel = connected_channel("inventory").await;
    let gone_address = {
        let placeholder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        placeholder.local_addr().unwrap()
    };
    channel.add_member(gone_address.into());

    let local = Recorder::new();
    channel.set_receiver(local.clone());

    let err = channel
        .send(Message::broadcast(b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PartialBroadcast {
            delivered: 0,
            attempted: 1
        }
    ));
    // The local copy is still delivered
    local.wait_for(1).await;
}

#[tokio::test]
async fn installing_a_muxer_keeps_the_previous_receiver_as_default() {
    let channel = connected_channel("inventory").await;
    let fallback = Recorder::new();
    channel.set_receiver(fallback.clone());

    let muxer = channel.install_muxer();
    assert!(Arc::ptr_eq(&muxer, &channel.install_muxer()));
    assert!(matches!(channel.up_handler(), UpHandler::Muxer(_)));

    channel
        .send(Message::broadcast(b"plain".to_vec()))
        .await
        .unwrap();
    assert_eq!(fallback.wait_for(1).await[0].payload, b"plain");
}

#[test]
fn flush_capability_follows_the_stack() {
    let mut config = StackConfig::default();
    assert!(!GroupChannel::new(config.clone()).unwrap().flush_supported());

    config.flush.enabled = true;
    assert!(GroupChannel::new(config).unwrap().flush_supported());
}

#[tokio::test]
async fn channel_from_stack_file_uses_its_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.toml");
    std::fs::write(
        &path,
        r#"
[transport]
bind_addr = "127.0.0.1:0"
advertise_addr = "10.1.2.3:7800"

[discovery]
members = ["10.1.2.4:7800"]

[flush]
enabled = true
"#,
    )
    .unwrap();

    let channel = GroupChannel::from_file(&path).unwrap();
    assert!(channel.flush_supported());
    channel.connect("inventory").await.unwrap();

    let address = channel.address().unwrap();
    assert_eq!(address.to_string(), "10.1.2.3:7800");
    assert_eq!(channel.members().len(), 2);
}
