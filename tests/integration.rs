//! Integration tests for peerwire.
//!
//! These tests drive whole channels over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use peerwire::codec::MsgPackCodec;
use peerwire::protocol::{Blob, ChunkFrame, Message};
use peerwire::transport::{MemoryEndpoint, MemoryNegotiator, TransportEvent};
use peerwire::{
    Capabilities, ChannelError, ChannelEvent, ChannelState, DataChannel, DataChannelBuilder,
    EventKind, EventStream, Payload, Serialization,
};
use serde_json::json;

/// A channel that is already open, with direct access to its endpoint.
struct Harness {
    channel: DataChannel,
    events: EventStream,
    endpoint: MemoryEndpoint,
    negotiator: Arc<MemoryNegotiator>,
}

async fn open(builder: DataChannelBuilder) -> Harness {
    let endpoint = MemoryEndpoint::detached();
    let negotiator = Arc::new(MemoryNegotiator::auto_open(endpoint.clone()));
    let (channel, mut events) = builder.connect(negotiator.clone());

    assert!(matches!(events.recv().await, Some(ChannelEvent::Open)));
    assert!(channel.is_open());

    Harness {
        channel,
        events,
        endpoint,
        negotiator,
    }
}

/// Two open channels talking to each other.
async fn open_pair(builder: impl Fn() -> DataChannelBuilder) -> (Harness, Harness) {
    let (a, b) = MemoryEndpoint::pair();
    let mut sides = Vec::new();
    for endpoint in [a, b] {
        let negotiator = Arc::new(MemoryNegotiator::auto_open(endpoint.clone()));
        let (channel, mut events) = builder().connect(negotiator.clone());
        assert!(matches!(events.recv().await, Some(ChannelEvent::Open)));
        sides.push(Harness {
            channel,
            events,
            endpoint,
            negotiator,
        });
    }
    let b = sides.pop().unwrap();
    let a = sides.pop().unwrap();
    (a, b)
}

/// Yield to the driver until `condition` holds.
async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Let the driver process everything queued so far.
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

fn unpack(message: &Message) -> Payload {
    let bytes = message.as_bytes().expect("binary frame");
    MsgPackCodec::decode(bytes).unwrap()
}

async fn expect_error(events: &mut EventStream) -> Arc<ChannelError> {
    match events.wait_for(EventKind::Error).await {
        Some(ChannelEvent::Error(e)) => e,
        other => panic!("expected error event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_small_payload_single_write() {
    let h = open(DataChannel::builder().capabilities(
        Capabilities::default().with_manual_chunking(true),
    ))
    .await;
    let transport = h.endpoint.transport();

    h.channel.send("hello");
    eventually(|| transport.sent_count() == 1).await;
    settle().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(unpack(&sent[0]), Payload::from("hello"));
    assert_eq!(h.channel.buffer_size(), 0);
}

#[tokio::test]
async fn test_oversized_payload_is_chunked() {
    let h = open(
        DataChannel::builder()
            .chunk_mtu(1000)
            .capabilities(Capabilities::default().with_manual_chunking(true)),
    )
    .await;
    let transport = h.endpoint.transport();

    let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    let payload = Payload::from(data.clone());
    let packed_len = MsgPackCodec::encode(&payload).unwrap().len();
    let expected = packed_len.div_ceil(1000);

    h.channel.send(payload.clone());
    eventually(|| transport.sent_count() == expected).await;

    let chunks: Vec<ChunkFrame> = transport
        .sent()
        .iter()
        .map(|m| ChunkFrame::decode(m.as_bytes().unwrap()).unwrap())
        .collect();

    assert_eq!(chunks.len(), expected);
    let stream_id = chunks[0].stream_id;
    assert_eq!(stream_id, 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.stream_id, stream_id);
        assert_eq!(chunk.index, i as u32);
        assert_eq!(chunk.total, expected as u32);
        assert!(chunk.data.len() <= 1000);
    }

    // deliver to another channel in reverse order
    let rx = open(DataChannel::builder()).await;
    let mut rx_events = rx.events;
    for message in transport.sent().into_iter().rev() {
        rx.endpoint.signal(TransportEvent::Message(message));
    }
    assert_eq!(rx_events.next_data().await, Some(payload));
}

#[tokio::test]
async fn test_chunking_needs_manual_capability() {
    let h = open(DataChannel::builder().chunk_mtu(10)).await;
    let transport = h.endpoint.transport();

    h.channel.send(vec![7u8; 100]);
    eventually(|| transport.sent_count() == 1).await;
    settle().await;

    assert_eq!(transport.sent_count(), 1);
    assert_eq!(unpack(&transport.sent()[0]), Payload::from(vec![7u8; 100]));
}

#[tokio::test]
async fn test_send_as_chunk_is_not_split() {
    let h = open(
        DataChannel::builder()
            .chunk_mtu(10)
            .capabilities(Capabilities::default().with_manual_chunking(true)),
    )
    .await;
    let transport = h.endpoint.transport();

    h.channel.send_as_chunk(vec![1u8; 100]);
    eventually(|| transport.sent_count() == 1).await;
    settle().await;

    assert_eq!(transport.sent_count(), 1);
}

#[tokio::test]
async fn test_chunked_round_trip_between_peers() {
    let builder = || {
        DataChannel::builder()
            .chunk_mtu(64)
            .capabilities(Capabilities::default().with_manual_chunking(true))
    };
    let (a, mut b) = open_pair(builder).await;

    let value = json!({
        "title": "x".repeat(300),
        "items": (0..50).collect::<Vec<_>>(),
    });
    a.channel.send(value.clone());
    a.channel.send("after");

    assert_eq!(b.events.next_data().await, Some(Payload::Value(value)));
    assert_eq!(b.events.next_data().await, Some(Payload::from("after")));
    assert!(a.endpoint.transport().sent_count() > 2);
}

#[tokio::test]
async fn test_double_close_emits_once() {
    let mut h = open(DataChannel::builder()).await;

    h.channel.close();
    h.channel.close();

    assert!(matches!(h.events.recv().await, Some(ChannelEvent::Close)));
    settle().await;
    assert!(h.events.try_recv().is_none());
    assert_eq!(h.negotiator.cleanup_count(), 1);
    assert_eq!(h.negotiator.cleanups(), vec![h.channel.connection_id().to_string()]);
    assert_eq!(h.channel.state(), ChannelState::Closed);
    assert!(!h.channel.is_open());
}

#[tokio::test]
async fn test_send_then_close_still_writes() {
    let mut h = open(DataChannel::builder()).await;
    let transport = h.endpoint.transport();

    h.channel.send("sent-while-open");
    h.channel.close();

    let mut kinds = Vec::new();
    while let Some(event) = h.events.recv().await {
        kinds.push(event.kind());
        if event.kind() == EventKind::Close {
            break;
        }
    }
    settle().await;
    while let Some(event) = h.events.try_recv() {
        kinds.push(event.kind());
    }

    assert_eq!(kinds, vec![EventKind::Close]);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(unpack(&sent[0]), Payload::from("sent-while-open"));
}

#[tokio::test]
async fn test_send_after_close_is_rejected() {
    let mut h = open(DataChannel::builder()).await;
    let transport = h.endpoint.transport();

    h.channel.close();
    h.channel.send("too late");

    let error = expect_error(&mut h.events).await;
    assert!(matches!(*error, ChannelError::NotOpen(ChannelState::Closed)));
    settle().await;
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_event_stream_ends_when_handles_drop() {
    let Harness {
        channel,
        mut events,
        ..
    } = open(DataChannel::builder()).await;

    channel.close();
    assert!(matches!(events.recv().await, Some(ChannelEvent::Close)));
    settle().await;

    // a live handle can still report errors
    channel.send("late");
    assert!(matches!(
        events.recv().await,
        Some(ChannelEvent::Error(e)) if matches!(*e, ChannelError::NotOpen(ChannelState::Closed))
    ));

    drop(channel);
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn test_close_from_both_directions_emits_once() {
    let mut h = open(DataChannel::builder()).await;

    h.endpoint.signal(TransportEvent::Closed);
    h.channel.close();

    assert!(matches!(h.events.recv().await, Some(ChannelEvent::Close)));
    settle().await;
    assert!(h.events.try_recv().is_none());
    assert_eq!(h.negotiator.cleanup_count(), 1);
}

#[tokio::test]
async fn test_close_before_open() {
    let endpoint = MemoryEndpoint::detached();
    let negotiator = Arc::new(MemoryNegotiator::new(endpoint.clone()));
    let (channel, mut events) = DataChannel::builder().connect(negotiator.clone());

    channel.close();
    channel.close();
    endpoint.open();

    assert!(matches!(events.recv().await, Some(ChannelEvent::Close)));
    settle().await;
    assert!(events.try_recv().is_none());
    assert_eq!(negotiator.cleanup_count(), 1);
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn test_remote_close_propagates() {
    let (a, mut b) = open_pair(DataChannel::builder).await;

    a.channel.close();

    assert!(matches!(
        b.events.wait_for(EventKind::Close).await,
        Some(ChannelEvent::Close)
    ));
    assert_eq!(b.channel.state(), ChannelState::Closed);
    assert_eq!(b.negotiator.cleanup_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fifo_across_failing_transport() {
    let h = open(DataChannel::builder()).await;
    let transport = h.endpoint.transport();
    transport.set_failing(true);

    for i in 0..5 {
        h.channel.send(json!(i));
    }
    eventually(|| h.channel.buffer_size() == 5).await;

    // retries keep failing without losing anything
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(h.channel.buffer_size(), 5);
    assert_eq!(transport.sent_count(), 0);

    transport.set_failing(false);
    tokio::time::sleep(Duration::from_millis(150)).await;
    eventually(|| transport.sent_count() == 5).await;

    let received: Vec<Payload> = transport.sent().iter().map(unpack).collect();
    let expected: Vec<Payload> = (0..5).map(|i| Payload::from(json!(i))).collect();
    assert_eq!(received, expected);
    assert_eq!(h.channel.buffer_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fail_once_then_drain() {
    let h = open(DataChannel::builder().serialization(Serialization::None)).await;
    let transport = h.endpoint.transport();
    transport.fail_next(1);

    h.channel.send("a");
    h.channel.send("b");
    eventually(|| h.channel.buffer_size() == 2).await;
    assert_eq!(transport.attempts(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    eventually(|| transport.sent_count() == 2).await;

    assert_eq!(
        transport.sent(),
        vec![Message::from("a"), Message::from("b")]
    );
    assert_eq!(transport.attempts(), 3);
    assert_eq!(h.channel.buffer_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_retry_delay() {
    let h = open(
        DataChannel::builder()
            .serialization(Serialization::None)
            .retry_delay(Duration::from_millis(500)),
    )
    .await;
    let transport = h.endpoint.transport();
    transport.fail_next(1);

    h.channel.send("a");
    eventually(|| h.channel.buffer_size() == 1).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.sent_count(), 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    eventually(|| transport.sent_count() == 1).await;
}

#[tokio::test]
async fn test_send_before_open_errors_without_writing() {
    let endpoint = MemoryEndpoint::detached();
    let negotiator = Arc::new(MemoryNegotiator::new(endpoint.clone()));
    let (channel, mut events) = DataChannel::builder().connect(negotiator);

    channel.send("too early");

    let error = expect_error(&mut events).await;
    assert!(matches!(
        *error,
        ChannelError::NotOpen(ChannelState::Initializing)
    ));
    assert_eq!(endpoint.transport().attempts(), 0);

    // opening later does not replay the rejected send
    endpoint.open();
    assert!(matches!(events.recv().await, Some(ChannelEvent::Open)));
    settle().await;
    assert_eq!(endpoint.transport().attempts(), 0);
}

#[tokio::test]
async fn test_json_send_writes_text() {
    let h = open(DataChannel::builder().serialization(Serialization::Json)).await;
    let transport = h.endpoint.transport();

    h.channel.send(json!({"name": "foobar"}));
    eventually(|| transport.sent_count() == 1).await;

    assert_eq!(
        transport.sent(),
        vec![Message::Text(r#"{"name":"foobar"}"#.to_string())]
    );
}

#[tokio::test]
async fn test_json_round_trip() {
    let (a, mut b) = open_pair(|| DataChannel::builder().serialization(Serialization::Json)).await;

    let value = json!({"nested": {"list": [1, 2.5, null, true]}, "s": "ünïcødé"});
    a.channel.send(value.clone());
    a.channel.send("plain");

    assert_eq!(b.events.next_data().await, Some(Payload::Value(value)));
    // text travels as a JSON string
    assert_eq!(b.events.next_data().await, Some(Payload::Value(json!("plain"))));
}

#[tokio::test]
async fn test_binary_round_trip() {
    let (a, mut b) = open_pair(DataChannel::builder).await;

    let payloads = vec![
        Payload::from("text"),
        Payload::from(Bytes::from_static(&[0, 1, 2, 255])),
        Payload::from(json!({"a": [1, 2, {"b": null}]})),
        Payload::from(json!(-42)),
    ];
    for p in &payloads {
        a.channel.send(p.clone());
    }
    for p in payloads {
        assert_eq!(b.events.next_data().await, Some(p));
    }
}

#[tokio::test]
async fn test_binary_string_transport() {
    let builder = || {
        DataChannel::builder().capabilities(Capabilities::default().with_binary(false))
    };
    let (a, mut b) = open_pair(builder).await;

    a.channel.send(vec![0u8, 128, 255]);

    assert_eq!(b.events.next_data().await, Some(Payload::from(vec![0u8, 128, 255])));
    assert!(matches!(
        a.endpoint.transport().sent()[0],
        Message::Text(_)
    ));
}

#[tokio::test]
async fn test_blob_transport() {
    let builder = || {
        DataChannel::builder().capabilities(Capabilities::default().with_binary_blob(true))
    };
    let (a, mut b) = open_pair(builder).await;

    a.channel.send("via blob");

    assert_eq!(b.events.next_data().await, Some(Payload::from("via blob")));
    assert!(matches!(
        a.endpoint.transport().sent()[0],
        Message::Blob(_)
    ));
}

#[tokio::test]
async fn test_pending_blob_is_read() {
    let mut h = open(DataChannel::builder()).await;

    let packed = MsgPackCodec::encode(&Payload::from("slow blob")).unwrap();
    let blob = Blob::from_future(async move {
        tokio::task::yield_now().await;
        Ok(packed)
    });
    h.endpoint.signal(TransportEvent::Message(Message::Blob(blob)));

    assert_eq!(h.events.next_data().await, Some(Payload::from("slow blob")));
}

#[tokio::test]
async fn test_blob_read_failure_reported() {
    let mut h = open(DataChannel::builder()).await;

    let blob = Blob::from_future(async {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "gone"))
    });
    h.endpoint.signal(TransportEvent::Message(Message::Blob(blob)));

    let error = expect_error(&mut h.events).await;
    assert!(matches!(*error, ChannelError::Io(_)));
}

#[tokio::test]
async fn test_none_mode_passes_through() {
    let (a, mut b) =
        open_pair(|| DataChannel::builder().serialization(Serialization::None)).await;

    a.channel.send("raw text");
    a.channel.send(vec![1u8, 2, 3]);

    assert_eq!(b.events.next_data().await, Some(Payload::from("raw text")));
    assert_eq!(b.events.next_data().await, Some(Payload::from(vec![1u8, 2, 3])));
    assert_eq!(
        a.endpoint.transport().sent(),
        vec![Message::from("raw text"), Message::from(vec![1u8, 2, 3])]
    );
}

#[tokio::test]
async fn test_none_mode_rejects_values() {
    let mut h = open(DataChannel::builder().serialization(Serialization::None)).await;

    h.channel.send(json!({"structured": true}));

    let error = expect_error(&mut h.events).await;
    assert!(matches!(*error, ChannelError::Unsupported(_)));
    assert_eq!(h.endpoint.transport().attempts(), 0);
    assert!(h.channel.is_open());
}

#[tokio::test]
async fn test_malformed_inbound_does_not_stop_pipeline() {
    let mut h = open(DataChannel::builder()).await;

    // truncated msgpack string
    h.endpoint
        .signal(TransportEvent::Message(Message::from(vec![0xa5u8, b'a'])));
    // chunk with index past total
    let bad_chunk = ChunkFrame::new(1, 3, 2, vec![1, 2]).encode().unwrap();
    h.endpoint.signal(TransportEvent::Message(Message::from(bad_chunk)));
    // valid
    let good = MsgPackCodec::encode(&Payload::from("ok")).unwrap();
    h.endpoint.signal(TransportEvent::Message(Message::from(good)));

    let first = expect_error(&mut h.events).await;
    assert!(matches!(*first, ChannelError::MsgPackDecode(_)));
    let second = expect_error(&mut h.events).await;
    assert!(matches!(*second, ChannelError::MalformedChunk(_)));
    assert_eq!(h.events.next_data().await, Some(Payload::from("ok")));
}

#[tokio::test]
async fn test_oversized_chunk_total_rejected() {
    let mut h = open(DataChannel::builder().max_chunks_per_stream(Some(8))).await;

    let huge = ChunkFrame::new(1, 0, u32::MAX, vec![1]).encode().unwrap();
    h.endpoint.signal(TransportEvent::Message(Message::from(huge)));
    let over = ChunkFrame::new(2, 0, 9, vec![1]).encode().unwrap();
    h.endpoint.signal(TransportEvent::Message(Message::from(over)));
    let good = MsgPackCodec::encode(&Payload::from("still here")).unwrap();
    h.endpoint.signal(TransportEvent::Message(Message::from(good)));

    for _ in 0..2 {
        let error = expect_error(&mut h.events).await;
        assert!(matches!(*error, ChannelError::MalformedChunk(_)));
    }
    assert_eq!(h.events.next_data().await, Some(Payload::from("still here")));
    assert!(h.channel.is_open());
}

#[tokio::test]
async fn test_transport_error_surfaces() {
    let mut h = open(DataChannel::builder()).await;

    h.endpoint
        .signal(TransportEvent::Error("ice failure".to_string()));

    let error = expect_error(&mut h.events).await;
    assert!(matches!(&*error, ChannelError::Transport(reason) if reason == "ice failure"));
    assert!(h.channel.is_open());
}

#[tokio::test]
async fn test_messages_before_open_are_dropped() {
    let endpoint = MemoryEndpoint::detached();
    let negotiator = Arc::new(MemoryNegotiator::new(endpoint.clone()));
    let (_channel, mut events) = DataChannel::builder().connect(negotiator);

    let early = MsgPackCodec::encode(&Payload::from("early")).unwrap();
    endpoint.signal(TransportEvent::Message(Message::from(early)));
    endpoint.open();
    let late = MsgPackCodec::encode(&Payload::from("late")).unwrap();
    endpoint.signal(TransportEvent::Message(Message::from(late)));

    assert!(matches!(events.recv().await, Some(ChannelEvent::Open)));
    assert_eq!(events.next_data().await, Some(Payload::from("late")));
}

#[tokio::test]
async fn test_filtered_subscription() {
    let (a, b) = open_pair(DataChannel::builder).await;
    let mut data_only = b.channel.subscribe_to(&[EventKind::Data]);

    a.channel.send("one");
    match data_only.recv().await {
        Some(ChannelEvent::Data(p)) => assert_eq!(p, Payload::from("one")),
        other => panic!("unexpected event: {:?}", other),
    }

    a.channel.close();
    settle().await;
    assert_eq!(b.channel.state(), ChannelState::Closed);
    assert!(data_only.try_recv().is_none());
}

#[tokio::test]
async fn test_accessors() {
    let h = open(
        DataChannel::builder()
            .label("files")
            .peer("peer-42")
            .reliable(true)
            .metadata(json!({"kind": "upload"}))
            .serialization(Serialization::Json),
    )
    .await;

    assert_eq!(h.channel.label(), "files");
    assert_eq!(h.channel.peer(), Some("peer-42"));
    assert!(h.channel.reliable());
    assert_eq!(h.channel.metadata(), Some(&json!({"kind": "upload"})));
    assert_eq!(h.channel.serialization(), Serialization::Json);
    assert!(h.channel.connection_id().starts_with("dc_"));
}
