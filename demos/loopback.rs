//! Loopback - two data channels over an in-memory transport.
//!
//! This example demonstrates:
//! - Connecting channels with the builder pattern
//! - Sending text, bytes and structured values
//! - Automatic chunking of a large payload
//! - Observing the close on the remote side
//!
//! ```text
//! cargo run --example loopback
//! ```

use std::sync::Arc;

use peerwire::transport::{MemoryEndpoint, MemoryNegotiator};
use peerwire::{Capabilities, ChannelEvent, DataChannel, Payload};
use serde::Serialize;

/// A structured message.
#[derive(Serialize, Debug)]
struct Greeting {
    from: String,
    words: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = MemoryEndpoint::pair();

    // Small MTU so the large payload below gets split
    let builder = || {
        DataChannel::builder()
            .chunk_mtu(1024)
            .capabilities(Capabilities::default().with_manual_chunking(true))
    };

    let (alice, mut alice_events) = builder()
        .label("alice")
        .connect(Arc::new(MemoryNegotiator::auto_open(left)));
    let (bob, mut bob_events) = builder()
        .label("bob")
        .connect(Arc::new(MemoryNegotiator::auto_open(right)));

    for events in [&mut alice_events, &mut bob_events] {
        match events.recv().await {
            Some(ChannelEvent::Open) => {}
            other => return Err(format!("expected open, got {:?}", other).into()),
        }
    }
    println!("{} and {} are open", alice.label(), bob.label());

    alice.send("hello bob");
    alice.send(vec![0xde_u8, 0xad, 0xbe, 0xef]);
    alice.send_json(&Greeting {
        from: "alice".to_string(),
        words: vec!["nice".to_string(), "to".to_string(), "meet".to_string()],
    })?;
    alice.send(vec![42u8; 64 * 1024]);

    for _ in 0..4 {
        match bob_events.next_data().await {
            Some(Payload::Text(text)) => println!("bob got text: {}", text),
            Some(Payload::Binary(data)) => println!("bob got {} bytes", data.len()),
            Some(Payload::Value(value)) => println!("bob got value: {}", value),
            None => return Err("bob's channel went away".into()),
        }
    }

    alice.close();
    while let Some(event) = bob_events.recv().await {
        if let ChannelEvent::Close = event {
            println!("bob saw the close, state: {}", bob.state());
            break;
        }
    }

    Ok(())
}
