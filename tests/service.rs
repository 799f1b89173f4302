//! End-to-end tests serving connections over an in-memory pipe.

use std::{sync::Arc, time::Duration};

use rstest::{fixture, rstest};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time::timeout,
};
use wiresocket::{
    DispatchConfig,
    DispatchQueue,
    EngineConfig,
    NoopStats,
    Opcode,
    SessionState,
    WebSocketService,
    frame::{MAX_FRAME_PAYLOAD, MAX_MESSAGE_SIZE},
};
use wiresocket_testing::{ClientFrame, Event, RecordingHandler, TestClient, TestResult};

const WAIT: Duration = Duration::from_secs(2);

struct Served {
    service: Arc<WebSocketService>,
    handler: Arc<RecordingHandler>,
}

#[fixture]
fn served() -> Served {
    // Echo service with a single worker so handling order is deterministic
    let handler = Arc::new(RecordingHandler::echo());
    let config = EngineConfig {
        dispatch: DispatchConfig {
            min_workers: 1,
            max_workers: 1,
            ..DispatchConfig::default()
        },
        ..EngineConfig::default()
    };
    let service = WebSocketService::new(handler.clone(), DispatchQueue::start(config.dispatch))
        .with_config(config)
        .with_stats(Arc::new(NoopStats));
    Served {
        service: Arc::new(service),
        handler,
    }
}

#[rstest]
#[tokio::test]
async fn text_is_echoed_and_close_completes(served: Served) -> TestResult {
    let (mut client, handle) = TestClient::connect(&served.service);

    client.send(&[ClientFrame::text("Hello")]).await?;
    let echo = timeout(WAIT, client.next_frame()).await??.ok_or("no echo")?;
    assert_eq!((echo.fin, echo.opcode), (true, 0x1));
    assert_eq!(echo.payload, b"Hello");

    client.send(&[ClientFrame::close(1000, "bye")]).await?;
    let close = timeout(WAIT, client.next_frame()).await??.ok_or("no close")?;
    assert_eq!(close.close_code(), Some(1000));
    assert_eq!(close.close_reason(), "bye");

    client.hang_up().await?;
    assert!(timeout(WAIT, client.remaining()).await??.is_empty());
    let session = timeout(WAIT, handle).await??;

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.counters().messages_in, 1);
    assert_eq!(served.handler.close_count(), 1);
    assert_eq!(
        served.handler.events().first(),
        Some(&Event::Open),
        "on_open runs first"
    );
    assert!(served.service.registry().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn fragmented_message_with_interleaved_ping(served: Served) -> TestResult {
    let (mut client, handle) = TestClient::connect(&served.service);

    client
        .send(&[
            ClientFrame::text("Hel").fin(false),
            ClientFrame::ping(b"p"),
            ClientFrame::continuation(b"lo"),
        ])
        .await?;

    let pong = timeout(WAIT, client.next_frame()).await??.ok_or("no pong")?;
    assert_eq!((pong.opcode, pong.payload.as_slice()), (0xA, &b"p"[..]));
    let echo = timeout(WAIT, client.next_frame()).await??.ok_or("no echo")?;
    assert_eq!(echo.payload, b"Hello");

    client.hang_up().await?;
    timeout(WAIT, handle).await??;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn message_split_into_single_bytes_is_reassembled(served: Served) -> TestResult {
    let (mut client, handle) = TestClient::connect(&served.service);

    for byte in ClientFrame::binary(&[1, 2, 3, 4]).encode() {
        client.send_raw(&[byte]).await?;
        tokio::task::yield_now().await;
    }
    let echo = timeout(WAIT, client.next_frame()).await??.ok_or("no echo")?;
    assert_eq!((echo.opcode, echo.payload), (0x2, vec![1, 2, 3, 4]));

    client.hang_up().await?;
    timeout(WAIT, handle).await??;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn large_echo_is_fragmented(served: Served) -> TestResult {
    let (mut client, handle) = TestClient::connect(&served.service);
    let data = vec![0x5A; MAX_FRAME_PAYLOAD + 10];

    client.send(&[ClientFrame::binary(&data)]).await?;
    let first = timeout(WAIT, client.next_frame()).await??.ok_or("no first")?;
    let second = timeout(WAIT, client.next_frame()).await??.ok_or("no second")?;
    assert_eq!((first.fin, first.opcode), (false, 0x2));
    assert_eq!(first.payload.len(), MAX_FRAME_PAYLOAD);
    assert_eq!((second.fin, second.opcode), (true, 0x0));
    assert_eq!(second.payload.len(), 10);

    client.hang_up().await?;
    timeout(WAIT, handle).await??;
    Ok(())
}

#[rstest]
#[case::unmasked(ClientFrame::text("x").unmasked().encode(), 1002)]
#[case::reserved_bits(ClientFrame::text("x").rsv(0x40).encode(), 1002)]
#[case::reserved_opcode(ClientFrame::text("x").raw_opcode(0x3).encode(), 1002)]
#[case::orphan_continuation(ClientFrame::continuation(b"x").encode(), 1002)]
#[case::fragmented_ping(ClientFrame::ping(b"x").fin(false).encode(), 1002)]
#[case::large_ping(ClientFrame::ping(&[0; 126]).encode(), 1002)]
#[case::invalid_utf8(ClientFrame::new(Opcode::Text, vec![0xC3, 0x28]).encode(), 1007)]
#[case::oversized(oversized_header(), 1009)]
#[tokio::test]
async fn protocol_violation_closes_with_status(
    served: Served,
    #[case] wire: Vec<u8>,
    #[case] expected: u16,
) -> TestResult {
    let (mut client, handle) = TestClient::connect(&served.service);

    client.send_raw(&wire).await?;
    let frames = timeout(WAIT, client.remaining()).await??;
    assert_eq!(frames.len(), 1, "exactly one close frame: {frames:?}");
    assert_eq!(frames[0].close_code(), Some(expected));

    let session = timeout(WAIT, handle).await??;
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(served.handler.close_count(), 1);
    Ok(())
}

fn oversized_header() -> Vec<u8> {
    let mut wire = vec![0x82, 0x80 | 127];
    wire.extend_from_slice(&(MAX_MESSAGE_SIZE as u64 + 1).to_be_bytes());
    wire.extend_from_slice(&[0; 4]);
    wire
}

#[rstest]
#[tokio::test]
async fn session_is_registered_while_served(served: Served) -> TestResult {
    let (mut client, handle) = TestClient::connect(&served.service);
    client.send(&[ClientFrame::text("ping")]).await?;
    timeout(WAIT, client.next_frame()).await??;

    let ids = served.service.registry().active_ids();
    assert_eq!(ids.len(), 1);
    assert_eq!(served.service.registry().broadcast_text("all"), 1);
    let broadcast = timeout(WAIT, client.next_frame()).await??.ok_or("no broadcast")?;
    assert_eq!(broadcast.payload, b"all");

    client.hang_up().await?;
    let session = timeout(WAIT, handle).await??;
    assert_eq!(ids, vec![session.id()]);
    assert!(served.service.registry().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn shut_down_queue_sends_going_away(served: Served) -> TestResult {
    served.service.queue().shutdown().await;
    let (mut client, handle) = TestClient::connect(&served.service);

    client.send(&[ClientFrame::text("late")]).await?;
    let frames = timeout(WAIT, client.remaining()).await??;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].close_code(), Some(1001));
    timeout(WAIT, handle).await??;
    Ok(())
}

#[tokio::test]
async fn spawned_connections_are_tracked() -> TestResult {
    let handler = Arc::new(RecordingHandler::echo());
    let service = Arc::new(WebSocketService::new(
        handler.clone(),
        DispatchQueue::start(DispatchConfig::default()),
    ));
    let tracker = tokio_util::task::TaskTracker::new();
    let (mut client, server) = tokio::io::duplex(4096);
    service.spawn(server, &tracker);

    client
        .write_all(&ClientFrame::close(1000, "").encode())
        .await?;
    let mut echo = [0u8; 4];
    timeout(WAIT, client.read_exact(&mut echo)).await??;
    assert_eq!(echo, [0x88, 0x02, 0x03, 0xE8]);

    client.shutdown().await?;
    let mut rest = Vec::new();
    timeout(WAIT, client.read_to_end(&mut rest)).await??;
    assert!(rest.is_empty());

    tracker.close();
    timeout(WAIT, tracker.wait()).await?;
    assert_eq!(handler.close_count(), 1);
    Ok(())
}
