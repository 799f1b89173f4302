//! Tests for the session state machine and its outbound API.

use std::{
    io,
    num::NonZeroUsize,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use bytes::Bytes;
use rstest::{fixture, rstest};
use wiresocket::{
    CloseCode,
    Message,
    Opcode,
    Session,
    SessionState,
    StatsSink,
    StreamTransport,
    Transport,
    session::INVALID_OPCODE_REASON,
};
use wiresocket_testing::{Event, RecordingHandler, RecordingTransport};

struct Harness {
    transport: Arc<RecordingTransport>,
    handler: Arc<RecordingHandler>,
    session: Session,
}

#[fixture]
fn harness() -> Harness {
    // Session bound to an in-memory transport and a recording handler
    let transport = Arc::new(RecordingTransport::new());
    let handler = Arc::new(RecordingHandler::new());
    let session = Session::new(transport.clone(), handler.clone());
    Harness {
        transport,
        handler,
        session,
    }
}

fn close_message(code: u16, reason: &str) -> Message {
    let mut payload = code.to_be_bytes().to_vec();
    payload.extend_from_slice(reason.as_bytes());
    Message::binary(Opcode::Close, payload)
}

#[rstest]
#[tokio::test]
async fn open_moves_to_open_once(harness: Harness) {
    assert_eq!(harness.session.state(), SessionState::Connecting);
    assert!(harness.session.open().await);
    assert_eq!(harness.session.state(), SessionState::Open);
    assert!(!harness.session.open().await);
    assert_eq!(harness.handler.events(), vec![Event::Open]);
}

#[derive(Clone, Copy, Debug)]
enum Lifecycle {
    Connecting,
    Closing,
    Closed,
}

#[rstest]
#[case::connecting(Lifecycle::Connecting, SessionState::Connecting)]
#[case::closing(Lifecycle::Closing, SessionState::Closing)]
#[case::closed(Lifecycle::Closed, SessionState::Closed)]
#[tokio::test]
async fn data_sends_are_refused_unless_open(
    harness: Harness,
    #[case] lifecycle: Lifecycle,
    #[case] expected: SessionState,
) {
    match lifecycle {
        Lifecycle::Connecting => {}
        Lifecycle::Closing => {
            harness.session.open().await;
            harness.session.execute(close_message(1000, "")).await;
        }
        Lifecycle::Closed => {
            harness.session.open().await;
            harness.session.terminate().await;
        }
    }
    assert_eq!(harness.session.state(), expected);
    let before = harness.transport.written();

    assert!(!harness.session.send_text_data("late"));
    assert!(!harness.session.send_binary_data(Bytes::from_static(b"late")));
    assert!(!harness.session.send_ping(Bytes::new()));
    assert!(!harness.session.is_pinging());
    assert_eq!(harness.transport.written(), before);
}

/// Holds the first write until released, keeping the session's send lock
/// taken in the meantime.
struct HeldTransport {
    inner: RecordingTransport,
    gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
}

impl Transport for HeldTransport {
    fn queue_write(&self, bytes: Bytes) -> io::Result<()> {
        let gate = self.gate.lock().expect("gate lock").take();
        if let Some((entered, release)) = gate {
            entered.send(()).expect("test waits for entry");
            release.recv().expect("test releases the write");
        }
        self.inner.queue_write(bytes)
    }

    fn switch_to_read(&self) { self.inner.switch_to_read(); }

    fn close(&self) { self.inner.close(); }

    fn is_closed(&self) -> bool { self.inner.is_closed() }
}

#[tokio::test]
async fn data_waiting_on_the_send_lock_never_follows_a_close() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let transport = Arc::new(HeldTransport {
        inner: RecordingTransport::new(),
        gate: Mutex::new(Some((entered_tx, release_rx))),
    });
    let session = Session::new(transport.clone(), Arc::new(RecordingHandler::new()));
    session.open().await;

    let first = {
        let session = session.clone();
        thread::spawn(move || session.send_text_data("first"))
    };
    entered_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("first send holds the lock");

    let waiting = {
        let session = session.clone();
        thread::spawn(move || session.send_text_data("second"))
    };
    let closer = {
        let session = session.clone();
        thread::spawn(move || {
            futures::executor::block_on(session.execute(close_message(1000, "")));
        })
    };
    while session.state() == SessionState::Open {
        thread::sleep(Duration::from_millis(1));
    }
    release_tx.send(()).expect("held write is waiting");

    assert!(first.join().expect("first sender"));
    assert!(!waiting.join().expect("waiting sender"));
    closer.join().expect("closer");

    let frames = transport.inner.frames();
    let opcodes: Vec<_> = frames.iter().map(|f| f.opcode).collect();
    assert_eq!(opcodes, vec![0x1, 0x8]);
    assert_eq!(frames[0].payload, b"first");
}

#[tokio::test]
async fn peer_that_stops_reading_is_disconnected() {
    let (_client, server) = tokio::io::duplex(64);
    let transport = StreamTransport::spawn(server, 16, 1024);
    let session = Session::new(Arc::new(transport.clone()), Arc::new(RecordingHandler::new()));
    session.open().await;

    // Each 62-byte message is one 64-byte frame; none drain while we never yield.
    let payload = Bytes::from(vec![b'x'; 62]);
    let sent = (0..64)
        .take_while(|_| session.send_binary_data(payload.clone()))
        .count();
    assert_eq!(sent, 16);
    assert!(transport.is_closed());
    assert_eq!(session.counters().messages_out, 16);
}

#[rstest]
#[tokio::test]
async fn text_and_binary_reach_the_handler(harness: Harness) {
    harness.session.open().await;
    harness.session.execute(Message::text("hi")).await;
    harness
        .session
        .execute(Message::binary(Opcode::Binary, vec![1, 2, 3]))
        .await;

    assert_eq!(
        harness.handler.events(),
        vec![
            Event::Open,
            Event::Text("hi".into()),
            Event::Binary(vec![1, 2, 3]),
        ]
    );
    let counters = harness.session.counters();
    assert_eq!(counters.messages_in, 2);
    assert_eq!(counters.bytes_in, 5);
}

#[rstest]
#[tokio::test]
async fn peer_close_is_echoed_then_completed(harness: Harness) {
    harness.session.open().await;

    harness.session.execute(close_message(1000, "bye")).await;
    assert_eq!(harness.session.state(), SessionState::Closing);
    let frames = harness.transport.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_close());
    assert_eq!(frames[0].close_code(), Some(1000));
    assert_eq!(frames[0].close_reason(), "bye");
    assert_eq!(harness.transport.close_count(), 0);
    assert_eq!(harness.handler.close_count(), 1);

    harness.session.execute(close_message(1000, "bye")).await;
    assert_eq!(harness.session.state(), SessionState::Closed);
    assert_eq!(harness.transport.frames().len(), 1);
    assert_eq!(harness.transport.close_count(), 1);
    assert_eq!(harness.handler.close_count(), 1);
}

#[rstest]
#[tokio::test]
async fn empty_close_payload_is_echoed_empty(harness: Harness) {
    harness.session.open().await;
    harness
        .session
        .execute(Message::binary(Opcode::Close, Bytes::new()))
        .await;
    assert_eq!(harness.transport.written(), vec![0x88, 0x00]);
}

#[rstest]
#[tokio::test]
async fn send_close_finishes_the_session(harness: Harness) {
    harness.session.open().await;

    assert!(harness.session.send_close(CloseCode::Normal, "done"));
    assert_eq!(harness.session.state(), SessionState::Closed);
    assert_eq!(harness.transport.close_count(), 1);
    let frames = harness.transport.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].close_code(), Some(1000));
    assert_eq!(frames[0].close_reason(), "done");

    assert!(!harness.session.send_close(CloseCode::Normal, "again"));
    assert!(!harness.session.send_text_data("late"));
    assert_eq!(harness.transport.frames().len(), 1);
}

#[rstest]
#[tokio::test]
async fn long_close_reason_fits_a_control_frame(harness: Harness) {
    harness.session.open().await;
    let reason = "x".repeat(400);
    assert!(harness.session.send_close(CloseCode::PolicyViolation, &reason));

    let frames = harness.transport.frames();
    assert_eq!(frames[0].payload.len(), 125);
    assert_eq!(frames[0].close_code(), Some(1008));
}

#[rstest]
#[tokio::test]
async fn ping_is_answered_with_matching_pong(harness: Harness) {
    harness.session.open().await;
    harness
        .session
        .execute(Message::binary(Opcode::Ping, Bytes::from_static(b"probe")))
        .await;
    assert_eq!(harness.transport.written(), b"\x8a\x05probe");
}

#[rstest]
#[tokio::test]
async fn ping_after_close_started_gets_no_pong(harness: Harness) {
    harness.session.open().await;
    harness.session.execute(close_message(1001, "")).await;
    let before = harness.transport.written().len();

    harness
        .session
        .execute(Message::binary(Opcode::Ping, Bytes::from_static(b"late")))
        .await;
    assert_eq!(harness.transport.written().len(), before);
    assert!(!harness.session.send_pong(Bytes::new()));
}

#[rstest]
#[tokio::test]
async fn pong_clears_outstanding_ping(harness: Harness) {
    harness.session.open().await;
    assert!(!harness.session.is_pinging());
    assert!(harness.session.send_ping(Bytes::from_static(b"1")));
    assert!(harness.session.is_pinging());

    harness
        .session
        .execute(Message::binary(Opcode::Pong, Bytes::from_static(b"1")))
        .await;
    assert!(!harness.session.is_pinging());
    assert_eq!(harness.transport.frames()[0].opcode, 0x9);
}

#[rstest]
#[tokio::test]
async fn unexpected_opcode_closes_with_internal_error(harness: Harness) {
    harness.session.open().await;
    harness
        .session
        .execute(Message::binary(Opcode::Continuation, Bytes::from_static(b"?")))
        .await;

    let frames = harness.transport.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].close_code(), Some(1011));
    assert_eq!(frames[0].close_reason(), INVALID_OPCODE_REASON);
    assert_eq!(harness.session.state(), SessionState::Closed);
}

#[rstest]
#[tokio::test]
async fn data_after_close_started_is_dropped(harness: Harness) {
    harness.session.open().await;
    harness.session.execute(close_message(1000, "")).await;
    harness.session.execute(Message::text("ignored")).await;
    assert!(
        !harness
            .handler
            .events()
            .contains(&Event::Text("ignored".into()))
    );
}

#[rstest]
#[tokio::test]
async fn failed_send_closes_transport(harness: Harness) {
    harness.session.open().await;
    harness.transport.fail_writes();

    assert!(!harness.session.send_text_data("lost"));
    assert_eq!(harness.transport.close_count(), 1);
    assert_eq!(harness.session.counters().messages_out, 0);

    harness.session.terminate().await;
    assert_eq!(harness.session.state(), SessionState::Closed);
    assert_eq!(harness.handler.close_count(), 1);
}

#[rstest]
#[tokio::test]
async fn terminate_runs_on_close_exactly_once(harness: Harness) {
    harness.session.open().await;
    harness.session.terminate().await;
    harness.session.terminate().await;
    assert_eq!(harness.handler.close_count(), 1);
    assert_eq!(harness.transport.close_count(), 1);
}

#[rstest]
#[tokio::test]
async fn terminate_before_open_skips_on_close(harness: Harness) {
    harness.session.terminate().await;
    assert_eq!(harness.session.state(), SessionState::Closed);
    assert!(harness.handler.events().is_empty());
}

#[rstest]
#[tokio::test]
async fn successful_send_switches_back_to_read(harness: Harness) {
    harness.session.open().await;
    assert!(harness.session.send_text_data("a"));
    assert!(harness.session.send_binary_data(vec![1u8]));
    assert_eq!(harness.transport.switch_count(), 2);
}

#[tokio::test]
async fn large_message_is_fragmented() {
    let transport = Arc::new(RecordingTransport::new());
    let session = Session::builder(transport.clone(), Arc::new(RecordingHandler::new()))
        .max_frame_payload(NonZeroUsize::new(4).expect("non-zero"))
        .build();
    session.open().await;

    assert!(session.send_binary_data(vec![7u8; 10]));
    let frames = transport.frames();
    let shape: Vec<_> = frames
        .iter()
        .map(|f| (f.fin, f.opcode, f.payload.len()))
        .collect();
    assert_eq!(shape, vec![(false, 0x2, 4), (false, 0x0, 4), (true, 0x0, 2)]);

    let counters = session.counters();
    assert_eq!(counters.messages_out, 1);
    assert_eq!(counters.bytes_out, 10);
}

#[derive(Default)]
struct CountingStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    incoming: AtomicUsize,
    outgoing: AtomicUsize,
}

impl StatsSink for CountingStats {
    fn add_new_session(&self) { self.opened.fetch_add(1, Ordering::SeqCst); }

    fn add_closed_session(&self) { self.closed.fetch_add(1, Ordering::SeqCst); }

    fn add_incoming_message(&self, bytes: usize) { self.incoming.fetch_add(bytes, Ordering::SeqCst); }

    fn add_outgoing_message(&self, bytes: usize) { self.outgoing.fetch_add(bytes, Ordering::SeqCst); }
}

#[tokio::test]
async fn stats_sink_sees_lifecycle_and_traffic() {
    let stats = Arc::new(CountingStats::default());
    let session = Session::builder(
        Arc::new(RecordingTransport::new()),
        Arc::new(RecordingHandler::echo()),
    )
    .stats(stats.clone())
    .build();

    session.open().await;
    session.execute(Message::text("abc")).await;
    session.terminate().await;
    session.terminate().await;

    assert_eq!(stats.opened.load(Ordering::SeqCst), 1);
    assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    assert_eq!(stats.incoming.load(Ordering::SeqCst), 3);
    assert_eq!(stats.outgoing.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn sessions_compare_by_id() {
    let transport = Arc::new(RecordingTransport::new());
    let handler = Arc::new(RecordingHandler::new());
    let first = Session::new(transport.clone(), handler.clone());
    let second = Session::new(transport, handler);

    assert_eq!(first, first.clone());
    assert_ne!(first, second);
    assert!(second.id() > first.id());

    let weak = first.downgrade();
    assert_eq!(weak.upgrade(), Some(first.clone()));
    drop(first);
    assert!(weak.is_dead());
}
