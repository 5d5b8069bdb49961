//! Integration tests for rsocket-mux.
//!
//! End-to-end tests run a client and a server over in-process transports.
//! Wire-level tests drive one side with hand-built frames.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;

use rsocket_mux::handler::RequestHandler;
use rsocket_mux::protocol::{
    CancelFrame, ErrorCode, ErrorFrame, Frame, FrameBuffer, FrameType, RequestFrame,
    RequestNFrame, SetupFrame, Version,
};
use rsocket_mux::transport::{FrameSink, FrameSource, LocalTransport, StreamTransport, Transport};
use rsocket_mux::{
    Payload, PrefetchStrategy, RSocket, RSocketClient, RSocketConnector, RSocketError,
    RSocketServer,
};

const WAIT: Duration = Duration::from_secs(5);

fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn setup_frame(honor_lease: bool) -> Frame {
    Frame::Setup(SetupFrame {
        version: Version::CURRENT,
        honor_lease,
        keep_alive_interval: 30_000,
        max_lifetime: 90_000,
        resume_token: None,
        metadata_mime_type: "application/binary".to_string(),
        data_mime_type: "application/binary".to_string(),
        payload: Payload::empty(),
    })
}

/// One side of a connection driven frame by frame.
struct RawPeer {
    sink: Box<dyn FrameSink>,
    source: Box<dyn FrameSource>,
}

impl RawPeer {
    fn new(transport: LocalTransport) -> Self {
        let (sink, source) = transport.into_parts();
        Self { sink, source }
    }

    async fn send(&mut self, frame: Frame) {
        let bytes = frame.encode().unwrap();
        self.sink
            .send_frames(std::slice::from_ref(&bytes))
            .await
            .unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        let bytes = Bytes::copy_from_slice(bytes);
        self.sink
            .send_frames(std::slice::from_ref(&bytes))
            .await
            .unwrap();
    }

    /// Next frame other than KEEPALIVE, or `None` once the other side closed.
    async fn next(&mut self) -> Option<Frame> {
        loop {
            let bytes = timeout(WAIT, self.source.receive_frame())
                .await
                .expect("timed out waiting for a frame")
                .unwrap()?;
            match Frame::decode(bytes).unwrap() {
                Frame::KeepAlive(_) => continue,
                frame => return Some(frame),
            }
        }
    }

    /// Next raw frame, KEEPALIVE included.
    async fn next_raw(&mut self) -> Bytes {
        timeout(WAIT, self.source.receive_frame())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("connection closed")
    }

    async fn recv(&mut self) -> Frame {
        self.next().await.expect("connection closed")
    }

    /// Assert nothing but KEEPALIVE arrives within `within`.
    async fn expect_silence(&mut self, within: Duration) {
        let result = timeout(within, async {
            loop {
                match self.source.receive_frame().await {
                    Ok(Some(bytes)) => match Frame::decode(bytes).unwrap() {
                        Frame::KeepAlive(_) => continue,
                        frame => return Some(frame),
                    },
                    _ => return None,
                }
            }
        })
        .await;
        if let Ok(Some(frame)) = result {
            panic!("unexpected frame {frame}");
        }
    }
}

fn data_of(frame: &Frame) -> String {
    match frame {
        Frame::Request(request) => request.payload.data_utf8(),
        other => panic!("expected a payload-carrying frame, got {other}"),
    }
}

fn echo_handler() -> RequestHandler {
    RequestHandler::builder()
        .request_response(|p: Payload| async move { Ok(p) })
        .request_stream(|p: Payload| {
            let count: usize = p.data_utf8().parse().unwrap_or(3);
            futures::stream::iter((0..count).map(|i| Ok(Payload::from(i.to_string())))).boxed()
        })
        .request_channel(|initial, payloads| {
            futures::stream::once(async move { Ok(initial) })
                .chain(payloads)
                .map(|item| item.map(|p| Payload::from(p.data_utf8().to_uppercase())))
                .boxed()
        })
        .build()
}

/// Client and server connected in-process; returns both requester handles.
async fn connect(
    connector: RSocketConnector,
    server: RSocketServer,
) -> (RSocketClient, RSocketClient) {
    let (client_side, server_side) = LocalTransport::pair();
    let accepted = tokio::spawn(async move { server.accept(server_side).await });
    let client = connector.connect(client_side).await.unwrap();
    let server = accepted.await.unwrap().unwrap();
    (client, server)
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

#[test]
fn test_error_frame_wire_vector() {
    let bytes = hex("00000b000000012c000000020164");
    let mut buffer = FrameBuffer::new();
    let frames = buffer.push(&bytes).unwrap();
    assert_eq!(frames.len(), 1);

    let frame = Frame::decode(frames[0].clone()).unwrap();
    assert_eq!(
        frame,
        Frame::Error(ErrorFrame::new(1, ErrorCode::ApplicationError, "d"))
    );
    assert_eq!(&frame.encode_with_length().unwrap()[..], &bytes[..]);
}

#[test]
fn test_request_n_wire_vector() {
    let bytes = hex("00000a00000001200000000005");
    let frame = Frame::decode_with_length(Bytes::from(bytes.clone())).unwrap();
    assert_eq!(
        frame,
        Frame::RequestN(RequestNFrame {
            stream_id: 1,
            request_n: 5
        })
    );
    assert_eq!(&frame.encode_with_length().unwrap()[..], &bytes[..]);
}

#[tokio::test]
async fn test_request_response_against_raw_responder() {
    let (client_side, raw_side) = LocalTransport::pair();
    let mut raw = RawPeer::new(raw_side);
    let client = RSocketConnector::new().connect(client_side).await.unwrap();

    assert!(matches!(raw.recv().await, Frame::Setup(_)));

    let pending = tokio::spawn(async move { client.request_response(Payload::from("d")).await });

    match raw.recv().await {
        Frame::Request(request) => {
            assert_eq!(request.frame_type, FrameType::RequestResponse);
            assert_eq!(request.stream_id, 1);
            assert_eq!(request.payload.data(), b"d");
        }
        other => panic!("unexpected frame {other}"),
    }
    raw.send(RequestFrame::payload(1, Payload::from("resp"), true, true).into())
        .await;

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.data(), b"resp");
}

#[tokio::test]
async fn test_request_stream_respects_credit() {
    let (raw_side, server_side) = LocalTransport::pair();
    let mut raw = RawPeer::new(raw_side);
    let server = RSocketServer::new().handler(echo_handler());
    let accepted = tokio::spawn(async move { server.accept(server_side).await });

    raw.send(setup_frame(false)).await;
    raw.send(RequestFrame::request_stream(1, 2, Payload::from("10")).into())
        .await;
    let _server = accepted.await.unwrap().unwrap();

    assert_eq!(data_of(&raw.recv().await), "0");
    assert_eq!(data_of(&raw.recv().await), "1");
    raw.expect_silence(Duration::from_millis(100)).await;

    raw.send(Frame::RequestN(RequestNFrame {
        stream_id: 1,
        request_n: 3,
    }))
    .await;
    for expected in ["2", "3", "4"] {
        let frame = raw.recv().await;
        match &frame {
            Frame::Request(request) => {
                assert_eq!(request.frame_type, FrameType::Payload);
                assert!(request.next);
                assert!(!request.complete);
            }
            other => panic!("unexpected frame {other}"),
        }
        assert_eq!(data_of(&frame), expected);
    }
    raw.expect_silence(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_cancel_suppresses_handler_error() {
    let (raw_side, server_side) = LocalTransport::pair();
    let mut raw = RawPeer::new(raw_side);
    let handler = RequestHandler::builder()
        .request_response(|p: Payload| async move {
            if p.data() == b"slow" {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(RSocketError::ApplicationError("failed after cancel".into()))
            } else {
                Ok(p)
            }
        })
        .build();
    let server = RSocketServer::new().handler(handler);
    let accepted = tokio::spawn(async move { server.accept(server_side).await });

    raw.send(setup_frame(false)).await;
    raw.send(RequestFrame::request_response(1, Payload::from("slow")).into())
        .await;
    raw.send(Frame::Cancel(CancelFrame { stream_id: 1 })).await;
    raw.send(RequestFrame::request_response(3, Payload::from("fast")).into())
        .await;
    let server = accepted.await.unwrap().unwrap();

    let frame = raw.recv().await;
    assert_eq!(frame.stream_id(), 3);
    assert_eq!(data_of(&frame), "fast");

    raw.expect_silence(Duration::from_millis(150)).await;
    assert_eq!(server.active_streams(), 0);
}

#[tokio::test]
async fn test_request_response_end_to_end() {
    let handler = RequestHandler::builder()
        .request_response(|p: Payload| async move {
            assert_eq!(p.data(), b"d");
            Ok(Payload::from("resp"))
        })
        .build();
    let (client, _server) = connect(RSocketConnector::new(), RSocketServer::new().handler(handler)).await;

    let response = client.request_response(Payload::from("d")).await.unwrap();
    assert_eq!(response.data(), b"resp");
    assert_eq!(client.active_streams(), 0);
}

#[tokio::test]
async fn test_application_error_is_stream_scoped() {
    let handler = RequestHandler::builder()
        .request_response(|p: Payload| async move {
            if p.data() == b"bad" {
                Err(RSocketError::ApplicationError("nope".into()))
            } else {
                Ok(p)
            }
        })
        .build();
    let (client, _server) = connect(RSocketConnector::new(), RSocketServer::new().handler(handler)).await;

    let err = client.request_response(Payload::from("bad")).await.unwrap_err();
    assert!(matches!(err, RSocketError::ApplicationError(ref m) if m == "nope"));

    // the connection survives
    assert!(client.is_active());
    let ok = client.request_response(Payload::from("good")).await.unwrap();
    assert_eq!(ok.data(), b"good");
}

#[tokio::test]
async fn test_unimplemented_interaction_fails_request() {
    let (client, _server) = connect(RSocketConnector::new(), RSocketServer::new()).await;
    let err = client
        .request_response(Payload::from("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, RSocketError::ApplicationError(_)));
}

#[tokio::test]
async fn test_request_stream_with_small_prefetch() {
    let connector = RSocketConnector::new().prefetch(PrefetchStrategy::new(2, 0));
    let (client, _server) = connect(connector, RSocketServer::new().handler(echo_handler())).await;

    let items: Vec<String> = client
        .request_stream(Payload::from("25"))
        .map(|item| item.unwrap().data_utf8())
        .collect()
        .await;
    let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
    assert_eq!(items, expected);
    assert_eq!(client.active_streams(), 0);
}

#[tokio::test]
async fn test_dropping_stream_cancels_responder() {
    let handler = RequestHandler::builder()
        .request_stream(|_| futures::stream::repeat_with(|| Ok(Payload::from("tick"))).boxed())
        .build();
    let (client, server) = connect(RSocketConnector::new(), RSocketServer::new().handler(handler)).await;

    let first: Vec<_> = client
        .request_stream(Payload::empty())
        .take(3)
        .collect()
        .await;
    assert_eq!(first.len(), 3);

    wait_until(|| server.active_streams() == 0).await;
    assert_eq!(client.active_streams(), 0);
    assert!(client.is_active());
}

#[tokio::test]
async fn test_request_channel_end_to_end() {
    let (client, _server) = connect(RSocketConnector::new(), RSocketServer::new().handler(echo_handler())).await;

    let rest = futures::stream::iter(vec![Ok(Payload::from("b")), Ok(Payload::from("c"))]).boxed();
    let items: Vec<String> = client
        .request_channel(Payload::from("a"), rest)
        .map(|item| item.unwrap().data_utf8())
        .collect()
        .await;
    assert_eq!(items, vec!["A", "B", "C"]);

    wait_until(|| client.active_streams() == 0).await;
}

#[tokio::test]
async fn test_fire_and_forget_and_metadata_push() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let fnf_tx = tx.clone();
    let handler = RequestHandler::builder()
        .fire_and_forget(move |p: Payload| {
            let tx = fnf_tx.clone();
            async move {
                let _ = tx.send(format!("fnf:{}", p.data_utf8()));
                Ok(())
            }
        })
        .metadata_push(move |metadata: Bytes| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(format!("push:{}", String::from_utf8_lossy(&metadata)));
                Ok(())
            }
        })
        .build();
    let (client, _server) = connect(RSocketConnector::new(), RSocketServer::new().handler(handler)).await;

    client.fire_and_forget(Payload::from("hello")).await.unwrap();
    client.metadata_push(Bytes::from_static(b"routing")).unwrap();

    let mut seen = vec![
        timeout(WAIT, rx.recv()).await.unwrap().unwrap(),
        timeout(WAIT, rx.recv()).await.unwrap().unwrap(),
    ];
    seen.sort();
    assert_eq!(seen, vec!["fnf:hello", "push:routing"]);
    assert_eq!(client.active_streams(), 0);
}

#[tokio::test]
async fn test_fragmented_payloads_over_byte_stream() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let server = RSocketServer::new()
        .max_fragment_size(64)
        .handler(echo_handler());
    let accepted = tokio::spawn(async move { server.accept(StreamTransport::new(server_io)).await });
    let client = RSocketConnector::new()
        .max_fragment_size(64)
        .connect(StreamTransport::new(client_io))
        .await
        .unwrap();
    let _server = accepted.await.unwrap().unwrap();

    let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let metadata: Vec<u8> = (0..300u32).map(|i| (i % 13) as u8).collect();
    let request = Payload::new(data.clone(), Some(Bytes::from(metadata.clone())));

    let response = client.request_response(request).await.unwrap();
    assert_eq!(response.data(), &data[..]);
    assert_eq!(response.metadata(), Some(&metadata[..]));
}

#[tokio::test]
async fn test_reassembly_limit_closes_connection() {
    let server = RSocketServer::new()
        .max_reassembly_size(128)
        .handler(echo_handler());
    let connector = RSocketConnector::new().max_fragment_size(64);
    let (client, _server) = connect(connector, server).await;

    let err = client
        .request_response(Payload::from(Bytes::from(vec![7u8; 1024])))
        .await
        .unwrap_err();
    assert!(err.is_connection_fatal());
    let cause = timeout(WAIT, client.on_close()).await.unwrap();
    assert!(matches!(cause, RSocketError::ConnectionError(_)));
}

#[tokio::test]
async fn test_server_requests_client() {
    let client_handler = RequestHandler::builder()
        .request_response(|p: Payload| async move {
            Ok(Payload::from(format!("client saw {}", p.data_utf8())))
        })
        .build();
    let (setup_tx, mut setup_rx) = mpsc::unbounded_channel();
    let server = RSocketServer::new().acceptor(move |setup, _client| {
        let _ = setup_tx.send(setup);
        async move { Ok(Arc::new(echo_handler()) as Arc<dyn RSocket>) }
    });
    let connector = RSocketConnector::new()
        .handler(client_handler)
        .data_mime_type("application/json")
        .setup_payload(Payload::from("credentials"));
    let (_client, server) = connect(connector, server).await;

    let setup = setup_rx.recv().await.unwrap();
    assert_eq!(setup.data_mime_type, "application/json");
    assert_eq!(setup.payload.data(), b"credentials");

    let response = server.request_response(Payload::from("ping")).await.unwrap();
    assert_eq!(response.data(), b"client saw ping");
}

#[tokio::test]
async fn test_lease_limits_requests() {
    let server = RSocketServer::new()
        .honor_lease(true)
        .acceptor(|_setup, client: RSocketClient| async move {
            client.send_lease(Duration::from_secs(30), 2)?;
            Ok(Arc::new(echo_handler()) as Arc<dyn RSocket>)
        });
    let (client, _server) = connect(RSocketConnector::new().honor_lease(true), server).await;

    wait_until(|| client.available_lease() == 2).await;
    client.request_response(Payload::from("1")).await.unwrap();
    client.request_response(Payload::from("2")).await.unwrap();

    let err = client.request_response(Payload::from("3")).await.unwrap_err();
    assert!(matches!(err, RSocketError::LeaseExhausted));
    assert!(!err.is_connection_fatal());
    assert!(client.is_active());
}

#[tokio::test]
async fn test_responder_rejects_request_without_lease() {
    let (raw_side, server_side) = LocalTransport::pair();
    let mut raw = RawPeer::new(raw_side);
    let server = RSocketServer::new().honor_lease(true).handler(echo_handler());
    let accepted = tokio::spawn(async move { server.accept(server_side).await });

    raw.send(setup_frame(true)).await;
    raw.send(RequestFrame::request_response(1, Payload::from("x")).into())
        .await;
    let _server = accepted.await.unwrap().unwrap();

    match raw.recv().await {
        Frame::Error(error) => {
            assert_eq!(error.stream_id, 1);
            assert_eq!(error.code, ErrorCode::Rejected);
        }
        other => panic!("unexpected frame {other}"),
    }
}

#[tokio::test]
async fn test_setup_with_unsupported_version_is_rejected() {
    let (raw_side, server_side) = LocalTransport::pair();
    let mut raw = RawPeer::new(raw_side);
    let server = RSocketServer::new().handler(echo_handler());
    let accepted = tokio::spawn(async move { server.accept(server_side).await });

    let Frame::Setup(mut setup) = setup_frame(false) else {
        unreachable!()
    };
    setup.version = Version { major: 2, minor: 0 };
    raw.send(Frame::Setup(setup)).await;

    match raw.recv().await {
        Frame::Error(error) => {
            assert_eq!(error.stream_id, 0);
            assert_eq!(error.code, ErrorCode::UnsupportedSetup);
        }
        other => panic!("unexpected frame {other}"),
    }
    assert!(raw.next().await.is_none());

    let err = accepted.await.unwrap().unwrap_err();
    assert!(matches!(err, RSocketError::UnsupportedSetup(_)));
}

#[tokio::test]
async fn test_resume_is_rejected() {
    let (raw_side, server_side) = LocalTransport::pair();
    let mut raw = RawPeer::new(raw_side);
    let server = RSocketServer::new();
    let accepted = tokio::spawn(async move { server.accept(server_side).await });

    raw.send(Frame::Resume(rsocket_mux::protocol::ResumeFrame {
        version: Version::CURRENT,
        resume_token: Bytes::from_static(b"token"),
        last_received_server_position: 0,
        first_available_client_position: 0,
    }))
    .await;

    match raw.recv().await {
        Frame::Error(error) => assert_eq!(error.code, ErrorCode::RejectedResume),
        other => panic!("unexpected frame {other}"),
    }
    assert!(matches!(
        accepted.await.unwrap(),
        Err(RSocketError::RejectedResume(_))
    ));
}

#[tokio::test]
async fn test_acceptor_rejection_reaches_client() {
    let server = RSocketServer::new().acceptor(|_setup, _client| async {
        Err::<Arc<dyn RSocket>, _>(RSocketError::ApplicationError("go away".into()))
    });
    let (client_side, server_side) = LocalTransport::pair();
    let accepted = tokio::spawn(async move { server.accept(server_side).await });
    let client = RSocketConnector::new().connect(client_side).await.unwrap();

    let cause = timeout(WAIT, client.on_close()).await.unwrap();
    assert!(matches!(cause, RSocketError::RejectedSetup(ref m) if m == "go away"));
    assert!(!client.is_active());
    assert!(accepted.await.unwrap().is_err());

    let err = client.request_response(Payload::empty()).await.unwrap_err();
    assert!(matches!(err, RSocketError::RejectedSetup(_)));
}

#[tokio::test]
async fn test_malformed_frame_fails_live_streams() {
    let (client_side, raw_side) = LocalTransport::pair();
    let mut raw = RawPeer::new(raw_side);
    let client = RSocketConnector::new().connect(client_side).await.unwrap();
    assert!(matches!(raw.recv().await, Frame::Setup(_)));

    let mut stream = client.request_stream(Payload::from("x"));
    let pending = tokio::spawn(async move { stream.next().await });
    assert!(matches!(raw.recv().await, Frame::Request(_)));

    // reserved frame type 0x00
    raw.send_raw(&[0, 0, 0, 1, 0, 0]).await;

    let item = pending.await.unwrap().unwrap();
    assert!(matches!(item, Err(RSocketError::ConnectionError(_))));
    match raw.recv().await {
        Frame::Error(error) => {
            assert_eq!(error.stream_id, 0);
            assert_eq!(error.code, ErrorCode::ConnectionError);
        }
        other => panic!("unexpected frame {other}"),
    }
    assert!(!client.is_active());
}

#[tokio::test]
async fn test_frame_for_unknown_stream_is_violation() {
    let (client_side, raw_side) = LocalTransport::pair();
    let mut raw = RawPeer::new(raw_side);
    let client = RSocketConnector::new().connect(client_side).await.unwrap();
    assert!(matches!(raw.recv().await, Frame::Setup(_)));

    // late REQUEST_N and CANCEL are dropped
    raw.send(Frame::RequestN(RequestNFrame {
        stream_id: 41,
        request_n: 1,
    }))
    .await;
    raw.send(Frame::Cancel(CancelFrame { stream_id: 43 })).await;
    raw.send(RequestFrame::payload(45, Payload::from("?"), true, false).into())
        .await;

    let cause = timeout(WAIT, client.on_close()).await.unwrap();
    assert!(matches!(cause, RSocketError::ConnectionError(ref m) if m.contains("45")));
}

#[tokio::test]
async fn test_dispose_fails_pending_requests() {
    let (client_side, raw_side) = LocalTransport::pair();
    let mut raw = RawPeer::new(raw_side);
    let client = RSocketConnector::new().connect(client_side).await.unwrap();
    assert!(matches!(raw.recv().await, Frame::Setup(_)));

    let requester = client.clone();
    let pending = tokio::spawn(async move { requester.request_response(Payload::from("x")).await });
    assert!(matches!(raw.recv().await, Frame::Request(_)));

    client.dispose();
    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, RSocketError::ConnectionClosed));
    assert!(!client.is_active());

    // transport released after the flush
    assert!(raw.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_with_echoing_peer_stays_active() {
    let connector = RSocketConnector::new()
        .keep_alive(Duration::from_millis(100), Duration::from_millis(1000));
    let (client, server) = connect(connector, RSocketServer::new().handler(echo_handler())).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(client.is_active());
    assert!(server.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_client_sends_keepalive_every_interval() {
    let (client_side, raw_side) = LocalTransport::pair();
    let mut raw = RawPeer::new(raw_side);
    let client = RSocketConnector::new()
        .keep_alive(Duration::from_millis(100), Duration::from_secs(10))
        .connect(client_side)
        .await
        .unwrap();

    let setup = Frame::decode(raw.next_raw().await).unwrap();
    assert_eq!(setup.frame_type(), FrameType::Setup);

    let started = tokio::time::Instant::now();
    for _ in 0..5 {
        let bytes = raw.next_raw().await;
        assert_eq!(&bytes[..4], &[0, 0, 0, 0]);
        match Frame::decode(bytes).unwrap() {
            Frame::KeepAlive(keepalive) => assert!(keepalive.respond),
            other => panic!("expected KEEPALIVE, got {other}"),
        }
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
    assert!(client.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_without_echo_fails_connection() {
    let (client_side, raw_side) = LocalTransport::pair();
    // never reads, never echoes
    let _raw = RawPeer::new(raw_side);
    let client = RSocketConnector::new()
        .keep_alive(Duration::from_millis(100), Duration::from_millis(1000))
        .connect(client_side)
        .await
        .unwrap();

    let cause = timeout(Duration::from_millis(1200), client.on_close())
        .await
        .expect("keepalive timeout not detected");
    assert!(matches!(cause, RSocketError::ConnectionError(ref m) if m.contains("keep-alive")));

    let err = client.request_response(Payload::empty()).await.unwrap_err();
    assert!(matches!(err, RSocketError::ConnectionError(_)));
}
