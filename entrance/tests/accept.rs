use std::io;
use std::time::Duration;

use entrance::engine::Engine;
use futures::TryStreamExt;
use relay_frame::Frame;
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::io::StreamReader;

const FAKE_EXPOSER_TOKEN: &str = "fake-exposer";

/// Read off the GET long-poll until `want` frames have arrived, never
/// waiting on the (infinite) body's EOF.
async fn read_frames(response: reqwest::Response, want: usize) -> Vec<Frame> {
    let byte_stream = response
        .bytes_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    let mut lines = tokio::io::BufReader::new(StreamReader::new(byte_stream)).lines();
    let mut frames = Vec::new();
    while frames.len() < want {
        let line = lines
            .next_line()
            .await
            .unwrap()
            .expect("stream ended before enough frames arrived");
        if let Some(frame) = Frame::decode_line(&line).unwrap() {
            frames.push(frame);
        }
    }
    frames
}

async fn spawn_rendezvous() -> Url {
    let (router, _registry) = rendezvous::build_router(16, Duration::from_millis(200));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// Drives the entrance against a fake "exposer" that just speaks raw HTTP
/// to the rendezvous server directly, exercising mint-on-accept, the
/// OPEN emission, and DATA relay in both directions.
#[tokio::test]
async fn entrance_accepts_and_relays_local_connections() {
    let rendezvous_url = spawn_rendezvous().await;
    let client = reqwest::Client::new();

    // Ask for a free port by creating, then deleting, a throwaway listener.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    // The fake exposer registers under its own token so it never collides
    // with the real entrance engine, which joins by source IP below.
    let created: serde_json::Value = client
        .post(rendezvous_url.clone())
        .json(&serde_json::json!({ "port": port, "token": FAKE_EXPOSER_TOKEN }))
        .header("x-peer-token", FAKE_EXPOSER_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let channel_id = created["channel"].as_str().unwrap().to_string();

    let (transport, info) =
        relay_transport::Transport::join(rendezvous_url.clone(), channel_id.clone(), None)
            .await
            .unwrap();
    assert_eq!(info.port, port);

    let engine = Engine::bind(transport, port).await.unwrap();
    tokio::spawn(async move {
        let _ = engine.run().await;
    });

    let mut local = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    local.write_all(b"hello").await.unwrap();

    // Fake exposer: drain frames from the entrance (OPEN then DATA) via GET.
    let response = client
        .get(rendezvous_url.join(&channel_id).unwrap())
        .header("x-peer-token", FAKE_EXPOSER_TOKEN)
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .unwrap();
    let decoded = tokio::time::timeout(Duration::from_secs(2), read_frames(response, 2))
        .await
        .expect("timed out waiting for OPEN and DATA frames");
    assert!(decoded[0].is_control(), "first frame from a fresh accept must be OPEN");
    let stream_id = decoded[0].id.clone();
    let data_frame = decoded
        .iter()
        .find(|f| !f.is_control())
        .expect("the local write must surface as a DATA frame");
    assert_eq!(data_frame.data.as_deref(), Some(&b"hello"[..]));

    // Fake exposer replies with a DATA frame; the entrance must write it
    // to the local socket.
    client
        .put(rendezvous_url.join(&channel_id).unwrap())
        .header("x-peer-token", FAKE_EXPOSER_TOKEN)
        .body(
            Frame::data(&stream_id, bytes::Bytes::from_static(b"world"))
                .encode_line()
                .unwrap(),
        )
        .send()
        .await
        .unwrap();

    let mut buf = [0u8; 5];
    local.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"world");
}
