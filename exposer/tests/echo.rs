use std::io;
use std::time::Duration;

use exposer::config::Target;
use exposer::engine::Engine;
use futures::TryStreamExt;
use relay_frame::Frame;
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::io::StreamReader;

const FAKE_ENTRANCE_TOKEN: &str = "fake-entrance";

/// Read off the GET long-poll until `want` DATA/CONTROL frames have
/// arrived, never waiting on the (infinite) body's EOF.
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

async fn spawn_echo_target() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
    port
}

/// Drives the exposer against a fake "entrance" that just speaks raw HTTP
/// to the rendezvous server directly, exercising dial-on-OPEN, write-on-
/// DATA and the DATA/CLOSE frames the engine's reader pump produces.
#[tokio::test]
async fn exposer_relays_data_to_and_from_target() {
    let rendezvous_url = spawn_rendezvous().await;
    let echo_port = spawn_echo_target().await;

    let (transport, info) =
        relay_transport::Transport::create(rendezvous_url.clone(), echo_port, None)
            .await
            .unwrap();
    let engine = Engine::new(
        transport,
        Target {
            host: "127.0.0.1".to_string(),
            port: echo_port,
        },
    );
    tokio::spawn(async move {
        let _ = engine.run().await;
    });

    let client = reqwest::Client::new();
    // Join with a distinguishing token: the exposer under test registered
    // with no token (resolved by source IP), so this fake entrance needs
    // its own identity to avoid colliding with it.
    client
        .post(rendezvous_url.clone())
        .json(&serde_json::json!({ "channel": info.channel, "token": FAKE_ENTRANCE_TOKEN }))
        .header("x-peer-token", FAKE_ENTRANCE_TOKEN)
        .send()
        .await
        .unwrap();

    let stream_id = "probe-stream";
    client
        .put(rendezvous_url.join(&info.channel).unwrap())
        .header("x-peer-token", FAKE_ENTRANCE_TOKEN)
        .body(Frame::control(stream_id).encode_line().unwrap())
        .send()
        .await
        .unwrap();
    client
        .put(rendezvous_url.join(&info.channel).unwrap())
        .header("x-peer-token", FAKE_ENTRANCE_TOKEN)
        .body(
            Frame::data(stream_id, bytes::Bytes::from_static(b"ping"))
                .encode_line()
                .unwrap(),
        )
        .send()
        .await
        .unwrap();

    let response = client
        .get(rendezvous_url.join(&info.channel).unwrap())
        .header("x-peer-token", FAKE_ENTRANCE_TOKEN)
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .unwrap();
    let decoded = tokio::time::timeout(Duration::from_secs(2), read_frames(response, 1))
        .await
        .expect("timed out waiting for the echoed frame");
    let data_frame = decoded
        .iter()
        .find(|f| !f.is_control())
        .expect("exposer echoed the payload back as a DATA frame");
    assert_eq!(data_frame.id, stream_id);
    assert_eq!(data_frame.data.as_deref(), Some(&b"ping"[..]));
}
