//! Integration tests — display negotiation against a real HTTP device
//! endpoint on localhost, plus decode pipelines wired end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use vdu_core::{
    ConfigService, DecodeBackend, DecodedPicture, DisplayController, DisplayEvent, EngineConfig,
    HttpConfigService, PipelineRunner, RemoteDisplayState, RendererDescriptor, RendererSelector,
    RendererVariant, SoftwareEngine, StreamControl, Surface, VariantLoader, VduError, ViewSize,
};

// ── Helpers ──────────────────────────────────────────────────────

/// A minimal device-side config endpoint: answers GET /displayState
/// with the scripted state and records every POST body.
struct FakeDevice {
    base_url: String,
    posts: Arc<Mutex<Vec<Value>>>,
}

impl FakeDevice {
    async fn start(state: Value) -> FakeDevice {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let posts: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

        let state = Arc::new(state);
        let recorded = posts.clone();
        tokio::spawn(async move {
            loop {
                let Ok((conn, _)) = listener.accept().await else {
                    return;
                };
                let state = state.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    handle_request(conn, &state, &recorded).await;
                });
            }
        });

        FakeDevice {
            base_url: format!("http://{addr}"),
            posts,
        }
    }

    fn posts(&self) -> Vec<Value> {
        self.posts.lock().unwrap().clone()
    }
}

async fn handle_request(
    mut conn: tokio::net::TcpStream,
    state: &Value,
    posts: &Mutex<Vec<Value>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = match conn.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let is_post = head.starts_with("POST");
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = match conn.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = if is_post {
        let posted: Value =
            serde_json::from_slice(&buf[header_end..header_end + content_length])
                .unwrap_or(Value::Null);
        posts.lock().unwrap().push(posted);
        "{}".to_string()
    } else {
        state.to_string()
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = conn.write_all(response.as_bytes()).await;
    let _ = conn.shutdown().await;
}

#[derive(Default)]
struct RecordingStream {
    ensures: AtomicUsize,
    closes: AtomicUsize,
}

#[async_trait]
impl StreamControl for RecordingStream {
    async fn ensure(&self, _state: &RemoteDisplayState) -> Result<(), VduError> {
        self.ensures.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Synchronous backend that emits one solid picture per decode call
/// and records what it was asked to decode.
struct StubBackend {
    calls: Arc<Mutex<Vec<(Vec<u8>, bool)>>>,
    size: (u32, u32),
}

impl DecodeBackend for StubBackend {
    fn configure(&mut self, config: &EngineConfig) -> Result<(), VduError> {
        self.size = (config.display_width, config.display_height);
        Ok(())
    }

    fn decode(
        &mut self,
        data: &[u8],
        is_key: bool,
        timestamp_us: u64,
    ) -> Result<Vec<DecodedPicture>, VduError> {
        self.calls.lock().unwrap().push((data.to_vec(), is_key));
        let (w, h) = self.size;
        Ok(vec![DecodedPicture::bgra(
            w,
            h,
            timestamp_us,
            vec![0x80; (w * h * 4) as usize],
        )])
    }

    fn pending(&self) -> usize {
        0
    }

    fn reset(&mut self) {}
}

#[derive(Default)]
struct CountingSurface {
    drawn: Arc<Mutex<Vec<(u32, u32, u64)>>>,
}

impl Surface for CountingSurface {
    fn draw(&mut self, picture: DecodedPicture) {
        self.drawn
            .lock()
            .unwrap()
            .push((picture.width, picture.height, picture.timestamp_us));
    }
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

// ── Config service over HTTP ─────────────────────────────────────

#[tokio::test]
async fn test_http_fetch_normalizes_loose_device_json() {
    let device = FakeDevice::start(json!({
        "width": "1280",
        "height": 720.9,
        "isHeadless": true,
        "renderer": "2",
        "quality": null,
    }))
    .await;

    let service = HttpConfigService::new(&device.base_url);
    let state = service.fetch_display_state().await.unwrap();

    assert_eq!(state.width, 1280);
    assert_eq!(state.height, 720);
    assert_eq!(state.is_headless, 1);
    assert_eq!(state.renderer, 2);
    // Unparseable fields fall back to their defaults.
    assert_eq!(state.quality, 90);
}

#[tokio::test]
async fn test_http_post_sends_camel_case_payload() {
    let device = FakeDevice::start(json!({})).await;
    let service = HttpConfigService::new(&device.base_url);

    let state = RemoteDisplayState::normalize(&json!({}));
    service.post_display_state(&state).await.unwrap();

    let posts = device.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["width"], 1024);
    assert_eq!(posts[0]["resolutionPreset"], 0);
    assert_eq!(posts[0]["isRearDisplayEnabled"], 0);
}

// ── Full negotiation lifecycle ───────────────────────────────────

#[tokio::test]
async fn test_negotiation_round_trip_against_http_device() {
    let device = FakeDevice::start(json!({})).await;
    let config = Arc::new(HttpConfigService::new(&device.base_url));
    let prefs = Arc::new(vdu_core::display::MemoryPreferenceStore::new());
    let stream = Arc::new(RecordingStream::default());

    let (mut controller, mut handles) =
        DisplayController::new(config, prefs, stream.clone());
    controller
        .initialize(ViewSize::new(1920, 1080))
        .await
        .unwrap();
    let task = tokio::spawn(controller.run());

    // initialize() queues a renegotiation for the real viewport; it
    // debounces, posts, settles, then refreshes the session.
    let event = tokio::time::timeout(Duration::from_secs(10), handles.events.recv())
        .await
        .expect("timed out waiting for session refresh")
        .expect("controller dropped its event channel");
    assert_eq!(
        event,
        DisplayEvent::SessionRefreshed {
            size: ViewSize::new(1920, 832)
        }
    );

    let posts = device.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["width"], 1920);
    assert_eq!(posts[0]["height"], 832);
    assert_eq!(posts[0]["density"], 200);

    assert_eq!(*handles.adjusted_size.borrow(), ViewSize::new(1920, 832));
    assert!(stream.closes.load(Ordering::SeqCst) >= 1);
    assert!(stream.ensures.load(Ordering::SeqCst) >= 2);

    handles.handle.shutdown();
    task.await.unwrap();
}

// ── Decode pipeline end to end ───────────────────────────────────

#[tokio::test]
async fn test_software_pipeline_decodes_into_the_surface() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let drawn = Arc::new(Mutex::new(Vec::new()));
    let (errors, _errors_rx) = mpsc::unbounded_channel();

    let engine = SoftwareEngine::new(
        StubBackend {
            calls: calls.clone(),
            size: (0, 0),
        },
        errors,
    );
    let surface = CountingSurface {
        drawn: drawn.clone(),
    };
    let (handle, runner) = PipelineRunner::new(engine, surface);
    let task = tokio::spawn(runner.run());

    handle.configure(EngineConfig::new(64, 64, 64, 64));
    // One arrival holding a sequence parameter set and a key frame.
    handle.submit(Bytes::from_static(&[
        0, 0, 0, 1, 0x67, 0xAA, 0xBB, //
        0, 0, 0, 1, 0x65, 1, 2, 3,
    ]));

    wait_until(|| !drawn.lock().unwrap().is_empty()).await;

    let drawn = drawn.lock().unwrap().clone();
    assert_eq!(drawn, vec![(64, 64, 0)]);

    let calls = calls.lock().unwrap().clone();
    // Only the key frame reaches the backend, prefixed with the
    // cached parameter set.
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1);
    assert!(calls[0].0.starts_with(&[0, 0, 0, 1, 0x67, 0xAA, 0xBB]));

    drop(handle);
    task.await.unwrap();
}

// ── Renderer selection wiring ────────────────────────────────────

struct SoftwareTierLoader {
    drawn: Arc<Mutex<Vec<(u32, u32, u64)>>>,
}

#[async_trait]
impl VariantLoader for SoftwareTierLoader {
    async fn load(&self, descriptor: RendererDescriptor) -> Result<RendererVariant, VduError> {
        let (errors, _errors_rx) = mpsc::unbounded_channel();
        let engine = SoftwareEngine::new(
            StubBackend {
                calls: Arc::new(Mutex::new(Vec::new())),
                size: (0, 0),
            },
            errors,
        );
        let surface = CountingSurface {
            drawn: self.drawn.clone(),
        };
        let (pipeline, runner) = PipelineRunner::new(engine, surface);
        tokio::spawn(runner.run());
        Ok(RendererVariant {
            descriptor,
            pipeline,
        })
    }
}

#[tokio::test]
async fn test_selector_pins_one_pipeline_per_session() {
    let drawn = Arc::new(Mutex::new(Vec::new()));
    let selector = RendererSelector::new(Arc::new(SoftwareTierLoader {
        drawn: drawn.clone(),
    }));

    let descriptor = RendererDescriptor::for_renderer_id(2);
    let first = selector.ensure(descriptor).await.unwrap();
    let second = selector.ensure(descriptor).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    first.pipeline.configure(EngineConfig::new(32, 32, 32, 32));
    first.pipeline.submit(Bytes::from_static(&[
        0, 0, 0, 1, 0x67, 1, 1, //
        0, 0, 0, 1, 0x65, 2, 2,
    ]));

    wait_until(|| !drawn.lock().unwrap().is_empty()).await;
    assert_eq!(drawn.lock().unwrap()[0], (32, 32, 0));

    // A different tier cannot be hot-swapped into this session.
    let other = selector
        .ensure(RendererDescriptor::for_renderer_id(0))
        .await;
    assert!(matches!(other, Err(VduError::SessionRestartRequired)));
}
