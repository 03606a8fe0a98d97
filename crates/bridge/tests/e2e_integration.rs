//! End-to-end integration tests for docbridge.
//!
//! These tests run the bridge on a temporary Unix socket with the local
//! content host and drive it through the IPC client:
//! - Picking documents through a channel-backed picker surface
//! - Metadata resolution
//! - Full and ranged reads
//! - Surface teardown while a pick is pending

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bridge::config::PickerConfig;
use bridge::host::local::LocalContentHost;
use bridge::host::surface::ChannelSurface;
use bridge::host::{PickedData, PickerCompletion, PickerRequest};
use bridge::ipc::{IpcClient, IpcError, IpcServer};
use bridge::{Dispatcher, SelectionSession, SelectionState};
use protocol::{ByteRange, DocumentHandle, FailureKind, MethodCall, Response};
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

struct TestBridge {
    dir: TempDir,
    socket_path: PathBuf,
    host: Arc<LocalContentHost>,
    session: Arc<SelectionSession>,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<std::io::Result<()>>,
}

impl TestBridge {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("run").join("bridge.sock");

        let host = Arc::new(LocalContentHost::new());
        let session = Arc::new(SelectionSession::new(PickerConfig::default()));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&host), Arc::clone(&session)));

        let server = IpcServer::bind(&socket_path).await.unwrap();
        let (shutdown, stop) = oneshot::channel::<()>();
        let server = tokio::spawn(server.serve(dispatcher, async move {
            let _ = stop.await;
        }));

        Self {
            dir,
            socket_path,
            host,
            session,
            shutdown: Some(shutdown),
            server,
        }
    }

    fn write_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn register(&self, name: &str, content: &[u8]) -> DocumentHandle {
        let path = self.write_file(name, content);
        self.host.register(path).unwrap()
    }

    async fn client(&self) -> IpcClient {
        IpcClient::connect(&self.socket_path).await.unwrap()
    }

    /// Attach a surface whose requests are answered with `answer`.
    fn attach_scripted_picker(
        &self,
        answer: impl Fn(&PickerRequest) -> PickerCompletion + Send + 'static,
    ) -> mpsc::UnboundedReceiver<PickerRequest> {
        let (surface, mut requests) = ChannelSurface::new();
        self.session.attach_surface(Arc::new(surface));

        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let completion = answer(&request);
                let _ = seen_tx.send(request);
                session.deliver(completion);
            }
        });
        seen_rx
    }

    async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.server.await.unwrap().unwrap();
        assert!(!self.socket_path.exists());
    }
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

// =============================================================================
// Picker Tests
// =============================================================================

#[tokio::test]
async fn test_pick_three_documents() {
    let bridge = TestBridge::start().await;
    let picked = vec![
        bridge.register("one.txt", b"1"),
        bridge.register("two.txt", b"22"),
        bridge.register("three.txt", b"333"),
    ];

    let answer = picked.clone();
    let mut seen = bridge.attach_scripted_picker(move |request| {
        PickerCompletion::confirmed(request.request_code, PickedData::multiple(answer.clone()))
    });

    let mut client = bridge.client().await;
    let handles = client.pick_documents(Some(true)).await.unwrap();
    assert_eq!(handles, picked);

    let request = seen.recv().await.unwrap();
    assert!(request.allow_multiple);
    assert_eq!(request.mime_filter, "*/*");

    bridge.stop().await;
}

#[tokio::test]
async fn test_pick_cancelled_is_empty_success() {
    let bridge = TestBridge::start().await;
    let _seen =
        bridge.attach_scripted_picker(|request| PickerCompletion::cancelled(request.request_code));

    let mut client = bridge.client().await;
    let response = client.call(MethodCall::pick_documents(None)).await.unwrap();
    assert_eq!(
        response,
        Response::Success(protocol::Payload::Handles(Vec::new()))
    );

    bridge.stop().await;
}

#[tokio::test]
async fn test_pick_survives_surface_recreation() {
    let bridge = TestBridge::start().await;
    let picked = vec![
        bridge.register("a.txt", b"a"),
        bridge.register("b.txt", b"b"),
        bridge.register("c.txt", b"c"),
    ];

    // The first surface accepts the request, then goes away without answering.
    let (first_surface, mut first_requests) = ChannelSurface::new();
    bridge.session.attach_surface(Arc::new(first_surface));

    let socket_path = bridge.socket_path.clone();
    let pick = tokio::spawn(async move {
        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        client.pick_documents(Some(true)).await
    });

    let request = first_requests.recv().await.unwrap();
    bridge.session.detach_surface();
    drop(first_requests);
    assert_eq!(bridge.session.state(), SelectionState::AwaitingHostPicker);

    // A recreated surface is attached; the host then delivers the answer.
    let (second_surface, mut second_requests) = ChannelSurface::new();
    bridge.session.attach_surface(Arc::new(second_surface));
    assert!(second_requests.try_recv().is_err());

    assert!(bridge.session.deliver(PickerCompletion::confirmed(
        request.request_code,
        PickedData::multiple(picked.clone()),
    )));
    assert_eq!(pick.await.unwrap().unwrap(), picked);

    // Nothing is left to fulfill.
    assert!(bridge
        .session
        .deliver(PickerCompletion::cancelled(request.request_code)));
    assert_eq!(bridge.session.state(), SelectionState::Idle);

    bridge.stop().await;
}

#[tokio::test]
async fn test_second_pick_rejected_while_pending() {
    let bridge = TestBridge::start().await;
    let (surface, mut requests) = ChannelSurface::new();
    bridge.session.attach_surface(Arc::new(surface));

    let socket_path = bridge.socket_path.clone();
    let first = tokio::spawn(async move {
        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        client.pick_documents(None).await
    });
    let request = requests.recv().await.unwrap();

    let mut second = bridge.client().await;
    match second.pick_documents(None).await {
        Err(IpcError::Failure(failure)) => assert_eq!(failure.kind, FailureKind::AlreadyPending),
        other => panic!("unexpected result: {other:?}"),
    }

    bridge
        .session
        .deliver(PickerCompletion::cancelled(request.request_code));
    assert!(first.await.unwrap().unwrap().is_empty());

    bridge.stop().await;
}

#[tokio::test]
async fn test_disconnected_picker_caller_frees_the_slot() {
    let bridge = TestBridge::start().await;
    let (surface, mut requests) = ChannelSurface::new();
    bridge.session.attach_surface(Arc::new(surface));

    {
        let mut client = bridge.client().await;
        let _ = tokio::time::timeout(
            Duration::from_millis(200),
            client.pick_documents(None),
        )
        .await;
    }
    let _ = requests.recv().await.unwrap();

    // The abandoned call is aborted once its connection closes, and the
    // picker still on screen is handed to the next caller.
    let mut attempts = 0;
    let ticket = loop {
        match bridge.session.begin(None) {
            Ok(ticket) => break ticket,
            Err(e) => {
                assert_eq!(e.kind(), FailureKind::AlreadyPending);
                attempts += 1;
                assert!(attempts < 20, "slot was never released");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    };
    assert!(requests.try_recv().is_err());

    let picked = vec![bridge.register("late.txt", b"late")];
    assert!(bridge.session.deliver(PickerCompletion::confirmed(
        bridge.session.request_code(),
        PickedData::multiple(picked.clone()),
    )));
    assert_eq!(ticket.wait().await.unwrap(), picked);

    bridge.stop().await;
}

// =============================================================================
// Metadata and Read Tests
// =============================================================================

#[tokio::test]
async fn test_metadata_and_reads() {
    let bridge = TestBridge::start().await;
    let content = sample(1024);
    let handle = bridge.register("report.pdf", &content);
    let mut client = bridge.client().await;

    let metadata = client.get_metadata(&handle).await.unwrap();
    assert_eq!(metadata.name, "report.pdf");
    assert_eq!(metadata.size_bytes, 1024);

    let all = client.read_all(&handle).await.unwrap();
    assert_eq!(all, content);

    let ranged = client
        .read_range(&handle, ByteRange::new(0, metadata.size_bytes as u32))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ranged, all);

    let tail = client
        .read_range(&handle, ByteRange::new(512, 512))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tail.len(), 512);
    assert_eq!(tail, &content[512..]);

    let past_end = client
        .read_range(&handle, ByteRange::new(1024, 100))
        .await
        .unwrap();
    assert!(past_end.is_none());

    bridge.stop().await;
}

#[tokio::test]
async fn test_chunked_download_reconstructs_content() {
    let bridge = TestBridge::start().await;
    let content = sample(100_000);
    let handle = bridge.register("large.bin", &content);

    let chunk_size = 8192u32;
    let mut tasks = Vec::new();
    for index in 0..(content.len() as u64).div_ceil(u64::from(chunk_size)) {
        let socket_path = bridge.socket_path.clone();
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let mut client = IpcClient::connect(&socket_path).await.unwrap();
            let offset = index * u64::from(chunk_size);
            let chunk = client
                .read_range(&handle, ByteRange::new(offset, chunk_size))
                .await
                .unwrap()
                .unwrap();
            (offset, chunk)
        }));
    }

    let mut chunks = Vec::new();
    for task in tasks {
        chunks.push(task.await.unwrap());
    }
    chunks.sort_by_key(|(offset, _)| *offset);
    let rebuilt: Vec<u8> = chunks.into_iter().flat_map(|(_, chunk)| chunk).collect();
    assert_eq!(rebuilt, content);

    bridge.stop().await;
}

#[tokio::test]
async fn test_failures_are_reported_per_call() {
    let bridge = TestBridge::start().await;
    let handle = bridge.register("gone.txt", b"soon deleted");
    fs::remove_file(bridge.dir.path().join("gone.txt")).unwrap();
    let mut client = bridge.client().await;

    let missing = client
        .call(MethodCall::new(protocol::Method::ReadAll))
        .await
        .unwrap();
    assert_eq!(
        missing.into_result().unwrap_err().kind,
        FailureKind::MissingHandle
    );

    let metadata = client.call(MethodCall::get_metadata(&handle)).await.unwrap();
    assert_eq!(
        metadata.into_result().unwrap_err().kind,
        FailureKind::QueryFailed
    );

    let read_all = client.call(MethodCall::read_all(&handle)).await.unwrap();
    assert_eq!(
        read_all.into_result().unwrap_err().kind,
        FailureKind::ReadFailed
    );

    let read_range = client
        .call(MethodCall::read_range(&handle, ByteRange::new(0, 4)))
        .await
        .unwrap();
    assert_eq!(
        read_range.into_result().unwrap_err().kind,
        FailureKind::StreamError
    );

    // The connection is still usable afterwards.
    let unknown = client.call(MethodCall::named("readChunk")).await.unwrap();
    assert_eq!(
        unknown.into_result().unwrap_err().kind,
        FailureKind::NotImplemented
    );

    bridge.stop().await;
}
