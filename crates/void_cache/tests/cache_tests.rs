//! Integration tests for void_cache

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use void_cache::*;
use void_core::{EntityId, NativeHandle};

fn id(raw: u64) -> EntityId {
    EntityId::new(raw).unwrap()
}

fn bytes_decoder() -> DecoderRegistry {
    const EXT: &[&str] = &["bin"];
    DecoderRegistry::new().with(FnDecoder::new(EXT, |ctx| Ok(NativeHandle::new(ctx.bytes.to_vec()))))
}

/// Serve canned responses, one per connection, counting requests
async fn serve(responses: Vec<&'static [u8]>) -> (String, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response).await;
            let _ = socket.shutdown().await;
        }
    });
    (format!("http://{}", addr), hits)
}

#[test]
fn test_concurrent_requests_fetch_once() {
    let mut cache = ResourceCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let received: Rc<RefCell<Vec<NativeHandle>>> = Rc::new(RefCell::new(Vec::new()));

    let mut statuses = Vec::new();
    for raw in 1..=3 {
        let calls = calls.clone();
        let r = received.clone();
        let requested = cache
            .request(
                CacheRequest::new("http://h/a.bin", move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async { Ok(NativeHandle::new(vec![7u8])) })
                })
                .referrer(id(raw))
                .on_success(move |v| r.borrow_mut().push(v)),
            )
            .unwrap();
        statuses.push(requested.status);
    }
    assert_eq!(
        statuses,
        vec![RequestStatus::Started, RequestStatus::Joined, RequestStatus::Joined]
    );

    cache.process();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let received = received.borrow();
    assert_eq!(received.len(), 3);
    assert!(received.iter().all(|v| v.ptr_eq(&received[0])));
}

#[test]
fn test_fan_out_in_enqueue_order() {
    let mut cache = ResourceCache::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    for n in 0..4 {
        let o = order.clone();
        cache
            .request(
                CacheRequest::new("http://h/b.bin", |_| Box::pin(async { Ok(NativeHandle::new(())) }))
                    .on_success(move |_| o.borrow_mut().push(n)),
            )
            .unwrap();
    }
    cache.process();
    assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_http_fetch_and_decode() {
    let (base, hits) = serve(vec![b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc"]).await;
    let fetcher = HttpFetcher::new(Duration::from_secs(5));
    let bytes = fetcher.fetch(&format!("{}/x.bin", base), Some("Bearer t")).await.unwrap();
    assert_eq!(bytes, b"abc");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_http_unauthorized_maps_to_expiry() {
    let (base, _) = serve(vec![b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n"]).await;
    let err = HttpFetcher::default()
        .fetch(&format!("{}/x.bin", base), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::AuthorizationExpired(_)));
}

#[tokio::test]
async fn test_https_is_rejected() {
    let err = HttpFetcher::default().fetch("https://h/x.bin", None).await.unwrap_err();
    assert_eq!(err, TransportError::UnsupportedScheme("https".into()));
}

#[test]
fn test_runtime_executor_retries_expired_authorization() {
    let _ = env_logger::builder().is_test(true).try_init();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let (base, hits) = rt.block_on(serve(vec![
        b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n",
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
    ]));

    let pipeline = AssetPipeline::new(bytes_decoder()).with_authorization("Bearer old");
    let mut cache = ResourceCache::new()
        .with_runtime(rt.handle().clone())
        .with_retry_policy(AuthExpiryRetry::new(2));

    let url = format!("{}/asset.bin", base);
    let got = Rc::new(RefCell::new(None));
    let g = got.clone();
    let requested = cache
        .request(
            CacheRequest::new(url.clone(), pipeline.fetch_fn(&url, "bin", None))
                .on_success(move |v| *g.borrow_mut() = v.downcast_ref::<Vec<u8>>().cloned()),
        )
        .unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while cache.state(&requested.key) == EntryState::Loading && std::time::Instant::now() < deadline {
        cache.process();
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(got.borrow().as_deref(), Some(&b"ok"[..]));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().retries, 1);
}

#[test]
fn test_library_manifest_persistence_and_lookup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("chair.bin"), b"chair").unwrap();

    let manifest = LibraryManifest {
        key: "props".into(),
        path: dir.path().to_string_lossy().into_owned(),
        date: "2024-06-01T00:00:00Z".into(),
        date_format: String::new(),
        culture: String::new(),
        files: vec![LibraryFile {
            url: "https://cdn.example/props/chair.bin".into(),
            local_path: "chair.bin".into(),
            relative_path: "models/chair.bin".into(),
        }],
    };
    let manifest_path = dir.path().join("manifests").join("props.json");
    manifest.save(&manifest_path).unwrap();
    let loaded = LibraryManifest::load(&manifest_path).unwrap();
    assert_eq!(loaded, manifest);
    assert!(loaded.is_up_to_date("2024-05-01T00:00:00Z"));
    assert!(!loaded.is_up_to_date("2024-07-01T00:00:00Z"));

    let mut cache = ResourceCache::new();
    cache.add_library(&loaded);
    let key = cache.resolve_key("http://cdn.example/props/chair.bin", None).unwrap();
    assert!(key.is_library());
    let local = cache.local_path(&key).map(|p| p.to_path_buf());
    assert_eq!(local, Some(dir.path().join("chair.bin")));

    let pipeline = AssetPipeline::new(bytes_decoder());
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut cache = cache.with_runtime(rt.handle().clone());
    let got = Rc::new(RefCell::new(None));
    let g = got.clone();
    cache
        .request(
            CacheRequest::new("models/chair.bin", pipeline.fetch_fn("models/chair.bin", "bin", local))
                .library("props")
                .on_success(move |v| *g.borrow_mut() = v.downcast_ref::<Vec<u8>>().cloned()),
        )
        .unwrap();
    // A current-thread runtime only makes progress while something blocks on it
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while got.borrow().is_none() && std::time::Instant::now() < deadline {
        rt.block_on(async { tokio::time::sleep(Duration::from_millis(5)).await });
        cache.process();
    }
    assert_eq!(got.borrow().as_deref(), Some(&b"chair"[..]));
}
