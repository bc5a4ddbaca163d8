use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::controlled_vocabulary::AccessionTag;
use crate::engine::{
    AccessionMetadata, Descriptor, Engine, EngineFault, EngineRequest, EngineResponse, MapToken,
    StreamRole,
};

/// Echoes decode arguments back after a delay that shrinks with `start`,
/// so later-dispatched calls reply first.
struct EchoEngine {
    handled: AtomicUsize,
}

impl Engine for EchoEngine {
    fn handle(&self, request: EngineRequest) -> Result<EngineResponse, EngineFault> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        match request {
            EngineRequest::DecodeRange { start, end, .. } => {
                thread::sleep(Duration::from_millis(200u64.saturating_sub(start * 40)));
                Ok(EngineResponse::Values(vec![start as f64, end as f64]))
            }
            EngineRequest::Size { path } if path.to_string_lossy().contains("slow") => {
                thread::sleep(Duration::from_millis(300));
                Ok(EngineResponse::Size(1))
            }
            EngineRequest::Size { path } => Ok(EngineResponse::Size(path.as_os_str().len() as u64)),
            EngineRequest::Map { .. } => Err(EngineFault::new("mapping refused")),
            EngineRequest::Classify { .. } => panic!("classifier exploded"),
            EngineRequest::ThreadCount => Ok(EngineResponse::Version("wrong kind".into())),
            _ => Ok(EngineResponse::Status(0)),
        }
    }
}

fn channel(workers: usize) -> RpcChannel {
    let engine = EchoEngine {
        handled: AtomicUsize::new(0),
    };
    RpcChannel::spawn(Arc::new(engine), RpcConfig::default().with_workers(workers)).unwrap()
}

fn metadata() -> AccessionMetadata {
    AccessionMetadata::new(
        AccessionTag::Float64,
        AccessionTag::Float32,
        AccessionTag::NoCompression,
        4,
    )
}

#[tokio::test]
async fn test_same_tag_concurrent_calls_resolve_by_id() {
    let rpc = channel(4);
    let cancel = CancellationToken::new();

    // Four decode calls share one operation tag; replies arrive in reverse
    // dispatch order.
    let calls = (0..4u64).map(|start| {
        let rpc = rpc.clone();
        let cancel = cancel.clone();
        async move {
            rpc.decode_range(
                Descriptor(3),
                MapToken(1),
                metadata(),
                StreamRole::Mz,
                start,
                start + 100,
                &cancel,
            )
            .await
        }
    });
    let results = futures::future::join_all(calls).await;

    for (start, result) in results.into_iter().enumerate() {
        let values = result.unwrap();
        assert_eq!(values, vec![start as f64, start as f64 + 100.0]);
    }
    assert_eq!(rpc.pending_count(), 0);
}

#[tokio::test]
async fn test_engine_fault_is_reported_with_tag() {
    let rpc = channel(1);
    let err = rpc
        .map(Descriptor(3), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RpcError::Engine {
            tag: "map",
            fault: EngineFault::new("mapping refused")
        }
    );
}

#[tokio::test]
async fn test_engine_panic_becomes_fault_and_worker_survives() {
    let rpc = channel(1);
    let cancel = CancellationToken::new();
    let err = rpc.classify(Descriptor(3), MapToken(1), &cancel).await.unwrap_err();
    assert!(matches!(err, RpcError::Engine { tag: "classify", .. }));

    // The single worker is still serving requests.
    let size = rpc.size(std::path::Path::new("abc"), &cancel).await.unwrap();
    assert_eq!(size, 3);
}

#[tokio::test]
async fn test_unexpected_response_kind() {
    let rpc = channel(1);
    let err = rpc.thread_count(&CancellationToken::new()).await.unwrap_err();
    assert_eq!(
        err,
        RpcError::UnexpectedResponse {
            tag: "thread_count",
            kind: "version"
        }
    );
}

#[tokio::test]
async fn test_timeout_removes_pending_entry() {
    let rpc = channel(1);
    let request = EngineRequest::Size {
        path: "slow".into(),
    };
    let err = rpc
        .call_with(request, &CancellationToken::new(), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout { tag: "size", .. }));
    assert_eq!(rpc.pending_count(), 0);

    // The late reply is discarded and the channel keeps working.
    tokio::time::sleep(Duration::from_millis(350)).await;
    let size = rpc
        .size(std::path::Path::new("ab"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(size, 2);
}

#[tokio::test]
async fn test_cancellation() {
    let rpc = channel(1);
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = rpc
        .size(std::path::Path::new("slow"), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, RpcError::Cancelled { tag: "size" });
    assert_eq!(rpc.pending_count(), 0);

    // Already-cancelled tokens fail without dispatching.
    let err = rpc.codec_version(&cancel).await.unwrap_err();
    assert_eq!(err, RpcError::Cancelled { tag: "codec_version" });
}

#[tokio::test]
async fn test_calls_after_shutdown_fail() {
    let rpc = channel(2);
    rpc.shutdown();
    assert!(!rpc.is_open());
    let err = rpc
        .size(std::path::Path::new("x"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, RpcError::ChannelClosed);
    assert!(rpc.post(EngineRequest::ThreadCount).is_err());
}

#[tokio::test]
async fn test_post_does_not_leave_pending_entries() {
    let engine = Arc::new(EchoEngine {
        handled: AtomicUsize::new(0),
    });
    let rpc = RpcChannel::spawn(engine.clone(), RpcConfig::default().with_workers(1)).unwrap();
    rpc.post(EngineRequest::CloseDescriptor {
        descriptor: Descriptor(9),
    })
    .unwrap();
    rpc.shutdown();
    assert_eq!(engine.handled.load(Ordering::SeqCst), 1);
    assert_eq!(rpc.pending_count(), 0);
}

#[test]
fn test_conversion_verbs_use_conversion_timeout() {
    let rpc = RpcChannel::spawn(
        Arc::new(EchoEngine {
            handled: AtomicUsize::new(0),
        }),
        RpcConfig::default()
            .with_workers(1)
            .with_call_timeout(Duration::from_secs(5))
            .with_conversion_timeout(Duration::from_secs(500)),
    )
    .unwrap();
    let decompress = EngineRequest::Decompress {
        descriptor: Descriptor(3),
        map: MapToken(1),
        output: Descriptor(4),
        config: crate::conversion::CompressionConfig::default(),
    };
    assert_eq!(rpc.timeout_for(&decompress), Duration::from_secs(500));
    assert_eq!(rpc.timeout_for(&EngineRequest::ThreadCount), Duration::from_secs(5));
    rpc.shutdown();
}
