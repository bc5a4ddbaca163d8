//! Typed wrappers over the engine verbs.
//!
//! Each wrapper builds the request, applies the channel's timeout for that
//! verb and checks the response kind.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::conversion::CompressionConfig;
use crate::engine::{
    AccessionMetadata, ConversionPlan, Descriptor, EngineRequest, EngineResponse, MapToken,
    PositionIndex, StreamRole,
};

use super::channel::RpcChannel;
use super::error::RpcError;

/// Unwrap the expected response variant or fail with `UnexpectedResponse`.
macro_rules! expect_response {
    ($response:expr, $tag:expr, $variant:ident) => {
        match $response {
            EngineResponse::$variant(value) => Ok(value),
            other => Err(RpcError::UnexpectedResponse {
                tag: $tag,
                kind: other.kind(),
            }),
        }
    };
}

impl RpcChannel {
    async fn invoke(
        &self,
        request: EngineRequest,
        cancel: &CancellationToken,
    ) -> Result<(EngineResponse, &'static str), RpcError> {
        let tag = request.tag();
        let timeout = self.timeout_for(&request);
        let response = self.call_with(request, cancel, timeout).await?;
        Ok((response, tag))
    }

    /// open-path -> descriptor (`<= 0` means the engine refused)
    pub async fn open_path(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Descriptor, RpcError> {
        let request = EngineRequest::OpenPath {
            path: path.to_path_buf(),
        };
        let (response, tag) = self.invoke(request, cancel).await?;
        expect_response!(response, tag, Descriptor)
    }

    /// open-output -> descriptor for conversion output
    pub async fn open_output(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Descriptor, RpcError> {
        let request = EngineRequest::OpenOutput {
            path: path.to_path_buf(),
        };
        let (response, tag) = self.invoke(request, cancel).await?;
        expect_response!(response, tag, Descriptor)
    }

    /// close-descriptor -> status
    pub async fn close_descriptor(
        &self,
        descriptor: Descriptor,
        cancel: &CancellationToken,
    ) -> Result<i32, RpcError> {
        let (response, tag) = self
            .invoke(EngineRequest::CloseDescriptor { descriptor }, cancel)
            .await?;
        expect_response!(response, tag, Status)
    }

    /// size(path) -> bytes
    pub async fn size(&self, path: &Path, cancel: &CancellationToken) -> Result<u64, RpcError> {
        let request = EngineRequest::Size {
            path: path.to_path_buf(),
        };
        let (response, tag) = self.invoke(request, cancel).await?;
        expect_response!(response, tag, Size)
    }

    /// map(descriptor) -> token
    pub async fn map(
        &self,
        descriptor: Descriptor,
        cancel: &CancellationToken,
    ) -> Result<MapToken, RpcError> {
        let (response, tag) = self.invoke(EngineRequest::Map { descriptor }, cancel).await?;
        expect_response!(response, tag, Map)
    }

    /// classify(descriptor) -> raw type code
    pub async fn classify(
        &self,
        descriptor: Descriptor,
        map: MapToken,
        cancel: &CancellationToken,
    ) -> Result<i64, RpcError> {
        let (response, tag) = self
            .invoke(EngineRequest::Classify { descriptor, map }, cancel)
            .await?;
        expect_response!(response, tag, TypeCode)
    }

    /// metadata(descriptor) -> accession metadata
    pub async fn metadata(
        &self,
        descriptor: Descriptor,
        map: MapToken,
        cancel: &CancellationToken,
    ) -> Result<AccessionMetadata, RpcError> {
        let (response, tag) = self
            .invoke(EngineRequest::Metadata { descriptor, map }, cancel)
            .await?;
        expect_response!(response, tag, Metadata)
    }

    /// positions(descriptor, metadata) -> position index
    pub async fn positions(
        &self,
        descriptor: Descriptor,
        map: MapToken,
        metadata: AccessionMetadata,
        cancel: &CancellationToken,
    ) -> Result<PositionIndex, RpcError> {
        let request = EngineRequest::Positions {
            descriptor,
            map,
            metadata,
        };
        let (response, tag) = self.invoke(request, cancel).await?;
        expect_response!(response, tag, Positions)
    }

    /// decode-range(descriptor, metadata, role, start, end) -> numbers
    #[allow(clippy::too_many_arguments)]
    pub async fn decode_range(
        &self,
        descriptor: Descriptor,
        map: MapToken,
        metadata: AccessionMetadata,
        role: StreamRole,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<f64>, RpcError> {
        let request = EngineRequest::DecodeRange {
            descriptor,
            map,
            metadata,
            role,
            start,
            end,
        };
        let (response, tag) = self.invoke(request, cancel).await?;
        expect_response!(response, tag, Values)
    }

    /// read-range(descriptor, offset, length) -> raw bytes
    pub async fn read_range(
        &self,
        descriptor: Descriptor,
        map: MapToken,
        offset: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<Bytes, RpcError> {
        let request = EngineRequest::ReadRange {
            descriptor,
            map,
            offset,
            length,
        };
        let (response, tag) = self.invoke(request, cancel).await?;
        expect_response!(response, tag, Bytes).map(Bytes::from)
    }

    /// prepare(positions, metadata, config) -> plan
    pub async fn prepare(
        &self,
        positions: Arc<PositionIndex>,
        metadata: AccessionMetadata,
        config: CompressionConfig,
        cancel: &CancellationToken,
    ) -> Result<ConversionPlan, RpcError> {
        let request = EngineRequest::Prepare {
            positions,
            metadata,
            config,
        };
        let (response, tag) = self.invoke(request, cancel).await?;
        expect_response!(response, tag, Plan)
    }

    /// compress(descriptor, metadata, plan, output, config) -> status
    #[allow(clippy::too_many_arguments)]
    pub async fn compress(
        &self,
        descriptor: Descriptor,
        map: MapToken,
        metadata: Option<AccessionMetadata>,
        plan: Option<ConversionPlan>,
        output: Descriptor,
        config: CompressionConfig,
        cancel: &CancellationToken,
    ) -> Result<i32, RpcError> {
        let request = EngineRequest::Compress {
            descriptor,
            map,
            metadata,
            plan,
            output,
            config,
        };
        let (response, tag) = self.invoke(request, cancel).await?;
        expect_response!(response, tag, Status)
    }

    /// decompress(descriptor, output, config) -> status
    pub async fn decompress(
        &self,
        descriptor: Descriptor,
        map: MapToken,
        output: Descriptor,
        config: CompressionConfig,
        cancel: &CancellationToken,
    ) -> Result<i32, RpcError> {
        let request = EngineRequest::Decompress {
            descriptor,
            map,
            output,
            config,
        };
        let (response, tag) = self.invoke(request, cancel).await?;
        expect_response!(response, tag, Status)
    }

    /// thread-count() -> int
    pub async fn thread_count(&self, cancel: &CancellationToken) -> Result<usize, RpcError> {
        let (response, tag) = self.invoke(EngineRequest::ThreadCount, cancel).await?;
        expect_response!(response, tag, ThreadCount)
    }

    /// codec-version() -> string
    pub async fn codec_version(&self, cancel: &CancellationToken) -> Result<String, RpcError> {
        let (response, tag) = self.invoke(EngineRequest::CodecVersion, cancel).await?;
        expect_response!(response, tag, Version)
    }
}
