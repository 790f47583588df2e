// Re-export the proto module from the shared `api-shared` crate so callers
// can reference `api_grpc::service::pb`.
pub use api_shared::pb;

use api_shared::pb::{
    ark_api_server::ArkApi, upload_file_request::File, HealthRes, UploadFileRequest,
    UploadFileResponse,
};
use api_shared::HealthService;
use ark_core::{IngestError, IngestResult, IngestService, UploadFrame, UploadMetadata};
use chrono::{DateTime, Utc};
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status, Streaming};

/// gRPC front of the ingest pipeline.
#[derive(Clone)]
pub struct ArkService {
    ingest: IngestService,
}

impl ArkService {
    pub fn new(ingest: IngestService) -> Self {
        Self { ingest }
    }
}

#[tonic::async_trait]
impl ArkApi for ArkService {
    async fn health(&self, _req: Request<()>) -> Result<Response<HealthRes>, Status> {
        Ok(Response::new(HealthService::check_health()))
    }

    async fn upload_file(
        &self,
        req: Request<Streaming<UploadFileRequest>>,
    ) -> Result<Response<UploadFileResponse>, Status> {
        let frames = req.into_inner().map(|msg| match msg {
            Ok(msg) => to_frame(msg),
            Err(status) => Err(IngestError::Transport(status.to_string())),
        });

        self.ingest.ingest(frames).await?;
        Ok(Response::new(UploadFileResponse {}))
    }
}

/// Maps a wire message onto an [`UploadFrame`].
pub fn to_frame(msg: UploadFileRequest) -> IngestResult<UploadFrame> {
    match msg.file {
        Some(File::Metadata(metadata)) => Ok(UploadFrame::Metadata(UploadMetadata {
            hash: metadata.hash,
            name: metadata.name,
            size: metadata.size,
            created_at: metadata.created_at.map(to_utc).transpose()?,
        })),
        Some(File::Chunk(chunk)) => Ok(UploadFrame::Chunk(chunk.data)),
        None => Err(IngestError::InvalidFrame(
            "message carries neither metadata nor chunk".into(),
        )),
    }
}

fn to_utc(ts: prost_types::Timestamp) -> IngestResult<DateTime<Utc>> {
    u32::try_from(ts.nanos)
        .ok()
        .and_then(|nanos| DateTime::from_timestamp(ts.seconds, nanos))
        .ok_or_else(|| IngestError::InvalidMetadata(format!("created_at out of range: {}", ts)))
}
