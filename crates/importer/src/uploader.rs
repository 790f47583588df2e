use crate::{ImportError, ImportResult};
use api_shared::auth::{TokenInterceptor, TokenIssuer};
use api_shared::pb::{
    ark_api_client::ArkApiClient, upload_file_request::File, Chunk, Metadata, UploadFileRequest,
};
use ark_files::MediaCandidate;
use std::time::SystemTime;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint};

/// Size of each content frame sent to the server.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Frames buffered between the file reader and the outgoing stream.
const FRAME_BUFFER: usize = 4;

/// Sends one candidate to the archive.
#[tonic::async_trait]
pub trait Uploader: Send + Sync + 'static {
    /// Uploads `candidate`, giving up with [`ImportError::Cancelled`] once `cancel` fires.
    async fn upload(
        &self,
        candidate: &MediaCandidate,
        cancel: &CancellationToken,
    ) -> ImportResult<()>;
}

type AuthedClient = ArkApiClient<InterceptedService<Channel, TokenInterceptor>>;

/// [`Uploader`] streaming to an Ark server over gRPC.
#[derive(Clone)]
pub struct GrpcUploader {
    client: AuthedClient,
}

impl GrpcUploader {
    /// Connects to `url` (e.g. `http://localhost:9999`) and signs calls with `issuer`.
    pub async fn connect(url: &str, issuer: &TokenIssuer) -> ImportResult<Self> {
        let channel = Endpoint::from_shared(url.to_string())
            .map_err(|e| ImportError::InvalidAddress(format!("{}: {}", url, e)))?
            .connect()
            .await?;
        Ok(Self::new(channel, TokenInterceptor::new(issuer)?))
    }

    pub fn new(channel: Channel, interceptor: TokenInterceptor) -> Self {
        Self {
            client: ArkApiClient::with_interceptor(channel, interceptor),
        }
    }
}

#[tonic::async_trait]
impl Uploader for GrpcUploader {
    async fn upload(
        &self,
        candidate: &MediaCandidate,
        cancel: &CancellationToken,
    ) -> ImportResult<()> {
        let path = &candidate.path;
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ImportError::io(path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| ImportError::io(path, e))?
            .len();

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let _ = tx.send(metadata_request(candidate, size)).await;
        let reader = tokio::spawn(send_chunks(file, tx));

        let mut client = self.client.clone();
        let result = tokio::select! {
            res = client.upload_file(ReceiverStream::new(rx)) => res
                .map(|_| ())
                .map_err(|status| ImportError::Upload { path: path.clone(), status }),
            _ = cancel.cancelled() => Err(ImportError::Cancelled),
        };

        match reader.await {
            Ok(Ok(())) => result,
            Ok(Err(e)) if !matches!(result, Err(ImportError::Cancelled)) => {
                Err(ImportError::io(path, e))
            }
            Ok(Err(_)) => result,
            Err(e) => Err(ImportError::Task(e.to_string())),
        }
    }
}

fn metadata_request(candidate: &MediaCandidate, size: u64) -> UploadFileRequest {
    let name = candidate
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| candidate.path.to_string_lossy().into_owned());

    UploadFileRequest {
        file: Some(File::Metadata(Metadata {
            hash: candidate.hash.as_bytes().to_vec(),
            name,
            size: size as i64,
            created_at: Some(prost_types::Timestamp::from(SystemTime::from(
                candidate.modified_at,
            ))),
        })),
    }
}

/// Reads `file` in [`CHUNK_SIZE`] pieces into `tx` until EOF or until the call hangs up.
async fn send_chunks(
    mut file: tokio::fs::File,
    tx: mpsc::Sender<UploadFileRequest>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let chunk = UploadFileRequest {
            file: Some(File::Chunk(Chunk {
                data: buf[..n].to_vec(),
            })),
        };
        if tx.send(chunk).await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_files::MediaCandidate;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    #[test]
    fn test_metadata_request_sends_base_name_and_mtime() {
        let candidate = MediaCandidate {
            path: PathBuf::from("/media/card/DCIM/IMG_0001.CR2"),
            hash: sample_hash(),
            size: 10,
            modified_at: Utc.with_ymd_and_hms(2023, 6, 15, 10, 20, 30).unwrap(),
        };

        let request = metadata_request(&candidate, 12);
        let Some(File::Metadata(metadata)) = request.file else {
            panic!("expected metadata");
        };
        assert_eq!(metadata.name, "IMG_0001.CR2");
        assert_eq!(metadata.size, 12);
        assert_eq!(metadata.hash, candidate.hash.as_bytes().to_vec());
        assert_eq!(
            metadata.created_at,
            Some(prost_types::Timestamp {
                seconds: 1_686_824_430,
                nanos: 0
            })
        );
    }

    #[tokio::test]
    async fn test_send_chunks_splits_at_chunk_size() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let content = vec![7u8; CHUNK_SIZE + 10];
        std::fs::write(temp.path(), &content).unwrap();

        let file = tokio::fs::File::open(temp.path()).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        send_chunks(file, tx).await.unwrap();

        let mut sizes = Vec::new();
        while let Some(req) = rx.recv().await {
            match req.file {
                Some(File::Chunk(chunk)) => sizes.push(chunk.data.len()),
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(sizes.iter().sum::<usize>(), content.len());
        assert!(sizes.iter().all(|&s| s <= CHUNK_SIZE));
    }

    fn sample_hash() -> ark_hash::ContentHash {
        ark_hash::ContentHasher::new().hash_bytes(b"raw")
    }
}
