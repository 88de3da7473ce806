//! Chunked file upload over the `Reverse/Stream` call.
//!
//! Message sequence per file:
//! ```text
//! Args["meta"]  = StringMap{filename, phase: "start"}
//! Args["chunk"] = FileChunk{name, data}      × ⌈size / chunk_size⌉
//! Args["meta"]  = StringMap{filename, phase: "end"}
//! ```
//! Every message is a copy of the template envelope (module, internal
//! request, session fields) with exactly one of the two keys set. After the
//! last file the sender is dropped, which closes the request stream.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::Multipart;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::proto::{pack, FileChunk, Request, StringMap, FILE_CHUNK_TYPE_URL, STRING_MAP_TYPE_URL};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

pub const META_KEY: &str = "meta";
pub const CHUNK_KEY: &str = "chunk";

/// Where the uploaded bytes come from.
pub enum UploadSource {
    /// Whole body is one file.
    Single { filename: String, body: Body },
    /// Every part with a filename is one file.
    Multipart(Multipart),
}

impl std::fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadSource::Single { filename, .. } => {
                f.debug_struct("Single").field("filename", filename).finish_non_exhaustive()
            }
            UploadSource::Multipart(_) => f.write_str("Multipart"),
        }
    }
}

/// What one upload moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub files: usize,
    pub bytes: u64,
    /// Responses the backend streamed back.
    pub responses: usize,
}

/// Writes the marker/chunk sequence into the request stream.
pub struct UploadEncoder<'a> {
    template: &'a Request,
    tx: mpsc::Sender<Request>,
    chunk_size: usize,
}

impl<'a> UploadEncoder<'a> {
    pub fn new(template: &'a Request, tx: mpsc::Sender<Request>, chunk_size: usize) -> Self {
        Self {
            template,
            tx,
            chunk_size: chunk_size.max(1),
        }
    }

    async fn send(&self, key: &str, value: prost_types::Any) -> Result<(), GatewayError> {
        let mut message = self.template.clone();
        message.args = HashMap::from([(key.to_string(), value)]);
        self.tx
            .send(message)
            .await
            .map_err(|_| GatewayError::Protocol("upload stream closed by backend".into()))
    }

    async fn marker(&self, filename: &str, phase: &str) -> Result<(), GatewayError> {
        let meta = StringMap {
            entries: HashMap::from([
                ("filename".to_string(), filename.to_string()),
                ("phase".to_string(), phase.to_string()),
            ]),
        };
        self.send(META_KEY, pack(STRING_MAP_TYPE_URL, &meta)).await
    }

    async fn chunk(&self, filename: &str, data: Bytes) -> Result<(), GatewayError> {
        let chunk = FileChunk {
            name: filename.to_string(),
            data,
        };
        self.send(CHUNK_KEY, pack(FILE_CHUNK_TYPE_URL, &chunk)).await
    }

    /// Send one file: start marker, fixed-size chunks, end marker.
    ///
    /// Returns the number of bytes sent.
    pub async fn send_file<S, E>(&self, filename: &str, data: S) -> Result<u64, GatewayError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut data = std::pin::pin!(data);
        self.marker(filename, "start").await?;

        let mut total = 0u64;
        let mut buffer = BytesMut::with_capacity(self.chunk_size);
        while let Some(frame) = data.next().await {
            let mut frame = frame.map_err(|e| {
                tracing::error!(filename, error = %e, "reading upload body failed");
                GatewayError::Protocol(format!("reading {filename}: {e}"))
            })?;
            total += frame.len() as u64;

            while !frame.is_empty() {
                if buffer.is_empty() && frame.len() >= self.chunk_size {
                    let piece = frame.split_to(self.chunk_size);
                    self.chunk(filename, piece).await?;
                    continue;
                }
                let take = (self.chunk_size - buffer.len()).min(frame.len());
                buffer.extend_from_slice(&frame.split_to(take));
                if buffer.len() == self.chunk_size {
                    self.chunk(filename, buffer.split().freeze()).await?;
                }
            }
        }
        if !buffer.is_empty() {
            self.chunk(filename, buffer.freeze()).await?;
        }

        self.marker(filename, "end").await?;
        tracing::debug!(filename, bytes = total, "file streamed");
        Ok(total)
    }

    /// Stream every file of `source`. Returns `(files, bytes)`.
    pub async fn send_source(&self, source: UploadSource) -> Result<(usize, u64), GatewayError> {
        match source {
            UploadSource::Single { filename, body } => {
                let bytes = self.send_file(&filename, body.into_data_stream()).await?;
                Ok((1, bytes))
            }
            UploadSource::Multipart(mut multipart) => {
                let mut files = 0;
                let mut bytes = 0;
                loop {
                    let field = multipart.next_field().await.map_err(|e| {
                        tracing::error!(error = %e, "reading multipart upload failed");
                        GatewayError::Protocol(format!("multipart: {e}"))
                    })?;
                    let Some(field) = field else { break };
                    let Some(filename) = field.file_name().map(str::to_string) else {
                        tracing::debug!(part = ?field.name(), "skipping multipart part without filename");
                        continue;
                    };
                    bytes += self.send_file(&filename, field).await?;
                    files += 1;
                }
                Ok((files, bytes))
            }
        }
    }
}
