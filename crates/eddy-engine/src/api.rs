//! Client-facing requests and responses, and the per-connection [`Agent`].
//!
//! Requests and responses are JSON objects, one per line. Byte payloads are
//! base64 encoded.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use eddy_catalog::CatalogError;
use eddy_checksum::{ChecksumRequest, ChecksumResponse};
use eddy_types::{
    DataObject, ErrorCode, Principal, ReplicaNumber, ReplicaStatus, ReplicaToken,
    VerificationResult,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::{CloseRequest, Coordinator, OpenRequest};
use crate::error::EngineError;
use crate::handle::HandleId;
use crate::replicate::{ReplicateOutcome, ReplicateRequest};
use crate::session::Session;

/// One client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Open(OpenRequest),
    Write { handle: HandleId, data: String },
    Read { handle: HandleId },
    Close(CloseRequest),
    Checksum(ChecksumRequest),
    Replicate(ReplicateRequest),
    /// The catalog record of a data object.
    Stat { path: String },
    /// Logical paths under a prefix.
    List { prefix: String },
}

/// The answer to one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Opened {
        handle: HandleId,
        replica: ReplicaNumber,
        token: Option<ReplicaToken>,
    },
    Written {
        count: usize,
    },
    Data {
        data: String,
    },
    Closed {
        status: ReplicaStatus,
    },
    Checksum {
        checksum: String,
        notes: VerificationResult,
    },
    /// Verification found problems; `code` is `CHECK_VERIFICATION_RESULTS`.
    Findings {
        code: ErrorCode,
        findings: VerificationResult,
    },
    Replicated {
        outcome: ReplicateOutcome,
    },
    Object {
        object: DataObject,
    },
    Paths {
        paths: Vec<String>,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl Response {
    fn error(e: &EngineError) -> Self {
        Self::Error {
            code: e.code(),
            message: e.to_string(),
        }
    }

    /// The error code carried by the response, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Error { code, .. } | Self::Findings { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Serves the requests of one connection against its own [`Session`].
pub struct Agent {
    session: Session,
}

impl Agent {
    pub fn new(coordinator: Arc<Coordinator>, principal: Principal) -> Self {
        Self {
            session: Session::new(coordinator, principal),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handle one request. Failures become [`Response::Error`].
    pub async fn handle(&mut self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(session = %self.session.id(), code = %e.code(), error = %e, "request failed");
                Response::error(&e)
            }
        }
    }

    /// Handle one JSON line and return the JSON response line.
    pub async fn handle_line(&mut self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::error(&EngineError::InvalidRequest {
                reason: e.to_string(),
            }),
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(
                r#"{{"result":"error","code":"{}","message":"{e}"}}"#,
                ErrorCode::SysInternalErr
            )
        })
    }

    /// End the connection, recovering every handle it left open.
    pub fn finish(self) -> usize {
        self.session.teardown()
    }

    async fn dispatch(&mut self, request: Request) -> Result<Response, EngineError> {
        let session = &mut self.session;
        match request {
            Request::Open(open) => {
                let handle = session.open(&open).await?;
                let opened = session.handle(handle)?;
                Ok(Response::Opened {
                    handle,
                    replica: opened.replica,
                    token: opened.token.clone(),
                })
            }
            Request::Write { handle, data } => {
                let bytes = BASE64
                    .decode(data.as_bytes())
                    .map_err(|e| EngineError::InvalidRequest {
                        reason: format!("write payload is not base64: {e}"),
                    })?;
                let count = session.write(handle, Bytes::from(bytes)).await?;
                Ok(Response::Written { count })
            }
            Request::Read { handle } => {
                let data = session.read(handle).await?;
                Ok(Response::Data {
                    data: BASE64.encode(&data),
                })
            }
            Request::Close(close) => {
                let status = session.close(&close).await?;
                Ok(Response::Closed { status })
            }
            Request::Checksum(checksum) => Ok(match session.checksum(&checksum).await? {
                ChecksumResponse::Checksum { checksum, notes } => {
                    Response::Checksum { checksum, notes }
                }
                ChecksumResponse::Findings(findings) => Response::Findings {
                    code: ErrorCode::CheckVerificationResults,
                    findings,
                },
            }),
            Request::Replicate(replicate) => {
                let outcome = session.replicate(&replicate).await?;
                Ok(Response::Replicated { outcome })
            }
            Request::Stat { path } => {
                let object = session
                    .coordinator()
                    .catalog()
                    .get(&path)?
                    .ok_or(CatalogError::NotFound { path })?;
                Ok(Response::Object { object })
            }
            Request::List { prefix } => {
                let paths = session.coordinator().catalog().list(&prefix)?;
                Ok(Response::Paths { paths })
            }
        }
    }
}
