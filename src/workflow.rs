//! Per-file operation state machine.
//!
//! One engine is created per submitted file, for either operation kind.
//! It runs `Idle -> Validating -> Transferring -> AwaitingResponse` and
//! finishes in exactly one terminal outcome; the engine is consumed by
//! `run` and a new one is created for the next file. Phase transitions are
//! published over a watch channel for presentation consumers; the engine
//! itself holds no rendering knowledge.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::{ApiError, ServiceApi, ServiceResponse};
use crate::classify::{classify, suffix_of, FormatClass};
use crate::common::ConfigStore;

/// Encode uploads are capped client-side; the service enforces the same
/// limit and there is no point shipping 50+ MiB just to be told no.
pub const MAX_ENCODE_BYTES: u64 = 50 * 1024 * 1024;

/// Suffix of the service's proprietary archive container.
pub const ARCHIVE_EXT: &str = "press";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Encode,
    Decode,
}

impl OperationKind {
    pub fn path(&self) -> &'static str {
        match self {
            OperationKind::Encode => "encode",
            OperationKind::Decode => "decode",
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            OperationKind::Encode => "Compressing",
            OperationKind::Decode => "Decompressing",
        }
    }
}

/// One user-initiated submission. Transient: consumed by the engine and
/// dropped with it when the operation reaches a terminal state.
#[derive(Debug)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Observable engine phases, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Transferring,
    AwaitingResponse,
    Done,
}

/// Client-side rejection. No network call was made except for the
/// server-detected lossy backstop, which arrives as a reclassified
/// response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Unsupported { suffix: Option<String> },
    TooLarge { size: u64 },
    LossyFormat { server_message: Option<String> },
    WrongExtension,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Unauthorized,
    RateLimited,
    Server { status: u16, message: String },
    Network { message: String },
}

/// Sizes and ratio reported for a successful encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeStats {
    pub original_size: u64,
    pub compressed_size: u64,
    pub ratio_percent: f64,
}

/// Payload plus derived output name; `stats` is present for encodes only.
#[derive(Debug)]
pub struct Completed {
    pub payload: Vec<u8>,
    pub output_name: String,
    pub stats: Option<EncodeStats>,
}

/// Terminal result of one operation. Immutable once produced.
#[derive(Debug)]
pub enum Outcome {
    Succeeded(Completed),
    Rejected(RejectReason),
    Failed(FailureKind),
}

pub struct OperationWorkflow<S: ServiceApi> {
    service: Arc<S>,
    store: Arc<ConfigStore>,
    phase_tx: watch::Sender<Phase>,
    phase_rx: watch::Receiver<Phase>,
}

impl<S: ServiceApi> OperationWorkflow<S> {
    pub fn new(service: Arc<S>, store: Arc<ConfigStore>) -> Self {
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);
        Self {
            service,
            store,
            phase_tx,
            phase_rx,
        }
    }

    /// Receiver for phase transitions. Clone freely; the channel always
    /// holds the latest phase.
    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.phase_rx.clone()
    }

    /// Drive one request to a terminal outcome, consuming the engine.
    pub async fn run(self, request: OperationRequest) -> Outcome {
        let _ = self.phase_tx.send(Phase::Validating);

        if let Some(reason) = validate(&request) {
            tracing::info!(file = %request.file_name, ?reason, "Rejected before transfer");
            let _ = self.phase_tx.send(Phase::Done);
            return Outcome::Rejected(reason);
        }

        // Endpoint and key are read once, at the moment the request is
        // issued; a concurrent settings change applies to the next request.
        let target = self.store.get();
        let Some(key) = target.key else {
            // Never transfer while the credential is empty.
            let _ = self.phase_tx.send(Phase::Done);
            return Outcome::Failed(FailureKind::Unauthorized);
        };

        let OperationRequest {
            kind,
            file_name,
            bytes,
        } = request;
        let submitted_len = bytes.len() as u64;

        tracing::info!(file = %file_name, op = kind.path(), size = submitted_len, "Uploading");
        let _ = self.phase_tx.send(Phase::Transferring);

        // Transport reports no mid-flight progress, so transferring and
        // awaiting the response are one logical step.
        let pending = self
            .service
            .submit(&target.base_url, &key, kind, &file_name, bytes);
        let _ = self.phase_tx.send(Phase::AwaitingResponse);

        let outcome = match pending.await {
            Ok(resp) => classify_response(kind, &file_name, submitted_len, resp),
            Err(ApiError::Network(message)) => {
                tracing::warn!(file = %file_name, %message, "Transfer failed");
                Outcome::Failed(FailureKind::Network { message })
            }
        };

        let _ = self.phase_tx.send(Phase::Done);
        outcome
    }
}

/// Pre-flight guards. `None` means the request may be transferred.
fn validate(request: &OperationRequest) -> Option<RejectReason> {
    match request.kind {
        OperationKind::Encode => {
            let size = request.bytes.len() as u64;
            if size > MAX_ENCODE_BYTES {
                return Some(RejectReason::TooLarge { size });
            }
            match classify(&request.file_name) {
                FormatClass::Lossless => None,
                FormatClass::Lossy => Some(RejectReason::LossyFormat {
                    server_message: None,
                }),
                FormatClass::Unsupported => Some(RejectReason::Unsupported {
                    suffix: suffix_of(&request.file_name),
                }),
            }
        }
        OperationKind::Decode => {
            let expected = format!(".{ARCHIVE_EXT}");
            if request.file_name.to_ascii_lowercase().ends_with(&expected) {
                None
            } else {
                Some(RejectReason::WrongExtension)
            }
        }
    }
}

fn classify_response(
    kind: OperationKind,
    file_name: &str,
    submitted_len: u64,
    resp: ServiceResponse,
) -> Outcome {
    match resp.status {
        401 => Outcome::Failed(FailureKind::Unauthorized),
        429 => Outcome::Failed(FailureKind::RateLimited),
        status if (200..300).contains(&status) => success(kind, file_name, submitted_len, resp),
        status => {
            let message =
                parse_error_body(&resp.body).unwrap_or_else(|| format!("HTTP {status}"));
            // The service inspects content the client cannot: a lossy
            // source that slipped past the suffix check comes back as an
            // error whose text names the problem.
            if is_lossy_message(&message) {
                Outcome::Rejected(RejectReason::LossyFormat {
                    server_message: Some(message),
                })
            } else {
                Outcome::Failed(FailureKind::Server { status, message })
            }
        }
    }
}

fn success(
    kind: OperationKind,
    file_name: &str,
    submitted_len: u64,
    resp: ServiceResponse,
) -> Outcome {
    let completed = match kind {
        OperationKind::Encode => {
            let original_size = resp.original_size.unwrap_or(submitted_len);
            let compressed_size = resp.compressed_size.unwrap_or(resp.body.len() as u64);
            let ratio_percent = resp
                .ratio
                .as_deref()
                .and_then(parse_ratio)
                .unwrap_or_else(|| computed_ratio(original_size, compressed_size));
            Completed {
                payload: resp.body,
                output_name: encoded_name(file_name),
                stats: Some(EncodeStats {
                    original_size,
                    compressed_size,
                    ratio_percent,
                }),
            }
        }
        OperationKind::Decode => Completed {
            payload: resp.body,
            output_name: decoded_name(file_name),
            stats: None,
        },
    };
    Outcome::Succeeded(completed)
}

/// Best-effort parse of the service's `{error, details?}` body.
fn parse_error_body(body: &[u8]) -> Option<String> {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
        details: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    Some(match parsed.details {
        Some(details) if !details.is_empty() => format!("{}: {}", parsed.error, details),
        _ => parsed.error,
    })
}

fn is_lossy_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("lossy") || lower.contains("jpeg artifact")
}

/// Leading float of a ratio header such as `"90.0%"`.
fn parse_ratio(raw: &str) -> Option<f64> {
    raw.trim().trim_end_matches('%').trim().parse().ok()
}

fn computed_ratio(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - compressed as f64 / original as f64) * 100.0
}

/// Output name for an encoded payload: last suffix replaced by the archive
/// suffix.
pub fn encoded_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.{ARCHIVE_EXT}"),
        _ => format!("{file_name}.{ARCHIVE_EXT}"),
    }
}

/// Output name for a decoded payload: archive suffix swapped for `.png`.
pub fn decoded_name(file_name: &str) -> String {
    let expected = format!(".{ARCHIVE_EXT}");
    if file_name.to_ascii_lowercase().ends_with(&expected) {
        let stem = &file_name[..file_name.len() - expected.len()];
        format!("{stem}.png")
    } else {
        format!("{file_name}.png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_request(name: &str, len: usize) -> OperationRequest {
        OperationRequest {
            kind: OperationKind::Encode,
            file_name: name.to_string(),
            bytes: vec![0u8; len],
        }
    }

    #[test]
    fn encode_size_guard_is_inclusive() {
        let at_limit = encode_request("big.png", MAX_ENCODE_BYTES as usize);
        assert!(validate(&at_limit).is_none(), "exactly 50 MiB must pass");

        let over = encode_request("big.png", MAX_ENCODE_BYTES as usize + 1);
        assert!(matches!(
            validate(&over),
            Some(RejectReason::TooLarge { .. })
        ));
    }

    #[test]
    fn encode_rejects_lossy_and_unsupported_suffixes() {
        assert!(matches!(
            validate(&encode_request("photo.jpg", 10)),
            Some(RejectReason::LossyFormat {
                server_message: None
            })
        ));
        assert!(matches!(
            validate(&encode_request("doc.pdf", 10)),
            Some(RejectReason::Unsupported { .. })
        ));
        assert!(validate(&encode_request("photo.png", 10)).is_none());
    }

    #[test]
    fn decode_requires_archive_suffix() {
        let ok = OperationRequest {
            kind: OperationKind::Decode,
            file_name: "photo.press".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert!(validate(&ok).is_none());

        let mixed_case = OperationRequest {
            kind: OperationKind::Decode,
            file_name: "photo.PRESS".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert!(validate(&mixed_case).is_none());

        let wrong = OperationRequest {
            kind: OperationKind::Decode,
            file_name: "photo.png".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert!(matches!(
            validate(&wrong),
            Some(RejectReason::WrongExtension)
        ));
    }

    #[test]
    fn ratio_header_parses_with_and_without_percent() {
        assert_eq!(parse_ratio("90.0%"), Some(90.0));
        assert_eq!(parse_ratio(" 75 "), Some(75.0));
        assert_eq!(parse_ratio("-12.5%"), Some(-12.5));
        assert_eq!(parse_ratio("n/a"), None);
    }

    #[test]
    fn computed_ratio_from_sizes() {
        assert_eq!(computed_ratio(1000, 250), 75.0);
        assert_eq!(computed_ratio(0, 250), 0.0);
        assert!(computed_ratio(100, 150) < 0.0);
    }

    #[test]
    fn lossy_message_backstop_matches_tokens() {
        assert!(is_lossy_message("rejected: jpeg artifacts detected"));
        assert!(is_lossy_message("Lossy source content"));
        assert!(!is_lossy_message("internal server error"));
    }

    #[test]
    fn error_body_parsing_is_best_effort() {
        assert_eq!(
            parse_error_body(br#"{"error":"bad input"}"#),
            Some("bad input".to_string())
        );
        assert_eq!(
            parse_error_body(br#"{"error":"bad input","details":"line 4"}"#),
            Some("bad input: line 4".to_string())
        );
        assert_eq!(parse_error_body(b"<html>oops</html>"), None);
    }

    #[test]
    fn output_name_derivation() {
        assert_eq!(encoded_name("photo.png"), "photo.press");
        assert_eq!(encoded_name("archive.tar.gif"), "archive.tar.press");
        assert_eq!(encoded_name("noext"), "noext.press");
        assert_eq!(decoded_name("photo.press"), "photo.png");
        assert_eq!(decoded_name("photo.PRESS"), "photo.png");
    }
}
