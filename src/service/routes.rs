//! Axum routes for the Mention Compare service.

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::align::{AlignerConfig, TextAligner};
use crate::batch::{compare_against_gold, BatchComparison};
use crate::canonical::canonical_hash_hex;
use crate::chain::{AlignStrategy, AlignmentMap, ChainAligner, ChainIndex, CoOccurrence};
use crate::compare::{char_boundaries, compare_documents, slice_chars, CompareConfig, CompareError, DocumentComparison};
use crate::segment::{SegmentError, Segmenter};
use crate::types::{char_len, sort_mentions, AnnotatedText, Mention, Offset, OpenKind};
use crate::MENTION_COMPARE_SCHEMA_VERSION;

use super::middleware::{record_comparison_metrics, record_segmentation_metrics};
use super::state::{ConfigRef, RegistryFull, ServiceState};

/// Shared handler state.
pub type AppState = Arc<ServiceState>;

type HandlerError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to re-map mentions from one text version to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignRequest {
    /// Text the mention offsets refer to.
    pub source_text: String,
    /// Text to re-map the mentions onto.
    pub dest_text: String,
    /// Mentions over `source_text`.
    pub mentions: Vec<Mention>,
    /// Aligner options. Defaults apply when absent; the edit bound is capped.
    #[serde(default)]
    pub config: Option<AlignerConfig>,
}

/// Realigned mentions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignResponse {
    /// Mentions in input order, offsets over `dest_text`.
    pub mentions: Vec<Mention>,
    /// Per mention, whether the realigned range is valid in `dest_text`.
    pub valid: Vec<bool>,
    /// Whether the underlying diff was minimal.
    pub exact: bool,
    /// Shift table as `(source position, shift)` pairs.
    pub shift_table: Vec<(Offset, Offset)>,
}

/// Request to segment a text by several mention lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRequest {
    /// The shared text.
    pub text: String,
    /// One mention list per annotator.
    pub lists: Vec<Vec<Mention>>,
}

/// One open mention of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenEntryDto {
    /// Index of the mention in its list, sorted by boundary order.
    pub index: usize,
    /// Mention start.
    pub start: Offset,
    /// Mention end.
    pub end: Offset,
    /// Mention entity label.
    pub entity: Option<String>,
    /// Position of the segment relative to the mention.
    pub kind: OpenKind,
}

/// Serializable segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDto {
    /// Segment start.
    pub start: Offset,
    /// Segment end.
    pub end: Offset,
    /// Covered text.
    pub text: String,
    /// Open mentions per list.
    pub open: Vec<Vec<OpenEntryDto>>,
    /// Index of the principal mention per list.
    pub principals: Vec<Option<usize>>,
}

/// Segmentation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentResponse {
    /// Text length in characters.
    pub text_len: Offset,
    /// Segments covering the text.
    pub segments: Vec<SegmentDto>,
    /// Hash over the segment sequence.
    pub segment_hash: String,
}

/// Request to group mentions into chains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsRequest {
    /// Mentions of one annotator.
    pub mentions: Vec<Mention>,
}

/// Serializable chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDto {
    /// 1-based chain number.
    pub index: usize,
    /// Entity label shared by the chain.
    pub entity: String,
    /// Mention ranges in document order.
    pub mentions: Vec<(Offset, Offset)>,
}

/// Chains of one mention list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsResponse {
    /// Chains in first-occurrence order.
    pub chains: Vec<ChainDto>,
    /// Mentions without an entity label.
    pub unlabelled: usize,
}

/// Request to align the labels of two mention lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAlignRequest {
    /// Labels to map from.
    pub source: Vec<Mention>,
    /// Labels to map to.
    pub target: Vec<Mention>,
    /// Matching strategy.
    #[serde(default)]
    pub strategy: AlignStrategy,
    /// Text length; defaults to the extent of the mentions.
    #[serde(default)]
    pub text_len: Option<Offset>,
}

/// Label alignment result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAlignResponse {
    /// Source label to target label.
    pub alignment: AlignmentMap,
    /// Hash of the alignment.
    pub fingerprint: String,
    /// Co-occurrence counts the alignment was derived from.
    pub co_occurrences: Vec<CoOccurrence>,
}

/// Request to compare annotations of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareRequest {
    /// Gold document first, then candidates.
    pub documents: Vec<AnnotatedText>,
    /// Optional config reference. If not provided, uses the default config.
    pub config_ref: Option<ConfigRef>,
}

/// Comparison result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareResponse {
    /// The comparison.
    pub comparison: DocumentComparison,
    /// Config used.
    pub config_ref: ConfigRef,
}

/// Request to compare many candidates against one gold document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCompareRequest {
    /// Gold annotation.
    pub gold: AnnotatedText,
    /// Candidate annotations.
    pub candidates: Vec<AnnotatedText>,
    /// Config reference (applies to all).
    pub config_ref: Option<ConfigRef>,
}

/// Batch comparison result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCompareResponse {
    /// Per-candidate results.
    pub batch: BatchComparison,
    /// Config used.
    pub config_ref: ConfigRef,
}

/// Request to register a new comparison config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterConfigRequest {
    /// Config to store.
    pub config: CompareConfig,
}

/// Response containing a config reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRefResponse {
    /// Reference to pass as `config_ref` in comparison requests.
    pub config_ref: ConfigRef,
}

/// List of registered configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigListResponse {
    /// Registered configs in reference order.
    pub configs: Vec<ConfigRef>,
    /// Hash over all registered references.
    pub registry_fingerprint: String,
}

/// Service health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `healthy` when the handler answers.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Version of the response schemas.
    pub schema_version: String,
    /// Number of registered configs.
    pub config_count: usize,
    /// Hash over all registered references.
    pub registry_fingerprint: String,
}

/// Body of `GET /health/live`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always `alive`.
    pub status: String,
}

/// JSON error body. Carries the request id when the caller sent one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
    /// Stable code, e.g. `TEXT_MISMATCH`.
    pub code: String,
    /// Correlation ID for request tracing (the `x-request-id` header when present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Extra context, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Error with a code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            correlation_id: None,
            details: None,
        }
    }

    /// Attach the request id.
    pub fn with_correlation_id(mut self, id: Option<String>) -> Self {
        self.correlation_id = id;
        self
    }

    /// Attach extra context.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        tracing::warn!(
            code = %self.code,
            error = %self.error,
            correlation_id = ?self.correlation_id,
            "Request error"
        );
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

impl From<&SegmentError> for ErrorResponse {
    fn from(e: &SegmentError) -> Self {
        match e {
            SegmentError::TextLengthMismatch { .. } => ErrorResponse::new("TEXT_LENGTH_MISMATCH", e.to_string()),
        }
    }
}

impl From<&CompareError> for ErrorResponse {
    fn from(e: &CompareError) -> Self {
        match e {
            CompareError::NoDocuments => ErrorResponse::new("NO_DOCUMENTS", e.to_string()),
            CompareError::DocumentIdMismatch { found, .. } => {
                ErrorResponse::new("DOCUMENT_ID_MISMATCH", e.to_string()).with_details(found.clone())
            }
            CompareError::TextMismatch { common_prefix, .. } => ErrorResponse::new("TEXT_MISMATCH", e.to_string())
                .with_details(format!("common_prefix={}", common_prefix)),
            CompareError::Segment(inner) => inner.into(),
        }
    }
}

fn correlation_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn resolve_config(state: &ServiceState, config_ref: Option<&ConfigRef>) -> Result<(CompareConfig, ConfigRef), HandlerError> {
    state.resolve_config(config_ref).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "CONFIG_NOT_FOUND",
                format!("Config not found: {:?}", config_ref),
            )),
        )
    })
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Re-map mentions onto a new version of their text.
async fn align_handler(Json(request): Json<AlignRequest>) -> Json<AlignResponse> {
    let config = request.config.unwrap_or_default().clamped();
    let aligner = TextAligner::with_config(&request.source_text, request.dest_text.as_str(), &config);
    let dest_len = char_len(&request.dest_text);

    let mentions = aligner.align_all(&request.mentions);
    let valid = mentions.iter().map(|m| m.span.is_valid_for(dest_len)).collect();

    Json(AlignResponse {
        mentions,
        valid,
        exact: aligner.is_exact(),
        shift_table: aligner.shift_table().collect(),
    })
}

/// Segment a text by every boundary of every mention list.
async fn segment_handler(
    headers: HeaderMap,
    Json(mut request): Json<SegmentRequest>,
) -> Result<Json<SegmentResponse>, HandlerError> {
    let start = Instant::now();
    for list in &mut request.lists {
        sort_mentions(list);
    }

    let text_len = char_len(&request.text);
    let lists: Vec<&[Mention]> = request.lists.iter().map(Vec::as_slice).collect();
    let segmenter = Segmenter::new(text_len, &lists).map_err(|e| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::from(&e).with_correlation_id(correlation_id(&headers))),
        )
    })?;

    let byte_at = char_boundaries(&request.text);
    let segments: Vec<SegmentDto> = segmenter
        .map(|seg| SegmentDto {
            start: seg.start,
            end: seg.end,
            text: slice_chars(&request.text, &byte_at, seg.start, seg.end).to_string(),
            open: seg
                .open
                .iter()
                .map(|set| {
                    set.entries()
                        .iter()
                        .map(|e| OpenEntryDto {
                            index: e.index,
                            start: e.mention.start(),
                            end: e.mention.end(),
                            entity: e.mention.entity().map(str::to_string),
                            kind: e.kind,
                        })
                        .collect()
                })
                .collect(),
            principals: (0..seg.open.len())
                .map(|i| seg.principal_entry(i).map(|e| e.index))
                .collect(),
        })
        .collect();

    record_segmentation_metrics(lists.len(), segments.len(), start.elapsed().as_millis() as u64);

    Ok(Json(SegmentResponse {
        text_len,
        segment_hash: canonical_hash_hex(&segments),
        segments,
    }))
}

/// Group mentions into entity chains.
async fn chains_handler(Json(mut request): Json<ChainsRequest>) -> Json<ChainsResponse> {
    sort_mentions(&mut request.mentions);
    let index = ChainIndex::build(&request.mentions);

    let chains = index
        .chains()
        .iter()
        .map(|c| ChainDto {
            index: c.index,
            entity: c.entity.to_string(),
            mentions: c.mentions.iter().map(|m| (m.start(), m.end())).collect(),
        })
        .collect();
    let unlabelled = request.mentions.iter().filter(|m| m.entity().is_none()).count();

    Json(ChainsResponse { chains, unlabelled })
}

/// Align the labels of one mention list onto another.
async fn chain_align_handler(Json(mut request): Json<ChainAlignRequest>) -> Json<ChainAlignResponse> {
    sort_mentions(&mut request.source);
    sort_mentions(&mut request.target);

    let aligner = match request.text_len {
        Some(len) => ChainAligner::with_text_len(len),
        None => ChainAligner::new(),
    };
    let alignment = aligner.align(&request.source, &request.target, request.strategy);
    let co_occurrences = aligner.co_occurrences(&request.source, &request.target);

    Json(ChainAlignResponse {
        fingerprint: alignment.fingerprint(),
        alignment,
        co_occurrences,
    })
}

/// Compare annotations of one document against the first.
async fn compare_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CompareRequest>,
) -> Result<Json<CompareResponse>, HandlerError> {
    let start = Instant::now();
    let (config, config_ref) = resolve_config(&state, request.config_ref.as_ref())?;

    let comparison = compare_documents(&request.documents, &config).map_err(|e| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::from(&e).with_correlation_id(correlation_id(&headers))),
        )
    })?;

    record_comparison_metrics(
        request.documents.len(),
        comparison.segments.len(),
        start.elapsed().as_millis() as u64,
    );

    Ok(Json(CompareResponse { comparison, config_ref }))
}

/// Compare many candidates against one gold document.
async fn batch_compare_handler(
    State(state): State<AppState>,
    Json(request): Json<BatchCompareRequest>,
) -> Result<Json<BatchCompareResponse>, HandlerError> {
    let start = Instant::now();
    let (config, config_ref) = resolve_config(&state, request.config_ref.as_ref())?;

    let batch = compare_against_gold(&request.gold, &request.candidates, &config);
    let segments = batch
        .results
        .iter()
        .filter_map(|r| r.comparison.as_ref())
        .map(|c| c.segments.len())
        .sum();

    record_comparison_metrics(request.candidates.len() + 1, segments, start.elapsed().as_millis() as u64);

    Ok(Json(BatchCompareResponse { batch, config_ref }))
}

/// List registered configs.
async fn list_configs_handler(State(state): State<AppState>) -> Json<ConfigListResponse> {
    let registry = state.config_registry.read().unwrap_or_else(|e| e.into_inner());
    Json(ConfigListResponse {
        configs: registry.list(),
        registry_fingerprint: registry.fingerprint().to_string(),
    })
}

/// Register a new config. Refused with 507 once the registry is full.
async fn register_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterConfigRequest>,
) -> Result<Json<ConfigRefResponse>, HandlerError> {
    let mut registry = state.config_registry.write().unwrap_or_else(|e| e.into_inner());
    let config_ref = registry.register(request.config).map_err(|e: RegistryFull| {
        (
            StatusCode::INSUFFICIENT_STORAGE,
            Json(ErrorResponse::new("REGISTRY_FULL", e.to_string()).with_correlation_id(correlation_id(&headers))),
        )
    })?;
    Ok(Json(ConfigRefResponse { config_ref }))
}

/// Health check endpoint.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.config_registry.read().unwrap_or_else(|e| e.into_inner());
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: MENTION_COMPARE_SCHEMA_VERSION.to_string(),
        config_count: registry.len(),
        registry_fingerprint: registry.fingerprint().to_string(),
    })
}

/// `GET /health/live`.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the Mention Compare service.
pub fn create_router(state: ServiceState) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Core operations
        .route("/api/align", post(align_handler))
        .route("/api/segment", post(segment_handler))
        .route("/api/chains", post(chains_handler))
        .route("/api/chains/align", post(chain_align_handler))
        // Comparison
        .route("/api/compare", post(compare_handler))
        .route("/api/compare/batch", post(batch_compare_handler))
        // Config management
        .route("/api/configs", get(list_configs_handler).post(register_config_handler))
        // Health checks
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .with_state(state)
}
