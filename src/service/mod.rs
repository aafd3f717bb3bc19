//! Mention Compare REST Service
//!
//! Exposes alignment, segmentation and comparison as a REST API.
//!
//! ## Endpoints
//!
//! - `POST /api/align` - Re-map mentions onto a new version of their text
//! - `POST /api/segment` - Segment a text by several mention lists
//! - `POST /api/chains` - Group mentions into entity chains
//! - `POST /api/chains/align` - Map one list's labels onto another's
//! - `POST /api/compare` - Compare annotations of one document against gold
//! - `POST /api/compare/batch` - Compare many candidates against one gold
//! - `GET /api/configs` - List registered comparison configs
//! - `POST /api/configs` - Register a new comparison config
//! - `GET /health` - Service health check
//! - `GET /health/live` - Liveness check

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_comparison_metrics, record_segmentation_metrics};
pub use routes::{create_router, AppState, ErrorResponse};
pub use state::{ConfigRef, ConfigRegistry, RegistryFull, ServiceState, MAX_REGISTERED_CONFIGS};
