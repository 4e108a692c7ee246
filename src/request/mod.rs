//! Request Aggregation & Field Extraction
//!
//! Turns the decoder's parts into the [`RequestContext`] a handler sees.
//!
//! ```text
//! ┌──────────────┐  HttpPart  ┌───────────────────┐  CompleteRequest
//! │RequestDecoder│───────────>│ RequestAggregator │────────────────> dispatch
//! └──────────────┘            │  - size cap       │
//!                             │  - header filter  │
//!                             │  - form body      │
//!                             └───────────────────┘
//! ```
//!
//! - `context`: the per-request field map
//! - `aggregator`: part reassembly and header/route extraction
//! - `body`: form attribute extraction (urlencoded and multipart)

pub mod aggregator;
pub mod body;
pub mod context;

pub use aggregator::{
    AggregateError, AggregatorConfig, CompleteRequest, HeaderWhitelist, RequestAggregator,
    DEFAULT_CONTEXT_HEADERS, DEFAULT_MAX_CONTENT_LENGTH,
};
pub use body::AttributeError;
pub use context::{RequestContext, REQUEST_METHOD, REQUEST_URI};
