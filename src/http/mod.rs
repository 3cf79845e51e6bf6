//! HTTP exchanges: options, request bodies, the exchange runner, and
//! response buffering.

pub mod options;
pub mod orderedheaders;
pub mod outcome;
pub mod requestbody;
pub mod response;
pub mod responsebody;
pub mod stream;
pub mod transaction;

// Re-exports for convenience
pub use options::{CallOptions, ConnectionOptions, RequestOptions};
pub use orderedheaders::OrderedHeaderMap;
pub use outcome::{split_outcome, ExchangeFuture, Outcome, OutcomeParts};
pub use requestbody::{BodySource, BodyWriter, ExternalWrite, SharedStream};
pub use response::HttpResponse;
pub use responsebody::ResponseBuffer;
pub use transaction::ExchangeState;
