mod receipt;
mod types;

pub use receipt::{build_receipt, sanitize_payload, write_receipt, RECEIPT_SCHEMA_VERSION};
pub use types::{GenerationRequest, ReferenceImage, ReferencePayload};
