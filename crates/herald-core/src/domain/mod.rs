//! Domain model (IDs, status, request entity, outcomes, index documents, errors).

pub mod document;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod request;
pub mod search;
pub mod state;
pub mod validation;

pub use document::{DocumentV1, SearchDocument};
pub use errors::{ErrorKind, PipelineError};
pub use ids::{CorrelationId, ReceiptId, RecordId};
pub use outcome::{TransportOutcome, codes};
pub use request::{DeliveryRequest, Disposition, NewDeliveryRequest, TransitionError};
pub use search::{Page, PageRequest, SearchFilter};
pub use state::DeliveryStatus;
pub use validation::{ValidationError, validate_submission};
