use thiserror::Error;

/// Error types for runlink-core operations.
/// Remote failures are caught at the flow boundary and converted to
/// system messages; these variants never escape a flow as a panic.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Field '{field}' was rejected: {reason}")]
    ValidationRejected { field: String, reason: String },

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("Channel transport unavailable")]
    TransportUnavailable,

    #[error("Invalid context id: {0}")]
    InvalidContextId(String),

    #[error("Invalid milestone value: {0}. Valid values: on_way_to_location, arrived_at_location, send_price, send_invoice, on_way_to_delivery, arrived_at_delivery, delivered")]
    InvalidMilestone(String),

    #[error("Invalid service kind: {0}. Valid values: pick-up, run-errand")]
    InvalidServiceKind(String),

    #[error("Invoice item '{0}' must have a quantity of at least 1")]
    InvalidQuantity(String),

    #[error("Invoice has already been sent")]
    InvoiceAlreadySent,

    #[error("No invoice is awaiting a decision")]
    NoPendingInvoice,

    #[error("Flow is not expecting input in state '{0}'")]
    UnexpectedInput(String),

    #[error("OTP resend allowed in {0} more seconds")]
    ResendCooldown(u64),

    #[error("Cannot edit a message sent by someone else")]
    NotMessageSender,
}

pub type Result<T> = std::result::Result<T, FlowError>;
