pub mod bridge;
pub mod checklist;
pub mod context;
pub mod conversation;
pub mod error;
pub mod flow;
pub mod invoice;
pub mod log;
pub mod message;

// Re-export the types most callers reach for
pub use bridge::{ChannelBridge, ChannelEvent, LocalBridge, Subscription};
pub use checklist::{Advance, Milestone, OrderChecklist};
pub use context::ContextId;
pub use conversation::Conversation;
pub use error::{FlowError, Result};
pub use flow::location::{LocationFlow, LocationStep, ServiceKind};
pub use flow::registration::{
    RegistrationApi, RegistrationFlow, RegistrationState, RegistrationSubmission, Role,
};
pub use flow::FlowTiming;
pub use invoice::{Invoice, InvoiceItem, InvoiceStatus};
pub use log::MessageLog;
pub use message::{
    Affordance, DeliveryStatus, Message, MessageBody, Perspective, SenderType, TrackingData,
};
