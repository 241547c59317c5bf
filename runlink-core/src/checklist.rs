use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// One delivery milestone in the order-status checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    OnWayToLocation,
    ArrivedAtLocation,
    SendPrice,
    SendInvoice,
    OnWayToDelivery,
    ArrivedAtDelivery,
    Delivered,
}

impl Milestone {
    /// Checklist order. Completion does not depend on this order, but
    /// display does.
    pub const ALL: [Milestone; 7] = [
        Milestone::OnWayToLocation,
        Milestone::ArrivedAtLocation,
        Milestone::SendPrice,
        Milestone::SendInvoice,
        Milestone::OnWayToDelivery,
        Milestone::ArrivedAtDelivery,
        Milestone::Delivered,
    ];

    /// System message emitted when the milestone completes. The four texts
    /// pinned by the existing consumers must not change. `send_invoice` emits
    /// nothing here: the invoice sub-flow announces itself.
    pub fn system_message(&self) -> Option<&'static str> {
        match self {
            Milestone::OnWayToLocation => Some("Runner on the way to location"),
            Milestone::ArrivedAtLocation => Some("Runner arrived at location"),
            Milestone::SendPrice => Some("Runner sent a price"),
            Milestone::SendInvoice => None,
            Milestone::OnWayToDelivery => Some("Runner on the way to delivery location"),
            Milestone::ArrivedAtDelivery => Some("Runner arrived at delivery location"),
            Milestone::Delivered => Some("Order has been delivered successfully"),
        }
    }
}

impl std::fmt::Display for Milestone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Milestone::OnWayToLocation => "on_way_to_location",
            Milestone::ArrivedAtLocation => "arrived_at_location",
            Milestone::SendPrice => "send_price",
            Milestone::SendInvoice => "send_invoice",
            Milestone::OnWayToDelivery => "on_way_to_delivery",
            Milestone::ArrivedAtDelivery => "arrived_at_delivery",
            Milestone::Delivered => "delivered",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Milestone {
    type Err = FlowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "on_way_to_location" => Ok(Milestone::OnWayToLocation),
            "arrived_at_location" => Ok(Milestone::ArrivedAtLocation),
            "send_price" => Ok(Milestone::SendPrice),
            "send_invoice" => Ok(Milestone::SendInvoice),
            "on_way_to_delivery" => Ok(Milestone::OnWayToDelivery),
            "arrived_at_delivery" => Ok(Milestone::ArrivedAtDelivery),
            "delivered" => Ok(Milestone::Delivered),
            _ => Err(FlowError::InvalidMilestone(s.to_string())),
        }
    }
}

/// Outcome of advancing the checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Milestone marked complete, carrying its system message if it has one.
    Completed { message: Option<&'static str> },
    /// `send_invoice` was selected: the invoice sub-flow takes over and the
    /// milestone is only marked once that sub-flow reports success.
    InvoiceFlowRequired,
    AlreadyComplete,
}

/// Ordered delivery-milestone checklist. Any uncompleted milestone may be
/// selected at any time; this is a checklist, not a linear sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderChecklist {
    /// Completed milestones in the order they were reached.
    completed: Vec<Milestone>,
}

impl OrderChecklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> &[Milestone] {
        &self.completed
    }

    pub fn is_complete(&self, milestone: Milestone) -> bool {
        self.completed.contains(&milestone)
    }

    /// Select a milestone. Standard milestones complete immediately;
    /// `send_invoice` defers to the invoice sub-flow.
    pub fn advance(&mut self, milestone: Milestone) -> Advance {
        if self.is_complete(milestone) {
            return Advance::AlreadyComplete;
        }
        if milestone == Milestone::SendInvoice {
            return Advance::InvoiceFlowRequired;
        }
        self.completed.push(milestone);
        Advance::Completed {
            message: milestone.system_message(),
        }
    }

    /// Mark a milestone complete without the invoice gating. Used when a
    /// remote status update or a successful invoice send is applied.
    pub fn mark_complete(&mut self, milestone: Milestone) {
        if !self.is_complete(milestone) {
            self.completed.push(milestone);
        }
    }

    /// Remove exactly one milestone from the completed set. Triggered only
    /// by an explicit decline event correlated to that milestone; all other
    /// completed milestones are untouched.
    pub fn rollback(&mut self, milestone: Milestone) -> bool {
        let before = self.completed.len();
        self.completed.retain(|m| *m != milestone);
        self.completed.len() != before
    }

    /// Completion percentage, rounded half-up.
    pub fn percent_complete(&self) -> u8 {
        let ratio = 100.0 * self.completed.len() as f64 / Milestone::ALL.len() as f64;
        ratio.round() as u8
    }
}
