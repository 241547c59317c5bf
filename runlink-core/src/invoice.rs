use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FlowError, Result};

/// One line on an invoice. Quantity is enforced at construction;
/// prices are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub name: String,
    pub unit_price: u64,
    pub quantity: u32,
}

impl InvoiceItem {
    pub fn new(name: &str, unit_price: u64, quantity: u32) -> Result<Self> {
        if quantity < 1 {
            return Err(FlowError::InvalidQuantity(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            unit_price,
            quantity,
        })
    }

    pub fn line_total(&self) -> u64 {
        self.unit_price * self.quantity as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Accepted,
    Declined,
}

/// An invoice attached to a conversation. Created by the runner, transmitted
/// once, then immutable; the user side can only accept or decline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub items: Vec<InvoiceItem>,
    pub status: InvoiceStatus,
}

impl Invoice {
    pub fn new(items: Vec<InvoiceItem>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            items,
            status: InvoiceStatus::Draft,
        }
    }

    pub fn sub_total(&self) -> u64 {
        self.items.iter().map(InvoiceItem::line_total).sum()
    }

    /// There is no tax or fee layer: the grand total is the subtotal.
    pub fn grand_total(&self) -> u64 {
        self.sub_total()
    }

    pub fn mark_sent(&mut self) -> Result<()> {
        if self.status != InvoiceStatus::Draft {
            return Err(FlowError::InvoiceAlreadySent);
        }
        self.status = InvoiceStatus::Sent;
        Ok(())
    }

    pub fn accept(&mut self) -> Result<()> {
        if self.status != InvoiceStatus::Sent {
            return Err(FlowError::NoPendingInvoice);
        }
        self.status = InvoiceStatus::Accepted;
        Ok(())
    }

    /// Decline returns the conversation to "awaiting invoice" and frees the
    /// runner to resend.
    pub fn decline(&mut self) -> Result<()> {
        if self.status != InvoiceStatus::Sent {
            return Err(FlowError::NoPendingInvoice);
        }
        self.status = InvoiceStatus::Declined;
        Ok(())
    }
}
