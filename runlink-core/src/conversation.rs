use std::sync::Arc;

use tracing::info;

use crate::bridge::{ChannelBridge, ChannelEvent, Subscription};
use crate::checklist::{Advance, Milestone, OrderChecklist};
use crate::context::ContextId;
use crate::error::{FlowError, Result};
use crate::flow::FlowTiming;
use crate::invoice::Invoice;
use crate::log::MessageLog;
use crate::message::{Message, SenderType};

/// One participant's end of a conversation: the message log, the order
/// checklist, and the channel subscription, kept in step with the remote
/// side.
///
/// The log has a single writer (this struct); remote events only enter it
/// through [`Conversation::recv_remote`]. Prompt and replay delays are inline
/// awaits, so dropping a pending future at teardown cancels the timer before
/// it can touch the log.
pub struct Conversation<B: ChannelBridge> {
    context: ContextId,
    self_id: String,
    self_type: SenderType,
    bridge: Arc<B>,
    log: MessageLog,
    checklist: OrderChecklist,
    subscription: Option<Subscription>,
    pending_invoice: Option<Invoice>,
    timing: FlowTiming,
}

impl<B: ChannelBridge> Conversation<B> {
    pub fn new(
        context: ContextId,
        self_id: &str,
        self_type: SenderType,
        bridge: Arc<B>,
        timing: FlowTiming,
    ) -> Self {
        Self {
            context,
            self_id: self_id.to_string(),
            self_type,
            bridge,
            log: MessageLog::new(),
            checklist: OrderChecklist::new(),
            subscription: None,
            pending_invoice: None,
            timing,
        }
    }

    pub fn context(&self) -> &ContextId {
        &self.context
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn checklist(&self) -> &OrderChecklist {
        &self.checklist
    }

    pub fn pending_invoice(&self) -> Option<&Invoice> {
        self.pending_invoice.as_ref()
    }

    /// Join the deterministic context room and replay its history. A
    /// reconnect re-joins the same room and takes the instant batch path.
    pub async fn connect(&mut self) -> Result<()> {
        let (history, subscription) = self.bridge.join(&self.context, &self.self_id).await?;
        self.subscription = Some(subscription);
        info!(context = %self.context, messages = history.len(), "joined context");
        self.log
            .replay_history(history, self.timing.replay_stagger)
            .await;
        Ok(())
    }

    /// Send a chat message. Whitespace-only input is silently ignored.
    pub async fn send_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let message = Message::text(&self.self_id, self.self_type, text);
        self.log.append(message.clone());
        self.bridge
            .send(&self.context, &self.self_id, ChannelEvent::Message { message })
            .await;
    }

    /// Runner side: select a milestone. Standard milestones complete and
    /// announce themselves on both sides; `send_invoice` defers to
    /// [`Conversation::send_invoice`].
    pub async fn advance_status(&mut self, milestone: Milestone) -> Advance {
        let outcome = self.checklist.advance(milestone);
        if let Advance::Completed { message: Some(text) } = outcome {
            let message = Message::status_update(milestone, text);
            self.log.append(message.clone());
            self.bridge
                .send(&self.context, &self.self_id, ChannelEvent::Message { message })
                .await;
        }
        outcome
    }

    /// Runner side: transmit an invoice. Marks the `send_invoice` milestone
    /// complete only on success; the invoice is immutable from here on.
    pub async fn send_invoice(&mut self, mut invoice: Invoice) -> Result<()> {
        invoice.mark_sent()?;
        self.checklist.mark_complete(Milestone::SendInvoice);

        let message = Message::invoice(&self.self_id, invoice.clone());
        self.log.append(message.clone());
        self.bridge
            .send(&self.context, &self.self_id, ChannelEvent::Message { message })
            .await;
        self.bridge
            .send(
                &self.context,
                &self.self_id,
                ChannelEvent::SendInvoice { invoice },
            )
            .await;
        Ok(())
    }

    /// User side: accept the pending invoice.
    pub async fn accept_invoice(&mut self) -> Result<Invoice> {
        let mut invoice = self
            .pending_invoice
            .take()
            .ok_or(FlowError::NoPendingInvoice)?;
        invoice.accept()?;
        self.log.append(Message::system("Invoice accepted"));
        self.bridge
            .send(
                &self.context,
                &self.self_id,
                ChannelEvent::AcceptInvoice {
                    invoice_id: invoice.id.clone(),
                },
            )
            .await;
        Ok(invoice)
    }

    /// User side: decline the pending invoice. Rolls back exactly the
    /// `send_invoice` milestone and frees the runner to resend.
    pub async fn decline_invoice(&mut self) -> Result<()> {
        let mut invoice = self
            .pending_invoice
            .take()
            .ok_or(FlowError::NoPendingInvoice)?;
        invoice.decline()?;
        self.checklist.rollback(Milestone::SendInvoice);
        self.log.append(Message::system("Invoice declined"));
        self.bridge
            .send(
                &self.context,
                &self.self_id,
                ChannelEvent::DeclineInvoice {
                    invoice_id: invoice.id.clone(),
                },
            )
            .await;
        Ok(())
    }

    /// Await and apply the next remote event. Returns the event once applied,
    /// or `None` when the channel is gone or never joined.
    pub async fn recv_remote(&mut self) -> Option<ChannelEvent> {
        let event = self.subscription.as_mut()?.recv().await?;
        self.apply_remote(&event);
        Some(event)
    }

    fn apply_remote(&mut self, event: &ChannelEvent) {
        match event {
            ChannelEvent::Message { message } => {
                match &message.body {
                    crate::message::MessageBody::StatusUpdate { milestone, .. } => {
                        self.checklist.mark_complete(*milestone);
                    }
                    crate::message::MessageBody::Invoice { invoice } => {
                        self.checklist.mark_complete(Milestone::SendInvoice);
                        self.pending_invoice = Some(invoice.clone());
                    }
                    _ => {}
                }
                self.log.append_remote(message.clone());
            }
            ChannelEvent::SendInvoice { invoice } | ChannelEvent::ReceiveInvoice { invoice } => {
                // The invoice card itself arrives as a message; this event
                // only arms the accept/decline decision.
                self.checklist.mark_complete(Milestone::SendInvoice);
                self.pending_invoice = Some(invoice.clone());
            }
            ChannelEvent::DeclineInvoice { .. } | ChannelEvent::InvoiceDeclined { .. } => {
                self.checklist.rollback(Milestone::SendInvoice);
                self.pending_invoice = None;
                self.log
                    .append_remote(Message::system("Invoice declined"));
            }
            ChannelEvent::AcceptInvoice { .. } => {
                self.log.append_remote(Message::system("Invoice accepted"));
            }
            ChannelEvent::InvoiceError { detail } => {
                self.log.append_remote(Message::system(detail));
            }
            ChannelEvent::ReceiveTrackRunner { tracking } => {
                self.log.append(Message::tracking(tracking.clone()));
            }
            // Matching handshake and transport frames are handled before a
            // conversation exists.
            ChannelEvent::Join { .. }
            | ChannelEvent::History { .. }
            | ChannelEvent::RequestRunner { .. }
            | ChannelEvent::AcceptRunnerRequest { .. }
            | ChannelEvent::DeclineRunnerRequest { .. } => {}
        }
    }
}
