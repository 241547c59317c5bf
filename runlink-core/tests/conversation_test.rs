use std::sync::Arc;
use std::time::Duration;

use runlink_core::{
    Advance, ChannelBridge, ChannelEvent, ContextId, Conversation, FlowTiming, Invoice,
    InvoiceItem, LocalBridge,
    Message, MessageBody, Milestone, SenderType,
};

fn pair(
    bridge: &Arc<LocalBridge>,
) -> (Conversation<LocalBridge>, Conversation<LocalBridge>) {
    let ctx = ContextId::new("u1", "r1");
    let user = Conversation::new(
        ctx.clone(),
        "u1",
        SenderType::User,
        bridge.clone(),
        FlowTiming::immediate(),
    );
    let runner = Conversation::new(
        ctx,
        "r1",
        SenderType::Runner,
        bridge.clone(),
        FlowTiming::immediate(),
    );
    (user, runner)
}

async fn connected_pair(
    bridge: &Arc<LocalBridge>,
) -> (Conversation<LocalBridge>, Conversation<LocalBridge>) {
    let (mut user, mut runner) = pair(bridge);
    user.connect().await.unwrap();
    runner.connect().await.unwrap();
    (user, runner)
}

#[tokio::test]
async fn test_text_messages_converge_on_both_logs() {
    let bridge = LocalBridge::new();
    let (mut user, mut runner) = connected_pair(&bridge).await;

    user.send_text("hello").await;
    runner.recv_remote().await.unwrap();
    runner.send_text("on my way").await;
    user.recv_remote().await.unwrap();

    let user_texts: Vec<_> = user.log().messages().iter().filter_map(|m| m.display_text()).collect();
    let runner_texts: Vec<_> = runner.log().messages().iter().filter_map(|m| m.display_text()).collect();
    assert_eq!(user_texts, vec!["hello", "on my way"]);
    assert_eq!(runner_texts, user_texts);
}

#[tokio::test]
async fn test_duplicate_delivery_leaves_the_log_unchanged() {
    let bridge = LocalBridge::new();
    let (mut user, mut runner) = connected_pair(&bridge).await;

    user.send_text("hi").await;
    runner.recv_remote().await.unwrap();
    let before = runner.log().len();

    // The same logical event relayed a second time (history overlap).
    let duplicate = runner.log().messages().last().unwrap().clone();
    bridge
        .send(
            user.context(),
            "u1",
            ChannelEvent::Message { message: duplicate },
        )
        .await;
    runner.recv_remote().await.unwrap();

    assert_eq!(runner.log().len(), before);
}

#[tokio::test]
async fn test_status_updates_propagate_to_the_user_checklist() {
    let bridge = LocalBridge::new();
    let (mut user, mut runner) = connected_pair(&bridge).await;

    let outcome = runner.advance_status(Milestone::OnWayToLocation).await;
    assert!(matches!(outcome, Advance::Completed { .. }));
    runner.advance_status(Milestone::ArrivedAtLocation).await;

    user.recv_remote().await.unwrap();
    user.recv_remote().await.unwrap();

    assert_eq!(user.checklist().percent_complete(), 29);
    assert_eq!(
        user.log().messages().last().unwrap().display_text(),
        Some("Runner arrived at location")
    );
}

#[tokio::test]
async fn test_invoice_decline_rolls_back_only_send_invoice() {
    let bridge = LocalBridge::new();
    let (mut user, mut runner) = connected_pair(&bridge).await;

    runner.advance_status(Milestone::OnWayToLocation).await;
    runner.advance_status(Milestone::ArrivedAtLocation).await;
    assert_eq!(
        runner.advance_status(Milestone::SendInvoice).await,
        Advance::InvoiceFlowRequired
    );
    let invoice = Invoice::new(vec![InvoiceItem::new("rice", 100, 2).unwrap()]);
    runner.send_invoice(invoice).await.unwrap();
    assert!(runner.checklist().is_complete(Milestone::SendInvoice));

    // Two status updates, the invoice card, and the sub-flow event.
    for _ in 0..4 {
        user.recv_remote().await.unwrap();
    }
    assert_eq!(user.pending_invoice().unwrap().grand_total(), 200);
    assert!(user.checklist().is_complete(Milestone::SendInvoice));

    user.decline_invoice().await.unwrap();
    runner.recv_remote().await.unwrap();

    assert_eq!(
        runner.checklist().completed(),
        &[Milestone::OnWayToLocation, Milestone::ArrivedAtLocation]
    );
    assert_eq!(
        user.checklist().completed(),
        &[Milestone::OnWayToLocation, Milestone::ArrivedAtLocation]
    );
    assert!(user.pending_invoice().is_none());

    // Decline frees the runner to resend.
    let again = Invoice::new(vec![InvoiceItem::new("rice", 100, 1).unwrap()]);
    runner.send_invoice(again).await.unwrap();
    assert!(runner.checklist().is_complete(Milestone::SendInvoice));
}

#[tokio::test]
async fn test_invoice_accept_completes_the_sub_flow() {
    let bridge = LocalBridge::new();
    let (mut user, mut runner) = connected_pair(&bridge).await;

    let invoice = Invoice::new(vec![
        InvoiceItem::new("rice", 100, 2).unwrap(),
        InvoiceItem::new("beans", 50, 1).unwrap(),
    ]);
    runner.send_invoice(invoice).await.unwrap();
    user.recv_remote().await.unwrap();
    user.recv_remote().await.unwrap();

    let accepted = user.accept_invoice().await.unwrap();
    assert_eq!(accepted.grand_total(), 250);
    assert!(user.pending_invoice().is_none());

    runner.recv_remote().await.unwrap();
    assert_eq!(
        runner.log().messages().last().unwrap().display_text(),
        Some("Invoice accepted")
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_takes_the_instant_batch_path() {
    let bridge = LocalBridge::new();
    let ctx = ContextId::new("u1", "r1");

    // Seed history before the user ever joins.
    for text in ["one", "two", "three"] {
        bridge
            .send(
                &ctx,
                "r1",
                ChannelEvent::Message {
                    message: Message::text("r1", SenderType::Runner, text),
                },
            )
            .await;
    }

    let mut user = Conversation::new(
        ctx.clone(),
        "u1",
        SenderType::User,
        bridge.clone(),
        FlowTiming {
            replay_stagger: Duration::from_millis(600),
            ..FlowTiming::immediate()
        },
    );

    let start = tokio::time::Instant::now();
    user.connect().await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_millis(1800));
    assert_eq!(user.log().len(), 3);

    // Reconnect: same context, instant replay, no duplicates.
    let start = tokio::time::Instant::now();
    user.connect().await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(user.log().len(), 3);
}

#[tokio::test]
async fn test_tracking_event_inserts_a_card() {
    let bridge = LocalBridge::new();
    let (mut user, _runner) = connected_pair(&bridge).await;

    bridge
        .send(
            user.context(),
            "r1",
            ChannelEvent::ReceiveTrackRunner {
                tracking: runlink_core::TrackingData {
                    latitude: 6.45,
                    longitude: 3.39,
                    eta_minutes: Some(9),
                },
            },
        )
        .await;
    user.recv_remote().await.unwrap();

    assert!(matches!(
        user.log().messages().last().unwrap().body,
        MessageBody::Tracking { .. }
    ));
}
