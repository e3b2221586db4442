use super::*;
use std::sync::Arc;
use crate::db::test_support::{setup_db, TestDb};
use crate::models::UiMode;
use crate::transport::recording::{Call, RecordingTransport};
use crate::transport::TextMessage;

const ALICE: ChatId = 100;
const BOB: ChatId = 200;
const CAROL: ChatId = 300;

struct Harness {
    orchestrator: Orchestrator<RecordingTransport>,
    db: TestDb,
}

fn name_of(chat_id: ChatId) -> &'static str {
    match chat_id {
        ALICE => "Alice",
        BOB => "Bob",
        CAROL => "Carol",
        _ => "Someone",
    }
}

fn text(chat_id: ChatId, text: &str) -> InboundEvent {
    InboundEvent::Text(TextMessage {
        chat_id,
        sender_id: chat_id,
        sender_name: name_of(chat_id).to_string(),
        text: text.to_string(),
    })
}

fn callback(chat_id: ChatId, message_id: MessageId, data: &str) -> InboundEvent {
    InboundEvent::Callback(CallbackEvent {
        chat_id,
        message_id,
        callback_id: format!("cb-{}-{}", chat_id, data),
        data: data.to_string(),
        sender_id: chat_id,
        sender_name: name_of(chat_id).to_string(),
    })
}

impl Harness {
    async fn new() -> Self {
        let db = setup_db().await;
        let orchestrator =
            Orchestrator::new(db.pool.clone(), RecordingTransport::new(), "sync_family_bot");
        Self { orchestrator, db }
    }

    /// Alice creates a family and Bob joins it. Bob ends up with a tracked
    /// message from the join acknowledgment, Alice with none.
    async fn with_family() -> Self {
        let h = Self::new().await;
        h.send(text(ALICE, "/create_family")).await;
        let code = h.invite_code(ALICE).await;
        assert_eq!(
            h.send(text(BOB, &format!("/start {}", code))).await,
            Outcome::Replied
        );
        h.transport().clear();
        h
    }

    async fn send(&self, event: InboundEvent) -> Outcome {
        self.orchestrator.handle(event).await
    }

    fn transport(&self) -> &RecordingTransport {
        self.orchestrator.transport()
    }

    async fn member(&self, chat_id: ChatId) -> Option<Member> {
        let mut conn = self.db.pool.acquire().await.unwrap();
        family_repo::get_member(&mut conn, chat_id).await.unwrap()
    }

    async fn invite_code(&self, chat_id: ChatId) -> String {
        let family_id = self.member(chat_id).await.unwrap().family_id.unwrap();
        let mut conn = self.db.pool.acquire().await.unwrap();
        family_repo::get_family(&mut conn, family_id)
            .await
            .unwrap()
            .unwrap()
            .invite_code
    }

    async fn products(&self, chat_id: ChatId) -> Vec<Product> {
        let family_id = self.member(chat_id).await.unwrap().family_id.unwrap();
        let mut conn = self.db.pool.acquire().await.unwrap();
        product_repo::list_ordered(&mut conn, family_id).await.unwrap()
    }

    async fn product_id(&self, chat_id: ChatId, name: &str) -> ProductId {
        self.products(chat_id)
            .await
            .into_iter()
            .find(|p| p.name == name)
            .unwrap()
            .id
    }

    async fn last_message(&self, chat_id: ChatId) -> Option<MessageId> {
        self.member(chat_id).await.unwrap().last_message_id
    }
}

/// Button labels of the product rows of a list keyboard.
fn product_labels(keyboard: &Keyboard) -> Vec<String> {
    keyboard
        .rows()
        .iter()
        .flatten()
        .filter(|b| {
            b.callback_data
                .as_deref()
                .map(|d| d.starts_with(router::BUY) || d.starts_with(router::EDIT_PRODUCT))
                .unwrap_or(false)
        })
        .map(|b| b.text.clone())
        .collect()
}

fn view_updates(calls: &[Call]) -> Vec<&Call> {
    calls.iter().filter(|c| c.is_view_update()).collect()
}

fn keyboard_of(call: &Call) -> &Keyboard {
    match call {
        Call::Send {
            keyboard: Some(k), ..
        }
        | Call::EditText {
            keyboard: Some(k), ..
        } => k,
        Call::EditKeyboard { keyboard, .. } => keyboard,
        other => panic!("call has no keyboard: {:?}", other),
    }
}

#[tokio::test]
async fn test_add_products_resends_list_to_every_member() {
    let h = Harness::with_family().await;
    let bob_before = h.last_message(BOB).await.unwrap();

    let outcome = h.send(text(ALICE, "Milk, Bread")).await;
    assert_eq!(outcome, Outcome::Synced { recipients: 2 });

    // Alice had no tracked message: a plain send
    let alice_calls = h.transport().calls_to(ALICE);
    assert_eq!(alice_calls.len(), 1);
    assert!(matches!(&alice_calls[0], Call::Send { .. }));
    assert_eq!(
        product_labels(keyboard_of(&alice_calls[0])),
        vec!["Bread", "Milk"]
    );

    // Bob's old message is replaced
    let bob_calls = h.transport().calls_to(BOB);
    assert_eq!(bob_calls.len(), 2);
    assert_eq!(
        bob_calls[0],
        Call::Delete {
            chat_id: BOB,
            message_id: bob_before
        }
    );
    let new_bob_id = match &bob_calls[1] {
        Call::Send {
            message_id, text, ..
        } => {
            assert_eq!(text, "🛒 Shopping list updated (Alice):");
            *message_id
        }
        other => panic!("expected send, got {:?}", other),
    };
    assert_eq!(product_labels(keyboard_of(&bob_calls[1])), vec!["Bread", "Milk"]);

    assert_eq!(h.last_message(BOB).await, Some(new_bob_id));
    assert!(h.last_message(ALICE).await.is_some());
}

#[tokio::test]
async fn test_toggle_edits_every_tracked_message_in_place() {
    let h = Harness::with_family().await;
    h.send(text(ALICE, "Milk, Bread")).await;
    let alice_msg = h.last_message(ALICE).await.unwrap();
    let bob_msg = h.last_message(BOB).await.unwrap();
    let milk = h.product_id(ALICE, "Milk").await;
    h.transport().clear();

    let outcome = h
        .send(callback(ALICE, alice_msg, &format!("buy{}", milk)))
        .await;
    assert_eq!(outcome, Outcome::Synced { recipients: 2 });

    for (chat_id, message_id) in [(ALICE, alice_msg), (BOB, bob_msg)] {
        let calls = h.transport().calls_to(chat_id);
        assert_eq!(calls.len(), 1, "{:?}", calls);
        match &calls[0] {
            Call::EditText {
                message_id: edited,
                text,
                keyboard: Some(keyboard),
                ..
            } => {
                assert_eq!(*edited, message_id);
                assert_eq!(text, "🛒 List updated: Alice bought Milk");
                assert_eq!(product_labels(keyboard), vec!["Bread", "✅ Milk"]);
            }
            other => panic!("expected edit, got {:?}", other),
        }
    }

    // Tracked ids are unchanged
    assert_eq!(h.last_message(ALICE).await, Some(alice_msg));
    assert_eq!(h.last_message(BOB).await, Some(bob_msg));
}

#[tokio::test]
async fn test_callback_is_answered_even_when_ignored() {
    let h = Harness::with_family().await;

    let outcome = h.send(callback(ALICE, 1, "something_else")).await;
    assert_eq!(outcome, Outcome::Ignored);
    assert_eq!(
        h.transport().calls(),
        vec![Call::Answer {
            callback_id: "cb-100-something_else".to_string()
        }]
    );
}

#[tokio::test]
async fn test_clear_flow_and_missing_product() {
    let h = Harness::with_family().await;
    h.send(text(ALICE, "Milk, Bread")).await;
    let alice_msg = h.last_message(ALICE).await.unwrap();
    let bob_msg = h.last_message(BOB).await.unwrap();
    let milk = h.product_id(ALICE, "Milk").await;
    h.transport().clear();

    // Confirmation only swaps Alice's keyboard
    let outcome = h.send(callback(ALICE, alice_msg, "confirm_clear")).await;
    assert_eq!(outcome, Outcome::Replied);
    let updates = h.transport().calls();
    let updates = view_updates(&updates);
    assert_eq!(updates.len(), 1);
    assert!(matches!(updates[0], Call::EditKeyboard { chat_id: ALICE, .. }));
    assert_eq!(
        keyboard_of(updates[0]).callback_tokens(),
        vec!["clear_all", "refresh"]
    );
    assert!(h.transport().calls_to(BOB).is_empty());
    assert_eq!(h.products(ALICE).await.len(), 2);
    h.transport().clear();

    let outcome = h.send(callback(ALICE, alice_msg, "clear_all")).await;
    assert_eq!(outcome, Outcome::Synced { recipients: 2 });
    assert!(h.products(ALICE).await.is_empty());
    for (chat_id, message_id) in [(ALICE, alice_msg), (BOB, bob_msg)] {
        let calls = h.transport().calls_to(chat_id);
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::EditText {
                message_id: edited,
                text,
                keyboard: Some(keyboard),
                ..
            } => {
                assert_eq!(*edited, message_id);
                assert_eq!(text, "🧹 Alice cleared the shopping list.");
                assert!(product_labels(keyboard).is_empty());
            }
            other => panic!("expected edit, got {:?}", other),
        }
    }
    h.transport().clear();

    // A stale button for a product that no longer exists
    let outcome = h
        .send(callback(BOB, bob_msg, &format!("buy{}", milk)))
        .await;
    assert_eq!(outcome, Outcome::ProductNotFound);
    assert!(h.transport().calls_to(ALICE).is_empty());
    let bob_calls = h.transport().calls_to(BOB);
    assert_eq!(bob_calls.len(), 1);
    assert!(matches!(&bob_calls[0], Call::EditText { text, .. } if text == ui::PRODUCT_MISSING));
}

#[tokio::test]
async fn test_fan_out_stays_inside_the_family() {
    let h = Harness::with_family().await;
    h.send(text(CAROL, "/create_family")).await;
    h.send(text(CAROL, "Tea")).await;
    h.transport().clear();

    h.send(text(ALICE, "Milk")).await;
    assert!(h.transport().calls_to(CAROL).is_empty());
    assert_eq!(h.products(CAROL).await.len(), 1);
    assert_eq!(h.products(ALICE).await.len(), 1);

    // Carol can't toggle Alice's product through her own family
    let milk = h.product_id(ALICE, "Milk").await;
    h.transport().clear();
    let outcome = h.send(callback(CAROL, 1, &format!("buy{}", milk))).await;
    assert_eq!(outcome, Outcome::ProductNotFound);
    assert!(h.transport().calls_to(ALICE).is_empty());
    assert!(!h.products(ALICE).await[0].is_bought);
}

#[tokio::test]
async fn test_unreachable_member_does_not_block_others() {
    let h = Harness::with_family().await;
    let bob_before = h.last_message(BOB).await;
    h.transport().make_unreachable(BOB);

    let outcome = h.send(text(ALICE, "Milk")).await;
    assert_eq!(outcome, Outcome::Synced { recipients: 1 });
    assert_eq!(h.products(ALICE).await.len(), 1);
    assert!(h.last_message(ALICE).await.is_some());
    // Bob's delete failed too, so his old message is still the tracked one
    assert_eq!(h.last_message(BOB).await, bob_before);
}

#[tokio::test]
async fn test_failed_edit_falls_back_to_send() {
    let h = Harness::with_family().await;
    h.send(text(ALICE, "Milk")).await;
    let alice_msg = h.last_message(ALICE).await.unwrap();
    let bob_msg = h.last_message(BOB).await.unwrap();
    let milk = h.product_id(ALICE, "Milk").await;
    h.transport().fail_edits(BOB);
    h.transport().clear();

    let outcome = h
        .send(callback(ALICE, alice_msg, &format!("buy{}", milk)))
        .await;
    assert_eq!(outcome, Outcome::Synced { recipients: 2 });

    let bob_calls = h.transport().calls_to(BOB);
    assert_eq!(bob_calls.len(), 1);
    let sent_id = match &bob_calls[0] {
        Call::Send { message_id, .. } => *message_id,
        other => panic!("expected send, got {:?}", other),
    };
    assert_ne!(sent_id, bob_msg);
    assert_eq!(h.last_message(BOB).await, Some(sent_id));
}

#[tokio::test]
async fn test_member_without_message_gets_fresh_send_on_toggle() {
    let h = Harness::with_family().await;
    h.send(text(ALICE, "Milk")).await;
    let alice_msg = h.last_message(ALICE).await.unwrap();
    let milk = h.product_id(ALICE, "Milk").await;

    // Carol joins but never receives the acknowledgment
    let code = h.invite_code(ALICE).await;
    h.transport().make_unreachable(CAROL);
    h.send(text(CAROL, &format!("/start {}", code))).await;
    assert!(h.last_message(CAROL).await.is_none());

    // Same database, Carol reachable again
    let h = Harness {
        orchestrator: Orchestrator::new(
            h.db.pool.clone(),
            RecordingTransport::new(),
            "sync_family_bot",
        ),
        db: h.db,
    };

    let outcome = h
        .send(callback(ALICE, alice_msg, &format!("buy{}", milk)))
        .await;
    assert_eq!(outcome, Outcome::Synced { recipients: 3 });
    let carol_calls = h.transport().calls_to(CAROL);
    assert_eq!(carol_calls.len(), 1);
    assert!(matches!(&carol_calls[0], Call::Send { .. }));
    assert!(h.last_message(CAROL).await.is_some());
}

#[tokio::test]
async fn test_toggle_edit_mode_only_touches_requester() {
    let h = Harness::with_family().await;
    h.send(text(ALICE, "Milk")).await;
    let alice_msg = h.last_message(ALICE).await.unwrap();
    h.transport().clear();

    let outcome = h.send(callback(ALICE, alice_msg, "toggle_mode_edit")).await;
    assert_eq!(outcome, Outcome::Replied);
    assert_eq!(h.member(ALICE).await.unwrap().mode, UiMode::Edit);
    assert!(h.transport().calls_to(BOB).is_empty());

    let calls = h.transport().calls_to(ALICE);
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], Call::EditText { message_id, .. } if *message_id == alice_msg));
    let milk = h.product_id(ALICE, "Milk").await;
    assert_eq!(
        keyboard_of(&calls[0]).callback_tokens(),
        vec![format!("edit_product{}", milk).as_str(), "toggle_mode_edit"]
    );

    // Later fan-outs render each member in their own mode
    h.transport().clear();
    h.send(text(BOB, "Bread")).await;
    let alice_send = h
        .transport()
        .calls_to(ALICE)
        .into_iter()
        .find(|c| matches!(c, Call::Send { .. }))
        .unwrap();
    let bob_send = h
        .transport()
        .calls_to(BOB)
        .into_iter()
        .find(|c| matches!(c, Call::Send { .. }))
        .unwrap();
    assert!(keyboard_of(&alice_send)
        .callback_tokens()
        .iter()
        .all(|t| !t.starts_with("buy")));
    assert!(keyboard_of(&bob_send)
        .callback_tokens()
        .iter()
        .any(|t| t.starts_with("buy")));

    // And back
    let alice_msg = h.last_message(ALICE).await.unwrap();
    h.send(callback(ALICE, alice_msg, "toggle_mode_edit")).await;
    assert_eq!(h.member(ALICE).await.unwrap().mode, UiMode::Normal);
}

#[tokio::test]
async fn test_delete_single_product_flow() {
    let h = Harness::with_family().await;
    h.send(text(ALICE, "Milk, Bread")).await;
    let alice_msg = h.last_message(ALICE).await.unwrap();
    let bread = h.product_id(ALICE, "Bread").await;
    h.transport().clear();

    let outcome = h
        .send(callback(ALICE, alice_msg, &format!("edit_product{}", bread)))
        .await;
    assert_eq!(outcome, Outcome::Replied);
    let calls = h.transport().calls_to(ALICE);
    assert_eq!(
        keyboard_of(&calls[0]).callback_tokens(),
        vec![format!("delete_product{}", bread).as_str(), "refresh"]
    );
    h.transport().clear();

    h.send(callback(ALICE, alice_msg, &format!("delete_product{}", bread)))
        .await;
    let calls = h.transport().calls_to(ALICE);
    assert_eq!(
        keyboard_of(&calls[0]).callback_tokens(),
        vec![
            format!("confirm_edit_product{}", bread).as_str(),
            format!("edit_product{}", bread).as_str()
        ]
    );
    // Nothing is deleted before the confirmation
    assert_eq!(h.products(ALICE).await.len(), 2);
    assert!(h.transport().calls_to(BOB).is_empty());
    h.transport().clear();

    let outcome = h
        .send(callback(
            ALICE,
            alice_msg,
            &format!("confirm_edit_product{}", bread),
        ))
        .await;
    assert_eq!(outcome, Outcome::Synced { recipients: 2 });
    let names: Vec<String> = h.products(ALICE).await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Milk"]);
    let bob_calls = h.transport().calls_to(BOB);
    assert!(matches!(&bob_calls[0], Call::EditText { text, .. } if text == "🛒 List updated: Alice removed Bread"));
}

#[tokio::test]
async fn test_refresh_tracks_tapped_message() {
    let h = Harness::with_family().await;
    h.send(text(ALICE, "Milk")).await;
    h.transport().clear();

    let outcome = h.send(callback(ALICE, 7, "refresh")).await;
    assert_eq!(outcome, Outcome::Replied);
    assert_eq!(h.last_message(ALICE).await, Some(7));
    let calls = h.transport().calls_to(ALICE);
    assert!(matches!(&calls[0], Call::EditText { message_id: 7, .. }));
}

#[tokio::test]
async fn test_join_with_bad_code() {
    let h = Harness::new().await;
    h.send(text(ALICE, "/create_family")).await;
    h.transport().clear();

    let outcome = h.send(text(BOB, "/start not-a-code")).await;
    assert_eq!(outcome, Outcome::JoinRejected);
    assert!(h.member(BOB).await.is_none());
    assert!(matches!(
        &h.transport().calls_to(BOB)[0],
        Call::Send { text, keyboard: None, .. } if text == ui::JOIN_REJECTED
    ));
}

#[tokio::test]
async fn test_create_family_sends_invite() {
    let h = Harness::new().await;

    let outcome = h.send(text(ALICE, "/create_family")).await;
    assert_eq!(outcome, Outcome::Replied);

    let code = h.invite_code(ALICE).await;
    let calls = h.transport().calls_to(ALICE);
    assert_eq!(calls.len(), 1);
    let button = &keyboard_of(&calls[0]).rows()[0][0];
    assert_eq!(button.url.as_deref(), Some(ui::share_url("sync_family_bot", &code).as_str()));
}

#[tokio::test]
async fn test_no_family_is_denied() {
    let h = Harness::new().await;

    assert_eq!(h.send(text(ALICE, "/start")).await, Outcome::Replied);
    assert!(h.member(ALICE).await.unwrap().family_id.is_none());
    h.transport().clear();

    assert_eq!(h.send(text(ALICE, "Milk")).await, Outcome::NoFamily);
    assert_eq!(h.send(callback(ALICE, 1, "clear_all")).await, Outcome::NoFamily);
    assert_eq!(h.send(text(BOB, "Milk")).await, Outcome::NoFamily);

    let texts: Vec<String> = h
        .transport()
        .calls_to(ALICE)
        .into_iter()
        .filter_map(|c| match c {
            Call::Send { text, .. } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec![ui::NO_FAMILY, ui::NO_FAMILY]);
}

#[tokio::test]
async fn test_blank_text_is_ignored() {
    let h = Harness::with_family().await;

    assert_eq!(h.send(text(ALICE, " ,; \n")).await, Outcome::Ignored);
    assert!(h.transport().calls().is_empty());
}

#[tokio::test]
async fn test_persistence_failure_notifies_only_requester() {
    let h = Harness::with_family().await;
    h.db.pool.close().await;

    let outcome = h.send(text(ALICE, "Milk")).await;
    assert_eq!(outcome, Outcome::Failed);

    assert!(h.transport().calls_to(BOB).is_empty());
    let alice_calls = h.transport().calls_to(ALICE);
    assert_eq!(alice_calls.len(), 1);
    assert!(matches!(
        &alice_calls[0],
        Call::Send { text, keyboard: None, .. } if text == ui::FAILURE
    ));
}

/// Shares the harness database with an orchestrator that spawned tasks can own.
fn shared(h: &Harness) -> Arc<Orchestrator<RecordingTransport>> {
    Arc::new(Orchestrator::new(
        h.db.pool.clone(),
        RecordingTransport::new(),
        "sync_family_bot",
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_all_commit() {
    let h = Harness::with_family().await;
    let orchestrator = shared(&h);

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            let chat_id = if i % 2 == 0 { ALICE } else { BOB };
            tokio::spawn(async move {
                orchestrator
                    .handle(text(chat_id, &format!("Item{}", i)))
                    .await
            })
        })
        .collect();

    for task in tasks {
        let outcome = task.await.unwrap();
        assert!(matches!(outcome, Outcome::Synced { .. }), "{:?}", outcome);
    }

    assert_eq!(h.products(ALICE).await.len(), 40);
    let failures = orchestrator
        .transport()
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Send { text, .. } if text == ui::FAILURE))
        .count();
    assert_eq!(failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_all_commit() {
    let h = Harness::with_family().await;
    h.send(text(ALICE, "Milk")).await;
    let alice_msg = h.last_message(ALICE).await.unwrap();
    let milk = h.product_id(ALICE, "Milk").await;
    let orchestrator = shared(&h);

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            let chat_id = if i % 2 == 0 { ALICE } else { BOB };
            let data = format!("buy{}", milk);
            tokio::spawn(async move {
                orchestrator
                    .handle(callback(chat_id, alice_msg, &data))
                    .await
            })
        })
        .collect();

    for task in tasks {
        let outcome = task.await.unwrap();
        assert!(matches!(outcome, Outcome::Synced { .. }), "{:?}", outcome);
    }

    // Every toggle committed: an even number leaves it unbought
    let products = h.products(ALICE).await;
    assert_eq!(products.len(), 1);
    assert!(!products[0].is_bought);
}
