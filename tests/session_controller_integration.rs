//! End-to-end session controller scenarios against real SQLite storage

mod common;

use common::{create_temp_store, ScriptedProvider};
use parlance::persistence::PersistenceService;
use parlance::providers::StreamEvent;
use parlance::session::{
    ChatMessage, LoadOutcome, Role, SendOutcome, SessionController, SessionState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn controller(
    provider: ScriptedProvider,
    store: Arc<dyn PersistenceService>,
) -> Arc<SessionController> {
    Arc::new(
        SessionController::new(Arc::new(provider), store, "alice", "assistant")
            .with_autosave_delay(Duration::from_millis(20)),
    )
}

#[tokio::test]
async fn hello_round_trip_persists_two_messages() {
    let (store, _tmp) = create_temp_store();
    let store: Arc<dyn PersistenceService> = Arc::new(store);
    let controller = controller(ScriptedProvider::hello(), Arc::clone(&store));

    let outcome = controller
        .send_message("say hello", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::Completed);

    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].content, "Hello!");

    controller.flush_save().await;

    let summaries = store.get_conversations("alice", 10, false).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].title, Some("say hello".to_string()));
    assert_eq!(summaries[0].message_count, 2);

    let saved = store
        .get_conversation(&summaries[0].id, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.messages[1].content, "Hello!");
    assert!(!saved.messages[1].streaming);
}

#[tokio::test]
async fn second_send_while_streaming_is_rejected_and_store_unchanged() {
    let (store, _tmp) = create_temp_store();
    let provider = ScriptedProvider::hello().with_event_delay(Duration::from_millis(50));
    let controller = controller(provider, Arc::new(store));

    let first = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .send_message("slow question", CancellationToken::new())
                .await
        })
    };

    // Let the first send enter the stream
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(controller.state(), SessionState::StreamingActive);

    let second = controller
        .send_message("impatient question", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second, SendOutcome::Rejected);

    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome, SendOutcome::Completed);

    // Only the first exchange is in the transcript
    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "slow question");
}

#[tokio::test]
async fn external_cancellation_preserves_partial_content() {
    let (store, _tmp) = create_temp_store();
    let provider = ScriptedProvider::hello().with_event_delay(Duration::from_millis(40));
    let controller = controller(provider, Arc::new(store));

    let cancel = CancellationToken::new();
    let send = {
        let controller = Arc::clone(&controller);
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.send_message("hi", cancel).await })
    };

    // Start + first token arrive around 80ms; cancel before the second token
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let outcome = send.await.unwrap().unwrap();
    assert_eq!(outcome, SendOutcome::Cancelled);

    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Hel");
    assert!(!messages[1].streaming);
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test]
async fn historical_load_during_stream_is_rejected() {
    let (store, _tmp) = create_temp_store();
    let store: Arc<dyn PersistenceService> = Arc::new(store);
    let historical_id = store
        .create_conversation("alice", "assistant", Some("old".to_string()))
        .await
        .unwrap();

    let provider = ScriptedProvider::hello().with_event_delay(Duration::from_millis(50));
    let controller = controller(provider, Arc::clone(&store));

    let send = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .send_message("streaming now", CancellationToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    let load = controller.load_historical(&historical_id).await.unwrap();
    assert_eq!(load, LoadOutcome::Rejected);

    send.await.unwrap().unwrap();

    // The live transcript survived untouched by the rejected load
    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "streaming now");
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test]
async fn viewing_historical_then_loading_another_snapshot() {
    let (store, _tmp) = create_temp_store();
    let store: Arc<dyn PersistenceService> = Arc::new(store);

    let first = store
        .create_conversation("alice", "assistant", Some("first".to_string()))
        .await
        .unwrap();
    store
        .update_conversation(
            &first,
            "alice",
            parlance::persistence::ConversationUpdate {
                messages: Some(vec![ChatMessage::user("from the first")]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let second = store
        .create_conversation("alice", "assistant", Some("second".to_string()))
        .await
        .unwrap();
    store
        .update_conversation(
            &second,
            "alice",
            parlance::persistence::ConversationUpdate {
                messages: Some(vec![ChatMessage::user("from the second")]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let controller = controller(ScriptedProvider::hello(), Arc::clone(&store));

    assert_eq!(
        controller.load_historical(&first).await.unwrap(),
        LoadOutcome::Loaded
    );
    assert_eq!(controller.messages()[0].content, "from the first");

    // Viewing mode allows switching snapshots
    assert_eq!(
        controller.load_historical(&second).await.unwrap(),
        LoadOutcome::Loaded
    );
    assert_eq!(controller.messages()[0].content, "from the second");
    assert_eq!(controller.state(), SessionState::ViewingHistorical);
}

#[tokio::test]
async fn debounced_autosave_writes_through_sqlite() {
    let (store, _tmp) = create_temp_store();
    let store: Arc<dyn PersistenceService> = Arc::new(store);
    let controller = controller(ScriptedProvider::hello(), Arc::clone(&store));

    controller
        .send_message("autosave me", CancellationToken::new())
        .await
        .unwrap();

    // Debounce delay is 20ms in these tests; wait for it to fire
    tokio::time::sleep(Duration::from_millis(100)).await;

    let summaries = store.get_conversations("alice", 10, false).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].message_count, 2);
}
