//! Integration tests for webhook dispatch.

use http::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskbot_core::{
    Bot, DispatchConfig, DispatchOutcome, Dispatcher, Handler, HandlerError, HandlerResult,
    TriggerCondition, GENERIC_FAILURE_MESSAGE,
};
use tokio::sync::Notify;

fn counting(counter: Arc<AtomicUsize>) -> impl Handler {
    move |_bot: Bot| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            HandlerResult::Ok(())
        }
    }
}

fn responding(counter: Arc<AtomicUsize>, tag: &'static str) -> impl Handler {
    move |bot: Bot| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            bot.webhook.respond(json!({"handled_by": tag}));
            HandlerResult::Ok(())
        }
    }
}

async fn failing(_bot: Bot) -> HandlerResult {
    anyhow::bail!("boom")
}

async fn panicking(_bot: Bot) -> HandlerResult {
    panic!("handler exploded")
}

fn task_created(command: &str) -> Value {
    json!({
        "event": "task.created",
        "task": {"id": 1, "command": command}
    })
}

// ==================== Single-fire ====================

#[tokio::test]
async fn test_only_first_single_fire_match_runs() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .on("task.created", responding(first.clone(), "first"))
        .on(TriggerCondition::pattern("^task\\.").unwrap(), responding(second.clone(), "second"));

    let reply = dispatcher.dispatch(task_created("memorize@x.domain")).await;

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
    assert_eq!(reply.body["handled_by"], json!("first"));
}

#[tokio::test]
async fn test_later_single_fire_not_run_when_first_fails() {
    let second = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .on("task.created", failing)
        .on("task.created", counting(second.clone()));

    let reply = dispatcher.dispatch(task_created("x@y")).await;

    assert_eq!(second.load(Ordering::SeqCst), 0);
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_single_fire_without_respond_sends_accumulated() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.on("task.created", |bot: Bot| async move {
        bot.webhook.set("task.stored_data", json!({"seen": true}));
        HandlerResult::Ok(())
    });

    let envelope = dispatcher.envelope(task_created("x@y"));
    let outcome = dispatcher.run(&envelope).await;

    assert_eq!(outcome, DispatchOutcome::AutoReturned);
    assert_eq!(envelope.response()["task"]["stored_data"]["seen"], json!(true));
}

// ==================== Multi-fire ====================

#[tokio::test]
async fn test_all_multi_fire_listeners_run_despite_failures() {
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .on_multi("bot.settings_viewed", counting(a.clone()))
        .on_multi("bot.settings_viewed", failing)
        .on_multi("bot.settings_viewed", panicking)
        .on_multi("bot.settings_viewed", counting(b.clone()));

    let reply = dispatcher.dispatch(json!({"event": "bot.settings_viewed"})).await;

    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    // The default error handler answered for the failing sibling.
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["webhook"]["status"], json!("failed"));
}

#[tokio::test]
async fn test_multi_fire_takes_precedence_over_single_fire() {
    let single = Arc::new(AtomicUsize::new(0));
    let multi = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .on("task.created", counting(single.clone()))
        .on_multi("task.created", counting(multi.clone()));

    let envelope = dispatcher.envelope(task_created("x@y"));
    let outcome = dispatcher.run(&envelope).await;

    assert_eq!(outcome, DispatchOutcome::AutoReturned);
    assert_eq!(multi.load(Ordering::SeqCst), 1);
    assert_eq!(single.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_settings_layered_by_two_multi_fire_listeners() {
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .on_multi("bot.settings_viewed", |bot: Bot| async move {
            bot.webhook.set("settings", json!({"foo": "bar"}));
            HandlerResult::Ok(())
        })
        .on_multi("bot.settings_viewed", |bot: Bot| async move {
            tokio::task::yield_now().await;
            let foo = bot.webhook.get("settings.foo");
            assert_eq!(foo, Some(json!("bar")));
            bot.webhook.set("settings.shoe", "far");
            HandlerResult::Ok(())
        });

    let reply = dispatcher.dispatch(json!({"event": "bot.settings_viewed"})).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.body,
        json!({"version": "1", "settings": {"foo": "bar", "shoe": "far"}})
    );
}

#[tokio::test]
async fn test_multi_fire_listeners_interleave() {
    let notify = Arc::new(Notify::new());

    let mut dispatcher = Dispatcher::new();
    let waiter = notify.clone();
    dispatcher.on_multi("sync.event", move |bot: Bot| {
        let waiter = waiter.clone();
        async move {
            bot.webhook.set("first", true);
            // Completes only if the sibling runs while this one is suspended.
            waiter.notified().await;
            bot.webhook.set("first_done", true);
            HandlerResult::Ok(())
        }
    });
    let notifier = notify.clone();
    dispatcher.on_multi("sync.event", move |bot: Bot| {
        let notifier = notifier.clone();
        async move {
            bot.webhook.set("second", true);
            notifier.notify_one();
            HandlerResult::Ok(())
        }
    });

    let reply = dispatcher.dispatch(json!({"event": "sync.event"})).await;

    assert_eq!(reply.body["first"], json!(true));
    assert_eq!(reply.body["second"], json!(true));
    assert_eq!(reply.body["first_done"], json!(true));
}

#[tokio::test]
async fn test_same_key_last_write_wins() {
    let notify = Arc::new(Notify::new());

    let mut dispatcher = Dispatcher::with_config(DispatchConfig::default().with_conflict_warnings(true)).unwrap();
    let waiter = notify.clone();
    dispatcher.on_multi("race", move |bot: Bot| {
        let waiter = waiter.clone();
        async move {
            bot.webhook.set("winner", "a-early");
            waiter.notified().await;
            bot.webhook.set("winner", "a-late");
            HandlerResult::Ok(())
        }
    });
    let notifier = notify.clone();
    dispatcher.on_multi("race", move |bot: Bot| {
        let notifier = notifier.clone();
        async move {
            bot.webhook.set("winner", "b");
            notifier.notify_one();
            HandlerResult::Ok(())
        }
    });

    let reply = dispatcher.dispatch(json!({"event": "race"})).await;

    assert_eq!(reply.body["winner"], json!("a-late"));
}

#[tokio::test]
async fn test_explicit_respond_in_multi_fire_is_not_resent() {
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .on_multi("x", |bot: Bot| async move {
            bot.webhook.respond(json!({"done": 1}));
            HandlerResult::Ok(())
        })
        .on_multi("x", |bot: Bot| async move {
            tokio::task::yield_now().await;
            bot.webhook.set("late", true);
            HandlerResult::Ok(())
        });

    let envelope = dispatcher.envelope(json!({"event": "x"}));
    let outcome = dispatcher.run(&envelope).await;
    let reply = dispatcher.dispatch(json!({"event": "x"})).await;

    assert_eq!(outcome, DispatchOutcome::Responded);
    assert_eq!(reply.body, json!({"version": "1", "done": 1}));
}

// ==================== Respond ====================

#[tokio::test]
async fn test_respond_twice_sends_first() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.on("task.created", |bot: Bot| async move {
        bot.webhook.respond(json!({"attempt": 1}));
        bot.webhook.respond(json!({"attempt": 2}));
        HandlerResult::Ok(())
    });

    let reply = dispatcher.dispatch(task_created("x@y")).await;
    assert_eq!(reply.body["attempt"], json!(1));
}

// ==================== Scenarios ====================

#[tokio::test]
async fn test_memorize_command() {
    let seen = Arc::new(parking_lot::Mutex::new(None));

    let mut dispatcher = Dispatcher::new();
    let captured = seen.clone();
    dispatcher.on_command("memorize", move |bot: Bot| {
        let captured = captured.clone();
        async move {
            let address = bot.webhook.get("task.command");
            let bare = address
                .as_ref()
                .and_then(Value::as_str)
                .and_then(|a| a.split('@').next())
                .map(str::to_string);
            *captured.lock() = bare;

            bot.webhook.set_trigger_time("1day");
            bot.webhook.respond(json!({"webhook": {"status": "success"}}));
            HandlerResult::Ok(())
        }
    });

    let reply = dispatcher.dispatch(task_created("memorize@x.domain")).await;

    assert_eq!(seen.lock().as_deref(), Some("memorize"));
    assert_eq!(reply.body["task"]["trigger_time"], json!("1day"));
}

#[tokio::test]
async fn test_no_listener_is_unhandled() {
    let dispatcher = Dispatcher::new();

    let envelope = dispatcher.envelope(json!({"event": "task.viewed"}));
    let outcome = dispatcher.run(&envelope).await;

    assert_eq!(outcome, DispatchOutcome::Unhandled);
    let reply = dispatcher.dispatch(json!({"event": "task.viewed"})).await;
    assert_eq!(
        reply.body,
        json!({
            "version": "1",
            "webhook": {
                "status": "success",
                "message": "Webhook received but not handled: task.viewed"
            }
        })
    );
}

#[tokio::test]
async fn test_error_yields_generic_failure() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.on("task.created", failing);

    let reply = dispatcher.dispatch(task_created("x@y")).await;

    assert!(reply.status.is_server_error());
    let message = reply.body["webhook"]["message"].as_str().unwrap();
    assert_eq!(message, GENERIC_FAILURE_MESSAGE);
    assert!(!message.contains("boom"));
}

#[tokio::test]
async fn test_panic_is_contained() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.on("task.created", panicking);

    let reply = dispatcher.dispatch(task_created("x@y")).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["webhook"]["status"], json!("failed"));
}

#[tokio::test]
async fn test_custom_error_handler() {
    let calls = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = Dispatcher::new();
    let counter = calls.clone();
    dispatcher
        .on("task.created", failing)
        .set_error_handler(move |error: HandlerError, bot: Bot| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                bot.webhook.set_status(StatusCode::BAD_GATEWAY);
                bot.webhook.respond(json!({"failed_listener": error.listener()}));
            }
        });

    let reply = dispatcher.dispatch(task_created("x@y")).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.body["failed_listener"], json!("task.created"));
}

#[tokio::test]
async fn test_custom_fallback() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.set_fallback(|bot: Bot| async move {
        bot.webhook.respond(json!({"ignored": bot.event()}));
        HandlerResult::Ok(())
    });

    let reply = dispatcher.dispatch(json!({"event": "nobody.listens"})).await;
    assert_eq!(reply.body["ignored"], json!("nobody.listens"));
}

// ==================== Scoped registration ====================

#[tokio::test]
async fn test_scoped_registrations_route_by_second_predicate() {
    let action = Arc::new(AtomicUsize::new(0));
    let event = Arc::new(AtomicUsize::new(0));
    let viewed = Arc::new(AtomicUsize::new(0));
    let triggered = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = Dispatcher::with_config(DispatchConfig::with_namespace("bot").unwrap()).unwrap();
    dispatcher
        .on_action("complete", responding(action.clone(), "action"))
        .on_event("github.push", responding(event.clone(), "event"))
        .on_task_viewed("memorize", responding(viewed.clone(), "viewed"))
        .on_trigger(regex::Regex::new("^\\d+day$").unwrap(), responding(triggered.clone(), "triggered"));

    dispatcher
        .dispatch(json!({"event": "task.action_received", "action": {"format": "complete@x.domain"}}))
        .await;
    dispatcher
        .dispatch(json!({"event": "bot.event_received", "payload": {"type": "github.push"}}))
        .await;
    dispatcher
        .dispatch(json!({"event": "task.viewed", "task": {"command": "memorize@x.domain"}}))
        .await;
    dispatcher
        .dispatch(json!({"event": "task.triggered", "task": {"command": "3day@x.domain"}}))
        .await;
    let miss = dispatcher
        .dispatch(json!({"event": "task.action_received", "action": {"format": "snooze@x.domain"}}))
        .await;

    assert_eq!(action.load(Ordering::SeqCst), 1);
    assert_eq!(event.load(Ordering::SeqCst), 1);
    assert_eq!(viewed.load(Ordering::SeqCst), 1);
    assert_eq!(triggered.load(Ordering::SeqCst), 1);
    assert_eq!(miss.body["webhook"]["status"], json!("success"));
}

#[tokio::test]
async fn test_settings_submit_covers_both_events() {
    let calls = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = Dispatcher::new();
    dispatcher.on_settings_submit(counting(calls.clone()));

    dispatcher.dispatch(json!({"event": "mailbot.settings_pre_save"})).await;
    dispatcher.dispatch(json!({"event": "mailbot.settings_onsubmit"})).await;
    dispatcher.dispatch(json!({"event": "mailbot.settings_viewed"})).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_task_data_round_trip_through_dispatch() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.on_trigger("memorize", |bot: Bot| async move {
        let count = bot.webhook.get_task_data("count").and_then(|v| v.as_u64()).unwrap_or(0);
        bot.webhook.set_task_data(json!({"count": count + 1}));
        bot.webhook.respond(json!({}));
        HandlerResult::Ok(())
    });

    let reply = dispatcher
        .dispatch(json!({
            "event": "task.triggered",
            "task": {"command": "memorize@x.domain", "stored_data": {"count": 2, "topic": "rust"}}
        }))
        .await;

    assert_eq!(reply.body["task"]["stored_data"], json!({"count": 3, "topic": "rust"}));
}
