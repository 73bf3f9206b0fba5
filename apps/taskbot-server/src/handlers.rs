//! The bot served by this binary: a reminder ("memorize") bot.
//!
//! Forwarding an email to `memorize@<domain>` schedules a reminder. When the
//! reminder fires the bot re-sends the reference email and reschedules it
//! using the interval the user picked in the bot's settings.

use serde_json::{json, Value};
use taskbot_core::{Bot, Dispatcher, HandlerResult};
use tracing::info;

const DEFAULT_FREQUENCY: &str = "1day";

/// Register every listener of the reminder bot.
pub fn register(dispatcher: &mut Dispatcher) {
    dispatcher
        .on_command("memorize", memorize_created)
        .on_trigger("memorize", memorize_triggered)
        .on_task_viewed("memorize", memorize_viewed)
        .on_action("stop", stop_reminding)
        .on_settings_viewed(settings_viewed)
        .on_settings_submit(settings_submitted);
}

/// The bot-wide reminder interval, falling back to one day.
fn frequency(bot: &Bot) -> Value {
    bot.webhook
        .get_mailbot_data("frequency")
        .unwrap_or_else(|| json!(DEFAULT_FREQUENCY))
}

async fn memorize_created(bot: Bot) -> HandlerResult {
    let frequency = frequency(&bot);
    info!(frequency = %frequency, "Scheduling reminder");

    bot.webhook.set_trigger_time(frequency.clone());
    bot.webhook.set_task_data(json!({ "frequency": frequency, "reminders_sent": 0 }));
    bot.webhook.respond(json!({
        "webhook": { "status": "success", "message": "Reminder scheduled" }
    }));
    Ok(())
}

async fn memorize_triggered(bot: Bot) -> HandlerResult {
    let sent = bot
        .webhook
        .get_task_data("reminders_sent")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let subject = bot
        .webhook
        .get_reference_email()
        .and_then(|email| email.get("subject").cloned())
        .and_then(|subject| subject.as_str().map(str::to_string))
        .unwrap_or_else(|| "your email".to_string());

    bot.webhook.add_email(json!({
        "type": "email",
        "subject": format!("Reminder: {subject}"),
        "body": [{ "type": "text", "text": format!("You asked to be reminded about \"{subject}\".") }],
    }));
    bot.webhook.set_task_data(json!({ "reminders_sent": sent + 1 }));
    bot.webhook.set_trigger_time(frequency(&bot));
    bot.webhook.respond(json!({ "webhook": { "status": "success" } }));
    Ok(())
}

async fn memorize_viewed(bot: Bot) -> HandlerResult {
    let sent = bot.webhook.get_task_data("reminders_sent").unwrap_or(json!(0));
    bot.webhook.respond(json!({
        "webhook": { "status": "success" },
        "task": {
            "body": [{ "type": "text", "text": format!("Reminders sent so far: {sent}") }],
        },
    }));
    Ok(())
}

async fn stop_reminding(bot: Bot) -> HandlerResult {
    bot.webhook.complete_task();
    bot.webhook.respond(json!({
        "webhook": { "status": "success", "message": "Reminder stopped" }
    }));
    Ok(())
}

/// Multi-fire: contributes the bot's section of the settings page.
async fn settings_viewed(bot: Bot) -> HandlerResult {
    bot.webhook.set(
        &format!("settings.{}", bot.namespace()),
        json!({ "frequency": frequency(&bot) }),
    );
    Ok(())
}

async fn settings_submitted(bot: Bot) -> HandlerResult {
    let chosen = bot.webhook.get("settings.frequency");
    if let Some(frequency) = chosen.filter(Value::is_string) {
        info!(frequency = %frequency, "Saving reminder frequency");
        bot.webhook.set_mailbot_data(json!({ "frequency": frequency }));
    }
    Ok(())
}
