//! Drafts for each notification source.
//!
//! Business code calls one of these after its own mutation succeeds and
//! hands the draft to the [`Dispatcher`](crate::Dispatcher).

use beacon_protocol::{Category, Priority, UserId};

use crate::{CreditAlert, NotificationDraft};

pub const SOURCE_CONVERSATIONS: &str = "conversations";
pub const SOURCE_CREDITS: &str = "credits";
pub const SOURCE_PROFILE: &str = "profile";
pub const SOURCE_AUTH: &str = "auth";

/// A conversation was created.
pub fn conversation_created(user_id: &UserId, title: &str) -> NotificationDraft {
    NotificationDraft::to_user(
        user_id.clone(),
        Category::Success,
        "Conversation created",
        format!("\"{title}\" is ready."),
    )
    .with_source(SOURCE_CONVERSATIONS)
}

/// A generated reply finished in a conversation.
pub fn reply_ready(user_id: &UserId, conversation_title: &str) -> NotificationDraft {
    NotificationDraft::to_user(
        user_id.clone(),
        Category::Info,
        "New reply",
        format!("A new reply is ready in \"{conversation_title}\"."),
    )
    .with_source(SOURCE_CONVERSATIONS)
}

pub fn profile_updated(user_id: &UserId) -> NotificationDraft {
    NotificationDraft::to_user(
        user_id.clone(),
        Category::Success,
        "Profile updated",
        "Your profile changes were saved.",
    )
    .with_source(SOURCE_PROFILE)
}

/// Greeting sent shortly after login.
pub fn welcome(user_id: &UserId, display_name: &str) -> NotificationDraft {
    NotificationDraft::to_user(
        user_id.clone(),
        Category::Info,
        "Welcome back",
        format!("Welcome back, {display_name}!"),
    )
    .with_source(SOURCE_AUTH)
    .with_priority(Priority::Low)
}

pub fn credit_alert(user_id: &UserId, alert: CreditAlert, credits: i64) -> NotificationDraft {
    match alert {
        CreditAlert::Warning => NotificationDraft::to_user(
            user_id.clone(),
            Category::Warning,
            "Low credits",
            format!("You have {credits} credits left. Consider upgrading your plan."),
        )
        .with_priority(Priority::Normal),
        CreditAlert::Urgent => NotificationDraft::to_user(
            user_id.clone(),
            Category::Error,
            "Credits almost exhausted",
            format!("Only {credits} credits remain. Upgrade now to keep chatting."),
        )
        .with_priority(Priority::High),
    }
    .with_source(SOURCE_CREDITS)
}

#[cfg(test)]
mod tests {
    use beacon_protocol::Recipient;

    use super::*;

    #[test]
    fn test_credit_alert_urgent_is_error_with_high_priority() {
        let draft = credit_alert(&"bob".into(), CreditAlert::Urgent, 1245);
        assert_eq!(draft.category, Category::Error);
        assert_eq!(draft.recipient, Recipient::User("bob".into()));
        let metadata = draft.metadata.unwrap();
        assert_eq!(metadata.source.as_deref(), Some(SOURCE_CREDITS));
        assert_eq!(metadata.priority, Some(Priority::High));
        assert!(draft.message.contains("1245"));
    }

    #[test]
    fn test_welcome_uses_display_name() {
        let draft = welcome(&"alice".into(), "Alice");
        assert_eq!(draft.message, "Welcome back, Alice!");
        assert_eq!(draft.metadata.unwrap().source.as_deref(), Some(SOURCE_AUTH));
    }
}
