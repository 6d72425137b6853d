//! Notification handling contract

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{MixologyError, Result};
use crate::navigation::{Destination, Router};

/// Action carried by a tapped notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NotificationAction {
    OpenDrink { alias: String },
    OpenCollection { name: String },
    OpenFavorites,
    OpenBartender,
    Shake,
}

impl NotificationAction {
    /// Parse a notification payload such as `{"action":"open_drink","alias":"negroni"}`
    pub fn from_payload(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| MixologyError::InvalidInput(format!("notification payload: {}", e)))
    }

    pub fn destination(&self) -> Destination {
        match self {
            NotificationAction::OpenDrink { alias } => Destination::DrinkDetail {
                alias: alias.clone(),
            },
            NotificationAction::OpenCollection { name } => Destination::Collection {
                name: name.clone(),
            },
            NotificationAction::OpenFavorites => Destination::Favorites,
            NotificationAction::OpenBartender => Destination::Bartender,
            NotificationAction::Shake => Destination::Shake,
        }
    }
}

pub trait NotificationHandler: Send + Sync {
    fn handle(&self, action: NotificationAction);
}

/// Sends every notification action straight to its destination
pub struct RoutingNotificationHandler {
    router: Arc<dyn Router>,
}

impl RoutingNotificationHandler {
    pub fn new(router: Arc<dyn Router>) -> Self {
        Self { router }
    }
}

impl NotificationHandler for RoutingNotificationHandler {
    fn handle(&self, action: NotificationAction) {
        tracing::info!(?action, "Handling notification");
        self.router.navigate(action.destination());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::RecordingRouter;

    #[test]
    fn test_payload_routes_to_drink() {
        let router = Arc::new(RecordingRouter::new());
        let handler = RoutingNotificationHandler::new(router.clone());

        let action =
            NotificationAction::from_payload(r#"{"action":"open_drink","alias":"paloma"}"#).unwrap();
        handler.handle(action);
        handler.handle(NotificationAction::OpenFavorites);

        assert_eq!(
            router.destinations(),
            vec![
                Destination::DrinkDetail {
                    alias: "paloma".to_string()
                },
                Destination::Favorites,
            ]
        );
    }

    #[test]
    fn test_unknown_payload_is_invalid_input() {
        let err = NotificationAction::from_payload(r#"{"action":"launch_rocket"}"#).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
