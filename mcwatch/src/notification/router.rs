//! Connection pool keyed by resolved gateway settings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use onebot_client::{ActionError, ConnectionOptions, OneBotConnection, PlayerChange, ResponseFrame};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::Notifier;
use super::settings::{GatewayDefaults, ResolvedTarget, resolve};
use crate::domain::TargetOverrides;

/// Routes sends to one shared connection per distinct resolved target.
///
/// Connections are opened lazily on first use and live until [`shutdown`](Self::shutdown).
pub struct NotificationRouter {
    defaults: GatewayDefaults,
    options: ConnectionOptions,
    connections: Mutex<HashMap<ResolvedTarget, Arc<OneBotConnection>>>,
}

impl NotificationRouter {
    pub fn new(defaults: GatewayDefaults) -> Self {
        Self::with_options(defaults, ConnectionOptions::default())
    }

    pub fn with_options(defaults: GatewayDefaults, options: ConnectionOptions) -> Self {
        Self {
            defaults,
            options,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn defaults(&self) -> &GatewayDefaults {
        &self.defaults
    }

    pub fn resolve(&self, overrides: &TargetOverrides) -> ResolvedTarget {
        resolve(overrides, &self.defaults)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// The pooled connection for these overrides, opening it if needed.
    ///
    /// Returns `None` when no endpoint or target id resolves.
    pub fn connection(&self, overrides: &TargetOverrides) -> Option<Arc<OneBotConnection>> {
        let resolved = self.resolve(overrides);
        if !resolved.is_addressable() {
            debug!("Binding has no gateway endpoint or target, skipping");
            return None;
        }

        let mut pool = self.connections.lock();
        if let Some(connection) = pool.get(&resolved) {
            return Some(connection.clone());
        }

        info!(
            url = %resolved.ws_url,
            target_type = %resolved.target_kind,
            target_id = %resolved.target_id,
            "Opening gateway connection"
        );
        let connection = Arc::new(OneBotConnection::spawn_with(resolved.clone(), self.options));
        pool.insert(resolved, connection.clone());
        Some(connection)
    }

    /// Stop every pooled connection.
    pub fn shutdown(&self) {
        let connections: Vec<_> = self.connections.lock().drain().collect();
        if !connections.is_empty() {
            info!(count = connections.len(), "Closing gateway connections");
        }
        for (_, connection) in connections {
            connection.stop();
        }
    }
}

#[async_trait]
impl Notifier for NotificationRouter {
    async fn send_text(&self, target: &TargetOverrides, text: &str) {
        if let Some(connection) = self.connection(target) {
            connection.send_text(text).await;
        }
    }

    async fn send_image(&self, target: &TargetOverrides, image: &[u8], caption: Option<&str>) {
        if let Some(connection) = self.connection(target) {
            connection.send_image(image, caption).await;
        }
    }

    async fn send_player_change(&self, target: &TargetOverrides, change: &PlayerChange) {
        if let Some(connection) = self.connection(target) {
            connection.send_player_change(change).await;
        }
    }

    async fn send_text_with_result(
        &self,
        target: &TargetOverrides,
        text: &str,
        timeout: Duration,
    ) -> Result<ResponseFrame, ActionError> {
        match self.connection(target) {
            Some(connection) => connection.send_text_with_result(text, timeout).await,
            None => {
                let resolved = self.resolve(target);
                if resolved.ws_url.is_empty() {
                    Err(ActionError::MissingField("ws_url"))
                } else {
                    Err(ActionError::MissingField("target_id"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(ws_url: &str, target_id: &str) -> TargetOverrides {
        TargetOverrides {
            ws_url: Some(ws_url.into()),
            target_id: Some(target_id.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_pool_shares_identical_targets() {
        let router = NotificationRouter::new(GatewayDefaults {
            ws_url: "ws://127.0.0.1:1".into(),
            target_id: "1".into(),
            ..Default::default()
        });

        let a = router.connection(&TargetOverrides::default()).unwrap();
        // Same resolved tuple through an explicit override.
        let b = router.connection(&overrides("ws://127.0.0.1:1", "1")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(router.connection_count(), 1);

        router.connection(&overrides("ws://127.0.0.1:1", "2")).unwrap();
        assert_eq!(router.connection_count(), 2);

        router.shutdown();
        assert_eq!(router.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_unaddressable_binding_creates_nothing() {
        let router = NotificationRouter::new(GatewayDefaults::default());
        assert!(router.connection(&TargetOverrides::default()).is_none());
        router.send_text(&TargetOverrides::default(), "hi").await;
        assert_eq!(router.connection_count(), 0);

        let err = router
            .send_text_with_result(&TargetOverrides::default(), "hi", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::MissingField("ws_url"));

        let err = router
            .send_text_with_result(&overrides("ws://h", ""), "hi", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::MissingField("target_id"));
    }
}
