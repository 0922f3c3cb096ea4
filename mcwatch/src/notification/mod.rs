//! Delivery of monitor notices to chat targets.
//!
//! The monitor and the map worker only see the [`Notifier`] trait. The
//! production implementation is [`NotificationRouter`], which resolves each
//! binding against [`GatewayDefaults`] and pools gateway connections.

mod router;
mod settings;

pub use router::NotificationRouter;
pub use settings::{GatewayDefaults, ResolvedTarget, resolve};

use std::time::Duration;

use async_trait::async_trait;
use onebot_client::{ActionError, PlayerChange, ResponseFrame};

use crate::domain::TargetOverrides;

/// Sends addressed by a binding's target overrides.
///
/// All sends except [`send_text_with_result`](Notifier::send_text_with_result)
/// are best-effort and silently do nothing for unaddressable bindings.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, target: &TargetOverrides, text: &str);

    async fn send_image(&self, target: &TargetOverrides, image: &[u8], caption: Option<&str>);

    async fn send_player_change(&self, target: &TargetOverrides, change: &PlayerChange);

    async fn send_text_with_result(
        &self,
        target: &TargetOverrides,
        text: &str,
        timeout: Duration,
    ) -> Result<ResponseFrame, ActionError>;
}
