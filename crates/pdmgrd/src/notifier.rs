//! Delivery of learned prefixes to the rest of the system.

use async_trait::async_trait;
use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::PrefixUpdate;

#[async_trait]
pub trait PrefixNotifier: Send + Sync {
    /// Pushes one batch of subnet id -> prefix changes upstream.
    async fn send_prefix_update(&self, update: PrefixUpdate) -> CfgMgrResult<()>;
}

/// [`PrefixNotifier`] feeding an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<PrefixUpdate>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PrefixUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PrefixNotifier for ChannelNotifier {
    async fn send_prefix_update(&self, update: PrefixUpdate) -> CfgMgrResult<()> {
        debug!(subnets = update.len(), "Sending prefix update");
        self.tx
            .send(update)
            .map_err(|_| CfgMgrError::notifier("prefix update receiver closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let mut update = PrefixUpdate::new();
        update.insert("s1".to_string(), "2001:db8:1::/64".to_string());

        notifier.send_prefix_update(update.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(update));
    }

    #[tokio::test]
    async fn test_closed_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        let err = notifier
            .send_prefix_update(PrefixUpdate::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CfgMgrError::Notifier { .. }));
    }
}
