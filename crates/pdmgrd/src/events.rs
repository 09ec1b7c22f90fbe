//! Router-management events fed to the coordinator as JSON lines.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pd_mgr::PdMgr;

/// One lifecycle call on the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RouterEvent {
    AddRouter {
        router_id: String,
        #[serde(default)]
        namespace: Option<String>,
    },
    RemoveRouter {
        router_id: String,
    },
    AddGateway {
        router_id: String,
        gw_ifname: String,
    },
    RemoveGateway {
        router_id: String,
    },
    EnableSubnet {
        router_id: String,
        subnet_id: String,
        prefix: String,
        ri_ifname: String,
        mac: String,
    },
    DisableSubnet {
        router_id: String,
        subnet_id: String,
    },
    UpdateSubnet {
        router_id: String,
        subnet_id: String,
        prefix: String,
    },
    RemoveStaleInterface {
        router_id: String,
        ifname: String,
    },
    SyncRouter {
        router_id: String,
    },
}

/// Parses one event line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> CfgMgrResult<Option<RouterEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| CfgMgrError::invalid_config("event", format!("{}: {}", line, e)))
}

/// Applies `event` to the coordinator.
pub async fn dispatch(mgr: &PdMgr, event: RouterEvent) -> CfgMgrResult<()> {
    match event {
        RouterEvent::AddRouter {
            router_id,
            namespace,
        } => {
            mgr.add_router(&router_id, namespace).await;
            Ok(())
        }
        RouterEvent::RemoveRouter { router_id } => mgr.remove_router(&router_id).await,
        RouterEvent::AddGateway {
            router_id,
            gw_ifname,
        } => mgr.add_gateway(&router_id, &gw_ifname).await,
        RouterEvent::RemoveGateway { router_id } => mgr.remove_gateway(&router_id).await,
        RouterEvent::EnableSubnet {
            router_id,
            subnet_id,
            prefix,
            ri_ifname,
            mac,
        } => {
            mgr.enable_subnet(&router_id, &subnet_id, &prefix, &ri_ifname, &mac)
                .await
        }
        RouterEvent::DisableSubnet {
            router_id,
            subnet_id,
        } => mgr.disable_subnet(&router_id, &subnet_id).await,
        RouterEvent::UpdateSubnet {
            router_id,
            subnet_id,
            prefix,
        } => {
            if let Some(old) = mgr.update_subnet(&router_id, &subnet_id, &prefix).await {
                info!(router_id = %router_id, subnet_id = %subnet_id, old = %old, new = %prefix, "Subnet prefix drifted");
            }
            Ok(())
        }
        RouterEvent::RemoveStaleInterface { router_id, ifname } => {
            mgr.remove_stale_router_interface(&router_id, &ifname).await
        }
        RouterEvent::SyncRouter { router_id } => mgr.sync_router(&router_id).await,
    }
}

/// Reads events from `reader` until EOF or shutdown. Bad lines and failed
/// operations are logged and skipped.
pub async fn run_event_feed<R>(mgr: Arc<PdMgr>, reader: R, shutdown: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Event feed closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read event feed");
                break;
            }
        };

        let event = match parse_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed event");
                continue;
            }
        };
        debug!(?event, "Dispatching event");
        if let Err(e) = dispatch(&mgr, event).await {
            warn!(error = %e, "Event failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_add_router() {
        let event = parse_line(r#"{"op":"add_router","router_id":"r1","namespace":"qrouter-r1"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            RouterEvent::AddRouter {
                router_id: "r1".to_string(),
                namespace: Some("qrouter-r1".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_namespace_optional() {
        let event = parse_line(r#"{"op":"add_router","router_id":"r1"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            RouterEvent::AddRouter {
                router_id: "r1".to_string(),
                namespace: None,
            }
        );
    }

    #[test]
    fn test_parse_enable_subnet() {
        let line = r#"{"op":"enable_subnet","router_id":"r1","subnet_id":"s1","prefix":"::/64","ri_ifname":"qr-1","mac":"fa:16:3e:12:34:56"}"#;
        match parse_line(line).unwrap() {
            Some(RouterEvent::EnableSubnet { ri_ifname, mac, .. }) => {
                assert_eq!(ri_ifname, "qr-1");
                assert_eq!(mac, "fa:16:3e:12:34:56");
            }
            other => panic!("Expected EnableSubnet, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# replayed at startup").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("{not json").is_err());
        assert!(parse_line(r#"{"op":"reboot"}"#).is_err());
        assert!(parse_line(r#"{"op":"remove_router"}"#).is_err());
    }

    #[test]
    fn test_event_serialization() {
        let event = RouterEvent::RemoveStaleInterface {
            router_id: "r1".to_string(),
            ifname: "qr-9".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""op":"remove_stale_interface""#));
    }
}
