use std::time::Duration;

use {
    anyhow::{Context, Result},
    clap::Parser,
    tokio::sync::broadcast::error::RecvError,
    tracing::{info, warn},
};

use {
    moltis_collections::{CollectionChange, MonitorCollections},
    moltis_gateway_client::{ConnectionState, GatewayClient, GatewayClientConfig, ReconnectPolicy},
    moltis_protocol::{
        DEFAULT_GATEWAY_URL,
        monitor::{ActionKind, MonitorAction, MonitorSession, SessionsListParams},
    },
};

/// Watch sessions and agent activity on a moltis gateway.
///
/// Connects over WebSocket, loads the current sessions, then prints every
/// session status change and agent action as gateway events arrive.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Gateway WebSocket URL.
    #[arg(long, env = "MOLTIS_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    url: String,

    /// Bearer token sent in the hello handshake.
    #[arg(long, env = "MOLTIS_GATEWAY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Maximum number of sessions to load at startup.
    #[arg(long)]
    limit: Option<u32>,

    /// Include closed sessions in the initial listing.
    #[arg(long)]
    include_closed: bool,

    /// Seconds between reconnect attempts after the connection drops.
    #[arg(long, default_value_t = 5)]
    reconnect_secs: u64,

    /// Exit instead of reconnecting when the connection drops.
    #[arg(long)]
    no_reconnect: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn client_config(&self) -> GatewayClientConfig {
        let mut config = GatewayClientConfig::new(self.url.clone());
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            config = config.with_token(token);
        }
        config.reconnect = if self.no_reconnect {
            ReconnectPolicy::disabled()
        } else {
            ReconnectPolicy::fixed(Duration::from_secs(self.reconnect_secs.max(1)))
        };
        config
    }

    fn list_params(&self) -> SessionsListParams {
        SessionsListParams {
            limit: self.limit,
            include_closed: self.include_closed.then_some(true),
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let client =
        GatewayClient::new(args.client_config()).context("invalid gateway configuration")?;
    let hello = client
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", client.config().url))?;
    info!(
        url = %client.config().url,
        protocol = ?hello.protocol,
        server = hello.server.as_ref().map(|s| s.version.as_str()),
        "monitor connected"
    );

    let monitor = MonitorCollections::new();
    let sessions = client
        .list_sessions(&args.list_params())
        .await
        .context("failed to list sessions")?;
    for session in &sessions {
        println!("{}", format_session(session));
    }
    monitor.seed_sessions(sessions);

    let bridge = monitor.clone();
    let subscription = client.on_event(move |event| {
        bridge.apply_event(event);
    });

    let mut session_changes = monitor.sessions.subscribe();
    let mut action_changes = monitor.actions.subscribe();
    let mut state = client.watch_state();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            },
            change = session_changes.recv() => match change {
                Ok(CollectionChange::Inserted(key) | CollectionChange::Updated(key)) => {
                    if let Some(session) = monitor.sessions.get(&key) {
                        println!("{}", format_session(&session));
                    }
                },
                Ok(_) => {},
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "session updates lagged"),
                Err(RecvError::Closed) => break,
            },
            change = action_changes.recv() => match change {
                Ok(CollectionChange::Inserted(id)) => {
                    if let Some(action) = monitor.actions.get(&id) {
                        println!("{}", format_action(&action));
                    }
                },
                Ok(_) => {},
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "action updates lagged"),
                Err(RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                info!(state = %current, "gateway connection state");
                if args.no_reconnect && current == ConnectionState::Disconnected {
                    warn!("connection lost and reconnect disabled");
                    break;
                }
            },
        }
    }

    subscription.unsubscribe();
    client.disconnect();
    Ok(())
}

fn format_session(session: &MonitorSession) -> String {
    let label = session.label.as_deref().unwrap_or(&session.key);
    format!(
        "[session] {label:<24} {status:<9} messages={count}",
        status = session.status,
        count = session.message_count
    )
}

fn format_action(action: &MonitorAction) -> String {
    let kind = kind_label(action.kind);
    format!("[{}] {kind:<11} {}", action.session_key, action.summary)
}

fn kind_label(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Message => "message",
        ActionKind::ToolCall => "tool_call",
        ActionKind::ToolResult => "tool_result",
        ActionKind::Lifecycle => "lifecycle",
        ActionKind::Error => "error",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, moltis_protocol::monitor::SessionStatus};

    #[test]
    fn flags_build_client_config() {
        let args = Args::try_parse_from([
            "moltis-monitor",
            "--url",
            "ws://10.0.0.5:18789",
            "--token",
            "abc",
            "--reconnect-secs",
            "2",
        ])
        .unwrap();
        let config = args.client_config();
        assert_eq!(config.url, "ws://10.0.0.5:18789");
        assert!(config.token.is_some());
        assert_eq!(config.reconnect.delay_for(3), Duration::from_secs(2));
        config.validate().unwrap();
    }

    #[test]
    fn no_reconnect_disables_policy() {
        let args =
            Args::try_parse_from(["moltis-monitor", "--url", "ws://h:1", "--no-reconnect"]).unwrap();
        assert!(!args.client_config().reconnect.enabled);
    }

    #[test]
    fn list_params_only_set_requested_filters() {
        let args = Args::try_parse_from(["moltis-monitor", "--limit", "10"]).unwrap();
        let params = args.list_params();
        assert_eq!(params.limit, Some(10));
        assert_eq!(params.include_closed, None);
    }

    #[test]
    fn formats_session_and_action_lines() {
        let mut session = MonitorSession::new("main");
        session.status = SessionStatus::Thinking;
        session.message_count = 3;
        let line = format_session(&session);
        assert!(line.contains("main"));
        assert!(line.contains("thinking"));
        assert!(line.ends_with("messages=3"));

        let action = MonitorAction {
            id: "r:agent:1".into(),
            session_key: "main".into(),
            run_id: Some("r".into()),
            kind: ActionKind::ToolCall,
            summary: "exec".into(),
            detail: None,
            timestamp: 0,
        };
        assert_eq!(format_action(&action), "[main] tool_call   exec");
    }
}
