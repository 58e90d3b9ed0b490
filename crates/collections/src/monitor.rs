//! Session and action records observed from the gateway.

use {
    moltis_protocol::{
        EventFrame,
        events,
        monitor::{
            ActionKind, AgentEventPayload, ChatEventPayload, ChatState, MonitorAction,
            MonitorSession, SessionStatus,
        },
    },
    serde_json::Value,
    tracing::debug,
};

use crate::{collection::LocalCollection, now_ms};

pub const SESSIONS_COLLECTION_ID: &str = "monitor-sessions";
pub const ACTIONS_COLLECTION_ID: &str = "monitor-actions";

const SUMMARY_MAX_CHARS: usize = 120;

/// The monitor's two stores: sessions keyed by `key`, actions keyed by `id`.
#[derive(Debug, Clone)]
pub struct MonitorCollections {
    pub sessions: LocalCollection<String, MonitorSession>,
    pub actions: LocalCollection<String, MonitorAction>,
}

impl Default for MonitorCollections {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorCollections {
    pub fn new() -> Self {
        Self {
            sessions: LocalCollection::new(SESSIONS_COLLECTION_ID, |s: &MonitorSession| {
                s.key.clone()
            }),
            actions: LocalCollection::new(ACTIONS_COLLECTION_ID, |a: &MonitorAction| a.id.clone()),
        }
    }

    /// Insert `session`, or overwrite the stored session with the same key.
    /// Optional fields missing from `session` keep their stored values.
    pub fn upsert_session(&self, session: MonitorSession) {
        let merged = self.sessions.upsert_with(session, |stored, incoming| {
            stored.label = incoming.label.or(stored.label.take());
            stored.agent_id = incoming.agent_id.or(stored.agent_id.take());
            stored.channel = incoming.channel.or(stored.channel.take());
            stored.status = incoming.status;
            stored.last_activity_at = incoming.last_activity_at;
            stored.message_count = incoming.message_count;
        });
        if let Err(e) = merged {
            debug!(error = %e, "session upsert rejected");
        }
    }

    /// Record an action unless one with the same id exists. Returns whether
    /// it was stored.
    pub fn add_action(&self, action: MonitorAction) -> bool {
        self.actions.insert_if_absent(action)
    }

    /// Set a session's status and bump its activity time. Unknown keys are
    /// ignored; returns whether a session was updated.
    pub fn update_session_status(&self, key: &str, status: SessionStatus) -> bool {
        self.sessions
            .update(&key.to_string(), |session| {
                session.status = status;
                session.last_activity_at = now_ms();
            })
            .is_ok()
    }

    pub fn clear_collections(&self) {
        self.sessions.clear();
        self.actions.clear();
    }

    /// Load a `sessions.list` result.
    pub fn seed_sessions(&self, sessions: impl IntoIterator<Item = MonitorSession>) -> usize {
        let mut n = 0;
        for session in sessions {
            self.upsert_session(session);
            n += 1;
        }
        n
    }

    /// Actions for one session, oldest first.
    pub fn actions_for(&self, session_key: &str) -> Vec<MonitorAction> {
        self.actions
            .snapshot()
            .into_iter()
            .filter(|a| a.session_key == session_key)
            .collect()
    }

    // ── Gateway events ───────────────────────────────────────────────

    /// Apply a gateway event to the stores. Returns `false` for events that
    /// carry nothing the monitor tracks.
    pub fn apply_event(&self, frame: &EventFrame) -> bool {
        let Some(payload) = frame.payload.clone() else {
            return false;
        };
        match frame.event.as_str() {
            events::CHAT => match serde_json::from_value::<ChatEventPayload>(payload) {
                Ok(chat) => self.apply_chat(&chat, frame.seq),
                Err(e) => {
                    debug!(error = %e, "ignoring chat event with unexpected payload");
                    false
                },
            },
            events::AGENT => match serde_json::from_value::<AgentEventPayload>(payload) {
                Ok(agent) => self.apply_agent(&agent, frame.seq),
                Err(e) => {
                    debug!(error = %e, "ignoring agent event with unexpected payload");
                    false
                },
            },
            _ => false,
        }
    }

    fn apply_chat(&self, chat: &ChatEventPayload, frame_seq: Option<u64>) -> bool {
        let seq = chat.seq.or(frame_seq);
        let id = action_id(chat.run_id.as_deref(), &chat.session_key, events::CHAT, seq);
        match chat.state {
            ChatState::Delta => {
                self.touch_session(&chat.session_key, Some(SessionStatus::Thinking), false);
            },
            ChatState::Final => {
                self.touch_session(&chat.session_key, Some(SessionStatus::Active), true);
                self.add_action(MonitorAction {
                    id,
                    session_key: chat.session_key.clone(),
                    run_id: chat.run_id.clone(),
                    kind: ActionKind::Message,
                    summary: chat
                        .message
                        .as_ref()
                        .and_then(message_text)
                        .map(|text| truncate(&text))
                        .unwrap_or_else(|| "reply".into()),
                    detail: chat.message.clone(),
                    timestamp: now_ms(),
                });
            },
            ChatState::Error => {
                self.touch_session(&chat.session_key, Some(SessionStatus::Error), false);
                self.add_action(MonitorAction {
                    id,
                    session_key: chat.session_key.clone(),
                    run_id: chat.run_id.clone(),
                    kind: ActionKind::Error,
                    summary: truncate(chat.error_message.as_deref().unwrap_or("chat error")),
                    detail: None,
                    timestamp: now_ms(),
                });
            },
            ChatState::Aborted => {
                self.touch_session(&chat.session_key, Some(SessionStatus::Idle), false);
            },
        }
        true
    }

    fn apply_agent(&self, agent: &AgentEventPayload, frame_seq: Option<u64>) -> bool {
        let seq = agent.seq.or(frame_seq);
        let id = action_id(agent.run_id.as_deref(), &agent.session_key, events::AGENT, seq);
        let phase = agent.data.get("phase").and_then(Value::as_str);

        let (status, kind, summary) = match agent.stream.as_str() {
            "lifecycle" => {
                let status = match phase {
                    Some("start") => SessionStatus::Thinking,
                    Some("end") => SessionStatus::Idle,
                    Some("error") => SessionStatus::Error,
                    _ => return false,
                };
                let summary = match agent.data.get("error").and_then(Value::as_str) {
                    Some(error) if status == SessionStatus::Error => {
                        truncate(&format!("run failed: {error}"))
                    },
                    _ => format!("run {}", phase.unwrap_or_default()),
                };
                (Some(status), ActionKind::Lifecycle, summary)
            },
            "tool" => {
                let name = agent
                    .data
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("tool");
                if phase == Some("start") {
                    (None, ActionKind::ToolCall, name.to_string())
                } else {
                    (None, ActionKind::ToolResult, format!("{name} finished"))
                }
            },
            other => {
                debug!(stream = other, "ignoring agent stream");
                return false;
            },
        };

        self.touch_session(&agent.session_key, status, false);
        self.add_action(MonitorAction {
            id,
            session_key: agent.session_key.clone(),
            run_id: agent.run_id.clone(),
            kind,
            summary,
            detail: Some(agent.data.clone()),
            timestamp: now_ms(),
        });
        true
    }

    /// Refresh a session's activity, creating it if unknown. A new session
    /// without an explicit status starts out `Thinking`.
    fn touch_session(&self, key: &str, status: Option<SessionStatus>, message: bool) {
        let now = now_ms();
        let mut fresh = MonitorSession::new(key);
        fresh.status = status.unwrap_or(SessionStatus::Thinking);
        fresh.last_activity_at = now;
        fresh.message_count = u32::from(message);
        let touched = self.sessions.upsert_with(fresh, |session, _| {
            if let Some(status) = status {
                session.status = status;
            }
            session.last_activity_at = now;
            if message {
                session.message_count += 1;
            }
        });
        if let Err(e) = touched {
            debug!(error = %e, "session touch rejected");
        }
    }
}

fn action_id(run_id: Option<&str>, session_key: &str, event: &str, seq: Option<u64>) -> String {
    match (run_id, seq) {
        (Some(run), Some(seq)) => format!("{run}:{event}:{seq}"),
        (None, Some(seq)) => format!("{session_key}:{event}:{seq}"),
        (_, None) => uuid::Uuid::new_v4().to_string(),
    }
}

/// Plain text of a chat message: a string `content`, or the `text` parts
/// of a content-block array.
fn message_text(message: &Value) -> Option<String> {
    if let Some(text) = message.as_str() {
        return Some(text.to_string());
    }
    match message.get("content")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => {
            let text: Vec<&str> = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            (!text.is_empty()).then(|| text.join(" "))
        },
        _ => None,
    }
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= SUMMARY_MAX_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(SUMMARY_MAX_CHARS - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    fn action(id: &str, summary: &str) -> MonitorAction {
        MonitorAction {
            id: id.into(),
            session_key: "main".into(),
            run_id: None,
            kind: ActionKind::Message,
            summary: summary.into(),
            detail: None,
            timestamp: 1,
        }
    }

    fn chat(state: &str, seq: u64) -> EventFrame {
        EventFrame::new(
            events::CHAT,
            json!({
                "sessionKey": "main",
                "runId": "run-1",
                "seq": seq,
                "state": state,
                "message": { "role": "assistant", "content": [{ "type": "text", "text": "all done" }] },
                "errorMessage": "model overloaded"
            }),
        )
    }

    fn agent(stream: &str, data: Value, seq: u64) -> EventFrame {
        EventFrame::new(
            events::AGENT,
            json!({ "sessionKey": "main", "runId": "run-1", "seq": seq, "stream": stream, "data": data }),
        )
    }

    // ── Helpers ──────────────────────────────────────────────────────

    #[test]
    fn add_action_is_first_write_wins() {
        let monitor = MonitorCollections::new();
        assert!(monitor.add_action(action("a1", "first")));
        assert!(!monitor.add_action(action("a1", "second")));
        assert_eq!(monitor.actions.len(), 1);
        assert_eq!(monitor.actions.get(&"a1".into()).unwrap().summary, "first");
    }

    #[test]
    fn upsert_session_keeps_one_record_with_latest_values() {
        let monitor = MonitorCollections::new();
        let mut first = MonitorSession::new("main");
        first.label = Some("Main".into());
        first.message_count = 1;
        monitor.upsert_session(first);

        let mut second = MonitorSession::new("main");
        second.status = SessionStatus::Active;
        second.message_count = 5;
        monitor.upsert_session(second);

        assert_eq!(monitor.sessions.len(), 1);
        let stored = monitor.sessions.get(&"main".into()).unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        assert_eq!(stored.message_count, 5);
        assert_eq!(stored.label.as_deref(), Some("Main"));
    }

    #[test]
    fn concurrent_touches_of_a_new_session_count_every_message() {
        let monitor = MonitorCollections::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let monitor = monitor.clone();
                scope.spawn(move || {
                    for _ in 0..50 {
                        monitor.touch_session("fresh", None, true);
                    }
                });
            }
        });
        let stored = monitor.sessions.get(&"fresh".into()).unwrap();
        assert_eq!(stored.message_count, 400);
        assert_eq!(stored.status, SessionStatus::Thinking);
    }

    #[test]
    fn upsert_session_merges_with_a_prior_touch() {
        let monitor = MonitorCollections::new();
        monitor.touch_session("main", Some(SessionStatus::Thinking), true);

        let mut listed = MonitorSession::new("main");
        listed.agent_id = Some("main-agent".into());
        listed.message_count = 7;
        monitor.upsert_session(listed);

        let stored = monitor.sessions.get(&"main".into()).unwrap();
        assert_eq!(stored.agent_id.as_deref(), Some("main-agent"));
        assert_eq!(stored.message_count, 7);
        assert_eq!(monitor.sessions.len(), 1);
    }

    #[test]
    fn update_session_status_ignores_unknown_keys() {
        let monitor = MonitorCollections::new();
        assert!(!monitor.update_session_status("ghost", SessionStatus::Error));
        assert!(monitor.sessions.is_empty());

        monitor.upsert_session(MonitorSession::new("main"));
        assert!(monitor.update_session_status("main", SessionStatus::Thinking));
        let stored = monitor.sessions.get(&"main".into()).unwrap();
        assert_eq!(stored.status, SessionStatus::Thinking);
        assert!(stored.last_activity_at > 0);
    }

    #[test]
    fn clear_collections_empties_both() {
        let monitor = MonitorCollections::new();
        monitor.seed_sessions([MonitorSession::new("a"), MonitorSession::new("b")]);
        monitor.add_action(action("x", "y"));
        monitor.clear_collections();
        assert!(monitor.sessions.is_empty());
        assert!(monitor.actions.is_empty());
    }

    // ── Events ───────────────────────────────────────────────────────

    #[rstest]
    #[case("delta", SessionStatus::Thinking, 0)]
    #[case("final", SessionStatus::Active, 1)]
    #[case("error", SessionStatus::Error, 1)]
    #[case("aborted", SessionStatus::Idle, 0)]
    fn chat_states_map_to_session_status(
        #[case] state: &str,
        #[case] status: SessionStatus,
        #[case] actions: usize,
    ) {
        let monitor = MonitorCollections::new();
        assert!(monitor.apply_event(&chat(state, 3)));
        assert_eq!(monitor.sessions.get(&"main".into()).unwrap().status, status);
        assert_eq!(monitor.actions.len(), actions);
    }

    #[test]
    fn final_chat_records_message_text() {
        let monitor = MonitorCollections::new();
        monitor.apply_event(&chat("final", 9));
        let action = monitor.actions.get(&"run-1:chat:9".into()).unwrap();
        assert_eq!(action.kind, ActionKind::Message);
        assert_eq!(action.summary, "all done");
        assert_eq!(monitor.sessions.get(&"main".into()).unwrap().message_count, 1);
    }

    #[test]
    fn replayed_events_do_not_duplicate_actions() {
        let monitor = MonitorCollections::new();
        monitor.apply_event(&chat("final", 4));
        monitor.apply_event(&chat("final", 4));
        assert_eq!(monitor.actions.len(), 1);
    }

    #[rstest]
    #[case("start", SessionStatus::Thinking)]
    #[case("end", SessionStatus::Idle)]
    #[case("error", SessionStatus::Error)]
    fn lifecycle_phases_map_to_status(#[case] phase: &str, #[case] status: SessionStatus) {
        let monitor = MonitorCollections::new();
        assert!(monitor.apply_event(&agent("lifecycle", json!({ "phase": phase }), 1)));
        assert_eq!(monitor.sessions.get(&"main".into()).unwrap().status, status);
        let action = monitor.actions.get(&"run-1:agent:1".into()).unwrap();
        assert_eq!(action.kind, ActionKind::Lifecycle);
    }

    #[test]
    fn tool_events_record_call_and_result() {
        let monitor = MonitorCollections::new();
        monitor.upsert_session(MonitorSession::new("main"));
        monitor.apply_event(&agent("tool", json!({ "phase": "start", "name": "exec" }), 1));
        monitor.apply_event(&agent("tool", json!({ "phase": "result", "name": "exec" }), 2));

        let actions = monitor.actions_for("main");
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind, ActionKind::ToolCall);
        assert_eq!(actions[0].summary, "exec");
        assert_eq!(actions[1].kind, ActionKind::ToolResult);
        // Tool events leave an existing session's status alone.
        assert_eq!(
            monitor.sessions.get(&"main".into()).unwrap().status,
            SessionStatus::Idle
        );
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let monitor = MonitorCollections::new();
        assert!(!monitor.apply_event(&EventFrame::new("tick", json!({ "ts": 1 }))));
        assert!(!monitor.apply_event(&agent("assistant", json!({ "text": "hi" }), 1)));
        assert!(!monitor.apply_event(&EventFrame::new(events::CHAT, json!({ "bogus": true }))));
        assert!(monitor.sessions.is_empty());
        assert!(monitor.actions.is_empty());
    }

    #[test]
    fn events_without_run_id_fall_back_to_session_key() {
        assert_eq!(action_id(None, "main", "chat", Some(2)), "main:chat:2");
        assert_eq!(action_id(Some("r"), "main", "agent", Some(2)), "r:agent:2");
        assert_ne!(action_id(None, "main", "chat", None), action_id(None, "main", "chat", None));
    }

    #[test]
    fn long_summaries_are_truncated() {
        let long = "x".repeat(500);
        let out = truncate(&long);
        assert_eq!(out.chars().count(), SUMMARY_MAX_CHARS);
        assert!(out.ends_with('…'));
    }
}
