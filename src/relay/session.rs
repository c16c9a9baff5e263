use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::corpus::Corpus;
use crate::error::{RelayError, StartupError};
use crate::llm::{ChatModel, ConversationHistory, ModelReply, ModelRequest, RetryPolicy, ToolResult};
use crate::profile::{compose_turn, UserProfile};
use crate::prompts::SYSTEM_INSTRUCTION;
use crate::tools::ToolRegistry;

use super::resolver::resolve_and_execute_tool_call;
use super::types::{RelayEvent, RelayState, ToolResolution, TurnOutcome};

/// 終了キーワードに対する固定応答
pub const EXIT_REPLY: &str = "Exiting chat...";

/// ラウンド上限到達時にモデルがテキストを返さなかった場合の応答
pub const ROUND_LIMIT_REPLY: &str =
    "I could not finish looking that up within this turn. Please ask again in a moment.";

const EXIT_KEYWORDS: [&str; 2] = ["exit", "quit"];

/// `"exit"` / `"quit"` (前後空白無視・大文字小文字無視)
pub fn is_exit_command(message: &str) -> bool {
    let trimmed = message.trim();
    EXIT_KEYWORDS.iter().any(|k| trimmed.eq_ignore_ascii_case(k))
}

/// One conversation against the hosted model.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    history: ConversationHistory,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), history: ConversationHistory::new() }
    }

    /// Session with a random id, for requests that carry no conversation id.
    pub fn ephemeral() -> Self {
        Self::new(format!("ephemeral-{}", Uuid::new_v4().simple()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }
}

/// リレーの動作パラメータ
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub system_instruction: String,
    pub retry: RetryPolicy,
    /// 1ターン内で実行するツールラウンドの上限
    pub max_tool_rounds: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            retry: RetryPolicy::default(),
            max_tool_rounds: 1,
        }
    }
}

/// Drives turns of a `Session` against the hosted model.
///
/// Holds no conversation state itself; the caller passes the session in, so
/// whoever owns the session decides how turns are serialized.
pub struct SessionRelay {
    model: Arc<dyn ChatModel>,
    registry: ToolRegistry,
    corpus: Corpus,
    settings: RelaySettings,
}

impl std::fmt::Debug for SessionRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRelay")
            .field("provider", &self.model.provider())
            .field("tools", &self.registry.names())
            .field("documents", &self.corpus.len())
            .field("settings", &self.settings)
            .finish()
    }
}

type EventSink<'a> = Option<&'a mut (dyn FnMut(&RelayEvent) + Send)>;

// 状態遷移とイベント通知をまとめる
struct Tracker<'a> {
    state: RelayState,
    logger: EventSink<'a>,
}

impl Tracker<'_> {
    fn emit(&mut self, event: RelayEvent) {
        if let Some(cb) = self.logger.as_deref_mut() {
            cb(&event);
        }
    }

    fn to(&mut self, next: RelayState) {
        let from = self.state;
        self.state = next;
        self.emit(RelayEvent::Transition { from, to: next });
    }
}

impl SessionRelay {
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: ToolRegistry,
        corpus: Corpus,
        settings: RelaySettings,
    ) -> Result<Self, StartupError> {
        model.check_corpus(corpus.documents())?;
        info!(
            target: "relay",
            provider = model.provider(),
            tools = ?registry.names(),
            documents = corpus.len(),
            max_tool_rounds = settings.max_tool_rounds,
            "relay_ready"
        );
        Ok(Self { model, registry, corpus, settings })
    }

    pub fn provider(&self) -> &'static str {
        self.model.provider()
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    #[instrument(name = "handle_turn", skip(self, session, message, profile), fields(session = %session.id()))]
    pub async fn handle_turn(
        &self,
        session: &mut Session,
        message: &str,
        profile: &UserProfile,
    ) -> Result<TurnOutcome, RelayError> {
        self.handle_turn_internal(session, message, profile, None).await
    }

    #[instrument(name = "handle_turn_with_logger", skip(self, session, message, profile, logger), fields(session = %session.id()))]
    pub async fn handle_turn_with_logger(
        &self,
        session: &mut Session,
        message: &str,
        profile: &UserProfile,
        logger: impl FnMut(&RelayEvent) + Send,
    ) -> Result<TurnOutcome, RelayError> {
        let mut user_logger = logger;
        let mut log_and_forward = |ev: &RelayEvent| {
            debug!(target: "relay", event = %ev, "relay_event");
            user_logger(ev);
        };
        let opt_logger: EventSink<'_> = Some(&mut log_and_forward);
        self.handle_turn_internal(session, message, profile, opt_logger).await
    }

    async fn handle_turn_internal(
        &self,
        session: &mut Session,
        message: &str,
        profile: &UserProfile,
        logger: EventSink<'_>,
    ) -> Result<TurnOutcome, RelayError> {
        if is_exit_command(message) {
            debug!(target: "relay", "exit_keyword");
            return Ok(TurnOutcome { reply: EXIT_REPLY.to_string(), exited: true, resolutions: Vec::new(), tool_rounds: 0 });
        }
        if message.trim().is_empty() {
            return Err(RelayError::InvalidInput("message must not be empty".to_string()));
        }

        let checkpoint = session.history.len();
        session.history.add_user(self.corpus.documents(), compose_turn(message, profile));

        let mut tracker = Tracker { state: RelayState::Idle, logger };
        let result = self.run_rounds(session, &mut tracker).await;

        match &result {
            Ok(outcome) => info!(
                target: "relay",
                tool_rounds = outcome.tool_rounds,
                resolutions = outcome.resolutions.len(),
                reply_len = outcome.reply.len(),
                history_len = session.history.len(),
                "turn_done"
            ),
            Err(RelayError::Upstream(e)) => {
                // 失敗したターンは履歴から取り除き、呼び出し側がターンごと再送できるようにする
                session.history.truncate(checkpoint);
                warn!(target: "relay", error = %e, kind = "upstream", "turn_rolled_back");
            }
            Err(e) => warn!(target: "relay", error = %e, kind = e.kind(), "turn_failed"),
        }
        result
    }

    async fn run_rounds(&self, session: &mut Session, tracker: &mut Tracker<'_>) -> Result<TurnOutcome, RelayError> {
        let mut resolutions: Vec<ToolResolution> = Vec::new();
        let mut round = 0usize;
        tracker.to(RelayState::AwaitingModel);

        loop {
            let reply = self.call_model(&session.history).await?;
            tracker.emit(RelayEvent::ModelReplied {
                round,
                text_len: reply.text.as_deref().map_or(0, str::len),
                tool_calls: reply.tool_calls.len(),
            });
            session.history.add_model(reply.text.clone(), reply.tool_calls.clone());

            if !reply.has_tool_calls() {
                tracker.to(RelayState::Responded);
                return Ok(TurnOutcome {
                    reply: reply.text.unwrap_or_default(),
                    exited: false,
                    resolutions,
                    tool_rounds: round,
                });
            }

            if round >= self.settings.max_tool_rounds {
                // 上限後の呼び出しも1件ずつ応答して履歴を整合させる
                for call in &reply.tool_calls {
                    let resolution = ToolResolution::RoundLimitReached { name: call.name.clone() };
                    session.history.add_tool_result(ToolResult {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        payload: resolution.to_payload(),
                        is_error: true,
                    });
                    tracker.emit(RelayEvent::ToolResolved { round, resolution: resolution.clone() });
                    resolutions.push(resolution);
                }
                warn!(target: "relay", round, pending = reply.tool_calls.len(), "tool_round_limit");
                tracker.to(RelayState::Responded);
                return Ok(TurnOutcome {
                    reply: reply.text.unwrap_or_else(|| ROUND_LIMIT_REPLY.to_string()),
                    exited: false,
                    resolutions,
                    tool_rounds: round,
                });
            }

            round += 1;
            let mut unknown: Vec<String> = Vec::new();
            for call in &reply.tool_calls {
                tracker.to(RelayState::ToolRequested);
                tracker.emit(RelayEvent::ToolDispatched { round, name: call.name.clone() });
                debug!(target: "relay", round, tool = %call.name, call_id = %call.id, "tool_call");

                let resolution = resolve_and_execute_tool_call(call, &self.registry).await;
                match &resolution {
                    ToolResolution::Executed { .. } => {}
                    ToolResolution::ToolNotFound { requested } => unknown.push(requested.clone()),
                    other => warn!(target: "relay", round, resolution = %other, "tool_call_failed"),
                }

                tracker.to(RelayState::AwaitingToolResult);
                session.history.add_tool_result(ToolResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    payload: resolution.to_payload(),
                    is_error: !resolution.is_executed(),
                });
                tracker.emit(RelayEvent::ToolResolved { round, resolution: resolution.clone() });
                resolutions.push(resolution);
                tracker.to(RelayState::AwaitingModel);
            }

            if !unknown.is_empty() {
                return Err(RelayError::Protocol { requested: unknown });
            }
        }
    }

    async fn call_model(&self, history: &ConversationHistory) -> Result<ModelReply, RelayError> {
        let request = ModelRequest {
            system_instruction: &self.settings.system_instruction,
            tools: self.registry.definitions(),
            history: history.as_slice(),
        };
        let reply = self.settings.retry.run(|| self.model.generate(request)).await?;
        Ok(reply)
    }
}
