//! Core agent execution loop.
//!
//! Registration gates everything: nothing is fetched until the server has
//! accepted (or already knows) this identity. After that each cycle fetches
//! the inbox and handles the batch one message at a time: verify, check the
//! subject, dispatch, sign the reply, post it, acknowledge.

use std::sync::Arc;
use std::time::Duration;

use tether_commands::{CommandDispatcher, DispatchOutcome};
use tether_config::AgentConfig;
use tether_core::{
    Message, NonInstructionPolicy, OutboundMessage, TetherError, UnmatchedPolicy,
};
use tether_logging::{EventLogger, ProtocolEvent};
use tether_security::{Identity, TokenCodec, TrustedKey};
use tether_tools::{ExecConfig, LocalSystem};
use tether_transport::{HttpTransport, RegistrationOutcome, Transport};
use tracing::{debug, error, info, instrument, warn};

use crate::state::{AgentState, CycleReport};

/// Timing and policy knobs of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Pause between poll cycles.
    pub poll_interval: Duration,
    /// Pause between registration attempts.
    pub register_backoff: Duration,
    pub non_instruction: NonInstructionPolicy,
    pub unmatched: UnmatchedPolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            register_backoff: Duration::from_secs(10),
            non_instruction: NonInstructionPolicy::default(),
            unmatched: UnmatchedPolicy::default(),
        }
    }
}

impl From<&AgentConfig> for LoopSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            register_backoff: config.register_backoff,
            non_instruction: config.non_instruction,
            unmatched: config.unmatched,
        }
    }
}

pub struct AgentLoop {
    identity: Identity,
    trusted: TrustedKey,
    transport: Arc<dyn Transport>,
    dispatcher: CommandDispatcher,
    settings: LoopSettings,
    state: AgentState,
}

impl AgentLoop {
    pub fn new(
        identity: Identity,
        trusted: TrustedKey,
        transport: Arc<dyn Transport>,
        dispatcher: CommandDispatcher,
        settings: LoopSettings,
    ) -> Self {
        Self {
            identity,
            trusted,
            transport,
            dispatcher,
            settings,
            state: AgentState::Unregistered,
        }
    }

    /// Wire the HTTP transport and the local host operations from `config`.
    pub fn from_config(config: &AgentConfig, identity: Identity) -> Result<Self, TetherError> {
        let trusted = TrustedKey::from_pem(&config.master_public_key_pem)?;
        let transport = HttpTransport::new(
            config.remote_host.as_str(),
            config.request_timeout,
            config.body_encoding,
        )?;
        let system = LocalSystem::new(
            ExecConfig {
                timeout: config.shell_timeout,
                ..ExecConfig::default()
            },
            config.history_file.clone(),
        );
        Ok(Self::new(
            identity,
            trusted,
            Arc::new(transport),
            CommandDispatcher::new(Arc::new(system)),
            LoopSettings::from(config),
        ))
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn client_id(&self) -> &str {
        self.identity.client_id()
    }

    /// Register, then poll forever with the fixed pause between cycles.
    pub async fn run(&mut self) {
        self.register().await;
        loop {
            let report = self.run_cycle().await;
            debug!(?report, "[Agent] Cycle finished");
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Announce the identity until the server accepts it. Returns the number
    /// of attempts it took.
    #[instrument(skip(self), fields(client_id = %self.identity.client_id()))]
    pub async fn register(&mut self) -> u32 {
        let registration = self.identity.registration();
        let mut attempts = 0;

        loop {
            attempts += 1;
            self.state = AgentState::Registering { attempts };
            self.log_event(ProtocolEvent::RegistrationAttempt { attempt: attempts });

            match self.transport.register(&registration).await {
                outcome @ (RegistrationOutcome::Accepted | RegistrationOutcome::AlreadyRegistered) => {
                    let already_known = outcome == RegistrationOutcome::AlreadyRegistered;
                    info!(attempts, already_known, "[Agent] Registered");
                    self.log_event(ProtocolEvent::Registered {
                        attempts,
                        already_known,
                    });
                    self.state = AgentState::Active;
                    return attempts;
                }
                RegistrationOutcome::Rejected(e) => {
                    warn!(
                        attempt = attempts,
                        error = %e,
                        "[Agent] Registration failed; retrying in {:?}",
                        self.settings.register_backoff
                    );
                    self.log_event(ProtocolEvent::RegistrationFailed {
                        attempt: attempts,
                        reason: e.to_string(),
                    });
                    tokio::time::sleep(self.settings.register_backoff).await;
                }
            }
        }
    }

    /// One poll pass over the inbox. Registers first if needed.
    pub async fn run_cycle(&mut self) -> CycleReport {
        if self.state != AgentState::Active {
            self.register().await;
        }

        let inbox = self.transport.fetch_inbox(self.identity.client_id()).await;
        let mut report = CycleReport {
            fetched: inbox.len(),
            ..CycleReport::default()
        };
        if !inbox.is_empty() {
            debug!(count = inbox.len(), "[Agent] Fetched inbox");
        }

        for message in &inbox {
            let claims = match TokenCodec::verify(&message.content, &self.trusted) {
                Ok(claims) => claims,
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "[Agent] Dropping unverified message");
                    self.log_event(ProtocolEvent::MessageRejected {
                        message_id: message.id.clone(),
                        reason: e.to_string(),
                    });
                    report.rejected += 1;
                    continue;
                }
            };

            if !message.is_instruction() {
                match self.settings.non_instruction {
                    NonInstructionPolicy::Skip => {
                        debug!(message_id = %message.id, subject = %message.subject, "[Agent] Skipping non-instruction");
                        self.log_event(ProtocolEvent::MessageSkipped {
                            message_id: message.id.clone(),
                            subject: message.subject.clone(),
                        });
                        report.skipped += 1;
                        continue;
                    }
                    NonInstructionPolicy::AbortBatch => {
                        info!(message_id = %message.id, subject = %message.subject, "[Agent] Non-instruction ends this batch");
                        self.log_event(ProtocolEvent::BatchAborted {
                            message_id: message.id.clone(),
                            subject: message.subject.clone(),
                        });
                        report.aborted = true;
                        break;
                    }
                }
            }

            let output = match self.dispatcher.dispatch(&claims).await {
                DispatchOutcome::Output(text) => text,
                DispatchOutcome::NoMatchingOperation { selector } => {
                    report.unmatched += 1;
                    warn!(message_id = %message.id, "[Agent] Instruction names no known operation");
                    let text = format!(
                        "error: no matching operation for {}",
                        selector.as_deref().unwrap_or("<missing selector>")
                    );
                    self.log_event(ProtocolEvent::NoMatchingOperation {
                        message_id: message.id.clone(),
                        selector,
                    });
                    match self.settings.unmatched {
                        UnmatchedPolicy::Ignore => continue,
                        UnmatchedPolicy::ReplyError => text,
                    }
                }
            };

            self.reply_and_ack(message, output, &mut report).await;
        }

        report
    }

    /// Post the signed reply; acknowledge only if the reply went through.
    async fn reply_and_ack(&self, message: &Message, output: String, report: &mut CycleReport) {
        let token = match TokenCodec::sign_text(&output, self.identity.signing_key()) {
            Ok(token) => token,
            Err(e) => {
                error!(message_id = %message.id, error = %e, "[Agent] Could not sign reply");
                self.log_event(ProtocolEvent::ReplyFailed {
                    instruction_id: message.id.clone(),
                    reason: e.to_string(),
                });
                report.reply_failures += 1;
                return;
            }
        };

        let reply = OutboundMessage::reply(self.identity.client_id(), &message.id, token);
        if let Err(e) = self.transport.post_message(&reply).await {
            warn!(message_id = %message.id, error = %e, "[Agent] Reply not delivered; leaving instruction unacknowledged");
            self.log_event(ProtocolEvent::ReplyFailed {
                instruction_id: message.id.clone(),
                reason: e.to_string(),
            });
            report.reply_failures += 1;
            return;
        }
        report.replied += 1;
        self.log_event(ProtocolEvent::ReplyPosted {
            instruction_id: message.id.clone(),
        });

        match self.transport.post_ack(&message.id).await {
            Ok(()) => {
                report.acknowledged += 1;
                self.log_event(ProtocolEvent::Acknowledged {
                    message_id: message.id.clone(),
                });
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "[Agent] Acknowledgment failed");
                self.log_event(ProtocolEvent::AckFailed {
                    message_id: message.id.clone(),
                    reason: e.to_string(),
                });
                report.ack_failures += 1;
            }
        }
    }

    fn log_event(&self, event: ProtocolEvent) {
        EventLogger::log_event(self.identity.client_id(), event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tether_core::{
        ClientRegistration, MessageStatus, ProcessInfo, SystemProbe, TransportError,
        SUBJECT_SHELL_OUTPUT,
    };
    use tether_security::testing::{agent_identity, master_signing_key, master_trusted_key};
    use tether_security::SigningKey;

    const CLIENT_ID: &str = "agent-under-test";

    #[derive(Default)]
    struct RecordingTransport {
        register_script: Mutex<VecDeque<RegistrationOutcome>>,
        inboxes: Mutex<VecDeque<Vec<Message>>>,
        fail_post: bool,
        fail_ack: bool,
        registrations: Mutex<Vec<ClientRegistration>>,
        fetches: AtomicUsize,
        posted: Mutex<Vec<OutboundMessage>>,
        acks: Mutex<Vec<String>>,
    }

    impl RecordingTransport {
        fn with_inbox(batches: Vec<Vec<Message>>) -> Self {
            Self {
                inboxes: Mutex::new(batches.into()),
                ..Default::default()
            }
        }

        fn posted(&self) -> Vec<OutboundMessage> {
            self.posted.lock().unwrap().clone()
        }

        fn acks(&self) -> Vec<String> {
            self.acks.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn register(&self, registration: &ClientRegistration) -> RegistrationOutcome {
            self.registrations.lock().unwrap().push(registration.clone());
            self.register_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(RegistrationOutcome::Accepted)
        }

        async fn fetch_inbox(&self, _client_id: &str) -> Vec<Message> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inboxes.lock().unwrap().pop_front().unwrap_or_default()
        }

        async fn post_message(&self, message: &OutboundMessage) -> Result<(), TransportError> {
            if self.fail_post {
                return Err(TransportError::Status(500));
            }
            self.posted.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn post_ack(&self, message_id: &str) -> Result<(), TransportError> {
            self.acks.lock().unwrap().push(message_id.to_string());
            if self.fail_ack {
                return Err(TransportError::Network("connection reset".into()));
            }
            Ok(())
        }
    }

    struct FakeSystem;

    #[async_trait]
    impl SystemProbe for FakeSystem {
        async fn run_command(&self, command: &str) -> anyhow::Result<String> {
            Ok(format!("ran {command}\n"))
        }

        async fn processes(&self) -> anyhow::Result<Vec<ProcessInfo>> {
            Ok(vec![ProcessInfo {
                name: "init".into(),
                pid: 1,
                cpu_percent: 0.0,
            }])
        }

        async fn shell_history(&self) -> anyhow::Result<String> {
            Ok("ls\n".into())
        }

        async fn proxy_settings(&self) -> anyhow::Result<BTreeMap<String, String>> {
            Ok(BTreeMap::new())
        }

        async fn local_host(&self) -> anyhow::Result<String> {
            Ok("hostname: box\n".into())
        }

        async fn machine_details(&self) -> anyhow::Result<Value> {
            Ok(json!({"os": "linux", "arch": "x86_64"}))
        }
    }

    fn fast_settings() -> LoopSettings {
        LoopSettings {
            poll_interval: Duration::from_millis(5),
            register_backoff: Duration::from_millis(1),
            ..LoopSettings::default()
        }
    }

    fn agent(transport: Arc<RecordingTransport>, settings: LoopSettings) -> AgentLoop {
        AgentLoop::new(
            agent_identity(CLIENT_ID),
            master_trusted_key(),
            transport,
            CommandDispatcher::new(Arc::new(FakeSystem)),
            settings,
        )
    }

    fn message_signed_by(key: &SigningKey, id: &str, subject: &str, claims: Value) -> Message {
        Message {
            id: id.to_string(),
            from: None,
            to: Some(CLIENT_ID.to_string()),
            subject: subject.to_string(),
            content: TokenCodec::sign(&claims, key).unwrap(),
            reply_to: None,
            status: MessageStatus::Sent,
        }
    }

    fn instruction(id: &str, shell: &str) -> Message {
        message_signed_by(&master_signing_key(), id, "instruction", json!({ "shell": shell }))
    }

    fn agent_trusted_key() -> TrustedKey {
        TrustedKey::from_pem(agent_identity(CLIENT_ID).public_key_pem()).unwrap()
    }

    fn reply_text(reply: &OutboundMessage) -> String {
        let payload = TokenCodec::verify_payload(&reply.content, &agent_trusted_key()).unwrap();
        String::from_utf8(payload).unwrap()
    }

    #[tokio::test]
    async fn registers_on_first_accept() {
        let transport = Arc::new(RecordingTransport::default());
        let mut agent = agent(transport.clone(), fast_settings());
        assert_eq!(agent.state(), AgentState::Unregistered);

        assert_eq!(agent.register().await, 1);
        assert_eq!(agent.state(), AgentState::Active);

        let registrations = transport.registrations.lock().unwrap();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].id, CLIENT_ID);
        assert!(registrations[0].public_key.contains("BEGIN PUBLIC KEY"));
    }

    #[tokio::test]
    async fn conflict_counts_as_registered() {
        let transport = Arc::new(RecordingTransport {
            register_script: Mutex::new(VecDeque::from([RegistrationOutcome::AlreadyRegistered])),
            ..Default::default()
        });
        let mut agent = agent(transport, fast_settings());
        assert_eq!(agent.register().await, 1);
        assert_eq!(agent.state(), AgentState::Active);
    }

    #[tokio::test]
    async fn retries_registration_until_accepted() {
        let transport = Arc::new(RecordingTransport {
            register_script: Mutex::new(VecDeque::from([
                RegistrationOutcome::Rejected(TransportError::Status(500)),
                RegistrationOutcome::Rejected(TransportError::Network("refused".into())),
                RegistrationOutcome::Rejected(TransportError::Status(500)),
            ])),
            ..Default::default()
        });
        let mut agent = agent(transport.clone(), fast_settings());
        assert_eq!(agent.register().await, 4);
        assert_eq!(agent.state(), AgentState::Active);
        assert_eq!(transport.registrations.lock().unwrap().len(), 4);
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cycle_registers_before_polling() {
        let transport = Arc::new(RecordingTransport::default());
        let mut agent = agent(transport.clone(), fast_settings());
        agent.run_cycle().await;
        assert_eq!(agent.state(), AgentState::Active);
        assert_eq!(transport.registrations.lock().unwrap().len(), 1);
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn machine_details_end_to_end() {
        let transport = Arc::new(RecordingTransport::with_inbox(vec![vec![instruction(
            "42",
            "/get machine details",
        )]]));
        let mut agent = agent(transport.clone(), fast_settings());
        assert_eq!(agent.register().await, 1);

        let report = agent.run_cycle().await;
        assert_eq!(report.fetched, 1);
        assert_eq!(report.replied, 1);
        assert_eq!(report.acknowledged, 1);

        let posted = transport.posted();
        assert_eq!(posted.len(), 1);
        let reply = &posted[0];
        assert_eq!(reply.subject, SUBJECT_SHELL_OUTPUT);
        assert_eq!(reply.reply_to.as_deref(), Some("42"));
        assert_eq!(reply.to, None);
        assert_eq!(reply.from.as_deref(), Some(CLIENT_ID));

        let details: Value = serde_json::from_str(&reply_text(reply)).unwrap();
        assert_eq!(details, json!({"os": "linux", "arch": "x86_64"}));

        assert_eq!(transport.acks(), vec!["42".to_string()]);
    }

    #[tokio::test]
    async fn reply_payload_is_the_bare_output_text() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine as _;

        let transport = Arc::new(RecordingTransport::with_inbox(vec![vec![instruction("7", "whoami")]]));
        let mut agent = agent(transport.clone(), fast_settings());
        agent.run_cycle().await;

        let posted = transport.posted();
        let payload = posted[0].content.split('.').nth(1).unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(payload).unwrap(), b"ran whoami\n");
    }

    #[tokio::test]
    async fn raw_command_and_process_listing() {
        let transport = Arc::new(RecordingTransport::with_inbox(vec![vec![
            instruction("1", "whoami"),
            instruction("2", "/get processes"),
        ]]));
        let mut agent = agent(transport.clone(), fast_settings());
        agent.run_cycle().await;

        let outputs: Vec<String> = transport.posted().iter().map(reply_text).collect();
        assert_eq!(
            outputs,
            vec!["ran whoami\n", "name: init, pid: 1, cpu_percent: 0.0\n"]
        );
        assert_eq!(transport.acks(), vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn unverified_message_gets_no_reply_and_no_ack() {
        let rogue = SigningKey::from_rsa_pem(tether_security::testing::OTHER_PRIVATE_PEM.as_bytes())
            .unwrap();
        let mut tampered = instruction("2", "id");
        tampered.content.push('x');
        let transport = Arc::new(RecordingTransport::with_inbox(vec![vec![
            message_signed_by(&rogue, "1", "instruction", json!({"shell": "id"})),
            tampered,
            Message {
                content: "not-a-token".into(),
                ..instruction("3", "id")
            },
            instruction("4", "id"),
        ]]));
        let mut agent = agent(transport.clone(), fast_settings());
        let report = agent.run_cycle().await;

        assert_eq!(report.rejected, 3);
        assert_eq!(report.replied, 1);
        assert_eq!(transport.acks(), vec!["4".to_string()]);
        assert_eq!(transport.posted()[0].reply_to.as_deref(), Some("4"));
    }

    fn mixed_batch() -> Vec<Message> {
        vec![
            instruction("1", "whoami"),
            message_signed_by(&master_signing_key(), "2", "broadcast", json!({"shell": "id"})),
            instruction("3", "uptime"),
        ]
    }

    #[tokio::test]
    async fn non_instruction_is_skipped_by_default() {
        let transport = Arc::new(RecordingTransport::with_inbox(vec![mixed_batch()]));
        let mut agent = agent(transport.clone(), fast_settings());
        let report = agent.run_cycle().await;

        assert_eq!(report.skipped, 1);
        assert!(!report.aborted);
        assert_eq!(transport.acks(), vec!["1".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn non_instruction_can_abort_the_batch() {
        let transport = Arc::new(RecordingTransport::with_inbox(vec![mixed_batch()]));
        let settings = LoopSettings {
            non_instruction: NonInstructionPolicy::AbortBatch,
            ..fast_settings()
        };
        let mut agent = agent(transport.clone(), settings);
        let report = agent.run_cycle().await;

        assert!(report.aborted);
        assert_eq!(report.replied, 1);
        assert_eq!(transport.acks(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn failed_reply_is_not_acknowledged() {
        let transport = Arc::new(RecordingTransport {
            inboxes: Mutex::new(VecDeque::from([vec![instruction("1", "whoami")]])),
            fail_post: true,
            ..Default::default()
        });
        let mut agent = agent(transport.clone(), fast_settings());
        let report = agent.run_cycle().await;

        assert_eq!(report.reply_failures, 1);
        assert_eq!(report.replied, 0);
        assert!(transport.acks().is_empty());
    }

    #[tokio::test]
    async fn failed_ack_is_not_retried() {
        let transport = Arc::new(RecordingTransport {
            inboxes: Mutex::new(VecDeque::from([vec![instruction("1", "whoami")]])),
            fail_ack: true,
            ..Default::default()
        });
        let mut agent = agent(transport.clone(), fast_settings());

        let first = agent.run_cycle().await;
        assert_eq!(first.replied, 1);
        assert_eq!(first.ack_failures, 1);

        let second = agent.run_cycle().await;
        assert_eq!(second, CycleReport::default());
        assert_eq!(transport.acks(), vec!["1".to_string()]);
        assert_eq!(transport.posted().len(), 1);
    }

    #[tokio::test]
    async fn unmatched_instruction_is_ignored_by_default() {
        let transport = Arc::new(RecordingTransport::with_inbox(vec![vec![
            instruction("1", "/get secrets"),
            message_signed_by(&master_signing_key(), "2", "instruction", json!({"cmd": "id"})),
        ]]));
        let mut agent = agent(transport.clone(), fast_settings());
        let report = agent.run_cycle().await;

        assert_eq!(report.unmatched, 2);
        assert!(transport.posted().is_empty());
        assert!(transport.acks().is_empty());
    }

    #[tokio::test]
    async fn unmatched_instruction_can_reply_with_error() {
        let transport = Arc::new(RecordingTransport::with_inbox(vec![vec![instruction(
            "1",
            "/get secrets",
        )]]));
        let settings = LoopSettings {
            unmatched: UnmatchedPolicy::ReplyError,
            ..fast_settings()
        };
        let mut agent = agent(transport.clone(), settings);
        agent.run_cycle().await;

        let posted = transport.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(
            reply_text(&posted[0]),
            "error: no matching operation for /get secrets"
        );
        assert_eq!(transport.acks(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn run_keeps_polling() {
        let transport = Arc::new(RecordingTransport::default());
        let mut agent = agent(transport.clone(), fast_settings());

        let outcome = tokio::time::timeout(Duration::from_millis(200), agent.run()).await;
        assert!(outcome.is_err(), "run never returns");
        assert_eq!(transport.registrations.lock().unwrap().len(), 1);
        assert!(transport.fetches.load(Ordering::SeqCst) >= 2);
    }
}
