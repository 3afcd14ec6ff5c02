//! Campaign dispatcher — paced, sequential delivery over one messaging session.
//!
//! A campaign moves `Idle → Authenticating → Sending → Completed`, or stops
//! at `AuthFailed` when the session is not authenticated. Only authentication
//! failure aborts a run; per-recipient send errors are recorded in the report
//! and the loop moves on.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::error::CampaignError;
use crate::personalize::Personalizer;
use crate::recipients::{Recipient, parse_recipients};
use crate::report::CampaignReport;
use crate::session::{MessagingSession, ScopedSession, SessionConnector, SessionCredentials};

/// Suspends the campaign between consecutive sends.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Pacer backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Lifecycle of one campaign run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Authenticating,
    Sending,
    Completed,
    AuthFailed,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchState::Idle => "idle",
            DispatchState::Authenticating => "authenticating",
            DispatchState::Sending => "sending",
            DispatchState::Completed => "completed",
            DispatchState::AuthFailed => "auth_failed",
        };
        f.write_str(s)
    }
}

/// Drives campaigns. Holds no per-campaign state, so one instance can serve
/// concurrent campaigns.
pub struct Dispatcher {
    connector: Arc<dyn SessionConnector>,
    config: DispatchConfig,
    pacer: Arc<dyn Pacer>,
}

impl Dispatcher {
    pub fn new(connector: Arc<dyn SessionConnector>, config: DispatchConfig) -> Self {
        Self {
            connector,
            config,
            pacer: Arc::new(TokioPacer),
        }
    }

    /// Replace the pacer.
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Parse `table` and dispatch `template` to every valid recipient.
    pub async fn run_table(
        &self,
        credentials: &SessionCredentials,
        template: &str,
        table: &[u8],
    ) -> Result<CampaignReport, CampaignError> {
        let recipients = parse_recipients(table)?;
        self.dispatch(credentials, template, &recipients).await
    }

    /// Dispatch with greetings drawn from an entropy-seeded generator.
    pub async fn dispatch(
        &self,
        credentials: &SessionCredentials,
        template: &str,
        recipients: &[Recipient],
    ) -> Result<CampaignReport, CampaignError> {
        let mut rng = StdRng::from_entropy();
        self.dispatch_with_rng(credentials, template, recipients, &mut rng)
            .await
    }

    /// Dispatch with greetings drawn from `rng`.
    pub async fn dispatch_with_rng<R>(
        &self,
        credentials: &SessionCredentials,
        template: &str,
        recipients: &[Recipient],
        rng: &mut R,
    ) -> Result<CampaignReport, CampaignError>
    where
        R: Rng + Send + ?Sized,
    {
        if recipients.is_empty() {
            return Err(CampaignError::NoValidRecipients);
        }

        let campaign_id = Uuid::new_v4();
        let mut state = DispatchState::Idle;
        transition(campaign_id, &mut state, DispatchState::Authenticating);

        let scoped = ScopedSession::acquire(self.connector.as_ref(), credentials).await?;

        if !scoped.session().is_authenticated() {
            transition(campaign_id, &mut state, DispatchState::AuthFailed);
            warn!(
                campaign_id = %campaign_id,
                session = %credentials.session_name,
                "Messaging session is not authenticated; no messages sent"
            );
            scoped.release().await;
            return Err(CampaignError::Authentication {
                session: credentials.session_name.clone(),
            });
        }

        transition(campaign_id, &mut state, DispatchState::Sending);
        info!(
            campaign_id = %campaign_id,
            session = %credentials.session_name,
            total = recipients.len(),
            "Starting campaign"
        );

        let personalizer = Personalizer::new(template, &self.config.greetings);
        let report = self
            .send_all(campaign_id, scoped.session(), &personalizer, recipients, rng)
            .await;

        scoped.release().await;
        transition(campaign_id, &mut state, DispatchState::Completed);

        info!(
            campaign_id = %campaign_id,
            sent = report.sent(),
            failed = report.failed(),
            total = report.total(),
            "Campaign completed"
        );

        Ok(report)
    }

    async fn send_all<R>(
        &self,
        campaign_id: Uuid,
        session: &dyn MessagingSession,
        personalizer: &Personalizer<'_>,
        recipients: &[Recipient],
        rng: &mut R,
    ) -> CampaignReport
    where
        R: Rng + Send + ?Sized,
    {
        let total = recipients.len();
        let mut report = CampaignReport::new(total);

        for (idx, recipient) in recipients.iter().enumerate() {
            let position = idx + 1;
            let text = personalizer.render(recipient, &mut *rng);

            info!(
                campaign_id = %campaign_id,
                position,
                total,
                phone = %recipient.phone,
                name = %recipient.name,
                "Sending message"
            );

            match session.send_message(&recipient.phone, &text).await {
                Ok(true) => {
                    info!(campaign_id = %campaign_id, phone = %recipient.phone, "Message sent");
                    report.record_success(&recipient.phone, &recipient.name);
                }
                Ok(false) => {
                    warn!(campaign_id = %campaign_id, phone = %recipient.phone, "Message rejected by provider");
                    report.record_failure(&recipient.phone, &recipient.name, None);
                }
                Err(e) => {
                    warn!(
                        campaign_id = %campaign_id,
                        phone = %recipient.phone,
                        error = %e,
                        "Error sending message"
                    );
                    report.record_failure(&recipient.phone, &recipient.name, Some(e.to_string()));
                }
            }

            if position < total {
                self.pacer.pause(self.config.pacing).await;
            }
        }

        report
    }
}

fn transition(campaign_id: Uuid, state: &mut DispatchState, next: DispatchState) {
    debug!(campaign_id = %campaign_id, from = %state, to = %next, "Campaign state change");
    *state = next;
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::SessionError;
    use crate::personalize::DEFAULT_GREETINGS;
    use crate::report::DeliveryStatus;

    use super::*;

    /// Shared timeline of sends and pauses.
    type Timeline = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Copy)]
    enum Outcome {
        Accept,
        Reject,
        Error,
    }

    struct StubSession {
        authenticated: bool,
        outcomes: HashMap<String, Outcome>,
        timeline: Timeline,
        texts: Arc<Mutex<Vec<String>>>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessagingSession for StubSession {
        fn is_authenticated(&self) -> bool {
            self.authenticated
        }

        async fn send_message(&self, phone: &str, text: &str) -> Result<bool, SessionError> {
            self.timeline.lock().unwrap().push(format!("send:{phone}"));
            self.texts.lock().unwrap().push(text.to_string());
            match self.outcomes.get(phone).copied().unwrap_or(Outcome::Accept) {
                Outcome::Accept => Ok(true),
                Outcome::Reject => Ok(false),
                Outcome::Error => Err(SessionError::SendFailed {
                    phone: phone.to_string(),
                    reason: "socket closed".into(),
                }),
            }
        }

        async fn close(&self) -> Result<(), SessionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubConnector {
        authenticated: bool,
        outcomes: HashMap<String, Outcome>,
        timeline: Timeline,
        texts: Arc<Mutex<Vec<String>>>,
        closes: Arc<AtomicUsize>,
    }

    impl StubConnector {
        fn new(authenticated: bool) -> Self {
            Self {
                authenticated,
                outcomes: HashMap::new(),
                timeline: Arc::default(),
                texts: Arc::default(),
                closes: Arc::default(),
            }
        }

        fn with_outcome(mut self, phone: &str, outcome: Outcome) -> Self {
            self.outcomes.insert(phone.to_string(), outcome);
            self
        }

        fn sends(&self) -> usize {
            self.timeline
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.starts_with("send:"))
                .count()
        }
    }

    #[async_trait]
    impl SessionConnector for StubConnector {
        async fn connect(
            &self,
            _credentials: &SessionCredentials,
        ) -> Result<Arc<dyn MessagingSession>, SessionError> {
            Ok(Arc::new(StubSession {
                authenticated: self.authenticated,
                outcomes: self.outcomes.clone(),
                timeline: Arc::clone(&self.timeline),
                texts: Arc::clone(&self.texts),
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    struct FailingConnector;

    #[async_trait]
    impl SessionConnector for FailingConnector {
        async fn connect(
            &self,
            credentials: &SessionCredentials,
        ) -> Result<Arc<dyn MessagingSession>, SessionError> {
            Err(SessionError::ConnectFailed {
                session: credentials.session_name.clone(),
                reason: "connection refused".into(),
            })
        }
    }

    struct RecordingPacer {
        timeline: Timeline,
    }

    #[async_trait]
    impl Pacer for RecordingPacer {
        async fn pause(&self, delay: Duration) {
            self.timeline
                .lock()
                .unwrap()
                .push(format!("pause:{}", delay.as_millis()));
        }
    }

    fn recipients(n: usize) -> Vec<Recipient> {
        (1..=n)
            .map(|i| Recipient {
                phone: format!("+10000{i}"),
                name: format!("User {i}"),
            })
            .collect()
    }

    fn dispatcher(connector: &Arc<StubConnector>) -> Dispatcher {
        let pacer = Arc::new(RecordingPacer {
            timeline: Arc::clone(&connector.timeline),
        });
        Dispatcher::new(
            Arc::clone(connector) as Arc<dyn SessionConnector>,
            DispatchConfig::default(),
        )
        .with_pacer(pacer)
    }

    fn creds() -> SessionCredentials {
        SessionCredentials::new("shop", "key")
    }

    #[tokio::test]
    async fn sends_to_everyone_in_order() {
        let connector = Arc::new(StubConnector::new(true));
        let report = dispatcher(&connector)
            .dispatch(&creds(), "Hi [NAME]", &recipients(3))
            .await
            .unwrap();

        assert_eq!(report.sent(), 3);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.total(), 3);
        assert!(report.is_consistent());

        let phones: Vec<_> = report.details().iter().map(|d| d.phone.as_str()).collect();
        assert_eq!(phones, ["+100001", "+100002", "+100003"]);

        let texts = connector.texts.lock().unwrap().clone();
        assert_eq!(texts, ["Hi User 1", "Hi User 2", "Hi User 3"]);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pauses_between_sends_but_not_after_last() {
        let connector = Arc::new(StubConnector::new(true));
        dispatcher(&connector)
            .dispatch(&creds(), "Hi", &recipients(3))
            .await
            .unwrap();

        let timeline = connector.timeline.lock().unwrap().clone();
        assert_eq!(
            timeline,
            [
                "send:+100001",
                "pause:2000",
                "send:+100002",
                "pause:2000",
                "send:+100003",
            ]
        );
    }

    #[tokio::test]
    async fn single_recipient_never_pauses() {
        let connector = Arc::new(StubConnector::new(true));
        dispatcher(&connector)
            .dispatch(&creds(), "Hi", &recipients(1))
            .await
            .unwrap();

        let timeline = connector.timeline.lock().unwrap().clone();
        assert_eq!(timeline, ["send:+100001"]);
    }

    #[tokio::test]
    async fn failures_are_isolated_and_counted() {
        let connector = Arc::new(
            StubConnector::new(true)
                .with_outcome("+100001", Outcome::Reject)
                .with_outcome("+100002", Outcome::Error),
        );
        let report = dispatcher(&connector)
            .dispatch(&creds(), "Hi", &recipients(4))
            .await
            .unwrap();

        assert_eq!(report.sent(), 2);
        assert_eq!(report.failed(), 2);
        assert!(report.is_consistent());

        let details = report.details();
        assert_eq!(details[0].status, DeliveryStatus::Failed);
        assert!(details[0].error.is_none());
        assert_eq!(details[1].status, DeliveryStatus::Failed);
        assert!(details[1].error.as_deref().unwrap().contains("socket closed"));
        assert_eq!(details[2].status, DeliveryStatus::Sent);
        assert_eq!(details[3].status, DeliveryStatus::Sent);
        assert_eq!(connector.sends(), 4);
    }

    #[tokio::test]
    async fn unauthenticated_session_sends_nothing_and_is_released() {
        let connector = Arc::new(StubConnector::new(false));
        let err = dispatcher(&connector)
            .dispatch(&creds(), "Hi", &recipients(3))
            .await
            .unwrap_err();

        assert!(matches!(err, CampaignError::Authentication { ref session } if session == "shop"));
        assert_eq!(connector.sends(), 0);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_failure_surfaces_as_session_error() {
        let dispatcher = Dispatcher::new(Arc::new(FailingConnector), DispatchConfig::default());
        let err = dispatcher
            .dispatch(&creds(), "Hi", &recipients(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::Session(SessionError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn empty_list_is_rejected_before_connecting() {
        let connector = Arc::new(StubConnector::new(true));
        let err = dispatcher(&connector)
            .dispatch(&creds(), "Hi", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, CampaignError::NoValidRecipients));
        assert_eq!(connector.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn greetings_come_from_pool_with_injected_rng() {
        let connector = Arc::new(StubConnector::new(true));
        let mut rng = StdRng::seed_from_u64(11);
        dispatcher(&connector)
            .dispatch_with_rng(&creds(), "[GREETING] [NAME]", &recipients(5), &mut rng)
            .await
            .unwrap();

        for (i, text) in connector.texts.lock().unwrap().iter().enumerate() {
            let suffix = format!(" User {}", i + 1);
            let greeting = text.strip_suffix(suffix.as_str()).unwrap();
            assert!(DEFAULT_GREETINGS.contains(&greeting));
        }
    }

    #[tokio::test]
    async fn run_table_end_to_end() {
        let connector = Arc::new(StubConnector::new(true));
        let table = "name,phone\nAli,+100001\n,+100002\nSam,\n";
        let report = dispatcher(&connector)
            .run_table(&creds(), "Hello [NAME]", table.as_bytes())
            .await
            .unwrap();

        assert_eq!(report.total(), 2);
        assert_eq!(report.details()[1].name, " ");
        assert!(report.is_consistent());
    }

    #[tokio::test]
    async fn schema_error_never_connects() {
        let connector = Arc::new(StubConnector::new(true));
        let err = dispatcher(&connector)
            .run_table(&creds(), "Hi", b"phone\n+1\n")
            .await
            .unwrap_err();

        assert!(matches!(err, CampaignError::Schema { .. }));
        assert_eq!(connector.sends(), 0);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn state_names() {
        assert_eq!(DispatchState::AuthFailed.to_string(), "auth_failed");
        assert_eq!(DispatchState::Sending.to_string(), "sending");
    }
}
