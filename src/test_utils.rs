//! Shared test doubles: recording interpreters, a scripted broker, and
//! sample Gerrit events.

use std::collections::VecDeque;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, BrokerError, BrokerSession, InboundDelivery, Topology};
use crate::effects::{
    GerritEffect, GerritInterpreter, GerritResponse, GitHubEffect, GitHubInterpreter,
    GitHubResponse,
};
use crate::types::{
    ChangeEvent, ChangeLifecycle, ChangeStatus, CombinedStatus, CommentId, ContextStatus,
    PatchsetCreated, PatchsetNumber, PrNumber, PullRequestHandle, RevisionInfo, Sha, StatusState,
};
use crate::worker::{Disposition, EventHandler};

// ─── Errors and Call Log ──────────────────────────────────────────────────────

/// Error returned by scripted mocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MockError(pub String);

impl MockError {
    pub fn new(message: impl Into<String>) -> Self {
        MockError(message.into())
    }
}

/// An ordered log shared between several mocks.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Scripted responses. The last entry repeats once the others are used up.
type Script<T> = Arc<Mutex<VecDeque<Result<T, MockError>>>>;

fn set_script<T>(script: &Script<T>, entries: Vec<Result<T, MockError>>) {
    *script.lock().unwrap() = entries.into();
}

fn next_scripted<T: Clone>(script: &Script<T>) -> Option<Result<T, MockError>> {
    let mut queue = script.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

// ─── Sample Data ──────────────────────────────────────────────────────────────

pub const CHANGE_ID: &str = "I640486e9f32da6ac1eba05e3c38d15a0aba41055";
pub const REVISION: &str = "0c5e2b5d8c1f1d43b5c0b1a6c1f5a3a2f1e0d9c8";
pub const PR_URL: &str = "https://github.com/typo3/typo3.cms/pull/7";

/// A Gerrit `patchset-created` stream event.
pub fn patchset_created_json(project: &str, branch: &str, subject: &str, number: u32) -> String {
    serde_json::json!({
        "type": "patchset-created",
        "change": {
            "project": project,
            "branch": branch,
            "id": CHANGE_ID,
            "number": "40410",
            "subject": subject,
            "url": "https://review.typo3.org/40410",
            "commitMessage": format!("{subject}\n\nChange-Id: {CHANGE_ID}"),
        },
        "patchSet": {
            "number": number.to_string(),
            "revision": REVISION,
            "ref": format!("refs/changes/10/40410/{number}"),
        },
    })
    .to_string()
}

/// A Gerrit `change-abandoned` stream event.
pub fn change_abandoned_json() -> String {
    serde_json::json!({
        "type": "change-abandoned",
        "change": {
            "project": "Packages/TYPO3.CMS",
            "branch": "master",
            "id": CHANGE_ID,
            "subject": "[TASK] Streamline install tool",
        },
        "reason": "superseded",
    })
    .to_string()
}

pub fn sample_event() -> PatchsetCreated {
    let json = patchset_created_json("Packages/TYPO3.CMS", "master", "[TASK] Streamline", 3);
    ChangeEvent::decode(json.as_bytes())
        .unwrap()
        .into_patchset_created()
        .unwrap()
        .unwrap()
}

/// Change metadata whose current revision is patchset `current`.
pub fn change_status(status: ChangeLifecycle, current: u32) -> ChangeStatus {
    let sha = Sha::new(REVISION);
    ChangeStatus {
        status,
        current_revision: Some(sha.clone()),
        revisions: HashMap::from([(
            sha,
            RevisionInfo {
                number: PatchsetNumber(current),
            },
        )]),
    }
}

/// A combined status with one CI context in `state`.
pub fn combined(state: StatusState) -> CombinedStatus {
    let mut contexts = BTreeMap::new();
    contexts.insert(
        "continuous-integration/travis-ci/pr".to_string(),
        ContextStatus {
            state: state.clone(),
            description: Some(format!("The build is {state}")),
            target_url: Some("https://travis-ci.org/typo3/builds/1".to_string()),
        },
    );
    CombinedStatus { state, contexts }
}

// ─── GitHub ───────────────────────────────────────────────────────────────────

/// Records every GitHub effect and answers from per-effect scripts.
///
/// Unscripted effects succeed: the branch exists, CI is green, the pull
/// request is #7.
#[derive(Debug, Clone, Default)]
pub struct RecordingGitHub {
    effects: Arc<Mutex<Vec<GitHubEffect>>>,
    log: CallLog,
    branch: Script<Option<String>>,
    status: Script<CombinedStatus>,
    create: Script<PrNumber>,
    comment: Script<CommentId>,
    close: Script<()>,
}

impl RecordingGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also records `github:<effect>` entries into `log`.
    pub fn with_log(log: CallLog) -> Self {
        RecordingGitHub {
            log,
            ..Self::default()
        }
    }

    pub fn script_branch(&self, entries: Vec<Result<Option<String>, MockError>>) {
        set_script(&self.branch, entries);
    }

    pub fn script_status(&self, entries: Vec<Result<CombinedStatus, MockError>>) {
        set_script(&self.status, entries);
    }

    pub fn fail_create(&self, error: MockError) {
        set_script(&self.create, vec![Err(error)]);
    }

    pub fn fail_comment(&self, error: MockError) {
        set_script(&self.comment, vec![Err(error)]);
    }

    pub fn fail_close(&self, error: MockError) {
        set_script(&self.close, vec![Err(error)]);
    }

    pub fn effects(&self) -> Vec<GitHubEffect> {
        self.effects.lock().unwrap().clone()
    }

    fn respond(&self, effect: &GitHubEffect) -> Result<GitHubResponse, MockError> {
        match effect {
            GitHubEffect::GetBranch { .. } => Ok(GitHubResponse::Branch(
                next_scripted(&self.branch).unwrap_or(Ok(Some(REVISION.to_string())))?,
            )),
            GitHubEffect::GetCombinedStatus { .. } => Ok(GitHubResponse::CombinedStatus(
                next_scripted(&self.status).unwrap_or(Ok(combined(StatusState::Success)))?,
            )),
            GitHubEffect::CreatePullRequest { head, base, .. } => {
                let number = next_scripted(&self.create).unwrap_or(Ok(PrNumber(7)))?;
                Ok(GitHubResponse::PullRequestCreated(PullRequestHandle {
                    number,
                    head_ref: head.clone(),
                    base_ref: base.clone(),
                    html_url: PR_URL.to_string(),
                }))
            }
            GitHubEffect::PostComment { .. } => Ok(GitHubResponse::CommentPosted {
                id: next_scripted(&self.comment).unwrap_or(Ok(CommentId(1)))?,
            }),
            GitHubEffect::ClosePullRequest { .. } => {
                next_scripted(&self.close).unwrap_or(Ok(()))?;
                Ok(GitHubResponse::PullRequestClosed)
            }
        }
    }
}

impl GitHubInterpreter for RecordingGitHub {
    type Error = MockError;

    fn interpret(
        &self,
        effect: GitHubEffect,
    ) -> impl Future<Output = Result<GitHubResponse, Self::Error>> + Send {
        self.log.push(format!("github:{}", effect.name()));
        let result = self.respond(&effect);
        self.effects.lock().unwrap().push(effect);
        async move { result }
    }
}

// ─── Gerrit ───────────────────────────────────────────────────────────────────

/// Records every Gerrit effect. Unscripted, the change is open at patchset 3
/// and reviews succeed.
#[derive(Debug, Clone, Default)]
pub struct RecordingGerrit {
    effects: Arc<Mutex<Vec<GerritEffect>>>,
    log: CallLog,
    change: Script<ChangeStatus>,
    review: Script<()>,
}

impl RecordingGerrit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        RecordingGerrit {
            log,
            ..Self::default()
        }
    }

    pub fn script_change(&self, entries: Vec<Result<ChangeStatus, MockError>>) {
        set_script(&self.change, entries);
    }

    pub fn fail_review(&self, error: MockError) {
        set_script(&self.review, vec![Err(error)]);
    }

    pub fn effects(&self) -> Vec<GerritEffect> {
        self.effects.lock().unwrap().clone()
    }
}

impl GerritInterpreter for RecordingGerrit {
    type Error = MockError;

    fn interpret(
        &self,
        effect: GerritEffect,
    ) -> impl Future<Output = Result<GerritResponse, Self::Error>> + Send {
        self.log.push(format!("gerrit:{}", effect.name()));
        let result = match &effect {
            GerritEffect::GetChange { .. } => next_scripted(&self.change)
                .unwrap_or_else(|| Ok(change_status(ChangeLifecycle::Open, 3)))
                .map(GerritResponse::Change),
            GerritEffect::PostReview { .. } => next_scripted(&self.review)
                .unwrap_or(Ok(()))
                .map(|()| GerritResponse::ReviewPosted),
        };
        self.effects.lock().unwrap().push(effect);
        async move { result }
    }
}

// ─── Handlers and Deliveries ──────────────────────────────────────────────────

/// Records payloads as UTF-8 strings.
#[derive(Debug, Clone)]
pub struct CollectingHandler {
    payloads: Arc<Mutex<Vec<String>>>,
    count: Arc<watch::Sender<usize>>,
}

impl CollectingHandler {
    pub fn new() -> Self {
        CollectingHandler {
            payloads: Arc::default(),
            count: Arc::new(watch::channel(0).0),
        }
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }

    /// Waits until at least `n` payloads were handled.
    pub async fn wait_for(&self, n: usize) {
        let mut rx = self.count.subscribe();
        rx.wait_for(|count| *count >= n).await.unwrap();
    }
}

impl EventHandler for CollectingHandler {
    async fn handle(&self, payload: &[u8], _cancel: &CancellationToken) -> Disposition {
        self.payloads
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(payload).into_owned());
        self.count.send_modify(|count| *count += 1);
        Disposition::Settled
    }
}

/// A standalone delivery that logs `ack <body>`.
#[derive(Debug, Clone)]
pub struct MockDelivery {
    body: String,
    log: CallLog,
}

impl MockDelivery {
    pub fn new(body: impl Into<String>, log: CallLog) -> Self {
        MockDelivery {
            body: body.into(),
            log,
        }
    }
}

impl InboundDelivery for MockDelivery {
    fn body(&self) -> &[u8] {
        self.body.as_bytes()
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.log.push(format!("ack {}", self.body));
        Ok(())
    }
}

// ─── Scripted Broker ──────────────────────────────────────────────────────────

/// What one connection attempt does.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    refuse: Option<String>,
    deliveries: Vec<String>,
    fail: Option<String>,
}

impl SessionScript {
    /// Connects and yields `bodies`, then idles.
    pub fn deliver(bodies: &[&str]) -> Self {
        SessionScript {
            deliveries: bodies.iter().map(|b| b.to_string()).collect(),
            ..Self::default()
        }
    }

    /// The connection attempt fails.
    pub fn refuse(message: &str) -> Self {
        SessionScript {
            refuse: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// After the deliveries, the stream fails instead of idling.
    pub fn then_fail(mut self, message: &str) -> Self {
        self.fail = Some(message.to_string());
        self
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    sessions: VecDeque<SessionScript>,
    connects: usize,
    declared: Vec<Topology>,
    outstanding: Vec<String>,
    acked: Vec<String>,
}

/// A broker that plays back one [`SessionScript`] per connect.
///
/// Like a real broker, deliveries that were never acknowledged are
/// redelivered at the start of the next session. Once the scripts run out,
/// `connect` never completes.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl ScriptedBroker {
    pub fn new(sessions: Vec<SessionScript>) -> Self {
        ScriptedBroker {
            state: Arc::new(Mutex::new(BrokerState {
                sessions: sessions.into(),
                ..BrokerState::default()
            })),
        }
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn declared(&self) -> Vec<Topology> {
        self.state.lock().unwrap().declared.clone()
    }

    pub fn acked(&self) -> Vec<String> {
        self.state.lock().unwrap().acked.clone()
    }
}

impl Broker for ScriptedBroker {
    type Session = ScriptedSession;

    async fn connect(&self) -> Result<ScriptedSession, BrokerError> {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.connects += 1;
            state.sessions.pop_front()
        };
        let Some(script) = script else {
            return std::future::pending().await;
        };
        if let Some(message) = script.refuse {
            return Err(BrokerError::Disconnected(message));
        }

        let mut queue: VecDeque<String> = {
            let mut state = self.state.lock().unwrap();
            state.outstanding.drain(..).collect()
        };
        queue.extend(script.deliveries);

        Ok(ScriptedSession {
            broker: self.clone(),
            queue,
            fail: script.fail,
            subscribed: false,
        })
    }
}

pub struct ScriptedSession {
    broker: ScriptedBroker,
    queue: VecDeque<String>,
    fail: Option<String>,
    subscribed: bool,
}

impl BrokerSession for ScriptedSession {
    type Delivery = ScriptedDelivery;

    async fn declare(&mut self, topology: &Topology) -> Result<(), BrokerError> {
        self.broker
            .state
            .lock()
            .unwrap()
            .declared
            .push(topology.clone());
        Ok(())
    }

    async fn subscribe(&mut self, _topology: &Topology) -> Result<(), BrokerError> {
        self.subscribed = true;
        Ok(())
    }

    async fn next_delivery(&mut self) -> Option<Result<ScriptedDelivery, BrokerError>> {
        if !self.subscribed {
            return Some(Err(BrokerError::NotSubscribed));
        }
        if let Some(body) = self.queue.pop_front() {
            self.broker
                .state
                .lock()
                .unwrap()
                .outstanding
                .push(body.clone());
            return Some(Ok(ScriptedDelivery {
                body,
                broker: self.broker.clone(),
            }));
        }
        if let Some(message) = self.fail.take() {
            return Some(Err(BrokerError::Disconnected(message)));
        }
        std::future::pending().await
    }
}

pub struct ScriptedDelivery {
    body: String,
    broker: ScriptedBroker,
}

impl InboundDelivery for ScriptedDelivery {
    fn body(&self) -> &[u8] {
        self.body.as_bytes()
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock().unwrap();
        if let Some(pos) = state.outstanding.iter().position(|b| *b == self.body) {
            state.outstanding.remove(pos);
        }
        state.acked.push(self.body.clone());
        Ok(())
    }
}
