use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use shared::domain::{Answer, GroupId, GroupRef, GroupRefError, Question, QuestionId, User};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    aggregator::{Aggregation, FetchStage, GroupAggregator, GroupContent, GroupFailure},
    config::ClientSettings,
    error::DashboardError,
    gateway::{HttpGateway, RemoteGateway},
    membership,
    mutations::{
        MembershipReconcile, Mutation, MutationCoordinator, QuestionReconcile, StateChange,
        PROVISIONAL_ID_PREFIX,
    },
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    Loaded { username: String },
    GroupUpdated { group_id: GroupId },
    AnswerAppended { question_id: QuestionId },
    MembershipChanged { group_count: usize },
    Notification(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub loading: bool,
    pub error: Option<String>,
    pub user: Option<User>,
    pub group_questions: HashMap<GroupId, Vec<Question>>,
    pub answers_by_question: HashMap<QuestionId, Vec<Answer>>,
    pub pending_question_input: HashMap<GroupId, String>,
    pub pending_answer_input: HashMap<QuestionId, String>,
    pub failed_groups: Vec<GroupFailure>,
}

impl Default for DashboardSnapshot {
    fn default() -> Self {
        Self {
            loading: true,
            error: None,
            user: None,
            group_questions: HashMap::new(),
            answers_by_question: HashMap::new(),
            pending_question_input: HashMap::new(),
            pending_answer_input: HashMap::new(),
            failed_groups: Vec::new(),
        }
    }
}

impl DashboardSnapshot {
    pub fn questions(&self, group_id: &GroupId) -> &[Question] {
        self.group_questions
            .get(group_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn answers(&self, question_id: &QuestionId) -> &[Answer] {
        self.answers_by_question
            .get(question_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn question_input(&self, group_id: &GroupId) -> &str {
        self.pending_question_input
            .get(group_id)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn answer_input(&self, question_id: &QuestionId) -> &str {
        self.pending_answer_input
            .get(question_id)
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn ensure_confirmed(&self, question_id: &QuestionId) -> Result<(), DashboardError> {
        let provisional = question_id.as_str().starts_with(PROVISIONAL_ID_PREFIX)
            || self
                .group_questions
                .values()
                .flatten()
                .any(|question| &question.question_id == question_id && question.provisional);
        if provisional {
            return Err(DashboardError::ProvisionalQuestion {
                question_id: question_id.clone(),
            });
        }
        Ok(())
    }

    fn has_question(&self, question_id: &QuestionId) -> bool {
        self.group_questions
            .values()
            .flatten()
            .any(|question| &question.question_id == question_id)
    }

    fn replace_aggregation(&mut self, aggregation: Aggregation) {
        self.group_questions = aggregation.questions_by_group;
        self.answers_by_question = aggregation.answers_by_question;
        self.failed_groups = aggregation.failures;
    }

    // A failed question fetch keeps the loaded entry, a failed batch keeps loaded answers.
    fn replace_group(&mut self, content: GroupContent) -> bool {
        let keep_questions =
            content.failed_at(FetchStage::Questions) && self.group_questions.contains_key(&content.group_id);
        let keep_answers = content.failed_at(FetchStage::Answers);
        let GroupContent {
            group_id,
            questions,
            answers,
            failure,
        } = content;

        self.failed_groups
            .retain(|failed| failed.group_id.as_ref() != Some(&group_id));
        if let Some(failure) = failure {
            self.failed_groups.push(failure);
        }
        if keep_questions {
            return false;
        }

        let current_ids = questions
            .iter()
            .map(|question| &question.question_id)
            .collect::<HashSet<_>>();
        if let Some(previous) = self.group_questions.get(&group_id) {
            for question in previous {
                if !current_ids.contains(&question.question_id) {
                    self.answers_by_question.remove(&question.question_id);
                }
            }
        }

        for (question_id, list) in answers {
            if keep_answers {
                self.answers_by_question.entry(question_id).or_insert(list);
            } else {
                self.answers_by_question.insert(question_id, list);
            }
        }
        self.group_questions.insert(group_id, questions);
        true
    }

    // true when the user's group list changed
    fn apply(&mut self, change: StateChange, events: &mut Vec<DashboardEvent>) -> bool {
        match change {
            StateChange::ClearQuestionInput(group_id) => {
                self.pending_question_input.remove(&group_id);
            }
            StateChange::ClearAnswerInput(question_id) => {
                self.pending_answer_input.remove(&question_id);
            }
            StateChange::AppendQuestion(question) => {
                let group_id = question.group_id.clone();
                self.answers_by_question
                    .entry(question.question_id.clone())
                    .or_default();
                self.group_questions
                    .entry(group_id.clone())
                    .or_default()
                    .push(question);
                events.push(DashboardEvent::GroupUpdated { group_id });
            }
            StateChange::AppendAnswer(answer) => {
                let question_id = answer.question_id.clone();
                if !self.has_question(&question_id) {
                    debug!(question_id = %question_id, "dashboard: dropping answer for unknown question");
                    return false;
                }
                self.answers_by_question
                    .entry(question_id.clone())
                    .or_default()
                    .push(answer);
                events.push(DashboardEvent::AnswerAppended { question_id });
            }
            StateChange::ReplaceGroup(content) => {
                let group_id = content.group_id.clone();
                if let Some(failure) = &content.failure {
                    events.push(DashboardEvent::Error(failure.reason.clone()));
                }
                if self.replace_group(content) {
                    events.push(DashboardEvent::GroupUpdated { group_id });
                }
            }
            StateChange::AppendGroup(group) => {
                let Some(user) = self.user.as_mut() else {
                    return false;
                };
                if user.is_member(&group.group_id) {
                    return false;
                }
                user.groups.push(group);
                return true;
            }
            StateChange::ReplaceUser(user) => {
                let changed = self
                    .user
                    .as_ref()
                    .map_or(true, |current| current.groups != user.groups);
                self.user = Some(user);
                return changed;
            }
        }
        false
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub question_reconcile: QuestionReconcile,
    pub membership_reconcile: MembershipReconcile,
}

impl From<&ClientSettings> for SyncOptions {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            question_reconcile: settings.question_reconcile,
            membership_reconcile: settings.membership_reconcile,
        }
    }
}

#[derive(Debug, Clone)]
struct SessionTicket {
    generation: u64,
    username: String,
}

#[derive(Default)]
struct Session {
    generation: u64,
    username: Option<String>,
    malformed: Vec<GroupRefError>,
    view: DashboardSnapshot,
}

impl Session {
    fn is_current(&self, ticket: &SessionTicket) -> bool {
        self.generation == ticket.generation
    }

    fn check(&self, ticket: &SessionTicket) -> Result<(), DashboardError> {
        if self.is_current(ticket) {
            return Ok(());
        }
        debug!(
            username = %ticket.username,
            generation = ticket.generation,
            "dashboard: discarding result for replaced session"
        );
        Err(DashboardError::StaleSession {
            username: ticket.username.clone(),
        })
    }

    fn loaded_ticket(&self) -> Result<SessionTicket, DashboardError> {
        match (&self.username, &self.view.user) {
            (Some(username), Some(_)) => Ok(SessionTicket {
                generation: self.generation,
                username: username.clone(),
            }),
            _ => Err(DashboardError::NotLoaded),
        }
    }
}

/// Owns the aggregated dashboard state; every write goes through here.
pub struct Dashboard {
    gateway: Arc<dyn RemoteGateway>,
    aggregator: Arc<GroupAggregator>,
    coordinator: MutationCoordinator,
    inner: Mutex<Session>,
    events: broadcast::Sender<DashboardEvent>,
}

impl Dashboard {
    pub fn new(gateway: Arc<dyn RemoteGateway>, options: SyncOptions) -> Arc<Self> {
        let aggregator = Arc::new(GroupAggregator::new(Arc::clone(&gateway)));
        let coordinator = MutationCoordinator::new(
            Arc::clone(&gateway),
            Arc::clone(&aggregator),
            options.question_reconcile,
            options.membership_reconcile,
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            gateway,
            aggregator,
            coordinator,
            inner: Mutex::new(Session::default()),
            events,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> anyhow::Result<Arc<Self>> {
        let gateway = HttpGateway::from_settings(settings)?;
        Ok(Self::new(Arc::new(gateway), SyncOptions::from(settings)))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        self.inner.lock().await.view.clone()
    }

    fn emit(&self, event: DashboardEvent) {
        let _ = self.events.send(event);
    }

    fn emit_all(&self, events: Vec<DashboardEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    pub async fn load(&self, username: &str) -> Result<(), DashboardError> {
        let ticket = {
            let mut session = self.inner.lock().await;
            session.generation += 1;
            session.username = Some(username.to_string());
            session.malformed.clear();
            session.view = DashboardSnapshot::default();
            SessionTicket {
                generation: session.generation,
                username: username.to_string(),
            }
        };
        info!(username, generation = ticket.generation, "dashboard: loading session");

        let record = match self.gateway.get_user(username).await {
            Ok(record) => record,
            Err(source) => {
                let err = DashboardError::UserFetch {
                    username: username.to_string(),
                    source,
                };
                error!("dashboard: {err}");
                {
                    let mut session = self.inner.lock().await;
                    if session.is_current(&ticket) {
                        session.view.loading = false;
                        session.view.error = Some(err.to_string());
                        session.view.user = None;
                    }
                }
                self.emit(DashboardEvent::Error(err.to_string()));
                return Err(err);
            }
        };

        let resolution = membership::resolve(username, record);
        {
            let mut session = self.inner.lock().await;
            session.check(&ticket)?;
            session.view.user = Some(resolution.user.clone());
            session.malformed = resolution.malformed.clone();
        }

        self.rebuild(&ticket, &resolution.user, &resolution.malformed)
            .await?;

        {
            let mut session = self.inner.lock().await;
            session.check(&ticket)?;
            session.view.loading = false;
        }
        info!(
            username,
            groups = resolution.user.groups.len(),
            "dashboard: session loaded"
        );
        self.emit(DashboardEvent::Loaded {
            username: username.to_string(),
        });
        Ok(())
    }

    async fn rebuild(
        &self,
        ticket: &SessionTicket,
        user: &User,
        malformed: &[GroupRefError],
    ) -> Result<(), DashboardError> {
        let mut aggregation = self.aggregator.aggregate(&user.groups).await;
        for err in malformed {
            aggregation.record_malformed(err);
        }
        let failures = aggregation
            .failures
            .iter()
            .map(|failure| DashboardEvent::Error(failure.reason.clone()))
            .collect::<Vec<_>>();

        {
            let mut session = self.inner.lock().await;
            session.check(ticket)?;
            session.view.replace_aggregation(aggregation);
        }
        self.emit_all(failures);
        Ok(())
    }

    pub async fn refresh_group(&self, group_id: &GroupId) -> Result<(), DashboardError> {
        let ticket = self.inner.lock().await.loaded_ticket()?;
        let content = self.aggregator.fetch_group(group_id).await;

        let mut events = Vec::new();
        {
            let mut session = self.inner.lock().await;
            session.check(&ticket)?;
            session
                .view
                .apply(StateChange::ReplaceGroup(content), &mut events);
        }
        self.emit_all(events);
        Ok(())
    }

    pub async fn set_question_input(&self, group_id: &GroupId, text: &str) {
        let mut session = self.inner.lock().await;
        if text.is_empty() {
            session.view.pending_question_input.remove(group_id);
        } else {
            session
                .view
                .pending_question_input
                .insert(group_id.clone(), text.to_string());
        }
    }

    pub async fn set_answer_input(&self, question_id: &QuestionId, text: &str) {
        let mut session = self.inner.lock().await;
        if text.is_empty() {
            session.view.pending_answer_input.remove(question_id);
        } else {
            session
                .view
                .pending_answer_input
                .insert(question_id.clone(), text.to_string());
        }
    }

    pub async fn submit_question(
        &self,
        group_id: &GroupId,
        text: &str,
    ) -> Result<bool, DashboardError> {
        let coordinator = &self.coordinator;
        let sent = self
            .run(|username, _| Ok(coordinator.submit_question(username, group_id, text)))
            .await?;
        Ok(sent.is_some())
    }

    pub async fn submit_pending_question(&self, group_id: &GroupId) -> Result<bool, DashboardError> {
        let coordinator = &self.coordinator;
        let sent = self
            .run(|username, view| {
                Ok(coordinator.submit_question(username, group_id, view.question_input(group_id)))
            })
            .await?;
        Ok(sent.is_some())
    }

    pub async fn submit_answer(
        &self,
        question_id: &QuestionId,
        text: &str,
    ) -> Result<Option<Answer>, DashboardError> {
        let coordinator = &self.coordinator;
        self.run(|username, view| {
            view.ensure_confirmed(question_id)?;
            Ok(coordinator.submit_answer(username, question_id, text))
        })
        .await
    }

    pub async fn submit_pending_answer(
        &self,
        question_id: &QuestionId,
    ) -> Result<Option<Answer>, DashboardError> {
        let coordinator = &self.coordinator;
        self.run(|username, view| {
            view.ensure_confirmed(question_id)?;
            Ok(coordinator.submit_answer(username, question_id, view.answer_input(question_id)))
        })
        .await
    }

    pub async fn create_group(&self, name: &str) -> Result<Option<GroupRef>, DashboardError> {
        let coordinator = &self.coordinator;
        self.run(|username, _| Ok(coordinator.create_group(username, name)))
            .await
    }

    pub async fn add_user_to_group(
        &self,
        group_id: &GroupId,
        new_username: &str,
    ) -> Result<bool, DashboardError> {
        let coordinator = &self.coordinator;
        let sent = self
            .run(|_, _| Ok(coordinator.add_user_to_group(group_id, new_username)))
            .await?;
        if sent.is_some() {
            self.emit(DashboardEvent::Notification(format!(
                "added {} to group {group_id}",
                new_username.trim()
            )));
        }
        Ok(sent.is_some())
    }

    // Immediate changes under the lock, remote exchange without it, then
    // reconciliation only if the session is unchanged.
    async fn run<T, F>(&self, plan: F) -> Result<Option<T>, DashboardError>
    where
        F: FnOnce(&str, &DashboardSnapshot) -> Result<Option<Mutation<T>>, DashboardError>,
    {
        let mut events = Vec::new();
        let (ticket, remote) = {
            let mut session = self.inner.lock().await;
            let ticket = session.loaded_ticket()?;
            let Some(mutation) = plan(&ticket.username, &session.view)? else {
                return Ok(None);
            };
            for change in mutation.immediate {
                session.view.apply(change, &mut events);
            }
            (ticket, mutation.remote)
        };
        self.emit_all(std::mem::take(&mut events));

        let applied = match remote.await {
            Ok(applied) => applied,
            Err(err) => {
                let kind = err.gateway_error().map(|source| source.kind());
                warn!(kind = ?kind, "dashboard: {err}");
                self.emit(DashboardEvent::Error(err.to_string()));
                return Err(err);
            }
        };

        let rebuild_for = {
            let mut session = self.inner.lock().await;
            if !session.is_current(&ticket) {
                debug!(
                    username = %ticket.username,
                    "dashboard: discarding mutation result for replaced session"
                );
                return Ok(Some(applied.value));
            }
            let mut membership_changed = false;
            for change in applied.changes {
                membership_changed |= session.view.apply(change, &mut events);
            }
            if membership_changed {
                session
                    .view
                    .user
                    .clone()
                    .map(|user| (user, session.malformed.clone()))
            } else {
                None
            }
        };
        self.emit_all(events);

        if let Some((user, malformed)) = rebuild_for {
            self.emit(DashboardEvent::MembershipChanged {
                group_count: user.groups.len(),
            });
            // A replaced session only loses the view update; the remote write stands.
            if let Err(err) = self.rebuild(&ticket, &user, &malformed).await {
                debug!(username = %ticket.username, "dashboard: membership rebuild discarded: {err}");
            }
        }
        Ok(Some(applied.value))
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
