pub mod registry;

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::{
    CursorPosition, ExecutionHistory, ExecutionResult, Language, Participant, Session,
};
use crate::snippets::StarterSnippets;
use registry::ParticipantRegistry;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("participant {0} not found")]
    ParticipantNotFound(String),
}

/// A new participant together with the session state it joined into.
#[derive(Debug, Clone)]
pub struct Joined {
    pub participant: Participant,
    pub session: Session,
    pub executions: Vec<ExecutionResult>,
}

struct SessionRecord {
    session: Session,
    executions: ExecutionHistory,
    last_active: Instant,
}

impl SessionRecord {
    fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        self.session.participants.is_empty() && now.duration_since(self.last_active) >= ttl
    }
}

/// In-memory home of every live session.
///
/// Each call is atomic for the session it touches. Ordering between calls
/// on the same session is the hub's job, so nothing outside the hub should
/// mutate a session that has live connections.
pub struct SessionStore {
    sessions: DashMap<String, SessionRecord>,
    snippets: StarterSnippets,
    history_capacity: usize,
}

impl SessionStore {
    pub fn new(snippets: StarterSnippets, history_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            snippets,
            history_capacity,
        }
    }

    pub fn snippets(&self) -> &StarterSnippets {
        &self.snippets
    }

    pub fn create(&self, language: Option<Language>, code: Option<String>) -> Session {
        let language = language.unwrap_or_default();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            code: code.unwrap_or_else(|| self.snippets.for_language(language).to_string()),
            language,
            created_at: chrono::Utc::now(),
            participants: ParticipantRegistry::new(),
        };
        self.sessions.insert(
            session.id.clone(),
            SessionRecord {
                session: session.clone(),
                executions: ExecutionHistory::new(self.history_capacity),
                last_active: Instant::now(),
            },
        );
        tracing::info!("created session {} ({language})", session.id);
        session
    }

    pub fn get(&self, id: &str) -> Result<Session, StoreError> {
        self.sessions
            .get(id)
            .map(|r| r.session.clone())
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn set_code(&self, id: &str, code: String) -> Result<Session, StoreError> {
        let mut record = self.record_mut(id)?;
        record.session.code = code;
        record.touch();
        Ok(record.session.clone())
    }

    /// Switch language. Always discards the current code in favour of the
    /// new language's starter snippet, even when the language is unchanged.
    pub fn set_language(&self, id: &str, language: Language) -> Result<Session, StoreError> {
        let mut record = self.record_mut(id)?;
        record.session.language = language;
        record.session.code = self.snippets.for_language(language).to_string();
        record.touch();
        Ok(record.session.clone())
    }

    pub fn add_participant(&self, id: &str, name: &str) -> Result<Participant, StoreError> {
        self.join(id, name).map(|joined| joined.participant)
    }

    /// Add a participant and snapshot the session in one step, so the
    /// snapshot always contains the new participant.
    pub fn join(&self, id: &str, name: &str) -> Result<Joined, StoreError> {
        let mut record = self.record_mut(id)?;
        let participant = record.session.participants.join(name);
        record.touch();
        Ok(Joined {
            participant,
            session: record.session.clone(),
            executions: record.executions.to_vec(),
        })
    }

    /// Remove a participant. Unknown session or participant ids are a no-op.
    pub fn remove_participant(&self, id: &str, participant_id: &str) -> Option<Participant> {
        let mut record = self.sessions.get_mut(id)?;
        let removed = record.session.participants.leave(participant_id);
        if removed.is_some() {
            record.touch();
        }
        removed
    }

    pub fn set_cursor(
        &self,
        id: &str,
        participant_id: &str,
        position: CursorPosition,
    ) -> Result<Participant, StoreError> {
        let mut record = self.record_mut(id)?;
        let participant = record
            .session
            .participants
            .set_cursor(participant_id, position)
            .cloned()
            .ok_or_else(|| StoreError::ParticipantNotFound(participant_id.to_string()))?;
        record.touch();
        Ok(participant)
    }

    pub fn participant(&self, id: &str, participant_id: &str) -> Result<Participant, StoreError> {
        let record = self
            .sessions
            .get(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        record
            .session
            .participants
            .get(participant_id)
            .cloned()
            .ok_or_else(|| StoreError::ParticipantNotFound(participant_id.to_string()))
    }

    pub fn record_execution(&self, id: &str, result: ExecutionResult) -> Result<(), StoreError> {
        let mut record = self.record_mut(id)?;
        record.executions.record(result);
        record.touch();
        Ok(())
    }

    pub fn executions(&self, id: &str) -> Result<Vec<ExecutionResult>, StoreError> {
        self.sessions
            .get(id)
            .map(|r| r.executions.to_vec())
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    /// Empty a session's execution history. Returns the number of results removed.
    pub fn clear_executions(&self, id: &str) -> Result<usize, StoreError> {
        let mut record = self.record_mut(id)?;
        let cleared = record.executions.clear();
        record.touch();
        Ok(cleared)
    }

    /// Ids of sessions with no participants that have been idle for at least `ttl`.
    pub fn idle_sessions(&self, ttl: Duration) -> Vec<String> {
        let now = Instant::now();
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_idle(now, ttl))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn is_idle(&self, id: &str, ttl: Duration) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|r| r.is_idle(Instant::now(), ttl))
    }

    pub fn language(&self, id: &str) -> Result<Language, StoreError> {
        self.sessions
            .get(id)
            .map(|r| r.session.language)
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    pub fn remove(&self, id: &str) -> Option<Session> {
        self.sessions.remove(id).map(|(_, r)| r.session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn record_mut(
        &self,
        id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, SessionRecord>, StoreError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(
            StarterSnippets::default(),
            crate::models::execution::DEFAULT_HISTORY_CAPACITY,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PARTICIPANT_COLORS;

    #[test]
    fn test_create_defaults_to_javascript_snippet() {
        let store = SessionStore::default();
        let session = store.create(None, None);
        assert_eq!(session.language, Language::Javascript);
        assert_eq!(
            session.code,
            store.snippets().for_language(Language::Javascript)
        );
        assert!(session.participants.is_empty());
        assert_eq!(store.get(&session.id).unwrap().id, session.id);
    }

    #[test]
    fn test_create_with_language_and_code() {
        let store = SessionStore::default();
        let python = store.create(Some(Language::Python), None);
        assert_eq!(python.code, store.snippets().for_language(Language::Python));

        let custom = store.create(None, Some("x = 1".into()));
        assert_eq!(custom.code, "x = 1");
    }

    #[test]
    fn test_get_unknown_session() {
        let store = SessionStore::default();
        assert_eq!(
            store.get("nope").unwrap_err(),
            StoreError::SessionNotFound("nope".into())
        );
        assert!(store.set_code("nope", "x".into()).is_err());
        assert!(store.set_language("nope", Language::Python).is_err());
        assert!(store.add_participant("nope", "a").is_err());
    }

    #[test]
    fn test_set_code_is_verbatim() {
        let store = SessionStore::default();
        let id = store.create(None, None).id;
        let code = "  weird\n\ttext \u{1F600}".to_string();
        store.set_code(&id, code.clone()).unwrap();
        assert_eq!(store.get(&id).unwrap().code, code);
    }

    #[test]
    fn test_language_switch_always_resets_code() {
        let store = SessionStore::default();
        let id = store.create(None, None).id;
        for language in [Language::Python, Language::Python, Language::Javascript] {
            store.set_code(&id, "edited".into()).unwrap();
            let session = store.set_language(&id, language).unwrap();
            assert_eq!(session.language, language);
            assert_eq!(store.get(&id).unwrap().code, store.snippets().for_language(language));
        }
    }

    #[test]
    fn test_participant_colors_ignore_departures() {
        let store = SessionStore::default();
        let id = store.create(None, None).id;
        let mut joined = Vec::new();
        for k in 0..PARTICIPANT_COLORS.len() + 2 {
            let p = store.add_participant(&id, &format!("p{k}")).unwrap();
            assert_eq!(p.color, PARTICIPANT_COLORS[k % PARTICIPANT_COLORS.len()]);
            joined.push(p);
            if k % 2 == 0 {
                store.remove_participant(&id, &joined[k].id);
            }
        }
    }

    #[test]
    fn test_join_snapshot_includes_new_participant() {
        let store = SessionStore::default();
        let id = store.create(None, None).id;
        store.add_participant(&id, "first").unwrap();

        let joined = store.join(&id, "second").unwrap();
        assert_eq!(joined.participant.name, "second");
        assert_eq!(joined.session.participants.len(), 2);
        assert!(joined.session.participants.contains(&joined.participant.id));
        assert!(joined.executions.is_empty());

        assert_eq!(
            store.join("missing", "x").unwrap_err(),
            StoreError::SessionNotFound("missing".into())
        );
    }

    #[test]
    fn test_remove_participant_is_idempotent() {
        let store = SessionStore::default();
        let id = store.create(None, None).id;
        let p = store.add_participant(&id, "a").unwrap();
        assert!(store.remove_participant(&id, &p.id).is_some());
        assert!(store.remove_participant(&id, &p.id).is_none());
        assert!(store.remove_participant("missing-session", &p.id).is_none());
        assert!(store.get(&id).unwrap().participants.is_empty());
    }

    #[test]
    fn test_set_cursor_requires_participant() {
        let store = SessionStore::default();
        let id = store.create(None, None).id;
        let p = store.add_participant(&id, "a").unwrap();
        let pos = CursorPosition { line: 3, column: 9 };
        let updated = store.set_cursor(&id, &p.id, pos).unwrap();
        assert_eq!(updated.cursor_position, Some(pos));
        assert_eq!(
            store.set_cursor(&id, "ghost", pos).unwrap_err(),
            StoreError::ParticipantNotFound("ghost".into())
        );
    }

    #[test]
    fn test_execution_history_is_bounded() {
        let store = SessionStore::new(StarterSnippets::default(), 3);
        let id = store.create(None, None).id;
        for n in 0..4 {
            store
                .record_execution(
                    &id,
                    ExecutionResult {
                        output: n.to_string(),
                        error: None,
                        execution_time: 0.0,
                        language: Language::Javascript,
                    },
                )
                .unwrap();
        }
        let outputs: Vec<String> = store
            .executions(&id)
            .unwrap()
            .into_iter()
            .map(|r| r.output)
            .collect();
        assert_eq!(outputs, vec!["3", "2", "1"]);

        assert_eq!(store.clear_executions(&id).unwrap(), 3);
        assert!(store.executions(&id).unwrap().is_empty());
        assert_eq!(
            store.clear_executions("missing").unwrap_err(),
            StoreError::SessionNotFound("missing".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_skip_occupied_and_recent() {
        let store = SessionStore::default();
        let idle = store.create(None, None).id;
        let occupied = store.create(None, None).id;
        store.add_participant(&occupied, "a").unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;
        let recent = store.create(None, None).id;

        let ids = store.idle_sessions(Duration::from_secs(60));
        assert_eq!(ids, vec![idle.clone()]);
        assert!(!ids.contains(&recent));
        assert!(store.remove(&idle).is_some());
        assert_eq!(store.len(), 2);
    }
}
