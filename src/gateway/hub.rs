use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::connection::Connection;
use super::protocol::{ProtocolError, SyncMessage};
use crate::models::{ExecutionResult, Language, Participant, Session};
use crate::store::{SessionStore, StoreError};

/// `userId` stamped on code updates that did not come from a participant.
pub const SERVER_USER_ID: &str = "server";

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("connection {0} is not registered")]
    UnknownConnection(String),
}

/// Result of registering a connection.
#[derive(Debug)]
pub struct Registration {
    pub connection_id: String,
    pub participant: Participant,
    /// Snapshot taken under the room lock: every frame queued to the new
    /// connection afterwards is newer than this.
    pub session: Session,
    pub executions: Vec<ExecutionResult>,
}

/// Live connections of one session. The room's mutex is the session's
/// serialization queue.
#[derive(Default)]
struct Room {
    connections: Vec<Connection>,
    seq: u64,
}

impl Room {
    /// Queue `message` to every connection except `skip`. Returns the ids of
    /// connections whose socket task is gone.
    fn fan_out(&mut self, message: &SyncMessage, skip: Option<&str>) -> Vec<String> {
        self.seq += 1;
        let text = message.to_frame(self.seq).to_text();
        let mut dead = Vec::new();
        for conn in &self.connections {
            if skip == Some(conn.connection_id.as_str()) {
                continue;
            }
            if conn.tx.send(text.clone()).is_err() {
                dead.push(conn.connection_id.clone());
            }
        }
        dead
    }
}

/// Fans sync messages out to the connections of each session.
///
/// State changes and the enqueueing of the resulting frames happen while
/// holding the session's room lock, so every connection sees events in the
/// same order. Socket writes happen in each connection's own task.
pub struct RealtimeHub {
    store: Arc<SessionStore>,
    rooms: DashMap<String, Arc<Mutex<Room>>>,
}

impl RealtimeHub {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            rooms: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Room for a session that exists in the store, creating it on first use.
    fn room(&self, session_id: &str) -> Result<Arc<Mutex<Room>>, StoreError> {
        if !self.store.contains(session_id) {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }
        let room = self
            .rooms
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Room::default())));
        Ok(Arc::clone(room.value()))
    }

    /// Drop a room created for a session that has since been evicted.
    fn discard_orphaned_room(&self, session_id: &str) {
        self.rooms
            .remove_if(session_id, |_, _| !self.store.contains(session_id));
    }

    pub async fn register(
        &self,
        session_id: &str,
        name: &str,
        tx: mpsc::UnboundedSender<String>,
    ) -> Result<Registration, HubError> {
        let room = self.room(session_id)?;
        let (registration, dead) = {
            let mut room = room.lock().await;
            // Participant and snapshot come from one store call, so an
            // eviction cannot land between them.
            let joined = match self.store.join(session_id, name) {
                Ok(joined) => joined,
                Err(e) => {
                    drop(room);
                    self.discard_orphaned_room(session_id);
                    return Err(e.into());
                }
            };
            let connection_id = uuid::Uuid::new_v4().to_string();

            let join = SyncMessage::participant_join(session_id, &joined.participant);
            let dead = room.fan_out(&join, None);
            room.connections.push(Connection {
                connection_id: connection_id.clone(),
                participant_id: joined.participant.id.clone(),
                tx,
            });

            let registration = Registration {
                connection_id,
                participant: joined.participant,
                session: joined.session,
                executions: joined.executions,
            };
            (registration, dead)
        };

        tracing::info!(
            "participant {} ({}) joined session {session_id}",
            registration.participant.id,
            registration.participant.name
        );
        self.reap(session_id, dead).await;
        Ok(registration)
    }

    /// Remove a connection and tell the rest of the session it left.
    /// Returns the departed participant id, or `None` if the connection was
    /// already gone.
    pub async fn unregister(&self, session_id: &str, connection_id: &str) -> Option<String> {
        let (participant_id, dead) = self.detach(session_id, connection_id).await?;
        self.reap(session_id, dead).await;
        Some(participant_id)
    }

    async fn detach(&self, session_id: &str, connection_id: &str) -> Option<(String, Vec<String>)> {
        let room = self.rooms.get(session_id).map(|r| Arc::clone(r.value()))?;
        let mut room = room.lock().await;
        let idx = room
            .connections
            .iter()
            .position(|c| c.connection_id == connection_id)?;
        let connection = room.connections.remove(idx);
        self.store
            .remove_participant(session_id, &connection.participant_id);

        let leave = SyncMessage::participant_leave(session_id, &connection.participant_id);
        let dead = room.fan_out(&leave, None);
        tracing::info!(
            "participant {} left session {session_id}",
            connection.participant_id
        );
        Some((connection.participant_id, dead))
    }

    /// Unregister connections whose channel is closed. Their own leave
    /// broadcasts may surface more dead connections, which are handled in
    /// the same loop.
    async fn reap(&self, session_id: &str, mut dead: Vec<String>) {
        while let Some(connection_id) = dead.pop() {
            tracing::debug!("connection {connection_id} unreachable, dropping it");
            if let Some((_, more)) = self.detach(session_id, &connection_id).await {
                dead.extend(more);
            }
        }
    }

    /// Accept a client message: apply it to the store, then queue it to every
    /// other connection of the session. Returns the sequence number assigned.
    pub async fn publish(
        &self,
        session_id: &str,
        origin_connection_id: &str,
        mut message: SyncMessage,
    ) -> Result<u64, HubError> {
        let room = self
            .rooms
            .get(session_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        let (seq, dead) = {
            let mut room = room.lock().await;
            let participant_id = room
                .connections
                .iter()
                .find(|c| c.connection_id == origin_connection_id)
                .map(|c| c.participant_id.clone())
                .ok_or_else(|| HubError::UnknownConnection(origin_connection_id.to_string()))?;
            message.check_origin(session_id, &participant_id)?;
            self.apply(session_id, &participant_id, &mut message)?;

            let dead = room.fan_out(&message, Some(origin_connection_id));
            (room.seq, dead)
        };
        self.reap(session_id, dead).await;
        Ok(seq)
    }

    /// Apply a message to the store, rewriting any fields the roster owns.
    fn apply(
        &self,
        session_id: &str,
        participant_id: &str,
        message: &mut SyncMessage,
    ) -> Result<(), HubError> {
        match message {
            SyncMessage::CodeUpdate(m) => {
                self.store.set_code(session_id, m.code.clone())?;
            }
            SyncMessage::CursorUpdate(m) => {
                // Name and color shown to others come from the roster.
                let participant = self.store.set_cursor(session_id, participant_id, m.position)?;
                m.user_name = participant.name;
                m.color = participant.color;
            }
            SyncMessage::ExecutionResult(m) => {
                let language = self.store.language(session_id)?;
                self.store.record_execution(
                    session_id,
                    ExecutionResult {
                        output: m.output.clone(),
                        error: m.error.clone(),
                        execution_time: m.execution_time,
                        language,
                    },
                )?;
            }
            SyncMessage::ParticipantJoin(_) | SyncMessage::ParticipantLeave(_) => {
                return Err(ProtocolError::ServerOnly(message.message_type()).into());
            }
        }
        Ok(())
    }

    /// Replace a session's code from outside the realtime channel and push
    /// the result to every connection.
    pub async fn update_code(
        &self,
        session_id: &str,
        code: String,
        user_id: &str,
    ) -> Result<Session, HubError> {
        let room = self.room(session_id)?;
        let (session, dead) = {
            let mut room = room.lock().await;
            let session = self.store.set_code(session_id, code)?;
            let update = SyncMessage::code_update(session_id, &session.code, user_id);
            let dead = room.fan_out(&update, None);
            (session, dead)
        };
        self.reap(session_id, dead).await;
        Ok(session)
    }

    /// Switch language, which resets the code to the starter snippet, and
    /// push the reset code to every connection.
    pub async fn update_language(
        &self,
        session_id: &str,
        language: Language,
    ) -> Result<Session, HubError> {
        let room = self.room(session_id)?;
        let (session, dead) = {
            let mut room = room.lock().await;
            let session = self.store.set_language(session_id, language)?;
            let update = SyncMessage::code_update(session_id, &session.code, SERVER_USER_ID);
            let dead = room.fan_out(&update, None);
            (session, dead)
        };
        tracing::info!("session {session_id} switched to {language}");
        self.reap(session_id, dead).await;
        Ok(session)
    }

    pub async fn connection_count(&self, session_id: &str) -> usize {
        match self.rooms.get(session_id).map(|r| Arc::clone(r.value())) {
            Some(room) => room.lock().await.connections.len(),
            None => 0,
        }
    }

    /// Remove sessions that have no connections and have been idle for at
    /// least `ttl`. Returns the evicted ids.
    pub async fn evict_idle(&self, ttl: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        for session_id in self.store.idle_sessions(ttl) {
            let room = self.rooms.get(&session_id).map(|r| Arc::clone(r.value()));
            let guard = match &room {
                Some(room) => Some(room.lock().await),
                None => None,
            };
            let occupied = guard.as_ref().is_some_and(|g| !g.connections.is_empty());
            // Re-check under the lock, a request may have touched it meanwhile.
            if occupied || !self.store.is_idle(&session_id, ttl) {
                continue;
            }
            self.store.remove(&session_id);
            self.rooms.remove(&session_id);
            drop(guard);
            evicted.push(session_id);
        }
        if !evicted.is_empty() {
            tracing::info!("evicted {} idle session(s)", evicted.len());
        }
        evicted
    }
}

/// Periodically evict idle sessions.
pub fn spawn_reaper(hub: Arc<RealtimeHub>, ttl: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            hub.evict_idle(ttl).await;
        }
    })
}
