use std::sync::Arc;

use crate::gateway::heartbeat::HeartbeatConfig;
use crate::gateway::hub::RealtimeHub;
use crate::runner::{ClientSideRunner, CodeRunner};
use crate::store::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RealtimeHub>,
    pub runner: Arc<dyn CodeRunner>,
    pub heartbeat: HeartbeatConfig,
}

impl AppState {
    pub fn new(store: SessionStore, heartbeat: HeartbeatConfig) -> Self {
        Self {
            hub: Arc::new(RealtimeHub::new(Arc::new(store))),
            runner: Arc::new(ClientSideRunner),
            heartbeat,
        }
    }

    pub fn store(&self) -> &SessionStore {
        self.hub.store()
    }
}
