use tokio::sync::mpsc;

/// One live realtime connection as seen by the hub.
#[derive(Debug)]
pub struct Connection {
    pub connection_id: String,
    pub participant_id: String,
    /// Serialized frames queued for this connection's socket task.
    pub tx: mpsc::UnboundedSender<String>,
}
