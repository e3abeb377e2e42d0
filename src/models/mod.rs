pub mod execution;
pub mod participant;
pub mod session;

pub use execution::{ExecutionHistory, ExecutionResult};
pub use participant::{CursorPosition, Participant, ParticipantInfo, PARTICIPANT_COLORS};
pub use session::{Language, Session, SessionSummary};
