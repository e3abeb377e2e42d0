use serde::{Serialize, Serializer};

use crate::models::participant::{CursorPosition, Participant, PARTICIPANT_COLORS};

/// Roster of one session's participants in join order.
///
/// Colors are assigned from [`PARTICIPANT_COLORS`] by the number of joins
/// this session has ever seen, so a departure never shifts anyone's color
/// and a later joiner may reuse a color still in use.
#[derive(Debug, Clone, Default)]
pub struct ParticipantRegistry {
    participants: Vec<Participant>,
    joined: usize,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, name: &str) -> Participant {
        let color = PARTICIPANT_COLORS[self.joined % PARTICIPANT_COLORS.len()];
        self.joined += 1;

        let participant = Participant {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            color: color.to_string(),
            cursor_position: None,
        };
        self.participants.push(participant.clone());
        participant
    }

    /// Remove a participant. Unknown ids are ignored.
    pub fn leave(&mut self, participant_id: &str) -> Option<Participant> {
        let idx = self
            .participants
            .iter()
            .position(|p| p.id == participant_id)?;
        Some(self.participants.remove(idx))
    }

    pub fn set_cursor(
        &mut self,
        participant_id: &str,
        position: CursorPosition,
    ) -> Option<&Participant> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)?;
        participant.cursor_position = Some(position);
        Some(participant)
    }

    pub fn get(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == participant_id)
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.get(participant_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Number of joins ever recorded, departures included.
    pub fn total_joined(&self) -> usize {
        self.joined
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }
}

impl Serialize for ParticipantRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.participants.iter())
    }
}
