use super::{ChatTurn, Speaker};
use chrono::Utc;

/// Folds streamed transcript fragments into ordered chat turns
///
/// A fragment extends the most recent turn while that turn is open and from
/// the same speaker; anything else opens a new turn. Fragment text is
/// appended exactly as received, so nothing is dropped or duplicated.
#[derive(Debug, Default)]
pub struct TranscriptReconciler {
    turns: Vec<ChatTurn>,
}

impl TranscriptReconciler {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Seed the transcript with a completed model turn (opening greeting)
    pub fn seed_greeting(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        self.turns.push(ChatTurn {
            speaker: Speaker::Model,
            text: text.to_string(),
            complete: true,
            started_at: Utc::now(),
        });
    }

    /// Apply one streamed fragment
    ///
    /// Empty fragments are ignored so they never open an empty turn.
    pub fn apply_fragment(&mut self, speaker: Speaker, text: &str) {
        if text.is_empty() {
            return;
        }

        match self.turns.last_mut() {
            Some(last) if last.speaker == speaker && !last.complete => {
                last.text.push_str(text);
            }
            _ => {
                self.turns.push(ChatTurn {
                    speaker,
                    text: text.to_string(),
                    complete: false,
                    started_at: Utc::now(),
                });
            }
        }
    }

    /// Close every open turn (turn boundary from the remote service)
    pub fn complete_turns(&mut self) {
        for turn in &mut self.turns {
            turn.complete = true;
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
