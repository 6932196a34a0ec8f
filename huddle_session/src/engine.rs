// Seam to the game logic.
//
// The coordinator never interprets game state. When the host starts a game it
// hands the ordered member list to a `GameEngine` and gets back a JSON
// snapshot shaped `{"players": [{"id": ...}, ...], ...}` whose `players`
// entries line up with the input order (index 0 = host). The only thing the
// coordinator reads out of it is each player's `id`, which becomes the
// `localId` of that member's `game-start` message.

use serde_json::Value;

use crate::error::SessionError;

pub trait GameEngine {
    /// Build the initial authoritative state for `players` (host first).
    fn create_snapshot(&self, players: &[String]) -> Value;
}

impl<F: Fn(&[String]) -> Value> GameEngine for F {
    fn create_snapshot(&self, players: &[String]) -> Value {
        self(players)
    }
}

/// Pull one `id` per member out of a snapshot, in member order.
pub(crate) fn player_ids(snapshot: &Value, count: usize) -> Result<Vec<Value>, SessionError> {
    (0..count)
        .map(|index| {
            snapshot
                .get("players")
                .and_then(|players| players.get(index))
                .and_then(|player| player.get("id"))
                .filter(|id| !id.is_null())
                .cloned()
                .ok_or(SessionError::MissingPlayerId(index))
        })
        .collect()
}
