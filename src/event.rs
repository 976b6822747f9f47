use serde::{Deserialize, Serialize};

use crate::timer::model::TimerId;

/// Every state change in the engine produces an event.
///
/// The presentation layer drains these with
/// [`TimerEngine::take_events`](crate::timer::engine::TimerEngine::take_events)
/// and renders from them; the engine itself never touches a view.
/// All timestamps are engine-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TimerEvent {
    TimerCreated {
        id: TimerId,
        duration_secs: u64,
        label: String,
        at_ms: u64,
    },
    TimerStarted {
        id: TimerId,
        remaining_secs: u64,
        at_ms: u64,
    },
    TimerPaused {
        id: TimerId,
        remaining_secs: u64,
        at_ms: u64,
    },
    TimerFinished {
        id: TimerId,
        label: String,
        at_ms: u64,
    },
    TimerStopped {
        id: TimerId,
        at_ms: u64,
    },
    TimerEdited {
        id: TimerId,
        duration_secs: u64,
        at_ms: u64,
    },
    /// The recipe context was cleared and all live timers discarded.
    RecipeCleared {
        discarded: usize,
        at_ms: u64,
    },
}
