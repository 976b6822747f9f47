//! Recipe timer engine: any number of independent countdown timers,
//! optionally bound to a recipe, with wall-clock crash recovery and
//! duration detection in free-form instruction text.
//!
//! The engine is a plain value owned by the host application. It keeps
//! no hidden globals, renders nothing, and talks to the outside world
//! through four ports: a [`Clock`], a [`TimerStore`] for the durable
//! snapshot, a [`NotificationSink`] for completions and an optional
//! [`RecipeRepository`] for saved per-recipe timer records. The host
//! drives time by calling [`TimerEngine::tick`] about once per second;
//! remaining time is recomputed from a wall-clock anchor on every tick,
//! so missed ticks never cause drift.

pub mod clock;
pub mod event;
pub mod notify;
pub mod timer;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::event::TimerEvent;
pub use crate::notify::{LogNotifier, NotificationSink, NullNotifier};
pub use crate::timer::engine::{DetectOutcome, TickOutcome, TimerEngine, TimerError, TimerRegistry};
pub use crate::timer::model::{RegistrySnapshot, Timer, TimerId, TimerStatus, format_clock};
pub use crate::timer::parse::{
    ContextLexicon, MAX_DURATION_SECS, SuggestionFormat, TimerSuggestion, parse,
    parse_with_lexicon,
};
pub use crate::timer::recipe::{Recipe, RecipeBinding, RecipeRepository, RecipeTimerRecord};
pub use crate::timer::store::{JsonFileStore, MemoryStore, StorageError, TimerStore};
