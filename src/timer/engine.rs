use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::event::TimerEvent;
use crate::notify::NotificationSink;
use crate::timer::model::{RegistrySnapshot, Timer, TimerId, TimerStatus, format_clock};
use crate::timer::parse::{self, ContextLexicon, SuggestionFormat, TimerSuggestion};
use crate::timer::recipe::{
    BindingError, RecipeBinding, RecipeRepository, RecipeTimerRecord, datetime_from_epoch_ms,
};
use crate::timer::store::{StorageError, TimerStore};

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer duration must be positive, got {0}")]
    InvalidDuration(i64),
    #[error("no timer with id {0}")]
    NotFound(TimerId),
    #[error("timer {id} cannot {op} while {status:?}")]
    InvalidTransition {
        id: TimerId,
        op: &'static str,
        status: TimerStatus,
    },
    #[error("no recipe '{0}' in the repository")]
    RecipeNotFound(String),
    #[error("no recipe is bound; the timer was not saved to a recipe")]
    Unbound,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<BindingError> for TimerError {
    fn from(err: BindingError) -> Self {
        match err {
            BindingError::RecipeNotFound(id) => TimerError::RecipeNotFound(id),
            BindingError::Unbound => TimerError::Unbound,
            BindingError::Storage(err) => TimerError::Storage(err),
        }
    }
}

/// Live timers keyed by id; owns id allocation.
#[derive(Debug)]
pub struct TimerRegistry {
    next_id: TimerId,
    timers: BTreeMap<TimerId, Timer>,
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self {
            next_id: 1,
            timers: BTreeMap::new(),
        }
    }
}

impl TimerRegistry {
    fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut next_id = snapshot.next_timer_id.max(1);
        let mut timers = BTreeMap::new();
        for timer in snapshot.timers {
            // A stale counter in the blob must not cause id reuse.
            next_id = next_id.max(timer.id.saturating_add(1));
            timers.insert(timer.id, timer);
        }
        Self { next_id, timers }
    }

    fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            next_timer_id: self.next_id,
            timers: self.timers.values().cloned().collect(),
        }
    }

    fn allocate_id(&mut self) -> TimerId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    fn reserve_past(&mut self, id: TimerId) {
        self.next_id = self.next_id.max(id.saturating_add(1));
    }

    fn insert(&mut self, timer: Timer) {
        self.timers.insert(timer.id, timer);
    }

    fn remove(&mut self, id: TimerId) -> Option<Timer> {
        self.timers.remove(&id)
    }

    pub fn get(&self, id: TimerId) -> Option<&Timer> {
        self.timers.get(&id)
    }

    fn get_mut(&mut self, id: TimerId) -> Option<&mut Timer> {
        self.timers.get_mut(&id)
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Timer> {
        self.timers.values()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    fn clear(&mut self) -> usize {
        let discarded = self.timers.len();
        self.timers.clear();
        discarded
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TickOutcome {
    pub finished: usize,
    pub running: usize,
}

/// What a text scan did: tagged matches become live timers (minus
/// suppressed duplicates), generic matches are only suggested.
#[derive(Debug, Default)]
pub struct DetectOutcome {
    pub created: Vec<TimerId>,
    pub suggested: Vec<TimerSuggestion>,
    pub skipped_duplicates: usize,
}

/// The timer subsystem: registry, lifecycle transitions, write-through
/// persistence and recipe bookkeeping behind one explicitly constructed
/// value.
///
/// Single-threaded by design; a multi-threaded host puts the engine
/// behind one mutex so ticks, user transitions and persistence writes are
/// linearized. The host drives [`tick`](Self::tick) about once per
/// second; remaining time is recomputed from the wall-clock anchor on
/// every tick, so an arbitrarily late tick (suspended process, closed
/// laptop) settles each running timer in a single step.
pub struct TimerEngine {
    clock: Box<dyn Clock>,
    store: Box<dyn TimerStore>,
    notifier: Box<dyn NotificationSink>,
    registry: TimerRegistry,
    binding: RecipeBinding,
    lexicon: ContextLexicon,
    events: Vec<TimerEvent>,
}

impl TimerEngine {
    pub fn new(
        clock: Box<dyn Clock>,
        store: Box<dyn TimerStore>,
        notifier: Box<dyn NotificationSink>,
    ) -> Self {
        Self {
            clock,
            store,
            notifier,
            registry: TimerRegistry::default(),
            binding: RecipeBinding::new(None),
            lexicon: ContextLexicon::default(),
            events: Vec::new(),
        }
    }

    pub fn with_recipes(mut self, repo: Box<dyn RecipeRepository>) -> Self {
        self.binding = RecipeBinding::new(Some(repo));
        self
    }

    pub fn with_lexicon(mut self, lexicon: ContextLexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    /// Load persisted state and reconcile running timers against the
    /// current clock: a running timer whose deadline passed while the
    /// process was down finishes immediately (one notification), the
    /// rest resume with their true remaining time.
    pub fn restore(&mut self) -> Result<TickOutcome, TimerError> {
        let snapshot = self.store.load();
        let now_ms = self.clock.now_ms();
        self.registry = TimerRegistry::from_snapshot(snapshot);

        let mut outcome = TickOutcome::default();
        let running: Vec<TimerId> = self
            .registry
            .iter()
            .filter(|timer| timer.is_running())
            .map(|timer| timer.id)
            .collect();
        for id in running {
            let Some(timer) = self.registry.get_mut(id) else {
                continue;
            };
            let remaining = timer.remaining_at(now_ms);
            if remaining == 0 {
                self.finish_timer(id, now_ms);
                outcome.finished += 1;
            } else {
                timer.remaining_secs = remaining;
                outcome.running += 1;
            }
        }
        info!(
            timers = self.registry.len(),
            resumed = outcome.running,
            finished = outcome.finished,
            "timer state restored"
        );
        self.persist()?;
        Ok(outcome)
    }

    pub fn create(
        &mut self,
        duration_secs: i64,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<TimerId, TimerError> {
        let duration = positive_duration(duration_secs)?;
        let now_ms = self.clock.now_ms();
        let label = {
            let label = label.into();
            if label.is_empty() {
                format_clock(duration)
            } else {
                label
            }
        };
        let id = self.registry.allocate_id();
        let timer = Timer::staged(id, duration, label.clone(), description);
        self.registry.insert(timer);
        debug!(id, duration, "timer created");
        self.events.push(TimerEvent::TimerCreated {
            id,
            duration_secs: duration,
            label,
            at_ms: now_ms,
        });
        self.persist()?;
        Ok(id)
    }

    pub fn start(&mut self, id: TimerId) -> Result<(), TimerError> {
        let now_ms = self.clock.now_ms();
        let timer = self.registry.get_mut(id).ok_or(TimerError::NotFound(id))?;
        match timer.status {
            TimerStatus::Staged | TimerStatus::Paused => {}
            status => {
                return Err(TimerError::InvalidTransition {
                    id,
                    op: "start",
                    status,
                });
            }
        }
        timer.started_at_ms = Some(timer.anchor_at(now_ms));
        timer.status = TimerStatus::Running;
        let remaining = timer.remaining_secs;
        self.events.push(TimerEvent::TimerStarted {
            id,
            remaining_secs: remaining,
            at_ms: now_ms,
        });
        self.persist()
    }

    pub fn pause(&mut self, id: TimerId) -> Result<(), TimerError> {
        let now_ms = self.clock.now_ms();
        let (status, remaining) = {
            let timer = self.registry.get(id).ok_or(TimerError::NotFound(id))?;
            (timer.status, timer.remaining_at(now_ms))
        };
        if status != TimerStatus::Running {
            return Err(TimerError::InvalidTransition {
                id,
                op: "pause",
                status,
            });
        }
        if remaining == 0 {
            // Settled exactly at the deadline; finishing wins over the
            // pause, keeping remaining == 0 exclusive to Finished.
            self.finish_timer(id, now_ms);
        } else {
            let Some(timer) = self.registry.get_mut(id) else {
                return Err(TimerError::NotFound(id));
            };
            timer.remaining_secs = remaining;
            timer.status = TimerStatus::Paused;
            timer.started_at_ms = None;
            self.events.push(TimerEvent::TimerPaused {
                id,
                remaining_secs: remaining,
                at_ms: now_ms,
            });
        }
        self.persist()
    }

    /// Shared driver entry point: settle every running timer against the
    /// clock. A timer that reached its deadline transitions to Finished
    /// and notifies exactly once; already-finished timers are untouched.
    pub fn tick(&mut self) -> Result<TickOutcome, TimerError> {
        let now_ms = self.clock.now_ms();
        let mut outcome = TickOutcome::default();
        let mut changed = false;
        let running: Vec<TimerId> = self
            .registry
            .iter()
            .filter(|timer| timer.is_running())
            .map(|timer| timer.id)
            .collect();
        for id in running {
            let Some(timer) = self.registry.get_mut(id) else {
                // Stopped between collection and settling; nothing to do.
                continue;
            };
            let remaining = timer.remaining_at(now_ms);
            if remaining == 0 {
                self.finish_timer(id, now_ms);
                outcome.finished += 1;
                changed = true;
            } else {
                if timer.remaining_secs != remaining {
                    timer.remaining_secs = remaining;
                    changed = true;
                }
                outcome.running += 1;
            }
        }
        if changed {
            self.persist()?;
        }
        Ok(outcome)
    }

    /// Remove the timer entirely. Works from any status; the shared
    /// driver simply misses the id afterwards, so there is no pending
    /// callback left to fire. Also drops the saved record from the bound
    /// recipe, if any.
    pub fn stop(&mut self, id: TimerId) -> Result<(), TimerError> {
        let now_ms = self.clock.now_ms();
        self.registry.remove(id).ok_or(TimerError::NotFound(id))?;
        self.events.push(TimerEvent::TimerStopped { id, at_ms: now_ms });
        if self.binding.is_bound() {
            self.binding.remove(id)?;
        }
        self.persist()
    }

    /// Overwrite duration and description of a staged timer; the label
    /// follows the new duration's clock face and remaining is reset.
    pub fn edit(
        &mut self,
        id: TimerId,
        duration_secs: i64,
        description: impl Into<String>,
    ) -> Result<(), TimerError> {
        let duration = positive_duration(duration_secs)?;
        let now_ms = self.clock.now_ms();
        {
            let timer = self.registry.get_mut(id).ok_or(TimerError::NotFound(id))?;
            if timer.status != TimerStatus::Staged {
                return Err(TimerError::InvalidTransition {
                    id,
                    op: "edit",
                    status: timer.status,
                });
            }
            timer.duration_secs = duration;
            timer.remaining_secs = duration;
            timer.description = description.into();
            timer.label = format_clock(duration);
        }
        self.events.push(TimerEvent::TimerEdited {
            id,
            duration_secs: duration,
            at_ms: now_ms,
        });
        let is_saved = self
            .binding
            .saved_records()
            .iter()
            .any(|record| record.id == id);
        if self.binding.is_bound() && is_saved {
            self.save_to_recipe(id)?;
        }
        self.persist()
    }

    /// Scan instruction text: tagged matches are created as staged timers
    /// unless a live timer already carries the same (label, description)
    /// pair; generic matches come back as suggestions only.
    pub fn detect_timers(&mut self, text: &str) -> Result<DetectOutcome, TimerError> {
        let suggestions = parse::parse_with_lexicon(text, &self.lexicon);
        let mut outcome = DetectOutcome::default();
        for suggestion in suggestions {
            match suggestion.format {
                SuggestionFormat::Tagged => {
                    let duplicate = self.registry.iter().any(|timer| {
                        timer.label == suggestion.label
                            && timer.description == suggestion.description
                    });
                    if duplicate {
                        debug!(label = %suggestion.label, "duplicate auto-timer suppressed");
                        outcome.skipped_duplicates += 1;
                        continue;
                    }
                    let id = self.create(
                        i64::try_from(suggestion.duration_secs).unwrap_or(i64::MAX),
                        suggestion.label.clone(),
                        suggestion.description.clone(),
                    )?;
                    outcome.created.push(id);
                }
                SuggestionFormat::Generic => outcome.suggested.push(suggestion),
            }
        }
        Ok(outcome)
    }

    /// Bind a recipe and load its saved records. Live timers are not
    /// staged by this; re-staging a record is an explicit action.
    pub fn bind_recipe(&mut self, recipe_id: &str) -> Result<usize, TimerError> {
        let loaded = self.binding.load_for_recipe(recipe_id)?;
        debug!(recipe_id, loaded, "recipe bound");
        Ok(loaded)
    }

    /// Unbind the current recipe and discard every live timer. Saved
    /// records survive in the repository.
    pub fn clear_recipe(&mut self) -> Result<usize, TimerError> {
        let now_ms = self.clock.now_ms();
        let discarded = self.registry.clear();
        self.binding.clear();
        self.events.push(TimerEvent::RecipeCleared {
            discarded,
            at_ms: now_ms,
        });
        self.persist()?;
        Ok(discarded)
    }

    /// Save the timer's current definition into the bound recipe,
    /// matched by id. With no bound recipe this is a no-op surfaced as
    /// [`TimerError::Unbound`] so the caller can warn the user.
    pub fn save_to_recipe(&mut self, id: TimerId) -> Result<(), TimerError> {
        let now_ms = self.clock.now_ms();
        let record = {
            let timer = self.registry.get(id).ok_or(TimerError::NotFound(id))?;
            RecipeTimerRecord {
                id: timer.id,
                duration: timer.duration_secs,
                label: timer.label.clone(),
                description: timer.description.clone(),
                date_created: datetime_from_epoch_ms(now_ms),
            }
        };
        self.binding.upsert(record).map_err(|err| {
            if matches!(err, BindingError::Unbound) {
                warn!(id, "no recipe bound, timer was not saved to a recipe");
            }
            TimerError::from(err)
        })
    }

    /// Delete a saved record from the bound recipe, independent of
    /// whether a live timer with that id exists.
    pub fn remove_recipe_timer(&mut self, timer_id: TimerId) -> Result<bool, TimerError> {
        Ok(self.binding.remove(timer_id)?)
    }

    /// Re-stage a saved record as a live staged timer under the record's
    /// own id, so later saves keep matching it.
    pub fn stage_record(&mut self, record: &RecipeTimerRecord) -> Result<TimerId, TimerError> {
        let duration = positive_duration(i64::try_from(record.duration).unwrap_or(i64::MAX))?;
        if let Some(live) = self.registry.get(record.id) {
            return Err(TimerError::InvalidTransition {
                id: record.id,
                op: "stage",
                status: live.status,
            });
        }
        let now_ms = self.clock.now_ms();
        let timer = Timer::staged(
            record.id,
            duration,
            record.label.clone(),
            record.description.clone(),
        );
        self.registry.insert(timer);
        self.registry.reserve_past(record.id);
        self.events.push(TimerEvent::TimerCreated {
            id: record.id,
            duration_secs: duration,
            label: record.label.clone(),
            at_ms: now_ms,
        });
        self.persist()?;
        Ok(record.id)
    }

    /// Projected remaining seconds at the current clock reading.
    pub fn remaining(&self, id: TimerId) -> Result<u64, TimerError> {
        let timer = self.registry.get(id).ok_or(TimerError::NotFound(id))?;
        Ok(timer.remaining_at(self.clock.now_ms()))
    }

    pub fn get(&self, id: TimerId) -> Option<&Timer> {
        self.registry.get(id)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> {
        self.registry.iter()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn saved_records(&self) -> &[RecipeTimerRecord] {
        self.binding.saved_records()
    }

    pub fn bound_recipe(&self) -> Option<&str> {
        self.binding.bound_recipe()
    }

    /// Drain events accumulated since the last call; the presentation
    /// layer renders from these.
    pub fn take_events(&mut self) -> Vec<TimerEvent> {
        std::mem::take(&mut self.events)
    }

    fn finish_timer(&mut self, id: TimerId, now_ms: u64) {
        let Some(timer) = self.registry.get_mut(id) else {
            return;
        };
        timer.remaining_secs = 0;
        timer.status = TimerStatus::Finished;
        timer.started_at_ms = None;
        let label = timer.label.clone();
        info!(id, %label, "timer finished");
        self.notifier.on_timer_finished(&label);
        self.events.push(TimerEvent::TimerFinished {
            id,
            label,
            at_ms: now_ms,
        });
    }

    /// Write-through: the whole snapshot, synchronously, on every
    /// mutation. A failed write is logged and surfaced, but the
    /// in-memory state stands and the engine keeps running memory-only
    /// until a later write succeeds.
    fn persist(&mut self) -> Result<(), TimerError> {
        let snapshot = self.registry.snapshot();
        if let Err(err) = self.store.save(&snapshot) {
            warn!(error = %err, "timer state write failed, continuing in memory");
            return Err(TimerError::Storage(err));
        }
        Ok(())
    }
}

fn positive_duration(duration_secs: i64) -> Result<u64, TimerError> {
    if duration_secs <= 0 {
        return Err(TimerError::InvalidDuration(duration_secs));
    }
    // Guarded above; the cast cannot wrap.
    Ok(duration_secs as u64)
}
