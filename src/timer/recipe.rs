use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timer::model::TimerId;
use crate::timer::store::StorageError;

/// Durable snapshot of a timer's definition, persisted alongside a recipe.
///
/// Independent of the live timer's remaining time and status; it exists so
/// the timer can be re-staged when the recipe is reopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeTimerRecord {
    pub id: TimerId,
    pub duration: u64,
    pub label: String,
    pub description: String,
    pub date_created: DateTime<Utc>,
}

/// The slice of a recipe this subsystem reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    #[serde(default)]
    pub timers: Vec<RecipeTimerRecord>,
}

/// External owner of recipes. The engine only ever touches the
/// `timers` list of the recipe it is bound to.
pub trait RecipeRepository: Send {
    fn get_recipe_by_id(&mut self, recipe_id: &str) -> Option<&mut Recipe>;
    fn save_recipes(&mut self) -> Result<(), StorageError>;
}

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("no recipe '{0}' in the repository")]
    RecipeNotFound(String),
    #[error("no recipe is currently bound")]
    Unbound,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Association between the live registry and one recipe's saved records.
pub struct RecipeBinding {
    repo: Option<Box<dyn RecipeRepository>>,
    bound_recipe: Option<String>,
    saved: Vec<RecipeTimerRecord>,
}

impl RecipeBinding {
    pub(crate) fn new(repo: Option<Box<dyn RecipeRepository>>) -> Self {
        Self {
            repo,
            bound_recipe: None,
            saved: Vec::new(),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.repo.is_some() && self.bound_recipe.is_some()
    }

    pub fn bound_recipe(&self) -> Option<&str> {
        self.bound_recipe.as_deref()
    }

    pub fn saved_records(&self) -> &[RecipeTimerRecord] {
        &self.saved
    }

    /// Replace the in-memory saved list with the recipe's persisted
    /// records. Does not stage any live timer.
    pub(crate) fn load_for_recipe(&mut self, recipe_id: &str) -> Result<usize, BindingError> {
        let repo = self.repo.as_mut().ok_or(BindingError::Unbound)?;
        let recipe = repo
            .get_recipe_by_id(recipe_id)
            .ok_or_else(|| BindingError::RecipeNotFound(recipe_id.to_string()))?;
        self.saved = recipe.timers.clone();
        self.bound_recipe = Some(recipe_id.to_string());
        Ok(self.saved.len())
    }

    /// Upsert a record into the bound recipe, matched by id. An existing
    /// record keeps its original creation date.
    pub(crate) fn upsert(&mut self, record: RecipeTimerRecord) -> Result<(), BindingError> {
        let repo = self.repo.as_mut().ok_or(BindingError::Unbound)?;
        let recipe_id = self.bound_recipe.as_deref().ok_or(BindingError::Unbound)?;
        let recipe = repo
            .get_recipe_by_id(recipe_id)
            .ok_or_else(|| BindingError::RecipeNotFound(recipe_id.to_string()))?;
        upsert_record(&mut recipe.timers, record.clone());
        upsert_record(&mut self.saved, record);
        repo.save_recipes()?;
        Ok(())
    }

    /// Delete the record from the bound recipe, independent of whether a
    /// live timer with that id still exists.
    pub(crate) fn remove(&mut self, timer_id: TimerId) -> Result<bool, BindingError> {
        let repo = self.repo.as_mut().ok_or(BindingError::Unbound)?;
        let recipe_id = self.bound_recipe.as_deref().ok_or(BindingError::Unbound)?;
        let recipe = repo
            .get_recipe_by_id(recipe_id)
            .ok_or_else(|| BindingError::RecipeNotFound(recipe_id.to_string()))?;
        let before = recipe.timers.len();
        recipe.timers.retain(|record| record.id != timer_id);
        let removed = recipe.timers.len() != before;
        self.saved.retain(|record| record.id != timer_id);
        if removed {
            repo.save_recipes()?;
        }
        Ok(removed)
    }

    pub(crate) fn clear(&mut self) {
        self.bound_recipe = None;
        self.saved.clear();
    }
}

fn upsert_record(records: &mut Vec<RecipeTimerRecord>, mut record: RecipeTimerRecord) {
    if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
        record.date_created = existing.date_created;
        *existing = record;
    } else {
        records.push(record);
    }
}

pub(crate) fn datetime_from_epoch_ms(epoch_ms: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(i64::try_from(epoch_ms).unwrap_or(i64::MAX))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneRecipeRepo {
        recipe: Recipe,
    }

    impl RecipeRepository for OneRecipeRepo {
        fn get_recipe_by_id(&mut self, recipe_id: &str) -> Option<&mut Recipe> {
            (self.recipe.id == recipe_id).then_some(&mut self.recipe)
        }

        fn save_recipes(&mut self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn record(id: TimerId, duration: u64) -> RecipeTimerRecord {
        RecipeTimerRecord {
            id,
            duration,
            label: crate::timer::model::format_clock(duration),
            description: String::new(),
            date_created: datetime_from_epoch_ms(1_700_000_000_000),
        }
    }

    fn bound_binding() -> RecipeBinding {
        let repo = OneRecipeRepo {
            recipe: Recipe {
                id: "r1".to_string(),
                timers: vec![record(1, 300)],
            },
        };
        let mut binding = RecipeBinding::new(Some(Box::new(repo)));
        binding.load_for_recipe("r1").expect("bind");
        binding
    }

    #[test]
    fn load_replaces_saved_list() {
        let binding = bound_binding();
        assert!(binding.is_bound());
        assert_eq!(binding.bound_recipe(), Some("r1"));
        assert_eq!(binding.saved_records().len(), 1);
    }

    #[test]
    fn load_unknown_recipe_fails() {
        let mut binding = bound_binding();
        let err = binding.load_for_recipe("nope").expect_err("missing recipe");
        assert!(matches!(err, BindingError::RecipeNotFound(_)));
    }

    #[test]
    fn unbound_operations_are_surfaced() {
        let mut binding = RecipeBinding::new(None);
        assert!(matches!(
            binding.upsert(record(1, 60)),
            Err(BindingError::Unbound)
        ));
        assert!(matches!(binding.remove(1), Err(BindingError::Unbound)));
    }

    #[test]
    fn upsert_keeps_original_creation_date() {
        let mut binding = bound_binding();
        let mut updated = record(1, 900);
        updated.date_created = datetime_from_epoch_ms(1_800_000_000_000);
        binding.upsert(updated).expect("upsert");

        let saved = &binding.saved_records()[0];
        assert_eq!(saved.duration, 900);
        assert_eq!(saved.date_created, datetime_from_epoch_ms(1_700_000_000_000));
    }

    #[test]
    fn upsert_appends_new_records() {
        let mut binding = bound_binding();
        binding.upsert(record(9, 120)).expect("upsert");
        assert_eq!(binding.saved_records().len(), 2);
    }

    #[test]
    fn remove_is_independent_of_live_timers() {
        let mut binding = bound_binding();
        assert!(binding.remove(1).expect("remove"));
        assert!(binding.saved_records().is_empty());
        assert!(!binding.remove(1).expect("second remove"));
    }

    #[test]
    fn clear_unbinds_without_touching_repo() {
        let mut binding = bound_binding();
        binding.clear();
        assert!(!binding.is_bound());
        assert!(binding.saved_records().is_empty());
    }

    #[test]
    fn record_serializes_camel_case() {
        let text = serde_json::to_string(&record(3, 600)).expect("serialize");
        assert!(text.contains("\"dateCreated\""));
        assert!(text.contains("\"duration\":600"));
    }
}
