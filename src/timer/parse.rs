use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::timer::model::format_clock;

/// Anything above four hours is not a plausible cooking timer.
pub const MAX_DURATION_SECS: u64 = 14_400;

const FALLBACK_CONTEXT: &str = "Timer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionFormat {
    /// Explicit `TTT: <n> minutes <context>` convention; eligible for
    /// automatic timer creation.
    Tagged,
    /// Free-text duration phrase; only ever suggested, never auto-created.
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSuggestion {
    pub duration_secs: u64,
    pub label: String,
    pub description: String,
    pub format: SuggestionFormat,
}

/// Vocabulary used to pick a context word near a duration match.
///
/// This is data, not logic: the built-in table mixes English and Dutch the
/// way the recipes it grew out of do, and makes no claim to completeness.
/// Hosts with other vocabularies deserialize their own table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextLexicon {
    pub food_words: Vec<String>,
    pub action_words: Vec<String>,
    pub stop_words: Vec<String>,
}

impl Default for ContextLexicon {
    fn default() -> Self {
        let to_vec = |words: &[&str]| words.iter().map(|w| (*w).to_string()).collect();
        Self {
            food_words: to_vec(&[
                "apples", "chicken", "kip", "pasta", "rice", "rijst", "egg", "eggs", "eieren",
                "potatoes", "aardappelen", "fish", "vis", "bread", "brood", "dough", "deeg",
                "sauce", "saus", "soup", "soep", "onions", "uien", "beef", "pork", "cake",
            ]),
            action_words: to_vec(&[
                "bake", "bakken", "boil", "koken", "simmer", "sudderen", "fry", "roast",
                "braden", "grill", "grillen", "steam", "stomen", "rest", "rusten", "cook",
                "knead", "kneden", "reduce", "marinate", "marineren", "proof", "rijzen",
            ]),
            stop_words: to_vec(&[
                "then", "with", "from", "until", "about", "after", "before", "while", "them",
                "this", "that", "into", "over", "each", "your", "just", "daarna", "totdat",
                "ongeveer", "tijdens", "minute", "minutes", "minuten", "mins", "hour", "hours",
                "uur", "uren", "second", "seconds", "seconde", "seconden", "secs",
            ]),
        }
    }
}

impl ContextLexicon {
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid context lexicon JSON")
    }
}

static DEFAULT_LEXICON: LazyLock<ContextLexicon> = LazyLock::new(ContextLexicon::default);

static TAGGED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bTTT:\s*(\d{1,4})\s*min(?:ute(?:s|n)?|s)?\b\.?[ \t]*([^\n.;!?]*)")
        .expect("tagged pattern is valid")
});
static HOURS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*(?:hours?|hrs?|uur|uren)\b").expect("hour pattern is valid")
});
static MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,4})\s*min(?:ute(?:s|n)?|s)?\b").expect("minute pattern is valid")
});
static SECONDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,5})\s*sec(?:ond(?:s|en)?|s)?\b").expect("second pattern is valid")
});
static CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,3}):([0-5]\d)\b").expect("clock pattern is valid"));

/// Scan free text for candidate timer durations using the built-in
/// vocabulary. Pure and deterministic; identical input yields identical
/// suggestions in identical order.
pub fn parse(text: &str) -> Vec<TimerSuggestion> {
    parse_with_lexicon(text, &DEFAULT_LEXICON)
}

struct Candidate {
    start: usize,
    precedence: u8,
    suggestion: TimerSuggestion,
}

pub fn parse_with_lexicon(text: &str, lexicon: &ContextLexicon) -> Vec<TimerSuggestion> {
    let mut candidates = Vec::new();

    for caps in TAGGED.captures_iter(text) {
        let Some(minutes) = captured_number(&caps, 1) else {
            continue;
        };
        let duration_secs = minutes.saturating_mul(60);
        if !plausible(duration_secs) {
            continue;
        }
        let context = caps
            .get(2)
            .map(|m| m.as_str().trim())
            .filter(|ctx| !ctx.is_empty())
            .unwrap_or(FALLBACK_CONTEXT);
        let whole = caps.get(0).map(|m| m.start()).unwrap_or_default();
        candidates.push(Candidate {
            start: whole,
            precedence: 0,
            suggestion: TimerSuggestion {
                duration_secs,
                label: format!("TTT: {minutes} minutes"),
                description: context.to_string(),
                format: SuggestionFormat::Tagged,
            },
        });
    }

    let generic_patterns: [(&Regex, u8, u64); 3] =
        [(&HOURS, 1, 3_600), (&MINUTES, 2, 60), (&SECONDS, 3, 1)];
    for (pattern, precedence, unit_secs) in generic_patterns {
        for caps in pattern.captures_iter(text) {
            let Some(count) = captured_number(&caps, 1) else {
                continue;
            };
            let duration_secs = count.saturating_mul(unit_secs);
            if !plausible(duration_secs) {
                continue;
            }
            let Some(whole) = caps.get(0) else { continue };
            candidates.push(generic_candidate(
                text,
                whole.start(),
                whole.end(),
                precedence,
                duration_secs,
                lexicon,
            ));
        }
    }

    for caps in CLOCK.captures_iter(text) {
        let (Some(minutes), Some(seconds)) = (captured_number(&caps, 1), captured_number(&caps, 2))
        else {
            continue;
        };
        let duration_secs = minutes.saturating_mul(60).saturating_add(seconds);
        if !plausible(duration_secs) {
            continue;
        }
        let Some(whole) = caps.get(0) else { continue };
        candidates.push(generic_candidate(
            text,
            whole.start(),
            whole.end(),
            4,
            duration_secs,
            lexicon,
        ));
    }

    // First occurrence wins per duration; on the same offset the tagged
    // form outranks the generic ones.
    candidates.sort_by_key(|c| (c.start, c.precedence));
    let mut seen_durations = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen_durations.insert(c.suggestion.duration_secs))
        .map(|c| c.suggestion)
        .collect()
}

fn generic_candidate(
    text: &str,
    start: usize,
    end: usize,
    precedence: u8,
    duration_secs: u64,
    lexicon: &ContextLexicon,
) -> Candidate {
    Candidate {
        start,
        precedence,
        suggestion: TimerSuggestion {
            duration_secs,
            label: format_clock(duration_secs),
            description: extract_context(text, start, end, lexicon)
                .unwrap_or_else(|| FALLBACK_CONTEXT.to_string()),
            format: SuggestionFormat::Generic,
        },
    }
}

fn captured_number(caps: &regex::Captures<'_>, group: usize) -> Option<u64> {
    caps.get(group)?.as_str().parse().ok()
}

fn plausible(duration_secs: u64) -> bool {
    duration_secs > 0 && duration_secs <= MAX_DURATION_SECS
}

/// Pick a context word from the window around a match: a known food item
/// first, then a cooking action, then the first meaningful word.
fn extract_context(
    text: &str,
    match_start: usize,
    match_end: usize,
    lexicon: &ContextLexicon,
) -> Option<String> {
    let window_start = floor_char_boundary(text, match_start.saturating_sub(40));
    let window_end = ceil_char_boundary(text, (match_end + 60).min(text.len()));
    let window = &text[window_start..window_end];

    let words: Vec<&str> = window
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    for word in &words {
        if contains_ignore_case(&lexicon.food_words, word) {
            return Some((*word).to_string());
        }
    }
    for word in &words {
        if contains_ignore_case(&lexicon.action_words, word) {
            return Some((*word).to_string());
        }
    }
    words
        .iter()
        .find(|word| {
            word.chars().count() >= 4 && !contains_ignore_case(&lexicon.stop_words, word)
        })
        .map(|word| (*word).to_string())
}

fn contains_ignore_case(words: &[String], candidate: &str) -> bool {
    words.iter().any(|w| w.eq_ignore_ascii_case(candidate))
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
