//! Conflict decisions for same-titled top-level notebooks.
//!
//! # Responsibility
//! - Model the five operator choices and the "remember this choice" flag.
//! - Query the injected [`DecisionProvider`] at most once per conflict,
//!   short-circuiting every later conflict once a choice was remembered.
//!
//! # Invariants
//! - A remembered choice stays in force for the rest of one import run.
//! - `CancelAll` is never remembered; it ends the run.

use crate::model::record::{Notebook, RecordId};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Operator choice for one conflicting notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictChoice {
    /// Abort the whole import at the current point.
    CancelAll,
    /// Delete the stored subtree, then add the incoming one.
    Overwrite,
    /// Discard the incoming subtree.
    Skip,
    /// Field-level merge into the stored subtree.
    Update,
    /// Add the incoming subtree under a synthesized distinct title.
    Rename,
}

pub const CONFLICT_CHOICE_CANCEL: &str = "cancel";
pub const CONFLICT_CHOICE_OVERWRITE: &str = "overwrite";
pub const CONFLICT_CHOICE_SKIP: &str = "skip";
pub const CONFLICT_CHOICE_UPDATE: &str = "update";
pub const CONFLICT_CHOICE_RENAME: &str = "rename";

impl ConflictChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CancelAll => CONFLICT_CHOICE_CANCEL,
            Self::Overwrite => CONFLICT_CHOICE_OVERWRITE,
            Self::Skip => CONFLICT_CHOICE_SKIP,
            Self::Update => CONFLICT_CHOICE_UPDATE,
            Self::Rename => CONFLICT_CHOICE_RENAME,
        }
    }
}

impl Display for ConflictChoice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown choice string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConflictChoiceError(pub String);

impl Display for ParseConflictChoiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unsupported conflict choice `{}`; expected cancel|overwrite|skip|update|rename",
            self.0
        )
    }
}

impl Error for ParseConflictChoiceError {}

impl FromStr for ConflictChoice {
    type Err = ParseConflictChoiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            CONFLICT_CHOICE_CANCEL | "close" => Ok(Self::CancelAll),
            CONFLICT_CHOICE_OVERWRITE => Ok(Self::Overwrite),
            CONFLICT_CHOICE_SKIP => Ok(Self::Skip),
            CONFLICT_CHOICE_UPDATE => Ok(Self::Update),
            CONFLICT_CHOICE_RENAME => Ok(Self::Rename),
            other => Err(ParseConflictChoiceError(other.to_string())),
        }
    }
}

/// Result of one prompt: the choice plus the "apply to all" flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictDecision {
    pub choice: ConflictChoice,
    pub remember: bool,
}

impl ConflictDecision {
    pub fn once(choice: ConflictChoice) -> Self {
        Self {
            choice,
            remember: false,
        }
    }

    pub fn always(choice: ConflictChoice) -> Self {
        Self {
            choice,
            remember: true,
        }
    }

    pub fn cancel() -> Self {
        Self::once(ConflictChoice::CancelAll)
    }
}

/// What the operator is asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictPrompt {
    /// Title shared by the incoming and the stored notebook.
    pub title: String,
    pub existing_id: Option<RecordId>,
}

/// Source of conflict decisions.
///
/// The interactive implementation blocks the import thread until the operator
/// answers (see [`crate::import::prompt`]); tests inject scripted sequences.
pub trait DecisionProvider {
    fn decide(&mut self, prompt: &ConflictPrompt) -> ConflictDecision;
}

impl<F> DecisionProvider for F
where
    F: FnMut(&ConflictPrompt) -> ConflictDecision,
{
    fn decide(&mut self, prompt: &ConflictPrompt) -> ConflictDecision {
        self(prompt)
    }
}

/// Provider that answers every conflict with the same remembered choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDecision(pub ConflictChoice);

impl DecisionProvider for FixedDecision {
    fn decide(&mut self, _prompt: &ConflictPrompt) -> ConflictDecision {
        ConflictDecision::always(self.0)
    }
}

/// Provider that replays a fixed decision sequence.
///
/// Answers `CancelAll` once the sequence is exhausted and records every
/// prompt it was asked.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecisions {
    pending: VecDeque<ConflictDecision>,
    asked: Vec<ConflictPrompt>,
}

impl ScriptedDecisions {
    pub fn new(decisions: impl IntoIterator<Item = ConflictDecision>) -> Self {
        Self {
            pending: decisions.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Prompts received so far, in order.
    pub fn asked(&self) -> &[ConflictPrompt] {
        &self.asked
    }
}

impl DecisionProvider for ScriptedDecisions {
    fn decide(&mut self, prompt: &ConflictPrompt) -> ConflictDecision {
        self.asked.push(prompt.clone());
        self.pending
            .pop_front()
            .unwrap_or_else(ConflictDecision::cancel)
    }
}

/// Per-run conflict policy with sticky memorization.
pub struct ConflictPolicy<'p> {
    provider: &'p mut dyn DecisionProvider,
    sticky: Option<ConflictChoice>,
}

impl<'p> ConflictPolicy<'p> {
    pub fn new(provider: &'p mut dyn DecisionProvider) -> Self {
        Self {
            provider,
            sticky: None,
        }
    }

    /// Returns the remembered choice, if any.
    pub fn sticky(&self) -> Option<ConflictChoice> {
        self.sticky
    }

    /// Resolves the conflict between an incoming notebook and the stored one
    /// sharing its title.
    pub fn resolve(&mut self, existing: &Notebook) -> ConflictChoice {
        if let Some(choice) = self.sticky {
            return choice;
        }

        let decision = self.provider.decide(&ConflictPrompt {
            title: existing.title.clone(),
            existing_id: existing.id,
        });
        if decision.remember && decision.choice != ConflictChoice::CancelAll {
            self.sticky = Some(decision.choice);
        }
        decision.choice
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConflictChoice, ConflictDecision, ConflictPolicy, ScriptedDecisions,
    };
    use crate::model::record::Notebook;

    #[test]
    fn parses_all_choices_case_insensitively() {
        assert_eq!("Overwrite".parse::<ConflictChoice>(), Ok(ConflictChoice::Overwrite));
        assert_eq!(" skip ".parse::<ConflictChoice>(), Ok(ConflictChoice::Skip));
        assert_eq!("UPDATE".parse::<ConflictChoice>(), Ok(ConflictChoice::Update));
        assert_eq!("rename".parse::<ConflictChoice>(), Ok(ConflictChoice::Rename));
        assert_eq!("close".parse::<ConflictChoice>(), Ok(ConflictChoice::CancelAll));
        assert!("merge".parse::<ConflictChoice>().is_err());
    }

    #[test]
    fn remembered_choice_short_circuits_later_prompts() {
        let mut provider = ScriptedDecisions::new([
            ConflictDecision::once(ConflictChoice::Skip),
            ConflictDecision::always(ConflictChoice::Update),
            ConflictDecision::once(ConflictChoice::Overwrite),
        ]);
        let existing = Notebook::new("Work", 0);

        let choices = {
            let mut policy = ConflictPolicy::new(&mut provider);
            let choices: Vec<_> = (0..4).map(|_| policy.resolve(&existing)).collect();
            assert_eq!(policy.sticky(), Some(ConflictChoice::Update));
            choices
        };

        assert_eq!(
            choices,
            vec![
                ConflictChoice::Skip,
                ConflictChoice::Update,
                ConflictChoice::Update,
                ConflictChoice::Update,
            ]
        );
        assert_eq!(provider.asked().len(), 2);
    }

    #[test]
    fn cancel_is_never_remembered() {
        let mut provider = ScriptedDecisions::new([ConflictDecision::always(
            ConflictChoice::CancelAll,
        )]);
        let mut policy = ConflictPolicy::new(&mut provider);
        assert_eq!(
            policy.resolve(&Notebook::new("Work", 0)),
            ConflictChoice::CancelAll
        );
        assert_eq!(policy.sticky(), None);
    }
}
