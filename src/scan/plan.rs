//! Compiled action sequence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::action::{Action, ActionType};

/// Flattened, ordered action sequence of an entire scan.
///
/// A plan is immutable and can be iterated any number of times; running it borrows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledPlan {
    actions: Vec<Action>,
}

impl CompiledPlan {
    /// Wrap an ordered action list. Used by the compiler and for hand-written plans.
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True if the plan has no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions in execution order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Iterate actions in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    /// Number of grid-point acquisitions (`GET_DATA` actions).
    pub fn read_block_count(&self) -> usize {
        self.count(ActionType::GetData)
    }

    /// Number of actions of type `action_type`.
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type() == action_type)
            .count()
    }

    /// Positions commanded to `sub_stage` by `MoveStage` actions, in plan order.
    pub fn positions(&self, sub_stage: &str) -> Vec<f64> {
        self.actions
            .iter()
            .filter(|a| a.action_type() == ActionType::MoveStage)
            .filter(|a| matches!(a.text_param(0), Ok(name) if name == sub_stage))
            .filter_map(|a| a.float_param(1).ok())
            .collect()
    }

    /// Distinct instrument names referenced by the plan, sorted.
    pub fn instruments(&self) -> BTreeSet<&str> {
        self.actions.iter().map(Action::instrument).collect()
    }
}

impl<'a> IntoIterator for &'a CompiledPlan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

impl fmt::Display for CompiledPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for action in &self.actions {
            writeln!(f, "{}", action)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_is_replayable() {
        let plan = CompiledPlan::new(vec![
            Action::set_acq_state("ScanOsc", "STOP"),
            Action::get_data("ScanOsc", 2),
            Action::wait(0.1),
        ]);
        let first: Vec<_> = plan.iter().cloned().collect();
        let second: Vec<_> = (&plan).into_iter().cloned().collect();
        assert_eq!(first, second);
        assert_eq!(plan.read_block_count(), 1);
        assert_eq!(
            plan.instruments().into_iter().collect::<Vec<_>>(),
            vec!["SYSTEM", "ScanOsc"]
        );
    }

    #[test]
    fn test_display_one_action_per_line() {
        let plan = CompiledPlan::new(vec![Action::wait(1.0), Action::wait(2.0)]);
        assert_eq!(plan.to_string().lines().count(), 2);
    }
}
