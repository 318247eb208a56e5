//! Skill matching: the eligibility predicate for assignment.

use crate::types::SkillCode;
use std::collections::BTreeSet;

/// True iff `required` is empty or every required code is offered.
/// Total over finite sets; an empty requirement means any provider
/// qualifies.
pub fn matches(required: &BTreeSet<SkillCode>, offered: &BTreeSet<SkillCode>) -> bool {
    required.is_empty() || required.is_subset(offered)
}
