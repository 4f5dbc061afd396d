//! Quiz content, workforce-group filtering and grading.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::WorkforceGroup;

/// Whether content tagged with `tags` reaches a learner in `groups`. No tags,
/// or `all_staff`, reaches everyone.
fn tags_apply(tags: &[WorkforceGroup], groups: &[WorkforceGroup]) -> bool {
    tags.is_empty()
        || tags.contains(&WorkforceGroup::AllStaff)
        || tags.iter().any(|group| groups.contains(group))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Question {
    pub id: Uuid,
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_choice: usize,
    /// Empty means the question follows its quiz's groups.
    pub workforce_groups: Vec<WorkforceGroup>,
}

impl Question {
    /// Whether a learner in `groups` should see this question.
    #[must_use]
    pub fn applies_to(&self, groups: &[WorkforceGroup]) -> bool {
        tags_apply(&self.workforce_groups, groups)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Quiz {
    pub sequence: u8,
    pub title: String,
    /// Default groups for questions that carry none of their own.
    pub workforce_groups: Vec<WorkforceGroup>,
    pub questions: Vec<Question>,
}

/// A learner's answer to one question.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct Answer {
    pub question_id: Uuid,
    pub choice: usize,
}

impl Quiz {
    /// Questions shown to a learner in `groups`, in quiz order.
    #[must_use]
    pub fn questions_for(&self, groups: &[WorkforceGroup]) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|question| {
                if question.workforce_groups.is_empty() {
                    tags_apply(&self.workforce_groups, groups)
                } else {
                    question.applies_to(groups)
                }
            })
            .collect()
    }

    /// Integer percentage of applicable questions answered correctly.
    ///
    /// Answers to questions that do not apply are ignored, as are repeated
    /// answers after the first. A quiz with no applicable questions scores 0.
    #[must_use]
    pub fn score(&self, groups: &[WorkforceGroup], answers: &[Answer]) -> i32 {
        let applicable = self.questions_for(groups);
        if applicable.is_empty() {
            return 0;
        }

        let mut chosen: HashMap<Uuid, usize> = HashMap::with_capacity(answers.len());
        for answer in answers {
            chosen.entry(answer.question_id).or_insert(answer.choice);
        }

        let correct = applicable
            .iter()
            .filter(|question| chosen.get(&question.id) == Some(&question.correct_choice))
            .count();
        let percent = correct * 100 / applicable.len();
        i32::try_from(percent).unwrap_or(0)
    }
}
