// ABOUTME: Progress calculation over the questionnaire catalog
// ABOUTME: Pure, derived from the current position and never stored

use serde::Serialize;

use crate::catalog::{Catalog, Position};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub total_questions: usize,
    pub completed_questions: usize,
    pub percent: f64,
}

impl Progress {
    /// Progress once every question has been committed
    pub fn complete(catalog: &Catalog) -> Self {
        let total = catalog.total_questions();
        Self {
            total_questions: total,
            completed_questions: total,
            percent: if total > 0 { 100.0 } else { 0.0 },
        }
    }
}

/// Questions in every stage before the current one, plus the current question index
pub fn calculate_progress(catalog: &Catalog, position: Position) -> Progress {
    let total_questions = catalog.total_questions();
    let completed_questions = catalog
        .stages()
        .iter()
        .take(position.stage_index)
        .map(|s| s.questions.len())
        .sum::<usize>()
        + position.question_index;

    let percent = if total_questions > 0 {
        completed_questions as f64 / total_questions as f64 * 100.0
    } else {
        0.0
    };

    Progress {
        total_questions,
        completed_questions,
        percent,
    }
}
