// ABOUTME: Two-level ordered question catalog built once per session
// ABOUTME: Validates the catalog and answers positional traversal queries

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{QuestionnaireError, Result};
use crate::types::{Question, Stage};

/// Location of a question: stage index, then question index inside that stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub stage_index: usize,
    pub question_index: usize,
}

impl Position {
    pub const fn new(stage_index: usize, question_index: usize) -> Self {
        Self {
            stage_index,
            question_index,
        }
    }
}

/// A stage together with its ordered questions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogStage {
    pub stage: Stage,
    pub questions: Vec<Question>,
}

/// Ordered stages, each holding ordered questions with their options
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    stages: Vec<CatalogStage>,
}

impl Catalog {
    /// Group questions under their stages and order both levels.
    ///
    /// Stages sort by `order`, questions by `order` within their stage.
    /// Ties keep input order.
    pub fn new(mut stages: Vec<Stage>, questions: Vec<Question>) -> Result<Self> {
        stages.sort_by_key(|s| s.order);

        let mut grouped: HashMap<String, Vec<Question>> = HashMap::new();
        for question in questions {
            validate_question(&question)?;
            grouped
                .entry(question.stage_id.clone())
                .or_default()
                .push(question);
        }

        let mut catalog_stages = Vec::with_capacity(stages.len());
        for stage in stages {
            let mut questions = grouped.remove(&stage.id).unwrap_or_default();
            questions.sort_by_key(|q| q.order);
            catalog_stages.push(CatalogStage { stage, questions });
        }

        if let Some(orphan_stage) = grouped.keys().next() {
            return Err(QuestionnaireError::InvalidCatalog(format!(
                "questions reference unknown stage '{}'",
                orphan_stage
            )));
        }

        let catalog = Self {
            stages: catalog_stages,
        };

        if catalog.total_questions() == 0 {
            return Err(QuestionnaireError::InvalidCatalog(
                "catalog contains no questions".to_string(),
            ));
        }

        Ok(catalog)
    }

    pub fn stages(&self) -> &[CatalogStage] {
        &self.stages
    }

    pub fn total_questions(&self) -> usize {
        self.stages.iter().map(|s| s.questions.len()).sum()
    }

    pub fn question_at(&self, position: Position) -> Option<&Question> {
        self.stages
            .get(position.stage_index)?
            .questions
            .get(position.question_index)
    }

    /// First question of the first non-empty stage
    pub fn first_position(&self) -> Option<Position> {
        self.stages
            .iter()
            .position(|s| !s.questions.is_empty())
            .map(|stage_index| Position::new(stage_index, 0))
    }

    /// Last question of the last non-empty stage
    pub fn last_position(&self) -> Option<Position> {
        self.stages
            .iter()
            .rposition(|s| !s.questions.is_empty())
            .map(|stage_index| {
                Position::new(stage_index, self.stages[stage_index].questions.len() - 1)
            })
    }

    /// Next question in the stage, else the first question of the next non-empty stage
    pub fn next_position(&self, position: Position) -> Option<Position> {
        let stage = self.stages.get(position.stage_index)?;
        if position.question_index + 1 < stage.questions.len() {
            return Some(Position::new(
                position.stage_index,
                position.question_index + 1,
            ));
        }

        self.stages
            .iter()
            .enumerate()
            .skip(position.stage_index + 1)
            .find(|(_, s)| !s.questions.is_empty())
            .map(|(stage_index, _)| Position::new(stage_index, 0))
    }

    /// Previous question in the stage, else the last question of the previous non-empty stage
    pub fn previous_position(&self, position: Position) -> Option<Position> {
        if position.question_index > 0 {
            return Some(Position::new(
                position.stage_index,
                position.question_index - 1,
            ));
        }

        self.stages
            .iter()
            .enumerate()
            .take(position.stage_index)
            .rev()
            .find(|(_, s)| !s.questions.is_empty())
            .map(|(stage_index, s)| Position::new(stage_index, s.questions.len() - 1))
    }

    pub fn position_of(&self, question_id: &str) -> Option<Position> {
        self.positions()
            .find(|(_, q)| q.id == question_id)
            .map(|(position, _)| position)
    }

    pub fn find_question(&self, question_id: &str) -> Option<&Question> {
        self.positions()
            .find(|(_, q)| q.id == question_id)
            .map(|(_, q)| q)
    }

    /// Every question in traversal order with its position
    pub fn positions(&self) -> impl Iterator<Item = (Position, &Question)> {
        self.stages.iter().enumerate().flat_map(|(stage_index, stage)| {
            stage
                .questions
                .iter()
                .enumerate()
                .map(move |(question_index, q)| (Position::new(stage_index, question_index), q))
        })
    }
}

fn validate_question(question: &Question) -> Result<()> {
    if question.kind.requires_options() && question.options.is_empty() {
        return Err(QuestionnaireError::InvalidCatalog(format!(
            "{} question '{}' has no options",
            question.kind, question.id
        )));
    }

    if question.max_selections < 1 {
        return Err(QuestionnaireError::InvalidCatalog(format!(
            "question '{}' must allow at least one selection",
            question.id
        )));
    }

    if let Some(option) = question
        .options
        .iter()
        .find(|o| o.question_id != question.id)
    {
        return Err(QuestionnaireError::InvalidCatalog(format!(
            "option '{}' is attached to question '{}' but listed under '{}'",
            option.id, option.question_id, question.id
        )));
    }

    Ok(())
}
