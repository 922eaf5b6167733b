use crate::calc::{self, Evaluation, SubjectStats, Thresholds, MAX_SCORE, MIN_SCORE};
use serde::{Deserialize, Serialize};

const MAX_NAME_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("evaluation name must not be empty")]
    EmptyName,
    #[error("evaluation name length must be <= 120")]
    NameTooLong,
    #[error("percentage must be greater than 0 and at most 100 (got {0})")]
    PercentageOutOfRange(f64),
    #[error("score must be between 1.0 and 7.0 (got {0})")]
    ScoreOutOfRange(f64),
    #[error("duplicate evaluation id: {0}")]
    DuplicateId(String),
    #[error("evaluation not found: {0}")]
    NotFound(String),
}

impl EvaluationError {
    pub fn code(&self) -> &'static str {
        match self {
            EvaluationError::NotFound(_) => "not_found",
            _ => "invalid_evaluation",
        }
    }
}

/// Evaluation fields as entered, checked but not yet assigned an id.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationInput {
    pub name: String,
    pub percentage: f64,
    pub score: Option<f64>,
}

impl EvaluationInput {
    pub fn into_evaluation(self, id: impl Into<String>) -> Evaluation {
        Evaluation {
            id: id.into(),
            name: self.name,
            percentage: self.percentage,
            score: self.score,
        }
    }
}

pub fn validate_score(score: Option<f64>) -> Result<Option<f64>, EvaluationError> {
    match score {
        None => Ok(None),
        Some(v) if (MIN_SCORE..=MAX_SCORE).contains(&v) => Ok(Some(v)),
        Some(v) => Err(EvaluationError::ScoreOutOfRange(v)),
    }
}

pub fn validate_evaluation_input(
    name: &str,
    percentage: f64,
    score: Option<f64>,
) -> Result<EvaluationInput, EvaluationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EvaluationError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(EvaluationError::NameTooLong);
    }
    if !(percentage > 0.0 && percentage <= 100.0) {
        return Err(EvaluationError::PercentageOutOfRange(percentage));
    }
    let score = validate_score(score)?;
    Ok(EvaluationInput {
        name: name.to_string(),
        percentage,
        score,
    })
}

/// Re-checks an evaluation that arrives fully formed (stateless calc calls, imports).
pub fn validate_evaluation(e: &Evaluation) -> Result<Evaluation, EvaluationError> {
    let input = validate_evaluation_input(&e.name, e.percentage, e.score)?;
    Ok(input.into_evaluation(e.id.clone()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectGradeSet {
    pub subject_id: String,
    #[serde(default, alias = "grades")]
    pub evaluations: Vec<Evaluation>,
}

impl SubjectGradeSet {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            evaluations: Vec::new(),
        }
    }

    pub fn add(&mut self, evaluation: Evaluation) -> Result<(), EvaluationError> {
        if self.evaluations.iter().any(|e| e.id == evaluation.id) {
            return Err(EvaluationError::DuplicateId(evaluation.id));
        }
        let checked = validate_evaluation(&evaluation)?;
        self.evaluations.push(checked);
        Ok(())
    }

    pub fn remove(&mut self, evaluation_id: &str) -> Result<Evaluation, EvaluationError> {
        let Some(pos) = self.evaluations.iter().position(|e| e.id == evaluation_id) else {
            return Err(EvaluationError::NotFound(evaluation_id.to_string()));
        };
        Ok(self.evaluations.remove(pos))
    }

    /// Invalid scores leave the set untouched.
    pub fn update_score(
        &mut self,
        evaluation_id: &str,
        score: Option<f64>,
    ) -> Result<(), EvaluationError> {
        let score = validate_score(score)?;
        let Some(e) = self.evaluations.iter_mut().find(|e| e.id == evaluation_id) else {
            return Err(EvaluationError::NotFound(evaluation_id.to_string()));
        };
        e.score = score;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.evaluations.is_empty()
    }

    pub fn stats(&self, thresholds: &Thresholds) -> SubjectStats {
        calc::compute_subject_status(&self.evaluations, thresholds)
    }
}
