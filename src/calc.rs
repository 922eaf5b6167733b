use serde::{Deserialize, Serialize};

/// Lowest mark on the Chilean 1.0..7.0 scale.
pub const MIN_SCORE: f64 = 1.0;
/// Highest mark on the Chilean 1.0..7.0 scale.
pub const MAX_SCORE: f64 = 7.0;

pub const DEFAULT_MIN_PASSING_GRADE: f64 = 3.96;
pub const DEFAULT_MIN_EXAM_GRADE: f64 = 3.56;

/// Passing grades offered as one-click choices in the settings dialog.
pub const PASSING_GRADE_PRESETS: [f64; 4] = [4.0, 3.5, 3.0, 2.5];

/// Fixed-point 2-decimal rounding used for every reported average and projection:
/// `Int(100*x + 0.5) / 100`
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Renders a percentage total the way the UI prints it: `120`, `62.5`.
pub fn format_percentage(p: f64) -> String {
    let s = format!("{:.2}", p);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: String,
    pub name: String,
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub min_passing_grade: f64,
    pub min_exam_grade: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_passing_grade: DEFAULT_MIN_PASSING_GRADE,
            min_exam_grade: DEFAULT_MIN_EXAM_GRADE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("minPassingGrade must be between 1.0 and 7.0 (got {0})")]
    PassingOutOfRange(f64),
    #[error("minExamGrade must be between 1.0 and 7.0 (got {0})")]
    ExamOutOfRange(f64),
    #[error("minExamGrade ({exam:.2}) must be lower than minPassingGrade ({passing:.2})")]
    ExamNotBelowPassing { exam: f64, passing: f64 },
}

fn on_scale(v: f64) -> bool {
    (MIN_SCORE..=MAX_SCORE).contains(&v)
}

/// Guards the ordering `compute_subject_status` relies on. NaN is out of range.
pub fn validate_thresholds(
    min_passing_grade: f64,
    min_exam_grade: f64,
) -> Result<Thresholds, ThresholdError> {
    if !on_scale(min_passing_grade) {
        return Err(ThresholdError::PassingOutOfRange(min_passing_grade));
    }
    if !on_scale(min_exam_grade) {
        return Err(ThresholdError::ExamOutOfRange(min_exam_grade));
    }
    if min_exam_grade >= min_passing_grade {
        return Err(ThresholdError::ExamNotBelowPassing {
            exam: min_exam_grade,
            passing: min_passing_grade,
        });
    }
    Ok(Thresholds {
        min_passing_grade,
        min_exam_grade,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectStatus {
    Pending,
    Passed,
    ExamEligible,
    Failed,
    ConfigurationError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub total_percentage: f64,
    pub remaining_percentage: f64,
    pub average: f64,
    pub status: SubjectStatus,
    pub message: String,
    pub min_needed_to_pass: Option<f64>,
    pub min_needed_to_exam: Option<f64>,
}

/// Computes the running weighted average and status of one subject.
///
/// Pure: no I/O, no state, same output for the same input. Input is assumed
/// validated (percentages > 0, scores on scale) and thresholds ordered; the
/// result is meaningless but well-defined otherwise.
pub fn compute_subject_status(evaluations: &[Evaluation], thresholds: &Thresholds) -> SubjectStats {
    let total_percentage = evaluations.iter().fold(0.0_f64, |acc, e| acc + e.percentage);

    let mut graded_count = 0usize;
    let mut points = 0.0_f64;
    for e in evaluations {
        if let Some(score) = e.score {
            graded_count += 1;
            points += score * e.percentage / 100.0;
        }
    }
    let current_points = round_off_2_decimals(points);
    let remaining_percentage = 100.0 - total_percentage;

    if total_percentage == 100.0 && graded_count == evaluations.len() {
        let status = if current_points >= thresholds.min_passing_grade {
            SubjectStatus::Passed
        } else if current_points >= thresholds.min_exam_grade {
            SubjectStatus::ExamEligible
        } else {
            SubjectStatus::Failed
        };
        return SubjectStats {
            total_percentage,
            remaining_percentage,
            average: current_points,
            status,
            message: format!("Promedio: {:.2}", current_points),
            min_needed_to_pass: None,
            min_needed_to_exam: None,
        };
    }

    if total_percentage > 100.0 {
        return SubjectStats {
            total_percentage,
            remaining_percentage,
            average: current_points,
            status: SubjectStatus::ConfigurationError,
            message: format!(
                "El porcentaje total es {}% (debe ser 100%)",
                format_percentage(total_percentage)
            ),
            min_needed_to_pass: None,
            min_needed_to_exam: None,
        };
    }

    // Weights at exactly 100% with an ungraded entry leave nothing to project onto.
    let (min_needed_to_pass, min_needed_to_exam) = if remaining_percentage > 0.0 {
        (
            Some(needed_average(
                thresholds.min_passing_grade,
                current_points,
                remaining_percentage,
            )),
            Some(needed_average(
                thresholds.min_exam_grade,
                current_points,
                remaining_percentage,
            )),
        )
    } else {
        (None, None)
    };

    SubjectStats {
        total_percentage,
        remaining_percentage,
        average: current_points,
        status: SubjectStatus::Pending,
        message: "Faltan notas o el porcentaje es diferente a 100%".to_string(),
        min_needed_to_pass,
        min_needed_to_exam,
    }
}

fn needed_average(target: f64, current_points: f64, remaining_percentage: f64) -> f64 {
    round_off_2_decimals((target - current_points) * 100.0 / remaining_percentage)
}

/// How a "needed average" projection reads against the 1.0..7.0 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectionOutlook {
    /// Even the lowest mark on the remaining weight reaches the threshold.
    AlreadySecured,
    Reachable,
    /// Would need more than a 7.0 average on the remaining weight.
    OutOfReach,
}

pub fn projection_outlook(needed: f64) -> ProjectionOutlook {
    if needed > MAX_SCORE {
        ProjectionOutlook::OutOfReach
    } else if needed < MIN_SCORE {
        ProjectionOutlook::AlreadySecured
    } else {
        ProjectionOutlook::Reachable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOutlook {
    pub to_pass: Option<ProjectionOutlook>,
    pub to_exam: Option<ProjectionOutlook>,
}

impl SubjectStats {
    pub fn outlook(&self) -> StatsOutlook {
        StatsOutlook {
            to_pass: self.min_needed_to_pass.map(projection_outlook),
            to_exam: self.min_needed_to_exam.map(projection_outlook),
        }
    }
}
