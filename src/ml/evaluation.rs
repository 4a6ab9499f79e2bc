use crate::error::{AppError, Result};
use crate::ml::models::{ClassMetrics, EvaluationReport};
use crate::models::DamageLevel;
use std::collections::BTreeMap;

const N: usize = DamageLevel::COUNT;

/// Compare true and predicted labels.
///
/// Produces the confusion matrix in the fixed class ordering, per-class
/// precision/recall/F1 and their support-weighted averages. Any ratio with a
/// zero denominator is reported as 0.
pub fn evaluate(y_true: &[DamageLevel], y_pred: &[DamageLevel]) -> Result<EvaluationReport> {
    if y_true.len() != y_pred.len() {
        return Err(AppError::InvalidInput(format!(
            "label sequences differ in length: {} true vs {} predicted",
            y_true.len(),
            y_pred.len()
        )));
    }

    let matrix = confusion_matrix(y_true, y_pred);
    let total: usize = matrix.iter().flatten().sum();
    let correct: usize = (0..N).map(|i| matrix[i][i]).sum();

    let mut classification_report = BTreeMap::new();
    let (mut precision, mut recall, mut f1_score) = (0.0, 0.0, 0.0);

    for level in DamageLevel::ALL {
        let metrics = class_metrics(&matrix, level.index());
        if total > 0 {
            let weight = metrics.support as f64 / total as f64;
            precision += weight * metrics.precision;
            recall += weight * metrics.recall;
            f1_score += weight * metrics.f1_score;
        }
        classification_report.insert(level, metrics);
    }

    Ok(EvaluationReport {
        accuracy: unit(ratio(correct, total)),
        precision: unit(precision),
        recall: unit(recall),
        f1_score: unit(f1_score),
        classification_report,
        confusion_matrix: matrix,
    })
}

/// `matrix[i][j]` counts samples of true class `i` predicted as class `j`
pub fn confusion_matrix(y_true: &[DamageLevel], y_pred: &[DamageLevel]) -> [[usize; N]; N] {
    let mut matrix = [[0usize; N]; N];
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        matrix[t.index()][p.index()] += 1;
    }
    matrix
}

fn class_metrics(matrix: &[[usize; N]; N], class: usize) -> ClassMetrics {
    let tp = matrix[class][class];
    let support: usize = matrix[class].iter().sum();
    let predicted: usize = (0..N).map(|i| matrix[i][class]).sum();

    let precision = ratio(tp, predicted);
    let recall = ratio(tp, support);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ClassMetrics {
        precision: unit(precision),
        recall: unit(recall),
        f1_score: unit(f1_score),
        support,
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Weighted sums can drift past 1.0 by an ulp
fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
