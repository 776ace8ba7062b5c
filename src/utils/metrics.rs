use burn::prelude::*;
use color_eyre::{Result, eyre::bail};
use std::fmt;

pub fn accuracy<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f32 {
    let predictions = output.argmax(1).squeeze(1);
    let num_predictions: usize = targets.dims().iter().product();
    let num_corrects = predictions.equal(targets).int().sum().into_scalar();

    num_corrects.elem::<f32>() / num_predictions as f32 * 100.0
}

/// Probabilities are clamped to this before taking the log.
const LOG_LOSS_EPSILON: f64 = 1e-15;

#[derive(Clone, Debug, PartialEq)]
pub struct MulticlassMetrics {
    pub log_loss: f64,
    pub log_loss_reduction: f64,
    pub macro_accuracy: f64,
    pub micro_accuracy: f64,
    pub top_k_accuracy: f64,
    pub top_k_prediction_count: usize,
    pub per_class_log_loss: Vec<f64>,
    /// `confusion_matrix[actual][predicted]`
    pub confusion_matrix: Vec<Vec<usize>>,
}

#[derive(Clone, Debug)]
pub struct MulticlassEvaluator {
    num_classes: usize,
    top_k: usize,
    rows: usize,
    log_loss_sum: f64,
    top_k_hits: usize,
    class_counts: Vec<usize>,
    class_log_loss: Vec<f64>,
    confusion: Vec<Vec<usize>>,
}

impl MulticlassEvaluator {
    pub fn new(num_classes: usize, top_k: usize) -> Self {
        Self {
            num_classes,
            top_k,
            rows: 0,
            log_loss_sum: 0.0,
            top_k_hits: 0,
            class_counts: vec![0; num_classes],
            class_log_loss: vec![0.0; num_classes],
            confusion: vec![vec![0; num_classes]; num_classes],
        }
    }

    /// Adds one row of class probabilities for an example whose true key is `label`.
    pub fn update(&mut self, probabilities: &[f32], label: usize) {
        assert_eq!(probabilities.len(), self.num_classes, "Class count mismatch");
        assert!(label < self.num_classes, "Label key {label} out of range");

        let p_label = probabilities[label] as f64;
        let loss = -p_label.max(LOG_LOSS_EPSILON).ln();
        let predicted = probabilities
            .iter()
            .enumerate()
            .fold(0, |best, (i, p)| if *p > probabilities[best] { i } else { best });
        let rank = probabilities
            .iter()
            .filter(|p| **p > probabilities[label])
            .count();

        self.rows += 1;
        self.log_loss_sum += loss;
        self.class_counts[label] += 1;
        self.class_log_loss[label] += loss;
        self.confusion[label][predicted] += 1;
        if rank < self.top_k {
            self.top_k_hits += 1;
        }
    }

    pub fn finish(&self) -> Result<MulticlassMetrics> {
        if self.rows == 0 {
            bail!("Cannot evaluate an empty test set");
        }
        let rows = self.rows as f64;
        let log_loss = self.log_loss_sum / rows;

        let prior_log_loss: f64 = self
            .class_counts
            .iter()
            .filter(|count| **count > 0)
            .map(|count| {
                let p = *count as f64 / rows;
                -p * p.ln()
            })
            .sum();
        let log_loss_reduction = if prior_log_loss > 0.0 {
            (prior_log_loss - log_loss) / prior_log_loss
        } else {
            0.0
        };

        let correct: usize = (0..self.num_classes).map(|c| self.confusion[c][c]).sum();
        let present: Vec<usize> = (0..self.num_classes)
            .filter(|c| self.class_counts[*c] > 0)
            .collect();
        let macro_accuracy = present
            .iter()
            .map(|c| self.confusion[*c][*c] as f64 / self.class_counts[*c] as f64)
            .sum::<f64>()
            / present.len() as f64;

        let per_class_log_loss = self
            .class_log_loss
            .iter()
            .zip(&self.class_counts)
            .map(|(sum, count)| if *count > 0 { sum / *count as f64 } else { 0.0 })
            .collect();

        Ok(MulticlassMetrics {
            log_loss,
            log_loss_reduction,
            macro_accuracy,
            micro_accuracy: correct as f64 / rows,
            top_k_accuracy: self.top_k_hits as f64 / rows,
            top_k_prediction_count: self.top_k,
            per_class_log_loss,
            confusion_matrix: self.confusion.clone(),
        })
    }
}

impl fmt::Display for MulticlassMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  LogLoss:               {:.4}", self.log_loss)?;
        writeln!(f, "  LogLossReduction:      {:.4}", self.log_loss_reduction)?;
        writeln!(f, "  MacroAccuracy:         {:.4}", self.macro_accuracy)?;
        writeln!(f, "  MicroAccuracy:         {:.4}", self.micro_accuracy)?;
        writeln!(f, "  TopKAccuracy:          {:.4}", self.top_k_accuracy)?;
        writeln!(f, "  TopKPredictionCount:   {}", self.top_k_prediction_count)?;
        writeln!(f, "  Confusion matrix (rows = actual, columns = predicted):")?;
        for row in &self.confusion_matrix {
            let cells: Vec<String> = row.iter().map(|n| format!("{n:>5}")).collect();
            writeln!(f, "  {}", cells.join(""))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn approx_eq(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "left: {a}, right: {b}");
    }

    #[test]
    fn tensor_accuracy_is_a_percentage() {
        let device = Default::default();
        let output = Tensor::<NdArray, 2>::from_data(
            TensorData::new(vec![0.9f32, 0.1, 0.2, 0.8, 0.7, 0.3, 0.4, 0.6], [4, 2]),
            &device,
        );
        let targets =
            Tensor::<NdArray, 1, Int>::from_data(TensorData::new(vec![0i64, 1, 1, 1], [4]), &device);

        assert_eq!(accuracy(output, targets), 75.0);
    }

    #[test]
    fn metrics_match_hand_computed_values() {
        let mut evaluator = MulticlassEvaluator::new(3, 2);
        evaluator.update(&[0.7, 0.2, 0.1], 0);
        evaluator.update(&[0.5, 0.4, 0.1], 1);
        evaluator.update(&[0.1, 0.1, 0.8], 2);
        evaluator.update(&[0.2, 0.6, 0.2], 1);
        let metrics = evaluator.finish().unwrap();

        let ln = |p: f32| (p as f64).ln();
        let expected_log_loss = -(ln(0.7) + ln(0.4) + ln(0.8) + ln(0.6)) / 4.0;
        approx_eq(metrics.log_loss, expected_log_loss);

        let prior = -(0.25f64 * 0.25f64.ln() * 2.0 + 0.5 * 0.5f64.ln());
        approx_eq(
            metrics.log_loss_reduction,
            (prior - expected_log_loss) / prior,
        );

        approx_eq(metrics.micro_accuracy, 0.75);
        approx_eq(metrics.macro_accuracy, (1.0 + 0.5 + 1.0) / 3.0);
        approx_eq(metrics.top_k_accuracy, 1.0);
        assert_eq!(metrics.top_k_prediction_count, 2);
        assert_eq!(metrics.confusion_matrix[1], vec![1, 1, 0]);
        approx_eq(metrics.per_class_log_loss[2], -ln(0.8));
    }

    #[test]
    fn macro_accuracy_ignores_absent_classes() {
        let mut evaluator = MulticlassEvaluator::new(3, 1);
        evaluator.update(&[0.9, 0.05, 0.05], 0);
        evaluator.update(&[0.2, 0.7, 0.1], 0);
        let metrics = evaluator.finish().unwrap();

        approx_eq(metrics.macro_accuracy, 0.5);
        approx_eq(metrics.top_k_accuracy, 0.5);
        // A single-class test set carries no prior information.
        approx_eq(metrics.log_loss_reduction, 0.0);
    }

    #[test]
    fn zero_probability_is_clamped() {
        let mut evaluator = MulticlassEvaluator::new(2, 1);
        evaluator.update(&[1.0, 0.0], 1);
        let metrics = evaluator.finish().unwrap();

        approx_eq(metrics.log_loss, -(LOG_LOSS_EPSILON.ln()));
    }

    #[test]
    fn empty_evaluation_is_an_error() {
        assert!(MulticlassEvaluator::new(4, 3).finish().is_err());
    }
}
