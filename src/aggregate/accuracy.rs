//! Accuracy Accumulator
//!
//! Process-lifetime running (correct, total) counters per observed class,
//! updated once per batch under a single mutex. Counters only ever grow;
//! restarting the process is the only reset. Increments are associative and
//! commutative, so out-of-order batch arrival cannot corrupt the totals.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::flow::Prediction;

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassAccuracy {
    pub class: String,
    pub correct: u64,
    pub total: u64,
    /// Cumulative accuracy formatted as e.g. "93.4%"
    pub percent: String,
}

/// Point-in-time view of the accumulator, recomputed after every batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracySnapshot {
    /// Top-N classes by cumulative total, descending
    pub classes: Vec<ClassAccuracy>,
    pub overall_correct: u64,
    pub overall_total: u64,
    pub overall_percent: String,
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct ClassTotals {
    correct: u64,
    total: u64,
}

/// Owned accumulator handle, shared across batch workers via `Arc`.
/// All reads and increments happen inside one critical section.
pub struct AccuracyAccumulator {
    top_n: usize,
    totals: Mutex<HashMap<String, ClassTotals>>,
}

impl AccuracyAccumulator {
    pub fn new(top_n: usize) -> Self {
        Self { top_n, totals: Mutex::new(HashMap::new()) }
    }

    /// Fold one batch into the running totals and return the fresh snapshot.
    ///
    /// Only the batch's top-N most frequent ground-truth classes contribute,
    /// matching the reference behavior; a class counts as correct when the
    /// predicted class name equals the ground-truth label.
    pub fn update(&self, predictions: &[Prediction]) -> AccuracySnapshot {
        let mut batch: HashMap<&str, ClassTotals> = HashMap::new();
        for p in predictions {
            let entry = batch.entry(p.label.as_str()).or_default();
            entry.total += 1;
            if p.is_correct() {
                entry.correct += 1;
            }
        }

        // Top-N classes of this batch; lexicographic tie-break for determinism
        let mut ranked: Vec<(&str, ClassTotals)> = batch.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total.cmp(&a.1.total).then(a.0.cmp(b.0)));
        ranked.truncate(self.top_n);

        let mut totals = self.totals.lock();
        for (class, add) in ranked {
            let entry = totals.entry(class.to_string()).or_default();
            entry.correct += add.correct;
            entry.total += add.total;
        }
        Self::snapshot_locked(&totals, self.top_n)
    }

    /// Current snapshot without folding in new data.
    pub fn snapshot(&self) -> AccuracySnapshot {
        Self::snapshot_locked(&self.totals.lock(), self.top_n)
    }

    fn snapshot_locked(totals: &HashMap<String, ClassTotals>, top_n: usize) -> AccuracySnapshot {
        let mut ranked: Vec<(&String, &ClassTotals)> = totals.iter().collect();
        ranked.sort_by(|a, b| b.1.total.cmp(&a.1.total).then(a.0.cmp(b.0)));
        ranked.truncate(top_n);

        let classes: Vec<ClassAccuracy> = ranked
            .iter()
            .map(|(class, t)| ClassAccuracy {
                class: (*class).clone(),
                correct: t.correct,
                total: t.total,
                percent: percent(t.correct, t.total),
            })
            .collect();

        let overall_correct = classes.iter().map(|c| c.correct).sum();
        let overall_total = classes.iter().map(|c| c.total).sum();

        AccuracySnapshot {
            classes,
            overall_correct,
            overall_total,
            overall_percent: percent(overall_correct, overall_total),
        }
    }
}

fn percent(correct: u64, total: u64) -> String {
    if total == 0 {
        "0.0%".to_string()
    } else {
        format!("{:.1}%", correct as f64 / total as f64 * 100.0)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn prediction(label: &str, class_id: i64) -> Prediction {
        Prediction {
            timestamp: "t".into(),
            label: label.into(),
            class_id,
            predicted_label: crate::flow::schema::class_name(class_id).map(str::to_string),
            source: "s".into(),
            destination: "d".into(),
        }
    }

    fn batch(benign_correct: usize, benign_wrong: usize, bot_correct: usize) -> Vec<Prediction> {
        let mut out = Vec::new();
        for _ in 0..benign_correct {
            out.push(prediction("Benign", 0));
        }
        for _ in 0..benign_wrong {
            out.push(prediction("Benign", 3));
        }
        for _ in 0..bot_correct {
            out.push(prediction("Bot", 4));
        }
        out
    }

    #[test]
    fn test_percentages_and_ordering() {
        let acc = AccuracyAccumulator::new(6);
        let snap = acc.update(&batch(3, 1, 2));

        assert_eq!(snap.classes.len(), 2);
        assert_eq!(snap.classes[0].class, "Benign"); // most frequent first
        assert_eq!(snap.classes[0].correct, 3);
        assert_eq!(snap.classes[0].total, 4);
        assert_eq!(snap.classes[0].percent, "75.0%");
        assert_eq!(snap.classes[1].percent, "100.0%");
        assert_eq!(snap.overall_correct, 5);
        assert_eq!(snap.overall_total, 6);
        assert_eq!(snap.overall_percent, "83.3%");
    }

    #[test]
    fn test_totals_are_monotonic_and_bounded() {
        let acc = AccuracyAccumulator::new(6);
        let mut last_totals: HashMap<String, (u64, u64)> = HashMap::new();

        for i in 0..10 {
            let snap = acc.update(&batch(i, 10 - i, i * 2));
            for class in &snap.classes {
                assert!(class.correct <= class.total);
                if let Some((prev_correct, prev_total)) = last_totals.get(&class.class) {
                    assert!(class.correct >= *prev_correct);
                    assert!(class.total >= *prev_total);
                }
                last_totals.insert(class.class.clone(), (class.correct, class.total));
            }
        }
    }

    #[test]
    fn test_top_n_limits_tracked_classes_per_batch() {
        let acc = AccuracyAccumulator::new(2);
        let mut predictions = batch(5, 0, 3);
        predictions.push(prediction("SSH-Bruteforce", 6)); // third class, below top-2

        let snap = acc.update(&predictions);
        assert_eq!(snap.classes.len(), 2);
        assert!(snap.classes.iter().all(|c| c.class != "SSH-Bruteforce"));
    }

    #[test]
    fn test_concurrent_disjoint_updates_commute() {
        let final_state = |order_swapped: bool| {
            let acc = Arc::new(AccuracyAccumulator::new(6));
            let a = batch(10, 2, 0);
            let b = batch(0, 0, 7);
            let (first, second) = if order_swapped { (b, a) } else { (a, b) };

            let acc1 = Arc::clone(&acc);
            let h1 = std::thread::spawn(move || {
                acc1.update(&first);
            });
            let acc2 = Arc::clone(&acc);
            let h2 = std::thread::spawn(move || {
                acc2.update(&second);
            });
            h1.join().unwrap();
            h2.join().unwrap();

            let snap = acc.snapshot();
            snap.classes
                .iter()
                .map(|c| (c.class.clone(), c.correct, c.total))
                .collect::<Vec<_>>()
        };

        assert_eq!(final_state(false), final_state(true));
    }

    #[test]
    fn test_empty_batch_leaves_state_unchanged() {
        let acc = AccuracyAccumulator::new(6);
        acc.update(&batch(4, 0, 0));
        let before = acc.snapshot();
        let after = acc.update(&[]);
        assert_eq!(before.overall_total, after.overall_total);
        assert_eq!(before.overall_correct, after.overall_correct);
    }
}
