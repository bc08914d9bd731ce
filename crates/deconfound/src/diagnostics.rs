//! Dependence diagnostics between learned features and confounders.
//!
//! Two estimators, both computed on host-side `ndarray` matrices and never
//! part of any autodiff graph:
//!
//! - [`u_distance_correlation_sqr`]: bias-corrected squared distance
//!   correlation built from U-centred distance matrices.
//! - [`mutual_information`]: Kraskov–Stögbauer–Grassberger nearest-neighbour
//!   estimate, averaged over feature columns.

use std::fmt;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::digamma;

/// Neighbour count for the KSG estimator.
pub const DEFAULT_NEIGHBORS: usize = 3;

/// Which training subset a dependence score was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Control,
    Disease,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Disease => write!(f, "disease"),
        }
    }
}

/// Both dependence estimates for one group/confounder pair at one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct DependenceScore {
    pub group: Group,
    pub confounder: String,
    pub distance_correlation: f64,
    pub mutual_information: f64,
}

/// Pairwise Euclidean distances between the rows of `x`.
fn row_distances(x: ArrayView2<f64>) -> Array2<f64> {
    let n = x.nrows();
    let mut d = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let dist = x
                .row(i)
                .iter()
                .zip(x.row(j).iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            d[[i, j]] = dist;
            d[[j, i]] = dist;
        }
    }
    d
}

/// U-centring: `ã_ij = a_ij − a_i·/(n−2) − a_·j/(n−2) + a_··/((n−1)(n−2))`,
/// with a zero diagonal. Requires `n > 2`.
fn u_centered(mut d: Array2<f64>) -> Array2<f64> {
    let n = d.nrows() as f64;
    let row_sums = d.sum_axis(Axis(1));
    let col_sums = d.sum_axis(Axis(0));
    let total = row_sums.sum();
    for ((i, j), v) in d.indexed_iter_mut() {
        *v = if i == j {
            0.0
        } else {
            *v - row_sums[i] / (n - 2.0) - col_sums[j] / (n - 2.0)
                + total / ((n - 1.0) * (n - 2.0))
        };
    }
    d
}

/// Unbiased distance covariance of two U-centred matrices.
fn u_product(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    let n = a.nrows() as f64;
    (a * b).sum() / (n * (n - 3.0))
}

/// Bias-corrected squared distance correlation between the rows of `x` and
/// the scalar values `y`.
///
/// Returns NaN (and logs at debug level) with 3 or fewer samples, and 0 when
/// either variable has zero distance variance.
pub fn u_distance_correlation_sqr(x: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
    let n = x.nrows();
    if n <= 3 || y.len() != n {
        tracing::debug!(samples = n, targets = y.len(), "Too few samples for distance correlation");
        return f64::NAN;
    }

    let a = u_centered(row_distances(x));
    let y_col = y.insert_axis(Axis(1));
    let b = u_centered(row_distances(y_col));

    let xy = u_product(&a, &b);
    let xx = u_product(&a, &a);
    let yy = u_product(&b, &b);

    let denom = (xx * yy).abs().sqrt();
    if denom == 0.0 {
        0.0
    } else {
        xy / denom
    }
}

/// Next representable value below a non-negative `r`.
fn shrink_radius(r: f64) -> f64 {
    if r > 0.0 {
        f64::from_bits(r.to_bits() - 1)
    } else {
        r
    }
}

/// Deterministic tie-break offset in `[-1, 1)` for the `i`-th sample.
fn jitter(i: usize) -> f64 {
    const GOLDEN: f64 = 0.618_033_988_749_895;
    ((i as f64 + 1.0) * GOLDEN).fract() * 2.0 - 1.0
}

/// Scale to unit population variance and add a tiny deterministic jitter so
/// that exact ties do not collapse neighbour counts.
fn standardize(values: ArrayView1<f64>) -> Array1<f64> {
    let n = values.len() as f64;
    let mean = values.sum() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std = if var > 0.0 { var.sqrt() } else { 1.0 };
    let scaled = values.mapv(|v| v / std);
    let amplitude = 1e-10 * (scaled.iter().map(|v| v.abs()).sum::<f64>() / n).max(1.0);
    Array1::from_iter(scaled.iter().enumerate().map(|(i, v)| v + amplitude * jitter(i)))
}

/// KSG estimate (algorithm 1) of the mutual information between two
/// continuous scalar variables, clamped at 0.
fn mi_continuous(x: &Array1<f64>, y: &Array1<f64>, k: usize) -> f64 {
    let n = x.len();
    let mut mean_psi = 0.0;
    let mut joint = Vec::with_capacity(n);

    for i in 0..n {
        joint.clear();
        for j in 0..n {
            if j != i {
                joint.push((x[i] - x[j]).abs().max((y[i] - y[j]).abs()));
            }
        }
        joint.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
        let radius = shrink_radius(joint[k - 1]);

        let mut nx = 0usize;
        let mut ny = 0usize;
        for j in 0..n {
            if j == i {
                continue;
            }
            if (x[i] - x[j]).abs() <= radius {
                nx += 1;
            }
            if (y[i] - y[j]).abs() <= radius {
                ny += 1;
            }
        }
        mean_psi += digamma((nx + 1) as f64) + digamma((ny + 1) as f64);
    }
    mean_psi /= n as f64;

    (digamma(n as f64) + digamma(k as f64) - mean_psi).max(0.0)
}

/// Mean over the columns of `x` of the KSG mutual information with `y`.
///
/// Returns NaN (and logs at debug level) when there are not more samples
/// than neighbours.
pub fn mutual_information(x: ArrayView2<f64>, y: ArrayView1<f64>, k: usize) -> f64 {
    let n = x.nrows();
    if k == 0 || n <= k || y.len() != n || x.ncols() == 0 {
        tracing::debug!(samples = n, neighbors = k, "Too few samples for mutual information");
        return f64::NAN;
    }

    let y = standardize(y);
    let total: f64 = x
        .axis_iter(Axis(1))
        .map(|column| mi_continuous(&standardize(column), &y, k))
        .sum();
    total / x.ncols() as f64
}

/// Score one group: every confounder column of `targets` against `encoded`.
///
/// `targets` has one row per sample and one column per name in `confounders`.
pub fn dependence_scores(
    group: Group,
    encoded: ArrayView2<f64>,
    targets: ArrayView2<f64>,
    confounders: &[String],
    neighbors: usize,
) -> Vec<DependenceScore> {
    confounders
        .iter()
        .zip(targets.axis_iter(Axis(1)))
        .map(|(name, column)| {
            let score = DependenceScore {
                group,
                confounder: name.clone(),
                distance_correlation: u_distance_correlation_sqr(encoded, column),
                mutual_information: mutual_information(encoded, column, neighbors),
            };
            tracing::debug!(
                %group,
                confounder = %name,
                dcor = score.distance_correlation,
                mi = score.mutual_information,
                "Dependence"
            );
            score
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noisy_line(n: usize, noise: f64, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let y: Array1<f64> = (0..n).map(|_| rng.gen_range(-2.0..2.0)).collect();
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let signal = if j == 0 { y[i] } else { -0.5 * y[i] };
            signal + noise * rng.gen_range(-1.0..1.0)
        });
        (x, y)
    }

    fn independent(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let y: Array1<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let x = Array2::from_shape_fn((n, 3), |_| rng.gen_range(-1.0..1.0));
        (x, y)
    }

    #[test]
    fn test_dcor_linear_is_one() {
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let x = y.clone().insert_axis(Axis(1)).mapv(|v| 3.0 * v - 1.0);
        let dcor = u_distance_correlation_sqr(x.view(), y.view());
        assert!((dcor - 1.0).abs() < 1e-9, "got {dcor}");
    }

    #[test]
    fn test_dcor_orders_dependence() {
        let (x_dep, y_dep) = noisy_line(80, 0.1, 1);
        let (x_ind, y_ind) = independent(80, 2);
        let dep = u_distance_correlation_sqr(x_dep.view(), y_dep.view());
        let ind = u_distance_correlation_sqr(x_ind.view(), y_ind.view());
        assert!(dep > 0.8, "dependent dcor too low: {dep}");
        assert!(ind.abs() < 0.1, "independent dcor too high: {ind}");
    }

    #[test]
    fn test_dcor_small_sample_is_nan() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        assert!(u_distance_correlation_sqr(x.view(), y.view()).is_nan());
    }

    #[test]
    fn test_dcor_constant_target_is_zero() {
        let x = array![[1.0], [2.0], [4.0], [8.0], [3.0]];
        let y = array![5.0, 5.0, 5.0, 5.0, 5.0];
        assert_eq!(u_distance_correlation_sqr(x.view(), y.view()), 0.0);
    }

    #[test]
    fn test_mi_orders_dependence() {
        let (x_dep, y_dep) = noisy_line(200, 0.05, 3);
        let (x_ind, y_ind) = independent(200, 4);
        let dep = mutual_information(x_dep.view(), y_dep.view(), DEFAULT_NEIGHBORS);
        let ind = mutual_information(x_ind.view(), y_ind.view(), DEFAULT_NEIGHBORS);
        assert!(dep > 1.0, "dependent MI too low: {dep}");
        assert!(ind < 0.1, "independent MI too high: {ind}");
        assert!(ind >= 0.0);
    }

    #[test]
    fn test_mi_deterministic_with_ties() {
        let x = array![[0.0], [0.0], [1.0], [1.0], [2.0], [2.0], [3.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0];
        let a = mutual_information(x.view(), y.view(), 3);
        let b = mutual_information(x.view(), y.view(), 3);
        assert!(a.is_finite());
        assert_eq!(a, b);
    }

    #[test]
    fn test_mi_too_few_samples() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        assert!(mutual_information(x.view(), y.view(), 3).is_nan());
    }

    #[test]
    fn test_dependence_scores_per_confounder() {
        let (x, y) = noisy_line(40, 0.1, 5);
        let mut targets = Array2::zeros((40, 2));
        targets.column_mut(0).assign(&y);
        targets.column_mut(1).fill(1.0);
        let names = vec!["AGE".to_string(), "METFORMIN_C".to_string()];

        let scores = dependence_scores(Group::Control, x.view(), targets.view(), &names, 3);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].confounder, "AGE");
        assert!(scores[0].distance_correlation > 0.5);
        assert_eq!(scores[1].distance_correlation, 0.0);
        assert!(scores.iter().all(|s| s.group == Group::Control));
    }
}
