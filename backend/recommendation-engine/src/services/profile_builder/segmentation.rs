// ============================================
// User Segmentation (k-means)
// ============================================
//
// Standardize the per-user feature matrix, then partition users with
// k-means++ seeded from a fixed RNG. Several restarts run and the one
// with the lowest inertia wins. Labels are renumbered by first
// appearance so the output depends only on the data and the seed.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Zero-mean, unit-variance scaling per column.
/// Constant columns keep scale 1 so they map to 0.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> Self {
        let columns = data.ncols();
        if data.nrows() == 0 {
            return Self {
                mean: Array1::zeros(columns),
                scale: Array1::ones(columns),
            };
        }

        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(columns));
        let scale = data
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });

        Self { mean, scale }
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        (data - &self.mean) / &self.scale
    }

    pub fn fit_transform(data: &Array2<f64>) -> Array2<f64> {
        Self::fit(data).transform(data)
    }
}

#[derive(Debug, Clone)]
pub struct KMeans {
    pub n_clusters: usize,
    pub restarts: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// Cluster index per row, each in [0, n_clusters)
    pub labels: Vec<usize>,
    pub centroids: Array2<f64>,
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeans {
    pub fn new(n_clusters: usize, seed: u64) -> Self {
        Self {
            n_clusters,
            restarts: 10,
            max_iterations: 300,
            tolerance: 1e-6,
            seed,
        }
    }

    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Cluster the rows of `data`.
    ///
    /// The cluster count is capped at the number of rows.
    pub fn fit(&self, data: &Array2<f64>) -> KMeansFit {
        let rows = data.nrows();
        let k = self.n_clusters.min(rows).max(1);

        if rows == 0 {
            return KMeansFit {
                labels: Vec::new(),
                centroids: Array2::zeros((0, data.ncols())),
                inertia: 0.0,
                iterations: 0,
            };
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;

        for restart in 0..self.restarts.max(1) {
            let fit = self.run_once(data, k, &mut rng);
            debug!(
                restart = restart,
                inertia = fit.inertia,
                iterations = fit.iterations,
                "k-means restart finished"
            );

            let improves = best
                .as_ref()
                .map_or(true, |current| fit.inertia < current.inertia - 1e-12);
            if improves {
                best = Some(fit);
            }
        }

        match best {
            Some(fit) => relabel(fit),
            None => KMeansFit {
                labels: vec![0; rows],
                centroids: Array2::zeros((1, data.ncols())),
                inertia: 0.0,
                iterations: 0,
            },
        }
    }

    fn run_once(&self, data: &Array2<f64>, k: usize, rng: &mut StdRng) -> KMeansFit {
        let mut centroids = init_plus_plus(data, k, rng);
        let mut labels = assign(data, &centroids);
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;

            let updated = update_centroids(data, &labels, &centroids);
            let shift: f64 = centroids
                .outer_iter()
                .zip(updated.outer_iter())
                .map(|(old, new)| squared_distance(old, new))
                .sum();

            centroids = updated;
            labels = assign(data, &centroids);

            if shift <= self.tolerance {
                break;
            }
        }

        let inertia = labels
            .iter()
            .enumerate()
            .map(|(row, &label)| squared_distance(data.row(row), centroids.row(label)))
            .sum();

        KMeansFit {
            labels,
            centroids,
            inertia,
            iterations,
        }
    }
}

/// k-means++ seeding: each next centroid is drawn with probability
/// proportional to its squared distance from the closest chosen one.
fn init_plus_plus(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let rows = data.nrows();
    let mut chosen: Vec<usize> = vec![rng.gen_range(0..rows)];

    while chosen.len() < k {
        let distances: Vec<f64> = (0..rows)
            .map(|row| {
                chosen
                    .iter()
                    .map(|&c| squared_distance(data.row(row), data.row(c)))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = distances.iter().sum();

        let next = if total <= f64::EPSILON {
            // every remaining point coincides with a centroid
            (0..rows).find(|row| !chosen.contains(row)).unwrap_or(0)
        } else {
            let threshold = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut picked = None;
            for (row, &distance) in distances.iter().enumerate() {
                if distance <= 0.0 {
                    continue;
                }
                cumulative += distance;
                picked = Some(row);
                if cumulative >= threshold {
                    break;
                }
            }
            picked.unwrap_or(0)
        };

        chosen.push(next);
    }

    data.select(Axis(0), &chosen)
}

fn assign(data: &Array2<f64>, centroids: &Array2<f64>) -> Vec<usize> {
    data.outer_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_distance = f64::INFINITY;
            for (index, centroid) in centroids.outer_iter().enumerate() {
                let distance = squared_distance(row, centroid);
                if distance < best_distance {
                    best_distance = distance;
                    best = index;
                }
            }
            best
        })
        .collect()
}

/// Mean of each cluster's members; empty clusters keep their centroid
fn update_centroids(data: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
    let mut counts = vec![0usize; centroids.nrows()];

    for (row, &label) in data.outer_iter().zip(labels) {
        let mut sum = sums.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    for (index, count) in counts.iter().enumerate() {
        if *count == 0 {
            sums.row_mut(index).assign(&centroids.row(index));
        } else {
            sums.row_mut(index).mapv_inplace(|v| v / *count as f64);
        }
    }

    sums
}

/// Renumber clusters by first appearance in row order
fn relabel(fit: KMeansFit) -> KMeansFit {
    let k = fit.centroids.nrows();
    let mut mapping: Vec<Option<usize>> = vec![None; k];
    let mut next = 0;

    for &label in &fit.labels {
        if mapping[label].is_none() {
            mapping[label] = Some(next);
            next += 1;
        }
    }
    for slot in mapping.iter_mut() {
        if slot.is_none() {
            *slot = Some(next);
            next += 1;
        }
    }

    let mapping: Vec<usize> = mapping.into_iter().map(|m| m.unwrap_or(0)).collect();
    let mut centroids = Array2::<f64>::zeros(fit.centroids.raw_dim());
    for (old, &new) in mapping.iter().enumerate() {
        centroids.row_mut(new).assign(&fit.centroids.row(old));
    }

    KMeansFit {
        labels: fit.labels.iter().map(|&label| mapping[label]).collect(),
        centroids,
        inertia: fit.inertia,
        iterations: fit.iterations,
    }
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standard_scaler() {
        let data = array![[1.0, 5.0], [3.0, 5.0]];
        let scaled = StandardScaler::fit_transform(&data);

        assert!((scaled[[0, 0]] + 1.0).abs() < 1e-12);
        assert!((scaled[[1, 0]] - 1.0).abs() < 1e-12);
        // constant column maps to zero
        assert_eq!(scaled[[0, 1]], 0.0);
        assert_eq!(scaled[[1, 1]], 0.0);
    }

    #[test]
    fn test_kmeans_separates_obvious_groups() {
        let data = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
        ];
        let fit = KMeans::new(2, 42).fit(&data);

        assert_eq!(fit.labels, vec![0, 0, 0, 1, 1, 1]);
        assert!(fit.inertia < 0.1);
    }

    #[test]
    fn test_kmeans_caps_clusters_at_row_count() {
        let data = array![[0.0], [5.0], [9.0]];
        let fit = KMeans::new(5, 42).fit(&data);

        assert_eq!(fit.centroids.nrows(), 3);
        assert_eq!(fit.labels, vec![0, 1, 2]);
        assert_eq!(fit.inertia, 0.0);
    }

    #[test]
    fn test_kmeans_with_duplicate_points() {
        let data = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let fit = KMeans::new(3, 7).fit(&data);

        assert_eq!(fit.labels.len(), 3);
        assert!(fit.labels.iter().all(|&label| label < 3));
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let data = array![[0.0, 1.0], [2.0, 3.0], [4.0, 1.0], [8.0, 9.0], [1.0, 7.0]];
        let a = KMeans::new(3, 42).fit(&data);
        let b = KMeans::new(3, 42).fit(&data);
        assert_eq!(a.labels, b.labels);
    }
}
