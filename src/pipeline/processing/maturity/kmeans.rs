use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Raw clustering output. Cluster ids carry no meaning beyond indexing `centroids`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFit {
    pub centroids: Vec<Vec<f64>>,
    /// Cluster id per input point, in input order
    pub assignments: Vec<usize>,
    /// Within-cluster sum of squared distances
    pub inertia: f64,
}

pub trait Clusterer: Send + Sync {
    /// Partition `points` into clusters. `None` when there are fewer points than clusters.
    fn fit(&self, points: &[Vec<f64>]) -> Option<ClusterFit>;
}

/// Lloyd's k-means with k-means++ seeding, restarted `n_init` times from one seeded RNG.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub seed: u64,
}

impl KMeans {
    pub fn new(k: usize, n_init: usize, max_iter: usize, seed: u64) -> Self {
        Self {
            k,
            n_init,
            max_iter,
            seed,
        }
    }

    fn init_plus_plus(&self, points: &[Vec<f64>], rng: &mut StdRng) -> Vec<Vec<f64>> {
        let mut centroids = Vec::with_capacity(self.k);
        centroids.push(points[rng.gen_range(0..points.len())].clone());

        while centroids.len() < self.k {
            let weights: Vec<f64> = points
                .iter()
                .map(|p| {
                    centroids
                        .iter()
                        .map(|c| squared_distance(p, c))
                        .fold(f64::INFINITY, f64::min)
                })
                .collect();
            let total: f64 = weights.iter().sum();

            let next = if total <= 0.0 {
                rng.gen_range(0..points.len())
            } else {
                let target = rng.gen::<f64>() * total;
                let mut cumulative = 0.0;
                let mut chosen = points.len() - 1;
                for (i, w) in weights.iter().enumerate() {
                    cumulative += w;
                    if cumulative > target {
                        chosen = i;
                        break;
                    }
                }
                chosen
            };
            centroids.push(points[next].clone());
        }

        centroids
    }

    fn lloyd(&self, points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>) -> ClusterFit {
        let dims = points[0].len();
        let mut assignments = assign(points, &centroids);

        for _ in 0..self.max_iter {
            let mut sums = vec![vec![0.0; dims]; self.k];
            let mut counts = vec![0usize; self.k];
            for (point, &cluster) in points.iter().zip(&assignments) {
                counts[cluster] += 1;
                for (s, x) in sums[cluster].iter_mut().zip(point) {
                    *s += x;
                }
            }

            for cluster in 0..self.k {
                if counts[cluster] == 0 {
                    // Empty cluster: move it onto the point worst served by its current centroid
                    let farthest = points
                        .iter()
                        .zip(&assignments)
                        .enumerate()
                        .map(|(i, (p, &c))| (i, squared_distance(p, &centroids[c])))
                        .fold((0, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best })
                        .0;
                    centroids[cluster] = points[farthest].clone();
                } else {
                    let n = counts[cluster] as f64;
                    centroids[cluster] = sums[cluster].iter().map(|s| s / n).collect();
                }
            }

            let next = assign(points, &centroids);
            if next == assignments {
                break;
            }
            assignments = next;
        }

        let inertia = points
            .iter()
            .zip(&assignments)
            .map(|(p, &c)| squared_distance(p, &centroids[c]))
            .sum();

        ClusterFit {
            centroids,
            assignments,
            inertia,
        }
    }
}

impl Clusterer for KMeans {
    fn fit(&self, points: &[Vec<f64>]) -> Option<ClusterFit> {
        if self.k == 0 || points.len() < self.k {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<ClusterFit> = None;
        for _ in 0..self.n_init.max(1) {
            let centroids = self.init_plus_plus(points, &mut rng);
            let fit = self.lloyd(points, centroids);
            // Strictly lower inertia wins, so the earliest of equal fits is kept
            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }
        best
    }
}

/// Nearest centroid per point; ties go to the lower cluster id.
fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    points
        .iter()
        .map(|p| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (i, c) in centroids.iter().enumerate() {
                let d = squared_distance(p, c);
                if d < best_dist {
                    best = i;
                    best_dist = d;
                }
            }
            best
        })
        .collect()
}

pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
            vec![10.0, 10.1],
            vec![-10.0, 10.0],
            vec![-10.1, 10.0],
        ]
    }

    #[test]
    fn test_separates_well_spaced_blobs() {
        let fit = KMeans::new(3, 10, 300, 42).fit(&blobs()).unwrap();
        let a = &fit.assignments;
        assert_eq!(a[0], a[1]);
        assert_eq!(a[1], a[2]);
        assert_eq!(a[3], a[4]);
        assert_eq!(a[4], a[5]);
        assert_eq!(a[6], a[7]);
        assert_ne!(a[0], a[3]);
        assert_ne!(a[0], a[6]);
        assert_ne!(a[3], a[6]);
        assert!(fit.inertia < 0.1);
    }

    #[test]
    fn test_same_seed_same_fit() {
        let first = KMeans::new(3, 10, 300, 7).fit(&blobs()).unwrap();
        let second = KMeans::new(3, 10, 300, 7).fit(&blobs()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_too_few_points() {
        assert!(KMeans::new(3, 10, 300, 42).fit(&blobs()[..2]).is_none());
    }

    #[test]
    fn test_identical_points_do_not_panic() {
        let points = vec![vec![1.0, 1.0]; 5];
        let fit = KMeans::new(3, 4, 50, 42).fit(&points).unwrap();
        assert_eq!(fit.assignments.len(), 5);
        assert_eq!(fit.inertia, 0.0);
    }
}
