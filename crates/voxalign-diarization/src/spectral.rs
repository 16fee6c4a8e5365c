//! Clustering primitives: spectral embedding, k-means, silhouette scoring
//! and the agglomerative fallback
//!
//! Everything here is deterministic: no RNG is used anywhere, so
//! identical input always produces identical labels.

use ndarray::{Array1, Array2};
use tracing::debug;

const POWER_ITERATIONS: usize = 300;
const POWER_TOLERANCE: f64 = 1e-9;
const KMEANS_ITERATIONS: usize = 100;

/// Spectral clustering on a precomputed similarity matrix.
///
/// Symmetric-normalizes the affinity, takes the leading `k` eigenvectors
/// by deflated power iteration, row-normalizes the spectral embedding and
/// assigns labels with k-means. Returns `None` when the eigensolver
/// produces non-finite values, so the caller can fall back.
pub fn spectral_cluster(similarity: &Array2<f64>, k: usize) -> Option<Vec<usize>> {
    let n = similarity.nrows();
    if k <= 1 || n < 2 {
        return Some(vec![0; n]);
    }
    let k = k.min(n);

    // M = D^{-1/2} S D^{-1/2}
    let degree: Array1<f64> = similarity.rows().into_iter().map(|r| r.sum()).collect();
    let inv_sqrt: Vec<f64> = degree
        .iter()
        .map(|&d| if d > 1e-12 { 1.0 / d.sqrt() } else { 0.0 })
        .collect();

    let mut normalized = similarity.clone();
    for i in 0..n {
        for j in 0..n {
            normalized[[i, j]] *= inv_sqrt[i] * inv_sqrt[j];
        }
    }

    let basis = leading_eigenvectors(&normalized, k)?;

    // Row-normalize the spectral embedding
    let mut points = Array2::<f64>::zeros((n, k));
    for i in 0..n {
        let mut norm = 0.0;
        for j in 0..k {
            let v = basis[[i, j]];
            norm += v * v;
        }
        let norm = norm.sqrt();
        for j in 0..k {
            points[[i, j]] = if norm > 1e-12 { basis[[i, j]] / norm } else { 0.0 };
        }
    }

    Some(kmeans(&points, k))
}

/// Leading eigenvectors of a symmetric matrix via power iteration with
/// Gram-Schmidt deflation. Start vectors are fixed, keeping the whole
/// pipeline deterministic.
fn leading_eigenvectors(matrix: &Array2<f64>, k: usize) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    let mut basis = Array2::<f64>::zeros((n, k));

    for j in 0..k {
        // Deterministic non-degenerate start vector
        let mut v: Vec<f64> = (0..n)
            .map(|i| (((i + 1) * (j + 2)) as f64).sin() + 0.5)
            .collect();
        orthogonalize(&mut v, &basis, j);
        if normalize(&mut v) < 1e-12 {
            // Start vector collapsed into the found subspace; perturb
            v = (0..n).map(|i| if i % (j + 2) == 0 { 1.0 } else { -0.3 }).collect();
            orthogonalize(&mut v, &basis, j);
            normalize(&mut v);
        }

        let mut prev = v.clone();
        for _ in 0..POWER_ITERATIONS {
            let mut next = vec![0.0; n];
            for row in 0..n {
                let mut acc = 0.0;
                for col in 0..n {
                    acc += matrix[[row, col]] * v[col];
                }
                next[row] = acc;
            }
            orthogonalize(&mut next, &basis, j);
            if normalize(&mut next) < 1e-12 {
                break;
            }

            let delta: f64 = next
                .iter()
                .zip(prev.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            prev = next.clone();
            v = next;
            if delta < POWER_TOLERANCE {
                break;
            }
        }

        if v.iter().any(|x| !x.is_finite()) {
            return None;
        }
        for i in 0..n {
            basis[[i, j]] = v[i];
        }
    }

    Some(basis)
}

fn orthogonalize(v: &mut [f64], basis: &Array2<f64>, found: usize) {
    for j in 0..found {
        let dot: f64 = v.iter().enumerate().map(|(i, &x)| x * basis[[i, j]]).sum();
        for (i, x) in v.iter_mut().enumerate() {
            *x -= dot * basis[[i, j]];
        }
    }
}

fn normalize(v: &mut [f64]) -> f64 {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

/// K-means with deterministic farthest-point seeding
pub fn kmeans(points: &Array2<f64>, k: usize) -> Vec<usize> {
    let n = points.nrows();
    let dim = points.ncols();
    let k = k.min(n).max(1);

    // Seed: first point, then repeatedly the point farthest from every
    // chosen center
    let mut centers: Vec<Vec<f64>> = vec![points.row(0).to_vec()];
    while centers.len() < k {
        let mut best = (0, -1.0f64);
        for i in 0..n {
            let min_d = centers
                .iter()
                .map(|c| sq_distance(&points.row(i).to_vec(), c))
                .fold(f64::INFINITY, f64::min);
            if min_d > best.1 {
                best = (i, min_d);
            }
        }
        centers.push(points.row(best.0).to_vec());
    }

    let mut labels = vec![0usize; n];
    for _ in 0..KMEANS_ITERATIONS {
        // Assignment step
        let mut changed = false;
        for i in 0..n {
            let point = points.row(i).to_vec();
            let (mut best_c, mut best_d) = (0usize, f64::INFINITY);
            for (c, center) in centers.iter().enumerate() {
                let d = sq_distance(&point, center);
                if d < best_d {
                    best_c = c;
                    best_d = d;
                }
            }
            if labels[i] != best_c {
                labels[i] = best_c;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        // Update step; empty clusters keep their previous center
        for (c, center) in centers.iter_mut().enumerate() {
            let members: Vec<usize> = (0..n).filter(|&i| labels[i] == c).collect();
            if members.is_empty() {
                continue;
            }
            for d in 0..dim {
                center[d] = members.iter().map(|&i| points[[i, d]]).sum::<f64>()
                    / members.len() as f64;
            }
        }
    }

    labels
}

fn sq_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Mean silhouette score over a precomputed distance matrix.
///
/// Points in singleton clusters contribute zero, matching the usual
/// convention. Higher is better; the range is [-1, 1].
pub fn silhouette_score(distances: &Array2<f64>, labels: &[usize]) -> f64 {
    let n = labels.len();
    if n < 2 {
        return 0.0;
    }
    let clusters: Vec<usize> = {
        let mut c = labels.to_vec();
        c.sort_unstable();
        c.dedup();
        c
    };
    if clusters.len() < 2 {
        return -1.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        let own_size = labels.iter().filter(|&&l| l == own).count();
        if own_size <= 1 {
            continue; // contributes 0
        }

        let a: f64 = (0..n)
            .filter(|&j| j != i && labels[j] == own)
            .map(|j| distances[[i, j]])
            .sum::<f64>()
            / (own_size - 1) as f64;

        let b = clusters
            .iter()
            .filter(|&&c| c != own)
            .map(|&c| {
                let members: Vec<usize> = (0..n).filter(|&j| labels[j] == c).collect();
                members.iter().map(|&j| distances[[i, j]]).sum::<f64>() / members.len() as f64
            })
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 1e-12 {
            total += (b - a) / denom;
        }
    }

    total / n as f64
}

/// Agglomerative clustering with ward linkage on raw (Euclidean) vectors.
///
/// Second-attempt fallback when spectral clustering fails or collapses.
pub fn agglomerative_ward(vectors: &[Vec<f32>], k: usize) -> Vec<usize> {
    let n = vectors.len();
    if n == 0 {
        return Vec::new();
    }
    let k = k.min(n).max(1);

    struct Cluster {
        members: Vec<usize>,
        centroid: Vec<f64>,
    }

    let mut clusters: Vec<Cluster> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| Cluster {
            members: vec![i],
            centroid: v.iter().map(|&x| x as f64).collect(),
        })
        .collect();

    while clusters.len() > k {
        // Ward criterion: merge the pair with the minimal increase in
        // within-cluster variance
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let na = clusters[a].members.len() as f64;
                let nb = clusters[b].members.len() as f64;
                let d = sq_distance(&clusters[a].centroid, &clusters[b].centroid);
                let cost = na * nb / (na + nb) * d;
                if best.map(|(_, _, c)| cost < c).unwrap_or(true) {
                    best = Some((a, b, cost));
                }
            }
        }

        let (a, b, cost) = best.expect("at least two clusters remain");
        debug!(merge_cost = cost, remaining = clusters.len() - 1, "ward merge");

        let removed = clusters.swap_remove(b);
        let target = &mut clusters[a];
        let na = target.members.len() as f64;
        let nb = removed.members.len() as f64;
        for (d, c) in target.centroid.iter_mut().enumerate() {
            *c = (*c * na + removed.centroid[d] * nb) / (na + nb);
        }
        target.members.extend(removed.members);
    }

    let mut labels = vec![0usize; n];
    // Stable label order: cluster of the earliest member gets the lowest id
    let mut order: Vec<usize> = (0..clusters.len()).collect();
    order.sort_by_key(|&c| clusters[c].members.iter().copied().min().unwrap_or(usize::MAX));
    for (label, &c) in order.iter().enumerate() {
        for &m in &clusters[c].members {
            labels[m] = label;
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blob_similarity() -> (Array2<f64>, Array2<f64>) {
        // Windows 0-2 cluster together, 3-5 cluster together
        let n = 6;
        let mut dist = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                dist[[i, j]] = if (i < 3) == (j < 3) { 0.1 } else { 0.9 };
            }
        }
        let mut sim = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                sim[[i, j]] = (-dist[[i, j]] / 0.5).exp();
            }
        }
        (sim, dist)
    }

    #[test]
    fn test_spectral_separates_two_blobs() {
        let (sim, _) = two_blob_similarity();
        let labels = spectral_cluster(&sim, 2).unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_spectral_is_deterministic() {
        let (sim, _) = two_blob_similarity();
        let a = spectral_cluster(&sim, 2).unwrap();
        let b = spectral_cluster(&sim, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_silhouette_prefers_true_k() {
        let (_, dist) = two_blob_similarity();
        let good = silhouette_score(&dist, &[0, 0, 0, 1, 1, 1]);
        let bad = silhouette_score(&dist, &[0, 1, 0, 1, 0, 1]);
        assert!(good > bad);
        assert!(good > 0.5);
    }

    #[test]
    fn test_kmeans_separates_points() {
        let points =
            Array2::from_shape_vec((4, 1), vec![0.0, 0.1, 5.0, 5.1]).unwrap();
        let labels = kmeans(&points, 2);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_agglomerative_two_groups() {
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.0, 1.0],
            vec![0.1, 0.9],
        ];
        let labels = agglomerative_ward(&vectors, 2);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
        // Earliest member owns label 0
        assert_eq!(labels[0], 0);
    }

    #[test]
    fn test_agglomerative_single_cluster() {
        let vectors = vec![vec![1.0], vec![2.0], vec![3.0]];
        let labels = agglomerative_ward(&vectors, 1);
        assert_eq!(labels, vec![0, 0, 0]);
    }
}
