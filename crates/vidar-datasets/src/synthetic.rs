use rand::{Rng, SeedableRng, rngs::StdRng};

// distance between neighbouring blob centers, in standard deviations
const SPACING: f64 = 8.0;

/// Gaussian blobs, row-major features and 1-based labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Blobs {
    pub n: usize,
    pub d: usize,
    pub k: usize,
    pub features: Vec<f64>,
    pub labels: Vec<f64>,
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    // Box-Muller
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// `n` points in `d` dimensions drawn around `k` well separated centers with
/// unit variance. Class `c` sits on axis `c % d`, further out for every full
/// round of axes, so the classes are linearly separable with high
/// probability. Labels cycle through `1..=k`.
pub fn synthetic_blobs(n: usize, d: usize, k: usize, seed: u64) -> Blobs {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n * d);
    let mut labels = Vec::with_capacity(n);

    for i in 0..n {
        let class = i % k.max(1);
        let (axis, ring) = (class % d.max(1), class / d.max(1));
        for j in 0..d {
            let center = if j == axis {
                SPACING * (ring + 1) as f64
            } else {
                0.0
            };
            features.push(center + standard_normal(&mut rng));
        }
        labels.push((class + 1) as f64);
    }

    log::trace!("Generated {n} synthetic samples in {k} blobs");

    Blobs {
        n,
        d,
        k,
        features,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blobs_are_deterministic_and_labelled() {
        let a = synthetic_blobs(30, 2, 3, 42);
        let b = synthetic_blobs(30, 2, 3, 42);
        assert_eq!(a, b);
        assert_eq!(a.features.len(), 60);
        assert_eq!(&a.labels[..4], &[1.0, 2.0, 3.0, 1.0]);
        assert_ne!(a.features, synthetic_blobs(30, 2, 3, 43).features);
    }

    #[test]
    fn blobs_cluster_around_their_centers() {
        let blobs = synthetic_blobs(600, 3, 3, 1);
        for class in 0..3 {
            let rows = (0..600).filter(|i| i % 3 == class).collect::<Vec<_>>();
            let mean = rows
                .iter()
                .map(|i| blobs.features[i * 3 + class])
                .sum::<f64>()
                / rows.len() as f64;
            assert!((mean - SPACING).abs() < 0.5, "class {class} mean {mean}");
        }
    }
}
