use crate::models::Descriptor;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.4;

/// Euclidean distance between two descriptors of the same length.
///
/// Callers validate dimensionality at the input boundary; a mismatch here is a bug.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "descriptor dimensionality mismatch");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

pub fn distance(a: &Descriptor, b: &Descriptor) -> f64 {
    euclidean_distance(a.as_slice(), b.as_slice())
}

/// `(1 - distance) * 100`. Goes negative for distant descriptors; only
/// presentation clamps it (see [`display_percent`]).
pub fn similarity_percent(a: &Descriptor, b: &Descriptor) -> f64 {
    (1.0 - distance(a, b)) * 100.0
}

pub fn is_match(a: &Descriptor, b: &Descriptor, threshold: f64) -> bool {
    distance(a, b) < threshold
}

pub fn display_percent(similarity: f64) -> f64 {
    similarity.clamp(0.0, 100.0)
}

/// Match decision with a configured threshold.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    pub threshold: f64,
}

impl Default for Matcher {
    fn default() -> Self {
        Self { threshold: DEFAULT_MATCH_THRESHOLD }
    }
}

impl Matcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn is_match(&self, a: &Descriptor, b: &Descriptor) -> bool {
        is_match(a, b, self.threshold)
    }

    /// Closest candidate under the threshold. Ties keep the earliest candidate.
    pub fn best_match<'a, K: Copy + 'a>(
        &self,
        probe: &Descriptor,
        candidates: impl IntoIterator<Item = (K, &'a Descriptor)>,
    ) -> Option<(K, f64)> {
        let mut best: Option<(K, f64)> = None;
        for (key, descriptor) in candidates {
            let dist = distance(probe, descriptor);
            if dist >= self.threshold {
                continue;
            }
            match best {
                Some((_, d)) if d <= dist => {}
                _ => best = Some((key, dist)),
            }
        }
        best
    }
}
