//! Two-sample Kolmogorov–Smirnov test.
//!
//! The statistic is found on the integer lattice: after `i` values of `a` and
//! `j` values of `b` the ECDF gap is `|i n2 - j n1| / (n1 n2)`. Small samples
//! (`n1 n2 <= 10_000`) get the exact p-value by counting monotone lattice
//! paths that never reach that gap; larger ones use the asymptotic
//! Kolmogorov distribution with the Stephens correction
//! `(sqrt(ne) + 0.12 + 0.11 / sqrt(ne)) * D`, `ne = n1 n2 / (n1 + n2)`.

/// Largest `n1 * n2` for which the exact distribution is computed.
pub const EXACT_MAX_PRODUCT: usize = 10_000;

const EPS1: f64 = 1e-3;
const EPS2: f64 = 1e-8;
const MAX_TERMS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsOutcome {
    /// Largest gap between the two empirical CDFs, in `[0, 1]`.
    pub statistic: f64,
    pub p_value: f64,
}

/// `None` when either sample is empty.
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> Option<KsOutcome> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);
    let (n1, n2) = (a.len(), b.len());

    let (mut i, mut j) = (0usize, 0usize);
    let mut gap = 0usize;
    while i < n1 && j < n2 {
        let x = a[i].min(b[j]);
        // Step past every tie at x on both sides before comparing.
        while i < n1 && a[i] <= x {
            i += 1;
        }
        while j < n2 && b[j] <= x {
            j += 1;
        }
        gap = gap.max((i * n2).abs_diff(j * n1));
    }

    let statistic = gap as f64 / (n1 * n2) as f64;
    let p_value = if n1 * n2 <= EXACT_MAX_PRODUCT {
        exact_p_value(n1, n2, gap)
    } else {
        let (f1, f2) = (n1 as f64, n2 as f64);
        let en = (f1 * f2 / (f1 + f2)).sqrt();
        kolmogorov_q((en + 0.12 + 0.11 / en) * statistic)
    };
    Some(KsOutcome { statistic, p_value })
}

/// `P(max |i n2 - j n1| >= gap)` over uniformly random merge orders of the two
/// samples: one minus the share of lattice paths from `(0, 0)` to `(n1, n2)`
/// that stay strictly inside the band.
fn exact_p_value(n1: usize, n2: usize, gap: usize) -> f64 {
    if gap == 0 {
        return 1.0;
    }
    let mut row = vec![0f64; n2 + 1];
    for i in 0..=n1 {
        for j in 0..=n2 {
            row[j] = if (i * n2).abs_diff(j * n1) >= gap {
                0.0
            } else if i == 0 && j == 0 {
                1.0
            } else {
                let up = if i > 0 { row[j] } else { 0.0 };
                let left = if j > 0 { row[j - 1] } else { 0.0 };
                up + left
            };
        }
    }
    (1.0 - row[n2] / binomial(n1 + n2, n1)).clamp(0.0, 1.0)
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (1..=k).fold(1.0, |acc, r| acc * (n - k + r) as f64 / r as f64)
}

/// Survival function of the Kolmogorov distribution,
/// `Q(λ) = 2 Σ (-1)^(j-1) exp(-2 j² λ²)`.
fn kolmogorov_q(lambda: f64) -> f64 {
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut previous = 0.0;
    for j in 1..=MAX_TERMS {
        let j = f64::from(j);
        let term = fac * (a2 * j * j).exp();
        sum += term;
        if term.abs() <= EPS1 * previous || term.abs() <= EPS2 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        previous = term.abs();
    }
    // Series fails to converge only as λ -> 0, where Q -> 1.
    1.0
}
