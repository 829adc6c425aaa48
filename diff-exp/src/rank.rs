//! Rank sums over sparse rows, where most entries are implicit zeros.

/// Per-group sums of midranks, plus the tie term `sum(t^3 - t)` over all tie groups.
#[derive(Debug, Clone, PartialEq)]
pub struct RankSums {
    pub sums: Vec<f64>,
    pub tie_term: f64,
}

/// Rank all labeled entries of a row jointly. `nonzero` holds (value, group) for the
/// explicitly stored entries; `zeros_per_group[g]` counts the implicit zeros of group `g`.
/// Ties, including the block of zeros, share their average rank.
pub fn rank_sums(nonzero: &mut [(f64, usize)], zeros_per_group: &[usize]) -> RankSums {
    nonzero.sort_by(|a, b| a.0.total_cmp(&b.0));
    let n_zero: usize = zeros_per_group.iter().sum();
    let mut sums = vec![0.0; zeros_per_group.len()];
    let mut tie_term = 0.0;
    let mut assigned = 0usize;
    let mut zeros_done = n_zero == 0;

    let mut i = 0;
    while i < nonzero.len() {
        let value = nonzero[i].0;
        if !zeros_done && value > 0.0 {
            assign_zero_block(&mut sums, &mut tie_term, &mut assigned, zeros_per_group, n_zero);
            zeros_done = true;
        }
        let mut j = i;
        while j < nonzero.len() && nonzero[j].0 == value {
            j += 1;
        }
        let t = (j - i) as f64;
        let midrank = assigned as f64 + (t + 1.0) / 2.0;
        for &(_, group) in &nonzero[i..j] {
            sums[group] += midrank;
        }
        tie_term += t * t * t - t;
        assigned += j - i;
        i = j;
    }
    if !zeros_done {
        assign_zero_block(&mut sums, &mut tie_term, &mut assigned, zeros_per_group, n_zero);
    }
    RankSums { sums, tie_term }
}

fn assign_zero_block(
    sums: &mut [f64],
    tie_term: &mut f64,
    assigned: &mut usize,
    zeros_per_group: &[usize],
    n_zero: usize,
) {
    let t = n_zero as f64;
    let midrank = *assigned as f64 + (t + 1.0) / 2.0;
    for (sum, &z) in sums.iter_mut().zip(zeros_per_group) {
        *sum += midrank * z as f64;
    }
    *tie_term += t * t * t - t;
    *assigned += n_zero;
}
