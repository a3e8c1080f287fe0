/// Indices of local maxima, without height, distance or prominence constraints.
///
/// A sample is a peak when it is strictly greater than both neighbours. A
/// flat top (run of equal samples whose left and right edges are both lower)
/// counts as a single peak at the middle of the run, rounded down. The first
/// and last samples are never peaks.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let i_max = x.len() - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let left = i;
                let right = ahead - 1;
                peaks.push((left + right) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Indices of local minima: the maxima of the negated signal.
pub fn local_minima(x: &[f64]) -> Vec<usize> {
    let negated: Vec<f64> = x.iter().map(|v| -v).collect();
    local_maxima(&negated)
}
