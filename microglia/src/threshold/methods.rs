//! Histogram threshold algorithms.
//!
//! Every function takes bin counts and returns the index of the last
//! background bin. They follow the behavior of the ImageJ auto-threshold
//! family so results match what users see in Fiji.

/// Smallest positive difference treated as non-zero.
const EPSILON: f64 = 2.220446049250313e-16;

/// Iteration cap for the smoothing and fixed-point searches.
const MAX_ITERATIONS: usize = 10_000;

fn total(histogram: &[u64]) -> f64 {
    histogram.iter().map(|&c| c as f64).sum()
}

fn normalized(histogram: &[u64]) -> Vec<f64> {
    let n = total(histogram);
    histogram.iter().map(|&c| c as f64 / n).collect()
}

/// ImageJ "Default": the IJ IsoData iteration over the raw histogram with
/// both end bins ignored.
pub fn ij_default(histogram: &[u64]) -> Option<usize> {
    ij_iso_data(&mut histogram.to_vec())
}

fn ij_iso_data(data: &mut [u64]) -> Option<usize> {
    let last = data.len().checked_sub(1)?;
    // End bins are excluded from the means
    let count0 = data[0];
    let count_last = data[last];
    data[0] = 0;
    data[last] = 0;

    let mut min = 0;
    while data[min] == 0 && min < last {
        min += 1;
    }
    let mut max = last;
    while data[max] == 0 && max > 0 {
        max -= 1;
    }
    if min >= max {
        data[0] = count0;
        data[last] = count_last;
        return Some(data.len() / 2);
    }

    let mut moving = min;
    let mut result;
    loop {
        let (mut sum1, mut sum2, mut sum3, mut sum4) = (0.0, 0.0, 0.0, 0.0);
        for (i, &c) in data.iter().enumerate().take(moving + 1).skip(min) {
            sum1 += i as f64 * c as f64;
            sum2 += c as f64;
        }
        for (i, &c) in data.iter().enumerate().take(max + 1).skip(moving + 1) {
            sum3 += i as f64 * c as f64;
            sum4 += c as f64;
        }
        result = (sum1 / sum2 + sum3 / sum4) / 2.0;
        moving += 1;
        if !((moving + 1) as f64 <= result && moving < max - 1) {
            break;
        }
    }
    data[0] = count0;
    data[last] = count_last;
    if result.is_finite() {
        Some(result.round() as usize)
    } else {
        None
    }
}

/// Huang's fuzzy thresholding by minimizing Shannon entropy of membership.
pub fn huang(histogram: &[u64]) -> Option<usize> {
    let data: Vec<f64> = histogram.iter().map(|&c| c as f64).collect();
    let first = data.iter().position(|&c| c != 0.0)?;
    let last = data.iter().rposition(|&c| c != 0.0)?;
    if first == last {
        return Some(first);
    }

    // Cumulative counts and first moments
    let mut s = vec![0.0; last + 1];
    let mut w = vec![0.0; last + 1];
    s[first] = data[first];
    w[first] = first as f64 * data[first];
    for i in first + 1..=last {
        s[i] = s[i - 1] + data[i];
        w[i] = w[i - 1] + i as f64 * data[i];
    }

    let c = (last - first) as f64;
    let mut smu = vec![0.0; last + 1 - first];
    for (i, v) in smu.iter_mut().enumerate().skip(1) {
        let mu = 1.0 / (1.0 + i as f64 / c);
        *v = -mu * mu.ln() - (1.0 - mu) * (1.0 - mu).ln();
    }
    let membership = |i: usize, mu: f64| {
        let d = (i as f64 - mu).abs() as usize;
        smu[d.min(smu.len() - 1)]
    };

    let mut best = first;
    let mut best_entropy = f64::MAX;
    for t in first..=last {
        let mut entropy = 0.0;
        let mu = (w[t] / s[t]).round();
        for (i, &count) in data.iter().enumerate().take(t + 1).skip(first) {
            entropy += membership(i, mu) * count;
        }
        if t < last {
            let mu = ((w[last] - w[t]) / (s[last] - s[t])).round();
            for (i, &count) in data.iter().enumerate().take(last + 1).skip(t + 1) {
                entropy += membership(i, mu) * count;
            }
        }
        if best_entropy > entropy {
            best_entropy = entropy;
            best = t;
        }
    }
    Some(best)
}

fn is_bimodal(y: &[f64]) -> bool {
    let mut modes = 0;
    for k in 1..y.len().saturating_sub(1) {
        if y[k - 1] < y[k] && y[k + 1] < y[k] {
            modes += 1;
            if modes > 2 {
                return false;
            }
        }
    }
    modes == 2
}

/// Smooth with a 3-point running mean until exactly two peaks remain.
fn smooth_until_bimodal(histogram: &[u64]) -> Option<Vec<f64>> {
    let mut h: Vec<f64> = histogram.iter().map(|&c| c as f64).collect();
    let n = h.len();
    if n < 3 {
        return None;
    }
    let mut iterations = 0;
    while !is_bimodal(&h) {
        let mut previous;
        let mut current = 0.0;
        let mut next = h[0];
        for i in 0..n - 1 {
            previous = current;
            current = next;
            next = h[i + 1];
            h[i] = (previous + current + next) / 3.0;
        }
        h[n - 1] = (current + next) / 3.0;
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            return None;
        }
    }
    Some(h)
}

/// Midpoint between the two peaks of the smoothed histogram.
pub fn intermodes(histogram: &[u64]) -> Option<usize> {
    let h = smooth_until_bimodal(histogram)?;
    let peaks: usize = (1..h.len() - 1)
        .filter(|&i| h[i - 1] < h[i] && h[i + 1] < h[i])
        .sum();
    Some(peaks / 2)
}

/// Valley between the two peaks of the smoothed histogram.
pub fn minimum(histogram: &[u64]) -> Option<usize> {
    let h = smooth_until_bimodal(histogram)?;
    (1..h.len() - 1).find(|&i| h[i - 1] > h[i] && h[i + 1] >= h[i])
}

/// Ridler-Calvard iterative intermeans.
pub fn iso_data(histogram: &[u64]) -> Option<usize> {
    let n = histogram.len();
    let mut g = (1..n).find(|&i| histogram[i] > 0)? + 1;
    loop {
        let (mut low, mut low_total) = (0u128, 0u128);
        for (i, &c) in histogram.iter().enumerate().take((g + 1).min(n)) {
            low_total += c as u128;
            low += c as u128 * i as u128;
        }
        let (mut high, mut high_total) = (0u128, 0u128);
        for (i, &c) in histogram.iter().enumerate().skip(g + 1) {
            high_total += c as u128;
            high += c as u128 * i as u128;
        }
        if low_total > 0 && high_total > 0 {
            let low_mean = low / low_total;
            let high_mean = high / high_total;
            if g as f64 == ((low_mean + high_mean) as f64 / 2.0).round() {
                return Some(g);
            }
        }
        g += 1;
        if g > n.saturating_sub(2) {
            return None;
        }
    }
}

/// Li's minimum cross entropy, iterative version.
pub fn li(histogram: &[u64]) -> Option<usize> {
    let n = total(histogram);
    if n == 0.0 {
        return None;
    }
    let mean = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum::<f64>()
        / n;

    let tolerance = 0.5;
    let mut new_threshold = mean;
    let mut threshold;
    let mut iterations = 0;
    loop {
        let old_threshold = new_threshold;
        threshold = (old_threshold + 0.5) as usize;

        let (mut sum_back, mut num_back) = (0.0, 0.0);
        for (i, &c) in histogram.iter().enumerate().take(threshold + 1) {
            sum_back += i as f64 * c as f64;
            num_back += c as f64;
        }
        let mean_back = if num_back == 0.0 { 0.0 } else { sum_back / num_back };

        let (mut sum_obj, mut num_obj) = (0.0, 0.0);
        for (i, &c) in histogram.iter().enumerate().skip(threshold + 1) {
            sum_obj += i as f64 * c as f64;
            num_obj += c as f64;
        }
        let mean_obj = if num_obj == 0.0 { 0.0 } else { sum_obj / num_obj };

        let temp = (mean_back - mean_obj) / (mean_back.ln() - mean_obj.ln());
        if !temp.is_finite() {
            break;
        }
        new_threshold = if temp < -EPSILON {
            (temp - 0.5).trunc()
        } else {
            (temp + 0.5).trunc()
        };

        iterations += 1;
        if (new_threshold - old_threshold).abs() <= tolerance || iterations > MAX_ITERATIONS {
            break;
        }
    }
    Some(threshold)
}

/// Kapur-Sahoo-Wong maximum entropy.
pub fn max_entropy(histogram: &[u64]) -> Option<usize> {
    if total(histogram) == 0.0 {
        return None;
    }
    let norm = normalized(histogram);
    let n = norm.len();

    let mut p1 = vec![0.0; n];
    p1[0] = norm[0];
    for i in 1..n {
        p1[i] = p1[i - 1] + norm[i];
    }
    let p2: Vec<f64> = p1.iter().map(|p| 1.0 - p).collect();

    let first = p1.iter().position(|p| p.abs() >= EPSILON).unwrap_or(0);
    let last = (first..n)
        .rev()
        .find(|&i| p2[i].abs() >= EPSILON)
        .unwrap_or(n - 1);

    let mut threshold = None;
    let mut max_entropy = 0.0;
    for t in first..=last {
        let mut ent_back = 0.0;
        for (i, &h) in norm.iter().enumerate().take(t + 1) {
            if histogram[i] != 0 {
                let r = h / p1[t];
                ent_back -= r * r.ln();
            }
        }
        let mut ent_obj = 0.0;
        for (i, &h) in norm.iter().enumerate().skip(t + 1) {
            if histogram[i] != 0 {
                let r = h / p2[t];
                ent_obj -= r * r.ln();
            }
        }
        let tot = ent_back + ent_obj;
        if max_entropy < tot {
            max_entropy = tot;
            threshold = Some(t);
        }
    }
    threshold
}

/// Mean bin of the histogram.
pub fn mean(histogram: &[u64]) -> Option<usize> {
    let n = total(histogram);
    if n == 0.0 {
        return None;
    }
    let sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();
    Some((sum / n).floor() as usize)
}

/// Tsai's moment-preserving threshold.
pub fn moments(histogram: &[u64]) -> Option<usize> {
    if total(histogram) == 0.0 {
        return None;
    }
    let norm = normalized(histogram);
    let m0 = 1.0;
    let (mut m1, mut m2, mut m3) = (0.0, 0.0, 0.0);
    for (i, &h) in norm.iter().enumerate() {
        let di = i as f64;
        m1 += di * h;
        m2 += di * di * h;
        m3 += di * di * di * h;
    }
    let cd = m0 * m2 - m1 * m1;
    let c0 = (-m2 * m2 + m1 * m3) / cd;
    let c1 = (m0 * -m3 + m2 * m1) / cd;
    let disc = (c1 * c1 - 4.0 * c0).sqrt();
    let z0 = 0.5 * (-c1 - disc);
    let z1 = 0.5 * (-c1 + disc);
    let p0 = (z1 - m1) / (z1 - z0);
    if !p0.is_finite() {
        return None;
    }

    let mut sum = 0.0;
    for (i, &h) in norm.iter().enumerate() {
        sum += h;
        if sum > p0 {
            return Some(i);
        }
    }
    None
}

/// Otsu's method, maximizing between-class variance.
pub fn otsu(histogram: &[u64]) -> Option<usize> {
    let l = histogram.len();
    let n = total(histogram);
    if n == 0.0 || l < 3 {
        return None;
    }
    let s: f64 = histogram
        .iter()
        .enumerate()
        .map(|(k, &c)| k as f64 * c as f64)
        .sum();

    let mut sk = 0.0;
    let mut n1 = histogram[0] as f64;
    let mut bcv_max = 0.0;
    let mut k_star = 0;
    for (k, &c) in histogram.iter().enumerate().take(l - 1).skip(1) {
        sk += k as f64 * c as f64;
        n1 += c as f64;
        let denom = n1 * (n - n1);
        let bcv = if denom != 0.0 {
            let num = (n1 / n) * s - sk;
            num * num / denom
        } else {
            0.0
        };
        if bcv >= bcv_max {
            bcv_max = bcv;
            k_star = k;
        }
    }
    Some(k_star)
}

/// Bin that splits the histogram into two halves by count.
pub fn percentile(histogram: &[u64]) -> Option<usize> {
    let n = total(histogram);
    if n == 0.0 {
        return None;
    }
    let ptile = 0.5;
    let mut threshold = None;
    let mut best = 1.0;
    let mut partial = 0.0;
    for (i, &c) in histogram.iter().enumerate() {
        partial += c as f64;
        let d = (partial / n - ptile).abs();
        if d < best {
            best = d;
            threshold = Some(i);
        }
    }
    threshold
}

/// Zack's triangle method, for histograms with one dominant peak.
pub fn triangle(histogram: &[u64]) -> Option<usize> {
    let n = histogram.len();
    let mut data: Vec<f64> = histogram.iter().map(|&c| c as f64).collect();

    let mut min = data.iter().position(|&c| c > 0.0)?;
    // Line to the zero bin before the first occupied one
    min = min.saturating_sub(1);
    let mut min2 = (1..n).rev().find(|&i| data[i] > 0.0).unwrap_or(0);
    if min2 < n - 1 {
        min2 += 1;
    }
    let mut max = 0;
    let mut dmax = 0.0;
    for (i, &c) in data.iter().enumerate() {
        if c > dmax {
            max = i;
            dmax = c;
        }
    }

    // Work on the longer side of the peak
    let inverted = (max as isize - min as isize) < (min2 as isize - max as isize);
    if inverted {
        data.reverse();
        min = n - 1 - min2;
        max = n - 1 - max;
    }
    if min == max {
        return Some(min);
    }

    let mut nx = data[max];
    let mut ny = min as f64 - max as f64;
    let d = (nx * nx + ny * ny).sqrt();
    nx /= d;
    ny /= d;
    let d = nx * min as f64 + ny * data[min];

    let mut split = min;
    let mut split_distance = 0.0;
    for (i, &c) in data.iter().enumerate().take(max + 1).skip(min + 1) {
        let distance = nx * i as f64 + ny * c - d;
        if distance > split_distance {
            split = i;
            split_distance = distance;
        }
    }
    let split = split.saturating_sub(1);

    Some(if inverted { n - 1 - split } else { split })
}

/// Yen's maximum correlation criterion.
pub fn yen(histogram: &[u64]) -> Option<usize> {
    if total(histogram) == 0.0 {
        return None;
    }
    let norm = normalized(histogram);
    let n = norm.len();

    let mut p1 = vec![0.0; n];
    let mut p1_sq = vec![0.0; n];
    p1[0] = norm[0];
    p1_sq[0] = norm[0] * norm[0];
    for i in 1..n {
        p1[i] = p1[i - 1] + norm[i];
        p1_sq[i] = p1_sq[i - 1] + norm[i] * norm[i];
    }
    let mut p2_sq = vec![0.0; n];
    for i in (0..n - 1).rev() {
        p2_sq[i] = p2_sq[i + 1] + norm[i + 1] * norm[i + 1];
    }

    let mut threshold = None;
    let mut max_crit = f64::MIN_POSITIVE;
    for t in 0..n {
        let sq = p1_sq[t] * p2_sq[t];
        let spread = p1[t] * (1.0 - p1[t]);
        let crit = -(if sq > 0.0 { sq.ln() } else { 0.0 })
            + 2.0 * (if spread > 0.0 { spread.ln() } else { 0.0 });
        if crit > max_crit {
            max_crit = crit;
            threshold = Some(t);
        }
    }
    threshold
}
