use super::SamplerSpec;

impl SamplerSpec {
    /// Expand the sampler into its value sequence.
    pub fn expand(&self) -> Result<Vec<f64>, String> {
        match *self {
            SamplerSpec::Uniform { interval, num } => uniform(interval[0], interval[1], num),
            SamplerSpec::Graded {
                interval,
                num,
                grading,
            } => graded(interval[0], interval[1], num, grading),
        }
    }
}

fn check_interval(lo: f64, hi: f64, num: i64) -> Result<usize, String> {
    if !lo.is_finite() || !hi.is_finite() {
        return Err(format!("interval [{lo}, {hi}] must be finite"));
    }
    if lo > hi {
        return Err(format!("interval [{lo}, {hi}] is reversed"));
    }
    if num < 1 {
        return Err(format!("num must be at least 1 (got {num})"));
    }
    usize::try_from(num).map_err(|_| format!("num {num} is too large"))
}

/// `num` equally spaced values from `lo` to `hi` inclusive.
pub fn uniform(lo: f64, hi: f64, num: i64) -> Result<Vec<f64>, String> {
    let num = check_interval(lo, hi, num)?;
    if num == 1 {
        return Ok(vec![lo]);
    }

    let segments = (num - 1) as f64;
    let mut values: Vec<f64> = (0..num)
        .map(|idx| lo + (idx as f64) * (hi - lo) / segments)
        .collect();
    values[num - 1] = hi;
    Ok(values)
}

/// `num` values from `lo` to `hi` where consecutive segment lengths grow by `grading`.
pub fn graded(lo: f64, hi: f64, num: i64, grading: f64) -> Result<Vec<f64>, String> {
    if !(grading > 0.0) || !grading.is_finite() {
        return Err(format!("grading must be positive (got {grading})"));
    }
    let count = check_interval(lo, hi, num)?;
    if grading == 1.0 {
        return uniform(lo, hi, num);
    }
    if count == 1 {
        return Ok(vec![lo]);
    }

    // Partial sums of a geometric series, normalised to the interval length.
    // Exponents are kept non-positive so large `num` cannot overflow.
    let segments = (count - 1) as f64;
    let fraction = |idx: usize| -> f64 {
        let idx = idx as f64;
        if grading > 1.0 {
            let floor = grading.powf(-segments);
            (grading.powf(idx - segments) - floor) / (1.0 - floor)
        } else {
            (1.0 - grading.powf(idx)) / (1.0 - grading.powf(segments))
        }
    };
    let mut values: Vec<f64> = (0..count)
        .map(|idx| lo + (hi - lo) * fraction(idx))
        .collect();
    values[count - 1] = hi;
    if let Some(bad) = values.iter().find(|value| !value.is_finite()) {
        return Err(format!(
            "graded sampling with num {num} and grading {grading} produced {bad}"
        ));
    }
    Ok(values)
}
