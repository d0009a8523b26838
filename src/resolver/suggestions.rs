//! "Did you mean" candidates for resolution errors.

/// Returns the candidate closest to `needle` by edit distance, if any is
/// close enough to plausibly be a typo. Ties keep the first candidate seen.
pub fn nearest<'a, I>(needle: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle_chars: Vec<char> = needle.chars().collect();
    // Short names tolerate fewer edits.
    let max_dist = (needle_chars.len() / 3).clamp(1, 3);

    let mut best: Option<(&str, usize)> = None;
    for candidate in candidates {
        if candidate == needle {
            continue;
        }
        let limit = best.map_or(max_dist, |(_, d)| d.saturating_sub(1));
        let dist = levenshtein_with_max(candidate, &needle_chars, limit);
        if dist <= limit && best.is_none_or(|(_, d)| dist < d) {
            best = Some((candidate, dist));
        }
    }
    best.map(|(c, _)| c.to_string())
}

/// Edit distance, giving up early (returning `max_dist + 1`) once every
/// alignment exceeds `max_dist`.
fn levenshtein_with_max(value: &str, needle_chars: &[char], max_dist: usize) -> usize {
    if max_dist == 0 {
        return if value.chars().eq(needle_chars.iter().copied()) {
            0
        } else {
            1
        };
    }

    let n = needle_chars.len();
    if n == 0 {
        return value.chars().count();
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr: Vec<usize> = vec![0; n + 1];

    for (i, c) in value.chars().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];

        for j in 1..=n {
            let cost = if c == needle_chars[j - 1] { 0 } else { 1 };
            let d = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            curr[j] = d;
            row_min = row_min.min(d);
        }

        if row_min > max_dist {
            return max_dist + 1;
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("evnt", &["event", "timestamp", "uuid"], Some("event"); "missing letter")]
    #[test_case("timestmap", &["event", "timestamp"], Some("timestamp"); "transposition")]
    #[test_case("xyz", &["event", "timestamp"], None; "nothing close")]
    #[test_case("countt", &["countIf", "count", "concat"], Some("count"); "closest wins")]
    fn test_nearest(needle: &str, candidates: &[&str], expected: Option<&str>) {
        assert_eq!(
            nearest(needle, candidates.iter().copied()),
            expected.map(str::to_string)
        );
    }

    #[test]
    fn test_distance() {
        let needle: Vec<char> = "kitten".chars().collect();
        assert_eq!(levenshtein_with_max("sitting", &needle, 5), 3);
        assert_eq!(levenshtein_with_max("sitting", &needle, 1), 2);
    }
}
