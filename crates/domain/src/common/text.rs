//! Text metrics shared by the trackers.
//!
//! Item-name deduplication, title diversity scoring and the consistency
//! checks all compare free-form strings produced by a language model, so
//! exact equality is useless. These helpers provide the fuzzy metrics
//! the trackers use: Levenshtein similarity with a containment bonus for
//! entity names, and word-level Jaccard blended with containment for
//! chapter titles.

/// Count words as whitespace-separated non-empty tokens.
///
/// This is the single word-count definition used by the length
/// enforcement path; prose in any script that separates words with
/// whitespace (including Vietnamese) counts the same way.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Classic Levenshtein edit distance over characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Similarity in [0, 1] for entity names (items, characters).
///
/// Levenshtein-derived ratio with a containment bonus: a name that fully
/// contains the other (e.g. "Huyết Ma Kiếm" vs "Ma Kiếm") is suspicious
/// even when the edit distance is large.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    let distance = levenshtein(&a, &b);
    let ratio = 1.0 - (distance as f64 / max_len as f64);

    let contained = a.contains(b.as_str()) || b.contains(a.as_str());
    if contained {
        // Containment floors the similarity at 0.8 regardless of length gap.
        ratio.max(0.8)
    } else {
        ratio
    }
}

/// Word-level Jaccard similarity in [0, 1].
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a_words: std::collections::HashSet<String> =
        normalize(a).split_whitespace().map(str::to_string).collect();
    let b_words: std::collections::HashSet<String> =
        normalize(b).split_whitespace().map(str::to_string).collect();
    if a_words.is_empty() && b_words.is_empty() {
        return 1.0;
    }
    if a_words.is_empty() || b_words.is_empty() {
        return 0.0;
    }
    let intersection = a_words.intersection(&b_words).count() as f64;
    let union = a_words.union(&b_words).count() as f64;
    intersection / union
}

/// Containment similarity in [0, 1]: fraction of the shorter word set
/// that also appears in the longer one.
pub fn containment_similarity(a: &str, b: &str) -> f64 {
    let a_words: std::collections::HashSet<String> =
        normalize(a).split_whitespace().map(str::to_string).collect();
    let b_words: std::collections::HashSet<String> =
        normalize(b).split_whitespace().map(str::to_string).collect();
    let (small, large) = if a_words.len() <= b_words.len() {
        (&a_words, &b_words)
    } else {
        (&b_words, &a_words)
    };
    if small.is_empty() {
        return 0.0;
    }
    small.iter().filter(|w| large.contains(*w)).count() as f64 / small.len() as f64
}

/// Blended title similarity: Jaccard weighted 0.4, containment 0.6.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    0.4 * jaccard_similarity(a, b) + 0.6 * containment_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_ignores_extra_whitespace() {
        assert_eq!(word_count("  một   hai ba\n\nbốn "), 4);
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   \n\t"), 0);
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("kiếm", "kiếm"), 0);
    }

    #[test]
    fn identical_names_are_fully_similar() {
        assert_eq!(name_similarity("Huyết Ma Kiếm", "huyết ma kiếm"), 1.0);
    }

    #[test]
    fn contained_name_floors_at_point_eight() {
        let sim = name_similarity("Huyết Ma Kiếm Chí Tôn", "Ma Kiếm");
        assert!(sim >= 0.8, "containment should floor similarity, got {sim}");
    }

    #[test]
    fn unrelated_names_score_low() {
        let sim = name_similarity("Phá Thiên Thương", "Linh Đan Cửu Chuyển");
        assert!(sim < 0.6, "unrelated names scored {sim}");
    }

    #[test]
    fn jaccard_counts_shared_words() {
        let sim = jaccard_similarity("kiếm đế trở về", "kiếm đế xuất thế");
        // 2 shared of 6 distinct words
        assert!((sim - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn containment_uses_shorter_side() {
        assert_eq!(containment_similarity("kiếm đế", "kiếm đế trở về"), 1.0);
    }

    #[test]
    fn title_similarity_blend() {
        let same = title_similarity("Kiếm Đế Trở Về", "Kiếm Đế Trở Về");
        assert!((same - 1.0).abs() < 1e-9);
        let disjoint = title_similarity("Kiếm Đế Trở Về", "Lôi Hỏa Luyện Thể");
        assert_eq!(disjoint, 0.0);
    }
}
