//! Title checker: anti-pattern scoring, fuzzy dedup against prior
//! chapters, and a candidate optimizer.

use regex_lite::Regex;

use storyforge_domain::common::title_similarity;

/// Hard rejection: similarity to any prior title at or above this.
pub const HARD_REJECT_SIMILARITY: f64 = 0.9;
/// Strong penalty band starts here; also the optimizer's ceiling.
pub const PENALTY_SIMILARITY: f64 = 0.7;
/// A title scoring below this gets replaced by the optimizer.
pub const ACCEPT_SCORE: f64 = 6.0;
/// Same template more than this many times per window is monotonous.
const MONOTONY_LIMIT: usize = 4;
const MONOTONY_WINDOW: usize = 20;

/// Banned titles (verbatim, case-insensitive).
const BANNED_TITLES: [&str; 6] = [
    "kẻ phản bội",
    "bí mật",
    "trận chiến cuối cùng",
    "sự trở lại",
    "khởi đầu mới",
    "định mệnh",
];

/// Keywords that lose a fraction of a point each for overuse.
const OVERUSED_KEYWORDS: [&str; 8] = [
    "bí mật",
    "trận chiến",
    "cuộc chiến",
    "định mệnh",
    "số phận",
    "huyền thoại",
    "cuối cùng",
    "bất ngờ",
];

/// Filler words dropped when tightening a title.
const FILLER_WORDS: [&str; 6] = ["sự", "cuộc", "những", "một", "rất", "của"];

/// Stock tails for template-derived candidates.
const TEMPLATE_TAILS: [&str; 5] = ["Chi Biến", "Xuất Thế", "Truyền Thừa", "Dậy Sóng", "Lộ Diện"];

#[derive(Debug, Clone)]
pub struct TitleScore {
    pub score: f64,
    pub hard_reject: bool,
    pub reasons: Vec<String>,
}

pub struct TitleChecker {
    major_patterns: Vec<Regex>,
    moderate_patterns: Vec<Regex>,
}

impl TitleChecker {
    pub fn new() -> Self {
        let major = [
            r"(?i)^chương\s*\d+$",          // bare chapter numbers
            r"(?i)^(kẻ|người)\s+\S+$",      // two-word "Kẻ X" stubs
            r"(?i)phần\s*\d+$",             // "... phần 2"
        ];
        let moderate = [
            r"!{1,}$",                       // exclamation endings
            r"(?i)^(sự|việc)\s",            // nominalized openers
            r"\.{3}$",                       // trailing ellipsis
        ];
        Self {
            major_patterns: major.iter().filter_map(|p| Regex::new(p).ok()).collect(),
            moderate_patterns: moderate.iter().filter_map(|p| Regex::new(p).ok()).collect(),
        }
    }

    /// Is the title on the banned list?
    pub fn is_banned(&self, title: &str) -> bool {
        let lowered = title.trim().to_lowercase();
        BANNED_TITLES.iter().any(|b| lowered == *b)
    }

    /// Score a title 0-10 against prior chapter titles.
    pub fn score(&self, title: &str, prior_titles: &[String]) -> TitleScore {
        let mut score = 10.0f64;
        let mut reasons = Vec::new();
        let trimmed = title.trim();
        let lowered = trimmed.to_lowercase();

        if self.is_banned(trimmed) {
            return TitleScore {
                score: 0.0,
                hard_reject: true,
                reasons: vec!["tiêu đề nằm trong danh sách cấm".to_string()],
            };
        }

        // Length band: 3-10 words preferred.
        let words = trimmed.split_whitespace().count();
        if words < 3 {
            score -= 2.0;
            reasons.push("quá ngắn (dưới 3 chữ)".to_string());
        } else if words > 10 {
            score -= 2.0;
            reasons.push("quá dài (trên 10 chữ)".to_string());
        }

        // Anti-patterns.
        if self.major_patterns.iter().any(|p| p.is_match(trimmed)) {
            score -= 4.0;
            reasons.push("trùng mẫu tiêu đề sáo mòn (nặng)".to_string());
        }
        if self.moderate_patterns.iter().any(|p| p.is_match(trimmed)) {
            score -= 2.0;
            reasons.push("trùng mẫu tiêu đề sáo mòn (vừa)".to_string());
        }

        // Overused keywords.
        let overused = OVERUSED_KEYWORDS
            .iter()
            .filter(|k| lowered.contains(*k))
            .count();
        if overused > 0 {
            score -= overused as f64;
            reasons.push(format!("{overused} từ khóa lạm dụng"));
        }

        // Fuzzy similarity against all prior titles.
        let max_similarity = prior_titles
            .iter()
            .map(|prior| title_similarity(trimmed, prior))
            .fold(0.0f64, f64::max);
        if max_similarity >= HARD_REJECT_SIMILARITY {
            return TitleScore {
                score: 0.0,
                hard_reject: true,
                reasons: vec![format!(
                    "trùng {}% với tiêu đề đã dùng",
                    (max_similarity * 100.0) as u32
                )],
            };
        }
        if max_similarity >= PENALTY_SIMILARITY {
            score -= 3.0;
            reasons.push("quá giống tiêu đề gần đây".to_string());
        }

        // Pattern monotony over the recent window.
        let template = template_of(trimmed);
        let recent = prior_titles
            .iter()
            .rev()
            .take(MONOTONY_WINDOW)
            .filter(|prior| template_of(prior) == template)
            .count();
        if recent > MONOTONY_LIMIT {
            score -= 2.0;
            reasons.push(format!("mẫu '{template}' lặp {recent} lần trong 20 chương"));
        }

        TitleScore {
            score: score.clamp(0.0, 10.0),
            hard_reject: false,
            reasons,
        }
    }

    /// Keep an acceptable title, otherwise propose and pick the best
    /// candidate under the similarity ceiling. Idempotent: a title this
    /// function returned passes unchanged on a second application.
    pub fn optimize(&self, title: &str, prior_titles: &[String], content: &str) -> String {
        let current = self.score(title, prior_titles);
        if !current.hard_reject && current.score >= ACCEPT_SCORE {
            return title.trim().to_string();
        }

        let mut candidates = Vec::new();
        candidates.push(tighten(title));
        candidates.extend(keyword_bigrams(content));
        candidates.extend(template_candidates(content));

        let mut best: Option<(f64, String)> = None;
        for candidate in candidates {
            let candidate = candidate.trim().to_string();
            if candidate.is_empty() || candidate.eq_ignore_ascii_case(title.trim()) {
                continue;
            }
            let over_ceiling = prior_titles
                .iter()
                .any(|prior| title_similarity(&candidate, prior) >= PENALTY_SIMILARITY);
            if over_ceiling {
                continue;
            }
            let scored = self.score(&candidate, prior_titles);
            if scored.hard_reject {
                continue;
            }
            if best.as_ref().map(|(s, _)| scored.score > *s).unwrap_or(true) {
                best = Some((scored.score, candidate));
            }
        }

        match best {
            Some((score, candidate)) if score > current.score => candidate,
            _ => title.trim().to_string(),
        }
    }
}

impl Default for TitleChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse template: "A của B" shape, leading stub word, or word count.
fn template_of(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    if lowered.contains(" của ") {
        return "X của Y".to_string();
    }
    let first = lowered.split_whitespace().next().unwrap_or("");
    if ["kẻ", "người", "sự", "cuộc", "đêm", "ngày"].contains(&first) {
        return format!("{first} ...");
    }
    format!("{} từ", lowered.split_whitespace().count())
}

/// Drop filler words and cap at 8 words.
fn tighten(title: &str) -> String {
    title
        .split_whitespace()
        .filter(|w| !FILLER_WORDS.contains(&w.to_lowercase().as_str()))
        .take(8)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Adjacent pairs of capitalized words from the prose (proper-noun
/// bigrams make serviceable titles).
fn keyword_bigrams(content: &str) -> Vec<String> {
    let words: Vec<&str> = content.split_whitespace().take(2000).collect();
    let mut bigrams = Vec::new();
    for pair in words.windows(2) {
        let both_capitalized = pair.iter().all(|w| {
            w.chars()
                .next()
                .map(|c| c.is_uppercase())
                .unwrap_or(false)
                && w.chars().all(|c| c.is_alphabetic())
        });
        if both_capitalized {
            let bigram = format!("{} {}", pair[0], pair[1]);
            if !bigrams.contains(&bigram) {
                bigrams.push(bigram);
            }
        }
        if bigrams.len() >= 5 {
            break;
        }
    }
    bigrams
}

/// Proper nouns combined with stock tails.
fn template_candidates(content: &str) -> Vec<String> {
    let Some(noun) = keyword_bigrams(content).into_iter().next() else {
        return vec![];
    };
    TEMPLATE_TAILS
        .iter()
        .take(2)
        .map(|tail| format!("{noun} {tail}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priors(titles: &[&str]) -> Vec<String> {
        titles.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn good_title_scores_high() {
        let checker = TitleChecker::new();
        let score = checker.score("Kiếm Quang Chấn Vân Lai", &[]);
        assert!(score.score >= 8.0, "got {}", score.score);
        assert!(!score.hard_reject);
    }

    #[test]
    fn banned_title_is_hard_rejected() {
        let checker = TitleChecker::new();
        let score = checker.score("Kẻ Phản Bội", &[]);
        assert!(score.hard_reject);
        assert_eq!(score.score, 0.0);
    }

    #[test]
    fn near_duplicate_is_hard_rejected() {
        let checker = TitleChecker::new();
        let score = checker.score(
            "Huyết Chiến Lạc Nhật Sơn",
            &priors(&["Huyết Chiến Lạc Nhật Sơn Mạch"]),
        );
        assert!(score.hard_reject);
    }

    #[test]
    fn overused_keywords_penalized() {
        let checker = TitleChecker::new();
        let plain = checker.score("Hàn Phong Xuất Quan Đấu Pháp", &[]);
        let cliched = checker.score("Trận Chiến Định Mệnh Cuối Cùng", &[]);
        assert!(cliched.score < plain.score);
    }

    #[test]
    fn monotony_penalized_over_window() {
        let checker = TitleChecker::new();
        let repeated: Vec<String> = (0..6).map(|i| format!("Kiếm {i} của Trời {i}")).collect();
        let score = checker.score("Bảo Vật của Cổ Tộc", &repeated);
        assert!(
            score.reasons.iter().any(|r| r.contains("lặp")),
            "reasons: {:?}",
            score.reasons
        );
    }

    #[test]
    fn optimizer_replaces_banned_title() {
        let checker = TitleChecker::new();
        let content = "Hàn Phong bước vào Vạn Bảo Lâu, nơi Đấu Giá Hội sắp khai mạc.";
        let result = checker.optimize("Kẻ Phản Bội", &priors(&["Khởi Hành"]), content);
        assert_ne!(result.to_lowercase(), "kẻ phản bội");
        let rescored = checker.score(&result, &priors(&["Khởi Hành"]));
        assert!(!rescored.hard_reject);
        assert!(rescored.score > ACCEPT_SCORE, "got {}", rescored.score);
    }

    #[test]
    fn optimizer_is_idempotent() {
        let checker = TitleChecker::new();
        let content = "Hàn Phong nhìn Vân Lai Thành chìm trong mưa.";
        let prior = priors(&["Khởi Hành"]);
        let once = checker.optimize("Sự Trở Lại", &prior, content);
        let twice = checker.optimize(&once, &prior, content);
        assert_eq!(once, twice);
    }

    #[test]
    fn optimizer_keeps_good_titles() {
        let checker = TitleChecker::new();
        let title = "Kiếm Quang Chấn Vân Lai";
        assert_eq!(checker.optimize(title, &[], "nội dung"), title);
    }

    #[test]
    fn optimizer_avoids_prior_similarity() {
        let checker = TitleChecker::new();
        let prior = priors(&["Hàn Phong Vân Lai"]);
        let content = "Hàn Phong tiến vào Vân Lai Thành.";
        let result = checker.optimize("Kẻ Phản Bội", &prior, content);
        for p in &prior {
            assert!(
                title_similarity(&result, p) < PENALTY_SIMILARITY
                    || result == "Kẻ Phản Bội",
                "candidate '{result}' too close to '{p}'"
            );
        }
    }
}
