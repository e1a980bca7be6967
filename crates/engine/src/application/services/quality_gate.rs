//! Quality gate: combines mechanical checks, consistency issues, canon
//! conflicts and the Critic score into one approval decision.
//!
//! The gate fails closed. Tracker bookkeeping never blocks a chapter;
//! this code is the only place that does.

use crate::application::services::critic::CriticReport;
use crate::application::services::title::TitleChecker;
use crate::application::services::trackers::canon::CanonCheck;
use storyforge_domain::common::word_count;
use storyforge_domain::{ChapterOutline, ConsistencyIssue, IssueSeverity};

/// Configurable gate thresholds.
#[derive(Debug, Clone)]
pub struct GateThresholds {
    pub min_overall: f32,
    pub min_dopamine: f32,
    pub min_pacing: f32,
    pub min_word_ratio: f64,
    /// Distinct senses the prose must touch.
    pub min_senses: usize,
    /// "Tell" phrases per 1000 words before it counts as an issue.
    pub max_tell_per_1k: f64,
    /// Issues quoted into one rewrite prompt.
    pub top_k_issues: usize,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_overall: 6.0,
            min_dopamine: 5.0,
            min_pacing: 5.0,
            min_word_ratio: 0.7,
            min_senses: 3,
            max_tell_per_1k: 8.0,
            top_k_issues: 3,
        }
    }
}

/// How bad the failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSeverity {
    /// Fixable by a rewrite iteration.
    Rewrite,
    /// Not retryable: canon conflict or critical consistency issue.
    Fatal,
}

/// The gate's decision.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub approved: bool,
    pub severity: Option<GateSeverity>,
    /// Targeted instructions for the next rewrite iteration, quoting the
    /// offending fragments verbatim.
    pub rewrite_instructions: Option<String>,
    /// Human-readable reasons, most severe first.
    pub reasons: Vec<String>,
}

/// Clichéd villain lines that mark lazy antagonist writing.
const BANNED_VILLAIN_PHRASES: [&str; 5] = [
    "ngươi đang đùa với lửa",
    "tiểu tử, ngươi tìm chết",
    "ngươi có biết ta là ai không",
    "đến lúc cho ngươi biết thế nào là tuyệt vọng",
    "quỳ xuống ta tha cho ngươi một mạng",
];

/// "Tell" phrases that substitute for shown emotion.
const TELL_PHRASES: [&str; 6] = [
    "cảm thấy rất",
    "vô cùng tức giận",
    "rất buồn",
    "thật là",
    "cực kỳ",
    "hết sức",
];

/// Markdown artifacts that must not survive post-processing.
const MARKDOWN_ARTIFACTS: [&str; 4] = ["**", "##", "```", "- ["];

/// Sense-vocabulary groups; coverage counts distinct groups present.
const SENSE_GROUPS: [(&str, &[&str]); 5] = [
    ("thị giác", &["nhìn", "ánh", "sắc", "bóng", "sáng", "tối"]),
    ("thính giác", &["nghe", "tiếng", "vang", "âm thanh", "rì rào"]),
    ("khứu giác", &["mùi", "hương", "thơm", "tanh", "khét"]),
    ("xúc giác", &["lạnh", "nóng", "ấm", "ram ráp", "tê", "buốt"]),
    ("vị giác", &["vị", "ngọt", "đắng", "chát", "mặn"]),
];

pub struct QualityGate {
    thresholds: GateThresholds,
    titles: TitleChecker,
}

impl QualityGate {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self {
            thresholds,
            titles: TitleChecker::new(),
        }
    }

    /// Evaluate a draft with all four signal groups.
    pub fn evaluate(
        &self,
        outline: &ChapterOutline,
        title: &str,
        content: &str,
        critic: &CriticReport,
        consistency_issues: &[ConsistencyIssue],
        canon: &CanonCheck,
    ) -> GateOutcome {
        let mut reasons = Vec::new();
        let mut fragments: Vec<String> = Vec::new();
        let mut fatal = false;

        // 3. Canon: a hard conflict blocks outright.
        if let Some(conflict) = &canon.hard_conflict {
            fatal = true;
            reasons.push(format!("Mâu thuẫn canon cứng: {conflict}"));
        }
        for warning in &canon.warnings {
            reasons.push(format!("Cảnh báo canon: {warning}"));
        }

        // 2. Consistency: critical issues block.
        for issue in consistency_issues {
            if issue.severity == IssueSeverity::Critical {
                fatal = true;
                reasons.push(format!("Lỗi nhất quán nghiêm trọng: {}", issue.description));
            } else {
                reasons.push(format!(
                    "Lỗi nhất quán ({}): {}",
                    issue.severity.as_str(),
                    issue.description
                ));
            }
            if let Some(fragment) = &issue.fragment {
                fragments.push(fragment.clone());
            }
        }

        // 1. Mechanical checks.
        let words = word_count(content) as f64;
        let ratio = words / f64::from(outline.target_word_count.max(1));
        if ratio < self.thresholds.min_word_ratio {
            reasons.push(format!(
                "Thiếu độ dài: {:.0}% mục tiêu (cần {:.0}%)",
                ratio * 100.0,
                self.thresholds.min_word_ratio * 100.0
            ));
        }

        let lowered = content.to_lowercase();
        for phrase in BANNED_VILLAIN_PHRASES {
            if lowered.contains(phrase) {
                reasons.push(format!("Thoại phản diện sáo mòn: \"{phrase}\""));
                fragments.push(phrase.to_string());
            }
        }

        if self.titles.is_banned(title) {
            reasons.push(format!("Tiêu đề \"{title}\" nằm trong danh sách cấm"));
        }

        for artifact in MARKDOWN_ARTIFACTS {
            if content.contains(artifact) {
                reasons.push(format!("Sót ký hiệu markdown \"{artifact}\""));
            }
        }

        let tell_count: usize = TELL_PHRASES
            .iter()
            .map(|p| lowered.matches(p).count())
            .sum();
        let tell_per_1k = if words > 0.0 {
            tell_count as f64 * 1000.0 / words
        } else {
            0.0
        };
        if tell_per_1k > self.thresholds.max_tell_per_1k {
            reasons.push(format!(
                "Kể thay vì tả: {tell_count} cụm 'tell' ({tell_per_1k:.1}/1000 chữ)"
            ));
        }

        let senses = SENSE_GROUPS
            .iter()
            .filter(|(_, markers)| markers.iter().any(|m| lowered.contains(m)))
            .count();
        if senses < self.thresholds.min_senses {
            reasons.push(format!(
                "Chỉ chạm {senses} giác quan (cần tối thiểu {})",
                self.thresholds.min_senses
            ));
        }

        // 4. Critic scores.
        if critic.fail_closed {
            reasons.push("Critic không chấm được, từ chối phê duyệt".to_string());
        } else {
            if critic.overall_score < self.thresholds.min_overall {
                reasons.push(format!(
                    "Điểm tổng {:.1} dưới ngưỡng {:.1}",
                    critic.overall_score, self.thresholds.min_overall
                ));
            }
            if critic.dopamine_score < self.thresholds.min_dopamine {
                reasons.push(format!(
                    "Điểm thỏa mãn {:.1} dưới ngưỡng {:.1}",
                    critic.dopamine_score, self.thresholds.min_dopamine
                ));
            }
            if critic.pacing_score < self.thresholds.min_pacing {
                reasons.push(format!(
                    "Điểm nhịp {:.1} dưới ngưỡng {:.1}",
                    critic.pacing_score, self.thresholds.min_pacing
                ));
            }
        }
        for issue in critic.issues.iter().filter(|i| i.severity == "major") {
            reasons.push(format!("Critic (nặng): {}", issue.description));
        }

        // Canon warnings alone never block.
        let blocking: Vec<&String> = reasons
            .iter()
            .filter(|r| !r.starts_with("Cảnh báo"))
            .collect();
        let approved = !fatal && blocking.is_empty() && critic.approved;

        let severity = if approved {
            None
        } else if fatal {
            Some(GateSeverity::Fatal)
        } else {
            Some(GateSeverity::Rewrite)
        };

        let rewrite_instructions = if severity == Some(GateSeverity::Rewrite) {
            Some(self.build_rewrite_instructions(&reasons, &fragments, critic))
        } else {
            None
        };

        GateOutcome {
            approved,
            severity,
            rewrite_instructions,
            reasons,
        }
    }

    /// Rewrite prompt targeting the top-k issues, quoting offending
    /// fragments verbatim.
    fn build_rewrite_instructions(
        &self,
        reasons: &[String],
        fragments: &[String],
        critic: &CriticReport,
    ) -> String {
        let mut instructions = String::from("Viết lại chương, khắc phục các vấn đề sau:\n");
        for reason in reasons
            .iter()
            .filter(|r| !r.starts_with("Cảnh báo"))
            .take(self.thresholds.top_k_issues)
        {
            instructions.push_str(&format!("- {reason}\n"));
        }
        if !fragments.is_empty() {
            instructions.push_str("Các đoạn cần sửa (trích nguyên văn):\n");
            for fragment in fragments.iter().take(self.thresholds.top_k_issues) {
                instructions.push_str(&format!("> {fragment}\n"));
            }
        }
        if let Some(extra) = &critic.rewrite_instructions {
            instructions.push_str(extra);
            instructions.push('\n');
        }
        instructions
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(GateThresholds::default())
    }
}
