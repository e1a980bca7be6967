//! Prompt building for the three agents and the auxiliary small-tier
//! tasks (summaries, canon extraction, trait checks).

use storyforge_domain::{
    BeatType, ChapterOutline, GenreType, NpcRelationship, PacingRule, StyleBible, StoryArc,
    VocabularyGuide, WorldBible,
};

use crate::application::services::style::CliffhangerTechnique;

/// Everything the Architect prompt needs.
pub struct ArchitectContext<'a> {
    pub chapter_number: u32,
    pub genre: GenreType,
    pub target_words: u32,
    pub world: &'a WorldBible,
    pub style: &'a StyleBible,
    pub arc: Option<&'a StoryArc>,
    pub previous_summaries: &'a [(u32, String)],
    pub arc_summary: Option<&'a str>,
    pub rag_snippets: &'a [String],
    pub suggested_beats: &'a [BeatType],
    pub avoid_beats: &'a [BeatType],
    pub cliffhangers: &'a [CliffhangerTechnique],
    pub rewrite_instructions: Option<&'a str>,
}

/// Mandatory elements for the golden chapters (1-3).
fn golden_mandatory(chapter: u32) -> &'static [&'static str] {
    match chapter {
        1 => &[
            "Móc câu trong 500 chữ đầu tiên: biến cố hoặc bí ẩn khiến độc giả phải đọc tiếp",
            "Thiết lập mục tiêu rõ ràng của nhân vật chính",
            "Một chi tiết khác biệt của thế giới xuất hiện tự nhiên",
        ],
        2 => &[
            "Nhân vật chính chủ động hành động, không chỉ bị cuốn theo",
            "Giới thiệu ít nhất một nhân vật phụ có sức nặng",
            "Gieo một hạt giống phục bút cho arc đầu",
        ],
        3 => &[
            "Màn vả mặt đầu tiên: kẻ coi thường nhân vật chính phải trả giá",
            "Khẳng định lại động lực dài hạn của nhân vật chính",
        ],
        _ => &[],
    }
}

/// Forbidden patterns for the golden chapters.
fn golden_forbidden(chapter: u32, genre: GenreType) -> Vec<&'static str> {
    let mut forbidden = vec![
        "Đổ thông tin thiết lập thế giới thành đoạn dài (world dump)",
        "Hồi tưởng chiếm quá nửa chương",
    ];
    if chapter == 1 && !genre.permits_immediate_revenge() {
        forbidden.push("Trả thù ngay trong chương 1 khi chưa tích đủ dồn nén");
    }
    forbidden
}

/// System + user prompt for the Architect.
pub fn build_architect_prompt(ctx: &ArchitectContext<'_>) -> (String, String) {
    let scene_count = ChapterOutline::required_scene_count(ctx.target_words);
    let per_scene = ChapterOutline::per_scene_words(ctx.target_words, scene_count);

    let system = "Bạn là kiến trúc sư truyện dài kỳ. Trả về DUY NHẤT một object JSON đúng schema, không giải thích, không markdown.".to_string();

    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Lập dàn ý chương {} cho truyện \"{}\" (thể loại {}).\n\n",
        ctx.chapter_number, ctx.world.story_title, ctx.genre
    ));

    // World context
    prompt.push_str(&format!(
        "NHÂN VẬT CHÍNH: {} - {} tầng {}\n",
        ctx.world.protagonist.name, ctx.world.protagonist.realm, ctx.world.protagonist.level
    ));
    if !ctx.world.protagonist.goals.is_empty() {
        prompt.push_str(&format!(
            "MỤC TIÊU: {}\n",
            ctx.world.protagonist.goals.join("; ")
        ));
    }
    if !ctx.world.world_rules.is_empty() {
        prompt.push_str("QUY TẮC THẾ GIỚI (bất biến):\n");
        for rule in &ctx.world.world_rules {
            prompt.push_str(&format!("- {rule}\n"));
        }
    }
    prompt.push('\n');

    // Arc position and tension
    if let Some(arc) = ctx.arc {
        prompt.push_str(&format!(
            "ARC HIỆN TẠI: #{} \"{}\" ({}), chương {}-{}, cao trào chương {}\n",
            arc.number,
            arc.title,
            arc.theme.as_str(),
            arc.start_chapter,
            arc.end_chapter,
            arc.climax_chapter
        ));
        if let Some(tension) = arc.tension_at(ctx.chapter_number) {
            prompt.push_str(&format!("ĐỘ CĂNG MỤC TIÊU: {tension}/100\n"));
        }
        if let Some(summary) = ctx.arc_summary {
            prompt.push_str(&format!("TÓM TẮT ARC: {summary}\n"));
        }
        prompt.push('\n');
    }

    // Rolling memory
    if !ctx.previous_summaries.is_empty() {
        prompt.push_str("DIỄN BIẾN GẦN NHẤT:\n");
        for (number, summary) in ctx.previous_summaries {
            prompt.push_str(&format!("- Chương {number}: {summary}\n"));
        }
        prompt.push('\n');
    }
    if !ctx.rag_snippets.is_empty() {
        prompt.push_str("CHI TIẾT LIÊN QUAN TỪ CÁC CHƯƠNG CŨ:\n");
        for snippet in ctx.rag_snippets {
            prompt.push_str(&format!("- {snippet}\n"));
        }
        prompt.push('\n');
    }

    // Beat guidance
    if !ctx.suggested_beats.is_empty() {
        prompt.push_str(&format!(
            "BEAT NÊN DÙNG: {}\n",
            ctx.suggested_beats
                .iter()
                .map(|b| b.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    if !ctx.avoid_beats.is_empty() {
        prompt.push_str(&format!(
            "BEAT CẦN TRÁNH (đang hồi hoặc hết ngân sách arc): {}\n",
            ctx.avoid_beats
                .iter()
                .map(|b| b.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    prompt.push('\n');

    // Golden chapter rules
    let mandatory = golden_mandatory(ctx.chapter_number);
    if !mandatory.is_empty() {
        prompt.push_str("YÊU CẦU BẮT BUỘC (chương vàng):\n");
        for rule in mandatory {
            prompt.push_str(&format!("- {rule}\n"));
        }
        prompt.push_str("TUYỆT ĐỐI TRÁNH:\n");
        for rule in golden_forbidden(ctx.chapter_number, ctx.genre) {
            prompt.push_str(&format!("- {rule}\n"));
        }
        prompt.push('\n');
    }

    // Style conventions
    if !ctx.style.genre_conventions.is_empty() {
        prompt.push_str("QUY ƯỚC THỂ LOẠI:\n");
        for convention in &ctx.style.genre_conventions {
            prompt.push_str(&format!("- {convention}\n"));
        }
        prompt.push('\n');
    }

    // Cliffhanger menu
    if !ctx.cliffhangers.is_empty() {
        prompt.push_str("KỸ THUẬT MÓC TREO (chọn một):\n");
        for technique in ctx.cliffhangers {
            prompt.push_str(&format!("- {}: {}\n", technique.name, technique.example));
        }
        prompt.push('\n');
    }

    if let Some(instructions) = ctx.rewrite_instructions {
        prompt.push_str("CHỈ DẪN BỔ SUNG (từ lần viết trước):\n");
        prompt.push_str(instructions);
        prompt.push_str("\n\n");
    }

    // Structural requirements and output schema
    prompt.push_str(&format!(
        "CẤU TRÚC: tối thiểu {scene_count} cảnh, mỗi cảnh khoảng {per_scene} chữ, tổng {} chữ.\n",
        ctx.target_words
    ));
    prompt.push_str(
        r#"Trả về JSON:
{
  "chapterNumber": <số chương>,
  "title": "<tiêu đề 3-10 chữ, không dùng mẫu sáo mòn>",
  "summary": "<tóm tắt một đoạn>",
  "povCharacter": "<tên>",
  "location": "<địa điểm chính>",
  "scenes": [
    {"order": 1, "setting": "...", "characters": ["..."], "goal": "...",
     "conflict": "...", "resolution": "...", "estimatedWords": 600,
     "sceneType": "action|dialogue|cultivation|exploration|emotional|transition",
     "dopamineType": "face_slap|breakthrough|recognition|windfall|revenge|protection|romance_spark|revelation"}
  ],
  "tensionLevel": <0-100>,
  "dopaminePoints": [{"type": "...", "setup": "...", "payoff": "...", "intensity": <1-10>}],
  "emotionalArc": {"opening": "...", "midpoint": "...", "climax": "...", "closing": "..."},
  "cliffhanger": "<mô tả móc treo>",
  "targetWordCount": <tổng số chữ>
}"#,
    );

    (system, prompt)
}

/// System + user prompt for the Writer.
pub fn build_writer_prompt(
    outline: &ChapterOutline,
    style: &StyleBible,
    vocabulary: &VocabularyGuide,
    voice_guide: &[&NpcRelationship],
    pacing: &PacingRule,
    exemplars: &[&str],
) -> (String, String) {
    let mut system = String::new();
    system.push_str("Bạn là tác giả truyện dài kỳ chuyên nghiệp. Viết văn xuôi thuần túy, ");
    system.push_str("KHÔNG dùng markdown, KHÔNG đánh số cảnh, KHÔNG ghi chú ngoài truyện.\n");
    system.push_str(&format!(
        "Giọng kể: {}. Ngôi kể: {:?}. Nhịp: {:?}.\n",
        style.narrative_voice, style.narrative_style, style.pacing
    ));
    system.push_str(&format!(
        "Tỷ lệ hội thoại {}-{}%, miêu tả {}-{}%, nội tâm {}-{}%, hành động {}-{}%.",
        style.dialogue_ratio.min,
        style.dialogue_ratio.max,
        style.description_ratio.min,
        style.description_ratio.max,
        style.inner_ratio.min,
        style.inner_ratio.max,
        style.action_ratio.min,
        style.action_ratio.max,
    ));

    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Viết chương {}: \"{}\" (~{} chữ).\n\nTÓM TẮT: {}\n\n",
        outline.chapter_number, outline.title, outline.target_word_count, outline.summary
    ));

    prompt.push_str("CÁC CẢNH THEO THỨ TỰ:\n");
    for scene in &outline.scenes {
        prompt.push_str(&format!(
            "{}. [{}] {} | Mục tiêu: {} | Xung đột: {} | Kết: {} (~{} chữ)\n",
            scene.order,
            scene
                .scene_type
                .map(|t| t.as_str())
                .unwrap_or("tự chọn"),
            scene.setting,
            scene.goal,
            scene.conflict,
            scene.resolution,
            scene.estimated_words,
        ));
    }
    prompt.push('\n');

    if !outline.dopamine_points.is_empty() {
        prompt.push_str("ĐIỂM THỎA MÃN PHẢI CÓ:\n");
        for point in &outline.dopamine_points {
            prompt.push_str(&format!(
                "- {} (cường độ {}): dựng {} -> trả {}\n",
                point.kind, point.intensity, point.setup, point.payoff
            ));
        }
        prompt.push('\n');
    }

    // Character voices, restricted to who appears this chapter
    if !voice_guide.is_empty() {
        prompt.push_str("GIỌNG NHÂN VẬT:\n");
        for rel in voice_guide {
            prompt.push_str(&format!(
                "- {} ({}, thiện cảm {}): giữ thái độ nhất quán với quan hệ này\n",
                rel.name,
                rel.role.as_str(),
                rel.affinity
            ));
        }
        prompt.push('\n');
    }

    // Pacing for the dominant scene type
    prompt.push_str(&format!(
        "NHỊP VĂN: câu {}-{} chữ, đoạn {}-{} câu, mật độ {}, tốc độ {}.\n\n",
        pacing.sentence_length.0,
        pacing.sentence_length.1,
        pacing.paragraph_length.0,
        pacing.paragraph_length.1,
        pacing.density,
        pacing.pace,
    ));

    // Vocabulary hints
    if !vocabulary.power_expressions.is_empty() || !vocabulary.atmosphere.is_empty() {
        prompt.push_str("TỪ VỰNG GỢI Ý: ");
        let hints: Vec<&str> = vocabulary
            .power_expressions
            .iter()
            .chain(vocabulary.emotions.iter())
            .chain(vocabulary.atmosphere.iter())
            .map(String::as_str)
            .take(10)
            .collect();
        prompt.push_str(&hints.join(", "));
        prompt.push_str("\n\n");
    }

    if !exemplars.is_empty() {
        prompt.push_str("VĂN MẪU THAM KHẢO (học nhịp, không chép):\n");
        for exemplar in exemplars {
            prompt.push_str(&format!("> {exemplar}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("KẾT CHƯƠNG: {}\n", outline.cliffhanger));
    (system, prompt)
}

/// How much trailing context a continuation call sees.
pub const CONTINUATION_TAIL_CHARS: usize = 1500;

/// System + user prompt for a continuation call.
pub fn build_continuation_prompt(written_tail: &str, remaining_words: u32) -> (String, String) {
    let system =
        "Tiếp tục viết liền mạch, không lặp lại đoạn đã có, không tóm tắt, không mở đầu lại."
            .to_string();
    let tail: String = written_tail
        .chars()
        .rev()
        .take(CONTINUATION_TAIL_CHARS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let prompt = format!(
        "Đoạn cuối vừa viết:\n...{tail}\n\nViết tiếp khoảng {remaining_words} chữ để hoàn thành chương."
    );
    (system, prompt)
}

/// Critic content truncation bounds.
pub const CRITIC_MAX_CHARS: usize = 30_000;
pub const CRITIC_HEAD_CHARS: usize = 15_000;
pub const CRITIC_TAIL_CHARS: usize = 5_000;

/// System + user prompt for the Critic.
pub fn build_critic_prompt(outline: &ChapterOutline, content: &str) -> (String, String) {
    let system = "Bạn là biên tập viên khó tính của nền tảng truyện dài kỳ. Chấm điểm trung thực, trả về DUY NHẤT JSON.".to_string();

    let body = if content.chars().count() > CRITIC_MAX_CHARS {
        let head: String = content.chars().take(CRITIC_HEAD_CHARS).collect();
        let tail: String = {
            let chars: Vec<char> = content.chars().collect();
            chars[chars.len() - CRITIC_TAIL_CHARS..].iter().collect()
        };
        format!("{head}\n[... lược phần giữa ...]\n{tail}")
    } else {
        content.to_string()
    };

    let mut prompt = String::new();
    prompt.push_str(&format!(
        "DÀN Ý: {} cảnh, mục tiêu {} chữ, độ căng {}.\nTóm tắt: {}\n\n",
        outline.scenes.len(),
        outline.target_word_count,
        outline.tension_level,
        outline.summary
    ));
    prompt.push_str(&format!("NỘI DUNG CHƯƠNG:\n{body}\n\n"));
    prompt.push_str(
        r#"Đánh giá theo JSON:
{
  "overallScore": <1-10>,
  "dopamineScore": <1-10, mức thỏa mãn người đọc>,
  "pacingScore": <1-10, nhịp truyện>,
  "issues": [{"type": "...", "description": "...", "severity": "minor|moderate|major"}],
  "approved": <true nếu overallScore >= 6 và đủ độ dài>,
  "requiresRewrite": <true nếu phải viết lại>,
  "rewriteInstructions": "<chỉ dẫn cụ thể nếu requiresRewrite>"
}"#,
    );
    (system, prompt)
}

/// Prompt for the one-paragraph chapter summary (small tier).
pub fn build_summary_prompt(chapter_number: u32, content: &str) -> (String, String) {
    let system = "Tóm tắt chương truyện thành MỘT đoạn văn ngắn, giữ đủ: sự kiện chính, nhân vật xuất hiện, vật phẩm quan trọng, thay đổi tu vi.".to_string();
    let body: String = content.chars().take(20_000).collect();
    (system, format!("Chương {chapter_number}:\n{body}"))
}

/// Prompt for the multi-paragraph arc summary (small tier).
pub fn build_arc_summary_prompt(arc_title: &str, summaries: &[(u32, String)]) -> (String, String) {
    let system = "Gộp các tóm tắt chương thành tóm tắt arc 2-3 đoạn: tuyến chính, thay đổi nhân vật, các mối treo chưa trả.".to_string();
    let mut prompt = format!("Arc \"{arc_title}\":\n");
    for (number, summary) in summaries {
        prompt.push_str(&format!("Chương {number}: {summary}\n"));
    }
    (system, prompt)
}

/// Prompt for canon fact extraction (small tier).
pub fn build_extraction_prompt(chapter_number: u32, content: &str) -> (String, String) {
    let system = "Trích xuất các sự thật (fact) mới về thế giới truyện từ chương. Trả về DUY NHẤT JSON.".to_string();
    let body: String = content.chars().take(20_000).collect();
    let prompt = format!(
        r#"Chương {chapter_number}:
{body}

Trả về JSON:
{{
  "facts": [
    {{"level": "hard|soft|retractable",
      "category": "character_trait|power_level|location|relationship|world_rule|item|event",
      "entities": ["tên thực thể"],
      "statement": "<một câu khẳng định>",
      "confidence": <0-1>}}
  ]
}}
Mức hard chỉ dành cho: danh tính cốt lõi nhân vật chính, cái chết, quy tắc hệ thống sức mạnh."#
    );
    (system, prompt)
}

/// Prompt for the AI-assisted trait contradiction check (small tier).
pub fn build_trait_check_prompt(
    character: &str,
    traits: &[String],
    fragment: &str,
) -> (String, String) {
    let system =
        "Kiểm tra mâu thuẫn tính cách nhân vật. Trả về DUY NHẤT JSON {\"contradicts\": bool, \"explanation\": \"...\"}."
            .to_string();
    let prompt = format!(
        "Nhân vật {character} đã được thiết lập: {}.\nĐoạn mới:\n{fragment}\n\nĐoạn mới có mâu thuẫn với thiết lập không?",
        traits.join("; ")
    );
    (system, prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyforge_domain::{
        EmotionalArc, NarrativeStyle, PacingStyle, Protagonist, PowerRealm, PowerSystem, ProjectId,
        RatioBand, SceneOutline, SceneType,
    };

    fn world() -> WorldBible {
        WorldBible {
            project_id: ProjectId::new(),
            story_title: "Kiếm Đạo Độc Tôn".to_string(),
            power_system: PowerSystem {
                name: "Cửu Thiên".to_string(),
                realms: vec![PowerRealm {
                    rank: 0,
                    name: "Luyện Khí".to_string(),
                    sub_levels: 9,
                    abilities: vec![],
                    breakthrough_difficulty: String::new(),
                }],
            },
            protagonist: Protagonist {
                name: "Hàn Phong".to_string(),
                realm: "Luyện Khí".to_string(),
                level: 3,
                traits: vec![],
                abilities: vec![],
                inventory: vec![],
                goals: vec!["báo thù".to_string()],
                status: "alive".to_string(),
            },
            npc_relationships: vec![],
            locations: vec![],
            plot_threads: vec![],
            foreshadowing: vec![],
            world_rules: vec!["linh khí thưa thớt".to_string()],
        }
    }

    fn style() -> StyleBible {
        StyleBible {
            narrative_voice: "cổ phong".to_string(),
            narrative_style: NarrativeStyle::ThirdPersonLimited,
            dialogue_ratio: RatioBand::new(30, 40),
            description_ratio: RatioBand::new(20, 30),
            inner_ratio: RatioBand::new(10, 20),
            action_ratio: RatioBand::new(20, 30),
            pacing: PacingStyle::Fast,
            genre_conventions: vec![],
        }
    }

    fn outline() -> ChapterOutline {
        ChapterOutline {
            chapter_number: 5,
            title: "Sóng Gió Vân Lai".to_string(),
            summary: "Hàn Phong vào thành".to_string(),
            pov_character: "Hàn Phong".to_string(),
            location: "Vân Lai Thành".to_string(),
            scenes: vec![SceneOutline {
                order: 1,
                setting: "cổng thành".to_string(),
                characters: vec!["Hàn Phong".to_string()],
                goal: "vào thành".to_string(),
                conflict: "bị chặn".to_string(),
                resolution: "áp chế".to_string(),
                estimated_words: 2500,
                scene_type: Some(SceneType::Action),
                dopamine_type: None,
            }],
            tension_level: 60,
            dopamine_points: vec![],
            emotional_arc: EmotionalArc::default(),
            cliffhanger: "bóng đen xuất hiện".to_string(),
            target_word_count: 2500,
        }
    }

    #[test]
    fn golden_rules_only_for_first_three_chapters() {
        let w = world();
        let s = style();
        for (chapter, expect_golden) in [(1u32, true), (3, true), (4, false)] {
            let ctx = ArchitectContext {
                chapter_number: chapter,
                genre: GenreType::TienHiep,
                target_words: 2500,
                world: &w,
                style: &s,
                arc: None,
                previous_summaries: &[],
                arc_summary: None,
                rag_snippets: &[],
                suggested_beats: &[],
                avoid_beats: &[],
                cliffhangers: &[],
                rewrite_instructions: None,
            };
            let (_, prompt) = build_architect_prompt(&ctx);
            assert_eq!(
                prompt.contains("chương vàng"),
                expect_golden,
                "chapter {chapter}"
            );
        }
    }

    #[test]
    fn chapter_one_forbids_immediate_revenge_outside_permissive_genres() {
        assert!(golden_forbidden(1, GenreType::TienHiep)
            .iter()
            .any(|r| r.contains("Trả thù ngay")));
        assert!(!golden_forbidden(1, GenreType::DoThi)
            .iter()
            .any(|r| r.contains("Trả thù ngay")));
    }

    #[test]
    fn architect_prompt_carries_scene_math() {
        let w = world();
        let s = style();
        let ctx = ArchitectContext {
            chapter_number: 10,
            genre: GenreType::TienHiep,
            target_words: 3000,
            world: &w,
            style: &s,
            arc: None,
            previous_summaries: &[],
            arc_summary: None,
            rag_snippets: &[],
            suggested_beats: &[],
            avoid_beats: &[],
            cliffhangers: &[],
            rewrite_instructions: None,
        };
        let (_, prompt) = build_architect_prompt(&ctx);
        // max(4, ceil(3000/600)) = 5 scenes, 600 per scene
        assert!(prompt.contains("tối thiểu 5 cảnh"));
        assert!(prompt.contains("khoảng 600 chữ"));
    }

    #[test]
    fn continuation_prompt_keeps_only_the_tail() {
        let long_text = "x".repeat(5000);
        let (_, prompt) = build_continuation_prompt(&long_text, 800);
        assert!(prompt.len() < 2000);
        assert!(prompt.contains("800 chữ"));
    }

    #[test]
    fn critic_prompt_truncates_head_and_tail() {
        let content = "a".repeat(40_000);
        let (_, prompt) = build_critic_prompt(&outline(), &content);
        assert!(prompt.contains("lược phần giữa"));
        assert!(prompt.len() < 25_000);
    }

    #[test]
    fn critic_prompt_keeps_short_content_whole() {
        let content = "nội dung ngắn".to_string();
        let (_, prompt) = build_critic_prompt(&outline(), &content);
        assert!(prompt.contains("nội dung ngắn"));
        assert!(!prompt.contains("lược phần giữa"));
    }
}
