//! Static genre template registry: style bibles, power systems, pacing
//! rules, vocabulary, exemplars and cliffhanger techniques.
//!
//! Everything here is data. The registry is built once at startup and
//! shared read-only across jobs.

use storyforge_domain::{
    DopamineType, GenreType, NarrativeStyle, PacingRule, PacingStyle, PowerRealm, PowerSystem,
    RatioBand, SceneType, StyleBible, VocabularyGuide,
};

/// Per-genre pacing guideline.
#[derive(Debug, Clone)]
pub struct PacingGuideline {
    pub min_chapter_words: u32,
    pub max_chapter_words: u32,
    pub recommended_structure: &'static str,
}

/// A named chapter-terminal tension device with an example.
#[derive(Debug, Clone)]
pub struct CliffhangerTechnique {
    pub name: &'static str,
    pub example: &'static str,
}

/// Everything the factory knows about one genre.
#[derive(Debug, Clone)]
pub struct GenreTemplate {
    pub genre: GenreType,
    pub style: StyleBible,
    pub power_system: PowerSystem,
    pub default_dopamine: Vec<DopamineType>,
    pub pacing: PacingGuideline,
}

/// Read-only template registry.
pub struct StyleRegistry {
    templates: Vec<GenreTemplate>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self {
            templates: GenreType::ALL.iter().map(|g| build_template(*g)).collect(),
        }
    }

    pub fn template(&self, genre: GenreType) -> &GenreTemplate {
        self.templates
            .iter()
            .find(|t| t.genre == genre)
            .unwrap_or(&self.templates[0])
    }

    pub fn style(&self, genre: GenreType) -> &StyleBible {
        &self.template(genre).style
    }

    pub fn power_system(&self, genre: GenreType) -> &PowerSystem {
        &self.template(genre).power_system
    }

    /// Vocabulary hints for the Writer, selected by dominant scene type.
    pub fn vocabulary(&self, genre: GenreType, scene: SceneType) -> VocabularyGuide {
        let mut guide = base_vocabulary(genre);
        match scene {
            SceneType::Action => guide
                .power_expressions
                .extend(["sát khí", "kiếm quang", "chấn động hư không"].map(String::from)),
            SceneType::Cultivation => guide
                .power_expressions
                .extend(["linh khí cuồn cuộn", "chu thiên vận chuyển"].map(String::from)),
            SceneType::Emotional => guide
                .emotions
                .extend(["tim đập loạn nhịp", "khóe mắt cay cay"].map(String::from)),
            _ => {}
        }
        guide
    }

    /// Fixed pacing rule for a scene type.
    pub fn pacing_rule(&self, scene: SceneType) -> PacingRule {
        match scene {
            SceneType::Action => PacingRule {
                scene_type: scene,
                sentence_length: (5, 12),
                paragraph_length: (2, 4),
                dialogue_ratio: RatioBand::new(10, 25),
                density: "cao, dồn dập",
                pace: "nhanh",
            },
            SceneType::Dialogue => PacingRule {
                scene_type: scene,
                sentence_length: (8, 18),
                paragraph_length: (1, 3),
                dialogue_ratio: RatioBand::new(50, 70),
                density: "trung bình",
                pace: "vừa",
            },
            SceneType::Cultivation => PacingRule {
                scene_type: scene,
                sentence_length: (12, 25),
                paragraph_length: (3, 6),
                dialogue_ratio: RatioBand::new(0, 10),
                density: "miêu tả nội cảm dày",
                pace: "chậm rãi tích lũy",
            },
            SceneType::Exploration => PacingRule {
                scene_type: scene,
                sentence_length: (10, 20),
                paragraph_length: (3, 5),
                dialogue_ratio: RatioBand::new(15, 35),
                density: "miêu tả cảnh vật vừa phải",
                pace: "vừa",
            },
            SceneType::Emotional => PacingRule {
                scene_type: scene,
                sentence_length: (8, 20),
                paragraph_length: (2, 4),
                dialogue_ratio: RatioBand::new(30, 50),
                density: "nội tâm dày",
                pace: "chậm",
            },
            SceneType::Transition => PacingRule {
                scene_type: scene,
                sentence_length: (10, 18),
                paragraph_length: (2, 3),
                dialogue_ratio: RatioBand::new(0, 20),
                density: "thấp",
                pace: "nhanh gọn",
            },
        }
    }

    /// Few-shot exemplars for a scene type, kept verbatim.
    pub fn exemplars(&self, scene: SceneType) -> &'static [&'static str] {
        match scene {
            SceneType::Action => &[
                "Kiếm quang chớp lên, Hàn Phong đã ở sau lưng đối thủ, mũi kiếm điểm vào yếu huyệt.",
                "Một quyền đánh ra, không khí nổ tung, bụi đá cuốn thành vòng xoáy quanh hai người.",
                "Hắn nghiêng đầu né thẳng một đao, thuận thế quét chân, kẻ địch ngã sõng soài.",
                "Sát khí dâng lên, cả đấu trường im bặt, chỉ còn tiếng binh khí rít gió.",
                "Lưỡi thương xuyên qua tàn ảnh, cắm sâu vào cột đá, rung lên bần bật.",
            ],
            SceneType::Dialogue => &[
                "\"Ngươi dám?\" - \"Có gì mà không dám.\" Hàn Phong nhếch môi, bước tới một bước.",
                "Lão giả vuốt râu: \"Tiểu tử, cơ duyên của ngươi, không phải phúc khí của ngươi.\"",
                "\"Giá này, Vạn Bảo Lâu không bán.\" Chưởng quầy cười mà ánh mắt lạnh tanh.",
                "Nàng khẽ nói: \"Huynh đi đi. Ta chờ được.\" Gió thổi qua, tóc che nửa khuôn mặt.",
                "\"Chuyện năm đó, ngươi biết bao nhiêu?\" Giọng hắn trầm xuống, từng chữ như đá rơi.",
            ],
            SceneType::Cultivation => &[
                "Linh khí theo chu thiên chảy qua kinh mạch, từng vòng, từng vòng, đan điền ấm dần.",
                "Bình cảnh như tường đồng vách sắt. Hàn Phong không nóng vội, tiếp tục mài giũa.",
                "Đan dược hóa thành dòng nhiệt, thiêu đốt tạp chất, xương cốt kêu răng rắc.",
                "Trong định cảnh, hắn thấy lại từng chiêu kiếm, chậm đến mức nhìn rõ hơi thở của gió.",
                "Tầng thứ chín Luyện Khí, chỉ cách một màng mỏng. Hắn nhắm mắt, chờ thời cơ.",
            ],
            SceneType::Exploration => &[
                "Cổng đá phủ rêu mở ra, hơi lạnh ngàn năm phả vào mặt, bên trong tối như mực.",
                "Vân Lai Thành về đêm đèn đuốc sáng trưng, tửu lâu san sát, người tu sĩ chen vai.",
                "Sơn mạch trập trùng, yêu thú gầm vang từ xa, cỏ dại cao đến thắt lưng.",
                "Dưới đáy vực, một dòng suối phát sáng chảy qua những bộ hài cốt cổ xưa.",
                "Bản đồ da dê chỉ về phía tây bắc, nơi mây đen quanh năm không tan.",
            ],
            SceneType::Emotional => &[
                "Nàng đứng dưới tàng cây, không nói gì, chỉ dúi vào tay hắn một chiếc bình ngọc.",
                "Mộ phần đắp vội. Hàn Phong quỳ xuống, ba lạy, mỗi lạy một tiếng vang khô khốc.",
                "Hắn nhìn ánh lửa, nhớ lại bàn tay cha đặt lên đầu mình năm nào. Mắt cay xè.",
                "\"Về nhà thôi.\" Hai chữ giản đơn, mà nàng chờ đã mười năm.",
                "Tiếng sáo vọng qua hồ, người thổi sáo không quay đầu, vạt áo trắng khẽ lay.",
            ],
            SceneType::Transition => &[
                "Ba ngày sau, đoàn xe rời Vân Lai Thành, hướng về phía Lạc Nhật Sơn Mạch.",
                "Mùa đông qua đi, tuyết tan trên đỉnh núi, lại một năm nữa.",
                "Tin tức truyền về tông môn trước cả khi hắn kịp xuống núi.",
                "Đêm ấy không ai ngủ được. Sáng hôm sau, cổng thành mở sớm hơn thường lệ.",
                "Chớp mắt đã đến ngày đại hội, quảng trường đông nghịt từ canh năm.",
            ],
        }
    }

    /// Named cliffhanger techniques for the Architect prompt.
    pub fn cliffhanger_techniques(&self) -> &'static [CliffhangerTechnique] {
        const TECHNIQUES: &[CliffhangerTechnique] = &[
            CliffhangerTechnique {
                name: "kẻ địch xuất hiện",
                example: "Cửa điện bật mở, một bóng đen đứng ngược sáng, khí tức Trúc Cơ tràn ra.",
            },
            CliffhangerTechnique {
                name: "bí mật hé lộ",
                example: "Mảnh ngọc bội vỡ ra, bên trong là nửa tấm bản đồ - nửa còn lại, hắn đã thấy ở đâu đó.",
            },
            CliffhangerTechnique {
                name: "đột phá dang dở",
                example: "Đan điền rung lên, màng chắn nứt một khe - đúng lúc tiếng báo động vang khắp tông môn.",
            },
            CliffhangerTechnique {
                name: "lời tuyên chiến",
                example: "\"Ba ngày sau, đài sinh tử. Ta chờ ngươi.\"",
            },
            CliffhangerTechnique {
                name: "biến cố bất ngờ",
                example: "Mặt đất khẽ rung. Rồi rung mạnh hơn. Cả tòa thành cổ bắt đầu chìm xuống.",
            },
        ];
        TECHNIQUES
    }
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_template(genre: GenreType) -> GenreTemplate {
    match genre {
        GenreType::TienHiep => GenreTemplate {
            genre,
            style: StyleBible {
                narrative_voice: "cổ phong, sắc gọn, giàu khí thế".to_string(),
                narrative_style: NarrativeStyle::ThirdPersonLimited,
                dialogue_ratio: RatioBand::new(30, 40),
                description_ratio: RatioBand::new(20, 30),
                inner_ratio: RatioBand::new(10, 20),
                action_ratio: RatioBand::new(20, 30),
                pacing: PacingStyle::Fast,
                genre_conventions: vec![
                    "Tu vi quyết định địa vị; lời nói sau cùng thuộc về kẻ mạnh.".to_string(),
                    "Cơ duyên đi kèm hiểm cảnh, không có bữa ăn nào miễn phí.".to_string(),
                    "Ân oán phân minh: một giọt ân báo một dòng suối, một mối thù không để qua đêm.".to_string(),
                    "Không hạ thấp nhân vật phụ để nâng nhân vật chính; đối thủ phải có lý do của họ.".to_string(),
                ],
            },
            power_system: tien_hiep_power_system(),
            default_dopamine: vec![
                DopamineType::Breakthrough,
                DopamineType::FaceSlap,
                DopamineType::Windfall,
                DopamineType::Recognition,
            ],
            pacing: PacingGuideline {
                min_chapter_words: 1800,
                max_chapter_words: 3500,
                recommended_structure: "mở - dồn nén - bùng nổ - dư âm kèm móc treo",
            },
        },
        GenreType::HuyenHuyen => GenreTemplate {
            genre,
            style: StyleBible {
                narrative_voice: "hùng tráng, tưởng tượng phóng khoáng".to_string(),
                narrative_style: NarrativeStyle::ThirdPersonLimited,
                dialogue_ratio: RatioBand::new(25, 35),
                description_ratio: RatioBand::new(25, 35),
                inner_ratio: RatioBand::new(10, 20),
                action_ratio: RatioBand::new(20, 30),
                pacing: PacingStyle::Fast,
                genre_conventions: vec![
                    "Thế giới rộng lớn nhiều chủng tộc, quy tắc sức mạnh tự đặt nhưng phải nhất quán.".to_string(),
                    "Huyết mạch và thiên phú là khởi điểm, không phải kết cục.".to_string(),
                ],
            },
            power_system: huyen_huyen_power_system(),
            default_dopamine: vec![
                DopamineType::Breakthrough,
                DopamineType::Revelation,
                DopamineType::FaceSlap,
            ],
            pacing: PacingGuideline {
                min_chapter_words: 2000,
                max_chapter_words: 4000,
                recommended_structure: "mở rộng thế giới - xung đột - leo thang - móc treo",
            },
        },
        GenreType::DoThi => GenreTemplate {
            genre,
            style: StyleBible {
                narrative_voice: "hiện đại, châm biếm nhẹ, nhịp nhanh".to_string(),
                narrative_style: NarrativeStyle::ThirdPersonLimited,
                dialogue_ratio: RatioBand::new(40, 50),
                description_ratio: RatioBand::new(15, 25),
                inner_ratio: RatioBand::new(15, 25),
                action_ratio: RatioBand::new(10, 20),
                pacing: PacingStyle::Fast,
                genre_conventions: vec![
                    "Cao thủ ẩn mình giữa đời thường; mâu thuẫn đến từ coi thường và thể diện.".to_string(),
                    "Tiền bạc, địa vị, quan hệ là thước đo bề nổi; thực lực là thước đo ngầm.".to_string(),
                ],
            },
            power_system: do_thi_power_system(),
            default_dopamine: vec![
                DopamineType::FaceSlap,
                DopamineType::Recognition,
                DopamineType::Revenge,
            ],
            pacing: PacingGuideline {
                min_chapter_words: 1500,
                max_chapter_words: 3000,
                recommended_structure: "tình huống - bị khinh - lật mặt - dư chấn",
            },
        },
        GenreType::KiemHiep => GenreTemplate {
            genre,
            style: StyleBible {
                narrative_voice: "giang hồ cổ điển, trọng khí tiết".to_string(),
                narrative_style: NarrativeStyle::ThirdPersonOmniscient,
                dialogue_ratio: RatioBand::new(35, 45),
                description_ratio: RatioBand::new(20, 30),
                inner_ratio: RatioBand::new(10, 15),
                action_ratio: RatioBand::new(20, 30),
                pacing: PacingStyle::Medium,
                genre_conventions: vec![
                    "Ân oán giang hồ, danh môn chính phái chưa chắc quang minh.".to_string(),
                    "Võ công có truyền thừa, không từ trên trời rơi xuống.".to_string(),
                ],
            },
            power_system: kiem_hiep_power_system(),
            default_dopamine: vec![
                DopamineType::Revenge,
                DopamineType::Recognition,
                DopamineType::Protection,
            ],
            pacing: PacingGuideline {
                min_chapter_words: 1800,
                max_chapter_words: 3200,
                recommended_structure: "gặp biến - truy nguyên - giao đấu - ân oán mới",
            },
        },
        GenreType::VongDu => GenreTemplate {
            genre,
            style: StyleBible {
                narrative_voice: "trẻ trung, thuật ngữ game tự nhiên".to_string(),
                narrative_style: NarrativeStyle::FirstPerson,
                dialogue_ratio: RatioBand::new(35, 45),
                description_ratio: RatioBand::new(15, 25),
                inner_ratio: RatioBand::new(15, 25),
                action_ratio: RatioBand::new(15, 25),
                pacing: PacingStyle::Fast,
                genre_conventions: vec![
                    "Chỉ số, nhiệm vụ, bảng xếp hạng hiện diện nhưng không thay thế kịch tính.".to_string(),
                    "Lợi thế của nhân vật chính đến từ hiểu biết, không phải hack.".to_string(),
                ],
            },
            power_system: vong_du_power_system(),
            default_dopamine: vec![
                DopamineType::Windfall,
                DopamineType::Recognition,
                DopamineType::Breakthrough,
            ],
            pacing: PacingGuideline {
                min_chapter_words: 1500,
                max_chapter_words: 3000,
                recommended_structure: "nhiệm vụ - biến số - thu hoạch - móc treo",
            },
        },
        GenreType::CungDau => GenreTemplate {
            genre,
            style: StyleBible {
                narrative_voice: "tinh tế, ngầm ý sâu, đối thoại hai tầng".to_string(),
                narrative_style: NarrativeStyle::ThirdPersonLimited,
                dialogue_ratio: RatioBand::new(40, 50),
                description_ratio: RatioBand::new(20, 30),
                inner_ratio: RatioBand::new(15, 25),
                action_ratio: RatioBand::new(5, 10),
                pacing: PacingStyle::Slow,
                genre_conventions: vec![
                    "Mỗi ân sủng là một con dao hai lưỡi; lời khen trong cung là lời cảnh cáo.".to_string(),
                    "Thắng bại nằm ở thông tin và thời điểm, không ở giọng nói to.".to_string(),
                ],
            },
            power_system: cung_dau_power_system(),
            default_dopamine: vec![
                DopamineType::FaceSlap,
                DopamineType::Revelation,
                DopamineType::Protection,
            ],
            pacing: PacingGuideline {
                min_chapter_words: 1800,
                max_chapter_words: 3200,
                recommended_structure: "sóng ngầm - ra đòn - phản chế - thế cục mới",
            },
        },
    }
}

fn base_vocabulary(genre: GenreType) -> VocabularyGuide {
    let mut guide = VocabularyGuide {
        honorifics: vec![
            ("bề trên".to_string(), "tiền bối".to_string()),
            ("thầy".to_string(), "sư tôn".to_string()),
            ("bạn đồng môn".to_string(), "sư huynh/sư muội".to_string()),
            ("kẻ dưới".to_string(), "tiểu bối".to_string()),
        ],
        power_expressions: vec![
            "khí tức trầm ổn".to_string(),
            "uy áp tỏa ra".to_string(),
        ],
        emotions: vec![
            "lạnh sống lưng".to_string(),
            "lòng dâng hào khí".to_string(),
            "nghẹn ở cổ họng".to_string(),
        ],
        atmosphere: vec![
            "mây đen vần vũ".to_string(),
            "đèn đuốc sáng trưng".to_string(),
            "tĩnh đến nghe được tiếng tim đập".to_string(),
        ],
    };
    if genre == GenreType::DoThi || genre == GenreType::VongDu {
        guide.honorifics = vec![
            ("bề trên".to_string(), "anh/chú/bác".to_string()),
            ("bạn bè".to_string(), "cậu/ông bạn".to_string()),
        ];
    }
    guide
}

fn tien_hiep_power_system() -> PowerSystem {
    PowerSystem {
        name: "Tu Tiên Cửu Cảnh".to_string(),
        realms: vec![
            realm(0, "Luyện Khí", 9, &["hấp thu linh khí", "ngự vật sơ cấp"], "dễ, cần linh căn"),
            realm(1, "Trúc Cơ", 3, &["ngự khí phi hành", "tịch cốc"], "cần Trúc Cơ Đan hoặc cơ duyên"),
            realm(2, "Kim Đan", 3, &["kết đan", "pháp tướng sơ hiện"], "tâm cảnh viên mãn, thiên kiếp nhỏ"),
            realm(3, "Nguyên Anh", 3, &["nguyên anh xuất khiếu", "đoạt xá"], "ngộ đạo, độ tâm ma"),
            realm(4, "Hóa Thần", 3, &["lĩnh vực", "không gian trảm"], "hiểu quy tắc không gian"),
            realm(5, "Luyện Hư", 3, &["hư không độn"], "hợp nhất thần thức với thiên địa"),
            realm(6, "Hợp Thể", 3, &["pháp tắc sơ khống"], "dung hợp pháp tắc"),
            realm(7, "Đại Thừa", 3, &["bán bộ thiên đạo"], "chờ thiên kiếp phi thăng"),
            realm(8, "Độ Kiếp", 1, &["chống cửu trọng lôi kiếp"], "sinh tử do mệnh"),
        ],
    }
}

fn huyen_huyen_power_system() -> PowerSystem {
    PowerSystem {
        name: "Đấu Khí Đại Lục".to_string(),
        realms: vec![
            realm(0, "Đấu Giả", 9, &["ngưng tụ đấu khí"], "phổ thông"),
            realm(1, "Đấu Sư", 9, &["đấu khí ngoại phóng"], "cần tư chất"),
            realm(2, "Đại Đấu Sư", 9, &["đấu kỹ trung cấp"], "tích lũy dày"),
            realm(3, "Đấu Linh", 9, &["ngự không ngắn"], "lĩnh ngộ"),
            realm(4, "Đấu Vương", 9, &["lĩnh vực sơ thành"], "cơ duyên"),
            realm(5, "Đấu Hoàng", 9, &["bay lượn tự do"], "hiếm có"),
            realm(6, "Đấu Tông", 9, &["không gian chi lực"], "vạn người một"),
            realm(7, "Đấu Tôn", 9, &["không gian trảm"], "đại lục đỉnh phong"),
            realm(8, "Đấu Thánh", 9, &["sáng thế nhất ngung"], "truyền thuyết"),
        ],
    }
}

fn do_thi_power_system() -> PowerSystem {
    PowerSystem {
        name: "Ẩn Thế Cao Nhân".to_string(),
        realms: vec![
            realm(0, "Minh Kình", 3, &["quyền cước nhập môn"], "khổ luyện"),
            realm(1, "Ám Kình", 3, &["kình lực xuyên thấu"], "danh sư chỉ điểm"),
            realm(2, "Hóa Kình", 3, &["tá lực đả lực"], "ngộ tính"),
            realm(3, "Tông Sư", 3, &["khí cảm viên dung"], "trăm năm hiếm gặp"),
            realm(4, "Đại Tông Sư", 1, &["vô chiêu thắng hữu chiêu"], "đương đại chỉ vài người"),
        ],
    }
}

fn kiem_hiep_power_system() -> PowerSystem {
    PowerSystem {
        name: "Võ Đạo Truyền Thừa".to_string(),
        realms: vec![
            realm(0, "Tam Lưu", 3, &["quyền cước căn bản"], "phổ thông"),
            realm(1, "Nhị Lưu", 3, &["nội công tiểu thành"], "cần tâm pháp"),
            realm(2, "Nhất Lưu", 3, &["nội ngoại kiêm tu"], "danh sư"),
            realm(3, "Tuyệt Đỉnh", 3, &["kiếm khí ngoại phóng"], "kỳ ngộ"),
            realm(4, "Đăng Phong Tạo Cực", 1, &["vô kiếm thắng hữu kiếm"], "giang hồ truyền thuyết"),
        ],
    }
}

fn vong_du_power_system() -> PowerSystem {
    PowerSystem {
        name: "Thiên Mệnh Online".to_string(),
        realms: vec![
            realm(0, "Tân Thủ (1-20)", 20, &["kỹ năng cơ bản"], "cày cấp"),
            realm(1, "Trung Cấp (21-40)", 20, &["chuyển chức lần một"], "nhiệm vụ chuyển chức"),
            realm(2, "Cao Cấp (41-60)", 20, &["chuyển chức lần hai"], "phó bản ẩn"),
            realm(3, "Đỉnh Cấp (61-80)", 20, &["kỹ năng tuyệt học"], "thủ lĩnh thế lực"),
            realm(4, "Thần Vực (81+)", 20, &["thần khí, lãnh địa"], "top bảng xếp hạng"),
        ],
    }
}

fn cung_dau_power_system() -> PowerSystem {
    PowerSystem {
        name: "Phẩm Cấp Hậu Cung".to_string(),
        realms: vec![
            realm(0, "Đáp Ứng", 1, &[], "nhập cung"),
            realm(1, "Thường Tại", 1, &[], "qua tuyển chọn"),
            realm(2, "Quý Nhân", 1, &[], "được chú ý"),
            realm(3, "Tần", 1, &["có cung riêng"], "ân sủng hoặc gia thế"),
            realm(4, "Phi", 1, &["quản một cung"], "sinh dục hoặc đại công"),
            realm(5, "Quý Phi", 1, &["đồng quản lục cung"], "thánh sủng không suy"),
            realm(6, "Hoàng Hậu", 1, &["chưởng phượng ấn"], "mẫu nghi thiên hạ"),
        ],
    }
}

fn realm(rank: u32, name: &str, sub_levels: u32, abilities: &[&str], difficulty: &str) -> PowerRealm {
    PowerRealm {
        rank,
        name: name.to_string(),
        sub_levels,
        abilities: abilities.iter().map(|s| s.to_string()).collect(),
        breakthrough_difficulty: difficulty.to_string(),
    }
}
