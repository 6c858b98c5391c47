//! 건강기능식품 질의 처리
//!
//! 질문에서 성분/부위/목적 키워드를 뽑고, 제품별로 기능성·섭취 방법·주의사항을
//! 모아 답변을 만듭니다.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::knowledge::{Chunk, HF_CAUTION, HF_FUNCTION, HF_USAGE};
use crate::text::{normalize, short};

/// 답변에 싣는 최대 제품 수
pub const MAX_PRODUCTS: usize = 5;

const FUNCTION_CHARS: usize = 200;
const USAGE_CHARS: usize = 150;
const CAUTION_CHARS: usize = 200;

pub const NOT_FOUND: &str =
    "해당 질문과 관련된 기능성 정보가 포함된 건강기능식품 데이터를 찾지 못했습니다.";

// ============================================================================
// Keyword Tables
// ============================================================================

static VITAMIN_LETTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"비타민\s*([A-Za-z])(?:[^A-Za-z]|$)").unwrap());

const KOREAN_VITAMINS: &[(&str, &str)] = &[
    ("비타민씨", "비타민C"),
    ("비타민디", "비타민D"),
    ("비타민비", "비타민B"),
    ("비타민이", "비타민E"),
    ("비타민에이", "비타민A"),
];

const MINERALS: &[(&str, &[&str])] = &[
    ("아연", &["아연"]),
    ("엽산", &["엽산"]),
    ("칼슘", &["칼슘"]),
    ("마그네슘", &["마그네슘"]),
    ("철분", &["철분", "철"]),
    ("셀레늄", &["셀레늄", "셀렌"]),
    ("크롬", &["크롬"]),
    ("요오드", &["요오드"]),
    ("망간", &["망간"]),
    ("구리", &["구리"]),
    ("비오틴", &["비오틴"]),
];

/// 대소문자 구분 없이 비교
const COMPONENTS: &[(&str, &[&str])] = &[
    ("오메가3", &["오메가3", "오메가-3", "오메가 3", "알티지"]),
    ("DHA", &["dha"]),
    ("EPA", &["epa"]),
    ("유산균", &["유산균", "프로바이오틱스", "락토바실러스", "비피더스"]),
    ("루테인", &["루테인"]),
    ("지아잔틴", &["지아잔틴"]),
    ("글루코사민", &["글루코사민"]),
    ("MSM", &["msm", "엠에스엠"]),
    ("콘드로이틴", &["콘드로이틴"]),
    ("콜라겐", &["콜라겐"]),
    ("코엔자임", &["코엔자임", "q10", "큐텐"]),
    ("밀크씨슬", &["밀크씨슬", "실리마린"]),
    ("홍삼", &["홍삼"]),
    ("인삼", &["인삼", "고려인삼"]),
    ("프로폴리스", &["프로폴리스"]),
    ("로얄젤리", &["로얄젤리"]),
    ("키토산", &["키토산"]),
    ("식이섬유", &["식이섬유"]),
    ("가르시니아", &["가르시니아"]),
    ("쏘팔메토", &["쏘팔메토"]),
];

/// 신체 부위 / 기능 (띄어쓰기가 있는 변형은 원문 그대로 비교)
const BODY_FUNCTIONS: &[(&str, &[&str])] = &[
    ("관절", &["관절"]),
    ("뼈", &["뼈", "골다공증", "골밀도"]),
    ("눈", &["눈", "시력", "안구"]),
    ("간", &["간 ", "간기능", "간 건강", "간건강"]),
    ("위", &["위 ", "위장", "위 건강"]),
    ("장", &["장 건강", "장건강", "장 ", "장내", "프로바이오틱스", "유산균"]),
    ("혈관", &["혈관", "혈행", "혈액순환"]),
    ("심장", &["심장", "심혈관"]),
    ("뇌", &["뇌", "기억력", "인지기능"]),
    ("피부", &["피부"]),
    ("모발", &["모발", "머리카락", "탈모"]),
    ("손톱", &["손톱"]),
    ("면역", &["면역"]),
    ("항산화", &["항산화"]),
    ("에너지", &["에너지"]),
    ("대사", &["대사"]),
    ("배변", &["배변"]),
    ("소화", &["소화"]),
];

const PURPOSES: &[(&str, &[&str])] = &[
    ("피로", &["피로", "피곤"]),
    ("숙면", &["수면", "숙면", "불면"]),
    ("집중", &["집중"]),
    ("스트레스", &["스트레스"]),
    ("다이어트", &["다이어트", "체중감량", "감량", "체지방"]),
    ("성장", &["성장"]),
    ("갱년기", &["갱년기"]),
    ("임신", &["임신", "임산부"]),
    ("노화", &["노화"]),
];

static LABEL_PRODUCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"제품명:\s*[^\n]+\n?").unwrap());
static LABEL_MAKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"제조사:\s*[^\n]+\n?").unwrap());
static LABEL_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(기능성|섭취 방법|주의사항):\s*").unwrap());
static JOINED_EFFECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(증진|개선|억제|도움|필요)(피로|면역|혈액|기억|항산화|에너지)").unwrap()
});
static JOINED_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(필요|도움)(뼈|관절|눈|간|위|장|피부)").unwrap());

// ============================================================================
// Keyword Extraction
// ============================================================================

/// 질문에서 성분/제품 키워드 추출 (중복 제거, 출현 규칙 순서)
pub fn extract_specific_keywords(query: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let mut push = |k: String| {
        if !keywords.contains(&k) {
            keywords.push(k);
        }
    };

    for caps in VITAMIN_LETTER.captures_iter(query) {
        push(format!("비타민{}", caps[1].to_uppercase()));
    }

    let q_norm = normalize(query);
    for (korean, code) in KOREAN_VITAMINS {
        if q_norm.contains(korean) {
            push(code.to_string());
        }
    }

    if query.contains("종합비타민") || query.contains("멀티비타민") {
        push("비타민".to_string());
    }

    let lower = query.to_lowercase();
    for (name, variants) in MINERALS {
        if variants.iter().any(|v| query.contains(v)) {
            push(name.to_string());
        }
    }
    for (name, variants) in COMPONENTS {
        if variants.iter().any(|v| lower.contains(v)) {
            push(name.to_string());
        }
    }
    for (name, variants) in BODY_FUNCTIONS.iter().chain(PURPOSES) {
        if variants.iter().any(|v| query.contains(v)) {
            push(name.to_string());
        }
    }

    keywords
}

// ============================================================================
// Products
// ============================================================================

/// 제품별로 모은 필드 (라벨 포함 원문)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthFoodProduct {
    pub item_name: String,
    pub function: Option<String>,
    pub usage: Option<String>,
    pub caution: Option<String>,
}

impl HealthFoodProduct {
    fn absorb(&mut self, chunk: &Chunk) {
        let text = chunk.text.trim().to_string();
        let slot = if chunk.section.starts_with(HF_FUNCTION) {
            &mut self.function
        } else if chunk.section.starts_with(HF_USAGE) {
            &mut self.usage
        } else if chunk.section.starts_with(HF_CAUTION) {
            &mut self.caution
        } else {
            return;
        };
        if slot.is_none() && !text.is_empty() {
            *slot = Some(text);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.function.is_some() && self.usage.is_some() && self.caution.is_some()
    }
}

/// 청크를 등장 순서대로 제품 단위로 묶습니다 (섹션별 첫 청크만 사용)
pub fn collect_products(chunks: &[Chunk]) -> Vec<HealthFoodProduct> {
    let mut products: Vec<HealthFoodProduct> = Vec::new();
    for chunk in chunks {
        let name = match chunk.item_name.trim() {
            "" => "제품명 미상",
            n => n,
        };
        let idx = match products.iter().position(|p| p.item_name == name) {
            Some(i) => i,
            None => {
                products.push(HealthFoodProduct {
                    item_name: name.to_string(),
                    ..Default::default()
                });
                products.len() - 1
            }
        };
        products[idx].absorb(chunk);
    }
    products
}

/// 비어 있는 필드를 추가 조회한 청크로 채웁니다
pub fn backfill_products(products: &mut [HealthFoodProduct], extra: &[Chunk]) {
    for chunk in extra {
        if let Some(p) = products
            .iter_mut()
            .find(|p| p.item_name == chunk.item_name.trim())
        {
            p.absorb(chunk);
        }
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// 라벨 제거 + 붙어버린 명사 띄어쓰기 복원
pub fn clean_text_field(text: &str) -> String {
    let text = LABEL_PRODUCT.replace_all(text, "");
    let text = LABEL_MAKER.replace_all(&text, "");
    let text = LABEL_FIELD.replace_all(&text, "");
    let text = JOINED_EFFECT.replace_all(&text, "${1} ${2}");
    let text = JOINED_BODY.replace_all(&text, "${1} ${2}");
    text.trim().to_string()
}

/// 건강기능식품 답변
///
/// 기능성이 있는 제품만 최대 5개까지 싣습니다.
pub fn build_health_food_answer(products: &[HealthFoodProduct]) -> String {
    let items: Vec<&HealthFoodProduct> = products
        .iter()
        .filter(|p| p.function.is_some())
        .take(MAX_PRODUCTS)
        .collect();

    if items.is_empty() {
        return format!(
            "{}\n복용 전에는 의사 또는 약사와 상담하세요.",
            NOT_FOUND
        );
    }

    let mut lines = vec![
        "질문과 관련해 도움이 될 수 있는 건강기능식품/영양제 예시는 다음과 같습니다.".to_string(),
        String::new(),
        "※ 아래 내용은 일반 정보로, 실제 복용 전에는 반드시 의사 또는 약사와 상담해야 합니다."
            .to_string(),
        String::new(),
    ];

    for (idx, product) in items.iter().enumerate() {
        lines.push(format!("{}. {}", idx + 1, product.item_name));

        let fields = [
            ("기능성", &product.function, FUNCTION_CHARS),
            ("섭취 방법", &product.usage, USAGE_CHARS),
            ("주의사항", &product.caution, CAUTION_CHARS),
        ];
        for (heading, value, limit) in fields {
            let cleaned = value.as_deref().map(clean_text_field).unwrap_or_default();
            if !cleaned.is_empty() {
                lines.push(format!("- {}", heading));
                lines.push(format!("  {}", short(&cleaned, limit)));
            }
        }
        lines.push(String::new());
    }

    lines.join("\n").trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn hf(item: &str, section: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: format!("{}-{}", item, section),
            item_name: item.to_string(),
            section: section.to_string(),
            chunk_index: 0,
            text: text.to_string(),
            embedding: vec![],
        }
    }

    #[test]
    fn test_vitamin_keywords() {
        assert_eq!(extract_specific_keywords("비타민C 영양제 추천"), vec!["비타민C"]);
        assert_eq!(extract_specific_keywords("비타민 d가 좋대요"), vec!["비타민D"]);
        assert_eq!(extract_specific_keywords("비타민씨 먹을까"), vec!["비타민C"]);
        assert!(extract_specific_keywords("비타민Cd").is_empty());
    }

    #[test]
    fn test_component_and_purpose_keywords() {
        let keywords = extract_specific_keywords("눈 건강에 좋은 루테인이나 오메가3 있어?");
        assert!(keywords.contains(&"루테인".to_string()));
        assert!(keywords.contains(&"오메가3".to_string()));
        assert!(keywords.contains(&"눈".to_string()));

        let keywords = extract_specific_keywords("피곤하고 면역력이 떨어져요");
        assert_eq!(keywords, vec!["면역", "피로"]);

        assert_eq!(extract_specific_keywords("DHA 영양제"), vec!["DHA"]);
    }

    #[test]
    fn test_collect_and_backfill() {
        let chunks = vec![
            hf("A사 - 비타민C", HF_FUNCTION, "제품명: 비타민C\n기능성: 항산화"),
            hf("B사 - 루테인", HF_FUNCTION, "제품명: 루테인\n기능성: 눈 건강"),
            hf("A사 - 비타민C", HF_FUNCTION, "제품명: 비타민C\n기능성: 두 번째"),
        ];
        let mut products = collect_products(&chunks);
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].function.as_deref(), Some("제품명: 비타민C\n기능성: 항산화"));
        assert!(!products[0].is_complete());

        backfill_products(
            &mut products,
            &[
                hf("A사 - 비타민C", HF_USAGE, "제품명: 비타민C\n제조사: A사\n섭취 방법: 1일 1회"),
                hf("A사 - 비타민C", HF_CAUTION, "제품명: 비타민C\n주의사항: 과다 섭취 주의"),
            ],
        );
        assert!(products[0].is_complete());
        assert!(products[1].usage.is_none());
    }

    #[test]
    fn test_clean_text_field() {
        assert_eq!(
            clean_text_field("제품명: 비타민C\n제조사: A사\n섭취 방법: 1일 1회"),
            "1일 1회"
        );
        assert_eq!(
            clean_text_field("기능성: 면역증진피로개선에 필요뼈의 형성"),
            "면역증진 피로개선에 필요 뼈의 형성"
        );
    }

    #[test]
    fn test_build_answer_limits_products() {
        let products: Vec<HealthFoodProduct> = (0..7)
            .map(|i| HealthFoodProduct {
                item_name: format!("제품{}", i),
                function: Some(format!("기능성: 기능{}", i)),
                usage: Some("섭취 방법: 1일 1회".to_string()),
                caution: None,
            })
            .collect();

        let answer = build_health_food_answer(&products);
        assert!(answer.contains("5. 제품4"));
        assert!(!answer.contains("제품5"));
        assert!(answer.contains("- 기능성\n  기능0"));
        assert!(answer.contains("- 섭취 방법\n  1일 1회"));
        assert!(!answer.contains("- 주의사항"));
        assert!(answer.contains("의사 또는 약사"));
    }

    #[test]
    fn test_build_answer_without_function() {
        let products = vec![HealthFoodProduct {
            item_name: "제품".to_string(),
            usage: Some("1일 1회".to_string()),
            ..Default::default()
        }];
        assert!(build_health_food_answer(&products).starts_with(NOT_FOUND));
    }
}
