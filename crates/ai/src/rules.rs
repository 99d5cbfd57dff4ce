use std::collections::BTreeSet;
use std::ops::Range;

use async_trait::async_trait;

use sprout_core::{BehaviorCategory, Observation};

use crate::result::{
    AnalysisOutput, AnalysisSource, AnalyzerError, ConfidenceLevel, Milestone, MilestoneImportance,
};
use crate::strategy::AnalyzerStrategy;

/// One entry of the deterministic rule table.
///
/// A rule matches when the child's age falls in `age_months`, the category is
/// equal, and the lowercased behavior text contains at least one keyword.
struct Rule {
    age_months: Range<u32>,
    category: BehaviorCategory,
    keywords: &'static [&'static str],
    milestone: &'static str,
    importance: MilestoneImportance,
    interpretation: &'static str,
    reading: &'static str,
    suggestions: &'static [&'static str],
}

/// Ordered rule table. First match wins, so narrower rules come first.
static RULES: &[Rule] = &[
    Rule {
        age_months: 0..6,
        category: BehaviorCategory::Social,
        keywords: &["笑", "smile", "smiled", "coo"],
        milestone: "Social smile",
        importance: MilestoneImportance::Critical,
        interpretation: "Responsive smiling shows the child is starting to engage socially with caregivers.",
        reading: "Early reciprocal exchanges build the secure base described by attachment theory.",
        suggestions: &[
            "Hold face-to-face play several times a day and mirror the child's expressions.",
            "Narrate what you are doing in a warm voice during routines.",
        ],
    },
    Rule {
        age_months: 5..12,
        category: BehaviorCategory::Motor,
        keywords: &["爬", "坐", "crawl", "sit", "sat up"],
        milestone: "Crawling and independent sitting",
        importance: MilestoneImportance::Important,
        interpretation: "Trunk control and coordinated limb movement are coming together.",
        reading: "Self-initiated movement widens exploration, which fuels sensorimotor learning.",
        suggestions: &[
            "Offer safe floor time with toys just out of reach.",
            "Childproof low shelves and outlets as the exploration range grows.",
        ],
    },
    Rule {
        age_months: 9..18,
        category: BehaviorCategory::Motor,
        keywords: &["走", "步", "walk", "step"],
        milestone: "Independent walking",
        importance: MilestoneImportance::Critical,
        interpretation: "Taking independent steps marks the transition from crawling to upright locomotion.",
        reading: "Walking brings new independence; the child may alternate between venturing away and checking back with you.",
        suggestions: &[
            "Let the child practise barefoot on safe, varied surfaces.",
            "Stay within reach and celebrate attempts rather than only successes.",
        ],
    },
    Rule {
        age_months: 18..36,
        category: BehaviorCategory::Motor,
        keywords: &["跑", "跳", "run", "jump", "climb", "爬楼"],
        milestone: "Running and jumping",
        importance: MilestoneImportance::Important,
        interpretation: "Balance and leg strength now support faster, two-footed movement.",
        reading: "Physical mastery feeds the toddler's growing sense of autonomy.",
        suggestions: &[
            "Provide daily outdoor time for running, climbing and ball play.",
            "Let the child try stairs with a hand on the rail while you spot.",
        ],
    },
    Rule {
        age_months: 24..72,
        category: BehaviorCategory::Motor,
        keywords: &["画", "剪", "扣", "draw", "scissors", "button"],
        milestone: "Fine motor control",
        importance: MilestoneImportance::Notable,
        interpretation: "Hand-eye coordination and finger strength are refining.",
        reading: "Making marks and manipulating small objects supports both creativity and school readiness.",
        suggestions: &[
            "Keep crayons, play dough and child-safe scissors within easy reach.",
            "Invite help with buttons and zips during dressing.",
        ],
    },
    Rule {
        age_months: 8..18,
        category: BehaviorCategory::Language,
        keywords: &["爸爸", "妈妈", "第一个词", "mama", "dada", "first word"],
        milestone: "First words",
        importance: MilestoneImportance::Critical,
        interpretation: "The child is linking sounds to specific people or objects on purpose.",
        reading: "Naming familiar people reflects strong attachment and the beginning of symbolic thought.",
        suggestions: &[
            "Repeat and expand the word back (\"Mama, yes, Mama is here\").",
            "Read picture books and name objects during daily routines.",
        ],
    },
    Rule {
        age_months: 18..36,
        category: BehaviorCategory::Language,
        keywords: &["句", "两个词", "sentence", "two words", "phrase"],
        milestone: "Combining words",
        importance: MilestoneImportance::Important,
        interpretation: "Putting words together shows emerging grammar.",
        reading: "Being understood reduces frustration and supports emotional regulation.",
        suggestions: &[
            "Model slightly longer phrases than the child uses.",
            "Give the child time to finish before responding.",
        ],
    },
    Rule {
        age_months: 36..84,
        category: BehaviorCategory::Language,
        keywords: &["故事", "为什么", "story", "why"],
        milestone: "Narrative and questioning",
        importance: MilestoneImportance::Notable,
        interpretation: "Asking questions and telling stories reflect growing curiosity and sequencing skills.",
        reading: "Persistent questioning is a sign of the initiative typical of the preschool years.",
        suggestions: &[
            "Answer questions simply and ask what the child thinks first.",
            "Take turns inventing stories at bedtime.",
        ],
    },
    Rule {
        age_months: 6..24,
        category: BehaviorCategory::Emotional,
        keywords: &["认生", "陌生", "分离", "stranger", "separation"],
        milestone: "Stranger and separation anxiety",
        importance: MilestoneImportance::Important,
        interpretation: "Wariness of unfamiliar people shows the child can tell familiar caregivers apart.",
        reading: "This is an expected sign of a healthy attachment bond, not a behavior problem.",
        suggestions: &[
            "Introduce new people gradually while the child stays close to you.",
            "Keep goodbyes short, warm and predictable.",
        ],
    },
    Rule {
        age_months: 12..60,
        category: BehaviorCategory::Emotional,
        keywords: &["哭", "发脾气", "生气", "tantrum", "cry", "angry"],
        milestone: "Emotional regulation in progress",
        importance: MilestoneImportance::Notable,
        interpretation: "Big feelings outpace the child's ability to manage them yet.",
        reading: "Tantrums often mark a clash between growing autonomy and limited self-regulation.",
        suggestions: &[
            "Stay calm and name the feeling (\"You are angry because...\").",
            "Offer simple choices to give the child a sense of control.",
        ],
    },
    Rule {
        age_months: 18..48,
        category: BehaviorCategory::Social,
        keywords: &["分享", "轮流", "一起玩", "share", "take turns", "play with"],
        milestone: "Cooperative play",
        importance: MilestoneImportance::Important,
        interpretation: "Playing with rather than beside other children shows growing social awareness.",
        reading: "Sharing and turn-taking reflect early perspective-taking.",
        suggestions: &[
            "Arrange short play dates with one familiar peer.",
            "Praise specific cooperative acts when they happen.",
        ],
    },
    Rule {
        age_months: 8..24,
        category: BehaviorCategory::Cognitive,
        keywords: &["躲猫猫", "藏", "找", "peekaboo", "hide", "look for"],
        milestone: "Object permanence",
        importance: MilestoneImportance::Important,
        interpretation: "Searching for hidden objects shows the child knows things exist out of sight.",
        reading: "Object permanence underpins trust that caregivers return after leaving.",
        suggestions: &[
            "Play hiding games with toys under cloths or cups.",
            "Announce when you leave the room and when you come back.",
        ],
    },
    Rule {
        age_months: 24..84,
        category: BehaviorCategory::Cognitive,
        keywords: &["假装", "过家家", "pretend", "make-believe"],
        milestone: "Symbolic play",
        importance: MilestoneImportance::Important,
        interpretation: "Using one object to stand for another signals symbolic thinking.",
        reading: "Pretend play is how preoperational children rehearse social roles and work through feelings.",
        suggestions: &[
            "Join the pretend game and follow the child's storyline.",
            "Provide open-ended props such as boxes, scarves and play kitchens.",
        ],
    },
    Rule {
        age_months: 12..48,
        category: BehaviorCategory::SelfCare,
        keywords: &["自己吃", "勺", "自己穿", "spoon", "feeds", "dress"],
        milestone: "Self-feeding and dressing",
        importance: MilestoneImportance::Important,
        interpretation: "Wanting to do daily routines alone reflects growing motor planning and independence.",
        reading: "\"Me do it\" is the autonomy drive of toddlerhood; mess is part of learning.",
        suggestions: &[
            "Allow extra time at meals and while dressing.",
            "Offer clothes with large openings and easy fastenings.",
        ],
    },
    Rule {
        age_months: 18..48,
        category: BehaviorCategory::SelfCare,
        keywords: &["厕所", "便盆", "尿", "potty", "toilet"],
        milestone: "Toilet training",
        importance: MilestoneImportance::Important,
        interpretation: "Awareness of bodily signals is developing.",
        reading: "Pressure can turn toileting into a power struggle; readiness varies widely.",
        suggestions: &[
            "Follow readiness cues and keep the routine relaxed.",
            "Treat accidents matter-of-factly without blame.",
        ],
    },
];

const GENERIC_SUGGESTIONS: &[&str] = &[
    "Keep logging similar moments to reveal patterns over time.",
    "Note the setting and the child's mood alongside the behavior.",
];

/// Piaget cognitive stage and Erikson psychosocial stage for an age.
pub fn development_stage(age_months: u32) -> String {
    let piaget = match age_months {
        0..24 => "sensorimotor",
        24..84 => "preoperational",
        84..144 => "concrete operational",
        _ => "formal operational",
    };
    let erikson = match age_months {
        0..18 => "trust vs. mistrust",
        18..36 => "autonomy vs. shame and doubt",
        36..72 => "initiative vs. guilt",
        72..144 => "industry vs. inferiority",
        _ => "identity vs. role confusion",
    };
    format!("{piaget} (Piaget); {erikson} (Erikson)")
}

/// Deterministic rule-table interpreter.
///
/// Model:
/// - Walk the rule table in order; the first `(age range, category, keyword)` hit wins.
/// - No hit yields a generic observation-only result.
/// - Confidence reflects how rich the input is, not whether a rule matched.
#[derive(Debug, Clone)]
pub struct RuleBasedAnalyzer {
    priority: u32,
}

impl Default for RuleBasedAnalyzer {
    fn default() -> Self {
        Self { priority: 10 }
    }
}

impl RuleBasedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Pure evaluation. Never fails, so composites can rely on it as a baseline.
    pub fn evaluate(&self, observation: &Observation) -> AnalysisOutput {
        let text = observation.behavior.to_lowercase();
        let confidence = confidence_for(observation, keyword_hits(&text));
        let stage = development_stage(observation.age_months);

        let matched = RULES.iter().find(|rule| {
            rule.category == observation.category
                && rule.age_months.contains(&observation.age_months)
                && rule.keywords.iter().any(|k| text.contains(k))
        });

        match matched {
            Some(rule) => AnalysisOutput::new(rule.interpretation, confidence, AnalysisSource::RuleBased)
                .with_milestone(Milestone::new(rule.milestone, rule.importance))
                .with_development_stage(stage)
                .with_psychological_reading(rule.reading)
                .with_suggestions(rule.suggestions.iter().copied()),
            None => AnalysisOutput::new(
                format!(
                    "Observed {} behavior at {} months. No specific milestone pattern was recognized; the entry is kept as a general observation.",
                    observation.category, observation.age_months
                ),
                confidence,
                AnalysisSource::RuleBased,
            )
            .with_development_stage(stage)
            .with_suggestions(GENERIC_SUGGESTIONS.iter().copied()),
        }
    }
}

#[async_trait]
impl AnalyzerStrategy for RuleBasedAnalyzer {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn analyze(&self, observation: &Observation) -> Result<AnalysisOutput, AnalyzerError> {
        if observation.behavior.trim().is_empty() {
            return Err(AnalyzerError::InvalidInput(
                "behavior text must not be empty".to_string(),
            ));
        }
        Ok(self.evaluate(observation))
    }
}

/// Number of distinct table keywords present in `text` (already lowercased).
fn keyword_hits(text: &str) -> usize {
    RULES
        .iter()
        .flat_map(|rule| rule.keywords.iter().copied())
        .filter(|k| text.contains(k))
        .collect::<BTreeSet<_>>()
        .len()
}

fn confidence_for(observation: &Observation, keyword_hits: usize) -> ConfidenceLevel {
    let mut score = keyword_hits.min(2);
    let len = observation.text_len();
    if len >= 10 {
        score += 1;
    }
    if len >= 40 {
        score += 1;
    }
    if observation.has_context() {
        score += 1;
    }

    match score {
        0..=1 => ConfidenceLevel::Low,
        2..=3 => ConfidenceLevel::Medium,
        _ => ConfidenceLevel::High,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::sample::select;

    fn obs(text: &str, category: BehaviorCategory, age: u32) -> Observation {
        Observation::new(text, category, age).unwrap()
    }

    #[test]
    fn first_steps_at_fourteen_months_is_a_walking_milestone() {
        let analyzer = RuleBasedAnalyzer::new();
        let input = obs("走了5步", BehaviorCategory::Motor, 14);

        let first = analyzer.evaluate(&input);
        let second = analyzer.evaluate(&input);

        let milestone = first.milestone.clone().expect("walking rule should match");
        assert_eq!(milestone.label, "Independent walking");
        assert_eq!(milestone.importance, MilestoneImportance::Critical);
        assert_eq!(first, second);
        assert_eq!(first.source, AnalysisSource::RuleBased);
        assert!(first.development_stage.starts_with("sensorimotor"));
    }

    #[test]
    fn age_outside_rule_range_falls_back_to_generic_observation() {
        let out = RuleBasedAnalyzer::new().evaluate(&obs("走了5步", BehaviorCategory::Motor, 40));
        assert!(out.milestone.is_none());
        assert!(out.interpretation.contains("general observation"));
        assert_eq!(out.suggestions.len(), GENERIC_SUGGESTIONS.len());
    }

    #[test]
    fn category_must_match() {
        let out = RuleBasedAnalyzer::new().evaluate(&obs("走了5步", BehaviorCategory::Language, 14));
        assert!(out.milestone.is_none());
    }

    #[test]
    fn confidence_grows_with_input_richness() {
        let analyzer = RuleBasedAnalyzer::new();
        let sparse = analyzer.evaluate(&obs("hm", BehaviorCategory::Other, 30));
        let rich = analyzer.evaluate(
            &obs(
                "She took her first steps today, walking from the sofa to the table without help",
                BehaviorCategory::Motor,
                13,
            )
            .with_context("living room, after nap"),
        );
        assert_eq!(sparse.confidence_level, ConfidenceLevel::Low);
        assert_eq!(rich.confidence_level, ConfidenceLevel::High);
    }

    #[test]
    fn stages_follow_age_bands() {
        assert!(development_stage(10).contains("trust vs. mistrust"));
        assert!(development_stage(30).starts_with("preoperational"));
        assert!(development_stage(30).contains("autonomy"));
        assert!(development_stage(100).starts_with("concrete operational"));
    }

    #[tokio::test]
    async fn strategy_rejects_blank_text() {
        let input = Observation {
            behavior: "  ".into(),
            category: BehaviorCategory::Motor,
            age_months: 14,
            context: None,
        };
        let err = RuleBasedAnalyzer::new().analyze(&input).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidInput(_)));
    }

    proptest! {
        #[test]
        fn evaluation_is_a_pure_function(
            text in "\\PC{1,60}",
            age in 0u32..=216,
            category in select(BehaviorCategory::ALL.to_vec()),
        ) {
            let input = Observation { behavior: text, category, age_months: age, context: None };
            let analyzer = RuleBasedAnalyzer::new();
            let a = analyzer.evaluate(&input);
            let b = analyzer.evaluate(&input);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.source, AnalysisSource::RuleBased);
            prop_assert!(!a.interpretation.is_empty());
            prop_assert!(!a.suggestions.is_empty());
        }
    }
}
