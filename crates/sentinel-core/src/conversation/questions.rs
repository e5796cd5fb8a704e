//! Question list and ask-conditions.
//!
//! Each question may carry an `ask_when` condition over the answers recorded
//! so far. A question whose condition is false is skipped: it is neither
//! asked nor recorded. Conditions that refer to a question that was itself
//! skipped evaluate to false.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{SentinelError, SentinelResult};
use crate::types::AnswerRecord;

const AFFIRMATIVE: &[&str] = &[
    "yes", "y", "yeah", "yep", "yup", "true", "confirmed", "confirm", "affirmative", "correct", "sure", "ok", "okay",
];
const NEGATIVE: &[&str] = &["no", "n", "nope", "nah", "false", "negative", "not", "never"];

/// How the answer to a question is expected to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    #[default]
    OpenEnded,
    YesNo,
}

/// One configured question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub kind: QuestionKind,
    /// Ask only when this holds. Absent means always.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_when: Option<AskCondition>,
}

impl QuestionSpec {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            kind: QuestionKind::OpenEnded,
            ask_when: None,
        }
    }

    pub fn yes_no(mut self) -> Self {
        self.kind = QuestionKind::YesNo;
        self
    }

    pub fn ask_when(mut self, condition: AskCondition) -> Self {
        self.ask_when = Some(condition);
        self
    }
}

/// Predicate over previously recorded answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AskCondition {
    Always,
    /// The answer to `question` contains any of the given words (case-insensitive).
    AnswerContains { question: String, any_of: Vec<String> },
    /// The answer to `question` matches a regular expression.
    AnswerMatches { question: String, pattern: String },
    AnswerIsAffirmative { question: String },
    AnswerIsNegative { question: String },
    All { conditions: Vec<AskCondition> },
    Any { conditions: Vec<AskCondition> },
    Not { condition: Box<AskCondition> },
}

impl AskCondition {
    pub fn answer_contains<S: Into<String>>(question: impl Into<String>, any_of: impl IntoIterator<Item = S>) -> Self {
        Self::AnswerContains {
            question: question.into(),
            any_of: any_of.into_iter().map(Into::into).collect(),
        }
    }

    pub fn answer_matches(question: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::AnswerMatches {
            question: question.into(),
            pattern: pattern.into(),
        }
    }

    fn referenced_questions<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Always => {}
            Self::AnswerContains { question, .. }
            | Self::AnswerMatches { question, .. }
            | Self::AnswerIsAffirmative { question }
            | Self::AnswerIsNegative { question } => out.push(question),
            Self::All { conditions } | Self::Any { conditions } => {
                for c in conditions {
                    c.referenced_questions(out);
                }
            }
            Self::Not { condition } => condition.referenced_questions(out),
        }
    }
}

/// The standard safety check: what is being done, whether protocols are
/// confirmed, and tool access for maintenance or tool work.
pub fn default_questions() -> Vec<QuestionSpec> {
    vec![
        QuestionSpec::new("task_identification", "What task are you performing?"),
        QuestionSpec::new("safety_confirmation", "Are safety protocols confirmed?").yes_no(),
        QuestionSpec::new("tool_requirements", "Do you require tool access?")
            .yes_no()
            .ask_when(AskCondition::answer_contains("task_identification", ["maintenance", "tool"])),
    ]
}

#[derive(Debug)]
enum Compiled {
    Always,
    Contains { question: String, needles: Vec<String> },
    Matches { question: String, regex: Regex },
    Affirmative { question: String },
    Negative { question: String },
    All(Vec<Compiled>),
    Any(Vec<Compiled>),
    Not(Box<Compiled>),
}

impl Compiled {
    fn compile(condition: &AskCondition) -> SentinelResult<Self> {
        Ok(match condition {
            AskCondition::Always => Self::Always,
            AskCondition::AnswerContains { question, any_of } => Self::Contains {
                question: question.clone(),
                needles: any_of.iter().map(|w| w.to_lowercase()).collect(),
            },
            AskCondition::AnswerMatches { question, pattern } => Self::Matches {
                question: question.clone(),
                regex: Regex::new(pattern).map_err(|e| {
                    SentinelError::validation(format!("invalid pattern for question '{}': {}", question, e))
                })?,
            },
            AskCondition::AnswerIsAffirmative { question } => Self::Affirmative {
                question: question.clone(),
            },
            AskCondition::AnswerIsNegative { question } => Self::Negative {
                question: question.clone(),
            },
            AskCondition::All { conditions } => {
                Self::All(conditions.iter().map(Self::compile).collect::<Result<_, _>>()?)
            }
            AskCondition::Any { conditions } => {
                Self::Any(conditions.iter().map(Self::compile).collect::<Result<_, _>>()?)
            }
            AskCondition::Not { condition } => Self::Not(Box::new(Self::compile(condition)?)),
        })
    }

    fn holds(&self, answers: &[AnswerRecord]) -> bool {
        let answer = |id: &str| answers.iter().find(|a| a.question_id == id).map(|a| a.answer_text.as_str());
        match self {
            Self::Always => true,
            Self::Contains { question, needles } => answer(question)
                .map(|text| {
                    let text = text.to_lowercase();
                    needles.iter().any(|n| text.contains(n.as_str()))
                })
                .unwrap_or(false),
            Self::Matches { question, regex } => answer(question).map(|t| regex.is_match(t)).unwrap_or(false),
            Self::Affirmative { question } => answer(question).map(|t| first_word_in(t, AFFIRMATIVE)).unwrap_or(false),
            Self::Negative { question } => answer(question).map(|t| first_word_in(t, NEGATIVE)).unwrap_or(false),
            Self::All(conditions) => conditions.iter().all(|c| c.holds(answers)),
            Self::Any(conditions) => conditions.iter().any(|c| c.holds(answers)),
            Self::Not(condition) => !condition.holds(answers),
        }
    }
}

fn first_word_in(text: &str, words: &[&str]) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())
        .map(|w| words.contains(&w.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug)]
struct PlannedQuestion {
    spec: QuestionSpec,
    condition: Option<Compiled>,
}

/// A validated question list with compiled conditions.
#[derive(Debug)]
pub struct QuestionPlan {
    questions: Vec<PlannedQuestion>,
}

impl QuestionPlan {
    /// Validate and compile a question list.
    ///
    /// Rejects empty lists, duplicate or blank ids, a conditional first
    /// question, references to later or unknown questions, and bad patterns.
    pub fn new(specs: Vec<QuestionSpec>) -> SentinelResult<Self> {
        if specs.is_empty() {
            return Err(SentinelError::validation_with_suggestion(
                "question list is empty",
                "Configure at least one question under [conversation]",
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (index, spec) in specs.iter().enumerate() {
            if spec.id.trim().is_empty() || spec.text.trim().is_empty() {
                return Err(SentinelError::validation(format!("question {} has a blank id or text", index)));
            }
            if let Some(condition) = &spec.ask_when {
                if index == 0 && *condition != AskCondition::Always {
                    return Err(SentinelError::validation(format!(
                        "first question '{}' cannot be conditional",
                        spec.id
                    )));
                }
                let mut refs = Vec::new();
                condition.referenced_questions(&mut refs);
                if let Some(bad) = refs.into_iter().find(|r| !seen.contains(r)) {
                    return Err(SentinelError::validation(format!(
                        "question '{}' depends on '{}', which is not an earlier question",
                        spec.id, bad
                    )));
                }
            }
            if !seen.insert(spec.id.as_str()) {
                return Err(SentinelError::validation(format!("duplicate question id '{}'", spec.id)));
            }
        }

        let questions = specs
            .into_iter()
            .map(|spec| {
                let condition = spec.ask_when.as_ref().map(Compiled::compile).transpose()?;
                Ok(PlannedQuestion { spec, condition })
            })
            .collect::<SentinelResult<Vec<_>>>()?;

        Ok(Self { questions })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QuestionSpec> {
        self.questions.get(index).map(|q| &q.spec)
    }

    /// First index at or after `from` whose condition holds, or `None` when
    /// the list is exhausted.
    pub fn next_index(&self, from: usize, answers: &[AnswerRecord]) -> Option<usize> {
        (from..self.questions.len()).find(|&i| {
            self.questions[i]
                .condition
                .as_ref()
                .map(|c| c.holds(answers))
                .unwrap_or(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn answer(question_id: &str, index: usize, text: &str) -> AnswerRecord {
        AnswerRecord {
            question_id: question_id.to_string(),
            question_index: index,
            answer_text: text.to_string(),
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_plan_skips_tool_question_for_other_tasks() {
        let plan = QuestionPlan::new(default_questions()).unwrap();
        assert_eq!(plan.len(), 3);

        let answers = vec![answer("task_identification", 0, "Cooking dinner"), answer("safety_confirmation", 1, "yes")];
        assert_eq!(plan.next_index(2, &answers), None);

        let answers = vec![
            answer("task_identification", 0, "Routine Maintenance on the boiler"),
            answer("safety_confirmation", 1, "yes"),
        ];
        assert_eq!(plan.next_index(2, &answers), Some(2));
    }

    #[test]
    fn test_condition_on_skipped_question_is_false() {
        let specs = vec![
            QuestionSpec::new("a", "A?"),
            QuestionSpec::new("b", "B?").ask_when(AskCondition::answer_contains("a", ["x"])),
            QuestionSpec::new("c", "C?").ask_when(AskCondition::AnswerIsAffirmative { question: "b".into() }),
            QuestionSpec::new("d", "D?").ask_when(AskCondition::Not {
                condition: Box::new(AskCondition::AnswerIsAffirmative { question: "b".into() }),
            }),
        ];
        let plan = QuestionPlan::new(specs).unwrap();
        let answers = vec![answer("a", 0, "nothing relevant")];
        assert_eq!(plan.next_index(1, &answers), Some(3));
    }

    #[test]
    fn test_affirmative_and_negative_use_first_word() {
        let specs = vec![
            QuestionSpec::new("ok", "Confirmed?").yes_no(),
            QuestionSpec::new("why", "Why not?").ask_when(AskCondition::AnswerIsNegative { question: "ok".into() }),
        ];
        let plan = QuestionPlan::new(specs).unwrap();
        assert_eq!(plan.next_index(1, &[answer("ok", 0, "No, not yet.")]), Some(1));
        assert_eq!(plan.next_index(1, &[answer("ok", 0, "Yes, all good")]), None);
        assert_eq!(plan.next_index(1, &[answer("ok", 0, "  ")]), None);
    }

    #[test]
    fn test_regex_and_combinators() {
        let specs = vec![
            QuestionSpec::new("room", "Which room?"),
            QuestionSpec::new("count", "How many people?"),
            QuestionSpec::new("extra", "Anyone else expected?").ask_when(AskCondition::All {
                conditions: vec![
                    AskCondition::answer_matches("count", r"^\s*[2-9]"),
                    AskCondition::Any {
                        conditions: vec![
                            AskCondition::answer_contains("room", ["garage"]),
                            AskCondition::answer_contains("room", ["workshop"]),
                        ],
                    },
                ],
            }),
        ];
        let plan = QuestionPlan::new(specs).unwrap();
        let yes = vec![answer("room", 0, "the Workshop"), answer("count", 1, "3 of us")];
        let no = vec![answer("room", 0, "kitchen"), answer("count", 1, "3 of us")];
        assert_eq!(plan.next_index(2, &yes), Some(2));
        assert_eq!(plan.next_index(2, &no), None);
    }

    #[test]
    fn test_validation_rejects_bad_plans() {
        assert!(QuestionPlan::new(vec![]).is_err());
        assert!(QuestionPlan::new(vec![QuestionSpec::new("a", "A?"), QuestionSpec::new("a", "Again?")]).is_err());
        assert!(QuestionPlan::new(vec![
            QuestionSpec::new("a", "A?").ask_when(AskCondition::answer_contains("a", ["x"]))
        ])
        .is_err());
        assert!(QuestionPlan::new(vec![
            QuestionSpec::new("a", "A?"),
            QuestionSpec::new("b", "B?").ask_when(AskCondition::answer_contains("c", ["x"])),
            QuestionSpec::new("c", "C?"),
        ])
        .is_err());
        assert!(QuestionPlan::new(vec![
            QuestionSpec::new("a", "A?"),
            QuestionSpec::new("b", "B?").ask_when(AskCondition::answer_matches("a", "(unclosed")),
        ])
        .is_err());
    }

    #[test]
    fn test_conditions_deserialize_from_toml() {
        let toml_src = r#"
            id = "tools"
            text = "Do you require tool access?"
            kind = "yes_no"

            [ask_when]
            type = "answer_contains"
            question = "task"
            any_of = ["maintenance", "tool"]
        "#;
        let spec: QuestionSpec = toml::from_str(toml_src).unwrap();
        assert_eq!(spec.kind, QuestionKind::YesNo);
        assert_eq!(spec.ask_when, Some(AskCondition::answer_contains("task", ["maintenance", "tool"])));
    }
}
