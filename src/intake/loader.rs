// SPDX-License-Identifier: MIT

//! Program bundle loader - YAML question and program definitions
//!
//! A bundle declares the questions a program asks and the program's
//! blocks, with visibility and eligibility written as predicate text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::engine::answers::{Answer, AnswerKey, AnswerStore, ScalarValue};
use crate::engine::error::{ApplicationError, IntakeError, VersionError};
use crate::engine::predicate::{parse, PredicateAction, PredicateDefinition, PredicateExpr};
use crate::engine::question::{ConceptId, ProgramQuestions, QuestionType, RevisionKey, Scalar};
use crate::intake::program::{Block, ProgramVersion, VersionGraph};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QuestionSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VisibilitySpec {
    #[serde(default)]
    pub action: PredicateAction,
    pub predicate: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BlockSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Question ids, pinned to their latest revision on install
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub visibility: Option<VisibilitySpec>,
    #[serde(default)]
    pub eligibility: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProgramSpec {
    pub id: String,
    #[serde(default)]
    pub eligibility_is_gating: bool,
    #[serde(default)]
    pub blocks: Vec<BlockSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProgramBundle {
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    pub program: ProgramSpec,
}

/// Loads program bundles from YAML files
pub struct BundleLoader;

impl BundleLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a bundle from a YAML file
    pub fn load_bundle<P: AsRef<Path>>(&self, path: P) -> Result<ProgramBundle, IntakeError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a bundle from a YAML string
    pub fn parse_yaml(content: &str) -> Result<ProgramBundle, IntakeError> {
        let bundle: ProgramBundle = serde_yaml::from_str(content)?;
        Ok(bundle)
    }

    /// Load every `.yaml`/`.yml` bundle in a directory, sorted by file name
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<ProgramBundle>, IntakeError> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| {
                log::debug!("Loading bundle {}", path.display());
                self.load_bundle(path)
            })
            .collect()
    }
}

impl Default for BundleLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBundle {
    pub fn program_id(&self) -> ConceptId {
        ConceptId::from(self.program.id.as_str())
    }

    /// Publish the bundle's program as a new version.
    ///
    /// Predicate text is parsed and the program's draft is claimed before
    /// anything is written, so a bundle that conflicts with an open draft
    /// leaves the catalog untouched. Questions whose definition changed get
    /// a new revision. A draft that fails to publish is discarded.
    pub async fn install(&self, graph: &VersionGraph) -> Result<Arc<ProgramVersion>, IntakeError> {
        let parsed = self
            .program
            .blocks
            .iter()
            .map(|block| parse_predicates(block).map(|predicates| (block, predicates)))
            .collect::<Result<Vec<_>, IntakeError>>()?;

        let program = self.program_id();
        graph.create_draft(program.clone()).await?;

        let published = match self.stage(graph, &program, parsed).await {
            Ok(()) => graph.publish(&program).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &published {
            log::error!("Could not install program {}: {}", program, e);
            graph.discard_draft(&program).await?;
        }
        published
    }

    /// Write question revisions and replace the draft's blocks
    async fn stage(
        &self,
        graph: &VersionGraph,
        program: &ConceptId,
        parsed: Vec<(&BlockSpec, ParsedPredicates)>,
    ) -> Result<(), IntakeError> {
        for question in &self.questions {
            let concept = ConceptId::from(question.id.as_str());
            let unchanged = graph.latest_question(&concept).await.is_some_and(|latest| {
                latest.question_type == question.question_type
                    && latest.text == question.text
                    && latest.options == question.options
            });
            if !unchanged {
                let revision = graph
                    .create_question(
                        concept,
                        question.question_type,
                        question.text.clone(),
                        question.options.clone(),
                    )
                    .await;
                log::debug!("Question {} now at revision {}", revision.concept, revision.revision);
            }
        }

        let mut blocks = Vec::with_capacity(parsed.len());
        for (spec, (visibility, eligibility)) in parsed {
            let mut block = Block::new(spec.id.as_str(), spec.name.clone());
            for question in &spec.questions {
                let concept = ConceptId::from(question.as_str());
                let latest = graph
                    .latest_question(&concept)
                    .await
                    .ok_or_else(|| VersionError::UnknownQuestion(concept.clone()))?;
                block = block.with_question(RevisionKey::new(concept, latest.revision));
            }
            block.visibility = visibility;
            block.eligibility = eligibility;
            blocks.push(block);
        }

        let gating = self.program.eligibility_is_gating;
        graph
            .edit_draft(program, move |draft| {
                let existing: Vec<ConceptId> = draft.blocks().iter().map(|b| b.id.clone()).collect();
                for id in &existing {
                    draft.remove_block(id)?;
                }
                for block in blocks {
                    draft.add_block(block)?;
                }
                draft.set_eligibility_gating(gating);
                Ok(())
            })
            .await
    }
}

type ParsedPredicates = (Option<PredicateDefinition>, Option<PredicateExpr>);

fn parse_predicates(block: &BlockSpec) -> Result<ParsedPredicates, IntakeError> {
    let visibility = match &block.visibility {
        Some(spec) => Some(PredicateDefinition {
            action: spec.action,
            root: parse(&spec.predicate)?,
        }),
        None => None,
    };
    let eligibility = block.eligibility.as_deref().map(parse).transpose()?;
    Ok((visibility, eligibility))
}

/// Answers keyed by `question.scalar`, values as an applicant would type them
pub type AnswerFile = BTreeMap<String, String>;

/// Build an answer store from an answer file against one program version.
/// Each answer is attributed to the first block that asks its question.
pub fn answers_from_yaml(
    content: &str,
    version: &ProgramVersion,
    questions: &ProgramQuestions,
) -> Result<AnswerStore, IntakeError> {
    let file: AnswerFile = serde_yaml::from_str(content)?;
    let mut answers = AnswerStore::empty();

    for (path, raw) in file {
        let (question, scalar) = path
            .split_once('.')
            .ok_or_else(|| IntakeError::other(format!("answer key '{}' is not question.scalar", path)))?;
        let question = ConceptId::from(question);
        let scalar = Scalar::parse(scalar)
            .ok_or_else(|| IntakeError::other(format!("unknown scalar in answer key '{}'", path)))?;

        let invalid = |reason: String| ApplicationError::InvalidAnswer {
            question: question.clone(),
            scalar: scalar.to_string(),
            reason,
        };
        let revision = questions.require(&question)?;
        let scalar_type = revision
            .scalar_type(scalar)
            .ok_or_else(|| invalid(format!("{} has no {} field", revision.question_type, scalar)))?;
        let value = ScalarValue::parse_answer(scalar, scalar_type, &raw).map_err(&invalid)?;
        let block = version
            .first_block_asking(&question)
            .map(|b| b.id.clone())
            .ok_or_else(|| invalid("not asked by this program".to_string()))?;

        answers.update(
            AnswerKey::new(question.clone(), scalar),
            Answer::new(value, block, version.version),
        );
    }
    Ok(answers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::program::{VersionSelector, VersionStatus};

    const BUNDLE: &str = r#"
questions:
  - id: name
    type: text
    text: "Your name"
  - id: pets
    type: checkbox
    text: "Which pets do you have?"
    options: [cat, dog]
  - id: size
    type: number
    text: "Household size"

program:
  id: snap
  eligibility_is_gating: true
  blocks:
    - id: about
      name: About you
      questions: [name, pets]
    - id: household
      name: Household
      questions: [size]
      visibility:
        action: HIDE_BLOCK
        predicate: "pets.selections none_of ['dog']"
      eligibility: "size.number <= 4"
"#;

    #[test]
    fn test_parse_bundle() {
        let bundle = BundleLoader::parse_yaml(BUNDLE).unwrap();
        assert_eq!(bundle.questions.len(), 3);
        assert_eq!(bundle.questions[1].question_type, QuestionType::Checkbox);
        assert_eq!(bundle.questions[1].options, vec!["cat", "dog"]);
        assert_eq!(bundle.program.id, "snap");
        assert!(bundle.program.eligibility_is_gating);

        let household = &bundle.program.blocks[1];
        let visibility = household.visibility.as_ref().unwrap();
        assert_eq!(visibility.action, PredicateAction::HideBlock);
        assert_eq!(household.eligibility.as_deref(), Some("size.number <= 4"));
    }

    #[test]
    fn test_parse_minimal_program() {
        let bundle = BundleLoader::parse_yaml("program:\n  id: empty\n").unwrap();
        assert!(bundle.questions.is_empty());
        assert!(bundle.program.blocks.is_empty());
        assert!(!bundle.program.eligibility_is_gating);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = BundleLoader::parse_yaml("program: [").unwrap_err();
        assert!(matches!(err, IntakeError::Yaml(_)));
    }

    #[tokio::test]
    async fn test_install_publishes() {
        let graph = VersionGraph::new();
        let bundle = BundleLoader::parse_yaml(BUNDLE).unwrap();
        let version = bundle.install(&graph).await.unwrap();

        assert_eq!(version.version, 1);
        assert_eq!(version.status, VersionStatus::Active);
        assert!(version.eligibility_is_gating);
        assert_eq!(version.blocks.len(), 2);
        assert!(version.blocks[1].visibility.is_some());
        assert_eq!(
            version.blocks[0].questions,
            vec![RevisionKey::new("name", 1), RevisionKey::new("pets", 1)]
        );
    }

    #[tokio::test]
    async fn test_reinstall_reuses_unchanged_questions() {
        let graph = VersionGraph::new();
        let mut bundle = BundleLoader::parse_yaml(BUNDLE).unwrap();
        bundle.install(&graph).await.unwrap();

        bundle.questions[2].text = "How many people live with you?".to_string();
        bundle.program.blocks.remove(0);
        bundle.program.blocks[0].visibility = None;
        let second = bundle.install(&graph).await.unwrap();

        assert_eq!(second.version, 2);
        assert_eq!(second.blocks.len(), 1);
        assert_eq!(second.blocks[0].questions, vec![RevisionKey::new("size", 2)]);

        let first = graph
            .get_version(&bundle.program_id(), VersionSelector::Version(1))
            .await
            .unwrap();
        assert_eq!(first.status, VersionStatus::Obsolete);
        assert_eq!(first.blocks.len(), 2);
    }

    #[tokio::test]
    async fn test_bad_predicate_creates_no_draft() {
        let graph = VersionGraph::new();
        let mut bundle = BundleLoader::parse_yaml(BUNDLE).unwrap();
        bundle.program.blocks[1].eligibility = Some("size.number <=".to_string());

        let err = bundle.install(&graph).await.unwrap_err();
        assert!(matches!(err, IntakeError::Parse(_)));
        assert!(graph.draft(&bundle.program_id()).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_program_discards_draft() {
        let graph = VersionGraph::new();
        let mut bundle = BundleLoader::parse_yaml(BUNDLE).unwrap();
        // Visibility may only look at earlier blocks
        bundle.program.blocks[0].visibility = Some(VisibilitySpec {
            action: PredicateAction::ShowBlock,
            predicate: "size.number > 1".to_string(),
        });

        let err = bundle.install(&graph).await.unwrap_err();
        assert!(matches!(err, IntakeError::Configuration(_)));
        assert!(graph.draft(&bundle.program_id()).await.is_err());
        assert!(graph.active(&bundle.program_id()).await.is_err());
    }

    #[tokio::test]
    async fn test_answers_from_yaml() {
        let graph = VersionGraph::new();
        let bundle = BundleLoader::parse_yaml(BUNDLE).unwrap();
        let version = bundle.install(&graph).await.unwrap();
        let questions = graph.questions_for(&version).await.unwrap();

        let answers = answers_from_yaml(
            "name.text: Ada\npets.selections: \"dog, cat\"\nsize.number: \"3\"\n",
            &version,
            &questions,
        )
        .unwrap();
        assert_eq!(answers.len(), 3);
        let size = answers.get(&ConceptId::from("size"), Scalar::Number).unwrap();
        assert_eq!(size.value, ScalarValue::Long(3));
        assert_eq!(size.block.as_str(), "household");

        let err = answers_from_yaml("size.number: many\n", &version, &questions).unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Application(ApplicationError::InvalidAnswer { .. })
        ));
    }

    #[tokio::test]
    async fn test_shipped_program_takes_income_in_dollars() {
        use crate::engine::predicate::EvalContext;
        use crate::intake::application::eligibility_status;
        use chrono::NaiveDate;

        let graph = VersionGraph::new();
        let bundle =
            BundleLoader::parse_yaml(include_str!("../../programs/utility-assistance.yaml")).unwrap();
        let version = bundle.install(&graph).await.unwrap();
        let questions = graph.questions_for(&version).await.unwrap();
        let ctx = EvalContext::at(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());

        let file = |income: &str| {
            format!(
                "applicant_dob.date: \"1990-01-01\"\nhousehold_size.number: \"2\"\nmonthly_income.currency_cents: \"{}\"\n",
                income
            )
        };

        let answers = answers_from_yaml(&file("2500.00"), &version, &questions).unwrap();
        let income = answers
            .get(&ConceptId::from("monthly_income"), Scalar::CurrencyCents)
            .unwrap();
        assert_eq!(income.value, ScalarValue::Long(250000));
        assert!(eligibility_status(&version, &answers, &questions, &ctx).unwrap().eligible);

        let answers = answers_from_yaml(&file("$2,500.01"), &version, &questions).unwrap();
        assert!(!eligibility_status(&version, &answers, &questions, &ctx).unwrap().eligible);
    }
}
