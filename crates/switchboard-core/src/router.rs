//! Request router
//!
//! Decides how many and which agents a request needs:
//! 1. explicit mentions (`@github`, "using the jira agent") win outright
//! 2. knowledge-base vocabulary goes DIRECT to the retrieval agent
//! 3. otherwise agents are implicated by their declared skills and names
//!
//! One implicated agent is `DIRECT`, several are `PARALLEL`. Dependency
//! language ("then", "based on") or nothing implicated makes it `COMPLEX`.

use crate::error::{Error, Result};
use crate::registry::{normalize_phrase, AgentDescriptor};
use crate::types::{RoutingBasis, RoutingDecision, RoutingKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use switchboard_llm::LanguageModel;
use tracing::{debug, instrument, warn};

static MENTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@([A-Za-z0-9][A-Za-z0-9_-]*)").expect("MENTION_REGEX is a valid regex pattern")
});

static AGENT_PHRASE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:using|use|via|ask)\s+(?:the\s+)?([a-z0-9][a-z0-9 ,_-]*?)\s+agents?\b")
        .expect("AGENT_PHRASE_REGEX is a valid regex pattern")
});

/// How equally plausible agents are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Prefer a declared skill whose exact text appears in the request,
    /// then the earliest registered agent
    #[default]
    SkillExactThenRegistration,
    /// Earliest registered agent
    RegistrationOrder,
}

fn default_knowledge_base_terms() -> Vec<String> {
    [
        "knowledge base",
        "kb",
        "documentation",
        "docs",
        "wiki",
        "runbook",
        "confluence",
        "internal document",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_retrieval_skills() -> Vec<String> {
    ["retrieval", "knowledge base", "document search", "rag"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_dependency_phrases() -> Vec<String> {
    [
        "then",
        "after that",
        "afterwards",
        "based on",
        "once that",
        "using the result",
        "using the output",
        "followed by",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_use_model() -> bool {
    true
}

/// Router configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Vocabulary that marks a knowledge-base question
    #[serde(default = "default_knowledge_base_terms")]
    pub knowledge_base_terms: Vec<String>,
    /// Skills that mark an agent as the retrieval agent
    #[serde(default = "default_retrieval_skills")]
    pub retrieval_skills: Vec<String>,
    /// Phrases that chain dependent steps
    #[serde(default = "default_dependency_phrases")]
    pub dependency_phrases: Vec<String>,
    /// Tie-break between agents matched by identical evidence
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Ask the language model when nothing matched
    #[serde(default = "default_use_model")]
    pub use_model: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            knowledge_base_terms: default_knowledge_base_terms(),
            retrieval_skills: default_retrieval_skills(),
            dependency_phrases: default_dependency_phrases(),
            tie_break: TieBreak::default(),
            use_model: default_use_model(),
        }
    }
}

/// Lowercased, stemmed word tokens.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| stem(&w.to_lowercase()))
        .collect()
}

fn stem(word: &str) -> String {
    match word.strip_suffix('s') {
        Some(base) if word.len() > 3 && !base.ends_with('s') => base.to_string(),
        _ => word.to_string(),
    }
}

/// Word position of the first whole-word occurrence of `phrase`.
fn find_phrase(haystack: &[String], phrase: &[String]) -> Option<usize> {
    if phrase.is_empty() || phrase.len() > haystack.len() {
        return None;
    }
    haystack.windows(phrase.len()).position(|w| w == phrase)
}

/// Why an agent was implicated.
#[derive(Debug)]
struct Candidate {
    slot: usize,
    evidence: BTreeSet<String>,
    exact: bool,
    first_pos: usize,
}

/// Routes requests to agents.
#[derive(Debug, Clone, Default)]
pub struct Router {
    config: RouterConfig,
}

impl Router {
    /// Create a router
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Router configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Decide a routing strategy without consulting a language model.
    #[instrument(skip(self, text, agents), fields(agents = agents.len()))]
    pub fn decide(&self, text: &str, agents: &[AgentDescriptor]) -> Result<RoutingDecision> {
        if agents.is_empty() {
            return Err(Error::NoAgentsAvailable);
        }

        let tokens = words(text);
        let dependency = self
            .config
            .dependency_phrases
            .iter()
            .find(|p| find_phrase(&tokens, &words(p)).is_some());

        let mentioned = explicit_mentions(text, agents);
        if !mentioned.is_empty() {
            let picked: Vec<AgentDescriptor> =
                mentioned.iter().map(|&i| agents[i].clone()).collect();
            let names = join_names(&picked);
            let decision = match dependency {
                Some(phrase) => RoutingDecision::new(
                    RoutingKind::Complex,
                    picked,
                    RoutingBasis::Dependency,
                    format!("Explicitly asked for {names} with dependent steps (\"{phrase}\")"),
                ),
                _ => RoutingDecision::new(
                    RoutingKind::Parallel,
                    picked,
                    RoutingBasis::ExplicitMention,
                    format!("Explicitly asked for {names}"),
                ),
            };
            debug!(kind = %decision.kind, agents = ?decision.agent_names(), "Routed by mention");
            return Ok(decision);
        }

        if dependency.is_none() && self.mentions_knowledge_base(&tokens) {
            if let Some(slot) = self.retrieval_agent(text, agents) {
                let agent = agents[slot].clone();
                let rationale = format!("Knowledge-base question for {}", agent.name);
                return Ok(RoutingDecision::new(
                    RoutingKind::Direct,
                    vec![agent],
                    RoutingBasis::KnowledgeBase,
                    rationale,
                ));
            }
        }

        let mut candidates = self.implicated(text, &tokens, agents);
        let decision = match (candidates.len(), dependency) {
            (0, _) => RoutingDecision::new(
                RoutingKind::Complex,
                agents.to_vec(),
                RoutingBasis::Ambiguous,
                "No agent matched confidently",
            ),
            (_, Some(phrase)) => {
                candidates.sort_by_key(|c| (c.first_pos, c.slot));
                let picked: Vec<AgentDescriptor> =
                    candidates.iter().map(|c| agents[c.slot].clone()).collect();
                let rationale = format!(
                    "Dependent steps (\"{}\") across {}",
                    phrase,
                    join_names(&picked)
                );
                RoutingDecision::new(
                    RoutingKind::Complex,
                    picked,
                    RoutingBasis::Dependency,
                    rationale,
                )
            }
            (_, None) => {
                let picked: Vec<AgentDescriptor> =
                    candidates.iter().map(|c| agents[c.slot].clone()).collect();
                let rationale = format!("Skills matched {}", join_names(&picked));
                RoutingDecision::new(
                    RoutingKind::Parallel,
                    picked,
                    RoutingBasis::SkillMatch,
                    rationale,
                )
            }
        };

        debug!(kind = %decision.kind, agents = ?decision.agent_names(), "Routed");
        Ok(decision)
    }

    /// Decide, asking `model` to pick agents when nothing matched.
    ///
    /// Model failures and unusable answers keep the rule-based decision.
    pub async fn decide_with_model(
        &self,
        text: &str,
        agents: &[AgentDescriptor],
        model: &dyn LanguageModel,
    ) -> Result<RoutingDecision> {
        let decision = self.decide(text, agents)?;
        if !self.config.use_model || decision.basis != RoutingBasis::Ambiguous {
            return Ok(decision);
        }

        let answer = match model.generate(&classification_prompt(text, agents)).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Routing model failed, keeping rule-based decision");
                return Ok(decision);
            }
        };

        let picked = parse_model_choice(&answer, agents);
        if picked.is_empty() {
            debug!(answer = %answer.trim(), "Routing model picked no known agent");
            return Ok(decision);
        }

        let picked: Vec<AgentDescriptor> = picked.into_iter().map(|i| agents[i].clone()).collect();
        let rationale = format!("Language model picked {}", join_names(&picked));
        Ok(RoutingDecision::new(
            RoutingKind::Parallel,
            picked,
            RoutingBasis::Model,
            rationale,
        ))
    }

    fn mentions_knowledge_base(&self, tokens: &[String]) -> bool {
        self.config
            .knowledge_base_terms
            .iter()
            .any(|term| find_phrase(tokens, &words(term)).is_some())
    }

    fn retrieval_agent(&self, text: &str, agents: &[AgentDescriptor]) -> Option<usize> {
        let retrieval: Vec<Vec<String>> = self
            .config
            .retrieval_skills
            .iter()
            .map(|s| words(s))
            .collect();
        let lowered = text.to_lowercase();

        let matches: Vec<(usize, bool)> = agents
            .iter()
            .enumerate()
            .filter_map(|(slot, agent)| {
                let skills: Vec<&String> = agent
                    .declared_skills
                    .iter()
                    .filter(|skill| {
                        let skill_words = words(skill);
                        retrieval
                            .iter()
                            .any(|r| find_phrase(&skill_words, r).is_some())
                    })
                    .collect();
                if skills.is_empty() {
                    return None;
                }
                let exact = skills
                    .iter()
                    .any(|s| lowered.contains(&s.trim().to_lowercase()));
                Some((slot, exact))
            })
            .collect();

        self.break_tie(&matches)
    }

    fn implicated(
        &self,
        text: &str,
        tokens: &[String],
        agents: &[AgentDescriptor],
    ) -> Vec<Candidate> {
        let lowered = text.to_lowercase();
        let matched: Vec<Candidate> = agents
            .iter()
            .enumerate()
            .filter_map(|(slot, agent)| {
                let mut evidence = BTreeSet::new();
                let mut exact = false;
                let mut first_pos = usize::MAX;

                for skill in &agent.declared_skills {
                    let phrase = words(skill);
                    if let Some(pos) = find_phrase(tokens, &phrase) {
                        evidence.insert(phrase.join(" "));
                        first_pos = first_pos.min(pos);
                        exact |= lowered.contains(&skill.trim().to_lowercase());
                    }
                }
                if let Some(pos) = find_phrase(tokens, &words(&agent.name)) {
                    evidence.insert(format!("name:{}", agent.normalized_name()));
                    first_pos = first_pos.min(pos);
                }

                (!evidence.is_empty()).then_some(Candidate {
                    slot,
                    evidence,
                    exact,
                    first_pos,
                })
            })
            .collect();

        // Agents implicated by exactly the same evidence are one choice.
        let mut groups: HashMap<&BTreeSet<String>, Vec<&Candidate>> = HashMap::new();
        for candidate in &matched {
            groups.entry(&candidate.evidence).or_default().push(candidate);
        }
        let winners: BTreeSet<usize> = groups
            .values()
            .filter_map(|group| {
                let options: Vec<(usize, bool)> = group.iter().map(|c| (c.slot, c.exact)).collect();
                if options.len() > 1 {
                    debug!(options = ?options, "Breaking tie between equally matched agents");
                }
                self.break_tie(&options)
            })
            .collect();

        matched
            .into_iter()
            .filter(|c| winners.contains(&c.slot))
            .collect()
    }

    /// Pick one of `(slot, exact_skill_match)` options.
    fn break_tie(&self, options: &[(usize, bool)]) -> Option<usize> {
        match self.config.tie_break {
            TieBreak::SkillExactThenRegistration => options
                .iter()
                .min_by_key(|(slot, exact)| (!exact, *slot))
                .map(|(slot, _)| *slot),
            TieBreak::RegistrationOrder => options.iter().map(|(slot, _)| *slot).min(),
        }
    }
}

/// Agents named explicitly, in registration order.
fn explicit_mentions(text: &str, agents: &[AgentDescriptor]) -> Vec<usize> {
    let mut names: Vec<String> = MENTION_REGEX
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| normalize_phrase(m.as_str()))
        .collect();

    for caps in AGENT_PHRASE_REGEX.captures_iter(text) {
        if let Some(list) = caps.get(1) {
            names.extend(
                list.as_str()
                    .split(',')
                    .flat_map(|part| part.split(" and "))
                    .map(|part| normalize_phrase(part.trim_start_matches("and ")))
                    .filter(|n| !n.is_empty()),
            );
        }
    }

    agents
        .iter()
        .enumerate()
        .filter(|(_, a)| names.contains(&a.normalized_name()))
        .map(|(slot, _)| slot)
        .collect()
}

fn join_names(agents: &[AgentDescriptor]) -> String {
    agents
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn classification_prompt(text: &str, agents: &[AgentDescriptor]) -> String {
    let mut prompt = String::from(
        "Pick the specialist agents needed to answer the request below.\n\
         Reply with a comma-separated list of agent names, or NONE.\n\nAgents:\n",
    );
    for agent in agents {
        prompt.push_str(&format!(
            "- {}: {} (skills: {})\n",
            agent.name,
            agent.description,
            agent.declared_skills.join(", ")
        ));
    }
    prompt.push_str(&format!("\nRequest:\n{text}\n"));
    prompt
}

/// Registered agents named in a model answer, in registration order.
fn parse_model_choice(answer: &str, agents: &[AgentDescriptor]) -> Vec<usize> {
    let named: Vec<String> = answer
        .split([',', '\n'])
        .map(|part| normalize_phrase(part.trim().trim_start_matches('-')))
        .filter(|n| !n.is_empty() && n != "none")
        .collect();
    agents
        .iter()
        .enumerate()
        .filter(|(_, a)| named.contains(&a.normalized_name()))
        .map(|(slot, _)| slot)
        .collect()
}
