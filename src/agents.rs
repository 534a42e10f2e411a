//! # Sample Agents
//!
//! Deterministic [`ChatAgent`] and [`MagenticManager`] implementations used
//! by the sample workflows. None of them call a model provider, so every
//! sample runs offline and reproducibly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use workflow_engine::magentic::{MagenticContext, ORCHESTRATOR_ID};
use workflow_engine::{
    AgentError, AgentRunResponse, ChatAgent, ChatMessage, MagenticManager, MessagePayload, ProgressLedger, Role,
};

// =============================================================================
// SPAM DETECTION
// =============================================================================

/// Classification the spam detector replies with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// `Spam`, `NotSpam` or `Uncertain`
    pub spam_decision: String,
    pub reason: String,
    pub email_content: String,
}

impl MessagePayload for DetectionResult {
    const KIND: &'static str = "detection_result";
}

/// Reply drafted by the email assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailResponse {
    pub response: String,
}

const SPAM_SIGNALS: &[&str] = &[
    "winner",
    "free money",
    "act now",
    "claim your prize",
    "wire transfer",
    "lottery",
    "click here",
    "limited time",
];

const WORK_SIGNALS: &[&str] = &["meeting", "agenda", "project", "deadline", "review", "schedule", "invoice"];

/// Keyword scoring spam classifier
///
/// Two or more spam signals mark the email as spam. A single signal, or no
/// signal of either kind, is uncertain.
pub struct SpamDetectorAgent;

impl SpamDetectorAgent {
    pub fn classify(email: &str) -> DetectionResult {
        let lower = email.to_lowercase();
        let spam: Vec<&str> = SPAM_SIGNALS.iter().copied().filter(|s| lower.contains(s)).collect();
        let work: Vec<&str> = WORK_SIGNALS.iter().copied().filter(|s| lower.contains(s)).collect();

        let (decision, reason) = if spam.len() >= 2 {
            ("Spam", format!("contains spam phrases: {}", spam.join(", ")))
        } else if spam.is_empty() && !work.is_empty() {
            ("NotSpam", format!("work related: {}", work.join(", ")))
        } else if spam.len() == 1 {
            ("Uncertain", format!("one suspicious phrase: {}", spam[0]))
        } else {
            ("Uncertain", "no clear signal either way".to_string())
        };

        DetectionResult {
            spam_decision: decision.to_string(),
            reason,
            email_content: email.to_string(),
        }
    }
}

#[async_trait]
impl ChatAgent for SpamDetectorAgent {
    fn name(&self) -> &str {
        "spam_detector"
    }

    fn description(&self) -> &str {
        "Classifies emails as Spam, NotSpam or Uncertain"
    }

    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentRunResponse, AgentError> {
        let email = last_user_text(messages)?;
        let result = Self::classify(email);
        let text = serde_json::to_string(&result).map_err(|e| AgentError::InvalidResponse(e.to_string()))?;
        Ok(AgentRunResponse::new(vec![ChatMessage::assistant(text).with_author(self.name())]))
    }
}

/// Drafts a short acknowledgement for legitimate emails
pub struct EmailAssistantAgent;

#[async_trait]
impl ChatAgent for EmailAssistantAgent {
    fn name(&self) -> &str {
        "email_assistant"
    }

    fn description(&self) -> &str {
        "Drafts professional replies to legitimate emails"
    }

    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentRunResponse, AgentError> {
        let email = last_user_text(messages)?;
        let subject = email
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("your message");

        let reply = EmailResponse {
            response: format!(
                "Hello,\n\nThank you for your email regarding \"{}\". I have noted the details and will follow up shortly.\n\nBest regards",
                subject
            ),
        };
        let text = serde_json::to_string(&reply).map_err(|e| AgentError::InvalidResponse(e.to_string()))?;
        Ok(AgentRunResponse::new(vec![ChatMessage::assistant(text).with_author(self.name())]))
    }
}

fn last_user_text(messages: &[ChatMessage]) -> Result<&str, AgentError> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.text.as_str())
        .ok_or_else(|| AgentError::Request("conversation has no user message".into()))
}

// =============================================================================
// GUESSING GAME
// =============================================================================

/// Agent reply in the guessing game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuessOutput {
    pub guess: i64,
}

/// Binary search guesser
///
/// Keeps no state of its own: the bounds are rebuilt from the conversation,
/// pairing each assistant guess with the user feedback that follows it.
pub struct GuessingAgent {
    low: i64,
    high: i64,
}

impl GuessingAgent {
    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }
}

#[async_trait]
impl ChatAgent for GuessingAgent {
    fn name(&self) -> &str {
        "guessing_agent"
    }

    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentRunResponse, AgentError> {
        let (mut low, mut high) = (self.low, self.high);
        let mut last = None;

        for message in messages {
            match message.role {
                Role::Assistant => {
                    let output: GuessOutput = serde_json::from_str(&message.text)
                        .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;
                    last = Some(output.guess);
                }
                Role::User => {
                    let text = message.text.to_lowercase();
                    match last {
                        Some(guess) if text.contains("higher") => low = guess + 1,
                        Some(guess) if text.contains("lower") => high = guess - 1,
                        _ => {}
                    }
                }
                Role::System => {}
            }
        }

        if low > high {
            return Err(AgentError::Request(format!(
                "feedback is contradictory, no number left between {} and {}",
                self.low, self.high
            )));
        }

        let text = serde_json::to_string(&GuessOutput { guess: (low + high) / 2 })
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;
        Ok(AgentRunResponse::from_text(text))
    }
}

// =============================================================================
// WORLD CUP PANEL
// =============================================================================

/// Pundit with a fixed top three
pub struct PunditAgent {
    name: String,
    focus: String,
    ranking: Vec<String>,
}

impl PunditAgent {
    pub fn new<I, S>(name: impl Into<String>, focus: impl Into<String>, ranking: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            focus: focus.into(),
            ranking: ranking.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ChatAgent for PunditAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.focus
    }

    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentRunResponse, AgentError> {
        last_user_text(messages)?;
        let lines: Vec<String> = self
            .ranking
            .iter()
            .enumerate()
            .map(|(i, team)| format!("{}. {}: strongest on {}", i + 1, team, self.focus))
            .collect();
        Ok(AgentRunResponse::new(vec![
            ChatMessage::assistant(lines.join("\n")).with_author(&self.name)
        ]))
    }
}

/// Split text into rankings, one per run of numbered lines starting at `1.`
///
/// A team name ends at the first `:`, `,` or ` because`.
pub fn parse_rankings(text: &str) -> Vec<Vec<String>> {
    let mut rankings: Vec<Vec<String>> = Vec::new();
    for line in text.lines().map(str::trim) {
        let Some((number, rest)) = line.split_once(". ") else {
            continue;
        };
        let Ok(position) = number.parse::<usize>() else {
            continue;
        };
        let team = rest
            .split([':', ','])
            .next()
            .unwrap_or(rest)
            .split(" because")
            .next()
            .unwrap_or(rest)
            .trim();
        if team.is_empty() {
            continue;
        }
        match rankings.last_mut() {
            Some(current) if position > 1 => current.push(team.to_string()),
            _ => rankings.push(vec![team.to_string()]),
        }
    }
    rankings
}

/// Merges every ranking in the prompt by Borda count
///
/// First place scores three points, third place one. Ties keep the order in
/// which teams first appear.
pub struct ConsensusAgent;

impl ConsensusAgent {
    pub fn tally(rankings: &[Vec<String>]) -> Vec<(String, u32)> {
        let mut scores: Vec<(String, u32)> = Vec::new();
        for ranking in rankings {
            for (i, team) in ranking.iter().take(3).enumerate() {
                let points = 3 - i as u32;
                match scores.iter_mut().find(|(t, _)| t.eq_ignore_ascii_case(team)) {
                    Some((_, score)) => *score += points,
                    None => scores.push((team.clone(), points)),
                }
            }
        }
        // Stable, so equal scores keep first-appearance order
        scores.sort_by(|a, b| b.1.cmp(&a.1));
        scores
    }
}

#[async_trait]
impl ChatAgent for ConsensusAgent {
    fn name(&self) -> &str {
        "consensus"
    }

    fn description(&self) -> &str {
        "Merges several rankings into one"
    }

    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentRunResponse, AgentError> {
        let rankings = parse_rankings(last_user_text(messages)?);
        if rankings.is_empty() {
            return Err(AgentError::Request("prompt holds no numbered ranking".into()));
        }

        let mut lines = vec![format!("Consensus of {} rankings:", rankings.len())];
        for (i, (team, points)) in Self::tally(&rankings).into_iter().take(3).enumerate() {
            lines.push(format!("{}. {} ({} points)", i + 1, team, points));
        }
        Ok(AgentRunResponse::new(vec![
            ChatMessage::assistant(lines.join("\n")).with_author(self.name())
        ]))
    }
}

// =============================================================================
// MAGENTIC TEAM
// =============================================================================

/// Team member that answers from a fixed area of expertise
pub struct ScriptedParticipant {
    name: String,
    description: String,
    focus: String,
}

impl ScriptedParticipant {
    pub fn new(name: impl Into<String>, description: impl Into<String>, focus: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            focus: focus.into(),
        }
    }
}

#[async_trait]
impl ChatAgent for ScriptedParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentRunResponse, AgentError> {
        let instruction = last_user_text(messages)?;
        let text = format!("{} Responding to \"{}\".", self.focus, instruction);
        Ok(AgentRunResponse::new(vec![ChatMessage::assistant(text).with_author(&self.name)]))
    }
}

/// Manager that gives every participant one turn, in team order
///
/// The request counts as satisfied once each participant has replied.
#[derive(Debug, Default)]
pub struct RoundRobinManager;

impl RoundRobinManager {
    fn replied(ctx: &MagenticContext, name: &str) -> bool {
        ctx.chat_history
            .iter()
            .any(|m| m.role == Role::Assistant && m.author_name.as_deref() == Some(name))
    }

    fn steps(ctx: &MagenticContext) -> String {
        ctx.participants
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}. {}: {}", i + 1, p.name, p.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl MagenticManager for RoundRobinManager {
    async fn plan(&self, ctx: &MagenticContext) -> Result<String, AgentError> {
        Ok(format!("Plan for \"{}\":\n{}", ctx.task, Self::steps(ctx)))
    }

    async fn replan(&self, ctx: &MagenticContext) -> Result<String, AgentError> {
        let mut plan = format!("Revised plan for \"{}\":\n{}", ctx.task, Self::steps(ctx));
        if let Some(comments) = &ctx.review_comments {
            plan.push_str(&format!("\nAddressing review: {}", comments));
        }
        Ok(plan)
    }

    async fn progress(&self, ctx: &MagenticContext) -> Result<ProgressLedger, AgentError> {
        let next = ctx.participants.iter().find(|p| !Self::replied(ctx, &p.name));

        Ok(match next {
            Some(participant) => ProgressLedger {
                request_satisfied: false,
                in_loop: false,
                progress_being_made: true,
                next_speaker: participant.name.clone(),
                instruction: format!("Contribute your part to: {}", ctx.task),
                reason: format!("{} has not contributed yet", participant.name),
            },
            None => ProgressLedger {
                request_satisfied: true,
                in_loop: false,
                progress_being_made: true,
                reason: "every participant has contributed".to_string(),
                ..Default::default()
            },
        })
    }

    async fn finalize(&self, ctx: &MagenticContext) -> Result<String, AgentError> {
        let contributions: Vec<String> = ctx
            .chat_history
            .iter()
            .filter(|m| m.role == Role::Assistant && m.author_name.as_deref() != Some(ORCHESTRATOR_ID))
            .map(|m| format!("- {}: {}", m.author_name.as_deref().unwrap_or("unknown"), m.text))
            .collect();

        Ok(format!("Final answer for \"{}\":\n{}", ctx.task, contributions.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_engine::magentic::ParticipantInfo;

    #[test]
    fn test_spam_classification() {
        let spam = SpamDetectorAgent::classify("WINNER! Claim your prize with a wire transfer");
        assert_eq!(spam.spam_decision, "Spam");

        let work = SpamDetectorAgent::classify("Agenda for Monday's project meeting");
        assert_eq!(work.spam_decision, "NotSpam");
        assert!(work.reason.contains("meeting"));

        let unsure = SpamDetectorAgent::classify("Click here to see the photos");
        assert_eq!(unsure.spam_decision, "Uncertain");

        let blank = SpamDetectorAgent::classify("hello");
        assert_eq!(blank.spam_decision, "Uncertain");
        assert_eq!(blank.email_content, "hello");
    }

    #[tokio::test]
    async fn test_spam_detector_replies_with_json() {
        let response = SpamDetectorAgent
            .run(&[ChatMessage::user("project review meeting")])
            .await
            .unwrap();

        let parsed: DetectionResult = serde_json::from_str(&response.text()).unwrap();
        assert_eq!(parsed.spam_decision, "NotSpam");
        assert_eq!(response.messages[0].author_name.as_deref(), Some("spam_detector"));
    }

    #[tokio::test]
    async fn test_email_assistant_uses_first_line() {
        let response = EmailAssistantAgent
            .run(&[ChatMessage::user("\nQuarterly review\nPlease send numbers")])
            .await
            .unwrap();

        let parsed: EmailResponse = serde_json::from_str(&response.text()).unwrap();
        assert!(parsed.response.contains("\"Quarterly review\""));
    }

    #[tokio::test]
    async fn test_guessing_agent_narrows_range() {
        let agent = GuessingAgent::new(1, 10);

        let first = agent.run(&[ChatMessage::user("start")]).await.unwrap();
        assert_eq!(first.text(), r#"{"guess":5}"#);

        let conversation = vec![
            ChatMessage::user("start"),
            ChatMessage::assistant(r#"{"guess":5}"#),
            ChatMessage::user("Feedback: higher"),
        ];
        let second = agent.run(&conversation).await.unwrap();
        assert_eq!(second.text(), r#"{"guess":8}"#);
    }

    #[tokio::test]
    async fn test_guessing_agent_rejects_contradictions() {
        let agent = GuessingAgent::new(1, 2);
        let conversation = vec![
            ChatMessage::user("start"),
            ChatMessage::assistant(r#"{"guess":1}"#),
            ChatMessage::user("lower"),
        ];
        assert!(agent.run(&conversation).await.is_err());
    }

    #[test]
    fn test_parse_rankings() {
        let text = "Expert one:\n1. France: form\n2. Spain, youth\n3. Brazil\n\nMine:\n1. Argentina because Messi\n2. France\n";
        assert_eq!(
            parse_rankings(text),
            vec![
                vec!["France".to_string(), "Spain".to_string(), "Brazil".to_string()],
                vec!["Argentina".to_string(), "France".to_string()],
            ]
        );
        assert!(parse_rankings("no numbers here. at all").is_empty());
    }

    #[test]
    fn test_consensus_tally_breaks_ties_by_first_appearance() {
        let rankings = vec![
            vec!["France".to_string(), "Spain".to_string()],
            vec!["spain".to_string(), "France".to_string()],
        ];
        assert_eq!(
            ConsensusAgent::tally(&rankings),
            vec![("France".to_string(), 5), ("Spain".to_string(), 5)]
        );
    }

    #[tokio::test]
    async fn test_pundit_reply_parses_back() {
        let pundit = PunditAgent::new("form", "recent form", ["France", "Argentina", "Spain"]);
        let response = pundit.run(&[ChatMessage::user("who wins?")]).await.unwrap();

        assert!(response.text().starts_with("1. France: strongest on recent form"));
        assert_eq!(parse_rankings(&response.text()), vec![vec!["France", "Argentina", "Spain"]]);
    }

    #[tokio::test]
    async fn test_consensus_requires_a_ranking() {
        assert!(ConsensusAgent.run(&[ChatMessage::user("nothing to merge")]).await.is_err());
    }

    fn team_context() -> MagenticContext {
        MagenticContext::new(
            "compare energy use",
            vec![
                ParticipantInfo {
                    name: "researcher".into(),
                    description: "Finds facts".into(),
                },
                ParticipantInfo {
                    name: "analyst".into(),
                    description: "Crunches numbers".into(),
                },
            ],
        )
    }

    #[tokio::test]
    async fn test_round_robin_manager_turns() {
        let manager = RoundRobinManager;
        let mut ctx = team_context();

        let plan = manager.plan(&ctx).await.unwrap();
        assert!(plan.contains("1. researcher: Finds facts"));
        assert!(plan.contains("2. analyst: Crunches numbers"));

        let first = manager.progress(&ctx).await.unwrap();
        assert_eq!(first.next_speaker, "researcher");
        assert!(!first.request_satisfied);

        ctx.chat_history.push(ChatMessage::assistant("facts").with_author("researcher"));
        assert_eq!(manager.progress(&ctx).await.unwrap().next_speaker, "analyst");

        ctx.chat_history.push(ChatMessage::assistant("numbers").with_author("analyst"));
        assert!(manager.progress(&ctx).await.unwrap().request_satisfied);

        let answer = manager.finalize(&ctx).await.unwrap();
        assert!(answer.contains("- researcher: facts"));
        assert!(answer.contains("- analyst: numbers"));
    }

    #[tokio::test]
    async fn test_round_robin_replan_mentions_review() {
        let mut ctx = team_context();
        ctx.review_comments = Some("add a budget".into());

        let plan = RoundRobinManager.replan(&ctx).await.unwrap();
        assert!(plan.starts_with("Revised plan"));
        assert!(plan.ends_with("Addressing review: add a budget"));
    }
}
