use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::{GenerationError, ValidationError};
use crate::openai::OpenAiClient;

const MIN_WORDS: usize = 10;
const MAX_WORDS: usize = 500;
const MAX_CHARS: usize = 3000;
const DEFAULT_SCORE: u8 = 5;
const MIN_ACCEPTED_SCORE: u8 = 6;
const DEFAULT_STYLE: &str = "engaging";
const DEFAULT_IMAGE_STYLE: &str = "professional business";

const IDEA_PROMPT: &str = "You are an expert LinkedIn strategist for a personal brand focused on \
economics, data analytics, and small economies.

Generate 1 specific content idea or post topic that:
- Starts with a strong, one-sentence hook
- Solves or reflects on a common problem in data, development, or leadership
- Includes practical insights or relatable anecdotes
- Is relevant to professionals in economics, analytics, or policymaking

Return ONLY the topic/title of the content idea, nothing else.";

const POST_GUIDELINES: &str = "Create a professional LinkedIn post that:
- Is engaging and thought-provoking
- Uses a professional yet conversational tone
- Includes relevant hashtags
- Encourages engagement
- Is between 100-300 words
- Has a clear call-to-action";

const FALLBACK_IDEAS: &[&str] = &[
    "The hidden costs of ignoring data quality in small business decisions",
    "How microeconomics principles can transform your data strategy",
    "Why small economies are the perfect testing ground for analytics innovation",
    "The surprising connection between behavioral economics and data visualization",
    "How to apply econometric principles to your business analytics",
];

/// Word and character counts of an accepted post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentStats {
    pub word_count: usize,
    pub char_count: usize,
}

/// Checks a post against LinkedIn's length limits.
pub fn validate_post_content(content: &str) -> Result<ContentStats, ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let word_count = content.split_whitespace().count();
    let char_count = content.chars().count();
    if word_count < MIN_WORDS {
        return Err(ValidationError::TooShort { words: word_count });
    }
    if word_count > MAX_WORDS {
        return Err(ValidationError::TooLong { words: word_count });
    }
    if char_count > MAX_CHARS {
        return Err(ValidationError::TooManyChars { chars: char_count });
    }
    Ok(ContentStats {
        word_count,
        char_count,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdeaScore {
    pub score: u8,
    pub valid: bool,
}

/// Reads a `Score: X/10` verdict. Unparseable feedback scores 5.
pub fn parse_idea_score(feedback: &str) -> IdeaScore {
    let score = feedback
        .split_once("Score:")
        .and_then(|(_, rest)| rest.split('-').next())
        .and_then(|fragment| fragment.trim().split('/').next())
        .and_then(|value| value.trim().parse::<u8>().ok())
        .unwrap_or(DEFAULT_SCORE);
    IdeaScore {
        score,
        valid: score >= MIN_ACCEPTED_SCORE,
    }
}

fn clean_idea(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string()
}

fn fallback_idea() -> &'static str {
    let index = Utc::now().timestamp_subsec_nanos() as usize % FALLBACK_IDEAS.len();
    FALLBACK_IDEAS[index]
}

/// Prompt construction on top of the generation client.
#[derive(Clone)]
pub struct ContentWriter {
    client: OpenAiClient,
}

impl ContentWriter {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &OpenAiClient {
        &self.client
    }

    /// A fresh post topic; a canned topic when the provider is unavailable.
    pub async fn generate_idea(&self) -> String {
        match self.client.generate_text(IDEA_PROMPT).await {
            Ok(raw) => {
                let idea = clean_idea(&raw);
                if !idea.is_empty() {
                    info!("content idea generated");
                    return idea;
                }
                warn!("idea generation returned an empty topic, using fallback");
            }
            Err(err) => warn!("idea generation failed, using fallback: {}", err),
        }
        fallback_idea().to_string()
    }

    pub async fn score_idea(&self, idea: &str) -> Result<IdeaScore, GenerationError> {
        let prompt = format!(
            "Evaluate this LinkedIn content idea for relevance, professional appropriateness, \
engagement potential, originality and practical value.\n\nIdea: {idea}\n\n\
Provide a score (1-10) and brief feedback. Return in format: \"Score: X/10 - Feedback: [brief feedback]\""
        );
        let feedback = self.client.generate_text(&prompt).await?;
        Ok(parse_idea_score(&feedback))
    }

    pub async fn generate_post(
        &self,
        topic: &str,
        style: Option<&str>,
    ) -> Result<String, GenerationError> {
        let prompt = format!(
            "{POST_GUIDELINES}\n\nTopic: {topic}\nStyle: {}\nTone: professional\n\n\
Generate a LinkedIn post about the given topic that follows the style and tone requirements. \
Make it authentic, valuable, and engaging for a professional audience.",
            style.unwrap_or(DEFAULT_STYLE)
        );
        let post = self.client.generate_text(&prompt).await?;
        info!("post content generated for topic: {}", topic);
        Ok(post)
    }

    /// Asks the text model to condense the image brief; falls back to the
    /// brief itself.
    pub async fn create_image_prompt(&self, summary: &str, style: Option<&str>) -> String {
        let brief = format!(
            "Create a professional, LinkedIn-appropriate image for a post about: {summary}\n\
Style: {}\n\
Requirements: clean design suitable for business social media, relevant visual metaphors, \
corporate-friendly colors, no text overlays.",
            style.unwrap_or(DEFAULT_IMAGE_STYLE)
        );
        match self
            .client
            .generate_text(&format!(
                "Convert this into a concise, effective DALL-E prompt (max 400 chars): {brief}"
            ))
            .await
        {
            Ok(refined) => refined,
            Err(err) => {
                warn!("image prompt refinement failed, using brief: {}", err);
                brief
            }
        }
    }
}
