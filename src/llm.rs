//! Ollama chat adapter for script generation, patch generation and image
//! prompt enhancement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collab::{PatchGenerator, PromptEnhancer, ScriptGenerator};
use crate::config::LlmConfig;
use crate::error::{ReelError, ReelResult};
use crate::spec::{Motion, SceneSpec};

const PATCH_SYSTEM_PROMPT: &str = r#"You are a YAML PATCH GENERATOR for a video pipeline.

You will receive:
1) A YAML video specification (video.yaml)
2) User feedback in natural language

Your job:
- Produce a SMALL YAML PATCH that edits the spec according to the feedback.
- Output YAML ONLY. No commentary, no markdown, no code fences.

HARD RULES (MUST FOLLOW):
- Output must be valid YAML.
- Top-level key must be exactly: scenes
- Only modify scenes that the feedback refers to.
- Use scene IDs exactly as provided (e.g., s1, s2, s3...).
- Do NOT invent new fields. Do NOT invent new scene IDs.
- Do NOT output null anywhere. If a field is unchanged, OMIT it completely.
- Prefer relative duration changes (e.g., +1.5 or -1.0). Do NOT output absolute durations.
- For visuals: NEVER output 'prompt'. Only output 'prompt_adjustment' when needed.
- For text edits: 'text' must be the final replacement subtitle line, not an instruction.

OUTPUT SCHEMA (EXACT):
scenes:
  <scene_id>:
    duration: <+float or -float>
    text: "<final rewritten subtitle text>"
    visual:
      prompt_adjustment: "<text to append>"
      motion: "<MOTIONS>"

If nothing needs to change, output exactly:
scenes: {}
"#;

const SCRIPT_SYSTEM_PROMPT: &str = r#"You convert a short video idea into a video.yaml file for an automated short-form video pipeline. Output ONLY valid YAML, no explanations, following this schema:

global:
  aspect_ratio: '9:16'
  title: '<short, catchy video title>'
  description: '<brief video description, 1-2 sentences>'
scenes:
  - id: 's1'
    duration: <float>
    text: '<narration line, single line>'
    visual:
      prompt: '<image prompt, single line>'
      motion: '<MOTIONS>'

Rules:
- Narration is a single monologue, no dialogue.
- 60 seconds total unless specified; each scene at most 7 seconds; at least 8 scenes.
- Scene durations vary between 3 and 7 seconds.
- Visual prompts describe concrete settings, subjects and lighting; never text or split screens.
- Motions: mostly slow_zoom; occasional pan_left/pan_right.
- Scene text and visual prompt are each a single line.
- Escape a single quote inside a quoted value by doubling it ('').
"#;

const ENHANCE_SYSTEM_PROMPT: &str = r#"You are a visual specification engine for Stable Diffusion.

Your job is NOT to rewrite text lightly.
Your job is to expand a short BASE_PROMPT into a highly visual, shot-specific, generation-friendly prompt.

CRITICAL HARD LIMIT:
- Output must be ONE single line
- Output must be UNDER 55 WORDS total
- If you exceed 55 words, you failed

Hard requirement:
- Your output must be a NON-TRIVIAL enhancement.
- It must add concrete visual detail that was not explicitly present.
- If your output is too similar to BASE_PROMPT, you failed.

You will receive:
- BASE_PROMPT: what the image should convey
- GLOBAL_STYLE: optional aesthetic direction
- ASPECT_RATIO: typically 9:16 vertical

You MUST preserve:
- the core subject(s)
- the core concept/metaphor/message
- the intent/mood

You MUST add explicit details (as applicable):
- Subject form + surface texture/materials
- Background environment + atmosphere
- Composition: close/medium/wide, foreground/midground/background separation
- Camera angle + lens feel (wide/tele)
- Lighting: key light direction, rim light, volumetric light, contrast, color temperature
- Color palette: 3-6 colors (dominant + accents)
- Mood via visuals (not abstract "mystical vibes")
- Realism/stylization level

You MUST NOT:
- Add unrelated main subjects
- Add readable text/logos/watermarks/UI

OUTPUT RULES (STRICT):
- Output exactly ONE single-line prompt
- No lists, no markdown, no JSON, no quotes, no explanation
- Explicitly mention no duplicate objects and no splitscreen in the final output.
"#;

/// Replies shorter than this are treated as junk.
const MIN_ENHANCED_LEN: usize = 8;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Default, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// Client for a local Ollama server's `/api/chat`.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    cfg: LlmConfig,
}

impl OllamaClient {
    pub fn new(cfg: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cfg,
        }
    }

    fn request<'a>(&'a self, system: &'a str, user: &'a str) -> ChatRequest<'a> {
        let options = ChatOptions {
            seed: self.cfg.seed,
            temperature: self.cfg.temperature,
        };
        self.request_with(system, user, options)
    }

    fn request_with<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
        options: ChatOptions,
    ) -> ChatRequest<'a> {
        let has_options = options.seed.is_some() || options.temperature.is_some();
        ChatRequest {
            model: &self.cfg.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            stream: false,
            options: has_options.then_some(options),
        }
    }

    /// One non-streaming chat turn; returns the assistant message text.
    pub async fn chat(&self, system: &str, user: &str) -> ReelResult<String> {
        self.send(&self.request(system, user)).await
    }

    async fn send(&self, request: &ChatRequest<'_>) -> ReelResult<String> {
        let url = format!("{}/api/chat", self.cfg.base_url.trim_end_matches('/'));
        debug!("POST {} (model {})", url, self.cfg.model);
        let res: ChatResponse = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(res.message.content)
    }
}

/// Drops a surrounding markdown code fence, if the model added one anyway.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn enhance_user_prompt(prompt: &str, style: &str, aspect_ratio: &str) -> String {
    let style = match style.trim() {
        "" => "(none)",
        s => s,
    };
    let aspect_ratio = match aspect_ratio.trim() {
        "" => "9:16",
        a => a,
    };
    format!(
        "ASPECT_RATIO: {aspect_ratio}\nGLOBAL_STYLE: {style}\n\nBASE_PROMPT:\n{prompt}\n\n\
         Return a significantly more detailed Stable Diffusion prompt.\n\
         You MUST add: camera framing, lens look, lighting direction, color palette, and composition depth.\n\
         Return ONE line under 55 words."
    )
}

/// Collapses the reply onto one line; junk replies give back `original`.
fn clean_enhanced(reply: &str, original: &str) -> String {
    let line = reply.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() < MIN_ENHANCED_LEN {
        return original.to_string();
    }
    line
}

fn with_motions(prompt: &str) -> String {
    prompt.replace("<MOTIONS>", &Motion::ALL.map(Motion::as_str).join("|"))
}

#[async_trait]
impl PatchGenerator for OllamaClient {
    async fn generate_patch(
        &self,
        spec: &SceneSpec,
        feedback: &str,
    ) -> ReelResult<serde_yaml::Value> {
        let spec_yaml = spec.to_yaml_string()?;
        let user = format!(
            "\nVIDEO SPEC:\n{spec_yaml}\n\nUSER FEEDBACK:\n{}\n\nOUTPUT:\n(YAML PATCH ONLY)\n",
            feedback.trim()
        );
        info!("Requesting patch from {}", self.cfg.model);
        let reply = self.chat(&with_motions(PATCH_SYSTEM_PROMPT), &user).await?;
        let patch = serde_yaml::from_str(strip_code_fence(&reply)).map_err(|e| {
            ReelError::schema(None, format!("patch generator reply is not valid YAML: {e}"))
        })?;
        Ok(patch)
    }
}

#[async_trait]
impl ScriptGenerator for OllamaClient {
    async fn generate_script(&self, brief: &str) -> ReelResult<SceneSpec> {
        if brief.trim().is_empty() {
            return Err(ReelError::empty_input("script", "video brief is empty"));
        }
        let user = format!(
            "\nGenerate a video.yaml file based on the following user video idea or concept:\n{}\n",
            brief.trim()
        );
        info!("Requesting script from {}", self.cfg.model);
        let reply = self.chat(&with_motions(SCRIPT_SYSTEM_PROMPT), &user).await?;
        let ascii: String = reply.chars().filter(char::is_ascii).collect();
        SceneSpec::from_yaml_str(strip_code_fence(&ascii))
    }
}

#[async_trait]
impl PromptEnhancer for OllamaClient {
    async fn enhance(&self, prompt: &str, style: &str, aspect_ratio: &str, seed: u64) -> String {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return String::new();
        }
        let user = enhance_user_prompt(prompt, style, aspect_ratio);
        let options = ChatOptions {
            seed: Some(seed),
            temperature: Some(self.cfg.enhance_temperature),
        };
        match self
            .send(&self.request_with(ENHANCE_SYSTEM_PROMPT, &user, options))
            .await
        {
            Ok(reply) => clean_enhanced(&reply, prompt),
            Err(e) => {
                warn!("Prompt enhancement failed, using original prompt: {}", e);
                prompt.to_string()
            }
        }
    }
}
