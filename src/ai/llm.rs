use super::{ChatMessage, ContentPart, ExplanationMode, ImageUrl, ModelInfo};

/// Fixed model for the vision stage. Not user-configurable.
pub const VISION_MODEL: &str = "nvidia/nemotron-nano-12b-v2-vl:free";
pub const DEFAULT_REASONING_MODEL: &str = "deepseek/deepseek-r1-0528:free";
pub const DEFAULT_USER_PROMPT: &str = "Explain this image in detail";

const RULE: &str = "--------------------------------";

const VISION_PROMPT: &str = "You are an image understanding system.\n\
Describe exactly what is shown in the image.\n\
\n\
Output ONLY structured text with:\n\
- What the image represents\n\
- Visible labels or text\n\
- Components or parts\n\
- Flow, steps, or relationships (if any)\n\
\n\
Do NOT explain concepts.\n\
Do NOT add external knowledge.\n\
Be factual and concise.";

pub fn build_vision_messages(image_data_uri: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user_parts(vec![
        ContentPart::Text {
            text: VISION_PROMPT.to_string(),
        },
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image_data_uri.to_string(),
            },
        },
    ])]
}

pub fn build_reasoning_prompt(
    vision_text: &str,
    subject: Option<&str>,
    user_prompt: Option<&str>,
    mode: ExplanationMode,
) -> String {
    let mut prompt = String::from("You are an expert teacher.\n\n");

    prompt.push_str("The following is a description extracted from an image:\n");
    prompt.push_str(RULE);
    prompt.push('\n');
    prompt.push_str(vision_text);
    prompt.push('\n');
    prompt.push_str(RULE);
    prompt.push_str("\n\n");

    let subject = subject.map(str::trim).filter(|s| !s.is_empty());
    prompt.push_str(&format!("Subject (if provided): {}\n", subject.unwrap_or("N/A")));
    prompt.push_str(&format!(
        "Explanation style: {} ({})\n",
        mode.as_str(),
        mode.description()
    ));
    if let Some(request) = user_prompt
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != DEFAULT_USER_PROMPT)
    {
        prompt.push_str(&format!("Student request: {}\n", request));
    }

    prompt.push_str(
        "\nNow:\n\
         1. Explain the concept clearly for a student\n\
         2. Use simple language\n\
         3. Break into logical steps or sections\n\
         4. Add reasoning (why and how)\n\
         5. Make it exam-friendly but easy to understand\n\
         \n\
         Avoid over-complex language.\n\
         Avoid assumptions not supported by the image.\n\
         \n\
         IMPORTANT:\n\
         Return the explanation as clean plain text. Do NOT use markdown. \
         Do NOT use #, *, -, or bullet symbols. Use normal paragraphs and simple numbering like:\n\
         1., 2., 3.",
    );

    prompt
}

pub fn build_follow_up_prompt(vision_text: &str, explanation_so_far: &str, question: &str) -> String {
    let mut prompt = String::from("You are continuing an explanation for a student.\n\n");

    for (heading, body) in [
        ("Context from image understanding:", vision_text),
        ("Previous explanation:", explanation_so_far),
        ("Student follow-up question:", question),
    ] {
        prompt.push_str(heading);
        prompt.push('\n');
        prompt.push_str(RULE);
        prompt.push('\n');
        prompt.push_str(body);
        prompt.push('\n');
        prompt.push_str(RULE);
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "Now answer the student's question clearly, in simple language, without markdown, \
         and in a student-friendly way.\n\n\
         IMPORTANT: Return clean plain text only. Do NOT use markdown characters like #, *, -, or bullets.",
    );

    prompt
}

pub fn available_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo {
            id: DEFAULT_REASONING_MODEL.to_string(),
            label: "DeepSeek R1".to_string(),
            description: "Reasoning-focused model (recommended)".to_string(),
        },
        ModelInfo {
            id: "google/gemma-3-27b-it:free".to_string(),
            label: "Google Gemma 3 27B (it)".to_string(),
            description: "High-quality text generation".to_string(),
        },
    ]
}
