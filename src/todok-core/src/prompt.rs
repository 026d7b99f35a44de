//! Prompt composition.
//!
//! Pure functions turning content selections and transcripts into the text
//! sent to the model. Nothing here touches session state.

use serde::Deserialize;

use crate::bot::Turn;
use crate::config::PromptsConfig;
use crate::content::{Persona, Stance, Topic};
use crate::evaluation::RubricCategory;

/// How the model is instructed to converse.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// Persona-driven opponent that rebuts every user claim.
    #[default]
    Rebuttal,
    /// Relaxed friend-to-friend conversation holding the opposite view.
    Casual,
}

/// Build the system prompt for a rebuttal-style debate opponent.
pub fn build_system_prompt(
    persona: &Persona,
    topic: &Topic,
    ai_stance: Stance,
    guidance: &PromptsConfig,
) -> String {
    let ai_role = topic.role_for(ai_stance);
    let logical = &persona.few_shot[0];
    let illogical = &persona.few_shot[1];

    format!(
        r#"당신은 {ai_role}의 역할로 "{question}"라는 주제로 토론하고 있습니다. 당신의 목표는 사용자가 제시하는 모든 주장에 대해 논리적으로 반박하는 것입니다.
절대로 사용자의 주장에 동의하지 마세요. 대신, 사용자가 제시한 주장에 대해 논리적으로 반박하고, 사용자의 주장이 부적절하다고 판단되는 경우, 사용자의 주장을 논파하세요. 어떤 상황에서도 중립적인 태도를 보여선 안됩니다.
두 문장, 혹은 세 문장 내로 간결하게 답하세요. 더 많은 정보가 필요하다면 사용자에게 질문하세요. 사용자의 주장을 이해하고, 논리적으로 반박하는 것이 중요합니다.
다만 사용자가 "{question}"라는 주제에서 크게 어긋난 이야기를 하고 있다면, 사용자에게 주의를 주고, 주제에 맞는 주장을 하도록 유도하세요.
당신의 성격: 당신은 {char_type} 말투를 사용합니다. {personality} {style}
다음의 예시를 참고하세요. 사용자(논리적) "{logical_user}", 당신 "{logical_bot}" / 사용자(비논리적) "{illogical_user}", 당신 "{illogical_bot}"
이 말투와 예시를 참고하여 대화를 이어가세요.
다음을 인식하세요:
{knowledge}
다음 지침을 따르세요:
{guidelines}"#,
        question = topic.topic,
        char_type = persona.char_type,
        personality = persona.char_info.personality,
        style = persona.char_info.style,
        logical_user = logical.user,
        logical_bot = logical.bot,
        illogical_user = illogical.user,
        illogical_bot = illogical.bot,
        knowledge = guidance.debate_knowledge,
        guidelines = guidance.rebuttal_guidelines,
    )
}

/// Build the system prompt for the casual conversation style.
pub fn build_casual_system_prompt(topic: &Topic, ai_stance: Stance) -> String {
    format!(
        r#"당신은 {role}입니다. "{question}"라는 주제로 친구와 대화를 나누고 있습니다.
다음 지침을 따르세요:
1. 친구와 대화하듯이 편안하고 자연스러운 말투로 대화하세요. 이왕이면 반말로 대화하세요.
2. 전문용어나 복잡한 표현은 피하고, 일상적인 언어를 사용하세요.
3. 상대방의 의견을 존중하면서도 당신의 생각을 솔직하게 표현하세요.
4. 개인적인 경험이나 주변 사례를 들어 설명해도 좋습니다.
5. 필요하다면 농담이나 비유를 사용해 대화를 부드럽게 이어가세요.
6. 상대방의 감정을 고려하면서도 당신의 입장을 명확히 전달하세요."#,
        role = topic.role_for(ai_stance),
        question = topic.topic,
    )
}

/// Select the system prompt for the configured style.
pub fn system_prompt_for(
    style: PromptStyle,
    persona: &Persona,
    topic: &Topic,
    ai_stance: Stance,
    guidance: &PromptsConfig,
) -> String {
    match style {
        PromptStyle::Rebuttal => build_system_prompt(persona, topic, ai_stance, guidance),
        PromptStyle::Casual => build_casual_system_prompt(topic, ai_stance),
    }
}

/// Wrap a user utterance as the next user message.
///
/// The rebuttal style sends the utterance as-is and leaves all behavior to the
/// system prompt.
pub fn build_turn_prompt(user_text: &str, style: PromptStyle, ai_role: &str) -> String {
    match style {
        PromptStyle::Rebuttal => user_text.to_string(),
        PromptStyle::Casual => format!(
            r#"친구가 방금 이렇게 말했어요:
"{user_text}"
{ai_role}에서, 친구와 대화하듯이 자연스럽게 응답해주세요. 다음 요소를 포함해보세요:
1. 친구의 말에 대한 간단한 반응 (공감이나 의견 차이 표현)
2. 당신의 생각을 일상적인 언어로 설명
3. 개인적인 경험이나 들어본 사례 언급 (적절하다면)
4. 친구에게 궁금한 점이나 생각해볼 만한 새로운 관점 제시
친구와 수다 떠는 것처럼 반말로 편하게 대화해주세요."#
        ),
    }
}

/// Build the judge instruction for a finished debate.
pub fn build_evaluation_prompt(turns: &[Turn]) -> String {
    let mut full_chat = Vec::with_capacity(turns.len() * 2);
    let mut user_messages = Vec::with_capacity(turns.len());

    for turn in turns {
        full_chat.push(format!("User: {}", turn.user));
        user_messages.push(turn.user.as_str());
        if !turn.ai.is_empty() {
            full_chat.push(format!("AI: {}", turn.ai));
        }
    }

    let criteria = RubricCategory::ALL
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {} : {}", i + 1, c.label(), c.criterion()))
        .collect::<Vec<_>>()
        .join("\n");

    let schema = RubricCategory::ALL
        .iter()
        .map(|c| {
            format!(
                r#"    "{}": {{"점수": 0-25, "코멘트": "코멘트", "개선을 위한 조언": "조언"}},"#,
                c.label()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"당신은 토론대회의 심판자입니다.
다음은 전체 토론 대화 내용입니다:
{full_chat}

그리고 다음은 사용자("User")가 한 발언들입니다:
{user_chat}

사용자의 발언들에 대해서만 다음 기준에 따라 평가해 주세요:
{criteria}

각 항목을 25점 만점으로 평가하고, 점수와 함께 간단한 코멘트와 개선을 위한 구체적인 조언을 제시해 주세요.
개선 방안에서는 사용자가 실제로 말한 문장을 제시하고, 어떻게 바꾸면 더 나은 점수를 받을 수 있는지 구체적으로 설명해 주세요.
마지막에는 총점(100점 만점)을 제시해 주세요.

반드시 아래의 json형식으로 반환해 주세요:
{{
{schema}
    "총점": 0-100
}}"#,
        full_chat = full_chat.join("\n"),
        user_chat = user_messages.join("\n"),
    )
}
