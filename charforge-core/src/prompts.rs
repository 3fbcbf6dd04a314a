//! Fixed prompt text sent to the generation backend.
//!
//! Both templates carry a `{worldview}` slot that receives the worldview
//! description verbatim. The profile template itself is the same in both
//! phases: the conversation phase asks questions to fill it, the finalize
//! phase fills it and nothing else.

/// Slot the worldview description is inserted into.
pub const WORLDVIEW_SLOT: &str = "{worldview}";

/// Description used when a session's worldview has vanished from the store.
pub const FALLBACK_WORLDVIEW_DESCRIPTION: &str = "A generic fantasy world.";

/// Opening assistant turn replayed in front of every transcript.
pub const SEED_ASSISTANT_TURN: &str = "어떤 캐릭터를 만들고 싶으신가요? 자유롭게 이야기해주세요.";

/// Extra user turn appended to the finalize request.
pub const FINALIZE_DIRECTIVE: &str = "지금까지의 대화를 바탕으로 템플릿을 채운 최종 프로필만 출력해주세요. \
인사말, 설명, 질문 없이 완성된 템플릿 본문만 작성하고, 대화에서 나오지 않은 항목은 비워두세요.";

const PROFILE_TEMPLATE: &str = "\
1. **기본 정보**
- 이름 / 나이 / 성별:
- 종족 / 출신:
- 외형 요약:

2. **배경 이야기 및 정체성**
- 간략한 배경 서사 (출신, 성장, 현재 위치):
- 성격 및 가치관:
- 현재 삶의 목표:

3. **능력 및 전투**
- 주요 능력 (지능/신체/기술 등 요약):
- 전투 스타일 / 전략:

4. **인물 관계**
- 주요 인맥 및 가족 요약:
- 주요 인물 1~2명과의 관계 설명 (선택):
";

/// Which phase of the session a system instruction is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPhase {
    Conversation,
    Finalize,
}

fn conversation_template() -> String {
    format!(
        "Your role is to help the user create a character by filling out a specific template.
Guide the user by asking questions to get the information needed for the template fields.
If the user asks to see the template, show them the exact Korean template below.
Never invent new sections and never make up details the user did not give you.

**World Setting:**
---
{slot}
---

**Final Profile Template (Your Goal):**

{template}
Keep your tone encouraging and collaborative. Start by asking about the character's basic information.
",
        slot = WORLDVIEW_SLOT,
        template = PROFILE_TEMPLATE,
    )
}

fn finalize_template() -> String {
    format!(
        "Your only job is to fill out the provided template based on the conversation.
- **Analyze the World Setting and Conversation History.**
- **You MUST use the Korean template provided below.**
- **Do NOT create new sections. Do NOT use English headers.**
- **Fill in the information for each field. If information is missing, leave it blank.**

**World Setting:**
---
{slot}
---

**Template to fill:**

{template}
**Rule for '인물 관계':** Only fill the '주요 인물 1~2명과의 관계 설명 (선택):' part if the user provided specific details about relationships. Otherwise, omit the line.
",
        slot = WORLDVIEW_SLOT,
        template = PROFILE_TEMPLATE,
    )
}

/// Build the system instruction for `phase`, with `worldview_description`
/// placed in the worldview slot unmodified.
pub fn system_instruction(phase: PromptPhase, worldview_description: &str) -> String {
    let template = match phase {
        PromptPhase::Conversation => conversation_template(),
        PromptPhase::Finalize => finalize_template(),
    };
    template.replacen(WORLDVIEW_SLOT, worldview_description, 1)
}
