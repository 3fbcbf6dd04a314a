//! User-facing message text. Kept short; the gateway shows most of these
//! as ephemeral replies to the triggering user only.

use charforge_core::ProfileSummary;

pub fn session_started_notice(worldview: &str) -> String {
    format!(
        "'{}' 세계관으로 캐릭터 생성을 시작합니다! 이 대화방에서 저와 자유롭게 이야기하며 캐릭터를 만들어보세요. \
다 되었으면 `/generate`, 그만두려면 언제든지 `/quit`을 입력해주세요.",
        worldview
    )
}

pub fn idle_warning(idle_minutes: u64) -> String {
    format!(
        "{}분 동안 응답이 없어 대화가 중단되었습니다. 계속하시려면 메시지를 보내주시거나, \
세션을 완전히 종료하려면 `/quit`을 입력해주세요.",
        idle_minutes.max(1)
    )
}

pub const SESSION_STARTED: &str = "캐릭터 생성 세션을 시작했습니다. DM을 확인해주세요!";
pub const SESSION_CONFLICT: &str =
    "이미 진행 중인 캐릭터 생성 세션이 있습니다. 새로 시작하려면 먼저 `/quit`을 입력해주세요.";
pub const NO_ACTIVE_SESSION: &str =
    "시작된 캐릭터 생성 세션이 없습니다. 먼저 `/start`를 이용해 대화를 시작해주세요.";
pub const DELIVERY_UNREACHABLE: &str = "DM을 보낼 수 없습니다. 봇의 DM을 허용해주세요.";
pub const GENERATION_FAILED: &str =
    "죄송합니다, 응답을 만드는 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.";
pub const TRANSCRIPT_EMPTY: &str =
    "프로필을 생성하기에는 대화 내용이 너무 적습니다. 캐릭터에 대해 더 이야기해주세요.";
pub const EMPTY_MESSAGE: &str = "빈 메시지는 보낼 수 없습니다.";
pub const INVALID_NAME: &str = "이름은 1자 이상 50자 이하로 입력해주세요.";
pub const STORAGE_FAILED: &str = "저장소를 사용하는 중 문제가 발생했습니다. 잠시 후 다시 시도해주세요.";

pub const QUIT_DONE: &str = "캐릭터 생성이 종료되었습니다. 또 이용해주셔서 감사합니다!";
pub const QUIT_NOTHING: &str = "시작된 캐릭터 생성 세션이 없습니다.";

pub const PROFILE_GENERATED_TITLE: &str = "✨ 캐릭터 프로필 생성 완료!";
pub const PROFILE_GENERATED: &str = "프로필이 생성되었습니다! 마음에 드시면 저장해주세요.";

pub const NO_PENDING_PROFILE: &str = "저장할 프로필 정보를 찾을 수 없습니다. 다시 생성해주세요.";
pub const NO_PROFILES: &str =
    "저장된 프로필이 없습니다. `/generate`로 프로필을 만들고 저장해보세요.";
pub const NO_WORLDVIEWS: &str = "저장된 세계관이 없습니다.";

pub fn unknown_worldview(name: &str, valid: &[String]) -> String {
    format!(
        "'{}'는 유효한 세계관이 아닙니다. 다음 중에서 선택해주세요: {}",
        name,
        valid.join(", ")
    )
}

pub fn profile_saved(character_name: &str) -> String {
    format!("✅ 캐릭터 '{}'(이)가 성공적으로 저장되었습니다!", character_name)
}

pub fn profile_overwritten(character_name: &str) -> String {
    format!("✅ 캐릭터 '{}'의 프로필을 새 내용으로 덮어썼습니다.", character_name)
}

pub fn duplicate_profile(character_name: &str) -> String {
    format!(
        "이미 '{}'(이)라는 이름의 캐릭터가 있습니다. 다른 이름을 입력하거나 덮어쓰기를 선택해주세요.",
        character_name
    )
}

pub fn profile_not_found(character_name: &str) -> String {
    format!(
        "'{}'(이)라는 이름의 프로필을 찾을 수 없습니다. 이름을 정확히 입력했는지 확인해주세요.",
        character_name
    )
}

pub fn worldview_created(name: &str) -> String {
    format!("✅ 새로운 세계관 '{}'(이)가 성공적으로 생성되었습니다!", name)
}

pub fn worldview_exists(name: &str) -> String {
    format!("❌ 오류: '{}'(이)라는 이름의 세계관이 이미 존재합니다.", name)
}

pub fn worldview_edited(name: &str) -> String {
    format!("✅ '{}' 세계관의 설명이 수정되었습니다.", name)
}

pub fn worldview_not_found(name: &str) -> String {
    format!("❌ '{}' 세계관을 찾을 수 없습니다.", name)
}

pub fn worldview_list(names: &[String]) -> String {
    let mut out = String::from("📜 사용 가능한 세계관 목록\n");
    for name in names {
        out.push_str(&format!("- {}\n", name));
    }
    out
}

pub fn profile_list(profiles: &[ProfileSummary]) -> String {
    let mut out = String::from("📂 저장된 캐릭터 목록\n");
    for p in profiles {
        match &p.worldview_name {
            Some(w) => out.push_str(&format!("- {} (세계관: {})\n", p.character_name, w)),
            None => out.push_str(&format!("- {}\n", p.character_name)),
        }
    }
    out
}
