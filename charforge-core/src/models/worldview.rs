use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorldviewRecord {
    pub name: String,
    pub description: String,
}

/// Placeholder presets inserted into an empty worldview table.
pub const DEFAULT_PRESETS: [(&str, &str); 3] = [
    ("세계관1", "여기에 첫 번째 세계관 설명을 입력하세요."),
    ("세계관2", "여기에 두 번째 세계관 설명을 입력하세요."),
    ("세계관3", "여기에 세 번째 세계관 설명을 입력하세요."),
];
