//! ユーザープロフィールと送信ターンの組み立て
//!
//! プロフィールはリクエストごとに渡され、保存はしない。キー順で整列した
//! テキストに変換してからメッセージの後ろに付ける。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// 名前付き属性 (地域、作物、融資履歴など) の集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(BTreeMap<String, Value>);

impl UserProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 決定的な人間向けテキスト (キーの辞書順)
    pub fn render(&self) -> String {
        if self.0.is_empty() {
            return "User Profile: (none provided)".to_string();
        }
        let mut out = String::from("User Profile:");
        for (key, value) in &self.0 {
            out.push_str("\n- ");
            out.push_str(key);
            out.push_str(": ");
            out.push_str(&render_value(value));
        }
        out
    }
}

impl From<BTreeMap<String, Value>> for UserProfile {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(not set)".to_string(),
        other => other.to_string(),
    }
}

/// メッセージ → 空行 → プロフィール の順で1ターン分のテキストを作る
pub fn compose_turn(message: &str, profile: &UserProfile) -> String {
    format!("{}\n\n{}", message, profile.render())
}
