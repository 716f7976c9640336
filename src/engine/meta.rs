//! Gamification metadata (XP, combo, daily goal, achievements) reported by the
//! server, merged into a local snapshot that stays sane between round-trips.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Meta payload as the server sends it. Every field is optional and loosely typed.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSessionMeta {
    #[serde(default, alias = "xp")]
    pub xp_earned: Option<Value>,
    #[serde(default)]
    pub streak: Option<Value>,
    #[serde(default)]
    pub combo: Option<Value>,
    #[serde(default)]
    pub max_combo: Option<Value>,
    #[serde(default)]
    pub daily_progress: Option<Value>,
    #[serde(default)]
    pub daily_goal: Option<Value>,
    #[serde(default)]
    pub unlocked_decks: Option<Value>,
    #[serde(default)]
    pub achievements: Option<Value>,
    #[serde(default)]
    pub cooldown_until: Option<Value>,
    #[serde(default)]
    pub last_award: Option<Value>,
    #[serde(default)]
    pub award: Option<Value>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub xp_earned: u64,
    pub streak: u64,
    pub combo: u64,
    /// Always `>= combo`.
    pub max_combo: u64,
    pub daily_progress: u64,
    pub daily_goal: Option<u64>,
    pub unlocked_decks: Vec<Value>,
    pub achievements: Vec<Value>,
    pub cooldown_until: Option<Value>,
    /// Award granted by the most recent response only.
    pub last_award: Option<Value>,
}

/// A finite number, clamped to zero and rounded down.
fn count(v: &Option<Value>) -> Option<u64> {
    let n = v.as_ref()?.as_f64()?;
    if !n.is_finite() {
        return None;
    }
    Some(n.max(0.0).floor() as u64)
}

fn array(v: &Option<Value>) -> Option<Vec<Value>> {
    match v {
        Some(Value::Array(items)) => Some(items.clone()),
        _ => None,
    }
}

/// Merge `raw` over `previous` (or over the zero snapshot when `reset`).
pub fn normalize(raw: &RawSessionMeta, previous: &SessionMeta, reset: bool) -> SessionMeta {
    let zero = SessionMeta::default();
    let base = if reset { &zero } else { previous };

    let combo = count(&raw.combo).unwrap_or(base.combo);
    let max_combo = count(&raw.max_combo).unwrap_or(base.max_combo).max(combo);

    let meta = SessionMeta {
        xp_earned: count(&raw.xp_earned).unwrap_or(base.xp_earned),
        streak: count(&raw.streak).unwrap_or(base.streak),
        combo,
        max_combo,
        daily_progress: count(&raw.daily_progress).unwrap_or(base.daily_progress),
        daily_goal: count(&raw.daily_goal).or(base.daily_goal),
        unlocked_decks: array(&raw.unlocked_decks).unwrap_or_else(|| base.unlocked_decks.clone()),
        achievements: array(&raw.achievements).unwrap_or_else(|| base.achievements.clone()),
        cooldown_until: raw.cooldown_until.clone().or_else(|| base.cooldown_until.clone()),
        last_award: raw.last_award.clone().or_else(|| raw.award.clone()),
    };
    debug_assert!(meta.max_combo >= meta.combo);
    meta
}
