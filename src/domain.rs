//! Domain models shared by the engine and the service: study modes and engine identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which study flow a queue belongs to. Each mode owns independent engines.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  /// New words being introduced.
  Learn,
  /// Words already seen, due for review.
  Review,
}

impl Mode {
  pub fn as_str(self) -> &'static str {
    match self {
      Mode::Learn => "learn",
      Mode::Review => "review",
    }
  }
}

impl fmt::Display for Mode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Identity of one engine instance: a (mode, category) pairing.
/// An empty category is treated the same as no category.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EngineKey {
  pub mode: Mode,
  pub category: Option<String>,
}

impl EngineKey {
  pub fn new(mode: Mode, category: Option<String>) -> Self {
    let category = category
      .map(|c| c.trim().to_string())
      .filter(|c| !c.is_empty());
    Self { mode, category }
  }
}

impl fmt::Display for EngineKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.category {
      Some(c) => write!(f, "{}/{}", self.mode, c),
      None => write!(f, "{}/*", self.mode),
    }
  }
}
