//! Token Counter (C1): deterministic token-cost estimation for tools.

use serde::Serialize;

/// Estimates the prompt-token cost of a tool definition.
///
/// The default implementation is a character-division heuristic: the tool
/// is serialized to canonical JSON and the byte length divided by a
/// configured divisor. Equal tools always yield equal counts.
#[derive(Debug, Clone, Copy)]
pub struct TokenCounter {
    divisor: i64,
}

#[derive(Serialize)]
struct CountedTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

impl TokenCounter {
    pub fn new(divisor: i64) -> Self {
        Self { divisor }
    }

    /// Count the tokens for a tool described by name/description/schema.
    pub fn count(&self, name: &str, description: &str, input_schema: &serde_json::Value) -> u32 {
        if self.divisor <= 0 {
            return 0;
        }
        let counted = CountedTool {
            name,
            description,
            input_schema,
        };
        let bytes = serde_json::to_vec(&counted).unwrap_or_default().len() as i64;
        (bytes / self.divisor).max(0) as u32
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new(4)
    }
}
