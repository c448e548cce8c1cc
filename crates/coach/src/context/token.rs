//! Token estimation utilities.
//!
//! Uses a byte-based heuristic: ~4 bytes per token, which tracks BPE
//! tokenizers (GPT-4 family) closely enough on English text to budget a
//! context window. Claude models tokenize a little denser, so they get
//! their own ratio.

use disha_config::ProviderKind;

/// Fixed framing cost of one chat message (role name, delimiters).
pub const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Per-family estimate selected from the configured provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenEstimator {
    /// 4 bytes per token.
    #[default]
    Bpe,
    /// 3.5 bytes per token.
    Claude,
}

impl TokenEstimator {
    pub fn for_provider(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Anthropic => Self::Claude,
            ProviderKind::OpenAi | ProviderKind::Demo => Self::Bpe,
        }
    }

    /// Tokens for a bare string. Rounds up.
    pub fn text(&self, text: &str) -> usize {
        match self {
            Self::Bpe => estimate_tokens(text),
            Self::Claude => (text.len() * 2).div_ceil(7),
        }
    }

    /// Tokens for one message body plus framing.
    pub fn message(&self, text: &str) -> usize {
        MESSAGE_OVERHEAD + self.text(text)
    }
}
