//! Prompt rotation and the break-insertion rule.
//!
//! Prompts are style descriptors cycled through in fixed-size blocks of
//! chunks. The mapping from sequence number to prompt index is deterministic
//! so that a restarted producer lands on the same prompt it would have used
//! before the crash. The consumer inserts a short silence ("break unit")
//! whenever the prompt changes between two delivered chunks.

use serde::{Deserialize, Serialize};

/// Fixed ordered list of prompt strings plus the block size of the rotation.
/// Immutable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTable {
    prompts: Vec<String>,
    chunks_per_prompt: u64,
}

impl PromptTable {
    /// Build a table. Validity (non-empty list, positive block size) is
    /// enforced by [`crate::config::BufferConfig::validate`] before any loop
    /// runs.
    #[must_use]
    pub const fn new(prompts: Vec<String>, chunks_per_prompt: u64) -> Self {
        Self {
            prompts,
            chunks_per_prompt,
        }
    }

    /// Number of prompts in the rotation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Prompt index for a sequence number.
    ///
    /// Sequences are issued from 1; the rotation is driven by the zero-based
    /// production ordinal, so chunks 1..=N with a block size of 2 rotate as
    /// 0,0,1,1,2,2,...
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn prompt_index_of(&self, sequence: u64) -> usize {
        let ordinal = sequence.saturating_sub(1);
        ((ordinal / self.chunks_per_prompt) % self.prompts.len() as u64) as usize
    }

    /// Prompt text by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.prompts.get(index).map(String::as_str)
    }

    /// Prompt text for a sequence number.
    #[must_use]
    pub fn text_for_sequence(&self, sequence: u64) -> &str {
        &self.prompts[self.prompt_index_of(sequence)]
    }
}

/// Break rule: a break unit is owed immediately before delivering a chunk
/// whose prompt index differs from the previously *delivered* chunk's. No
/// prior delivery means no break is owed (a fresh consumer session starts
/// silently into its first chunk).
#[must_use]
pub fn needs_break(last_streamed_prompt: Option<usize>, next_prompt: usize) -> bool {
    last_streamed_prompt.is_some_and(|last| last != next_prompt)
}

/// The ten rotating lofi prompts shipped as the default table.
#[must_use]
pub fn default_prompts() -> Vec<String> {
    [
        "gentle indian lofi hip hop with smooth sarod, subdued drums, and warm room tone",
        "low-key indian lofi hip hop with muted sitar, soft percussion, and subtle breeze textures",
        "quiet indian lofi hip hop with distant sarangi, hushed drums, and misty ambience",
        "downtempo indian lofi hip hop with delicate santoor, minimal beats, and calm water sounds",
        "tranquil indian lofi hip hop with soft esraj melody, gentle rhythm, and evening atmosphere",
        "understated indian lofi hip hop with ambient veena, whispered percussion, and twilight textures",
        "chill indian classical fusion lofi hip hop with harmonium, soft tabla, and vinyl crackle",
        "dreamy indian lofi hip hop with flute melody, tabla beats, and monsoon rain ambience",
        "smooth indian lofi hip hop with electric sitar, mellow drums, and ambient texture",
        "nostalgic indian lofi hip hop with santoor, gentle drums, and street sounds",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(prompt_count: usize, chunks_per_prompt: u64) -> PromptTable {
        let prompts = (0..prompt_count).map(|i| format!("prompt {i}")).collect();
        PromptTable::new(prompts, chunks_per_prompt)
    }

    #[test]
    fn rotation_cycles_in_blocks() {
        // chunks_per_prompt=2, three prompts: sequences 1..=7 rotate
        // 0,0,1,1,2,2 and wrap back to 0.
        let t = table(3, 2);
        let indices: Vec<usize> = (1..=7).map(|s| t.prompt_index_of(s)).collect();
        assert_eq!(indices, vec![0, 0, 1, 1, 2, 2, 0]);
    }

    #[test]
    fn rotation_wraps_over_full_table() {
        let t = table(10, 60);
        assert_eq!(t.prompt_index_of(1), 0);
        assert_eq!(t.prompt_index_of(60), 0);
        assert_eq!(t.prompt_index_of(61), 1);
        assert_eq!(t.prompt_index_of(600), 9);
        assert_eq!(t.prompt_index_of(601), 0);
    }

    #[test]
    fn break_rule() {
        // Fresh session: no prior prompt, no break owed.
        assert!(!needs_break(None, 0));
        assert!(!needs_break(None, 4));
        // Same prompt: never a break.
        assert!(!needs_break(Some(2), 2));
        // Prompt change: exactly when a break is owed.
        assert!(needs_break(Some(2), 3));
    }

    #[test]
    fn default_table_has_ten_prompts() {
        assert_eq!(default_prompts().len(), 10);
    }

    #[test]
    fn text_for_sequence_follows_rotation() {
        let t = table(3, 2);
        assert_eq!(t.text_for_sequence(3), "prompt 1");
        assert_eq!(t.get(1), Some("prompt 1"));
        assert_eq!(t.get(3), None);
    }
}
