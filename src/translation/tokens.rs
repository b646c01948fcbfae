/*!
 * Heuristic token estimation.
 *
 * Exact counting would need the provider's tokenizer; a character ratio is
 * close enough to reserve quota ahead of a call.
 */

/// Tokens per character of prompt text
pub const TOKENS_PER_CHAR: f64 = 0.5;

/// Inflation applied to the prompt estimate before admission, covers the
/// response whose size is unknown until the call returns
pub const SAFETY_MULTIPLIER: f64 = 2.1;

/// Estimate the token cost of a prompt
pub fn estimate(text: &str) -> u64 {
    (text.chars().count() as f64 * TOKENS_PER_CHAR) as u64
}

/// Cost to reserve for a request whose prompt is estimated at `prompt_tokens`
pub fn reserved_cost(prompt_tokens: u64) -> u64 {
    (prompt_tokens as f64 * SAFETY_MULTIPLIER) as u64
}
