/*!
 * Translation engine.
 *
 * - `tokens`: request cost estimate
 * - `admission`: sliding-window quota and concurrency gate, retry budget
 * - `client`: provider calls behind admission and the retry policy
 * - `chunking`: dialogue chunks, request splitting and merging
 * - `prompts`: prompt template and response schema
 * - `reconciler`: per-file dispatch, merge and misalignment repair
 * - `orchestrator`: one task per file and the run summary
 */

pub mod admission;
pub mod chunking;
pub mod client;
pub mod orchestrator;
pub mod prompts;
pub mod reconciler;
pub mod tokens;

// Re-export main types for easier usage
pub use self::admission::{AdmissionConfig, AdmissionController, AdmissionState, Permit, RetryBudget};
pub use self::chunking::{Chunk, ChunkBatch, RequestBudget, TranslatedBatch};
pub use self::client::RateLimitedClient;
pub use self::orchestrator::{FileOutcome, Orchestrator, RunSummary, TranslatedFile};
pub use self::prompts::PromptTemplate;
pub use self::reconciler::{ChunkedTranslation, ReconcileState, Reconciler, ReconcilerConfig, TranslationOutput};
