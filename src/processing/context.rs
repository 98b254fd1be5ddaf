//! Citation-numbered context assembly under a character budget.

use crate::store::QueryMatch;
use std::sync::LazyLock;
use tiktoken_rs::{CoreBPE, cl100k_base};

/// Context returned when a query matched nothing.
pub const NO_CONTEXT_SENTINEL: &str = "No relevant loan documents found for this query.";

/// Notice appended whenever the context was cut to fit the budget.
pub const TRUNCATION_NOTICE: &str = "\n\n[Note: The context has been truncated due to its size. \
If important information seems missing, please ask more specific questions.]";

const BLOCK_SEPARATOR: &str = "\n\n";

static ENCODING: LazyLock<Option<CoreBPE>> = LazyLock::new(|| match cl100k_base() {
    Ok(encoding) => Some(encoding),
    Err(error) => {
        tracing::warn!(error = %error, "cl100k_base unavailable; estimating tokens from length");
        None
    }
});

/// Context handed to the language model, with the matches it cites.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// Ranked matches, in the order they were numbered.
    pub contexts: Vec<QueryMatch>,
    /// Rendered context, possibly followed by [`TRUNCATION_NOTICE`].
    pub context_string: String,
    /// Whether any content was dropped to respect the budget.
    pub truncated: bool,
    /// Number of numbered blocks present in `context_string`.
    pub cited_count: usize,
    /// Token estimate for `context_string`.
    pub estimated_tokens: usize,
}

/// Renders matches into a bounded, citation-numbered context.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    max_chars: usize,
}

impl ContextAssembler {
    /// Assembler enforcing a budget of `max_chars` characters before the notice.
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Character budget.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Assemble `matches` within this assembler's budget.
    pub fn assemble(&self, matches: Vec<QueryMatch>) -> AssembledContext {
        assemble(matches, self.max_chars)
    }
}

/// Render `matches` as numbered blocks joined by a blank line, bounded by `max_chars`.
///
/// Blocks are dropped whole from the end until the rest fits. Only when the first block alone
/// exceeds the budget is it cut mid-text. The numbering always follows the input order.
pub fn assemble(matches: Vec<QueryMatch>, max_chars: usize) -> AssembledContext {
    if matches.is_empty() {
        return AssembledContext {
            contexts: matches,
            context_string: NO_CONTEXT_SENTINEL.to_string(),
            truncated: false,
            cited_count: 0,
            estimated_tokens: estimate_tokens(NO_CONTEXT_SENTINEL),
        };
    }

    let blocks: Vec<String> = matches
        .iter()
        .enumerate()
        .map(|(position, candidate)| render_block(position + 1, candidate))
        .collect();

    let mut kept = 0;
    let mut used = 0;
    for block in &blocks {
        let separator = if kept == 0 { 0 } else { BLOCK_SEPARATOR.len() };
        let next = used + separator + block.chars().count();
        if next > max_chars {
            break;
        }
        used = next;
        kept += 1;
    }

    let (context_string, truncated, cited_count) = if kept == blocks.len() {
        (blocks.join(BLOCK_SEPARATOR), false, kept)
    } else if kept > 0 {
        let mut context = blocks[..kept].join(BLOCK_SEPARATOR);
        context.push_str(TRUNCATION_NOTICE);
        (context, true, kept)
    } else {
        let mut context: String = blocks[0].chars().take(max_chars).collect();
        context.push_str(TRUNCATION_NOTICE);
        (context, true, 1)
    };

    if truncated {
        tracing::info!(
            matches = matches.len(),
            cited = cited_count,
            max_chars,
            "Context truncated to fit budget"
        );
    }

    AssembledContext {
        estimated_tokens: estimate_tokens(&context_string),
        contexts: matches,
        context_string,
        truncated,
        cited_count,
    }
}

fn render_block(number: usize, candidate: &QueryMatch) -> String {
    format!(
        "[{number}] From document \"{}\" ({}):\n{}",
        candidate.metadata.document_name, candidate.metadata.document_type, candidate.metadata.text
    )
}

/// Count tokens with `cl100k_base`, falling back to four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    match ENCODING.as_ref() {
        Some(encoding) => encoding.encode_ordinary(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}
