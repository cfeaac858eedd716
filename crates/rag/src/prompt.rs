//! Token-budgeted, deterministic prompt assembly.

use index::SearchHit;

use crate::expand::KgContext;

#[derive(Debug, Clone, Copy)]
pub struct PromptBudget {
    /// Whitespace-token budget for the context block.
    pub max_context_tokens: u32,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            max_context_tokens: 2048,
        }
    }
}

/// Assemble the context block: highest-score documents first, KG expansion
/// (the "oldest" source) last, truncated deterministically at the token
/// budget. Returns the rendered block plus the doc ids that made the cut.
pub fn assemble_prompt(
    question: &str,
    hits: &[SearchHit],
    kg_context: &[KgContext],
    budget: &PromptBudget,
) -> (String, Vec<String>) {
    let mut remaining = budget.max_context_tokens as i64;
    let mut context = String::new();
    let mut included = Vec::new();

    for hit in hits {
        let block = format!("[{}] (score {:.3})\n{}\n\n", hit.doc_id, hit.score, hit.text);
        let cost = corpus::estimate_tokens(&block) as i64;
        if cost > remaining {
            break;
        }
        remaining -= cost;
        context.push_str(&block);
        included.push(hit.doc_id.clone());
    }

    for item in kg_context {
        let block = format!("[kg:{}] {}\n", item.subject, item.summary);
        let cost = corpus::estimate_tokens(&block) as i64;
        if cost > remaining {
            break;
        }
        remaining -= cost;
        context.push_str(&block);
    }

    let prompt = format!(
        "Answer the export-control question strictly from the context.\n\
         Respond as JSON {{label, answer, rationale, citations}}.\n\n\
         Context:\n{context}\nQuestion: {question}\n"
    );
    (prompt, included)
}
