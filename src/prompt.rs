//! Prompt assembly.
//!
//! Concatenates the system prompt, conversation context, optional search
//! and document blocks, and the user query in a fixed order. The order is
//! part of the contract: identical inputs always yield identical prompts.
//! Snippet blocks are passed through without truncation.

use crate::models::{ScoredChunk, SearchResult};

/// Persona and instructions sent at the head of every prompt.
pub const SYSTEM_PROMPT: &str = "You are Efiko, an enthusiastic and knowledgeable AI study companion. \
Your goal is to inspire curiosity and a love for learning in students of all ages and backgrounds. \
When interacting with users:

1. Be proactive and engaging. If a query is vague, offer a range of exciting topics or suggest a learning path based on current events or interdisciplinary connections.
2. Adapt your language and explanations to suit different age groups and learning levels.
3. Provide concise but informative responses, always aiming to spark further interest in the topic.
4. Offer practical examples and real-world applications of concepts to make learning relatable.
5. Encourage critical thinking by posing thought-provoking questions related to the topic.
6. If appropriate, suggest fun learning activities or experiments that can be done at home.
7. Be supportive and motivational, acknowledging the user's interest in learning.
8. If you don't have specific information, guide the user towards reliable resources or suggest how they might research the topic further.

Remember, your role is not just to provide information, but to inspire a journey of discovery and lifelong learning.

Previous conversation:";

pub const SEARCH_HEADER: &str = "Web search results:";
pub const DOCUMENT_HEADER: &str = "Relevant document content:";
pub const QUERY_LABEL: &str = "User query: ";

/// Builds the single prompt string sent to the model.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    system_prompt: String,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(SYSTEM_PROMPT)
    }
}

impl ContextAssembler {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    /// Order: system prompt, conversation, search (if any), document (if
    /// any), then the query label and raw query.
    pub fn assemble(
        &self,
        conversation: &str,
        search_context: Option<&str>,
        document_context: Option<&str>,
        query: &str,
    ) -> String {
        let mut prompt = String::with_capacity(
            self.system_prompt.len()
                + conversation.len()
                + search_context.map_or(0, str::len)
                + document_context.map_or(0, str::len)
                + query.len()
                + 128,
        );
        prompt.push_str(&self.system_prompt);
        prompt.push('\n');
        prompt.push_str(conversation);

        if let Some(search) = search_context {
            prompt.push_str("\n\n");
            prompt.push_str(SEARCH_HEADER);
            prompt.push('\n');
            prompt.push_str(search);
        }

        if let Some(doc) = document_context {
            prompt.push_str("\n\n");
            prompt.push_str(DOCUMENT_HEADER);
            prompt.push('\n');
            prompt.push_str(doc);
        }

        prompt.push_str("\n\n");
        prompt.push_str(QUERY_LABEL);
        prompt.push_str(query);
        prompt
    }
}

/// Formats search hits as numbered entries. Returns `None` for no hits.
pub fn format_search_results(results: &[SearchResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    Some(
        results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {} ({})\n{}", i + 1, r.title, r.link, r.snippet))
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

/// Joins retrieved chunk texts in the order they appear in the document.
/// Returns `None` when nothing was retrieved.
pub fn format_document_chunks(chunks: &[ScoredChunk]) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }
    let mut ordered: Vec<&ScoredChunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.chunk_index);
    Some(
        ordered
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_and_suffix_hold_for_every_block_combination() {
        let assembler = ContextAssembler::default();
        let query = "Explain photosynthesis";
        for search in [None, Some("1. Sun (https://x)\nhot")] {
            for doc in [None, Some("chlorophyll absorbs light")] {
                let prompt = assembler.assemble("user: hi", search, doc, query);
                assert!(prompt.starts_with(SYSTEM_PROMPT));
                assert!(prompt.ends_with(query));
                assert!(prompt.ends_with(&format!("{}{}", QUERY_LABEL, query)));
            }
        }
    }

    #[test]
    fn blocks_appear_in_fixed_order() {
        let assembler = ContextAssembler::new("SYS");
        let prompt = assembler.assemble("CONV", Some("SEARCH"), Some("DOC"), "Q");
        let conv = prompt.find("CONV").unwrap();
        let search = prompt.find("SEARCH").unwrap();
        let doc = prompt.find("DOC").unwrap();
        let query = prompt.find("User query: Q").unwrap();
        assert!(conv < search && search < doc && doc < query);
        assert_eq!(
            prompt,
            "SYS\nCONV\n\nWeb search results:\nSEARCH\n\nRelevant document content:\nDOC\n\nUser query: Q"
        );
    }

    #[test]
    fn absent_blocks_leave_no_headers() {
        let prompt = ContextAssembler::new("SYS").assemble("", None, None, "Q");
        assert!(!prompt.contains(SEARCH_HEADER));
        assert!(!prompt.contains(DOCUMENT_HEADER));
        assert_eq!(prompt, "SYS\n\n\nUser query: Q");
    }

    #[test]
    fn large_blocks_are_not_truncated() {
        let big = "x".repeat(200_000);
        let prompt = ContextAssembler::default().assemble("", None, Some(&big), "q");
        assert!(prompt.contains(&big));
    }

    #[test]
    fn search_results_numbered() {
        let hits = vec![
            SearchResult {
                title: "Abuja".into(),
                link: "https://example.org/abuja".into(),
                snippet: "Capital of Nigeria".into(),
            },
            SearchResult {
                title: "Lagos".into(),
                link: "https://example.org/lagos".into(),
                snippet: "Largest city".into(),
            },
        ];
        let block = format_search_results(&hits).unwrap();
        assert!(block.starts_with("1. Abuja (https://example.org/abuja)\nCapital of Nigeria"));
        assert!(block.contains("2. Lagos"));
        assert!(format_search_results(&[]).is_none());
    }

    #[test]
    fn document_chunks_joined_in_document_order() {
        let chunks = vec![
            ScoredChunk {
                chunk_index: 7,
                text: "later page".into(),
                score: 0.9,
            },
            ScoredChunk {
                chunk_index: 2,
                text: "earlier page".into(),
                score: 0.5,
            },
        ];
        assert_eq!(
            format_document_chunks(&chunks).unwrap(),
            "earlier page\nlater page"
        );
        assert!(format_document_chunks(&[]).is_none());
    }
}
