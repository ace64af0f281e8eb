//! Question answering over retrieved listings
//!
//! Synthetic Q/A generation from listing descriptions, few-shot prompt
//! composition, and retrieval-augmented answering. The generation model is
//! behind the [`Generator`] trait.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::error::{RetrievalError, Result};
use crate::record::{Listing, ListingId, Query};
use crate::retriever::{FilteredRetriever, ListingHit, RetrievedListing};

/// Token budget for one synthetic Q/A pair
pub const QA_MAX_TOKENS: usize = 150;
/// New tokens generated for an answer
pub const ANSWER_MAX_TOKENS: usize = 50;
/// Retrieved descriptions included in a prompt
pub const PROMPT_DESCRIPTIONS: usize = 3;
/// Example pairs included in a prompt
pub const PROMPT_EXAMPLES: usize = 3;

const PROMPT_HEADER: &str =
    "Based on these property descriptions and example Q&A, describe a suitable property:";

/// Text generation model
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`, at most `max_tokens` long
    ///
    /// Failures are reported as [`RetrievalError::Provider`].
    fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String>;
}

/// A question and its answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    #[serde(rename = "synthetic_question")]
    pub question: String,
    #[serde(rename = "synthetic_answer")]
    pub answer: String,
}

/// Parse generation output of the form `Q: ... A: ...`
///
/// Splits at the first `A:` and strips `Q:` from the question. Output
/// missing either marker is [`RetrievalError::MalformedOutput`]; an empty
/// answer after a present `A:` marker is a valid pair.
pub fn parse_qa(raw: &str) -> Result<QaPair> {
    let raw = raw.trim();
    if !raw.contains("Q:") {
        return Err(RetrievalError::malformed_output(raw));
    }
    let (question, answer) = raw
        .split_once("A:")
        .ok_or_else(|| RetrievalError::malformed_output(raw))?;

    Ok(QaPair {
        question: question.replace("Q:", "").trim().to_string(),
        answer: answer.trim().to_string(),
    })
}

/// Prompt asking for one Q/A pair about a listing description
pub fn qa_generation_prompt(description: &str) -> String {
    format!(
        "Based on the following property description, create one question and answer \
         related to what someone might be looking for when booking a property:\n\n\
         Description: \"{description}\"\n\n\
         Provide the output in this format:\n\
         Q: [Question]\n\
         A: [Answer]"
    )
}

/// Q/A pair generated from one listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticQa {
    #[serde(rename = "_id")]
    pub id: ListingId,
    pub description: String,
    #[serde(flatten)]
    pub pair: QaPair,
}

/// Generate a Q/A pair for a listing
pub fn synthesize_qa(generator: &dyn Generator, listing: &Listing) -> Result<SyntheticQa> {
    let raw = generator.generate(&qa_generation_prompt(&listing.description), QA_MAX_TOKENS)?;
    let pair = parse_qa(&raw)?;
    Ok(SyntheticQa {
        id: listing.id.clone(),
        description: listing.description.clone(),
        pair,
    })
}

/// Collection of example Q/A pairs used for few-shot prompts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QaExamples {
    examples: Vec<SyntheticQa>,
}

impl QaExamples {
    pub fn new(examples: Vec<SyntheticQa>) -> Self {
        Self { examples }
    }

    /// Generate examples for each listing
    ///
    /// Listings whose output cannot be parsed are skipped with a warning;
    /// provider failures abort.
    pub fn synthesize<'a, I>(generator: &dyn Generator, listings: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Listing>,
    {
        let mut examples = Vec::new();
        for (i, listing) in listings.into_iter().enumerate() {
            match synthesize_qa(generator, listing) {
                Ok(qa) => examples.push(qa),
                Err(RetrievalError::MalformedOutput { raw }) => {
                    log::warn!("Unparseable Q/A for listing {}: {:?}", listing.id, raw);
                }
                Err(e) => return Err(e),
            }
            if (i + 1) % 50 == 0 {
                log::info!("Generated Q/A for {} listings", i + 1);
            }
        }
        Ok(Self { examples })
    }

    /// Load examples from newline-delimited JSON
    pub fn from_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut examples = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            examples.push(serde_json::from_str(&line)?);
        }
        Ok(Self { examples })
    }

    pub fn save_jsonl(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        for example in &self.examples {
            serde_json::to_writer(&mut writer, example)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Pairs whose question contains `query`, ignoring case
    pub fn matching(&self, query: &str) -> Vec<&QaPair> {
        let needle = query.to_lowercase();
        self.examples
            .iter()
            .map(|e| &e.pair)
            .filter(|pair| pair.question.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn examples(&self) -> &[SyntheticQa] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// Few-shot generation prompt from retrieved listings and example pairs
pub fn compose_prompt(retrieved: &[RetrievedListing], examples: &[&QaPair]) -> String {
    let mut prompt = String::from(PROMPT_HEADER);
    prompt.push('\n');

    let descriptions: Vec<&str> = retrieved
        .iter()
        .take(PROMPT_DESCRIPTIONS)
        .map(|r| r.listing.description.as_str())
        .collect();
    prompt.push_str(&descriptions.join("\n"));

    prompt.push_str("\nExample Q&A:\n");
    let pairs: Vec<String> = examples
        .iter()
        .take(PROMPT_EXAMPLES)
        .map(|pair| format!("Q: {}\nA: {}", pair.question, pair.answer))
        .collect();
    prompt.push_str(&pairs.join("\n"));

    prompt
}

/// Result of answering a query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Answer {
    Generated {
        text: String,
        sources: Vec<ListingHit>,
    },
    /// Nothing matched; the generator was not called
    NoMatches,
}

/// Retrieval-augmented answering
pub struct RagAnswerer {
    retriever: FilteredRetriever,
    generator: Arc<dyn Generator>,
    examples: QaExamples,
    max_new_tokens: usize,
}

impl RagAnswerer {
    pub fn new(retriever: FilteredRetriever, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            generator,
            examples: QaExamples::default(),
            max_new_tokens: ANSWER_MAX_TOKENS,
        }
    }

    pub fn with_examples(mut self, examples: QaExamples) -> Self {
        self.examples = examples;
        self
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    /// Retrieve listings for `query` and generate an answer from them
    pub fn answer(&self, query: &Query) -> Result<Answer> {
        let retrieved = self.retriever.retrieve(query)?;
        if retrieved.is_empty() {
            return Ok(Answer::NoMatches);
        }

        let examples = self.examples.matching(&query.text);
        let prompt = compose_prompt(&retrieved, &examples);
        log::debug!(
            "Generating from {} listings and {} examples",
            retrieved.len().min(PROMPT_DESCRIPTIONS),
            examples.len().min(PROMPT_EXAMPLES)
        );

        let text = self.generator.generate(&prompt, self.max_new_tokens)?;
        Ok(Answer::Generated {
            text,
            sources: retrieved.iter().map(ListingHit::from).collect(),
        })
    }
}
