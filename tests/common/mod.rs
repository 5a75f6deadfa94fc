//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use efiko::embedding::Embedder;
use efiko::llm::{ModelClient, ModelError};

const DIMS: usize = 64;

/// Hashes lowercase words into a fixed-size count vector, so texts that
/// share words score higher under cosine similarity.
pub struct BagOfWordsEmbedder;

impl BagOfWordsEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Returns a fixed reply and records every prompt it receives.
pub struct RecordingModel {
    reply: String,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: String::new(),
            fail: true,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts().pop().expect("model was never called")
    }
}

#[async_trait]
impl ModelClient for RecordingModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(ModelError::Api {
                status: 500,
                message: "internal model failure".to_string(),
            });
        }
        Ok(self.reply.clone())
    }
}

/// About three pages of plain study notes.
pub fn three_page_notes() -> String {
    let pages = [
        "Photosynthesis is the process by which green plants convert light energy into chemical energy. \
         Chlorophyll in the chloroplasts absorbs sunlight. Water is split and oxygen is released.",
        "The Calvin cycle fixes carbon dioxide into glucose. It runs in the stroma of the chloroplast \
         and uses ATP and NADPH produced by the light reactions.",
        "Cellular respiration reverses the process, releasing the energy stored in glucose. \
         Mitochondria are the site of aerobic respiration in plant and animal cells.",
    ];
    pages
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let body = std::iter::repeat(*p).take(8).collect::<Vec<_>>().join(" ");
            format!("Page {}\n\n{}", i + 1, body)
        })
        .collect::<Vec<_>>()
        .join("\n\n\u{c}\n\n")
}
