//! Token vocabularies loaded from files.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use seqflow_core::Result;

/// Padding token, always id 0.
pub const PADDING_TOKEN: &str = "<blank>";
/// Out-of-vocabulary token, always id 1.
pub const UNKNOWN_TOKEN: &str = "<unk>";

pub const PADDING_ID: i64 = 0;
pub const UNKNOWN_ID: i64 = 1;

/// Token to id mapping. Ids 0 and 1 are reserved for padding and unknown
/// tokens; file entries follow in order of first appearance.
#[derive(Debug, Clone)]
pub struct Vocab {
    token_to_id: HashMap<String, i64>,
    id_to_token: Vec<String>,
}

impl Vocab {
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self {
            token_to_id: HashMap::new(),
            id_to_token: Vec::new(),
        };
        vocab.push(PADDING_TOKEN.to_string());
        vocab.push(UNKNOWN_TOKEN.to_string());
        for token in tokens {
            vocab.push(token.into());
        }
        vocab
    }

    /// Loads one token per line. Only the first whitespace separated field
    /// is used, so `token<TAB>frequency` files work too.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut tokens = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if let Some(token) = line.split_whitespace().next() {
                tokens.push(token.to_string());
            }
        }
        Ok(Self::from_tokens(tokens))
    }

    fn push(&mut self, token: String) {
        if self.token_to_id.contains_key(&token) {
            return;
        }
        let id = self.id_to_token.len() as i64;
        self.token_to_id.insert(token.clone(), id);
        self.id_to_token.push(token);
    }

    pub fn id(&self, token: &str) -> i64 {
        self.token_to_id.get(token).copied().unwrap_or(UNKNOWN_ID)
    }

    pub fn encode(&self, line: &str) -> Vec<i64> {
        line.split_whitespace().map(|token| self.id(token)).collect()
    }

    /// Token of `id`, the unknown token when out of range.
    pub fn token(&self, id: i64) -> &str {
        usize::try_from(id)
            .ok()
            .and_then(|id| self.id_to_token.get(id))
            .map_or(UNKNOWN_TOKEN, String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }
}
