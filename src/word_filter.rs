//! Sensitive-word vocabulary
//!
//! Administrators maintain a list of blocked words. Posts and comments that
//! contain one of them (case-insensitive substring match) are rejected. The
//! list is cached in memory and refreshed whenever it changes.

use crate::orm::sensitive_words;
use chrono::Utc;
use sea_orm::{entity::*, query::*, ConnectionTrait, DbErr, Set};
use std::sync::{PoisonError, RwLock};

/// In-memory copy of the vocabulary, lowercased
#[derive(Debug, Default)]
pub struct WordFilter {
    words: RwLock<Vec<String>>,
}

/// Vocabulary entries are compared lowercased and trimmed.
pub fn normalize(word: &str) -> String {
    word.trim().to_lowercase()
}

impl WordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filter from a fixed list
    pub fn with_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filter = Self::new();
        filter.replace(
            words
                .into_iter()
                .map(|w| normalize(w.as_ref()))
                .filter(|w| !w.is_empty())
                .collect(),
        );
        filter
    }

    fn replace(&self, words: Vec<String>) {
        let mut guard = self.words.write().unwrap_or_else(PoisonError::into_inner);
        *guard = words;
    }

    /// Initialize the cache from the database
    pub async fn load<C: ConnectionTrait>(&self, db: &C) -> Result<(), DbErr> {
        let words: Vec<String> = sensitive_words::Entity::find()
            .order_by_asc(sensitive_words::Column::Word)
            .all(db)
            .await?
            .into_iter()
            .map(|m| m.word)
            .collect();

        log::info!("Loaded {} sensitive words", words.len());
        self.replace(words);
        Ok(())
    }

    /// First vocabulary word contained in `content`
    pub fn find_match(&self, content: &str) -> Option<String> {
        let words = self.words.read().unwrap_or_else(PoisonError::into_inner);
        if words.is_empty() {
            return None;
        }

        let haystack = content.to_lowercase();
        words
            .iter()
            .find(|word| haystack.contains(word.as_str()))
            .cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.words
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Add a word. Returns false if it was already present.
    pub async fn add<C: ConnectionTrait>(&self, db: &C, word: &str) -> Result<bool, DbErr> {
        let word = normalize(word);
        if sensitive_words::Entity::find_by_id(word.clone())
            .one(db)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        sensitive_words::Entity::insert(sensitive_words::ActiveModel {
            word: Set(word),
            created_at: Set(Utc::now().naive_utc()),
        })
        .exec(db)
        .await?;

        self.load(db).await?;
        Ok(true)
    }

    /// Remove a word. Returns false if it was not present.
    pub async fn remove<C: ConnectionTrait>(&self, db: &C, word: &str) -> Result<bool, DbErr> {
        let result = sensitive_words::Entity::delete_many()
            .filter(sensitive_words::Column::Word.eq(normalize(word)))
            .exec(db)
            .await?;

        self.load(db).await?;
        Ok(result.rows_affected > 0)
    }
}
