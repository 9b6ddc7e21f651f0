//! Retrieval domain.
//!
//! - [`ResultInfo`]: one retrieved document excerpt
//! - [`citations::Citations`]: references rendered onto a finished response

pub mod citations;

use serde::{Deserialize, Serialize};

/// A single retrieved excerpt (Value Object)
///
/// Empty strings stand for absent text metadata; numeric metadata uses
/// `Option`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultInfo {
    /// Source file the excerpt came from.
    pub file: String,
    pub title: String,
    pub author: String,
    pub date: String,
    pub page: Option<i32>,
    /// First line of the excerpt.
    pub from: Option<i32>,
    /// Last line of the excerpt.
    pub to: Option<i32>,
    /// The retrieved text itself.
    pub text: String,
}

impl ResultInfo {
    pub fn new(file: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn with_page(mut self, page: i32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_lines(mut self, from: i32, to: Option<i32>) -> Self {
        self.from = Some(from);
        self.to = to;
        self
    }
}

/// Ordered results of one retrieval request.
pub type RetrievalResult = Vec<ResultInfo>;
