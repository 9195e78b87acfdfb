use serde::Serialize;
use thiserror::Error;

/// One page of a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Validated 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    number: u64,
    size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid page.")]
pub struct InvalidPage;

impl PageRequest {
    /// Parses the raw `page` query value. A missing value selects the first page.
    pub fn parse(raw: Option<&str>, size: u32) -> Result<Self, InvalidPage> {
        let number = match raw.map(str::trim) {
            None | Some("") => 1,
            Some(value) => value.parse::<u64>().map_err(|_| InvalidPage)?,
        };
        if number == 0 || size == 0 {
            return Err(InvalidPage);
        }
        Ok(Self {
            number,
            size: u64::from(size),
        })
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn limit(&self) -> i64 {
        i64::try_from(self.size).unwrap_or(i64::MAX)
    }

    pub fn offset(&self) -> i64 {
        i64::try_from((self.number - 1).saturating_mul(self.size)).unwrap_or(i64::MAX)
    }

    /// Rejects pages past the end. The first page of an empty collection is valid.
    pub fn check(&self, count: u64) -> Result<(), InvalidPage> {
        if self.number > self.last_page(count) {
            Err(InvalidPage)
        } else {
            Ok(())
        }
    }

    fn last_page(&self, count: u64) -> u64 {
        count.div_ceil(self.size).max(1)
    }

    /// Assembles the page envelope with links relative to `collection_url`.
    pub fn into_page<T>(self, count: u64, results: Vec<T>, collection_url: &str) -> Page<T> {
        let next = (self.number < self.last_page(count))
            .then(|| format!("{collection_url}?page={}", self.number + 1));
        let previous = match self.number {
            1 => None,
            2 => Some(collection_url.to_string()),
            n => Some(format!("{collection_url}?page={}", n - 1)),
        };
        Page {
            count,
            next,
            previous,
            results,
        }
    }
}
