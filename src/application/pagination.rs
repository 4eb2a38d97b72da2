//! Page-number pagination over counted collections.
//!
//! A request carries an optional, untrusted `?page=` value. It never fails:
//! anything that is not a number selects the first page, numbers below one
//! clamp to the first page and numbers past the end (however many digits)
//! clamp to the last page.
//! An empty collection still has exactly one (empty) page.

use serde::Deserialize;

/// Query string accepted by every paginated listing.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    per_page: u64,
}

/// Resolved window into a collection, ready to hand to a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub total_count: u64,
    pub offset: u64,
    pub limit: u64,
}

impl Paginator {
    pub fn new(per_page: u64) -> Self {
        Self {
            per_page: per_page.max(1),
        }
    }

    pub fn num_pages(&self, total_count: u64) -> u64 {
        total_count.div_ceil(self.per_page).max(1)
    }

    pub fn window(&self, requested: Option<&str>, total_count: u64) -> PageWindow {
        let num_pages = self.num_pages(total_count);
        let number = match requested.map(str::trim) {
            Some(raw) => match raw.parse::<i64>() {
                Ok(value) if value < 1 => 1,
                Ok(value) => u64::try_from(value).unwrap_or(num_pages).min(num_pages),
                // Too many digits for an integer still lies past the end.
                Err(_) if is_unsigned_number(raw) => num_pages,
                Err(_) => 1,
            },
            None => 1,
        };

        PageWindow {
            number,
            num_pages,
            total_count,
            offset: (number - 1) * self.per_page,
            limit: self.per_page,
        }
    }
}

fn is_unsigned_number(raw: &str) -> bool {
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

impl PageWindow {
    pub fn into_page<T>(self, items: Vec<T>) -> Page<T> {
        Page {
            items,
            number: self.number,
            num_pages: self.num_pages,
            total_count: self.total_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_page_number(&self) -> Option<u64> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_page_number(&self) -> Option<u64> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total_count: self.total_count,
        }
    }
}
