use serde::Deserialize;

/// Number of posts shown on every feed page.
pub const POSTS_PER_PAGE: i64 = 10;

/// Page links shown on each side of the current page.
const WINDOW: i64 = 2;

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    /// Kept as a string so that garbage input falls back to the first page
    /// instead of rejecting the request.
    pub page: Option<String>,
}

/// One resolved page of an ordered result set, 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub num_pages: i64,
    pub per_page: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub number: i64,
    pub current: bool,
}

impl Page {
    /// Resolve the requested page against `total` items.
    ///
    /// Missing or non-integer input yields page 1, out-of-range input clamps
    /// to the nearest valid page. An empty set still has one empty page.
    pub fn resolve(requested: Option<&str>, total: i64, per_page: i64) -> Self {
        let per_page = per_page.max(1);
        let total = total.max(0);
        let num_pages = if total == 0 {
            1
        } else {
            (total + per_page - 1) / per_page
        };

        let number = requested
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(1)
            .clamp(1, num_pages);

        Self {
            number,
            num_pages,
            per_page,
            total,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.per_page
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_other_pages(&self) -> bool {
        self.num_pages > 1
    }

    pub fn next_number(&self) -> i64 {
        (self.number + 1).min(self.num_pages)
    }

    pub fn previous_number(&self) -> i64 {
        (self.number - 1).max(1)
    }

    /// Page numbers around the current page, for the paginator links.
    pub fn window(&self) -> Vec<PageLink> {
        let start = (self.number - WINDOW).max(1);
        let end = (self.number + WINDOW).min(self.num_pages);
        (start..=end)
            .map(|number| PageLink {
                number,
                current: number == self.number,
            })
            .collect()
    }
}

/// A page descriptor together with the rows it selected.
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub page: Page,
    pub items: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod resolve_tests {
        use super::*;

        #[test]
        fn test_first_page_by_default() {
            let page = Page::resolve(None, 12, POSTS_PER_PAGE);
            assert_eq!(page.number, 1);
            assert_eq!(page.num_pages, 2);
            assert_eq!(page.offset(), 0);
        }

        #[test]
        fn test_second_page() {
            let page = Page::resolve(Some("2"), 12, POSTS_PER_PAGE);
            assert_eq!(page.number, 2);
            assert_eq!(page.offset(), 10);
            assert!(!page.has_next());
            assert!(page.has_previous());
        }

        #[test]
        fn test_non_integer_falls_back_to_first_page() {
            let page = Page::resolve(Some("abc"), 30, POSTS_PER_PAGE);
            assert_eq!(page.number, 1);
        }

        #[test]
        fn test_page_past_end_clamps_to_last() {
            let page = Page::resolve(Some("99"), 25, POSTS_PER_PAGE);
            assert_eq!(page.number, 3);
            assert_eq!(page.offset(), 20);
        }

        #[test]
        fn test_page_below_one_clamps_to_first() {
            assert_eq!(Page::resolve(Some("0"), 25, POSTS_PER_PAGE).number, 1);
            assert_eq!(Page::resolve(Some("-4"), 25, POSTS_PER_PAGE).number, 1);
        }

        #[test]
        fn test_empty_set_has_one_page() {
            let page = Page::resolve(Some("3"), 0, POSTS_PER_PAGE);
            assert_eq!(page.number, 1);
            assert_eq!(page.num_pages, 1);
            assert!(!page.has_other_pages());
        }

        #[test]
        fn test_exact_multiple() {
            let page = Page::resolve(None, 20, POSTS_PER_PAGE);
            assert_eq!(page.num_pages, 2);
        }

        #[test]
        fn test_whitespace_is_ignored() {
            assert_eq!(Page::resolve(Some(" 2 "), 20, POSTS_PER_PAGE).number, 2);
        }
    }

    mod window_tests {
        use super::*;

        #[test]
        fn test_window_in_the_middle() {
            let page = Page::resolve(Some("5"), 100, POSTS_PER_PAGE);
            let numbers: Vec<i64> = page.window().iter().map(|l| l.number).collect();
            assert_eq!(numbers, vec![3, 4, 5, 6, 7]);
            assert!(page.window()[2].current);
        }

        #[test]
        fn test_window_at_edges() {
            let first = Page::resolve(Some("1"), 100, POSTS_PER_PAGE);
            let numbers: Vec<i64> = first.window().iter().map(|l| l.number).collect();
            assert_eq!(numbers, vec![1, 2, 3]);

            let last = Page::resolve(Some("10"), 100, POSTS_PER_PAGE);
            let numbers: Vec<i64> = last.window().iter().map(|l| l.number).collect();
            assert_eq!(numbers, vec![8, 9, 10]);
        }

        #[test]
        fn test_next_and_previous_numbers() {
            let page = Page::resolve(Some("2"), 30, POSTS_PER_PAGE);
            assert_eq!(page.previous_number(), 1);
            assert_eq!(page.next_number(), 3);
        }
    }

    #[test]
    fn test_page_query_default() {
        let query: PageQuery = serde_urlencoded::from_str("").unwrap();
        assert!(query.page.is_none());

        let query: PageQuery = serde_urlencoded::from_str("page=2").unwrap();
        assert_eq!(query.page.as_deref(), Some("2"));
    }
}
