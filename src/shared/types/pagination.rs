/// Default zero-based page number.
pub const DEFAULT_PAGE_NUMBER: u64 = 0;
/// Default page size.
pub const DEFAULT_PAGE_SIZE: u64 = 15;
/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Sort direction. Anything that is not recognisably descending sorts ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

/// Page request with a typed sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<F> {
    /// Zero-based page index
    pub page: u64,
    pub size: u64,
    pub sort: F,
    pub direction: SortDirection,
}

impl<F> PageRequest<F> {
    /// Builds a request, clamping the page to `>= 0` and the size to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: i64, size: i64, sort: F, direction: SortDirection) -> Self {
        Self {
            page: page.max(0) as u64,
            size: size.clamp(1, MAX_PAGE_SIZE as i64) as u64,
            sort,
            direction,
        }
    }

    /// Row offset of the page. Saturates at `i64::MAX`, the largest offset
    /// the database accepts, so far-out pages are simply empty.
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size).min(i64::MAX as u64)
    }
}

/// Paginated response wrapper
#[derive(Debug)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub size: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, size: u64) -> Self {
        let total_pages = if size == 0 { 0 } else { total.div_ceil(size) };
        Self {
            items,
            total,
            page,
            size,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResult<U> {
        PaginatedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_direction_defaults_to_ascending() {
        assert_eq!(SortDirection::parse_lenient("DESC"), SortDirection::Desc);
        assert_eq!(SortDirection::parse_lenient("asc"), SortDirection::Asc);
        assert_eq!(SortDirection::parse_lenient("sideways"), SortDirection::Asc);
        assert_eq!(SortDirection::parse_lenient(""), SortDirection::Asc);
    }

    #[test]
    fn page_request_clamps_out_of_range_values() {
        let req = PageRequest::new(-3, 0, (), SortDirection::Asc);
        assert_eq!((req.page, req.size), (0, 1));

        let req = PageRequest::new(2, 10_000, (), SortDirection::Asc);
        assert_eq!((req.page, req.size), (2, MAX_PAGE_SIZE));
        assert_eq!(req.offset(), 2 * MAX_PAGE_SIZE);
    }

    #[test]
    fn offset_of_a_huge_page_saturates() {
        let req = PageRequest::new(i64::MAX, 100, (), SortDirection::Asc);
        assert_eq!(req.page, i64::MAX as u64);
        assert_eq!(req.offset(), i64::MAX as u64);

        let req = PageRequest::new(i64::MAX / 100 + 1, 100, (), SortDirection::Asc);
        assert_eq!(req.offset(), i64::MAX as u64);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = PaginatedResult::new(vec![1, 2, 3], 7, 0, 3);
        assert_eq!(page.total_pages, 3);

        let empty: PaginatedResult<i32> = PaginatedResult::new(vec![], 0, 0, 15);
        assert_eq!(empty.total_pages, 0);
    }
}
