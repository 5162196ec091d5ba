use serde::Serialize;

/// Items per listing page.
pub const PAGE_SIZE: usize = 10;

/// Slice of an ordered result set handed to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

/// Where a requested page lands once the total is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlot {
    pub number: usize,
    pub num_pages: usize,
    pub count: u64,
    pub window: Window,
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    per_page: usize,
}

impl Default for Paginator {
    fn default() -> Self { Self::new(PAGE_SIZE) }
}

impl Paginator {
    pub fn new(per_page: usize) -> Self {
        Self { per_page: per_page.max(1) }
    }

    /// An empty result still has one (empty) page.
    pub fn num_pages(&self, count: u64) -> usize {
        let count = count as usize;
        if count == 0 { 1 } else { count.div_ceil(self.per_page) }
    }

    /// Lenient page lookup: a missing, non-numeric or zero page parameter
    /// selects page 1, and anything past the end selects the last page.
    pub fn locate(&self, count: u64, page: Option<&str>) -> PageSlot {
        let num_pages = self.num_pages(count);
        let requested = page
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|n| *n >= 1)
            .unwrap_or(1);
        let number = requested.min(num_pages);
        let offset = (number - 1) * self.per_page;
        let limit = (count as usize).saturating_sub(offset).min(self.per_page);
        PageSlot { number, num_pages, count, window: Window { offset, limit } }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub count: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, slot: PageSlot) -> Self {
        Self {
            items,
            number: slot.number,
            num_pages: slot.num_pages,
            count: slot.count,
            has_next: slot.number < slot.num_pages,
            has_previous: slot.number > 1,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Paginator::default().locate(0, None))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            count: self.count,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}
