pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Upstream hard cap on the number of comments returned by one request
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    /// Pages start at 1, sizes are clamped to `1..=MAX_PAGE_SIZE`
    pub fn new(page: u32, page_size: u32) -> Page {
        Page {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn first(page_size: u32) -> Page {
        Page::new(1, page_size)
    }

    /// Index of the first item of this page
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }
}

impl Default for Page {
    fn default() -> Page {
        Page::first(DEFAULT_PAGE_SIZE)
    }
}
