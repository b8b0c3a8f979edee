//! Test fixtures for E2E testing against live pages

/// A page to archive and what the capture should look like
#[derive(Debug, Clone)]
pub struct PageFixture {
    pub url: &'static str,
    pub expected_domain: &'static str,
    /// Substring expected in the captured title, when the page is stable enough to know it
    pub title_contains: Option<&'static str>,
    pub should_complete: bool,
    pub description: &'static str,
}

pub const PAGE_FIXTURES: &[PageFixture] = &[
    PageFixture {
        url: "https://example.com/",
        expected_domain: "example.com",
        title_contains: Some("Example Domain"),
        should_complete: true,
        description: "IANA example page - tiny static HTML",
    },
    PageFixture {
        url: "https://www.iana.org/help/example-domains",
        expected_domain: "www.iana.org",
        title_contains: Some("Example"),
        should_complete: true,
        description: "IANA help page - small page with stylesheets",
    },
    PageFixture {
        url: "http://example.com:80/",
        expected_domain: "example.com",
        title_contains: None,
        should_complete: true,
        description: "Default port is dropped from the domain",
    },
    PageFixture {
        url: "https://archive-hub-e2e.invalid/",
        expected_domain: "archive-hub-e2e.invalid",
        title_contains: None,
        should_complete: false,
        description: "Unresolvable host - navigation failure",
    },
];
