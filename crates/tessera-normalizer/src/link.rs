//! Tessera Links
//!
//! Link generation is a collaborator: every generated URL comes back with
//! the cacheability of whatever was consulted to produce it, and callers
//! fold that into the node holding the link.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use tessera_common::{ApiConfig, Cacheability};
use tessera_query::OffsetPage;
use url::Url;

/// Cache context for links that depend on the site's base URL.
pub const SITE_CACHE_CONTEXT: &str = "url.site";

/// A generated URL and the cacheability of generating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub cacheability: Cacheability,
}

impl Link {
    pub fn new(href: impl Into<String>, cacheability: Cacheability) -> Self {
        Self {
            href: href.into(),
            cacheability,
        }
    }
}

// =============================================================================
// Link Provider
// =============================================================================

/// Generates the URLs a document links to.
pub trait LinkProvider: Send + Sync {
    fn entry_point(&self) -> Link;

    fn collection(&self, public_type: &str) -> Link;

    fn resource(&self, public_type: &str, id: &str) -> Link;

    /// `/<type>/<id>/<field>`
    fn related(&self, public_type: &str, id: &str, field: &str) -> Link;

    /// `/<type>/<id>/relationships/<field>`
    fn relationship(&self, public_type: &str, id: &str, field: &str) -> Link;

    /// `current` with its page parameters replaced by `page`.
    fn paged(&self, current: &Link, page: OffsetPage) -> Link;
}

/// Links under the configured base URL and path.
#[derive(Debug, Clone)]
pub struct UrlLinkProvider {
    prefix: String,
}

impl UrlLinkProvider {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            prefix: config.link_prefix(),
        }
    }

    fn link(&self, path: String) -> Link {
        Link::new(
            format!("{}{}", self.prefix, path),
            Cacheability::new().with_context(SITE_CACHE_CONTEXT),
        )
    }

    /// Absolute URL for a request path and query as received.
    pub fn current(&self, path_and_query: &str) -> Link {
        let origin = match Url::parse(&self.prefix) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => self.prefix.clone(),
        };
        Link::new(
            format!("{}{}", origin, path_and_query),
            Cacheability::new()
                .with_context(SITE_CACHE_CONTEXT)
                .with_context("url.query_args"),
        )
    }
}

impl LinkProvider for UrlLinkProvider {
    fn entry_point(&self) -> Link {
        self.link(String::new())
    }

    fn collection(&self, public_type: &str) -> Link {
        self.link(format!("/{}", public_type))
    }

    fn resource(&self, public_type: &str, id: &str) -> Link {
        self.link(format!("/{}/{}", public_type, id))
    }

    fn related(&self, public_type: &str, id: &str, field: &str) -> Link {
        self.link(format!("/{}/{}/{}", public_type, id, field))
    }

    fn relationship(&self, public_type: &str, id: &str, field: &str) -> Link {
        self.link(format!("/{}/{}/relationships/{}", public_type, id, field))
    }

    fn paged(&self, current: &Link, page: OffsetPage) -> Link {
        let href = match Url::parse(&current.href) {
            Ok(mut url) => {
                let kept: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(k, _)| !k.starts_with("page["))
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(kept)
                    .append_pair("page[offset]", &page.offset.to_string())
                    .append_pair("page[size]", &page.size.to_string());
                url.to_string()
            }
            Err(_) => current.href.clone(),
        };
        Link::new(href, current.cacheability.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> UrlLinkProvider {
        UrlLinkProvider::new(&ApiConfig::default().with_base_url("http://example.com"))
    }

    #[test]
    fn test_resource_links() {
        let links = provider();
        assert_eq!(links.collection("node--article").href, "http://example.com/jsonapi/node--article");
        assert_eq!(
            links.relationship("node--article", "a1", "author").href,
            "http://example.com/jsonapi/node--article/a1/relationships/author"
        );
        assert_eq!(
            links.related("node--article", "a1", "author").href,
            "http://example.com/jsonapi/node--article/a1/author"
        );
        assert!(links.resource("t", "1").cacheability.contexts.contains(SITE_CACHE_CONTEXT));
    }

    #[test]
    fn test_paged_link_replaces_page_parameters() {
        let links = provider();
        let current = links.current("/jsonapi/node--article?sort=title&page%5Boffset%5D=0&page%5Bsize%5D=2");
        let next = links.paged(&current, OffsetPage { offset: 2, size: 2 });

        let url = Url::parse(&next.href).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("sort".to_string(), "title".to_string()),
                ("page[offset]".to_string(), "2".to_string()),
                ("page[size]".to_string(), "2".to_string()),
            ]
        );
        assert!(next.cacheability.contexts.contains("url.query_args"));
    }
}
