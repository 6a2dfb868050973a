use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::error::ParseError;
use crate::models::ListingIds;

/// `i.<group>.<entity>` as it appears at the end of a listing slug
fn listing_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"i\.(\d+)\.(\d+)").expect("listing pattern is valid"))
}

/// Parse the (group id, entity id) pair out of a listing URL path.
///
/// Only the path is searched, so query strings such as tracking parameters
/// cannot produce a false match. Input that is not an absolute URL is
/// searched as-is, minus any query or fragment.
pub fn extract_listing_ids(listing_url: &str) -> Result<ListingIds, ParseError> {
    let path = match Url::parse(listing_url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => listing_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let captures = listing_pattern()
        .captures(&path)
        .ok_or_else(|| ParseError::MissingIdentifiers(listing_url.to_string()))?;

    let group_id = captures[1]
        .parse()
        .map_err(|_| ParseError::OutOfRange(listing_url.to_string()))?;
    let entity_id = captures[2]
        .parse()
        .map_err(|_| ParseError::OutOfRange(listing_url.to_string()))?;

    Ok(ListingIds {
        group_id,
        entity_id,
    })
}
