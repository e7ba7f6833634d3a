//! External auction listing URLs.
//!
//! Listings come from a third-party auction site; the only identity we trust
//! is the numeric ID embedded in the URL. Two URL shapes are accepted: a
//! `/catalog/<id>` path segment and an `aid=<id>` query parameter.

use territory_core::error::AppError;

/// Extract the external auction ID from a listing URL.
///
/// Fails with BadRequest when no recognized ID pattern is present.
pub fn parse_external_auction_id(url: &str) -> Result<String, AppError> {
    if let Some(id) = catalog_path_id(url) {
        return Ok(id);
    }
    if let Some(id) = query_param_id(url) {
        return Ok(id);
    }
    Err(AppError::BadRequest(anyhow::anyhow!(
        "Could not extract an auction ID from the URL"
    )))
}

/// `.../catalog/<digits>` or `.../catalog/<digits>/slug`.
fn catalog_path_id(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/catalog/")?;
    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// `...?aid=<digits>` anywhere in the query string.
fn query_param_id(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("aid=") {
            let id: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !id.is_empty() {
                return Some(id);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_path() {
        assert_eq!(
            parse_external_auction_id("https://auctions.example.com/catalog/482913/estate-sale")
                .unwrap(),
            "482913"
        );
    }

    #[test]
    fn parses_catalog_path_without_slug() {
        assert_eq!(
            parse_external_auction_id("https://auctions.example.com/catalog/482913").unwrap(),
            "482913"
        );
    }

    #[test]
    fn parses_aid_query_param() {
        assert_eq!(
            parse_external_auction_id("https://auctions.example.com/viewer?aid=77120&lot=3")
                .unwrap(),
            "77120"
        );
    }

    #[test]
    fn parses_aid_when_not_first_param() {
        assert_eq!(
            parse_external_auction_id("https://auctions.example.com/viewer?lot=3&aid=77120")
                .unwrap(),
            "77120"
        );
    }

    #[test]
    fn rejects_url_without_id() {
        assert!(parse_external_auction_id("https://auctions.example.com/about").is_err());
    }

    #[test]
    fn rejects_non_numeric_catalog_segment() {
        assert!(parse_external_auction_id("https://auctions.example.com/catalog/upcoming").is_err());
    }
}
