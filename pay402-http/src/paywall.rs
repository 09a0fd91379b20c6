//! Browser paywall dispatch.
//!
//! A 402 answer is JSON by default. When the request prefers `text/html`
//! and a [`PaywallProvider`] is registered, the provider's HTML is served
//! instead so browser users see a payment page rather than a JSON blob.
//! The HTML itself comes from the provider; this crate only decides which
//! representation to serve.

use http::HeaderMap;
use pay402::proto::PaymentRequired;

use crate::types::PaywallConfig;

/// Renders a browser-facing paywall page for a 402 response.
pub trait PaywallProvider: Send + Sync {
    /// Returns the full HTML document for the given payment challenge.
    fn render(&self, payment_required: &PaymentRequired, config: &PaywallConfig) -> String;
}

/// Returns `true` when the request's `Accept` header prefers HTML over
/// JSON.
///
/// A plain `*/*` (or a missing header) does not count as an HTML
/// preference; API clients keep getting JSON.
#[must_use]
pub fn prefers_html(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(http::header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    for entry in accept.split(',') {
        let media_type = entry.split(';').next().unwrap_or("").trim();
        if media_type.eq_ignore_ascii_case("text/html")
            || media_type.eq_ignore_ascii_case("application/xhtml+xml")
        {
            return true;
        }
        if media_type.eq_ignore_ascii_case("application/json") {
            return false;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::ACCEPT;

    fn headers_with_accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, value.parse().unwrap());
        headers
    }

    #[test]
    fn browser_accept_prefers_html() {
        let headers = headers_with_accept(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        );
        assert!(prefers_html(&headers));
    }

    #[test]
    fn api_clients_stay_json() {
        assert!(!prefers_html(&headers_with_accept("application/json")));
        assert!(!prefers_html(&headers_with_accept("*/*")));
        assert!(!prefers_html(&HeaderMap::new()));
    }

    #[test]
    fn json_listed_first_wins() {
        assert!(!prefers_html(&headers_with_accept(
            "application/json,text/html"
        )));
    }
}
