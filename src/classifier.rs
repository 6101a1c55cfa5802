//! Heuristic detection of bulk and marketing mail

use crate::models::Header;
use once_cell::sync::Lazy;

/// Headers only mailing lists and bulk senders set
static LIST_HEADERS: Lazy<Vec<String>> = Lazy::new(|| {
    ["List-Unsubscribe", "List-ID", "Precedence"]
        .iter()
        .map(|h| h.to_lowercase())
        .collect()
});

/// Bulk-mail platforms that show up in header values (Received, X-Mailer, ...)
const BULK_PLATFORMS: &[&str] = &["mailchimp", "sendgrid", "mailgun", "hubspot", "getresponse"];

/// Promotional vocabulary, Polish and English, already lowercase
const MARKETING_KEYWORDS: &[&str] = &[
    // Polish
    "newsletter",
    "oferta",
    "promocja",
    "promocje",
    "wyprzedaż",
    "wyprzedaz",
    "rabaty",
    "rabat",
    "zniżka",
    "znizka",
    "zniżki",
    "znizki",
    "nowości",
    "nowosci",
    "subskrypcja",
    "subskrypcje",
    "okazja",
    "okazje",
    "kupon",
    "kupony",
    "kody rabatowe",
    "specjalna oferta",
    "limitowana oferta",
    // English
    "offer",
    "offers",
    "promotion",
    "promotions",
    "sale",
    "sales",
    "discount",
    "discounts",
    "deal",
    "deals",
    "special offer",
    "limited offer",
    "subscribe",
    "subscription",
    "subscribed",
    "new arrivals",
    "new collection",
    "new products",
    "exclusive",
    "exclusive offer",
    "flash sale",
    "coupon",
    "coupons",
    "voucher",
    "vouchers",
    "save",
    "save now",
    "save up to",
    "clearance",
    "bargain",
    "hot deal",
    "best price",
];

/// Decide whether a message looks like bulk or marketing mail
///
/// A message is marketing if it carries a mailing-list header, mentions a
/// known bulk platform in any header value, or its header values and
/// snippet contain a promotional keyword. Matching is case-insensitive.
pub fn is_marketing(headers: &[Header], snippet: &str) -> bool {
    for header in headers {
        let name = header.name.to_lowercase();
        if LIST_HEADERS.iter().any(|h| *h == name) {
            return true;
        }

        let value = header.value.to_lowercase();
        if BULK_PLATFORMS.iter().any(|platform| value.contains(platform)) {
            return true;
        }
    }

    let mut text = headers
        .iter()
        .map(|h| h.value.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    text.push(' ');
    text.push_str(snippet);
    let text = text.to_lowercase();

    MARKETING_KEYWORDS.iter().any(|kw| text.contains(kw))
}

/// Raw value of the first `From` header, if any
pub fn sender_of(headers: &[Header]) -> Option<&str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("from"))
        .map(|h| h.value.as_str())
}
