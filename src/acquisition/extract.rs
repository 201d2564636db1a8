//! Detail-panel extraction.
//!
//! A page in "listing detail" state is read field by field into a [`Record`].
//! Individual field reads never fail: a missing node reads as `""` and parse
//! failures leave the field unset. The only thing retried is an empty name,
//! which is what a half-rendered panel looks like.

use crate::acquisition::policy::RetryPolicy;
use crate::core::types::Record;
use crate::scraping::browser::{BrowserPage, ListingHandle};
use crate::scraping::locators::Locators;
use std::time::Duration;
use tracing::{debug, warn};

const NBSP: char = '\u{a0}';
const NARROW_NBSP: char = '\u{202f}';

pub struct DetailExtractor<'a> {
    locators: &'a Locators,
    retry: RetryPolicy,
    detail_timeout: Duration,
}

impl<'a> DetailExtractor<'a> {
    pub fn new(locators: &'a Locators, retry: RetryPolicy, detail_timeout: Duration) -> Self {
        Self {
            locators,
            retry,
            detail_timeout,
        }
    }

    /// Extract the currently open listing, retrying while the name reads empty.
    ///
    /// Makes at most `1 + retries` attempts. Between attempts it waits the
    /// backoff and, when `listing` is given, re-opens it before reading again.
    /// The last record is returned even if its name is still empty; callers
    /// decide what to do with nameless records.
    pub async fn extract(&self, page: &dyn BrowserPage, listing: Option<&dyn ListingHandle>) -> Record {
        let attempts = 1 + self.retry.retries;
        let mut record = Record::default();

        for attempt in 1..=attempts {
            record = self.extract_once(page).await;
            if record.has_name() {
                return record;
            }
            if attempt == attempts {
                break;
            }

            warn!("Empty name on attempt {}/{}, retrying", attempt, attempts);
            page.wait(self.retry.backoff_ms).await;

            if let Some(listing) = listing {
                if let Err(e) = listing.click().await {
                    debug!("Re-click of {} failed: {}", listing.describe(), e);
                } else if let Err(e) = page
                    .wait_for(&self.locators.name_fallback, self.detail_timeout)
                    .await
                {
                    debug!("Detail panel did not re-render: {}", e);
                }
            }
        }

        record
    }

    /// Single pass over every detail locator. The name falls back to the
    /// looser heading locator when the primary one reads empty.
    pub async fn extract_once(&self, page: &dyn BrowserPage) -> Record {
        let loc = self.locators;
        let mut name = page.read_text(&loc.name).await;
        if name.is_empty() {
            name = page.read_text(&loc.name_fallback).await;
        }
        let mut record = Record {
            name,
            address: page.read_text(&loc.address).await,
            website: page.read_text(&loc.website).await,
            phone_number: page.read_text(&loc.phone_number).await,
            place_type: page.read_text(&loc.place_type).await,
            introduction: page.read_text(&loc.introduction).await,
            ..Default::default()
        };

        let reviews_count_raw = page.read_text(&loc.reviews_count).await;
        if !reviews_count_raw.is_empty() {
            record.reviews_count = parse_reviews_count(&reviews_count_raw);
            if record.reviews_count.is_none() {
                warn!("Failed to parse reviews count from {:?}", reviews_count_raw);
            }
        }

        let reviews_average_raw = page.read_text(&loc.reviews_average).await;
        if !reviews_average_raw.is_empty() {
            record.reviews_average = parse_reviews_average(&reviews_average_raw);
            if record.reviews_average.is_none() {
                warn!("Failed to parse reviews average from {:?}", reviews_average_raw);
            }
        }

        for info in &loc.info {
            let raw = page.read_text(info).await;
            if !raw.is_empty() {
                apply_service_info(&mut record, &raw);
            }
        }

        let mut opens_at_raw = page.read_text(&loc.opens_at).await;
        if opens_at_raw.is_empty() {
            opens_at_raw = page.read_text(&loc.opens_at_fallback).await;
        }
        if !opens_at_raw.is_empty() {
            record.opens_at = parse_opens_at(&opens_at_raw);
        }

        record
    }
}

/// `"(1,234)"` → `1234`. Thousands separators (`,` `.` NBSP) are dropped.
pub fn parse_reviews_count(raw: &str) -> Option<u32> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(*c, '(' | ')' | ',' | '.' | NBSP) && !c.is_whitespace())
        .collect();
    digits.parse().ok()
}

/// `"4,5"` → `4.5`. Values outside the 0–5 star range are rejected.
pub fn parse_reviews_average(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != NBSP && !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && (0.0..=5.0).contains(v))
}

/// Keep the part after the `⋅` status separator and drop narrow no-break spaces.
pub fn parse_opens_at(raw: &str) -> String {
    let hours = raw.split('⋅').nth(1).unwrap_or(raw);
    hours.replace(NARROW_NBSP, "").trim().to_string()
}

/// Info blocks look like `"Grocery store · In-store shopping, delivery"`. Only
/// the second `·` segment carries service hints; later segments are ignored.
pub fn apply_service_info(record: &mut Record, raw: &str) {
    let Some(services) = raw.split('·').nth(1) else {
        return;
    };
    let services = services.replace('\n', "").to_lowercase();
    if services.contains("shop") {
        record.store_shopping = true;
    }
    if services.contains("pickup") {
        record.in_store_pickup = true;
    }
    if services.contains("delivery") {
        record.store_delivery = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::browser::BrowserPage;
    use crate::scraping::scripted::{Render, ScriptedListing, ScriptedPage};

    #[test]
    fn parses_reviews_count() {
        assert_eq!(parse_reviews_count("(123)"), Some(123));
        assert_eq!(parse_reviews_count("(1,234)"), Some(1234));
        assert_eq!(parse_reviews_count("(2.015)"), Some(2015));
        assert_eq!(parse_reviews_count("1\u{a0}024"), Some(1024));
        assert_eq!(parse_reviews_count("no reviews"), None);
    }

    #[test]
    fn parses_reviews_average() {
        assert_eq!(parse_reviews_average("4,5"), Some(4.5));
        assert_eq!(parse_reviews_average(" 3.9 "), Some(3.9));
        assert_eq!(parse_reviews_average("7.2"), None);
        assert_eq!(parse_reviews_average("-1"), None);
        assert_eq!(parse_reviews_average("n/a"), None);
    }

    #[test]
    fn parses_opening_hours() {
        assert_eq!(parse_opens_at("Open⋅Opens 8\u{202f}AM"), "Opens 8AM");
        assert_eq!(parse_opens_at("Closes 9\u{202f}PM"), "Closes 9PM");
    }

    #[test]
    fn service_flags_come_from_second_segment() {
        let mut record = Record::default();
        apply_service_info(&mut record, "Grocery store · In-store shopping, curbside\npickup");
        assert!(record.store_shopping);
        assert!(record.in_store_pickup);
        assert!(!record.store_delivery);

        let mut untouched = Record::default();
        apply_service_info(&mut untouched, "Delivery");
        assert!(!untouched.store_delivery);

        let mut third = Record::default();
        apply_service_info(&mut third, "Delivery · Dine-in · In-store pickup");
        assert!(!third.store_delivery);
        assert!(!third.in_store_pickup);
    }

    #[tokio::test]
    async fn extracts_full_record() {
        let listing = ScriptedListing::place("Istanbul Market", "12 Queen St")
            .with("website", "istanbul.example")
            .with("phone_number", "+1 416 555 0100")
            .with("reviews_count", "(1,024)")
            .with("reviews_average", "4,6")
            .with("info2", "Offers · In-store pickup, delivery")
            .with("opens_at", "Closed⋅Opens 9\u{202f}AM")
            .with("place_type", "Grocery store");
        let page = ScriptedPage::new(vec![listing]);
        page.fill_and_submit(&Locators::default().search_box, "q").await.unwrap();
        page.open(0);

        let locators = Locators::default();
        let extractor = DetailExtractor::new(&locators, RetryPolicy::default(), Duration::from_secs(1));
        let record = extractor.extract(&page, None).await;

        assert_eq!(record.name, "Istanbul Market");
        assert_eq!(record.reviews_count, Some(1024));
        assert_eq!(record.reviews_average, Some(4.6));
        assert!(record.in_store_pickup);
        assert!(record.store_delivery);
        assert!(!record.store_shopping);
        assert_eq!(record.opens_at, "Opens 9AM");
        assert_eq!(record.introduction, "");
        assert_eq!(page.log().name_reads, 1);
    }

    #[tokio::test]
    async fn opens_at_falls_back_to_secondary_locator() {
        let listing = ScriptedListing::place("A", "B").with("opens_at_fallback", "Open 24 hours");
        let page = ScriptedPage::new(vec![listing]);
        page.fill_and_submit(&Locators::default().search_box, "q").await.unwrap();
        page.open(0);

        let locators = Locators::default();
        let extractor = DetailExtractor::new(&locators, RetryPolicy::default(), Duration::from_secs(1));
        assert_eq!(extractor.extract_once(&page).await.opens_at, "Open 24 hours");
    }

    #[tokio::test]
    async fn name_falls_back_to_loose_heading() {
        let listing = ScriptedListing::place("Kapadokya", "5 King St").render(Render::FallbackOnly);
        let page = ScriptedPage::new(vec![listing]);
        page.fill_and_submit(&Locators::default().search_box, "q").await.unwrap();
        page.open(0);

        let locators = Locators::default();
        assert_eq!(page.read_text(&locators.name).await, "");

        let extractor = DetailExtractor::new(&locators, RetryPolicy::default(), Duration::from_secs(1));
        let record = extractor.extract(&page, None).await;
        assert_eq!(record.name, "Kapadokya");
        assert_eq!(record.address, "5 King St");
        assert_eq!(page.log().waited_ms, 0);
    }

    #[tokio::test]
    async fn retry_gives_up_after_one_plus_retries_attempts() {
        let listing = ScriptedListing::place("Late", "Somewhere").blank_name_reads(10);
        let page = ScriptedPage::new(vec![listing]);
        page.fill_and_submit(&Locators::default().search_box, "q").await.unwrap();
        page.open(0);

        let locators = Locators::default();
        let retry = RetryPolicy {
            retries: 2,
            backoff_ms: 1_000,
        };
        let extractor = DetailExtractor::new(&locators, retry, Duration::from_secs(1));
        let record = extractor.extract(&page, None).await;

        assert!(!record.has_name());
        assert_eq!(page.log().name_reads, 3);
        assert_eq!(page.log().waited_ms, 2_000);
    }

    #[tokio::test]
    async fn retry_recovers_when_name_renders_late() {
        let listing = ScriptedListing::place("Late", "Somewhere").blank_name_reads(1);
        let page = ScriptedPage::new(vec![listing]);
        page.fill_and_submit(&Locators::default().search_box, "q").await.unwrap();
        let handles = page.all_matches(&Locators::default().result_anchor).await.unwrap();
        handles[0].click().await.unwrap();

        let locators = Locators::default();
        let extractor = DetailExtractor::new(&locators, RetryPolicy::default(), Duration::from_secs(1));
        let record = extractor.extract(&page, Some(handles[0].as_ref())).await;

        assert_eq!(record.name, "Late");
        assert_eq!(page.log().name_reads, 2);
        assert_eq!(page.log().clicks, vec![0, 0]);
    }
}
