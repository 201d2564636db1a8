//! Declarative locators for the map-search UI.
//!
//! This is a fact table about a third-party page and changes whenever the page
//! does. Keep selectors here and nowhere else.

/// A named XPath expression. The name is what logs and test doubles key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    pub name: &'static str,
    pub xpath: &'static str,
}

impl Locator {
    pub const fn new(name: &'static str, xpath: &'static str) -> Self {
        Self { name, xpath }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

pub const MAPS_START_URL: &str = "https://www.google.com/maps/@32.9817464,70.1930781,3.67z?";

#[derive(Debug, Clone, PartialEq)]
pub struct Locators {
    pub search_box: Locator,
    /// Scrollable container holding the result list.
    pub results_panel: Locator,
    pub result_anchor: Locator,
    pub name: Locator,
    pub name_fallback: Locator,
    pub address: Locator,
    pub website: Locator,
    pub phone_number: Locator,
    pub reviews_count: Locator,
    pub reviews_average: Locator,
    pub info: [Locator; 3],
    pub opens_at: Locator,
    pub opens_at_fallback: Locator,
    pub place_type: Locator,
    pub introduction: Locator,
}

impl Default for Locators {
    fn default() -> Self {
        Self::google_maps()
    }
}

impl Locators {
    pub fn google_maps() -> Self {
        Self {
            search_box: Locator::new("search_box", r#"//input[@id="searchboxinput"]"#),
            results_panel: Locator::new("results_panel", r#"//div[@role="feed"]"#),
            result_anchor: Locator::new(
                "result_anchor",
                r#"//a[contains(@href, "https://www.google.com/maps/place")]"#,
            ),
            name: Locator::new("name", r#"//div[@class="TIHn2 "]//h1[@class="DUwDvf lfPIob"]"#),
            name_fallback: Locator::new("name_fallback", r#"//h1[contains(@class, "DUwDvf")]"#),
            address: Locator::new(
                "address",
                r#"//button[@data-item-id="address"]//div[contains(@class, "fontBodyMedium")]"#,
            ),
            website: Locator::new(
                "website",
                r#"//a[@data-item-id="authority"]//div[contains(@class, "fontBodyMedium")]"#,
            ),
            phone_number: Locator::new(
                "phone_number",
                r#"//button[contains(@data-item-id, "phone:tel:")]//div[contains(@class, "fontBodyMedium")]"#,
            ),
            reviews_count: Locator::new(
                "reviews_count",
                r#"//div[@class="TIHn2 "]//div[@class="fontBodyMedium dmRWX"]//div//span//span//span[@aria-label]"#,
            ),
            reviews_average: Locator::new(
                "reviews_average",
                r#"//div[@class="TIHn2 "]//div[@class="fontBodyMedium dmRWX"]//div//span[@aria-hidden]"#,
            ),
            info: [
                Locator::new("info1", r#"//div[@class="LTs0Rc"][1]"#),
                Locator::new("info2", r#"//div[@class="LTs0Rc"][2]"#),
                Locator::new("info3", r#"//div[@class="LTs0Rc"][3]"#),
            ],
            opens_at: Locator::new(
                "opens_at",
                r#"//button[contains(@data-item-id, "oh")]//div[contains(@class, "fontBodyMedium")]"#,
            ),
            opens_at_fallback: Locator::new(
                "opens_at_fallback",
                r#"//div[@class="MkV9"]//span[@class="ZDu9vd"]//span[2]"#,
            ),
            place_type: Locator::new("place_type", r#"//div[@class="LBgpqf"]//button[@class="DkEaL "]"#),
            introduction: Locator::new(
                "introduction",
                r#"//div[@class="WeS02d fontBodyMedium"]//div[@class="PYvSYb "]"#,
            ),
        }
    }
}
