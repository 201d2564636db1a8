use serde::{Deserialize, Serialize};

/// One business listing captured from a detail panel.
///
/// `name` is the only required field: a record with an empty name is a capture
/// failure and never leaves the acquisition layer. String fields use `""` for
/// "not observed".
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Record {
    pub name: String,
    pub address: String,
    pub website: String,
    pub phone_number: String,
    pub reviews_count: Option<u32>,
    pub reviews_average: Option<f64>,
    pub store_shopping: bool,
    pub in_store_pickup: bool,
    pub store_delivery: bool,
    pub place_type: String,
    pub opens_at: String,
    pub introduction: String,
    /// Label of the target (usually a city) this record was acquired under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
}

impl Record {
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.name, &self.address)
    }
}

/// Normalized `(name, address)` pair identifying one physical place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub name: String,
    pub address: String,
}

impl DedupKey {
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: normalize_key_part(name),
            address: normalize_key_part(address),
        }
    }
}

/// Trim, lowercase and collapse whitespace runs (including NBSP) to one space.
fn normalize_key_part(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One independent search context: a composed query with its own result goal.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AcquisitionTarget {
    pub query: String,
    pub goal: usize,
    #[serde(default)]
    pub label: Option<String>,
}

impl AcquisitionTarget {
    pub fn new(query: impl Into<String>, goal: usize) -> Self {
        Self {
            query: query.into(),
            goal: goal.max(1),
            label: None,
        }
    }

    /// Build `"<base> <qualifier> <filters>"`, skipping blank parts.
    /// The qualifier (e.g. a city) doubles as the target label.
    pub fn compose(base: &str, filters: Option<&str>, qualifier: Option<&str>, goal: usize) -> Self {
        let qualifier = qualifier.map(str::trim).filter(|q| !q.is_empty());
        let query = [Some(base.trim()), qualifier, filters.map(str::trim)]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            query,
            goal: goal.max(1),
            label: qualifier.map(str::to_string),
        }
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.query)
    }

    pub fn with_goal(&self, goal: usize) -> Self {
        Self {
            goal: goal.max(1),
            ..self.clone()
        }
    }
}

// ── HTTP job API payloads ────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    /// Per-city result goal. Numeric strings are accepted.
    #[serde(default, rename = "maxResults", deserialize_with = "lenient_count")]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub filters: Option<String>,
    /// Comma-separated city list.
    #[serde(default)]
    pub cities: Option<String>,
}

/// `20`, `"20"` and `null` all deserialize; anything else is an error.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(usize),
        Text(String),
    }

    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Number(n)) => Ok(Some(n)),
        Some(Count::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Count::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("maxResults must be a whole number, got {:?}", text))),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchStarted {
    pub search_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchStatusResponse {
    pub search_id: String,
    pub status: String,
    pub query: String,
    pub results_count: usize,
    pub elapsed_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResultsResponse {
    pub search_id: String,
    pub status: String,
    pub query: String,
    pub results: Vec<ResultRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_results: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Flattened record shape served by the job API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResultRow {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub website: String,
    #[serde(rename = "type")]
    pub place_type: String,
    pub reviews: String,
    pub hours: String,
    pub city: String,
}

impl From<&Record> for ResultRow {
    fn from(record: &Record) -> Self {
        Self {
            name: record.name.clone(),
            address: record.address.clone(),
            phone: record.phone_number.clone(),
            website: record.website.clone(),
            place_type: record.place_type.clone(),
            reviews: format!("{} reviews", record.reviews_count.unwrap_or(0)),
            hours: record.opens_at.clone(),
            city: record.target_label.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_ignores_case_and_whitespace() {
        let a = DedupKey::new("  Caffè  Roma ", "Via Po 1,\u{a0}Torino");
        let b = DedupKey::new("caffè roma", "via po 1, torino");
        assert_eq!(a, b);
    }

    #[test]
    fn compose_orders_base_city_filters() {
        let t = AcquisitionTarget::compose("travel agency", Some("chinese"), Some(" Milan "), 15);
        assert_eq!(t.query, "travel agency Milan chinese");
        assert_eq!(t.label.as_deref(), Some("Milan"));
        assert_eq!(t.goal, 15);
    }

    #[test]
    fn compose_skips_blank_parts_and_floors_goal() {
        let t = AcquisitionTarget::compose("bakery", Some("  "), None, 0);
        assert_eq!(t.query, "bakery");
        assert_eq!(t.label, None);
        assert_eq!(t.goal, 1);
        assert_eq!(t.display_label(), "bakery");
    }

    #[test]
    fn max_results_accepts_numbers_and_numeric_strings() {
        let parse = |body: &str| serde_json::from_str::<SearchRequest>(body).map(|r| r.max_results);
        assert_eq!(parse(r#"{"query":"q","maxResults":20}"#).unwrap(), Some(20));
        assert_eq!(parse(r#"{"query":"q","maxResults":" 15 "}"#).unwrap(), Some(15));
        assert_eq!(parse(r#"{"query":"q","maxResults":null}"#).unwrap(), None);
        assert_eq!(parse(r#"{"query":"q"}"#).unwrap(), None);
        assert!(parse(r#"{"query":"q","maxResults":"lots"}"#).is_err());
    }

    #[test]
    fn result_row_formats_reviews() {
        let record = Record {
            name: "Shop".into(),
            reviews_count: None,
            target_label: Some("Rome".into()),
            ..Default::default()
        };
        let row = ResultRow::from(&record);
        assert_eq!(row.reviews, "0 reviews");
        assert_eq!(row.city, "Rome");
    }
}
