use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys the finished record owns; never passed through from `extra`.
const RESERVED_KEYS: [&str; 4] = [
    "link",
    "description_title",
    "description_iznos",
    "description_text",
];

/// A pending unit of enrichment work, keyed by `link`.
///
/// Fields the pipeline does not know about are kept in `extra` so they flow
/// through to the finished record unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Missing in the input reads as blank and is skipped when the frontier loads.
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: String,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkItem {
    #[cfg(test)]
    pub fn new(link: impl Into<String>) -> Self {
        WorkItem {
            link: link.into(),
            name: String::new(),
            price: String::new(),
            image_url: None,
            category: None,
            image: None,
            extra: Map::new(),
        }
    }

    /// Turn this item into its finished record. The link is a working key
    /// only and does not survive into the output.
    pub fn into_record(mut self, fragment: Fragment) -> Record {
        // Stale enrichment carried in from the input would serialize twice.
        for key in RESERVED_KEYS {
            self.extra.remove(key);
        }
        Record {
            name: self.name,
            price: self.price,
            image_url: self.image_url,
            category: self.category,
            image: self.image,
            extra: self.extra,
            description_title: fragment.title,
            description_iznos: fragment.wear,
            description_text: fragment.text,
        }
    }
}

/// Enrichment pulled out of an item's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub title: String,
    pub wear: String,
    pub text: String,
}

impl Fragment {
    /// The fragment used when every attempt failed.
    pub fn degraded() -> Self {
        Fragment::default()
    }
}

/// The enriched, link-free output unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: String,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(default)]
    pub description_title: String,
    #[serde(default)]
    pub description_iznos: String,
    #[serde(default)]
    pub description_text: String,
}

impl Record {
    pub fn is_degraded(&self) -> bool {
        self.description_title.is_empty()
            && self.description_iznos.is_empty()
            && self.description_text.is_empty()
    }
}

/// One candidate scraped off a catalog list page.
///
/// Only promoted to a [`WorkItem`] when both `link` and `image_url` are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingItem {
    pub name: String,
    pub price: String,
    pub image_url: Option<String>,
    pub link: Option<String>,
}

impl ListingItem {
    /// Validate and tag. Items missing a link or an image are unusable and
    /// are dropped rather than retried.
    pub fn promote(self, category: &str) -> Option<WorkItem> {
        let link = self.link.filter(|l| !l.trim().is_empty())?;
        let image_url = self.image_url.filter(|u| !u.trim().is_empty())?;
        Some(WorkItem {
            link,
            name: self.name,
            price: self.price,
            image_url: Some(image_url),
            category: Some(category.to_string()),
            image: None,
            extra: Map::new(),
        })
    }
}
