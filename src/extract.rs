//! CSS-selector extractors for the catalog list page and the item detail page.

use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::fetch::PageContent;
use crate::model::{Fragment, ListingItem};
use crate::settings::SelectorSettings;

const NO_NAME: &str = "Нет названия";
const NO_PRICE: &str = "Нет цены";

/// Parses page content. `None` means the expected shape was not there.
pub trait Extractor {
    type Output;

    fn extract(&self, page: &PageContent) -> Option<Self::Output>;
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {:?}: {:?}", css, e))
}

fn inner_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn collapse_ws(s: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\s+").unwrap());
    re.replace_all(s.trim(), " ").into_owned()
}

/// Strip the currency sign and surrounding whitespace from a price label.
pub fn clean_price(raw: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[€\u{a0}]").unwrap());
    collapse_ws(&re.replace_all(raw, ""))
}

fn resolve(base: &str, href: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

// ── Detail page ──

pub struct DetailExtractor {
    wrapper: Selector,
    title: Selector,
    wear: Selector,
    text: Selector,
}

impl DetailExtractor {
    pub fn new(s: &SelectorSettings) -> Result<Self> {
        Ok(DetailExtractor {
            wrapper: selector(&s.detail_wrapper)?,
            title: selector(&s.detail_title)?,
            wear: selector(&s.detail_wear)?,
            text: selector(&s.detail_text)?,
        })
    }
}

impl Extractor for DetailExtractor {
    type Output = Fragment;

    fn extract(&self, page: &PageContent) -> Option<Fragment> {
        let doc = Html::parse_document(&page.body);
        let wrapper = doc.select(&self.wrapper).next()?;

        let field = |sel: &Selector| wrapper.select(sel).next().map(inner_text).unwrap_or_default();

        Some(Fragment {
            title: field(&self.title),
            wear: field(&self.wear),
            text: field(&self.text),
        })
    }
}

// ── List page ──

pub struct ListingExtractor {
    item: Selector,
    name: Selector,
    price: Selector,
    image: Selector,
    link_attr: String,
}

impl ListingExtractor {
    pub fn new(s: &SelectorSettings) -> Result<Self> {
        Ok(ListingExtractor {
            item: selector(&s.listing_item)?,
            name: selector(&s.listing_name)?,
            price: selector(&s.listing_price)?,
            image: selector(&s.listing_image)?,
            link_attr: s.listing_link_attr.clone(),
        })
    }
}

impl Extractor for ListingExtractor {
    type Output = Vec<ListingItem>;

    /// Always `Some`; a page without items is an empty list, not a miss.
    fn extract(&self, page: &PageContent) -> Option<Vec<ListingItem>> {
        let doc = Html::parse_document(&page.body);

        let items = doc
            .select(&self.item)
            .map(|el| {
                let name = el
                    .select(&self.name)
                    .next()
                    .map(|n| collapse_ws(&inner_text(n)))
                    .unwrap_or_else(|| NO_NAME.to_string());
                let price = el
                    .select(&self.price)
                    .next()
                    .map(|p| clean_price(&inner_text(p)))
                    .unwrap_or_else(|| NO_PRICE.to_string());
                let image_url = el
                    .select(&self.image)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .filter(|src| !src.is_empty())
                    .map(|src| resolve(&page.url, src));
                let link = el
                    .value()
                    .attr(&self.link_attr)
                    .filter(|l| !l.is_empty())
                    .map(|l| resolve(&page.url, l));

                ListingItem {
                    name,
                    price,
                    image_url,
                    link,
                }
            })
            .collect();

        Some(items)
    }
}
