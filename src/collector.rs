//! Catalog sweep: every page of every category, validated and batched in
//! memory. Nothing is written until the whole sweep finishes, so an
//! interrupted sweep starts over from page 1.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::error::PersistResult;
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::model::{ListingItem, WorkItem};
use crate::settings::Category;

pub struct CollectOptions {
    pub page_timeout: Duration,
    pub image_timeout: Duration,
    /// Download each item's image here; `None` skips downloads.
    pub image_dir: Option<PathBuf>,
}

/// Sweep stats returned alongside the batch.
#[derive(Debug, Default)]
pub struct CollectStats {
    pub pages: usize,
    pub failed_pages: usize,
    pub found: usize,
    pub kept: usize,
}

pub fn image_name(page: u32, category: &str, index: usize) -> String {
    format!("page{}_{}_item{}.png", page, category, index + 1)
}

pub async fn collect<F, X>(
    fetcher: &mut F,
    extractor: &X,
    categories: &[Category],
    opts: &CollectOptions,
) -> PersistResult<(Vec<WorkItem>, CollectStats)>
where
    F: Fetcher,
    X: Extractor<Output = Vec<ListingItem>>,
{
    // Fail before the first page if images cannot be stored.
    if let Some(dir) = &opts.image_dir {
        fs::create_dir_all(dir)?;
    }

    let total_pages: u64 = categories.iter().map(|c| c.pages as u64).sum();
    let pb = ProgressBar::new(total_pages);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages {msg}")
            .unwrap()
            .progress_chars("=> "),
    );

    let mut batch = Vec::new();
    let mut stats = CollectStats::default();

    for category in categories {
        info!("Collecting category {} ({} pages)", category.name, category.pages);
        for page in 1..=category.pages {
            pb.set_message(format!("{} #{}", category.name, page));
            let items = collect_page(fetcher, extractor, category, page, opts, &mut stats).await;
            batch.extend(items);
            stats.pages += 1;
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    stats.kept = batch.len();
    info!(
        "Collected {} items from {} pages ({} found, {} pages failed)",
        stats.kept, stats.pages, stats.found, stats.failed_pages
    );
    Ok((batch, stats))
}

async fn collect_page<F, X>(
    fetcher: &mut F,
    extractor: &X,
    category: &Category,
    page: u32,
    opts: &CollectOptions,
    stats: &mut CollectStats,
) -> Vec<WorkItem>
where
    F: Fetcher,
    X: Extractor<Output = Vec<ListingItem>>,
{
    let url = category.page_url(page);
    let content = match fetcher.fetch(&url, opts.page_timeout).await {
        Ok(c) => c,
        Err(e) => {
            error!("Page {} of {} failed: {}", page, category.name, e);
            stats.failed_pages += 1;
            return Vec::new();
        }
    };

    let candidates = extractor.extract(&content).unwrap_or_default();
    info!(
        "Found {} items on page {} of {}",
        candidates.len(),
        page,
        category.name
    );
    stats.found += candidates.len();

    let mut kept = Vec::new();
    for (index, candidate) in candidates.into_iter().enumerate() {
        let Some(mut item) = candidate.promote(&category.name) else {
            continue;
        };

        if let (Some(dir), Some(src)) = (&opts.image_dir, item.image_url.as_deref()) {
            let name = image_name(page, &category.name, index);
            if let Err(e) = download(fetcher, src, &dir.join(&name), opts.image_timeout).await {
                warn!("Image {} not saved, skipping item: {}", src, e);
                continue;
            }
            item.image = Some(name);
        }
        kept.push(item);
    }
    kept
}

async fn download<F: Fetcher>(
    fetcher: &mut F,
    url: &str,
    dest: &std::path::Path,
    timeout: Duration,
) -> anyhow::Result<()> {
    let bytes = fetcher.fetch_bytes(url, timeout).await?;
    fs::write(dest, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, PersistenceError};
    use crate::extract::ListingExtractor;
    use crate::fetch::PageContent;
    use crate::settings::SelectorSettings;
    use std::collections::HashMap;

    /// Serves canned pages; anything unknown is a network error.
    #[derive(Default)]
    struct CannedFetcher {
        pages: HashMap<String, String>,
        calls: Vec<String>,
    }

    impl Fetcher for CannedFetcher {
        async fn fetch(&mut self, url: &str, _timeout: Duration) -> Result<PageContent, FetchError> {
            self.calls.push(url.to_string());
            match self.pages.get(url) {
                Some(body) => Ok(PageContent {
                    url: url.to_string(),
                    body: body.clone(),
                }),
                None => Err(FetchError::Network {
                    url: url.to_string(),
                    message: "connection refused".into(),
                }),
            }
        }

        async fn fetch_bytes(&mut self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
            self.fetch(url, timeout).await.map(|p| p.body.into_bytes())
        }
    }

    fn listing(items: &[(Option<&str>, Option<&str>)]) -> String {
        let mut html = String::from("<html><body>");
        for (i, (link, img)) in items.iter().enumerate() {
            html.push_str("<div class=\"item market_item\"");
            if let Some(l) = link {
                html.push_str(&format!(" data-link=\"{}\"", l));
            }
            html.push('>');
            if let Some(src) = img {
                html.push_str(&format!("<img class=\"image\" src=\"{}\">", src));
            }
            html.push_str(&format!(
                "<span class=\"name-inner\">Skin {}</span><div class=\"price\">{}.00 €</div></div>",
                i, i
            ));
        }
        html.push_str("</body></html>");
        html
    }

    fn category(pages: u32) -> Category {
        Category {
            name: "Rust".into(),
            url: "https://market.test/rust/?page=".into(),
            pages,
        }
    }

    fn opts(image_dir: Option<PathBuf>) -> CollectOptions {
        CollectOptions {
            page_timeout: Duration::from_secs(1),
            image_timeout: Duration::from_secs(1),
            image_dir,
        }
    }

    #[tokio::test]
    async fn drops_invalid_items_and_keeps_paginating() {
        let mut fetcher = CannedFetcher::default();
        fetcher.pages.insert(
            "https://market.test/rust/?page=1".into(),
            listing(&[
                (Some("https://market.test/a"), Some("https://cdn.test/a.png")),
                (None, Some("https://cdn.test/b.png")),
                (Some("https://market.test/c"), Some("https://cdn.test/c.png")),
            ]),
        );
        // page 2 is missing: fetch fails
        fetcher.pages.insert("https://market.test/rust/?page=3".into(), listing(&[]));
        fetcher.pages.insert(
            "https://market.test/rust/?page=4".into(),
            listing(&[(Some("https://market.test/d"), None), (Some("https://market.test/e"), Some("https://cdn.test/e.png"))]),
        );

        let extractor = ListingExtractor::new(&SelectorSettings::default()).unwrap();
        let (batch, stats) = collect(&mut fetcher, &extractor, &[category(4)], &opts(None))
            .await
            .unwrap();

        let links: Vec<_> = batch.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(
            links,
            vec!["https://market.test/a", "https://market.test/c", "https://market.test/e"]
        );
        assert!(batch.iter().all(|i| i.category.as_deref() == Some("Rust")));
        assert_eq!(batch[0].price, "0.00");
        assert_eq!(fetcher.calls.len(), 4);
        assert_eq!((stats.pages, stats.failed_pages, stats.found, stats.kept), (4, 1, 5, 3));
    }

    #[tokio::test]
    async fn downloads_images_with_deterministic_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = CannedFetcher::default();
        fetcher.pages.insert(
            "https://market.test/rust/?page=1".into(),
            listing(&[
                (Some("https://market.test/a"), Some("https://cdn.test/a.png")),
                (Some("https://market.test/b"), Some("https://cdn.test/missing.png")),
            ]),
        );
        fetcher.pages.insert("https://cdn.test/a.png".into(), "PNGDATA".into());

        let extractor = ListingExtractor::new(&SelectorSettings::default()).unwrap();
        let (batch, _) = collect(
            &mut fetcher,
            &extractor,
            &[category(1)],
            &opts(Some(dir.path().join("images"))),
        )
        .await
        .unwrap();

        // the item whose image could not be fetched is dropped
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].image.as_deref(), Some("page1_Rust_item1.png"));
        let saved = fs::read(dir.path().join("images/page1_Rust_item1.png")).unwrap();
        assert_eq!(saved, b"PNGDATA");
    }

    #[tokio::test]
    async fn unusable_image_dir_stops_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "x").unwrap();

        let mut fetcher = CannedFetcher::default();
        fetcher.pages.insert(
            "https://market.test/rust/?page=1".into(),
            listing(&[(Some("https://market.test/a"), Some("https://cdn.test/a.png"))]),
        );
        let extractor = ListingExtractor::new(&SelectorSettings::default()).unwrap();
        let result = collect(
            &mut fetcher,
            &extractor,
            &[category(1)],
            &opts(Some(blocker.join("images"))),
        )
        .await;

        assert!(matches!(result, Err(PersistenceError::Io(_))));
        assert!(fetcher.calls.is_empty());
    }

    #[test]
    fn image_names() {
        assert_eq!(image_name(3, "Rust", 0), "page3_Rust_item1.png");
        assert_eq!(image_name(12, "Dota2", 9), "page12_Dota2_item10.png");
    }
}
