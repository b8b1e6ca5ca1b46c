// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scraper::Html;
use url::Url;

use crate::adapters::extract::{
    attr_of, clean_price, clean_rating, outermost, search_term, selector, text_of,
};
use crate::adapters::traits::{AdapterError, SiteAdapter};
use crate::domain::models::record::Record;
use crate::engines::traits::PageContent;

const PRODUCT_CONTAINER: &str = r#"[data-component-type="s-search-result"]"#;
const TITLE: &str = "h2 a span, h2 span, .a-text-normal";
const PRICE: &str = ".a-price .a-offscreen, .a-price-whole";
const RATING: &str = ".a-icon-alt";
const DISCOUNT: &str = ".a-badge-text";
const IMAGE: &str = "img.s-image";
const NEXT_PAGE: &str = "a.s-pagination-next";

/// Amazon 搜索结果适配器
#[derive(Debug, Default)]
pub struct AmazonAdapter;

impl AmazonAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SiteAdapter for AmazonAdapter {
    fn name(&self) -> &'static str {
        "amazon"
    }

    fn domains(&self) -> &[&'static str] {
        &["amazon.in", "amazon.com"]
    }

    fn build_search_url(&self, domain: &str, entity_type: &str, page: u32) -> Result<Url, AdapterError> {
        let host = if domain.starts_with("amazon.") {
            format!("www.{}", domain)
        } else {
            domain.to_string()
        };
        Ok(Url::parse_with_params(
            &format!("https://{}/s", host),
            &[("k", search_term(entity_type)), ("page", page.to_string())],
        )?)
    }

    fn extract_records(&self, page: &PageContent) -> Result<Vec<Record>, AdapterError> {
        let container = selector(PRODUCT_CONTAINER)?;
        let title = selector(TITLE)?;
        let price = selector(PRICE)?;
        let rating = selector(RATING)?;
        let discount = selector(DISCOUNT)?;
        let image = selector(IMAGE)?;

        let document = Html::parse_document(&page.html);
        let records = outermost(&document, &container)
            .filter_map(|card| {
                let name = text_of(&card, &title)?;
                let record = Record::new(page.url.as_str())
                    .with_field("title", name)
                    .with_field("price", text_of(&card, &price).and_then(|p| clean_price(&p)))
                    .with_field("rating", text_of(&card, &rating).and_then(|r| clean_rating(&r)))
                    .with_field("discount", text_of(&card, &discount))
                    .with_field("image", attr_of(&card, &image, "src"))
                    .with_field("source", "Amazon");
                Some(record)
            })
            .collect();
        Ok(records)
    }

    fn has_next_page(&self, page: &PageContent) -> bool {
        let Ok(next) = selector(NEXT_PAGE) else {
            return false;
        };
        let document = Html::parse_document(&page.html);
        let enabled = document.select(&next).any(|link| {
            !link
                .value()
                .classes()
                .any(|class| class == "s-pagination-disabled")
                && link.value().attr("aria-disabled") != Some("true")
        });
        enabled
    }
}
