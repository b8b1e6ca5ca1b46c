// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scraper::{Html, Selector};
use url::Url;

use crate::adapters::extract::{
    attr_of, clean_price, clean_rating, outermost, search_term, selector, text_of,
};
use crate::adapters::traits::{AdapterError, SiteAdapter};
use crate::domain::models::record::Record;
use crate::engines::traits::PageContent;

const PRODUCT_CONTAINER: &str = r#"[data-testid="product-container"], ._1AtVbE, div[data-id]"#;
const TITLE: &str = "._4rR01T, .s1Q9rs, .KzDlHZ, .wjcEIp";
const PRICE: &str = "._30jeq3._1_WHN1, ._1p7iuX, ._30jeq3, .Nx9bqj";
const RATING: &str = ".gUuXy- span, ._3LWZlK, .XQDdHH";
const DISCOUNT: &str = "._3Ay6Sb, ._2Tpdn3, .UkUFwK";
const IMAGE: &str = "._396cs4 img, .CXW8mj img, img.DByuf4";
const PAGINATION_LINK: &str = "nav a, a._1LKTO3";

/// Flipkart 搜索结果适配器
#[derive(Debug, Default)]
pub struct FlipkartAdapter;

impl FlipkartAdapter {
    pub fn new() -> Self {
        Self
    }
}

struct Selectors {
    container: Selector,
    title: Selector,
    price: Selector,
    rating: Selector,
    discount: Selector,
    image: Selector,
}

impl Selectors {
    fn parse() -> Result<Self, AdapterError> {
        Ok(Self {
            container: selector(PRODUCT_CONTAINER)?,
            title: selector(TITLE)?,
            price: selector(PRICE)?,
            rating: selector(RATING)?,
            discount: selector(DISCOUNT)?,
            image: selector(IMAGE)?,
        })
    }
}

impl SiteAdapter for FlipkartAdapter {
    fn name(&self) -> &'static str {
        "flipkart"
    }

    fn domains(&self) -> &[&'static str] {
        &["flipkart.com"]
    }

    fn build_search_url(&self, _domain: &str, entity_type: &str, page: u32) -> Result<Url, AdapterError> {
        Ok(Url::parse_with_params(
            "https://www.flipkart.com/search",
            &[("q", search_term(entity_type)), ("page", page.to_string())],
        )?)
    }

    fn extract_records(&self, page: &PageContent) -> Result<Vec<Record>, AdapterError> {
        let sel = Selectors::parse()?;
        let document = Html::parse_document(&page.html);

        let records = outermost(&document, &sel.container)
            .map(|card| {
                let mut record = Record::new(page.url.as_str());
                record.set("title", text_of(&card, &sel.title));
                record.set(
                    "price",
                    text_of(&card, &sel.price).and_then(|p| clean_price(&p)),
                );
                record.set(
                    "rating",
                    text_of(&card, &sel.rating).and_then(|r| clean_rating(&r)),
                );
                record.set("discount", text_of(&card, &sel.discount));
                record.set("image", attr_of(&card, &sel.image, "src"));
                record
            })
            .filter(|record| record.get("title").is_some_and(|v| !v.is_null()))
            .map(|record| record.with_field("source", "Flipkart"))
            .collect();
        Ok(records)
    }

    fn has_next_page(&self, page: &PageContent) -> bool {
        let Ok(links) = selector(PAGINATION_LINK) else {
            return false;
        };
        let document = Html::parse_document(&page.html);
        let found = document.select(&links).any(|link| {
            link.text()
                .collect::<String>()
                .trim()
                .eq_ignore_ascii_case("next")
        });
        found
    }

    fn scroll_passes(&self) -> u32 {
        5
    }
}
