// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scraper::{ElementRef, Html};
use serde_json::Value;
use url::Url;

use crate::adapters::extract::{clean_price, clean_rating, collapse_whitespace, search_term, selector};
use crate::adapters::traits::{AdapterError, Confidence, SiteAdapter};
use crate::domain::models::record::Record;
use crate::engines::traits::PageContent;

const JSON_LD: &str = r#"script[type="application/ld+json"]"#;
const NEXT_PAGE: &str = r#"a[rel="next"], link[rel="next"]"#;

/// 通用启发式适配器
///
/// 先解析页面中的 JSON-LD（`Product`、`ItemList`），没有结构化数据时退回到 HTML 表格。
#[derive(Debug, Default)]
pub struct GenericAdapter;

impl GenericAdapter {
    pub fn new() -> Self {
        Self
    }

    fn from_json_ld(document: &Html, source: &str) -> Result<Vec<Record>, AdapterError> {
        let scripts = selector(JSON_LD)?;
        let mut records = Vec::new();
        for script in document.select(&scripts) {
            let raw = script.text().collect::<String>();
            // 单个脚本解析失败不影响其他结构化数据
            let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
                continue;
            };
            collect_json_ld(&value, source, &mut records);
        }
        Ok(records)
    }

    fn from_tables(document: &Html, source: &str) -> Result<Vec<Record>, AdapterError> {
        let tables = selector("table")?;
        let rows = selector("tr")?;
        let header_cells = selector("th")?;
        let data_cells = selector("td")?;

        for table in document.select(&tables) {
            let mut table_rows = table.select(&rows);
            let Some(header_row) = table_rows.find(|row| row.select(&header_cells).next().is_some()) else {
                continue;
            };
            let headers: Vec<String> = header_row
                .select(&header_cells)
                .map(|cell| field_name(&cell_text(&cell)))
                .collect();
            if headers.iter().all(|h| h.is_empty()) {
                continue;
            }

            let records: Vec<Record> = table_rows
                .filter_map(|row| {
                    let cells: Vec<String> = row.select(&data_cells).map(|c| cell_text(&c)).collect();
                    if cells.is_empty() {
                        return None;
                    }
                    let mut record = Record::new(source);
                    for (name, value) in headers.iter().zip(cells) {
                        if !name.is_empty() {
                            record.set(name.clone(), normalize_cell(name, value));
                        }
                    }
                    record.has_data().then_some(record)
                })
                .collect();
            if !records.is_empty() {
                return Ok(records);
            }
        }
        Ok(Vec::new())
    }
}

fn cell_text(cell: &ElementRef) -> String {
    collapse_whitespace(&cell.text().collect::<Vec<_>>().join(" "))
}

/// 表头转为字段名：小写、非字母数字替换为下划线
fn field_name(header: &str) -> String {
    let name: String = header
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let name = name
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    match name.as_str() {
        "name" | "product" | "product_name" => "title".to_string(),
        "cost" | "amount" => "price".to_string(),
        _ => name,
    }
}

fn normalize_cell(name: &str, value: String) -> Option<String> {
    match name {
        "price" => clean_price(&value),
        "rating" => clean_rating(&value),
        _ => Some(value),
    }
}

fn type_matches(value: &Value, wanted: &str) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == wanted,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(wanted)),
        _ => false,
    }
}

fn collect_json_ld(value: &Value, source: &str, records: &mut Vec<Record>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_json_ld(item, source, records);
            }
        }
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_json_ld(graph, source, records);
            } else if type_matches(value, "Product") {
                records.push(product_record(value, source));
            } else if type_matches(value, "ItemList") {
                if let Some(Value::Array(elements)) = map.get("itemListElement") {
                    for element in elements {
                        let item = element.get("item").unwrap_or(element);
                        if type_matches(item, "Product") {
                            records.push(product_record(item, source));
                        } else if let Some(name) = item.get("name").and_then(Value::as_str) {
                            records.push(
                                Record::new(source)
                                    .with_field("title", name)
                                    .with_field("url", item.get("url").cloned().unwrap_or(Value::Null)),
                            );
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => scalar_text(items.first()),
        Value::Object(map) => scalar_text(map.get("name")),
        _ => None,
    }
}

fn product_record(product: &Value, source: &str) -> Record {
    let offer = match product.get("offers") {
        Some(Value::Array(offers)) => offers.first(),
        other => other,
    };
    let price = offer
        .and_then(|o| scalar_text(o.get("price")).or_else(|| scalar_text(o.get("lowPrice"))))
        .and_then(|p| clean_price(&p));
    let availability = offer
        .and_then(|o| scalar_text(o.get("availability")))
        .map(|a| a.rsplit('/').next().unwrap_or(&a).to_string());
    let rating = product
        .get("aggregateRating")
        .and_then(|r| scalar_text(r.get("ratingValue")))
        .and_then(|r| clean_rating(&r));

    Record::new(source)
        .with_field("title", scalar_text(product.get("name")))
        .with_field("price", price)
        .with_field("rating", rating)
        .with_field("description", scalar_text(product.get("description")))
        .with_field("availability", availability)
        .with_field("brand", scalar_text(product.get("brand")))
        .with_field("image", scalar_text(product.get("image")))
}

impl SiteAdapter for GenericAdapter {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn domains(&self) -> &[&'static str] {
        &[]
    }

    fn build_search_url(&self, domain: &str, entity_type: &str, page: u32) -> Result<Url, AdapterError> {
        Ok(Url::parse_with_params(
            &format!("https://{}/search", domain),
            &[("q", search_term(entity_type)), ("page", page.to_string())],
        )?)
    }

    fn extract_records(&self, page: &PageContent) -> Result<Vec<Record>, AdapterError> {
        let document = Html::parse_document(&page.html);
        let source = page.url.as_str();

        let records = Self::from_json_ld(&document, source)?;
        if !records.is_empty() {
            return Ok(records);
        }
        Self::from_tables(&document, source)
    }

    fn has_next_page(&self, page: &PageContent) -> bool {
        let Ok(next) = selector(NEXT_PAGE) else {
            return false;
        };
        let document = Html::parse_document(&page.html);
        let found = document.select(&next).next().is_some();
        found
    }

    fn confidence(&self) -> Confidence {
        Confidence::Heuristic
    }
}
