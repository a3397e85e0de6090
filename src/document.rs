//! Entity-to-document normalization.
//!
//! [`build_document`] is a pure function: identical entity state always
//! yields a byte-identical [`Document`]. Entities without a resolvable
//! permalink are unlinkable and never indexed.

use crate::models::{ContentEntity, Document};

/// Number of words kept when deriving an excerpt from the content.
const EXCERPT_WORDS: usize = 40;

/// Strip markup tags and decode the common entities, collapsing runs of
/// whitespace.
pub fn strip_markup(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Explicit excerpt when present, otherwise the first forty words of the
/// cleaned content.
fn make_excerpt(explicit: Option<&str>, content: &str) -> String {
    if let Some(excerpt) = explicit {
        let cleaned = strip_markup(excerpt);
        if !cleaned.is_empty() {
            return cleaned;
        }
    }

    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() <= EXCERPT_WORDS {
        words.join(" ")
    } else {
        let mut excerpt = words[..EXCERPT_WORDS].join(" ");
        excerpt.push('…');
        excerpt
    }
}

/// Popularity score feeding the default ranking. The weighting is a
/// product decision; keep the formula exactly as is.
pub fn popularity_score(sales: i64, reviews: i64, avg_rating: f64) -> f64 {
    sales.max(0) as f64 + reviews.max(0) as f64 + avg_rating.max(0.0) / 5.0
}

/// Map one catalog entity to its canonical index document, or `None` when
/// the entity has no permalink.
pub fn build_document(entity: &ContentEntity) -> Option<Document> {
    let permalink = entity.permalink.as_deref().filter(|p| !p.is_empty())?;

    let content = strip_markup(&entity.body);
    let excerpt = make_excerpt(entity.excerpt.as_deref(), &content);

    let mut categories = Vec::new();
    let mut tags = Vec::new();
    let mut product_category = Vec::new();
    let mut brand = Vec::new();
    for term in &entity.terms {
        match term.taxonomy.as_str() {
            "product_cat" => product_category.push(term.slug.clone()),
            "product_brand" => brand.push(term.slug.clone()),
            _ if term.hierarchical => categories.push(term.slug.clone()),
            _ => tags.push(term.slug.clone()),
        }
    }

    let (sku, price, popularity) = match &entity.commerce {
        Some(c) => (
            c.sku.clone(),
            c.price,
            popularity_score(c.sales, c.reviews, c.avg_rating),
        ),
        None => (String::new(), 0.0, 0.0),
    };

    let image = entity
        .thumbnail
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| entity.commerce.as_ref().and_then(|c| c.image.clone()))
        .unwrap_or_default();

    Some(Document {
        id: entity.id.to_string(),
        title: entity.title.clone(),
        content,
        excerpt,
        permalink: permalink.to_string(),
        image,
        types: entity.kind.clone(),
        categories,
        tags,
        product_category,
        brand,
        sku,
        price,
        popularity,
        timestamp: entity.created_at,
        author: entity.author.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommerceInfo, EntityStatus, TaxonomyTerm};

    fn entity() -> ContentEntity {
        ContentEntity {
            id: 42,
            kind: "product".to_string(),
            status: EntityStatus::Published,
            title: "Red Lamp".to_string(),
            body: "<p>A <strong>red</strong> lamp &amp; shade.</p>".to_string(),
            excerpt: None,
            permalink: Some("https://shop.example/red-lamp".to_string()),
            thumbnail: None,
            author: "vendor".to_string(),
            comment_count: 3,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_100,
            terms: vec![
                TaxonomyTerm {
                    taxonomy: "product_cat".to_string(),
                    slug: "lighting".to_string(),
                    hierarchical: true,
                },
                TaxonomyTerm {
                    taxonomy: "product_brand".to_string(),
                    slug: "lumina".to_string(),
                    hierarchical: false,
                },
                TaxonomyTerm {
                    taxonomy: "category".to_string(),
                    slug: "home".to_string(),
                    hierarchical: true,
                },
                TaxonomyTerm {
                    taxonomy: "post_tag".to_string(),
                    slug: "sale".to_string(),
                    hierarchical: false,
                },
            ],
            commerce: Some(CommerceInfo {
                sku: "LAMP-042".to_string(),
                price: 59.99,
                image: Some("https://shop.example/img/lamp.jpg".to_string()),
                sales: 10,
                reviews: 5,
                avg_rating: 4.0,
            }),
        }
    }

    #[test]
    fn test_strip_markup_and_entities() {
        assert_eq!(
            strip_markup("<p>A <strong>red</strong> lamp &amp; shade.</p>"),
            "A red lamp & shade."
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let e = entity();
        assert_eq!(build_document(&e), build_document(&e));
    }

    #[test]
    fn test_no_permalink_means_not_indexed() {
        let mut e = entity();
        e.permalink = None;
        assert!(build_document(&e).is_none());
        e.permalink = Some(String::new());
        assert!(build_document(&e).is_none());
    }

    #[test]
    fn test_popularity_exact_formula() {
        assert_eq!(popularity_score(10, 5, 4.0), 15.8);
        // Negative counters clamp to zero before weighting
        assert_eq!(popularity_score(-3, -1, -2.0), 0.0);
    }

    #[test]
    fn test_taxonomy_bucketing() {
        let doc = build_document(&entity()).unwrap();
        assert_eq!(doc.product_category, vec!["lighting"]);
        assert_eq!(doc.brand, vec!["lumina"]);
        assert_eq!(doc.categories, vec!["home"]);
        assert_eq!(doc.tags, vec!["sale"]);
    }

    #[test]
    fn test_commerce_fields_and_image_fallback() {
        let doc = build_document(&entity()).unwrap();
        assert_eq!(doc.sku, "LAMP-042");
        assert_eq!(doc.price, 59.99);
        assert_eq!(doc.popularity, 15.8);
        // No thumbnail: the commerce product image is used
        assert_eq!(doc.image, "https://shop.example/img/lamp.jpg");

        let mut e = entity();
        e.thumbnail = Some("https://shop.example/thumb.jpg".to_string());
        let doc = build_document(&e).unwrap();
        assert_eq!(doc.image, "https://shop.example/thumb.jpg");
    }

    #[test]
    fn test_entity_without_commerce_has_empty_commerce_fields() {
        let mut e = entity();
        e.commerce = None;
        let doc = build_document(&e).unwrap();
        assert_eq!(doc.sku, "");
        assert_eq!(doc.price, 0.0);
        assert_eq!(doc.popularity, 0.0);
        assert_eq!(doc.image, "");
    }

    #[test]
    fn test_excerpt_prefers_explicit_then_trims_to_forty_words() {
        let mut e = entity();
        e.excerpt = Some("<em>Hand picked</em> summary".to_string());
        let doc = build_document(&e).unwrap();
        assert_eq!(doc.excerpt, "Hand picked summary");

        let mut e = entity();
        let long_body: Vec<String> = (0..60).map(|i| format!("word{}", i)).collect();
        e.body = long_body.join(" ");
        e.excerpt = None;
        let doc = build_document(&e).unwrap();
        let expected = format!("{}…", long_body[..40].join(" "));
        assert_eq!(doc.excerpt, expected);

        // Short content is kept whole, no ellipsis
        let mut e = entity();
        e.body = "just a few words".to_string();
        let doc = build_document(&e).unwrap();
        assert_eq!(doc.excerpt, "just a few words");
    }

    #[test]
    fn test_id_is_stable_string_form() {
        let doc = build_document(&entity()).unwrap();
        assert_eq!(doc.id, "42");
        assert_eq!(doc.timestamp, 1_700_000_000);
    }
}
