//! Normalized extraction result model.
//!
//! Pure functions, no async — easily testable. Flattens the Document AI wire
//! shape into the simplified entity list the service returns and caches.

use serde::{Deserialize, Serialize};

use crate::docai::{PageRef, RawDocument, RawEntity};

/// A typed span of extracted information with confidence and location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity type; empty when the processor did not classify the span.
    #[serde(rename = "type")]
    pub entity_type: String,
    pub mention_text: String,
    pub mention_id: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Human-readable 1-indexed page descriptor, e.g. "page 3 is" or
    /// "pages 1, 2 are". Empty when the entity carries no page refs.
    pub pages: String,
    /// One polygon per page ref, each a list of normalized [x, y] pairs.
    pub bounding_boxes: Vec<Vec<[f64; 2]>>,
}

/// The full normalized result: serializes as a plain JSON array of entities.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
}

/// Normalize a raw Document AI document into the response/cache shape.
/// Entities lacking a type are still included with an empty type.
pub fn normalize(document: &RawDocument) -> ExtractionResult {
    let entities = document.entities.iter().map(normalize_entity).collect();
    ExtractionResult { entities }
}

fn normalize_entity(raw: &RawEntity) -> Entity {
    let page_refs: &[PageRef] = raw
        .page_anchor
        .as_ref()
        .map(|a| a.page_refs.as_slice())
        .unwrap_or(&[]);

    Entity {
        entity_type: raw.entity_type.clone(),
        mention_text: raw.mention_text.clone(),
        mention_id: raw.mention_id.clone(),
        confidence: raw.confidence,
        pages: page_refs_to_string(page_refs),
        bounding_boxes: flatten_polygons(page_refs),
    }
}

/// Render page refs as a descriptor of the page or page range. Pages are
/// 0-indexed on the wire and rendered 1-indexed.
pub fn page_refs_to_string(page_refs: &[PageRef]) -> String {
    let pages: Vec<String> = page_refs.iter().map(|r| (r.page + 1).to_string()).collect();
    match pages.as_slice() {
        [] => String::new(),
        [single] => format!("page {} is", single),
        many => format!("pages {} are", many.join(", ")),
    }
}

/// Flatten each page ref's bounding polygon into plain coordinate pairs.
/// Page refs without a polygon contribute nothing.
fn flatten_polygons(page_refs: &[PageRef]) -> Vec<Vec<[f64; 2]>> {
    page_refs
        .iter()
        .filter_map(|r| r.bounding_poly.as_ref())
        .map(|poly| {
            poly.normalized_vertices
                .iter()
                .map(|v| [v.x, v.y])
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docai::{BoundingPoly, NormalizedVertex, PageAnchor};

    fn page_ref(page: u32, vertices: &[(f64, f64)]) -> PageRef {
        PageRef {
            page,
            bounding_poly: if vertices.is_empty() {
                None
            } else {
                Some(BoundingPoly {
                    normalized_vertices: vertices
                        .iter()
                        .map(|&(x, y)| NormalizedVertex { x, y })
                        .collect(),
                })
            },
        }
    }

    fn raw_entity(entity_type: &str, pages: Vec<PageRef>) -> RawEntity {
        RawEntity {
            entity_type: entity_type.to_string(),
            mention_text: "Invoice #42".to_string(),
            mention_id: "0".to_string(),
            confidence: 0.97,
            page_anchor: Some(PageAnchor { page_refs: pages }),
        }
    }

    #[test]
    fn test_single_page_is_one_indexed() {
        assert_eq!(page_refs_to_string(&[page_ref(2, &[])]), "page 3 is");
    }

    #[test]
    fn test_multiple_pages() {
        assert_eq!(
            page_refs_to_string(&[page_ref(0, &[]), page_ref(1, &[])]),
            "pages 1, 2 are"
        );
    }

    #[test]
    fn test_no_pages() {
        assert_eq!(page_refs_to_string(&[]), "");
    }

    #[test]
    fn test_normalize_flattens_polygons() {
        let document = RawDocument {
            entities: vec![raw_entity(
                "invoice",
                vec![page_ref(0, &[(0.1, 0.2), (0.9, 0.2), (0.9, 0.8), (0.1, 0.8)])],
            )],
        };

        let result = normalize(&document);
        assert_eq!(result.entities.len(), 1);
        let entity = &result.entities[0];
        assert_eq!(entity.entity_type, "invoice");
        assert_eq!(entity.confidence, 0.97);
        assert_eq!(entity.pages, "page 1 is");
        assert_eq!(entity.bounding_boxes.len(), 1);
        assert_eq!(entity.bounding_boxes[0][0], [0.1, 0.2]);
        assert_eq!(entity.bounding_boxes[0].len(), 4);
    }

    #[test]
    fn test_untyped_entity_kept_with_empty_type() {
        let document = RawDocument {
            entities: vec![raw_entity("", vec![page_ref(1, &[])])],
        };

        let result = normalize(&document);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].entity_type, "");
        assert_eq!(result.entities[0].pages, "page 2 is");
    }

    #[test]
    fn test_serde_round_trip() {
        let document = RawDocument {
            entities: vec![
                raw_entity("invoice", vec![page_ref(0, &[(0.0, 0.0), (1.0, 1.0)])]),
                raw_entity("", vec![]),
            ],
        };

        let normalized = normalize(&document);
        let json = serde_json::to_string(&normalized).unwrap();
        let back: ExtractionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, normalized);
    }

    #[test]
    fn test_serializes_as_json_array() {
        let result = normalize(&RawDocument {
            entities: vec![raw_entity("invoice", vec![page_ref(0, &[])])],
        });

        let value = serde_json::to_value(&result).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["type"], "invoice");
        assert_eq!(value[0]["confidence"], 0.97);
    }
}
