//! PDF Page Tree
//!
//! Page counting according to ISO 32000-1 Section 7.7.3. The root `/Count` is
//! authoritative; when it is missing or not positive the leaves are counted by
//! walking `/Kids`.

use super::objects::{ObjectId, PdfDictionary};
use super::reader::PdfReader;
use super::stack_safe::StackSafeContext;
use super::{ParseError, ParseResult};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Number of pages below the catalog's `/Pages` node.
pub fn page_count(reader: &PdfReader, catalog: &PdfDictionary) -> ParseResult<u32> {
    let root = reader
        .resolve_entry(catalog, "Pages")?
        .filter(|pages| pages.as_dict().is_some())
        .ok_or_else(|| ParseError::MissingRequiredEntry("Pages".to_string()))?;
    let Some(root_dict) = root.as_dict() else {
        return Err(ParseError::MissingRequiredEntry("Pages".to_string()));
    };

    match root_dict.get_integer("Count") {
        Some(count) if count > 0 => Ok(u32::try_from(count).unwrap_or(u32::MAX)),
        declared => {
            debug!(declared = ?declared, "page tree /Count unusable, counting leaves");
            let mut walker = LeafCounter {
                reader,
                context: StackSafeContext::with_limit(reader.options().max_reference_depth),
                strict: reader.options().strict_mode,
                counted: HashMap::new(),
            };
            let root_id = catalog.get("Pages").and_then(|p| p.as_reference());
            walker.count_node(root_id, root_dict)
        }
    }
}

struct LeafCounter<'a> {
    reader: &'a PdfReader,
    context: StackSafeContext,
    strict: bool,
    /// Leaf totals of subtrees already walked; shared kids are counted once per reference
    counted: HashMap<ObjectId, u32>,
}

impl LeafCounter<'_> {
    fn count_node(&mut self, id: Option<ObjectId>, node: &PdfDictionary) -> ParseResult<u32> {
        let is_leaf = node.get_type() == Some("Page") || !node.contains_key("Kids");
        if is_leaf {
            return Ok(u32::from(node.get_type() != Some("Pages")));
        }

        if let Some(&total) = id.and_then(|id| self.counted.get(&id)) {
            return Ok(total);
        }

        if let Some(id) = id {
            self.context.visit_ref(id)?;
        }
        self.context.enter()?;
        let result = self.count_kids(node);
        self.context.exit();
        if let Some(id) = id {
            self.context.unvisit_ref(id);
            if let Ok(total) = &result {
                self.counted.insert(id, *total);
            }
        }
        result
    }

    fn count_kids(&mut self, node: &PdfDictionary) -> ParseResult<u32> {
        let kids = match self.reader.resolve_entry(node, "Kids")? {
            Some(kids) => kids,
            None => return Ok(0),
        };
        let Some(kids) = kids.as_array() else {
            warn!("page tree /Kids is not an array");
            return Ok(0);
        };

        let mut total: u32 = 0;
        for kid in kids.iter() {
            let kid_id = kid.as_reference();
            if let Some((num, gen)) = kid_id.filter(|&id| self.context.is_visited(id)) {
                let error = ParseError::CircularReference(num, gen);
                if self.strict {
                    return Err(error);
                }
                warn!(error = %error, "page tree cycle skipped");
                continue;
            }

            let resolved = self.reader.resolve(kid)?;
            let Some(dict) = resolved.as_dict() else {
                debug!("non-dictionary page tree kid ignored");
                continue;
            };
            match self.count_node(kid_id, dict) {
                Ok(count) => total = total.saturating_add(count),
                Err(e) if !self.strict && matches!(e, ParseError::StructureTooDeep { .. }) => {
                    warn!(error = %e, "page tree branch too deep, skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::source::ByteSource;
    use crate::parser::test_helpers::classic_pdf;
    use crate::parser::ParseOptions;

    fn count(objects: &[(u32, &str)], options: ParseOptions) -> ParseResult<u32> {
        let fixture = classic_pdf(objects);
        let reader = PdfReader::new(ByteSource::from_bytes(fixture.bytes), options, None)?;
        let catalog = reader.catalog()?;
        let dict = catalog.as_dict().ok_or_else(|| ParseError::MissingRequiredEntry("Root".to_string()))?;
        page_count(&reader, dict)
    }

    #[test]
    fn test_count_from_root() {
        let pages = count(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R] /Count 12 >>"),
                (3, "<< /Type /Page /Parent 2 0 R >>"),
            ],
            ParseOptions::default(),
        );
        assert_eq!(pages.unwrap(), 12);
    }

    #[test]
    fn test_count_leaves_when_count_missing() {
        let pages = count(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R 4 0 R] >>"),
                (3, "<< /Type /Page >>"),
                (4, "<< /Type /Pages /Kids [5 0 R 6 0 R] /Count 0 >>"),
                (5, "<< /Type /Page >>"),
                (6, "<< /Type /Page >>"),
            ],
            ParseOptions::default(),
        );
        assert_eq!(pages.unwrap(), 3);
    }

    #[test]
    fn test_cycle_in_page_tree() {
        let objects = [
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count -1 >>"),
            (3, "<< /Type /Page >>"),
            (4, "<< /Type /Pages /Kids [2 0 R] >>"),
        ];
        assert_eq!(count(&objects, ParseOptions::default()).unwrap(), 1);
        assert!(matches!(
            count(&objects, ParseOptions::strict()),
            Err(ParseError::CircularReference(2, 0))
        ));
    }

    #[test]
    fn test_shared_kid_is_not_a_cycle() {
        let pages = count(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R 3 0 R] >>"),
                (3, "<< /Type /Page >>"),
            ],
            ParseOptions::default(),
        );
        assert_eq!(pages.unwrap(), 2);
    }

    #[test]
    fn test_deep_shared_subtrees_are_walked_once() {
        // Each level lists the next node twice
        let levels = 24u32;
        let mut bodies = vec![(1, "<< /Type /Catalog /Pages 2 0 R >>".to_string())];
        for n in 2..2 + levels {
            let next = n + 1;
            bodies.push((n, format!("<< /Type /Pages /Kids [{next} 0 R {next} 0 R] >>")));
        }
        bodies.push((2 + levels, "<< /Type /Page >>".to_string()));
        let objects: Vec<(u32, &str)> = bodies.iter().map(|(n, body)| (*n, body.as_str())).collect();

        let fixture = classic_pdf(&objects);
        let reader = PdfReader::new(ByteSource::from_bytes(fixture.bytes), ParseOptions::default(), None).unwrap();
        let catalog = reader.catalog().unwrap();
        let mut walker = LeafCounter {
            reader: &reader,
            context: StackSafeContext::with_limit(reader.options().max_reference_depth),
            strict: false,
            counted: HashMap::new(),
        };
        let root = catalog.as_dict().unwrap().get("Pages").and_then(|p| p.as_reference());
        let root_node = reader.get_object((2, 0)).unwrap();

        assert_eq!(walker.count_node(root, root_node.as_dict().unwrap()).unwrap(), 1 << levels);
        // One memo entry per intermediate node
        assert_eq!(walker.counted.len(), levels as usize);
    }

    #[test]
    fn test_missing_pages() {
        let result = count(&[(1, "<< /Type /Catalog >>")], ParseOptions::default());
        assert!(matches!(result, Err(ParseError::MissingRequiredEntry(_))));
    }
}
