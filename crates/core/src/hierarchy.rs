//! Ordering of the flat section listing into a creatable hierarchy.

use std::collections::HashMap;

use crate::source::SourceSection;
use crate::types::SourceId;

/// Key of a target suite in a project's suite map.
///
/// Source sections and the synthetic top-level suites of a multi-suite
/// project live in separate variants, so no section id can shadow a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuiteKey {
    Section(SourceId),
    /// Top-level suite created for the `n`-th source suite.
    SuiteRoot(usize),
}

/// A section together with the parent it will be created under.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedSection<'a> {
    pub section: &'a SourceSection,
    /// `None` when the section goes to the root of its container.
    pub parent: Option<SourceId>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Order sections so that every parent precedes its children.
///
/// A section whose parent is missing from the listing, or which closes a
/// parent cycle, is placed at the root and reported with a warning.
pub fn order_parent_first(sections: &[SourceSection]) -> Vec<PlacedSection<'_>> {
    let index: HashMap<SourceId, usize> = sections
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id, i))
        .collect();

    let mut marks: HashMap<SourceId, Mark> = HashMap::with_capacity(sections.len());
    let mut ordered = Vec::with_capacity(sections.len());

    for section in sections {
        visit(section, sections, &index, &mut marks, &mut ordered);
    }
    ordered
}

fn visit<'a>(
    section: &'a SourceSection,
    sections: &'a [SourceSection],
    index: &HashMap<SourceId, usize>,
    marks: &mut HashMap<SourceId, Mark>,
    ordered: &mut Vec<PlacedSection<'a>>,
) {
    if marks.contains_key(&section.id) {
        return;
    }
    marks.insert(section.id, Mark::Visiting);

    let parent = match section.parent_id {
        None => None,
        Some(parent_id) => match (index.get(&parent_id).copied(), marks.get(&parent_id).copied()) {
            (None, _) => {
                tracing::warn!(
                    section_id = section.id,
                    parent_id,
                    "Parent section not found, attaching to root"
                );
                None
            }
            (Some(_), Some(Mark::Visiting)) => {
                tracing::warn!(
                    section_id = section.id,
                    parent_id,
                    "Section parent cycle detected, attaching to root"
                );
                None
            }
            (Some(_), Some(Mark::Done)) => Some(parent_id),
            (Some(i), None) => {
                visit(&sections[i], sections, index, marks, ordered);
                Some(parent_id)
            }
        },
    };

    ordered.push(PlacedSection { section, parent });
    marks.insert(section.id, Mark::Done);
}
