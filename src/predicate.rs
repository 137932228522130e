//! The fixed predicate taxonomy.
//!
//! Predicates are not user-editable, so they live in a static table rather
//! than a store. Index relation roles map onto predicates as well, which
//! lets the text builder describe both kinds of edge the same way.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::link::IndexRole;

/// Identifier of a built-in predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredicateId(u16);

impl PredicateId {
    /// Raw id.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PredicateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic class of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateType {
    /// Who made what.
    Creation,
    /// Structural nesting.
    Containment,
    /// Two nodes for the same thing.
    Identity,
    /// Citation or quotation.
    Reference,
    /// Loose relatedness.
    Association,
    /// Classification by topic or tag.
    Description,
    /// Classification by format.
    Form,
}

/// A taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Predicate {
    /// Stable numeric id.
    pub id: PredicateId,
    /// Stable machine name.
    pub slug: &'static str,
    /// Label for the forward direction, e.g. "Created By".
    pub name: &'static str,
    /// Label when read from the target's side, e.g. "Creator Of".
    pub inverse_name: &'static str,
    /// Semantic class.
    pub predicate_type: PredicateType,
}

const fn p(
    id: u16,
    slug: &'static str,
    name: &'static str,
    inverse_name: &'static str,
    predicate_type: PredicateType,
) -> Predicate {
    Predicate {
        id: PredicateId(id),
        slug,
        name,
        inverse_name,
        predicate_type,
    }
}

static PREDICATES: [Predicate; 10] = [
    p(1, "created_by", "Created By", "Creator Of", PredicateType::Creation),
    p(2, "contains", "Contains", "Contained In", PredicateType::Containment),
    p(3, "part_of", "Part Of", "Has Part", PredicateType::Containment),
    p(4, "same_as", "Same As", "Same As", PredicateType::Identity),
    p(5, "references", "References", "Referenced By", PredicateType::Reference),
    p(6, "quotes", "Quotes", "Quoted By", PredicateType::Reference),
    p(7, "related_to", "Related To", "Related To", PredicateType::Association),
    p(8, "tagged_with", "Tags", "Tag Of", PredicateType::Association),
    p(9, "has_format", "Format", "Format Of", PredicateType::Form),
    p(10, "about", "About", "Subject Of", PredicateType::Description),
];

impl Predicate {
    /// All built-in predicates.
    #[must_use]
    pub fn all() -> &'static [Predicate] {
        &PREDICATES
    }

    /// Looks up a predicate by slug.
    #[must_use]
    pub fn by_slug(slug: &str) -> Option<&'static Predicate> {
        PREDICATES.iter().find(|p| p.slug == slug)
    }

    /// Looks up a predicate by id.
    #[must_use]
    pub fn by_id(id: PredicateId) -> Option<&'static Predicate> {
        PREDICATES.iter().find(|p| p.id == id)
    }

    /// The predicate used to describe an index relation role.
    #[must_use]
    pub fn for_role(role: IndexRole) -> &'static Predicate {
        let idx = match role {
            IndexRole::Creator => 0,
            IndexRole::Space | IndexRole::Tag => 7,
            IndexRole::Format => 8,
            IndexRole::Subject => 9,
        };
        &PREDICATES[idx]
    }
}

/// Built-in slugs, for call sites that need a compile-time name.
#[allow(missing_docs)]
pub mod slugs {
    pub const CREATED_BY: &str = "created_by";
    pub const CONTAINS: &str = "contains";
    pub const PART_OF: &str = "part_of";
    pub const SAME_AS: &str = "same_as";
    pub const REFERENCES: &str = "references";
    pub const QUOTES: &str = "quotes";
    pub const RELATED_TO: &str = "related_to";
    pub const TAGGED_WITH: &str = "tagged_with";
    pub const HAS_FORMAT: &str = "has_format";
    pub const ABOUT: &str = "about";
}
