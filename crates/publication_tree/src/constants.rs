//! NKBIP-01 event kinds and tag names

/// Index event: an ordered list of `a` references, possibly to other indices
pub const KIND_PUBLICATION_INDEX: u32 = 30040;

/// Section event carrying readable text
pub const KIND_PUBLICATION_CONTENT: u32 = 30041;

pub const KIND_WIKI_NOTE: u32 = 30818;

pub const KIND_LONG_FORM: u32 = 30023;

/// Kinds an index may reference as sections
pub const CONTENT_KINDS: [u32; 3] = [KIND_PUBLICATION_CONTENT, KIND_WIKI_NOTE, KIND_LONG_FORM];

/// Child reference, value is `kind:pubkey:dtag`
pub const CHILD_TAG: &str = "a";

/// Local identifier within (kind, pubkey)
pub const DTAG: &str = "d";

pub const TITLE_TAG: &str = "title";

pub fn is_index_kind(kind: u32) -> bool {
    kind == KIND_PUBLICATION_INDEX
}

/// Whether a referenced kind is readable as a section
pub fn is_content_kind(kind: u32) -> bool {
    CONTENT_KINDS.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(is_index_kind(30040));
        assert!(!is_index_kind(30041));
        assert!(is_content_kind(30041));
        assert!(is_content_kind(30818));
        assert!(is_content_kind(30023));
        assert!(!is_content_kind(30040));
    }
}
