//! Shared data types that flow between every streamvault crate.

use std::time::SystemTime;

/// Partitions the concurrency budget because different remote operations
/// carry different per-call cost (see spec §3, `OperationClass`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Pages,
    Blocks,
    Databases,
    Comments,
    Users,
    Properties,
    /// Fallback used for any class a caller doesn't recognize.
    Default,
}

impl OperationClass {
    /// All concrete classes, in a stable order, excluding `Default`.
    pub const ALL: [OperationClass; 6] = [
        OperationClass::Pages,
        OperationClass::Blocks,
        OperationClass::Databases,
        OperationClass::Comments,
        OperationClass::Users,
        OperationClass::Properties,
    ];

    /// The default per-class concurrency ceiling (spec §3, `ConcurrencyBudget`).
    pub fn default_limit(self) -> usize {
        match self {
            OperationClass::Pages => 5,
            OperationClass::Blocks => 15,
            OperationClass::Databases => 3,
            OperationClass::Comments => 10,
            OperationClass::Users => 20,
            OperationClass::Properties => 12,
            OperationClass::Default => 10,
        }
    }

    /// A short, stable label used in logs and metrics.
    pub fn label(self) -> &'static str {
        match self {
            OperationClass::Pages => "pages",
            OperationClass::Blocks => "blocks",
            OperationClass::Databases => "databases",
            OperationClass::Comments => "comments",
            OperationClass::Users => "users",
            OperationClass::Properties => "properties",
            OperationClass::Default => "default",
        }
    }
}

/// A single unit of exportable work.
///
/// The payload stays opaque to the core; only `id` and `kind` are ever
/// interpreted by streamvault itself (spec §9, "dynamic-typed API payloads").
#[derive(Debug, Clone)]
pub struct ExportItem<P> {
    /// Stable identifier, unique within a section, non-empty.
    pub id: String,
    /// What kind of object this is (page, block, database row, ...).
    pub kind: String,
    /// Opaque payload, interpreted only by the caller-supplied transform.
    pub payload: P,
    /// Wall-clock time the item was fetched.
    pub fetched_at: SystemTime,
}

impl<P> ExportItem<P> {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload,
            fetched_at: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_spec() {
        assert_eq!(OperationClass::Pages.default_limit(), 5);
        assert_eq!(OperationClass::Blocks.default_limit(), 15);
        assert_eq!(OperationClass::Databases.default_limit(), 3);
        assert_eq!(OperationClass::Comments.default_limit(), 10);
        assert_eq!(OperationClass::Users.default_limit(), 20);
        assert_eq!(OperationClass::Properties.default_limit(), 12);
    }

    #[test]
    fn all_excludes_default() {
        assert!(!OperationClass::ALL.contains(&OperationClass::Default));
        assert_eq!(OperationClass::ALL.len(), 6);
    }

    #[test]
    fn export_item_carries_opaque_payload() {
        let payload = vec![("title".to_string(), "Hello".to_string())];
        let item = ExportItem::new("abc-123", "page", payload);
        assert_eq!(item.id, "abc-123");
        assert_eq!(item.kind, "page");
    }
}
