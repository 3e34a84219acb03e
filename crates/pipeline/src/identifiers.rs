//! Newtype identifiers for pipeline nodes.
//!
//! Every concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging a
//! [`NodeId`] with a [`NodeType`] even though both are strings under the hood.

/// Generates a non-empty `String` newtype.
///
/// The generated type has `new()` returning `Option<Self>` (rejecting empty
/// values), `as_str()`, `Display`, and a transparent serde representation.
/// Downstream crates using this macro must depend on `serde`.
#[macro_export]
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Identifies a node within a [`crate::Pipeline`].
    ///
    /// Node ids are unique per pipeline; they are the keys of the pipeline map.
    NodeId
}

string_id! {
    /// The kind of executable node (e.g. `"fetch"`, `"extract"`, `"transform"`).
    ///
    /// The set of node types is owned by whatever executes pipelines; this crate
    /// treats the tag as opaque.
    NodeType
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(NodeId::new("").is_none());
        assert!(NodeType::new(String::new()).is_none());
    }

    #[test]
    fn identifiers_serialize_as_plain_strings() {
        let id = NodeId::new("fetch-1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"fetch-1\"");
        assert_eq!(id.to_string(), "fetch-1");
    }
}
