//! Macros for defining opaque identifier types.

/// Macro to define an opaque, string-backed identifier.
///
/// This generates a newtype wrapper around `String` with:
/// - A `KIND` constant used in error and log messages
/// - `parse()` that rejects empty or blank input
/// - `new_unchecked()` for values already validated upstream
/// - `Display`, `FromStr` and `AsRef<str>` implementations
/// - `Serialize` and `Deserialize` as a plain string
/// - `Ord` (lexicographic), `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_id!(StudentId, "student");
///
/// let student: StudentId = "alice".parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $kind:literal) => {
        /// An opaque identifier for this resource type.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Human-readable kind of this identifier.
            pub const KIND: &'static str = $kind;

            /// Parses an identifier, rejecting empty and blank strings.
            ///
            /// The value is kept verbatim; surrounding whitespace is not trimmed.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }
                if s.trim().is_empty() {
                    return Err($crate::IdError::Blank);
                }
                Ok(Self(s.to_string()))
            }

            /// Wraps a value without validation.
            #[must_use]
            pub fn new_unchecked(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier and returns the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
